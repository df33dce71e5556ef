use crate::config::ConfigStore;
use crate::incident::{self, IncidentAction};
use crate::ledger;
use crate::models::{AppConfig, ServiceHealth, ServiceState, SharedState};
use crate::probe::{self, ProbeOutcome, ProbeTarget};
use crate::storage::Storage;
use crate::tracker::IssueTracker;
use chrono::{DateTime, Utc};
use futures::future::join_all;
use reqwest::Client;
use rocket::tokio::sync::mpsc;
use rocket::tokio::time::{Duration as TokioDuration, interval};
use rocket::tokio::select;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

const POLL_TICK: TokioDuration = TokioDuration::from_secs(1);
const DAY_TICK: TokioDuration = TokioDuration::from_secs(24 * 60 * 60);
const CONFIG_WATCH_TICK: TokioDuration = TokioDuration::from_secs(2);

/// Commands accepted by the engine task.
pub enum EngineCommand {
    /// Probe everything that is due right now (manual refresh).
    PollNow,
    /// A fresh configuration snapshot from the watcher.
    Reload(AppConfig),
}

#[derive(Clone)]
pub struct EngineHandle {
    pub sender: mpsc::Sender<EngineCommand>,
}

/// The engine task. It is the only writer of the shared state: probe
/// results, reloads and counter resets all pass through here, so a tick
/// and a reload can never interleave on one service.
pub async fn run_engine(
    state: SharedState,
    storage: Arc<Storage>,
    client: Client,
    mut receiver: mpsc::Receiver<EngineCommand>,
) {
    let mut tracker = {
        let guard = state.read().expect("state poisoned");
        info!("Starting polling engine for {} services", guard.services.len());
        IssueTracker::from_settings(&client, &guard.settings)
    };

    let mut poll_tick = interval(POLL_TICK);
    let mut reset_tick = interval(DAY_TICK);

    loop {
        select! {
            _ = poll_tick.tick() => {
                poll_due(&state, &client, &tracker, &storage).await;
            }
            _ = reset_tick.tick() => {
                reset_day(&state);
            }
            cmd = receiver.recv() => {
                match cmd {
                    Some(EngineCommand::PollNow) => {
                        info!("Manual refresh requested");
                        poll_due(&state, &client, &tracker, &storage).await;
                    }
                    Some(EngineCommand::Reload(config)) => {
                        apply_reload(&state, &config);
                        tracker = IssueTracker::from_settings(&client, &config.settings);
                    }
                    None => {
                        warn!("Engine command channel closed; stopping loop");
                        break;
                    }
                }
            }
        }
    }
}

/// One polling pass: a single `now` decides the due set, due services are
/// probed concurrently with no lock held, and all results are applied under
/// one write lock before the snapshot is persisted.
async fn poll_due(
    state: &SharedState,
    client: &Client,
    tracker: &Option<IssueTracker>,
    storage: &Arc<Storage>,
) {
    let now = Utc::now();

    let due: Vec<ProbeTarget> = {
        let guard = state.read().expect("state poisoned");
        guard
            .services
            .iter()
            .filter(|service| is_due(service, now))
            .map(|service| ProbeTarget {
                name: service.name.clone(),
                address: service.address.clone(),
                expected_status_code: service.expected_status_code,
            })
            .collect()
    };
    if due.is_empty() {
        return;
    }

    let results = join_all(due.into_iter().map(|target| {
        let client = client.clone();
        async move {
            let outcome = probe::probe(&client, &target).await;
            (target, outcome)
        }
    }))
    .await;

    let pending = apply_results(state, now, results);
    report_incidents(state, tracker, now, pending).await;
    persist(state, storage);
}

fn is_due(service: &ServiceState, now: DateTime<Utc>) -> bool {
    now.signed_duration_since(service.last_ping).num_milliseconds()
        >= service.ping_interval.as_millis() as i64
}

struct PendingIncident {
    name: String,
    since: DateTime<Utc>,
}

/// Applies all probe results under one write lock. Returns the episodes
/// that now qualify for an issue, so the external calls happen with no lock
/// held.
fn apply_results(
    state: &SharedState,
    now: DateTime<Utc>,
    results: Vec<(ProbeTarget, ProbeOutcome)>,
) -> Vec<PendingIncident> {
    let mut pending = Vec::new();
    let mut guard = state.write().expect("state poisoned");
    let delay = Duration::from_secs(guard.settings.incident_report_delay);

    for (target, outcome) in results {
        // A reload may have rewritten the service list mid-probe; results
        // for names that no longer exist are dropped.
        let Some(service) = guard
            .services
            .iter_mut()
            .find(|service| service.name == target.name)
        else {
            continue;
        };

        service.reset_daily_counters(now);
        service.record_probe(now, outcome.online);
        let action = incident::on_probe(service, now, outcome.online, delay);

        service.last_ping = now;
        service.last_status = if outcome.online {
            ServiceHealth::Online
        } else {
            ServiceHealth::Offline
        };
        service.last_response_time = outcome.latency_ms;

        if let IncidentAction::CreateIssue { since } = action {
            pending.push(PendingIncident {
                name: target.name,
                since,
            });
        }
    }

    guard.generated_at = now;
    pending
}

async fn report_incidents(
    state: &SharedState,
    tracker: &Option<IssueTracker>,
    now: DateTime<Utc>,
    pending: Vec<PendingIncident>,
) {
    if pending.is_empty() {
        return;
    }
    let Some(tracker) = tracker else {
        // No tracker configured; episodes stay unreported.
        return;
    };

    for item in pending {
        let title = format!("{} is down", item.name);
        let body = format!(
            "**{}** has been unreachable since {}.",
            item.name,
            item.since.to_rfc3339()
        );

        match tracker.create_issue(&title, &body).await {
            Ok(number) => {
                info!("Opened issue #{number} for {}", item.name);
                let mut guard = state.write().expect("state poisoned");
                if let Some(service) = guard
                    .services
                    .iter_mut()
                    .find(|service| service.name == item.name)
                {
                    incident::record_issue(service, now, number);
                }
            }
            // Creation failures are not fatal: the service is still offline
            // and unreported, so the next due tick tries again.
            Err(err) => warn!("Failed to open issue for {}: {err}", item.name),
        }
    }
}

fn reset_day(state: &SharedState) {
    let now = Utc::now();
    let mut guard = state.write().expect("state poisoned");
    for service in &mut guard.services {
        service.reset_daily_counters(now);
    }
}

/// Merges a freshly loaded configuration into live state without losing
/// history, then swaps the global settings.
fn apply_reload(state: &SharedState, config: &AppConfig) {
    let now = Utc::now();
    let mut guard = state.write().expect("state poisoned");
    let existing = std::mem::take(&mut guard.services);
    guard.services = ledger::merge_config(existing, &config.services, now);
    guard.settings = config.settings.clone();
    info!("Configuration applied: {} services live", guard.services.len());
}

fn persist(state: &SharedState, storage: &Storage) {
    let services = state.read().expect("state poisoned").services.clone();
    if let Err(err) = storage.save(&services) {
        warn!("Failed to persist snapshot: {err}");
    }
}

/// Polls the configuration source and forwards fresh snapshots to the
/// engine.
pub async fn watch_config(mut store: ConfigStore, sender: mpsc::Sender<EngineCommand>) {
    let mut tick = interval(CONFIG_WATCH_TICK);
    loop {
        tick.tick().await;
        if let Some(config) = store.reload_if_changed() {
            if sender.send(EngineCommand::Reload(config)).await.is_err() {
                warn!("Engine gone; stopping config watcher");
                break;
            }
        }
    }
}
