#[macro_use]
extern crate rocket;

mod config;
mod engine;
mod incident;
mod ledger;
mod models;
mod probe;
mod storage;
mod tracker;

use chrono::{DateTime, NaiveDate, Utc};
use config::{ConfigStore, config_path};
use dotenvy::dotenv;
use engine::{EngineCommand, EngineHandle};
use models::{DaySummary, EngineState, ServiceHealth, SharedState};
use reqwest::Client;
use rocket::fairing::AdHoc;
use rocket::http::Status as HttpStatus;
use rocket::serde::json::Json;
use rocket::tokio::{self, sync::mpsc};
use serde::Serialize;
use std::env;
use std::sync::{Arc, RwLock};
use storage::{Storage, snapshot_path};
use tracker::{IssueComment, IssueTracker};
use tracing::{error, info, warn};

/// Per-service view returned by `/api/status`.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ServiceView {
    name: String,
    /// Present only when the service's visibility flag allows it.
    #[serde(skip_serializing_if = "Option::is_none")]
    address: Option<String>,
    /// Milliseconds between probes.
    ping_interval: u64,
    last_status: ServiceHealth,
    #[serde(skip_serializing_if = "Option::is_none")]
    last_response_time: Option<u64>,
    daily_history: Vec<DaySummary>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct StatusResponse {
    title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<String>,
    generated_at: DateTime<Utc>,
    statuses: Vec<ServiceView>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct IncidentView {
    service: String,
    date: NaiveDate,
    issue_number: u64,
    title: String,
    url: String,
    created_at: DateTime<Utc>,
    comments: Vec<IssueComment>,
}

#[derive(Serialize)]
struct IncidentsResponse {
    incidents: Vec<IncidentView>,
}

#[get("/api/status")]
fn status(state: &rocket::State<SharedState>) -> Json<StatusResponse> {
    let guard = state.read().expect("state poisoned");
    let statuses = guard
        .services
        .iter()
        .map(|service| ServiceView {
            name: service.name.clone(),
            address: service.show_ip.then(|| service.address.clone()),
            ping_interval: service.ping_interval.as_millis() as u64,
            last_status: service.last_status,
            last_response_time: service.last_response_time,
            daily_history: service.daily_history.clone(),
        })
        .collect();

    Json(StatusResponse {
        title: guard.settings.title.clone(),
        description: guard.settings.description.clone(),
        generated_at: guard.generated_at,
        statuses,
    })
}

#[get("/api/incidents")]
async fn incidents(
    state: &rocket::State<SharedState>,
    client: &rocket::State<Client>,
) -> Json<IncidentsResponse> {
    let (tracker, refs) = {
        let guard = state.read().expect("state poisoned");
        let tracker = IssueTracker::from_settings(client.inner(), &guard.settings);
        let refs: Vec<(String, NaiveDate, u64)> = guard
            .services
            .iter()
            .flat_map(|service| {
                service.daily_history.iter().filter_map(|day| {
                    day.issue_number
                        .map(|number| (service.name.clone(), day.date, number))
                })
            })
            .collect();
        (tracker, refs)
    };

    let Some(tracker) = tracker else {
        return Json(IncidentsResponse {
            incidents: Vec::new(),
        });
    };

    let mut incidents = Vec::new();
    for (service, date, number) in refs {
        let details = match tracker.get_issue(number).await {
            Ok(details) => details,
            Err(err) => {
                warn!("Skipping issue #{number} for {service}: {err}");
                continue;
            }
        };
        let comments = match tracker.list_comments(number).await {
            Ok(comments) => comments,
            Err(err) => {
                warn!("Dropping comments for issue #{number}: {err}");
                Vec::new()
            }
        };
        incidents.push(IncidentView {
            service,
            date,
            issue_number: number,
            title: details.title,
            url: details.url,
            created_at: details.created_at,
            comments,
        });
    }
    incidents.sort_by(|a, b| b.date.cmp(&a.date));

    Json(IncidentsResponse { incidents })
}

#[post("/api/refresh")]
async fn refresh(handle: &rocket::State<EngineHandle>) -> HttpStatus {
    match handle.sender.send(EngineCommand::PollNow).await {
        Ok(_) => HttpStatus::Accepted,
        Err(err) => {
            error!("Failed to enqueue refresh request: {err}");
            HttpStatus::InternalServerError
        }
    }
}

#[launch]
fn rocket() -> _ {
    dotenv().ok();
    init_tracing();

    let store = ConfigStore::open(config_path());
    let config = store.current().clone();
    let storage =
        Arc::new(Storage::new(snapshot_path()).expect("failed to initialize snapshot storage"));

    let now = Utc::now();
    let persisted = storage.load().unwrap_or_default();
    let restored = persisted.len();
    let services = ledger::merge_config(persisted, &config.services, now);
    info!(
        "Tracking {} services ({restored} restored from snapshot)",
        services.len()
    );

    let shared_state: SharedState = Arc::new(RwLock::new(EngineState {
        settings: config.settings.clone(),
        generated_at: now,
        services,
    }));

    let client = Client::builder()
        .user_agent("statuswatch/0.1")
        .timeout(probe::PROBE_TIMEOUT)
        .build()
        .expect("failed to build reqwest client");

    let (engine_tx, engine_rx) = mpsc::channel(8);

    let engine_state = shared_state.clone();
    let engine_client = client.clone();

    rocket::build()
        .manage(shared_state)
        .manage(client)
        .manage(EngineHandle {
            sender: engine_tx.clone(),
        })
        .mount("/", routes![status, incidents, refresh])
        .attach(AdHoc::on_liftoff("Status Engine", move |_rocket| {
            Box::pin(async move {
                tokio::spawn(engine::run_engine(
                    engine_state,
                    storage,
                    engine_client,
                    engine_rx,
                ));
                tokio::spawn(engine::watch_config(store, engine_tx));
            })
        }))
}

fn init_tracing() {
    let filter = env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}
