use reqwest::Client;
use rocket::tokio::net::TcpStream;
use rocket::tokio::time::timeout;
use std::time::{Duration, Instant};
use tracing::warn;

/// Bound on a single probe, HTTP or TCP.
pub const PROBE_TIMEOUT: Duration = Duration::from_secs(5);
const DEFAULT_EXPECTED_STATUS: u16 = 200;

/// Everything the prober needs for one check, cloned out of the live state
/// so no lock spans the network call.
#[derive(Debug, Clone)]
pub struct ProbeTarget {
    pub name: String,
    pub address: String,
    pub expected_status_code: Option<u16>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProbeOutcome {
    pub online: bool,
    pub latency_ms: Option<u64>,
}

impl ProbeOutcome {
    fn offline() -> Self {
        Self {
            online: false,
            latency_ms: None,
        }
    }
}

/// Checks one service.
///
/// HTTP(S) addresses get a GET whose status must match the expected code;
/// anything else gets a TCP reachability probe. Transport errors, timeouts
/// and DNS failures all map to offline rather than an error, so one dead
/// service cannot abort the polling pass for the others.
pub async fn probe(client: &Client, target: &ProbeTarget) -> ProbeOutcome {
    if target.address.starts_with("http://") || target.address.starts_with("https://") {
        probe_http(client, target).await
    } else {
        probe_tcp(target).await
    }
}

async fn probe_http(client: &Client, target: &ProbeTarget) -> ProbeOutcome {
    let expected = target
        .expected_status_code
        .unwrap_or(DEFAULT_EXPECTED_STATUS);
    let started = Instant::now();

    match client
        .get(&target.address)
        .timeout(PROBE_TIMEOUT)
        .send()
        .await
    {
        Ok(response) => {
            let latency = started.elapsed().as_millis() as u64;
            let status = response.status().as_u16();
            let online = status == expected;
            if !online {
                warn!("Unexpected status {status} from {}", target.name);
            }
            ProbeOutcome {
                online,
                latency_ms: Some(latency),
            }
        }
        Err(err) => {
            warn!("Request failure for {}: {err}", target.name);
            ProbeOutcome::offline()
        }
    }
}

async fn probe_tcp(target: &ProbeTarget) -> ProbeOutcome {
    // Bare hosts default to port 80.
    let address = if target.address.contains(':') {
        target.address.clone()
    } else {
        format!("{}:80", target.address)
    };
    let started = Instant::now();

    match timeout(PROBE_TIMEOUT, TcpStream::connect(&address)).await {
        Ok(Ok(_stream)) => ProbeOutcome {
            online: true,
            latency_ms: Some(started.elapsed().as_millis() as u64),
        },
        Ok(Err(err)) => {
            warn!("Reachability failure for {}: {err}", target.name);
            ProbeOutcome::offline()
        }
        Err(_) => {
            warn!("Probe timed out for {}", target.name);
            ProbeOutcome::offline()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;

    fn target(address: &str) -> ProbeTarget {
        ProbeTarget {
            name: "test".to_string(),
            address: address.to_string(),
            expected_status_code: None,
        }
    }

    #[rocket::async_test]
    async fn tcp_probe_reports_listening_socket_online() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let address = listener.local_addr().unwrap().to_string();

        let outcome = probe(&Client::new(), &target(&address)).await;
        assert!(outcome.online);
        assert!(outcome.latency_ms.is_some());
    }

    #[rocket::async_test]
    async fn tcp_probe_reports_closed_port_offline() {
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };

        let outcome = probe(&Client::new(), &target(&format!("127.0.0.1:{port}"))).await;
        assert!(!outcome.online);
        assert_eq!(outcome.latency_ms, None);
    }

    #[rocket::async_test]
    async fn unresolvable_address_maps_to_offline() {
        let outcome = probe(&Client::new(), &target("")).await;
        assert!(!outcome.online);
    }
}
