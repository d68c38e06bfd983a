//! HTTP preflight against the target before any browser is launched

use std::time::{Duration, Instant};

use tokio::time::sleep;
use tracing::{info, warn};

use crate::error::{E2eError, E2eResult};

const POLL_INTERVAL: Duration = Duration::from_millis(250);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Poll `url` until it answers with anything other than a server error.
///
/// Client errors count as reachable; only connection failures and 5xx keep
/// polling. Returns the status seen on success.
pub async fn wait_for_target(url: &str, timeout: Duration) -> E2eResult<u16> {
    let client = reqwest::Client::builder()
        .timeout(REQUEST_TIMEOUT.min(timeout.max(Duration::from_millis(100))))
        .build()?;

    let start = Instant::now();
    let mut attempts = 0u32;
    let mut last_error = String::from("no attempt made");

    loop {
        attempts += 1;

        match client.get(url).send().await {
            Ok(resp) if !resp.status().is_server_error() => {
                let status = resp.status().as_u16();
                info!("Target {} reachable ({}) after {} attempt(s)", url, status, attempts);
                return Ok(status);
            }
            Ok(resp) => {
                warn!("Preflight returned {}", resp.status());
                last_error = format!("server answered {}", resp.status());
            }
            Err(e) => {
                if attempts == 1 {
                    info!("Waiting for {} to become reachable...", url);
                }
                if !e.is_connect() {
                    warn!("Preflight error: {}", e);
                }
                last_error = e.to_string();
            }
        }

        if start.elapsed() + POLL_INTERVAL >= timeout {
            break;
        }
        sleep(POLL_INTERVAL).await;
    }

    Err(E2eError::SessionSetup(format!(
        "{} unreachable after {} attempt(s): {}",
        url, attempts, last_error
    )))
}
