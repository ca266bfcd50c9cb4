use serde_json::json;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, info, warn};

const BROADCAST_ATTEMPTS: u32 = 3;
const BROADCAST_TIMEOUT: Duration = Duration::from_secs(10);

/// Relays broadcast text to the audience bot. Without a URL every broadcast is
/// dropped with a debug line.
#[derive(Clone)]
pub struct BroadcastNotifier {
  client: reqwest::Client,
  url: Option<String>,
}

impl BroadcastNotifier {
  pub fn new(url: &str) -> Self {
    let url = url.trim();
    let client = reqwest::Client::builder()
      .timeout(BROADCAST_TIMEOUT)
      .build()
      .unwrap_or_else(|e| {
        warn!("broadcast client falls back to defaults: {e}");
        reqwest::Client::new()
      });
    BroadcastNotifier {
      client,
      url: (!url.is_empty()).then(|| url.to_string()),
    }
  }

  pub fn disabled() -> Self {
    Self::new("")
  }

  pub fn is_enabled(&self) -> bool {
    self.url.is_some()
  }

  /// Posts `{type: "broadcast", message}`. Failures are logged and returned
  /// for the caller to ignore; they never change the command result.
  pub async fn broadcast(&self, message: &str) -> Result<(), String> {
    let Some(url) = self.url.as_deref() else {
      debug!("no audience endpoint configured, broadcast skipped");
      return Ok(());
    };
    let body = json!({ "type": "broadcast", "message": message });
    let mut last_err = String::new();
    for attempt in 0..BROADCAST_ATTEMPTS {
      if attempt > 0 {
        sleep(Duration::from_millis(500 * u64::from(attempt))).await;
      }
      match self.client.post(url).json(&body).send().await {
        Ok(resp) if resp.status().is_success() => {
          info!("broadcast relayed ({} chars)", message.chars().count());
          return Ok(());
        }
        Ok(resp) => {
          last_err = format!("broadcast rejected with {} (attempt {})", resp.status(), attempt + 1);
        }
        Err(e) => {
          last_err = format!("broadcast failed (attempt {}): {e}", attempt + 1);
        }
      }
      warn!("{last_err}");
    }
    Err(last_err)
  }
}
