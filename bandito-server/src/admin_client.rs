use std::time::Duration;

use reqwest::Client;

use crate::models::message::Push;
use crate::routes::admin::BroadcastAck;

/// Local broadcasts are best effort: a slow or missing server must not hold
/// up the edit that triggered them.
pub const PUBLISH_TIMEOUT: Duration = Duration::from_millis(500);

/// Client for the loopback `POST /api/broadcast` endpoint.
#[derive(Clone)]
pub struct AdminClient {
    client: Client,
    base_url: String,
}

impl AdminClient {
    pub fn new(base_url: &str) -> Self {
        let client = Client::builder()
            .timeout(PUBLISH_TIMEOUT)
            .build()
            .unwrap_or_else(|e| {
                tracing::warn!("Falling back to default HTTP client: {}", e);
                Client::new()
            });
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub async fn broadcast(&self, push: &Push) -> Result<BroadcastAck, String> {
        let resp = self
            .client
            .post(format!("{}/api/broadcast", self.base_url))
            .json(push)
            .send()
            .await
            .map_err(|e| format!("Network error: {}", e))?;

        if !resp.status().is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(extract_error(&body));
        }

        resp.json::<BroadcastAck>()
            .await
            .map_err(|e| format!("Parse error: {}", e))
    }

    /// Broadcasts and logs the outcome. Never fails.
    pub async fn publish(&self, push: &Push) -> bool {
        match self.broadcast(push).await {
            Ok(_) => {
                tracing::debug!("Published {}", push.command);
                true
            }
            Err(e) => {
                tracing::warn!("Could not publish {}: {}", push.command, e);
                false
            }
        }
    }
}

fn extract_error(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v.get("error")?.as_str().map(|s| s.to_string()))
        .unwrap_or_else(|| body.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_error() {
        assert_eq!(extract_error(r#"{"error": "nope"}"#), "nope");
        assert_eq!(extract_error("plain"), "plain");
    }

    #[tokio::test]
    async fn test_publish_to_dead_server_is_non_fatal() {
        // Nothing listens on port 9 of the loopback interface.
        let client = AdminClient::new("http://127.0.0.1:9/");
        assert_eq!(client.base_url(), "http://127.0.0.1:9");
        let started = std::time::Instant::now();
        assert!(!client.publish(&Push::active_slot(None)).await);
        assert!(started.elapsed() < Duration::from_secs(5));
    }
}
