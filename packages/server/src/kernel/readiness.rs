//! HTTP readiness probe for freshly provisioned stores.

use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;

use super::error::ReadinessError;
use super::traits::BaseReadinessProbe;

/// Per-request timeout; the overall deadline is the caller's `timeout`.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

pub struct ReadinessProbe {
    client: reqwest::Client,
}

impl ReadinessProbe {
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .expect("reqwest client options are static");
        Self { client }
    }
}

impl Default for ReadinessProbe {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BaseReadinessProbe for ReadinessProbe {
    async fn wait_for_http_ok(
        &self,
        url: &str,
        timeout: Duration,
        poll: Duration,
    ) -> Result<(), ReadinessError> {
        let deadline = Instant::now() + timeout;
        let mut last_error = String::from("unknown");

        while Instant::now() < deadline {
            match self.client.get(url).send().await {
                // Anything below 500 counts: a WordPress install answering
                // 30x/40x is up, it just is not fully configured yet.
                Ok(response) if response.status().as_u16() < 500 => return Ok(()),
                Ok(response) => last_error = format!("status={}", response.status().as_u16()),
                Err(e) => last_error = e.to_string(),
            }
            tokio::time::sleep(poll).await;
        }

        Err(ReadinessError::Timeout { last_error })
    }
}
