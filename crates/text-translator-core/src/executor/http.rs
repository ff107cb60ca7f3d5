use reqwest::{Client, StatusCode};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::{debug, warn};

use crate::config::HttpConfig;
use crate::error::{Error, Result};

/// GET strategy sharing one HTTP session across all providers
#[derive(Clone)]
pub struct HttpExecutor {
    client: Client,
    limiter: Arc<Semaphore>,
}

impl HttpExecutor {
    /// Create the shared session with at most `max_in_flight` concurrent requests
    pub fn new(config: &HttpConfig, max_in_flight: usize) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(config.user_agent.as_str())
            .build()
            .map_err(|e| Error::HttpClient(e.to_string()))?;

        Ok(Self::with_client(client, max_in_flight))
    }

    pub fn with_client(client: Client, max_in_flight: usize) -> Self {
        Self {
            client,
            limiter: Arc::new(Semaphore::new(max_in_flight.max(1))),
        }
    }

    /// Fetch `url`, returning the body on 200 and an empty string otherwise.
    pub async fn get(&self, url: &str) -> String {
        // The semaphore is never closed, so the permit is always granted
        let _permit = self.limiter.acquire().await;

        debug!("GET {}", url);

        let response = match self.client.get(url).send().await {
            Ok(response) => response,
            Err(e) => {
                warn!("Request failed: {}", e);
                return String::new();
            }
        };

        let status = response.status();
        if status != StatusCode::OK {
            warn!("API error: {}", status);
            return String::new();
        }

        match response.text().await {
            Ok(body) => body,
            Err(e) => {
                warn!("Failed to read response body: {}", e);
                String::new()
            }
        }
    }
}
