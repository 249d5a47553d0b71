use async_trait::async_trait;
use reqwest::header::{HeaderName, HeaderValue};
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;

use crate::config::Config;
use crate::delivery::{Deliver, DeliveryOutcome, RemoteAck};
use crate::error::{FaxError, Result};
use crate::vcon::Vcon;

/// Longest response body kept for diagnostics
const MAX_BODY_CHARS: usize = 1024;

/// Response fields the conserver may use to echo an identifier
#[derive(Deserialize)]
struct AckBody {
    uuid: Option<String>,
    id: Option<String>,
}

/// HTTP client for a vCon conserver endpoint
///
/// POSTs the vCon as JSON, adds the token header when one is configured, and
/// forwards routing hints as a comma-joined `ingress_lists` query parameter.
pub struct ConserverClient {
    client: Client,
    url: String,
    auth: Option<(HeaderName, HeaderValue)>,
}

impl ConserverClient {
    pub fn new(
        url: impl Into<String>,
        header_name: &str,
        token: Option<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| FaxError::Config(format!("failed to build HTTP client: {}", e)))?;

        let auth = match token {
            Some(token) => {
                let name = HeaderName::from_bytes(header_name.as_bytes()).map_err(|e| {
                    FaxError::Config(format!("invalid header name {}: {}", header_name, e))
                })?;
                let mut value = HeaderValue::from_str(&token)
                    .map_err(|e| FaxError::Config(format!("invalid API token: {}", e)))?;
                value.set_sensitive(true);
                Some((name, value))
            }
            None => None,
        };

        Ok(Self {
            client,
            url: url.into(),
            auth,
        })
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        let token = config.api_token();
        if token.is_none() {
            log::warn!(
                "{} is not set; posting to the conserver without an API token",
                config.conserver.api_token_env
            );
        }
        Self::new(
            config.conserver.url.clone(),
            &config.conserver.header_name,
            token,
            config.request_timeout(),
        )
    }
}

fn truncate(body: &str) -> String {
    body.trim().chars().take(MAX_BODY_CHARS).collect()
}

#[async_trait]
impl Deliver for ConserverClient {
    async fn deliver(&self, record: &Vcon, routing: &[String]) -> DeliveryOutcome {
        log::info!("Posting vCon {} to {}", record.uuid, self.url);

        let mut request = self.client.post(&self.url).json(record);
        if let Some((name, value)) = &self.auth {
            request = request.header(name.clone(), value.clone());
        }
        if !routing.is_empty() {
            request = request.query(&[("ingress_lists", routing.join(","))]);
        }

        let response = match request.send().await {
            Ok(r) => r,
            Err(e) => {
                let cause = if e.is_timeout() {
                    format!("timeout: {}", e)
                } else {
                    e.to_string()
                };
                log::error!("Error posting vCon {} to {}: {}", record.uuid, self.url, cause);
                return DeliveryOutcome::Unreachable { cause };
            }
        };

        let status = response.status();
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "Unable to read response body".to_string());

        if status.is_success() {
            let correlation_id = serde_json::from_str::<AckBody>(&body)
                .ok()
                .and_then(|ack| ack.uuid.or(ack.id));
            log::info!(
                "Successfully posted vCon {} (status: {})",
                record.uuid,
                status.as_u16()
            );
            DeliveryOutcome::Delivered(RemoteAck {
                status: status.as_u16(),
                correlation_id,
            })
        } else {
            log::error!(
                "Failed to post vCon {} (status: {})",
                record.uuid,
                status.as_u16()
            );
            DeliveryOutcome::Rejected {
                status: status.as_u16(),
                body: truncate(&body),
            }
        }
    }
}
