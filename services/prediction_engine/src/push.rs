use async_trait::async_trait;
use serde_json::json;
use std::time::Duration;
use tracing::{debug, info};

use crate::config::PushConfig;
use crate::types::UserId;

#[derive(Debug, thiserror::Error)]
pub enum PushError {
    #[error("Push transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("Push server rejected the notification with status {status}: {body}")]
    Rejected { status: u16, body: String },
}

/// Fire-and-forget notification channel to a single user.
#[async_trait]
pub trait PushDispatcher: Send + Sync {
    async fn send(&self, user_id: UserId, alert: &str) -> Result<(), PushError>;
}

/// Sends notifications through a Parse Server `/push` endpoint, targeting the
/// installations registered for the user.
pub struct ParsePushDispatcher {
    client: reqwest::Client,
    push_url: String,
    application_id: String,
    master_key: String,
}

impl ParsePushDispatcher {
    pub fn new(server_url: &str, config: &PushConfig) -> Result<Self, PushError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self {
            client,
            push_url: format!("{}/push", server_url.trim_end_matches('/')),
            application_id: config.application_id.clone(),
            master_key: config.master_key.clone(),
        })
    }
}

#[async_trait]
impl PushDispatcher for ParsePushDispatcher {
    async fn send(&self, user_id: UserId, alert: &str) -> Result<(), PushError> {
        let body = json!({
            "where": { "userId": user_id.to_string() },
            "data": { "alert": alert },
        });

        let response = self
            .client
            .post(&self.push_url)
            .header("X-Parse-Application-Id", &self.application_id)
            .header("X-Parse-Master-Key", &self.master_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(PushError::Rejected {
                status: status.as_u16(),
                body,
            });
        }
        debug!("Sent push to user {}", user_id);
        Ok(())
    }
}

/// Dispatcher used when no push server is configured.
#[derive(Debug, Default)]
pub struct LogPushDispatcher;

#[async_trait]
impl PushDispatcher for LogPushDispatcher {
    async fn send(&self, user_id: UserId, alert: &str) -> Result<(), PushError> {
        info!("Push to user {}: {}", user_id, alert);
        Ok(())
    }
}
