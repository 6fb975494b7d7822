//! Google Calendar v3 client
//!
//! Inserts events with `POST {base_url}/calendars/{calendar_id}/events` and a
//! bearer token. The token comes from `CADENCE_CALENDAR_TOKEN`, the keychain,
//! or the OAuth token file written by Google's installed-app flow.

use async_trait::async_trait;
use reqwest::{Client, Url};
use serde::Deserialize;
use serde_json::json;
use std::path::PathBuf;

use super::{CalendarSync, SyncError, SyncReceipt};
use crate::config::CalendarConfig;
use crate::schedule::{Event, ScheduleArtifact};
use crate::secrets::{SecretStore, SecretString, CALENDAR_TOKEN};

pub struct GoogleCalendarClient {
    base_url: String,
    calendar_id: String,
    token_path: PathBuf,
    secrets: SecretStore,
    client: Client,
}

/// Subset of Google's `token.json`
#[derive(Debug, Deserialize)]
struct TokenFile {
    #[serde(alias = "access_token")]
    token: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InsertedEvent {
    #[serde(default)]
    html_link: Option<String>,
}

impl GoogleCalendarClient {
    pub fn new(config: &CalendarConfig, secrets: SecretStore) -> Self {
        Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            calendar_id: config.calendar_id.clone(),
            token_path: config.token_path.clone(),
            secrets,
            client: Client::new(),
        }
    }

    /// Events collection URL; the calendar id is percent-encoded as one
    /// path segment (group and holiday ids contain `#` and `@`)
    fn events_url(&self) -> Result<Url, SyncError> {
        let mut url = Url::parse(&self.base_url)
            .map_err(|e| SyncError::InvalidUrl(format!("{}: {}", self.base_url, e)))?;
        url.path_segments_mut()
            .map_err(|_| SyncError::InvalidUrl(self.base_url.clone()))?
            .pop_if_empty()
            .extend(["calendars", self.calendar_id.as_str(), "events"]);
        Ok(url)
    }

    fn resolve_token(&self) -> Result<SecretString, SyncError> {
        if let Ok(Some(token)) = self.secrets.lookup(CALENDAR_TOKEN) {
            return Ok(token);
        }

        let contents = std::fs::read_to_string(&self.token_path).map_err(|e| {
            SyncError::MissingToken(format!(
                "set CADENCE_CALENDAR_TOKEN or provide {} ({})",
                self.token_path.display(),
                e
            ))
        })?;
        let file: TokenFile = serde_json::from_str(&contents).map_err(|e| {
            SyncError::MissingToken(format!(
                "{} is not a valid token file: {}",
                self.token_path.display(),
                e
            ))
        })?;
        Ok(SecretString::new(file.token))
    }

    /// Google's insert payload for one event
    pub fn event_payload(event: &Event) -> serde_json::Value {
        let fmt = "%Y-%m-%dT%H:%M:%S";
        json!({
            "summary": event.title,
            "description": event.description,
            "start": {
                "dateTime": event.start.format(fmt).to_string(),
                "timeZone": event.timezone,
            },
            "end": {
                "dateTime": event.end.format(fmt).to_string(),
                "timeZone": event.timezone,
            },
        })
    }
}

#[async_trait]
impl CalendarSync for GoogleCalendarClient {
    fn name(&self) -> &str {
        "google"
    }

    async fn check_health(&self) -> bool {
        self.resolve_token().is_ok()
    }

    async fn sync(&self, artifact: &ScheduleArtifact) -> Result<SyncReceipt, SyncError> {
        let token = self.resolve_token()?;
        let url = self.events_url()?;
        let mut receipt = SyncReceipt::default();

        for (index, event) in artifact.events.iter().enumerate() {
            let response = self
                .client
                .post(url.clone())
                .bearer_auth(token.expose())
                .json(&Self::event_payload(event))
                .send()
                .await
                .map_err(|e| SyncError::Network(e.to_string()))?;

            let status = response.status();
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                tracing::warn!(
                    "Calendar rejected event {} ('{}'): {}",
                    index,
                    event.title,
                    status
                );
                return Err(SyncError::Rejected {
                    index,
                    status: status.as_u16(),
                    body,
                    partial: receipt,
                });
            }

            let inserted: InsertedEvent = response
                .json()
                .await
                .map_err(|e| SyncError::InvalidResponse(e.to_string()))?;

            receipt.created += 1;
            if let Some(link) = inserted.html_link {
                tracing::info!("Event created: {}", link);
                receipt.links.push(link);
            }
        }

        Ok(receipt)
    }
}
