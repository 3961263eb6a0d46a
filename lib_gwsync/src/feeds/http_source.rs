//! # HTTP Gameweek Source
//!
//! The production [`GameweekSource`] over the data API:
//!
//! | Call             | Endpoint                                   |
//! |------------------|--------------------------------------------|
//! | `fetch_manifest` | `GET api/manifest`                         |
//! | `fetch_period`   | `GET api/data/{n}` (CSV text)              |
//! | `fetch_history`  | `GET api/historical?gameweeks=a,b,...`     |
//! | `fetch_status`   | `GET api/gameweek-status`                  |
//! | `fetch_fixtures` | `GET api/fixtures`                         |
//! | `fetch_chips`    | `GET api/chips`                            |
//!
//! Transport retries and timeouts come from the shared [`ApiClient`].

use async_trait::async_trait;
use serde_json::Value;

use crate::configs::SyncConfig;
use crate::error::SyncError;
use crate::feeds::manifest::Manifest;
use crate::feeds::source::{ChipsPayload, FixtureData, GameweekSource, HistoryBatch, PeriodStatus};
use crate::retrieve::ApiClient;

/// [`GameweekSource`] backed by the data API.
#[derive(Debug, Clone)]
pub struct HttpGameweekSource {
    client: ApiClient,
}

impl HttpGameweekSource {
    /// Wraps an existing client.
    pub fn new(client: ApiClient) -> Self {
        Self { client }
    }

    /// Builds the client from configuration.
    pub fn from_config(config: &SyncConfig) -> Result<Self, SyncError> {
        let client = ApiClient::new(
            &config.api_base,
            config.request_timeout(),
            config.http_max_retries,
        )?;
        Ok(Self::new(client))
    }
}

#[async_trait]
impl GameweekSource for HttpGameweekSource {
    async fn fetch_manifest(&self) -> Result<Manifest, SyncError> {
        let value: Value = self
            .client
            .get_json("api/manifest", &[])
            .await
            .map_err(|e| SyncError::Manifest(e.to_string()))?;
        Manifest::from_json(&value)
    }

    async fn fetch_period(&self, gameweek: u32) -> Result<String, SyncError> {
        self.client
            .get_text(&format!("api/data/{gameweek}"))
            .await
            .map_err(|e| SyncError::LivePeriodFetch {
                period: gameweek,
                reason: e.to_string(),
            })
    }

    async fn fetch_history(&self, gameweeks: &[u32]) -> Result<HistoryBatch, SyncError> {
        let list = gameweeks
            .iter()
            .map(u32::to_string)
            .collect::<Vec<_>>()
            .join(",");
        let value: Value = self
            .client
            .get_json("api/historical", &[("gameweeks", list)])
            .await
            .map_err(|e| SyncError::HistoricalPeriodFetch {
                periods: gameweeks.to_vec(),
                reason: e.to_string(),
            })?;
        HistoryBatch::from_json(&value).map_err(|e| SyncError::HistoricalPeriodFetch {
            periods: gameweeks.to_vec(),
            reason: e.to_string(),
        })
    }

    async fn fetch_status(&self) -> Result<PeriodStatus, SyncError> {
        Ok(self.client.get_json("api/gameweek-status", &[]).await?)
    }

    async fn fetch_fixtures(&self) -> Result<FixtureData, SyncError> {
        Ok(self.client.get_json("api/fixtures", &[]).await?)
    }

    async fn fetch_chips(&self) -> Result<Vec<Value>, SyncError> {
        let payload: ChipsPayload = self.client.get_json("api/chips", &[]).await?;
        Ok(payload.chips)
    }
}
