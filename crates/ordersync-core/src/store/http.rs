//! Tracking cache reached through the tracking service's REST API.
//!
//! The service speaks the legacy contract: Spanish field names and status
//! values, a 404 for untracked orders, and no batch read endpoint, so
//! `list_all` fans out single reads with bounded concurrency.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use futures::stream::{self, StreamExt, TryStreamExt};
use reqwest::StatusCode;
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use super::{HistoryEntry, MirrorStats, StoreResult, TrackingCache, TrackingRecord};
use crate::error::StoreError;
use crate::types::{MirrorStatus, OrderId, Status};

/// In-flight single reads while serving `list_all`.
const LIST_CONCURRENCY: usize = 8;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TrackingInfo {
    estado: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct HistorialEntry {
    timestamp: String,
    estado_anterior: Option<String>,
    estado_nuevo: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Estadisticas {
    #[serde(default)]
    estados_distribucion: HashMap<String, usize>,
}

fn parse_status(raw: &str) -> StoreResult<Status> {
    raw.parse()
        .map_err(|_| StoreError::Corrupt(format!("unknown status '{raw}'")))
}

/// The service writes ISO local date-times without an offset; treat them as UTC.
fn parse_timestamp(raw: &str) -> StoreResult<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Ok(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .map(|naive| naive.and_utc())
        .map_err(|e| StoreError::Corrupt(format!("bad timestamp '{raw}': {e}")))
}

#[derive(Debug, Clone)]
pub struct HttpTrackingCache {
    client: reqwest::Client,
    base_url: String,
    timeout: Duration,
}

impl HttpTrackingCache {
    pub fn new(base_url: &str, timeout: Duration) -> StoreResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            timeout,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/api/tracking{path}", self.base_url)
    }

    fn transport_err(&self, e: reqwest::Error) -> StoreError {
        if e.is_timeout() {
            StoreError::Timeout(self.timeout)
        } else {
            StoreError::Unavailable(e.to_string())
        }
    }

    fn status_err(id: Option<OrderId>, status: StatusCode) -> StoreError {
        match (status, id) {
            (StatusCode::CONFLICT, Some(id)) => StoreError::Conflict(id),
            _ => StoreError::Unavailable(format!("tracking service answered {status}")),
        }
    }
}

#[async_trait]
impl TrackingCache for HttpTrackingCache {
    async fn get_status(&self, id: OrderId) -> StoreResult<MirrorStatus> {
        let resp = self
            .client
            .get(self.url(&format!("/{id}")))
            .send()
            .await
            .map_err(|e| self.transport_err(e))?;
        match resp.status() {
            StatusCode::NOT_FOUND => Ok(MirrorStatus::Absent),
            s if s.is_success() => {
                let info: TrackingInfo = resp
                    .json()
                    .await
                    .map_err(|e| StoreError::Corrupt(e.to_string()))?;
                Ok(MirrorStatus::Present(parse_status(&info.estado)?))
            }
            s => Err(Self::status_err(Some(id), s)),
        }
    }

    async fn list_all(&self, ids: &[OrderId]) -> StoreResult<HashMap<OrderId, Status>> {
        let pairs: Vec<(OrderId, MirrorStatus)> = stream::iter(ids.iter().copied())
            .map(|id| async move { self.get_status(id).await.map(|m| (id, m)) })
            .buffer_unordered(LIST_CONCURRENCY)
            .try_collect()
            .await?;
        Ok(pairs
            .into_iter()
            .filter_map(|(id, m)| m.status().map(|s| (id, s)))
            .collect())
    }

    async fn set_status(&self, id: OrderId, status: Status) -> StoreResult<TrackingRecord> {
        let resp = self
            .client
            .post(self.url(&format!("/{id}")))
            .json(&serde_json::json!({ "estado": status.legacy_name() }))
            .send()
            .await
            .map_err(|e| self.transport_err(e))?;
        if !resp.status().is_success() {
            return Err(Self::status_err(Some(id), resp.status()));
        }
        Ok(TrackingRecord {
            order_id: id,
            status,
            synced_at: Utc::now(),
        })
    }

    async fn history(&self, id: OrderId) -> StoreResult<Vec<HistoryEntry>> {
        let resp = self
            .client
            .get(self.url(&format!("/{id}/historial")))
            .send()
            .await
            .map_err(|e| self.transport_err(e))?;
        if !resp.status().is_success() {
            return Err(Self::status_err(None, resp.status()));
        }
        let raw: Vec<HistorialEntry> = resp
            .json()
            .await
            .map_err(|e| StoreError::Corrupt(e.to_string()))?;
        raw.into_iter()
            .map(|h| {
                Ok(HistoryEntry {
                    timestamp: parse_timestamp(&h.timestamp)?,
                    previous: h.estado_anterior.as_deref().map(parse_status).transpose()?,
                    status: parse_status(&h.estado_nuevo)?,
                })
            })
            .collect()
    }

    async fn stats(&self) -> StoreResult<MirrorStats> {
        let resp = self
            .client
            .get(self.url("/estadisticas"))
            .send()
            .await
            .map_err(|e| self.transport_err(e))?;
        if !resp.status().is_success() {
            return Err(Self::status_err(None, resp.status()));
        }
        let raw: Estadisticas = resp
            .json()
            .await
            .map_err(|e| StoreError::Corrupt(e.to_string()))?;

        let mut by_status = BTreeMap::new();
        for (name, count) in raw.estados_distribucion {
            *by_status.entry(parse_status(&name)?).or_insert(0) += count;
        }
        Ok(MirrorStats {
            total_tracked: by_status.values().sum(),
            by_status,
            generated_at: Utc::now(),
        })
    }
}
