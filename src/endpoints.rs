//! Candidate endpoint list with per-endpoint validity and lookup deadlines

use once_cell::sync::Lazy;
use parking_lot::RwLock;
use regex::Regex;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::TxDataConfig;
use crate::errors::TxDataError;

static HTTP_SCHEME: Lazy<Regex> = Lazy::new(|| Regex::new(r"^http").expect("static regex"));
static WS_SCHEME: Lazy<Regex> = Lazy::new(|| Regex::new(r"^wss?://").expect("static regex"));

/// Validity of a single endpoint within one engine instance
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndpointStatus {
    Valid,
    /// Node answered but does not hold the full ledger history
    InvalidHistory,
    /// Transport failed to connect, or errored later
    Unreachable,
}

#[derive(Debug, Clone)]
struct Endpoint {
    url: String,
    status: EndpointStatus,
}

/// Ordered endpoint list plus the lookup deadlines derived from it
#[derive(Debug)]
pub struct EndpointPool {
    endpoints: RwLock<Vec<Endpoint>>,
    endpoint_timeout: Duration,
    overall_timeout: Duration,
}

/// Trim, coerce `http(s)://` to `ws(s)://` and keep only websocket URLs
pub fn normalize_endpoint(raw: &str) -> Option<String> {
    let url = HTTP_SCHEME.replace(raw.trim(), "ws").into_owned();
    WS_SCHEME.is_match(&url).then_some(url)
}

impl EndpointPool {
    /// Build a pool from caller-supplied candidates
    ///
    /// Fails with [`TxDataError::EndpointsInvalid`] when no candidate is a
    /// websocket URL. The overall timeout is raised to
    /// `endpoint_timeout * (endpoints + 1)` when configured lower.
    pub fn new(
        candidates: &[String],
        endpoint_timeout_ms: u64,
        overall_timeout_ms: u64,
    ) -> Result<Self, TxDataError> {
        let endpoints: Vec<Endpoint> = candidates
            .iter()
            .filter_map(|raw| normalize_endpoint(raw))
            .map(|url| Endpoint {
                url,
                status: EndpointStatus::Valid,
            })
            .collect();

        if endpoints.is_empty() {
            return Err(TxDataError::EndpointsInvalid);
        }

        let endpoint_timeout_ms = endpoint_timeout_ms.max(1);
        let min_overall_ms = endpoint_timeout_ms.saturating_mul(endpoints.len() as u64 + 1);
        let overall_timeout_ms = if overall_timeout_ms < min_overall_ms {
            warn!(
                configured_ms = overall_timeout_ms,
                raised_ms = min_overall_ms,
                "Overall timeout raised to endpoint timeout * (endpoints + 1)"
            );
            min_overall_ms
        } else {
            overall_timeout_ms
        };

        debug!(
            endpoints = ?endpoints.iter().map(|e| e.url.as_str()).collect::<Vec<_>>(),
            endpoint_timeout_ms,
            overall_timeout_ms,
            "Endpoint pool ready"
        );

        Ok(Self {
            endpoints: RwLock::new(endpoints),
            endpoint_timeout: Duration::from_millis(endpoint_timeout_ms),
            overall_timeout: Duration::from_millis(overall_timeout_ms),
        })
    }

    /// Build a pool from a full configuration
    pub fn from_config(config: &TxDataConfig) -> Result<Self, TxDataError> {
        Self::new(
            &config.endpoints,
            config.endpoint_timeout_ms,
            config.overall_timeout_ms,
        )
    }

    pub fn len(&self) -> usize {
        self.endpoints.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.endpoints.read().is_empty()
    }

    pub fn url(&self, index: usize) -> Option<String> {
        self.endpoints.read().get(index).map(|e| e.url.clone())
    }

    pub fn status(&self, index: usize) -> Option<EndpointStatus> {
        self.endpoints.read().get(index).map(|e| e.status)
    }

    /// True while the endpoint may still take part in lookups
    pub fn is_valid(&self, index: usize) -> bool {
        self.status(index) == Some(EndpointStatus::Valid)
    }

    /// Permanently exclude an endpoint; the first reason recorded sticks
    pub fn invalidate(&self, index: usize, reason: EndpointStatus) {
        if reason == EndpointStatus::Valid {
            return;
        }
        let mut endpoints = self.endpoints.write();
        if let Some(endpoint) = endpoints.get_mut(index) {
            if endpoint.status == EndpointStatus::Valid {
                debug!(url = %endpoint.url, status = ?reason, "Endpoint invalidated");
                endpoint.status = reason;
            }
        }
    }

    /// Snapshot of `(url, status)` in preference order
    pub fn snapshot(&self) -> Vec<(String, EndpointStatus)> {
        self.endpoints
            .read()
            .iter()
            .map(|e| (e.url.clone(), e.status))
            .collect()
    }

    /// Drop every endpoint (engine shutdown)
    pub fn clear(&self) {
        self.endpoints.write().clear();
    }

    pub fn endpoint_timeout(&self) -> Duration {
        self.endpoint_timeout
    }

    pub fn overall_timeout(&self) -> Duration {
        self.overall_timeout
    }
}
