//! In-memory record of forwarded requests
//!
//! Entries are appended when a forward completes, so their order is completion
//! order rather than arrival order. Nothing is ever removed or rewritten.

use chrono::{DateTime, Utc};
use hooktunnel_common::{TunnelRequest, validation::strip_control_chars};
use serde::Serialize;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

/// One completed forward
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActivityLogEntry {
    pub request_id: String,
    pub method: String,
    pub path: String,
    pub status: u16,
    pub duration_ms: u64,
    pub timestamp: DateTime<Utc>,
    /// The local service could not be reached
    pub failed: bool,
}

impl ActivityLogEntry {
    pub fn new(request: &TunnelRequest, status: u16, elapsed: Duration, failed: bool) -> Self {
        Self {
            request_id: request.request_id.clone(),
            method: strip_control_chars(&request.method).into_owned(),
            path: strip_control_chars(&request.path).into_owned(),
            status,
            duration_ms: elapsed.as_millis() as u64,
            timestamp: Utc::now(),
            failed,
        }
    }
}

/// Append-only activity log, cheap to clone and shared across forward tasks
#[derive(Debug, Clone, Default)]
pub struct ActivityLog {
    entries: Arc<RwLock<Vec<ActivityLogEntry>>>,
}

impl ActivityLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, entry: ActivityLogEntry) {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(entry);
    }

    /// Snapshot of all entries in completion order
    pub fn entries(&self) -> Vec<ActivityLogEntry> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn find(&self, request_id: &str) -> Option<ActivityLogEntry> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .find(|entry| entry.request_id == request_id)
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of forwards that never reached the local service
    pub fn failures(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|entry| entry.failed)
            .count()
    }
}
