//! Cache bookkeeping for one tenant.

use crate::connection::registrar::{ModelRegistry, RegistrationReport};
use crate::tenant::ConnectionTarget;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tokio::time::Instant;
use uuid::Uuid;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    Connecting,
    Ready,
    Stale,
    Closed,
    Failed,
}

impl ConnectionState {
    /// Forward-only, except Ready <-> Stale.
    pub fn can_transition_to(self, next: ConnectionState) -> bool {
        use ConnectionState::*;
        matches!(
            (self, next),
            (Connecting, Ready)
                | (Connecting, Failed)
                | (Ready, Stale)
                | (Ready, Closed)
                | (Stale, Ready)
                | (Stale, Closed)
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ConnectionState::Connecting => "connecting",
            ConnectionState::Ready => "ready",
            ConnectionState::Stale => "stale",
            ConnectionState::Closed => "closed",
            ConnectionState::Failed => "failed",
        }
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One cached connection. Ages are measured on the tokio clock; the `*_at` wall-clock fields are
/// for reporting.
#[derive(Debug)]
pub struct TenantConnectionRecord<H> {
    pub tenant_id: String,
    pub connection_id: Uuid,
    pub connection: H,
    pub target: ConnectionTarget,
    pub created_at: Instant,
    pub last_refreshed_at: Instant,
    pub connected_at: DateTime<Utc>,
    pub refreshed_at: DateTime<Utc>,
    state: ConnectionState,
    pub models: Arc<ModelRegistry>,
    pub registration: Arc<RegistrationReport>,
}

impl<H> TenantConnectionRecord<H> {
    pub fn connecting(
        tenant_id: impl Into<String>,
        connection: H,
        target: ConnectionTarget,
        models: ModelRegistry,
        registration: RegistrationReport,
    ) -> Self {
        let now = Instant::now();
        let wall = Utc::now();
        TenantConnectionRecord {
            tenant_id: tenant_id.into(),
            connection_id: Uuid::new_v4(),
            connection,
            target,
            created_at: now,
            last_refreshed_at: now,
            connected_at: wall,
            refreshed_at: wall,
            state: ConnectionState::Connecting,
            models: Arc::new(models),
            registration: Arc::new(registration),
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Apply a transition if the state machine allows it. Returns whether it was applied.
    pub fn transition(&mut self, next: ConnectionState) -> bool {
        if self.state == next {
            return true;
        }
        if !self.state.can_transition_to(next) {
            tracing::warn!(
                tenant_id = %self.tenant_id,
                from = %self.state,
                to = %next,
                "rejected connection state transition"
            );
            return false;
        }
        self.state = next;
        true
    }

    pub fn age(&self, now: Instant) -> std::time::Duration {
        now.saturating_duration_since(self.created_at)
    }

    pub fn idle(&self, now: Instant) -> std::time::Duration {
        now.saturating_duration_since(self.last_refreshed_at)
    }

    pub fn touch(&mut self, now: Instant) {
        self.last_refreshed_at = now;
        self.refreshed_at = Utc::now();
    }
}
