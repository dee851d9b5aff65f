//! The one entry point request handlers use to get a tenant's connection and models.

use crate::config::{EntityDefinition, Settings};
use crate::connection::{
    ConnectionCache, ConnectionEstablisher, ConnectionState, Connector, TenantResolution,
};
use crate::error::ResolveError;
use crate::store::PgConnector;
use crate::tenant::TenantIdentity;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;

/// Snapshot of a Ready cached connection, safe to log or serialize (credentials redacted).
#[derive(Clone, Debug, Serialize)]
pub struct ActiveConnection {
    pub tenant_id: String,
    pub database: Option<String>,
    pub target: String,
    pub connected_at: DateTime<Utc>,
    pub last_refreshed_at: DateTime<Utc>,
    pub models: Vec<String>,
}

/// Construct once at startup and share (it is cheap to clone).
pub struct TenantConnectionManager<C: Connector = PgConnector> {
    cache: ConnectionCache<C>,
}

impl<C: Connector> Clone for TenantConnectionManager<C> {
    fn clone(&self) -> Self {
        TenantConnectionManager {
            cache: self.cache.clone(),
        }
    }
}

impl TenantConnectionManager<PgConnector> {
    /// PostgreSQL-backed manager.
    pub fn postgres(settings: &Settings, entities: Vec<EntityDefinition>) -> Self {
        Self::new(PgConnector, settings, entities)
    }
}

impl<C: Connector> TenantConnectionManager<C> {
    pub fn new(connector: C, settings: &Settings, entities: Vec<EntityDefinition>) -> Self {
        let establisher = ConnectionEstablisher::new(
            Arc::new(connector),
            settings.base_uri.clone(),
            settings.retry.clone(),
            settings.driver.clone(),
        );
        TenantConnectionManager {
            cache: ConnectionCache::new(establisher, entities, settings.cache.clone()),
        }
    }

    /// Cached connection and models for the tenant, establishing them if needed.
    ///
    /// Only `InvalidTenant` and `ConnectionExhausted` are returned. An empty model registry is
    /// still a success; check `models.is_empty()` if every entity is required.
    pub async fn resolve_tenant_connection(
        &self,
        tenant: &TenantIdentity,
    ) -> Result<TenantResolution<C::Connection>, ResolveError> {
        self.cache.resolve(tenant).await
    }

    pub fn peek_connection(&self, tenant_id: &str) -> Option<TenantResolution<C::Connection>> {
        self.cache.peek(tenant_id)
    }

    pub fn state_of(&self, tenant_id: &str) -> Option<ConnectionState> {
        self.cache.state_of(tenant_id)
    }

    /// Ready connections, sorted by tenant id.
    pub fn list_active(&self) -> Vec<ActiveConnection> {
        let mut active = Vec::new();
        self.cache.for_each_ready(|record| {
            active.push(ActiveConnection {
                tenant_id: record.tenant_id.clone(),
                database: record.target.database.clone(),
                target: record.target.redacted(),
                connected_at: record.connected_at,
                last_refreshed_at: record.refreshed_at,
                models: record.models.names(),
            })
        });
        active.sort_by(|a, b| a.tenant_id.cmp(&b.tenant_id));
        active
    }

    pub async fn invalidate(&self, tenant_id: &str) -> bool {
        self.cache.invalidate(tenant_id).await
    }

    /// Close everything; call at shutdown.
    pub async fn close_all(&self) -> usize {
        self.cache.close_all().await
    }
}
