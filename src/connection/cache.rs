//! Tenant -> connection cache with TTL recycling and single-flight establishment.
//!
//! Reuse rules for a Ready record:
//! - refreshed within `fast_path`: returned as is, no probe;
//! - younger than `max_age`: returned if the cheap probe says alive, otherwise marked Stale;
//! - `max_age` or older: recycled unconditionally.
//!
//! Anything else goes through one shared establishment per tenant. The establishment runs on its
//! own task, so it completes and publishes even if every caller waiting on it is dropped. The old
//! record is removed and closed before the new one is inserted, so readers see either the old
//! record, nothing, or the complete new record.

use crate::config::EntityDefinition;
use crate::connection::establish::ConnectionEstablisher;
use crate::connection::handle::{Connector, TenantConnection};
use crate::connection::health::{AgeBucket, HealthChecker, Liveness};
use crate::connection::record::{ConnectionState, TenantConnectionRecord};
use crate::connection::registrar::{register_all, ModelRegistry, RegistrationReport};
use crate::error::{ConnectError, ResolveError};
use crate::tenant::TenantIdentity;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures::future::{BoxFuture, FutureExt, Shared};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use uuid::Uuid;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CachePolicy {
    /// Reuse without probing when refreshed more recently than this.
    pub fast_path: Duration,
    /// Recycle unconditionally at this age.
    pub max_age: Duration,
    /// Upper bound on a graceful close during eviction.
    pub close_timeout: Duration,
}

impl Default for CachePolicy {
    fn default() -> Self {
        CachePolicy {
            fast_path: Duration::from_secs(30),
            max_age: Duration::from_secs(300),
            close_timeout: Duration::from_secs(5),
        }
    }
}

/// What `resolve` hands back: the connection plus its published model registry.
#[derive(Clone, Debug)]
pub struct TenantResolution<H> {
    pub tenant_id: String,
    /// Changes whenever the cache establishes a new connection for the tenant.
    pub connection_id: Uuid,
    pub connection: H,
    pub models: Arc<ModelRegistry>,
    pub registration: Arc<RegistrationReport>,
}

impl<H: Clone> TenantResolution<H> {
    fn from_record(record: &TenantConnectionRecord<H>) -> Self {
        TenantResolution {
            tenant_id: record.tenant_id.clone(),
            connection_id: record.connection_id,
            connection: record.connection.clone(),
            models: Arc::clone(&record.models),
            registration: Arc::clone(&record.registration),
        }
    }
}

type Flight<H> = Shared<BoxFuture<'static, Result<TenantResolution<H>, ResolveError>>>;

struct Inner<C: Connector> {
    establisher: ConnectionEstablisher<C>,
    entities: Arc<[EntityDefinition]>,
    health: HealthChecker,
    policy: CachePolicy,
    records: DashMap<String, TenantConnectionRecord<C::Connection>>,
    in_flight: DashMap<String, Flight<C::Connection>>,
    /// Exhausted establishments are remembered for `max_age`, then forgotten.
    failed: DashMap<String, Instant>,
}

/// Process-wide tenant connection cache. Cheap to clone; clones share state.
pub struct ConnectionCache<C: Connector> {
    inner: Arc<Inner<C>>,
}

impl<C: Connector> Clone for ConnectionCache<C> {
    fn clone(&self) -> Self {
        ConnectionCache {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<C: Connector> ConnectionCache<C> {
    pub fn new(
        establisher: ConnectionEstablisher<C>,
        entities: Vec<EntityDefinition>,
        policy: CachePolicy,
    ) -> Self {
        ConnectionCache {
            inner: Arc::new(Inner {
                establisher,
                entities: entities.into(),
                health: HealthChecker::new(policy.clone()),
                policy,
                records: DashMap::new(),
                in_flight: DashMap::new(),
                failed: DashMap::new(),
            }),
        }
    }

    pub fn policy(&self) -> &CachePolicy {
        &self.inner.policy
    }

    pub async fn resolve(
        &self,
        tenant: &TenantIdentity,
    ) -> Result<TenantResolution<C::Connection>, ResolveError> {
        let tenant_id = tenant.key()?.to_string();
        if let Some(hit) = self.inner.try_reuse(&tenant_id) {
            return Ok(hit);
        }

        let flight = match self.inner.in_flight.entry(tenant_id.clone()) {
            Entry::Occupied(e) => {
                tracing::debug!(tenant_id = %tenant_id, "joining in-flight tenant connection");
                e.get().clone()
            }
            Entry::Vacant(e) => {
                self.inner.failed.remove(&tenant_id);
                let flight = Inner::spawn_flight(&self.inner, tenant_id, tenant.clone());
                e.insert(flight.clone());
                flight
            }
        };
        flight.await
    }

    /// Cache-only lookup. Never probes, refreshes, or establishes.
    pub fn peek(&self, tenant_id: &str) -> Option<TenantResolution<C::Connection>> {
        let now = Instant::now();
        let record = self.inner.records.get(tenant_id.trim())?;
        (self.inner.effective_state(&record, now) == ConnectionState::Ready)
            .then(|| TenantResolution::from_record(&record))
    }

    /// `Connecting` while an establishment is in flight and nothing is published yet.
    pub fn state_of(&self, tenant_id: &str) -> Option<ConnectionState> {
        let tenant_id = tenant_id.trim();
        if let Some(record) = self.inner.records.get(tenant_id) {
            return Some(self.inner.effective_state(&record, Instant::now()));
        }
        if self.inner.in_flight.contains_key(tenant_id) {
            return Some(ConnectionState::Connecting);
        }
        let failed_at = *self.inner.failed.get(tenant_id)?;
        (failed_at.elapsed() < self.inner.policy.max_age).then_some(ConnectionState::Failed)
    }

    /// Visit every record that is currently Ready.
    pub fn for_each_ready<F>(&self, mut f: F)
    where
        F: FnMut(&TenantConnectionRecord<C::Connection>),
    {
        let now = Instant::now();
        for record in self.inner.records.iter() {
            if self.inner.effective_state(&record, now) == ConnectionState::Ready {
                f(&record);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.inner.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.records.is_empty()
    }

    /// Evict and close one tenant's record. Returns whether there was one.
    pub async fn invalidate(&self, tenant_id: &str) -> bool {
        self.inner.failed.remove(tenant_id.trim());
        self.inner.evict(tenant_id.trim(), "invalidated").await
    }

    /// Evict and close every record. Returns how many were closed.
    pub async fn close_all(&self) -> usize {
        let keys: Vec<String> = self.inner.records.iter().map(|r| r.key().clone()).collect();
        let closed = futures::future::join_all(keys.iter().map(|k| self.inner.evict(k, "shutdown")))
            .await
            .into_iter()
            .filter(|evicted| *evicted)
            .count();
        self.inner.failed.clear();
        tracing::info!(closed, "closed all tenant connections");
        closed
    }
}

impl<C: Connector> Inner<C> {
    /// Ready records past `max_age` report as Stale before anyone touches them.
    fn effective_state(
        &self,
        record: &TenantConnectionRecord<C::Connection>,
        now: Instant,
    ) -> ConnectionState {
        match record.state() {
            ConnectionState::Ready if self.health.age_bucket(record, now) == AgeBucket::Expired => {
                ConnectionState::Stale
            }
            state => state,
        }
    }

    fn try_reuse(&self, tenant_id: &str) -> Option<TenantResolution<C::Connection>> {
        let now = Instant::now();
        let mut record = self.records.get_mut(tenant_id)?;
        if record.state() != ConnectionState::Ready {
            return None;
        }
        match self.health.age_bucket(&record, now) {
            AgeBucket::Fresh => {
                tracing::debug!(tenant_id, "tenant connection fast path");
                record.touch(now);
                Some(TenantResolution::from_record(&record))
            }
            AgeBucket::Recent => match self.health.classify(&record, now) {
                Some(Liveness::Alive) => {
                    tracing::debug!(tenant_id, "tenant connection passed liveness check");
                    record.touch(now);
                    Some(TenantResolution::from_record(&record))
                }
                _ => {
                    tracing::warn!(tenant_id, "tenant connection failed liveness check");
                    record.transition(ConnectionState::Stale);
                    None
                }
            },
            AgeBucket::Expired => {
                let age = record.age(now);
                tracing::debug!(tenant_id, ?age, "tenant connection reached max age");
                record.transition(ConnectionState::Stale);
                None
            }
        }
    }

    /// Start the establishment on its own task. Waiters share its result.
    fn spawn_flight(
        this: &Arc<Self>,
        tenant_id: String,
        tenant: TenantIdentity,
    ) -> Flight<C::Connection> {
        let task = tokio::spawn(Arc::clone(this).refresh(tenant_id.clone(), tenant));
        async move {
            task.await.unwrap_or_else(|e| {
                tracing::error!(tenant_id = %tenant_id, error = %e, "tenant connection task ended");
                Err(ResolveError::ConnectionExhausted {
                    tenant_id,
                    attempts: 0,
                    last_error: Arc::new(ConnectError::Unavailable(format!(
                        "establishment task ended: {e}"
                    ))),
                })
            })
        }
        .boxed()
        .shared()
    }

    /// Body of a single-flight establishment. Clears its in-flight slot even if it unwinds.
    async fn refresh(
        self: Arc<Self>,
        tenant_id: String,
        tenant: TenantIdentity,
    ) -> Result<TenantResolution<C::Connection>, ResolveError> {
        let _slot = FlightSlot {
            inner: &self,
            tenant_id: &tenant_id,
        };
        let result = self.establish_and_publish(&tenant_id, &tenant).await;
        match &result {
            Ok(_) => {
                self.failed.remove(&tenant_id);
            }
            Err(_) => self.remember_failure(&tenant_id),
        }
        result
    }

    fn remember_failure(&self, tenant_id: &str) {
        let now = Instant::now();
        self.failed
            .retain(|_, failed_at| now.duration_since(*failed_at) < self.policy.max_age);
        self.failed.insert(tenant_id.to_string(), now);
    }

    async fn establish_and_publish(
        &self,
        tenant_id: &str,
        tenant: &TenantIdentity,
    ) -> Result<TenantResolution<C::Connection>, ResolveError> {
        // Another flight may have published between our miss and taking the slot.
        if let Some(hit) = self.try_reuse(tenant_id) {
            return Ok(hit);
        }
        self.evict(tenant_id, "stale").await;

        let established = self.establisher.establish(tenant).await?;
        let registration = register_all(&established.connection, &self.entities).await;
        tracing::info!(
            tenant_id,
            models = registration.registry.len(),
            failed = registration.report.failed().count(),
            "tenant models registered"
        );

        let mut record = TenantConnectionRecord::connecting(
            tenant_id,
            established.connection,
            established.target,
            registration.registry,
            registration.report,
        );
        record.transition(ConnectionState::Ready);
        let resolution = TenantResolution::from_record(&record);
        self.records.insert(tenant_id.to_string(), record);
        Ok(resolution)
    }

    async fn evict(&self, tenant_id: &str, reason: &'static str) -> bool {
        let Some((_, mut record)) = self.records.remove(tenant_id) else {
            return false;
        };
        record.transition(ConnectionState::Closed);
        let age = record.age(Instant::now());
        tracing::info!(tenant_id, reason, ?age, "evicting tenant connection");
        let timeout = self.policy.close_timeout;
        match tokio::time::timeout(timeout, record.connection.close()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::warn!(tenant_id, error = %e, "tenant connection close failed"),
            Err(_) => tracing::warn!(tenant_id, ?timeout, "tenant connection close timed out"),
        }
        true
    }
}

struct FlightSlot<'a, C: Connector> {
    inner: &'a Inner<C>,
    tenant_id: &'a str,
}

impl<C: Connector> Drop for FlightSlot<'_, C> {
    fn drop(&mut self) {
        self.inner.in_flight.remove(self.tenant_id);
    }
}
