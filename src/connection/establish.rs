//! Connection establishment: target derivation plus bounded, backed-off connect attempts.

use crate::connection::handle::Connector;
use crate::error::{ConnectError, ResolveError};
use crate::tenant::{derive_target, ConnectionTarget, TenantIdentity};
use std::sync::Arc;
use std::time::Duration;

/// Driver-level timeouts handed to every attempt.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DriverTimeouts {
    pub server_selection: Duration,
    pub heartbeat: Duration,
    pub socket: Duration,
}

impl Default for DriverTimeouts {
    fn default() -> Self {
        DriverTimeouts {
            server_selection: Duration::from_secs(5),
            heartbeat: Duration::from_secs(10),
            socket: Duration::from_secs(45),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    /// Guard raced against each attempt, independent of the driver timeouts.
    pub connect_timeout: Duration,
    pub backoff_base: Duration,
    pub backoff_max: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            max_attempts: 3,
            connect_timeout: Duration::from_secs(5),
            backoff_base: Duration::from_millis(1000),
            backoff_max: Duration::from_millis(10_000),
        }
    }
}

impl RetryPolicy {
    /// Delay after the failed attempt with 0-based index `attempt`: `min(base * 2^attempt, max)`.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.checked_pow(attempt).unwrap_or(u32::MAX);
        self.backoff_base
            .checked_mul(factor)
            .unwrap_or(self.backoff_max)
            .min(self.backoff_max)
    }
}

/// A freshly opened connection and where it points.
#[derive(Debug)]
pub struct Established<H> {
    pub connection: H,
    pub target: ConnectionTarget,
    pub attempts: u32,
}

pub struct ConnectionEstablisher<C> {
    connector: Arc<C>,
    base_uri: String,
    policy: RetryPolicy,
    timeouts: DriverTimeouts,
}

impl<C: Connector> ConnectionEstablisher<C> {
    pub fn new(
        connector: Arc<C>,
        base_uri: impl Into<String>,
        policy: RetryPolicy,
        timeouts: DriverTimeouts,
    ) -> Self {
        ConnectionEstablisher {
            connector,
            base_uri: base_uri.into(),
            policy,
            timeouts,
        }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub async fn establish(
        &self,
        tenant: &TenantIdentity,
    ) -> Result<Established<C::Connection>, ResolveError> {
        let target = derive_target(tenant, &self.base_uri)?;
        let tenant_id = tenant.key()?;
        let max_attempts = self.policy.max_attempts.max(1);
        let mut last_error = None;

        for attempt in 0..max_attempts {
            if attempt > 0 {
                let delay = self.policy.backoff(attempt - 1);
                tracing::debug!(
                    tenant_id,
                    attempt = attempt + 1,
                    ?delay,
                    "backing off before reconnect"
                );
                tokio::time::sleep(delay).await;
            }
            match self.attempt(&target).await {
                Ok(connection) => {
                    tracing::info!(
                        tenant_id,
                        attempt = attempt + 1,
                        target = %target.redacted(),
                        "tenant connection established"
                    );
                    return Ok(Established {
                        connection,
                        target,
                        attempts: attempt + 1,
                    });
                }
                Err(e) => {
                    tracing::warn!(
                        tenant_id,
                        attempt = attempt + 1,
                        max_attempts,
                        error = %e,
                        "tenant connection attempt failed"
                    );
                    last_error = Some(e);
                }
            }
        }

        let last_error = last_error
            .unwrap_or_else(|| ConnectError::Unavailable("no attempt was made".into()));
        tracing::error!(
            tenant_id,
            attempts = max_attempts,
            error = %last_error,
            "tenant connection exhausted"
        );
        Err(ResolveError::ConnectionExhausted {
            tenant_id: tenant_id.to_string(),
            attempts: max_attempts,
            last_error: Arc::new(last_error),
        })
    }

    /// One attempt: ready, error, or the guard firing, whichever comes first.
    async fn attempt(&self, target: &ConnectionTarget) -> Result<C::Connection, ConnectError> {
        let guard = self.policy.connect_timeout;
        tokio::select! {
            biased;
            outcome = self.connector.connect(target, &self.timeouts) => outcome,
            _ = tokio::time::sleep(guard) => Err(ConnectError::Timeout(guard)),
        }
    }
}
