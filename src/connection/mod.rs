//! Per-tenant connection lifecycle: establish, register models, cache, health-check, recycle.

pub mod cache;
pub mod establish;
pub mod handle;
pub mod health;
pub mod record;
pub mod registrar;

#[cfg(test)]
pub(crate) mod testing;

pub use cache::{CachePolicy, ConnectionCache, TenantResolution};
pub use establish::{ConnectionEstablisher, DriverTimeouts, Established, RetryPolicy};
pub use handle::{Connector, ModelBinder, TenantConnection};
pub use health::{AgeBucket, HealthChecker, Liveness};
pub use record::{ConnectionState, TenantConnectionRecord};
pub use registrar::{
    register_all, register_entity, BoundModel, ModelRegistrationOutcome, ModelRegistry,
    Registration, RegistrationReport, RegistrationStatus,
};
