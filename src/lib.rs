//! Tenant connections: per-tenant database connection lifecycle for multi-tenant school backends.

pub mod config;
pub mod connection;
pub mod error;
pub mod manager;
pub mod store;
pub mod tenant;

pub use config::{
    load_catalog_from_path, school_catalog, validate_catalog, EntityDefinition, Settings,
};
pub use connection::{
    BoundModel, ConnectionState, Connector, ModelBinder, ModelRegistrationOutcome, ModelRegistry,
    RegistrationReport, RegistrationStatus, TenantConnection, TenantResolution,
};
pub use error::{BindError, ConfigError, ConnectError, ResolveError};
pub use manager::{ActiveConnection, TenantConnectionManager};
pub use store::{PgConnector, PgTenantConnection};
pub use tenant::{ConnectionTarget, TenantIdentity};
