//! Seams between the cache and a concrete database driver.

use crate::config::EntityDefinition;
use crate::connection::establish::DriverTimeouts;
use crate::connection::registrar::BoundModel;
use crate::error::{BindError, ConnectError};
use crate::tenant::ConnectionTarget;
use async_trait::async_trait;

/// A live connection owned by the cache. Clones share the same underlying connection.
#[async_trait]
pub trait TenantConnection: Clone + Send + Sync + 'static {
    /// Locally visible liveness; must not talk to the server.
    fn is_live(&self) -> bool;

    /// Graceful close. Called at most once per cached connection.
    async fn close(&self) -> Result<(), ConnectError>;
}

/// Binds logical entities onto a connection.
#[async_trait]
pub trait ModelBinder: Send + Sync {
    /// The already-bound model for this entity, if the connection has one.
    async fn lookup_model(
        &self,
        entity: &EntityDefinition,
    ) -> Result<Option<BoundModel>, BindError>;

    /// Bind the entity fresh. Fails if someone else bound it first.
    async fn bind_model(&self, entity: &EntityDefinition) -> Result<BoundModel, BindError>;

    /// Drop a binding; used for temporary aliases.
    async fn discard_model(&self, entity: &EntityDefinition) -> Result<(), BindError>;
}

/// Opens connections for the establisher. One call is one attempt; retries live above this trait.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    type Connection: TenantConnection + ModelBinder;

    async fn connect(
        &self,
        target: &ConnectionTarget,
        timeouts: &DriverTimeouts,
    ) -> Result<Self::Connection, ConnectError>;
}
