//! Recording connector for facade tests.

use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tenant_connections::connection::DriverTimeouts;
use tenant_connections::{
    BindError, BoundModel, ConnectError, ConnectionTarget, Connector, EntityDefinition, ModelBinder,
    TenantConnection,
};

#[derive(Clone, Debug)]
pub struct RecordingConnection {
    pub uri: String,
    closes: Arc<AtomicUsize>,
    live: Arc<AtomicBool>,
    tables: Arc<Mutex<HashSet<String>>>,
    broken_tables: Arc<HashSet<String>>,
}

impl RecordingConnection {
    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TenantConnection for RecordingConnection {
    fn is_live(&self) -> bool {
        self.live.load(Ordering::SeqCst)
    }

    async fn close(&self) -> Result<(), ConnectError> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        self.live.store(false, Ordering::SeqCst);
        Ok(())
    }
}

#[async_trait]
impl ModelBinder for RecordingConnection {
    async fn lookup_model(
        &self,
        entity: &EntityDefinition,
    ) -> Result<Option<BoundModel>, BindError> {
        Ok(self
            .tables
            .lock()
            .unwrap()
            .contains(&entity.table)
            .then(|| BoundModel::for_entity(entity)))
    }

    async fn bind_model(&self, entity: &EntityDefinition) -> Result<BoundModel, BindError> {
        let broken = self
            .broken_tables
            .iter()
            .any(|t| entity.table == *t || entity.table.starts_with(&format!("{t}__alias_")));
        if broken {
            return Err(BindError::Rejected(format!("cannot create {}", entity.table)));
        }
        if !self.tables.lock().unwrap().insert(entity.table.clone()) {
            return Err(BindError::Rejected(format!("{} exists", entity.table)));
        }
        Ok(BoundModel::for_entity(entity))
    }

    async fn discard_model(&self, entity: &EntityDefinition) -> Result<(), BindError> {
        self.tables.lock().unwrap().remove(&entity.table);
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingConnector {
    pub refuse: bool,
    pub broken_tables: HashSet<String>,
    opened: Mutex<Vec<RecordingConnection>>,
    attempts: AtomicUsize,
}

impl RecordingConnector {
    pub fn refusing() -> Self {
        RecordingConnector {
            refuse: true,
            ..Default::default()
        }
    }

    pub fn with_broken_table(table: &str) -> Self {
        RecordingConnector {
            broken_tables: [table.to_string()].into_iter().collect(),
            ..Default::default()
        }
    }

    pub fn opened(&self) -> Vec<RecordingConnection> {
        self.opened.lock().unwrap().clone()
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

/// Lets the test keep a handle on the connector the manager owns.
#[derive(Clone, Default)]
pub struct SharedConnector(pub Arc<RecordingConnector>);

#[async_trait]
impl Connector for SharedConnector {
    type Connection = RecordingConnection;

    async fn connect(
        &self,
        target: &ConnectionTarget,
        _timeouts: &DriverTimeouts,
    ) -> Result<RecordingConnection, ConnectError> {
        let inner = &self.0;
        inner.attempts.fetch_add(1, Ordering::SeqCst);
        if inner.refuse {
            return Err(ConnectError::Unavailable(format!("{} refused", target.redacted())));
        }
        let conn = RecordingConnection {
            uri: target.uri.clone(),
            closes: Arc::new(AtomicUsize::new(0)),
            live: Arc::new(AtomicBool::new(true)),
            tables: Arc::new(Mutex::new(HashSet::new())),
            broken_tables: Arc::new(inner.broken_tables.clone()),
        };
        inner.opened.lock().unwrap().push(conn.clone());
        Ok(conn)
    }
}
