//! In-memory connector and connection used by unit tests.

use crate::config::EntityDefinition;
use crate::connection::establish::DriverTimeouts;
use crate::connection::handle::{Connector, ModelBinder, TenantConnection};
use crate::connection::registrar::BoundModel;
use crate::error::{BindError, ConnectError};
use crate::tenant::ConnectionTarget;
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;

#[derive(Clone, Copy, Debug)]
pub enum BindScript {
    FailTimes(u32),
    AlwaysFail,
}

struct ConnState {
    live: AtomicBool,
    probes: AtomicUsize,
    closes: AtomicUsize,
    fail_close: AtomicBool,
    fail_all_binds: AtomicBool,
    bound: Mutex<HashSet<String>>,
    created_behind_our_back: Mutex<HashSet<String>>,
    scripts: Mutex<HashMap<String, BindScript>>,
}

#[derive(Clone)]
pub struct FakeConnection {
    state: Arc<ConnState>,
}

impl Default for FakeConnection {
    fn default() -> Self {
        FakeConnection {
            state: Arc::new(ConnState {
                live: AtomicBool::new(true),
                probes: AtomicUsize::new(0),
                closes: AtomicUsize::new(0),
                fail_close: AtomicBool::new(false),
                fail_all_binds: AtomicBool::new(false),
                bound: Mutex::new(HashSet::new()),
                created_behind_our_back: Mutex::new(HashSet::new()),
                scripts: Mutex::new(HashMap::new()),
            }),
        }
    }
}

impl std::fmt::Debug for FakeConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FakeConnection")
            .field("live", &self.state.live.load(Ordering::SeqCst))
            .finish()
    }
}

impl FakeConnection {
    pub fn kill(&self) {
        self.state.live.store(false, Ordering::SeqCst);
    }

    pub fn fail_close(&self) {
        self.state.fail_close.store(true, Ordering::SeqCst);
    }

    pub fn fail_all_binds(&self) {
        self.state.fail_all_binds.store(true, Ordering::SeqCst);
    }

    /// Script binds of `table` and of its aliases.
    pub fn script_bind(&self, table: &str, script: BindScript) {
        self.state.scripts.lock().unwrap().insert(table.to_string(), script);
    }

    /// The next lookup of `table` misses, then the table appears as if another binder created it.
    pub fn create_after_next_lookup(&self, table: &str) {
        self.state
            .created_behind_our_back
            .lock()
            .unwrap()
            .insert(table.to_string());
    }

    pub fn probes(&self) -> usize {
        self.state.probes.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.state.closes.load(Ordering::SeqCst)
    }

    pub fn bound_tables(&self) -> Vec<String> {
        let mut tables: Vec<String> = self.state.bound.lock().unwrap().iter().cloned().collect();
        tables.sort();
        tables
    }

    pub fn same_as(&self, other: &FakeConnection) -> bool {
        Arc::ptr_eq(&self.state, &other.state)
    }

    fn scripted_failure(&self, table: &str) -> bool {
        let mut scripts = self.state.scripts.lock().unwrap();
        let key = scripts
            .keys()
            .find(|k| table == k.as_str() || table.starts_with(&format!("{}__alias_", k)))
            .cloned();
        let Some(key) = key else {
            return false;
        };
        match scripts.get_mut(&key) {
            Some(BindScript::AlwaysFail) => true,
            Some(BindScript::FailTimes(n)) if *n > 0 => {
                *n -= 1;
                true
            }
            _ => false,
        }
    }
}

#[async_trait]
impl TenantConnection for FakeConnection {
    fn is_live(&self) -> bool {
        self.state.probes.fetch_add(1, Ordering::SeqCst);
        self.state.live.load(Ordering::SeqCst)
    }

    async fn close(&self) -> Result<(), ConnectError> {
        self.state.closes.fetch_add(1, Ordering::SeqCst);
        self.state.live.store(false, Ordering::SeqCst);
        if self.state.fail_close.load(Ordering::SeqCst) {
            return Err(ConnectError::Unavailable("close failed".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl ModelBinder for FakeConnection {
    async fn lookup_model(
        &self,
        entity: &EntityDefinition,
    ) -> Result<Option<BoundModel>, BindError> {
        let mut bound = self.state.bound.lock().unwrap();
        let found = bound.contains(&entity.table).then(|| BoundModel::for_entity(entity));
        if self.state.created_behind_our_back.lock().unwrap().remove(&entity.table) {
            bound.insert(entity.table.clone());
        }
        Ok(found)
    }

    async fn bind_model(&self, entity: &EntityDefinition) -> Result<BoundModel, BindError> {
        let fail_all = self.state.fail_all_binds.load(Ordering::SeqCst);
        if fail_all || self.scripted_failure(&entity.table) {
            return Err(BindError::Rejected(format!("bind of {} failed", entity.table)));
        }
        let mut bound = self.state.bound.lock().unwrap();
        if !bound.insert(entity.table.clone()) {
            return Err(BindError::Rejected(format!("{} already exists", entity.table)));
        }
        Ok(BoundModel::for_entity(entity))
    }

    async fn discard_model(&self, entity: &EntityDefinition) -> Result<(), BindError> {
        self.state.bound.lock().unwrap().remove(&entity.table);
        Ok(())
    }
}

#[derive(Clone, Copy, Debug)]
pub enum ConnectBehavior {
    Succeed,
    Refuse,
    Hang,
    FailFirst(u32),
}

pub struct FakeConnector {
    behavior: ConnectBehavior,
    delay: Mutex<Vec<(String, Duration)>>,
    connects: AtomicU32,
    attempt_times: Mutex<Vec<Instant>>,
    targets: Mutex<Vec<String>>,
    opened: Mutex<Vec<FakeConnection>>,
}

impl FakeConnector {
    pub fn new(behavior: ConnectBehavior) -> Self {
        FakeConnector {
            behavior,
            delay: Mutex::new(Vec::new()),
            connects: AtomicU32::new(0),
            attempt_times: Mutex::new(Vec::new()),
            targets: Mutex::new(Vec::new()),
            opened: Mutex::new(Vec::new()),
        }
    }

    /// Make connects whose URI contains `needle` take `delay` before resolving.
    pub fn delay_for(&self, needle: &str, delay: Duration) {
        self.delay.lock().unwrap().push((needle.to_string(), delay));
    }

    pub fn connects(&self) -> u32 {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn attempt_times(&self) -> Vec<Instant> {
        self.attempt_times.lock().unwrap().clone()
    }

    pub fn targets(&self) -> Vec<String> {
        self.targets.lock().unwrap().clone()
    }

    pub fn opened(&self) -> Vec<FakeConnection> {
        self.opened.lock().unwrap().clone()
    }
}

#[async_trait]
impl Connector for FakeConnector {
    type Connection = FakeConnection;

    async fn connect(
        &self,
        target: &ConnectionTarget,
        _timeouts: &DriverTimeouts,
    ) -> Result<FakeConnection, ConnectError> {
        let n = self.connects.fetch_add(1, Ordering::SeqCst);
        self.attempt_times.lock().unwrap().push(Instant::now());
        self.targets.lock().unwrap().push(target.uri.clone());

        let delay = self
            .delay
            .lock()
            .unwrap()
            .iter()
            .find(|(needle, _)| target.uri.contains(needle.as_str()))
            .map(|(_, d)| *d);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        match self.behavior {
            ConnectBehavior::Refuse => Err(ConnectError::Unavailable("connection refused".into())),
            ConnectBehavior::Hang => futures::future::pending().await,
            ConnectBehavior::FailFirst(k) if n < k => {
                Err(ConnectError::Unavailable("connection refused".into()))
            }
            ConnectBehavior::Succeed | ConnectBehavior::FailFirst(_) => {
                let conn = FakeConnection::default();
                self.opened.lock().unwrap().push(conn.clone());
                Ok(conn)
            }
        }
    }
}
