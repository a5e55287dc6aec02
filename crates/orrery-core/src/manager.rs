// ── Connection manager ──
//
// Owns every live device connection. Resolves identifiers, opens sessions
// with bounded retry, caches one connection per id, persists records on
// successful connects, and gates command execution on the connection
// state machine:
//
//   Connecting -> Connected -> [Initializing ->] Ready <-> Busy
//   any -> Error;  Ready | Error -> Disconnected
//
// Constructed explicitly with `open()` (which reads the device store) and
// torn down with `shutdown()`. Cheaply cloneable.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use serde_json::{Value, json};
use tokio::sync::{Mutex, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use orrery_api::TransportConfig;

use crate::command::{Command, CommandResult};
use crate::config::ManagerConfig;
use crate::discovery::{
    BroadcastProbe, DiscoveryReport, KnownDevicesProbe, LoopbackProbe, Probe, run_probes,
};
use crate::error::{CommandError, ConnectionError, CoreError, ResolutionError};
use crate::model::{ConnectionInfo, ConnectionState, DeviceRecord};
use crate::resolver::Resolver;
use crate::retry::backoff;
use crate::session::{Capabilities, DeviceSession, DeviceStatus};
use crate::store::DeviceStore;

// ── Connection ───────────────────────────────────────────────────

/// One live device connection. Owned by the manager; callers hold `Arc`s.
#[derive(Debug)]
pub struct Connection {
    record: DeviceRecord,
    session: DeviceSession,
    state: watch::Sender<ConnectionState>,
    connected_at: DateTime<Utc>,
    last_activity: std::sync::Mutex<DateTime<Utc>>,
}

impl Connection {
    fn new(record: DeviceRecord, session: DeviceSession) -> Self {
        let (state, _) = watch::channel(ConnectionState::Connecting);
        let now = Utc::now();
        Self {
            record,
            session,
            state,
            connected_at: now,
            last_activity: std::sync::Mutex::new(now),
        }
    }

    pub fn id(&self) -> &str {
        &self.record.id
    }

    pub fn record(&self) -> &DeviceRecord {
        &self.record
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    pub fn info(&self) -> ConnectionInfo {
        ConnectionInfo {
            record: self.record.clone(),
            state: self.state(),
            connected_at: self.connected_at,
            last_activity: *self
                .last_activity
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner),
        }
    }

    fn set_state(&self, next: ConnectionState) {
        let prev = self.state.send_replace(next);
        if prev != next {
            debug!(id = %self.record.id, from = %prev, to = %next, "connection state changed");
        }
    }

    /// Atomically move `from -> to`; on mismatch return the state observed.
    fn transition(&self, from: ConnectionState, to: ConnectionState) -> Result<(), ConnectionState> {
        let mut observed = from;
        let changed = self.state.send_if_modified(|s| {
            if *s == from {
                *s = to;
                true
            } else {
                observed = *s;
                false
            }
        });
        if changed {
            debug!(id = %self.record.id, %from, %to, "connection state changed");
            Ok(())
        } else {
            Err(observed)
        }
    }

    /// Atomically mark closed unless a command is in flight.
    fn begin_close(&self) -> Result<(), ConnectionState> {
        let mut observed = ConnectionState::Disconnected;
        let changed = self.state.send_if_modified(|s| {
            observed = *s;
            if *s == ConnectionState::Busy {
                false
            } else {
                *s = ConnectionState::Disconnected;
                true
            }
        });
        if changed || observed == ConnectionState::Disconnected {
            Ok(())
        } else {
            Err(observed)
        }
    }

    fn touch(&self) {
        *self
            .last_activity
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner) = Utc::now();
    }
}

/// Holds a connection in a transient state (Busy, Initializing). Dropping
/// it unsettled, e.g. when the caller abandons the future, lands in Error.
struct StateGuard<'a> {
    conn: &'a Connection,
    settled: bool,
}

impl<'a> StateGuard<'a> {
    fn new(conn: &'a Connection) -> Self {
        Self {
            conn,
            settled: false,
        }
    }

    fn settle(mut self, next: ConnectionState) {
        self.conn.set_state(next);
        self.settled = true;
    }
}

impl Drop for StateGuard<'_> {
    fn drop(&mut self) {
        if !self.settled {
            warn!(id = %self.conn.id(), "operation abandoned mid-flight; marking connection as errored");
            self.conn.set_state(ConnectionState::Error);
        }
    }
}

// ── InitParams ───────────────────────────────────────────────────

/// Observer location and options for the Seestar start-up sequence.
#[derive(Debug, Clone, PartialEq)]
pub struct InitParams {
    pub latitude: f64,
    pub longitude: f64,
    pub move_arm: bool,
    pub time_zone: String,
}

impl InitParams {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
            move_arm: true,
            time_zone: "UTC".into(),
        }
    }
}

// ── DeviceInfo ───────────────────────────────────────────────────

/// Everything the manager knows about one device.
#[derive(Debug, Clone, Serialize)]
pub struct DeviceInfo {
    pub record: DeviceRecord,
    pub state: ConnectionState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub connection: Option<ConnectionInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub capabilities: Option<Capabilities>,
}

// ── ConnectionManager ────────────────────────────────────────────

#[derive(Clone)]
pub struct ConnectionManager {
    inner: Arc<ManagerInner>,
}

struct ManagerInner {
    config: ManagerConfig,
    transport: TransportConfig,
    store: Arc<DeviceStore>,
    resolver: Resolver,
    probes: Vec<Arc<dyn Probe>>,
    connections: DashMap<String, Arc<Connection>>,
    id_locks: DashMap<String, Arc<Mutex<()>>>,
    discovery_lock: Mutex<()>,
    cancel: CancellationToken,
}

impl ConnectionManager {
    /// Build a manager from configuration with the standard discovery
    /// probes. Loads the device store; store problems are logged, not fatal.
    pub async fn open(config: ManagerConfig) -> Self {
        let transport = TransportConfig::with_timeout(config.request_timeout);
        let probes = default_probes(&config, &transport);
        Self::with_probes(config, probes).await
    }

    /// Build a manager with a custom set of discovery probes.
    pub async fn with_probes(config: ManagerConfig, probes: Vec<Arc<dyn Probe>>) -> Self {
        let transport = TransportConfig::with_timeout(config.request_timeout);
        let store = Arc::new(DeviceStore::open(config.state_file.clone(), config.state_max_age).await);
        let resolver = Resolver::new(
            Arc::clone(&store),
            &config.static_devices,
            config.default_device_number,
        );

        debug!(
            probes = probes.len(),
            static_devices = config.static_devices.len(),
            "connection manager ready"
        );

        Self {
            inner: Arc::new(ManagerInner {
                config,
                transport,
                store,
                resolver,
                probes,
                connections: DashMap::new(),
                id_locks: DashMap::new(),
                discovery_lock: Mutex::new(()),
                cancel: CancellationToken::new(),
            }),
        }
    }

    pub fn config(&self) -> &ManagerConfig {
        &self.inner.config
    }

    pub fn store(&self) -> &Arc<DeviceStore> {
        &self.inner.store
    }

    // ── Resolution & discovery ───────────────────────────────────

    pub async fn resolve(&self, identifier: &str) -> Result<DeviceRecord, ResolutionError> {
        self.inner.resolver.resolve(identifier).await
    }

    /// Sweep every probe. `timeout` defaults to the configured value and is
    /// clamped to 30 seconds. Results land in the in-memory cache only.
    pub async fn discover(&self, timeout: Option<Duration>) -> DiscoveryReport {
        let timeout = ManagerConfig::clamp_discovery_timeout(
            timeout.unwrap_or(self.inner.config.discovery_timeout),
        );

        let _sweep = self.inner.discovery_lock.lock().await;
        let report = run_probes(&self.inner.probes, timeout).await;
        for record in &report.devices {
            self.inner.resolver.remember(record.clone());
        }
        report
    }

    /// Resolve `identifier` and describe it. Capabilities are read only when
    /// a usable connection already exists; no connection is opened.
    pub async fn device_info(&self, identifier: &str) -> Result<DeviceInfo, CoreError> {
        let record = match self.get_connection(identifier.trim()) {
            Some(conn) => conn.record().clone(),
            None => self.inner.resolver.resolve(identifier).await?,
        };

        let connection = self.get_connection(&record.id).map(|c| c.info());
        let capabilities = match self.readable(&record.id) {
            Ok(conn) => match conn.session.capabilities().await {
                Ok(caps) => Some(caps),
                Err(e) => {
                    debug!(id = %record.id, error = %e, "capability read failed");
                    None
                }
            },
            Err(_) => None,
        };

        Ok(DeviceInfo {
            state: self.get_state(&record.id),
            record,
            connection,
            capabilities,
        })
    }

    /// Everything known from memory, the store, and static config.
    pub async fn list_known(&self) -> Vec<DeviceRecord> {
        self.inner.resolver.known().await
    }

    // ── Connection lifecycle ─────────────────────────────────────

    /// Return a live connection for `identifier`, opening one if needed.
    ///
    /// A cached connection is returned without any network traffic. On a
    /// miss the identifier is resolved, the session opened (transient
    /// failures retried with backoff), and the record persisted.
    pub async fn connect(&self, identifier: &str) -> Result<Arc<Connection>, CoreError> {
        if let Some(conn) = self.live(identifier.trim()) {
            debug!(id = %conn.id(), "connection cache hit");
            return Ok(conn);
        }

        let record = self.inner.resolver.resolve(identifier).await?;

        let lock = self.id_lock(&record.id);
        let _opening = lock.lock().await;

        if let Some(conn) = self.live(&record.id) {
            debug!(id = %conn.id(), "connection cache hit after resolve");
            return Ok(conn);
        }
        if let Some((_, stale)) = self.inner.connections.remove(&record.id) {
            debug!(id = %record.id, state = %stale.state(), "replacing stale connection");
        }

        let session = match DeviceSession::for_record(&record, &self.inner.transport) {
            Ok(session) => session,
            Err(e) => {
                self.release_id_lock(&record.id, Some(&lock));
                return Err(unreachable_error(&record, 0, &e.to_string()));
            }
        };
        let conn = Arc::new(Connection::new(record.clone(), session));
        self.inner
            .connections
            .insert(record.id.clone(), Arc::clone(&conn));

        if let Err(err) = self.open_with_retry(&conn).await {
            conn.set_state(ConnectionState::Error);
            self.inner.connections.remove(&record.id);
            self.release_id_lock(&record.id, Some(&lock));
            return Err(err);
        }

        conn.set_state(ConnectionState::Connected);
        if !record.requires_initialization() {
            conn.set_state(ConnectionState::Ready);
        }

        self.persist(&record).await;
        info!(
            id = %record.id,
            address = %record.address(),
            kind = %record.kind,
            source = %record.source,
            "connected"
        );
        Ok(conn)
    }

    /// Run the start-up sequence on a connection that requires it.
    ///
    /// `Connected -> Initializing -> Ready`; failure leaves `Error`.
    pub async fn initialize(&self, id: &str, params: &InitParams) -> Result<Value, CoreError> {
        let conn = self.connection(id)?;
        if conn.state() == ConnectionState::Ready {
            debug!(id, "already initialized");
            return Ok(json!({ "already_initialized": true }));
        }

        let location = Command::Method {
            method: "set_user_location".into(),
            params: json!({ "lat": params.latitude, "lon": params.longitude }),
        };
        location.validate()?;
        let startup = Command::Action {
            name: "action_start_up_sequence".into(),
            parameters: json!({
                "lat": params.latitude,
                "lon": params.longitude,
                "move_arm": params.move_arm,
                "time_zone": params.time_zone,
            })
            .to_string(),
        };

        conn.transition(ConnectionState::Connected, ConnectionState::Initializing)
            .map_err(|state| state_error(id, state))?;
        let guard = StateGuard::new(&conn);
        conn.touch();

        let steps = async {
            conn.session.run(id, &location).await?;
            conn.session.run(id, &startup).await
        };

        match tokio::time::timeout(self.inner.config.command_timeout, steps).await {
            Ok(Ok(result)) => {
                guard.settle(ConnectionState::Ready);
                info!(id, "device initialized");
                Ok(result.into_value())
            }
            Ok(Err(err)) => {
                guard.settle(ConnectionState::Error);
                warn!(id, error = %err, "initialization failed");
                Err(err)
            }
            Err(_) => {
                guard.settle(ConnectionState::Error);
                Err(timeout_error(id, "initialize", self.inner.config.command_timeout))
            }
        }
    }

    /// Close the session and evict the connection. The store entry stays.
    pub async fn disconnect(&self, id: &str) -> Result<(), CoreError> {
        let conn = self.connection(id)?;
        conn.begin_close()
            .map_err(|state| state_error(id, state))?;
        self.inner.connections.remove(id);
        self.release_id_lock(id, None);

        if let Err(e) = conn.session.close().await {
            warn!(id, error = %e, "device did not acknowledge disconnect");
        }
        info!(id, "disconnected");
        Ok(())
    }

    /// Disconnect everything and stop pending retries.
    pub async fn shutdown(&self) {
        self.inner.cancel.cancel();
        let conns: Vec<Arc<Connection>> = self
            .inner
            .connections
            .iter()
            .map(|e| Arc::clone(e.value()))
            .collect();
        self.inner.connections.clear();

        for conn in conns {
            conn.set_state(ConnectionState::Disconnected);
            if let Err(e) = conn.session.close().await {
                debug!(id = %conn.id(), error = %e, "close during shutdown failed");
            }
        }
        debug!("connection manager shut down");
    }

    // ── Commands ─────────────────────────────────────────────────

    /// Execute `command` with the configured timeout.
    pub async fn execute(&self, id: &str, command: Command) -> Result<CommandResult, CoreError> {
        self.execute_with_timeout(id, command, self.inner.config.command_timeout)
            .await
    }

    /// Validate, claim (`Ready -> Busy`), run, and release.
    ///
    /// A second caller that finds the connection Busy fails immediately.
    /// Device-reported faults and timeouts leave the connection in `Error`.
    pub async fn execute_with_timeout(
        &self,
        id: &str,
        command: Command,
        timeout: Duration,
    ) -> Result<CommandResult, CoreError> {
        command.validate()?;

        let conn = self.connection(id)?;
        conn.transition(ConnectionState::Ready, ConnectionState::Busy)
            .map_err(|state| state_error(id, state))?;
        let guard = StateGuard::new(&conn);
        conn.touch();
        debug!(id, command = command.name(), "executing");

        match tokio::time::timeout(timeout, conn.session.run(id, &command)).await {
            Ok(Ok(result)) => {
                guard.settle(ConnectionState::Ready);
                Ok(result)
            }
            Ok(Err(err)) => {
                let faulted = matches!(
                    err,
                    CoreError::Command(CommandError::DeviceFault { .. } | CommandError::Transport { .. })
                );
                if faulted {
                    warn!(id, command = command.name(), error = %err, "command failed on device");
                    guard.settle(ConnectionState::Error);
                } else {
                    guard.settle(ConnectionState::Ready);
                }
                Err(err)
            }
            Err(_) => {
                guard.settle(ConnectionState::Error);
                warn!(id, command = command.name(), ?timeout, "command timed out");
                Err(timeout_error(id, command.name(), timeout))
            }
        }
    }

    /// Current per-kind readings. Allowed while Busy.
    pub async fn status(&self, id: &str) -> Result<DeviceStatus, CoreError> {
        let conn = self.readable(id)?;
        conn.session
            .status()
            .await
            .map_err(|e| CommandError::from_api(id, "status", &e).into())
    }

    /// Per-kind capability surface.
    pub async fn capabilities(&self, id: &str) -> Result<Capabilities, CoreError> {
        let conn = self.readable(id)?;
        conn.session
            .capabilities()
            .await
            .map_err(|e| CommandError::from_api(id, "capabilities", &e).into())
    }

    // ── Observation ──────────────────────────────────────────────

    /// State of `id`, `Disconnected` when it has no live connection.
    pub fn get_state(&self, id: &str) -> ConnectionState {
        self.inner
            .connections
            .get(id)
            .map_or(ConnectionState::Disconnected, |c| c.state())
    }

    pub fn subscribe_state(&self, id: &str) -> Option<watch::Receiver<ConnectionState>> {
        self.inner.connections.get(id).map(|c| c.subscribe())
    }

    pub fn get_connection(&self, id: &str) -> Option<Arc<Connection>> {
        self.inner
            .connections
            .get(id)
            .map(|c| Arc::clone(c.value()))
    }

    pub fn list_connected(&self) -> Vec<ConnectionInfo> {
        let mut infos: Vec<_> = self
            .inner
            .connections
            .iter()
            .map(|e| e.value().info())
            .collect();
        infos.sort_by(|a, b| a.record.id.cmp(&b.record.id));
        infos
    }

    /// Drop every persisted record and the in-memory cache.
    pub async fn forget_all(&self) -> Result<(), CoreError> {
        self.inner.resolver.forget_memory();
        self.inner.store.clear().await?;
        info!("forgot all known devices");
        Ok(())
    }

    // ── Internals ────────────────────────────────────────────────

    fn connection(&self, id: &str) -> Result<Arc<Connection>, CoreError> {
        self.get_connection(id).ok_or_else(|| {
            ConnectionError::NotConnected {
                id: id.to_owned(),
            }
            .into()
        })
    }

    fn readable(&self, id: &str) -> Result<Arc<Connection>, CoreError> {
        let conn = self.connection(id)?;
        match conn.state() {
            ConnectionState::Error | ConnectionState::Disconnected | ConnectionState::Connecting => {
                Err(state_error(id, conn.state()))
            }
            _ => Ok(conn),
        }
    }

    /// A cached connection that can be handed out as-is.
    fn live(&self, id: &str) -> Option<Arc<Connection>> {
        let conn = self.get_connection(id)?;
        let state = conn.state();
        (state.is_reusable() && state != ConnectionState::Connecting).then_some(conn)
    }

    fn id_lock(&self, id: &str) -> Arc<Mutex<()>> {
        Arc::clone(
            self.inner
                .id_locks
                .entry(id.to_owned())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .value(),
        )
    }

    /// Drop the open lock for `id` unless another caller is waiting on it.
    /// `held` is the caller's own handle, if it has one.
    fn release_id_lock(&self, id: &str, held: Option<&Arc<Mutex<()>>>) {
        let owners = 1 + usize::from(held.is_some());
        self.inner.id_locks.remove_if(id, |_, lock| {
            held.is_none_or(|h| Arc::ptr_eq(h, lock)) && Arc::strong_count(lock) <= owners
        });
    }

    async fn open_with_retry(&self, conn: &Connection) -> Result<(), CoreError> {
        let retry = &self.inner.config.connect_retry;
        let attempts = retry.attempts.max(1);
        let mut attempt = 0;

        loop {
            attempt += 1;
            match conn.session.open().await {
                Ok(()) => return Ok(()),
                Err(e) if e.is_transient() && attempt < attempts => {
                    let delay = backoff(attempt - 1, retry);
                    warn!(
                        id = %conn.id(),
                        attempt,
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        error = %e,
                        "connect attempt failed; retrying"
                    );
                    tokio::select! {
                        () = tokio::time::sleep(delay) => {}
                        () = self.inner.cancel.cancelled() => {
                            return Err(unreachable_error(conn.record(), attempt, "manager shut down"));
                        }
                    }
                }
                Err(e) => return Err(unreachable_error(conn.record(), attempt, &e.to_string())),
            }
        }
    }

    async fn persist(&self, record: &DeviceRecord) {
        let stamped = DeviceRecord {
            discovered_at: Utc::now(),
            ..record.clone()
        };
        if let Err(e) = self.inner.store.put(&stamped).await {
            debug!(id = %record.id, error = %e, "device record kept in memory only");
        }
        self.inner.resolver.remember(stamped);
    }
}

fn default_probes(config: &ManagerConfig, transport: &TransportConfig) -> Vec<Arc<dyn Probe>> {
    let mut probes: Vec<Arc<dyn Probe>> = Vec::new();
    if !config.skip_udp_discovery {
        probes.push(Arc::new(BroadcastProbe {
            transport: transport.clone(),
            local_only: config.local_only,
        }));
    }
    if !config.static_devices.is_empty() {
        probes.push(Arc::new(KnownDevicesProbe {
            devices: config.static_devices.clone(),
            transport: transport.clone(),
        }));
    }
    if !config.simulator_ports.is_empty() {
        probes.push(Arc::new(LoopbackProbe {
            ports: config.simulator_ports.clone(),
            transport: transport.clone(),
        }));
    }
    probes
}

fn unreachable_error(record: &DeviceRecord, attempts: u32, reason: &str) -> CoreError {
    ConnectionError::Unreachable {
        id: record.id.clone(),
        address: record.address(),
        attempts,
        reason: reason.to_owned(),
    }
    .into()
}

fn state_error(id: &str, state: ConnectionState) -> CoreError {
    let id = id.to_owned();
    match state {
        ConnectionState::Busy => ConnectionError::Busy { id },
        ConnectionState::Disconnected => ConnectionError::NotConnected { id },
        state => ConnectionError::NotReady { id, state },
    }
    .into()
}

fn timeout_error(id: &str, command: &str, timeout: Duration) -> CoreError {
    ConnectionError::Timeout {
        id: id.to_owned(),
        command: command.to_owned(),
        timeout_secs: timeout.as_secs(),
    }
    .into()
}
