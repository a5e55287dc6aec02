// ── Device resolver ──
//
// Turns a caller-supplied identifier into a `DeviceRecord`. Sources are
// consulted in priority order and the first match wins:
//
//   1. in-memory cache (discovery results, recent connections)
//   2. persistent device store (expired entries are misses)
//   3. connection string: `name@host:port` or `host:port`
//   4. static configuration, by id or display name
//
// Discovery is never triggered from here.

use std::sync::Arc;

use chrono::Utc;
use dashmap::DashMap;
use tracing::{debug, warn};

use crate::config::StaticDevice;
use crate::error::ResolutionError;
use crate::model::{
    DIRECT_CONNECTION_NAME, DeviceKind, DeviceRecord, RecordSource, ordinal_id, parse_ordinal_id,
};
use crate::store::DeviceStore;

// ── Connection strings ───────────────────────────────────────────

/// Parsed `[name@]host:port`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub name: Option<String>,
    pub host: String,
    pub port: u16,
}

/// Parse a connection string.
///
/// Returns `None` when `input` does not look like one (no `:port` suffix),
/// and `Some(Err)` when it does but is malformed.
pub fn parse_connection_string(input: &str) -> Option<Result<Endpoint, ResolutionError>> {
    let input = input.trim();
    let (head, port) = input.rsplit_once(':')?;
    if port.is_empty() || !port.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }

    let invalid = |reason: &str| ResolutionError::InvalidConnectionString {
        input: input.to_owned(),
        reason: reason.to_owned(),
    };

    let (name, host) = match head.split_once('@') {
        Some((name, host)) => (Some(name.trim()), host.trim()),
        None => (None, head.trim()),
    };

    if name.is_some_and(str::is_empty) {
        return Some(Err(invalid("name before '@' is empty")));
    }
    if host.is_empty() || host.contains(['@', ':', '/']) {
        return Some(Err(invalid("host is empty or malformed")));
    }
    let port = match port.parse::<u16>() {
        Ok(p) if p > 0 => p,
        _ => return Some(Err(invalid("port must be between 1 and 65535"))),
    };

    Some(Ok(Endpoint {
        name: name.map(str::to_owned),
        host: host.to_owned(),
        port,
    }))
}

// ── Resolver ─────────────────────────────────────────────────────

pub struct Resolver {
    memory: DashMap<String, DeviceRecord>,
    store: Arc<DeviceStore>,
    static_records: Vec<DeviceRecord>,
    default_number: u32,
}

impl Resolver {
    pub fn new(store: Arc<DeviceStore>, static_devices: &[StaticDevice], default_number: u32) -> Self {
        Self {
            memory: DashMap::new(),
            store,
            static_records: materialize_static(static_devices, default_number),
            default_number,
        }
    }

    /// Resolve `identifier` against every source in priority order.
    pub async fn resolve(&self, identifier: &str) -> Result<DeviceRecord, ResolutionError> {
        let identifier = identifier.trim();
        if identifier.is_empty() {
            return Err(ResolutionError::not_found(identifier));
        }

        // 1. Memory
        if let Some(hit) = self.memory.get(identifier) {
            debug!(id = identifier, "resolved from memory cache");
            return Ok(hit.clone());
        }

        // 2. Persistent store
        if let Some(hit) = self.store.get(identifier).await {
            self.log_static_conflict(&hit);
            debug!(id = identifier, "resolved from device store");
            return Ok(hit);
        }

        // 3. Connection string
        if let Some(parsed) = parse_connection_string(identifier) {
            let record = self.from_endpoint(parsed?).await;
            return Ok(self.prefer_higher_priority(record).await);
        }

        // 4. Static configuration
        if let Some(hit) = self.static_records.iter().find(|r| {
            r.id == identifier || r.display_name.eq_ignore_ascii_case(identifier)
        }) {
            debug!(id = %hit.id, "resolved from static configuration");
            return Ok(hit.clone());
        }

        Err(ResolutionError::not_found(identifier))
    }

    /// Add or refresh a record in the in-memory cache.
    pub fn remember(&self, record: DeviceRecord) {
        if let Some(existing) = self.memory.get(&record.id) {
            if !existing.same_endpoint(&record) {
                warn!(
                    id = %record.id,
                    old = %existing.address(),
                    new = %record.address(),
                    "device id now points at a different endpoint"
                );
            }
        }
        self.memory.insert(record.id.clone(), record);
    }

    pub fn memory_records(&self) -> Vec<DeviceRecord> {
        let mut records: Vec<_> = self.memory.iter().map(|e| e.value().clone()).collect();
        records.sort_by(|a, b| a.id.cmp(&b.id));
        records
    }

    pub fn forget_memory(&self) {
        self.memory.clear();
    }

    pub fn static_records(&self) -> &[DeviceRecord] {
        &self.static_records
    }

    /// Every device any source knows about, deduplicated by id with the
    /// higher-priority source winning.
    pub async fn known(&self) -> Vec<DeviceRecord> {
        let mut out: Vec<DeviceRecord> = self.memory_records();
        for record in self.store.list().await.into_iter().chain(self.static_records.iter().cloned()) {
            if !out.iter().any(|r| r.id == record.id) {
                out.push(record);
            }
        }
        out
    }

    // ── Internals ────────────────────────────────────────────────

    async fn from_endpoint(&self, endpoint: Endpoint) -> DeviceRecord {
        let (id, kind, number) = match endpoint.name.as_deref() {
            Some(name) => match parse_ordinal_id(name) {
                Some((kind, number)) => (name.to_owned(), kind, number),
                None => (name.to_owned(), DeviceKind::Telescope, self.default_number),
            },
            None => match self.record_at(&endpoint.host, endpoint.port).await {
                Some(existing) => (existing.id, existing.kind, existing.number),
                None => (
                    self.next_free_ordinal().await,
                    DeviceKind::Telescope,
                    self.default_number,
                ),
            },
        };

        DeviceRecord {
            id,
            kind,
            number,
            host: endpoint.host,
            port: endpoint.port,
            display_name: endpoint
                .name
                .unwrap_or_else(|| DIRECT_CONNECTION_NAME.to_owned()),
            discovered_at: Utc::now(),
            source: RecordSource::ConnectionString,
        }
    }

    /// A known record on the same `host:port`, memory first.
    async fn record_at(&self, host: &str, port: u16) -> Option<DeviceRecord> {
        let same_address = |r: &DeviceRecord| r.host.eq_ignore_ascii_case(host) && r.port == port;

        let cached = self
            .memory
            .iter()
            .find(|e| same_address(e.value()))
            .map(|e| e.value().clone());
        match cached {
            Some(hit) => Some(hit),
            None => self.store.list().await.into_iter().find(|r| same_address(r)),
        }
    }

    /// Lowest `telescope_N` not taken in memory or the store.
    async fn next_free_ordinal(&self) -> String {
        let stored = self.store.list().await;
        let mut n = 1;
        loop {
            let candidate = ordinal_id(DeviceKind::Telescope, n);
            if !self.memory.contains_key(&candidate) && !stored.iter().any(|r| r.id == candidate) {
                return candidate;
            }
            n += 1;
        }
    }

    /// A connection-string record whose id is already bound to a different
    /// endpoint in a higher-priority source loses to that source.
    async fn prefer_higher_priority(&self, record: DeviceRecord) -> DeviceRecord {
        let cached = self.memory.get(&record.id).map(|hit| hit.clone());
        let existing = match cached {
            Some(hit) => Some(hit),
            None => self.store.get(&record.id).await,
        };

        match existing {
            Some(existing) if !existing.same_endpoint(&record) => {
                warn!(
                    id = %record.id,
                    kept = %existing.address(),
                    ignored = %record.address(),
                    source = %existing.source,
                    "id conflict: keeping higher-priority record; forget it to re-point"
                );
                existing
            }
            Some(existing) => {
                debug!(id = %record.id, "connection string matches known record");
                existing.with_source(RecordSource::ConnectionString)
            }
            None => {
                debug!(id = %record.id, address = %record.address(), "resolved from connection string");
                record
            }
        }
    }

    fn log_static_conflict(&self, winner: &DeviceRecord) {
        if let Some(loser) = self
            .static_records
            .iter()
            .find(|r| r.id == winner.id && !r.same_endpoint(winner))
        {
            warn!(
                id = %winner.id,
                kept = %winner.address(),
                ignored = %loser.address(),
                "id conflict between device store and static configuration"
            );
        }
    }
}

/// Assign ids to static entries. Unnamed entries become `telescope_N`
/// in listing order.
fn materialize_static(devices: &[StaticDevice], default_number: u32) -> Vec<DeviceRecord> {
    let now = Utc::now();
    let mut ordinal = 0;
    devices
        .iter()
        .map(|d| {
            let (id, kind, number) = match d.id {
                Some(ref id) => match parse_ordinal_id(id) {
                    Some((kind, number)) => (id.clone(), kind, number),
                    None => (id.clone(), DeviceKind::Telescope, default_number),
                },
                None => {
                    ordinal += 1;
                    (
                        ordinal_id(DeviceKind::Telescope, ordinal),
                        DeviceKind::Telescope,
                        default_number,
                    )
                }
            };
            DeviceRecord {
                id,
                kind,
                number,
                host: d.host.clone(),
                port: d.port,
                display_name: d.display_name.clone(),
                discovered_at: now,
                source: RecordSource::StaticConfig,
            }
        })
        .collect()
}
