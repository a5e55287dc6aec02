// ── Discovery fan-out ──
//
// Runs every probe concurrently under one deadline. A probe that fails or
// overruns contributes nothing and is reported; the others still count.
// Results are merged in probe order, first id seen wins.

use std::collections::HashSet;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use futures_util::future::{BoxFuture, FutureExt, join_all};
use serde::Serialize;
use tracing::{debug, info, warn};

use orrery_api::{ManagementClient, TransportConfig};

use crate::config::StaticDevice;
use crate::model::{DeviceRecord, RecordSource, ordinal_id};

// ── Probe trait ──────────────────────────────────────────────────

/// One source of discovered devices.
pub trait Probe: Send + Sync {
    fn name(&self) -> &str;

    /// Find devices, finishing within roughly `budget`.
    fn probe(&self, budget: Duration) -> BoxFuture<'_, Result<Vec<DeviceRecord>, orrery_api::Error>>;
}

// ── Report ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
pub struct ProbeFailure {
    pub probe: String,
    pub reason: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct DiscoveryReport {
    pub devices: Vec<DeviceRecord>,
    pub failures: Vec<ProbeFailure>,
    pub elapsed_ms: u64,
}

/// Upper bound on the slack kept between a probe's own budget and the
/// overall deadline.
const DEADLINE_MARGIN: Duration = Duration::from_millis(250);

/// Budget handed to each probe. Probes bound their per-host checks by it,
/// so they return partial results before the overall deadline fires.
fn probe_budget(timeout: Duration) -> Duration {
    timeout.saturating_sub((timeout / 10).min(DEADLINE_MARGIN))
}

/// Run `probes` concurrently and merge their results.
pub async fn run_probes(probes: &[Arc<dyn Probe>], timeout: Duration) -> DiscoveryReport {
    let started = Instant::now();
    let budget = probe_budget(timeout);

    let outcomes = join_all(probes.iter().map(|probe| async move {
        let outcome = tokio::time::timeout(timeout, probe.probe(budget)).await;
        (probe.name().to_owned(), outcome)
    }))
    .await;

    let mut report = DiscoveryReport::default();
    let mut seen = HashSet::new();

    for (name, outcome) in outcomes {
        let records = match outcome {
            Ok(Ok(records)) => records,
            Ok(Err(e)) => {
                warn!(probe = %name, error = %e, "discovery probe failed");
                report.failures.push(ProbeFailure {
                    probe: name,
                    reason: e.to_string(),
                });
                continue;
            }
            Err(_elapsed) => {
                warn!(probe = %name, ?timeout, "discovery probe timed out");
                report.failures.push(ProbeFailure {
                    probe: name,
                    reason: format!("timed out after {timeout:?}"),
                });
                continue;
            }
        };

        debug!(probe = %name, count = records.len(), "discovery probe finished");
        for record in records {
            if seen.insert(record.id.clone()) {
                report.devices.push(record);
            } else if let Some(first) = report.devices.iter().find(|r| r.id == record.id) {
                if !first.same_endpoint(&record) {
                    warn!(
                        id = %record.id,
                        kept = %first.address(),
                        ignored = %record.address(),
                        "duplicate device id during discovery; keeping first"
                    );
                }
            }
        }
    }

    report.elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
    info!(
        devices = report.devices.len(),
        failed_probes = report.failures.len(),
        elapsed_ms = report.elapsed_ms,
        "discovery complete"
    );
    report
}

// ── Shared helpers ───────────────────────────────────────────────

/// Ask one Alpaca server for its devices.
async fn server_records(
    host: &str,
    port: u16,
    transport: &TransportConfig,
) -> Result<Vec<DeviceRecord>, orrery_api::Error> {
    let base = orrery_api::AlpacaClient::server_url(host, port)?;
    let mgmt = ManagementClient::new(base, transport)?;
    let now = Utc::now();

    Ok(mgmt
        .configured_devices()
        .await?
        .into_iter()
        .map(|d| DeviceRecord {
            id: ordinal_id(d.kind(), d.device_number),
            kind: d.kind(),
            number: d.device_number,
            host: host.to_owned(),
            port,
            display_name: d.device_name,
            discovered_at: now,
            source: RecordSource::NetworkDiscovery,
        })
        .collect())
}

/// Query several servers concurrently, each bounded by `budget`.
/// Unreachable servers are skipped.
async fn sweep(
    targets: Vec<(String, u16)>,
    budget: Duration,
    transport: &TransportConfig,
) -> Vec<DeviceRecord> {
    let results = join_all(targets.iter().map(|(host, port)| async move {
        match tokio::time::timeout(budget, server_records(host, *port, transport)).await {
            Ok(Ok(records)) => records,
            Ok(Err(e)) => {
                debug!(host = %host, port, error = %e, "no Alpaca server answered");
                Vec::new()
            }
            Err(_) => {
                debug!(host = %host, port, "Alpaca server check timed out");
                Vec::new()
            }
        }
    }))
    .await;
    results.into_iter().flatten().collect()
}

/// Loopback and private-range addresses.
pub(crate) fn is_local(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => v4.is_loopback() || v4.is_private() || v4.is_link_local(),
        IpAddr::V6(v6) => {
            v6.is_loopback() || (v6.segments()[0] & 0xfe00) == 0xfc00 || (v6.segments()[0] & 0xffc0) == 0xfe80
        }
    }
}

// ── UDP broadcast ────────────────────────────────────────────────

/// Alpaca UDP discovery followed by a management query per responder.
pub struct BroadcastProbe {
    pub transport: TransportConfig,
    pub local_only: bool,
}

impl Probe for BroadcastProbe {
    fn name(&self) -> &str {
        "udp_broadcast"
    }

    fn probe(&self, budget: Duration) -> BoxFuture<'_, Result<Vec<DeviceRecord>, orrery_api::Error>> {
        async move {
            // Half the budget listens, the rest queries responders.
            let listen = budget / 2;
            let servers = orrery_api::discovery::discover_servers(listen).await?;
            let targets = servers
                .into_iter()
                .filter(|addr| {
                    let keep = !self.local_only || is_local(addr.ip());
                    if !keep {
                        debug!(%addr, "ignoring non-local discovery responder");
                    }
                    keep
                })
                .map(|addr| (addr.ip().to_string(), addr.port()))
                .collect();
            Ok(sweep(targets, budget.saturating_sub(listen), &self.transport).await)
        }
        .boxed()
    }
}

// ── Known devices ────────────────────────────────────────────────

/// Direct checks of statically configured hosts.
pub struct KnownDevicesProbe {
    pub devices: Vec<StaticDevice>,
    pub transport: TransportConfig,
}

impl Probe for KnownDevicesProbe {
    fn name(&self) -> &str {
        "known_devices"
    }

    fn probe(&self, budget: Duration) -> BoxFuture<'_, Result<Vec<DeviceRecord>, orrery_api::Error>> {
        async move {
            let mut targets: Vec<(String, u16)> = Vec::new();
            for d in &self.devices {
                if !targets.iter().any(|(h, p)| *h == d.host && *p == d.port) {
                    targets.push((d.host.clone(), d.port));
                }
            }
            Ok(sweep(targets, budget, &self.transport).await)
        }
        .boxed()
    }
}

// ── Loopback simulators ──────────────────────────────────────────

/// Checks well-known simulator ports on this machine.
pub struct LoopbackProbe {
    pub ports: Vec<u16>,
    pub transport: TransportConfig,
}

impl Probe for LoopbackProbe {
    fn name(&self) -> &str {
        "loopback"
    }

    fn probe(&self, budget: Duration) -> BoxFuture<'_, Result<Vec<DeviceRecord>, orrery_api::Error>> {
        async move {
            let targets = self
                .ports
                .iter()
                .map(|p| ("127.0.0.1".to_owned(), *p))
                .collect();
            Ok(sweep(targets, budget, &self.transport).await)
        }
        .boxed()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::model::DeviceKind;

    struct Fixed {
        name: &'static str,
        result: Result<Vec<DeviceRecord>, ()>,
        delay: Duration,
    }

    impl Probe for Fixed {
        fn name(&self) -> &str {
            self.name
        }

        fn probe(&self, _budget: Duration) -> BoxFuture<'_, Result<Vec<DeviceRecord>, orrery_api::Error>> {
            async move {
                tokio::time::sleep(self.delay).await;
                self.result.clone().map_err(|()| orrery_api::Error::Timeout { timeout_secs: 1 })
            }
            .boxed()
        }
    }

    fn record(id: &str, host: &str) -> DeviceRecord {
        DeviceRecord {
            id: id.into(),
            kind: DeviceKind::Telescope,
            number: 1,
            host: host.into(),
            port: 5555,
            display_name: id.into(),
            discovered_at: Utc::now(),
            source: RecordSource::NetworkDiscovery,
        }
    }

    fn fixed(name: &'static str, result: Result<Vec<DeviceRecord>, ()>) -> Arc<dyn Probe> {
        Arc::new(Fixed {
            name,
            result,
            delay: Duration::ZERO,
        })
    }

    #[tokio::test]
    async fn failing_probe_does_not_hide_others() {
        let probes = vec![
            fixed("a", Ok(vec![record("telescope_1", "10.0.0.1")])),
            fixed("broken", Err(())),
            fixed("b", Ok(vec![record("camera_1", "10.0.0.2")])),
        ];

        let report = run_probes(&probes, Duration::from_secs(1)).await;
        let ids: Vec<_> = report.devices.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["telescope_1", "camera_1"]);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].probe, "broken");
    }

    #[tokio::test]
    async fn slow_probe_times_out_without_blocking() {
        let probes: Vec<Arc<dyn Probe>> = vec![
            Arc::new(Fixed {
                name: "slow",
                result: Ok(vec![record("telescope_9", "10.0.0.9")]),
                delay: Duration::from_secs(5),
            }),
            fixed("fast", Ok(vec![record("telescope_1", "10.0.0.1")])),
        ];

        let report = run_probes(&probes, Duration::from_millis(100)).await;
        assert_eq!(report.devices.len(), 1);
        assert_eq!(report.devices[0].id, "telescope_1");
        assert!(report.failures[0].reason.contains("timed out"));
    }

    #[test]
    fn probes_get_less_than_the_deadline() {
        assert_eq!(probe_budget(Duration::from_millis(300)), Duration::from_millis(270));
        assert_eq!(probe_budget(Duration::from_secs(5)), Duration::from_millis(4750));
        assert_eq!(probe_budget(Duration::ZERO), Duration::ZERO);
    }

    async fn alpaca_server(delay: Duration) -> wiremock::MockServer {
        use wiremock::matchers::{method, path};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/management/v1/configureddevices"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({
                        "Value": [{
                            "DeviceName": "Seestar S50",
                            "DeviceType": "Telescope",
                            "DeviceNumber": 0,
                            "UniqueID": "abc",
                        }],
                        "ErrorNumber": 0,
                        "ErrorMessage": "",
                    }))
                    .set_delay(delay),
            )
            .mount(&server)
            .await;
        server
    }

    fn static_device(server: &wiremock::MockServer, name: &str) -> StaticDevice {
        StaticDevice {
            id: None,
            host: "127.0.0.1".into(),
            port: server.address().port(),
            display_name: name.into(),
        }
    }

    #[tokio::test]
    async fn slow_known_host_keeps_fast_hosts() {
        let fast = alpaca_server(Duration::ZERO).await;
        let slow = alpaca_server(Duration::from_secs(3)).await;

        let probes: Vec<Arc<dyn Probe>> = vec![Arc::new(KnownDevicesProbe {
            devices: vec![static_device(&fast, "fast"), static_device(&slow, "slow")],
            transport: TransportConfig::default(),
        })];

        for _ in 0..5 {
            let report = run_probes(&probes, Duration::from_millis(300)).await;
            assert!(report.failures.is_empty(), "{:?}", report.failures);
            assert_eq!(report.devices.len(), 1);
            assert_eq!(report.devices[0].port, fast.address().port());
        }
    }

    #[tokio::test]
    async fn duplicate_ids_keep_first_seen() {
        let probes = vec![
            fixed("first", Ok(vec![record("telescope_1", "10.0.0.1")])),
            fixed("second", Ok(vec![record("telescope_1", "10.0.0.2")])),
        ];

        let report = run_probes(&probes, Duration::from_secs(1)).await;
        assert_eq!(report.devices.len(), 1);
        assert_eq!(report.devices[0].host, "10.0.0.1");
    }

    #[test]
    fn local_ranges() {
        assert!(is_local("127.0.0.1".parse().unwrap()));
        assert!(is_local("192.168.1.5".parse().unwrap()));
        assert!(is_local("10.1.2.3".parse().unwrap()));
        assert!(!is_local("8.8.8.8".parse().unwrap()));
        assert!(is_local("::1".parse().unwrap()));
        assert!(is_local("fd00::1".parse().unwrap()));
        assert!(!is_local("2001:db8::1".parse().unwrap()));
    }
}
