pub mod range;
pub mod results;
pub mod tcp;

use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Instant;

use anyhow::{anyhow, Result};
use chrono::Utc;
use futures::{FutureExt, Stream};
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinSet;
use tokio::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::ConfigError;
use crate::network::Target;
pub use range::PortRange;
pub use results::{PortResult, PortState, ScanProgress, ScanState, ScanSummary};
pub use tcp::{Probe, TcpConnectProbe};

pub const DEFAULT_TIMEOUT_SECS: u64 = 3;
pub const DEFAULT_CONCURRENCY: usize = 100;
pub const DEFAULT_PROGRESS_INTERVAL: usize = 20;
/// Ranges up to this size never report progress.
pub const PROGRESS_THRESHOLD: usize = 50;

const EVENT_BUFFER: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanConfig {
    timeout: Duration,
    concurrency: usize,
    progress_interval: usize,
}

impl ScanConfig {
    pub fn new(timeout: Duration, concurrency: usize) -> Result<Self, ConfigError> {
        if timeout.is_zero() {
            return Err(ConfigError::InvalidTimeout { seconds: 0 });
        }
        if concurrency == 0 {
            return Err(ConfigError::InvalidConcurrency { value: 0 });
        }
        Ok(Self {
            timeout,
            concurrency,
            progress_interval: DEFAULT_PROGRESS_INTERVAL,
        })
    }

    /// Validates raw command line values.
    pub fn from_secs(timeout_secs: i64, concurrency: i64) -> Result<Self, ConfigError> {
        let secs = u64::try_from(timeout_secs)
            .ok()
            .filter(|s| *s > 0)
            .ok_or(ConfigError::InvalidTimeout { seconds: timeout_secs })?;
        let concurrency = usize::try_from(concurrency)
            .ok()
            .filter(|c| *c > 0)
            .ok_or(ConfigError::InvalidConcurrency { value: concurrency })?;
        Self::new(Duration::from_secs(secs), concurrency)
    }

    pub fn with_progress_interval(mut self, interval: usize) -> Result<Self, ConfigError> {
        if interval == 0 {
            return Err(ConfigError::InvalidProgressInterval);
        }
        self.progress_interval = interval;
        Ok(self)
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    pub fn progress_interval(&self) -> usize {
        self.progress_interval
    }
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            concurrency: DEFAULT_CONCURRENCY,
            progress_interval: DEFAULT_PROGRESS_INTERVAL,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanEvent {
    Started { total: usize },
    /// Emitted in completion order, not port order.
    Port(PortResult),
    Progress(ScanProgress),
    /// Always the last event of a scan.
    Finished(ScanSummary),
}

pub struct Scanner {
    config: ScanConfig,
    probe: Arc<dyn Probe>,
}

impl Scanner {
    pub fn new(config: ScanConfig) -> Self {
        Self::with_probe(config, TcpConnectProbe)
    }

    pub fn with_probe<P: Probe + 'static>(config: ScanConfig, probe: P) -> Self {
        Self {
            config,
            probe: Arc::new(probe),
        }
    }

    pub fn config(&self) -> &ScanConfig {
        &self.config
    }

    /// Starts scanning `range` on a background task and returns the event
    /// stream. Must be called from within a tokio runtime.
    ///
    /// At most `concurrency` probes are in flight at once. Once `cancel`
    /// fires no further ports are dispatched; probes already running finish
    /// normally and their results are still reported. Dropping the stream
    /// has the same effect as cancelling.
    pub fn run(&self, target: Target, range: PortRange, cancel: CancellationToken) -> ScanStream {
        let (tx, rx) = mpsc::channel(EVENT_BUFFER);
        let coordinator = Coordinator {
            target: Arc::new(target),
            range,
            config: self.config,
            probe: Arc::clone(&self.probe),
            cancel,
        };
        tokio::spawn(coordinator.drive(tx));
        ScanStream { events: rx }
    }
}

struct Coordinator {
    target: Arc<Target>,
    range: PortRange,
    config: ScanConfig,
    probe: Arc<dyn Probe>,
    cancel: CancellationToken,
}

impl Coordinator {
    async fn drive(self, events: mpsc::Sender<ScanEvent>) -> ScanSummary {
        let total = self.range.len();
        let mut summary = ScanSummary::new(total, Utc::now());
        summary.state = ScanState::Running;
        let mut consumer_gone = events.send(ScanEvent::Started { total }).await.is_err();

        debug!(
            host = %self.target,
            range = %self.range,
            concurrency = self.config.concurrency,
            "scan running"
        );

        let semaphore = Arc::new(Semaphore::new(self.config.concurrency));
        let mut tasks: JoinSet<PortResult> = JoinSet::new();
        let mut ports = self.range.iter();
        let mut next_port = ports.next();
        let mut stopped = false;

        loop {
            let can_dispatch = next_port.is_some() && !stopped && !consumer_gone;
            // Cancellation still counts while probes are in flight, even
            // after the last port has been handed out.
            let watch_cancel =
                !stopped && !consumer_gone && (next_port.is_some() || !tasks.is_empty());

            tokio::select! {
                biased;

                Some(joined) = tasks.join_next() => {
                    let result = match joined {
                        Ok(result) => result,
                        Err(e) => {
                            warn!(error = %e, "probe task aborted");
                            continue;
                        }
                    };

                    match result.state {
                        PortState::Error => warn!(
                            port = result.port,
                            error = result.error.as_deref().unwrap_or_default(),
                            "probe failed"
                        ),
                        state => debug!(port = result.port, %state, "probe finished"),
                    }

                    summary.record(&result);
                    let progress = self.progress_due(summary.scanned, total);

                    if !consumer_gone && events.send(ScanEvent::Port(result)).await.is_err() {
                        consumer_gone = true;
                    }
                    if let Some(progress) = progress {
                        if !consumer_gone && events.send(ScanEvent::Progress(progress)).await.is_err() {
                            consumer_gone = true;
                        }
                    }
                }

                _ = self.cancel.cancelled(), if watch_cancel => {
                    debug!(next_port, "cancellation requested, no further dispatch");
                    stopped = true;
                }

                permit = Arc::clone(&semaphore).acquire_owned(), if can_dispatch => {
                    let (Ok(permit), Some(port)) = (permit, next_port) else {
                        stopped = true;
                        continue;
                    };
                    if self.cancel.is_cancelled() {
                        stopped = true;
                        continue;
                    }
                    next_port = ports.next();
                    self.dispatch(&mut tasks, port, permit);
                }

                else => break,
            }
        }

        summary.state = if stopped || consumer_gone || self.cancel.is_cancelled() {
            ScanState::Interrupted
        } else {
            ScanState::Completed
        };
        summary.end_time = Utc::now();

        info!(
            host = %self.target,
            scanned = summary.scanned,
            open = summary.open,
            state = ?summary.state,
            "scan finished"
        );

        if !consumer_gone {
            let _ = events.send(ScanEvent::Finished(summary.clone())).await;
        }
        summary
    }

    fn dispatch(
        &self,
        tasks: &mut JoinSet<PortResult>,
        port: u16,
        permit: tokio::sync::OwnedSemaphorePermit,
    ) {
        let probe = Arc::clone(&self.probe);
        let target = Arc::clone(&self.target);
        let timeout = self.config.timeout;

        tasks.spawn(async move {
            // Held until the probe has released its socket.
            let _permit = permit;
            let started = Instant::now();
            AssertUnwindSafe(probe.probe(&target, port, timeout))
                .catch_unwind()
                .await
                .unwrap_or_else(|_| PortResult::error(port, "probe panicked", started.elapsed()))
        });
    }

    fn progress_due(&self, attempted: usize, total: usize) -> Option<ScanProgress> {
        if total > PROGRESS_THRESHOLD && attempted % self.config.progress_interval == 0 {
            Some(ScanProgress { attempted, total })
        } else {
            None
        }
    }
}

/// Live events of one scan. Not restartable: once `Finished` has been
/// yielded the stream ends.
pub struct ScanStream {
    events: mpsc::Receiver<ScanEvent>,
}

impl ScanStream {
    pub async fn next_event(&mut self) -> Option<ScanEvent> {
        self.events.recv().await
    }

    /// Drains the stream, buffering results and sorting them by port.
    pub async fn into_report(mut self) -> Result<ScanReport> {
        let mut results = Vec::new();
        let mut summary = None;

        while let Some(event) = self.events.recv().await {
            match event {
                ScanEvent::Port(result) => results.push(result),
                ScanEvent::Finished(s) => summary = Some(s),
                ScanEvent::Started { .. } | ScanEvent::Progress(_) => {}
            }
        }

        let summary =
            summary.ok_or_else(|| anyhow!("scan coordinator stopped before reporting a summary"))?;
        results.sort_by_key(|r| r.port);
        Ok(ScanReport { results, summary })
    }
}

impl Stream for ScanStream {
    type Item = ScanEvent;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.get_mut().events.poll_recv(cx)
    }
}

#[derive(Debug, Clone)]
pub struct ScanReport {
    /// Sorted by port.
    pub results: Vec<PortResult>,
    pub summary: ScanSummary,
}

impl ScanReport {
    pub fn state_of(&self, port: u16) -> Option<PortState> {
        self.results
            .binary_search_by_key(&port, |r| r.port)
            .ok()
            .map(|idx| self.results[idx].state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use futures::StreamExt;
    use std::collections::HashSet;
    use std::net::{IpAddr, Ipv4Addr};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    fn localhost() -> Target {
        Target::new("localhost", IpAddr::V4(Ipv4Addr::LOCALHOST))
    }

    fn config(concurrency: usize) -> ScanConfig {
        ScanConfig::new(Duration::from_millis(500), concurrency).unwrap()
    }

    /// Reports ports in `open` as open after a short sleep and tracks how
    /// many calls overlap.
    #[derive(Default)]
    struct FakeProbe {
        open: HashSet<u16>,
        delay: Duration,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
        started: Mutex<Vec<u16>>,
        cancel_at: Option<(u16, CancellationToken)>,
        fail: HashSet<u16>,
        panic_on: Option<u16>,
    }

    #[async_trait]
    impl Probe for Arc<FakeProbe> {
        async fn probe(&self, _target: &Target, port: u16, _timeout: Duration) -> PortResult {
            self.started.lock().unwrap().push(port);
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);

            if let Some((at, token)) = &self.cancel_at {
                if *at == port {
                    token.cancel();
                }
            }
            tokio::time::sleep(self.delay).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            if self.panic_on == Some(port) {
                panic!("boom");
            }
            if self.fail.contains(&port) {
                PortResult::error(port, "no route to host", Duration::ZERO)
            } else if self.open.contains(&port) {
                PortResult::open(port, Duration::ZERO)
            } else {
                PortResult::closed(port, Duration::ZERO)
            }
        }
    }

    #[test]
    fn test_config_validation() {
        assert!(matches!(
            ScanConfig::from_secs(0, 10),
            Err(ConfigError::InvalidTimeout { seconds: 0 })
        ));
        assert!(matches!(
            ScanConfig::from_secs(-3, 10),
            Err(ConfigError::InvalidTimeout { seconds: -3 })
        ));
        assert!(matches!(
            ScanConfig::from_secs(3, 0),
            Err(ConfigError::InvalidConcurrency { value: 0 })
        ));
        assert!(ScanConfig::default().with_progress_interval(0).is_err());

        let cfg = ScanConfig::from_secs(5, 8).unwrap();
        assert_eq!(cfg.timeout(), Duration::from_secs(5));
        assert_eq!(cfg.concurrency(), 8);
        assert_eq!(cfg.progress_interval(), DEFAULT_PROGRESS_INTERVAL);
    }

    #[tokio::test]
    async fn test_completed_scan_covers_every_port_once() {
        let probe = Arc::new(FakeProbe {
            open: HashSet::from([105, 110]),
            delay: Duration::from_millis(1),
            ..Default::default()
        });
        let scanner = Scanner::with_probe(config(7), Arc::clone(&probe));
        let range = PortRange::new(100, 160).unwrap();

        let report = scanner
            .run(localhost(), range, CancellationToken::new())
            .into_report()
            .await
            .unwrap();

        let ports: Vec<u16> = report.results.iter().map(|r| r.port).collect();
        assert_eq!(ports, range.iter().collect::<Vec<_>>());
        assert_eq!(report.summary.scanned, 61);
        assert_eq!(report.summary.total, 61);
        assert_eq!(report.summary.open, 2);
        assert_eq!(report.summary.open_ports, vec![105, 110]);
        assert_eq!(report.summary.state, ScanState::Completed);
        assert!(!report.summary.interrupted());
    }

    #[tokio::test]
    async fn test_in_flight_never_exceeds_concurrency() {
        let probe = Arc::new(FakeProbe {
            delay: Duration::from_millis(5),
            ..Default::default()
        });
        let scanner = Scanner::with_probe(config(4), Arc::clone(&probe));

        let report = scanner
            .run(localhost(), PortRange::new(1, 40).unwrap(), CancellationToken::new())
            .into_report()
            .await
            .unwrap();

        assert_eq!(report.summary.scanned, 40);
        let max = probe.max_in_flight.load(Ordering::SeqCst);
        assert!(max <= 4, "saw {max} probes in flight");
        assert!(max >= 2, "probes never overlapped");
    }

    #[tokio::test]
    async fn test_sequential_cancellation_stops_after_current_port() {
        let cancel = CancellationToken::new();
        let probe = Arc::new(FakeProbe {
            delay: Duration::from_millis(1),
            cancel_at: Some((25, cancel.clone())),
            ..Default::default()
        });
        let scanner = Scanner::with_probe(config(1), Arc::clone(&probe));

        let report = scanner
            .run(localhost(), PortRange::new(20, 40).unwrap(), cancel)
            .into_report()
            .await
            .unwrap();

        let ports: Vec<u16> = report.results.iter().map(|r| r.port).collect();
        assert_eq!(ports, (20..=25).collect::<Vec<_>>());
        assert_eq!(*probe.started.lock().unwrap(), (20..=25).collect::<Vec<_>>());
        assert!(report.summary.interrupted());
        assert_eq!(report.summary.total, 21);
        assert_eq!(report.summary.scanned, 6);
    }

    #[tokio::test]
    async fn test_cancel_during_last_port_is_interrupted() {
        let cancel = CancellationToken::new();
        let probe = Arc::new(FakeProbe {
            delay: Duration::from_millis(1),
            cancel_at: Some((25, cancel.clone())),
            ..Default::default()
        });
        let scanner = Scanner::with_probe(config(1), Arc::clone(&probe));

        let report = scanner
            .run(localhost(), PortRange::new(20, 25).unwrap(), cancel)
            .into_report()
            .await
            .unwrap();

        assert_eq!(report.summary.scanned, 6);
        assert_eq!(report.summary.state, ScanState::Interrupted);
        assert!(report.summary.interrupted());
    }

    #[tokio::test]
    async fn test_cancel_with_every_port_in_flight() {
        let cancel = CancellationToken::new();
        let probe = Arc::new(FakeProbe {
            delay: Duration::from_millis(200),
            ..Default::default()
        });
        let scanner = Scanner::with_probe(config(100), Arc::clone(&probe));
        let stream = scanner.run(localhost(), PortRange::new(1, 80).unwrap(), cancel.clone());

        tokio::time::sleep(Duration::from_millis(50)).await;
        cancel.cancel();
        let report = stream.into_report().await.unwrap();

        // In-flight probes still finish and keep their results.
        assert_eq!(report.summary.scanned, 80);
        assert_eq!(report.summary.state, ScanState::Interrupted);
    }

    #[tokio::test]
    async fn test_full_port_range_reports_each_port_once() {
        let scanner = Scanner::with_probe(config(256), Arc::new(FakeProbe::default()));

        let report = scanner
            .run(localhost(), PortRange::new(1, 65535).unwrap(), CancellationToken::new())
            .into_report()
            .await
            .unwrap();

        assert_eq!(report.summary.scanned, 65535);
        assert_eq!(report.results.len(), 65535);
        let unique: HashSet<u16> = report.results.iter().map(|r| r.port).collect();
        assert_eq!(unique.len(), 65535);
        assert_eq!(report.results.first().map(|r| r.port), Some(1));
        assert_eq!(report.results.last().map(|r| r.port), Some(65535));
        assert_eq!(report.summary.state, ScanState::Completed);
    }

    #[tokio::test]
    async fn test_concurrent_cancellation_reports_prefix() {
        let cancel = CancellationToken::new();
        let probe = Arc::new(FakeProbe {
            delay: Duration::from_millis(2),
            cancel_at: Some((30, cancel.clone())),
            ..Default::default()
        });
        let scanner = Scanner::with_probe(config(5), Arc::clone(&probe));

        let report = scanner
            .run(localhost(), PortRange::new(1, 1000).unwrap(), cancel)
            .into_report()
            .await
            .unwrap();

        let ports: Vec<u16> = report.results.iter().map(|r| r.port).collect();
        let n = ports.len() as u16;
        assert_eq!(ports, (1..=n).collect::<Vec<_>>());
        assert!(n >= 30);
        assert!(n < 30 + 5, "dispatched {n} ports after cancelling at 30");
        assert!(report.summary.interrupted());
    }

    #[tokio::test]
    async fn test_cancel_before_start_scans_nothing() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let probe = Arc::new(FakeProbe::default());
        let scanner = Scanner::with_probe(config(3), Arc::clone(&probe));

        let report = scanner
            .run(localhost(), PortRange::new(1, 10).unwrap(), cancel)
            .into_report()
            .await
            .unwrap();

        assert!(report.results.is_empty());
        assert!(probe.started.lock().unwrap().is_empty());
        assert_eq!(report.summary.state, ScanState::Interrupted);
    }

    #[tokio::test]
    async fn test_probe_errors_do_not_abort_scan() {
        let probe = Arc::new(FakeProbe {
            fail: HashSet::from([3, 4]),
            panic_on: Some(7),
            ..Default::default()
        });
        let scanner = Scanner::with_probe(config(2), Arc::clone(&probe));

        let report = scanner
            .run(localhost(), PortRange::new(1, 10).unwrap(), CancellationToken::new())
            .into_report()
            .await
            .unwrap();

        assert_eq!(report.summary.scanned, 10);
        assert_eq!(report.summary.errors, 3);
        assert_eq!(report.state_of(3), Some(PortState::Error));
        assert_eq!(report.state_of(7), Some(PortState::Error));
        assert_eq!(report.state_of(8), Some(PortState::Closed));
        assert_eq!(report.summary.state, ScanState::Completed);
    }

    #[tokio::test]
    async fn test_progress_cadence() {
        let probe = Arc::new(FakeProbe::default());
        let scanner = Scanner::with_probe(config(8), Arc::clone(&probe));

        let events: Vec<ScanEvent> = scanner
            .run(localhost(), PortRange::new(1, 100).unwrap(), CancellationToken::new())
            .collect::<Vec<_>>()
            .await;

        let progress: Vec<usize> = events
            .iter()
            .filter_map(|e| match e {
                ScanEvent::Progress(p) => Some(p.attempted),
                _ => None,
            })
            .collect();
        assert_eq!(progress, vec![20, 40, 60, 80, 100]);
        assert_eq!(events.first(), Some(&ScanEvent::Started { total: 100 }));
        assert!(matches!(events.last(), Some(ScanEvent::Finished(_))));
    }

    #[tokio::test]
    async fn test_small_range_has_no_progress() {
        let scanner = Scanner::with_probe(config(8), Arc::new(FakeProbe::default()));

        let events: Vec<ScanEvent> = scanner
            .run(localhost(), PortRange::new(1, 50).unwrap(), CancellationToken::new())
            .collect::<Vec<_>>()
            .await;

        assert!(!events.iter().any(|e| matches!(e, ScanEvent::Progress(_))));
        assert_eq!(events.len(), 52);
    }

    #[tokio::test]
    async fn test_single_port_range() {
        let scanner = Scanner::with_probe(config(4), Arc::new(FakeProbe::default()));

        let report = scanner
            .run(localhost(), PortRange::new(443, 443).unwrap(), CancellationToken::new())
            .into_report()
            .await
            .unwrap();

        assert_eq!(report.results.len(), 1);
        assert_eq!(report.results[0].port, 443);
    }
}
