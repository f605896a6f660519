use std::time::Duration;

use chrono::{DateTime, Utc};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PortState {
    Open,
    /// Refused or no answer within the timeout.
    Closed,
    Error,
}

impl std::fmt::Display for PortState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PortState::Open => write!(f, "open"),
            PortState::Closed => write!(f, "closed"),
            PortState::Error => write!(f, "error"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortResult {
    pub port: u16,
    pub state: PortState,
    pub error: Option<String>,
    pub elapsed: Duration,
}

impl PortResult {
    pub fn open(port: u16, elapsed: Duration) -> Self {
        Self {
            port,
            state: PortState::Open,
            error: None,
            elapsed,
        }
    }

    pub fn closed(port: u16, elapsed: Duration) -> Self {
        Self {
            port,
            state: PortState::Closed,
            error: None,
            elapsed,
        }
    }

    pub fn error(port: u16, message: impl Into<String>, elapsed: Duration) -> Self {
        Self {
            port,
            state: PortState::Error,
            error: Some(message.into()),
            elapsed,
        }
    }

    pub fn is_open(&self) -> bool {
        self.state == PortState::Open
    }
}

/// Snapshot of how far a scan has got, counted in completed probes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanProgress {
    pub attempted: usize,
    pub total: usize,
}

impl ScanProgress {
    pub fn percent(&self) -> usize {
        if self.total == 0 {
            return 100;
        }
        self.attempted * 100 / self.total
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanState {
    Init,
    Running,
    Completed,
    Interrupted,
}

impl ScanState {
    pub fn is_terminal(self) -> bool {
        matches!(self, ScanState::Completed | ScanState::Interrupted)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanSummary {
    /// Size of the requested range.
    pub total: usize,
    /// Ports that produced a result.
    pub scanned: usize,
    pub open: usize,
    pub closed: usize,
    pub errors: usize,
    pub open_ports: Vec<u16>,
    pub state: ScanState,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
}

impl ScanSummary {
    pub fn new(total: usize, start_time: DateTime<Utc>) -> Self {
        Self {
            total,
            scanned: 0,
            open: 0,
            closed: 0,
            errors: 0,
            open_ports: Vec::new(),
            state: ScanState::Init,
            start_time,
            end_time: start_time,
        }
    }

    /// Commutative: the final counts do not depend on completion order.
    pub fn record(&mut self, result: &PortResult) {
        self.scanned += 1;
        match result.state {
            PortState::Open => {
                self.open += 1;
                let idx = self.open_ports.partition_point(|p| *p < result.port);
                self.open_ports.insert(idx, result.port);
            }
            PortState::Closed => self.closed += 1,
            PortState::Error => self.errors += 1,
        }
    }

    pub fn interrupted(&self) -> bool {
        self.state == ScanState::Interrupted
    }

    pub fn duration(&self) -> chrono::Duration {
        self.end_time - self.start_time
    }
}
