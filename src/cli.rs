use clap::Parser;

use crate::error::ConfigError;
use crate::scanner::{PortRange, ScanConfig, DEFAULT_CONCURRENCY, DEFAULT_TIMEOUT_SECS};

#[derive(Parser, Debug)]
#[command(name = "tcpsweep")]
#[command(version = "0.1.0")]
#[command(about = "Concurrent TCP connect port scanner for basic network diagnostics", long_about = None)]
#[command(after_help = "Examples:\n  tcpsweep google.com 80 443\n  tcpsweep -t 5 github.com 20 25\n  tcpsweep localhost 3000 3010")]
pub struct Cli {
    #[arg(help = "Hostname or IP address to scan")]
    pub hostname: String,

    #[arg(help = "First port of the range (1-65535)", allow_negative_numbers = true)]
    pub start_port: i64,

    #[arg(help = "Last port of the range (1-65535)", allow_negative_numbers = true)]
    pub end_port: i64,

    #[arg(short, long, default_value_t = DEFAULT_TIMEOUT_SECS as i64, allow_negative_numbers = true, help = "Connection timeout in seconds")]
    pub timeout: i64,

    #[arg(short, long, default_value_t = DEFAULT_CONCURRENCY as i64, allow_negative_numbers = true, help = "Maximum number of simultaneous connection attempts")]
    pub concurrency: i64,

    #[arg(long, help = "Also print closed ports")]
    pub show_closed: bool,

    #[arg(long, help = "Disable colored output")]
    pub no_color: bool,

    #[arg(short, long, help = "Enable debug logging on stderr")]
    pub verbose: bool,
}

impl Cli {
    pub fn scan_config(&self) -> Result<ScanConfig, ConfigError> {
        ScanConfig::from_secs(self.timeout, self.concurrency)
    }

    pub fn port_range(&self) -> Result<PortRange, ConfigError> {
        PortRange::new(self.start_port, self.end_port)
    }
}
