use std::io;

/// Invalid scan parameters. Always raised before any network activity.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Ports must be between 1 and 65535 (got {port})")]
    PortOutOfRange { port: i64 },
    #[error("Start port must be less than or equal to end port ({start} > {end})")]
    StartAfterEnd { start: u16, end: u16 },
    #[error("Timeout must be a positive integer (got {seconds})")]
    InvalidTimeout { seconds: i64 },
    #[error("Concurrency must be at least 1 (got {value})")]
    InvalidConcurrency { value: i64 },
    #[error("Progress interval must be at least 1")]
    InvalidProgressInterval,
}

#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    #[error("Hostname must not be empty")]
    EmptyHostname,
    #[error("Unable to resolve hostname '{hostname}': {source}")]
    Lookup {
        hostname: String,
        #[source]
        source: io::Error,
    },
    #[error("No IP address found for hostname '{hostname}'")]
    NoAddress { hostname: String },
}
