//! Concurrent TCP connect port scanning.
//!
//! A scan resolves its target once with [`network::resolve`], then a
//! [`scanner::Scanner`] probes every port of a [`scanner::PortRange`] with at
//! most `concurrency` connection attempts in flight, streaming
//! [`scanner::ScanEvent`]s that [`output::Reporter`] renders for the console.

pub mod cli;
pub mod error;
pub mod network;
pub mod output;
pub mod scanner;
