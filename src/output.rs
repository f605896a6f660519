use std::io::Write;

use anyhow::Result;
use colored::*;

use crate::network::Target;
use crate::scanner::{PortRange, PortResult, PortState, ScanConfig, ScanEvent, ScanProgress, ScanSummary};

const RULE: &str = "══════════════════════════════════════════════════════════════";

/// Renders scan events as console text. Holds no scan state of its own.
pub struct Reporter<W: Write> {
    out: W,
    show_closed: bool,
}

impl<W: Write> Reporter<W> {
    pub fn new(out: W, show_closed: bool) -> Self {
        Self { out, show_closed }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    pub fn banner(&mut self) -> Result<()> {
        writeln!(self.out)?;
        writeln!(self.out, "{}", format!("╔{RULE}╗").bright_cyan())?;
        writeln!(self.out, "{}", boxed_line("tcpsweep: TCP Port Scanner").bright_cyan().bold())?;
        writeln!(self.out, "{}", boxed_line("A Simple Network Diagnostic Tool").bright_cyan())?;
        writeln!(self.out, "{}", format!("╚{RULE}╝").bright_cyan())?;
        writeln!(self.out)?;
        Ok(())
    }

    pub fn resolving(&mut self, hostname: &str) -> Result<()> {
        writeln!(self.out, "{} Resolving hostname '{}'...", "[+]".green(), hostname)?;
        Ok(())
    }

    pub fn scan_header(&mut self, target: &Target, range: &PortRange, config: &ScanConfig) -> Result<()> {
        writeln!(
            self.out,
            "{} Target: {} ({})",
            "[+]".green(),
            target.hostname().bold(),
            target.ip()
        )?;
        writeln!(self.out, "{} Port range: {} ({} ports)", "[+]".green(), range, range.len())?;
        writeln!(
            self.out,
            "{} Timeout: {} seconds",
            "[+]".green(),
            format_secs(config.timeout().as_secs_f64())
        )?;
        writeln!(self.out, "{} Concurrency: {} probes", "[+]".green(), config.concurrency())?;
        writeln!(self.out, "{} Starting scan...", "[+]".green())?;
        writeln!(self.out)?;
        Ok(())
    }

    /// `Port` events are printed as they arrive, so open ports show up in
    /// completion order.
    pub fn event(&mut self, target: &Target, event: &ScanEvent) -> Result<()> {
        match event {
            ScanEvent::Started { .. } => {}
            ScanEvent::Port(result) => self.port(result)?,
            ScanEvent::Progress(progress) => self.progress(progress)?,
            ScanEvent::Finished(summary) => self.summary(target, summary)?,
        }
        self.out.flush()?;
        Ok(())
    }

    fn port(&mut self, result: &PortResult) -> Result<()> {
        match result.state {
            PortState::Open => {
                writeln!(self.out, "{}  Port {}/tcp", "[OPEN]".bright_green().bold(), result.port)?;
            }
            PortState::Closed if self.show_closed => {
                writeln!(self.out, "{} Port {}/tcp", "[CLOSED]".bright_black(), result.port)?;
            }
            PortState::Closed => {}
            PortState::Error => {
                writeln!(
                    self.out,
                    "{} Port {}/tcp: {}",
                    "[ERROR]".red(),
                    result.port,
                    result.error.as_deref().unwrap_or("unknown error")
                )?;
            }
        }
        Ok(())
    }

    fn progress(&mut self, progress: &ScanProgress) -> Result<()> {
        writeln!(
            self.out,
            "{} Progress: {}% ({}/{} ports scanned)",
            "[INFO]".cyan(),
            progress.percent(),
            progress.attempted,
            progress.total
        )?;
        Ok(())
    }

    pub fn interrupted_notice(&mut self) -> Result<()> {
        writeln!(self.out)?;
        writeln!(
            self.out,
            "{} Scan interrupted by user. Cleaning up...",
            "[!]".yellow().bold()
        )?;
        self.out.flush()?;
        Ok(())
    }

    pub fn summary(&mut self, target: &Target, summary: &ScanSummary) -> Result<()> {
        writeln!(self.out)?;
        writeln!(self.out, "{}", format!("╔{RULE}╗").bright_magenta())?;
        writeln!(self.out, "{}", boxed_line("SCAN COMPLETE").bright_magenta().bold())?;
        writeln!(self.out, "{}", format!("╚{RULE}╝").bright_magenta())?;

        if summary.interrupted() {
            writeln!(self.out, "{} Scan was interrupted", "[!]".yellow().bold())?;
        }

        writeln!(
            self.out,
            "{} Scanned {} of {} ports on {} ({})",
            "[+]".green(),
            summary.scanned,
            summary.total,
            target.hostname(),
            target.ip()
        )?;
        writeln!(self.out, "{} Found {} open ports", "[+]".green(), summary.open)?;

        if !summary.open_ports.is_empty() {
            let ports: Vec<String> = summary.open_ports.iter().map(u16::to_string).collect();
            writeln!(self.out, "{} Open: {}", "[+]".green(), ports.join(", ").bold())?;
        }
        if summary.errors > 0 {
            writeln!(self.out, "{} {} ports failed with errors", "[-]".red(), summary.errors)?;
        }
        if summary.open == 0 {
            writeln!(self.out, "{} No open ports found in the specified range", "[-]".yellow())?;
        }

        writeln!(
            self.out,
            "{} Elapsed: {}ms",
            "[+]".green(),
            summary.duration().num_milliseconds()
        )?;
        writeln!(self.out)?;
        Ok(())
    }
}

fn boxed_line(text: &str) -> String {
    let width = RULE.chars().count();
    format!("║{:^width$}║", text)
}

fn format_secs(secs: f64) -> String {
    if secs.fract() == 0.0 {
        format!("{}", secs as u64)
    } else {
        format!("{secs:.1}")
    }
}
