use std::io;
use std::process::ExitCode;

use anyhow::Result;
use clap::Parser;
use colored::*;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use tcpsweep::cli::Cli;
use tcpsweep::network::resolve;
use tcpsweep::output::Reporter;
use tcpsweep::scanner::Scanner;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            // Help and version go to stdout and are not failures.
            let code = if e.use_stderr() {
                ExitCode::FAILURE
            } else {
                ExitCode::SUCCESS
            };
            let _ = e.print();
            return code;
        }
    };

    init_tracing(cli.verbose);
    if cli.no_color {
        colored::control::set_override(false);
    }

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {}", "[-] Error:".red().bold(), e);
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(verbose: bool) {
    let default_directive = if verbose { "tcpsweep=debug" } else { "error" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

async fn run(cli: Cli) -> Result<()> {
    // Argument problems surface before any network activity.
    let range = cli.port_range()?;
    let config = cli.scan_config()?;

    let mut reporter = Reporter::new(io::stdout(), cli.show_closed);
    reporter.banner()?;
    reporter.resolving(&cli.hostname)?;

    let target = resolve(&cli.hostname).await?;
    reporter.scan_header(&target, &range, &config)?;

    let cancel = CancellationToken::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancel.cancel();
            }
        }
    });

    let scanner = Scanner::new(config);
    let mut events = scanner.run(target.clone(), range, cancel.clone());
    let mut notified = false;

    loop {
        tokio::select! {
            event = events.next_event() => match event {
                Some(event) => reporter.event(&target, &event)?,
                None => break,
            },
            _ = cancel.cancelled(), if !notified => {
                notified = true;
                reporter.interrupted_notice()?;
            }
        }
    }

    Ok(())
}
