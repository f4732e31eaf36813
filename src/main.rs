mod collectors;
mod config;
mod report;
mod state;

use clap::Parser;
use collectors::system::LiveProbe;
use config::Config;
use report::{write_report, ReportOptions};
use std::io::Write;
use std::path::PathBuf;
use tracing::{debug, error};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "hostsnap")]
#[command(version, about = "Print a one-shot snapshot of host health")]
struct Cli {
    #[arg(long)]
    config: Option<PathBuf>,
    #[arg(long)]
    print_default_config: bool,
    #[arg(long)]
    interval_ms: Option<u64>,
    #[arg(long)]
    no_extras: bool,
}

fn main() {
    init_tracing();

    let cli = Cli::parse();
    if cli.print_default_config {
        println!("{}", Config::example_yaml());
        return;
    }

    let mut cfg = match &cli.config {
        Some(path) => match Config::load_from_file(path) {
            Ok(cfg) => cfg,
            Err(err) => {
                error!(error = %err, "failed to load configuration");
                std::process::exit(1);
            }
        },
        None => Config::default(),
    };
    if let Some(ms) = cli.interval_ms {
        cfg.sample_interval_ms = ms;
    }
    if cli.no_extras {
        cfg.extras.gpu = false;
        cfg.extras.temperatures = false;
    }
    if let Err(err) = cfg.validate() {
        error!(error = %err, "invalid configuration");
        std::process::exit(1);
    }

    let width = terminal_width(cfg.fallback_width);
    debug!(
        proc_root = %cfg.proc_root.display(),
        interval_ms = cfg.sample_interval_ms,
        width,
        "collecting host snapshot"
    );

    let opts = ReportOptions::from_config(&cfg, width);
    let mut probe = LiveProbe::new(&cfg);
    let mut buf = Vec::new();
    if let Err(err) = write_report(&mut probe, &opts, &mut buf) {
        error!(error = %err, "cannot produce report");
        std::process::exit(1);
    }

    let mut stdout = std::io::stdout().lock();
    if let Err(err) = stdout.write_all(&buf).and_then(|_| stdout.flush()) {
        error!(error = %err, "failed to write report to stdout");
        std::process::exit(1);
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn terminal_width(fallback: usize) -> usize {
    match crossterm::terminal::size() {
        Ok((cols, _)) if cols > 0 => cols as usize,
        _ => fallback,
    }
}
