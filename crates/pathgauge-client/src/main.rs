//! pathgauge CLI
//!
//! - `pathgauge run` measures latency, download and upload against a server
//!   and prints a report, streaming live samples to stderr
//! - `pathgauge info` prints only the network attribution record

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context};
use clap::{Args, Parser, Subcommand};
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

use pathgauge_client::format::{self, Speed};
use pathgauge_client::network::{self, PublicIpDetector};
use pathgauge_client::session::Session;
use pathgauge_client::transport::HttpTransport;
use pathgauge_common::config::{MeasurementConfig, PathgaugeConfig};
use pathgauge_common::models::{NetworkInfo, Phase, Sample, SessionReport};

/// Network path measurement client.
#[derive(Parser, Debug)]
#[command(name = "pathgauge", about = "Measure latency and throughput to a pathgauge server")]
struct Cli {
    /// Server base URL.
    #[arg(long, global = true, default_value = "http://localhost:3000")]
    server: String,

    /// TOML config file; only the [measurement] section is used.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Print the result as JSON.
    #[arg(long, global = true, default_value_t = false)]
    json: bool,

    /// Do not ask public services for this host's address.
    #[arg(long, global = true, default_value_t = false)]
    no_public_ip: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run a full measurement session.
    Run(RunArgs),
    /// Show network attribution only.
    Info,
}

#[derive(Args, Debug)]
struct RunArgs {
    /// Number of latency probes.
    #[arg(long)]
    samples: Option<u32>,

    /// Download phase length in seconds.
    #[arg(long)]
    download_secs: Option<f64>,

    /// Upload phase length in seconds.
    #[arg(long)]
    upload_secs: Option<f64>,

    /// Largest upload chunk in MiB.
    #[arg(long)]
    chunk_mb: Option<f64>,

    /// Show rates in bytes per second.
    #[arg(long, default_value_t = false)]
    bytes: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let measurement = match &cli.config {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("reading config {}", path.display()))?;
            PathgaugeConfig::from_toml_str(&text)
                .with_context(|| format!("parsing config {}", path.display()))?
                .measurement
        }
        None => MeasurementConfig::default(),
    };

    let transport = Arc::new(HttpTransport::new(&cli.server).context("server url")?);
    let detector = if cli.no_public_ip {
        None
    } else {
        Some(PublicIpDetector::new().context("building public ip client")?)
    };

    tracing::debug!(server = %transport.base(), "pathgauge starting");

    match cli.command {
        Command::Info => {
            let Some(info) = network::lookup(&*transport, detector.as_ref()).await else {
                bail!("network info unavailable from {}", cli.server);
            };
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&info)?);
            } else {
                print_network(&info);
            }
        }
        Command::Run(args) => {
            let measurement = apply_overrides(measurement, &args)?;
            let mut session = Session::new(transport, measurement);
            if let Some(detector) = detector {
                session = session.with_public_ip_detection(detector);
            }

            let (tx, rx) = mpsc::unbounded_channel();
            let printer = tokio::spawn(print_samples(rx, cli.json, args.bytes));

            let result = session.run(tx).await;
            let _ = printer.await;
            let report = result.context("measurement failed")?;

            if cli.json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print_report(&report, args.bytes);
            }
        }
    }

    Ok(())
}

fn apply_overrides(mut config: MeasurementConfig, args: &RunArgs) -> anyhow::Result<MeasurementConfig> {
    if let Some(samples) = args.samples {
        config.ping_samples = samples;
    }
    if let Some(secs) = args.download_secs {
        config.download_duration =
            Duration::try_from_secs_f64(secs).context("--download-secs must be a non-negative number")?;
    }
    if let Some(secs) = args.upload_secs {
        config.upload_duration =
            Duration::try_from_secs_f64(secs).context("--upload-secs must be a non-negative number")?;
    }
    if let Some(mb) = args.chunk_mb {
        if !mb.is_finite() || mb <= 0.0 {
            bail!("--chunk-mb must be a positive number, got {mb}");
        }
        config.upload_initial_chunk_mb = mb;
    }
    Ok(config)
}

async fn print_samples(mut rx: mpsc::UnboundedReceiver<Sample>, quiet: bool, prefer_bytes: bool) {
    while let Some(sample) = rx.recv().await {
        if quiet {
            continue;
        }
        let at = format::elapsed(sample.offset_ms / 1000.0);
        let phase = sample.phase.to_string();
        match sample.phase {
            Phase::Latency => eprintln!("  {phase:<9}{:>10.1} ms   {at}", sample.value),
            Phase::Download | Phase::Upload => eprintln!(
                "  {phase:<9}{:>14}   {at}",
                Speed::adaptive(sample.value, prefer_bytes).to_string()
            ),
        }
    }
}

fn print_report(report: &SessionReport, prefer_bytes: bool) {
    let l = &report.latency;
    println!(
        "Latency   {:.1} ms  (jitter {:.1} ms, loss {}%)",
        l.average_ms, l.jitter_ms, l.loss_percent
    );
    for (label, t) in [("Download", &report.download), ("Upload", &report.upload)] {
        println!(
            "{label:<10}{}  ({} in {})",
            Speed::adaptive(t.mbps, prefer_bytes),
            format::data_size(t.total_bytes),
            format::elapsed(t.duration_s)
        );
    }
    match &report.network {
        Some(info) => print_network(info),
        None => println!("Network   Unavailable"),
    }
}

fn print_network(info: &NetworkInfo) {
    println!("IP        {}", info.ip);
    println!("ISP       {}", info.isp);
    println!("Network   {}", info.network);
    let server = &info.server;
    match server.distance_km {
        Some(km) => println!("Server    {} - {} ({km:.0} km)", server.name, server.location),
        None => println!("Server    {} - {}", server.name, server.location),
    }
}
