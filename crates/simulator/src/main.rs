use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use traffic_core::{
    Config, HttpSender, MockSender, Profile, ProgressMode, RequestSender, RunCoordinator,
    RunReport,
};

#[derive(Parser, Debug)]
#[command(name = "simulator")]
#[command(about = "Synthetic traffic generator - fires randomized request batches at a target service")]
struct Args {
    /// Path to configuration file (defaults are used when omitted)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Submission mode: mock or http
    #[arg(long, default_value = "http")]
    mode: String,

    /// Target base URL (overrides config)
    #[arg(long)]
    base_url: Option<String>,

    /// Total run duration in seconds (overrides config)
    #[arg(long)]
    duration_secs: Option<u64>,

    /// Pause between rounds in milliseconds (overrides config)
    #[arg(long)]
    round_pause_ms: Option<u64>,

    /// Background producer delay range, milliseconds (overrides config)
    #[arg(long)]
    bg_min_delay_ms: Option<u64>,

    #[arg(long)]
    bg_max_delay_ms: Option<u64>,

    /// Traffic profile: classic or stream (overrides config)
    #[arg(long)]
    profile: Option<String>,

    /// Progress output: bar, log or off (overrides config)
    #[arg(long)]
    progress: Option<String>,

    /// Seed for a reproducible request mix (overrides config)
    #[arg(long)]
    seed: Option<u64>,

    /// Append-only run log (overrides config)
    #[arg(long)]
    report_path: Option<PathBuf>,

    /// Directory for the per-run JSON summary (overrides config)
    #[arg(long)]
    json_dir: Option<PathBuf>,

    /// Log level used when RUST_LOG is unset (overrides config)
    #[arg(long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Load configuration
    let mut config = match &args.config {
        Some(path) => Config::from_file(path)
            .with_context(|| format!("Failed to load config from {:?}", path))?,
        None => Config::default(),
    };
    apply_overrides(&mut config, &args)?;

    // Initialize tracing
    let level = config.log_level.clone().unwrap_or_else(|| "info".to_string());
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                tracing_subscriber::EnvFilter::new(format!("{level},hyper=error,reqwest=error"))
            }),
        )
        .init();

    // Create sender based on mode
    let sender: Arc<dyn RequestSender> = match args.mode.as_str() {
        "mock" => Arc::new(MockSender::new(5)), // 5ms simulated latency
        "http" => Arc::new(
            HttpSender::new(config.request_timeout()).context("Failed to create HTTP sender")?,
        ),
        _ => anyhow::bail!("Invalid mode: {}, must be 'mock' or 'http'", args.mode),
    };

    info!(
        "Starting {} run against {} for {}s",
        sender.name(),
        config.target.base_url,
        config.run.duration_secs
    );

    let coordinator = RunCoordinator::new(config, sender).context("Invalid configuration")?;
    let interrupt = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    let report = coordinator.run(interrupt).await?;
    print_summary(&report);

    Ok(())
}

fn apply_overrides(config: &mut Config, args: &Args) -> Result<()> {
    if let Some(url) = &args.base_url {
        config.target.base_url = url.clone();
    }
    if let Some(secs) = args.duration_secs {
        config.run.duration_secs = secs;
    }
    if let Some(ms) = args.round_pause_ms {
        config.run.round_pause_ms = ms;
    }
    if let Some(ms) = args.bg_min_delay_ms {
        config.background.min_delay_ms = ms;
    }
    if let Some(ms) = args.bg_max_delay_ms {
        config.background.max_delay_ms = ms;
    }
    if let Some(profile) = &args.profile {
        config.target.profile = profile.parse::<Profile>()?;
    }
    if let Some(mode) = &args.progress {
        config.progress.mode = mode.parse::<ProgressMode>()?;
    }
    if args.seed.is_some() {
        config.run.seed = args.seed;
    }
    if let Some(path) = &args.report_path {
        config.report.path = path.clone();
    }
    if args.json_dir.is_some() {
        config.report.json_dir = args.json_dir.clone();
    }
    if let Some(level) = &args.log_level {
        config.log_level = Some(level.clone());
    }
    Ok(())
}

fn print_summary(report: &RunReport) {
    println!("\n=== Run Summary ===");
    println!("Elapsed: {}", traffic_core::format_elapsed(report.elapsed()));
    if let Some(reason) = report.stop_reason {
        println!("Stopped by: {}", reason);
    }
    for line in report.counter_lines() {
        println!("{}", line);
    }
    println!();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overrides_win_over_config() {
        let args = Args::parse_from([
            "simulator",
            "--base-url",
            "http://10.0.0.5:9000",
            "--duration-secs",
            "500",
            "--profile",
            "stream",
            "--progress",
            "off",
            "--seed",
            "3",
        ]);
        let mut config = Config::default();
        apply_overrides(&mut config, &args).unwrap();

        assert_eq!(config.target.base_url, "http://10.0.0.5:9000");
        assert_eq!(config.run.duration_secs, 500);
        assert_eq!(config.target.profile, Profile::Stream);
        assert_eq!(config.progress.mode, ProgressMode::Off);
        assert_eq!(config.run.seed, Some(3));
        assert_eq!(config.run.round_pause_ms, 100);
    }

    #[test]
    fn test_inverted_delay_override_is_rejected_at_startup() {
        let args = Args::parse_from([
            "simulator",
            "--bg-min-delay-ms",
            "9000",
            "--bg-max-delay-ms",
            "100",
        ]);
        let mut config = Config::default();
        apply_overrides(&mut config, &args).unwrap();

        let sender: Arc<dyn RequestSender> = Arc::new(MockSender::new(0));
        assert!(RunCoordinator::new(config, sender).is_err());
    }

    #[test]
    fn test_bad_profile_is_rejected() {
        let args = Args::parse_from(["simulator", "--profile", "chaos"]);
        let mut config = Config::default();
        assert!(apply_overrides(&mut config, &args).is_err());
    }
}
