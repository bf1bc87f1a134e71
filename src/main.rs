use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use powerlink::{PowerService, ServiceConfig, ServiceStatus, Submission};
use std::path::Path;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Polls of `is_ready` between forced logins while waiting for a session
const READY_POLLS_PER_LOGIN: u32 = 10;

#[derive(Parser)]
#[command(name = "powerlink")]
#[command(about = "Set inverter output power through the vendor cloud API")]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "powerlink.toml")]
    config: String,

    /// Account email (overrides config file)
    #[arg(long, env = "POWERLINK_EMAIL")]
    email: Option<String>,

    /// Account password (overrides config file)
    #[arg(long, env = "POWERLINK_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    /// Inverter serial number (overrides config file)
    #[arg(long, env = "POWERLINK_DEVICE_SN")]
    device_sn: Option<String>,

    /// API base URL (overrides config file)
    #[arg(long, env = "POWERLINK_BASE_URL")]
    base_url: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Set the output power once
    Set {
        /// Output power in percent, 0-100
        #[arg(allow_negative_numbers = true)]
        value: i64,

        /// Return once queued instead of waiting for the result
        #[arg(long)]
        no_wait: bool,
    },

    /// Drop the session and log in again
    Relogin,

    /// Print the service status as JSON
    Status,

    /// Re-apply an output power periodically until interrupted
    Run {
        /// Output power in percent, 0-100
        #[arg(long, default_value_t = 100)]
        value: i64,

        /// Seconds between requests
        #[arg(long, default_value_t = 60)]
        interval_secs: u64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .init();

    if let Err(e) = dotenvy::dotenv() {
        if !e.not_found() {
            warn!("Failed to load .env file: {}", e);
        }
    }

    let cli = Cli::parse();
    let config = load_config(&cli)?;

    info!("PowerLink starting for device {}", config.device_sn);
    info!("  API: {}", config.api_base());

    let service = PowerService::start(config).context("failed to start power service")?;

    let result = match cli.command {
        Commands::Set { value, no_wait } => set_once(&service, value, !no_wait).await,
        Commands::Relogin => service
            .force_relogin()
            .await
            .map(|_| info!("Re-login succeeded"))
            .context("re-login failed"),
        Commands::Status => print_status(&service).await,
        Commands::Run {
            value,
            interval_secs,
        } => run_periodic(&service, value, Duration::from_secs(interval_secs)).await,
    };

    service.shutdown().await;
    result
}

fn load_config(cli: &Cli) -> Result<ServiceConfig> {
    let mut config = if Path::new(&cli.config).exists() {
        ServiceConfig::load(&cli.config)?
    } else {
        info!("Config file {} not found, using defaults", cli.config);
        ServiceConfig::default()
    };

    // Apply CLI / environment overrides
    if let Some(email) = &cli.email {
        config.email = email.clone();
    }
    if let Some(password) = &cli.password {
        config.password = powerlink::Password::new(password.clone());
    }
    if let Some(device_sn) = &cli.device_sn {
        config.device_sn = device_sn.clone();
    }
    if let Some(base_url) = &cli.base_url {
        config.base_url = base_url.clone();
    }

    config.validate()?;
    Ok(config)
}

async fn set_once(service: &PowerService, value: i64, wait: bool) -> Result<()> {
    match service.set_output(value, wait).await? {
        Submission::Queued => info!("Set output {}% queued", value),
        Submission::Completed(outcome) => info!("Done: {}", outcome),
    }
    Ok(())
}

async fn print_status(service: &PowerService) -> Result<()> {
    // Queued behind the eager login, so the snapshot reflects it
    let status = service
        .queued_status()
        .await
        .context("status request failed")?;
    println!("{}", serde_json::to_string_pretty(&status)?);
    Ok(())
}

fn log_stats(status: &ServiceStatus) {
    info!("Service statistics:");
    info!("  Authenticated: {}", status.authenticated);
    info!("  Total requests: {}", status.stats.total_requests);
    info!("  Successful: {}", status.stats.successful_requests);
    info!("  Failed: {}", status.stats.failed_requests);
    info!("  Skipped: {}", status.stats.skipped_requests);
    info!("  Session refreshes: {}", status.stats.session_refreshes);
}

async fn wait_until_ready(service: &PowerService) -> Result<()> {
    let mut polls = 0u32;
    while !service.is_ready().await {
        polls += 1;
        if polls % READY_POLLS_PER_LOGIN == 0 {
            if let Err(e) = service.force_relogin().await {
                warn!("Login attempt failed: {}", e);
            }
            continue;
        }
        info!("Waiting for power service to be ready...");
        tokio::select! {
            _ = tokio::time::sleep(Duration::from_secs(1)) => {}
            _ = tokio::signal::ctrl_c() => bail!("interrupted before the service was ready"),
        }
    }
    Ok(())
}

async fn run_periodic(service: &PowerService, value: i64, period: Duration) -> Result<()> {
    if period.is_zero() {
        bail!("interval must be at least one second");
    }

    wait_until_ready(service).await?;
    info!("Service is ready, applying {}% every {:?}", value, period);

    let mut ticker = tokio::time::interval(period);
    let mut report = tokio::time::interval(Duration::from_secs(30));
    let mut request_count = 0u64;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                request_count += 1;
                info!("Sending request #{}: set power to {}%", request_count, value);

                match service.set_output(value, true).await {
                    Ok(Submission::Completed(outcome)) => {
                        info!("Request #{} completed: {}", request_count, outcome)
                    }
                    Ok(Submission::Queued) => info!("Request #{} queued", request_count),
                    Err(e) => error!("Request #{} failed: {}", request_count, e),
                }

                if request_count % 5 == 0 {
                    log_stats(&service.status().await);
                }
            }

            _ = report.tick() => {
                let status = service.status().await;
                info!(
                    "Status: ready={} last confirmed={}",
                    status.authenticated,
                    status
                        .last_confirmed
                        .map(|p| p.to_string())
                        .unwrap_or_else(|| "none".into())
                );
            }

            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted, shutting down");
                return Ok(());
            }
        }
    }
}
