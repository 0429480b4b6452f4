use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use cloudscan_client::{ClientConfig, JobClient};

mod follow;
mod jobs;
mod scan;

#[derive(Parser, Debug)]
#[command(
    name = "cloudscanctl",
    version,
    about = "Launch and follow CloudScan security scans"
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Args, Debug, Clone, Default)]
pub struct GlobalArgs {
    /// Scan worker base URL (overrides CLOUDSCAN_SERVER_URL and config file)
    #[arg(long, global = true)]
    pub server: Option<String>,
    /// Directory holding the pending job handle
    #[arg(long, global = true)]
    pub state_dir: Option<PathBuf>,
    /// Status polling interval, e.g. "2s" or "500ms"
    #[arg(long, global = true, value_parser = humantime::parse_duration)]
    pub poll_interval: Option<Duration>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Upload a GCP service-account key and list the projects it can reach
    Discover {
        #[arg(long)]
        key_file: PathBuf,
    },
    /// Start a scan
    Scan {
        #[command(subcommand)]
        target: ScanTarget,
    },
    /// Continue following a job left pending by an earlier run
    Resume,
    /// Show the pending job and its latest status
    Status,
    /// Forget the pending job
    Reset,
    /// List past scans known to the worker
    History,
}

#[derive(Subcommand, Debug)]
pub enum ScanTarget {
    /// Asynchronous GCP project scan; follows progress until it finishes
    Gcp {
        #[arg(long)]
        key_file: PathBuf,
        /// Project to scan; must be one the key can reach
        #[arg(long)]
        project: String,
        /// Comma-separated list of checks to run
        #[arg(long)]
        checks: Option<String>,
        /// Submit and exit without following progress
        #[arg(long)]
        detach: bool,
    },
    /// Synchronous AWS account scan
    Aws {
        #[arg(long)]
        access_key: String,
        #[arg(long)]
        secret_key: String,
        #[arg(long, default_value = "all")]
        region: String,
        /// Comma-separated list of checks to run
        #[arg(long)]
        checks: Option<String>,
    },
}

impl GlobalArgs {
    /// Config file and environment, then command-line overrides
    pub fn config(&self) -> Result<ClientConfig> {
        let mut config =
            ClientConfig::load().context("failed to load client configuration")?;
        if let Some(server) = &self.server {
            config.server_url = server.clone();
        }
        if let Some(dir) = &self.state_dir {
            config.state_dir = Some(dir.clone());
        }
        if let Some(interval) = self.poll_interval {
            config.poll_interval = interval;
        }
        config.validate().context("invalid client configuration")?;
        Ok(config)
    }

    pub fn client(&self) -> Result<(ClientConfig, JobClient)> {
        let config = self.config()?;
        let client = JobClient::from_config(&config)
            .context("failed to build job client")?;
        Ok((config, client))
    }
}

pub async fn run(cli: Cli) -> Result<()> {
    let (config, client) = cli.global.client()?;
    match cli.command {
        Command::Discover { key_file } => scan::discover(&client, &key_file).await,
        Command::Scan { target } => match target {
            ScanTarget::Gcp {
                key_file,
                project,
                checks,
                detach,
            } => {
                scan::gcp(&client, &key_file, &project, checks, detach).await
            }
            ScanTarget::Aws {
                access_key,
                secret_key,
                region,
                checks,
            } => {
                scan::aws(&client, access_key, secret_key, region, checks)
                    .await
            }
        },
        Command::Resume => jobs::resume(&client).await,
        Command::Status => jobs::status(&config).await,
        Command::Reset => jobs::reset(&client).await,
        Command::History => jobs::history(&client).await,
    }
}
