use crate::deploy::DeployConfig;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Clone, Parser)]
#[command(name = "lighter-rebalancer")]
#[command(about = "Rebalance a Lighter perpetual-futures account to target weights")]
pub struct CliConfig {
    /// TOML settings file; environment variables are used when omitted
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[arg(long, global = true, help = "Enable verbose output")]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Serve the HTTP API locally
    Serve {
        #[arg(long, default_value = "0.0.0.0:8000")]
        bind: String,
    },
    /// Run one rebalance from a JSON request file
    Execute {
        #[arg(long)]
        request: PathBuf,

        /// Single attempt, no alerts
        #[arg(long)]
        no_retry: bool,
    },
    /// Build the Lambda image and push it to ECR
    Deploy(DeployArgs),
}

#[derive(Debug, Clone, Args)]
pub struct DeployArgs {
    #[arg(long, env = "AWS_ACCOUNT_ID")]
    pub account_id: String,

    #[arg(long, env = "AWS_REGION", default_value = "ap-northeast-2")]
    pub region: String,

    #[arg(long, default_value = "lighter-rebalancer")]
    pub repository: String,

    #[arg(long, default_value = "lighter-rebalancer")]
    pub image: String,

    #[arg(long, default_value = "latest")]
    pub tag: String,

    #[arg(long, default_value = "Dockerfile")]
    pub dockerfile: String,

    #[arg(long, default_value = ".")]
    pub context: String,

    /// Lambda runs on x86_64 unless told otherwise
    #[arg(long, default_value = "linux/amd64")]
    pub platform: String,

    /// Print the commands without running them
    #[arg(long)]
    pub dry_run: bool,
}

impl From<DeployArgs> for DeployConfig {
    fn from(args: DeployArgs) -> Self {
        DeployConfig {
            account_id: args.account_id,
            region: args.region,
            repository: args.repository,
            image: args.image,
            tag: args.tag,
            dockerfile: args.dockerfile,
            context: args.context,
            platform: Some(args.platform).filter(|p| !p.is_empty()),
        }
    }
}
