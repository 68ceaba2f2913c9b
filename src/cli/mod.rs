//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了CLI命令行接口。

use anyhow::Result;
use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "anycache")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    #[command(name = "publish", about = "Publish an invalidation notice")]
    Publish(PublishArgs),

    #[command(name = "watch", about = "Print invalidation notices received on a topic")]
    Watch(WatchArgs),

    #[command(name = "check-config", about = "Load and validate a TOML configuration file")]
    CheckConfig(CheckConfigArgs),
}

#[derive(Parser, Debug)]
pub struct PublishArgs {
    #[arg(short, long, env = "REDIS_URL", help = "Redis connection string")]
    pub redis: String,

    #[arg(short, long, help = "Pub/sub topic shared by the cache instances")]
    pub topic: String,

    #[arg(short, long, help = "Group name")]
    pub group: String,

    #[arg(
        short,
        long,
        help = "Key as JSON (e.g. 42 or '\"bob\"'); string keys must be quoted, so a String key \"42\" is '\"42\"'. Omit to clear the group"
    )]
    pub key: Option<String>,
}

#[derive(Parser, Debug)]
pub struct WatchArgs {
    #[arg(short, long, env = "REDIS_URL", help = "Redis connection string")]
    pub redis: String,

    #[arg(short, long, help = "Pub/sub topic shared by the cache instances")]
    pub topic: String,

    #[arg(short, long, help = "Only show notices for this group")]
    pub group: Option<String>,
}

#[derive(Parser, Debug)]
pub struct CheckConfigArgs {
    #[arg(help = "Path to the configuration file")]
    pub path: std::path::PathBuf,
}

mod check;
mod publish;
mod watch;

pub use publish::parse_key;

pub async fn run() -> Result<()> {
    let cli = Cli::parse();
    crate::telemetry::init_tracing("anycache");

    match &cli.command {
        Commands::Publish(args) => publish::execute(args).await,
        Commands::Watch(args) => watch::execute(args).await,
        Commands::CheckConfig(args) => check::execute(args),
    }
}
