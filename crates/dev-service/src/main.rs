mod commands;

use clap::{Args, Parser, Subcommand};
use colored::Colorize;
use dev_service_container::ContainerError;
use dev_service_core::VolumeFlag;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "service", version)]
#[command(
    about = "Run the development services declared in package.json with docker compose",
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Render compose files for the services declared in package.json
    Install {
        #[command(flatten)]
        volumes: VolumeArgs,
    },
    /// Check that the ports required by the services are free
    Check {
        /// Service name (all services if omitted)
        service: Option<String>,
    },
    /// Start services in the background
    Start {
        /// Service name (all services if omitted)
        service: Option<String>,
    },
    /// Stop services and remove their containers
    Stop {
        /// Service name (all services if omitted)
        service: Option<String>,
    },
    /// Restart services
    Restart {
        /// Service name (all services if omitted)
        service: Option<String>,
    },
    /// List service containers
    List,
    /// Follow service logs
    Logs {
        /// Service name (all services if omitted)
        service: Option<String>,
    },
    /// Pull the latest service images
    Pull {
        /// Service name (all services if omitted)
        service: Option<String>,
    },
}

/// ボリュームの扱い（どれか1つだけ指定可能）
#[derive(Args, Debug, Default)]
#[group(multiple = false)]
struct VolumeArgs {
    /// Use named volumes prefixed with the project name
    #[arg(long)]
    enable_classic_volumes: bool,
    /// Use named volumes prefixed with a random id kept in services/.options
    #[arg(long)]
    enable_volumes_id: bool,
    /// Bind-mount services/volumes instead of named volumes
    #[arg(long)]
    enable_mapped_volumes: bool,
}

impl VolumeArgs {
    fn flag(&self) -> Option<VolumeFlag> {
        if self.enable_classic_volumes {
            Some(VolumeFlag::Classic)
        } else if self.enable_volumes_id {
            Some(VolumeFlag::VolumesId)
        } else if self.enable_mapped_volumes {
            Some(VolumeFlag::MappedVolumes)
        } else {
            None
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // ログは stderr へ（RUST_LOG で上書き可能）
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .init();

    if let Err(e) = run(cli).await {
        eprintln!("{}", format!("ERROR: {}", e).red());
        std::process::exit(exit_code(&e));
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::Install { volumes } => commands::install::handle(volumes.flag()).await,
        Commands::Check { service } => commands::check::handle(service.as_deref()).await,
        Commands::Start { service } => commands::start::handle(service.as_deref()).await,
        Commands::Stop { service } => commands::stop::handle(service.as_deref()).await,
        Commands::Restart { service } => commands::restart::handle(service.as_deref()).await,
        Commands::List => commands::list::handle().await,
        Commands::Logs { service } => commands::logs::handle(service.as_deref()).await,
        Commands::Pull { service } => commands::pull::handle(service.as_deref()).await,
    }
}

/// 外部コマンドが失敗した場合はその終了コードを引き継ぐ
fn exit_code(err: &anyhow::Error) -> i32 {
    err.downcast_ref::<ContainerError>()
        .map(ContainerError::exit_code)
        .unwrap_or(1)
}
