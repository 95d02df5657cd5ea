mod cmd;
mod output;
mod root;

use clap::{Parser, Subcommand};
use cmd::{dev::DevSubcommand, port_forward::PortForwardSubcommand, profile::ProfileSubcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "kdev",
    about = "End, reset and inspect Kubernetes dev sessions",
    version,
    propagate_version = true
)]
struct Cli {
    /// Project root (default: auto-detect from .kdev/ or .git/)
    #[arg(long, global = true, env = "KDEV_ROOT")]
    root: Option<PathBuf>,

    #[command(flatten)]
    cluster: cmd::ClusterArgs,

    /// Output as JSON
    #[arg(long, global = true, short = 'j')]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// End or reset a service's dev mode
    Dev {
        #[command(subcommand)]
        subcommand: DevSubcommand,
    },

    /// Inspect and stop recorded port-forwards
    PortForward {
        #[command(subcommand)]
        subcommand: PortForwardSubcommand,
    },

    /// Show service dev profiles
    Profile {
        #[command(subcommand)]
        subcommand: ProfileSubcommand,
    },

    /// List deployments in the namespace with their rollout state
    Deployments,
}

fn main() {
    let cli = Cli::parse();

    let default_level = match &cli.command {
        Commands::Dev { .. } => tracing::Level::INFO,
        _ => tracing::Level::WARN,
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(default_level.into()),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let root = root::resolve_root(cli.root.as_deref());

    let result = match cli.command {
        Commands::Dev { subcommand } => cmd::dev::run(&root, subcommand, &cli.cluster, cli.json),
        Commands::PortForward { subcommand } => {
            cmd::port_forward::run(&root, subcommand, cli.json)
        }
        Commands::Profile { subcommand } => cmd::profile::run(&root, subcommand, cli.json),
        Commands::Deployments => cmd::deployments::run(&root, &cli.cluster, cli.json),
    };

    if let Err(e) = result {
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}
