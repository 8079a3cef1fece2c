use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;
use wakabeat::commands::{install, locate, run, send};

#[derive(Parser)]
#[command(name = "wakabeat")]
#[command(about = "Relay editor activity to wakatime-cli", long_about = None)]
#[command(version)]
struct Cli {
    /// Path to the settings file (default: ~/.wakabeat/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log debug output to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a session fed by JSON-lines host events on stdin
    ///
    /// Each line is one event, for example
    /// {"event":"focus-gained","document":"/p/a.rs"}. Other events are
    /// focus-lost, about-to-save and text-changed. Stops on EOF or Ctrl+C.
    Run,

    /// Download wakatime-cli if it is not installed
    Install,

    /// Print the path of the installed wakatime-cli
    Locate,

    /// Send a single heartbeat for a file
    Send {
        /// File the heartbeat is for
        file: PathBuf,

        /// Report the heartbeat as a save
        #[arg(short, long)]
        write: bool,
    },
}

fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = cli.config.as_deref();
    match cli.command {
        Commands::Run => run::execute(config),
        Commands::Install => install::execute(config),
        Commands::Locate => locate::execute(config),
        Commands::Send { file, write } => send::execute(config, file, write),
    }
}
