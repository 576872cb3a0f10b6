use clap::{Parser, Subcommand};
use colored::Colorize;
use compose_fixture::cli::{self, OptionArgs};
use compose_fixture::errors::Result;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "cfx")]
#[command(about = "Scoped docker compose environments for integration tests", long_about = None)]
#[command(version)]
struct Cli {
    #[command(flatten)]
    options: OptionArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Bring the environment up, run a command against it, then tear down
    Run {
        /// Command and arguments to execute
        #[arg(last = true, required = true)]
        command: Vec<String>,
    },
    /// Show containers of the resolved project
    Ps,
    /// Wait for a service's container to be running
    Wait {
        /// Service name from the definition files
        service: String,
        /// Override the default readiness timeout (e.g. 30s, 2m)
        #[arg(long)]
        timeout: Option<String>,
    },
    /// Show resolved options and the environment they select
    Config,
}

fn main() {
    let cli = Cli::parse();

    match dispatch(cli) {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("{} {}", "✗".bright_red(), e);
            std::process::exit(1);
        }
    }
}

fn dispatch(cli: Cli) -> Result<i32> {
    let (options, cwd) = cli.options.resolve()?;
    init_logging(options.verbose);

    let binder = cli::compose_binder(options, cwd)?;
    match cli.command {
        Commands::Run { command } => cli::run::run(&binder, &command),
        Commands::Ps => cli::ps::ps(&binder).map(|_| 0),
        Commands::Wait { service, timeout } => {
            cli::wait::wait(&binder, &service, timeout.as_deref()).map(|_| 0)
        }
        Commands::Config => cli::config_cmd::show(&binder).map(|_| 0),
    }
}

fn init_logging(verbose: bool) {
    let default = if verbose {
        "compose_fixture=debug"
    } else {
        "compose_fixture=info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}
