//! sshx CLI - Manage and open named SSH connections.

use clap::Parser;
use sshx::cli::{self, Cli, Commands};
use sshx::commands::{self, ConnectTarget, Output};
use sshx::config::{ConfigOverrides, OutputFormat, ResolvedConfig, load_config};
use sshx::storage::ConnectionRepository;
use sshx::sys;
use std::process;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Environment variable holding the log filter (takes precedence over RUST_LOG).
const LOG_ENV: &str = "SSHX_LOG";

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let mut overrides = ConfigOverrides::new();
    if let Some(dir) = cli.data_dir {
        overrides = overrides.with_data_dir(dir);
    }
    if cli.human_readable {
        overrides = overrides.with_output_format(OutputFormat::Human);
    }

    let config = load_config(&overrides);
    let human = match config {
        Ok(ref config) => config.output_format() == OutputFormat::Human,
        Err(_) => cli.human_readable,
    };

    let result = config.and_then(|config| run_command(cli.command, &config, human));

    match result {
        Ok(0) => {}
        Ok(code) => process::exit(code),
        Err(e) => {
            if human {
                eprintln!("Error: {}", e);
            } else {
                eprintln!("{}", serde_json::json!({ "error": e.to_string() }));
            }
            process::exit(1);
        }
    }
}

/// Install the stderr log subscriber.
fn init_logging(verbose: bool) {
    use tracing_subscriber::{EnvFilter, fmt, prelude::*};

    let default_filter = if verbose { "sshx=debug" } else { "sshx=warn" };

    let filter = EnvFilter::try_from_env(LOG_ENV)
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new(default_filter));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr).with_target(true))
        .with(filter)
        .init();
}

/// Run a command and return the process exit code.
fn run_command(
    command: Commands,
    config: &ResolvedConfig,
    human: bool,
) -> Result<i32, sshx::Error> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| sshx::Error::Other(format!("Failed to create runtime: {}", e)))?;

    let cancel = CancellationToken::new();
    let watcher = cancel.clone();

    let target = runtime.block_on(async {
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                debug!("interrupt received, cancelling");
                watcher.cancel();
            }
        });
        dispatch(command, config, &cancel, human).await
    })?;
    drop(runtime);

    // ssh runs outside the runtime; it owns the terminal until it exits
    match target {
        Some(target) => {
            debug!(program = %target.program, args = ?target.args, "connecting");
            target.run()
        }
        None => Ok(0),
    }
}

async fn open_repository(config: &ResolvedConfig) -> Result<ConnectionRepository, sshx::Error> {
    ConnectionRepository::open_with_policy(config.connections_dir(), config.retry_policy()).await
}

/// Execute `command`. Returns the ssh invocation for `connect`.
async fn dispatch(
    command: Commands,
    config: &ResolvedConfig,
    cancel: &CancellationToken,
    human: bool,
) -> Result<Option<ConnectTarget>, sshx::Error> {
    debug!(command = command.name(), "dispatching");

    match command {
        Commands::Create {
            name,
            user,
            host,
            port,
            description,
        } => {
            let repo = open_repository(config).await?;
            let request = cli::create_request(user, host, port, description);
            let result = commands::connection_create(&repo, &name, request, cancel).await?;
            output(&result, human);
        }
        Commands::Update {
            name,
            new_name,
            user,
            host,
            port,
            description,
        } => {
            let repo = open_repository(config).await?;
            let request = cli::update_request(new_name, user, host, port, description);
            let result = commands::connection_update(&repo, &name, request, cancel).await?;
            output(&result, human);
        }
        Commands::Delete { name } => {
            let repo = open_repository(config).await?;
            let result = commands::connection_delete(&repo, &name, cancel).await?;
            output(&result, human);
        }
        Commands::Show { name } => {
            let repo = open_repository(config).await?;
            let result = commands::connection_show(&repo, &name, cancel).await?;
            output(&result, human);
        }
        Commands::List => {
            let repo = open_repository(config).await?;
            let result = commands::connection_list(&repo, cancel).await?;
            output(&result, human);
        }
        Commands::Names => {
            let repo = open_repository(config).await?;
            let result = commands::connection_names(&repo, cancel).await?;
            output(&result, human);
        }
        Commands::Connect { name } => {
            let repo = open_repository(config).await?;
            let target = commands::connect_target(&repo, config, &name, cancel).await?;
            return Ok(Some(target));
        }
        Commands::Alias => {
            let exe = sys::current_exe()?;
            let result = commands::alias_install(dirs::home_dir().as_deref(), &exe)?;
            output(&result, human);
        }
        Commands::Config => {
            output(&commands::config_show(config), human);
        }
    }

    Ok(None)
}

/// Print output in JSON or human-readable format.
fn output<T: Output>(result: &T, human: bool) {
    if human {
        println!("{}", result.to_human());
    } else {
        println!("{}", result.to_json());
    }
}
