use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use pm_client::{HttpTransport, RpcClient};
use pm_state::{
    ActionCreators, ActionError, AppState, Dispatcher, LoginOutcome, Settings, StoreEvent, StoreId,
};
use std::future::Future;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::{self, error::TryRecvError};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

mod config;
mod render;

use config::{ConsoleConfig, Overrides};

#[derive(Parser, Debug)]
#[command(name = "pm-console")]
#[command(about = "Platform manager console", long_about = None)]
struct Cli {
    /// Config file; defaults to <config dir>/pm-console/config.toml
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[arg(long, global = true)]
    base_url: Option<String>,
    #[arg(long, global = true)]
    endpoint_path: Option<String>,
    #[arg(long, global = true)]
    timeout_ms: Option<u64>,
    #[arg(long, global = true)]
    unauthorized_code: Option<i64>,
    /// Authorization token from an earlier `login`
    #[arg(long, global = true)]
    token: Option<String>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Exchange credentials for a token and print it
    Login {
        #[arg(long)]
        username: Option<String>,
        /// Falls back to PM_PASSWORD
        #[arg(long)]
        password: Option<String>,
    },
    /// List platforms, agents and agent status
    Platforms,
    /// Reload platforms periodically and print every change
    Watch {
        #[arg(long, default_value_t = 5)]
        interval_secs: u64,
    },
    /// Start an agent
    Start { platform: String, agent: String },
    /// Stop an agent
    Stop { platform: String, agent: String },
    /// Send a raw JSON-RPC request object and print the exchange
    Call {
        /// e.g. '{"method": "list_platforms"}'
        request: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();
    let cli = Cli::parse();
    let config = load_config(&cli)?;
    info!(
        event = "console_start",
        base_url = %config.base_url,
        endpoint_path = %config.endpoint_path,
        timeout = ?config.timeout
    );

    let rpc = RpcClient::new(config.rpc_client_config(), Arc::new(HttpTransport::new()))
        .context("invalid endpoint")?;
    let dispatcher =
        Dispatcher::new(AppState::default().with_authorization(config.token.clone()));
    let actions = ActionCreators::new(
        rpc,
        dispatcher.clone(),
        Settings {
            unauthorized_code: config.unauthorized_code,
        },
    );

    match cli.command {
        Commands::Login { username, password } => {
            let username = username
                .or_else(|| config.username.clone())
                .context("no username; pass --username or set PM_USERNAME")?;
            let password = password
                .or_else(|| std::env::var("PM_PASSWORD").ok())
                .context("no password; pass --password or set PM_PASSWORD")?;
            match actions
                .platform_manager
                .authenticate(&username, &password)
                .await?
            {
                LoginOutcome::Authorized => {
                    let token = dispatcher.authorization().unwrap_or_default();
                    println!("{token}");
                }
                LoginOutcome::Unauthorized(error) => bail!("login rejected: {error}"),
            }
        }
        Commands::Platforms => {
            require_token(&dispatcher)?;
            report(actions.platform_manager.load_platforms().await)?;
            print!("{}", dispatcher.read(render::platforms));
        }
        Commands::Watch { interval_secs } => {
            require_token(&dispatcher)?;
            watch(
                &actions,
                &dispatcher,
                Duration::from_secs(interval_secs.max(1)),
                ctrl_c(),
            )
            .await?;
        }
        Commands::Start { platform, agent } => {
            control(&actions, &dispatcher, &platform, &agent, true).await?;
        }
        Commands::Stop { platform, agent } => {
            control(&actions, &dispatcher, &platform, &agent, false).await?;
        }
        Commands::Call { request } => {
            let raw: serde_json::Value =
                serde_json::from_str(&request).context("request is not valid json")?;
            actions
                .console
                .send_request(raw)
                .await
                .context("console request task failed")?;
            dispatcher.read(|state| {
                for exchange in state.console().exchanges() {
                    print!("{}", render::exchange(exchange));
                }
            });
        }
    }
    Ok(())
}

async fn control(
    actions: &ActionCreators,
    dispatcher: &Dispatcher,
    platform: &str,
    agent: &str,
    start: bool,
) -> Result<()> {
    require_token(dispatcher)?;
    report(actions.platform_manager.load_platforms().await)?;
    let result = if start {
        actions.platform_manager.start_agent(platform, agent).await
    } else {
        actions.platform_manager.stop_agent(platform, agent).await
    };
    report(result.map(|_| ()))?;
    let state = dispatcher.read(|state| {
        state
            .platforms()
            .agent(platform, agent)
            .map(|record| format!("{} {}", record.name(), record.display_state()))
    });
    if let Some(line) = state {
        println!("{line}");
    }
    Ok(())
}

/// Reloads on a timer and re-renders whenever the platform store changed,
/// until `shutdown` resolves or the session is deauthorized. A reload still
/// in flight when `shutdown` resolves is abandoned.
async fn watch<F>(
    actions: &ActionCreators,
    dispatcher: &Dispatcher,
    interval: Duration,
    shutdown: F,
) -> Result<()>
where
    F: Future<Output = ()>,
{
    tokio::pin!(shutdown);
    let mut events = dispatcher.subscribe();
    let mut ticker = tokio::time::interval(interval);
    loop {
        tokio::select! {
            biased;
            _ = &mut shutdown => break,
            _ = ticker.tick() => {}
        }
        tokio::select! {
            biased;
            _ = &mut shutdown => break,
            result = actions.platform_manager.load_platforms() => {
                if let Err(err) = result {
                    warn!(event = "watch_reload_failed", error = %err);
                }
            }
        }
        if platforms_changed(&mut events)? {
            print!("{}", dispatcher.read(render::platforms));
        }
    }
    info!(event = "watch_stopped", reason = "shutdown");
    Ok(())
}

async fn ctrl_c() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(event = "ctrl_c_unavailable", error = %err);
        std::future::pending::<()>().await;
    }
}

fn platforms_changed(events: &mut broadcast::Receiver<StoreEvent>) -> Result<bool> {
    let mut changed = false;
    loop {
        match events.try_recv() {
            Ok(StoreEvent::Changed {
                store: StoreId::Platforms,
                ..
            }) => changed = true,
            Ok(StoreEvent::Deauthorized) => {
                bail!("session is no longer authorized; run login again")
            }
            Ok(_) => {}
            Err(TryRecvError::Lagged(skipped)) => {
                warn!(event = "watch_events_lagged", skipped);
                changed = true;
            }
            Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => return Ok(changed),
        }
    }
}

fn require_token(dispatcher: &Dispatcher) -> Result<()> {
    if dispatcher.authorization().is_none() {
        bail!("no token; run `pm-console login` and pass --token or set PM_TOKEN");
    }
    Ok(())
}

fn report(result: Result<(), ActionError>) -> Result<()> {
    match result {
        Ok(()) => Ok(()),
        Err(ActionError::Unauthorized(error)) => {
            bail!("not authorized ({error}); run login again")
        }
        Err(err) => Err(err.into()),
    }
}

fn load_config(cli: &Cli) -> Result<ConsoleConfig> {
    let (path, explicit) = match cli.config.clone() {
        Some(path) => (Some(path), true),
        None => match std::env::var("PM_CONFIG_PATH") {
            Ok(path) if !path.trim().is_empty() => (Some(PathBuf::from(path)), true),
            _ => (config::default_config_path(), false),
        },
    };
    let file = match path {
        Some(path) => config::load_file(&path, explicit)?,
        None => config::FileConfig::default(),
    };
    let overrides = Overrides {
        base_url: cli.base_url.clone(),
        endpoint_path: cli.endpoint_path.clone(),
        timeout_ms: cli.timeout_ms,
        unauthorized_code: cli.unauthorized_code,
        username: None,
        token: cli.token.clone(),
    };
    Ok(config::resolve(
        file,
        |key| std::env::var(key).ok(),
        overrides,
    )?)
}

fn init_logging() {
    let level = std::env::var("PM_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let stdout_enabled = std::env::var("PM_LOG_STDOUT")
        .ok()
        .and_then(|value| config::parse_bool_flag(&value))
        .unwrap_or(false);
    if stdout_enabled {
        let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
    } else {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(io::sink)
            .try_init();
    }
}
