//! Process entry point: discovers config, bootstraps the device identity,
//! and runs the gateway's async runtime until shutdown.
//!
//! Deliberately minimal — no interactive onboarding, no subcommand surface.
//! A one-time pairing hint is printed when no identity exists yet; otherwise
//! startup is non-interactive and failures map to the exit codes below.

use std::path::PathBuf;

use clap::Parser;
use relaykit_auth::{DeviceIdentity, PairingRole};
use relaykit_gateway::GatewayState;
use relaykit_service_traits::Services;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

const EXIT_CONFIG_INVALID: i32 = 2;
const EXIT_IDENTITY_FAILURE: i32 = 3;
const EXIT_BIND_FAILURE: i32 = 4;
const EXIT_INVARIANT_VIOLATION: i32 = 64;

#[derive(Parser)]
#[command(name = "relaykit", about = "Relaykit — personal AI gateway control plane")]
struct Cli {
    /// Log level (trace, debug, info, warn, error).
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Output logs as JSON instead of human-readable.
    #[arg(long, default_value_t = false)]
    json_logs: bool,

    /// Address to bind to (overrides config value).
    #[arg(long)]
    bind: Option<String>,
    /// Port to listen on (overrides config value).
    #[arg(long)]
    port: Option<u16>,
    /// Custom config directory (overrides default `~/.config/openclaw/`).
    #[arg(long, env = "RELAYKIT_CONFIG_DIR")]
    config_dir: Option<PathBuf>,
}

fn init_telemetry(cli: &Cli) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));
    let registry = tracing_subscriber::registry().with(filter);
    if cli.json_logs {
        registry.with(fmt::layer().json().with_target(true).with_thread_ids(false)).init();
    } else {
        registry.with(fmt::layer().with_target(false).with_thread_ids(false)).init();
    }
}

fn load_and_validate_config(cli: &Cli) -> Result<relaykit_config::OpenclawConfig, i32> {
    let path = cli
        .config_dir
        .as_ref()
        .map(|dir| dir.join("openclaw.toml"))
        .unwrap_or_else(relaykit_config::find_or_default_config_path);

    let config = if path.exists() {
        relaykit_config::load_config(&path).map_err(|e| {
            error!(path = %path.display(), error = %e, "config failed to parse");
            EXIT_CONFIG_INVALID
        })?
    } else {
        relaykit_config::OpenclawConfig::default()
    };

    relaykit_config::validate(&config).map_err(|e| {
        error!(error = %e, "config failed validation");
        EXIT_CONFIG_INVALID
    })?;

    Ok(config)
}

fn identity_dir(cli: &Cli) -> PathBuf {
    let config_dir = cli.config_dir.clone().or_else(relaykit_config::config_dir).unwrap_or_else(|| PathBuf::from("."));
    relaykit_auth::default_identity_dir(&config_dir)
}

fn bootstrap_identity(dir: &PathBuf) -> Result<(DeviceIdentity, bool), i32> {
    let is_first_boot = !dir.join("device-auth.json").exists();
    let identity = DeviceIdentity::load_or_create(dir).map_err(|e| {
        error!(dir = %dir.display(), error = %e, "failed to bootstrap device identity");
        EXIT_IDENTITY_FAILURE
    })?;
    Ok((identity, is_first_boot))
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_telemetry(&cli);
    info!(version = env!("CARGO_PKG_VERSION"), "relaykit gateway starting");

    let config = match load_and_validate_config(&cli) {
        Ok(c) => c,
        Err(code) => std::process::exit(code),
    };

    let dir = identity_dir(&cli);
    let (identity, is_first_boot) = match bootstrap_identity(&dir) {
        Ok(i) => i,
        Err(code) => std::process::exit(code),
    };

    let bind = cli.bind.clone().unwrap_or_else(|| config.gateway.bind.clone());
    let port = cli.port.unwrap_or(config.gateway.port);
    let addr: std::net::SocketAddr = match format!("{bind}:{port}").parse() {
        Ok(addr) => addr,
        Err(e) => {
            error!(bind = %bind, port, error = %e, "invalid bind address");
            std::process::exit(EXIT_CONFIG_INVALID);
        },
    };

    let state = std::sync::Arc::new(GatewayState::new(identity, Services::default()));

    if is_first_boot {
        let token = state.pairing.lock().unwrap_or_else(|e| e.into_inner()).issue(PairingRole::Operator, 3600);
        println!("No device identity found — generated a new one and an operator pairing token.");
        println!("Pairing token (valid 1h, single use): {token}");
    }

    match relaykit_gateway::server::serve(addr, None, state).await {
        Ok(()) => std::process::exit(0),
        Err(relaykit_gateway::Error::NonLoopbackRequiresTls { addr }) => {
            error!(%addr, "refusing non-loopback bind without TLS certificate");
            std::process::exit(EXIT_CONFIG_INVALID);
        },
        Err(relaykit_gateway::Error::Io(e)) => {
            error!(error = %e, "gateway failed to bind its socket");
            std::process::exit(EXIT_BIND_FAILURE);
        },
        Err(e) => {
            error!(error = %e, "gateway runtime failed");
            std::process::exit(EXIT_INVARIANT_VIOLATION);
        },
    }
}
