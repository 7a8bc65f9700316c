// # mydynsd - Dynamic DNS Update Daemon
//
// Thin integration layer: all token, credential and batching logic lives in
// mydyns-core. This binary is responsible for:
// 1. Reading configuration from flags or environment variables
// 2. Setting up logging
// 3. Loading the signing secret and credential databases (fatal on error)
// 4. Running the batching worker and the HTTP server
// 5. Reloading credentials on SIGHUP and shutting down on SIGTERM/SIGINT
//
// ## Configuration
//
// Every flag can also be given through the environment:
//
// ### HTTP
// - `MYDYNS_LISTEN`: Listen address (default 127.0.0.1:8080)
// - `MYDYNS_HTTP_TIMEOUT`: Per-request deadline in seconds (default 10)
// - `MYDYNS_PROXY_HEADER`: Client address header of a local proxy (default X-Real-IP)
//
// ### DNS
// - `MYDYNS_NSUPDATE`: Path to the nsupdate binary (default /usr/bin/nsupdate)
// - `MYDYNS_SERVER`: DNS server hostname
// - `MYDYNS_KEY`: DNS shared secrets file
// - `MYDYNS_ZONE`: Zone where updates are made
// - `MYDYNS_TTL`: TTL for written records (default 300)
// - `MYDYNS_NSUPDATE_TIMEOUT`: Bound for one nsupdate run in seconds (default 30)
// - `MYDYNS_FLUSH_INTERVAL`: Seconds between batch flushes (default 5)
//
// ### Authorization
// - `MYDYNS_USERS`: htpasswd users database (`{SHA}` entries)
// - `MYDYNS_HOSTS`: Hosts database
// - `MYDYNS_SECURITY`: Security seed database
// - `MYDYNS_SECRET`: Token signing secret file
// - `MYDYNS_TOKEN_MAX_AGE`: Token lifetime in seconds, 0 for none (default 0)
// - `MYDYNS_ALLOW_UNSEEDED`: Accept tokens of users without a seed (default true)
//
// ### Logging
// - `MYDYNS_LOG`: Append log output to this file instead of stderr
// - `MYDYNS_LOG_LEVEL`: trace, debug, info, warn or error (default info)
//
// ## Example
//
// ```bash
// mydynsd --server ns1.example.org --key /etc/mydyns/update.key \
//     --zone dyn.example.org --users /etc/mydyns/users \
//     --hosts /etc/mydyns/hosts --security /etc/mydyns/security \
//     --secret /etc/mydyns/secret
// ```

mod http;

use anyhow::{Context, Result};
use clap::{ArgAction, Parser};
use mydyns_core::config::{
    CredentialPaths, IpConfig, NsUpdateConfig, PolicyConfig, ServiceConfig, TokenConfig,
    WorkerConfig,
};
use mydyns_core::{CredentialDb, DynDns, NsUpdateDispatcher, TokenCodec, UpdateWorker};
use std::fs::OpenOptions;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::{Level, error, info, warn};
use tracing_subscriber::FmtSubscriber;

#[cfg(unix)]
use tokio::signal::unix::{SignalKind, signal};

/// Exit codes for different termination scenarios
///
/// These codes follow systemd conventions:
/// - 0: Clean shutdown
/// - 1: Configuration or startup error
/// - 2: Runtime error (unexpected)
#[derive(Debug, Clone, Copy)]
enum DaemonExitCode {
    /// Clean shutdown (normal exit)
    CleanShutdown = 0,
    /// Configuration error or startup failure
    ConfigError = 1,
    /// Runtime error (unexpected failure)
    RuntimeError = 2,
}

impl From<DaemonExitCode> for ExitCode {
    fn from(code: DaemonExitCode) -> Self {
        ExitCode::from(code as u8)
    }
}

/// Manage your own dynamic DNS zone.
#[derive(Debug, Parser)]
#[command(name = "mydynsd", version)]
struct Args {
    /// Listen address
    #[arg(long, env = "MYDYNS_LISTEN", value_name = "IP:PORT", default_value = "127.0.0.1:8080")]
    listen: String,

    /// Path to nsupdate binary
    #[arg(long, env = "MYDYNS_NSUPDATE", default_value = "/usr/bin/nsupdate")]
    nsupdate: PathBuf,

    /// DNS server hostname
    #[arg(long, env = "MYDYNS_SERVER")]
    server: String,

    /// DNS shared secrets file
    #[arg(long, env = "MYDYNS_KEY", value_name = "KEYFILE")]
    key: PathBuf,

    /// Zone where updates should be made
    #[arg(long, env = "MYDYNS_ZONE")]
    zone: String,

    /// TTL for DNS entries
    #[arg(long, env = "MYDYNS_TTL", default_value_t = 300)]
    ttl: u32,

    /// Upper bound for one nsupdate run, in seconds
    #[arg(long, env = "MYDYNS_NSUPDATE_TIMEOUT", default_value_t = 30)]
    nsupdate_timeout: u64,

    /// Seconds between batch flushes
    #[arg(long, env = "MYDYNS_FLUSH_INTERVAL", default_value_t = 5)]
    flush_interval: u64,

    /// Htpasswd users database
    #[arg(long, env = "MYDYNS_USERS", value_name = "USERSFILE")]
    users: PathBuf,

    /// Hosts database
    #[arg(long, env = "MYDYNS_HOSTS", value_name = "HOSTSFILE")]
    hosts: PathBuf,

    /// Security secret database
    #[arg(long, env = "MYDYNS_SECURITY")]
    security: PathBuf,

    /// Auth token secret file
    #[arg(long, env = "MYDYNS_SECRET")]
    secret: PathBuf,

    /// Token lifetime in seconds, 0 for none
    #[arg(long, env = "MYDYNS_TOKEN_MAX_AGE", default_value_t = 0)]
    token_max_age: u64,

    /// Accept tokens of users that have no security seed
    #[arg(long, env = "MYDYNS_ALLOW_UNSEEDED", default_value_t = true, action = ArgAction::Set)]
    allow_unseeded: bool,

    /// Client address header set by a local reverse proxy
    #[arg(long, env = "MYDYNS_PROXY_HEADER", default_value = "X-Real-IP")]
    proxy_header: String,

    /// Per-request deadline in seconds
    #[arg(long, env = "MYDYNS_HTTP_TIMEOUT", default_value_t = 10)]
    http_timeout: u64,

    /// Log file
    #[arg(long, env = "MYDYNS_LOG")]
    log: Option<PathBuf>,

    /// Log level
    #[arg(long, env = "MYDYNS_LOG_LEVEL", default_value = "info")]
    log_level: String,
}

impl Args {
    /// Translate flags into the core configuration and validate it
    fn service_config(&self) -> Result<ServiceConfig> {
        let config = ServiceConfig {
            listen: self.listen.clone(),
            token: TokenConfig {
                secret_file: self.secret.clone(),
                max_age_secs: self.token_max_age,
            },
            credentials: CredentialPaths {
                users: self.users.clone(),
                hosts: self.hosts.clone(),
                security: self.security.clone(),
            },
            nsupdate: NsUpdateConfig {
                exe: self.nsupdate.clone(),
                server: self.server.clone(),
                keyfile: self.key.clone(),
                zone: self.zone.clone(),
                ttl: self.ttl,
                timeout_secs: self.nsupdate_timeout,
            },
            worker: WorkerConfig {
                flush_interval_secs: self.flush_interval,
                ..WorkerConfig::default()
            },
            ip: IpConfig {
                proxy_header: self.proxy_header.clone(),
            },
            policy: PolicyConfig {
                allow_unseeded_users: self.allow_unseeded,
            },
            http_timeout_secs: self.http_timeout,
        };
        config.validate()?;

        config
            .listen
            .parse::<SocketAddr>()
            .with_context(|| format!("Invalid listen address '{}'", config.listen))?;

        for (flag, path) in [
            ("--nsupdate", &config.nsupdate.exe),
            ("--key", &config.nsupdate.keyfile),
        ] {
            if !path.is_file() {
                anyhow::bail!("{} file does not exist: {}", flag, path.display());
            }
        }

        Ok(config)
    }

    fn level(&self) -> Result<Level> {
        match self.log_level.to_lowercase().as_str() {
            "trace" => Ok(Level::TRACE),
            "debug" => Ok(Level::DEBUG),
            "info" => Ok(Level::INFO),
            "warn" => Ok(Level::WARN),
            "error" => Ok(Level::ERROR),
            _ => anyhow::bail!(
                "MYDYNS_LOG_LEVEL '{}' is not valid. \
                Valid levels: trace, debug, info, warn, error",
                self.log_level
            ),
        }
    }
}

fn main() -> ExitCode {
    let args = Args::parse();

    let config = match args.service_config() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Configuration error: {:#}", e);
            return DaemonExitCode::ConfigError.into();
        }
    };

    if let Err(e) = init_logging(&args) {
        eprintln!("Failed to set up logging: {:#}", e);
        return DaemonExitCode::ConfigError.into();
    }

    info!("Starting up on: {}", config.listen);

    let rt = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to create tokio runtime: {}", e);
            return DaemonExitCode::RuntimeError.into();
        }
    };

    rt.block_on(async {
        let daemon = match Daemon::start(config).await {
            Ok(daemon) => daemon,
            Err(e) => {
                error!("Startup failed: {:#}", e);
                return DaemonExitCode::ConfigError;
            }
        };

        match daemon.run().await {
            Ok(()) => DaemonExitCode::CleanShutdown,
            Err(e) => {
                error!("Daemon error: {:#}", e);
                DaemonExitCode::RuntimeError
            }
        }
    })
    .into()
}

/// Install the global subscriber, writing to the log file when one is given
fn init_logging(args: &Args) -> Result<()> {
    let level = args.level()?;
    let builder = FmtSubscriber::builder().with_max_level(level);

    match &args.log {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("error opening log file {}", path.display()))?;
            let subscriber = builder
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .finish();
            tracing::subscriber::set_global_default(subscriber)?;
        }
        None => {
            tracing::subscriber::set_global_default(builder.finish())?;
        }
    }

    Ok(())
}

/// Everything loaded at startup, ready to serve
struct Daemon {
    config: ServiceConfig,
    service: Arc<DynDns>,
    worker: UpdateWorker,
}

impl Daemon {
    /// Load the secret and databases and build the worker
    ///
    /// Any failure here aborts the process before traffic is served.
    async fn start(config: ServiceConfig) -> Result<Self> {
        let secret = tokio::fs::read(&config.token.secret_file)
            .await
            .with_context(|| {
                format!(
                    "Failed to read secret file {}",
                    config.token.secret_file.display()
                )
            })?;
        let codec = TokenCodec::new(secret)?.with_max_age(config.token.max_age_secs);

        let credentials = Arc::new(CredentialDb::open(config.credentials.clone()).await?);

        let dispatcher = NsUpdateDispatcher::new(config.nsupdate.clone())?;
        let (worker, queue, events) = UpdateWorker::new(Box::new(dispatcher), &config.worker)?;
        tokio::spawn(log_worker_events(events));

        let service = Arc::new(DynDns::new(
            codec,
            credentials,
            queue,
            config.policy.allow_unseeded_users,
        ));

        Ok(Self {
            config,
            service,
            worker,
        })
    }

    /// Serve until SIGTERM/SIGINT, then stop the worker
    async fn run(self) -> Result<()> {
        let (worker_shutdown_tx, worker_shutdown_rx) = oneshot::channel();
        let worker_handle = tokio::spawn(self.worker.run_with_shutdown(worker_shutdown_rx));

        let reload_handle = tokio::spawn(reload_on_hangup(Arc::clone(self.service.credentials())));

        let state = http::AppState::new(Arc::clone(&self.service), &self.config.ip.proxy_header)?;
        let app = http::router(state, Duration::from_secs(self.config.http_timeout_secs));

        let listener = tokio::net::TcpListener::bind(&self.config.listen)
            .await
            .with_context(|| format!("Failed to bind {}", self.config.listen))?;
        info!("Listening on {}", self.config.listen);

        let served = axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(shutdown_signal())
        .await;

        reload_handle.abort();
        let _ = worker_shutdown_tx.send(());
        match worker_handle.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!("Update worker failed: {}", e),
            Err(e) => warn!("Update worker task failed: {}", e),
        }

        served.context("HTTP server failed")?;
        info!("Shut down cleanly");
        Ok(())
    }
}

async fn log_worker_events(mut events: tokio::sync::mpsc::Receiver<mydyns_core::WorkerEvent>) {
    while let Some(event) = events.recv().await {
        tracing::debug!("Worker event: {:?}", event);
    }
}

/// Reload the credential databases whenever SIGHUP arrives
#[cfg(unix)]
async fn reload_on_hangup(credentials: Arc<CredentialDb>) {
    let mut sighup = match signal(SignalKind::hangup()) {
        Ok(sighup) => sighup,
        Err(e) => {
            warn!("Failed to set up SIGHUP handler, reloading disabled: {}", e);
            return;
        }
    };

    while sighup.recv().await.is_some() {
        match credentials.reload().await {
            Ok(()) => info!("Databases reloaded"),
            Err(e) => warn!("Reload failed, keeping current databases: {}", e),
        }
    }
}

#[cfg(not(unix))]
async fn reload_on_hangup(_credentials: Arc<CredentialDb>) {}

/// Resolve on SIGTERM or SIGINT
#[cfg(unix)]
async fn shutdown_signal() {
    let (mut sigterm, mut sigint) = match (
        signal(SignalKind::terminate()),
        signal(SignalKind::interrupt()),
    ) {
        (Ok(sigterm), Ok(sigint)) => (sigterm, sigint),
        (Err(e), _) | (_, Err(e)) => {
            warn!("Failed to set up signal handlers, falling back to CTRL-C: {}", e);
            let _ = tokio::signal::ctrl_c().await;
            info!("Received shutdown signal: SIGINT");
            return;
        }
    };

    let name = tokio::select! {
        _ = sigterm.recv() => "SIGTERM",
        _ = sigint.recv() => "SIGINT",
    };
    info!("Received shutdown signal: {}", name);
}

/// Resolve on CTRL-C
///
/// Fallback implementation for non-Unix platforms.
#[cfg(not(unix))]
async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    info!("Received shutdown signal: SIGINT");
}
