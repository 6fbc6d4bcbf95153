//! Coordinator process entrypoint: loads configuration, wires the
//! session store, manager, and audit log together, and serves the wire
//! protocol over WebSocket.

use std::net::SocketAddr;
use std::sync::Arc;

use clap::Parser;
use multisig_audit::AuditLog;
use multisig_common::config::{Config, StoreBackend};
use multisig_server::AppState;
use multisig_session::{NoopExecutor, SessionManager};
use multisig_store::{EtcdStore, MemoryStore, SessionStore};

#[derive(Parser, Debug)]
#[command(name = "multisig-server")]
struct Args {
    /// Path to a config file layered over the built-in defaults.
    #[arg(long)]
    config: Option<String>,

    /// Override the configured listen port.
    #[arg(long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .json()
        .init();

    let args = Args::parse();
    let mut config = Config::load(args.config.as_deref())?;
    if let Some(port) = args.port {
        config.listen_port = port;
    }

    let store: Arc<dyn SessionStore> = match config.store_backend {
        StoreBackend::Memory => Arc::new(MemoryStore::new()),
        StoreBackend::ReplicatedKv => {
            Arc::new(EtcdStore::connect(&config.replicated_kv.endpoints, config.replicated_kv.key_prefix.clone()).await?)
        }
    };

    let manager = Arc::new(SessionManager::new(store, Arc::new(NoopExecutor), config.clone()));
    let audit = Arc::new(AuditLog::new());

    multisig_scheduler::spawn_default_sweep_task(manager.clone());

    let state = AppState::new(manager, audit, config.clone());
    let app = multisig_server::app(state);

    let addr: SocketAddr = format!("{}:{}", config.listen_host, config.listen_port).parse()?;
    tracing::info!(%addr, "multisig coordinator listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
