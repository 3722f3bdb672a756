use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;

use crate::admission::AdmissionGateway;
use crate::config::AppConfig;
use crate::errors::Result;
use crate::http::{build_router, AppState};
use crate::logging::{self, LogQueue};
use crate::matches::{MatchStore, MemoryStore, PostgresStore};
use crate::realtime::{LivenessSupervisor, RealtimeHub, Registry};

pub struct Server {
    config: AppConfig,
}

impl Server {
    pub fn new(config: AppConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Serve until Ctrl-C or SIGTERM
    pub async fn run(self) -> Result<()> {
        self.run_until(shutdown_signal()).await
    }

    /// Bind the configured address and serve until `shutdown` resolves
    pub async fn run_until<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let listener = TcpListener::bind(self.config.addr()).await?;
        self.serve(listener, shutdown).await
    }

    /// Serve on an already bound listener.
    ///
    /// On shutdown the listener stops accepting and every WebSocket is
    /// terminated. Upgraded sockets are detached from the HTTP server, so a
    /// second drain after it returns catches upgrades that completed late.
    pub async fn serve<F>(self, listener: TcpListener, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        logging::install(self.config.log.clone())?;

        let (store, postgres) = open_store(&self.config).await?;
        let admission = Arc::new(AdmissionGateway::from_config(&self.config.policy)?);

        let registry = Arc::new(Registry::new());
        let hub = Arc::new(RealtimeHub::new(Arc::clone(&registry)));
        let supervisor = Arc::new(LivenessSupervisor::new(
            Arc::clone(&registry),
            self.config.heartbeat.clone(),
        ));
        let heartbeat = Arc::clone(&supervisor).spawn();

        let state = AppState::new(store, Arc::clone(&hub), admission);
        let app = build_router(state);

        log::info!(
            "matchcast listening on http://{} (ws on /ws, heartbeat every {:?})",
            listener.local_addr()?,
            self.config.heartbeat.interval
        );

        let draining = Arc::clone(&hub);
        let served = axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(async move {
            shutdown.await;
            log::info!("shutdown requested, closing connections");
            let closed = draining.shutdown();
            log::info!("closed {} websocket connections", closed);
        })
        .await;

        heartbeat.abort();
        let late = hub.shutdown();
        if late > 0 {
            log::info!("closed {} websocket connections opened during shutdown", late);
        }
        let stats = supervisor.stats();
        log::info!(
            "heartbeat stopped after {} cycles ({} evictions)",
            stats.total_cycles,
            stats.total_evictions
        );
        if let Some(postgres) = postgres {
            postgres.close().await;
        }
        log::info!("server stopped");
        LogQueue::shutdown();

        served.map_err(Into::into)
    }
}

async fn open_store(
    config: &AppConfig,
) -> Result<(Arc<dyn MatchStore>, Option<Arc<PostgresStore>>)> {
    match &config.database {
        Some(database) => {
            let postgres = Arc::new(PostgresStore::connect(database).await?);
            postgres.migrate().await?;
            log::info!(
                "using postgres store (max {} connections)",
                database.max_connections
            );
            let store: Arc<dyn MatchStore> = postgres.clone();
            Ok((store, Some(postgres)))
        }
        None => {
            log::warn!("DATABASE_URL not set, using the in-memory store");
            Ok((Arc::new(MemoryStore::new()), None))
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            log::error!("failed to listen for ctrl-c: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                log::error!("failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
