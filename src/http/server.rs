//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Build the target resolver for the configured mode
//! - Create the Axum router around the dispatcher
//! - Wire up middleware (request ID, tracing)
//! - Apply configuration reloads to the live target
//! - Serve until the shutdown signal fires

use axum::{routing::any, Router};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc};
use tower_http::{
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};

use crate::config::{ProxyConfig, ProxyMode, ProxySettings};
use crate::http::dispatch::dispatch;
use crate::http::relay::build_client;
use crate::http::transform::TransformRules;
use crate::target::{
    FileStore, MemoryStore, SettingStore, TargetCell, TargetRecord, TargetResolver,
};

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub resolver: TargetResolver,
    pub client: reqwest::Client,
    pub settings: Arc<ProxySettings>,
}

impl AppState {
    pub fn rules(&self) -> TransformRules<'_> {
        TransformRules {
            route_prefix: &self.settings.route_prefix,
            upstream_tls: self.settings.upstream_tls,
        }
    }
}

/// HTTP server for the reverse proxy.
pub struct HttpServer {
    router: Router,
    state: AppState,
    config: ProxyConfig,
}

impl HttpServer {
    /// Create a new HTTP server with the given configuration.
    pub fn new(config: ProxyConfig) -> Result<Self, reqwest::Error> {
        let state = AppState {
            resolver: build_resolver(&config),
            client: build_client(config.proxy.use_env_proxy)?,
            settings: Arc::new(config.proxy.clone()),
        };

        let router = Self::build_router(state.clone());
        Ok(Self {
            router,
            state,
            config,
        })
    }

    /// Build the Axum router with all middleware layers.
    fn build_router(state: AppState) -> Router {
        Router::new()
            .route("/", any(dispatch))
            .route("/{*path}", any(dispatch))
            .with_state(state)
            .layer(PropagateRequestIdLayer::x_request_id())
            .layer(TraceLayer::new_for_http())
            .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
    }

    /// Router without a listener, for in-process requests.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Resolver shared with the handlers.
    pub fn resolver(&self) -> &TargetResolver {
        &self.state.resolver
    }

    /// Run the server, accepting connections on the given listener.
    ///
    /// Configurations received on `config_updates` replace the direct-mode
    /// target record. Returns once `shutdown` fires and in-flight HTTP
    /// requests have finished.
    pub async fn run(
        self,
        listener: TcpListener,
        mut config_updates: mpsc::UnboundedReceiver<ProxyConfig>,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            mode = self.config.proxy.mode.as_str(),
            route_prefix = %self.config.proxy.route_prefix,
            "HTTP server starting"
        );

        let resolver = self.state.resolver.clone();
        let mode = self.config.proxy.mode;
        let reload = tokio::spawn(async move {
            while let Some(config) = config_updates.recv().await {
                if config.proxy.mode != mode {
                    tracing::warn!(
                        running = mode.as_str(),
                        requested = config.proxy.mode.as_str(),
                        "Mode changes need a restart; ignoring"
                    );
                }
                if mode == ProxyMode::Direct {
                    resolver.replace(TargetRecord::from(&config.target));
                    tracing::info!(
                        target_host = %config.target.target_host,
                        "Applied reloaded target record"
                    );
                }
            }
        });

        axum::serve(listener, self.router)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("Shutdown signal received");
            })
            .await?;

        reload.abort();
        tracing::info!("HTTP server stopped");
        Ok(())
    }

    /// Get a reference to the config.
    pub fn config(&self) -> &ProxyConfig {
        &self.config
    }
}

fn build_resolver(config: &ProxyConfig) -> TargetResolver {
    match config.proxy.mode {
        ProxyMode::Prefixed => {
            let store: Arc<dyn SettingStore> = match &config.storage.target_file {
                Some(path) => Arc::new(FileStore::new(path)),
                None => Arc::new(MemoryStore::new()),
            };
            tracing::debug!(store = ?store, "Using persisted target store");
            TargetResolver::Persisted(store)
        }
        ProxyMode::Direct => {
            let cell = TargetCell::new(TargetRecord::from(&config.target));
            TargetResolver::InMemory(Arc::new(cell))
        }
    }
}
