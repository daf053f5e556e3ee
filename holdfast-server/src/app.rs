// Copyright 2026 Holdfast Contributors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Application initialization and runtime.
//!
//! This module wires the pieces together: credential store, quota tally,
//! Prometheus recorder, router, the HTTP or HTTPS listener, graceful
//! shutdown, and the SIGHUP credential reload.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::net::TcpListener;
use tracing::{info, warn};

use holdfast_api::{create_router, AppState, HtpasswdFile};
use holdfast_core::QuotaManager;

use crate::config::Config;

const GIB: f64 = (1024 * 1024 * 1024) as f64;

/// Main application.
pub struct App {
    config: Config,
}

impl App {
    /// Validates the configuration and prepares the data directory.
    pub async fn new(config: Config) -> Result<Self> {
        config
            .tls
            .validate()
            .map_err(|e| anyhow::anyhow!("TLS configuration error: {}", e))?;

        tokio::fs::create_dir_all(&config.data_dir)
            .await
            .with_context(|| format!("cannot create data directory {:?}", config.data_dir))?;

        Ok(Self { config })
    }

    /// Runs the server until SIGINT or SIGTERM.
    pub async fn run(self) -> Result<()> {
        let config = &self.config;
        info!("data directory: {}", config.data_dir.display());

        let htpasswd = self.load_htpasswd()?;
        let quota = self.init_quota().await?;

        let prometheus_handle = if config.metrics.enabled {
            use metrics_exporter_prometheus::PrometheusBuilder;
            match PrometheusBuilder::new().install_recorder() {
                Ok(handle) => {
                    info!("Prometheus metrics enabled at /metrics");
                    Some(handle)
                }
                Err(e) => {
                    warn!("failed to install Prometheus recorder: {}; metrics disabled", e);
                    None
                }
            }
        } else {
            None
        };

        for (flag, name) in [
            (config.append_only, "append-only mode"),
            (config.write_only, "write-only mode"),
            (config.private_repos, "private repositories"),
            (config.group_accessible_repos, "group-accessible repositories"),
        ] {
            if flag {
                info!("{} enabled", name);
            }
        }

        let mut state = AppState::new(config.data_dir.clone());
        state.no_auth = config.no_auth;
        state.proxy_auth_header = config.proxy_auth_header.clone();
        state.quota = quota;
        state.append_only = config.append_only;
        state.write_only = config.write_only;
        state.private_repos = config.private_repos;
        state.no_verify_upload = config.no_verify_upload;
        state.group_accessible_repos = config.group_accessible_repos;
        state.panic_on_error = config.panic_on_error;
        state.prometheus = config.metrics.enabled && prometheus_handle.is_some();
        state.prometheus_no_auth = config.metrics.no_auth;
        state.prometheus_handle = prometheus_handle;
        state.htpasswd = htpasswd.clone();

        if let Some(store) = htpasswd {
            spawn_sighup_reload(store);
        }

        let router = create_router(state);
        let addr: SocketAddr = config
            .bind
            .parse()
            .with_context(|| format!("invalid bind address {:?}", config.bind))?;

        if config.tls.enabled {
            self.run_https(addr, router).await
        } else {
            info!("listening on http://{}", addr);
            run_http(addr, router).await
        }
    }

    /// Opens the htpasswd file unless authentication is disabled or
    /// delegated to a proxy.
    fn load_htpasswd(&self) -> Result<Option<Arc<HtpasswdFile>>> {
        let config = &self.config;
        if config.no_auth {
            info!("authentication disabled");
            return Ok(None);
        }
        if config.proxy_auth_header.is_some() {
            info!("proxy authentication enabled");
            return Ok(None);
        }

        let path = config
            .htpasswd_path
            .clone()
            .unwrap_or_else(|| config.data_dir.join(".htpasswd"));
        let store = HtpasswdFile::open(&path).with_context(|| {
            format!(
                "cannot load htpasswd file {:?} (set HOLDFAST_NO_AUTH=1 to disable auth)",
                path
            )
        })?;
        info!("authentication enabled, htpasswd file {}", path.display());
        Ok(Some(Arc::new(store)))
    }

    /// Tallies current disk usage when a maximum size is configured.
    async fn init_quota(&self) -> Result<Option<Arc<QuotaManager>>> {
        let max_size = self.config.max_repo_size;
        if max_size == 0 {
            return Ok(None);
        }

        info!("initializing quota (this can take a while)...");
        let root = self.config.data_dir.clone();
        let manager = tokio::task::spawn_blocking(move || QuotaManager::new(&root, max_size))
            .await
            .context("quota tally task failed")?
            .context("cannot tally repository size")?;
        info!(
            "quota initialized, currently using {:.2} GiB of {:.2} GiB",
            manager.space_used() as f64 / GIB,
            max_size as f64 / GIB,
        );
        Ok(Some(Arc::new(manager)))
    }

    /// Runs the HTTPS listener via axum-server's rustls support.
    async fn run_https(&self, addr: SocketAddr, router: axum::Router) -> Result<()> {
        use axum_server::tls_rustls::RustlsConfig;

        let cert = self
            .config
            .tls
            .cert_path
            .as_ref()
            .context("TLS certificate path not configured")?;
        let key = self
            .config
            .tls
            .key_path
            .as_ref()
            .context("TLS private key path not configured")?;

        info!("loading TLS certificate from {}", cert.display());
        let rustls_config = RustlsConfig::from_pem_file(cert, key)
            .await
            .context("failed to load TLS certificate and key")?;

        let handle = axum_server::Handle::new();
        let shutdown_handle = handle.clone();
        tokio::spawn(async move {
            shutdown_signal().await;
            shutdown_handle.graceful_shutdown(Some(std::time::Duration::from_secs(30)));
        });

        info!("listening on https://{}", addr);
        axum_server::bind_rustls(addr, rustls_config)
            .handle(handle)
            .serve(router.into_make_service())
            .await?;

        info!("server shutdown complete");
        Ok(())
    }
}

/// Runs the plain HTTP listener with graceful shutdown.
async fn run_http(addr: SocketAddr, router: axum::Router) -> Result<()> {
    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    info!("server shutdown complete");
    Ok(())
}

/// Forces a credential reload on SIGHUP, matching the usual daemon
/// convention. No-op on platforms without SIGHUP.
#[cfg(unix)]
fn spawn_sighup_reload(store: Arc<HtpasswdFile>) {
    use tokio::signal::unix::{signal, SignalKind};

    tokio::spawn(async move {
        let mut hangup = match signal(SignalKind::hangup()) {
            Ok(s) => s,
            Err(e) => {
                warn!("cannot install SIGHUP handler: {}", e);
                return;
            }
        };
        while hangup.recv().await.is_some() {
            let store = store.clone();
            let result = tokio::task::spawn_blocking(move || store.reload()).await;
            match result {
                Ok(Ok(())) => info!("reloaded htpasswd file"),
                Ok(Err(e)) => warn!("could not reload htpasswd file: {}", e),
                Err(e) => warn!("htpasswd reload task failed: {}", e),
            }
        }
    });
}

#[cfg(not(unix))]
fn spawn_sighup_reload(_store: Arc<HtpasswdFile>) {}

/// Resolves when SIGINT or SIGTERM arrives.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                term.recv().await;
            }
            Err(e) => {
                warn!("failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("received Ctrl+C, shutting down");
        }
        _ = terminate => {
            info!("received terminate signal, shutting down");
        }
    }
}
