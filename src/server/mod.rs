pub mod api;
pub mod client;
pub mod error;

use crate::cli::Args;
use axum::Router;
use log::{ error, info };
use std::error::Error;
use std::net::SocketAddr;

pub use api::{ create_router, ApiSettings, AppState };

pub struct Server {
    addr: SocketAddr,
    app: Router,
    args: Args,
}

impl Server {
    pub fn new(addr: SocketAddr, state: AppState, args: Args) -> Self {
        let app = create_router(state, &args.origins());
        Self { addr, app, args }
    }

    pub async fn run(self) -> Result<(), Box<dyn Error + Send + Sync>> {
        let tls = match (self.args.enable_tls, &self.args.tls_cert_path, &self.args.tls_key_path) {
            (true, Some(cert), Some(key)) => Some((cert.clone(), key.clone())),
            (true, _, _) => {
                error!("ENABLE_TLS was set but TLS_CERT_PATH and TLS_KEY_PATH were not both provided.");
                return Err("TLS enabled without cert/key".into());
            }
            (false, _, _) => None,
        };

        match tls {
            Some((cert, key)) => self.serve_tls(cert, key).await,
            None => self.serve_plain().await,
        }
    }

    async fn serve_plain(self) -> Result<(), Box<dyn Error + Send + Sync>> {
        let listener = tokio::net::TcpListener::bind(self.addr).await.map_err(|e| {
            format!("Failed to bind HTTP server to {}: {}. Try a different port.", self.addr, e)
        })?;
        info!("HTTP server listening on http://{}", self.addr);

        axum::serve(listener, self.app.into_make_service_with_connect_info::<SocketAddr>())
            .with_graceful_shutdown(shutdown_signal())
            .await?;
        info!("HTTP server stopped");
        Ok(())
    }

    async fn serve_tls(self, cert_path: String, key_path: String) -> Result<(), Box<dyn Error + Send + Sync>> {
        info!("TLS enabled. Loading certificate from '{}' and key from '{}'", cert_path, key_path);
        let tls_config = axum_server::tls_rustls::RustlsConfig::from_pem_file(cert_path, key_path).await?;

        let handle = axum_server::Handle::new();
        let shutdown = handle.clone();
        tokio::spawn(async move {
            shutdown_signal().await;
            shutdown.graceful_shutdown(None);
        });

        info!("HTTPS server listening on https://{}", self.addr);
        axum_server::bind_rustls(self.addr, tls_config)
            .handle(handle)
            .serve(self.app.into_make_service_with_connect_info::<SocketAddr>())
            .await?;
        info!("HTTPS server stopped");
        Ok(())
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutting down...");
}
