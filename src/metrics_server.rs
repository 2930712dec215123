//! HTTP server for the metrics endpoint
//!
//! Serves the Prometheus exposition plus liveness/readiness probes and a
//! small landing page. TLS is enabled by pointing `--metrics-tls-config`
//! at a YAML file naming a certificate and key.

use crate::error::VirtaError;
use crate::metrics::Store;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse};
use axum::routing::get;
use axum::Router;
use axum_server::tls_rustls::RustlsConfig;
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{error, info};

#[derive(Debug, Deserialize)]
struct WebConfig {
    #[serde(default)]
    tls_server_config: Option<TlsServerConfig>,
}

#[derive(Debug, Deserialize)]
struct TlsServerConfig {
    cert_file: PathBuf,
    key_file: PathBuf,
}

pub struct MetricsServer;

impl MetricsServer {
    /// Bind the metrics address and start serving. Bind and TLS setup
    /// failures surface here so a bad bootstrap is fatal.
    pub async fn start(
        addr: SocketAddr,
        tls_config: Option<&Path>,
        store: Arc<Store>,
    ) -> Result<JoinHandle<()>, VirtaError> {
        let app = Router::new()
            .route("/", get(landing_handler))
            .route("/metrics", get(metrics_handler))
            .route("/-/healthy", get(probe_handler))
            .route("/-/ready", get(probe_handler))
            .with_state(store);

        let tls = match tls_config {
            Some(path) => load_tls(path).await?,
            None => None,
        };

        match tls {
            Some(rustls) => {
                info!(%addr, "metrics server listening (TLS)");
                Ok(tokio::spawn(async move {
                    if let Err(e) = axum_server::bind_rustls(addr, rustls)
                        .serve(app.into_make_service())
                        .await
                    {
                        error!(error = %e, "metrics server error");
                    }
                }))
            }
            None => {
                let listener = tokio::net::TcpListener::bind(addr).await?;
                info!(%addr, "metrics server listening");
                Ok(tokio::spawn(async move {
                    if let Err(e) = axum::serve(listener, app).await {
                        error!(error = %e, "metrics server error");
                    }
                }))
            }
        }
    }
}

async fn load_tls(path: &Path) -> Result<Option<RustlsConfig>, VirtaError> {
    let text = std::fs::read_to_string(path)?;
    let config: WebConfig = serde_yaml::from_str(&text)
        .map_err(|e| VirtaError::Config(format!("cannot parse TLS config {}: {e}", path.display())))?;
    let Some(tls) = config.tls_server_config else {
        return Ok(None);
    };
    let rustls = RustlsConfig::from_pem_file(&tls.cert_file, &tls.key_file)
        .await
        .map_err(|e| {
            VirtaError::Config(format!(
                "cannot load TLS certificate {}: {e}",
                tls.cert_file.display()
            ))
        })?;
    Ok(Some(rustls))
}

async fn metrics_handler(State(store): State<Arc<Store>>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
        store.gather(),
    )
}

async fn probe_handler() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

async fn landing_handler() -> Html<&'static str> {
    Html(
        "<html>\
         <head><title>VIRTA</title></head>\
         <body>\
         <h1>VIRTA</h1>\
         <p>Export Kubernetes Events to multiple destinations with routing and filtering</p>\
         <p><a href=\"/metrics\">Metrics</a></p>\
         </body>\
         </html>",
    )
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_metrics_handler_returns_prometheus_text() {
        let store = Arc::new(Store::new("test_server_").unwrap());
        store.events_processed.inc();

        let response = metrics_handler(State(Arc::clone(&store))).await.into_response();
        assert_eq!(response.status(), StatusCode::OK);

        let content_type = response
            .headers()
            .get("content-type")
            .unwrap()
            .to_str()
            .unwrap();
        assert!(content_type.contains("text/plain"));
    }

    #[tokio::test]
    async fn test_probe_handler() {
        let response = probe_handler().await.into_response();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_landing_links_metrics() {
        let html = landing_handler().await;
        assert!(html.0.contains("/metrics"));
    }

    #[tokio::test]
    async fn test_tls_config_without_tls_section() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("web.yaml");
        std::fs::write(&path, "{}").unwrap();
        assert!(load_tls(&path).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_start_binds_plain_http() {
        let store = Arc::new(Store::new("test_bind_").unwrap());
        let addr: SocketAddr = "127.0.0.1:0".parse().unwrap();
        let handle = MetricsServer::start(addr, None, store).await.unwrap();
        handle.abort();
    }
}
