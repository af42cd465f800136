// SPDX-FileCopyrightText: 2025 Timothy Pogue
//
// SPDX-License-Identifier: ISC

use std::{sync::Arc, time::Duration, net::SocketAddr};
use axum::{
    routing::get,
    Router,
    Extension,
};
use axum::response::{Json, IntoResponse};
use axum_server::{tls_rustls::RustlsConfig, Handle};
use serde::Serialize;
use tokio::signal;

use aba_common::constant::APP_NAME;
use aba_common::state::State;
use aba_common::telemetry::{create_trace_layer, error, info};

use crate::error::{WebhookError, WebhookResult};
use crate::router::v1::admission;

#[derive(Serialize)]
struct RootResponse {
    name: &'static str,
    version: &'static str,
}

pub fn create_router(app_state: Arc<State>) -> Router {
    Router::new()
        .nest("/admission", admission::router())
        .layer(Extension(app_state))
        .layer(create_trace_layer())
        // Root endpoint after the tracing layer to ensure
        // that the root endpoint is not traced
        .route("/", get(|| async {
            let response = RootResponse {
                name: APP_NAME,
                version: env!("CARGO_PKG_VERSION"),
            };
            Json(response).into_response()
        }))
}

pub async fn create_tls_config(cert_file: &str, key_file: &str) -> WebhookResult<RustlsConfig> {
    RustlsConfig::from_pem_file(cert_file, key_file)
        .await
        .map_err(|source| WebhookError::Tls {
            cert_file: cert_file.to_string(),
            key_file: key_file.to_string(),
            source,
        })
}

pub fn parse_address(host: &str, port: u16) -> WebhookResult<SocketAddr> {
    let addr = format!("{}:{}", host, port);
    addr.parse::<SocketAddr>().map_err(|_| WebhookError::InvalidAddress(addr))
}

/// Serve until `handle` is told to shut down
pub async fn serve(addr: SocketAddr, router: Router, tls_config: RustlsConfig, handle: Handle) -> WebhookResult<()> {
    axum_server::bind_rustls(addr, tls_config)
        .handle(handle)
        .serve(router.into_make_service())
        .await
        .map_err(WebhookError::from)
}

/// Run the webhook with the configured address and certificates until
/// SIGINT or SIGTERM
pub async fn run(state: Arc<State>) -> WebhookResult<()> {
    let webhook = state.webhook();
    let addr = parse_address(&webhook.host, webhook.port)?;
    let tls_config = create_tls_config(&webhook.tls.cert_file, &webhook.tls.key_file).await?;
    let router = create_router(state.clone());

    let handle = Handle::new();
    tokio::spawn(shutdown_signal(handle.clone()));

    info!(event = "Listening", address = %addr);
    serve(addr, router, tls_config, handle).await
}

pub async fn shutdown_signal(handle: Handle) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(event = "SignalHandlerFailed", signal = "SIGINT", error = %e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!(event = "SignalHandlerFailed", signal = "SIGTERM", error = %e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => (),
        _ = terminate => (),
    }

    info!(event = "ShuttingDown");
    handle.graceful_shutdown(Some(Duration::from_secs(10)));
}
