//! OAuth callback view.
//!
//! The identity provider redirects the browser to
//! `/auth/external/callback?code=...&state=...`; the flow owning `state` is
//! completed from here.

use anyhow::{Context, Result};
use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::Html,
    routing::get,
    Router,
};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::flow::{FlowManager, FlowResult};

pub const CALLBACK_PATH: &str = "/auth/external/callback";

/// Build the router serving the callback view.
pub fn build_router(flows: Arc<FlowManager>) -> Router {
    Router::new()
        .route(CALLBACK_PATH, get(oauth_callback))
        .with_state(flows)
}

async fn oauth_callback(
    State(flows): State<Arc<FlowManager>>,
    Query(query): Query<HashMap<String, String>>,
) -> (StatusCode, Html<String>) {
    match flows.handle_callback(query).await {
        Ok(FlowResult::CreateEntry { title, .. }) => (
            StatusCode::OK,
            page("Success", &format!("{} is now configured. You can close this window.", title)),
        ),
        Ok(FlowResult::Abort { reason, .. }) if reason == "reauth_successful" => (
            StatusCode::OK,
            page("Success", "Re-authentication succeeded. You can close this window."),
        ),
        Ok(FlowResult::Abort { reason, .. }) => (
            StatusCode::BAD_REQUEST,
            page("Authorization aborted", &reason),
        ),
        Ok(result) => {
            let reason = result.error().unwrap_or("unknown_error").to_string();
            (StatusCode::BAD_REQUEST, page("Authorization failed", &reason))
        }
        Err(e) => {
            error!("Callback handling failed: {:#}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                page("Authorization failed", "internal_error"),
            )
        }
    }
}

fn page(heading: &str, message: &str) -> Html<String> {
    Html(format!(
        "<!DOCTYPE html><html><head><title>taskbeacon</title></head>\
         <body><h1>{}</h1><p>{}</p></body></html>",
        heading, message
    ))
}

/// Running callback server.
pub struct CallbackServer {
    addr: SocketAddr,
    shutdown_tx: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

impl CallbackServer {
    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    /// Stop accepting connections and wait for the server to exit.
    pub async fn stop(self) {
        let _ = self.shutdown_tx.send(());
        if let Err(e) = self.task.await {
            error!("Callback server task failed: {}", e);
        }
    }
}

/// Bind the callback view and serve it in the background.
pub async fn start_callback_server(
    bind_address: &str,
    flows: Arc<FlowManager>,
) -> Result<CallbackServer> {
    let listener = TcpListener::bind(bind_address)
        .await
        .with_context(|| format!("Failed to bind callback server on {}", bind_address))?;
    let addr = listener
        .local_addr()
        .context("Failed to get callback server address")?;

    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
    let router = build_router(flows);
    let task = tokio::spawn(async move {
        let result = axum::serve(listener, router)
            .with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
            })
            .await;
        if let Err(e) = result {
            error!("Callback server error: {}", e);
        }
    });

    info!("OAuth callback view listening on http://{}{}", addr, CALLBACK_PATH);
    Ok(CallbackServer {
        addr,
        shutdown_tx,
        task,
    })
}
