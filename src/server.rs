// src/server.rs

//! Development server: serves the output root and relays reload signals to
//! connected browsers via a long-poll endpoint.
//!
//! Files come from `tower_http`'s `ServeDir`, which handles percent-decoding,
//! directory indexes, content types and traversal checks. HTML responses
//! pass through a layer that appends the reload client.

use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::{Context, Result};
use axum::Router;
use axum::body::Body;
use axum::extract::State;
use axum::http::{StatusCode, header};
use axum::middleware;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tower_http::services::ServeDir;
use tracing::{debug, info, warn};

use crate::engine::ReloadSignal;

/// Long-poll endpoint answered once per reload signal.
pub const RELOAD_PATH: &str = "/__reload";

/// Client injected into every served HTML page.
pub const RELOAD_CLIENT: &str = "<script>(function(){function poll(){fetch('/__reload').then(function(r){if(r.ok){location.reload();}else{setTimeout(poll,1000);}}).catch(function(){setTimeout(poll,1000);});}poll();})();</script>";

#[derive(Clone)]
struct ServerState {
    reload_tx: broadcast::Sender<ReloadSignal>,
}

/// Running dev server.
#[derive(Debug)]
pub struct DevServer {
    addr: SocketAddr,
    handle: JoinHandle<()>,
}

impl DevServer {
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn url(&self) -> String {
        format!("http://{}/", self.addr)
    }

    /// Stop serving; in-flight long polls are dropped.
    pub fn shutdown(self) {
        self.handle.abort();
    }
}

/// Routes for serving `root`, with `/__reload` bound to `reload_tx`.
pub fn router(root: impl Into<PathBuf>, reload_tx: broadcast::Sender<ReloadSignal>) -> Router {
    let state = ServerState { reload_tx };
    let files = ServeDir::new(root.into()).append_index_html_on_directories(true);

    Router::new()
        .route(RELOAD_PATH, get(wait_for_reload))
        .fallback_service(files)
        .layer(middleware::map_response(inject_into_html))
        .with_state(state)
}

/// Bind `127.0.0.1:port` and serve `root` in a background task.
pub async fn start(
    port: u16,
    root: impl Into<PathBuf>,
    reload_tx: broadcast::Sender<ReloadSignal>,
) -> Result<DevServer> {
    let root = root.into();
    let bind = SocketAddr::from(([127, 0, 0, 1], port));
    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .with_context(|| format!("binding dev server to {bind}"))?;
    let addr = listener.local_addr()?;

    info!(%addr, root = %root.display(), "dev server listening");

    let app = router(root, reload_tx);
    let handle = tokio::spawn(async move {
        if let Err(err) = axum::serve(listener, app).await {
            warn!(error = %err, "dev server stopped");
        }
    });

    Ok(DevServer { addr, handle })
}

/// Launch `browser` (a command line, program first) pointed at `url`.
///
/// An empty command disables the launch. Failures are logged only.
pub async fn launch_browser(browser: &str, url: &str) {
    let mut parts = browser.split_whitespace();
    let Some(program) = parts.next() else {
        return;
    };

    let mut cmd = tokio::process::Command::new(program);
    cmd.args(parts).arg(url);

    match cmd.spawn() {
        Ok(_child) => info!(browser = %program, %url, "browser launched"),
        Err(err) => warn!(browser = %program, error = %err, "failed to launch browser"),
    }
}

async fn wait_for_reload(State(state): State<ServerState>) -> Response {
    let mut rx = state.reload_tx.subscribe();
    match rx.recv().await {
        Ok(signal) => {
            debug!(generation = signal.generation, "reload delivered");
            signal.generation.to_string().into_response()
        }
        // A missed signal still means the page is stale.
        Err(broadcast::error::RecvError::Lagged(_)) => "reload".into_response(),
        Err(broadcast::error::RecvError::Closed) => StatusCode::SERVICE_UNAVAILABLE.into_response(),
    }
}

/// Buffer successful HTML responses and add the reload client.
async fn inject_into_html(response: Response) -> Response {
    let is_html = response.status() == StatusCode::OK
        && response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v.starts_with("text/html"));
    if !is_html {
        return response;
    }

    let (mut parts, body) = response.into_parts();
    let bytes = match axum::body::to_bytes(body, usize::MAX).await {
        Ok(bytes) => bytes,
        Err(err) => {
            warn!(error = %err, "failed to buffer html response");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    let html = inject_reload_client(&String::from_utf8_lossy(&bytes));
    parts.headers.remove(header::CONTENT_LENGTH);
    Response::from_parts(parts, Body::from(html))
}

/// Insert [`RELOAD_CLIENT`] before the last `</body>`, or append it.
pub fn inject_reload_client(html: &str) -> String {
    match html.rfind("</body>") {
        Some(idx) => {
            let mut out = String::with_capacity(html.len() + RELOAD_CLIENT.len());
            out.push_str(&html[..idx]);
            out.push_str(RELOAD_CLIENT);
            out.push_str(&html[idx..]);
            out
        }
        None => format!("{html}{RELOAD_CLIENT}"),
    }
}
