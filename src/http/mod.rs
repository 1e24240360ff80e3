//! Debug HTTP server surfaced only in debug feature builds.
//!
//! This module spawns a lightweight Axum server that exposes health, the
//! tracked sound list, SSE engine events, and live parameter patches.

#[cfg(all(feature = "debug_http", debug_assertions))]
mod routes;
#[cfg(all(feature = "debug_http", debug_assertions))]
mod sse;

use std::net::SocketAddr;

use tokio::sync::{broadcast, watch};

use crate::config::SharedConfig;
use crate::engine::core::EngineEvent;
use crate::engine::sound::SoundSnapshot;

#[cfg(all(feature = "debug_http", debug_assertions))]
pub use routes::{build_router, run_http_server, DebugHttpState};

/// Handles the debug server reads from a running session.
#[derive(Clone)]
pub struct DebugSources {
    pub config: SharedConfig,
    pub events: broadcast::Sender<EngineEvent>,
    pub sounds: watch::Receiver<Vec<SoundSnapshot>>,
}

/// Resolve the access token: explicit value, then `VISIONR_DEBUG_TOKEN`,
/// then the built-in default.
pub fn resolve_token(explicit: Option<String>) -> String {
    explicit
        .or_else(|| std::env::var("VISIONR_DEBUG_TOKEN").ok())
        .unwrap_or_else(|| "visionr-debug".to_string())
}

/// Spawn the debug HTTP server on the current tokio runtime.
///
/// Returns false when the build has the server compiled out or no runtime is
/// available.
pub fn spawn_if_enabled(sources: DebugSources, addr: SocketAddr, token: String) -> bool {
    #[cfg(all(feature = "debug_http", debug_assertions))]
    {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            log::warn!("[DebugHttp] No tokio runtime, server not started");
            return false;
        };
        let preview = token.chars().take(4).collect::<String>();
        log::info!(
            "[DebugHttp] Binding {} (token prefix {}***)",
            addr,
            preview
        );

        runtime.spawn(async move {
            let state = DebugHttpState::new(sources, token);
            if let Err(err) = run_http_server(state, addr).await {
                log::error!("[DebugHttp] Server stopped: {:#}", err);
            }
        });
        true
    }

    #[cfg(not(all(feature = "debug_http", debug_assertions)))]
    {
        let _ = (sources, token);
        log::warn!(
            "[DebugHttp] Requested on {} but this build has the debug_http feature disabled",
            addr
        );
        false
    }
}
