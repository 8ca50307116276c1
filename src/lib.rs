use std::sync::Arc;

use axum::{middleware, Router};

pub mod config;
pub mod docker_client;
pub mod domain;
pub mod errors;
pub mod lifecycle;
pub mod logging;
pub mod mcp;
pub mod registry;
pub mod transport;

use lifecycle::{LifecycleManager, SessionContext};
use registry::ToolRegistry;
use transport::streamable::SessionStore;
pub use transport::TransportMode;

pub const CODE_ANALYSIS_PREFIX: &str = "/code";
pub const DOCKER_CONTROL_PREFIX: &str = "/docker";

pub struct App {
    pub router: Router,
    /// Present only in streamed-HTTP mode; SSE connections manage their own
    /// per-stream lifetime.
    pub lifecycle: Option<LifecycleManager>,
}

pub fn build_app(
    mode: TransportMode,
    code_analysis: Arc<ToolRegistry>,
    docker_control: Arc<ToolRegistry>,
) -> App {
    match mode {
        TransportMode::Sse => {
            let router = Router::new()
                .nest(CODE_ANALYSIS_PREFIX, transport::sse::router(code_analysis))
                .nest(DOCKER_CONTROL_PREFIX, transport::sse::router(docker_control))
                .layer(middleware::from_fn(logging::request_logging_middleware));

            App {
                router,
                lifecycle: None,
            }
        }
        TransportMode::StreamHttp => {
            let code_sessions = Arc::new(SessionStore::new("code-analysis"));
            let docker_sessions = Arc::new(SessionStore::new("docker-control"));

            let router = Router::new()
                .nest(
                    CODE_ANALYSIS_PREFIX,
                    transport::streamable::router(code_analysis, code_sessions.clone()),
                )
                .nest(
                    DOCKER_CONTROL_PREFIX,
                    transport::streamable::router(docker_control, docker_sessions.clone()),
                )
                .layer(middleware::from_fn(logging::request_logging_middleware));

            // Startup order mirrors the mount order; shutdown unwinds it.
            let contexts: Vec<Arc<dyn SessionContext>> = vec![code_sessions, docker_sessions];

            App {
                router,
                lifecycle: Some(LifecycleManager::new(contexts)),
            }
        }
    }
}
