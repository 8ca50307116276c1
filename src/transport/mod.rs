//! Wire transports for the tool servers
//!
//! Two interchangeable adapters bind a `ToolRegistry` to HTTP: a push-stream
//! SSE channel and a session-correlated streamable-HTTP exchange. Exactly one
//! mode is active per process run, picked at startup.

pub mod sse;
pub mod streamable;

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum TransportMode {
    /// Server-initiated event channel per client connection.
    Sse,
    /// Discrete, session-correlated HTTP exchanges.
    StreamHttp,
}
