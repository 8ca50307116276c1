use std::sync::Arc;

use clap::Parser;
use dev_toolbox_mcp::{
    build_app,
    config::Config,
    docker_client,
    domain::{code_analysis, docker_control},
    logging, App, TransportMode,
};
use tracing::info;

#[derive(Parser)]
#[command(name = "dev-toolbox-mcp", about = "Development toolbox MCP server", version)]
struct Cli {
    /// Wire transport used by both tool servers.
    #[arg(long, value_enum, default_value = "sse")]
    transport: TransportMode,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    logging::init_logging();

    let cli = Cli::parse();
    let config = Config::from_env()?;

    let daemon = docker_client::connect_daemon().await;
    let code_analysis = Arc::new(code_analysis::registry(code_analysis::Toolchain::default())?);
    let docker_control = Arc::new(docker_control::registry(daemon)?);

    let App { router, lifecycle } = build_app(cli.transport, code_analysis, docker_control);
    let listener = tokio::net::TcpListener::bind(config.bind_socket()?).await?;

    info!(
        bind_addr = %config.bind_addr,
        bind_port = config.bind_port,
        transport = ?cli.transport,
        "server starting"
    );

    if let Some(lifecycle) = &lifecycle {
        lifecycle.open_all().await?;
    }

    let served = axum::serve(listener, router.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await;

    if let Some(lifecycle) = &lifecycle {
        lifecycle.close_all().await;
    }

    served?;
    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
