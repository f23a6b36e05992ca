//! Binary entry point: load configuration, build/load the index, then
//! serve viewport clients. Fatal startup errors (bad config, unreadable
//! data file, index build I/O failure) are logged and terminate the
//! process (spec.md §7).

use rowtable_server::{AppState, Config};
use tracing_subscriber::EnvFilter;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = match Config::load() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!(error = %e, "configuration error");
            std::process::exit(1);
        }
    };

    let state = match AppState::bootstrap(&config) {
        Ok(state) => state,
        Err(e) => {
            tracing::error!(error = %e, "startup failed");
            std::process::exit(1);
        }
    };

    let addr: std::net::SocketAddr = match config.bind_addr.parse() {
        Ok(addr) => addr,
        Err(e) => {
            tracing::error!(error = %e, bind_addr = %config.bind_addr, "invalid bind address");
            std::process::exit(1);
        }
    };

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .expect("failed to start tokio runtime");

    runtime.block_on(async {
        if let Err(e) = rowtable_server::transport::serve(addr, state.slicer).await {
            tracing::error!(error = %e, "server loop exited with an error");
            std::process::exit(1);
        }
    });
}
