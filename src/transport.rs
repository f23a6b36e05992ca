//! WebSocket transport: accepts connections and feeds each text frame to
//! the Request Dispatcher. Glue only — spec.md §1 calls the transport and
//! connection lifecycle external collaborators; this module exists so the
//! binary has something to run, not to add domain logic.

use std::net::SocketAddr;
use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, info, instrument, warn};

use crate::dispatcher::dispatch;
use crate::slicer::Slicer;

/// Binds `addr` and serves connections until the process is asked to stop.
/// Each connection runs on its own task; a worker pool (tokio's
/// multi-threaded runtime) serves many clients concurrently, matching
/// spec.md §5. A disconnecting client simply drops its task — nothing is
/// leaked, since the index and memory map are shared, not per-connection.
#[instrument(skip(slicer), fields(addr = %addr))]
pub async fn serve(addr: SocketAddr, slicer: Arc<Slicer>) -> std::io::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    info!("listening for viewport clients");

    loop {
        let (stream, peer) = match listener.accept().await {
            Ok(pair) => pair,
            Err(e) => {
                warn!(error = %e, "accept failed, continuing");
                continue;
            }
        };
        let slicer = Arc::clone(&slicer);
        tokio::spawn(async move {
            if let Err(e) = handle_connection(stream, peer, slicer).await {
                debug!(peer = %peer, error = %e, "connection ended");
            }
        });
    }
}

async fn handle_connection(
    stream: TcpStream,
    peer: SocketAddr,
    slicer: Arc<Slicer>,
) -> tokio_tungstenite::tungstenite::Result<()> {
    let ws = tokio_tungstenite::accept_async(stream).await?;
    info!(%peer, "client connected");
    let (mut write, mut read) = ws.split();

    // Responses are written in the order requests are completed, which for
    // a single connection processed sequentially here is simply request
    // order — satisfying the FIFO ordering guarantee in spec.md §5 without
    // any extra sequencing layer.
    while let Some(msg) = read.next().await {
        match msg? {
            Message::Text(text) => {
                let reply = dispatch(&text, &slicer);
                write.send(Message::Text(reply)).await?;
            }
            Message::Close(frame) => {
                write.send(Message::Close(frame)).await?;
                break;
            }
            Message::Ping(payload) => {
                write.send(Message::Pong(payload)).await?;
            }
            _ => {}
        }
    }

    info!(%peer, "client disconnected");
    Ok(())
}
