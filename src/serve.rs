//! Snapshot server for display clients.
//!
//! Each client receives the current snapshot as one JSON line right after
//! connecting. After that it gets one line per published snapshot: the full
//! snapshot in [`StreamMode::Full`], or a [`SnapshotDiff`] against the last
//! line it was sent in [`StreamMode::Diff`]. A client that reads slowly skips
//! intermediate snapshots rather than holding anything up; in diff mode the
//! skipped changes are folded into its next diff.
//!
//! [`SnapshotDiff`]: topicwatch_types::SnapshotDiff

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::Deserialize;
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use topicwatch_core::{ShutdownSignal, Snapshot};
use tracing::{debug, info, warn};

/// What follows the initial snapshot on a client connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamMode {
    /// Every line is a full snapshot.
    #[default]
    Full,
    /// Every line after the first is a diff against the previous line.
    Diff,
}

/// Bind the snapshot server.
pub async fn bind(addr: &str) -> Result<TcpListener> {
    TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind snapshot server on {addr}"))
}

/// Accept clients until shutdown.
pub fn spawn(
    listener: TcpListener,
    snapshots: watch::Receiver<Arc<Snapshot>>,
    mode: StreamMode,
    mut shutdown: ShutdownSignal,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        if let Ok(addr) = listener.local_addr() {
            info!(%addr, ?mode, "snapshot server listening");
        }

        loop {
            tokio::select! {
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        tokio::spawn(serve_client(stream, peer, snapshots.clone(), mode, shutdown.clone()));
                    }
                    Err(e) => warn!(error = %e, "failed to accept client"),
                },
                _ = shutdown.wait() => break,
            }
        }
        debug!("snapshot server stopped");
    })
}

async fn serve_client(
    mut stream: TcpStream,
    peer: SocketAddr,
    mut snapshots: watch::Receiver<Arc<Snapshot>>,
    mode: StreamMode,
    mut shutdown: ShutdownSignal,
) {
    debug!(%peer, "client connected");

    let mut sent: Option<Arc<Snapshot>> = None;
    loop {
        let snapshot = snapshots.borrow_and_update().clone();
        let line = match (&sent, mode) {
            (Some(previous), StreamMode::Diff) => serde_json::to_vec(&snapshot.diff(previous)),
            _ => serde_json::to_vec(snapshot.as_ref()),
        };
        let line = match line {
            Ok(line) => line,
            Err(e) => {
                warn!(%peer, error = %e, "failed to encode snapshot");
                return;
            }
        };

        // A client that stops reading must not hold up shutdown
        tokio::select! {
            written = write_line(&mut stream, line) => {
                if let Err(e) = written {
                    debug!(%peer, error = %e, "client disconnected");
                    return;
                }
            }
            _ = shutdown.wait() => return,
        }
        sent = Some(snapshot);

        tokio::select! {
            changed = snapshots.changed() => {
                if changed.is_err() {
                    return;
                }
            }
            _ = shutdown.wait() => return,
        }
    }
}

async fn write_line(stream: &mut TcpStream, mut line: Vec<u8>) -> std::io::Result<()> {
    line.push(b'\n');
    stream.write_all(&line).await
}
