//! Output backends for published snapshots.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use topicwatch_types::Snapshot;

const TCP_CONNECT_TIMEOUT: Duration = Duration::from_secs(2);

/// Where the publisher pushes each snapshot, in addition to its subscribers.
#[derive(Debug, Clone)]
pub enum Output {
    /// Write snapshots to a JSON file.
    ///
    /// The file is overwritten with each snapshot.
    File(PathBuf),

    /// Send snapshots to a TCP server.
    ///
    /// Each snapshot is sent as a newline-delimited JSON message over a fresh
    /// connection. Delivery is best effort.
    Tcp(String),

    /// Send snapshots through a channel.
    ///
    /// Snapshots are dropped while the channel is full.
    Channel(mpsc::Sender<Arc<Snapshot>>),
}

impl Output {
    /// Create a file output.
    ///
    /// # Example
    ///
    /// ```rust
    /// use topicwatch_core::Output;
    ///
    /// let output = Output::file("topics.json");
    /// ```
    pub fn file(path: impl Into<PathBuf>) -> Self {
        Output::File(path.into())
    }

    pub fn tcp(addr: impl Into<String>) -> Self {
        Output::Tcp(addr.into())
    }

    /// Create a channel output and return both the output and receiver.
    pub fn channel(buffer: usize) -> (Self, mpsc::Receiver<Arc<Snapshot>>) {
        let (tx, rx) = mpsc::channel(buffer);
        (Output::Channel(tx), rx)
    }

    /// Short description for logs.
    pub fn describe(&self) -> String {
        match self {
            Output::File(path) => format!("file:{}", path.display()),
            Output::Tcp(addr) => format!("tcp:{addr}"),
            Output::Channel(_) => "channel".to_string(),
        }
    }

    /// Emit a snapshot to this output.
    pub(crate) async fn emit(&self, snapshot: &Arc<Snapshot>) -> std::io::Result<()> {
        match self {
            Output::File(path) => {
                let json = serde_json::to_string_pretty(snapshot.as_ref())?;
                tokio::fs::write(path, json).await?;
            }
            Output::Tcp(addr) => {
                let connect = TcpStream::connect(addr.as_str());
                let mut stream = tokio::time::timeout(TCP_CONNECT_TIMEOUT, connect)
                    .await
                    .map_err(|_| std::io::Error::from(std::io::ErrorKind::TimedOut))??;
                let mut line = serde_json::to_vec(snapshot.as_ref())?;
                line.push(b'\n');
                stream.write_all(&line).await?;
            }
            Output::Channel(tx) => {
                // Don't block the publisher if the consumer is slow
                let _ = tx.try_send(snapshot.clone());
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncBufReadExt;

    fn snapshot() -> Arc<Snapshot> {
        Arc::new(
            Snapshot::builder()
                .timestamp_ms(1_000)
                .topic("gps", |t| t.last_seen_ms(900).count(1))
                .build(),
        )
    }

    #[tokio::test]
    async fn file_output_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("topics.json");
        let output = Output::file(&path);

        output.emit(&snapshot()).await.unwrap();
        output.emit(&Arc::new(Snapshot::with_timestamp(2_000))).await.unwrap();

        let written: Snapshot =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(written.timestamp_ms, 2_000);
        assert!(written.is_empty());
    }

    #[tokio::test]
    async fn channel_output_drops_when_full() {
        let (output, mut rx) = Output::channel(1);
        output.emit(&snapshot()).await.unwrap();
        output.emit(&snapshot()).await.unwrap();

        assert!(rx.try_recv().is_ok());
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn tcp_output_sends_one_line() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let output = Output::tcp(listener.local_addr().unwrap().to_string());

        let reader = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut lines = tokio::io::BufReader::new(stream).lines();
            lines.next_line().await.unwrap().unwrap()
        });

        output.emit(&snapshot()).await.unwrap();
        let line = reader.await.unwrap();
        let parsed: Snapshot = serde_json::from_str(&line).unwrap();
        assert_eq!(parsed, *snapshot());
    }

    #[tokio::test]
    async fn tcp_output_reports_unreachable() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        assert!(Output::tcp(addr.to_string()).emit(&snapshot()).await.is_err());
    }

    #[test]
    fn describe() {
        assert_eq!(Output::tcp("localhost:9090").describe(), "tcp:localhost:9090");
        assert_eq!(Output::file("a.json").describe(), "file:a.json");
    }
}
