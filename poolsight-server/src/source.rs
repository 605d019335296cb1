//! JSON-lines block source.
//!
//! Each non-empty line of the file is one serialized [`Block`]. Blocks are
//! forwarded in file order; ordering and replay checks belong to the writer.

use poolsight_core::events::{Block, BlockSender};
use std::path::PathBuf;
use thiserror::Error;
use crate::shutdown::wait_for_shutdown;
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::watch;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::LinesStream;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("failed to read block file: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed block on line {line}: {source}")]
    Malformed {
        line: usize,
        #[source]
        source: serde_json::Error,
    },
}

pub struct BlockFileSource {
    path: PathBuf,
}

impl BlockFileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Feed every block in the file to the writer.
    ///
    /// Stops early on shutdown or when the writer is gone. Returns the number
    /// of blocks sent.
    pub async fn run(
        self,
        block_tx: BlockSender,
        mut shutdown_rx: watch::Receiver<bool>,
    ) -> Result<u64, SourceError> {
        let file = File::open(&self.path).await?;
        let mut lines = LinesStream::new(BufReader::new(file).lines());
        let mut line_no = 0usize;
        let mut sent = 0u64;

        info!(path = ?self.path, "BlockFileSource started");

        loop {
            tokio::select! {
                biased;

                changed = shutdown_rx.changed() => {
                    if changed.is_err() || *shutdown_rx.borrow() {
                        info!(sent, "BlockFileSource received shutdown signal");
                        break;
                    }
                }

                line = lines.next() => {
                    let Some(line) = line else {
                        info!(sent, "block file exhausted");
                        break;
                    };
                    let line = line?;
                    line_no += 1;
                    if line.trim().is_empty() {
                        continue;
                    }
                    let block: Block = serde_json::from_str(&line)
                        .map_err(|source| SourceError::Malformed { line: line_no, source })?;
                    // A full channel must not hold up shutdown.
                    tokio::select! {
                        biased;

                        _ = wait_for_shutdown(shutdown_rx.clone()) => {
                            info!(sent, "BlockFileSource received shutdown signal while blocked");
                            break;
                        }

                        result = block_tx.send(block) => {
                            if result.is_err() {
                                warn!(sent, "block writer is gone, stopping source");
                                break;
                            }
                            sent += 1;
                        }
                    }
                }
            }
        }

        Ok(sent)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use poolsight_core::events::block_channel;
    use std::time::{Duration, SystemTime, UNIX_EPOCH};
    use tokio::sync::mpsc;

    const TWO_BLOCKS: &str = r#"{"height":1,"timestamp":1000,"hash":"0a","events":[{"type":"pool","asset":"BTC.BTC","status":"available"}]}

{"height":2,"timestamp":2000,"hash":"0b","events":[]}
"#;

    fn temp_file(name: &str, content: &str) -> PathBuf {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        let path = std::env::temp_dir().join(format!("poolsight-{name}-{nanos}.jsonl"));
        std::fs::write(&path, content).unwrap();
        path
    }

    #[tokio::test]
    async fn test_reads_blocks_in_order() {
        let path = temp_file("ordered", TWO_BLOCKS);
        let (tx, mut rx) = block_channel();
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);

        let sent = BlockFileSource::new(&path).run(tx, shutdown_rx).await.unwrap();
        assert_eq!(sent, 2);
        let first = rx.recv().await.unwrap();
        assert_eq!(first.meta.height, 1);
        assert_eq!(first.meta.hash, vec![0x0a]);
        assert_eq!(first.events.len(), 1);
        assert_eq!(rx.recv().await.unwrap().meta.height, 2);
        assert!(rx.recv().await.is_none());

        std::fs::remove_file(path).unwrap();
    }

    #[tokio::test]
    async fn test_malformed_line_reports_line_number() {
        let path = temp_file("malformed", "{\"height\":1,\"timestamp\":1,\"hash\":\"00\",\"events\":[]}\nnot json\n");
        let (tx, _rx) = block_channel();
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);

        let result = BlockFileSource::new(&path).run(tx, shutdown_rx).await;
        assert!(matches!(result, Err(SourceError::Malformed { line: 2, .. })));

        std::fs::remove_file(path).unwrap();
    }

    #[tokio::test]
    async fn test_stops_on_shutdown() {
        let path = temp_file("shutdown", TWO_BLOCKS);
        let (tx, _rx) = block_channel();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        shutdown_tx.send_replace(true);
        // send_replace marks the value unseen, so the shutdown branch fires first.
        let sent = BlockFileSource::new(&path).run(tx, shutdown_rx).await.unwrap();
        assert_eq!(sent, 0);

        std::fs::remove_file(path).unwrap();
    }

    #[tokio::test]
    async fn test_shutdown_interrupts_blocked_send() {
        let path = temp_file("blocked", TWO_BLOCKS);
        // One slot, already taken, and nobody draining it.
        let (tx, _rx) = mpsc::channel(1);
        let filler: Block =
            serde_json::from_str(r#"{"height":9,"timestamp":1,"hash":"09","events":[]}"#).unwrap();
        tx.send(filler).await.unwrap();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let handle = tokio::spawn(BlockFileSource::new(&path).run(tx, shutdown_rx));
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!handle.is_finished());
        shutdown_tx.send_replace(true);

        let sent = tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!(sent, 0);

        std::fs::remove_file(path).unwrap();
    }
}
