use async_trait::async_trait;
use bytes::Bytes;
use tokio::io::AsyncReadExt;
use tokio::sync::mpsc::{Receiver, Sender};

use crate::error::{Error, Result};
use crate::pipeline::cancel::CancelToken;
use crate::pipeline::pipe::Pipe;

const DEFAULT_READ_CHUNK_BYTES: usize = 8 * 1024;

/// Streams stdin as raw byte chunks, same contract as [`FsSource`].
///
/// [`FsSource`]: crate::source::fs::FsSource
pub struct StdinSource {
    read_chunk_bytes: usize,
}

impl StdinSource {
    pub fn new() -> Self {
        Self {
            read_chunk_bytes: DEFAULT_READ_CHUNK_BYTES,
        }
    }

    pub fn read_chunk_bytes(mut self, n: usize) -> Self {
        self.read_chunk_bytes = n.max(1);
        self
    }
}

impl Default for StdinSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Pipe<(), Bytes> for StdinSource {
    fn stage_name(&self) -> &'static str {
        "stdin_source"
    }

    async fn process(
        &self,
        mut input: Receiver<()>,
        output: Sender<Bytes>,
        _buffer: usize,
        cancel: CancelToken,
    ) -> Result<()> {
        tokio::select! {
            _ = cancel.cancelled() => return Ok(()),
            _ = input.recv() => {}
        }

        let mut stdin = tokio::io::stdin();
        let mut read_buf = vec![0_u8; self.read_chunk_bytes];

        loop {
            let n = tokio::select! {
                _ = cancel.cancelled() => return Ok(()),
                read = stdin.read(&mut read_buf) => read?,
            };

            if n == 0 {
                break;
            }

            let chunk = Bytes::copy_from_slice(&read_buf[..n]);
            tokio::select! {
                _ = cancel.cancelled() => return Ok(()),
                sent = output.send(chunk) => {
                    if sent.is_err() {
                        if cancel.is_cancelled() {
                            return Ok(());
                        }
                        return Err(Error::pipeline("output channel closed"));
                    }
                }
            }
        }

        Ok(())
    }
}
