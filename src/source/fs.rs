use async_trait::async_trait;
use bytes::Bytes;
use tokio::fs::File;
use tokio::io::AsyncReadExt;
use tokio::sync::mpsc::{Receiver, Sender};

use crate::error::{Error, Result};
use crate::pipeline::cancel::CancelToken;
use crate::pipeline::pipe::Pipe;

const DEFAULT_READ_CHUNK_BYTES: usize = 8 * 1024;

/// Streams a file as raw byte chunks.
///
/// Reads the file incrementally so arbitrarily large inputs never land in
/// memory at once; each chunk is sent downstream on the bounded channel,
/// which is where backpressure from slow consumers is felt.
pub struct FsSource {
    path: String,
    read_chunk_bytes: usize,
}

impl FsSource {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            read_chunk_bytes: DEFAULT_READ_CHUNK_BYTES,
        }
    }

    /// Number of bytes read per filesystem call.
    pub fn read_chunk_bytes(mut self, n: usize) -> Self {
        self.read_chunk_bytes = n.max(1);
        self
    }
}

#[async_trait]
impl Pipe<(), Bytes> for FsSource {
    fn stage_name(&self) -> &'static str {
        "fs_source"
    }

    async fn process(
        &self,
        mut input: Receiver<()>,
        output: Sender<Bytes>,
        _buffer: usize,
        cancel: CancelToken,
    ) -> Result<()> {
        // Wait for the start signal or cancellation.
        tokio::select! {
            _ = cancel.cancelled() => return Ok(()),
            _ = input.recv() => {}
        }

        let mut file = File::open(&self.path).await?;
        let mut read_buf = vec![0_u8; self.read_chunk_bytes];

        loop {
            let n = tokio::select! {
                _ = cancel.cancelled() => return Ok(()),
                read = file.read(&mut read_buf) => read?,
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
