use async_trait::async_trait;
use tokio::sync::mpsc::{Receiver, Sender};

use crate::error::Result;
use crate::pipeline::cancel::CancelToken;

/// One stage of a streaming pipeline.
///
/// A stage reads items from `input`, writes items to `output`, and returns
/// when its input closes, its downstream closes, or the token is cancelled.
/// Stages never buffer unboundedly; the bounded channels between them are the
/// backpressure fabric.
#[async_trait]
pub trait Pipe<I: Send + 'static, O: Send + 'static>: Send + Sync {
    /// Short stable name used in tracing spans and stage errors.
    fn stage_name(&self) -> &'static str {
        "pipe"
    }

    async fn process(
        &self,
        input: Receiver<I>,
        output: Sender<O>,
        buffer: usize,
        cancel: CancelToken,
    ) -> Result<()>;
}
