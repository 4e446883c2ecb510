use std::marker::PhantomData;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::Result;
use crate::pipeline::cancel::CancelToken;
use crate::pipeline::pipe::Pipe;

/// Two stages wired together by a bounded intermediate channel.
pub struct Chain<A, B, M> {
    upstream: A,
    downstream: B,
    _m: PhantomData<fn() -> M>,
}

impl<A, B, M> Chain<A, B, M> {
    pub fn new(upstream: A, downstream: B) -> Self {
        Self {
            upstream,
            downstream,
            _m: PhantomData,
        }
    }
}

#[async_trait]
impl<I, M, O, A, B> Pipe<I, O> for Chain<A, B, M>
where
    I: Send + 'static,
    M: Send + 'static,
    O: Send + 'static,
    A: Pipe<I, M> + Send + Sync,
    B: Pipe<M, O> + Send + Sync,
{
    fn stage_name(&self) -> &'static str {
        "chain"
    }

    async fn process(
        &self,
        input: mpsc::Receiver<I>,
        output: mpsc::Sender<O>,
        buffer: usize,
        cancel: CancelToken,
    ) -> Result<()> {
        let (tx_mid, rx_mid) = mpsc::channel::<M>(buffer);

        let up = self.upstream.process(input, tx_mid, buffer, cancel.clone());
        let down = self.downstream.process(rx_mid, output, buffer, cancel.clone());

        tokio::pin!(up);
        tokio::pin!(down);

        let mut up_res: Option<Result<()>> = None;
        let mut down_res: Option<Result<()>> = None;

        // If either half fails, cancel the other so the whole chain unwinds
        // instead of blocking on a channel nobody drains.
        while up_res.is_none() || down_res.is_none() {
            tokio::select! {
                res = &mut up, if up_res.is_none() => {
                    if res.is_err() {
                        cancel.cancel();
                    }
                    up_res = Some(res);
                }
                res = &mut down, if down_res.is_none() => {
                    if res.is_err() {
                        cancel.cancel();
                    }
                    down_res = Some(res);
                }
            }
        }

        up_res.unwrap_or(Ok(()))?;
        down_res.unwrap_or(Ok(()))?;
        Ok(())
    }
}

pub trait PipeExt<I, O>: Pipe<I, O> + Sized
where
    I: Send + 'static,
    O: Send + 'static,
{
    /// Append another stage, producing a `Chain` that is itself a `Pipe`.
    fn pipe<N, P2>(self, next: P2) -> Chain<Self, P2, O>
    where
        N: Send + 'static,
        P2: Pipe<O, N> + Send + Sync,
        Self: Send + Sync,
    {
        Chain::new(self, next)
    }
}

impl<I, O, P> PipeExt<I, O> for P
where
    I: Send + 'static,
    O: Send + 'static,
    P: Pipe<I, O> + Sized + Send + Sync,
{
}
