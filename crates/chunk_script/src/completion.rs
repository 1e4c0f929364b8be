//! One-shot completion tokens
//!
//! A token carries the caller's settlement callback across the asynchronous
//! gap. `resolve` and `reject` consume it, so settling twice does not compile;
//! a token dropped without being settled rejects itself so the caller always
//! hears back exactly once.

use crate::error::BridgeError;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::oneshot;

/// Terminal result delivered to the caller.
pub type Outcome = Result<(), BridgeError>;

type OnSettled = Box<dyn FnOnce(Outcome) + Send + 'static>;

pub struct CompletionToken {
    on_settled: Option<OnSettled>,
}

impl CompletionToken {
    pub fn new<F>(on_settled: F) -> Self
    where
        F: FnOnce(Outcome) + Send + 'static,
    {
        Self {
            on_settled: Some(Box::new(on_settled)),
        }
    }

    /// Token paired with a `Settlement` the caller can await or block on.
    pub fn channel() -> (Self, Settlement) {
        let (tx, rx) = oneshot::channel();
        let token = Self::new(move |outcome| {
            // Receiver gone means the caller stopped listening.
            let _ = tx.send(outcome);
        });
        (token, Settlement { rx })
    }

    pub fn resolve(mut self) {
        self.settle(Ok(()));
    }

    pub fn reject(mut self, error: BridgeError) {
        self.settle(Err(error));
    }

    pub fn settle_with(mut self, outcome: Outcome) {
        self.settle(outcome);
    }

    fn settle(&mut self, outcome: Outcome) {
        // The callback is released as soon as it has run.
        if let Some(on_settled) = self.on_settled.take() {
            on_settled(outcome);
        }
    }
}

impl Drop for CompletionToken {
    fn drop(&mut self) {
        if self.on_settled.is_some() {
            tracing::warn!("completion token dropped before settling");
            self.settle(Err(BridgeError::DispatchContextUnavailable));
        }
    }
}

impl std::fmt::Debug for CompletionToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompletionToken")
            .field("settled", &self.on_settled.is_none())
            .finish()
    }
}

/// Receiving half of `CompletionToken::channel`.
#[derive(Debug)]
pub struct Settlement {
    rx: oneshot::Receiver<Outcome>,
}

impl Settlement {
    /// Block the current thread until the token settles.
    ///
    /// Must not be called from inside an async runtime; await instead.
    pub fn wait(self) -> Outcome {
        self.rx
            .blocking_recv()
            .unwrap_or(Err(BridgeError::DispatchContextUnavailable))
    }

    /// The outcome, if the token has already settled.
    pub fn try_outcome(&mut self) -> Option<Outcome> {
        self.rx.try_recv().ok()
    }
}

impl Future for Settlement {
    type Output = Outcome;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|received| received.unwrap_or(Err(BridgeError::DispatchContextUnavailable)))
    }
}
