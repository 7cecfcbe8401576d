//! Run-level cancellation shared by every blocking step of an ingestion run.
//!
//! A [`Cancellation`] is a cheap clone of a `tokio::sync::watch` receiver.
//! The owning [`CancelHandle`] flips it; dropping the handle without
//! cancelling leaves it pending forever.

use std::future::Future;
use std::time::Duration;
use tokio::sync::watch;

use crate::error::FetchError;

#[derive(Debug)]
pub struct CancelHandle {
    tx: watch::Sender<bool>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        let _ = self.tx.send(true);
    }

    pub fn token(&self) -> Cancellation {
        Cancellation {
            rx: self.tx.subscribe(),
        }
    }

    /// Cancel automatically after `budget`. The timer task holds its own
    /// sender clone so it outlives the handle.
    pub fn cancel_after(&self, budget: Duration) {
        let tx = self.tx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(budget).await;
            let _ = tx.send(true);
        });
    }
}

#[derive(Debug, Clone)]
pub struct Cancellation {
    rx: watch::Receiver<bool>,
}

impl Cancellation {
    pub fn new() -> (CancelHandle, Cancellation) {
        let (tx, rx) = watch::channel(false);
        (CancelHandle { tx }, Cancellation { rx })
    }

    /// A token that is never cancelled.
    pub fn never() -> Self {
        // sender dropped: `cancelled()` parks forever, `is_cancelled()` stays false
        let (_tx, rx) = watch::channel(false);
        Cancellation { rx }
    }

    /// A token cancelled once `budget` elapses.
    pub fn with_deadline(budget: Duration) -> Self {
        let (handle, token) = Self::new();
        handle.cancel_after(budget);
        token
    }

    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once cancelled. Never resolves if every sender is gone first.
    pub async fn cancelled(&self) {
        let mut rx = self.rx.clone();
        loop {
            if *rx.borrow_and_update() {
                return;
            }
            if rx.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }

    /// Race `fut` against cancellation.
    pub async fn run<T, F>(&self, fut: F) -> Result<T, FetchError>
    where
        F: Future<Output = Result<T, FetchError>>,
    {
        if self.is_cancelled() {
            return Err(FetchError::Cancelled);
        }
        tokio::select! {
            biased;
            _ = self.cancelled() => Err(FetchError::Cancelled),
            r = fut => r,
        }
    }
}
