use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};

use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use tokio::sync::broadcast;

use crate::error::{Error, Result};

/// Write-once completion cell, shared between the cache, the pending
/// buffer and every caller that loaded the key. All awaiters observe
/// the same value.
pub struct Promise<T> {
    state: Arc<Mutex<State<T>>>,
}

enum State<T> {
    Pending(broadcast::Sender<T>),
    Settled(T),
}

impl<T> Clone for Promise<T> {
    fn clone(&self) -> Self {
        Promise { state: self.state.clone() }
    }
}

impl<T: Clone + Send + 'static> Default for Promise<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone + Send + 'static> Promise<T> {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(1);
        Promise { state: Arc::new(Mutex::new(State::Pending(tx))) }
    }

    /// A promise that already holds `value`.
    pub fn settled(value: T) -> Self {
        Promise { state: Arc::new(Mutex::new(State::Settled(value))) }
    }

    pub fn is_settled(&self) -> bool {
        matches!(&*self.state.lock().unwrap(), State::Settled(_))
    }

    /// Settles the promise. Fails if it has been settled before.
    pub fn set(&self, value: T) -> Result<()> {
        let tx = {
            let mut state = self.state.lock().unwrap();
            match &*state {
                State::Settled(_) => return Err(Error::AlreadySettled),
                State::Pending(tx) => {
                    let tx = tx.clone();
                    *state = State::Settled(value.clone());
                    tx
                }
            }
        };
        // Subscriptions are only taken while the state is still pending,
        // so every receiver predates this send.
        let _ = tx.send(value);
        Ok(())
    }

    /// Settles the promise if it is still pending; a promise that was
    /// settled in the meantime is left as-is.
    pub fn try_set(&self, value: T) -> bool {
        self.set(value).is_ok()
    }

    /// An awaitable handle onto the eventual value.
    pub fn future(&self) -> PromiseFuture<T> {
        let state = self.state.clone();
        PromiseFuture(
            async move {
                let mut rx = {
                    let guard = state.lock().unwrap();
                    match &*guard {
                        State::Settled(value) => return value.clone(),
                        State::Pending(tx) => tx.subscribe(),
                    }
                };
                match rx.recv().await {
                    Ok(value) => value,
                    // The channel closes only after `set` swapped the value
                    // in, so a closed receiver can read it from the state.
                    Err(_) => match &*state.lock().unwrap() {
                        State::Settled(value) => value.clone(),
                        State::Pending(_) => {
                            unreachable!("promise channel closed while still pending")
                        }
                    },
                }
            }
            .boxed(),
        )
    }
}

/// Future side of a [`Promise`]; completes once the promise settles.
pub struct PromiseFuture<T>(BoxFuture<'static, T>);

impl<T> Future for PromiseFuture<T> {
    type Output = T;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        self.0.as_mut().poll(cx)
    }
}
