use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::{BoxDefer, Defer, DeferAction, DeferResult, Just};

/// An append-only sequence of deferred steps, each chained onto the one
/// before it so steps settle strictly in the order they were added.
///
/// Grounded on `pyindi/core/defer.py`'s `DeferChain`. `add` here is
/// `async` because it takes the internal lock to read the current tail;
/// the original took no lock since CPython's asyncio is single-threaded.
pub struct DeferChain {
    links: Mutex<Vec<BoxDefer>>,
}

impl DeferChain {
    /// An empty chain, seeded with an already-settled `Ok` so the first
    /// real step has something to chain onto.
    pub fn new() -> Self {
        Self {
            links: Mutex::new(vec![Arc::new(Just::ok("chain begin"))]),
        }
    }

    /// A chain whose first link is `first` instead of the default seed.
    pub fn starting_from(first: BoxDefer) -> Self {
        Self {
            links: Mutex::new(vec![first]),
        }
    }

    /// Append a step. It will not start running until the chain (or a
    /// step after it) is awaited, and it only runs after every step
    /// added before it has settled.
    pub async fn add<A, Fut>(&self, action: A)
    where
        A: FnOnce(DeferResult) -> Fut + Send + 'static,
        Fut: Future<Output = DeferResult> + Send + 'static,
    {
        let mut links = self.links.lock().await;
        let prior = links.last().expect("chain is never empty").clone();
        links.push(Arc::new(DeferAction::new(prior, action)));
    }
}

impl Default for DeferChain {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Defer for DeferChain {
    async fn wait(&self) -> DeferResult {
        let last = {
            let links = self.links.lock().await;
            links.last().expect("chain is never empty").clone()
        };
        last.wait().await
    }

    fn check(&self) -> DeferResult {
        match self.links.try_lock() {
            Ok(links) => links.last().expect("chain is never empty").check(),
            Err(_) => DeferResult::busy("chain is being extended"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::property::PropertyState;

    #[tokio::test]
    async fn steps_settle_in_append_order() {
        let order = Arc::new(Mutex::new(Vec::new()));

        let chain = DeferChain::new();
        let o1 = order.clone();
        chain
            .add(move |_| {
                let o1 = o1.clone();
                async move {
                    o1.lock().await.push(1);
                    DeferResult::ok("one", None)
                }
            })
            .await;
        let o2 = order.clone();
        chain
            .add(move |_| {
                let o2 = o2.clone();
                async move {
                    o2.lock().await.push(2);
                    DeferResult::ok("two", None)
                }
            })
            .await;

        let result = chain.wait().await;
        assert_eq!(result.message, "two");
        assert_eq!(*order.lock().await, vec![1, 2]);
    }

    #[tokio::test]
    async fn a_failing_step_short_circuits_later_steps_when_built_with_continue_if_ok() {
        let chain = DeferChain::new();
        chain.add(|_| async { DeferResult::alert("boom") }).await;

        let ran = Arc::new(std::sync::atomic::AtomicBool::new(false));
        let ran2 = ran.clone();
        {
            let mut links = chain.links.lock().await;
            let prior = links.last().unwrap().clone();
            links.push(Arc::new(DeferAction::continue_if_ok(prior, move |_| {
                ran2.store(true, std::sync::atomic::Ordering::SeqCst);
                async { DeferResult::ok("unreachable", None) }
            })));
        }

        let result = chain.wait().await;
        assert_eq!(result.state, PropertyState::Alert);
        assert!(!ran.load(std::sync::atomic::Ordering::SeqCst));
    }
}
