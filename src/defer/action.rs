use std::future::Future;
use std::pin::Pin;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::property::{PropertyState, VectorProperty};

use super::{BoxDefer, Defer, DeferResult};

type ContinuationFuture = Pin<Box<dyn Future<Output = DeferResult> + Send>>;

enum State {
    Running(ContinuationFuture),
    Settled(DeferResult),
}

/// Runs a continuation once a prior [`Defer`] settles.
///
/// Grounded on `pyindi/core/defer.py`'s `DeferAction`; the `step_0`/
/// `step_1`/`step_2` future chain there collapses here into one lazily
/// polled future, since nothing here needs to run before it is awaited.
pub struct DeferAction {
    state: Mutex<State>,
}

impl DeferAction {
    /// Run `action(prior_result)` once `prior` settles, regardless of
    /// what it settled to.
    pub fn new<A, Fut>(prior: BoxDefer, action: A) -> Self
    where
        A: FnOnce(DeferResult) -> Fut + Send + 'static,
        Fut: Future<Output = DeferResult> + Send + 'static,
    {
        let fut: ContinuationFuture = Box::pin(async move {
            let prior_result = prior.wait().await;
            action(prior_result).await
        });
        Self {
            state: Mutex::new(State::Running(fut)),
        }
    }

    /// Run `action(vector)` only if `prior` settled `Ok`; otherwise
    /// short-circuit to `Alert`, carrying the prior step's data along so
    /// the caller can see what it failed on.
    ///
    /// Grounded on `pyindi/core/defer.py`'s free function `continue_if_ok`.
    pub fn continue_if_ok<A, Fut>(prior: BoxDefer, action: A) -> Self
    where
        A: FnOnce(VectorProperty) -> Fut + Send + 'static,
        Fut: Future<Output = DeferResult> + Send + 'static,
    {
        Self::new(prior, move |prior_result| {
            let fut: ContinuationFuture = Box::pin(async move {
                if prior_result.state != PropertyState::Ok {
                    return DeferResult::alert_with_data(
                        "fail from previous error",
                        prior_result.data,
                    );
                }
                match prior_result.data {
                    Some(vec) => action(vec).await,
                    None => DeferResult::alert("previous step settled Ok with no data"),
                }
            });
            fut
        })
    }
}

#[async_trait]
impl Defer for DeferAction {
    async fn wait(&self) -> DeferResult {
        let mut guard = self.state.lock().await;
        let fut = match std::mem::replace(&mut *guard, State::Settled(DeferResult::busy("transitioning"))) {
            State::Running(fut) => fut,
            State::Settled(result) => {
                *guard = State::Settled(result.clone());
                return result;
            }
        };
        let result = fut.await;
        *guard = State::Settled(result.clone());
        result
    }

    fn check(&self) -> DeferResult {
        match self.state.try_lock() {
            Ok(guard) => match &*guard {
                State::Running(_) => DeferResult::busy("waiting for action to complete"),
                State::Settled(result) => result.clone(),
            },
            Err(_) => DeferResult::busy("wait() is in progress"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::defer::Just;
    use std::sync::Arc;

    #[tokio::test]
    async fn runs_action_after_prior_settles() {
        let prior: BoxDefer = Arc::new(Just::ok("step one"));
        let action = DeferAction::new(prior, |_| async { DeferResult::ok("step two", None) });
        assert_eq!(action.wait().await.message, "step two");
    }

    #[tokio::test]
    async fn continue_if_ok_short_circuits_on_alert() {
        let prior: BoxDefer = Arc::new(Just::alert("upstream failed"));
        let ran = Arc::new(std::sync::atomic::AtomicBool::new(false));
        let ran2 = ran.clone();
        let action = DeferAction::continue_if_ok(prior, move |_| {
            ran2.store(true, std::sync::atomic::Ordering::SeqCst);
            async { DeferResult::ok("should not run", None) }
        });
        let result = action.wait().await;
        assert_eq!(result.state, PropertyState::Alert);
        assert!(!ran.load(std::sync::atomic::Ordering::SeqCst));
    }
}
