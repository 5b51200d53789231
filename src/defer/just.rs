use async_trait::async_trait;

use super::{Defer, DeferResult};

/// An already-settled result wrapped as a [`Defer`] — the base case
/// `DeferChain` starts from, and a convenient way to short-circuit a
/// workflow without spawning anything.
pub struct Just(DeferResult);

impl Just {
    /// Wrap an arbitrary result.
    pub fn new(result: DeferResult) -> Self {
        Self(result)
    }

    /// A settled `Ok` with no data, just a message.
    pub fn ok(message: impl Into<String>) -> Self {
        Self(DeferResult::ok(message, None))
    }

    /// A settled `Alert` with no data, just a message.
    pub fn alert(message: impl Into<String>) -> Self {
        Self(DeferResult::alert(message))
    }
}

#[async_trait]
impl Defer for Just {
    async fn wait(&self) -> DeferResult {
        self.0.clone()
    }

    fn check(&self) -> DeferResult {
        self.0.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn wait_and_check_agree_on_an_already_settled_value() {
        let just = Just::ok("ready");
        assert_eq!(just.check().message, "ready");
        assert_eq!(just.wait().await.message, "ready");
    }
}
