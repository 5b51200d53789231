//! The deferred-action combinator layer: composable multi-step device
//! workflows built from a handful of awaitable primitives, all funneling
//! through [`DeferResult`] instead of [`crate::error::Result`].
//!
//! Grounded on `pyindi/core/defer.py`. `DeferResult` stays a plain data
//! tuple for recoverable outcomes (a property settled at `Alert`, a
//! chain step that never got its data); `crate::error::Error` is reserved
//! for unrecoverable setup failures (a malformed address, a dead
//! channel) that no amount of waiting resolves.

mod action;
mod chain;
mod just;
mod property;

pub use action::DeferAction;
pub use chain::DeferChain;
pub use just::Just;
pub use property::DeferProperty;

use std::sync::Arc;

use async_trait::async_trait;

use crate::property::{PropertyState, VectorProperty};

/// The outcome of a deferred step: a settled state, optional data, and a
/// human-readable message. Every combinator in this module produces one
/// of these instead of returning `Err` — a property settling at `Alert`
/// is a normal, expected outcome of device control, not a bug.
#[derive(Debug, Clone)]
pub struct DeferResult {
    pub state: PropertyState,
    pub data: Option<VectorProperty>,
    pub message: String,
}

impl DeferResult {
    /// A settled, successful result carrying `data`.
    pub fn ok(message: impl Into<String>, data: Option<VectorProperty>) -> Self {
        Self {
            state: PropertyState::Ok,
            data,
            message: message.into(),
        }
    }

    /// An in-progress result; `wait()` has not finished yet.
    pub fn busy(message: impl Into<String>) -> Self {
        Self {
            state: PropertyState::Busy,
            data: None,
            message: message.into(),
        }
    }

    /// A settled failure.
    pub fn alert(message: impl Into<String>) -> Self {
        Self {
            state: PropertyState::Alert,
            data: None,
            message: message.into(),
        }
    }

    /// A settled failure that still carries the data it failed on, e.g.
    /// a short-circuited chain step that wants to report what the
    /// previous step produced.
    pub fn alert_with_data(message: impl Into<String>, data: Option<VectorProperty>) -> Self {
        Self {
            state: PropertyState::Alert,
            data,
            message: message.into(),
        }
    }
}

/// A deferred, awaitable device operation.
///
/// `wait()` drives the operation to completion (awaiting it repeatedly
/// just returns the same settled result). `check()` takes a
/// non-blocking snapshot of progress, for callers polling from outside
/// an async context.
#[async_trait]
pub trait Defer {
    /// Drive to completion and return the settled result.
    async fn wait(&self) -> DeferResult;
    /// A non-blocking snapshot of the current result.
    fn check(&self) -> DeferResult;
}

/// A shared, dynamically dispatched deferred operation — the currency
/// [`DeferChain`] and [`DeferAction`] pass around internally.
pub type BoxDefer = Arc<dyn Defer + Send + Sync>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alert_with_data_keeps_the_payload() {
        let vec = crate::property::VectorProperty {
            device: "CCD".into(),
            name: "EXPOSURE".into(),
            label: None,
            group: None,
            state: PropertyState::Alert,
            perm: crate::property::PropertyPerm::Rw,
            timeout: None,
            timestamp: None,
            message: None,
            kind: crate::property::VectorKind::Number,
            rule: None,
            items: crate::property::ItemMap::new(),
        };
        let result = DeferResult::alert_with_data("fail from previous error", Some(vec.clone()));
        assert_eq!(result.state, PropertyState::Alert);
        assert_eq!(result.data, Some(vec));
    }
}
