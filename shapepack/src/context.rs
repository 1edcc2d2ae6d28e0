//! Per-call serialization state.

use core::fmt;

use rancor::{fail, Error};
use tokio_util::sync::CancellationToken;

/// The default nesting budget for a single encode or decode call.
pub const DEFAULT_MAX_DEPTH: usize = 64;

#[derive(Debug)]
struct DepthExceeded;

impl fmt::Display for DepthExceeded {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "exceeded maximum value nesting depth")
    }
}

impl core::error::Error for DepthExceeded {}

#[derive(Debug)]
struct Cancelled;

impl fmt::Display for Cancelled {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "the operation was cancelled")
    }
}

impl core::error::Error for Cancelled {}

/// Scoped state for one encode or decode call.
///
/// The context carries the remaining nesting depth and an optional
/// cancellation token. It lives for exactly one call and is never shared
/// between calls.
#[derive(Clone, Debug)]
pub struct SerializationContext {
    remaining_depth: usize,
    cancel: Option<CancellationToken>,
}

impl SerializationContext {
    /// Creates a context with the given nesting budget.
    pub fn new(max_depth: usize) -> Self {
        Self {
            remaining_depth: max_depth,
            cancel: None,
        }
    }

    /// Attaches a cancellation token, checked at every suspension point.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Returns the remaining nesting budget.
    pub fn remaining_depth(&self) -> usize {
        self.remaining_depth
    }

    /// Steps one level deeper into the value graph.
    ///
    /// Fails once the nesting budget is used up. Every successful call must
    /// be paired with a [`leave`](Self::leave) on the way back out.
    pub fn enter(&mut self) -> Result<(), Error> {
        match self.remaining_depth.checked_sub(1) {
            Some(depth) => {
                self.remaining_depth = depth;
                Ok(())
            }
            None => fail!(DepthExceeded),
        }
    }

    /// Steps back out of one nesting level.
    pub fn leave(&mut self) {
        self.remaining_depth += 1;
    }

    /// Fails with a cancellation error once the attached token has been
    /// cancelled. Without a token this is a no-op.
    pub fn check_cancelled(&self) -> Result<(), Error> {
        if let Some(token) = &self.cancel {
            if token.is_cancelled() {
                fail!(Cancelled);
            }
        }
        Ok(())
    }
}

impl Default for SerializationContext {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_DEPTH)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn depth_budget_is_enforced() {
        let mut ctx = SerializationContext::new(2);
        ctx.enter().unwrap();
        ctx.enter().unwrap();
        let err = ctx.enter().unwrap_err();
        assert!(err.to_string().contains("nesting depth"));
    }

    #[test]
    fn leave_restores_budget() {
        let mut ctx = SerializationContext::new(1);
        ctx.enter().unwrap();
        ctx.leave();
        ctx.enter().unwrap();
    }

    #[test]
    fn cancellation_is_observed() {
        let token = CancellationToken::new();
        let ctx = SerializationContext::default().with_cancellation(token.clone());
        ctx.check_cancelled().unwrap();
        token.cancel();
        assert!(ctx.check_cancelled().is_err());
    }
}
