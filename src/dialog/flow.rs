//! State-table contract for the dialog engine.

use std::fmt::{Debug, Display};
use std::hash::Hash;

use async_trait::async_trait;

use crate::error::DialogError;

/// Input context threaded through transition functions.
///
/// Contexts are immutable values; each step rebuilds the context by
/// overlaying the patch returned from the previous step.
pub trait Context: Clone + Send + Sync + 'static {
    /// Partial context produced by a transition.
    type Patch: Clone + Debug + Send + Sync + 'static;

    /// A copy of `self` with every field set in `patch` overridden.
    fn overlay(&self, patch: &Self::Patch) -> Self;
}

/// Outcome of one transition function.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition<S, P> {
    /// State to move to.
    pub next: S,
    /// Wait for new input before running `next`.
    pub suspend: bool,
    /// Merged into the context of the next invocation.
    pub patch: Option<P>,
}

impl<S, P> Transition<S, P> {
    /// Move to `next` and run it right away on the same input.
    pub fn advance(next: S) -> Self {
        Self {
            next,
            suspend: false,
            patch: None,
        }
    }

    /// Move to `next` and wait for the next input.
    pub fn suspend(next: S) -> Self {
        Self {
            next,
            suspend: true,
            patch: None,
        }
    }

    /// Attach a context patch.
    pub fn with_patch(mut self, patch: P) -> Self {
        self.patch = Some(patch);
        self
    }
}

/// A state machine: an enumerated state type and one transition function
/// per state.
#[async_trait]
pub trait Flow: Send + Sync + 'static {
    type State: Copy + Eq + Hash + Debug + Display + Send + Sync + 'static;
    type Context: Context;

    /// State every new session starts in.
    fn initial_state(&self) -> Self::State;

    /// Run the transition function for `state`.
    async fn step(
        &self,
        state: Self::State,
        ctx: &Self::Context,
    ) -> Result<Transition<Self::State, <Self::Context as Context>::Patch>, DialogError>;
}
