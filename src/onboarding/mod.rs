//! Onboarding dialog: greets a user, collects their name and college, and
//! shows what was stored.
//!
//! Each state has one transition function in [`OnboardingFlow`]; the dialog
//! engine drives them per user.

pub mod context;
pub mod flow;
pub mod state;

pub use context::{ContextPatch, TurnContext};
pub use flow::{OnboardingFlow, is_valid_name};
pub use state::DialogState;
