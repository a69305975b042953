//! Panel Bot: onboarding dialogs and batched message deletion for a chat bot.

pub mod config;
pub mod deleter;
pub mod dialog;
pub mod error;
pub mod gateway;
pub mod i18n;
pub mod onboarding;
pub mod router;
pub mod store;
pub mod template;
