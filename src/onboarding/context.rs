//! Per-input context handed to onboarding handlers.

use crate::dialog::Context;
use crate::gateway::ChatMessage;
use crate::store::UserProfile;

use super::state::DialogState;

/// One inbound message plus what handlers need to answer it.
#[derive(Debug, Clone)]
pub struct TurnContext {
    pub message: ChatMessage,
    /// Sender of the message: the author in groups, else the chat.
    pub user_id: String,
    /// Profile as stored when the message arrived.
    pub user: UserProfile,
    /// Trimmed message body.
    pub body: String,
    /// Where [`DialogState::WrongInput`] sends the user back to.
    pub return_state: Option<DialogState>,
    /// Ask for a college name as free text instead of showing the list.
    pub for_name: bool,
}

impl TurnContext {
    pub fn new(message: ChatMessage, user: UserProfile) -> Self {
        let user_id = message.sender().to_string();
        let body = message.body.trim().to_string();
        Self {
            message,
            user_id,
            user,
            body,
            return_state: None,
            for_name: false,
        }
    }

    /// Chat replies go to.
    pub fn reply_to(&self) -> &str {
        &self.message.from
    }
}

/// Fields a handler can override for the next step.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContextPatch {
    pub user: Option<UserProfile>,
    pub return_state: Option<DialogState>,
    pub for_name: Option<bool>,
}

impl ContextPatch {
    pub fn user(user: UserProfile) -> Self {
        Self {
            user: Some(user),
            ..Default::default()
        }
    }

    pub fn return_to(state: DialogState) -> Self {
        Self {
            return_state: Some(state),
            ..Default::default()
        }
    }

    pub fn for_name() -> Self {
        Self {
            for_name: Some(true),
            ..Default::default()
        }
    }
}

impl Context for TurnContext {
    type Patch = ContextPatch;

    fn overlay(&self, patch: &ContextPatch) -> Self {
        let mut next = self.clone();
        if let Some(user) = &patch.user {
            next.user = user.clone();
        }
        if let Some(state) = patch.return_state {
            next.return_state = Some(state);
        }
        if let Some(for_name) = patch.for_name {
            next.for_name = for_name;
        }
        next
    }
}
