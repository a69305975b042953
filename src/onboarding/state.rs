//! Onboarding dialog states.

use serde::{Deserialize, Serialize};

/// The states of the onboarding conversation.
///
/// New users go Initial → PromptName → RegisterName → PromptCollege →
/// RegisterCollege → ShowDetails → Idle. Returning users with a complete
/// profile go Initial → ShowDetails → Idle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DialogState {
    #[default]
    Initial,
    PromptName,
    RegisterName,
    PromptCollege,
    RegisterCollege,
    ShowDetails,
    Idle,
    WrongInput,
}

impl std::fmt::Display for DialogState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Initial => "INITIAL",
            Self::PromptName => "PROMPT_NAME",
            Self::RegisterName => "REGISTER_NAME",
            Self::PromptCollege => "PROMPT_COLLEGE",
            Self::RegisterCollege => "REGISTER_COLLEGE",
            Self::ShowDetails => "SHOW_DETAILS",
            Self::Idle => "IDLE",
            Self::WrongInput => "WRONG_INPUT",
        };
        write!(f, "{s}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [DialogState; 8] = [
        DialogState::Initial,
        DialogState::PromptName,
        DialogState::RegisterName,
        DialogState::PromptCollege,
        DialogState::RegisterCollege,
        DialogState::ShowDetails,
        DialogState::Idle,
        DialogState::WrongInput,
    ];

    #[test]
    fn display_matches_serde() {
        for state in ALL {
            let display = format!("{state}");
            let json = serde_json::to_string(&state).unwrap();
            assert_eq!(json, format!("\"{display}\""), "mismatch for {state:?}");
        }
    }

    #[test]
    fn default_is_initial() {
        assert_eq!(DialogState::default(), DialogState::Initial);
    }
}
