//! Inbound message router.
//!
//! Commands (`/about`, `/lang en`, ...) are answered directly. Everything
//! else is fed to the sender's onboarding session, creating one on first
//! contact.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use tracing::{debug, info, warn};

use crate::deleter::MessageDeleter;
use crate::dialog::{DialogEngine, SessionId};
use crate::error::{GatewayError, Result};
use crate::gateway::{ChatMessage, MessageKind, MessagingGateway};
use crate::i18n;
use crate::onboarding::{OnboardingFlow, TurnContext};
use crate::store::Profiles;
use crate::template::Render;

/// First characters that mark a message as a command.
pub const COMMAND_PRIMERS: [char; 3] = ['/', '!', '\\'];

/// A parsed command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    /// Lowercased, with `-` and `_` removed.
    pub name: String,
    /// Everything after the first whitespace, trimmed.
    pub query: String,
}

/// Parse `body` as a command. Location messages are never commands.
pub fn parse_command(body: &str, kind: MessageKind) -> Option<Command> {
    if kind == MessageKind::Location {
        return None;
    }
    let rest = body.strip_prefix(COMMAND_PRIMERS)?.trim();
    let (name, query) = match rest.split_once(char::is_whitespace) {
        Some((name, query)) => (name, query.trim()),
        None => (rest, ""),
    };
    let name: String = name
        .to_lowercase()
        .chars()
        .filter(|c| *c != '-' && *c != '_')
        .collect();
    Some(Command {
        name,
        query: query.to_string(),
    })
}

/// Check if a user id is in the allowlist. `*` allows everyone.
pub fn is_user_allowed(allowed: &[String], user_id: &str) -> bool {
    allowed.iter().any(|a| a == "*" || a == user_id)
}

/// What the router did with a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dispatch {
    /// Sender is not allowed.
    Ignored,
    /// Handled as the named command.
    Command(String),
    /// Started a new session.
    Created(SessionId),
    /// Queued on the sender's session.
    Continued(SessionId),
}

/// Routes inbound messages to commands or dialog sessions.
pub struct Router {
    engine: Arc<DialogEngine<OnboardingFlow>>,
    gateway: Arc<dyn MessagingGateway>,
    profiles: Arc<Profiles>,
    allowed_users: Vec<String>,
    /// User id → session id.
    sessions: Mutex<HashMap<String, SessionId>>,
    deleter: Option<Arc<MessageDeleter>>,
    delete_commands: bool,
}

impl Router {
    pub fn new(
        engine: Arc<DialogEngine<OnboardingFlow>>,
        gateway: Arc<dyn MessagingGateway>,
        profiles: Arc<Profiles>,
        allowed_users: Vec<String>,
    ) -> Self {
        Self {
            engine,
            gateway,
            profiles,
            allowed_users,
            sessions: Mutex::new(HashMap::new()),
            deleter: None,
            delete_commands: false,
        }
    }

    /// Queue handled command messages for deletion when `delete_commands`.
    pub fn with_deleter(mut self, deleter: Arc<MessageDeleter>, delete_commands: bool) -> Self {
        self.deleter = Some(deleter);
        self.delete_commands = delete_commands;
        self
    }

    pub fn engine(&self) -> &Arc<DialogEngine<OnboardingFlow>> {
        &self.engine
    }

    /// Session currently bound to `user_id`.
    pub fn session_for(&self, user_id: &str) -> Option<SessionId> {
        self.sessions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(user_id)
            .cloned()
    }

    /// Wait until every known session has drained its queue.
    pub async fn until_idle(&self) {
        let ids: Vec<SessionId> = self
            .sessions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect();
        for id in ids {
            // Evicted sessions have nothing left to drain.
            let _ = self.engine.until_idle(&id).await;
        }
    }

    /// Handle one inbound message.
    pub async fn handle(&self, message: ChatMessage) -> Result<Dispatch> {
        let user_id = message.sender().to_string();
        if !is_user_allowed(&self.allowed_users, &user_id) {
            debug!(user = %user_id, "Ignoring message from user not in allowlist");
            return Ok(Dispatch::Ignored);
        }

        if let Some(command) = parse_command(&message.body, message.kind) {
            info!(user = %user_id, command = %command.name, "Executing command");
            self.run_command(&message, &user_id, &command).await?;
            if self.delete_commands {
                if let Some(deleter) = &self.deleter {
                    deleter.delete_for_me(&message).await;
                }
            }
            return Ok(Dispatch::Command(command.name));
        }

        let ctx = TurnContext::new(message, self.profiles.get(&user_id));
        Ok(self.dispatch(user_id, ctx))
    }

    /// Continue the user's session, or create one if none is live.
    fn dispatch(&self, user_id: String, ctx: TurnContext) -> Dispatch {
        let mut sessions = self.sessions.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(id) = sessions.get(&user_id) {
            match self.engine.continue_session(id, ctx.clone()) {
                Ok(()) => return Dispatch::Continued(id.clone()),
                Err(e) => debug!(user = %user_id, error = %e, "Session gone, starting a new one"),
            }
        }
        let id = self.engine.create(ctx);
        debug!(user = %user_id, session_id = %id, "Created dialog session");
        sessions.insert(user_id, id.clone());
        Dispatch::Created(id)
    }

    async fn run_command(
        &self,
        message: &ChatMessage,
        user_id: &str,
        command: &Command,
    ) -> std::result::Result<(), GatewayError> {
        let user = self.profiles.get(user_id);
        let replies = i18n::replies(&user.lang);
        match command.name.as_str() {
            "about" => {
                self.gateway.send_text(&message.from, replies.about).await?;
            }
            "lang" => {
                let code = command.query.strip_prefix("to ").unwrap_or(&command.query);
                let code = code.trim().to_lowercase();
                match i18n::lookup(&code) {
                    Some(new_replies) => {
                        self.profiles.set_lang(user_id, &code).await;
                        let text = new_replies.lang.changed.format(&[code.as_str()]);
                        self.gateway.send_text(&message.from, &text).await?;
                    }
                    None => {
                        let available = i18n::languages().join(", ");
                        let text = replies
                            .lang
                            .no_such_lang
                            .format(&[code.as_str(), available.as_str()]);
                        self.gateway.send_text(&message.from, &text).await?;
                    }
                }
            }
            other => warn!(user = %user_id, command = %other, "Unknown command"),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cmd(name: &str, query: &str) -> Option<Command> {
        Some(Command {
            name: name.to_string(),
            query: query.to_string(),
        })
    }

    #[test]
    fn parses_commands_with_any_primer() {
        assert_eq!(parse_command("/about", MessageKind::Chat), cmd("about", ""));
        assert_eq!(parse_command("!About", MessageKind::Chat), cmd("about", ""));
        assert_eq!(parse_command("\\lang to hi", MessageKind::Chat), cmd("lang", "to hi"));
    }

    #[test]
    fn strips_separators_and_trims() {
        assert_eq!(
            parse_command("/  Set-Up_Now   some  query ", MessageKind::Chat),
            cmd("setupnow", "some  query")
        );
    }

    #[test]
    fn non_commands() {
        assert_eq!(parse_command("hello", MessageKind::Chat), None);
        assert_eq!(parse_command("", MessageKind::Chat), None);
        assert_eq!(parse_command(" /about", MessageKind::Chat), None);
        assert_eq!(parse_command("/about", MessageKind::Location), None);
    }

    #[test]
    fn bare_primer_is_empty_command() {
        assert_eq!(parse_command("/", MessageKind::Chat), cmd("", ""));
    }

    #[test]
    fn allowlist() {
        let everyone = vec!["*".to_string()];
        assert!(is_user_allowed(&everyone, "a@c.us"));

        let some = vec!["a@c.us".to_string()];
        assert!(is_user_allowed(&some, "a@c.us"));
        assert!(!is_user_allowed(&some, "b@c.us"));

        assert!(!is_user_allowed(&[], "a@c.us"));
    }
}
