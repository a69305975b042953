//! Onboarding transition functions.

use std::sync::{Arc, LazyLock};

use async_trait::async_trait;
use regex::Regex;
use tracing::{debug, info};

use crate::dialog::{Flow, Transition};
use crate::error::DialogError;
use crate::gateway::{ListMessage, ListRow, ListSection, MessageContent, MessageKind, MessagingGateway, SendOptions};
use crate::i18n::{self, Replies};
use crate::store::{OTHER_COLLEGE, Profiles, Registry};
use crate::template::Render;

use super::context::{ContextPatch, TurnContext};
use super::state::DialogState;

type Step = Transition<DialogState, ContextPatch>;

/// A name needs a letter followed by at least one more letter, digit or space.
static NAME_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\p{L}[\p{L}\p{N}\p{Z}]+").expect("name pattern is valid"));

/// Whether `body` is acceptable as a user's name.
pub fn is_valid_name(body: &str) -> bool {
    NAME_PATTERN.is_match(body)
}

/// The onboarding dialog: collects a name and a college, then shows them.
pub struct OnboardingFlow {
    gateway: Arc<dyn MessagingGateway>,
    profiles: Arc<Profiles>,
    registry: Arc<Registry>,
}

impl OnboardingFlow {
    pub fn new(
        gateway: Arc<dyn MessagingGateway>,
        profiles: Arc<Profiles>,
        registry: Arc<Registry>,
    ) -> Self {
        Self {
            gateway,
            profiles,
            registry,
        }
    }

    async fn say(&self, ctx: &TurnContext, text: &str) -> Result<(), DialogError> {
        self.gateway.send_text(ctx.reply_to(), text).await?;
        Ok(())
    }

    async fn initial(&self, ctx: &TurnContext, replies: &Replies) -> Result<Step, DialogError> {
        if ctx.user.is_complete() {
            let name = ctx.user.name.as_deref().unwrap_or_default();
            self.say(ctx, &replies.welcome_back.format(&[name])).await?;
            Ok(Transition::advance(DialogState::ShowDetails))
        } else {
            self.say(ctx, replies.greeting).await?;
            Ok(Transition::advance(DialogState::PromptName))
        }
    }

    async fn register_name(&self, ctx: &TurnContext) -> Result<Step, DialogError> {
        if !is_valid_name(&ctx.body) {
            debug!(user = %ctx.user_id, "Rejected name");
            return Ok(Transition::advance(DialogState::WrongInput)
                .with_patch(ContextPatch::return_to(DialogState::PromptName)));
        }

        let user = self.profiles.set_name(&ctx.user_id, &ctx.body).await;
        info!(user = %ctx.user_id, "Registered name");
        Ok(Transition::advance(DialogState::PromptCollege).with_patch(ContextPatch::user(user)))
    }

    async fn prompt_college(&self, ctx: &TurnContext, replies: &Replies) -> Result<Step, DialogError> {
        if ctx.for_name {
            self.say(ctx, replies.prompt.college_name).await?;
        } else {
            let name = ctx.user.name.as_deref().unwrap_or_default();
            self.say(ctx, &replies.prompt.college.format(&[name])).await?;

            let rows = self
                .registry
                .colleges()
                .names()
                .iter()
                .map(|college| ListRow::new(college.as_str()))
                .collect();
            let list = ListMessage {
                title: replies.college.title.to_string(),
                description: replies.college.description.to_string(),
                button_text: replies.college.button_text.to_string(),
                sections: vec![ListSection {
                    title: replies.college.section_title.to_string(),
                    rows,
                }],
            };
            self.gateway
                .send_message(ctx.reply_to(), MessageContent::List(list), SendOptions::default())
                .await?;
        }
        Ok(Transition::suspend(DialogState::RegisterCollege))
    }

    async fn register_college(&self, ctx: &TurnContext) -> Result<Step, DialogError> {
        match ctx.message.kind {
            MessageKind::ListResponse if ctx.body == OTHER_COLLEGE => {
                return Ok(Transition::advance(DialogState::PromptCollege)
                    .with_patch(ContextPatch::for_name()));
            }
            MessageKind::ListResponse => {}
            MessageKind::Chat if ctx.body.is_empty() => {
                return Ok(Transition::advance(DialogState::WrongInput)
                    .with_patch(ContextPatch::return_to(DialogState::PromptCollege)));
            }
            MessageKind::Chat => {
                self.registry.add_college(&ctx.body).await;
            }
            MessageKind::Location | MessageKind::Other => {
                return Ok(Transition::advance(DialogState::WrongInput)
                    .with_patch(ContextPatch::return_to(DialogState::PromptCollege)));
            }
        }

        let user = self.profiles.set_college(&ctx.user_id, &ctx.body).await;
        info!(user = %ctx.user_id, college = %ctx.body, "Registered college");
        Ok(Transition::advance(DialogState::ShowDetails).with_patch(ContextPatch::user(user)))
    }

    async fn show_details(&self, ctx: &TurnContext, replies: &Replies) -> Result<Step, DialogError> {
        let named = serde_json::to_value(&ctx.user).map_err(|e| DialogError::Handler {
            state: DialogState::ShowDetails.to_string(),
            reason: e.to_string(),
        })?;
        self.say(ctx, &replies.describe_user.render(&[], &named)).await?;
        Ok(Transition::suspend(DialogState::Idle))
    }
}

#[async_trait]
impl Flow for OnboardingFlow {
    type State = DialogState;
    type Context = TurnContext;

    fn initial_state(&self) -> DialogState {
        DialogState::Initial
    }

    async fn step(&self, state: DialogState, ctx: &TurnContext) -> Result<Step, DialogError> {
        let replies = i18n::replies(&ctx.user.lang);
        match state {
            DialogState::Initial => self.initial(ctx, replies).await,
            DialogState::PromptName => {
                self.say(ctx, replies.prompt.name).await?;
                Ok(Transition::suspend(DialogState::RegisterName))
            }
            DialogState::RegisterName => self.register_name(ctx).await,
            DialogState::PromptCollege => self.prompt_college(ctx, replies).await,
            DialogState::RegisterCollege => self.register_college(ctx).await,
            DialogState::ShowDetails => self.show_details(ctx, replies).await,
            DialogState::Idle => Ok(Transition::suspend(DialogState::Idle)),
            DialogState::WrongInput => {
                self.say(ctx, replies.prompt.error).await?;
                Ok(Transition::advance(ctx.return_state.unwrap_or(DialogState::PromptName)))
            }
        }
    }
}
