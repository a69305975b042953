//! Integration tests for the onboarding dialog.
//!
//! Each test wires the router, engine and stores over a temp directory and
//! a recording gateway, then drives the dialog with inbound messages.

use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::timeout;

use panel_bot::config::{DeleterOptions, EngineConfig};
use panel_bot::deleter::MessageDeleter;
use panel_bot::dialog::DialogEngine;
use panel_bot::error::GatewayError;
use panel_bot::gateway::{ChatMessage, MessageContent, MessageKind, MessageRecord, MessagingGateway, SendOptions};
use panel_bot::i18n;
use panel_bot::onboarding::{DialogState, OnboardingFlow};
use panel_bot::router::{Dispatch, Router};
use panel_bot::store::{JsonStore, Profiles, Registry, UserProfile};
use panel_bot::template::Render;

/// Maximum time any test is allowed to wait for a dialog to settle.
const TEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Gateway that records everything sent through it.
#[derive(Default)]
struct RecordingGateway {
    sent: Mutex<Vec<(String, MessageContent)>>,
    deleted: Mutex<Vec<(String, Vec<String>)>>,
}

impl RecordingGateway {
    fn sent(&self) -> Vec<(String, MessageContent)> {
        self.sent.lock().unwrap().clone()
    }

    fn texts(&self) -> Vec<String> {
        self.sent()
            .into_iter()
            .filter_map(|(_, content)| match content {
                MessageContent::Text { text } => Some(text),
                MessageContent::List(_) => None,
            })
            .collect()
    }

    fn clear(&self) {
        self.sent.lock().unwrap().clear();
    }
}

#[async_trait]
impl MessagingGateway for RecordingGateway {
    async fn send_message(
        &self,
        destination: &str,
        content: MessageContent,
        _options: SendOptions,
    ) -> Result<ChatMessage, GatewayError> {
        let mut sent = ChatMessage::text("out", "bot@c.us", content.summary());
        sent.from_me = true;
        sent.to = destination.to_string();
        self.sent
            .lock()
            .unwrap()
            .push((destination.to_string(), content));
        Ok(sent)
    }

    async fn delete_messages(
        &self,
        chat_id: &str,
        records: &[MessageRecord],
    ) -> Result<(), GatewayError> {
        self.deleted.lock().unwrap().push((
            chat_id.to_string(),
            records.iter().map(|r| r.id.clone()).collect(),
        ));
        Ok(())
    }

    async fn chat_message_count(&self, _chat_id: &str) -> Result<usize, GatewayError> {
        Ok(1)
    }

    async fn delete_chat(&self, _chat_id: &str) -> Result<(), GatewayError> {
        Ok(())
    }
}

struct Harness {
    _dir: tempfile::TempDir,
    gateway: Arc<RecordingGateway>,
    profiles: Arc<Profiles>,
    registry: Arc<Registry>,
    deleter: Arc<MessageDeleter>,
    router: Router,
}

impl Harness {
    async fn new(users: &str, globals: &str) -> Self {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("users.json"), users).unwrap();
        std::fs::write(dir.path().join("globals.json"), globals).unwrap();

        let gateway = Arc::new(RecordingGateway::default());
        let profiles = Arc::new(Profiles::new(
            JsonStore::load(dir.path().join("users.json")).await,
        ));
        let registry = Arc::new(Registry::new(
            JsonStore::load(dir.path().join("globals.json")).await,
        ));
        let deleter = MessageDeleter::new(
            gateway.clone(),
            DeleterOptions {
                perform_auto_deletion: false,
                ..Default::default()
            },
        );

        let flow = OnboardingFlow::new(gateway.clone(), profiles.clone(), registry.clone());
        let engine = Arc::new(DialogEngine::new(flow, EngineConfig::default()));
        let router = Router::new(engine, gateway.clone(), profiles.clone(), vec!["*".into()])
            .with_deleter(deleter.clone(), true);

        Self {
            _dir: dir,
            gateway,
            profiles,
            registry,
            deleter,
            router,
        }
    }

    async fn empty() -> Self {
        Self::new("{}", r#"{"colleges": ["Hindu College", "Other"]}"#).await
    }

    fn data_dir(&self) -> &Path {
        self._dir.path()
    }

    /// Send one message and wait for the dialog to settle.
    async fn say(&self, message: ChatMessage) -> Dispatch {
        let dispatch = self.router.handle(message).await.unwrap();
        timeout(TEST_TIMEOUT, self.router.until_idle())
            .await
            .expect("dialog did not settle");
        dispatch
    }

    async fn chat(&self, from: &str, body: &str) -> Dispatch {
        self.say(ChatMessage::text("in", from, body)).await
    }

    fn state(&self, user: &str) -> Option<DialogState> {
        let id = self.router.session_for(user)?;
        self.router.engine().state(&id)
    }
}

fn en() -> &'static i18n::Replies {
    i18n::replies("en")
}

#[tokio::test]
async fn new_user_is_greeted_and_asked_for_name() {
    let h = Harness::empty().await;

    let dispatch = h.chat("a@c.us", "hi").await;
    assert!(matches!(dispatch, Dispatch::Created(_)));
    assert_eq!(h.state("a@c.us"), Some(DialogState::RegisterName));
    assert_eq!(h.gateway.texts(), vec![en().greeting, en().prompt.name]);
    assert!(h.gateway.sent().iter().all(|(to, _)| to == "a@c.us"));
}

#[tokio::test]
async fn invalid_name_is_rejected_and_not_stored() {
    let h = Harness::empty().await;
    h.chat("a@c.us", "hi").await;
    h.gateway.clear();

    let dispatch = h.chat("a@c.us", "12345").await;
    assert!(matches!(dispatch, Dispatch::Continued(_)));
    assert_eq!(h.gateway.texts(), vec![en().prompt.error, en().prompt.name]);
    assert_eq!(h.state("a@c.us"), Some(DialogState::RegisterName));
    assert!(!h.profiles.contains("a@c.us"));
}

#[tokio::test]
async fn full_onboarding_with_new_college() {
    let h = Harness::empty().await;
    h.chat("a@c.us", "hi").await;
    h.gateway.clear();

    // Valid name is stored and the college list is shown.
    h.chat("a@c.us", "Asha Rao").await;
    assert_eq!(h.state("a@c.us"), Some(DialogState::RegisterCollege));
    assert_eq!(h.profiles.get("a@c.us").name.as_deref(), Some("Asha Rao"));

    let sent = h.gateway.sent();
    assert_eq!(sent.len(), 2);
    assert_eq!(
        sent[0].1,
        MessageContent::text(en().prompt.college.format(&["Asha Rao"]))
    );
    match &sent[1].1 {
        MessageContent::List(list) => {
            let rows: Vec<_> = list.sections[0].rows.iter().map(|r| r.title.as_str()).collect();
            assert_eq!(rows, vec!["Hindu College", "Other"]);
            assert_eq!(list.title, en().college.title);
        }
        other => panic!("expected a list, got {other:?}"),
    }
    h.gateway.clear();

    // "Other" asks for the college by name.
    h.say(ChatMessage::text("in", "a@c.us", "Other").with_kind(MessageKind::ListResponse))
        .await;
    assert_eq!(h.gateway.texts(), vec![en().prompt.college_name]);
    assert_eq!(h.state("a@c.us"), Some(DialogState::RegisterCollege));
    h.gateway.clear();

    // A free-text college is added before the sentinel.
    h.chat("a@c.us", "Ramjas College").await;
    assert_eq!(h.state("a@c.us"), Some(DialogState::Idle));
    assert_eq!(
        h.registry.colleges().names(),
        ["Hindu College", "Ramjas College", "Other"]
    );

    let texts = h.gateway.texts();
    assert_eq!(texts.len(), 1);
    assert!(texts[0].contains("Name: Asha Rao"));
    assert!(texts[0].contains("College: Ramjas College"));
    assert!(texts[0].contains("Language: en"));

    // Both documents reached the disk.
    let users = JsonStore::load(h.data_dir().join("users.json")).await;
    let stored: UserProfile = users.get("a@c.us").unwrap();
    assert_eq!(stored.name.as_deref(), Some("Asha Rao"));
    assert_eq!(stored.college.as_deref(), Some("Ramjas College"));

    let globals = JsonStore::load(h.data_dir().join("globals.json")).await;
    let colleges: Vec<String> = globals.get("colleges").unwrap();
    assert_eq!(colleges, ["Hindu College", "Ramjas College", "Other"]);

    // Idle swallows further input.
    h.gateway.clear();
    h.chat("a@c.us", "anything else?").await;
    assert!(h.gateway.sent().is_empty());
    assert_eq!(h.state("a@c.us"), Some(DialogState::Idle));
}

#[tokio::test]
async fn listed_college_is_not_added_again() {
    let h = Harness::empty().await;
    h.chat("a@c.us", "hi").await;
    h.chat("a@c.us", "Asha Rao").await;

    h.say(
        ChatMessage::text("in", "a@c.us", "Hindu College").with_kind(MessageKind::ListResponse),
    )
    .await;
    assert_eq!(h.state("a@c.us"), Some(DialogState::Idle));
    assert_eq!(h.registry.colleges().names(), ["Hindu College", "Other"]);
    assert_eq!(
        h.profiles.get("a@c.us").college.as_deref(),
        Some("Hindu College")
    );
}

#[tokio::test]
async fn empty_college_asks_again() {
    let h = Harness::empty().await;
    h.chat("a@c.us", "hi").await;
    h.chat("a@c.us", "Asha Rao").await;
    h.gateway.clear();

    h.chat("a@c.us", "   ").await;
    assert_eq!(h.state("a@c.us"), Some(DialogState::RegisterCollege));
    let texts = h.gateway.texts();
    assert_eq!(texts[0], en().prompt.error);
    assert_eq!(texts[1], en().prompt.college.format(&["Asha Rao"]));
    assert!(h.profiles.get("a@c.us").college.is_none());
}

#[tokio::test]
async fn returning_user_skips_to_details() {
    let h = Harness::new(
        r#"{"b@c.us": {"lang": "en", "name": "Bo", "college": "Hindu College"}}"#,
        r#"{"colleges": ["Hindu College", "Other"]}"#,
    )
    .await;

    h.chat("b@c.us", "hello").await;
    assert_eq!(h.state("b@c.us"), Some(DialogState::Idle));

    let texts = h.gateway.texts();
    assert_eq!(texts.len(), 2);
    assert_eq!(texts[0], en().welcome_back.format(&["Bo"]));
    assert!(texts[1].contains("Name: Bo"));
    assert!(!texts.iter().any(|t| t == en().prompt.name));
}

#[tokio::test]
async fn half_registered_user_starts_over() {
    let h = Harness::new(r#"{"c@c.us": {"lang": "en", "name": "Cy"}}"#, "{}").await;

    h.chat("c@c.us", "hello").await;
    assert_eq!(h.state("c@c.us"), Some(DialogState::RegisterName));
    assert_eq!(h.gateway.texts(), vec![en().greeting, en().prompt.name]);
}

#[tokio::test]
async fn group_messages_are_keyed_by_author() {
    let h = Harness::empty().await;
    h.say(ChatMessage::text("in", "group@g.us", "hi").with_author("a@c.us"))
        .await;

    assert!(h.router.session_for("a@c.us").is_some());
    assert!(h.router.session_for("group@g.us").is_none());
    assert!(h.gateway.sent().iter().all(|(to, _)| to == "group@g.us"));
}

#[tokio::test]
async fn about_command_does_not_touch_the_dialog() {
    let h = Harness::empty().await;

    let dispatch = h.chat("a@c.us", "/about").await;
    assert_eq!(dispatch, Dispatch::Command("about".into()));
    assert_eq!(h.gateway.texts(), vec![en().about]);
    assert!(h.router.session_for("a@c.us").is_none());

    // Handled commands are queued for deletion.
    assert_eq!(h.deleter.pending("a@c.us").await, 1);
}

#[tokio::test]
async fn lang_command() {
    let h = Harness::empty().await;

    h.chat("a@c.us", "/lang to xx").await;
    assert_eq!(
        h.gateway.texts(),
        vec![en().lang.no_such_lang.format(&["xx", "en"])]
    );
    assert!(!h.profiles.contains("a@c.us"));
    h.gateway.clear();

    h.chat("a@c.us", "!LANG EN").await;
    assert_eq!(h.gateway.texts(), vec![en().lang.changed.format(&["en"])]);
    assert_eq!(h.profiles.get("a@c.us").lang, "en");
    assert!(h.profiles.contains("a@c.us"));
}

#[tokio::test]
async fn users_outside_allowlist_are_ignored() {
    let dir = tempfile::tempdir().unwrap();
    let gateway = Arc::new(RecordingGateway::default());
    let profiles = Arc::new(Profiles::new(JsonStore::load(dir.path().join("users.json")).await));
    let registry = Arc::new(Registry::new(
        JsonStore::load(dir.path().join("globals.json")).await,
    ));
    let flow = OnboardingFlow::new(gateway.clone(), profiles.clone(), registry);
    let engine = Arc::new(DialogEngine::new(flow, EngineConfig::default()));
    let router = Router::new(engine, gateway.clone(), profiles, vec!["a@c.us".into()]);

    let dispatch = router
        .handle(ChatMessage::text("in", "b@c.us", "hi"))
        .await
        .unwrap();
    assert_eq!(dispatch, Dispatch::Ignored);
    assert!(gateway.sent().is_empty());
    assert!(router.session_for("b@c.us").is_none());
}

#[tokio::test]
async fn evicted_session_is_recreated() {
    let h = Harness::empty().await;
    h.chat("a@c.us", "hi").await;
    let first = h.router.session_for("a@c.us").unwrap();

    assert_eq!(h.router.engine().evict_idle(Duration::ZERO), 1);

    let dispatch = h.chat("a@c.us", "hi again").await;
    let Dispatch::Created(second) = dispatch else {
        panic!("expected a new session, got {dispatch:?}");
    };
    assert_ne!(first, second);
    assert_eq!(h.router.session_for("a@c.us"), Some(second));
}

#[tokio::test]
async fn deleter_batches_and_executes() {
    let h = Harness::empty().await;
    let max = h.deleter.options().max_queue_length;

    for i in 0..=max {
        let msg = ChatMessage::text(format!("m{i}"), "a@c.us", "x").with_timestamp(100);
        h.deleter.delete_for_me(&msg).await;
    }
    assert!(h.gateway.deleted.lock().unwrap().is_empty());

    // Over the limit: the queue is flushed before the next append.
    let msg = ChatMessage::text("next", "a@c.us", "x").with_timestamp(100);
    assert_eq!(h.deleter.delete_for_me(&msg).await, 1);
    assert_eq!(h.gateway.deleted.lock().unwrap()[0].1.len(), max + 1);

    // Stale: the gap exceeds the message delay.
    let later = 100 + h.deleter.options().message_delay.as_secs() as i64 + 1;
    let msg = ChatMessage::text("late", "a@c.us", "x").with_timestamp(later);
    assert_eq!(h.deleter.delete_for_me(&msg).await, 1);
    assert_eq!(h.gateway.deleted.lock().unwrap().len(), 2);

    let msg = ChatMessage::text("g", "group@g.us", "x").with_timestamp(later);
    h.deleter.delete_for_me(&msg).await;

    assert_eq!(h.deleter.execute().await, 2);
    assert_eq!(h.deleter.pending("a@c.us").await, 0);
    assert_eq!(h.deleter.pending("group@g.us").await, 0);
}
