use std::sync::Arc;
use std::time::Duration;

use anyhow::Context as _;
use futures::StreamExt;

use panel_bot::config::BotConfig;
use panel_bot::deleter::MessageDeleter;
use panel_bot::dialog::{DialogEngine, spawn_idle_sweeper};
use panel_bot::gateway::{MessagingGateway, StdioGateway};
use panel_bot::onboarding::OnboardingFlow;
use panel_bot::router::Router;
use panel_bot::store::{JsonStore, Profiles, Registry};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing. Stdout carries gateway events, so logs go to stderr.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let config = BotConfig::from_env().context("invalid configuration")?;

    eprintln!("🤖 Panel Bot v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Bot id: {}", config.bot_id);
    eprintln!("   Data: {}", config.data_dir.display());
    eprintln!("   Auto-delete: {}", config.deleter.perform_auto_deletion);
    eprintln!("   Reading JSON messages from stdin.\n");

    tokio::fs::create_dir_all(&config.data_dir)
        .await
        .with_context(|| format!("creating {}", config.data_dir.display()))?;

    let profiles = Arc::new(Profiles::new(JsonStore::load(config.users_path()).await));
    let registry = Arc::new(Registry::new(JsonStore::load(config.globals_path()).await));

    let stdio = Arc::new(StdioGateway::new(config.bot_id.clone()));
    let mut inbound = stdio.start();
    let gateway: Arc<dyn MessagingGateway> = stdio;

    let deleter = MessageDeleter::new(Arc::clone(&gateway), config.deleter.clone());

    let flow = OnboardingFlow::new(
        Arc::clone(&gateway),
        Arc::clone(&profiles),
        Arc::clone(&registry),
    );
    let engine = Arc::new(DialogEngine::new(flow, config.engine.clone()));

    let sweeper = config.session_idle_timeout.map(|max_idle| {
        let every = (max_idle / 4).max(Duration::from_secs(1));
        spawn_idle_sweeper(Arc::clone(&engine), max_idle, every)
    });

    let router = Router::new(
        engine,
        Arc::clone(&gateway),
        Arc::clone(&profiles),
        config.allowed_users.clone(),
    )
    .with_deleter(Arc::clone(&deleter), config.delete_commands);

    tracing::info!(allowed = ?config.allowed_users, "Panel Bot started");

    loop {
        tokio::select! {
            next = inbound.next() => {
                let Some(message) = next else {
                    tracing::info!("Inbound stream closed");
                    break;
                };
                if let Err(e) = router.handle(message).await {
                    tracing::warn!(error = %e, "Failed to handle message");
                }
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Interrupted, shutting down");
                break;
            }
        }
    }

    router.until_idle().await;
    if let Some(sweeper) = sweeper {
        sweeper.abort();
    }
    deleter.stop_auto_deleter();
    profiles.sync().await;
    registry.sync().await;
    tracing::info!("Panel Bot stopped");

    Ok(())
}
