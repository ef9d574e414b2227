use std::sync::Arc;

use nadeko_core::config::BotCfg;
use nadeko_core::dispatch::Dispatcher;
use nadeko_core::io::ChatTransport;
use nadeko_core::io::discord::{self, DiscordClient};
use nadeko_core::puzzle::PuzzleScript;
use nadeko_core::runtime::Runtime;
use nadeko_core::types::ChannelId;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Reads .env first so RUST_LOG from the file applies.
    let cfg = BotCfg::from_env();
    init_tracing();
    tracing::info!(cfg = ?cfg, "configuration loaded");

    let script = match &cfg.puzzle_file {
        Some(path) => PuzzleScript::from_file(path)?,
        None => PuzzleScript::default(),
    };

    let client = Arc::new(DiscordClient::new(cfg.require_discord_token()?));
    let identity = client.identity().await?;
    tracing::info!(
        user = %identity.user_id,
        name = %identity.name,
        guild = cfg.guild_id,
        "logged in"
    );

    let transport: Arc<dyn ChatTransport> = client.clone();
    let dispatcher = Dispatcher::from_cfg(&cfg, identity, transport, script);
    let (mut runtime, event_tx) = Runtime::new(Arc::new(dispatcher), cfg.shutdown_timeout());
    let token = runtime.token();

    let channel = ChannelId(cfg.channel_id);
    let interval = cfg.poll_interval();
    let poll_token = token.clone();
    let poller = tokio::spawn(async move {
        let polled =
            discord::poll_channel(&client, channel, interval, event_tx, poll_token.clone()).await;
        if let Err(e) = polled {
            tracing::error!(error = %e, "channel polling stopped");
            poll_token.cancel();
        }
    });

    runtime.run().await;
    token.cancel();
    if let Err(e) = poller.await {
        tracing::warn!(error = %e, "poller task ended abnormally");
    }
    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);
    if std::env::var_os("NADEKO_LOG_JSON").is_some() {
        registry.with(fmt::layer().json().with_target(true)).init();
    } else {
        registry.with(fmt::layer().with_target(true)).init();
    }
}
