mod console;
mod event;

use console::{ConsoleTransport, Speakers};
use event::InputEvent;
use nadeko_core::config::BotCfg;
use nadeko_core::dispatch::Dispatcher;
use nadeko_core::io::{ChatTransport, input};
use nadeko_core::puzzle::PuzzleScript;
use nadeko_core::runtime::Runtime;
use nadeko_core::types::{Identity, UserId};
use std::sync::Arc;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

const HELP: &str =
    "commands: /user <name> switch speaker, /quit exit. address the bot with @nadeko";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cfg = BotCfg::from_env();

    // Tracing: write to file when RUST_LOG is set so logs don't interleave with the prompt
    if std::env::var("RUST_LOG").is_ok() {
        let file = std::fs::File::create("/tmp/nadeko.log")?;
        tracing_subscriber::registry()
            .with(EnvFilter::from_default_env())
            .with(fmt::layer().json().with_target(true).with_writer(file))
            .init();
    }

    let script = match &cfg.puzzle_file {
        Some(path) => PuzzleScript::from_file(path)?,
        None => PuzzleScript::default(),
    };

    let identity = Identity { user_id: UserId(1), name: "nadeko".into() };
    let transport = ConsoleTransport::new(&identity);
    let chat: Arc<dyn ChatTransport> = transport.clone();
    let dispatcher = Dispatcher::from_cfg(&cfg, identity.clone(), chat, script);
    if dispatcher.provider_names().is_empty() {
        println!("no LLM keys configured; mentions will get the apology reply");
    }

    let (mut runtime, event_tx) = Runtime::new(Arc::new(dispatcher), cfg.shutdown_timeout());
    let token = runtime.token();

    let (ready_tx, ready_rx) = std::sync::mpsc::channel();
    let mut lines = event::spawn("> ".into(), ready_rx);
    println!("{HELP}");

    let repl_token = token.clone();
    let repl = async move {
        let mut speakers = Speakers::new("you");
        loop {
            if ready_tx.send(()).is_err() {
                break;
            }
            let event = tokio::select! {
                _ = repl_token.cancelled() => break,
                event = lines.recv() => event,
            };
            let line = match event {
                Some(InputEvent::Line(line)) => line,
                Some(InputEvent::Interrupted | InputEvent::Eof) | None => break,
                Some(InputEvent::Error(e)) => {
                    tracing::error!(error = %e, "line editor failed");
                    break;
                }
            };

            let line = line.trim();
            match line.split_once(' ').unwrap_or((line, "")) {
                ("", _) => continue,
                ("/quit" | "/exit", _) => break,
                ("/help", _) => println!("{HELP}"),
                ("/user", name) if !name.trim().is_empty() => {
                    let speaker = speakers.switch(name.trim());
                    println!("now speaking as {} ({})", speaker.name, speaker.id);
                }
                ("/user", _) => println!("usage: /user <name>"),
                _ => {
                    let message = transport.inbound(&identity, speakers.current(), line);
                    if input::submit(&event_tx, message).await.is_err() {
                        break;
                    }
                }
            }
        }
        // Dropping the sender lets the runtime drain in-flight handlers and stop.
        drop(event_tx);
    };

    tokio::join!(runtime.run_until_closed(), repl);
    token.cancel();
    Ok(())
}
