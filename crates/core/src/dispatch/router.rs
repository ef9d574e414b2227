use std::sync::{Arc, Mutex};
use std::time::Instant;

use crate::cognition::ambient::AmbientScheduler;
use crate::cognition::answer::AnswerResolver;
use crate::config::BotCfg;
use crate::io::ChatTransport;
use crate::puzzle::{PuzzleBook, PuzzleReply, PuzzleScript};
use crate::types::{Identity, IncomingMessage, Route};

/// Sent when the assistant is addressed with nothing to ask.
const EMPTY_MENTION: &str = "……何か…聞いて欲しいこと、ある…？";
/// Placeholder posted while an answer is being generated.
const THINKING: &str = "……考えてみるね…";

/// Outcome of the in-order step.
#[derive(Debug)]
pub enum Accepted {
    Done(Route),
    Pending(Pending),
}

/// Slow work left once a message has been accepted.
#[derive(Debug)]
pub enum Pending {
    /// Addressed question: placeholder, answer, edit.
    Mention(IncomingMessage),
    /// Unaddressed chatter: maybe join in.
    Ambient(IncomingMessage),
}

/// Owns all conversational state and routes each message down exactly one path:
/// puzzle → mention → ambient.
pub struct Dispatcher {
    identity: Identity,
    transport: Arc<dyn ChatTransport>,
    puzzles: Mutex<PuzzleBook>,
    answers: AnswerResolver,
    ambient: AmbientScheduler,
}

impl Dispatcher {
    pub fn new(
        identity: Identity,
        transport: Arc<dyn ChatTransport>,
        script: PuzzleScript,
        answers: AnswerResolver,
        ambient: AmbientScheduler,
    ) -> Self {
        Self {
            identity,
            transport,
            puzzles: Mutex::new(PuzzleBook::new(script)),
            answers,
            ambient,
        }
    }

    /// Wire a dispatcher from configuration.
    pub fn from_cfg(
        cfg: &BotCfg,
        identity: Identity,
        transport: Arc<dyn ChatTransport>,
        script: PuzzleScript,
    ) -> Self {
        let ambient = AmbientScheduler::new(
            cfg.ambient_probability,
            cfg.ambient_cooldown(),
            cfg.history_window,
        );
        Self::new(identity, transport, script, AnswerResolver::from_cfg(cfg), ambient)
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    /// Answer providers in fallback order.
    pub fn provider_names(&self) -> Vec<&str> {
        self.answers.provider_names()
    }

    /// Run `f` with the puzzle book locked. Never held across an await.
    pub fn with_puzzles<T>(&self, f: impl FnOnce(&mut PuzzleBook) -> T) -> Option<T> {
        match self.puzzles.lock() {
            Ok(mut book) => Some(f(&mut book)),
            Err(_) => {
                tracing::error!("puzzle book lock poisoned");
                None
            }
        }
    }

    /// Handle one inbound message start to finish.
    pub async fn on_message(&self, msg: IncomingMessage) -> Route {
        match self.accept(msg).await {
            Accepted::Done(route) => route,
            Accepted::Pending(work) => self.finish(work).await,
        }
    }

    /// The part of handling that must run in arrival order: filtering, the
    /// puzzle transition and its reply, quoted-prompt suppression. Anything
    /// slow is handed back as [`Pending`].
    pub async fn accept(&self, msg: IncomingMessage) -> Accepted {
        if msg.author.is_bot || msg.author.id == self.identity.user_id {
            return Accepted::Done(Route::Ignored);
        }

        let puzzle = self
            .with_puzzles(|book| book.handle(msg.author.id, &msg.content))
            .flatten();
        if let Some(reply) = puzzle {
            self.reply_puzzle(&msg, reply).await;
            return Accepted::Done(Route::Puzzle);
        }

        if !self.identity.is_addressed_by(&msg) {
            return Accepted::Pending(Pending::Ambient(msg));
        }

        let quoted = msg
            .referenced_message_id
            .is_some_and(|id| self.with_puzzles(|book| book.is_anchor(id)).unwrap_or(false));
        if quoted {
            tracing::debug!(user = %msg.author.id, "mention quotes a puzzle prompt, suppressed");
            return Accepted::Done(Route::QuotedPuzzle);
        }
        Accepted::Pending(Pending::Mention(msg))
    }

    /// Complete work deferred by [`Dispatcher::accept`]. Safe to run concurrently.
    pub async fn finish(&self, work: Pending) -> Route {
        match work {
            Pending::Mention(msg) => self.answer_mention(&msg).await,
            Pending::Ambient(msg) => {
                let sent = self
                    .ambient
                    .maybe_participate(
                        msg.channel_id,
                        self.transport.as_ref(),
                        &self.answers,
                        Instant::now(),
                    )
                    .await;
                Route::Ambient { sent }
            }
        }
    }

    async fn reply_puzzle(&self, msg: &IncomingMessage, reply: PuzzleReply) {
        match self.transport.send(msg.channel_id, reply.text()).await {
            Ok(handle) if reply.is_prompt() => {
                self.with_puzzles(|book| book.set_anchor(msg.author.id, handle.message_id));
            }
            Ok(_) => {}
            Err(e) => {
                tracing::warn!(user = %msg.author.id, error = %e, "failed to send puzzle reply");
            }
        }
    }

    async fn answer_mention(&self, msg: &IncomingMessage) -> Route {
        let mention = msg.author.id.mention();
        let query = self.identity.strip_address(&msg.content);

        if query.is_empty() {
            let text = format!("{mention} {EMPTY_MENTION}");
            if let Err(e) = self.transport.send(msg.channel_id, &text).await {
                tracing::warn!(user = %msg.author.id, error = %e, "failed to ask for a question");
            }
            return Route::EmptyMention;
        }

        let thinking = format!("{mention} {THINKING}");
        let placeholder = match self.transport.send(msg.channel_id, &thinking).await {
            Ok(handle) => handle,
            Err(e) => {
                tracing::warn!(user = %msg.author.id, error = %e, "failed to send placeholder");
                return Route::Answered;
            }
        };

        let answer = self.answers.resolve(&query).await;
        if let Err(e) = self.transport.edit(&placeholder, &format!("{mention} {answer}")).await {
            tracing::warn!(user = %msg.author.id, error = %e, "failed to edit placeholder");
        }
        Route::Answered
    }
}
