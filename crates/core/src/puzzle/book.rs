use std::collections::{BTreeSet, HashMap, VecDeque};

use super::script::{HintId, PuzzleScript};
use crate::types::{MessageId, UserId};

/// One player's riddle progress.
#[derive(Debug, Clone, Default)]
pub struct PuzzleSession {
    pub active: bool,
    pub revealed: BTreeSet<HintId>,
    /// The posted puzzle prompt this session started from.
    pub anchor: Option<MessageId>,
}

impl PuzzleSession {
    fn has_all_hints(&self) -> bool {
        self.revealed.is_superset(&HintId::required())
    }
}

/// Observable puzzle state for one user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PuzzleState {
    Idle,
    Active { revealed: usize },
    AllHintsRevealed,
}

/// What the puzzle machine wants said.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PuzzleReply {
    /// Riddle started; the sent message becomes the anchor.
    Prompt(String),
    Hint(String),
    Rebuff(String),
    Nudge(String),
    Solved(String),
    Retry(String),
}

impl PuzzleReply {
    pub fn text(&self) -> &str {
        match self {
            Self::Prompt(t)
            | Self::Hint(t)
            | Self::Rebuff(t)
            | Self::Nudge(t)
            | Self::Solved(t)
            | Self::Retry(t) => t,
        }
    }

    pub fn is_prompt(&self) -> bool {
        matches!(self, Self::Prompt(_))
    }
}

/// Prompt ids remembered per user; older ones stop suppressing quotes.
pub const ANCHORS_PER_USER: usize = 3;

/// Per-user puzzle sessions plus each user's most recent prompt ids.
#[derive(Debug, Default)]
pub struct PuzzleBook {
    script: PuzzleScript,
    sessions: HashMap<UserId, PuzzleSession>,
    anchors: HashMap<UserId, VecDeque<MessageId>>,
}

impl PuzzleBook {
    pub fn new(script: PuzzleScript) -> Self {
        Self { script, sessions: HashMap::new(), anchors: HashMap::new() }
    }

    pub fn script(&self) -> &PuzzleScript {
        &self.script
    }

    pub fn is_active(&self, user: UserId) -> bool {
        self.sessions.get(&user).is_some_and(|s| s.active)
    }

    /// True if this message is for the puzzle machine.
    pub fn claims(&self, user: UserId, text: &str) -> bool {
        self.is_active(user) || self.script.is_trigger(text)
    }

    pub fn state(&self, user: UserId) -> PuzzleState {
        match self.sessions.get(&user) {
            Some(s) if s.active && s.has_all_hints() => PuzzleState::AllHintsRevealed,
            Some(s) if s.active => PuzzleState::Active { revealed: s.revealed.len() },
            _ => PuzzleState::Idle,
        }
    }

    pub fn revealed(&self, user: UserId) -> BTreeSet<HintId> {
        self.sessions.get(&user).map(|s| s.revealed.clone()).unwrap_or_default()
    }

    pub fn session(&self, user: UserId) -> Option<&PuzzleSession> {
        self.sessions.get(&user)
    }

    /// Advance `user`'s riddle with `text`. `None` if the message is not puzzle input.
    pub fn handle(&mut self, user: UserId, text: &str) -> Option<PuzzleReply> {
        let mention = user.mention();

        if self.script.is_trigger(text) {
            let session = self.sessions.entry(user).or_default();
            session.active = true;
            session.revealed.clear();
            session.anchor = None;
            tracing::debug!(user = %user, "puzzle started");
            return Some(PuzzleReply::Prompt(self.script.render_prompt()));
        }

        let session = self.sessions.get_mut(&user).filter(|s| s.active)?;

        if let Some(hint) = self.script.hint_for(text) {
            return Some(if session.revealed.insert(hint.id) {
                tracing::debug!(user = %user, hint = ?hint.id, "hint revealed");
                PuzzleReply::Hint(hint.reply.clone())
            } else {
                PuzzleReply::Rebuff(self.script.rebuff.clone())
            });
        }

        if !session.has_all_hints() {
            return Some(PuzzleReply::Nudge(PuzzleScript::render(&self.script.nudge, &mention)));
        }

        if self.script.is_solution(text) {
            self.sessions.remove(&user);
            tracing::info!(user = %user, "puzzle solved");
            Some(PuzzleReply::Solved(PuzzleScript::render(&self.script.solved, &mention)))
        } else {
            Some(PuzzleReply::Retry(PuzzleScript::render(&self.script.retry, &mention)))
        }
    }

    /// Record the id of the prompt message posted for `user`.
    /// Only the last [`ANCHORS_PER_USER`] prompts per user are kept.
    pub fn set_anchor(&mut self, user: UserId, message: MessageId) {
        let recent = self.anchors.entry(user).or_default();
        recent.push_back(message);
        while recent.len() > ANCHORS_PER_USER {
            recent.pop_front();
        }
        if let Some(session) = self.sessions.get_mut(&user) {
            session.anchor = Some(message);
        }
    }

    /// True if `message` is a puzzle prompt we posted.
    pub fn is_anchor(&self, message: MessageId) -> bool {
        self.anchors.values().any(|recent| recent.contains(&message))
    }
}
