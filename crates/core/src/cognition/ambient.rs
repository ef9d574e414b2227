//! Ambient participation: occasionally join the conversation unprompted.
//!
//! Two gates guard every attempt: a shared cooldown clock and a per-message
//! coin flip. Only a successful send arms the cooldown, so a failed attempt
//! can be retried on the very next eligible message.

use std::sync::Mutex;
use std::time::{Duration, Instant};

use rand::rngs::StdRng;
use rand::{Rng, RngCore, SeedableRng};

use super::answer::AnswerResolver;
use super::persona;
use crate::io::ChatTransport;
use crate::types::{ChannelId, ConversationTurn, IncomingMessage};

/// Process-wide gate: no ambient message before `next_eligible`.
#[derive(Debug, Default)]
pub struct CooldownClock {
    next_eligible: Option<Instant>,
}

impl CooldownClock {
    pub fn is_eligible(&self, now: Instant) -> bool {
        self.next_eligible.is_none_or(|t| now >= t)
    }

    /// Close the gate until `now + cooldown`.
    pub fn arm(&mut self, now: Instant, cooldown: Duration) {
        self.next_eligible = Some(now + cooldown);
    }

    pub fn next_eligible(&self) -> Option<Instant> {
        self.next_eligible
    }
}

#[derive(Debug, Default)]
struct Gate {
    clock: CooldownClock,
    in_flight: bool,
}

/// Why an attempt that passed both gates did not send.
#[derive(Debug, thiserror::Error)]
pub enum AmbientError {
    #[error("history fetch failed: {0}")]
    History(#[from] crate::io::TransportError),
    #[error("no usable history")]
    EmptyHistory,
    #[error("generation failed: {0}")]
    Generate(#[from] nadeko_llm::LlmError),
}

pub struct AmbientScheduler {
    gate: Mutex<Gate>,
    rng: Mutex<Box<dyn RngCore + Send>>,
    probability: f64,
    cooldown: Duration,
    window: usize,
}

impl AmbientScheduler {
    pub fn new(probability: f64, cooldown: Duration, window: usize) -> Self {
        Self {
            gate: Mutex::new(Gate::default()),
            rng: Mutex::new(Box::new(StdRng::from_entropy())),
            probability: probability.clamp(0.0, 1.0),
            cooldown,
            window: window.max(1),
        }
    }

    /// Replace the random source.
    pub fn with_rng(mut self, rng: Box<dyn RngCore + Send>) -> Self {
        self.rng = Mutex::new(rng);
        self
    }

    pub fn next_eligible(&self) -> Option<Instant> {
        self.gate.lock().ok().and_then(|g| g.clock.next_eligible())
    }

    /// Both gates, checked atomically. Passing marks an attempt in flight.
    fn try_open(&self, now: Instant) -> bool {
        let Ok(mut gate) = self.gate.lock() else {
            return false;
        };
        if gate.in_flight || !gate.clock.is_eligible(now) {
            return false;
        }
        let roll: f64 = match self.rng.lock() {
            Ok(mut rng) => rng.gen_range(0.0..1.0),
            Err(_) => return false,
        };
        if roll >= self.probability {
            return false;
        }
        tracing::debug!(roll, probability = self.probability, "ambient gate opened");
        gate.in_flight = true;
        true
    }

    fn close(&self, armed_at: Option<Instant>) {
        if let Ok(mut gate) = self.gate.lock() {
            gate.in_flight = false;
            if let Some(now) = armed_at {
                gate.clock.arm(now, self.cooldown);
            }
        }
    }

    /// Possibly post an unprompted message to `channel`. Returns true if one was sent.
    pub async fn maybe_participate(
        &self,
        channel: ChannelId,
        transport: &dyn ChatTransport,
        answers: &AnswerResolver,
        now: Instant,
    ) -> bool {
        if !self.try_open(now) {
            return false;
        }

        let text = match self.compose(channel, transport, answers).await {
            Ok(text) => text,
            Err(e) => {
                tracing::warn!(channel = %channel, error = %e, "ambient participation failed");
                self.close(None);
                return false;
            }
        };

        match transport.send(channel, &text).await {
            Ok(_) => {
                let cooldown_secs = self.cooldown.as_secs();
                tracing::info!(channel = %channel, cooldown_secs, "joined conversation");
                self.close(Some(now));
                true
            }
            Err(e) => {
                tracing::warn!(channel = %channel, error = %e, "ambient send failed");
                self.close(None);
                false
            }
        }
    }

    async fn compose(
        &self,
        channel: ChannelId,
        transport: &dyn ChatTransport,
        answers: &AnswerResolver,
    ) -> Result<String, AmbientError> {
        let history = transport.fetch_history(channel, self.window).await?;
        let turns = sample_turns(history);
        if turns.is_empty() {
            return Err(AmbientError::EmptyHistory);
        }
        let prompt = persona::build_ambient_prompt(&turns);
        Ok(answers.generate(&prompt).await?)
    }
}

/// Newest-first history → chronological turns, without bot or empty messages.
pub fn sample_turns(history: Vec<IncomingMessage>) -> Vec<ConversationTurn> {
    let mut turns: Vec<ConversationTurn> = history
        .into_iter()
        .filter(|m| !m.author.is_bot)
        .filter_map(|m| {
            let text = m.content.trim();
            (!text.is_empty()).then(|| ConversationTurn {
                speaker: m.author.display_name.clone(),
                text: text.to_owned(),
            })
        })
        .collect();
    turns.reverse();
    turns
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cognition::answer::Backends;
    use crate::io::memory::MemoryTransport;
    use crate::types::{Author, MessageId, UserId};
    use nadeko_llm::provider::MockProvider;
    use rand::rngs::mock::StepRng;
    use std::sync::Arc;

    const CH: ChannelId = ChannelId(1);
    const HOUR: Duration = Duration::from_secs(3600);

    fn always() -> Box<dyn RngCore + Send> {
        Box::new(StepRng::new(0, 0))
    }

    fn never() -> Box<dyn RngCore + Send> {
        Box::new(StepRng::new(u64::MAX, 0))
    }

    fn msg(id: u64, name: &str, text: &str, is_bot: bool) -> IncomingMessage {
        IncomingMessage {
            id: MessageId(id),
            channel_id: CH,
            author: Author { id: UserId(id), display_name: name.into(), is_bot },
            content: text.into(),
            mentions: vec![],
            referenced_message_id: None,
            timestamp: chrono::Utc::now(),
        }
    }

    fn bot() -> Author {
        Author { id: UserId(99), display_name: "nadeko".into(), is_bot: true }
    }

    fn transport() -> MemoryTransport {
        let t = MemoryTransport::new(bot());
        t.record(msg(1, "taro", "おはよう", false));
        t.record(msg(2, "hanako", "眠いね", false));
        t
    }

    fn answers(provider: MockProvider) -> AnswerResolver {
        AnswerResolver::new(
            Backends { primary: None, fallback: Some(Arc::new(provider)), search: None },
            Duration::from_secs(10),
        )
    }

    #[test]
    fn clock_gates_until_deadline() {
        let start = Instant::now();
        let mut clock = CooldownClock::default();
        assert!(clock.is_eligible(start));
        clock.arm(start, HOUR);
        assert!(!clock.is_eligible(start + Duration::from_secs(3599)));
        assert!(clock.is_eligible(start + HOUR));
    }

    #[test]
    fn sample_turns_filters_and_orders() {
        let history = vec![
            msg(4, "taro", "  three ", false),
            msg(3, "bot", "ignored", true),
            msg(2, "hanako", "   ", false),
            msg(1, "taro", "one", false),
        ];
        let turns = sample_turns(history);
        let lines: Vec<String> = turns.iter().map(ToString::to_string).collect();
        assert_eq!(lines, ["taro: one", "taro: three"]);
    }

    #[tokio::test]
    async fn sends_and_arms_cooldown() {
        let t = transport();
        let provider = MockProvider::new("ねむいの…わかるよ…");
        let a = answers(provider.clone());
        let s = AmbientScheduler::new(0.03, HOUR, 15).with_rng(always());
        let now = Instant::now();

        assert!(s.maybe_participate(CH, &t, &a, now).await);
        assert_eq!(t.sent_texts(), vec!["ねむいの…わかるよ…".to_string()]);
        assert_eq!(s.next_eligible(), Some(now + HOUR));

        let prompt = provider.last_request().unwrap().last_user_content().unwrap().to_owned();
        assert!(prompt.ends_with("taro: おはよう\nhanako: 眠いね"));

        // Inside the cooldown nothing happens, however lucky the roll.
        assert!(!s.maybe_participate(CH, &t, &a, now + Duration::from_secs(3599)).await);
        assert_eq!(provider.calls(), 1);
        assert!(s.maybe_participate(CH, &t, &a, now + HOUR).await);
    }

    #[tokio::test]
    async fn unlucky_roll_does_nothing() {
        let t = transport();
        let provider = MockProvider::new("x");
        let s = AmbientScheduler::new(0.03, HOUR, 15).with_rng(never());
        assert!(!s.maybe_participate(CH, &t, &answers(provider.clone()), Instant::now()).await);
        assert_eq!(provider.calls(), 0);
        assert!(s.next_eligible().is_none());
    }

    #[tokio::test]
    async fn failed_generation_leaves_cooldown_open() {
        let t = transport();
        let s = AmbientScheduler::new(0.03, HOUR, 15).with_rng(always());
        let now = Instant::now();

        assert!(!s.maybe_participate(CH, &t, &answers(MockProvider::failing()), now).await);
        assert!(s.next_eligible().is_none());
        // Retry immediately succeeds.
        assert!(s.maybe_participate(CH, &t, &answers(MockProvider::new("ok")), now).await);
    }

    #[tokio::test]
    async fn failed_history_or_send_leaves_cooldown_open() {
        let t = transport();
        let a = answers(MockProvider::new("hello"));
        let s = AmbientScheduler::new(0.03, HOUR, 15).with_rng(always());

        t.set_fail_history(true);
        assert!(!s.maybe_participate(CH, &t, &a, Instant::now()).await);
        t.set_fail_history(false);

        t.set_fail_send(true);
        assert!(!s.maybe_participate(CH, &t, &a, Instant::now()).await);
        assert!(s.next_eligible().is_none());
    }

    #[tokio::test]
    async fn bot_only_history_is_not_sent() {
        let t = MemoryTransport::new(bot());
        t.record(msg(1, "other-bot", "beep", true));
        let provider = MockProvider::new("x");
        let s = AmbientScheduler::new(1.0, HOUR, 15).with_rng(always());
        assert!(!s.maybe_participate(CH, &t, &answers(provider.clone()), Instant::now()).await);
        assert_eq!(provider.calls(), 0);
    }

    #[tokio::test]
    async fn zero_probability_never_fires() {
        let t = transport();
        let s = AmbientScheduler::new(0.0, HOUR, 15).with_rng(always());
        let answers = answers(MockProvider::new("x"));
        assert!(!s.maybe_participate(CH, &t, &answers, Instant::now()).await);
    }
}
