use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// Configuration errors surfaced at startup.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required setting {0}")]
    Missing(&'static str),
    #[error("cannot read puzzle file {0}")]
    PuzzleFile(String),
    #[error("invalid puzzle script: {0}")]
    InvalidPuzzle(String),
}

/// All nadeko parameters. Loaded once at startup from the environment
/// (after `.env`), never mutated afterwards.
#[derive(Clone)]
pub struct BotCfg {
    // chat service
    pub discord_token: Option<String>,
    pub guild_id: u64,
    pub channel_id: u64,
    pub poll_interval_ms: u64,

    // primary provider (search-augmented)
    pub primary_api_key: Option<String>,
    pub primary_model: String,
    pub primary_base_url: Option<String>,
    pub primary_timeout_secs: u64,

    // secondary provider
    pub fallback_api_key: Option<String>,
    pub fallback_model: String,
    pub fallback_base_url: Option<String>,

    // search augmentation
    pub search_api_key: Option<String>,

    // generation
    pub max_tokens: u32,
    pub temperature: f32,
    /// Past exchanges the primary replays. 0 disables memory.
    pub chat_memory: usize,

    // ambient participation
    pub ambient_probability: f64,
    pub ambient_cooldown_secs: u64,
    pub history_window: usize,

    // puzzle
    pub puzzle_file: Option<PathBuf>,

    // shutdown
    pub shutdown_timeout_secs: u64,
}

impl Default for BotCfg {
    fn default() -> Self {
        Self {
            discord_token: None,
            guild_id: 0,
            channel_id: 0,
            poll_interval_ms: 2000,
            primary_api_key: None,
            primary_model: "gemini-pro".into(),
            primary_base_url: None,
            primary_timeout_secs: 10,
            fallback_api_key: None,
            fallback_model: "mistralai/mixtral-8x7b-instruct".into(),
            fallback_base_url: Some("https://openrouter.ai/api/v1".into()),
            search_api_key: None,
            max_tokens: 512,
            temperature: 0.7,
            chat_memory: 10,
            ambient_probability: 0.03,
            ambient_cooldown_secs: 3600,
            history_window: 15,
            puzzle_file: None,
            shutdown_timeout_secs: 15,
        }
    }
}

impl BotCfg {
    /// Load `.env` (if present) then read the process environment.
    pub fn from_env() -> Self {
        if let Err(e) = dotenvy::dotenv() {
            tracing::debug!(error = %e, "no .env loaded");
        }
        let map: HashMap<String, String> = std::env::vars().collect();
        Self::from_map(&map)
    }

    /// Build from a key/value map. Unknown or unparsable values keep their defaults.
    pub fn from_map(m: &HashMap<String, String>) -> Self {
        let d = Self::default();
        Self {
            discord_token: get_str(m, "DISCORD_TOKEN"),
            guild_id: get_or(m, "GUILD_ID", d.guild_id),
            channel_id: get_or(m, "CHANNEL_ID", d.channel_id),
            poll_interval_ms: get_or(m, "NADEKO_POLL_INTERVAL_MS", d.poll_interval_ms).max(250),
            primary_api_key: get_str(m, "GEMINI_API_KEY"),
            primary_model: get_str(m, "NADEKO_PRIMARY_MODEL").unwrap_or(d.primary_model),
            primary_base_url: get_str(m, "NADEKO_PRIMARY_BASE_URL").or(d.primary_base_url),
            primary_timeout_secs: get_or(
                m,
                "NADEKO_PRIMARY_TIMEOUT_SECS",
                d.primary_timeout_secs,
            ),
            fallback_api_key: get_str(m, "OPENROUTER_API_KEY"),
            fallback_model: get_str(m, "NADEKO_FALLBACK_MODEL").unwrap_or(d.fallback_model),
            fallback_base_url: get_str(m, "NADEKO_FALLBACK_BASE_URL").or(d.fallback_base_url),
            search_api_key: get_str(m, "SERPAPI_KEY"),
            max_tokens: get_or(m, "NADEKO_MAX_TOKENS", d.max_tokens),
            temperature: get_or(m, "NADEKO_TEMPERATURE", d.temperature),
            chat_memory: get_or(m, "NADEKO_CHAT_MEMORY", d.chat_memory).min(100),
            ambient_probability: get_or(m, "NADEKO_AMBIENT_PROBABILITY", d.ambient_probability)
                .clamp(0.0, 1.0),
            ambient_cooldown_secs: get_or(
                m,
                "NADEKO_AMBIENT_COOLDOWN_SECS",
                d.ambient_cooldown_secs,
            ),
            history_window: get_or(m, "NADEKO_HISTORY_WINDOW", d.history_window).clamp(1, 100),
            puzzle_file: get_str(m, "NADEKO_PUZZLE_FILE").map(PathBuf::from),
            shutdown_timeout_secs: get_or(
                m,
                "NADEKO_SHUTDOWN_TIMEOUT_SECS",
                d.shutdown_timeout_secs,
            ),
        }
    }

    /// The Discord token, required by the `nadeko` binary.
    pub fn require_discord_token(&self) -> Result<&str, ConfigError> {
        self.discord_token.as_deref().ok_or(ConfigError::Missing("DISCORD_TOKEN"))
    }

    pub fn primary_timeout(&self) -> Duration {
        Duration::from_secs(self.primary_timeout_secs)
    }

    pub fn ambient_cooldown(&self) -> Duration {
        Duration::from_secs(self.ambient_cooldown_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }
}

impl fmt::Debug for BotCfg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let set = |v: &Option<String>| if v.is_some() { "<set>" } else { "<unset>" };
        f.debug_struct("BotCfg")
            .field("discord_token", &set(&self.discord_token))
            .field("guild_id", &self.guild_id)
            .field("channel_id", &self.channel_id)
            .field("poll_interval_ms", &self.poll_interval_ms)
            .field("primary_api_key", &set(&self.primary_api_key))
            .field("primary_model", &self.primary_model)
            .field("primary_timeout_secs", &self.primary_timeout_secs)
            .field("fallback_api_key", &set(&self.fallback_api_key))
            .field("fallback_model", &self.fallback_model)
            .field("search_api_key", &set(&self.search_api_key))
            .field("chat_memory", &self.chat_memory)
            .field("ambient_probability", &self.ambient_probability)
            .field("ambient_cooldown_secs", &self.ambient_cooldown_secs)
            .field("history_window", &self.history_window)
            .field("puzzle_file", &self.puzzle_file)
            .finish_non_exhaustive()
    }
}

fn get_or<T: std::str::FromStr>(map: &HashMap<String, String>, key: &str, default: T) -> T {
    map.get(key)
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

fn get_str(map: &HashMap<String, String>, key: &str) -> Option<String> {
    map.get(key)
        .map(|v| v.trim().to_owned())
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn empty_map_yields_defaults() {
        let cfg = BotCfg::from_map(&HashMap::new());
        assert_eq!(cfg.primary_timeout_secs, 10);
        assert_eq!(cfg.ambient_cooldown_secs, 3600);
        assert!((cfg.ambient_probability - 0.03).abs() < f64::EPSILON);
        assert_eq!(cfg.history_window, 15);
        assert_eq!(cfg.chat_memory, 10);
        assert!(cfg.require_discord_token().is_err());
    }

    #[test]
    fn reads_credentials_and_ids() {
        let cfg = BotCfg::from_map(&map(&[
            ("DISCORD_TOKEN", "tok"),
            ("GEMINI_API_KEY", "g"),
            ("OPENROUTER_API_KEY", "o"),
            ("SERPAPI_KEY", "s"),
            ("GUILD_ID", "123"),
            ("CHANNEL_ID", "456"),
        ]));
        assert_eq!(cfg.require_discord_token().unwrap(), "tok");
        assert_eq!(cfg.primary_api_key.as_deref(), Some("g"));
        assert_eq!(cfg.fallback_api_key.as_deref(), Some("o"));
        assert_eq!(cfg.search_api_key.as_deref(), Some("s"));
        assert_eq!(cfg.guild_id, 123);
        assert_eq!(cfg.channel_id, 456);
    }

    #[test]
    fn bad_values_fall_back() {
        let cfg = BotCfg::from_map(&map(&[
            ("NADEKO_PRIMARY_TIMEOUT_SECS", "soon"),
            ("NADEKO_AMBIENT_PROBABILITY", "7"),
            ("GEMINI_API_KEY", "   "),
        ]));
        assert_eq!(cfg.primary_timeout_secs, 10);
        assert!((cfg.ambient_probability - 1.0).abs() < f64::EPSILON);
        assert!(cfg.primary_api_key.is_none());
    }

    #[test]
    fn chat_memory_is_capped_and_can_be_disabled() {
        let off = BotCfg::from_map(&map(&[("NADEKO_CHAT_MEMORY", "0")]));
        assert_eq!(off.chat_memory, 0);
        let huge = BotCfg::from_map(&map(&[("NADEKO_CHAT_MEMORY", "5000")]));
        assert_eq!(huge.chat_memory, 100);
    }

    #[test]
    fn debug_redacts_secrets() {
        let cfg = BotCfg::from_map(&map(&[("DISCORD_TOKEN", "super-secret")]));
        let out = format!("{cfg:?}");
        assert!(!out.contains("super-secret"));
        assert!(out.contains("<set>"));
    }
}
