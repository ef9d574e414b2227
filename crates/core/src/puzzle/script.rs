use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::Path;

use crate::config::ConfigError;

/// The constant number embedded in the default puzzle prompt.
pub const DEFAULT_KEY: &str = "968900402072387675";

/// The sub-questions a player must ask before guessing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HintId {
    Name,
    Number,
}

impl HintId {
    pub const REQUIRED: [HintId; 2] = [HintId::Name, HintId::Number];

    pub fn required() -> BTreeSet<HintId> {
        Self::REQUIRED.into_iter().collect()
    }
}

/// A recognised hint request and its answer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HintLine {
    pub id: HintId,
    pub phrase: String,
    pub reply: String,
}

/// Every literal the riddle uses. `{key}` in `prompt` and `{mention}` in
/// `solved`, `retry` and `nudge` are substituted at render time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PuzzleScript {
    pub trigger: String,
    pub key: String,
    pub prompt: String,
    pub hints: Vec<HintLine>,
    pub rebuff: String,
    pub solution: String,
    pub solved: String,
    pub retry: String,
    pub nudge: String,
}

impl Default for PuzzleScript {
    fn default() -> Self {
        Self {
            trigger: "なぞなぞちょうだい".into(),
            key: DEFAULT_KEY.into(),
            prompt: "ねぇ…お願い、解いて欲しいの…\n\
                     この数字たち…ただの羅列じゃないの…\n\
                     {key} ……この数字がすべての始まりだよ…\n\
                     もし、意味がわからないなら…質問してほしいの…わたしのこと…"
                .into(),
            hints: vec![
                HintLine {
                    id: HintId::Name,
                    phrase: "あなたの名前とは？".into(),
                    reply: "……それは……呼んでくれたら、答えるよ……".into(),
                },
                HintLine {
                    id: HintId::Number,
                    phrase: "数字の意味は？".into(),
                    reply: "ふふ…数字はね、アルファベットへの暗号…26文字の秘密…".into(),
                },
            ],
            rebuff: "もう…それは教えたはずだよ…".into(),
            solution: "Nadeko".into(),
            solved: "{mention} ……やっと、わたしの名前を呼んでくれたんだね……ありがとう…正解だよ…".into(),
            retry: "{mention} ……違うみたい…もう少しだけ、考えてみて…？".into(),
            nudge: "{mention} ……まだ全部は教えてあげられないの…次の質問…聞いてくれる…？".into(),
        }
    }
}

impl PuzzleScript {
    /// Load a script from a JSON file and validate it.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::PuzzleFile(format!("{}: {e}", path.display())))?;
        let script: Self = serde_json::from_str(&raw)
            .map_err(|e| ConfigError::PuzzleFile(format!("{}: {e}", path.display())))?;
        script.validate()?;
        Ok(script)
    }

    /// Both required hints exactly once, non-empty trigger and solution.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.trigger.trim().is_empty() {
            return Err(ConfigError::InvalidPuzzle("trigger is empty".into()));
        }
        if self.solution.trim().is_empty() {
            return Err(ConfigError::InvalidPuzzle("solution is empty".into()));
        }
        for id in HintId::REQUIRED {
            let count = self.hints.iter().filter(|h| h.id == id).count();
            if count != 1 {
                return Err(ConfigError::InvalidPuzzle(format!(
                    "hint {id:?} defined {count} times, expected 1"
                )));
            }
        }
        if self.hints.iter().any(|h| h.phrase.trim() == self.trigger.trim()) {
            return Err(ConfigError::InvalidPuzzle("hint phrase equals trigger".into()));
        }
        Ok(())
    }

    pub fn is_trigger(&self, text: &str) -> bool {
        text.trim() == self.trigger
    }

    /// The hint requested by `text`, if any (exact, trimmed).
    pub fn hint_for(&self, text: &str) -> Option<&HintLine> {
        let text = text.trim();
        self.hints.iter().find(|h| h.phrase == text)
    }

    /// Case-insensitive, trimmed comparison with the solution.
    pub fn is_solution(&self, text: &str) -> bool {
        text.trim().to_lowercase() == self.solution.trim().to_lowercase()
    }

    pub fn render_prompt(&self) -> String {
        self.prompt.replace("{key}", &self.key)
    }

    pub fn render(template: &str, mention: &str) -> String {
        template.replace("{mention}", mention)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_script_is_valid() {
        let script = PuzzleScript::default();
        script.validate().unwrap();
        assert!(script.render_prompt().contains(DEFAULT_KEY));
    }

    #[test]
    fn trigger_is_exact_but_trimmed() {
        let script = PuzzleScript::default();
        assert!(script.is_trigger("  なぞなぞちょうだい\n"));
        assert!(!script.is_trigger("なぞなぞちょうだい！"));
    }

    #[test]
    fn solution_ignores_case_and_padding() {
        let script = PuzzleScript::default();
        assert!(script.is_solution(" NADEKO "));
        assert!(script.is_solution("nadeko"));
        assert!(!script.is_solution("nadeko chan"));
    }

    #[test]
    fn rejects_missing_hint() {
        let mut script = PuzzleScript::default();
        script.hints.retain(|h| h.id != HintId::Number);
        assert!(matches!(script.validate(), Err(ConfigError::InvalidPuzzle(_))));
    }

    #[test]
    fn rejects_duplicate_hint() {
        let mut script = PuzzleScript::default();
        let dup = script.hints[0].clone();
        script.hints.push(dup);
        assert!(script.validate().is_err());
    }

    #[test]
    fn parses_json_script() {
        let json = r#"{
            "trigger": "riddle me",
            "key": "8 1 14",
            "prompt": "Decode {key}",
            "hints": [
                {"id": "name", "phrase": "who are you?", "reply": "say my name"},
                {"id": "number", "phrase": "what are the numbers?", "reply": "a=1"}
            ],
            "rebuff": "already said",
            "solution": "han",
            "solved": "{mention} yes",
            "retry": "{mention} no",
            "nudge": "{mention} ask more"
        }"#;
        let script: PuzzleScript = serde_json::from_str(json).unwrap();
        script.validate().unwrap();
        assert_eq!(script.render_prompt(), "Decode 8 1 14");
        assert_eq!(PuzzleScript::render(&script.solved, "<@1>"), "<@1> yes");
    }
}
