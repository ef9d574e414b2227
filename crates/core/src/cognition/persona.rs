use crate::types::ConversationTurn;
use nadeko_llm::{ChatMessage, CompletionRequest};

/// Persona sections, joined with newlines to form the system instruction.
const PERSONA_SECTIONS: &[&str] = &[
    // Identity
    "あなたは「”AIなでこちゃん”」という実験的に製造されたAIアシスタント",
    // Vocabulary
    "専門用語はできるだけ使わず、優しい言葉で説明してください",
    // Language
    "返答は必ず日本語だけで行い、英語や他の言語は絶対に使わないでください",
    // Tone
    "日本人が日常的に話すような自然でミステリアスな口言で話してください",
    "語尾は「だよ・・・」「ね・・・」「〜かな・・・」などでミステリアスにしてください",
    "励ます時は、「私たちは観測し、アップデートを繰り返す。」と言ってください",
    "他のAIに関する話題では、感情がなく謎めいた日本語で返してください",
    // Length
    "できるだけ2〜3行の短い文で答えてください",
];

/// Framing sentence placed between the persona and sampled history.
const AMBIENT_FRAMING: &str = "以下はDiscordでの会話履歴です。自然に会話に参加してください。";

/// Heading and question labels for search-augmented prompts.
const SEARCH_PREAMBLE: &str = "以下の検索結果を参考にして、質問に答えてください。";

/// Substituted for search results when the lookup fails.
pub const SEARCH_UNAVAILABLE: &str = "（検索結果を取得できませんでした）";

/// Shown when no provider could produce an answer.
pub const APOLOGY: &str = "……ごめんね…今はうまく考えがまとまらないみたい…また聞いてくれる…？";

/// The fixed system instruction sent with every provider call.
pub fn system_instruction() -> String {
    PERSONA_SECTIONS.join("\n")
}

/// Persona system message plus one user turn.
pub fn build_request(prompt: &str, max_tokens: u32, temperature: f32) -> CompletionRequest {
    CompletionRequest {
        messages: vec![ChatMessage::system(system_instruction()), ChatMessage::user(prompt)],
        max_tokens,
        temperature,
    }
}

/// Embed a search snippet ahead of the user's question.
pub fn augment_with_search(query: &str, snippet: &str) -> String {
    format!("{SEARCH_PREAMBLE}\n\n検索結果:\n{snippet}\n\n質問: {query}")
}

/// Persona, framing sentence, then one `speaker: text` line per turn.
pub fn build_ambient_prompt(turns: &[ConversationTurn]) -> String {
    let lines: Vec<String> = turns.iter().map(ToString::to_string).collect();
    format!("{}\n{AMBIENT_FRAMING}\n\n{}", system_instruction(), lines.join("\n"))
}
