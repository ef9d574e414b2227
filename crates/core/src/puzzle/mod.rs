//! Riddle mini-game: per-user progress with hint-gated guessing.

mod book;
mod script;

pub use book::{PuzzleBook, PuzzleReply, PuzzleSession, PuzzleState};
pub use script::{DEFAULT_KEY, HintId, HintLine, PuzzleScript};
