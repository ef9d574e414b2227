//! nadeko, a chat-room assistant with a riddle mini-game.
//!
//! Every inbound message goes through [`dispatch::Dispatcher`], which picks
//! exactly one path: the per-user puzzle machine, a mention-triggered answer,
//! or ambient participation in the conversation.

pub mod cognition;
pub mod config;
pub mod dispatch;
pub mod io;
pub mod puzzle;
pub mod runtime;
pub mod types;
