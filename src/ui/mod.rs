//! # UI
//!
//! Embeds and message components rendered by the command handlers and the
//! now-playing notifier.

pub mod buttons;
pub mod embeds;
