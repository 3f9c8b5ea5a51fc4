//! Hosts that own chat sessions and render their messages.

pub mod console;
pub mod telegram;
