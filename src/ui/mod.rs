//! Discord presentation: embeds for command replies and session notices,
//! and the player control buttons.

pub mod buttons;
pub mod embeds;
