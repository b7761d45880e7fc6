//! # Audio Module
//!
//! Playback state for every guild the bot is connected to.
//!
//! ## Architecture
//!
//! ### [`queue`] - Queue state
//! - Current track, pending FIFO and loop mode
//! - The transition rule applied when a track ends
//!
//! ### [`session`] - Playback session
//! - Serializes commands and end-of-track events for one guild
//! - Idle disconnect timer and snapshot persistence
//!
//! ### [`sink`] - Voice sink
//! - The narrow interface the session drives
//! - songbird implementation with exactly-once end notifications
//!
//! ### [`player`] - Session ownership
//! - One session per guild, created on the first voice join
//! - Restores the saved queue of a guild when its session is created

pub mod player;
pub mod queue;
pub mod session;
pub mod sink;
