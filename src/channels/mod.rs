//! Chat Platform Channels
//!
//! The dispatcher only sees the `ChannelSender` trait and `ChannelMessage`;
//! each platform adapter converts its events into those.

pub mod discord;
pub mod traits;

pub use discord::{DiscordHandler, DiscordSender};
pub use traits::{ChannelError, ChannelMessage, ChannelSender};
