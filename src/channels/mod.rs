//! Chat channel implementations.

pub mod discord;
pub mod traits;

pub use discord::DiscordChannel;
pub use traits::{Channel, SendMessage};
