pub mod channel;
pub mod config;
pub mod events;

pub use channel::Channel;
