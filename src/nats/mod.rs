pub mod client;
pub mod messages;
pub mod publisher;

pub use client::NatsClient;
pub use messages::StateMessage;
pub use publisher::NatsEventBus;
