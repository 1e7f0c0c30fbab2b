pub mod event_bus;
pub mod logger;
pub mod storage;
pub mod service;

pub use event_bus::{DefaultBus, Event, EventBus, FanoutBus, RecordingBus};
pub use logger::init_logger;
pub use storage::{LogEntry, LogStorage};
pub use service::{RedisEventBus, LoggingService};
