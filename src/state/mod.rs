pub mod redis;
pub mod tracker;

pub use self::redis::RedisClient;
