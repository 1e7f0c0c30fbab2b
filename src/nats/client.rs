use async_nats::{Client, ConnectOptions};
use std::time::Duration;

use super::messages::StateMessage;

/// Reconnect delay: 1s doubling per attempt, capped at 8s.
pub fn reconnect_delay(attempts: usize) -> Duration {
    let exp = 2u64.saturating_pow(attempts.min(16) as u32);
    let backoff = 1000u64.saturating_mul(exp);
    Duration::from_millis(backoff.min(8000))
}

#[derive(Clone)]
pub struct NatsClient {
    client: Client,
    server_url: String,
}

impl NatsClient {
    pub async fn connect(server_url: &str) -> Result<Self, Box<dyn std::error::Error + Send + Sync>> {
        let connect_options = ConnectOptions::new()
            .retry_on_initial_connect()
            .max_reconnects(5)
            .reconnect_delay_callback(reconnect_delay);

        let client = async_nats::connect_with_options(server_url, connect_options).await?;

        Ok(Self {
            client,
            server_url: server_url.to_string(),
        })
    }

    pub async fn publish_state(&self, msg: &StateMessage) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let payload = serde_json::to_vec(msg)?;
        self.client.publish(msg.subject(), payload.into()).await?;
        Ok(())
    }

    pub async fn health_check(&self) -> bool {
        self.client.publish("health.check", "ping".into()).await.is_ok()
    }

    pub fn server_info(&self) -> &str {
        &self.server_url
    }

    /// State messages of every instance, for monitoring.
    pub async fn subscribe_states(&self) -> Result<async_nats::Subscriber, Box<dyn std::error::Error + Send + Sync>> {
        let sub = self.client.subscribe("plan.*.*.state").await?;
        Ok(sub)
    }
}
