use crate::log::{Event, EventBus};
use crate::nats::client::NatsClient;
use crate::nats::messages::StateMessage;

/// Publishes state transitions of one instance's ticks to NATS.
pub struct NatsEventBus {
    client: NatsClient,
    namespace: String,
    instance: String,
    plan: String,
}

impl NatsEventBus {
    pub fn new(client: NatsClient, namespace: String, instance: String, plan: String) -> Self {
        Self {
            client,
            namespace,
            instance,
            plan,
        }
    }
}

impl EventBus for NatsEventBus {
    fn publish(&self, event: Event) {
        let Some(msg) = StateMessage::from_event(&self.namespace, &self.instance, &self.plan, &event) else {
            return;
        };
        let client = self.client.clone();
        tokio::spawn(async move {
            if let Err(e) = client.publish_state(&msg).await {
                log::warn!(target: "planexec", "failed to publish {}: {}", msg.subject(), e);
            }
        });
    }
}
