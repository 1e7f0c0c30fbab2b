use crate::log::{Event, EventBus, LogEntry, LogStorage};

/// Redis-backed event bus that persists logs for one instance's ticks.
pub struct RedisEventBus {
    storage: LogStorage,
    instance: String,
    plan: String,
}

impl RedisEventBus {
    pub fn new(storage: LogStorage, instance: String, plan: String) -> Self {
        Self { storage, instance, plan }
    }
}

impl EventBus for RedisEventBus {
    fn publish(&self, event: Event) {
        let storage = self.storage.clone();
        let entry = LogEntry::new(event)
            .with_instance(self.instance.clone())
            .with_plan(self.plan.clone());
        // Fire and forget.
        tokio::spawn(async move {
            if let Err(e) = storage.store_log(entry).await {
                log::warn!(target: "planexec", "failed to store log entry: {}", e);
            }
        });
    }
}

/// Query side of the stored logs; empty in stateless mode.
#[derive(Clone)]
pub struct LoggingService {
    storage: Option<LogStorage>,
}

impl LoggingService {
    pub fn new(storage: Option<LogStorage>) -> Self {
        Self { storage }
    }

    pub fn storage(&self) -> Option<&LogStorage> {
        self.storage.as_ref()
    }

    pub fn is_stateless(&self) -> bool {
        self.storage.is_none()
    }

    pub async fn get_logs(
        &self,
        instance: Option<&str>,
        plan: Option<&str>,
        limit: Option<usize>,
    ) -> Result<Vec<LogEntry>, Box<dyn std::error::Error + Send + Sync>> {
        match &self.storage {
            Some(storage) => storage.get_logs(instance, plan, limit).await,
            None => Ok(Vec::new()),
        }
    }
}
