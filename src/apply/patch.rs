use crate::cluster::{ClusterClient, PatchStrategy};
use crate::error::ClusterError;
use crate::log::{Event, EventBus};
use crate::object::ClusterObject;

/// Updates `existing` to match `desired`.
///
/// Starts with a strategic merge patch and walks down `PatchStrategy::fallback`
/// while the server rejects the content type; the payload never changes.
/// Objects are always patched, even when unchanged: server-defaulted fields make
/// a client-side comparison unreliable.
pub async fn patch_existing(
    desired: &ClusterObject,
    existing: &ClusterObject,
    client: &dyn ClusterClient,
    events: &dyn EventBus,
) -> Result<(ClusterObject, PatchStrategy), ClusterError> {
    let payload = serde_json::to_vec(&desired.to_value())?;
    let mut strategy = PatchStrategy::StrategicMerge;

    loop {
        match client.patch(existing, &payload, strategy).await {
            Ok(patched) => return Ok((patched, strategy)),
            Err(err) => match strategy.fallback(&err) {
                Some(next) => {
                    events.publish(Event::PatchFallback {
                        object: desired.key().to_string(),
                        from: strategy.to_string(),
                        to: next.to_string(),
                    });
                    strategy = next;
                }
                None => return Err(err),
            },
        }
    }
}
