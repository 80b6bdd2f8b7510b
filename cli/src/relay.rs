use lendindex_core::{Notification, NotificationRelay, SubscriptionHub};

/// Forwards to a [`SubscriptionHub`] and logs every notification.
#[derive(Clone, Default)]
pub struct LoggingRelay {
    hub: SubscriptionHub,
}

impl LoggingRelay {
    pub fn new(hub: SubscriptionHub) -> Self {
        Self { hub }
    }
}

impl NotificationRelay for LoggingRelay {
    fn publish(&self, address: &str, notification: &Notification) -> usize {
        let delivered = self.hub.publish(address, notification);
        tracing::debug!(
            room = %lendindex_core::relay::room_name(address),
            event = %notification.kind,
            tx = %notification.transaction_hash,
            block = notification.block_number,
            delivered,
            "notification published"
        );
        delivered
    }
}
