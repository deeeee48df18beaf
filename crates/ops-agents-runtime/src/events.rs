use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::mpsc;

use ops_agents_core::AgentEvent;

/// Fan-out to any number of subscribers; emission order is delivery order.
/// Senders that hang up are dropped on the next emit.
#[derive(Clone, Default)]
pub struct EventBus {
    subscribers: Arc<RwLock<Vec<mpsc::UnboundedSender<AgentEvent>>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<AgentEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.write().push(tx);
        rx
    }

    pub fn emit(&self, event: AgentEvent) {
        self.subscribers
            .write()
            .retain(|tx| tx.send(event.clone()).is_ok());
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.read().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ops_agents_core::RunSummary;

    #[test]
    fn test_emission_order_preserved() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();

        bus.emit(AgentEvent::init("s1", "q"));
        bus.emit(AgentEvent::thinking("a"));
        bus.emit(AgentEvent::done(RunSummary::not_determined("inv-1", "q")));

        assert!(matches!(rx.try_recv().unwrap(), AgentEvent::Init { .. }));
        assert!(matches!(rx.try_recv().unwrap(), AgentEvent::Thinking { .. }));
        assert!(rx.try_recv().unwrap().is_done());
    }

    #[test]
    fn test_dropped_subscriber_pruned() {
        let bus = EventBus::new();
        let rx = bus.subscribe();
        drop(rx);
        bus.emit(AgentEvent::thinking("ping"));
        assert_eq!(bus.subscriber_count(), 0);
    }
}
