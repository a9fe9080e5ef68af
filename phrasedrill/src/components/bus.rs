//! The synchronous publish/subscribe channel every collaborator hangs off.
//!
//! Delivery is direct: `publish` invokes each matching listener in
//! registration order before returning. A listener may itself publish; that
//! nested emission runs to completion before the outer dispatch continues.
//! A listener never observes events it publishes from inside its own body.

use crate::common::ListenerId;
use crate::events::{DrillEvent, Topic};
use slotmap::SlotMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{trace, warn};

/// A function closure invoked for every delivered event.
pub type Listener = Box<dyn FnMut(&DrillEvent) -> anyhow::Result<()> + Send>;

struct Subscription {
    topic: Option<Topic>,
    // Taken out while the listener runs so nested publishes never alias it.
    listener: Option<Listener>,
}

#[derive(Default)]
struct BusInner {
    subscriptions: SlotMap<ListenerId, Subscription>,
    order: Vec<ListenerId>,
}

/// A cloneable handle to the shared channel.
#[derive(Clone, Default)]
pub struct EventBus {
    inner: Arc<Mutex<BusInner>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, BusInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn insert(&self, topic: Option<Topic>, listener: Listener) -> ListenerId {
        let mut inner = self.lock();
        let id = inner.subscriptions.insert(Subscription {
            topic,
            listener: Some(listener),
        });
        inner.order.push(id);
        trace!(?topic, "listener added");
        id
    }

    /// Registers a listener for a single topic.
    pub fn subscribe(
        &self,
        topic: Topic,
        listener: impl FnMut(&DrillEvent) -> anyhow::Result<()> + Send + 'static,
    ) -> ListenerId {
        self.insert(Some(topic), Box::new(listener))
    }

    /// Registers a listener for every topic.
    pub fn subscribe_all(
        &self,
        listener: impl FnMut(&DrillEvent) -> anyhow::Result<()> + Send + 'static,
    ) -> ListenerId {
        self.insert(None, Box::new(listener))
    }

    /// Removes a listener. Returns `true` if it was registered.
    pub fn unsubscribe(&self, id: ListenerId) -> bool {
        let mut inner = self.lock();
        let removed = inner.subscriptions.remove(id).is_some();
        if removed {
            inner.order.retain(|other| *other != id);
        }
        removed
    }

    pub fn listener_count(&self) -> usize {
        self.lock().subscriptions.len()
    }

    /// Delivers `event` to every current subscriber of its topic.
    ///
    /// A listener returning an error is logged; the remaining listeners
    /// still run.
    pub fn publish(&self, event: DrillEvent) {
        let topic = event.topic();
        let targets: Vec<ListenerId> = {
            let inner = self.lock();
            inner
                .order
                .iter()
                .copied()
                .filter(|id| {
                    inner
                        .subscriptions
                        .get(*id)
                        .is_some_and(|s| s.topic.map_or(true, |t| t == topic))
                })
                .collect()
        };

        for id in targets {
            let taken = self
                .lock()
                .subscriptions
                .get_mut(id)
                .and_then(|s| s.listener.take());
            // Unsubscribed mid-dispatch, or this is a nested publish from its own body.
            let Some(mut listener) = taken else { continue };

            if let Err(err) = listener(&event) {
                warn!(?topic, "listener failed: {err:#}");
            }

            if let Some(subscription) = self.lock().subscriptions.get_mut(id) {
                subscription.listener = Some(listener);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::TimerCommand;

    fn recorder(bus: &EventBus, topic: Option<Topic>) -> Arc<Mutex<Vec<DrillEvent>>> {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let listener = move |event: &DrillEvent| {
            sink.lock().unwrap().push(event.clone());
            Ok(())
        };
        match topic {
            Some(topic) => bus.subscribe(topic, listener),
            None => bus.subscribe_all(listener),
        };
        seen
    }

    #[test]
    fn delivers_only_matching_topics() {
        let bus = EventBus::new();
        let timer = recorder(&bus, Some(Topic::Timer));
        let all = recorder(&bus, None);

        bus.publish(DrillEvent::Timer(TimerCommand::Start));
        bus.publish(DrillEvent::LifeLost);

        assert_eq!(timer.lock().unwrap().len(), 1);
        assert_eq!(all.lock().unwrap().len(), 2);
    }

    #[test]
    fn listeners_run_in_registration_order() {
        let bus = EventBus::new();
        let order = Arc::new(Mutex::new(Vec::new()));
        for n in 0..3 {
            let order = order.clone();
            bus.subscribe_all(move |_| {
                order.lock().unwrap().push(n);
                Ok(())
            });
        }
        bus.publish(DrillEvent::ContentExhausted);
        assert_eq!(*order.lock().unwrap(), vec![0, 1, 2]);
    }

    #[test]
    fn failing_listener_does_not_block_others() {
        let bus = EventBus::new();
        bus.subscribe_all(|_| anyhow::bail!("renderer exploded"));
        let seen = recorder(&bus, None);

        bus.publish(DrillEvent::LifeLost);
        assert_eq!(seen.lock().unwrap().len(), 1);
    }

    #[test]
    fn nested_publish_completes_before_outer_dispatch_continues() {
        let bus = EventBus::new();
        let log = Arc::new(Mutex::new(Vec::new()));

        let relay_bus = bus.clone();
        let relay_log = log.clone();
        bus.subscribe(Topic::Progress, move |event| {
            relay_log.lock().unwrap().push(format!("relay {:?}", event.topic()));
            relay_bus.publish(DrillEvent::Timer(TimerCommand::Stop));
            Ok(())
        });
        let tail_log = log.clone();
        bus.subscribe_all(move |event| {
            tail_log.lock().unwrap().push(format!("tail {:?}", event.topic()));
            Ok(())
        });

        bus.publish(DrillEvent::LifeLost);
        assert_eq!(
            *log.lock().unwrap(),
            vec!["relay Progress", "tail Timer", "tail Progress"]
        );
    }

    #[test]
    fn unsubscribe_stops_delivery() {
        let bus = EventBus::new();
        let seen = Arc::new(Mutex::new(0));
        let counter = seen.clone();
        let id = bus.subscribe_all(move |_| {
            *counter.lock().unwrap() += 1;
            Ok(())
        });

        bus.publish(DrillEvent::LifeLost);
        assert!(bus.unsubscribe(id));
        assert!(!bus.unsubscribe(id));
        bus.publish(DrillEvent::LifeLost);
        assert_eq!(*seen.lock().unwrap(), 1);
        assert_eq!(bus.listener_count(), 0);
    }
}
