// SubscriberRegistry: per-kind fan-out of decoded telemetry
//
// Every subscriber owns an unbounded receiver. Dispatch never blocks the read
// loop, and senders whose receiver has been dropped are pruned on the next
// event of their kind.

use std::collections::HashMap;
use std::sync::Mutex;

use log::error;
use tokio::sync::mpsc;

use crate::protocol::{EventKind, TelemetryEvent};

type Subscriber = mpsc::UnboundedSender<TelemetryEvent>;

#[derive(Default)]
pub(crate) struct SubscriberRegistry {
    by_kind: Mutex<HashMap<EventKind, Vec<Subscriber>>>,
    all: Mutex<Vec<Subscriber>>,
}

impl SubscriberRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, kind: EventKind) -> mpsc::UnboundedReceiver<TelemetryEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        match self.by_kind.lock() {
            Ok(mut by_kind) => by_kind.entry(kind).or_default().push(tx),
            Err(_) => error!("[SubscriberRegistry] Subscriber lock poisoned"),
        }
        rx
    }

    pub fn subscribe_all(&self) -> mpsc::UnboundedReceiver<TelemetryEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        match self.all.lock() {
            Ok(mut all) => all.push(tx),
            Err(_) => error!("[SubscriberRegistry] Subscriber lock poisoned"),
        }
        rx
    }

    /// Deliver `event` to its kind's subscribers and to catch-all subscribers.
    ///
    /// Returns the number of live receivers that got the event.
    pub fn dispatch(&self, event: &TelemetryEvent) -> usize {
        let mut delivered = 0;

        if let Ok(mut by_kind) = self.by_kind.lock() {
            if let Some(subscribers) = by_kind.get_mut(&event.kind()) {
                delivered += deliver(subscribers, event);
            }
        }
        if let Ok(mut all) = self.all.lock() {
            delivered += deliver(&mut all, event);
        }

        delivered
    }

    /// Live subscribers for `kind`, not counting catch-all subscribers
    #[cfg(test)]
    pub fn count(&self, kind: EventKind) -> usize {
        self.by_kind
            .lock()
            .map(|by_kind| {
                by_kind
                    .get(&kind)
                    .map(|subscribers| subscribers.iter().filter(|tx| !tx.is_closed()).count())
                    .unwrap_or(0)
            })
            .unwrap_or(0)
    }
}

fn deliver(subscribers: &mut Vec<Subscriber>, event: &TelemetryEvent) -> usize {
    subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    subscribers.len()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dispatch_by_kind() {
        let registry = SubscriberRegistry::new();
        let mut pressure = registry.subscribe(EventKind::Pressure);
        let mut joystick = registry.subscribe(EventKind::Joystick);

        let delivered = registry.dispatch(&TelemetryEvent::PressureSample(512));
        assert_eq!(delivered, 1);
        assert_eq!(
            pressure.try_recv().unwrap(),
            TelemetryEvent::PressureSample(512)
        );
        assert!(joystick.try_recv().is_err());
    }

    #[test]
    fn test_catch_all_sees_everything_in_order() {
        let registry = SubscriberRegistry::new();
        let mut all = registry.subscribe_all();
        registry.dispatch(&TelemetryEvent::PressureSample(1));
        registry.dispatch(&TelemetryEvent::JoystickVector { x: 1, y: -1 });
        registry.dispatch(&TelemetryEvent::Acknowledgement("OK".to_string()));

        assert_eq!(all.try_recv().unwrap(), TelemetryEvent::PressureSample(1));
        assert_eq!(
            all.try_recv().unwrap(),
            TelemetryEvent::JoystickVector { x: 1, y: -1 }
        );
        assert!(matches!(all.try_recv().unwrap(), TelemetryEvent::Acknowledgement(_)));
    }

    #[test]
    fn test_dropped_subscribers_are_pruned() {
        let registry = SubscriberRegistry::new();
        let kept = registry.subscribe(EventKind::CalibrationPressure);
        let dropped = registry.subscribe(EventKind::CalibrationPressure);
        drop(dropped);

        let delivered = registry.dispatch(&TelemetryEvent::CalibrationPressureSample(400));
        assert_eq!(delivered, 1);
        assert_eq!(registry.count(EventKind::CalibrationPressure), 1);
        drop(kept);
    }
}
