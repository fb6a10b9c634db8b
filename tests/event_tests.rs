use obsbus::device::DeviceRegistry;
use obsbus::event::*;
use obsbus::shooter::*;
use std::sync::mpsc;

struct ChannelSink(mpsc::Sender<Event>);

impl EventSink for ChannelSink {
    fn deliver(&mut self, event: &Event) -> Result<(), String> {
        self.0.send(event.clone()).map_err(|e| e.to_string())
    }
}

struct ForwardingHandler {
    decision: Forward,
    handled: u32,
}

impl EventHandler for ForwardingHandler {
    fn handle_event(&mut self, _event: &Event) -> Forward {
        self.handled += 1;
        self.decision.clone()
    }
}

#[test]
fn test_local_handler_runs_before_delivery() {
    let (tx, rx) = mpsc::channel();
    let mut bus = EventBus::new();
    bus.register("EXEC", Box::new(ChannelSink(tx)));

    let mut handler = ForwardingHandler {
        decision: Forward::To("EXEC".to_string()),
        handled: 0,
    };
    let event = Event::with_payload(EventKind::SetTarget, "1000");
    bus.post(&event, &mut handler).unwrap();

    assert_eq!(handler.handled, 1);
    let delivered = rx.try_recv().unwrap();
    assert_eq!(delivered.kind, EventKind::SetTarget);
    assert_eq!(delivered.payload.as_deref(), Some("1000"));
}

#[test]
fn test_missing_consumer_fails_without_crashing_the_caller() {
    let mut bus = EventBus::new();
    let mut handler = ForwardingHandler {
        decision: Forward::To("EXEC".to_string()),
        handled: 0,
    };

    // The producing action fails; the bus stays usable
    let err = bus.post(&Event::new(EventKind::SetTarget), &mut handler).unwrap_err();
    assert_eq!(err, EventError::NoConsumer("EXEC".to_string()));

    // Registering the consumer afterwards makes the same post succeed; the
    // failed one is not replayed
    let (tx, rx) = mpsc::channel();
    bus.register("EXEC", Box::new(ChannelSink(tx)));
    bus.post(&Event::new(EventKind::SetTarget), &mut handler).unwrap();
    assert_eq!(rx.try_iter().count(), 1);
}

#[test]
fn test_unregister_makes_consumer_missing_again() {
    let (tx, _rx) = mpsc::channel();
    let mut bus = EventBus::new();
    bus.register("EXEC", Box::new(ChannelSink(tx)));
    assert!(bus.has_connection("EXEC"));

    bus.unregister("EXEC");
    let mut handler = ForwardingHandler {
        decision: Forward::To("EXEC".to_string()),
        handled: 0,
    };
    assert!(bus.post(&Event::new(EventKind::ScriptEnded), &mut handler).is_err());
}

#[test]
fn test_shower_report_reaches_executor_queue() {
    let mut registry = DeviceRegistry::new();
    let exec = registry.register(EXECUTOR_NAME).unwrap();
    let mut shooter = Shooter::new();

    let shower = Shower { date: 5000.0, ra: 83.63, dec: 22.01, target_id: 77 };
    let outcome = shooter.new_shower(shower, &mut registry, 2).unwrap();
    assert!(matches!(outcome, ShowerOutcome::Posted { .. }));

    let queue = registry.queue_mut(exec).unwrap();
    assert_eq!(queue.dispatch_next().unwrap().as_str(), "now 77");
}

#[test]
fn test_shower_without_executor_fails_and_recovers() {
    let mut registry = DeviceRegistry::new();
    let mut shooter = Shooter::new();
    let shower = Shower { date: 5000.0, ra: 83.63, dec: 22.01, target_id: 77 };

    assert_eq!(
        shooter.new_shower(shower, &mut registry, 2),
        Err(ShooterError::NoExecutor)
    );

    // Once the executor connects, the next report (outside the duplicate
    // window) goes through
    registry.register(EXECUTOR_NAME).unwrap();
    let retry = Shower { date: 5010.0, ..shower };
    assert!(shooter.new_shower(retry, &mut registry, 2).is_ok());
}
