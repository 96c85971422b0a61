use std::sync::Arc;

use timing_replay_common::events::{CarsData, EngineEvent, Positions, StateFrame};
use tokio::sync::broadcast;

/// Consumer of everything the engine publishes. Published values are never
/// touched again by the engine.
pub trait Publisher: Send + Sync {
    fn state_changed(&self, state: StateFrame);
    fn telemetry_changed(&self, frame: Arc<CarsData>);
    fn position_changed(&self, frame: Arc<Positions>);
}

/// Fans published values out to any number of `EngineEvent` subscribers.
#[derive(Clone)]
pub struct BroadcastPublisher {
    sender: broadcast::Sender<EngineEvent>,
}

impl BroadcastPublisher {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.sender.subscribe()
    }

    fn send(&self, event: EngineEvent) {
        if let Err(e) = self.sender.send(event) {
            tracing::trace!("Dropped engine event: {} (no subscribers?)", e);
        }
    }
}

impl Publisher for BroadcastPublisher {
    fn state_changed(&self, state: StateFrame) {
        self.send(EngineEvent::State(state));
    }

    fn telemetry_changed(&self, frame: Arc<CarsData>) {
        self.send(EngineEvent::Telemetry(frame));
    }

    fn position_changed(&self, frame: Arc<Positions>) {
        self.send(EngineEvent::Position(frame));
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use parking_lot::Mutex;

    /// Records every call for assertions.
    #[derive(Default)]
    pub struct RecordingPublisher {
        pub states: Mutex<Vec<StateFrame>>,
        pub telemetry: Mutex<Vec<Arc<CarsData>>>,
        pub positions: Mutex<Vec<Arc<Positions>>>,
    }

    impl Publisher for RecordingPublisher {
        fn state_changed(&self, state: StateFrame) {
            self.states.lock().push(state);
        }

        fn telemetry_changed(&self, frame: Arc<CarsData>) {
            self.telemetry.lock().push(frame);
        }

        fn position_changed(&self, frame: Arc<Positions>) {
            self.positions.lock().push(frame);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_broadcast_without_subscribers() {
        let publisher = BroadcastPublisher::new(4);
        publisher.state_changed(StateFrame::default());
    }

    #[test]
    fn test_broadcast_reaches_subscriber() {
        let publisher = BroadcastPublisher::new(4);
        let mut rx = publisher.subscribe();
        let mut frame = StateFrame::default();
        frame.insert("LapCount", Arc::new(json!({ "CurrentLap": 3 })));
        publisher.state_changed(frame);
        publisher.telemetry_changed(Arc::new(CarsData::new()));

        match rx.try_recv().unwrap() {
            EngineEvent::State(state) => {
                assert_eq!(state.get("LapCount"), Some(&json!({ "CurrentLap": 3 })))
            }
            other => panic!("unexpected event {:?}", other),
        }
        assert!(matches!(rx.try_recv().unwrap(), EngineEvent::Telemetry(_)));
    }
}
