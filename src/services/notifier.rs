//! Fan-out of call notifications to live subscribers.
//!
//! One broadcast channel serves the public display group; per-doctor groups
//! are created lazily on first subscription. Delivery is best-effort: nothing
//! is persisted, slow receivers lose the oldest events, and publishing with no
//! subscribers is not an error.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::broadcast;

use crate::models::CallNotification;

const CHANNEL_CAPACITY: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Audience {
    Display,
    Doctor(i64),
}

#[derive(Clone)]
pub struct CallBroadcaster {
    display: broadcast::Sender<CallNotification>,
    doctors: Arc<Mutex<HashMap<i64, broadcast::Sender<CallNotification>>>>,
}

impl Default for CallBroadcaster {
    fn default() -> Self {
        Self::new()
    }
}

impl CallBroadcaster {
    pub fn new() -> Self {
        let (display, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            display,
            doctors: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn subscribe(&self, audience: Audience) -> broadcast::Receiver<CallNotification> {
        match audience {
            Audience::Display => self.display.subscribe(),
            Audience::Doctor(id) => {
                let mut doctors = self.doctors.lock().unwrap_or_else(|p| p.into_inner());
                doctors
                    .entry(id)
                    .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
                    .subscribe()
            }
        }
    }

    /// Publish a call to the display group and to the calling doctor's group.
    /// Returns how many receivers were reached.
    pub fn publish(&self, doctor_id: i64, event: CallNotification) -> usize {
        let mut reached = self.display.send(event.clone()).unwrap_or(0);

        let mut doctors = self.doctors.lock().unwrap_or_else(|p| p.into_inner());
        if let Some(tx) = doctors.get(&doctor_id) {
            match tx.send(event) {
                Ok(n) => reached += n,
                Err(_) => {
                    doctors.remove(&doctor_id);
                }
            }
        }

        tracing::debug!(doctor_id, reached, "Call notification published");
        reached
    }

    pub fn display_subscribers(&self) -> usize {
        self.display.receiver_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn event(ticket: &str) -> CallNotification {
        CallNotification {
            patient_name:  "GONZALEZ ANA".into(),
            room:          "Consultorio 3".into(),
            ticket_number: ticket.into(),
            timestamp:     Utc::now(),
        }
    }

    #[tokio::test]
    async fn display_receives_in_publish_order() {
        let hub = CallBroadcaster::new();
        let mut rx = hub.subscribe(Audience::Display);

        hub.publish(1, event("T001"));
        hub.publish(2, event("T002"));

        assert_eq!(rx.recv().await.unwrap().ticket_number, "T001");
        assert_eq!(rx.recv().await.unwrap().ticket_number, "T002");
    }

    #[tokio::test]
    async fn doctor_group_only_sees_own_calls() {
        let hub = CallBroadcaster::new();
        let mut mine = hub.subscribe(Audience::Doctor(1));

        hub.publish(2, event("T010"));
        hub.publish(1, event("T011"));

        assert_eq!(mine.recv().await.unwrap().ticket_number, "T011");
        assert!(mine.try_recv().is_err());
    }

    #[test]
    fn publishing_without_subscribers_is_fine() {
        let hub = CallBroadcaster::new();
        assert_eq!(hub.publish(1, event("T001")), 0);
        assert_eq!(hub.display_subscribers(), 0);
    }
}
