//! Channel adapter for consumers that want to poll capture events instead of
//! registering closures.

use std::sync::Arc;

use crossbeam_channel::{bounded, Receiver, Sender};

use genie_foundation::CaptureError;

use crate::types::{CaptureEvent, PartialResult, WishEvent};
use crate::{ErrorCallback, PartialCallback, WishCallback};

const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Sender half of an event channel, shaped as the three backend callbacks.
#[derive(Clone)]
pub struct CaptureEventSender {
    tx: Sender<CaptureEvent>,
}

impl CaptureEventSender {
    pub fn wish_callback(&self) -> WishCallback {
        let tx = self.tx.clone();
        Arc::new(move |event: WishEvent| {
            if tx.try_send(CaptureEvent::Wish(event)).is_err() {
                tracing::warn!("Capture event channel full, dropping wish event");
            }
        })
    }

    pub fn partial_callback(&self) -> PartialCallback {
        let tx = self.tx.clone();
        Arc::new(move |result: PartialResult| {
            // Partials are pure feedback, fine to shed under pressure.
            let _ = tx.try_send(CaptureEvent::Partial(result));
        })
    }

    pub fn error_callback(&self) -> ErrorCallback {
        let tx = self.tx.clone();
        Arc::new(move |err: &CaptureError| {
            let event = CaptureEvent::Fault {
                message: err.to_string(),
            };
            if tx.try_send(event).is_err() {
                tracing::warn!("Capture event channel full, dropping fault event");
            }
        })
    }
}

/// Create a bounded event channel plus callback adapters feeding it.
pub fn event_channel() -> (CaptureEventSender, Receiver<CaptureEvent>) {
    let (tx, rx) = bounded(EVENT_CHANNEL_CAPACITY);
    (CaptureEventSender { tx }, rx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[test]
    fn callbacks_feed_the_channel() {
        let (sender, rx) = event_channel();
        let wish = sender.wish_callback();
        let partial = sender.partial_callback();

        partial(PartialResult {
            text: "how do".into(),
            at: Instant::now(),
        });
        wish(WishEvent {
            text: "how do databases work".into(),
            recognized_at: Instant::now(),
            backend: "test",
        });

        match rx.try_recv().unwrap() {
            CaptureEvent::Partial(p) => assert_eq!(p.text, "how do"),
            other => panic!("unexpected event: {other:?}"),
        }
        match rx.try_recv().unwrap() {
            CaptureEvent::Wish(w) => {
                assert_eq!(w.text, "how do databases work");
                assert_eq!(w.backend, "test");
            }
            other => panic!("unexpected event: {other:?}"),
        }
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn faults_carry_the_error_message() {
        let (sender, rx) = event_channel();
        let on_error = sender.error_callback();
        on_error(&genie_foundation::CaptureError::ServiceUnauthorized(
            "bad api key".into(),
        ));
        match rx.try_recv().unwrap() {
            CaptureEvent::Fault { message } => assert!(message.contains("bad api key")),
            other => panic!("unexpected event: {other:?}"),
        }
    }
}
