//! Typed inbound callbacks.
//!
//! Callbacks are registered per payload variant on the
//! [`WebSocketBuilder`](super::WebSocketBuilder) and frozen when the endpoint
//! starts. They run on the endpoint's loop thread, in registration order,
//! and receive an [`Outbox`] to reply through.

// ============================================================================
// Imports
// ============================================================================

use std::any::Any;
use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use serde_json::Value;
use tracing::{error, trace};

use super::payload::Payload;
use super::queue::Outbox;

// ============================================================================
// Types
// ============================================================================

/// Callback for text frames that are not JSON.
pub type TextCallback = Arc<dyn Fn(&str, &Outbox) + Send + Sync>;

/// Callback for binary frames.
pub type BinaryCallback = Arc<dyn Fn(&[u8], &Outbox) + Send + Sync>;

/// Callback for text frames holding JSON.
pub type JsonCallback = Arc<dyn Fn(&Value, &Outbox) + Send + Sync>;

// ============================================================================
// Callbacks
// ============================================================================

/// Callback registry, one list per payload variant.
#[derive(Clone, Default)]
pub(crate) struct Callbacks {
    text: Vec<TextCallback>,
    binary: Vec<BinaryCallback>,
    json: Vec<JsonCallback>,
}

impl fmt::Debug for Callbacks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Callbacks")
            .field("text", &self.text.len())
            .field("binary", &self.binary.len())
            .field("json", &self.json.len())
            .finish()
    }
}

impl Callbacks {
    pub(crate) fn push_text(&mut self, callback: TextCallback) {
        self.text.push(callback);
    }

    pub(crate) fn push_binary(&mut self, callback: BinaryCallback) {
        self.binary.push(callback);
    }

    pub(crate) fn push_json(&mut self, callback: JsonCallback) {
        self.json.push(callback);
    }

    /// Invokes every callback registered for `payload`'s variant.
    ///
    /// Returns how many ran to completion. A panicking callback is logged
    /// and skipped.
    pub(crate) fn dispatch(&self, payload: &Payload, outbox: &Outbox) -> usize {
        let completed = match payload {
            Payload::Text(text) => self
                .text
                .iter()
                .filter(|callback| invoke("text", || callback(text.as_str(), outbox)))
                .count(),
            Payload::Binary(bytes) => self
                .binary
                .iter()
                .filter(|callback| invoke("binary", || callback(bytes.as_slice(), outbox)))
                .count(),
            Payload::Json(value) => self
                .json
                .iter()
                .filter(|callback| invoke("json", || callback(value, outbox)))
                .count(),
        };

        if completed == 0 {
            trace!(kind = payload.kind(), "No callback for payload");
        }
        completed
    }
}

/// Runs one callback, containing any panic.
fn invoke(kind: &'static str, callback: impl FnOnce()) -> bool {
    match catch_unwind(AssertUnwindSafe(callback)) {
        Ok(()) => true,
        Err(panic) => {
            error!(kind, panic = panic_message(panic.as_ref()), "Callback panicked");
            false
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message
    } else {
        "non-string panic payload"
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::atomic::{AtomicUsize, Ordering};

    use parking_lot::Mutex;
    use serde_json::json;

    use crate::websocket::queue::OutboundQueue;

    fn outbox() -> Outbox {
        Outbox::new(Arc::new(OutboundQueue::new(0)))
    }

    #[test]
    fn test_dispatch_by_variant() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut callbacks = Callbacks::default();

        let log = Arc::clone(&seen);
        callbacks.push_text(Arc::new(move |text: &str, _: &Outbox| {
            log.lock().push(format!("text:{text}"));
        }));
        let log = Arc::clone(&seen);
        callbacks.push_json(Arc::new(move |value: &Value, _: &Outbox| {
            log.lock().push(format!("json:{value}"));
        }));

        let outbox = outbox();
        assert_eq!(callbacks.dispatch(&Payload::Text("hello".into()), &outbox), 1);
        assert_eq!(callbacks.dispatch(&Payload::Json(json!({"k": "v"})), &outbox), 1);
        // No binary callback: dropped silently.
        assert_eq!(callbacks.dispatch(&Payload::Binary(vec![1]), &outbox), 0);

        assert_eq!(*seen.lock(), vec!["text:hello", r#"json:{"k":"v"}"#]);
    }

    #[test]
    fn test_registration_order() {
        let order = Arc::new(Mutex::new(Vec::new()));
        let mut callbacks = Callbacks::default();
        for i in 0..3 {
            let order = Arc::clone(&order);
            callbacks.push_binary(Arc::new(move |_: &[u8], _: &Outbox| order.lock().push(i)));
        }

        callbacks.dispatch(&Payload::Binary(vec![]), &outbox());
        assert_eq!(*order.lock(), vec![0, 1, 2]);
    }

    #[test]
    fn test_panicking_callback_is_contained() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut callbacks = Callbacks::default();

        callbacks.push_text(Arc::new(|_: &str, _: &Outbox| panic!("boom")));
        let counter = Arc::clone(&calls);
        callbacks.push_text(Arc::new(move |_: &str, _: &Outbox| {
            counter.fetch_add(1, Ordering::SeqCst);
        }));

        let completed = callbacks.dispatch(&Payload::Text("x".into()), &outbox());
        assert_eq!(completed, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_callback_can_reply() {
        let mut callbacks = Callbacks::default();
        callbacks.push_text(Arc::new(|text: &str, outbox: &Outbox| {
            outbox.send(text.to_uppercase());
        }));

        let outbox = outbox();
        callbacks.dispatch(&Payload::Text("ping".into()), &outbox);
        assert_eq!(outbox.len(), 1);
    }

    #[test]
    fn test_panic_message() {
        let panic: Box<dyn Any + Send> = Box::new("static");
        assert_eq!(panic_message(panic.as_ref()), "static");
        let panic: Box<dyn Any + Send> = Box::new(String::from("owned"));
        assert_eq!(panic_message(panic.as_ref()), "owned");
        let panic: Box<dyn Any + Send> = Box::new(7);
        assert_eq!(panic_message(panic.as_ref()), "non-string panic payload");
    }
}
