//! One-shot callback table: lets a caller register interest in "the next
//! response to command X" or "the next occurrence of event Y" without
//! polling the dispatcher's inboxes directly (spec §4.6, §4.7, §6).

use std::collections::{HashMap, VecDeque};

use serde_json::Value;

use super::message::{Command, Event};
use super::retained::ResponseStatus;

/// spec §6: "a *callbacks* table keyed by `{ response_command | event_kind,
/// status }`" — a response callback fires only for the status it was
/// registered against, so a caller can distinguish "next successful
/// `launch`" from "next failed `launch`" instead of getting either.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallbackKey {
    Response(Command, ResponseStatus),
    Event(Event),
}

/// A registered one-shot slot, consumed the first time a matching response
/// or event is handled. Callers poll `take` rather than receiving a push
/// notification, keeping the engine single-threaded and tick-driven.
///
/// Each firing carries the raw message it fired on (spec §6: "a *callbacks*
/// table keyed by `{ response_command | event_kind, status }` that fires
/// once when a matching message is handled; each callback is one-shot and
/// receives the raw message"). Firings are queued per key so that two
/// requests of the same command (e.g. two `scopes` fetches from one
/// `stackTrace` fan-out) each get their own raw message delivered to the
/// next `take`, rather than one token silently eating the other's.
#[derive(Default)]
pub struct CallbackTable {
    fired: HashMap<CallbackKey, VecDeque<Value>>,
    next_token: u32,
    registered: HashMap<u32, CallbackKey>,
}

impl CallbackTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register interest in the next occurrence of `key`, returning a token
    /// to poll with `take`.
    pub fn register(&mut self, key: CallbackKey) -> u32 {
        let token = self.next_token;
        self.next_token += 1;
        self.registered.insert(token, key);
        token
    }

    /// Record that `key` has fired, carrying the raw message that triggered
    /// it.
    pub fn notify(&mut self, key: CallbackKey, raw_message: Value) {
        self.fired.entry(key).or_default().push_back(raw_message);
    }

    /// Consumes and returns one firing's raw message if `token`'s key has
    /// fired since registration and hasn't already been claimed.
    pub fn take(&mut self, token: u32) -> Option<Value> {
        let key = self.registered.get(&token).copied()?;
        let queue = self.fired.get_mut(&key)?;
        let message = queue.pop_front()?;
        self.registered.remove(&token);
        Some(message)
    }

    pub fn cancel(&mut self, token: u32) {
        self.registered.remove(&token);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn take_is_one_shot_and_returns_the_raw_message() {
        let mut table = CallbackTable::new();
        let token = table.register(CallbackKey::Response(
            Command::ConfigurationDone,
            ResponseStatus::Success,
        ));
        assert!(table.take(token).is_none());
        table.notify(
            CallbackKey::Response(Command::ConfigurationDone, ResponseStatus::Success),
            json!({ "success": true }),
        );
        assert_eq!(table.take(token), Some(json!({ "success": true })));
        assert!(table.take(token).is_none());
    }

    #[test]
    fn success_and_failure_callbacks_for_the_same_command_are_independent() {
        let mut table = CallbackTable::new();
        let ok = table.register(CallbackKey::Response(Command::Launch, ResponseStatus::Success));
        let fail = table.register(CallbackKey::Response(Command::Launch, ResponseStatus::Failure));
        table.notify(
            CallbackKey::Response(Command::Launch, ResponseStatus::Failure),
            json!({ "success": false }),
        );
        assert!(table.take(ok).is_none());
        assert_eq!(table.take(fail), Some(json!({ "success": false })));
    }

    #[test]
    fn independent_tokens_each_get_their_own_firing() {
        let mut table = CallbackTable::new();
        let a = table.register(CallbackKey::Event(Event::Initialized));
        let b = table.register(CallbackKey::Event(Event::Initialized));
        table.notify(CallbackKey::Event(Event::Initialized), json!({}));
        assert!(table.take(a).is_some());
        assert!(table.take(b).is_none());
    }

    #[test]
    fn two_firings_of_the_same_key_queue_independently() {
        let mut table = CallbackTable::new();
        let key = CallbackKey::Response(Command::Scopes, ResponseStatus::Success);
        table.notify(key, json!({ "frameId": 1 }));
        table.notify(key, json!({ "frameId": 2 }));
        let first = table.register(key);
        assert_eq!(table.take(first), Some(json!({ "frameId": 1 })));
        let second = table.register(key);
        assert_eq!(table.take(second), Some(json!({ "frameId": 2 })));
    }
}
