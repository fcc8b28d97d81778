//! Inbound dispatcher: classifies frames off the wire into per-kind inboxes
//! so a session tick can drain responses before events, and reverse
//! requests never get lost in between (spec §4.6).

use std::collections::VecDeque;

use super::message::{IncomingEvent, IncomingMessage, IncomingReverseRequest, IncomingResponse};

#[derive(Default)]
pub struct InboundDispatcher {
    responses: VecDeque<IncomingResponse>,
    events: VecDeque<IncomingEvent>,
    reverse_requests: VecDeque<IncomingReverseRequest>,
}

impl InboundDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// File a freshly-parsed frame into the appropriate inbox.
    pub fn file(&mut self, message: IncomingMessage) {
        match message {
            IncomingMessage::Response(response) => self.responses.push_back(response),
            IncomingMessage::Event(event) => self.events.push_back(event),
            IncomingMessage::ReverseRequest(request) => {
                self.reverse_requests.push_back(request)
            }
        }
    }

    /// Pull the response matching `request_seq` out of the inbox, regardless
    /// of its queue position: responses for unrelated pending requests may
    /// arrive interleaved (spec §4.6).
    pub fn take_response_by_seq(&mut self, request_seq: u32) -> Option<IncomingResponse> {
        let idx = self
            .responses
            .iter()
            .position(|resp| resp.request_seq == request_seq)?;
        self.responses.remove(idx)
    }

    pub fn take_next_response(&mut self) -> Option<IncomingResponse> {
        self.responses.pop_front()
    }

    pub fn take_next_event(&mut self) -> Option<IncomingEvent> {
        self.events.pop_front()
    }

    pub fn take_next_reverse_request(&mut self) -> Option<IncomingReverseRequest> {
        self.reverse_requests.pop_front()
    }

    pub fn has_pending_responses(&self) -> bool {
        !self.responses.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dap::message::{Command, Event};
    use serde_json::Value;

    fn response(request_seq: u32) -> IncomingResponse {
        IncomingResponse {
            seq: request_seq + 100,
            request_seq,
            success: true,
            command: Command::Threads,
            message: None,
            body: Value::Null,
        }
    }

    #[test]
    fn takes_response_out_of_order() {
        let mut dispatcher = InboundDispatcher::new();
        dispatcher.file(IncomingMessage::Response(response(1)));
        dispatcher.file(IncomingMessage::Response(response(2)));
        let second = dispatcher.take_response_by_seq(2).unwrap();
        assert_eq!(second.request_seq, 2);
        assert!(dispatcher.has_pending_responses());
        let first = dispatcher.take_response_by_seq(1).unwrap();
        assert_eq!(first.request_seq, 1);
        assert!(!dispatcher.has_pending_responses());
    }

    #[test]
    fn events_and_reverse_requests_are_independent_inboxes() {
        let mut dispatcher = InboundDispatcher::new();
        dispatcher.file(IncomingMessage::Event(IncomingEvent {
            seq: 1,
            event: Event::Initialized,
            body: Value::Null,
        }));
        dispatcher.file(IncomingMessage::ReverseRequest(IncomingReverseRequest {
            seq: 2,
            command: Command::RunInTerminal,
            arguments: Value::Null,
        }));
        assert!(dispatcher.take_next_event().is_some());
        assert!(dispatcher.take_next_reverse_request().is_some());
    }
}
