//! Retained-context store and dependency tags (spec §3, §4.5, §4.7, §9).
//!
//! `RetainedContext` is cloned into the session-long arena at enqueue time
//! so response handling never reaches into the per-request payload, which
//! is dropped once the request is written to the wire.

use super::message::Command;

/// A tagged dependency a pending request must satisfy before it may leave
/// the outbound queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dependency {
    None,
    AfterSeq(u32),
    AfterResponse(Command),
    AfterEvent(super::message::Event),
}

/// Follow-on work a response should trigger, recorded alongside the
/// request at enqueue time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetainedContext {
    None,
    StackTrace {
        thread_id: i64,
        also_fetch_scopes: bool,
        also_fetch_variables: bool,
    },
    Scopes {
        frame_id: i64,
        also_fetch_variables: bool,
    },
    Variables {
        variables_reference: i64,
    },
    Source {
        path: Option<String>,
        source_reference: Option<i64>,
    },
    Next {
        thread_id: i64,
        also_fetch_stack_trace: bool,
        also_fetch_scopes: bool,
        also_fetch_variables: bool,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResponseStatus {
    Success,
    Failure,
}

/// A response that has been fully handled: the matching key for
/// `after-seq`/`after-response` dependencies, and a durable record for
/// inspection (spec §3, §8 invariant 3).
#[derive(Debug, Clone)]
pub struct HandledResponse {
    pub request_seq: u32,
    pub command: Command,
    pub status: ResponseStatus,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retained_context_clone_preserves_equality() {
        let ctx = RetainedContext::StackTrace {
            thread_id: 7,
            also_fetch_scopes: true,
            also_fetch_variables: true,
        };
        assert_eq!(ctx.clone(), ctx);
    }
}
