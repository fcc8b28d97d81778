//! Outbound queue: requests wait here until their `Dependency` is satisfied,
//! then drain onto the wire in enqueue order (spec §4.5).

use std::collections::VecDeque;

use serde_json::Value;

use crate::error::Result;

use super::message::{Command, Event};
use super::retained::{Dependency, HandledResponse, RetainedContext, ResponseStatus};
use super::seq::SeqAllocator;

pub struct PendingRequest {
    pub seq: u32,
    pub command: Command,
    pub arguments: Value,
    pub dependency: Dependency,
    pub retained: RetainedContext,
}

/// FIFO queue of not-yet-sent requests. Satisfied requests drain in the
/// order they were enqueued; a request blocked on an unmet dependency
/// blocks everything behind it, matching spec §4.5's "queue is strictly
/// ordered" invariant rather than allowing later, already-satisfied
/// requests to jump ahead.
///
/// Owns the single monotonic `seq` allocator (spec §4.2) so `enqueue`
/// matches spec §4.5's signature exactly — `enqueue(...) → seq` — and a
/// request's seq is assigned when it is queued, not when it is eventually
/// drained. That is what makes `Dependency::AfterSeq(seq)` constructible
/// for a request that hasn't been sent yet (spec §4.8's `launch` chained
/// after `initialize`'s seq).
#[derive(Default)]
pub struct OutboundQueue {
    pending: VecDeque<PendingRequest>,
    seq: SeqAllocator,
}

impl OutboundQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// spec §4.5: `enqueue(command, arguments, dependency, retained_context)
    /// → seq`. Allocates the seq immediately and returns it so the caller
    /// can chain a later `enqueue` off it with `Dependency::AfterSeq(seq)`.
    pub fn enqueue(
        &mut self,
        command: Command,
        arguments: Value,
        dependency: Dependency,
        retained: RetainedContext,
    ) -> Result<u32> {
        let seq = self.seq.alloc()?;
        self.pending.push_back(PendingRequest {
            seq,
            command,
            arguments,
            dependency,
            retained,
        });
        Ok(seq)
    }

    /// Allocate a seq from the same monotonic counter as `enqueue`, for a
    /// message this client sends that never goes through the pending queue
    /// — the response envelope answering an adapter reverse request (spec
    /// §6 supplement). `seq` is one sequence shared by every message this
    /// side emits, not just requests.
    pub fn alloc_seq(&mut self) -> Result<u32> {
        self.seq.alloc()
    }

    /// Put a popped request back at the front, for the rare case where its
    /// `Dependency` was satisfied but the connection state or capability
    /// gate wasn't ready yet (spec §8 scenario 2: the request stays queued
    /// rather than being dropped).
    pub fn push_front(&mut self, request: PendingRequest) {
        self.pending.push_front(request);
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    /// Pop the front request if its dependency is satisfied by `history` and
    /// `events_observed`. Returns `None` without mutating the queue if the
    /// front request is still blocked (spec §4.5).
    pub fn pop_ready(
        &mut self,
        history: &[HandledResponse],
        events_observed: &[Event],
    ) -> Option<PendingRequest> {
        let front = self.pending.front()?;
        if dependency_satisfied(front.dependency, history, events_observed) {
            self.pending.pop_front()
        } else {
            None
        }
    }
}

/// spec §3: each tag is checked against the handled-response/observed-event
/// history, not against what has merely been written to the wire — a
/// response must have been HANDLED, and `after-response(C)` matches any
/// status (success or failure), not just success.
fn dependency_satisfied(
    dependency: Dependency,
    history: &[HandledResponse],
    events_observed: &[Event],
) -> bool {
    match dependency {
        Dependency::None => true,
        Dependency::AfterSeq(seq) => history.iter().any(|handled| handled.request_seq == seq),
        Dependency::AfterResponse(command) => {
            history.iter().any(|handled| handled.command == command)
        }
        Dependency::AfterEvent(event) => events_observed.contains(&event),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fifo_order_preserved_when_all_ready() {
        let mut q = OutboundQueue::new();
        q.enqueue(Command::Threads, Value::Null, Dependency::None, RetainedContext::None)
            .unwrap();
        q.enqueue(
            Command::StackTrace,
            Value::Null,
            Dependency::None,
            RetainedContext::None,
        )
        .unwrap();
        let first = q.pop_ready(&[], &[]).unwrap();
        assert_eq!(first.command, Command::Threads);
        let second = q.pop_ready(&[], &[]).unwrap();
        assert_eq!(second.command, Command::StackTrace);
    }

    #[test]
    fn blocked_front_blocks_the_whole_queue() {
        let mut q = OutboundQueue::new();
        q.enqueue(
            Command::StackTrace,
            Value::Null,
            Dependency::AfterSeq(5),
            RetainedContext::None,
        )
        .unwrap();
        q.enqueue(Command::Threads, Value::Null, Dependency::None, RetainedContext::None)
            .unwrap();
        let history = vec![HandledResponse {
            request_seq: 4,
            command: Command::Threads,
            status: ResponseStatus::Success,
        }];
        assert!(q.pop_ready(&history, &[]).is_none());
        assert_eq!(q.len(), 2);
    }

    #[test]
    fn after_seq_dependency_needs_that_seq_handled() {
        let mut q = OutboundQueue::new();
        q.enqueue(
            Command::Launch,
            Value::Null,
            Dependency::AfterSeq(1),
            RetainedContext::None,
        )
        .unwrap();
        assert!(q.pop_ready(&[], &[]).is_none());
        let history = vec![HandledResponse {
            request_seq: 1,
            command: Command::Initialize,
            status: ResponseStatus::Success,
        }];
        assert!(q.pop_ready(&history, &[]).is_some());
    }

    /// Exercises the exact chain spec §4.8's `begin-session` describes:
    /// the seq `enqueue` hands back for `initialize` is what a caller
    /// builds the follow-up `launch`'s `Dependency::AfterSeq` from, with no
    /// side channel involved.
    #[test]
    fn enqueue_returns_the_seq_a_later_request_can_depend_on() {
        let mut q = OutboundQueue::new();
        let init_seq = q
            .enqueue(Command::Initialize, Value::Null, Dependency::None, RetainedContext::None)
            .unwrap();
        q.enqueue(
            Command::Launch,
            Value::Null,
            Dependency::AfterSeq(init_seq),
            RetainedContext::None,
        )
        .unwrap();

        assert!(q.pop_ready(&[], &[]).is_some()); // initialize itself is sendable
        assert!(q.pop_ready(&[], &[]).is_none()); // launch still blocked

        let history = vec![HandledResponse {
            request_seq: init_seq,
            command: Command::Initialize,
            status: ResponseStatus::Success,
        }];
        let launch = q.pop_ready(&history, &[]).unwrap();
        assert_eq!(launch.command, Command::Launch);
    }

    #[test]
    fn after_response_dependency_matches_failure_too() {
        let mut q = OutboundQueue::new();
        q.enqueue(
            Command::Continue,
            Value::Null,
            Dependency::AfterResponse(Command::ConfigurationDone),
            RetainedContext::None,
        )
        .unwrap();
        assert!(q.pop_ready(&[], &[]).is_none());
        let history = vec![HandledResponse {
            request_seq: 1,
            command: Command::ConfigurationDone,
            status: ResponseStatus::Failure,
        }];
        assert!(q.pop_ready(&history, &[]).is_some());
    }

    #[test]
    fn after_event_dependency_checks_observed_events() {
        let mut q = OutboundQueue::new();
        q.enqueue(
            Command::ConfigurationDone,
            Value::Null,
            Dependency::AfterEvent(Event::Initialized),
            RetainedContext::None,
        )
        .unwrap();
        assert!(q.pop_ready(&[], &[]).is_none());
        assert!(q.pop_ready(&[], &[Event::Initialized]).is_some());
    }
}
