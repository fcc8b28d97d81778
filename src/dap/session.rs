//! Session orchestrator: the public surface that turns "fetch the stack",
//! "step", "set these breakpoints" into enqueue chains, and drives one tick
//! of send/receive (spec §4, §7).

use std::time::Duration;

use indexmap::IndexMap;
use serde_json::{json, Value};

use crate::error::{Error, Result};

use super::callbacks::CallbackTable;
use super::capabilities::{AdapterCapabilities, CapabilityGate, InitializeRequestArguments};
use super::child::AdapterProcess;
use super::codec::WireCodec;
use super::dispatcher::InboundDispatcher;
use super::handler::ResponseHandler;
use super::message::{Command, Event, IncomingMessage, IncomingReverseRequest, OutgoingRequest};
use super::queue::OutboundQueue;
use super::retained::{Dependency, HandledResponse, RetainedContext};
use super::state::{Connection, LaunchKind};
use super::store::SessionDataStore;
use super::types::{Source, SourceBreakpoint, SteppingGranularity};

/// What a caller gets back from a session `tick`: nothing forces a specific
/// reaction, but reverse requests need an answer and fatal errors need a
/// teardown decision, so both are surfaced explicitly rather than buried in
/// the store.
pub enum TickOutcome {
    Idle,
    ReverseRequest(IncomingReverseRequest),
}

/// How `end_session` should wind the debuggee down (spec §4.8): these are
/// two distinct DAP requests, gated by two distinct capabilities, not a flag
/// on one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndSessionHow {
    Terminate,
    Disconnect,
}

pub struct Session {
    adapter: AdapterProcess,
    codec: Option<WireCodec>,
    connection: Connection,
    adapter_caps: AdapterCapabilities,
    queue: OutboundQueue,
    dispatcher: InboundDispatcher,
    callbacks: CallbackTable,
    store: SessionDataStore,
    history: Vec<HandledResponse>,
    events_observed: Vec<Event>,
    pending_context: IndexMap<u32, (Command, RetainedContext)>,
}

impl Session {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            adapter: AdapterProcess::new(program, args),
            codec: None,
            connection: Connection::new(),
            adapter_caps: AdapterCapabilities::default(),
            queue: OutboundQueue::new(),
            dispatcher: InboundDispatcher::new(),
            callbacks: CallbackTable::new(),
            store: SessionDataStore::new(),
            history: Vec::new(),
            events_observed: Vec::new(),
            pending_context: IndexMap::new(),
        }
    }

    pub fn store(&self) -> &SessionDataStore {
        &self.store
    }

    pub fn capabilities(&self) -> &AdapterCapabilities {
        &self.adapter_caps
    }

    pub fn connection(&self) -> &Connection {
        &self.connection
    }

    /// Spawn the adapter and enqueue the full handshake up front: `initialize`,
    /// then `launch`/`attach` once it succeeds, then `configurationDone` once
    /// the `initialized` event has been observed (spec §4.4, §4.8, §8
    /// scenario 1).
    ///
    /// `configurationDone` is enqueued here, not chained off the launch/
    /// attach response: scenario 1's wire order is `launch` -> `initialized`
    /// event -> `configurationDone` -> THEN the launch/attach response, and
    /// a standard adapter (debugpy, cppdbg, ...) holds its launch/attach
    /// response until `configurationDone` arrives. Waiting for the response
    /// first would deadlock against such an adapter. The capability gate
    /// (`supportsConfigurationDoneRequest`) is checked the ordinary way at
    /// drain time, once the `initialize` response has populated it, so
    /// `configurationDone` simply stays queued here if the adapter never
    /// advertises support.
    ///
    /// `launch_args` is the adapter-specific request body sent verbatim
    /// with the `launch`/`attach` request; this client interprets none of
    /// it (spec's Non-goal: no language-specific launch config knowledge).
    pub fn begin_session(
        &mut self,
        init_args: InitializeRequestArguments,
        launch_kind: LaunchKind,
        launch_args: Value,
    ) -> Result<()> {
        let (stdin, stdout) = self.adapter.spawn()?;
        self.codec = Some(WireCodec::new(stdin, stdout));
        self.connection.spawn()?;
        let init_seq = self.queue.enqueue(
            Command::Initialize,
            serde_json::to_value(&init_args)?,
            Dependency::None,
            RetainedContext::None,
        )?;
        let launch_command = match launch_kind {
            LaunchKind::Launch => Command::Launch,
            LaunchKind::Attach => Command::Attach,
        };
        self.queue.enqueue(
            launch_command,
            launch_args,
            Dependency::AfterSeq(init_seq),
            RetainedContext::None,
        )?;
        self.queue.enqueue(
            Command::ConfigurationDone,
            Value::Null,
            Dependency::AfterEvent(Event::Initialized),
            RetainedContext::None,
        )?;
        Ok(())
    }

    /// Enqueues `terminate` or `disconnect` (spec §4.8). Rejected unless the
    /// connection is in `Launched`/`Attached` — there's no debuggee to wind
    /// down before that. `terminate` additionally goes through the ordinary
    /// capability gate at drain time: an adapter that never declared
    /// `supportsTerminateRequest` leaves the request stuck pending rather
    /// than failing here (spec §8 scenario 2).
    ///
    /// Does not itself wait for the adapter to exit; call `wait_for_exit`
    /// after the response has been observed.
    pub fn end_session(&mut self, how: EndSessionHow) -> Result<()> {
        if !matches!(
            self.connection.state(),
            super::state::ConnectionState::Launched | super::state::ConnectionState::Attached
        ) {
            return Err(Error::SessionNotStarted);
        }
        let (command, arguments) = match how {
            EndSessionHow::Terminate => (Command::Terminate, json!({ "restart": false })),
            EndSessionHow::Disconnect => (
                Command::Disconnect,
                json!({
                    "restart": false,
                    "terminateDebuggee": Value::Null,
                    "suspendDebuggee": Value::Null,
                }),
            ),
        };
        self.queue
            .enqueue(command, arguments, Dependency::None, RetainedContext::None)?;
        Ok(())
    }

    /// Blocks until the adapter process exits, then resets connection state
    /// so a caller can legitimately `spawn()` again afterwards (spec §4.4,
    /// §8 scenario 5).
    pub fn wait_for_exit(&mut self) -> Result<std::process::ExitStatus> {
        let status = self.adapter.wait()?;
        self.connection.on_adapter_exited();
        Ok(status)
    }

    /// Fetch the stack for `thread_id`, optionally cascading into scopes
    /// and variables for every frame (spec §4.7 composite fetch).
    pub fn fetch_thread_state(
        &mut self,
        thread_id: i64,
        also_fetch_scopes: bool,
        also_fetch_variables: bool,
    ) -> Result<()> {
        self.queue.enqueue(
            Command::StackTrace,
            json!({ "threadId": thread_id }),
            Dependency::None,
            RetainedContext::StackTrace {
                thread_id,
                also_fetch_scopes,
                also_fetch_variables,
            },
        )?;
        Ok(())
    }

    pub fn fetch_source(&mut self, source: &Source) -> Result<()> {
        self.queue.enqueue(
            Command::Source,
            json!({
                "source": source,
                "sourceReference": source.source_reference.unwrap_or(0),
            }),
            Dependency::None,
            RetainedContext::Source {
                path: source.path.clone(),
                source_reference: source.source_reference,
            },
        )?;
        Ok(())
    }

    pub fn set_breakpoints(&mut self, source: Source, breakpoints: Vec<SourceBreakpoint>) -> Result<()> {
        self.queue.enqueue(
            Command::SetBreakpoints,
            json!({ "source": source, "breakpoints": breakpoints }),
            Dependency::None,
            RetainedContext::None,
        )?;
        Ok(())
    }

    /// Broadcast step (spec §4.8, §8 scenario 4): every thread currently
    /// marked unlocked gets a `next` with `singleThread=true` at the given
    /// granularity. The response handler chains a `stackTrace` per thread
    /// and raises the "scroll to active line" / "update active source" UI
    /// hints (spec §4.7); it does not also re-fetch scopes/variables here,
    /// unlike `fetch_thread_state`.
    pub fn step(&mut self, granularity: SteppingGranularity) -> Result<()> {
        for thread_id in self.store.unlocked_thread_ids() {
            self.queue.enqueue(
                Command::Next,
                json!({
                    "threadId": thread_id,
                    "singleThread": true,
                    "granularity": granularity,
                }),
                Dependency::None,
                RetainedContext::Next {
                    thread_id,
                    also_fetch_stack_trace: true,
                    also_fetch_scopes: false,
                    also_fetch_variables: false,
                },
            )?;
        }
        Ok(())
    }

    /// Single-thread `stepIn`/`stepOut`/`stepBack` (spec §3's closed
    /// `Command` set includes these independently of the broadcast `next`
    /// composite operation in §4.8; they always target one thread).
    pub fn step_command(&mut self, command: Command, thread_id: i64) -> Result<()> {
        if !matches!(
            command,
            Command::StepIn | Command::StepOut | Command::StepBack
        ) {
            return Err(Error::Protocol(format!(
                "`{command:?}` is not a single-thread stepping command"
            )));
        }
        self.queue.enqueue(
            command,
            json!({ "threadId": thread_id }),
            Dependency::None,
            RetainedContext::Next {
                thread_id,
                also_fetch_stack_trace: true,
                also_fetch_scopes: false,
                also_fetch_variables: false,
            },
        )?;
        Ok(())
    }

    pub fn lock_thread(&mut self, thread_id: i64) {
        self.store.set_thread_unlocked(thread_id, false);
    }

    pub fn unlock_thread(&mut self, thread_id: i64) {
        self.store.set_thread_unlocked(thread_id, true);
    }

    pub fn continue_(&mut self, thread_id: i64) -> Result<()> {
        self.queue.enqueue(
            Command::Continue,
            json!({ "threadId": thread_id }),
            Dependency::None,
            RetainedContext::None,
        )?;
        Ok(())
    }

    pub fn pause(&mut self, thread_id: i64) -> Result<()> {
        self.queue.enqueue(
            Command::Pause,
            json!({ "threadId": thread_id }),
            Dependency::None,
            RetainedContext::None,
        )?;
        Ok(())
    }

    fn enqueue_simple(&mut self, command: Command, arguments: Value) -> Result<()> {
        self.queue
            .enqueue(command, arguments, Dependency::None, RetainedContext::None)?;
        Ok(())
    }

    /// Register interest in the raw message of the next response to
    /// `command`/event of `event_kind` (spec §6's callbacks table). Poll
    /// with `take_callback`.
    pub fn register_callback(&mut self, key: super::callbacks::CallbackKey) -> u32 {
        self.callbacks.register(key)
    }

    pub fn take_callback(&mut self, token: u32) -> Option<Value> {
        self.callbacks.take(token)
    }

    pub fn cancel_callback(&mut self, token: u32) {
        self.callbacks.cancel(token)
    }

    // --- Section B supplemented single-request commands (SPEC_FULL.md §B):
    // every remaining member of spec.md §3's closed `Command` set not
    // already covered by a composite operation above gets one enqueue
    // helper here. None of these carry a `RetainedContext` beyond `None`
    // since spec.md §4.7 only names fan-out behavior for stackTrace/
    // scopes/variables/source/next.

    pub fn evaluate(&mut self, args: super::types::EvaluateArguments) -> Result<()> {
        self.enqueue_simple(Command::Evaluate, serde_json::to_value(args)?)
    }

    pub fn set_variable(&mut self, args: super::types::SetVariableArguments) -> Result<()> {
        self.enqueue_simple(Command::SetVariable, serde_json::to_value(args)?)
    }

    pub fn set_expression(&mut self, args: super::types::SetExpressionArguments) -> Result<()> {
        self.enqueue_simple(Command::SetExpression, serde_json::to_value(args)?)
    }

    pub fn set_function_breakpoints(
        &mut self,
        breakpoints: Vec<super::types::FunctionBreakpoint>,
    ) -> Result<()> {
        self.enqueue_simple(
            Command::SetFunctionBreakpoints,
            json!({ "breakpoints": breakpoints }),
        )
    }

    pub fn set_instruction_breakpoints(
        &mut self,
        breakpoints: Vec<super::types::InstructionBreakpoint>,
    ) -> Result<()> {
        self.enqueue_simple(
            Command::SetInstructionBreakpoints,
            json!({ "breakpoints": breakpoints }),
        )
    }

    pub fn set_exception_breakpoints(
        &mut self,
        filter_ids: Vec<String>,
        filter_options: Vec<super::types::ExceptionFilterOptions>,
        exception_options: Vec<super::types::ExceptionOptions>,
    ) -> Result<()> {
        self.enqueue_simple(
            Command::SetExceptionBreakpoints,
            json!({
                "filters": filter_ids,
                "filterOptions": filter_options,
                "exceptionOptions": exception_options,
            }),
        )
    }

    pub fn set_data_breakpoints(
        &mut self,
        breakpoints: Vec<super::types::DataBreakpoint>,
    ) -> Result<()> {
        self.enqueue_simple(Command::SetDataBreakpoints, json!({ "breakpoints": breakpoints }))
    }

    pub fn data_breakpoint_info(&mut self, args: super::types::DataBreakpointInfoArguments) -> Result<()> {
        self.enqueue_simple(Command::DataBreakpointInfo, serde_json::to_value(args)?)
    }

    pub fn read_memory(&mut self, args: super::types::ReadMemoryArguments) -> Result<()> {
        self.enqueue_simple(Command::ReadMemory, serde_json::to_value(args)?)
    }

    pub fn write_memory(&mut self, args: super::types::WriteMemoryArguments) -> Result<()> {
        self.enqueue_simple(Command::WriteMemory, serde_json::to_value(args)?)
    }

    pub fn disassemble(&mut self, args: super::types::DisassembleArguments) -> Result<()> {
        self.enqueue_simple(Command::Disassemble, serde_json::to_value(args)?)
    }

    pub fn restart(&mut self, arguments: Value) -> Result<()> {
        self.enqueue_simple(Command::Restart, arguments)
    }

    pub fn restart_frame(&mut self, frame_id: i64) -> Result<()> {
        self.enqueue_simple(Command::RestartFrame, json!({ "frameId": frame_id }))
    }

    pub fn goto(&mut self, thread_id: i64, target_id: i64) -> Result<()> {
        self.enqueue_simple(
            Command::Goto,
            json!({ "threadId": thread_id, "targetId": target_id }),
        )
    }

    pub fn goto_targets(&mut self, source: Source, line: i64, column: Option<i64>) -> Result<()> {
        self.enqueue_simple(
            Command::GotoTargets,
            json!({ "source": source, "line": line, "column": column }),
        )
    }

    pub fn step_in_targets(&mut self, frame_id: i64) -> Result<()> {
        self.enqueue_simple(Command::StepInTargets, json!({ "frameId": frame_id }))
    }

    pub fn completions(&mut self, text: String, column: i64, frame_id: Option<i64>) -> Result<()> {
        self.enqueue_simple(
            Command::Completions,
            json!({ "text": text, "column": column, "frameId": frame_id }),
        )
    }

    pub fn modules(&mut self, start_module: Option<i64>, module_count: Option<i64>) -> Result<()> {
        self.enqueue_simple(
            Command::Modules,
            json!({ "startModule": start_module, "moduleCount": module_count }),
        )
    }

    pub fn loaded_sources(&mut self) -> Result<()> {
        self.enqueue_simple(Command::LoadedSources, Value::Null)
    }

    pub fn breakpoint_locations(
        &mut self,
        source: Source,
        line: i64,
        end_line: Option<i64>,
    ) -> Result<()> {
        self.enqueue_simple(
            Command::BreakpointLocations,
            json!({ "source": source, "line": line, "endLine": end_line }),
        )
    }

    pub fn locations(&mut self, location_reference: i64) -> Result<()> {
        self.enqueue_simple(
            Command::Locations,
            json!({ "locationReference": location_reference }),
        )
    }

    pub fn exception_info(&mut self, thread_id: i64) -> Result<()> {
        self.enqueue_simple(Command::ExceptionInfo, json!({ "threadId": thread_id }))
    }

    pub fn terminate_threads(&mut self, thread_ids: Vec<i64>) -> Result<()> {
        self.enqueue_simple(Command::TerminateThreads, json!({ "threadIds": thread_ids }))
    }

    /// Cancel an in-flight request by seq, or a long-running progress by id
    /// (spec §5: cancellation of one in-flight request is modelled as a
    /// `cancel` request).
    pub fn cancel(&mut self, request_id: Option<u32>, progress_id: Option<String>) -> Result<()> {
        self.enqueue_simple(
            Command::Cancel,
            json!({ "requestId": request_id, "progressId": progress_id }),
        )
    }

    pub fn reverse_continue(&mut self, thread_id: i64) -> Result<()> {
        self.enqueue_simple(Command::ReverseContinue, json!({ "threadId": thread_id }))
    }

    /// Answer a reverse request the adapter sent us. Constructs its own
    /// response envelope rather than going through `OutgoingRequest`, since
    /// here the client is playing the server's role (spec §9 supplement).
    pub fn answer_reverse_request(
        &mut self,
        request: &IncomingReverseRequest,
        success: bool,
        body: Value,
    ) -> Result<()> {
        let seq = self.queue.alloc_seq()?;
        let envelope = json!({
            "seq": seq,
            "type": "response",
            "request_seq": request.seq,
            "success": success,
            "command": request.command,
            "body": body,
        });
        self.codec_mut()?.write_frame(&envelope)
    }

    /// One iteration: drain every outbound request that is currently ready,
    /// poll for at most `read_timeout` for a single inbound frame, file it
    /// into the dispatcher's per-kind inbox, then drain whatever the
    /// dispatcher now has on hand (spec §4.6, §5 "one tick" control flow).
    pub fn tick(&mut self, read_timeout: Duration) -> Result<TickOutcome> {
        self.drain_ready()?;

        if let Some(raw) = self.codec_mut()?.poll_frame(read_timeout)? {
            log::trace!(target: "dap::wire", "<- {raw}");
            self.dispatcher.file(IncomingMessage::parse(raw)?);
        }

        self.drain_dispatcher()
    }

    /// Responses are handled before events so a response's follow-up fan-out
    /// is enqueued ahead of any event-driven work filed in the same tick
    /// (spec §5: "responses are processed in arrival order").
    fn drain_dispatcher(&mut self) -> Result<TickOutcome> {
        while let Some(response) = self.dispatcher.take_next_response() {
            self.handle_response(response)?;
        }
        while let Some(event) = self.dispatcher.take_next_event() {
            self.handle_event(event)?;
        }
        if let Some(request) = self.dispatcher.take_next_reverse_request() {
            return Ok(TickOutcome::ReverseRequest(request));
        }
        Ok(TickOutcome::Idle)
    }

    fn handle_response(&mut self, response: super::message::IncomingResponse) -> Result<()> {
        let (expected_command, retained) = self
            .pending_context
            .shift_remove(&response.request_seq)
            .ok_or(Error::ResponseDoesNotExist(response.request_seq))?;
        let handled = ResponseHandler::handle_response(
            response,
            expected_command,
            retained,
            &mut self.connection,
            &mut self.adapter_caps,
            &mut self.store,
            &mut self.queue,
            &mut self.callbacks,
        )?;
        self.history.push(handled);
        Ok(())
    }

    fn handle_event(&mut self, event: super::message::IncomingEvent) -> Result<()> {
        let kind = event.event;
        ResponseHandler::handle_event(
            event,
            &mut self.connection,
            &mut self.store,
            &mut self.queue,
            &mut self.callbacks,
        )?;
        self.events_observed.push(kind);
        Ok(())
    }

    fn drain_ready(&mut self) -> Result<()> {
        loop {
            let Some(request) = self.queue.pop_ready(&self.history, &self.events_observed)
            else {
                return Ok(());
            };

            if !self.connection.permits(request.command) {
                self.queue.push_front(request);
                return Ok(());
            }
            if self.adapter_caps.is_request_allowed(request.command) == CapabilityGate::Forbidden {
                log::warn!(
                    "`{:?}` stays queued: adapter did not declare support for it",
                    request.command
                );
                self.queue.push_front(request);
                return Ok(());
            }

            let seq = request.seq;
            self.connection.on_request_sent(request.command);
            let outgoing = OutgoingRequest::new(seq, request.command, request.arguments);
            let outgoing = serde_json::to_value(&outgoing)?;
            log::trace!(target: "dap::wire", "-> {outgoing}");
            self.codec_mut()?.write_frame(&outgoing)?;
            self.pending_context
                .insert(seq, (request.command, request.retained));
        }
    }

    fn codec_mut(&mut self) -> Result<&mut WireCodec> {
        self.codec.as_mut().ok_or(Error::AdapterNotSpawned)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn begin_session_requires_spawn_before_codec_use() {
        let mut session = Session::new("nonexistent-adapter-binary", vec![]);
        assert!(session.codec_mut().is_err());
        let args = InitializeRequestArguments {
            adapter_id: "test".to_string(),
            lines_start_at1: true,
            columns_start_at1: true,
            ..Default::default()
        };
        // A program that genuinely doesn't exist fails at spawn, which is
        // expected here: this only checks that begin_session attempts the
        // spawn rather than silently no-op-ing.
        let result = session.begin_session(args, LaunchKind::Launch, json!({}));
        assert!(result.is_err());
    }

    #[test]
    fn end_session_rejected_before_launch() {
        let mut session = Session::new("irrelevant", vec![]);
        assert!(matches!(
            session.end_session(EndSessionHow::Disconnect),
            Err(Error::SessionNotStarted)
        ));
    }

    #[test]
    fn end_session_enqueues_terminate_with_restart_false() {
        let mut session = Session::new("irrelevant", vec![]);
        session.connection.spawn().unwrap();
        session.connection.on_request_sent(Command::Initialize);
        session.connection.on_initialize_response();
        session.connection.on_launch_response();
        session
            .end_session(EndSessionHow::Terminate)
            .expect("end_session from Launched succeeds");
        assert_eq!(session.queue.len(), 1);
    }

    #[test]
    fn step_broadcasts_next_to_every_unlocked_thread_only() {
        let mut session = Session::new("irrelevant", vec![]);
        session.store.set_threads(vec![
            super::super::types::Thread { id: 1, name: "main".into() },
            super::super::types::Thread { id: 2, name: "worker".into() },
        ]);
        session.store.set_stack_trace(1, vec![]);
        session.store.set_stack_trace(2, vec![]);
        session.lock_thread(2);

        session.step(super::super::types::SteppingGranularity::Line).unwrap();

        assert_eq!(session.queue.len(), 1);
        let queued = session.queue.pop_ready(&[], &[]).unwrap();
        assert_eq!(queued.command, Command::Next);
        assert_eq!(queued.arguments["threadId"], json!(1));
        assert_eq!(queued.arguments["singleThread"], json!(true));
        assert!(matches!(
            queued.retained,
            RetainedContext::Next { thread_id: 1, also_fetch_stack_trace: true, .. }
        ));
    }

    #[test]
    fn supplemented_single_request_helpers_enqueue_one_request_each() {
        let mut session = Session::new("irrelevant", vec![]);
        session.evaluate(super::super::types::EvaluateArguments {
            expression: "x + 1".into(),
            ..Default::default()
        }).unwrap();
        session.exception_info(3).unwrap();
        session.loaded_sources().unwrap();
        assert_eq!(session.queue.len(), 3);
    }

    #[test]
    fn callback_round_trips_through_session() {
        let mut session = Session::new("irrelevant", vec![]);
        let token = session.register_callback(super::super::callbacks::CallbackKey::Event(
            Event::Initialized,
        ));
        assert!(session.take_callback(token).is_none());
    }
}
