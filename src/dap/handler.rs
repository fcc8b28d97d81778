//! Response and event handling (spec §4.5, §4.6, §5, §9 supplements).
//!
//! `ResponseHandler` is the one place that turns a parsed inbound frame into
//! mutations of connection state, capabilities, the session data store, and
//! follow-up requests fanned out through the outbound queue. Everything
//! upstream of it (codec, dispatcher) only moves bytes; everything
//! downstream (session orchestrator) only decides *what* to ask for next.

use serde::Deserialize;
use serde_json::Value;

use crate::error::{Error, Result};

use super::callbacks::{CallbackKey, CallbackTable};
use super::capabilities::AdapterCapabilities;
use super::message::{Command, Event, IncomingEvent, IncomingResponse};
use super::queue::OutboundQueue;
use super::retained::{Dependency, HandledResponse, RetainedContext, ResponseStatus};
use super::state::Connection;
use super::store::{OutputCategory, ProgressEntry, SessionDataStore, ThreadRunState};
use super::types::{Breakpoint, Module, Scope, Source, SourceKey, StackFrame, Thread, Variable};

pub struct ResponseHandler;

impl ResponseHandler {
    /// Validate and apply one response. An adapter-reported failure
    /// (`success: false`) is not fatal: it is logged and recorded in
    /// `history` with `ResponseStatus::Failure` rather than propagated, so
    /// one failed request doesn't abort the session (spec §4.6, §8
    /// invariant 3). Only a `command` mismatch against what was actually
    /// sent for this `request_seq` is a protocol error.
    #[allow(clippy::too_many_arguments)]
    pub fn handle_response(
        response: IncomingResponse,
        expected_command: Command,
        retained: RetainedContext,
        state: &mut Connection,
        caps: &mut AdapterCapabilities,
        store: &mut SessionDataStore,
        queue: &mut OutboundQueue,
        callbacks: &mut CallbackTable,
    ) -> Result<HandledResponse> {
        if response.command != expected_command {
            return Err(Error::RequestResponseMismatch {
                request_seq: response.request_seq,
                expected: expected_command,
                got: response.command,
            });
        }

        if !response.success {
            log::warn!(
                "{} request {} failed: {}",
                response.command,
                response.request_seq,
                response.message.as_deref().unwrap_or("no message")
            );
            callbacks.notify(
                CallbackKey::Response(response.command, ResponseStatus::Failure),
                serde_json::to_value(&response)?,
            );
            return Ok(HandledResponse {
                request_seq: response.request_seq,
                command: response.command,
                status: ResponseStatus::Failure,
            });
        }

        Self::apply_success(&response, state, caps)?;
        Self::fan_out(&response, retained, store, queue)?;
        callbacks.notify(
            CallbackKey::Response(response.command, ResponseStatus::Success),
            serde_json::to_value(&response)?,
        );

        Ok(HandledResponse {
            request_seq: response.request_seq,
            command: response.command,
            status: ResponseStatus::Success,
        })
    }

    fn apply_success(
        response: &IncomingResponse,
        state: &mut Connection,
        caps: &mut AdapterCapabilities,
    ) -> Result<()> {
        match response.command {
            Command::Initialize => {
                *caps = serde_json::from_value(response.body.clone())?;
                state.on_initialize_response();
            }
            Command::Launch => state.on_launch_response(),
            Command::Attach => state.on_attach_response(),
            Command::Disconnect => state.on_disconnect_response(),
            _ => {}
        }
        Ok(())
    }

    fn fan_out(
        response: &IncomingResponse,
        retained: RetainedContext,
        store: &mut SessionDataStore,
        queue: &mut OutboundQueue,
    ) -> Result<()> {
        match response.command {
            Command::Threads => {
                let body: ThreadsBody = serde_json::from_value(response.body.clone())?;
                store.set_threads(body.threads);
            }
            Command::StackTrace => {
                if let RetainedContext::StackTrace {
                    thread_id,
                    also_fetch_scopes,
                    also_fetch_variables,
                } = retained
                {
                    let body: StackTraceBody = serde_json::from_value(response.body.clone())?;
                    let frames = body.stack_frames;
                    if also_fetch_scopes {
                        for frame in &frames {
                            queue.enqueue(
                                Command::Scopes,
                                serde_json::json!({ "frameId": frame.id }),
                                Dependency::None,
                                RetainedContext::Scopes {
                                    frame_id: frame.id,
                                    also_fetch_variables,
                                },
                            )?;
                        }
                    }
                    store.set_stack_trace(thread_id, frames);
                }
            }
            Command::Scopes => {
                if let RetainedContext::Scopes {
                    frame_id,
                    also_fetch_variables,
                } = retained
                {
                    let body: ScopesBody = serde_json::from_value(response.body.clone())?;
                    if also_fetch_variables {
                        for scope in &body.scopes {
                            if scope.variables_reference != 0 {
                                queue.enqueue(
                                    Command::Variables,
                                    serde_json::json!({
                                        "variablesReference": scope.variables_reference
                                    }),
                                    Dependency::None,
                                    RetainedContext::Variables {
                                        variables_reference: scope.variables_reference,
                                    },
                                )?;
                            }
                        }
                    }
                    // Scopes belong to the thread that owns `frame_id`; the
                    // store doesn't index frames independently of their
                    // thread, so the caller that requested this is expected
                    // to have tagged the enqueue with the right thread.
                    // Frame-to-thread lookup is the session orchestrator's
                    // job (it issued the original stackTrace request).
                    if let Some(thread_id) = find_thread_for_frame(store, frame_id) {
                        store.set_scopes(frame_id, thread_id, body.scopes);
                    }
                }
            }
            Command::Variables => {
                if let RetainedContext::Variables {
                    variables_reference,
                } = retained
                {
                    let body: VariablesBody = serde_json::from_value(response.body.clone())?;
                    store.set_variables(variables_reference, body.variables);
                }
            }
            Command::Source => {
                if let RetainedContext::Source {
                    path,
                    source_reference,
                } = retained
                {
                    let body: SourceBody = serde_json::from_value(response.body.clone())?;
                    let key = match (&path, source_reference) {
                        (Some(path), _) => SourceKey::Path(path.clone()),
                        (None, Some(reference)) => SourceKey::Reference(reference),
                        (None, None) => SourceKey::Path(String::new()),
                    };
                    store.set_source(
                        key,
                        Source {
                            path,
                            source_reference,
                            ..Default::default()
                        },
                        Some(body.content),
                    );
                }
            }
            Command::SetBreakpoints => {
                let body: BreakpointsBody = serde_json::from_value(response.body.clone())?;
                if let Some(source_path) = breakpoints_source_key(&response.body) {
                    store.set_breakpoints(source_path, body.breakpoints);
                }
            }
            Command::SetFunctionBreakpoints => {
                let body: BreakpointsBody = serde_json::from_value(response.body.clone())?;
                store.function_breakpoints = body.breakpoints;
            }
            Command::Next | Command::StepIn | Command::StepOut | Command::StepBack
            | Command::Continue => {
                if let RetainedContext::Next {
                    thread_id,
                    also_fetch_stack_trace,
                    also_fetch_scopes,
                    also_fetch_variables,
                } = retained
                {
                    store.invalidate_stacks();
                    if also_fetch_stack_trace {
                        queue.enqueue(
                            Command::StackTrace,
                            serde_json::json!({ "threadId": thread_id }),
                            Dependency::None,
                            RetainedContext::StackTrace {
                                thread_id,
                                also_fetch_scopes,
                                also_fetch_variables,
                            },
                        )?;
                    }
                    // Independent of whether a stackTrace was chained: the
                    // active line/source hint fires every time (spec §4.7).
                    store.mark_active_line(thread_id);
                }
            }
            _ => {}
        }
        Ok(())
    }

    /// Apply one event to connection state and the data store. Unlike
    /// responses, events never fail validation: anything the adapter sends
    /// unsolicited is accepted as-is (spec §4.6).
    pub fn handle_event(
        event: IncomingEvent,
        state: &mut Connection,
        store: &mut SessionDataStore,
        queue: &mut OutboundQueue,
        callbacks: &mut CallbackTable,
    ) -> Result<()> {
        match event.event {
            Event::Initialized => state.on_initialized_event(),
            Event::Stopped => {
                let body: StoppedBody = serde_json::from_value(event.body.clone())?;
                store.invalidate_stacks();
                if body.all_threads_stopped.unwrap_or(false) {
                    store.set_all_threads_run_state(ThreadRunState::Stopped);
                } else if let Some(thread_id) = body.thread_id {
                    store.set_thread_run_state(thread_id, ThreadRunState::Stopped);
                }
                // A stop can add or remove threads (spec §9 supplement); the
                // thread list is cheap and every downstream fetch depends on
                // having current thread ids, so refresh it unconditionally.
                queue.enqueue(Command::Threads, Value::Null, Dependency::None, RetainedContext::None)?;
            }
            Event::Output => {
                let body: OutputBody = serde_json::from_value(event.body.clone())?;
                let category = match body.category.as_deref() {
                    Some("stdout") => OutputCategory::Stdout,
                    Some("stderr") => OutputCategory::Stderr,
                    Some("telemetry") => OutputCategory::Telemetry,
                    Some("important") => OutputCategory::Important,
                    Some("console") | None => OutputCategory::Console,
                    Some(_) => OutputCategory::Other,
                };
                store.push_output(category, body.output);
            }
            Event::Breakpoint => {
                let body: BreakpointEventBody = serde_json::from_value(event.body.clone())?;
                update_breakpoint_in_place(store, body.breakpoint);
            }
            Event::Module => {
                let body: ModuleEventBody = serde_json::from_value(event.body.clone())?;
                let key = module_key(&body.module.id);
                store.modules.insert(key, body.module);
            }
            Event::Continued => {
                let body: ContinuedBody = serde_json::from_value(event.body.clone())?;
                if body.all_threads_continued.unwrap_or(false) {
                    store.invalidate_stacks();
                    store.set_all_threads_run_state(ThreadRunState::Continued);
                } else {
                    if let Some(thread_state) = store.thread_state.get_mut(&body.thread_id) {
                        thread_state.stack_frames = None;
                    }
                    store.set_thread_run_state(body.thread_id, ThreadRunState::Continued);
                }
            }
            Event::ProgressStart | Event::ProgressUpdate | Event::ProgressEnd => {
                let body: ProgressEventBody = serde_json::from_value(event.body.clone())?;
                store.upsert_progress(ProgressEntry {
                    progress_id: body.progress_id,
                    label: body.title.unwrap_or_default(),
                    message: body.message,
                    percentage: body.percentage,
                    done: event.event == Event::ProgressEnd,
                });
            }
            Event::Invalidated => {
                let body: InvalidatedBody = serde_json::from_value(event.body.clone())?;
                if body.areas.is_empty() || body.areas.iter().any(|a| a == "variables") {
                    store.invalidate_variables();
                }
                if body.areas.iter().any(|a| a == "stacks") {
                    store.invalidate_stacks();
                }
            }
            Event::Exited | Event::Terminated => {
                // The session orchestrator decides whether to disconnect or
                // tear down the adapter process; the store simply stops
                // being trusted once the debuggee is gone.
                store.invalidate_stacks();
                store.invalidate_variables();
            }
            Event::Thread => {
                let body: ThreadEventBody = serde_json::from_value(event.body.clone())?;
                if body.reason == "exited" {
                    store.remove_thread(body.thread_id);
                } else {
                    queue.enqueue(Command::Threads, Value::Null, Dependency::None, RetainedContext::None)?;
                }
            }
            Event::Process | Event::Capabilities | Event::Memory => {}
        }

        callbacks.notify(CallbackKey::Event(event.event), serde_json::to_value(&event)?);
        Ok(())
    }
}

fn find_thread_for_frame(store: &SessionDataStore, frame_id: i64) -> Option<i64> {
    store
        .thread_state
        .iter()
        .find(|(_, state)| {
            state
                .stack_frames
                .as_ref()
                .is_some_and(|frames| frames.iter().any(|f| f.id == frame_id))
        })
        .map(|(id, _)| *id)
}

fn update_breakpoint_in_place(store: &mut SessionDataStore, updated: Breakpoint) {
    for breakpoints in store.breakpoints.values_mut() {
        if let Some(existing) = breakpoints.iter_mut().find(|b| b.id == updated.id) {
            *existing = updated;
            return;
        }
    }
    if let Some(existing) = store
        .function_breakpoints
        .iter_mut()
        .find(|b| b.id == updated.id)
    {
        *existing = updated;
    }
}

fn module_key(id: &Value) -> String {
    match id {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn breakpoints_source_key(body: &Value) -> Option<String> {
    body.get("source")
        .and_then(|s| s.get("path"))
        .and_then(Value::as_str)
        .map(str::to_string)
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ThreadsBody {
    threads: Vec<Thread>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct StackTraceBody {
    #[serde(default)]
    stack_frames: Vec<StackFrame>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ScopesBody {
    scopes: Vec<Scope>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct VariablesBody {
    variables: Vec<Variable>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SourceBody {
    content: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct BreakpointsBody {
    breakpoints: Vec<Breakpoint>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct OutputBody {
    #[serde(default)]
    category: Option<String>,
    output: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct BreakpointEventBody {
    breakpoint: Breakpoint,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ModuleEventBody {
    module: Module,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ContinuedBody {
    thread_id: i64,
    #[serde(default)]
    all_threads_continued: Option<bool>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoppedBody {
    #[serde(default)]
    thread_id: Option<i64>,
    #[serde(default)]
    all_threads_stopped: Option<bool>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ThreadEventBody {
    reason: String,
    thread_id: i64,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProgressEventBody {
    progress_id: String,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    percentage: Option<f64>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct InvalidatedBody {
    #[serde(default)]
    areas: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dap::capabilities::AdapterCapabilities;
    use crate::dap::queue::OutboundQueue;
    use serde_json::json;

    fn response(command: Command, body: Value) -> IncomingResponse {
        IncomingResponse {
            seq: 10,
            request_seq: 1,
            success: true,
            command,
            message: None,
            body,
        }
    }

    #[test]
    fn mismatched_command_is_rejected() {
        let mut state = Connection::new();
        let mut caps = AdapterCapabilities::default();
        let mut store = SessionDataStore::new();
        let mut queue = OutboundQueue::new();
        let mut callbacks = CallbackTable::new();
        let resp = response(Command::Threads, json!({ "threads": [] }));
        let result = ResponseHandler::handle_response(
            resp,
            Command::StackTrace,
            RetainedContext::None,
            &mut state,
            &mut caps,
            &mut store,
            &mut queue,
            &mut callbacks,
        );
        assert!(matches!(
            result,
            Err(Error::RequestResponseMismatch { .. })
        ));
    }

    #[test]
    fn failed_response_is_recorded_without_side_effects() {
        let mut state = Connection::new();
        let mut caps = AdapterCapabilities::default();
        let mut store = SessionDataStore::new();
        let mut queue = OutboundQueue::new();
        let mut callbacks = CallbackTable::new();
        let mut resp = response(Command::Threads, Value::Null);
        resp.success = false;
        resp.message = Some("boom".to_string());
        let handled = ResponseHandler::handle_response(
            resp,
            Command::Threads,
            RetainedContext::None,
            &mut state,
            &mut caps,
            &mut store,
            &mut queue,
            &mut callbacks,
        )
        .unwrap();
        assert_eq!(handled.status, ResponseStatus::Failure);
        assert!(store.threads.is_empty());
    }

    #[test]
    fn stack_trace_response_fans_out_scope_requests() {
        let mut state = Connection::new();
        let mut caps = AdapterCapabilities::default();
        let mut store = SessionDataStore::new();
        let mut queue = OutboundQueue::new();
        let mut callbacks = CallbackTable::new();
        let resp = response(
            Command::StackTrace,
            json!({ "stackFrames": [{ "id": 5, "name": "main", "line": 1, "column": 1 }] }),
        );
        ResponseHandler::handle_response(
            resp,
            Command::StackTrace,
            RetainedContext::StackTrace {
                thread_id: 1,
                also_fetch_scopes: true,
                also_fetch_variables: false,
            },
            &mut state,
            &mut caps,
            &mut store,
            &mut queue,
            &mut callbacks,
        )
        .unwrap();
        assert_eq!(queue.len(), 1);
        assert_eq!(
            store.thread_state.get(&1).unwrap().stack_frames.as_ref().unwrap().len(),
            1
        );
    }

    #[test]
    fn next_response_chains_stack_trace_and_marks_active_line() {
        let mut state = Connection::new();
        let mut caps = AdapterCapabilities::default();
        let mut store = SessionDataStore::new();
        let mut queue = OutboundQueue::new();
        let mut callbacks = CallbackTable::new();
        let resp = response(Command::Next, Value::Null);
        ResponseHandler::handle_response(
            resp,
            Command::Next,
            RetainedContext::Next {
                thread_id: 3,
                also_fetch_stack_trace: true,
                also_fetch_scopes: false,
                also_fetch_variables: false,
            },
            &mut state,
            &mut caps,
            &mut store,
            &mut queue,
            &mut callbacks,
        )
        .unwrap();
        assert_eq!(queue.len(), 1);
        let intent = store.take_ui_intent();
        assert_eq!(intent.scroll_to_active_line, Some(3));
        assert!(intent.update_active_source);
    }

    #[test]
    fn stopped_event_marks_thread_run_state_and_refreshes_threads() {
        let mut state = Connection::new();
        let mut store = SessionDataStore::new();
        let mut queue = OutboundQueue::new();
        let mut callbacks = CallbackTable::new();
        let event = IncomingEvent {
            seq: 1,
            event: Event::Stopped,
            body: json!({ "reason": "breakpoint", "threadId": 7, "allThreadsStopped": false }),
        };
        ResponseHandler::handle_event(event, &mut state, &mut store, &mut queue, &mut callbacks)
            .unwrap();
        assert_eq!(
            store.thread_state.get(&7).unwrap().run_state,
            crate::dap::store::ThreadRunState::Stopped
        );
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn thread_exited_event_removes_thread() {
        let mut state = Connection::new();
        let mut store = SessionDataStore::new();
        let mut queue = OutboundQueue::new();
        let mut callbacks = CallbackTable::new();
        store.set_threads(vec![Thread { id: 9, name: "worker".into() }]);
        let event = IncomingEvent {
            seq: 1,
            event: Event::Thread,
            body: json!({ "reason": "exited", "threadId": 9 }),
        };
        ResponseHandler::handle_event(event, &mut state, &mut store, &mut queue, &mut callbacks)
            .unwrap();
        assert!(!store.threads.contains_key(&9));
    }
}
