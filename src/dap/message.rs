use serde::{Deserialize, Serialize};
use serde_json::Value;
use strum_macros::{Display, EnumString};

/// The closed set of DAP request kinds this client may enqueue.
///
/// `RunInTerminal` and `StartDebugging` are recognized when parsed off the
/// wire (they arrive as reverse requests, sent by the adapter) but are
/// never constructed as outbound requests here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize)]
#[strum(serialize_all = "camelCase")]
#[serde(rename_all = "camelCase")]
pub enum Command {
    Initialize,
    Launch,
    Attach,
    Disconnect,
    Terminate,
    ConfigurationDone,
    Threads,
    StackTrace,
    Scopes,
    Variables,
    Source,
    Next,
    StepIn,
    StepOut,
    Continue,
    Pause,
    SetBreakpoints,
    SetFunctionBreakpoints,
    SetInstructionBreakpoints,
    SetExceptionBreakpoints,
    Evaluate,
    ReadMemory,
    WriteMemory,
    Disassemble,
    SetVariable,
    SetExpression,
    Restart,
    RestartFrame,
    Goto,
    GotoTargets,
    StepInTargets,
    Completions,
    Modules,
    LoadedSources,
    BreakpointLocations,
    Locations,
    ExceptionInfo,
    DataBreakpointInfo,
    SetDataBreakpoints,
    TerminateThreads,
    Cancel,
    StepBack,
    ReverseContinue,
    /// Reverse request: adapter -> client. Recognized on input, never enqueued.
    RunInTerminal,
    /// Reverse request: adapter -> client. Recognized on input, never enqueued.
    StartDebugging,
}

impl Command {
    /// True for the two reverse requests this client never sends itself.
    pub fn is_reverse(self) -> bool {
        matches!(self, Command::RunInTerminal | Command::StartDebugging)
    }
}

/// The closed set of DAP event kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize)]
#[strum(serialize_all = "camelCase")]
#[serde(rename_all = "camelCase")]
pub enum Event {
    Initialized,
    Stopped,
    Continued,
    Exited,
    Terminated,
    Thread,
    Output,
    Breakpoint,
    Module,
    LoadedSource,
    Process,
    Capabilities,
    ProgressStart,
    ProgressUpdate,
    ProgressEnd,
    Invalidated,
    Memory,
}

/// Outbound request envelope, as written to the adapter's stdin.
#[derive(Debug, Clone, Serialize)]
pub struct OutgoingRequest {
    pub seq: u32,
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub command: Command,
    #[serde(skip_serializing_if = "Value::is_null")]
    pub arguments: Value,
}

impl OutgoingRequest {
    pub fn new(seq: u32, command: Command, arguments: Value) -> Self {
        Self {
            seq,
            kind: "request",
            command,
            arguments,
        }
    }
}

/// Inbound response envelope, as read from the adapter's stdout.
///
/// Also `Serialize` so the callback table can hand a caller back the raw
/// message it fired on (spec §6: "each callback is one-shot and receives
/// the raw message").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IncomingResponse {
    pub seq: u32,
    pub request_seq: u32,
    pub success: bool,
    pub command: Command,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub body: Value,
}

/// Inbound event envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IncomingEvent {
    pub seq: u32,
    pub event: Event,
    #[serde(default)]
    pub body: Value,
}

/// A reverse request sent by the adapter (`runInTerminal`, `startDebugging`).
#[derive(Debug, Clone, Deserialize)]
pub struct IncomingReverseRequest {
    pub seq: u32,
    pub command: Command,
    #[serde(default)]
    pub arguments: Value,
}

/// A frame read off the wire, classified by its `type` field.
#[derive(Debug, Clone)]
pub enum IncomingMessage {
    Response(IncomingResponse),
    Event(IncomingEvent),
    ReverseRequest(IncomingReverseRequest),
}

impl IncomingMessage {
    /// Parse a raw JSON value into a classified inbound message.
    ///
    /// Anything without a string `type` field of `response`, `event`, or
    /// `request` is an `invalid-message` protocol error (spec §4.6).
    pub fn parse(raw: Value) -> Result<Self, crate::error::Error> {
        let kind = raw
            .get("type")
            .and_then(Value::as_str)
            .ok_or_else(|| crate::error::Error::InvalidMessage(raw.to_string()))?;

        match kind {
            "response" => {
                let resp: IncomingResponse = serde_json::from_value(raw)?;
                Ok(IncomingMessage::Response(resp))
            }
            "event" => {
                let event: IncomingEvent = serde_json::from_value(raw)?;
                Ok(IncomingMessage::Event(event))
            }
            "request" => {
                let req: IncomingReverseRequest = serde_json::from_value(raw)?;
                Ok(IncomingMessage::ReverseRequest(req))
            }
            other => Err(crate::error::Error::InvalidMessage(format!(
                "unknown message type `{other}`"
            ))),
        }
    }
}
