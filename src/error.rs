use crate::dap::message::Command;

/// Error taxonomy for the protocol engine (spec §7).
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),

    /// Framing, JSON, or schema violation on the wire. Fatal.
    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("adapter process has not been spawned yet")]
    AdapterNotSpawned,
    #[error("adapter process is already spawned")]
    AdapterAlreadySpawned,

    /// Send attempted while the connection is in a state that forbids
    /// `command`; the request stays queued and is retried on the next tick.
    #[error("adapter has not finished initializing, cannot send `{0:?}` yet")]
    AdapterNotDoneInitializing(Command),

    /// Capability gate rejected `command`.
    #[error("adapter does not support request `{0:?}`")]
    AdapterDoesNotSupportRequest(Command),

    /// Reported per-request by `drain`; non-fatal, retried next tick.
    #[error("dependency not satisfied for request seq {0}")]
    DependencyNotSatisfied(u32),

    /// The adapter answered `success: false`.
    #[error("adapter reported failure for request seq {request_seq} (`{command:?}`): {message}")]
    RequestFailed {
        request_seq: u32,
        command: Command,
        message: String,
    },

    /// `request_seq` or `command` disagreement between an expected response
    /// and the one that arrived. Fatal.
    #[error(
        "response for seq {request_seq} does not match expected command `{expected:?}` (got `{got:?}`)"
    )]
    RequestResponseMismatch {
        request_seq: u32,
        expected: Command,
        got: Command,
    },

    #[error("no response queued for request seq {0}")]
    ResponseDoesNotExist(u32),
    #[error("no event named `{0}` queued")]
    EventDoesNotExist(String),

    #[error("session has not been started (begin_session was never called)")]
    SessionNotStarted,

    #[error("at most one `initialize` request may be sent per connection lifetime")]
    InitializeAlreadySent,

    #[error("sequence counter overflowed")]
    SeqOverflow,

    #[error("unrecognized DAP message: {0}")]
    InvalidMessage(String),
}

impl Error {
    /// Whether the session should be torn down after this error, mirroring
    /// the teacher's `Error::is_fatal` classifier.
    pub fn is_fatal(&self) -> bool {
        match self {
            Error::Protocol(_) => true,
            Error::RequestResponseMismatch { .. } => true,
            Error::SeqOverflow => true,
            Error::Io(_) => true,

            Error::Json(_)
            | Error::AdapterNotSpawned
            | Error::AdapterAlreadySpawned
            | Error::AdapterNotDoneInitializing(_)
            | Error::AdapterDoesNotSupportRequest(_)
            | Error::DependencyNotSatisfied(_)
            | Error::RequestFailed { .. }
            | Error::ResponseDoesNotExist(_)
            | Error::EventDoesNotExist(_)
            | Error::SessionNotStarted
            | Error::InitializeAlreadySent
            | Error::InvalidMessage(_) => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
