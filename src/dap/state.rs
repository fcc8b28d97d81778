//! Connection state machine (spec §4.4).

use super::message::Command;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    NotSpawned,
    Spawned,
    Initializing,
    PartiallyInitialized,
    Launched,
    Attached,
    /// Reached only via a successful `disconnect` response: the debuggee is
    /// gone but the adapter process may still be reachable for `wait()`.
    Initialized,
}

/// How the session was started, so `Launched`/`Attached` can be told apart
/// even after the `initialized` event would otherwise have collapsed them
/// (spec §9 Open Question: treat `initialized` as an orthogonal flag, not a
/// state replacement).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LaunchKind {
    Launch,
    Attach,
}

#[derive(Debug)]
pub struct Connection {
    state: ConnectionState,
    launch_kind: Option<LaunchKind>,
    /// Set once the `initialized` event has been observed. Orthogonal to
    /// `state` so a late `initialized` event doesn't clobber which of
    /// `Launched`/`Attached` we reached.
    initialized_event: bool,
    initialize_sent: bool,
}

impl Default for Connection {
    fn default() -> Self {
        Self::new()
    }
}

impl Connection {
    pub fn new() -> Self {
        Self {
            state: ConnectionState::NotSpawned,
            launch_kind: None,
            initialized_event: false,
            initialize_sent: false,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn initialized_event_observed(&self) -> bool {
        self.initialized_event
    }

    /// `fully_initialized ⇔ state ∈ {initialized, launched, attached}` (spec §3).
    pub fn fully_initialized(&self) -> bool {
        matches!(
            self.state,
            ConnectionState::Launched | ConnectionState::Attached | ConnectionState::Initialized
        )
    }

    pub fn spawn(&mut self) -> Result<(), crate::error::Error> {
        if self.state != ConnectionState::NotSpawned {
            return Err(crate::error::Error::AdapterAlreadySpawned);
        }
        self.state = ConnectionState::Spawned;
        Ok(())
    }

    /// Whether `command` may leave the queue given the CURRENT state alone
    /// (the capability gate is a separate, independent check).
    ///
    /// `configurationDone` is permitted as soon as the `initialized` event
    /// has been observed, independent of whether the launch/attach response
    /// has arrived yet: the canonical handshake (spec §4.8, §8 scenario 1)
    /// sends it between the `initialized` event and that response — a
    /// standard adapter holds its launch/attach response until
    /// `configurationDone` lands, so gating this on `fully_initialized()`
    /// (which requires `Launched`/`Attached` already) would deadlock.
    pub fn permits(&self, command: Command) -> bool {
        use Command::*;
        match command {
            Initialize => self.state == ConnectionState::Spawned && !self.initialize_sent,
            Launch | Attach => self.state == ConnectionState::PartiallyInitialized,
            ConfigurationDone => {
                self.initialized_event
                    && matches!(
                        self.state,
                        ConnectionState::PartiallyInitialized
                            | ConnectionState::Launched
                            | ConnectionState::Attached
                    )
            }
            _ => self.fully_initialized(),
        }
    }

    pub fn on_request_sent(&mut self, command: Command) {
        match command {
            Command::Initialize => {
                self.initialize_sent = true;
                self.state = ConnectionState::Initializing;
            }
            _ => {}
        }
    }

    pub fn on_initialize_response(&mut self) {
        self.state = ConnectionState::PartiallyInitialized;
    }

    pub fn on_launch_response(&mut self) {
        self.launch_kind = Some(LaunchKind::Launch);
        self.state = ConnectionState::Launched;
    }

    pub fn on_attach_response(&mut self) {
        self.launch_kind = Some(LaunchKind::Attach);
        self.state = ConnectionState::Attached;
    }

    pub fn on_initialized_event(&mut self) {
        self.initialized_event = true;
    }

    pub fn on_disconnect_response(&mut self) {
        self.state = ConnectionState::Initialized;
    }

    /// `wait()` returning the adapter's exit code resets the connection so
    /// it could, in principle, spawn a fresh adapter (spec §4.4, scenario 5).
    pub fn on_adapter_exited(&mut self) {
        self.state = ConnectionState::NotSpawned;
        self.launch_kind = None;
        self.initialized_event = false;
        self.initialize_sent = false;
    }
}
