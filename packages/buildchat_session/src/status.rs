//! Session Status
//!
//! The status state machine owned by the session controller. Signals come
//! from three places: the controller itself (connect attempts, local sends),
//! the transport (close), and the server (environment status reports).

use serde::{Deserialize, Serialize};

/// Coarse status of the session as shown to the user.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionStatus {
    /// No server-side session exists yet
    #[default]
    NewChat,

    /// A transport is being opened
    Connecting,

    /// The environment is booting (short wait)
    Building,

    /// The environment is booting from cold (long wait)
    BuildingWaiting,

    /// Idle and accepting prompts
    Ready,

    /// The agent is producing a reply
    Working,

    /// The agent is writing its changes into the project
    WorkingApplying,

    /// The transport is gone; waiting for an explicit reconnect
    Disconnected,

    /// The environment reported itself offline
    Offline,
}

/// Environment states a `status` event may report.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EnvironmentStatus {
    Booting,
    BootingCold,
    Ready,
    Working,
    Applying,
    Offline,
}

impl EnvironmentStatus {
    /// Parse a `sandbox_status` wire value. Unknown values yield `None`
    /// and must not cause a transition.
    pub fn from_wire(value: &str) -> Option<Self> {
        match value {
            "BUILDING" => Some(Self::Booting),
            "BUILDING_WAITING" => Some(Self::BootingCold),
            "READY" => Some(Self::Ready),
            "WORKING" => Some(Self::Working),
            "WORKING_APPLYING" => Some(Self::Applying),
            "OFFLINE" => Some(Self::Offline),
            _ => None,
        }
    }
}

/// Inputs to the status machine.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StatusSignal {
    /// A transport open was started (attach, reconnect or auto-reconnect)
    ConnectStarted,

    /// The transport never opened, or timed out
    ConnectFailed,

    /// The transport closed, with any code
    TransportClosed,

    /// The server reported an environment status
    Environment(EnvironmentStatus),

    /// The user sent a prompt
    UserMessageSent,

    /// The controller let go of its session
    Detached,
}

impl SessionStatus {
    /// Apply a signal and return the next status. Signals that do not apply
    /// in the current status leave it unchanged.
    pub fn next(self, signal: StatusSignal) -> SessionStatus {
        match signal {
            StatusSignal::ConnectStarted => SessionStatus::Connecting,
            StatusSignal::ConnectFailed | StatusSignal::TransportClosed => {
                SessionStatus::Disconnected
            }
            StatusSignal::Environment(env) => match env {
                EnvironmentStatus::Booting => SessionStatus::Building,
                EnvironmentStatus::BootingCold => SessionStatus::BuildingWaiting,
                EnvironmentStatus::Ready => SessionStatus::Ready,
                EnvironmentStatus::Working => SessionStatus::Working,
                EnvironmentStatus::Applying => SessionStatus::WorkingApplying,
                EnvironmentStatus::Offline => SessionStatus::Offline,
            },
            StatusSignal::UserMessageSent if self.accepts_input() => SessionStatus::Working,
            StatusSignal::UserMessageSent => self,
            StatusSignal::Detached => SessionStatus::NewChat,
        }
    }

    /// Whether a prompt may be sent in this status.
    pub fn accepts_input(self) -> bool {
        matches!(self, SessionStatus::NewChat | SessionStatus::Ready)
    }

    /// Whether the agent is busy with a turn.
    pub fn is_working(self) -> bool {
        matches!(self, SessionStatus::Working | SessionStatus::WorkingApplying)
    }

    /// Whether the environment is still being prepared.
    pub fn is_booting(self) -> bool {
        matches!(
            self,
            SessionStatus::Building | SessionStatus::BuildingWaiting | SessionStatus::Offline
        )
    }

    /// Short label for the status indicator.
    pub fn label(self) -> &'static str {
        match self {
            SessionStatus::NewChat | SessionStatus::Ready => "Ready",
            SessionStatus::Disconnected => "Disconnected",
            SessionStatus::Offline => "Offline",
            SessionStatus::Building => "Setting up (~1m)",
            SessionStatus::BuildingWaiting => "Setting up (~3m)",
            SessionStatus::Working => "Coding...",
            SessionStatus::WorkingApplying => "Applying...",
            SessionStatus::Connecting => "Connecting...",
        }
    }

    /// Whether the indicator should pulse.
    pub fn is_animated(self) -> bool {
        matches!(
            self,
            SessionStatus::Building
                | SessionStatus::BuildingWaiting
                | SessionStatus::Working
                | SessionStatus::WorkingApplying
                | SessionStatus::Connecting
        )
    }

    /// Why the prompt input is disabled, if it is.
    pub fn input_blocked_reason(self) -> Option<&'static str> {
        match self {
            SessionStatus::NewChat | SessionStatus::Ready => None,
            SessionStatus::Working => Some("Please wait for the AI to finish..."),
            SessionStatus::WorkingApplying => {
                Some("Please wait for the changes to be applied...")
            }
            SessionStatus::Building | SessionStatus::BuildingWaiting => {
                Some("Please wait while the development environment is being set up...")
            }
            SessionStatus::Connecting
            | SessionStatus::Disconnected
            | SessionStatus::Offline => Some("Chat is temporarily unavailable"),
        }
    }
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}
