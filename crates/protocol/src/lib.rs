//! Shared protocol crate for the rally match server.
//!
//! This crate contains:
//! - Binary reading/writing utilities
//! - Session message definitions and codecs
//! - Shared types (Team, Role, LobbyPhase, Pose, etc.)

mod binary;
mod error;
pub mod messages;

pub use binary::{BinaryReader, BinaryWriter};
pub use error::ProtocolError;

/// Transient connection handle assigned by the server accept loop.
pub type ConnectionId = u32;

/// Stable participant identity, survives reconnection.
pub type ParticipantId = String;

/// Maximum size of a connection hello payload. Anything larger is rejected
/// before deserialization is attempted.
pub const MAX_HELLO_PAYLOAD: usize = 1024;

/// Whether a participant plays or watches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Player,
    Spectator,
}

impl Role {
    pub fn as_u8(self) -> u8 {
        match self {
            Role::Player => 0,
            Role::Spectator => 1,
        }
    }

    pub fn from_u8(val: u8) -> Option<Self> {
        match val {
            0 => Some(Role::Player),
            1 => Some(Role::Spectator),
            _ => None,
        }
    }
}

/// One of the two match sides. Spectators use this as their viewing side.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Team {
    A,
    B,
}

impl Team {
    pub fn opposite(self) -> Team {
        match self {
            Team::A => Team::B,
            Team::B => Team::A,
        }
    }

    /// Encode an optional team as a single byte (0 = unassigned).
    pub fn code(team: Option<Team>) -> u8 {
        match team {
            None => 0,
            Some(Team::A) => 1,
            Some(Team::B) => 2,
        }
    }

    /// Decode the byte produced by [`Team::code`]. `None` means the byte
    /// was out of range, `Some(None)` means "unassigned".
    pub fn from_code(val: u8) -> Option<Option<Team>> {
        match val {
            0 => Some(None),
            1 => Some(Some(Team::A)),
            2 => Some(Some(Team::B)),
            _ => None,
        }
    }
}

/// Top-level session state machine phases.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LobbyPhase {
    WaitingForPlayers,
    ModeSelection,
    TeamBalancing,
    ReadyCheck,
    GameStarting,
    InGame,
    PostGame,
}

impl LobbyPhase {
    pub fn as_u8(self) -> u8 {
        match self {
            LobbyPhase::WaitingForPlayers => 0,
            LobbyPhase::ModeSelection => 1,
            LobbyPhase::TeamBalancing => 2,
            LobbyPhase::ReadyCheck => 3,
            LobbyPhase::GameStarting => 4,
            LobbyPhase::InGame => 5,
            LobbyPhase::PostGame => 6,
        }
    }

    pub fn from_u8(val: u8) -> Option<Self> {
        match val {
            0 => Some(LobbyPhase::WaitingForPlayers),
            1 => Some(LobbyPhase::ModeSelection),
            2 => Some(LobbyPhase::TeamBalancing),
            3 => Some(LobbyPhase::ReadyCheck),
            4 => Some(LobbyPhase::GameStarting),
            5 => Some(LobbyPhase::InGame),
            6 => Some(LobbyPhase::PostGame),
            _ => None,
        }
    }
}

/// Match variant: one or two players per side.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GameMode {
    Singles,
    Doubles,
}

impl GameMode {
    /// Minimum player headcount required to run this mode.
    pub fn min_players(self) -> usize {
        match self {
            GameMode::Singles => 2,
            GameMode::Doubles => 4,
        }
    }

    /// Number of team seats this mode fills.
    pub fn seats(self) -> usize {
        match self {
            GameMode::Singles => 2,
            GameMode::Doubles => 4,
        }
    }

    /// Encode an optional mode as a single byte (0 = undecided).
    pub fn code(mode: Option<GameMode>) -> u8 {
        match mode {
            None => 0,
            Some(GameMode::Singles) => 1,
            Some(GameMode::Doubles) => 2,
        }
    }

    pub fn from_code(val: u8) -> Option<Option<GameMode>> {
        match val {
            0 => Some(None),
            1 => Some(Some(GameMode::Singles)),
            2 => Some(Some(GameMode::Doubles)),
            _ => None,
        }
    }
}

/// How the session decides which game mode to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchmakingStrategy {
    /// Derive the mode from the player count after a fixed delay.
    Auto,
    ForcedSingles,
    ForcedDoubles,
}

impl MatchmakingStrategy {
    pub fn as_u8(self) -> u8 {
        match self {
            MatchmakingStrategy::Auto => 0,
            MatchmakingStrategy::ForcedSingles => 1,
            MatchmakingStrategy::ForcedDoubles => 2,
        }
    }

    pub fn from_u8(val: u8) -> Option<Self> {
        match val {
            0 => Some(MatchmakingStrategy::Auto),
            1 => Some(MatchmakingStrategy::ForcedSingles),
            2 => Some(MatchmakingStrategy::ForcedDoubles),
            _ => None,
        }
    }
}

/// Reason a connection request was turned away.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    PayloadTooLarge,
    PlayerSlotsFull,
    SpectatorSlotsFull,
    DuplicateIdentity,
}

impl RejectReason {
    pub fn as_u8(self) -> u8 {
        match self {
            RejectReason::PayloadTooLarge => 0,
            RejectReason::PlayerSlotsFull => 1,
            RejectReason::SpectatorSlotsFull => 2,
            RejectReason::DuplicateIdentity => 3,
        }
    }

    pub fn from_u8(val: u8) -> Option<Self> {
        match val {
            0 => Some(RejectReason::PayloadTooLarge),
            1 => Some(RejectReason::PlayerSlotsFull),
            2 => Some(RejectReason::SpectatorSlotsFull),
            3 => Some(RejectReason::DuplicateIdentity),
            _ => None,
        }
    }
}

/// A world position plus facing, granted to a participant when a spawn
/// slot is reserved for them.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pose {
    pub position: glam::Vec3,
    pub orientation: glam::Quat,
}

impl Pose {
    pub const IDENTITY: Pose = Pose {
        position: glam::Vec3::ZERO,
        orientation: glam::Quat::IDENTITY,
    };

    /// Build a pose from a position and a yaw around the vertical axis.
    pub fn from_yaw_degrees(position: glam::Vec3, yaw_degrees: f32) -> Self {
        Self {
            position,
            orientation: glam::Quat::from_rotation_y(yaw_degrees.to_radians()),
        }
    }
}
