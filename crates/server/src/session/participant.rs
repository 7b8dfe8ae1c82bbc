//! Participant session state.

use glam::Vec3;
use protocol::messages::ParticipantEntry;
use protocol::{ConnectionId, ParticipantId, Role, Team};

/// One tracked participant. Created on first admission, kept across
/// disconnects so a returning client resumes its previous state.
#[derive(Debug, Clone)]
pub struct ParticipantRecord {
    /// Stable identity, unique key across the session.
    pub participant_id: ParticipantId,
    /// Current transient connection handle; `None` while disconnected.
    pub connection_id: Option<ConnectionId>,
    pub connected: bool,
    pub role: Role,
    /// Assigned team, or the viewing side for spectators.
    pub team: Option<Team>,
    /// 0 = primary, 1 = secondary; meaningful only for doubles.
    pub team_slot: u8,
    pub ready: bool,
    pub is_host: bool,
    /// Index of the currently reserved spawn slot.
    pub spawn_slot: Option<usize>,
    /// Seat held before the most recent disconnect, tried first on
    /// reconnection.
    pub last_slot: Option<usize>,
    /// Last observed world position, biases re-spawn side on reconnect.
    pub last_known_position: Option<Vec3>,
    /// Rating used to order players during team balancing.
    pub skill_rating: f32,
    /// Winner-side flag, set only while the lobby is in post-game.
    pub post_game_winner: bool,
}

impl ParticipantRecord {
    /// Create a fresh record for a never-seen participant.
    pub fn new(
        participant_id: ParticipantId,
        connection_id: ConnectionId,
        role: Role,
        skill_rating: f32,
    ) -> Self {
        Self {
            participant_id,
            connection_id: Some(connection_id),
            connected: true,
            role,
            team: None,
            team_slot: 0,
            ready: false,
            is_host: false,
            spawn_slot: None,
            last_slot: None,
            last_known_position: None,
            skill_rating,
            post_game_winner: false,
        }
    }

    /// Connected and playing (not spectating).
    pub fn is_active_player(&self) -> bool {
        self.connected && self.role == Role::Player
    }

    /// Connected player holding a team seat.
    pub fn is_assigned_player(&self) -> bool {
        self.is_active_player() && self.team.is_some()
    }

    /// Spectators are implicitly always ready.
    pub fn counts_ready(&self) -> bool {
        self.role == Role::Spectator || self.ready
    }

    /// Wire-level view of this record.
    pub fn entry(&self) -> ParticipantEntry {
        ParticipantEntry {
            participant_id: self.participant_id.clone(),
            role: self.role,
            team: self.team,
            team_slot: self.team_slot,
            ready: self.ready,
            connected: self.connected,
            is_host: self.is_host,
        }
    }
}
