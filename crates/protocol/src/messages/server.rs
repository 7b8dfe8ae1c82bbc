//! Server -> client replicated state notifications.
//!
//! Every notification is level-triggered: it carries the full current value
//! of the state it describes, so a late-joining observer can reconstruct
//! session state from a single [`SessionSnapshot`] plus whatever arrives
//! after it.

use crate::{
    BinaryReader, BinaryWriter, GameMode, LobbyPhase, MatchmakingStrategy, ParticipantId, Pose,
    ProtocolError, RejectReason, Role, Team,
};
use bytes::Bytes;
use glam::{Quat, Vec3};

/// Per-participant state as replicated to observers.
#[derive(Debug, Clone, PartialEq)]
pub struct ParticipantEntry {
    pub participant_id: ParticipantId,
    pub role: Role,
    pub team: Option<Team>,
    pub team_slot: u8,
    pub ready: bool,
    pub connected: bool,
    pub is_host: bool,
}

/// Full session state, sent once to each newly admitted client.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSnapshot {
    pub phase: LobbyPhase,
    pub mode: Option<GameMode>,
    pub strategy: MatchmakingStrategy,
    pub host: Option<ParticipantId>,
    pub participants: Vec<ParticipantEntry>,
}

/// Replicated notification or reply.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerMessage {
    /// Admission denied; sent, flushed, then the connection is closed (0x10).
    Rejected { reason: RejectReason },
    /// Admission granted; carries the full current session state (0x11).
    Welcome { snapshot: SessionSnapshot },
    /// The lobby entered a new phase (0x12).
    PhaseChanged { phase: LobbyPhase },
    /// The game mode was derived or cleared (0x13).
    ModeChanged { mode: Option<GameMode> },
    /// The matchmaking strategy changed (0x14).
    StrategyChanged { strategy: MatchmakingStrategy },
    /// Host status moved to another participant, or lapsed (0x15).
    HostChanged { host: Option<ParticipantId> },
    /// Connected player and spectator headcounts (0x16).
    PlayerCount { players: u8, spectators: u8 },
    /// One participant's current team/ready/role state (0x17).
    ParticipantState(ParticipantEntry),
    /// A concrete spawn slot was reserved for a participant (0x18).
    SpawnGranted {
        participant_id: ParticipantId,
        pose: Pose,
    },
    /// A participant's spawn slot was released (0x19).
    SpawnRevoked { participant_id: ParticipantId },
    /// The running match lost too many players to continue (0x1A).
    CannotContinue,
}

fn put_pose(w: &mut BinaryWriter, pose: &Pose) {
    w.put_f32(pose.position.x);
    w.put_f32(pose.position.y);
    w.put_f32(pose.position.z);
    w.put_f32(pose.orientation.x);
    w.put_f32(pose.orientation.y);
    w.put_f32(pose.orientation.z);
    w.put_f32(pose.orientation.w);
}

fn read_pose(r: &mut BinaryReader) -> Result<Pose, ProtocolError> {
    let position = Vec3::new(r.read_f32()?, r.read_f32()?, r.read_f32()?);
    let orientation = Quat::from_xyzw(r.read_f32()?, r.read_f32()?, r.read_f32()?, r.read_f32()?);
    Ok(Pose {
        position,
        orientation,
    })
}

fn put_entry(w: &mut BinaryWriter, entry: &ParticipantEntry) {
    w.put_string(&entry.participant_id);
    w.put_u8(entry.role.as_u8());
    w.put_u8(Team::code(entry.team));
    w.put_u8(entry.team_slot);
    w.put_bool(entry.ready);
    w.put_bool(entry.connected);
    w.put_bool(entry.is_host);
}

fn read_entry(r: &mut BinaryReader) -> Result<ParticipantEntry, ProtocolError> {
    let participant_id = r.read_string()?;
    let role_raw = r.read_u8()?;
    let role = Role::from_u8(role_raw).ok_or(ProtocolError::InvalidValue {
        field: "role",
        value: role_raw,
    })?;
    let team_raw = r.read_u8()?;
    let team = Team::from_code(team_raw).ok_or(ProtocolError::InvalidValue {
        field: "team",
        value: team_raw,
    })?;
    Ok(ParticipantEntry {
        participant_id,
        role,
        team,
        team_slot: r.read_u8()?,
        ready: r.read_bool()?,
        connected: r.read_bool()?,
        is_host: r.read_bool()?,
    })
}

fn put_opt_id(w: &mut BinaryWriter, id: &Option<ParticipantId>) {
    match id {
        Some(id) => {
            w.put_bool(true);
            w.put_string(id);
        }
        None => w.put_bool(false),
    }
}

fn read_opt_id(r: &mut BinaryReader) -> Result<Option<ParticipantId>, ProtocolError> {
    if r.read_bool()? {
        Ok(Some(r.read_string()?))
    } else {
        Ok(None)
    }
}

impl ServerMessage {
    /// Encode this notification into one binary frame.
    pub fn encode(&self) -> Bytes {
        let mut w = BinaryWriter::new();
        match self {
            ServerMessage::Rejected { reason } => {
                w.put_u8(0x10);
                w.put_u8(reason.as_u8());
            }
            ServerMessage::Welcome { snapshot } => {
                w.put_u8(0x11);
                w.put_u8(snapshot.phase.as_u8());
                w.put_u8(GameMode::code(snapshot.mode));
                w.put_u8(snapshot.strategy.as_u8());
                put_opt_id(&mut w, &snapshot.host);
                w.put_u16(snapshot.participants.len() as u16);
                for entry in &snapshot.participants {
                    put_entry(&mut w, entry);
                }
            }
            ServerMessage::PhaseChanged { phase } => {
                w.put_u8(0x12);
                w.put_u8(phase.as_u8());
            }
            ServerMessage::ModeChanged { mode } => {
                w.put_u8(0x13);
                w.put_u8(GameMode::code(*mode));
            }
            ServerMessage::StrategyChanged { strategy } => {
                w.put_u8(0x14);
                w.put_u8(strategy.as_u8());
            }
            ServerMessage::HostChanged { host } => {
                w.put_u8(0x15);
                put_opt_id(&mut w, host);
            }
            ServerMessage::PlayerCount {
                players,
                spectators,
            } => {
                w.put_u8(0x16);
                w.put_u8(*players);
                w.put_u8(*spectators);
            }
            ServerMessage::ParticipantState(entry) => {
                w.put_u8(0x17);
                put_entry(&mut w, entry);
            }
            ServerMessage::SpawnGranted {
                participant_id,
                pose,
            } => {
                w.put_u8(0x18);
                w.put_string(participant_id);
                put_pose(&mut w, pose);
            }
            ServerMessage::SpawnRevoked { participant_id } => {
                w.put_u8(0x19);
                w.put_string(participant_id);
            }
            ServerMessage::CannotContinue => w.put_u8(0x1A),
        }
        w.finish()
    }

    /// Parse a notification from one binary frame.
    pub fn parse(data: &[u8]) -> Result<Self, ProtocolError> {
        let mut r = BinaryReader::new(data.to_vec());
        let opcode = r.read_u8()?;

        match opcode {
            0x10 => {
                let raw = r.read_u8()?;
                let reason = RejectReason::from_u8(raw).ok_or(ProtocolError::InvalidValue {
                    field: "reason",
                    value: raw,
                })?;
                Ok(ServerMessage::Rejected { reason })
            }
            0x11 => {
                let phase_raw = r.read_u8()?;
                let phase = LobbyPhase::from_u8(phase_raw).ok_or(ProtocolError::InvalidValue {
                    field: "phase",
                    value: phase_raw,
                })?;
                let mode_raw = r.read_u8()?;
                let mode = GameMode::from_code(mode_raw).ok_or(ProtocolError::InvalidValue {
                    field: "mode",
                    value: mode_raw,
                })?;
                let strategy_raw = r.read_u8()?;
                let strategy = MatchmakingStrategy::from_u8(strategy_raw).ok_or(
                    ProtocolError::InvalidValue {
                        field: "strategy",
                        value: strategy_raw,
                    },
                )?;
                let host = read_opt_id(&mut r)?;
                let count = r.read_u16()? as usize;
                let mut participants = Vec::with_capacity(count);
                for _ in 0..count {
                    participants.push(read_entry(&mut r)?);
                }
                Ok(ServerMessage::Welcome {
                    snapshot: SessionSnapshot {
                        phase,
                        mode,
                        strategy,
                        host,
                        participants,
                    },
                })
            }
            0x12 => {
                let raw = r.read_u8()?;
                let phase = LobbyPhase::from_u8(raw).ok_or(ProtocolError::InvalidValue {
                    field: "phase",
                    value: raw,
                })?;
                Ok(ServerMessage::PhaseChanged { phase })
            }
            0x13 => {
                let raw = r.read_u8()?;
                let mode = GameMode::from_code(raw).ok_or(ProtocolError::InvalidValue {
                    field: "mode",
                    value: raw,
                })?;
                Ok(ServerMessage::ModeChanged { mode })
            }
            0x14 => {
                let raw = r.read_u8()?;
                let strategy =
                    MatchmakingStrategy::from_u8(raw).ok_or(ProtocolError::InvalidValue {
                        field: "strategy",
                        value: raw,
                    })?;
                Ok(ServerMessage::StrategyChanged { strategy })
            }
            0x15 => Ok(ServerMessage::HostChanged {
                host: read_opt_id(&mut r)?,
            }),
            0x16 => Ok(ServerMessage::PlayerCount {
                players: r.read_u8()?,
                spectators: r.read_u8()?,
            }),
            0x17 => Ok(ServerMessage::ParticipantState(read_entry(&mut r)?)),
            0x18 => Ok(ServerMessage::SpawnGranted {
                participant_id: r.read_string()?,
                pose: read_pose(&mut r)?,
            }),
            0x19 => Ok(ServerMessage::SpawnRevoked {
                participant_id: r.read_string()?,
            }),
            0x1A => Ok(ServerMessage::CannotContinue),
            other => Err(ProtocolError::InvalidOpcode(other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_welcome_roundtrip() {
        let msg = ServerMessage::Welcome {
            snapshot: SessionSnapshot {
                phase: LobbyPhase::ReadyCheck,
                mode: Some(GameMode::Doubles),
                strategy: MatchmakingStrategy::Auto,
                host: Some("P1".to_string()),
                participants: vec![ParticipantEntry {
                    participant_id: "P1".to_string(),
                    role: Role::Player,
                    team: Some(Team::A),
                    team_slot: 1,
                    ready: true,
                    connected: true,
                    is_host: true,
                }],
            },
        };
        assert_eq!(ServerMessage::parse(&msg.encode()).unwrap(), msg);
    }

    #[test]
    fn test_spawn_granted_roundtrip() {
        let msg = ServerMessage::SpawnGranted {
            participant_id: "P2".to_string(),
            pose: Pose::from_yaw_degrees(Vec3::new(1.0, 0.0, -2.5), 90.0),
        };
        assert_eq!(ServerMessage::parse(&msg.encode()).unwrap(), msg);
    }
}
