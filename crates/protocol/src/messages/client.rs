//! Client -> server session requests.

use crate::{BinaryReader, BinaryWriter, MatchmakingStrategy, ProtocolError, Role, Team};
use bytes::Bytes;

/// Payload of the first frame a client sends after the transport handshake.
#[derive(Debug, Clone, PartialEq)]
pub struct Hello {
    /// Stable identity; a returning client presents the same id to resume
    /// its previous seat, team and readiness.
    pub participant_id: String,
    /// Requested role.
    pub role: Role,
    /// Set by the local operator's client; grants host status only while
    /// no other connected participant holds it.
    pub host_candidate: bool,
    /// Rating used to order players during team balancing.
    pub skill_rating: f32,
}

/// Parsed client request.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientMessage {
    /// Identify and request admission (0x01).
    Hello(Hello),
    /// Flip the ready flag during the ready check (0x02).
    SetReady { ready: bool },
    /// Change the matchmaking strategy; host only (0x03).
    SetStrategy { strategy: MatchmakingStrategy },
    /// Move to the other side's spectator area (0x04).
    SwitchSpectatorSide,
    /// Switch between playing and spectating (0x05).
    SwitchRole { to_spectator: bool },
    /// Gameplay signal: the match is underway; host only (0x06).
    MatchStarted,
    /// Gameplay signal: the match finished; host only (0x07).
    MatchEnded { winner: Team },
    /// Leave the post-game podium and return to the lobby; host only (0x08).
    ReturnToLobby,
}

impl ClientMessage {
    /// Parse a client request from one binary frame.
    pub fn parse(data: &[u8]) -> Result<Self, ProtocolError> {
        let mut reader = BinaryReader::new(data.to_vec());
        let opcode = reader.read_u8()?;

        match opcode {
            0x01 => {
                let participant_id = reader.read_string()?;
                let role_raw = reader.read_u8()?;
                let role = Role::from_u8(role_raw).ok_or(ProtocolError::InvalidValue {
                    field: "role",
                    value: role_raw,
                })?;
                let host_candidate = reader.read_bool()?;
                let skill_rating = reader.read_f32()?;
                Ok(ClientMessage::Hello(Hello {
                    participant_id,
                    role,
                    host_candidate,
                    skill_rating,
                }))
            }
            0x02 => Ok(ClientMessage::SetReady {
                ready: reader.read_bool()?,
            }),
            0x03 => {
                let raw = reader.read_u8()?;
                let strategy =
                    MatchmakingStrategy::from_u8(raw).ok_or(ProtocolError::InvalidValue {
                        field: "strategy",
                        value: raw,
                    })?;
                Ok(ClientMessage::SetStrategy { strategy })
            }
            0x04 => Ok(ClientMessage::SwitchSpectatorSide),
            0x05 => Ok(ClientMessage::SwitchRole {
                to_spectator: reader.read_bool()?,
            }),
            0x06 => Ok(ClientMessage::MatchStarted),
            0x07 => {
                let raw = reader.read_u8()?;
                let winner = match Team::from_code(raw) {
                    Some(Some(team)) => team,
                    _ => {
                        return Err(ProtocolError::InvalidValue {
                            field: "winner",
                            value: raw,
                        });
                    }
                };
                Ok(ClientMessage::MatchEnded { winner })
            }
            0x08 => Ok(ClientMessage::ReturnToLobby),
            other => Err(ProtocolError::InvalidOpcode(other)),
        }
    }

    /// Encode this request into one binary frame.
    pub fn encode(&self) -> Bytes {
        let mut w = BinaryWriter::new();
        match self {
            ClientMessage::Hello(hello) => {
                w.put_u8(0x01);
                w.put_string(&hello.participant_id);
                w.put_u8(hello.role.as_u8());
                w.put_bool(hello.host_candidate);
                w.put_f32(hello.skill_rating);
            }
            ClientMessage::SetReady { ready } => {
                w.put_u8(0x02);
                w.put_bool(*ready);
            }
            ClientMessage::SetStrategy { strategy } => {
                w.put_u8(0x03);
                w.put_u8(strategy.as_u8());
            }
            ClientMessage::SwitchSpectatorSide => w.put_u8(0x04),
            ClientMessage::SwitchRole { to_spectator } => {
                w.put_u8(0x05);
                w.put_bool(*to_spectator);
            }
            ClientMessage::MatchStarted => w.put_u8(0x06),
            ClientMessage::MatchEnded { winner } => {
                w.put_u8(0x07);
                w.put_u8(Team::code(Some(*winner)));
            }
            ClientMessage::ReturnToLobby => w.put_u8(0x08),
        }
        w.finish()
    }
}
