//! Participant identity tracking.
//!
//! Maps transient connection handles to stable participant identities and
//! owns every [`ParticipantRecord`] in place. Records survive disconnects;
//! the registry never mutates spawn or team state beyond its own fields,
//! it only reports what the caller needs to release owned resources.

use crate::session::participant::ParticipantRecord;
use protocol::{ConnectionId, ParticipantId, Role, Team};
use std::collections::HashMap;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Errors surfaced by [`IdentityRegistry::register`].
#[derive(Debug, Error)]
pub enum RegistryError {
    /// A record with this identity is already connected. Duplicate
    /// connections are rejected, never merged.
    #[error("Participant '{participant_id}' is already connected")]
    DuplicateConnection { participant_id: ParticipantId },
}

/// Outcome of a successful registration.
#[derive(Debug, Clone, Copy)]
pub struct Registration {
    /// The identity was known and disconnected; its record was resumed.
    pub reconnected: bool,
    /// Host status was granted to the registering participant.
    pub became_host: bool,
}

/// What a departing participant owned, so the caller can release it.
#[derive(Debug, Clone)]
pub struct DepartureSummary {
    pub participant_id: ParticipantId,
    pub role: Role,
    pub team: Option<Team>,
    /// Spawn slot held at disconnect time; already moved to the record's
    /// `last_slot` for reconnection.
    pub spawn_slot: Option<usize>,
    pub was_host: bool,
    /// Participant that inherited host status, if any.
    pub host_passed_to: Option<ParticipantId>,
}

/// Registry of every participant seen during this session.
#[derive(Debug, Default)]
pub struct IdentityRegistry {
    records: HashMap<ParticipantId, ParticipantRecord>,
    by_connection: HashMap<ConnectionId, ParticipantId>,
    /// Registration order; drives deterministic host failover.
    order: Vec<ParticipantId>,
}

impl IdentityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connection under a stable identity.
    ///
    /// A known-but-disconnected identity is resumed in place: the
    /// connection handle is replaced and team/role/ready/seat memory is
    /// preserved. A known-and-connected identity is rejected.
    pub fn register(
        &mut self,
        connection_id: ConnectionId,
        participant_id: &str,
        role: Role,
        host_requested: bool,
        skill_rating: f32,
    ) -> Result<Registration, RegistryError> {
        let reconnected = match self.records.get_mut(participant_id) {
            Some(record) if record.connected => {
                return Err(RegistryError::DuplicateConnection {
                    participant_id: participant_id.to_string(),
                });
            }
            Some(record) => {
                record.connection_id = Some(connection_id);
                record.connected = true;
                info!(
                    "Participant '{}' reconnected (connection {})",
                    participant_id, connection_id
                );
                true
            }
            None => {
                let record = ParticipantRecord::new(
                    participant_id.to_string(),
                    connection_id,
                    role,
                    skill_rating,
                );
                self.records.insert(participant_id.to_string(), record);
                self.order.push(participant_id.to_string());
                info!(
                    "Participant '{}' registered as {:?} (connection {})",
                    participant_id, role, connection_id
                );
                false
            }
        };

        self.by_connection
            .insert(connection_id, participant_id.to_string());

        // Host rule: grant when nobody connected holds it. A requested
        // grant never displaces a sitting host.
        let became_host = if self.current_host().is_none() {
            if let Some(record) = self.records.get_mut(participant_id) {
                record.is_host = true;
            }
            info!("Participant '{}' is now host", participant_id);
            true
        } else {
            if host_requested {
                warn!(
                    "Participant '{}' requested host while one is connected; ignoring",
                    participant_id
                );
            }
            false
        };

        Ok(Registration {
            reconnected,
            became_host,
        })
    }

    /// Mark the participant behind a connection as disconnected.
    ///
    /// The record is kept for reconnection; its spawn slot index moves to
    /// `last_slot` and is reported back so the caller can release it.
    /// Host status is reassigned to the first remaining connected
    /// participant in registration order, or lapses if none remain.
    pub fn unregister(&mut self, connection_id: ConnectionId) -> Option<DepartureSummary> {
        let participant_id = match self.by_connection.remove(&connection_id) {
            Some(id) => id,
            None => {
                debug!("Unregister for unknown connection {}", connection_id);
                return None;
            }
        };

        let (role, team, spawn_slot, was_host) = {
            let record = self.records.get_mut(&participant_id)?;
            record.connected = false;
            record.connection_id = None;
            let spawn_slot = record.spawn_slot.take();
            if spawn_slot.is_some() {
                record.last_slot = spawn_slot;
            }
            let was_host = record.is_host;
            record.is_host = false;
            (record.role, record.team, spawn_slot, was_host)
        };

        let host_passed_to = if was_host {
            let next = self
                .order
                .iter()
                .find(|id| self.records.get(*id).is_some_and(|r| r.connected))
                .cloned();
            if let Some(ref next_id) = next {
                if let Some(record) = self.records.get_mut(next_id) {
                    record.is_host = true;
                }
                info!("Host passed from '{}' to '{}'", participant_id, next_id);
            } else {
                info!("Host '{}' left with nobody remaining", participant_id);
            }
            next
        } else {
            None
        };

        info!(
            "Participant '{}' disconnected (connection {})",
            participant_id, connection_id
        );

        Some(DepartureSummary {
            participant_id,
            role,
            team,
            spawn_slot,
            was_host,
            host_passed_to,
        })
    }

    /// Resolve a connection to its stable identity.
    pub fn participant_id(&self, connection_id: ConnectionId) -> Option<&ParticipantId> {
        self.by_connection.get(&connection_id)
    }

    pub fn participant(&self, participant_id: &str) -> Option<&ParticipantRecord> {
        self.records.get(participant_id)
    }

    pub fn participant_mut(&mut self, participant_id: &str) -> Option<&mut ParticipantRecord> {
        self.records.get_mut(participant_id)
    }

    pub fn record_by_connection(&self, connection_id: ConnectionId) -> Option<&ParticipantRecord> {
        self.by_connection
            .get(&connection_id)
            .and_then(|id| self.records.get(id))
    }

    /// The connected participant currently holding host, if any.
    pub fn current_host(&self) -> Option<&ParticipantId> {
        self.order.iter().find(|id| {
            self.records
                .get(*id)
                .is_some_and(|r| r.connected && r.is_host)
        })
    }

    /// Iterate records in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &ParticipantRecord> {
        self.order.iter().filter_map(|id| self.records.get(id))
    }

    /// Registration-ordered identity list, for callers that need `&mut`
    /// access record by record.
    pub fn ids(&self) -> Vec<ParticipantId> {
        self.order.clone()
    }

    pub fn connected_players(&self) -> usize {
        self.records.values().filter(|r| r.is_active_player()).count()
    }

    pub fn connected_spectators(&self) -> usize {
        self.records
            .values()
            .filter(|r| r.connected && r.role == Role::Spectator)
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duplicate_connected_identity_rejected() {
        let mut registry = IdentityRegistry::new();
        registry.register(1, "P1", Role::Player, false, 1000.0).unwrap();
        let err = registry.register(2, "P1", Role::Player, false, 1000.0);
        assert!(matches!(
            err,
            Err(RegistryError::DuplicateConnection { .. })
        ));
        // The losing connection must not shadow the live one.
        assert_eq!(registry.participant_id(1), Some(&"P1".to_string()));
        assert_eq!(registry.participant_id(2), None);
    }

    #[test]
    fn test_reconnection_preserves_state() {
        let mut registry = IdentityRegistry::new();
        registry.register(1, "P1", Role::Player, false, 1000.0).unwrap();
        {
            let record = registry.participant_mut("P1").unwrap();
            record.team = Some(Team::B);
            record.team_slot = 1;
            record.ready = true;
        }
        registry.unregister(1).unwrap();
        assert!(!registry.participant("P1").unwrap().connected);

        let outcome = registry.register(2, "P1", Role::Player, false, 1000.0).unwrap();
        assert!(outcome.reconnected);
        let record = registry.participant("P1").unwrap();
        assert!(record.connected);
        assert_eq!(record.connection_id, Some(2));
        assert_eq!(record.team, Some(Team::B));
        assert_eq!(record.team_slot, 1);
        assert!(record.ready);
    }

    #[test]
    fn test_first_registration_gets_host() {
        let mut registry = IdentityRegistry::new();
        let outcome = registry.register(1, "P1", Role::Player, false, 1000.0).unwrap();
        assert!(outcome.became_host);
        let outcome = registry.register(2, "P2", Role::Player, true, 1000.0).unwrap();
        assert!(!outcome.became_host);
        assert_eq!(registry.current_host(), Some(&"P1".to_string()));
    }

    #[test]
    fn test_host_failover() {
        let mut registry = IdentityRegistry::new();
        registry.register(1, "P1", Role::Player, true, 1000.0).unwrap();
        registry.register(2, "P2", Role::Player, false, 1000.0).unwrap();
        registry.register(3, "P3", Role::Player, false, 1000.0).unwrap();

        let summary = registry.unregister(1).unwrap();
        assert!(summary.was_host);
        assert_eq!(summary.host_passed_to, Some("P2".to_string()));
        let hosts: Vec<_> = registry.iter().filter(|r| r.is_host).collect();
        assert_eq!(hosts.len(), 1);
        assert_eq!(hosts[0].participant_id, "P2");

        registry.unregister(2).unwrap();
        registry.unregister(3).unwrap();
        assert_eq!(registry.current_host(), None);
        assert!(registry.iter().all(|r| !r.is_host));
    }

    #[test]
    fn test_unregister_reports_owned_seat() {
        let mut registry = IdentityRegistry::new();
        registry.register(1, "P1", Role::Player, false, 1000.0).unwrap();
        registry.participant_mut("P1").unwrap().spawn_slot = Some(4);

        let summary = registry.unregister(1).unwrap();
        assert_eq!(summary.spawn_slot, Some(4));
        let record = registry.participant("P1").unwrap();
        assert_eq!(record.spawn_slot, None);
        assert_eq!(record.last_slot, Some(4));
    }

    #[test]
    fn test_at_most_one_connected_record_per_identity() {
        let mut registry = IdentityRegistry::new();
        for round in 0..3u32 {
            let conn = round * 2 + 1;
            registry.register(conn, "P1", Role::Player, false, 1000.0).unwrap();
            assert!(registry.register(conn + 1, "P1", Role::Player, false, 1000.0).is_err());
            registry.unregister(conn);
        }
    }
}
