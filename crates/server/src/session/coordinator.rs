//! Session coordination.
//!
//! [`SessionCoordinator`] owns the identity registry, the spawn allocator
//! and the lobby state machine, and is the only writer of session state.
//! All methods are synchronous; the network layer queues events between
//! ticks and the tick driver applies them here. Replicated notifications
//! accumulate in production order and are drained by [`SessionCoordinator::tick`].

use crate::balance::{self, Candidate};
use crate::config::Config;
use crate::lobby::{LobbyInput, LobbyStateMachine, PhaseChange};
use crate::registry::IdentityRegistry;
use crate::session::participant::ParticipantRecord;
use crate::spawn::{SlotCategory, SlotHandle, SpawnPointAllocator};
use glam::Vec3;
use protocol::messages::{ClientMessage, Hello, ServerMessage, SessionSnapshot};
use protocol::{ConnectionId, LobbyPhase, MatchmakingStrategy, ParticipantId, RejectReason, Role, Team};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Top-level session state and logic.
pub struct SessionCoordinator {
    registry: IdentityRegistry,
    allocator: SpawnPointAllocator,
    lobby: LobbyStateMachine,
    max_players: usize,
    max_spectators: usize,
    /// Participants owed a seat after allocator exhaustion; retried each tick.
    pending_spawns: Vec<ParticipantId>,
    /// Replicated notifications in production order, drained per tick.
    outbox: Vec<ServerMessage>,
    /// Winning side reported by the last match-end signal.
    last_winner: Option<Team>,
    cannot_continue_sent: bool,
}

impl SessionCoordinator {
    pub fn new(config: &Config) -> Self {
        Self {
            registry: IdentityRegistry::new(),
            allocator: SpawnPointAllocator::from_config(&config.court),
            lobby: LobbyStateMachine::new(
                Duration::from_secs_f64(config.session.auto_select_delay_secs),
                Duration::from_secs_f64(config.session.ready_check_timeout_secs),
            ),
            max_players: config.session.max_players,
            max_spectators: config.session.max_spectators,
            pending_spawns: Vec::new(),
            outbox: Vec::new(),
            last_winner: None,
            cannot_continue_sent: false,
        }
    }

    pub fn phase(&self) -> LobbyPhase {
        self.lobby.phase()
    }

    /// Admission gate. Checks identity and capacity, registers the
    /// participant and returns the full state snapshot for the welcome
    /// frame, or the reason code the transport must deliver before it
    /// finalizes the disconnect.
    pub fn on_connection_requested(
        &mut self,
        connection_id: ConnectionId,
        hello: &Hello,
    ) -> Result<SessionSnapshot, RejectReason> {
        let existing = self.registry.participant(&hello.participant_id);
        if existing.is_some_and(|r| r.connected) {
            warn!(
                "Rejecting duplicate connection for '{}'",
                hello.participant_id
            );
            return Err(RejectReason::DuplicateIdentity);
        }

        // Reconnectors resume their stored role; capacity applies to the
        // role they will actually hold.
        let effective_role = existing.map(|r| r.role).unwrap_or(hello.role);
        match effective_role {
            Role::Player if self.registry.connected_players() >= self.max_players => {
                return Err(RejectReason::PlayerSlotsFull);
            }
            Role::Spectator if self.registry.connected_spectators() >= self.max_spectators => {
                return Err(RejectReason::SpectatorSlotsFull);
            }
            _ => {}
        }

        let outcome = self
            .registry
            .register(
                connection_id,
                &hello.participant_id,
                hello.role,
                hello.host_candidate,
                hello.skill_rating,
            )
            .map_err(|_| RejectReason::DuplicateIdentity)?;

        if !outcome.reconnected && hello.role == Role::Spectator {
            let side = self.smaller_spectator_side();
            if let Some(record) = self.registry.participant_mut(&hello.participant_id) {
                record.team = Some(side);
            }
        }

        if outcome.became_host {
            self.notify(ServerMessage::HostChanged {
                host: Some(hello.participant_id.clone()),
            });
        }
        if let Some(record) = self.registry.participant(&hello.participant_id) {
            let entry = record.entry();
            self.notify(ServerMessage::ParticipantState(entry));
        }
        self.notify_player_count();

        // A participant arriving while the court is live is owed a pose.
        if self.in_seated_phase() && !self.try_seat(&hello.participant_id) {
            self.defer_spawn(hello.participant_id.clone());
        }

        Ok(self.snapshot())
    }

    /// Disconnect signal. Releases the seat, updates rosters and host,
    /// and raises "cannot continue" if a running match lost too many
    /// players. Unknown connections are a logged no-op.
    pub fn on_disconnected(&mut self, connection_id: ConnectionId) {
        let Some(summary) = self.registry.unregister(connection_id) else {
            return;
        };

        self.pending_spawns.retain(|id| *id != summary.participant_id);

        if let Some(index) = summary.spawn_slot {
            self.allocator.release(index);
            self.notify(ServerMessage::SpawnRevoked {
                participant_id: summary.participant_id.clone(),
            });
        }

        if summary.was_host {
            self.notify(ServerMessage::HostChanged {
                host: summary.host_passed_to.clone(),
            });
        }

        if let Some(record) = self.registry.participant(&summary.participant_id) {
            let entry = record.entry();
            self.notify(ServerMessage::ParticipantState(entry));
        }
        self.notify_player_count();

        if self.lobby.phase() == LobbyPhase::InGame && !self.cannot_continue_sent {
            let input = self.lobby_input();
            if input.assigned_players < self.lobby.required_players() {
                warn!(
                    "Match cannot continue: {} assigned players, {} required",
                    input.assigned_players,
                    self.lobby.required_players()
                );
                self.notify(ServerMessage::CannotContinue);
                self.cannot_continue_sent = true;
            }
        }
    }

    /// Apply one queued client request.
    pub fn handle_request(&mut self, connection_id: ConnectionId, message: ClientMessage) {
        let Some(participant_id) = self.registry.participant_id(connection_id).cloned() else {
            debug!("Request from unknown connection {}", connection_id);
            return;
        };

        match message {
            ClientMessage::SetReady { ready } => self.set_ready(&participant_id, ready),
            ClientMessage::SetStrategy { strategy } => self.set_strategy(&participant_id, strategy),
            ClientMessage::SwitchSpectatorSide => self.switch_spectator_side(&participant_id),
            ClientMessage::SwitchRole { to_spectator } => {
                self.switch_role(&participant_id, to_spectator)
            }
            ClientMessage::MatchStarted => self.on_match_started(&participant_id),
            ClientMessage::MatchEnded { winner } => self.on_match_ended(&participant_id, winner),
            ClientMessage::ReturnToLobby => self.return_to_lobby(&participant_id),
            ClientMessage::Hello(_) => {
                debug!("Duplicate hello from connection {}", connection_id);
            }
        }
    }

    /// Flip a player's ready flag. Unknown participants and spectators
    /// (implicitly always ready) are a logged no-op; the caller may be
    /// racing a disconnect.
    pub fn set_ready(&mut self, participant_id: &str, ready: bool) {
        let Some(record) = self.registry.participant_mut(participant_id) else {
            debug!("set_ready for unknown participant '{}'", participant_id);
            return;
        };
        if !record.connected || record.role == Role::Spectator {
            debug!("set_ready ignored for '{}'", participant_id);
            return;
        }
        if record.ready == ready {
            return;
        }
        record.ready = ready;
        let entry = record.entry();
        self.notify(ServerMessage::ParticipantState(entry));
    }

    /// Change the matchmaking strategy; host only.
    pub fn set_strategy(&mut self, participant_id: &str, strategy: MatchmakingStrategy) {
        if !self.require_host(participant_id) {
            return;
        }
        if self.lobby.strategy() == strategy {
            return;
        }
        self.lobby.set_strategy(strategy);
        info!("Matchmaking strategy set to {:?}", strategy);
        self.notify(ServerMessage::StrategyChanged { strategy });
    }

    /// Move a spectator to the other side's seating, reseating them if
    /// they currently hold a seat.
    pub fn switch_spectator_side(&mut self, participant_id: &str) {
        let (new_side, released) = {
            let Some(record) = self.registry.participant_mut(participant_id) else {
                return;
            };
            if !record.connected || record.role != Role::Spectator {
                debug!("switch_spectator_side ignored for '{}'", participant_id);
                return;
            }
            let new_side = record.team.map(Team::opposite).unwrap_or(Team::A);
            record.team = Some(new_side);
            let released = record.spawn_slot.take();
            record.last_slot = None;
            (new_side, released)
        };

        if let Some(index) = released {
            self.allocator.release(index);
            self.notify(ServerMessage::SpawnRevoked {
                participant_id: participant_id.to_string(),
            });
        }

        info!("Spectator '{}' switched to side {:?}", participant_id, new_side);
        if let Some(record) = self.registry.participant(participant_id) {
            let entry = record.entry();
            self.notify(ServerMessage::ParticipantState(entry));
        }

        // Only reseat participants who were seated to begin with.
        if released.is_some() && !self.try_seat(participant_id) {
            self.defer_spawn(participant_id.to_string());
        }
    }

    /// Switch between playing and spectating. Honored while the lobby is
    /// still forming (waiting / mode selection); later phases ignore it.
    pub fn switch_role(&mut self, participant_id: &str, to_spectator: bool) {
        if !matches!(
            self.lobby.phase(),
            LobbyPhase::WaitingForPlayers | LobbyPhase::ModeSelection
        ) {
            debug!(
                "switch_role ignored for '{}' during {:?}",
                participant_id,
                self.lobby.phase()
            );
            return;
        }

        if !to_spectator && self.registry.connected_players() >= self.max_players {
            debug!("switch_role to player denied for '{}': slots full", participant_id);
            return;
        }
        if to_spectator && self.registry.connected_spectators() >= self.max_spectators {
            debug!(
                "switch_role to spectator denied for '{}': slots full",
                participant_id
            );
            return;
        }

        let side = self.smaller_spectator_side();
        let Some(record) = self.registry.participant_mut(participant_id) else {
            debug!("switch_role for unknown participant '{}'", participant_id);
            return;
        };
        if !record.connected {
            return;
        }
        let target = if to_spectator { Role::Spectator } else { Role::Player };
        if record.role == target {
            return;
        }
        record.role = target;
        record.ready = false;
        record.team_slot = 0;
        record.team = to_spectator.then_some(side);
        info!("Participant '{}' switched role to {:?}", participant_id, target);
        let entry = record.entry();
        self.notify(ServerMessage::ParticipantState(entry));
        self.notify_player_count();
    }

    /// Gameplay signal from the host: the match is underway.
    pub fn on_match_started(&mut self, participant_id: &str) {
        if !self.require_host(participant_id) {
            return;
        }
        if let Some(change) = self.lobby.match_started() {
            self.apply_phase_change(change);
        }
    }

    /// Gameplay signal from the host: the match finished.
    pub fn on_match_ended(&mut self, participant_id: &str, winner: Team) {
        if !self.require_host(participant_id) {
            return;
        }
        self.last_winner = Some(winner);
        match self.lobby.match_ended() {
            Some(change) => self.apply_phase_change(change),
            None => self.last_winner = None,
        }
    }

    /// Operator trigger from the host: leave the podium, reopen the lobby.
    pub fn return_to_lobby(&mut self, participant_id: &str) {
        if !self.require_host(participant_id) {
            return;
        }
        if let Some(change) = self.lobby.return_to_lobby() {
            self.apply_phase_change(change);
        }
    }

    /// Per-tick server update entry point. Advances the lobby, retries
    /// deferred spawns and returns this tick's notifications in
    /// production order.
    pub fn tick(&mut self, dt: Duration) -> Vec<ServerMessage> {
        let input = self.lobby_input();
        if let Some(change) = self.lobby.step(&input, dt) {
            self.apply_phase_change(change);
        }
        self.process_pending_spawns();
        std::mem::take(&mut self.outbox)
    }

    /// Full current session state for a late-joining observer.
    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            phase: self.lobby.phase(),
            mode: self.lobby.mode(),
            strategy: self.lobby.strategy(),
            host: self.registry.current_host().cloned(),
            participants: self.registry.iter().map(|r| r.entry()).collect(),
        }
    }

    fn apply_phase_change(&mut self, change: PhaseChange) {
        self.notify(ServerMessage::PhaseChanged { phase: change.to });
        match change.to {
            LobbyPhase::TeamBalancing => self.run_balancing(),
            LobbyPhase::GameStarting => self.grant_initial_spawns(),
            LobbyPhase::InGame => self.cannot_continue_sent = false,
            LobbyPhase::PostGame => self.seat_podium(),
            LobbyPhase::WaitingForPlayers => self.reopen_lobby(),
            LobbyPhase::ModeSelection | LobbyPhase::ReadyCheck => {}
        }
    }

    /// Run the balancer and write team assignments back into the registry.
    fn run_balancing(&mut self) {
        let Some(mode) = self.lobby.mode() else {
            debug!("Balancing without a selected mode");
            return;
        };

        let candidates: Vec<Candidate> = self
            .registry
            .iter()
            .filter(|r| r.connected)
            .map(|r| Candidate {
                participant_id: r.participant_id.clone(),
                role: r.role,
                skill_rating: r.skill_rating,
            })
            .collect();

        let assignments = balance::balance(&candidates, mode);
        info!(
            "Balanced {} participants into {:?}",
            assignments.len(),
            mode
        );

        self.notify(ServerMessage::ModeChanged { mode: Some(mode) });
        for assignment in assignments {
            let Some(record) = self.registry.participant_mut(&assignment.participant_id) else {
                continue;
            };
            record.team = assignment.team;
            record.team_slot = assignment.team_slot;
            // Assignments open a fresh ready check.
            record.ready = false;
            let entry = record.entry();
            self.notify(ServerMessage::ParticipantState(entry));
        }
        self.lobby.mark_balanced();
    }

    /// Reserve a concrete seat for every connected participant.
    fn grant_initial_spawns(&mut self) {
        for id in self.registry.ids() {
            let needs_seat = self
                .registry
                .participant(&id)
                .is_some_and(|r| r.connected && r.spawn_slot.is_none());
            if needs_seat && !self.try_seat(&id) {
                self.defer_spawn(id);
            }
        }
    }

    /// Move players from the court to the podium after a match.
    fn seat_podium(&mut self) {
        let winner = self.last_winner.take().unwrap_or(Team::A);
        info!("Seating podium, winning side {:?}", winner);

        for id in self.registry.ids() {
            let (released, connected) = {
                let Some(record) = self.registry.participant_mut(&id) else {
                    continue;
                };
                if record.role != Role::Player || record.team.is_none() {
                    continue;
                }
                record.post_game_winner = record.team == Some(winner);
                // Court seats don't carry over to the podium.
                record.last_slot = None;
                (record.spawn_slot.take(), record.connected)
            };

            if let Some(index) = released {
                self.allocator.release(index);
                self.notify(ServerMessage::SpawnRevoked {
                    participant_id: id.clone(),
                });
            }
            if connected && !self.try_seat(&id) {
                self.defer_spawn(id);
            }
        }
    }

    /// Re-entering the waiting phase clears the whole court and every
    /// match-scoped flag, whatever path led here (ready-check timeout,
    /// population loss, or leaving post-game).
    fn reopen_lobby(&mut self) {
        self.pending_spawns.clear();
        self.allocator.reset();
        self.last_winner = None;
        self.cannot_continue_sent = false;

        for id in self.registry.ids() {
            let (had_seat, entry) = {
                let Some(record) = self.registry.participant_mut(&id) else {
                    continue;
                };
                let had_seat = record.spawn_slot.take().is_some();
                record.last_slot = None;
                record.post_game_winner = false;
                record.ready = false;
                if record.role == Role::Player {
                    record.team = None;
                    record.team_slot = 0;
                }
                (had_seat, record.connected.then(|| record.entry()))
            };
            if had_seat {
                self.notify(ServerMessage::SpawnRevoked {
                    participant_id: id.clone(),
                });
            }
            if let Some(entry) = entry {
                self.notify(ServerMessage::ParticipantState(entry));
            }
        }
        self.notify(ServerMessage::ModeChanged { mode: None });
    }

    /// Try to reserve the seat a participant is owed. Policy order:
    /// the exact seat held before disconnecting, then the nearest (or a
    /// random) seat of the desired category, then the same role on the
    /// opposite side. Returns false when every option is exhausted and
    /// the spawn must be deferred.
    fn try_seat(&mut self, participant_id: &str) -> bool {
        let (category, reference, last_slot) = {
            let Some(record) = self.registry.participant(participant_id) else {
                return true;
            };
            if !record.connected || record.spawn_slot.is_some() {
                return true;
            }
            (
                self.desired_category(record),
                record.last_known_position,
                record.last_slot,
            )
        };

        let reclaimed = last_slot.and_then(|index| {
            let usable = self
                .allocator
                .category_of(index)
                .is_some_and(|cat| cat == category || Some(cat) == category.opposite_side());
            if usable {
                self.allocator.reserve_by_index(index)
            } else {
                None
            }
        });

        let handle = reclaimed
            .or_else(|| self.reserve_in(category, reference))
            .or_else(|| {
                category
                    .opposite_side()
                    .and_then(|other| self.reserve_in(other, reference))
            });

        match handle {
            Some(handle) => {
                self.grant_seat(participant_id, handle);
                true
            }
            None => {
                debug!(
                    "Spawn deferred for '{}' ({:?} exhausted)",
                    participant_id, category
                );
                false
            }
        }
    }

    fn reserve_in(&mut self, category: SlotCategory, reference: Option<Vec3>) -> Option<SlotHandle> {
        match reference {
            Some(position) => self.allocator.reserve_nearest(category, position),
            None => self.allocator.reserve_random(category),
        }
    }

    /// Record the reservation and publish the grant. Updating the record
    /// and the occupancy happens back to back under the single writer,
    /// so observers never see one without the other.
    fn grant_seat(&mut self, participant_id: &str, handle: SlotHandle) {
        if let Some(record) = self.registry.participant_mut(participant_id) {
            record.spawn_slot = Some(handle.index);
            record.last_slot = Some(handle.index);
            record.last_known_position = Some(handle.pose.position);
        }
        info!(
            "Granted slot {} ({:?}) to '{}'",
            handle.index, handle.category, participant_id
        );
        self.notify(ServerMessage::SpawnGranted {
            participant_id: participant_id.to_string(),
            pose: handle.pose,
        });
    }

    /// Seat category a participant is owed right now.
    fn desired_category(&self, record: &ParticipantRecord) -> SlotCategory {
        if self.lobby.phase() == LobbyPhase::PostGame
            && record.role == Role::Player
            && record.team.is_some()
        {
            return SlotCategory::podium(record.post_game_winner);
        }
        match (record.role, record.team) {
            (Role::Player, Some(team)) => SlotCategory::player(team, record.team_slot),
            // Unseated players and side-less spectators watch from the
            // emptier side.
            (Role::Player, None) => SlotCategory::spectator(self.smaller_spectator_side()),
            (Role::Spectator, side) => {
                SlotCategory::spectator(side.unwrap_or(self.smaller_spectator_side()))
            }
        }
    }

    fn process_pending_spawns(&mut self) {
        if self.pending_spawns.is_empty() {
            return;
        }
        if !self.in_seated_phase() {
            self.pending_spawns.clear();
            return;
        }
        let pending = std::mem::take(&mut self.pending_spawns);
        for id in pending {
            if !self.try_seat(&id) {
                self.pending_spawns.push(id);
            }
        }
    }

    fn in_seated_phase(&self) -> bool {
        matches!(
            self.lobby.phase(),
            LobbyPhase::GameStarting | LobbyPhase::InGame | LobbyPhase::PostGame
        )
    }

    fn defer_spawn(&mut self, participant_id: ParticipantId) {
        if !self.pending_spawns.contains(&participant_id) {
            self.pending_spawns.push(participant_id);
        }
    }

    /// Spectator side currently holding fewer connected spectators; ties
    /// favor side A.
    fn smaller_spectator_side(&self) -> Team {
        let mut side_a = 0usize;
        let mut side_b = 0usize;
        for record in self.registry.iter() {
            if record.connected && record.role == Role::Spectator {
                match record.team {
                    Some(Team::A) => side_a += 1,
                    Some(Team::B) => side_b += 1,
                    None => {}
                }
            }
        }
        if side_a <= side_b { Team::A } else { Team::B }
    }

    fn lobby_input(&self) -> LobbyInput {
        let mut assigned = 0usize;
        let mut all_ready = true;
        for record in self.registry.iter() {
            if record.is_assigned_player() {
                assigned += 1;
                all_ready &= record.ready;
            }
        }
        LobbyInput {
            connected_players: self.registry.connected_players(),
            assigned_players: assigned,
            all_assigned_ready: assigned > 0 && all_ready,
        }
    }

    fn require_host(&self, participant_id: &str) -> bool {
        let is_host = self
            .registry
            .participant(participant_id)
            .is_some_and(|r| r.connected && r.is_host);
        if !is_host {
            debug!("Host-only request from '{}' ignored", participant_id);
        }
        is_host
    }

    fn notify_player_count(&mut self) {
        let players = self.registry.connected_players() as u8;
        let spectators = self.registry.connected_spectators() as u8;
        self.notify(ServerMessage::PlayerCount {
            players,
            spectators,
        });
    }

    fn notify(&mut self, message: ServerMessage) {
        self.outbox.push(message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CourtConfig, SlotPose};

    const TICK: Duration = Duration::from_millis(50);

    fn hello(id: &str, role: Role, rating: f32) -> Hello {
        Hello {
            participant_id: id.to_string(),
            role,
            host_candidate: false,
            skill_rating: rating,
        }
    }

    fn phases_of(messages: &[ServerMessage]) -> Vec<LobbyPhase> {
        messages
            .iter()
            .filter_map(|m| match m {
                ServerMessage::PhaseChanged { phase } => Some(*phase),
                _ => None,
            })
            .collect()
    }

    /// Drive an empty coordinator to ReadyCheck with two singles players.
    fn coordinator_in_ready_check() -> SessionCoordinator {
        let mut coord = SessionCoordinator::new(&Config::default());
        coord.on_connection_requested(1, &hello("P1", Role::Player, 1000.0)).unwrap();
        coord.on_connection_requested(2, &hello("P2", Role::Player, 1100.0)).unwrap();
        coord.tick(TICK); // -> ModeSelection
        coord.tick(Duration::from_secs(11)); // -> TeamBalancing
        coord.tick(TICK); // -> ReadyCheck
        assert_eq!(coord.phase(), LobbyPhase::ReadyCheck);
        coord
    }

    #[test]
    fn test_end_to_end_two_client_session() {
        let mut coord = SessionCoordinator::new(&Config::default());
        coord.on_connection_requested(1, &hello("P1", Role::Player, 1000.0)).unwrap();
        coord.on_connection_requested(2, &hello("P2", Role::Player, 1100.0)).unwrap();

        let mut observed = Vec::new();
        observed.extend(phases_of(&coord.tick(TICK)));
        observed.extend(phases_of(&coord.tick(Duration::from_secs(11))));
        observed.extend(phases_of(&coord.tick(TICK)));
        assert_eq!(
            observed,
            vec![
                LobbyPhase::ModeSelection,
                LobbyPhase::TeamBalancing,
                LobbyPhase::ReadyCheck
            ]
        );

        coord.handle_request(1, ClientMessage::SetReady { ready: true });
        coord.handle_request(2, ClientMessage::SetReady { ready: true });
        let messages = coord.tick(TICK);
        assert_eq!(phases_of(&messages), vec![LobbyPhase::GameStarting]);
        let grants = messages
            .iter()
            .filter(|m| matches!(m, ServerMessage::SpawnGranted { .. }))
            .count();
        assert_eq!(grants, 2);

        // P1 registered first and holds host; gameplay reports the start.
        coord.handle_request(1, ClientMessage::MatchStarted);
        assert_eq!(coord.phase(), LobbyPhase::InGame);

        let p2_slot = coord.registry.participant("P2").unwrap().spawn_slot.unwrap();
        coord.on_disconnected(2);
        let messages = coord.tick(TICK);

        // The cannot-continue notification fired during the disconnect
        // and is delivered with the next tick's batch.
        assert!(
            messages
                .iter()
                .any(|m| matches!(m, ServerMessage::CannotContinue))
        );
        // P2 no longer counts toward any roster and their seat is free.
        assert!(coord.registry.iter().filter(|r| r.is_assigned_player()).all(|r| r.participant_id != "P2"));
        assert!(!coord.allocator.is_occupied(p2_slot));
        assert_eq!(coord.phase(), LobbyPhase::InGame);
    }

    #[test]
    fn test_ready_check_timeout_resets_to_waiting() {
        let mut coord = coordinator_in_ready_check();
        coord.handle_request(1, ClientMessage::SetReady { ready: true });

        let messages = coord.tick(Duration::from_secs(31));
        assert_eq!(phases_of(&messages), vec![LobbyPhase::WaitingForPlayers]);
        assert!(!coord.registry.participant("P1").unwrap().ready);
        assert!(!coord.registry.participant("P2").unwrap().ready);
    }

    #[test]
    fn test_duplicate_identity_rejected_at_the_gate() {
        let mut coord = SessionCoordinator::new(&Config::default());
        coord.on_connection_requested(1, &hello("P1", Role::Player, 1000.0)).unwrap();
        let result = coord.on_connection_requested(2, &hello("P1", Role::Player, 1000.0));
        assert_eq!(result.unwrap_err(), RejectReason::DuplicateIdentity);
    }

    #[test]
    fn test_player_capacity_rejection() {
        let mut config = Config::default();
        config.session.max_players = 2;
        let mut coord = SessionCoordinator::new(&config);
        coord.on_connection_requested(1, &hello("P1", Role::Player, 1000.0)).unwrap();
        coord.on_connection_requested(2, &hello("P2", Role::Player, 1000.0)).unwrap();
        let result = coord.on_connection_requested(3, &hello("P3", Role::Player, 1000.0));
        assert_eq!(result.unwrap_err(), RejectReason::PlayerSlotsFull);
    }

    #[test]
    fn test_spectator_seating_falls_back_to_the_other_side() {
        let mut config = Config::default();
        config.session.max_spectators = 4;
        config.court = CourtConfig {
            team_a_spectators: vec![SlotPose::new([-6.0, 0.0, 0.0], 90.0)],
            team_b_spectators: vec![
                SlotPose::new([6.0, 0.0, 0.0], 270.0),
                SlotPose::new([6.0, 0.0, 2.0], 270.0),
            ],
            ..CourtConfig::default()
        };
        let mut coord = SessionCoordinator::new(&config);

        coord.on_connection_requested(1, &hello("P1", Role::Player, 1000.0)).unwrap();
        coord.on_connection_requested(2, &hello("P2", Role::Player, 1100.0)).unwrap();
        // Sides alternate starting at A, so S1 and S3 both prefer side A.
        coord.on_connection_requested(3, &hello("S1", Role::Spectator, 0.0)).unwrap();
        coord.on_connection_requested(4, &hello("S2", Role::Spectator, 0.0)).unwrap();
        coord.on_connection_requested(5, &hello("S3", Role::Spectator, 0.0)).unwrap();

        // Host forces singles to skip the auto-select delay.
        coord.handle_request(1, ClientMessage::SetStrategy { strategy: MatchmakingStrategy::ForcedSingles });
        coord.tick(TICK); // -> ModeSelection
        coord.tick(TICK); // -> TeamBalancing
        coord.tick(TICK); // -> ReadyCheck
        coord.handle_request(1, ClientMessage::SetReady { ready: true });
        coord.handle_request(2, ClientMessage::SetReady { ready: true });
        coord.tick(TICK); // -> GameStarting, seats granted
        assert_eq!(coord.phase(), LobbyPhase::GameStarting);

        let s3_slot = coord.registry.participant("S3").unwrap().spawn_slot.unwrap();
        assert_eq!(
            coord.allocator.category_of(s3_slot),
            Some(SlotCategory::TeamBSpectator)
        );
    }

    #[test]
    fn test_reconnection_reclaims_the_same_seat() {
        let mut coord = coordinator_in_ready_check();
        coord.handle_request(1, ClientMessage::SetReady { ready: true });
        coord.handle_request(2, ClientMessage::SetReady { ready: true });
        coord.tick(TICK); // -> GameStarting
        coord.handle_request(1, ClientMessage::MatchStarted);

        let seat = coord.registry.participant("P2").unwrap().spawn_slot.unwrap();
        coord.on_disconnected(2);
        assert!(!coord.allocator.is_occupied(seat));

        coord.on_connection_requested(7, &hello("P2", Role::Player, 1100.0)).unwrap();
        let record = coord.registry.participant("P2").unwrap();
        assert_eq!(record.connection_id, Some(7));
        assert_eq!(record.spawn_slot, Some(seat));
        assert!(coord.allocator.is_occupied(seat));
    }

    #[test]
    fn test_non_host_strategy_request_is_ignored() {
        let mut coord = SessionCoordinator::new(&Config::default());
        coord.on_connection_requested(1, &hello("P1", Role::Player, 1000.0)).unwrap();
        coord.on_connection_requested(2, &hello("P2", Role::Player, 1000.0)).unwrap();

        coord.handle_request(2, ClientMessage::SetStrategy { strategy: MatchmakingStrategy::ForcedDoubles });
        assert_eq!(coord.lobby.strategy(), MatchmakingStrategy::Auto);

        coord.handle_request(1, ClientMessage::SetStrategy { strategy: MatchmakingStrategy::ForcedDoubles });
        assert_eq!(coord.lobby.strategy(), MatchmakingStrategy::ForcedDoubles);
    }

    #[test]
    fn test_post_game_podium_and_return_to_lobby() {
        let mut coord = coordinator_in_ready_check();
        coord.handle_request(1, ClientMessage::SetReady { ready: true });
        coord.handle_request(2, ClientMessage::SetReady { ready: true });
        coord.tick(TICK);
        coord.handle_request(1, ClientMessage::MatchStarted);

        coord.handle_request(1, ClientMessage::MatchEnded { winner: Team::B });
        assert_eq!(coord.phase(), LobbyPhase::PostGame);

        let p1 = coord.registry.participant("P1").unwrap();
        let p2 = coord.registry.participant("P2").unwrap();
        // Balancing put the lower rating (P1) on team A; B won.
        assert!(!p1.post_game_winner);
        assert!(p2.post_game_winner);
        let p1_cat = coord.allocator.category_of(p1.spawn_slot.unwrap());
        let p2_cat = coord.allocator.category_of(p2.spawn_slot.unwrap());
        assert_eq!(p1_cat, Some(SlotCategory::PostGameLoser));
        assert_eq!(p2_cat, Some(SlotCategory::PostGameWinner));

        coord.handle_request(1, ClientMessage::ReturnToLobby);
        assert_eq!(coord.phase(), LobbyPhase::WaitingForPlayers);
        let p1 = coord.registry.participant("P1").unwrap();
        assert_eq!(p1.team, None);
        assert_eq!(p1.spawn_slot, None);
        assert!(!p1.post_game_winner);
        for index in 0..coord.allocator.len() {
            assert!(!coord.allocator.is_occupied(index));
        }
    }

    #[test]
    fn test_set_ready_is_a_soft_no_op_for_spectators_and_unknowns() {
        let mut coord = SessionCoordinator::new(&Config::default());
        coord.on_connection_requested(1, &hello("S1", Role::Spectator, 0.0)).unwrap();

        coord.set_ready("S1", true);
        assert!(!coord.registry.participant("S1").unwrap().ready);
        // Unknown participants must not panic or create records.
        coord.set_ready("ghost", true);
        assert!(coord.registry.participant("ghost").is_none());
    }
}
