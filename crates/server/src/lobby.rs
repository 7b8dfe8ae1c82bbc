//! Lobby state machine.
//!
//! Drives the session through its phases. Conditions are evaluated once
//! per tick against population inputs supplied by the coordinator; time
//! in the current phase accumulates from the per-tick monotonic delta,
//! never from wall-clock reads inside the machine.

use protocol::{GameMode, LobbyPhase, MatchmakingStrategy};
use std::time::Duration;
use tracing::{debug, info};

/// Population-derived conditions for one tick of phase evaluation.
#[derive(Debug, Clone, Copy, Default)]
pub struct LobbyInput {
    /// Connected participants with the player role.
    pub connected_players: usize,
    /// Connected players currently holding a team seat.
    pub assigned_players: usize,
    /// Every seated player has flipped their ready flag.
    pub all_assigned_ready: bool,
}

/// An edge produced by phase evaluation. Emitted exactly once per actual
/// change; re-evaluating an already-satisfied condition never re-fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PhaseChange {
    pub from: LobbyPhase,
    pub to: LobbyPhase,
}

/// The session phase cycle.
#[derive(Debug)]
pub struct LobbyStateMachine {
    phase: LobbyPhase,
    time_in_phase: Duration,
    strategy: MatchmakingStrategy,
    mode: Option<GameMode>,
    /// Set by the coordinator once team assignments are written back.
    balanced: bool,
    auto_select_delay: Duration,
    ready_timeout: Duration,
}

impl LobbyStateMachine {
    pub fn new(auto_select_delay: Duration, ready_timeout: Duration) -> Self {
        Self {
            phase: LobbyPhase::WaitingForPlayers,
            time_in_phase: Duration::ZERO,
            strategy: MatchmakingStrategy::Auto,
            mode: None,
            balanced: false,
            auto_select_delay,
            ready_timeout,
        }
    }

    pub fn phase(&self) -> LobbyPhase {
        self.phase
    }

    pub fn mode(&self) -> Option<GameMode> {
        self.mode
    }

    pub fn strategy(&self) -> MatchmakingStrategy {
        self.strategy
    }

    pub fn set_strategy(&mut self, strategy: MatchmakingStrategy) {
        self.strategy = strategy;
    }

    /// Record that team assignments for the current balancing pass exist.
    pub fn mark_balanced(&mut self) {
        if self.phase == LobbyPhase::TeamBalancing {
            self.balanced = true;
        } else {
            debug!("mark_balanced outside TeamBalancing ({:?})", self.phase);
        }
    }

    /// Player headcount the current (or pending) mode requires.
    pub fn required_players(&self) -> usize {
        self.mode.map(GameMode::min_players).unwrap_or(2)
    }

    /// Evaluate the single transition available from the current phase.
    pub fn step(&mut self, input: &LobbyInput, dt: Duration) -> Option<PhaseChange> {
        self.time_in_phase += dt;

        let next = match self.phase {
            LobbyPhase::WaitingForPlayers => {
                (input.connected_players >= 2).then_some(LobbyPhase::ModeSelection)
            }
            LobbyPhase::ModeSelection => {
                if input.connected_players < 2 {
                    Some(LobbyPhase::WaitingForPlayers)
                } else {
                    let forced = self.strategy != MatchmakingStrategy::Auto;
                    if forced || self.time_in_phase > self.auto_select_delay {
                        match derive_mode(self.strategy, input.connected_players) {
                            Some(mode) => {
                                self.mode = Some(mode);
                                info!(
                                    "Mode selected: {:?} ({} players, {:?})",
                                    mode, input.connected_players, self.strategy
                                );
                                Some(LobbyPhase::TeamBalancing)
                            }
                            // Forced strategy below its headcount: hold.
                            None => None,
                        }
                    } else {
                        None
                    }
                }
            }
            LobbyPhase::TeamBalancing => {
                if input.connected_players < self.required_players() {
                    Some(LobbyPhase::WaitingForPlayers)
                } else if self.balanced {
                    Some(LobbyPhase::ReadyCheck)
                } else {
                    None
                }
            }
            LobbyPhase::ReadyCheck => {
                if input.assigned_players < self.required_players() {
                    Some(LobbyPhase::WaitingForPlayers)
                } else if input.all_assigned_ready {
                    Some(LobbyPhase::GameStarting)
                } else if self.time_in_phase > self.ready_timeout {
                    info!("Ready check timed out, returning to waiting");
                    Some(LobbyPhase::WaitingForPlayers)
                } else {
                    None
                }
            }
            LobbyPhase::GameStarting => (input.assigned_players < self.required_players())
                .then_some(LobbyPhase::WaitingForPlayers),
            // Both phases leave only on external signals.
            LobbyPhase::InGame | LobbyPhase::PostGame => None,
        };

        next.map(|to| self.enter(to))
    }

    /// External gameplay signal: the match is underway.
    pub fn match_started(&mut self) -> Option<PhaseChange> {
        if self.phase == LobbyPhase::GameStarting {
            Some(self.enter(LobbyPhase::InGame))
        } else {
            debug!("match_started ignored in {:?}", self.phase);
            None
        }
    }

    /// External gameplay signal: the match finished.
    pub fn match_ended(&mut self) -> Option<PhaseChange> {
        if self.phase == LobbyPhase::InGame {
            Some(self.enter(LobbyPhase::PostGame))
        } else {
            debug!("match_ended ignored in {:?}", self.phase);
            None
        }
    }

    /// Operator trigger: leave the podium and reopen the lobby.
    pub fn return_to_lobby(&mut self) -> Option<PhaseChange> {
        if self.phase == LobbyPhase::PostGame {
            Some(self.enter(LobbyPhase::WaitingForPlayers))
        } else {
            debug!("return_to_lobby ignored in {:?}", self.phase);
            None
        }
    }

    fn enter(&mut self, to: LobbyPhase) -> PhaseChange {
        let from = self.phase;
        self.phase = to;
        self.time_in_phase = Duration::ZERO;
        self.balanced = false;
        if to == LobbyPhase::WaitingForPlayers {
            self.mode = None;
        }
        info!("Lobby phase {:?} -> {:?}", from, to);
        PhaseChange { from, to }
    }
}

/// Auto strategy: 2-3 players run singles (the extra becomes an implicit
/// spectator through seat assignment), 4+ run doubles. Forced strategies
/// require their mode's minimum headcount.
fn derive_mode(strategy: MatchmakingStrategy, players: usize) -> Option<GameMode> {
    match strategy {
        MatchmakingStrategy::Auto => match players {
            0..=1 => None,
            2..=3 => Some(GameMode::Singles),
            _ => Some(GameMode::Doubles),
        },
        MatchmakingStrategy::ForcedSingles => (players >= 2).then_some(GameMode::Singles),
        MatchmakingStrategy::ForcedDoubles => (players >= 4).then_some(GameMode::Doubles),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TICK: Duration = Duration::from_millis(50);

    fn machine() -> LobbyStateMachine {
        LobbyStateMachine::new(Duration::from_secs(10), Duration::from_secs(30))
    }

    fn input(connected: usize, assigned: usize, ready: bool) -> LobbyInput {
        LobbyInput {
            connected_players: connected,
            assigned_players: assigned,
            all_assigned_ready: ready,
        }
    }

    #[test]
    fn test_waiting_opens_mode_selection_at_two_players() {
        let mut lobby = machine();
        assert!(lobby.step(&input(1, 0, false), TICK).is_none());
        let change = lobby.step(&input(2, 0, false), TICK).unwrap();
        assert_eq!(change.to, LobbyPhase::ModeSelection);
        // Re-evaluating the satisfied condition must not re-fire.
        assert!(lobby.step(&input(2, 0, false), TICK).is_none());
    }

    #[test]
    fn test_auto_mode_waits_for_the_select_delay() {
        let mut lobby = machine();
        lobby.step(&input(2, 0, false), TICK).unwrap();

        assert!(lobby.step(&input(2, 0, false), Duration::from_secs(9)).is_none());
        let change = lobby.step(&input(2, 0, false), Duration::from_secs(2)).unwrap();
        assert_eq!(change.to, LobbyPhase::TeamBalancing);
        assert_eq!(lobby.mode(), Some(GameMode::Singles));
    }

    #[test]
    fn test_auto_mode_derives_doubles_from_four_players() {
        let mut lobby = machine();
        lobby.step(&input(5, 0, false), TICK).unwrap();
        lobby.step(&input(5, 0, false), Duration::from_secs(11)).unwrap();
        assert_eq!(lobby.mode(), Some(GameMode::Doubles));
    }

    #[test]
    fn test_forced_doubles_gates_on_headcount() {
        let mut lobby = machine();
        lobby.set_strategy(MatchmakingStrategy::ForcedDoubles);
        lobby.step(&input(3, 0, false), TICK).unwrap();

        // Forced strategies skip the delay but still need four players.
        assert!(lobby.step(&input(3, 0, false), TICK).is_none());
        let change = lobby.step(&input(4, 0, false), TICK).unwrap();
        assert_eq!(change.to, LobbyPhase::TeamBalancing);
        assert_eq!(lobby.mode(), Some(GameMode::Doubles));
    }

    #[test]
    fn test_balancing_advances_once_marked() {
        let mut lobby = machine();
        lobby.step(&input(2, 0, false), TICK).unwrap();
        lobby.step(&input(2, 0, false), Duration::from_secs(11)).unwrap();

        assert!(lobby.step(&input(2, 0, false), TICK).is_none());
        lobby.mark_balanced();
        let change = lobby.step(&input(2, 2, false), TICK).unwrap();
        assert_eq!(change.to, LobbyPhase::ReadyCheck);
    }

    #[test]
    fn test_ready_check_completes_when_everyone_is_ready() {
        let mut lobby = ready_check_machine();
        let change = lobby.step(&input(2, 2, true), TICK).unwrap();
        assert_eq!(change.to, LobbyPhase::GameStarting);
    }

    #[test]
    fn test_ready_check_times_out_to_waiting() {
        let mut lobby = ready_check_machine();
        assert!(lobby.step(&input(2, 2, false), Duration::from_secs(29)).is_none());
        let change = lobby.step(&input(2, 2, false), Duration::from_secs(2)).unwrap();
        assert_eq!(change.to, LobbyPhase::WaitingForPlayers);
        assert_eq!(lobby.mode(), None);
    }

    #[test]
    fn test_population_loss_rolls_the_phase_back() {
        let mut lobby = ready_check_machine();
        let change = lobby.step(&input(1, 1, false), TICK).unwrap();
        assert_eq!(change.to, LobbyPhase::WaitingForPlayers);
    }

    #[test]
    fn test_external_signals_only_fire_in_their_phase() {
        let mut lobby = machine();
        assert!(lobby.match_started().is_none());
        assert!(lobby.match_ended().is_none());
        assert!(lobby.return_to_lobby().is_none());

        let mut lobby = ready_check_machine();
        lobby.step(&input(2, 2, true), TICK).unwrap();
        assert_eq!(lobby.match_started().unwrap().to, LobbyPhase::InGame);
        assert_eq!(lobby.match_ended().unwrap().to, LobbyPhase::PostGame);
        assert_eq!(
            lobby.return_to_lobby().unwrap().to,
            LobbyPhase::WaitingForPlayers
        );
    }

    /// A machine advanced to ReadyCheck with two assigned singles players.
    fn ready_check_machine() -> LobbyStateMachine {
        let mut lobby = machine();
        lobby.step(&input(2, 0, false), TICK).unwrap();
        lobby.step(&input(2, 0, false), Duration::from_secs(11)).unwrap();
        lobby.mark_balanced();
        lobby.step(&input(2, 2, false), TICK).unwrap();
        assert_eq!(lobby.phase(), LobbyPhase::ReadyCheck);
        lobby
    }
}
