//! Team balancing.
//!
//! Deterministic assignment of participants to teams and seats. Pure with
//! respect to the spawn allocator: this module hands out logical seats
//! only; physical slot reservation happens later, when spawning.

use protocol::{GameMode, ParticipantId, Role, Team};

/// Balancing input: the subset of a participant record the ranking needs.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub participant_id: ParticipantId,
    pub role: Role,
    pub skill_rating: f32,
}

/// One participant's logical seat after balancing.
///
/// For players, `team` is the assigned team (or `None` when the mode has
/// no seat left for them). For spectators, `team` is the viewing side.
#[derive(Debug, Clone, PartialEq)]
pub struct Assignment {
    pub participant_id: ParticipantId,
    pub role: Role,
    pub team: Option<Team>,
    pub team_slot: u8,
}

/// Singles seats two players, one per side.
const SINGLES_PATTERN: [(Team, u8); 2] = [(Team::A, 0), (Team::B, 0)];

/// Doubles crosses the sorted order so each team pairs a low- and a
/// high-rated player: ranks 0 and 3 on team A, ranks 1 and 2 on team B.
const DOUBLES_PATTERN: [(Team, u8); 4] = [(Team::A, 0), (Team::B, 0), (Team::B, 1), (Team::A, 1)];

/// Assign every candidate a team or viewing side.
///
/// Players are ordered ascending by skill rating (ties broken by
/// participant id so the result is reproducible) and seated by the
/// mode's fixed pattern; the overflow keeps `team = None` and is seated
/// as an implicit spectator by later policy. Spectators skip the ranking
/// and go to whichever viewing side currently holds fewer of them, ties
/// favoring side A.
pub fn balance(candidates: &[Candidate], mode: GameMode) -> Vec<Assignment> {
    let mut players: Vec<&Candidate> = candidates
        .iter()
        .filter(|c| c.role == Role::Player)
        .collect();
    players.sort_by(|a, b| {
        a.skill_rating
            .partial_cmp(&b.skill_rating)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.participant_id.cmp(&b.participant_id))
    });

    let pattern: &[(Team, u8)] = match mode {
        GameMode::Singles => &SINGLES_PATTERN,
        GameMode::Doubles => &DOUBLES_PATTERN,
    };

    let mut assignments = Vec::with_capacity(candidates.len());
    for (rank, candidate) in players.iter().enumerate() {
        let (team, team_slot) = match pattern.get(rank) {
            Some(&(team, slot)) => (Some(team), slot),
            None => (None, 0),
        };
        assignments.push(Assignment {
            participant_id: candidate.participant_id.clone(),
            role: Role::Player,
            team,
            team_slot,
        });
    }

    let mut side_a = 0usize;
    let mut side_b = 0usize;
    for candidate in candidates.iter().filter(|c| c.role == Role::Spectator) {
        let side = if side_a <= side_b {
            side_a += 1;
            Team::A
        } else {
            side_b += 1;
            Team::B
        };
        assignments.push(Assignment {
            participant_id: candidate.participant_id.clone(),
            role: Role::Spectator,
            team: Some(side),
            team_slot: 0,
        });
    }

    assignments
}

#[cfg(test)]
mod tests {
    use super::*;

    fn player(id: &str, rating: f32) -> Candidate {
        Candidate {
            participant_id: id.to_string(),
            role: Role::Player,
            skill_rating: rating,
        }
    }

    fn spectator(id: &str) -> Candidate {
        Candidate {
            participant_id: id.to_string(),
            role: Role::Spectator,
            skill_rating: 0.0,
        }
    }

    fn seat_of(assignments: &[Assignment], id: &str) -> (Option<Team>, u8) {
        let a = assignments
            .iter()
            .find(|a| a.participant_id == id)
            .unwrap();
        (a.team, a.team_slot)
    }

    #[test]
    fn test_doubles_cross_pattern_is_deterministic() {
        let candidates = vec![
            player("P1", 1200.0),
            player("P2", 800.0),
            player("P3", 1500.0),
            player("P4", 900.0),
        ];
        let assignments = balance(&candidates, GameMode::Doubles);

        // Sorted order [800, 900, 1200, 1500] -> A0, B0, B1, A1.
        assert_eq!(seat_of(&assignments, "P2"), (Some(Team::A), 0));
        assert_eq!(seat_of(&assignments, "P4"), (Some(Team::B), 0));
        assert_eq!(seat_of(&assignments, "P1"), (Some(Team::B), 1));
        assert_eq!(seat_of(&assignments, "P3"), (Some(Team::A), 1));
    }

    #[test]
    fn test_singles_overflow_is_left_unassigned() {
        let candidates = vec![
            player("P1", 1000.0),
            player("P2", 900.0),
            player("P3", 1100.0),
        ];
        let assignments = balance(&candidates, GameMode::Singles);

        assert_eq!(seat_of(&assignments, "P2"), (Some(Team::A), 0));
        assert_eq!(seat_of(&assignments, "P1"), (Some(Team::B), 0));
        assert_eq!(seat_of(&assignments, "P3"), (None, 0));
    }

    #[test]
    fn test_spectators_fill_the_smaller_side_ties_favor_a() {
        let candidates = vec![spectator("S1"), spectator("S2"), spectator("S3")];
        let assignments = balance(&candidates, GameMode::Singles);

        assert_eq!(seat_of(&assignments, "S1").0, Some(Team::A));
        assert_eq!(seat_of(&assignments, "S2").0, Some(Team::B));
        assert_eq!(seat_of(&assignments, "S3").0, Some(Team::A));
    }

    #[test]
    fn test_equal_ratings_order_by_id() {
        let candidates = vec![player("P2", 1000.0), player("P1", 1000.0)];
        let assignments = balance(&candidates, GameMode::Singles);
        assert_eq!(seat_of(&assignments, "P1"), (Some(Team::A), 0));
        assert_eq!(seat_of(&assignments, "P2"), (Some(Team::B), 0));
    }
}
