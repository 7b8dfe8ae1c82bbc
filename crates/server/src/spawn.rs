//! Spawn slot allocation.
//!
//! Owns every physical seat on the court and its occupancy. All
//! reservation and release goes through [`SpawnPointAllocator`]; no other
//! code flips occupancy. The allocator is category-pure: falling back to
//! the opposite side when a category is exhausted is caller policy, not
//! allocator behavior.

use crate::config::CourtConfig;
use fixedbitset::FixedBitSet;
use glam::Vec3;
use protocol::{Pose, Team};
use rand::Rng;
use tracing::debug;

/// The seat categories on the court.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SlotCategory {
    TeamAPlayerPrimary,
    TeamAPlayerSecondary,
    TeamBPlayerPrimary,
    TeamBPlayerSecondary,
    TeamASpectator,
    TeamBSpectator,
    PostGameWinner,
    PostGameLoser,
}

impl SlotCategory {
    pub const ALL: [SlotCategory; 8] = [
        SlotCategory::TeamAPlayerPrimary,
        SlotCategory::TeamAPlayerSecondary,
        SlotCategory::TeamBPlayerPrimary,
        SlotCategory::TeamBPlayerSecondary,
        SlotCategory::TeamASpectator,
        SlotCategory::TeamBSpectator,
        SlotCategory::PostGameWinner,
        SlotCategory::PostGameLoser,
    ];

    fn index(self) -> usize {
        match self {
            SlotCategory::TeamAPlayerPrimary => 0,
            SlotCategory::TeamAPlayerSecondary => 1,
            SlotCategory::TeamBPlayerPrimary => 2,
            SlotCategory::TeamBPlayerSecondary => 3,
            SlotCategory::TeamASpectator => 4,
            SlotCategory::TeamBSpectator => 5,
            SlotCategory::PostGameWinner => 6,
            SlotCategory::PostGameLoser => 7,
        }
    }

    /// Player seat category for a team and team slot (0 = primary).
    pub fn player(team: Team, team_slot: u8) -> SlotCategory {
        match (team, team_slot) {
            (Team::A, 0) => SlotCategory::TeamAPlayerPrimary,
            (Team::A, _) => SlotCategory::TeamAPlayerSecondary,
            (Team::B, 0) => SlotCategory::TeamBPlayerPrimary,
            (Team::B, _) => SlotCategory::TeamBPlayerSecondary,
        }
    }

    /// Spectator seat category for a viewing side.
    pub fn spectator(side: Team) -> SlotCategory {
        match side {
            Team::A => SlotCategory::TeamASpectator,
            Team::B => SlotCategory::TeamBSpectator,
        }
    }

    /// Podium category for the post-game phase.
    pub fn podium(winner: bool) -> SlotCategory {
        if winner {
            SlotCategory::PostGameWinner
        } else {
            SlotCategory::PostGameLoser
        }
    }

    /// Same-role category on the opposite side, where one exists.
    /// Callers use this for exhaustion fallback; podium seats have no
    /// side to fall back to.
    pub fn opposite_side(self) -> Option<SlotCategory> {
        match self {
            SlotCategory::TeamAPlayerPrimary => Some(SlotCategory::TeamBPlayerPrimary),
            SlotCategory::TeamAPlayerSecondary => Some(SlotCategory::TeamBPlayerSecondary),
            SlotCategory::TeamBPlayerPrimary => Some(SlotCategory::TeamAPlayerPrimary),
            SlotCategory::TeamBPlayerSecondary => Some(SlotCategory::TeamAPlayerSecondary),
            SlotCategory::TeamASpectator => Some(SlotCategory::TeamBSpectator),
            SlotCategory::TeamBSpectator => Some(SlotCategory::TeamASpectator),
            SlotCategory::PostGameWinner | SlotCategory::PostGameLoser => None,
        }
    }
}

/// One physical seat: fixed pose, category, occupancy tracked separately.
#[derive(Debug, Clone)]
pub struct SpawnSlot {
    pub category: SlotCategory,
    pub pose: Pose,
}

/// Proof of a successful reservation.
#[derive(Debug, Clone, Copy)]
pub struct SlotHandle {
    pub index: usize,
    pub category: SlotCategory,
    pub pose: Pose,
}

/// Pool of mutually-exclusive positioned seats.
#[derive(Debug)]
pub struct SpawnPointAllocator {
    slots: Vec<SpawnSlot>,
    occupied: FixedBitSet,
    by_category: [Vec<usize>; 8],
}

impl SpawnPointAllocator {
    /// Build the allocator from the configured court layout. Slot indices
    /// are assigned category by category in a fixed order, so a given
    /// layout always produces the same indices.
    pub fn from_config(court: &CourtConfig) -> Self {
        let mut slots = Vec::new();
        let mut by_category: [Vec<usize>; 8] = Default::default();

        let groups: [(SlotCategory, &[crate::config::SlotPose]); 8] = [
            (SlotCategory::TeamAPlayerPrimary, &court.team_a_primary),
            (SlotCategory::TeamAPlayerSecondary, &court.team_a_secondary),
            (SlotCategory::TeamBPlayerPrimary, &court.team_b_primary),
            (SlotCategory::TeamBPlayerSecondary, &court.team_b_secondary),
            (SlotCategory::TeamASpectator, &court.team_a_spectators),
            (SlotCategory::TeamBSpectator, &court.team_b_spectators),
            (SlotCategory::PostGameWinner, &court.winner_podium),
            (SlotCategory::PostGameLoser, &court.loser_podium),
        ];

        for (category, poses) in groups {
            for slot_pose in poses {
                let index = slots.len();
                slots.push(SpawnSlot {
                    category,
                    pose: slot_pose.pose(),
                });
                by_category[category.index()].push(index);
            }
        }

        let occupied = FixedBitSet::with_capacity(slots.len());
        Self {
            slots,
            occupied,
            by_category,
        }
    }

    /// Reserve a uniformly random free seat of the given category.
    pub fn reserve_random(&mut self, category: SlotCategory) -> Option<SlotHandle> {
        let free: Vec<usize> = self.free_indices(category).collect();
        if free.is_empty() {
            debug!("Category {:?} exhausted", category);
            return None;
        }
        let mut rng = rand::rng();
        let index = free[rng.random_range(0..free.len())];
        Some(self.take(index))
    }

    /// Reserve the free seat of the category closest to `reference`.
    /// Ties break toward the lowest slot index.
    pub fn reserve_nearest(
        &mut self,
        category: SlotCategory,
        reference: Vec3,
    ) -> Option<SlotHandle> {
        let mut best: Option<(usize, f32)> = None;
        for index in self.free_indices(category) {
            let dist = self.slots[index].pose.position.distance_squared(reference);
            // Strict comparison keeps the lowest index on equal distance.
            if best.is_none_or(|(_, best_dist)| dist < best_dist) {
                best = Some((index, dist));
            }
        }
        best.map(|(index, _)| self.take(index))
    }

    /// Reserve a specific seat if it is free. Used to put a reconnecting
    /// participant back where they were.
    pub fn reserve_by_index(&mut self, index: usize) -> Option<SlotHandle> {
        if index >= self.slots.len() || self.occupied.contains(index) {
            return None;
        }
        Some(self.take(index))
    }

    /// Release a seat. Releasing an already-free seat is a no-op.
    pub fn release(&mut self, index: usize) {
        if index >= self.slots.len() {
            debug!("Release of out-of-range slot {}", index);
            return;
        }
        self.occupied.set(index, false);
    }

    pub fn is_occupied(&self, index: usize) -> bool {
        index < self.slots.len() && self.occupied.contains(index)
    }

    /// Category of a seat by index, regardless of occupancy.
    pub fn category_of(&self, index: usize) -> Option<SlotCategory> {
        self.slots.get(index).map(|slot| slot.category)
    }

    /// Free every seat.
    pub fn reset(&mut self) {
        self.occupied.clear();
    }

    pub fn free_count(&self, category: SlotCategory) -> usize {
        self.free_indices(category).count()
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    fn free_indices(&self, category: SlotCategory) -> impl Iterator<Item = usize> + '_ {
        self.by_category[category.index()]
            .iter()
            .copied()
            .filter(|&index| !self.occupied.contains(index))
    }

    fn take(&mut self, index: usize) -> SlotHandle {
        self.occupied.insert(index);
        let slot = &self.slots[index];
        SlotHandle {
            index,
            category: slot.category,
            pose: slot.pose,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CourtConfig, SlotPose};

    fn test_court() -> CourtConfig {
        CourtConfig {
            team_a_primary: vec![SlotPose::new([-1.0, 0.0, -5.0], 0.0)],
            team_a_secondary: vec![SlotPose::new([1.0, 0.0, -5.0], 0.0)],
            team_b_primary: vec![SlotPose::new([1.0, 0.0, 5.0], 180.0)],
            team_b_secondary: vec![SlotPose::new([-1.0, 0.0, 5.0], 180.0)],
            team_a_spectators: vec![
                SlotPose::new([-6.0, 0.0, -2.0], 90.0),
                SlotPose::new([-6.0, 0.0, 0.0], 90.0),
                SlotPose::new([-6.0, 0.0, 2.0], 90.0),
            ],
            team_b_spectators: vec![
                SlotPose::new([6.0, 0.0, -2.0], 270.0),
                SlotPose::new([6.0, 0.0, 0.0], 270.0),
            ],
            winner_podium: vec![SlotPose::new([0.0, 0.5, 0.0], 90.0)],
            loser_podium: vec![SlotPose::new([0.0, 0.0, 2.0], 90.0)],
        }
    }

    #[test]
    fn test_random_reservations_are_exclusive() {
        let mut alloc = SpawnPointAllocator::from_config(&test_court());
        let mut seen = Vec::new();
        for _ in 0..3 {
            let handle = alloc.reserve_random(SlotCategory::TeamASpectator).unwrap();
            assert_eq!(handle.category, SlotCategory::TeamASpectator);
            assert!(!seen.contains(&handle.index), "slot handed out twice");
            seen.push(handle.index);
        }
        assert!(alloc.reserve_random(SlotCategory::TeamASpectator).is_none());
    }

    #[test]
    fn test_nearest_prefers_lowest_index_on_tie() {
        let mut alloc = SpawnPointAllocator::from_config(&test_court());
        // Equidistant from the two B spectator seats (z = 0 and z = 2).
        let reference = Vec3::new(6.0, 0.0, 1.0);
        let handle = alloc
            .reserve_nearest(SlotCategory::TeamBSpectator, reference)
            .unwrap();
        let first_b_index = alloc
            .slots
            .iter()
            .position(|s| s.category == SlotCategory::TeamBSpectator)
            .unwrap();
        assert_eq!(handle.index, first_b_index);
    }

    #[test]
    fn test_nearest_picks_closest_free_seat() {
        let mut alloc = SpawnPointAllocator::from_config(&test_court());
        let reference = Vec3::new(-6.0, 0.0, 2.0);
        let handle = alloc
            .reserve_nearest(SlotCategory::TeamASpectator, reference)
            .unwrap();
        assert_eq!(alloc.slots[handle.index].pose.position, reference);

        // With that seat taken the next nearest wins.
        let second = alloc
            .reserve_nearest(SlotCategory::TeamASpectator, reference)
            .unwrap();
        assert_eq!(
            alloc.slots[second.index].pose.position,
            Vec3::new(-6.0, 0.0, 0.0)
        );
    }

    #[test]
    fn test_reserve_by_index_fails_when_occupied() {
        let mut alloc = SpawnPointAllocator::from_config(&test_court());
        let handle = alloc.reserve_random(SlotCategory::TeamAPlayerPrimary).unwrap();
        assert!(alloc.reserve_by_index(handle.index).is_none());
        alloc.release(handle.index);
        assert!(alloc.reserve_by_index(handle.index).is_some());
    }

    #[test]
    fn test_release_is_idempotent() {
        let mut alloc = SpawnPointAllocator::from_config(&test_court());
        let handle = alloc.reserve_random(SlotCategory::PostGameWinner).unwrap();
        alloc.release(handle.index);
        alloc.release(handle.index);
        assert!(!alloc.is_occupied(handle.index));
        assert_eq!(alloc.free_count(SlotCategory::PostGameWinner), 1);
    }

    #[test]
    fn test_reset_frees_every_seat() {
        let mut alloc = SpawnPointAllocator::from_config(&test_court());
        for category in SlotCategory::ALL {
            while alloc.reserve_random(category).is_some() {}
        }
        alloc.reset();
        for category in SlotCategory::ALL {
            assert!(alloc.free_count(category) > 0);
        }
    }
}
