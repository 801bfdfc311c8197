//! Per-round picture of the battlefield.
//!
//! Captured once before dealing and rebuilt from scratch after the sweep, so every
//! selection in a round sees the same frozen world.

use std::collections::{BTreeMap, BTreeSet};
use std::ops::RangeInclusive;

use serde::{Deserialize, Serialize};

use super::state::{Player, PlayerId, TeamId};

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct LevelPopulation {
    pub by_team: BTreeMap<TeamId, Vec<PlayerId>>,
    pub all: Vec<PlayerId>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct LevelEnergy {
    pub by_team: BTreeMap<TeamId, i32>,
    pub total: i32,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct PlayerSnapshot {
    pub hp: u32,
    pub energy: i32,
    pub position: i32,
    pub team: TeamId,
    pub human: bool,
}

impl From<&Player> for PlayerSnapshot {
    fn from(player: &Player) -> Self {
        Self {
            hp: player.hp,
            energy: player.energy,
            position: player.position,
            team: player.team,
            human: player.human,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Snapshot {
    pub population: BTreeMap<i32, LevelPopulation>,
    pub energy: BTreeMap<i32, LevelEnergy>,
    pub total_population: usize,
    pub total_energy: i32,
    pub players: BTreeMap<PlayerId, PlayerSnapshot>,
}

impl Snapshot {
    pub fn capture<'a>(players: impl IntoIterator<Item = &'a Player>) -> Self {
        let mut snapshot = Snapshot::default();
        for player in players {
            let level = snapshot.population.entry(player.position).or_default();
            level.by_team.entry(player.team).or_default().push(player.id);
            level.all.push(player.id);

            let energy = snapshot.energy.entry(player.position).or_default();
            *energy.by_team.entry(player.team).or_default() += player.energy;
            energy.total += player.energy;

            snapshot.total_population += 1;
            snapshot.total_energy += player.energy;
            snapshot.players.insert(player.id, PlayerSnapshot::from(player));
        }
        snapshot
    }

    pub fn player(&self, id: PlayerId) -> Option<&PlayerSnapshot> {
        self.players.get(&id)
    }

    pub fn contains(&self, id: PlayerId) -> bool {
        self.players.contains_key(&id)
    }

    pub fn level(&self, level: i32) -> Option<&LevelPopulation> {
        self.population.get(&level)
    }

    pub fn population_at(&self, level: i32) -> usize {
        self.level(level).map_or(0, |population| population.all.len())
    }

    pub fn team_population_at(&self, level: i32, team: TeamId) -> usize {
        self.level(level)
            .and_then(|population| population.by_team.get(&team))
            .map_or(0, Vec::len)
    }

    pub fn energy_at(&self, level: i32) -> i32 {
        self.energy.get(&level).map_or(0, |energy| energy.total)
    }

    pub fn team_energy_at(&self, level: i32, team: TeamId) -> i32 {
        self.energy
            .get(&level)
            .and_then(|energy| energy.by_team.get(&team))
            .copied()
            .unwrap_or(0)
    }

    /// Players outside `team` standing on `levels`.
    pub fn enemies_on(&self, levels: RangeInclusive<i32>, team: TeamId) -> usize {
        levels
            .map(|level| self.population_at(level) - self.team_population_at(level, team))
            .sum()
    }

    pub fn enemy_energy_on(&self, levels: RangeInclusive<i32>, team: TeamId) -> i32 {
        levels
            .map(|level| self.energy_at(level) - self.team_energy_at(level, team))
            .sum()
    }

    /// Every id standing on `levels`, level by level from the lowest.
    pub fn ids_on(&self, levels: RangeInclusive<i32>) -> Vec<PlayerId> {
        self.population
            .range(levels)
            .flat_map(|(_, population)| population.all.iter().copied())
            .collect()
    }

    pub fn all_ids(&self) -> Vec<PlayerId> {
        self.players.keys().copied().collect()
    }

    pub fn teams(&self) -> BTreeSet<TeamId> {
        self.population
            .values()
            .flat_map(|population| population.by_team.keys().copied())
            .collect()
    }
}
