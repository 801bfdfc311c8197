use std::cmp::Reverse;
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::actions::{Act, ActionKind, Surroundings};
use super::snapshot::Snapshot;
use crate::config::{BattleConfig, ConfigError};
use crate::presenter::{Arg, Message, Style};

/// 玩家标识，从 1 开始连续分配。
pub type PlayerId = u32;
/// 队伍标识。0 号队伍属于人类玩家及其盟友。
pub type TeamId = u32;
/// 行动在本回合登记表中的下标。
pub type ActIndex = usize;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DamageRecord {
    pub amount: u32,
    pub source: PlayerId,
    pub cause: ActionKind,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum DefenseState {
    #[default]
    None,
    Blocking,
    Reflecting,
}

/// Where a committed act sits in the registry.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct ActSlot {
    pub kind: ActionKind,
    pub index: ActIndex,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Player {
    pub id: PlayerId,
    pub hp: u32,
    pub energy: i32,
    pub position: i32,
    pub team: TeamId,
    pub human: bool,
    #[serde(default)]
    pub damage_dealt: u32,
    #[serde(default)]
    pub damage_log: Vec<DamageRecord>,
    #[serde(default)]
    pub kills: Vec<PlayerId>,
    /// 被黑洞封印的行动，跨回合保留。
    #[serde(default)]
    pub disabled: Vec<ActionKind>,
    #[serde(default)]
    pub defense: DefenseState,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub acts: Vec<ActSlot>,
}

/// Actions a player may currently choose, with the AI weight of each.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct UsableActions {
    pub kinds: Vec<ActionKind>,
    pub weights: Vec<f64>,
}

impl UsableActions {
    pub fn is_empty(&self) -> bool {
        self.kinds.is_empty()
    }

    pub fn contains(&self, kind: ActionKind) -> bool {
        self.kinds.contains(&kind)
    }

    pub fn iter(&self) -> impl Iterator<Item = (ActionKind, f64)> + '_ {
        self.kinds.iter().copied().zip(self.weights.iter().copied())
    }
}

impl Player {
    pub fn new(id: PlayerId, hp: u32) -> Self {
        Self {
            id,
            hp,
            energy: 0,
            position: 0,
            team: 0,
            human: false,
            damage_dealt: 0,
            damage_log: Vec::new(),
            kills: Vec::new(),
            disabled: Vec::new(),
            defense: DefenseState::None,
            acts: Vec::new(),
        }
    }

    pub fn human(id: PlayerId, hp: u32) -> Self {
        Self {
            human: true,
            ..Self::new(id, hp)
        }
    }

    pub fn with_team(mut self, team: TeamId) -> Self {
        self.team = team;
        self
    }

    pub fn with_energy(mut self, energy: i32) -> Self {
        self.energy = energy;
        self
    }

    pub fn at(mut self, position: i32) -> Self {
        self.position = position;
        self
    }

    pub fn is_alive(&self) -> bool {
        self.hp > 0
    }

    /// Applies damage clamped to the remaining hp and returns what was actually taken.
    /// Only non-zero damage is logged.
    pub fn hurt(&mut self, amount: u32, source: PlayerId, cause: ActionKind) -> u32 {
        let taken = amount.min(self.hp);
        self.hp -= taken;
        if taken > 0 {
            self.damage_log.push(DamageRecord {
                amount: taken,
                source,
                cause,
            });
        }
        taken
    }

    pub fn last_damage(&self) -> Option<&DamageRecord> {
        self.damage_log.last()
    }

    pub fn disable(&mut self, kind: ActionKind) {
        if !self.disabled.contains(&kind) {
            self.disabled.push(kind);
        }
    }

    pub fn is_disabled(&self, kind: ActionKind) -> bool {
        self.disabled.contains(&kind)
    }

    pub fn surroundings(&self, snapshot: &Snapshot, config: &BattleConfig) -> Surroundings {
        let nearby = self.position - 1..=self.position + 1;
        let nearby_enemies = snapshot.enemies_on(nearby.clone(), self.team);
        let nearby_enemy_energy = snapshot.enemy_energy_on(nearby, self.team);

        let enemy_ratio = if snapshot.total_population > 0 {
            nearby_enemies as f64 / snapshot.total_population as f64
        } else {
            0.0
        };
        let energy_ratio = if snapshot.total_energy > 0 {
            f64::from(nearby_enemy_energy) / f64::from(snapshot.total_energy)
        } else {
            0.0
        };

        Surroundings {
            energy: self.energy,
            nearby_enemies,
            enemy_ratio,
            nearby_enemy_energy,
            energy_ratio,
            map_half_height: config.map_half_height,
        }
    }

    pub fn usable_actions(&self, snapshot: &Snapshot, config: &BattleConfig) -> UsableActions {
        let around = self.surroundings(snapshot, config);
        let mut usable = UsableActions::default();
        for kind in ActionKind::ALL {
            if kind.human_only() || self.is_disabled(kind) || !kind.is_available(&around) {
                continue;
            }
            usable.kinds.push(kind);
            usable.weights.push(kind.ai_weight(&around) * kind.importance());
        }
        usable
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Outcome {
    PlayerWins { player: PlayerId },
    TeamWins { team: TeamId },
    NoSurvivors,
    Abandoned { by: PlayerId },
}

/// Internal inconsistency noticed while resolving a round. Never fatal.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Error)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Fault {
    #[error("player {player} cannot afford {kind:?}: costs {cost}, has {energy}")]
    Unaffordable {
        player: PlayerId,
        kind: ActionKind,
        cost: i32,
        energy: i32,
    },
    #[error("player {player} found no eligible target for {kind:?}")]
    NoTarget { player: PlayerId, kind: ActionKind },
    #[error("selection of {kind:?} for player {player} never committed")]
    SelectionStalled { player: PlayerId, kind: ActionKind },
    #[error("player {player} stands outside the map at level {position}")]
    OutOfBounds { player: PlayerId, position: i32 },
    #[error("player {player} is not on the roster")]
    MissingPlayer { player: PlayerId },
}

/// Everything a round mutates, minus the presenter and the random source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BattleState {
    pub config: BattleConfig,
    pub players: BTreeMap<PlayerId, Player>,
    /// 按优先级降序稳定排序的本回合行动。
    pub registry: Vec<Act>,
    pub snapshot: Snapshot,
    pub round: u32,
    /// Messages produced while dealing, waiting to be flushed.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub outbox: Vec<Message>,
    #[serde(default)]
    pub diagnostics: Vec<Fault>,
    #[serde(default)]
    pub idle: Vec<PlayerId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outcome: Option<Outcome>,
}

impl BattleState {
    /// Validates `config`, builds the roster, applies the pre-battle tweaks and takes
    /// the first snapshot.
    pub fn new(config: BattleConfig) -> Result<Self, ConfigError> {
        let config = config.validated()?;
        let mut players = Self::roster(&config);
        for tweak in &config.tweaks {
            for id in &tweak.players {
                let Some(player) = players.get_mut(id) else {
                    continue;
                };
                if let Some(hp) = tweak.hp {
                    player.hp = hp;
                }
                if let Some(energy) = tweak.energy {
                    player.energy = energy;
                }
                if let Some(position) = tweak.position {
                    player.position = position;
                }
                if let Some(team) = tweak.team {
                    player.team = team;
                }
            }
        }

        Ok(Self::from_players(config, players.into_values()))
    }

    /// State over an explicit roster. The config's roster settings and tweaks are
    /// not applied.
    pub fn from_players(config: BattleConfig, players: impl IntoIterator<Item = Player>) -> Self {
        let players: BTreeMap<PlayerId, Player> =
            players.into_iter().map(|player| (player.id, player)).collect();
        let snapshot = Snapshot::capture(players.values());
        Self {
            config,
            players,
            registry: Vec::new(),
            snapshot,
            round: 0,
            outbox: Vec::new(),
            diagnostics: Vec::new(),
            idle: Vec::new(),
            outcome: None,
        }
    }

    /// Humans first, all in team 0. AIs fill teams of `team_size`, starting at
    /// team 1, or team 0 when they assist the humans.
    pub fn roster(config: &BattleConfig) -> BTreeMap<PlayerId, Player> {
        let team_size = config.team_size.max(1);
        let first_ai_team = if config.assist_team { 0 } else { 1 };

        (1..=config.num_players)
            .map(|id| {
                let player = if id <= config.human_players {
                    Player::human(id, config.initial_hp)
                } else {
                    let ai_rank = id - config.human_players - 1;
                    Player::new(id, config.initial_hp).with_team(first_ai_team + ai_rank / team_size)
                };
                (id, player)
            })
            .collect()
    }

    pub fn player(&self, id: PlayerId) -> Option<&Player> {
        self.players.get(&id)
    }

    pub fn say(&mut self, message: Message) {
        self.outbox.push(message);
    }

    pub fn emit(&mut self, key: impl Into<String>, args: Vec<Arg>, style: Style) {
        self.say(Message::new(key, args).styled(style));
    }

    pub fn fault(&mut self, fault: Fault) {
        tracing::warn!(round = self.round, %fault, "resolution fault");
        self.diagnostics.push(fault);
    }

    /// Clears everything that only lives for one round.
    pub fn clean_round(&mut self) {
        self.registry.clear();
        self.idle.clear();
        for player in self.players.values_mut() {
            player.acts.clear();
            player.defense = DefenseState::None;
        }
    }

    /// Appends acts in selection order, re-sorts the registry by priority and
    /// rebuilds every player's act slots.
    pub fn register(&mut self, acts: impl IntoIterator<Item = Act>) {
        self.registry.extend(acts);
        self.registry.sort_by_key(|act| Reverse(act.kind.priority()));

        for player in self.players.values_mut() {
            player.acts.clear();
        }
        for (index, act) in self.registry.iter().enumerate() {
            if let Some(owner) = self.players.get_mut(&act.owner) {
                owner.acts.push(ActSlot {
                    kind: act.kind,
                    index,
                });
            }
        }
    }

    /// Pays the act at `index` from its owner's energy, at most once.
    pub fn pay(&mut self, index: ActIndex) {
        let Some(act) = self.registry.get_mut(index) else {
            return;
        };
        if let Some(owner) = self.players.get_mut(&act.owner) {
            act.pay(owner);
        }
    }

    /// Damages `victim` and credits `source` with what was actually taken.
    pub fn hurt(&mut self, victim: PlayerId, amount: u32, source: PlayerId, cause: ActionKind) -> u32 {
        let Some(player) = self.players.get_mut(&victim) else {
            self.fault(Fault::MissingPlayer { player: victim });
            return 0;
        };
        let taken = player.hurt(amount, source, cause);
        if let Some(attacker) = self.players.get_mut(&source) {
            attacker.damage_dealt += taken;
        }
        taken
    }

    pub fn refresh_snapshot(&mut self) {
        self.snapshot = Snapshot::capture(self.players.values());
    }

    pub fn out_of_bounds(&self) -> Vec<Fault> {
        let map = self.config.map_half_height as i32;
        self.players
            .values()
            .filter(|player| player.position.abs() > map)
            .map(|player| Fault::OutOfBounds {
                player: player.id,
                position: player.position,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Tweak;
    use crate::game::actions::Direction;

    #[test]
    fn hurt_clamps_and_logs_only_real_damage() {
        let mut player = Player::new(1, 2);
        assert_eq!(player.hurt(5, 2, ActionKind::Shoot), 2);
        assert_eq!(player.hp, 0);
        assert_eq!(player.hurt(3, 4, ActionKind::Wave), 0);
        assert_eq!(player.damage_log.len(), 1, "zero damage must not be logged");
        let last = player.last_damage().expect("lethal blow should be logged");
        assert_eq!((last.amount, last.source), (2, 2));
    }

    #[test]
    fn roster_puts_humans_first_and_groups_ai_teams() {
        let config = BattleConfig {
            num_players: 7,
            human_players: 2,
            team_size: 2,
            ..BattleConfig::default()
        };
        let roster = BattleState::roster(&config);
        let teams: Vec<(bool, TeamId)> = roster.values().map(|p| (p.human, p.team)).collect();
        assert_eq!(
            teams,
            vec![(true, 0), (true, 0), (false, 1), (false, 1), (false, 2), (false, 2), (false, 3)]
        );
    }

    #[test]
    fn assisting_ai_joins_team_zero() {
        let config = BattleConfig {
            num_players: 3,
            human_players: 1,
            team_size: 2,
            assist_team: true,
            ..BattleConfig::default()
        };
        let roster = BattleState::roster(&config);
        assert_eq!(roster[&2].team, 0);
        assert_eq!(roster[&3].team, 0);
    }

    #[test]
    fn tweaks_apply_before_first_snapshot() {
        let config = BattleConfig {
            map_half_height: 2,
            ..BattleConfig::ai_only(3)
        }
        .with_tweak(Tweak::for_players([1, 2]).energy(4).position(-2));
        let state = BattleState::new(config).expect("tweaks are valid");
        assert_eq!(state.players[&2].energy, 4);
        let seen = state.snapshot.player(1).expect("player 1 should be captured");
        assert_eq!((seen.energy, seen.position), (4, -2));
        assert_eq!(state.snapshot.total_energy, 8);
    }

    #[test]
    fn invalid_config_never_reaches_the_roster() {
        let unknown = BattleConfig::ai_only(2).with_tweak(Tweak::for_players([5]).energy(3));
        assert!(matches!(
            BattleState::new(unknown),
            Err(ConfigError::InvalidTweak { index: 0, .. })
        ));

        let huge = BattleConfig {
            map_half_height: 101,
            ..BattleConfig::ai_only(2)
        };
        assert!(matches!(
            BattleState::new(huge),
            Err(ConfigError::MapTooLarge { value: 101, .. })
        ));
    }

    #[test]
    fn registry_orders_by_priority_then_selection() {
        let players = (1..=4).map(|id| Player::new(id, 1).with_energy(5));
        let mut state = BattleState::from_players(BattleConfig::ai_only(4), players);
        state.register([
            Act::shot(1, 2, 1, Direction::Level, 1),
            Act::new(2, ActionKind::Defend),
            Act::new(3, ActionKind::Charge),
            Act::black_hole(4, 1),
        ]);
        let order: Vec<PlayerId> = state.registry.iter().map(|act| act.owner).collect();
        assert_eq!(order, vec![4, 2, 3, 1]);
        assert_eq!(state.players[&1].acts[0].index, 3);
    }

    #[test]
    fn paying_twice_charges_once() {
        let players = [Player::new(1, 1).with_energy(3)];
        let mut state = BattleState::from_players(BattleConfig::ai_only(1), players);
        state.register([Act::shot(1, 2, 3, Direction::Level, 1)]);
        state.pay(0);
        state.pay(0);
        assert_eq!(state.players[&1].energy, 0);
    }

    #[test]
    fn usable_actions_respect_blacklist_and_energy() {
        let players = [
            Player::new(1, 1).with_energy(2).with_team(1),
            Player::new(2, 1).with_team(2),
        ];
        let mut state = BattleState::from_players(BattleConfig::ai_only(2), players);
        state.players.get_mut(&1).expect("player 1").disable(ActionKind::Defend);
        state.refresh_snapshot();

        let usable = state.players[&1].usable_actions(&state.snapshot, &state.config);
        assert!(usable.contains(ActionKind::Shoot));
        assert!(usable.contains(ActionKind::Reflect));
        assert!(!usable.contains(ActionKind::Defend));
        assert!(!usable.contains(ActionKind::Wave));
        assert!(!usable.contains(ActionKind::ShowStatus));
        assert_eq!(usable.kinds.len(), usable.weights.len());
    }
}
