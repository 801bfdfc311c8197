//! Battle parameters, fixed before the battle starts.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::game::{PlayerId, TeamId};

const MAX_MAP_HALF_HEIGHT: u32 = 100;

/// Which players an energy wave may hit besides enemies.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum WavePolicy {
    /// Teammates are spared only when the attacker is AI-controlled. A human's wave
    /// hits everyone on its side except the human itself.
    #[default]
    SpareTeammatesForAi,
    /// Teammates are never hit.
    SpareTeammates,
}

/// How counter-fire reduces damage that has already been cancelled out.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum CrashPolicy {
    /// Every counter-shot subtracts its full power, so several counters compound.
    #[default]
    Compound,
    /// A counter-shot never pushes the pending value below minus its own power.
    Clamped,
}

/// Direct adjustment applied once before round one.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct Tweak {
    pub players: Vec<PlayerId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hp: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub energy: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub team: Option<TeamId>,
}

impl Tweak {
    pub fn for_players(players: impl IntoIterator<Item = PlayerId>) -> Self {
        Self {
            players: players.into_iter().collect(),
            ..Self::default()
        }
    }

    pub fn hp(mut self, hp: u32) -> Self {
        self.hp = Some(hp);
        self
    }

    pub fn energy(mut self, energy: i32) -> Self {
        self.energy = Some(energy);
        self
    }

    pub fn position(mut self, position: i32) -> Self {
        self.position = Some(position);
        self
    }

    pub fn team(mut self, team: TeamId) -> Self {
        self.team = Some(team);
        self
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config parse error: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("map half-height {value} exceeds the limit of {limit}")]
    MapTooLarge { value: u32, limit: u32 },
    #[error("tweak #{index} is invalid: {reason}")]
    InvalidTweak { index: usize, reason: String },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct BattleConfig {
    pub num_players: u32,
    pub human_players: u32,
    pub map_half_height: u32,
    pub initial_hp: u32,
    pub shoot_range: u32,
    pub wave_range: u32,
    /// Players per AI team; 1 means every AI fights alone.
    pub team_size: u32,
    /// Whether the first AI team fights alongside the humans.
    pub assist_team: bool,
    pub wave_policy: WavePolicy,
    pub crash_policy: CrashPolicy,
    /// Players left without any usable action are eliminated in that round.
    pub eliminate_idle: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tweaks: Vec<Tweak>,
}

impl Default for BattleConfig {
    fn default() -> Self {
        Self {
            num_players: 10,
            human_players: 1,
            map_half_height: 1,
            initial_hp: 1,
            shoot_range: 1,
            wave_range: 99_999,
            team_size: 1,
            assist_team: false,
            wave_policy: WavePolicy::default(),
            crash_policy: CrashPolicy::default(),
            eliminate_idle: true,
            tweaks: Vec::new(),
        }
    }
}

impl BattleConfig {
    /// All-AI battle of `num_players`, otherwise default parameters.
    pub fn ai_only(num_players: u32) -> Self {
        Self {
            num_players,
            human_players: 0,
            ..Self::default()
        }
    }

    pub fn with_tweak(mut self, tweak: Tweak) -> Self {
        self.tweaks.push(tweak);
        self
    }

    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: BattleConfig = serde_json::from_str(json)?;
        config.validated()
    }

    /// Normalizes recoverable settings and rejects the rest.
    pub fn validated(mut self) -> Result<Self, ConfigError> {
        if self.team_size == 0 {
            self.team_size = 1;
        }
        if self.human_players > self.num_players {
            tracing::warn!(
                human_players = self.human_players,
                num_players = self.num_players,
                "more humans than players, clamping"
            );
            self.human_players = self.num_players;
        }
        if self.map_half_height > MAX_MAP_HALF_HEIGHT {
            return Err(ConfigError::MapTooLarge {
                value: self.map_half_height,
                limit: MAX_MAP_HALF_HEIGHT,
            });
        }

        let map = self.map_half_height as i32;
        for (index, tweak) in self.tweaks.iter().enumerate() {
            let invalid = |reason: String| ConfigError::InvalidTweak { index, reason };
            if tweak.players.is_empty() {
                return Err(invalid("no target players".into()));
            }
            if let Some(id) = tweak
                .players
                .iter()
                .find(|id| **id == 0 || **id > self.num_players)
            {
                return Err(invalid(format!("player {id} does not exist")));
            }
            if tweak.hp == Some(0) {
                return Err(invalid("hp must stay above zero".into()));
            }
            if let Some(position) = tweak.position {
                if position.abs() > map {
                    return Err(invalid(format!("position {position} is outside the map")));
                }
            }
        }

        Ok(self)
    }
}
