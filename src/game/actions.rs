use std::cmp::Ordering;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::crossfire::{self, CrossfireStream};
use super::effects::{self, Step};
use super::state::{Player, PlayerId};
use crate::presenter::Style;

/// Resolution order of Black Hole: ahead of everything it might swallow.
pub const BLACK_HOLE_PRIORITY: i32 = 9999;
pub const MAX_SHOT_LEVEL: u32 = 3;
pub const WAVE_POWER: u32 = 5;
pub const MOVE_STEP: i32 = 1;

/// Every kind of action a player may pick in a round.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    Charge,
    Shoot,
    Defend,
    Move,
    Reflect,
    Wave,
    BlackHole,
    ShowRules,
    ShowStatus,
    Surrender,
}

impl ActionKind {
    pub const ALL: [ActionKind; 10] = [
        ActionKind::Charge,
        ActionKind::Shoot,
        ActionKind::Defend,
        ActionKind::Move,
        ActionKind::Reflect,
        ActionKind::Wave,
        ActionKind::BlackHole,
        ActionKind::ShowRules,
        ActionKind::ShowStatus,
        ActionKind::Surrender,
    ];

    /// Short code typed at the selection prompt.
    pub fn code(self) -> &'static str {
        match self {
            ActionKind::Charge => "1",
            ActionKind::Shoot => "2",
            ActionKind::Defend => "3",
            ActionKind::Move => "4",
            ActionKind::Reflect => "5",
            ActionKind::Wave => "6",
            ActionKind::BlackHole => "7",
            ActionKind::ShowRules => "rl",
            ActionKind::ShowStatus => "stt",
            ActionKind::Surrender => "bk",
        }
    }

    /// Message key prefix.
    pub fn key(self) -> &'static str {
        match self {
            ActionKind::Charge => "charge",
            ActionKind::Shoot => "shoot",
            ActionKind::Defend => "defend",
            ActionKind::Move => "move",
            ActionKind::Reflect => "reflect",
            ActionKind::Wave => "wave",
            ActionKind::BlackHole => "black-hole",
            ActionKind::ShowRules => "rules",
            ActionKind::ShowStatus => "status",
            ActionKind::Surrender => "surrender",
        }
    }

    pub fn message_key(self, suffix: &str) -> String {
        format!("{}.{suffix}", self.key())
    }

    pub fn priority(self) -> i32 {
        match self {
            ActionKind::BlackHole => BLACK_HOLE_PRIORITY,
            ActionKind::Defend | ActionKind::Reflect => 2,
            ActionKind::Move => 1,
            ActionKind::Shoot | ActionKind::Wave => -1,
            ActionKind::Charge
            | ActionKind::ShowRules
            | ActionKind::ShowStatus
            | ActionKind::Surrender => 0,
        }
    }

    pub fn channel(self) -> Channel {
        match self {
            ActionKind::Shoot | ActionKind::Wave => Channel::Ranged,
            _ => Channel::Immediate,
        }
    }

    pub fn style(self) -> Style {
        match self {
            ActionKind::Charge => Style::Yellow,
            ActionKind::Shoot => Style::Red,
            ActionKind::Defend | ActionKind::Wave => Style::Cyan,
            ActionKind::Move => Style::Green,
            ActionKind::Reflect | ActionKind::BlackHole => Style::Magenta,
            ActionKind::ShowRules | ActionKind::ShowStatus | ActionKind::Surrender => Style::White,
        }
    }

    /// Utility actions only a human can pick; they never reach the registry.
    pub fn human_only(self) -> bool {
        matches!(
            self,
            ActionKind::ShowRules | ActionKind::ShowStatus | ActionKind::Surrender
        )
    }

    /// Cost before parameters are known. Shots cost their level, so this is the
    /// cheapest shot. Negative costs give energy.
    pub fn base_cost(self) -> i32 {
        match self {
            ActionKind::Charge => -1,
            ActionKind::Shoot => 1,
            ActionKind::Reflect => 2,
            ActionKind::Wave => 4,
            ActionKind::BlackHole => 5,
            _ => 0,
        }
    }

    pub fn shot_cost(level: u32) -> i32 {
        level as i32
    }

    pub fn is_available(self, around: &Surroundings) -> bool {
        match self {
            ActionKind::Shoot => around.energy >= 1 && around.nearby_enemies > 0,
            ActionKind::Move => around.map_half_height > 0,
            ActionKind::Reflect | ActionKind::Wave | ActionKind::BlackHole => {
                around.energy >= self.base_cost()
            }
            _ => true,
        }
    }

    pub fn ai_weight(self, around: &Surroundings) -> f64 {
        let energy = f64::from(around.energy);
        match self {
            ActionKind::Charge => {
                if around.energy + 1 <= 0 {
                    500.0
                } else {
                    (100.0 / (energy + 1.0) * 3.0).min(500.0)
                }
            }
            ActionKind::Shoot => energy * 100.0,
            ActionKind::Defend => around.energy_ratio * 100.0 + 10.0,
            ActionKind::Move => around.enemy_ratio * 100.0 + 10.0,
            ActionKind::Reflect => around.energy_ratio * 20.0 + 10.0,
            ActionKind::Wave => energy * 1000.0,
            ActionKind::BlackHole => energy * 3000.0,
            ActionKind::ShowRules | ActionKind::ShowStatus | ActionKind::Surrender => 0.0,
        }
    }

    /// Static multiplier applied on top of `ai_weight`.
    pub fn importance(self) -> f64 {
        if self.human_only() {
            0.0
        } else {
            1.0
        }
    }

    pub fn resolution(self) -> Resolution {
        match self {
            ActionKind::Charge => Resolution::Immediate(effects::CHARGE),
            ActionKind::Defend => Resolution::Immediate(effects::DEFEND),
            ActionKind::Move => Resolution::Immediate(effects::MOVE),
            ActionKind::Reflect => Resolution::Immediate(effects::REFLECT),
            ActionKind::BlackHole => Resolution::Immediate(effects::BLACK_HOLE),
            ActionKind::Shoot | ActionKind::Wave => Resolution::Ranged(crossfire::STAGES),
            ActionKind::ShowRules | ActionKind::ShowStatus | ActionKind::Surrender => {
                Resolution::Immediate(&[])
            }
        }
    }
}

impl FromStr for ActionKind {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let needle = s.trim().to_ascii_lowercase();
        ActionKind::ALL
            .into_iter()
            .find(|kind| kind.code() == needle || kind.key() == needle)
            .or(match needle.as_str() {
                "blackhole" | "black_hole" => Some(ActionKind::BlackHole),
                "shot" => Some(ActionKind::Shoot),
                "block" => Some(ActionKind::Defend),
                _ => None,
            })
            .ok_or(())
    }
}

/// Groups actions that have to be resolved against each other.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    Immediate,
    Ranged,
}

/// How an action kind is resolved once dealt.
pub enum Resolution {
    Immediate(&'static [Step<()>]),
    Ranged(&'static [Step<CrossfireStream>]),
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Down,
    Level,
    Up,
}

impl Direction {
    /// Direction in which `to` lies, seen from `from`.
    pub fn between(from: i32, to: i32) -> Self {
        match to.cmp(&from) {
            Ordering::Less => Direction::Down,
            Ordering::Equal => Direction::Level,
            Ordering::Greater => Direction::Up,
        }
    }

    pub fn value(self) -> i32 {
        match self {
            Direction::Down => -1,
            Direction::Level => 0,
            Direction::Up => 1,
        }
    }

    pub fn from_value(value: i32) -> Option<Self> {
        match value {
            -1 => Some(Direction::Down),
            0 => Some(Direction::Level),
            1 => Some(Direction::Up),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", content = "id", rename_all = "snake_case")]
pub enum ActTarget {
    Player(PlayerId),
    /// Everyone standing in the declared direction.
    Area,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct RangedParams {
    pub target: ActTarget,
    pub power: u32,
    pub direction: Direction,
    pub range: u32,
}

impl RangedParams {
    /// A shot lands iff it was fired in the true direction of the target and the
    /// target is within range.
    pub fn hits(&self, from: i32, to: i32) -> bool {
        self.direction == Direction::between(from, to) && to.abs_diff(from) <= self.range
    }

    pub fn aims_at(&self, player: PlayerId) -> bool {
        match self.target {
            ActTarget::Player(id) => id == player,
            ActTarget::Area => true,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ActParams {
    #[default]
    None,
    Ranged(RangedParams),
    Move {
        steps: i32,
    },
    BlackHole {
        target: PlayerId,
    },
}

/// One player's committed choice for the current round.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Act {
    pub owner: PlayerId,
    pub kind: ActionKind,
    pub channel: Channel,
    pub paid: bool,
    pub acted: bool,
    pub params: ActParams,
    /// Players this act already contributed to.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub settled: Vec<PlayerId>,
}

impl Act {
    pub fn new(owner: PlayerId, kind: ActionKind) -> Self {
        Self {
            owner,
            kind,
            channel: kind.channel(),
            paid: false,
            acted: false,
            params: ActParams::None,
            settled: Vec::new(),
        }
    }

    pub fn with_params(mut self, params: ActParams) -> Self {
        self.params = params;
        self
    }

    pub fn shot(owner: PlayerId, target: PlayerId, level: u32, direction: Direction, range: u32) -> Self {
        Act::new(owner, ActionKind::Shoot).with_params(ActParams::Ranged(RangedParams {
            target: ActTarget::Player(target),
            power: level,
            direction,
            range,
        }))
    }

    pub fn wave(owner: PlayerId, direction: Direction, range: u32) -> Self {
        Act::new(owner, ActionKind::Wave).with_params(ActParams::Ranged(RangedParams {
            target: ActTarget::Area,
            power: WAVE_POWER,
            direction,
            range,
        }))
    }

    pub fn movement(owner: PlayerId, steps: i32) -> Self {
        Act::new(owner, ActionKind::Move).with_params(ActParams::Move { steps })
    }

    pub fn black_hole(owner: PlayerId, target: PlayerId) -> Self {
        Act::new(owner, ActionKind::BlackHole).with_params(ActParams::BlackHole { target })
    }

    pub fn cost(&self) -> i32 {
        match (self.kind, &self.params) {
            (ActionKind::Shoot, ActParams::Ranged(params)) => ActionKind::shot_cost(params.power),
            (kind, _) => kind.base_cost(),
        }
    }

    /// Charges the owner once; later calls are no-ops.
    pub fn pay(&mut self, owner: &mut Player) {
        if !self.paid {
            owner.energy -= self.cost();
            self.paid = true;
        }
    }

    pub fn ranged(&self) -> Option<&RangedParams> {
        match &self.params {
            ActParams::Ranged(params) if self.channel == Channel::Ranged => Some(params),
            _ => None,
        }
    }

    pub fn is_settled_with(&self, player: PlayerId) -> bool {
        self.settled.contains(&player)
    }

    pub fn settle(&mut self, player: PlayerId) {
        if !self.settled.contains(&player) {
            self.settled.push(player);
        }
    }
}

/// What a player sees around itself, derived from the battlefield snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Surroundings {
    pub energy: i32,
    pub nearby_enemies: usize,
    pub enemy_ratio: f64,
    pub nearby_enemy_energy: i32,
    pub energy_ratio: f64,
    pub map_half_height: u32,
}

/// Outcome of one run of a selection handler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection {
    /// Done choosing, with zero or one act.
    Commit(Option<Act>),
    /// Nothing committed yet, ask again.
    Retry,
    /// Leave the battle.
    Surrender,
}
