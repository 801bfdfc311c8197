//! 回合结算核心：实体模型、行动登记、效果流水线与回合编排。

pub mod actions;
pub mod crossfire;
pub mod effects;
pub mod rules;
pub mod selection;
pub mod snapshot;
pub mod state;

pub use actions::{
    Act,
    ActParams,
    ActTarget,
    ActionKind,
    Channel,
    Direction,
    RangedParams,
    Resolution,
    Selection,
    Surroundings,
};
pub use crossfire::{CrossfireStream, PendingDamage};
pub use effects::{run_pipeline, Step};
pub use rules::{deal, Battle, BattleError, RoundReport};
pub use selection::{Selected, SelectionEnv};
pub use snapshot::{LevelEnergy, LevelPopulation, PlayerSnapshot, Snapshot};
pub use state::{
    ActIndex,
    ActSlot,
    BattleState,
    DamageRecord,
    DefenseState,
    Fault,
    Outcome,
    Player,
    PlayerId,
    TeamId,
    UsableActions,
};
