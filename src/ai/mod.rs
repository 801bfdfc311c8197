//! AI 决策模块：行动权重抽样与目标、方向、参数选择。

pub mod decision;

pub use decision::{affordable_level, auto_wave_direction, decide, may_target, pick_target, random_step};
