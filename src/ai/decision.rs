use rand::distributions::{Distribution, WeightedIndex};
use rand::seq::SliceRandom;
use rand::{Rng, RngCore};

use crate::game::actions::{ActionKind, Direction, MAX_SHOT_LEVEL, MOVE_STEP};
use crate::game::snapshot::{PlayerSnapshot, Snapshot};
use crate::game::state::{PlayerId, UsableActions};

/// Picks an action among `usable`.
///
/// AI players draw at random in proportion to the weights, falling back to a
/// uniform draw when the weights cannot form a distribution. For humans the
/// result is only a suggestion: the first action with the highest weight.
pub fn decide(usable: &UsableActions, human: bool, rng: &mut dyn RngCore) -> Option<ActionKind> {
    if usable.is_empty() {
        return None;
    }
    if human {
        return suggest(usable);
    }

    match WeightedIndex::new(&usable.weights) {
        Ok(distribution) => usable.kinds.get(distribution.sample(rng)).copied(),
        Err(error) => {
            tracing::debug!(%error, weights = ?usable.weights, "degenerate weights, drawing uniformly");
            usable.kinds.choose(rng).copied()
        }
    }
}

fn suggest(usable: &UsableActions) -> Option<ActionKind> {
    let mut best: Option<(ActionKind, f64)> = None;
    for (kind, weight) in usable.iter() {
        if best.map_or(true, |(_, top)| weight > top) {
            best = Some((kind, weight));
        }
    }
    best.map(|(kind, _)| kind)
}

/// Whether `chooser` may aim at `target`: never itself, and a teammate only when
/// both are human.
pub fn may_target(chooser: PlayerId, me: &PlayerSnapshot, target: PlayerId, them: &PlayerSnapshot) -> bool {
    target != chooser && (them.team != me.team || (me.human && them.human))
}

/// Draws candidates without replacement until one is a legal target.
pub fn pick_target(
    snapshot: &Snapshot,
    chooser: PlayerId,
    mut candidates: Vec<PlayerId>,
    rng: &mut dyn RngCore,
) -> Option<PlayerId> {
    let me = snapshot.player(chooser)?;
    while !candidates.is_empty() {
        let id = candidates.swap_remove(rng.gen_range(0..candidates.len()));
        let eligible = snapshot
            .player(id)
            .is_some_and(|them| may_target(chooser, me, id, them));
        if eligible {
            return Some(id);
        }
    }
    None
}

/// Direction with the most players to hit, counting enemies only for AI players.
/// Ties go to the first of down, level, up.
pub fn auto_wave_direction(snapshot: &Snapshot, me: &PlayerSnapshot) -> Direction {
    let mut counts = [0usize; 3];
    for (level, population) in &snapshot.population {
        let mut crowd = population.all.len();
        if !me.human {
            crowd -= population.by_team.get(&me.team).map_or(0, Vec::len);
        }
        let slot = (Direction::between(me.position, *level).value() + 1) as usize;
        counts[slot] += crowd;
    }

    let mut best = 0;
    for slot in 1..counts.len() {
        if counts[slot] > counts[best] {
            best = slot;
        }
    }
    Direction::from_value(best as i32 - 1).unwrap_or(Direction::Level)
}

/// Highest shot level the player can pay for.
pub fn affordable_level(energy: i32) -> Option<u32> {
    (1..=MAX_SHOT_LEVEL)
        .rev()
        .find(|level| ActionKind::shot_cost(*level) <= energy)
}

/// A non-zero step that keeps the player on the map.
pub fn random_step(position: i32, map_half_height: u32, rng: &mut dyn RngCore) -> Option<i32> {
    let map = map_half_height as i32;
    let steps: Vec<i32> = (-MOVE_STEP..=MOVE_STEP)
        .filter(|step| *step != 0 && (position + step).abs() <= map)
        .collect();
    steps.choose(rng).copied()
}
