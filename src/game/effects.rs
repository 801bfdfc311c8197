//! Effect pipeline runner and the single-stage resolutions.
//!
//! A resolution is a fixed list of steps folded over an accumulator. Each step sees
//! the act being dealt and the whole battle state, so mutations made by earlier
//! steps (and earlier acts) are visible to later ones.

use super::actions::{ActParams, ActionKind};
use super::state::{ActIndex, BattleState, DefenseState, Fault, PlayerId};
use crate::presenter::Arg;

/// One stage of a resolution.
pub type Step<A> = fn(A, ActIndex, &mut BattleState) -> A;

pub const CHARGE: &[Step<()>] = &[charge];
pub const DEFEND: &[Step<()>] = &[defend];
pub const REFLECT: &[Step<()>] = &[reflect];
pub const MOVE: &[Step<()>] = &[movement];
pub const BLACK_HOLE: &[Step<()>] = &[black_hole];

pub fn run_pipeline<A>(initial: A, steps: &[Step<A>], act: ActIndex, state: &mut BattleState) -> A {
    steps
        .iter()
        .fold(initial, |stream, step| step(stream, act, state))
}

fn owner_of(state: &BattleState, act: ActIndex) -> Option<(PlayerId, ActionKind)> {
    state.registry.get(act).map(|act| (act.owner, act.kind))
}

fn charge(_: (), act: ActIndex, state: &mut BattleState) {
    let Some((owner, kind)) = owner_of(state, act) else {
        return;
    };
    state.pay(act);
    let energy = state.player(owner).map_or(0, |player| player.energy);
    state.emit(
        kind.message_key("done"),
        vec![owner.into(), energy.into()],
        kind.style(),
    );
}

fn set_defense(act: ActIndex, state: &mut BattleState, defense: DefenseState) {
    let Some((owner, kind)) = owner_of(state, act) else {
        return;
    };
    if !state.players.contains_key(&owner) {
        return state.fault(Fault::MissingPlayer { player: owner });
    }
    state.pay(act);
    if let Some(player) = state.players.get_mut(&owner) {
        player.defense = defense;
    }
    state.emit(kind.message_key("done"), vec![owner.into()], kind.style());
}

fn defend(_: (), act: ActIndex, state: &mut BattleState) {
    set_defense(act, state, DefenseState::Blocking);
}

fn reflect(_: (), act: ActIndex, state: &mut BattleState) {
    set_defense(act, state, DefenseState::Reflecting);
}

fn movement(_: (), act: ActIndex, state: &mut BattleState) {
    let Some(current) = state.registry.get(act) else {
        return;
    };
    let (owner, kind) = (current.owner, current.kind);
    let ActParams::Move { steps } = current.params else {
        return;
    };
    let Some(position) = state.player(owner).map(|player| player.position) else {
        return state.fault(Fault::MissingPlayer { player: owner });
    };

    let destination = position + steps;
    if destination.abs() > state.config.map_half_height as i32 {
        return state.fault(Fault::OutOfBounds {
            player: owner,
            position: destination,
        });
    }

    state.pay(act);
    if let Some(player) = state.players.get_mut(&owner) {
        player.position = destination;
    }
    state.emit(
        kind.message_key("done"),
        vec![owner.into(), steps.into(), destination.into()],
        kind.style(),
    );
}

/// Seals every action the target committed this round: they never resolve and
/// stay disabled for the rest of the battle.
fn black_hole(_: (), act: ActIndex, state: &mut BattleState) {
    let Some(current) = state.registry.get(act) else {
        return;
    };
    let (owner, kind) = (current.owner, current.kind);
    let ActParams::BlackHole { target } = current.params else {
        return;
    };
    state.pay(act);

    let Some(slots) = state.player(target).map(|victim| victim.acts.clone()) else {
        return state.fault(Fault::MissingPlayer { player: target });
    };
    if let Some(victim) = state.players.get_mut(&target) {
        for slot in &slots {
            victim.disable(slot.kind);
        }
    }
    for slot in &slots {
        if let Some(sealed) = state.registry.get_mut(slot.index) {
            sealed.acted = true;
        }
    }

    let sealed = slots
        .iter()
        .map(|slot| slot.kind.key())
        .collect::<Vec<_>>()
        .join(", ");
    state.emit(
        kind.message_key("done"),
        vec![target.into(), Arg::Text(sealed), owner.into()],
        kind.style(),
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BattleConfig;
    use crate::game::actions::{Act, Direction};
    use crate::game::state::Player;

    fn state(players: Vec<Player>) -> BattleState {
        let count = players.len() as u32;
        BattleState::from_players(BattleConfig::ai_only(count), players)
    }

    #[test]
    fn runner_folds_steps_in_order() {
        fn double(value: i32, _: ActIndex, _: &mut BattleState) -> i32 {
            value * 2
        }
        fn increment(value: i32, _: ActIndex, _: &mut BattleState) -> i32 {
            value + 1
        }
        let mut battle = state(vec![]);
        let steps: &[Step<i32>] = &[double, increment, double];
        assert_eq!(run_pipeline(3, steps, 0, &mut battle), 14);
    }

    #[test]
    fn charge_gains_one_energy() {
        let mut battle = state(vec![Player::new(1, 1)]);
        battle.register([Act::new(1, ActionKind::Charge)]);
        run_pipeline((), CHARGE, 0, &mut battle);
        run_pipeline((), CHARGE, 0, &mut battle);
        assert_eq!(battle.players[&1].energy, 1, "charge must pay only once");
        assert_eq!(battle.outbox.len(), 2);
        assert_eq!(battle.outbox[0].key, "charge.done");
    }

    #[test]
    fn reflect_costs_two_and_sets_state() {
        let mut battle = state(vec![Player::new(1, 1).with_energy(2)]);
        battle.register([Act::new(1, ActionKind::Reflect)]);
        run_pipeline((), REFLECT, 0, &mut battle);
        assert_eq!(battle.players[&1].energy, 0);
        assert_eq!(battle.players[&1].defense, DefenseState::Reflecting);
    }

    #[test]
    fn move_refuses_to_leave_the_map() {
        let mut battle = state(vec![Player::new(1, 1).at(1)]);
        battle.register([Act::movement(1, 1)]);
        run_pipeline((), MOVE, 0, &mut battle);
        assert_eq!(battle.players[&1].position, 1);
        assert!(matches!(
            battle.diagnostics.as_slice(),
            [Fault::OutOfBounds { player: 1, position: 2 }]
        ));
    }

    #[test]
    fn black_hole_seals_target_actions() {
        let mut battle = state(vec![
            Player::new(1, 1).with_energy(5),
            Player::new(2, 1).with_energy(3),
        ]);
        battle.register([
            Act::shot(2, 1, 3, Direction::Level, 1),
            Act::black_hole(1, 2),
        ]);
        assert_eq!(battle.registry[0].kind, ActionKind::BlackHole);
        run_pipeline((), BLACK_HOLE, 0, &mut battle);

        assert!(battle.registry[1].acted, "sealed shot must never resolve");
        assert!(battle.players[&2].is_disabled(ActionKind::Shoot));
        assert_eq!(battle.players[&1].energy, 0);
        assert_eq!(battle.players[&2].energy, 3, "sealed acts are never paid");
        assert_eq!(battle.outbox[0].args[1], Arg::Text("shoot".into()));
    }
}
