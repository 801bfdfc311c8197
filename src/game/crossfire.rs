//! Resolution of shots and energy waves.
//!
//! Every ranged act goes through the same five stages: evaluate hits, let counter
//! fire annihilate incoming damage, apply reflection, apply blocking, then apply
//! the net damage and flush the exchange as one block of messages.

use serde::{Deserialize, Serialize};

use super::actions::{ActTarget, ActionKind, Direction};
use super::effects::Step;
use super::state::{ActIndex, BattleState, DefenseState, Fault, PlayerId};
use crate::config::{CrashPolicy, WavePolicy};
use crate::presenter::{Arg, Message, Style};

pub const STAGES: &[Step<CrossfireStream>] = &[evaluate, crash, reflect, defend, apply];

/// An exchange this long earns a flourish.
const WONDERFUL_THRESHOLD: usize = 4;

/// Net damage per target, in the order targets were first hit.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct PendingDamage(Vec<(PlayerId, i32)>);

impl PendingDamage {
    pub fn add(&mut self, target: PlayerId, amount: i32) {
        match self.get_mut(target) {
            Some(pending) => *pending += amount,
            None => self.0.push((target, amount)),
        }
    }

    pub fn get(&self, target: PlayerId) -> Option<i32> {
        self.0
            .iter()
            .find(|(id, _)| *id == target)
            .map(|(_, amount)| *amount)
    }

    pub fn get_mut(&mut self, target: PlayerId) -> Option<&mut i32> {
        self.0
            .iter_mut()
            .find(|(id, _)| *id == target)
            .map(|(_, amount)| amount)
    }

    pub fn targets(&self) -> Vec<PlayerId> {
        self.0.iter().map(|(id, _)| *id).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (PlayerId, i32)> + '_ {
        self.0.iter().copied()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (PlayerId, &mut i32)> + '_ {
        self.0.iter_mut().map(|(id, amount)| (*id, amount))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Accumulator threaded through the stages.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CrossfireStream {
    pub messages: Vec<Message>,
    pub pending: PendingDamage,
}

impl CrossfireStream {
    fn note(&mut self, kind: ActionKind, suffix: &str, args: Vec<Arg>) {
        self.messages
            .push(Message::new(kind.message_key(suffix), args).styled(kind.style()));
    }
}

/// Where the attacker stands and what its act declared.
struct Attacker {
    id: PlayerId,
    kind: ActionKind,
    position: i32,
    defense: DefenseState,
}

fn attacker(state: &BattleState, act: ActIndex) -> Option<Attacker> {
    let current = state.registry.get(act)?;
    let owner = state.player(current.owner)?;
    Some(Attacker {
        id: owner.id,
        kind: current.kind,
        position: owner.position,
        defense: owner.defense,
    })
}

fn slots_of(state: &BattleState, player: PlayerId) -> Vec<ActIndex> {
    state
        .player(player)
        .map(|player| player.acts.iter().map(|slot| slot.index).collect())
        .unwrap_or_default()
}

/// Everyone on the declared side of the attacker that the wave policy lets it hit.
fn area_targets(state: &BattleState, attacker: PlayerId, direction: Direction) -> Vec<PlayerId> {
    let Some(me) = state.player(attacker) else {
        return Vec::new();
    };
    state
        .players
        .values()
        .filter(|other| other.id != attacker)
        .filter(|other| Direction::between(me.position, other.position) == direction)
        .filter(|other| {
            other.team != me.team
                || match state.config.wave_policy {
                    WavePolicy::SpareTeammatesForAi => me.human,
                    WavePolicy::SpareTeammates => false,
                }
        })
        .map(|other| other.id)
        .collect()
}

fn evaluate(mut stream: CrossfireStream, act: ActIndex, state: &mut BattleState) -> CrossfireStream {
    let Some(me) = attacker(state, act) else {
        return stream;
    };
    let direction = state
        .registry
        .get(act)
        .and_then(|current| current.ranged())
        .map_or(0, |params| params.direction.value());
    stream.note(
        me.kind,
        "battle",
        vec![me.id.into(), me.position.into(), direction.into()],
    );

    for slot in slots_of(state, me.id) {
        let Some(candidate) = state.registry.get(slot) else {
            continue;
        };
        if candidate.acted {
            continue;
        }
        let Some(params) = candidate.ranged().copied() else {
            continue;
        };
        let kind = candidate.kind;
        let targets = match params.target {
            ActTarget::Player(id) => vec![id],
            ActTarget::Area => area_targets(state, me.id, params.direction),
        };

        for target in targets {
            if state.registry[slot].is_settled_with(target) {
                continue;
            }
            let Some(position) = state.player(target).map(|player| player.position) else {
                state.fault(Fault::MissingPlayer { player: target });
                continue;
            };
            let args = vec![me.id.into(), target.into(), params.power.into()];
            if params.hits(me.position, position) {
                stream.note(kind, "hit", args);
                stream.pending.add(target, params.power as i32);
            } else {
                stream.note(kind, "miss", args);
            }
            state.registry[slot].settle(target);
        }
    }
    stream
}

/// Counter fire from each target annihilates part of the damage heading its way.
fn crash(mut stream: CrossfireStream, act: ActIndex, state: &mut BattleState) -> CrossfireStream {
    let Some(me) = attacker(state, act) else {
        return stream;
    };
    let policy = state.config.crash_policy;

    for target in stream.pending.targets() {
        if target == me.id {
            continue;
        }
        let Some(position) = state.player(target).map(|player| player.position) else {
            continue;
        };
        for slot in slots_of(state, target) {
            let Some(counter) = state.registry.get(slot) else {
                continue;
            };
            if counter.acted || counter.is_settled_with(me.id) {
                continue;
            }
            let Some(params) = counter.ranged().copied() else {
                continue;
            };
            if !params.aims_at(me.id) {
                continue;
            }
            let kind = counter.kind;
            let power = params.power as i32;
            let args = vec![target.into(), me.id.into(), params.power.into()];

            if params.hits(position, me.position) {
                stream.note(kind, "counter", args);
                if let Some(pending) = stream.pending.get_mut(target) {
                    let crashed = power.min(*pending);
                    *pending = match policy {
                        CrashPolicy::Compound => *pending - power,
                        CrashPolicy::Clamped => (*pending - power).max(-power),
                    };
                    stream.note(kind, "crash", vec![crashed.into()]);
                }
            } else {
                stream.note(kind, "miss", args);
            }
            state.registry[slot].settle(me.id);
            state.pay(slot);
        }
    }
    stream
}

/// Reflecting targets send positive damage back and double any backlash, unless
/// the attacker reflects too.
fn reflect(mut stream: CrossfireStream, act: ActIndex, state: &mut BattleState) -> CrossfireStream {
    let Some(me) = attacker(state, act) else {
        return stream;
    };
    if me.defense == DefenseState::Reflecting {
        return stream;
    }

    let mut notes = Vec::new();
    for (target, pending) in stream.pending.iter_mut() {
        let reflecting = state
            .player(target)
            .is_some_and(|player| player.defense == DefenseState::Reflecting);
        if !reflecting {
            continue;
        }
        notes.push(vec![me.id.into(), (*pending).into()]);
        *pending = if *pending > 0 { -*pending } else { *pending * 2 };
    }
    for args in notes {
        stream.note(me.kind, "reflect", args);
    }
    stream
}

fn defend(mut stream: CrossfireStream, act: ActIndex, state: &mut BattleState) -> CrossfireStream {
    let Some(kind) = state.registry.get(act).map(|current| current.kind) else {
        return stream;
    };
    let mut notes = Vec::new();
    for (target, pending) in stream.pending.iter_mut() {
        let blocking = state
            .player(target)
            .is_some_and(|player| player.defense == DefenseState::Blocking);
        if !blocking {
            continue;
        }
        notes.push(vec![target.into(), (*pending).into()]);
        if *pending > 0 {
            *pending = 0;
        }
    }
    for args in notes {
        stream.note(kind, "defend", args);
    }
    stream
}

fn apply(mut stream: CrossfireStream, act: ActIndex, state: &mut BattleState) -> CrossfireStream {
    let Some(me) = attacker(state, act) else {
        return stream;
    };

    for (target, pending) in stream.pending.iter().collect::<Vec<_>>() {
        if pending > 0 {
            state.hurt(target, pending as u32, me.id, me.kind);
            let hp = state.player(target).map_or(0, |player| player.hp);
            stream.note(me.kind, "hurt", vec![target.into(), pending.into(), hp.into()]);
        } else if pending < 0 {
            let backlash = pending.unsigned_abs();
            state.hurt(me.id, backlash, target, me.kind);
            let hp = state.player(me.id).map_or(0, |player| player.hp);
            stream.note(me.kind, "hurt", vec![me.id.into(), backlash.into(), hp.into()]);
        } else {
            stream.note(me.kind, "peace", Vec::new());
        }
    }

    let mut messages = std::mem::take(&mut stream.messages).into_iter();
    if let Some(header) = messages.next() {
        let body: Vec<Message> = messages.collect();
        // A shot already settled against every target says nothing; a wave always announces itself.
        if !body.is_empty() || me.kind == ActionKind::Wave {
            let wonderful = body.len() >= WONDERFUL_THRESHOLD;
            state.say(header);
            for message in body {
                state.say(message);
            }
            if wonderful {
                state.say(Message::new(me.kind.message_key("wonderful"), Vec::new()).styled(Style::Magenta));
            }
        }
    }

    state.pay(act);
    stream
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BattleConfig;
    use crate::game::actions::Act;
    use crate::game::effects::run_pipeline;
    use crate::game::state::Player;

    fn battle(players: Vec<Player>, config: BattleConfig) -> BattleState {
        BattleState::from_players(config, players)
    }

    fn deal_ranged(state: &mut BattleState, index: ActIndex) -> CrossfireStream {
        let stream = run_pipeline(CrossfireStream::default(), STAGES, index, state);
        state.registry[index].acted = true;
        stream
    }

    fn keys(state: &BattleState) -> Vec<&str> {
        state.outbox.iter().map(|message| message.key.as_str()).collect()
    }

    #[test]
    fn clean_hit_damages_and_pays() {
        let mut state = battle(
            vec![
                Player::new(1, 3).with_team(1).with_energy(2),
                Player::new(2, 3).with_team(2),
            ],
            BattleConfig::ai_only(2),
        );
        state.register([Act::shot(1, 2, 2, Direction::Level, 1)]);
        deal_ranged(&mut state, 0);

        assert_eq!(state.players[&2].hp, 1);
        assert_eq!(state.players[&1].energy, 0);
        assert_eq!(state.players[&1].damage_dealt, 2);
        assert_eq!(keys(&state), vec!["shoot.battle", "shoot.hit", "shoot.hurt"]);
    }

    #[test]
    fn wrong_direction_misses_and_still_costs() {
        let mut state = battle(
            vec![
                Player::new(1, 1).with_team(1).with_energy(1),
                Player::new(2, 1).with_team(2).at(1),
            ],
            BattleConfig::ai_only(2),
        );
        state.register([Act::shot(1, 2, 1, Direction::Level, 1)]);
        deal_ranged(&mut state, 0);

        assert_eq!(state.players[&2].hp, 1);
        assert_eq!(state.players[&1].energy, 0);
        assert_eq!(keys(&state), vec!["shoot.battle", "shoot.miss"]);
    }

    #[test]
    fn mutual_fire_nets_out() {
        let mut state = battle(
            vec![
                Player::new(1, 5).with_team(1).with_energy(2),
                Player::new(2, 5).with_team(2).with_energy(3),
            ],
            BattleConfig::ai_only(2),
        );
        state.register([
            Act::shot(1, 2, 2, Direction::Level, 1),
            Act::shot(2, 1, 3, Direction::Level, 1),
        ]);
        deal_ranged(&mut state, 0);

        assert_eq!(state.players[&1].hp, 4, "one point of B's shot survives the crash");
        assert_eq!(state.players[&2].hp, 5);
        assert_eq!(state.players[&1].energy, 0);
        assert_eq!(state.players[&2].energy, 0, "the counter shot is paid when it crashes");
        assert!(keys(&state).contains(&"shoot.crash"));
        let last = state.players[&1].last_damage().expect("backlash should be logged");
        assert_eq!(last.source, 2);

        // B's shot is settled against A, so dealing it later changes nothing.
        state.outbox.clear();
        deal_ranged(&mut state, 1);
        assert_eq!(state.players[&1].hp, 4);
        assert_eq!(state.players[&2].hp, 5);
        assert!(state.outbox.is_empty());
    }

    #[test]
    fn reflection_inverts_positive_damage() {
        let mut state = battle(
            vec![
                Player::new(1, 3).with_team(1).with_energy(1),
                Player::new(2, 3).with_team(2),
            ],
            BattleConfig::ai_only(2),
        );
        state.players.get_mut(&2).expect("target").defense = DefenseState::Reflecting;
        state.register([Act::shot(1, 2, 1, Direction::Level, 1)]);
        deal_ranged(&mut state, 0);

        assert_eq!(state.players[&2].hp, 3);
        assert_eq!(state.players[&1].hp, 2);
        assert!(keys(&state).contains(&"shoot.reflect"));
    }

    #[test]
    fn reflecting_attacker_is_not_reflected() {
        let mut state = battle(
            vec![
                Player::new(1, 3).with_team(1).with_energy(1),
                Player::new(2, 3).with_team(2),
            ],
            BattleConfig::ai_only(2),
        );
        for id in [1, 2] {
            state.players.get_mut(&id).expect("player").defense = DefenseState::Reflecting;
        }
        state.register([Act::shot(1, 2, 1, Direction::Level, 1)]);
        deal_ranged(&mut state, 0);
        assert_eq!(state.players[&2].hp, 2);
        assert_eq!(state.players[&1].hp, 3);
    }

    #[test]
    fn blocking_absorbs_positive_damage() {
        let mut state = battle(
            vec![
                Player::new(1, 5).with_team(1).with_energy(5),
                Player::new(2, 5).with_team(2),
            ],
            BattleConfig::ai_only(2),
        );
        state.players.get_mut(&2).expect("target").defense = DefenseState::Blocking;
        state.register([Act::shot(1, 2, 3, Direction::Level, 1)]);
        let stream = deal_ranged(&mut state, 0);

        assert_eq!(stream.pending.get(2), Some(0));
        assert_eq!(state.players[&2].hp, 5);
        assert!(keys(&state).contains(&"shoot.defend"));
        assert!(keys(&state).contains(&"shoot.peace"));
    }

    #[test]
    fn wave_spares_ai_teammates_but_not_for_humans() {
        let players = || {
            vec![
                Player::new(1, 9).with_team(1).with_energy(4),
                Player::new(2, 9).with_team(1).at(1),
                Player::new(3, 9).with_team(2).at(1),
                Player::new(4, 9).with_team(3).at(-1),
            ]
        };
        let config = BattleConfig {
            map_half_height: 1,
            ..BattleConfig::ai_only(4)
        };

        let mut ai = battle(players(), config.clone());
        ai.register([Act::wave(1, Direction::Up, 9)]);
        deal_ranged(&mut ai, 0);
        assert_eq!(ai.players[&2].hp, 9, "AI teammate is spared");
        assert_eq!(ai.players[&3].hp, 4);
        assert_eq!(ai.players[&4].hp, 9, "wrong side");

        let mut human_players = players();
        human_players[0].human = true;
        let mut human = battle(human_players, config.clone());
        human.register([Act::wave(1, Direction::Up, 9)]);
        deal_ranged(&mut human, 0);
        assert_eq!(human.players[&2].hp, 4, "a human's wave hits its own side");

        let mut strict_players = players();
        strict_players[0].human = true;
        let strict = BattleConfig {
            wave_policy: WavePolicy::SpareTeammates,
            ..config
        };
        let mut spared = battle(strict_players, strict);
        spared.register([Act::wave(1, Direction::Up, 9)]);
        deal_ranged(&mut spared, 0);
        assert_eq!(spared.players[&2].hp, 9);
    }

    #[test]
    fn crash_policies_diverge_after_damage_is_cancelled() {
        // 1 shoots 2 for one point; 2 answers with a shot and a wave worth eight.
        // Compound pushes the backlash to -7, Clamped stops each counter at its power.
        let setup = |policy| {
            let config = BattleConfig {
                crash_policy: policy,
                ..BattleConfig::ai_only(2)
            };
            let mut state = battle(
                vec![
                    Player::new(1, 20).with_team(1).with_energy(1),
                    Player::new(2, 20).with_team(2).with_energy(9),
                ],
                config,
            );
            state.register([
                Act::shot(1, 2, 1, Direction::Level, 1),
                Act::shot(2, 1, 3, Direction::Level, 1),
                Act::wave(2, Direction::Level, 9),
            ]);
            deal_ranged(&mut state, 0);
            state
        };

        let compound = setup(CrashPolicy::Compound);
        assert_eq!(compound.players[&1].hp, 13);

        let clamped = setup(CrashPolicy::Clamped);
        assert_eq!(clamped.players[&1].hp, 15);
        assert_eq!(clamped.players[&2].hp, 20);
    }

    #[test]
    fn long_exchanges_earn_a_flourish() {
        let mut state = battle(
            vec![
                Player::new(1, 9).with_team(1).with_energy(4),
                Player::new(2, 9).with_team(2),
                Player::new(3, 9).with_team(3),
            ],
            BattleConfig::ai_only(3),
        );
        state.register([Act::wave(1, Direction::Level, 9)]);
        deal_ranged(&mut state, 0);
        assert_eq!(state.outbox.last().map(|m| m.key.as_str()), Some("wave.wonderful"));
        assert_eq!(state.outbox.last().map(|m| m.style), Some(Style::Magenta));
    }

    #[test]
    fn empty_wave_still_announces_itself() {
        let mut state = battle(
            vec![
                Player::new(1, 3).with_team(1).with_energy(4),
                Player::new(2, 3).with_team(2),
            ],
            BattleConfig::ai_only(2),
        );
        state.register([Act::wave(1, Direction::Up, 9)]);
        let stream = deal_ranged(&mut state, 0);

        assert!(stream.pending.is_empty());
        assert_eq!(keys(&state), vec!["wave.battle"]);
        assert_eq!(state.players[&1].energy, 0);
        assert_eq!(state.players[&2].hp, 3);
    }

    #[test]
    fn block_is_reported_even_when_nothing_gets_through() {
        let mut state = battle(
            vec![
                Player::new(1, 5).with_team(1).with_energy(1),
                Player::new(2, 5).with_team(2).with_energy(3),
            ],
            BattleConfig::ai_only(2),
        );
        state.players.get_mut(&2).expect("target").defense = DefenseState::Blocking;
        state.register([
            Act::shot(1, 2, 1, Direction::Level, 1),
            Act::shot(2, 1, 3, Direction::Level, 1),
        ]);
        let stream = deal_ranged(&mut state, 0);

        let block = state
            .outbox
            .iter()
            .find(|message| message.key == "shoot.defend")
            .expect("the block should be noted");
        assert_eq!(block.args, vec![Arg::Int(2), Arg::Int(-2)]);
        assert_eq!(stream.pending.get(2), Some(-2), "backlash is not absorbed");
        assert_eq!(state.players[&1].hp, 3);
    }
}
