//! Turning a chosen action kind into a committed act.
//!
//! Humans are prompted for every parameter and may cancel back to the action
//! prompt. AI players, and humans who accept the suggestion, get parameters
//! chosen by the decision module.

use rand::RngCore;

use super::actions::{Act, ActionKind, Direction, Selection, MAX_SHOT_LEVEL, MOVE_STEP};
use super::snapshot::PlayerSnapshot;
use super::state::{BattleState, Fault, Player, PlayerId, TeamId};
use crate::ai;
use crate::presenter::{Arg, Presenter, Style};

/// What a selection handler may touch: a frozen view of the battle, the
/// presenter for prompts and the random source.
pub struct SelectionEnv<'a> {
    pub state: &'a BattleState,
    pub presenter: &'a mut dyn Presenter,
    pub rng: &'a mut dyn RngCore,
    pub faults: Vec<Fault>,
}

impl<'a> SelectionEnv<'a> {
    pub fn new(
        state: &'a BattleState,
        presenter: &'a mut dyn Presenter,
        rng: &'a mut dyn RngCore,
    ) -> Self {
        Self {
            state,
            presenter,
            rng,
            faults: Vec::new(),
        }
    }

    fn say(&mut self, key: &str, args: &[Arg], style: Style) {
        self.presenter.emit(key, args, style);
    }

    fn ask(&mut self, key: &str, args: &[Arg]) -> String {
        self.presenter.read_line(key, args)
    }
}

/// Acts a player committed this round.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Selected {
    pub acts: Vec<Act>,
    pub surrendered: bool,
}

impl Player {
    /// Runs selection handlers until one commits.
    ///
    /// Humans are asked for an action first; an empty line accepts `suggestion` and
    /// lets the handler pick parameters itself. A handler that keeps asking for a
    /// retry in automatic mode is recorded as stalled and yields nothing.
    pub fn select(&self, env: &mut SelectionEnv<'_>, suggestion: ActionKind) -> Selected {
        let mut selected = Selected::default();
        loop {
            let (kind, auto) = if self.human {
                let line = env.ask(
                    "select.prompt",
                    &[
                        self.id.into(),
                        self.hp.into(),
                        self.energy.into(),
                        self.position.into(),
                        suggestion.key().into(),
                    ],
                );
                if line.trim().is_empty() {
                    env.say("select.auto", &[suggestion.key().into()], Style::Plain);
                    (suggestion, true)
                } else {
                    match line.parse::<ActionKind>() {
                        Ok(kind) if self.is_disabled(kind) => {
                            env.say("select.unavailable", &[kind.key().into()], Style::Red);
                            continue;
                        }
                        Ok(kind) => (kind, false),
                        Err(()) => {
                            env.say("select.not-found", &[line.trim().into()], Style::Red);
                            continue;
                        }
                    }
                }
            } else {
                (suggestion, true)
            };

            match kind.select(self, env, auto) {
                Selection::Commit(act) => {
                    selected.acts.extend(act);
                    return selected;
                }
                Selection::Surrender => {
                    selected.surrendered = true;
                    return selected;
                }
                Selection::Retry if self.human && !auto => continue,
                Selection::Retry => {
                    env.faults.push(Fault::SelectionStalled {
                        player: self.id,
                        kind,
                    });
                    return selected;
                }
            }
        }
    }
}

impl ActionKind {
    /// Selection handler of this kind.
    pub fn select(self, player: &Player, env: &mut SelectionEnv<'_>, auto: bool) -> Selection {
        match self {
            ActionKind::Charge | ActionKind::Defend => {
                Selection::Commit(Some(Act::new(player.id, self)))
            }
            ActionKind::Shoot if auto => auto_shot(player, env),
            ActionKind::Shoot => ask_shot(player, env),
            ActionKind::Move => select_move(player, env, auto),
            ActionKind::Reflect => {
                if can_afford(player, self, env, auto) {
                    Selection::Commit(Some(Act::new(player.id, self)))
                } else {
                    Selection::Retry
                }
            }
            ActionKind::Wave => select_wave(player, env, auto),
            ActionKind::BlackHole => select_black_hole(player, env, auto),
            ActionKind::ShowRules => show_rules(env),
            ActionKind::ShowStatus => show_status(env),
            ActionKind::Surrender => Selection::Surrender,
        }
    }
}

fn can_afford(player: &Player, kind: ActionKind, env: &mut SelectionEnv<'_>, auto: bool) -> bool {
    let affordable = player.energy >= kind.base_cost();
    if !affordable && !auto {
        env.say("select.poor", &[kind.base_cost().into()], Style::Magenta);
    }
    affordable
}

fn ask_shot(player: &Player, env: &mut SelectionEnv<'_>) -> Selection {
    let kind = ActionKind::Shoot;
    if !can_afford(player, kind, env, false) {
        return Selection::Retry;
    }
    let me = PlayerSnapshot::from(player);

    let (target, target_position) = loop {
        let line = env.ask(&kind.message_key("ask-target"), &[]);
        let line = line.trim();
        if line.is_empty() {
            env.say(&kind.message_key("cancel"), &[], Style::Plain);
            return Selection::Retry;
        }
        let Ok(id) = line.parse::<PlayerId>() else {
            env.say(&kind.message_key("error-int"), &[line.into()], Style::Red);
            continue;
        };
        let Some(them) = env.state.snapshot.player(id).copied() else {
            env.say(&kind.message_key("error-exist"), &[id.into()], Style::Red);
            continue;
        };
        if !ai::may_target(player.id, &me, id, &them) {
            env.say(&kind.message_key("error-self"), &[id.into()], Style::Red);
            continue;
        }
        break (id, them.position);
    };

    let level = loop {
        let line = env.ask(&kind.message_key("ask-level"), &[MAX_SHOT_LEVEL.into()]);
        let line = line.trim();
        if line.is_empty() {
            // Checked above, so at least level one is affordable.
            let level = ai::affordable_level(player.energy).unwrap_or(1);
            env.say(&kind.message_key("auto-level"), &[level.into()], Style::Plain);
            break level;
        }
        let Ok(level) = line.parse::<u32>() else {
            env.say(&kind.message_key("error-int"), &[line.into()], Style::Red);
            continue;
        };
        if !(1..=MAX_SHOT_LEVEL).contains(&level) {
            env.say(&kind.message_key("error-level"), &[level.into()], Style::Red);
            continue;
        }
        if ActionKind::shot_cost(level) > player.energy {
            env.say(&kind.message_key("error-energy"), &[level.into()], Style::Red);
            continue;
        }
        break level;
    };

    let direction = loop {
        let line = env.ask(&kind.message_key("ask-direction"), &[]);
        let line = line.trim();
        if line.is_empty() {
            let direction = Direction::between(player.position, target_position);
            env.say(&kind.message_key("auto-direction"), &[direction.value().into()], Style::Plain);
            break direction;
        }
        match line.parse::<i32>().ok().and_then(Direction::from_value) {
            Some(direction) => break direction,
            None => env.say(&kind.message_key("error-direction"), &[line.into()], Style::Red),
        }
    };

    env.say(&kind.message_key("sent"), &[], Style::Red);
    let range = env.state.config.shoot_range;
    Selection::Commit(Some(Act::shot(player.id, target, level, direction, range)))
}

fn auto_shot(player: &Player, env: &mut SelectionEnv<'_>) -> Selection {
    let Some(level) = ai::affordable_level(player.energy) else {
        return Selection::Retry;
    };
    let snapshot = &env.state.snapshot;
    let candidates = snapshot.ids_on(player.position - 1..=player.position + 1);
    let picked = ai::pick_target(snapshot, player.id, candidates, &mut *env.rng)
        .and_then(|id| snapshot.player(id).map(|them| (id, them.position)));
    let Some((target, position)) = picked else {
        env.faults.push(Fault::NoTarget {
            player: player.id,
            kind: ActionKind::Shoot,
        });
        return Selection::Commit(None);
    };

    let direction = Direction::between(player.position, position);
    let range = env.state.config.shoot_range;
    Selection::Commit(Some(Act::shot(player.id, target, level, direction, range)))
}

fn select_move(player: &Player, env: &mut SelectionEnv<'_>, auto: bool) -> Selection {
    let map = env.state.config.map_half_height;
    if auto {
        return match ai::random_step(player.position, map, &mut *env.rng) {
            Some(steps) => Selection::Commit(Some(Act::movement(player.id, steps))),
            None => Selection::Retry,
        };
    }

    let kind = ActionKind::Move;
    loop {
        let line = env.ask(&kind.message_key("ask"), &[MOVE_STEP.into()]);
        let line = line.trim();
        if line.is_empty() {
            env.say(&kind.message_key("cancel"), &[], Style::Plain);
            return Selection::Retry;
        }
        let Ok(steps) = line.parse::<i32>() else {
            env.say(&kind.message_key("error-int"), &[line.into()], Style::Red);
            continue;
        };
        if steps.abs() > MOVE_STEP {
            env.say(&kind.message_key("out-of-range"), &[steps.into()], Style::Red);
        } else if (player.position + steps).abs() > map as i32 {
            env.say(&kind.message_key("out-of-map"), &[steps.into()], Style::Red);
        } else {
            return Selection::Commit(Some(Act::movement(player.id, steps)));
        }
    }
}

fn select_wave(player: &Player, env: &mut SelectionEnv<'_>, auto: bool) -> Selection {
    let kind = ActionKind::Wave;
    if !can_afford(player, kind, env, auto) {
        return Selection::Retry;
    }
    let me = PlayerSnapshot::from(player);
    let range = env.state.config.wave_range;
    if auto {
        let direction = ai::auto_wave_direction(&env.state.snapshot, &me);
        return Selection::Commit(Some(Act::wave(player.id, direction, range)));
    }

    let direction = loop {
        let line = env.ask(&kind.message_key("ask-direction"), &[]);
        // A lone space cancels, an empty line picks the direction automatically.
        if line == " " {
            env.say(&kind.message_key("cancel"), &[], Style::Plain);
            return Selection::Retry;
        }
        let line = line.trim();
        if line.is_empty() {
            let direction = ai::auto_wave_direction(&env.state.snapshot, &me);
            env.say(&kind.message_key("auto-direction"), &[direction.value().into()], Style::Plain);
            break direction;
        }
        match line.parse::<i32>().ok().and_then(Direction::from_value) {
            Some(direction) => break direction,
            None => env.say(&kind.message_key("error-direction"), &[line.into()], Style::Red),
        }
    };

    env.say(&kind.message_key("sent"), &[], Style::Cyan);
    Selection::Commit(Some(Act::wave(player.id, direction, range)))
}

fn select_black_hole(player: &Player, env: &mut SelectionEnv<'_>, auto: bool) -> Selection {
    let kind = ActionKind::BlackHole;
    if !can_afford(player, kind, env, auto) {
        return Selection::Retry;
    }

    if auto {
        let snapshot = &env.state.snapshot;
        let candidates = snapshot.all_ids();
        return match ai::pick_target(snapshot, player.id, candidates, &mut *env.rng) {
            Some(target) => Selection::Commit(Some(Act::black_hole(player.id, target))),
            None => {
                env.faults.push(Fault::NoTarget {
                    player: player.id,
                    kind,
                });
                Selection::Commit(None)
            }
        };
    }

    loop {
        let line = env.ask(&kind.message_key("ask"), &[]);
        let line = line.trim();
        if line.is_empty() {
            env.say(&kind.message_key("cancel"), &[], Style::Plain);
            return Selection::Retry;
        }
        match line.parse::<PlayerId>() {
            Ok(target) if env.state.snapshot.contains(target) => {
                return Selection::Commit(Some(Act::black_hole(player.id, target)));
            }
            _ => env.say(&kind.message_key("not-found"), &[line.into()], Style::Red),
        }
    }
}

fn show_rules(env: &mut SelectionEnv<'_>) -> Selection {
    env.say("rules.overview", &[], Style::Plain);
    for kind in ActionKind::ALL {
        env.say(
            "rules.entry",
            &[kind.code().into(), kind.key().into(), kind.base_cost().into()],
            kind.style(),
        );
    }
    Selection::Retry
}

fn show_status(env: &mut SelectionEnv<'_>) -> Selection {
    let teams = env.state.snapshot.teams();
    let newest = teams.iter().next_back().copied().unwrap_or(0);
    let line = env.ask("status.ask-team", &[newest.into()]);
    let wanted: Vec<TeamId> = match line.trim().parse::<TeamId>() {
        Ok(team) => vec![team],
        Err(_) => teams.into_iter().collect(),
    };

    let state = env.state;
    for player in state.players.values().filter(|p| wanted.contains(&p.team)) {
        env.say(
            "status.line",
            &[
                player.id.into(),
                player.hp.into(),
                player.energy.into(),
                player.position.into(),
                player.damage_dealt.into(),
                player.kills.len().into(),
            ],
            Style::Yellow,
        );
    }
    Selection::Retry
}
