use std::collections::BTreeMap;

use rand::rngs::SmallRng;
use rand::{RngCore, SeedableRng};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::actions::{Act, Resolution};
use super::crossfire::CrossfireStream;
use super::effects::run_pipeline;
use super::selection::SelectionEnv;
use super::state::{ActIndex, BattleState, Fault, Outcome, PlayerId, TeamId};
use crate::ai;
use crate::config::{BattleConfig, ConfigError};
use crate::presenter::{Arg, Presenter, Style};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Error)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BattleError {
    #[error("the battle is already over: {outcome:?}")]
    Finished { outcome: Outcome },
}

/// Summary of one resolved round.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct RoundReport {
    pub round: u32,
    pub registered: usize,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub idle: Vec<PlayerId>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub deaths: Vec<PlayerId>,
    /// (killer, victim) pairs attributed this round.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub kills: Vec<(PlayerId, PlayerId)>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub faults: Vec<Fault>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outcome: Option<Outcome>,
}

/// Drives rounds: selection, dealing in priority order, the death sweep and the
/// win check.
pub struct Battle<P: Presenter> {
    state: BattleState,
    presenter: P,
    rng: Box<dyn RngCore>,
}

impl<P: Presenter> Battle<P> {
    pub fn new(config: BattleConfig, presenter: P) -> Result<Self, ConfigError> {
        Self::with_rng(config, presenter, Box::new(SmallRng::from_entropy()))
    }

    pub fn with_seed(config: BattleConfig, presenter: P, seed: u64) -> Result<Self, ConfigError> {
        Self::with_rng(config, presenter, Box::new(SmallRng::seed_from_u64(seed)))
    }

    /// Fails when `config` does not validate.
    pub fn with_rng(
        config: BattleConfig,
        presenter: P,
        rng: Box<dyn RngCore>,
    ) -> Result<Self, ConfigError> {
        Ok(Self::from_state(BattleState::new(config)?, presenter, rng))
    }

    /// Battle over a prepared state, e.g. a hand-built roster.
    pub fn from_state(state: BattleState, presenter: P, rng: Box<dyn RngCore>) -> Self {
        Self {
            state,
            presenter,
            rng,
        }
    }

    pub fn state(&self) -> &BattleState {
        &self.state
    }

    pub fn state_mut(&mut self) -> &mut BattleState {
        &mut self.state
    }

    pub fn presenter(&self) -> &P {
        &self.presenter
    }

    pub fn presenter_mut(&mut self) -> &mut P {
        &mut self.presenter
    }

    pub fn into_presenter(self) -> P {
        self.presenter
    }

    pub fn outcome(&self) -> Option<&Outcome> {
        self.state.outcome.as_ref()
    }

    fn emit(&mut self, key: &str, args: &[Arg], style: Style) {
        self.presenter.emit(key, args, style);
    }

    fn flush(&mut self) {
        for message in self.state.outbox.drain(..) {
            message.emit_to(&mut self.presenter);
        }
    }

    /// Plays rounds until someone wins or `max_rounds` have been played.
    pub fn run(&mut self, max_rounds: u32) -> Option<Outcome> {
        for _ in 0..max_rounds {
            if self.play_round().is_err() || self.state.outcome.is_some() {
                break;
            }
        }
        self.state.outcome.clone()
    }

    pub fn play_round(&mut self) -> Result<RoundReport, BattleError> {
        if let Some(outcome) = &self.state.outcome {
            return Err(BattleError::Finished {
                outcome: outcome.clone(),
            });
        }
        let faults_before = self.state.diagnostics.len();

        self.state.clean_round();
        self.state.round += 1;
        let round = self.state.round;
        tracing::debug!(round, players = self.state.players.len(), "round started");
        self.emit("round.title", &[round.into()], Style::White);

        let mut report = RoundReport {
            round,
            ..RoundReport::default()
        };

        let Some(acts) = self.select_all() else {
            report.outcome = self.state.outcome.clone();
            report.faults = self.state.diagnostics[faults_before..].to_vec();
            return Ok(report);
        };
        self.state.register(acts);
        report.registered = self.state.registry.len();
        report.idle = self.state.idle.clone();
        tracing::debug!(round, registered = report.registered, "acts registered");

        for index in 0..self.state.registry.len() {
            self.deal(index);
            self.flush();
        }

        for fault in self.state.out_of_bounds() {
            self.state.fault(fault);
        }

        let (deaths, kills) = self.sweep();
        report.deaths = deaths;
        report.kills = kills;

        self.state.refresh_snapshot();
        self.state.outcome = self.check_winner();
        report.outcome = self.state.outcome.clone();
        report.faults = self.state.diagnostics[faults_before..].to_vec();
        Ok(report)
    }

    /// Asks every player for an act in id order. `None` when someone surrendered.
    fn select_all(&mut self) -> Option<Vec<Act>> {
        let mut acts = Vec::new();
        let mut idle = Vec::new();
        let ids: Vec<PlayerId> = self.state.players.keys().copied().collect();

        for id in ids {
            let Some(player) = self.state.players.get(&id) else {
                continue;
            };
            let usable = player.usable_actions(&self.state.snapshot, &self.state.config);
            let Some(suggestion) = ai::decide(&usable, player.human, &mut *self.rng) else {
                idle.push(id);
                continue;
            };

            let mut env = SelectionEnv::new(&self.state, &mut self.presenter, &mut *self.rng);
            let selected = player.select(&mut env, suggestion);
            let faults = env.faults;

            for fault in faults {
                self.state.fault(fault);
            }
            if selected.surrendered {
                tracing::debug!(player = id, "battle abandoned");
                self.state.outcome = Some(Outcome::Abandoned { by: id });
                self.emit("battle.abandoned", &[id.into()], Style::Plain);
                return None;
            }
            acts.extend(selected.acts);
        }

        if !idle.is_empty() {
            self.emit("select.idle", &[join_ids(&idle).into()], Style::Red);
        }
        self.state.idle = idle;
        Some(acts)
    }

    /// Resolves one registry entry, at most once.
    pub fn deal(&mut self, index: ActIndex) {
        deal(&mut self.state, index);
    }

    /// Removes the dead (and, when configured, the idle), crediting each kill to
    /// the source of the victim's last damage before anyone leaves the roster.
    fn sweep(&mut self) -> (Vec<PlayerId>, Vec<(PlayerId, PlayerId)>) {
        let mut deaths: Vec<PlayerId> = self
            .state
            .players
            .values()
            .filter(|player| !player.is_alive())
            .map(|player| player.id)
            .collect();
        if self.state.config.eliminate_idle {
            deaths.extend(self.state.idle.iter().copied());
        }
        deaths.sort_unstable();
        deaths.dedup();
        deaths.retain(|id| self.state.players.contains_key(id));
        if deaths.is_empty() {
            return (deaths, Vec::new());
        }

        let kills: Vec<(PlayerId, PlayerId)> = deaths
            .iter()
            .filter_map(|victim| {
                let record = self.state.players.get(victim)?.last_damage()?;
                Some((record.source, *victim))
            })
            .collect();
        for (killer, victim) in &kills {
            if let Some(killer) = self.state.players.get_mut(killer) {
                killer.kills.push(*victim);
            }
        }

        let mut fallen_by_team: BTreeMap<TeamId, usize> = BTreeMap::new();
        for id in &deaths {
            let Some(player) = self.state.players.remove(id) else {
                continue;
            };
            *fallen_by_team.entry(player.team).or_default() += 1;
            if player.human {
                let last_blow: [Arg; 3] = match player.last_damage() {
                    Some(record) => [record.amount.into(), record.source.into(), record.cause.key().into()],
                    None => [0u32.into(), "unknown".into(), "fate".into()],
                };
                let mut args = vec![player.id.into()];
                args.extend(last_blow);
                self.presenter.read_line("death.human", &args);
            }
        }

        tracing::debug!(round = self.state.round, ?deaths, "players eliminated");
        self.emit(
            "death.report",
            &[join_ids(&deaths).into(), deaths.len().into()],
            Style::Plain,
        );
        if self.state.config.team_size > 1 {
            for (team, fallen) in fallen_by_team {
                self.emit("death.team", &[team.into(), fallen.into()], Style::Red);
            }
        }
        (deaths, kills)
    }

    fn check_winner(&mut self) -> Option<Outcome> {
        let snapshot = &self.state.snapshot;
        let teams = snapshot.teams();
        let outcome = match teams.len() {
            0 => Some(Outcome::NoSurvivors),
            1 if !teams.contains(&0) => {
                let team = teams.first().copied().unwrap_or_default();
                match snapshot.all_ids().as_slice() {
                    [only] => Some(Outcome::PlayerWins { player: *only }),
                    _ => Some(Outcome::TeamWins { team }),
                }
            }
            1 => {
                let humans: Vec<PlayerId> = snapshot
                    .players
                    .iter()
                    .filter(|(_, player)| player.human)
                    .map(|(id, _)| *id)
                    .collect();
                let ai = snapshot.total_population - humans.len();
                match (humans.as_slice(), ai) {
                    ([only], 0) => Some(Outcome::PlayerWins { player: *only }),
                    (_, 0) => None,
                    _ => Some(Outcome::TeamWins { team: 0 }),
                }
            }
            _ => None,
        };

        match &outcome {
            Some(Outcome::PlayerWins { player }) => {
                self.emit("battle.over.player", &[(*player).into()], Style::Yellow)
            }
            Some(Outcome::TeamWins { team }) => {
                self.emit("battle.over.team", &[(*team).into()], Style::Yellow)
            }
            Some(Outcome::NoSurvivors) => self.emit("battle.over.nobody", &[], Style::Yellow),
            Some(Outcome::Abandoned { .. }) | None => {}
        }
        if let Some(outcome) = &outcome {
            tracing::debug!(round = self.state.round, ?outcome, "battle over");
        }
        outcome
    }
}

/// Resolves the act at `index` unless it already has been. An unpaid act the owner
/// can no longer afford is discarded.
pub fn deal(state: &mut BattleState, index: ActIndex) {
    let Some(act) = state.registry.get(index) else {
        return;
    };
    if act.acted {
        return;
    }
    let (owner, kind, cost, paid) = (act.owner, act.kind, act.cost(), act.paid);

    let Some(energy) = state.player(owner).map(|player| player.energy) else {
        state.registry[index].acted = true;
        return state.fault(Fault::MissingPlayer { player: owner });
    };
    if !paid && cost > energy {
        state.registry[index].acted = true;
        return state.fault(Fault::Unaffordable {
            player: owner,
            kind,
            cost,
            energy,
        });
    }

    match kind.resolution() {
        Resolution::Immediate(steps) => run_pipeline((), steps, index, state),
        Resolution::Ranged(steps) => {
            run_pipeline(CrossfireStream::default(), steps, index, state);
        }
    }
    state.registry[index].acted = true;
}

fn join_ids(ids: &[PlayerId]) -> String {
    ids.iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::actions::{ActionKind, Direction};
    use crate::config::Tweak;
    use crate::game::state::Player;
    use crate::presenter::RecordingPresenter;

    fn battle(players: Vec<Player>, config: BattleConfig) -> Battle<RecordingPresenter> {
        let state = BattleState::from_players(config, players);
        Battle::from_state(
            state,
            RecordingPresenter::new(),
            Box::new(SmallRng::seed_from_u64(42)),
        )
    }

    #[test]
    fn unaffordable_act_becomes_a_noop() {
        let mut battle = battle(
            vec![Player::new(1, 1).with_energy(1), Player::new(2, 1).with_team(1)],
            BattleConfig::ai_only(2),
        );
        battle
            .state_mut()
            .register([Act::shot(1, 2, 3, Direction::Level, 1)]);
        battle.deal(0);

        let state = battle.state();
        assert!(state.registry[0].acted);
        assert_eq!(state.players[&2].hp, 1);
        assert_eq!(state.players[&1].energy, 1);
        assert!(matches!(state.diagnostics[0], Fault::Unaffordable { cost: 3, .. }));
    }

    #[test]
    fn acts_are_dealt_once() {
        let mut battle = battle(vec![Player::new(1, 1)], BattleConfig::ai_only(1));
        battle.state_mut().register([Act::new(1, ActionKind::Charge)]);
        battle.deal(0);
        battle.deal(0);
        assert_eq!(battle.state().players[&1].energy, 1);
    }

    #[test]
    fn kill_is_credited_before_removal() {
        let mut battle = battle(
            vec![
                Player::new(1, 1).with_team(1).with_energy(3),
                Player::new(2, 1).with_team(2),
                Player::new(3, 1).with_team(3).at(1),
            ],
            BattleConfig::ai_only(3),
        );
        battle
            .state_mut()
            .register([Act::shot(1, 2, 3, Direction::Level, 1)]);
        battle.deal(0);
        let (deaths, kills) = battle.sweep();

        assert_eq!(deaths, vec![2]);
        assert_eq!(kills, vec![(1, 2)]);
        assert_eq!(battle.state().players[&1].kills, vec![2]);
        assert!(!battle.state().players.contains_key(&2));
        assert!(battle.presenter().contains("death.report"));
    }

    #[test]
    fn winner_is_declared_from_survivors() {
        let mut lone = battle(vec![Player::new(4, 1).with_team(2)], BattleConfig::ai_only(4));
        assert_eq!(lone.check_winner(), Some(Outcome::PlayerWins { player: 4 }));

        let mut squad = battle(
            vec![Player::new(1, 1).with_team(2), Player::new(2, 1).with_team(2)],
            BattleConfig::ai_only(2),
        );
        assert_eq!(squad.check_winner(), Some(Outcome::TeamWins { team: 2 }));

        let mut humans = battle(
            vec![Player::human(1, 1), Player::human(2, 1)],
            BattleConfig::default(),
        );
        assert_eq!(humans.check_winner(), None, "humans keep fighting each other");

        let mut allied = battle(
            vec![Player::human(1, 1), Player::new(2, 1)],
            BattleConfig::default(),
        );
        assert_eq!(allied.check_winner(), Some(Outcome::TeamWins { team: 0 }));

        let mut empty = battle(Vec::new(), BattleConfig::default());
        assert_eq!(empty.check_winner(), Some(Outcome::NoSurvivors));
        assert!(empty.presenter().contains("battle.over.nobody"));
    }

    #[test]
    fn unvalidated_config_is_refused() {
        let config = BattleConfig::ai_only(3).with_tweak(Tweak::for_players([9]).hp(2));
        let result = Battle::with_seed(config, RecordingPresenter::new(), 1);
        assert!(matches!(result, Err(ConfigError::InvalidTweak { .. })));
    }

    #[test]
    fn finished_battle_refuses_more_rounds() {
        let mut battle = battle(vec![Player::new(1, 1).with_team(1)], BattleConfig::ai_only(1));
        let report = battle.play_round().expect("first round should resolve");
        assert_eq!(report.outcome, Some(Outcome::PlayerWins { player: 1 }));
        assert!(matches!(
            battle.play_round(),
            Err(BattleError::Finished { .. })
        ));
    }
}
