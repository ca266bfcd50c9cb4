use tracing::debug;

use crate::error::EngineError;
use crate::types::{DecidedBy, Decision, Match, MatchStatus, ScoreSnapshot, Slot};

/// The win rule on its own: more runs wins, equal runs is a draw only once the
/// match has been called finished.
pub fn decide_totals(top_total: u32, bottom_total: u32, finished: bool) -> Decision {
    if top_total > bottom_total {
        Decision::Win(Slot::Top)
    } else if bottom_total > top_total {
        Decision::Win(Slot::Bottom)
    } else if finished {
        Decision::Draw
    } else {
        Decision::Undetermined
    }
}

/// Read-only view of where a match stands. A tiebreak result outranks the totals.
pub fn decide(game: &Match, score: &ScoreSnapshot) -> Decision {
    if game.decided_by == Some(DecidedBy::Tiebreak) {
        if let Some(slot) = game.winner {
            return Decision::Win(slot);
        }
    }
    decide_totals(
        score.top_total,
        score.bottom_total,
        game.status == MatchStatus::Finished,
    )
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    Start { teams: Option<(String, String)> },
    Finish { top_total: u32, bottom_total: u32 },
    ForceWinner { team: String },
    Reopen,
}

impl Transition {
    pub fn name(&self) -> &'static str {
        match self {
            Transition::Start { .. } => "start",
            Transition::Finish { .. } => "finish",
            Transition::ForceWinner { .. } => "tiebreak",
            Transition::Reopen => "reopen",
        }
    }
}

/// The only place match status changes. Returns the updated match without
/// persisting it.
pub fn transition(game: &Match, step: Transition) -> Result<Match, EngineError> {
    let name = step.name();
    let mut next = game.clone();
    match step {
        Transition::Start { teams } => {
            if game.status == MatchStatus::Finished {
                return Err(already_finished(game));
            }
            if let Some((top, bottom)) = teams {
                next.set_team(Slot::Top, top);
                next.set_team(Slot::Bottom, bottom);
            }
            if !next.has_both_teams() {
                return Err(teams_not_registered(game));
            }
            next.status = MatchStatus::Playing;
        }
        Transition::Finish {
            top_total,
            bottom_total,
        } => {
            if game.status == MatchStatus::Finished {
                return Err(already_finished(game));
            }
            if !game.has_both_teams() {
                return Err(teams_not_registered(game));
            }
            next.status = MatchStatus::Finished;
            match decide_totals(top_total, bottom_total, true) {
                Decision::Win(slot) => {
                    next.winner = Some(slot);
                    next.decided_by = Some(DecidedBy::Score);
                }
                _ => {
                    next.winner = None;
                    next.decided_by = None;
                }
            }
        }
        Transition::ForceWinner { team } => {
            if game.status == MatchStatus::Finished && game.winner.is_some() {
                return Err(already_finished(game));
            }
            let Some(slot) = game.slot_of(&team) else {
                return Err(EngineError::InvalidTeam {
                    team,
                    top: game.team_or_label(Slot::Top),
                    bottom: game.team_or_label(Slot::Bottom),
                });
            };
            next.status = MatchStatus::Finished;
            next.winner = Some(slot);
            next.decided_by = Some(DecidedBy::Tiebreak);
        }
        Transition::Reopen => {
            if game.status != MatchStatus::Finished {
                return Err(EngineError::NotFinished {
                    court: game.court.clone(),
                    game_number: game.game_number,
                });
            }
            next.status = MatchStatus::Playing;
            next.winner = None;
            next.decided_by = None;
        }
    }
    debug!("{} {name}: {:?} -> {:?}", game.key(), game.status, next.status);
    Ok(next)
}

fn already_finished(game: &Match) -> EngineError {
    EngineError::AlreadyFinished {
        court: game.court.clone(),
        game_number: game.game_number,
    }
}

fn teams_not_registered(game: &Match) -> EngineError {
    EngineError::TeamsNotRegistered {
        court: game.court.clone(),
        game_number: game.game_number,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::MatchKey;

    fn playing() -> Match {
        let mut game = Match::new(&MatchKey::new("A", 1));
        game.set_team(Slot::Top, "RedTeam");
        game.set_team(Slot::Bottom, "BlueTeam");
        game.status = MatchStatus::Playing;
        game
    }

    fn finish(game: &Match, top: u32, bottom: u32) -> Match {
        transition(
            game,
            Transition::Finish {
                top_total: top,
                bottom_total: bottom,
            },
        )
        .unwrap()
    }

    #[test]
    fn test_decide_totals() {
        assert_eq!(decide_totals(3, 1, false), Decision::Win(Slot::Top));
        assert_eq!(decide_totals(0, 2, true), Decision::Win(Slot::Bottom));
        assert_eq!(decide_totals(4, 4, false), Decision::Undetermined);
        assert_eq!(decide_totals(4, 4, true), Decision::Draw);
    }

    #[test]
    fn test_decide_is_stable_for_same_totals() {
        let game = finish(&playing(), 6, 2);
        let score = ScoreSnapshot {
            top: vec![Some(6)],
            bottom: vec![Some(2)],
            top_total: 6,
            bottom_total: 2,
        };
        let first = decide(&game, &score);
        for _ in 0..3 {
            assert_eq!(decide(&game, &score), first);
        }
        assert_eq!(first, Decision::Win(Slot::Top));
    }

    #[test]
    fn test_start_requires_teams() {
        let fresh = Match::new(&MatchKey::new("A", 1));
        let err = transition(&fresh, Transition::Start { teams: None }).unwrap_err();
        assert!(matches!(err, EngineError::TeamsNotRegistered { .. }));

        let started = transition(
            &fresh,
            Transition::Start {
                teams: Some(("RedTeam".into(), "BlueTeam".into())),
            },
        )
        .unwrap();
        assert_eq!(started.status, MatchStatus::Playing);
        assert_eq!(started.team(Slot::Bottom), Some("BlueTeam"));
    }

    #[test]
    fn test_finish_with_lead_resolves_winner() {
        let done = finish(&playing(), 1, 3);
        assert_eq!(done.status, MatchStatus::Finished);
        assert_eq!(done.winner_team(), Some("BlueTeam"));
        assert_eq!(done.loser_team(), Some("RedTeam"));
        assert_eq!(done.decided_by, Some(DecidedBy::Score));

        let err = transition(&done, Transition::Start { teams: None }).unwrap_err();
        assert!(matches!(err, EngineError::AlreadyFinished { .. }));
    }

    #[test]
    fn test_draw_needs_force_winner() {
        let drawn = finish(&playing(), 5, 5);
        assert!(drawn.is_draw());
        assert!(drawn.winner_team().is_none());

        let err = transition(
            &drawn,
            Transition::ForceWinner {
                team: "GreenTeam".into(),
            },
        )
        .unwrap_err();
        assert!(matches!(err, EngineError::InvalidTeam { .. }));

        let resolved = transition(
            &drawn,
            Transition::ForceWinner {
                team: "BlueTeam".into(),
            },
        )
        .unwrap();
        assert_eq!(resolved.winner_team(), Some("BlueTeam"));
        assert_eq!(resolved.decided_by, Some(DecidedBy::Tiebreak));

        let score = ScoreSnapshot {
            top: vec![Some(5)],
            bottom: vec![Some(5)],
            top_total: 5,
            bottom_total: 5,
        };
        assert_eq!(decide(&drawn, &score), Decision::Draw);
        assert_eq!(decide(&resolved, &score), Decision::Win(Slot::Bottom));
    }

    #[test]
    fn test_reopen_clears_resolution_only() {
        let done = finish(&playing(), 2, 0);
        let reopened = transition(&done, Transition::Reopen).unwrap();
        assert_eq!(reopened.status, MatchStatus::Playing);
        assert!(reopened.winner.is_none());
        assert_eq!(reopened.team(Slot::Top), Some("RedTeam"));

        let err = transition(&reopened, Transition::Reopen).unwrap_err();
        assert!(matches!(err, EngineError::NotFinished { .. }));
    }
}
