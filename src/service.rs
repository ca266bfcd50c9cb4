//! Executes parsed commands against the registry, ledger and bracket under the
//! coordinator, and turns the result into a reply plus optional broadcast text.

use chrono::Local;
use std::{sync::Arc, time::Duration};
use tracing::{error, info, warn};

use crate::bracket::{self, NextMatches};
use crate::command::{self, Command};
use crate::coordinator::{Coordinated, Coordinator};
use crate::decision::{self, transition, Transition};
use crate::error::{EngineError, StoreError};
use crate::ledger::ScoreLedger;
use crate::registry::MatchRegistry;
use crate::store::RowStore;
use crate::types::{
    AppConfig, CommandReply, InboundEvent, LogRow, Match, MatchKey, MatchStatus, MatchView,
    ScoreSnapshot, Slot, TournamentState, HELP_TEXT,
};

const LOG_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
const FORMAT_EXAMPLES: &str = "Example: A 1 start RedTeam BlueTeam\nExample: A 1 3Top 4";

#[derive(Debug, Clone, Copy)]
pub struct EngineSettings {
    pub max_innings: u32,
    pub lock_timeout: Duration,
    pub dedup_ttl: Duration,
}

impl From<&AppConfig> for EngineSettings {
    fn from(config: &AppConfig) -> Self {
        EngineSettings {
            max_innings: config.max_innings,
            lock_timeout: Duration::from_millis(config.lock_timeout_ms),
            dedup_ttl: Duration::from_secs(config.dedup_ttl_secs),
        }
    }
}

impl Default for EngineSettings {
    fn default() -> Self {
        EngineSettings::from(&AppConfig::default())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum EventOutcome {
    Reply(CommandReply),
    /// Redelivery of an event already applied inside the dedup window.
    Duplicate,
}

pub struct Tournament {
    store: Arc<dyn RowStore>,
    registry: MatchRegistry,
    ledger: ScoreLedger,
    coordinator: Coordinator,
}

impl Tournament {
    pub fn new(store: Arc<dyn RowStore>, settings: EngineSettings) -> Self {
        Tournament {
            registry: MatchRegistry::new(store.clone()),
            ledger: ScoreLedger::new(store.clone(), settings.max_innings),
            coordinator: Coordinator::new(settings.lock_timeout, settings.dedup_ttl),
            store,
        }
    }

    pub fn registry(&self) -> &MatchRegistry {
        &self.registry
    }

    pub fn ledger(&self) -> &ScoreLedger {
        &self.ledger
    }

    pub fn coordinator(&self) -> &Coordinator {
        &self.coordinator
    }

    pub async fn handle_event(&self, event: &InboundEvent) -> EventOutcome {
        let command = match command::parse(&event.text) {
            Ok(command) => command,
            Err(e) => {
                info!("unparseable message {:?}: {e}", event.text);
                return EventOutcome::Reply(CommandReply::failure(format!(
                    "Format error: {e}\n{FORMAT_EXAMPLES}"
                )));
            }
        };
        if !command.is_mutation() {
            return EventOutcome::Reply(CommandReply::success(HELP_TEXT, None));
        }

        let sender_id = event.sender_id.as_deref().unwrap_or("-");
        let result = self
            .coordinator
            .run(event.event_id.as_deref(), || self.apply(&command, sender_id))
            .await;
        match result {
            Ok(Coordinated::Applied(reply)) => EventOutcome::Reply(reply),
            Ok(Coordinated::Duplicate) => EventOutcome::Duplicate,
            Err(e) => {
                log_failure(&command, &e);
                EventOutcome::Reply(CommandReply::failure(e.to_string()))
            }
        }
    }

    /// Applies one command. Callers hold the coordinator lock.
    pub fn apply(&self, command: &Command, sender_id: &str) -> Result<CommandReply, EngineError> {
        match command {
            Command::Help => Ok(CommandReply::success(HELP_TEXT, None)),
            Command::Start { key, teams } => self.start(key, teams.clone(), sender_id),
            Command::Score {
                key,
                inning,
                half,
                runs,
            } => self.score(key, *inning, *half, *runs, sender_id),
            Command::Finish { key } => self.finish(key, sender_id),
            Command::Tiebreak { key, winner } => self.tiebreak(key, winner, sender_id),
            Command::Reopen { key } => self.reopen(key, sender_id),
        }
    }

    // ── Commands ───────────────────────────────────────────────────────

    fn start(
        &self,
        key: &MatchKey,
        teams: Option<(String, String)>,
        sender_id: &str,
    ) -> Result<CommandReply, EngineError> {
        let game = match self.registry.get(key)? {
            Some(game) => game,
            None => {
                self.registry.ensure_game_number_free(key)?;
                Match::new(key)
            }
        };
        let explicit = teams.is_some();
        let next = transition(&game, Transition::Start { teams })?;
        self.registry.put(&next)?;

        let top = next.team_or_label(Slot::Top);
        let bottom = next.team_or_label(Slot::Bottom);
        let kind = if explicit {
            format!("start:{top} vs {bottom}")
        } else {
            "start".to_string()
        };
        self.append_log(LogRow::event(key, sender_id, kind));
        info!("{key} started: {top} vs {bottom}");

        Ok(CommandReply::success(
            format!("{key} started\nTop: {top}\nBottom: {bottom}"),
            Some(format!(
                "Play ball!\nCourt {}: {top} (top) vs {bottom} (bottom) has started.",
                key.court
            )),
        ))
    }

    fn score(
        &self,
        key: &MatchKey,
        inning: u32,
        half: Slot,
        runs: u32,
        sender_id: &str,
    ) -> Result<CommandReply, EngineError> {
        let existing = self.registry.get(key)?;
        match &existing {
            Some(game) if game.status == MatchStatus::Finished => {
                return Err(EngineError::AlreadyFinished {
                    court: key.court.clone(),
                    game_number: key.game_number,
                });
            }
            Some(_) => {}
            None => self.registry.ensure_game_number_free(key)?,
        }

        let previous = self.ledger.record_score(key, half, inning, runs)?;
        let game = match existing {
            Some(game) => game,
            None => {
                info!("{key} created by its first score");
                self.registry.upsert(key)?
            }
        };
        let snapshot = self.ledger.snapshot(key)?;
        self.append_log(LogRow {
            inning: Some(inning),
            half: Some(half),
            runs: Some(runs),
            ..LogRow::event(key, sender_id, "score")
        });

        let batting = game.team_or_label(half);
        let before = previous.unwrap_or(0);
        let gained = runs.saturating_sub(before);
        let inning_label = format!("inning {inning} {}", half.label());

        let mut message = format!(
            "[{}: {batting}] {inning_label}\n{before} -> {runs}",
            half.label()
        );
        if gained > 0 {
            message.push_str(&format!(" (+{gained})"));
        }
        let broadcast = (gained > 0).then(|| {
            format!(
                "Score update\n{key}, {inning_label}\n{batting} scores {gained}!\n{}",
                score_line(&game, &snapshot)
            )
        });
        Ok(CommandReply::success(message, broadcast))
    }

    fn finish(&self, key: &MatchKey, sender_id: &str) -> Result<CommandReply, EngineError> {
        let game = self.registry.require(key)?;
        let snapshot = self.ledger.snapshot(key)?;
        let next = transition(
            &game,
            Transition::Finish {
                top_total: snapshot.top_total,
                bottom_total: snapshot.bottom_total,
            },
        )?;

        if next.is_draw() {
            self.registry.put(&next)?;
            self.append_log(LogRow::event(key, sender_id, "finish:draw"));
            info!("{key} finished level at {}", score_line(&next, &snapshot));
            return Ok(CommandReply::success(
                format!(
                    "{key} is a draw ({})\nDecide the winner and send:\n{} {} tiebreak <team>",
                    score_line(&next, &snapshot),
                    key.court,
                    key.game_number
                ),
                None,
            ));
        }

        let (winner, loser) = resolved_teams(&next)?;
        bracket::advance(&self.registry, &next, &winner, &loser)?;
        self.registry.put(&next)?;
        self.append_log(LogRow::event(key, sender_id, "finish"));
        info!("{key} finished, {winner} wins");

        let headline = format!(
            "Game over!\n{key}\n{}\n\n{winner} wins!",
            score_line(&next, &snapshot)
        );
        let broadcast = self.result_broadcast(&next, headline, &winner, &loser)?;
        Ok(CommandReply::success(format!("{key} finished"), Some(broadcast)))
    }

    fn tiebreak(&self, key: &MatchKey, team: &str, sender_id: &str) -> Result<CommandReply, EngineError> {
        let game = self.registry.require(key)?;
        let snapshot = self.ledger.snapshot(key)?;
        let next = transition(
            &game,
            Transition::ForceWinner {
                team: team.to_string(),
            },
        )?;

        let (winner, loser) = resolved_teams(&next)?;
        bracket::advance(&self.registry, &next, &winner, &loser)?;
        self.registry.put(&next)?;
        self.append_log(LogRow::event(key, sender_id, format!("tiebreak:{winner}")));
        info!("{key} decided by tiebreak for {winner}");

        let headline = format!(
            "Game over (decided by tiebreak)\n{key}\n{}\n\n{winner} wins the tiebreak!",
            score_line(&next, &snapshot)
        );
        let broadcast = self.result_broadcast(&next, headline, &winner, &loser)?;
        Ok(CommandReply::success(
            format!("{key}: {winner} wins by tiebreak"),
            Some(broadcast),
        ))
    }

    fn reopen(&self, key: &MatchKey, sender_id: &str) -> Result<CommandReply, EngineError> {
        let game = self.registry.require(key)?;
        let next = transition(&game, Transition::Reopen)?;
        self.registry.put(&next)?;
        self.append_log(LogRow::event(key, sender_id, "reopen"));

        let downstream = bracket::dependents(&self.registry, key.game_number)?;
        let mut message = format!("{key} reopened");
        if !downstream.is_empty() {
            let games: Vec<String> = downstream.iter().map(|n| n.to_string()).collect();
            message.push_str(&format!(
                "\nTeams already sent to games {} stay there until this game finishes again",
                games.join(", ")
            ));
            warn!("{key} reopened with downstream games {downstream:?}");
        } else {
            info!("{key} reopened");
        }
        Ok(CommandReply::success(message, None))
    }

    // ── Broadcast text ─────────────────────────────────────────────────

    fn result_broadcast(
        &self,
        game: &Match,
        headline: String,
        winner: &str,
        loser: &str,
    ) -> Result<String, StoreError> {
        let mut text = headline;
        let NextMatches {
            winner_match,
            loser_match,
        } = bracket::next_matches(&self.registry, game)?;
        if let Some(next) = winner_match {
            text.push_str(&format!(
                "\n{winner} moves on to game {} (Court {}, {}).",
                next.game_number,
                next.court,
                next.start_label()
            ));
        }
        if let Some(next) = loser_match {
            text.push_str(&format!(
                "\n{loser} plays next in game {} (Court {}, {}).",
                next.game_number,
                next.court,
                next.start_label()
            ));
        }
        if let Some(upcoming) = bracket::next_on_court(&self.registry, &game.court, game.game_number)? {
            text.push_str(&format!(
                "\n\nNext on Court {}\nGame {}: {} vs {}\nStarts {}",
                upcoming.court,
                upcoming.game_number,
                upcoming.team_or_label(Slot::Top),
                upcoming.team_or_label(Slot::Bottom),
                upcoming.start_label()
            ));
        }
        Ok(text)
    }

    /// The state change is already stored when this runs, so a failed append
    /// is logged and the command still succeeds.
    fn append_log(&self, row: LogRow) {
        let result = serde_json::to_value(&row)
            .map_err(|source| StoreError::Serde {
                key: "log".to_string(),
                source,
            })
            .and_then(|value| self.store.append_log(value));
        if let Err(e) = result {
            error!("audit log row for Court {} game {} lost: {e}", row.court, row.game_number);
        }
    }

    // ── Read side ──────────────────────────────────────────────────────

    /// Current view of one match. Does not wait for the tournament lock.
    pub fn match_view(&self, key: &MatchKey) -> Result<Option<MatchView>, StoreError> {
        let Some(game) = self.registry.get(key)? else {
            return Ok(None);
        };
        let score = self.ledger.snapshot(key)?;
        Ok(Some(view(game, score)))
    }

    pub fn state(&self) -> Result<TournamentState, StoreError> {
        let mut matches = Vec::new();
        for game in self.registry.list()? {
            let score = self.ledger.snapshot(&game.key())?;
            matches.push(view(game, score));
        }
        Ok(TournamentState {
            matches,
            max_innings: self.ledger.max_innings(),
            generated_at: Local::now().to_rfc3339(),
        })
    }
}

impl LogRow {
    fn event(key: &MatchKey, sender_id: &str, kind: impl Into<String>) -> Self {
        LogRow {
            timestamp: Local::now().format(LOG_TIMESTAMP_FORMAT).to_string(),
            court: key.court.clone(),
            game_number: key.game_number,
            inning: None,
            half: None,
            runs: None,
            sender_id: sender_id.to_string(),
            kind: kind.into(),
        }
    }
}

fn view(game: Match, score: ScoreSnapshot) -> MatchView {
    let decision = decision::decide(&game, &score);
    MatchView {
        game,
        score,
        decision,
    }
}

fn score_line(game: &Match, snapshot: &ScoreSnapshot) -> String {
    format!(
        "{} {} - {} {}",
        game.team_or_label(Slot::Top),
        snapshot.top_total,
        snapshot.bottom_total,
        game.team_or_label(Slot::Bottom)
    )
}

fn resolved_teams(game: &Match) -> Result<(String, String), EngineError> {
    match (game.winner_team(), game.loser_team()) {
        (Some(winner), Some(loser)) => Ok((winner.to_string(), loser.to_string())),
        _ => Err(EngineError::UnresolvedDraw {
            court: game.court.clone(),
            game_number: game.game_number,
        }),
    }
}

fn log_failure(command: &Command, err: &EngineError) {
    let target = command
        .key()
        .map(|key| key.to_string())
        .unwrap_or_else(|| "-".to_string());
    if err.is_configuration_defect() {
        error!("{target}: {err}");
    } else if err.is_transient() {
        warn!("{target}: {err}");
    } else {
        info!("{target} rejected: {err}");
    }
}
