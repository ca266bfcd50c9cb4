use chrono::NaiveTime;
use serde::{Deserialize, Serialize};
use std::{
  collections::{HashMap, HashSet},
  fs,
  path::Path,
};
use tracing::{error, info};

use crate::error::{EngineError, StoreError};
use crate::registry::MatchRegistry;
use crate::types::{BracketEdge, Match, MatchKey, MatchStatus, Outcome, SCHEDULE_TIME_FORMAT};

// ── Bracket definition file ────────────────────────────────────────────

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BracketMatchConfig {
  pub court: String,
  pub game_number: u32,
  #[serde(default)]
  pub top_team: Option<String>,
  #[serde(default)]
  pub bottom_team: Option<String>,
  /// Local start time as "HH:MM".
  #[serde(default)]
  pub scheduled_start: Option<String>,
  #[serde(default)]
  pub winner_next: Option<BracketEdge>,
  #[serde(default)]
  pub loser_next: Option<BracketEdge>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BracketDefinition {
  #[serde(default)]
  pub name: Option<String>,
  pub matches: Vec<BracketMatchConfig>,
}

pub fn load_bracket_definition(path: &Path) -> Result<BracketDefinition, String> {
  if !path.is_file() {
    return Err(format!("Bracket definition not found at {}.", path.display()));
  }
  let data = fs::read_to_string(path)
    .map_err(|e| format!("read bracket definition {}: {e}", path.display()))?;
  serde_json::from_str::<BracketDefinition>(&data)
    .map_err(|e| format!("parse bracket definition {}: {e}", path.display()))
}

pub fn parse_schedule_time(raw: &str) -> Option<NaiveTime> {
  NaiveTime::parse_from_str(raw.trim(), SCHEDULE_TIME_FORMAT).ok()
}

/// Rejects definitions that would make `advance` fail or loop: unknown
/// destinations, two edges into one slot, and cycles.
pub fn validate_bracket(definition: &BracketDefinition) -> Result<(), String> {
  if definition.matches.is_empty() {
    return Err("Bracket definition needs at least one match.".to_string());
  }

  let mut games = HashSet::new();
  for config in &definition.matches {
    if config.court.trim().is_empty() {
      return Err(format!("Game {} has no court.", config.game_number));
    }
    if !games.insert(config.game_number) {
      return Err(format!("Game {} is defined more than once.", config.game_number));
    }
    if let Some(raw) = config.scheduled_start.as_deref() {
      if !raw.trim().is_empty() && parse_schedule_time(raw).is_none() {
        return Err(format!(
          "Game {} has an unreadable start time \"{raw}\" (expected HH:MM).",
          config.game_number
        ));
      }
    }
  }

  let mut fed_slots = HashSet::new();
  for config in &definition.matches {
    for edge in [config.winner_next, config.loser_next].into_iter().flatten() {
      if !games.contains(&edge.game_number) {
        return Err(format!(
          "Game {} sends a team to game {}, which is not defined.",
          config.game_number, edge.game_number
        ));
      }
      if edge.game_number == config.game_number {
        return Err(format!("Game {} feeds into itself.", config.game_number));
      }
      if !fed_slots.insert((edge.game_number, edge.slot)) {
        return Err(format!(
          "Game {} {} slot is fed by more than one edge.",
          edge.game_number,
          edge.slot.label()
        ));
      }
    }
  }

  let graph = edge_graph(
    definition
      .matches
      .iter()
      .map(|config| (config.game_number, [config.winner_next, config.loser_next])),
  );
  for config in &definition.matches {
    if reachable(&graph, config.game_number).contains(&config.game_number) {
      return Err(format!("Game {} is part of a bracket cycle.", config.game_number));
    }
  }
  Ok(())
}

/// Writes the definition into the registry. Rosters and status already in the
/// store win over the file, so a restart never rewinds a running tournament.
pub fn seed_registry(registry: &MatchRegistry, definition: &BracketDefinition) -> Result<usize, EngineError> {
  let mut seeded = 0usize;
  for config in &definition.matches {
    let key = MatchKey::new(config.court.trim(), config.game_number);
    registry.ensure_game_number_free(&key)?;
    let mut game = registry.upsert(&key)?;
    game.scheduled_start = config.scheduled_start.as_deref().and_then(parse_schedule_time);
    game.winner_next = config.winner_next;
    game.loser_next = config.loser_next;
    if game.top_team.is_none() {
      game.top_team = config.top_team.clone().filter(|name| !name.trim().is_empty());
    }
    if game.bottom_team.is_none() {
      game.bottom_team = config.bottom_team.clone().filter(|name| !name.trim().is_empty());
    }
    registry.put(&game)?;
    seeded += 1;
  }
  info!(
    "seeded {seeded} matches from bracket {}",
    definition.name.as_deref().unwrap_or("(unnamed)")
  );
  Ok(seeded)
}

// ── Propagation ────────────────────────────────────────────────────────

/// Destination matches after `advance` wrote into them.
#[derive(Clone, Debug, Default)]
pub struct Advancement {
  pub winner_to: Option<Match>,
  pub loser_to: Option<Match>,
}

/// Moves the winner and loser of a finished match into their next games.
/// Every destination is looked up before anything is written.
pub fn advance(
  registry: &MatchRegistry,
  source: &Match,
  winner_team: &str,
  loser_team: &str,
) -> Result<Advancement, EngineError> {
  if source.status != MatchStatus::Finished {
    return Err(EngineError::NotFinished {
      court: source.court.clone(),
      game_number: source.game_number,
    });
  }
  if source.winner.is_none() {
    return Err(EngineError::UnresolvedDraw {
      court: source.court.clone(),
      game_number: source.game_number,
    });
  }

  for outcome in [Outcome::Winner, Outcome::Loser] {
    if let Some(edge) = source.edge(outcome) {
      if registry.find_by_game_number(edge.game_number)?.is_none() {
        error!(
          "bracket defect: game {} routes its {:?} to missing game {}",
          source.game_number, outcome, edge.game_number
        );
        return Err(EngineError::DestinationMatchNotFound {
          game_number: edge.game_number,
        });
      }
    }
  }

  let mut result = Advancement::default();
  if let Some(edge) = source.winner_next {
    result.winner_to = Some(write_slot(registry, edge, winner_team)?);
  }
  if let Some(edge) = source.loser_next {
    result.loser_to = Some(write_slot(registry, edge, loser_team)?);
  } else {
    info!("{loser_team} is eliminated after game {}", source.game_number);
  }
  Ok(result)
}

fn write_slot(registry: &MatchRegistry, edge: BracketEdge, team: &str) -> Result<Match, EngineError> {
  let dest = registry
    .find_by_game_number(edge.game_number)?
    .ok_or(EngineError::DestinationMatchNotFound {
      game_number: edge.game_number,
    })?;
  let dest = registry.set_team(&dest.key(), edge.slot, team)?;
  info!("{team} advances to game {} ({})", edge.game_number, edge.slot.label());
  Ok(dest)
}

// ── Lookups for announcements ──────────────────────────────────────────

#[derive(Clone, Debug, Default)]
pub struct NextMatches {
  pub winner_match: Option<Match>,
  pub loser_match: Option<Match>,
}

pub fn next_matches(registry: &MatchRegistry, game: &Match) -> Result<NextMatches, StoreError> {
  let lookup = |edge: Option<BracketEdge>| -> Result<Option<Match>, StoreError> {
    match edge {
      Some(edge) => registry.find_by_game_number(edge.game_number),
      None => Ok(None),
    }
  };
  Ok(NextMatches {
    winner_match: lookup(game.winner_next)?,
    loser_match: lookup(game.loser_next)?,
  })
}

/// The next game still on standby at the same court.
pub fn next_on_court(registry: &MatchRegistry, court: &str, after_game: u32) -> Result<Option<Match>, StoreError> {
  Ok(registry
    .list()?
    .into_iter()
    .filter(|game| game.court == court && game.game_number > after_game && game.status == MatchStatus::Standby)
    .min_by_key(|game| game.game_number))
}

/// Every game that can receive a team, directly or transitively, from `game_number`.
pub fn dependents(registry: &MatchRegistry, game_number: u32) -> Result<Vec<u32>, StoreError> {
  let games = registry.list()?;
  let graph = edge_graph(
    games
      .iter()
      .map(|game| (game.game_number, [game.winner_next, game.loser_next])),
  );
  let mut out: Vec<u32> = reachable(&graph, game_number).into_iter().collect();
  out.sort_unstable();
  Ok(out)
}

fn edge_graph<I>(games: I) -> HashMap<u32, Vec<u32>>
where
  I: Iterator<Item = (u32, [Option<BracketEdge>; 2])>,
{
  let mut graph: HashMap<u32, Vec<u32>> = HashMap::new();
  for (game_number, edges) in games {
    let children = graph.entry(game_number).or_default();
    children.extend(edges.into_iter().flatten().map(|edge| edge.game_number));
  }
  graph
}

/// Games reachable from `root` through at least one edge.
fn reachable(graph: &HashMap<u32, Vec<u32>>, root: u32) -> HashSet<u32> {
  let mut seen = HashSet::new();
  let mut stack: Vec<u32> = graph.get(&root).cloned().unwrap_or_default();
  while let Some(current) = stack.pop() {
    if !seen.insert(current) {
      continue;
    }
    if let Some(children) = graph.get(&current) {
      stack.extend(children.iter().copied());
    }
  }
  seen
}
