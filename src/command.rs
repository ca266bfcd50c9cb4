use crate::error::FormatError;
use crate::types::{MatchKey, Slot};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Help,
    Start {
        key: MatchKey,
        teams: Option<(String, String)>,
    },
    Score {
        key: MatchKey,
        inning: u32,
        half: Slot,
        runs: u32,
    },
    Finish {
        key: MatchKey,
    },
    Tiebreak {
        key: MatchKey,
        winner: String,
    },
    Reopen {
        key: MatchKey,
    },
}

impl Command {
    pub fn key(&self) -> Option<&MatchKey> {
        match self {
            Command::Help => None,
            Command::Start { key, .. }
            | Command::Score { key, .. }
            | Command::Finish { key }
            | Command::Tiebreak { key, .. }
            | Command::Reopen { key } => Some(key),
        }
    }

    pub fn is_mutation(&self) -> bool {
        !matches!(self, Command::Help)
    }
}

const HELP_WORDS: &[&str] = &["help", "?", "？", "ヘルプ"];
const START_WORDS: &[&str] = &["start", "開始"];
const FINISH_WORDS: &[&str] = &["finish", "end", "終了"];
const TIEBREAK_WORDS: &[&str] = &["tiebreak", "じゃんけん"];
const REOPEN_WORDS: &[&str] = &["reopen", "resume", "再開"];

/// Turns one chat message into a command.
///
/// Accepts `<court> <game> <verb> [args...]`. The court may carry a `コート`
/// suffix and the game number `第`/`試合` affixes, so `Aコート 第1試合 終了`
/// and `A 1 finish` are the same command.
pub fn parse(text: &str) -> Result<Command, FormatError> {
    let normalized = text.replace('\u{3000}', " ");
    let tokens: Vec<&str> = normalized.split_whitespace().collect();
    let Some(first) = tokens.first() else {
        return Err(FormatError::Empty);
    };
    if tokens.len() == 1 && is_word(first, HELP_WORDS) {
        return Ok(Command::Help);
    }

    let court = parse_court(first)?;
    let game_token = tokens.get(1).ok_or(FormatError::Arity("match"))?;
    let game_number = parse_game_number(game_token)?;
    let key = MatchKey::new(court, game_number);

    let verb = tokens.get(2).ok_or(FormatError::Arity("match"))?;
    let args = &tokens[3..];

    if is_word(verb, START_WORDS) {
        return match args {
            [] => Ok(Command::Start { key, teams: None }),
            [top, bottom] => Ok(Command::Start {
                key,
                teams: Some((top.to_string(), bottom.to_string())),
            }),
            _ => Err(FormatError::Arity("start")),
        };
    }
    if is_word(verb, FINISH_WORDS) {
        return match args {
            [] => Ok(Command::Finish { key }),
            _ => Err(FormatError::Arity("finish")),
        };
    }
    if is_word(verb, REOPEN_WORDS) {
        return match args {
            [] => Ok(Command::Reopen { key }),
            _ => Err(FormatError::Arity("reopen")),
        };
    }
    if is_word(verb, TIEBREAK_WORDS) {
        if args.is_empty() {
            return Err(FormatError::Arity("tiebreak"));
        }
        return Ok(Command::Tiebreak {
            key,
            winner: args.join(" "),
        });
    }

    if verb.starts_with(|c: char| c.is_ascii_digit()) {
        let (inning, half, glued) = parse_inning(verb)?;
        let runs = match (glued, args) {
            (Some(runs), []) => runs,
            (None, [runs]) => parse_runs(runs)?,
            _ => return Err(FormatError::Arity("score")),
        };
        return Ok(Command::Score {
            key,
            inning,
            half,
            runs,
        });
    }

    Err(FormatError::UnknownCommand(verb.to_string()))
}

fn is_word(token: &str, words: &[&str]) -> bool {
    words.iter().any(|word| token.eq_ignore_ascii_case(word))
}

fn parse_court(token: &str) -> Result<String, FormatError> {
    let court = token.strip_suffix("コート").unwrap_or(token);
    if court.is_empty() || !court.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(FormatError::InvalidCourt(token.to_string()));
    }
    Ok(court.to_ascii_uppercase())
}

fn parse_game_number(token: &str) -> Result<u32, FormatError> {
    let trimmed = token.strip_prefix('第').unwrap_or(token);
    let trimmed = trimmed.strip_suffix("試合").unwrap_or(trimmed);
    match trimmed.parse::<u32>() {
        Ok(number) if number > 0 => Ok(number),
        _ => Err(FormatError::InvalidGameNumber(token.to_string())),
    }
}

/// `3Top`, `3T`, `3表` and the matching bottom forms. Runs may follow the
/// half marker directly, as in `3表4`.
fn parse_inning(token: &str) -> Result<(u32, Slot, Option<u32>), FormatError> {
    let split = token
        .find(|c: char| !c.is_ascii_digit())
        .ok_or_else(|| FormatError::InvalidInning(token.to_string()))?;
    let (digits, rest) = token.split_at(split);
    let inning = digits
        .parse::<u32>()
        .map_err(|_| FormatError::InvalidInning(token.to_string()))?;
    let marker_end = rest.find(|c: char| c.is_ascii_digit()).unwrap_or(rest.len());
    let (marker, glued) = rest.split_at(marker_end);
    let half = match marker.to_ascii_lowercase().as_str() {
        "top" | "t" | "表" => Slot::Top,
        "bottom" | "b" | "裏" => Slot::Bottom,
        _ => return Err(FormatError::InvalidInning(token.to_string())),
    };
    let runs = if glued.is_empty() {
        None
    } else {
        Some(parse_runs(glued)?)
    };
    Ok((inning, half, runs))
}

fn parse_runs(token: &str) -> Result<u32, FormatError> {
    token
        .parse::<u32>()
        .map_err(|_| FormatError::InvalidRuns(token.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(court: &str, game: u32) -> MatchKey {
        MatchKey::new(court, game)
    }

    #[test]
    fn test_parse_start() {
        assert_eq!(
            parse("A 1 start RedTeam BlueTeam").unwrap(),
            Command::Start {
                key: key("A", 1),
                teams: Some(("RedTeam".into(), "BlueTeam".into())),
            }
        );
        assert_eq!(
            parse("Aコート 第1試合 開始").unwrap(),
            Command::Start {
                key: key("A", 1),
                teams: None,
            }
        );
        assert_eq!(parse("A 1 start RedTeam"), Err(FormatError::Arity("start")));
    }

    #[test]
    fn test_parse_score_halves() {
        for (text, half) in [
            ("A 1 3Top 4", Slot::Top),
            ("A 1 3t 4", Slot::Top),
            ("A\u{3000}1\u{3000}3表\u{3000}4", Slot::Top),
            ("A 1 3Bottom 4", Slot::Bottom),
            ("A 1 3B 4", Slot::Bottom),
            ("A 1 3裏 4", Slot::Bottom),
        ] {
            assert_eq!(
                parse(text).unwrap(),
                Command::Score {
                    key: key("A", 1),
                    inning: 3,
                    half,
                    runs: 4,
                },
                "{text}"
            );
        }
    }

    #[test]
    fn test_parse_runs_glued_to_half() {
        for (text, half, runs) in [
            ("A 1 3表4", Slot::Top, 4),
            ("A 1 2裏10", Slot::Bottom, 10),
            ("A 1 5Top0", Slot::Top, 0),
            ("A 1 1b3", Slot::Bottom, 3),
        ] {
            let Command::Score { half: parsed, runs: parsed_runs, .. } = parse(text).unwrap() else {
                panic!("{text} did not parse as a score");
            };
            assert_eq!((parsed, parsed_runs), (half, runs), "{text}");
        }
        assert_eq!(parse("A 1 3表4 5"), Err(FormatError::Arity("score")));
        assert_eq!(parse("A 1 3表4x"), Err(FormatError::InvalidRuns("4x".into())));
    }

    #[test]
    fn test_parse_other_verbs() {
        assert_eq!(parse("b 12 finish").unwrap(), Command::Finish { key: key("B", 12) });
        assert_eq!(parse("B 12 終了").unwrap(), Command::Finish { key: key("B", 12) });
        assert_eq!(parse("B 12 再開").unwrap(), Command::Reopen { key: key("B", 12) });
        assert_eq!(
            parse("A 1 じゃんけん Blue Team").unwrap(),
            Command::Tiebreak {
                key: key("A", 1),
                winner: "Blue Team".into(),
            }
        );
        assert_eq!(parse(" ヘルプ ").unwrap(), Command::Help);
        assert_eq!(parse("?").unwrap(), Command::Help);
        assert!(!Command::Help.is_mutation());
    }

    #[test]
    fn test_parse_rejects_bad_input() {
        assert_eq!(parse("   "), Err(FormatError::Empty));
        assert_eq!(parse("A-1 1 finish"), Err(FormatError::InvalidCourt("A-1".into())));
        assert_eq!(parse("A x finish"), Err(FormatError::InvalidGameNumber("x".into())));
        assert_eq!(parse("A 0 finish"), Err(FormatError::InvalidGameNumber("0".into())));
        assert_eq!(parse("A 1 dance"), Err(FormatError::UnknownCommand("dance".into())));
        assert_eq!(parse("A 1 3Middle 2"), Err(FormatError::InvalidInning("3Middle".into())));
        assert_eq!(parse("A 1 3Top -2"), Err(FormatError::InvalidRuns("-2".into())));
        assert_eq!(parse("A 1 3Top"), Err(FormatError::Arity("score")));
        assert_eq!(parse("A 1"), Err(FormatError::Arity("match")));
    }
}
