use std::path::PathBuf;
use thiserror::Error;

/// Failures of the row store backing the registry and the ledger.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("io error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("bad row {key}: {source}")]
    Serde {
        key: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Text that could not be turned into a command. Never reaches the engine.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FormatError {
    #[error("empty message")]
    Empty,

    #[error("unknown court \"{0}\"")]
    InvalidCourt(String),

    #[error("unknown game number \"{0}\"")]
    InvalidGameNumber(String),

    #[error("unknown command \"{0}\"")]
    UnknownCommand(String),

    #[error("expected inning and half like 3Top or 3Bottom, got \"{0}\"")]
    InvalidInning(String),

    #[error("runs must be a whole number, got \"{0}\"")]
    InvalidRuns(String),

    #[error("wrong number of arguments for {0}")]
    Arity(&'static str),
}

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("inning {inning} is out of range (1-{max})")]
    InningOutOfRange { inning: u32, max: u32 },

    #[error("{team} is not in this match ({top} / {bottom})")]
    InvalidTeam {
        team: String,
        top: String,
        bottom: String,
    },

    #[error("bracket destination game {game_number} does not exist")]
    DestinationMatchNotFound { game_number: u32 },

    #[error("scorekeeper is busy, please send the command again")]
    Busy,

    #[error("Court {court} game {game_number} is already finished; send reopen to correct it")]
    AlreadyFinished { court: String, game_number: u32 },

    #[error("Court {court} game {game_number} is not registered")]
    MatchNotFound { court: String, game_number: u32 },

    #[error("game {game_number} is already on Court {court}")]
    GameNumberTaken { court: String, game_number: u32 },

    #[error("Court {court} game {game_number} has no teams; start it with both team names")]
    TeamsNotRegistered { court: String, game_number: u32 },

    #[error("Court {court} game {game_number} is not finished")]
    NotFinished { court: String, game_number: u32 },

    #[error("Court {court} game {game_number} ended in a draw; send a tiebreak command")]
    UnresolvedDraw { court: String, game_number: u32 },

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl EngineError {
    /// Safe for the sender to resend unchanged.
    pub fn is_transient(&self) -> bool {
        matches!(self, EngineError::Busy)
    }

    /// Points at bad bracket data or storage rather than a mistyped command.
    pub fn is_configuration_defect(&self) -> bool {
        matches!(
            self,
            EngineError::DestinationMatchNotFound { .. } | EngineError::Store(_)
        )
    }
}
