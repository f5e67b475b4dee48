use crate::domain::model::{ItemId, TeamId};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AuctionError {
    // Precondition violations
    #[error("No session is loaded")]
    SessionNotLoaded,

    #[error("The auction has already ended")]
    SessionEnded,

    #[error("An item is already drawn and awaiting a decision")]
    AlreadyDrawing,

    #[error("The draw pool is empty")]
    EmptyPool,

    #[error("Draw index {index} is out of range for a pool of {len}")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("No item is currently drawn")]
    NoActiveDraw,

    #[error("No team is selected for the current draw")]
    NoTeamSelected,

    #[error("Unknown team id {team_id}")]
    UnknownTeam { team_id: TeamId },

    #[error("The round still has {remaining} item(s) in the pool")]
    RoundNotExhausted { remaining: usize },

    #[error("There are no unsold items to requeue")]
    NothingToRequeue,

    #[error("Nothing to undo")]
    EmptyHistory,

    // Resource violations
    #[error("Team {team_id} cannot afford {price} (budget {budget}, reserve {reserve})")]
    InsufficientBudget {
        team_id: TeamId,
        price: u32,
        budget: u32,
        reserve: u32,
    },

    #[error("Team {team_id} roster is full ({max} items)")]
    RosterFull { team_id: TeamId, max: usize },

    // Persistence
    #[error("Local store error for key '{key}': {source}")]
    LocalStoreError {
        key: String,
        #[source]
        source: std::io::Error,
    },

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("CSV processing error: {0}")]
    CsvError(#[from] csv::Error),

    #[error("Malformed persisted state: {reason}")]
    MalformedState { reason: String },

    // Remote backup
    #[error("Remote backup request failed: {0}")]
    ApiError(#[from] reqwest::Error),

    #[error("Remote backup returned status {status}")]
    RemoteStatus { status: u16 },

    #[error("Remote backup timed out after {timeout_ms}ms")]
    RemoteTimeout { timeout_ms: u64 },

    // Configuration
    #[error("Configuration error: {message}")]
    ConfigError { message: String },

    #[error("Missing required configuration: {field}")]
    MissingConfigError { field: String },

    #[error("Invalid value '{value}' for {field}: {reason}")]
    InvalidConfigValueError {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Configuration validation failed for {field}: {message}")]
    ConfigValidationError { field: String, message: String },

    #[error("Invalid catalog record '{item_id}': {reason}")]
    CatalogError { item_id: ItemId, reason: String },

    // Invariants
    #[error("Session invariant violated: {reason}")]
    InvariantViolation { reason: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Precondition,
    Resource,
    Persistence,
    Remote,
    Configuration,
    Invariant,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl AuctionError {
    pub fn category(&self) -> ErrorCategory {
        use AuctionError::*;
        match self {
            SessionNotLoaded | SessionEnded | AlreadyDrawing | EmptyPool | IndexOutOfRange { .. }
            | NoActiveDraw | NoTeamSelected | UnknownTeam { .. } | RoundNotExhausted { .. }
            | NothingToRequeue | EmptyHistory => ErrorCategory::Precondition,
            InsufficientBudget { .. } | RosterFull { .. } => ErrorCategory::Resource,
            LocalStoreError { .. } | IoError(_) | SerializationError(_) | CsvError(_)
            | MalformedState { .. } => ErrorCategory::Persistence,
            ApiError(_) | RemoteStatus { .. } | RemoteTimeout { .. } => ErrorCategory::Remote,
            ConfigError { .. } | MissingConfigError { .. } | InvalidConfigValueError { .. }
            | ConfigValidationError { .. } | CatalogError { .. } => ErrorCategory::Configuration,
            InvariantViolation { .. } => ErrorCategory::Invariant,
        }
    }

    pub fn severity(&self) -> ErrorSeverity {
        match self.category() {
            ErrorCategory::Precondition => ErrorSeverity::Low,
            ErrorCategory::Remote => ErrorSeverity::Low,
            ErrorCategory::Resource => ErrorSeverity::Medium,
            ErrorCategory::Persistence | ErrorCategory::Configuration => ErrorSeverity::High,
            ErrorCategory::Invariant => ErrorSeverity::Critical,
        }
    }

    /// Precondition failures are reported to the operator as a no-op notice.
    pub fn is_notice(&self) -> bool {
        self.category() == ErrorCategory::Precondition
    }

    pub fn user_friendly_message(&self) -> String {
        match self.category() {
            ErrorCategory::Precondition => format!("Nothing happened: {}", self),
            ErrorCategory::Resource => format!("Sale rejected: {}", self),
            ErrorCategory::Persistence => format!("Saving the auction failed: {}", self),
            ErrorCategory::Remote => format!("Remote backup unavailable: {}", self),
            ErrorCategory::Configuration => format!("Configuration problem: {}", self),
            ErrorCategory::Invariant => format!("Internal error, change rolled back: {}", self),
        }
    }

    pub fn recovery_suggestion(&self) -> &'static str {
        use AuctionError::*;
        match self {
            SessionNotLoaded => "Start a fresh session or resume a saved one",
            SessionEnded => "Restart the console to run a new auction",
            AlreadyDrawing => "Resolve the current item as sold or unsold first",
            EmptyPool | RoundNotExhausted { .. } => "Check the round status with 'status'",
            IndexOutOfRange { .. } => "Draw again",
            NoActiveDraw => "Draw an item first",
            NoTeamSelected => "Select a team with 'team <id>'",
            UnknownTeam { .. } => "Use one of the team ids shown by 'status'",
            NothingToRequeue => "End the auction with 'end'",
            EmptyHistory => "There are no earlier states to return to",
            InsufficientBudget { .. } | RosterFull { .. } => {
                "Select another team or lower the bid"
            }
            LocalStoreError { .. } | IoError(_) => {
                "Check free disk space and permissions of the state directory"
            }
            SerializationError(_) | MalformedState { .. } => {
                "The saved state is unreadable; start a fresh session"
            }
            CsvError(_) => "Check the file path and CSV format",
            ApiError(_) | RemoteStatus { .. } | RemoteTimeout { .. } => {
                "The auction continues with local saves only"
            }
            ConfigError { .. }
            | MissingConfigError { .. }
            | InvalidConfigValueError { .. }
            | ConfigValidationError { .. } => "Fix the configuration file and restart",
            CatalogError { .. } => "Fix the catalog file and restart",
            InvariantViolation { .. } => "Undo the last action and report this as a bug",
        }
    }
}

pub type Result<T> = std::result::Result<T, AuctionError>;
