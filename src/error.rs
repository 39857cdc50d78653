//! Error types for the affinity engine.
//!
//! Every fallible seam gets its own enum. Transfer and persona-change errors
//! double as the user-facing rejection text, so their `Display` output is
//! written for the person who issued the command.

use thiserror::Error;

/// Errors from the durable document and archive stores.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Reading or writing the backing file failed.
    #[error("Store I/O error at {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// The document could not be encoded or decoded.
    #[error("Store serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// An archive for this period has already been written.
    #[error("Archive for period {period} already exists")]
    ArchiveExists { period: String },

    /// The period key is not of the form `YYYY_MM`.
    #[error("Invalid period '{period}', expected YYYY_MM")]
    InvalidPeriod { period: String },

    /// A backend-specific failure.
    #[error("Store backend error: {message}")]
    Backend { message: String },
}

impl From<anyhow::Error> for StoreError {
    fn from(err: anyhow::Error) -> Self {
        StoreError::Backend {
            message: format!("{:#}", err),
        }
    }
}

/// Errors raised while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// The configuration file is not valid YAML for `AffinityConfig`.
    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_yaml::Error),

    /// The configuration parsed but violates an invariant.
    #[error("Invalid config: {message}")]
    Invalid { message: String },
}

impl ConfigError {
    pub fn invalid(message: impl Into<String>) -> Self {
        ConfigError::Invalid {
            message: message.into(),
        }
    }
}

/// Errors from the text-generation collaborator.
#[derive(Debug, Error)]
pub enum GenerationError {
    /// No API key was configured for the provider.
    #[error("Text generation API key not set")]
    MissingApiKey,

    /// The request could not be sent or timed out.
    #[error("Text generation request failed: {0}")]
    Request(String),

    /// The provider answered with a non-success status.
    #[error("Text generation API error ({status}): {body}")]
    Http { status: u16, body: String },

    /// The provider answered but the body had no usable text.
    #[error("Text generation returned no content")]
    EmptyResponse,

    /// The provider answered with a body we could not parse.
    #[error("Malformed text generation response: {0}")]
    Malformed(String),
}

/// Rejections from the hedging transfer. No state is mutated when one is returned.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TransferError {
    #[error("❌ No user found matching '{partial}'")]
    UnknownTarget { partial: String },

    #[error("🔍 Several users match, please give a more precise id:\n{}", format_candidates(.candidates))]
    Ambiguous { candidates: Vec<String> },

    #[error("❌ You cannot hedge against yourself")]
    SelfTransfer,

    #[error("❌ Your affinity ({balance:.2}) is too low to hedge")]
    InsufficientBalance { balance: f64 },

    #[error("❌ The hedge amount must be greater than 0")]
    NonPositiveAmount,

    #[error("❌ The hedge amount cannot exceed your affinity {balance:.2}")]
    ExceedsBalance { amount: f64, balance: f64 },

    #[error("❌ The target is already at the floor ({floor:.2}), nothing left to hedge")]
    TargetAtFloor { floor: f64 },

    #[error("❌ The target is close to the floor and your affinity ({balance:.2}) cannot cover the clamped amount {required:.2}")]
    ClampedUnaffordable { required: f64, balance: f64 },
}

fn format_candidates(candidates: &[String]) -> String {
    candidates
        .iter()
        .map(|c| format!("- {}", c))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Rejections from user-initiated persona operations.
#[derive(Debug, Error)]
pub enum PersonaChangeError {
    /// The identity's score is not far enough from zero to unlock the command.
    #[error("❌ Changing persona requires affinity of at least {required:.0} or at most -{required:.0}; current affinity: {score:.2}")]
    ScoreTooLow { score: f64, required: f64 },

    /// There is no captured persona to go back to.
    #[error("🤔 There is no original persona to restore")]
    NothingToRestore,

    /// The request text was empty.
    #[error("❌ Please describe the new persona")]
    EmptyRequest,

    /// The generator failed; the current persona is kept.
    #[error("❌ Persona generation failed, keeping the current persona: {0}")]
    GenerationFailed(#[from] GenerationError),
}

/// Errors from the periodic reward cycle.
#[derive(Debug, Error)]
pub enum RewardError {
    /// There were no records to snapshot.
    #[error("No affinity data to snapshot")]
    EmptySnapshot,

    /// No archive exists for the requested period.
    #[error("No archived snapshot for period {period}")]
    MissingArchive { period: String },

    /// Archiving failed; the live store was left untouched.
    #[error(transparent)]
    Store(#[from] StoreError),
}
