use thiserror::Error;

/// Campaign engine errors
///
/// There is no gateway variant: provisioning and reconciliation record
/// gateway failures per resource (see [`crate::provisioning::Outcome`])
/// instead of failing the whole operation.
///
/// # Examples
///
/// ```
/// use rvoip_campaign_engine::{CampaignError, Result};
///
/// fn lookup_campaign(id: &str) -> Result<()> {
///     Err(CampaignError::not_found(format!("campaign {}", id)))
/// }
///
/// match lookup_campaign("c-1") {
///     Err(CampaignError::NotFound(what)) => assert_eq!(what, "campaign c-1"),
///     _ => unreachable!(),
/// }
/// ```
#[derive(Error, Debug)]
pub enum CampaignError {
    /// Database errors
    #[error("Database error: {0}")]
    Database(#[from] anyhow::Error),

    /// Input rejected before any mutation took place
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// One or more referenced ids do not exist, belong to another tenant,
    /// or are not in a usable state
    #[error("Invalid {kind} references: {invalid_ids:?}")]
    InvalidReferences {
        kind: String,
        invalid_ids: Vec<String>,
        requested_ids: Vec<String>,
    },

    /// Not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Already exists
    #[error("Already exists: {0}")]
    AlreadyExists(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl CampaignError {
    /// Create a new InvalidInput error
    pub fn invalid_input<S: Into<String>>(msg: S) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// Create a new InvalidReferences error
    pub fn invalid_references<S: Into<String>>(
        kind: S,
        invalid_ids: Vec<String>,
        requested_ids: Vec<String>,
    ) -> Self {
        Self::InvalidReferences {
            kind: kind.into(),
            invalid_ids,
            requested_ids,
        }
    }

    /// Create a new NotFound error
    pub fn not_found<S: Into<String>>(msg: S) -> Self {
        Self::NotFound(msg.into())
    }

    /// Create a new AlreadyExists error
    pub fn already_exists<S: Into<String>>(msg: S) -> Self {
        Self::AlreadyExists(msg.into())
    }

    /// Create a new Config error
    pub fn config<S: Into<String>>(msg: S) -> Self {
        Self::Config(msg.into())
    }

    /// Create a new Internal error
    pub fn internal<S: Into<String>>(msg: S) -> Self {
        Self::Internal(msg.into())
    }

    /// Whether the error was caused by the caller's input rather than the system
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::InvalidInput(_) | Self::InvalidReferences { .. })
    }
}

/// Result type for campaign engine operations
pub type Result<T> = std::result::Result<T, CampaignError>;
