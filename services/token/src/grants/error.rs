use thiserror::Error;

/// Errors raised by the expiring-grant stores.
///
/// `Expired` renders exactly like `NotFound` and shares its error code so
/// callers cannot be used as an oracle for once-valid codes. The variants
/// stay distinct for logging.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GrantError {
    /// No live grant under this code.
    #[error("Grant not found")]
    NotFound,

    /// The grant exists but is past `expires_at`.
    #[error("Grant not found")]
    Expired,

    /// The grant was already consumed.
    #[error("Grant already redeemed")]
    AlreadyRedeemed,

    /// The user has not decided on the device authorization yet.
    #[error("Authorization pending")]
    AuthorizationPending,

    /// The user denied the device authorization.
    #[error("Access denied")]
    AccessDenied,

    /// Requested scopes are not a subset of the granted ones.
    #[error("Invalid scope: {0}")]
    InvalidScope(String),

    /// Operation not allowed in the grant's current state.
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Every generated code collided with an existing one.
    #[error("No unique code after {0} attempts")]
    CodeSpaceExhausted(u32),

    /// The backing repository failed.
    #[error("Repository error: {0}")]
    Repository(String),
}

impl GrantError {
    /// Shorthand for [`GrantError::InvalidScope`].
    pub fn invalid_scope(msg: impl Into<String>) -> Self {
        GrantError::InvalidScope(msg.into())
    }

    /// Shorthand for [`GrantError::InvalidState`].
    pub fn invalid_state(msg: impl Into<String>) -> Self {
        GrantError::InvalidState(msg.into())
    }

    /// Shorthand for [`GrantError::Repository`].
    pub fn repository(msg: impl Into<String>) -> Self {
        GrantError::Repository(msg.into())
    }

    /// True for both `NotFound` and `Expired`.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, GrantError::NotFound | GrantError::Expired)
    }

    /// Label used for redemption metrics.
    #[must_use]
    pub fn outcome(&self) -> &'static str {
        match self {
            GrantError::NotFound => "not_found",
            GrantError::Expired => "expired",
            GrantError::AlreadyRedeemed => "already_redeemed",
            GrantError::AuthorizationPending => "authorization_pending",
            GrantError::AccessDenied => "access_denied",
            GrantError::InvalidScope(_) => "invalid_scope",
            GrantError::InvalidState(_) => "invalid_state",
            GrantError::CodeSpaceExhausted(_) => "code_space_exhausted",
            GrantError::Repository(_) => "repository_error",
        }
    }

    /// Stable code for the protocol layer.
    #[must_use]
    pub fn error_code(&self) -> &'static str {
        match self {
            GrantError::NotFound | GrantError::Expired => GRANT_NOT_FOUND,
            GrantError::AlreadyRedeemed => GRANT_ALREADY_REDEEMED,
            GrantError::AuthorizationPending => GRANT_AUTHORIZATION_PENDING,
            GrantError::AccessDenied => GRANT_ACCESS_DENIED,
            GrantError::InvalidScope(_) => GRANT_INVALID_SCOPE,
            GrantError::InvalidState(_) => GRANT_INVALID_STATE,
            GrantError::CodeSpaceExhausted(_) => GRANT_CODE_SPACE_EXHAUSTED,
            GrantError::Repository(_) => GRANT_REPOSITORY_ERROR,
        }
    }
}

// Error codes surfaced to the protocol layer
/// Code for [`GrantError::NotFound`] and [`GrantError::Expired`].
pub const GRANT_NOT_FOUND: &str = "GRANT_NOT_FOUND";
/// Code for [`GrantError::AlreadyRedeemed`].
pub const GRANT_ALREADY_REDEEMED: &str = "GRANT_ALREADY_REDEEMED";
/// Code for [`GrantError::AuthorizationPending`].
pub const GRANT_AUTHORIZATION_PENDING: &str = "GRANT_AUTHORIZATION_PENDING";
/// Code for [`GrantError::AccessDenied`].
pub const GRANT_ACCESS_DENIED: &str = "GRANT_ACCESS_DENIED";
/// Code for [`GrantError::InvalidScope`].
pub const GRANT_INVALID_SCOPE: &str = "GRANT_INVALID_SCOPE";
/// Code for [`GrantError::InvalidState`].
pub const GRANT_INVALID_STATE: &str = "GRANT_INVALID_STATE";
/// Code for [`GrantError::CodeSpaceExhausted`].
pub const GRANT_CODE_SPACE_EXHAUSTED: &str = "GRANT_CODE_SPACE_EXHAUSTED";
/// Code for [`GrantError::Repository`].
pub const GRANT_REPOSITORY_ERROR: &str = "GRANT_REPOSITORY_ERROR";
