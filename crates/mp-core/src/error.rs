use thiserror::Error;

#[derive(Debug, Error)]
pub enum MpError {
    #[error("not in a git repository")]
    NotGitRepository,

    #[error("not in a piece worktree")]
    NotInPiece,

    #[error("not initialized: run 'mp init'")]
    ConfigMissing,

    #[error("issue provider must be 'markdown', got: {0}")]
    WrongIssueProvider(String),

    #[error("issues directory not set in config")]
    IssuesDirUnset,

    #[error("issue file not found: {0}")]
    IssueNotFound(String),

    #[error("issue file must be within the issues directory '{dir}', got: {path}")]
    IssueOutsideIssuesDir { dir: String, path: String },

    #[error("piece name '{0}' already exists")]
    PieceExists(String),

    #[error("too many pieces with similar names")]
    NameSpaceExhausted,

    #[error("invalid status '{0}' (valid: todo, in-progress, done)")]
    InvalidStatus(String),

    #[error("cannot merge: '{main}' has commits not in the piece worktree; run 'mp piece update' first")]
    MainAhead { main: String },

    #[error("hook {hook} failed: {output}")]
    HookFailed { hook: String, output: String },

    #[error("{command} failed: {output}")]
    CommandFailed { command: String, output: String },

    #[error("could not parse PR number from '{0}'")]
    InvalidPrUrl(String),

    #[error("validation failed: {0}")]
    InvalidInput(String),

    #[error("home directory not found: set HOME environment variable")]
    HomeNotFound,

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, MpError>;
