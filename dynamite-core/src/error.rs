use thiserror::Error;

#[derive(Error, Debug)]
pub enum DynamiteError {
    #[error("ring is empty: {0}")]
    EmptyRing(String),

    #[error("member already on the ring: {0}")]
    DuplicateMember(String),

    #[error("token {token:032x} for member {member} already exists on the ring")]
    DuplicateToken { token: u128, member: String },

    #[error("member not on the ring: {0}")]
    UnknownMember(String),

    #[error("no versions to reconcile for key: {0}")]
    NoVersions(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("http error: {0}")]
    Http(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, DynamiteError>;
