use ulid::Ulid;

#[derive(Debug)]
pub enum EngineError {
    NotFound(Ulid),
    AlreadyExists(Ulid),
    NameTaken(String),
    /// The placement lost to an existing booking; carries the winner's id.
    SlotTaken(Ulid),
    Validation(&'static str),
    LimitExceeded(&'static str),
    WalError(String),
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineError::NotFound(id) => write!(f, "not found: {id}"),
            EngineError::AlreadyExists(id) => write!(f, "already exists: {id}"),
            EngineError::NameTaken(name) => write!(f, "business name already in use: {name}"),
            EngineError::SlotTaken(id) => write!(f, "slot taken: conflicts with booking {id}"),
            EngineError::Validation(msg) => write!(f, "validation failed: {msg}"),
            EngineError::LimitExceeded(msg) => write!(f, "limit exceeded: {msg}"),
            EngineError::WalError(e) => write!(f, "WAL error: {e}"),
        }
    }
}

impl std::error::Error for EngineError {}
