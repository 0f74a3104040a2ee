use thiserror::Error;

/// Queue engine errors
#[derive(Error, Debug)]
pub enum QueueEngineError {
    /// Missing or malformed input
    #[error("Validation error: {0}")]
    Validation(String),

    /// Status guard violated (see the entry state machine)
    #[error("Invalid transition: {0}")]
    InvalidTransition(String),

    /// Caller has no current room to resolve
    #[error("Not checked in: {0}")]
    NotCheckedIn(String),

    /// Target room is held by a different staff member
    #[error("Room occupied: {0}")]
    RoomOccupiedByOther(String),

    /// Target room has nobody checked in to receive the entry
    #[error("Room has no active occupant: {0}")]
    RoomHasNoActiveOccupant(String),

    /// Role-based denial
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Unknown entry, staff member, or room
    #[error("Not found: {0}")]
    NotFound(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Database errors
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl QueueEngineError {
    /// Create a new Validation error
    pub fn validation<S: Into<String>>(msg: S) -> Self {
        Self::Validation(msg.into())
    }

    /// Create a new InvalidTransition error
    pub fn invalid_transition<S: Into<String>>(msg: S) -> Self {
        Self::InvalidTransition(msg.into())
    }

    /// Create a new NotCheckedIn error
    pub fn not_checked_in<S: Into<String>>(msg: S) -> Self {
        Self::NotCheckedIn(msg.into())
    }

    /// Create a new RoomOccupiedByOther error
    pub fn room_occupied<S: Into<String>>(msg: S) -> Self {
        Self::RoomOccupiedByOther(msg.into())
    }

    /// Create a new RoomHasNoActiveOccupant error
    pub fn room_empty<S: Into<String>>(msg: S) -> Self {
        Self::RoomHasNoActiveOccupant(msg.into())
    }

    /// Create a new Forbidden error
    pub fn forbidden<S: Into<String>>(msg: S) -> Self {
        Self::Forbidden(msg.into())
    }

    /// Create a new NotFound error
    pub fn not_found<S: Into<String>>(msg: S) -> Self {
        Self::NotFound(msg.into())
    }

    /// Create a new Config error
    pub fn config<S: Into<String>>(msg: S) -> Self {
        Self::Config(msg.into())
    }
}

/// Result type for queue engine operations
pub type Result<T> = std::result::Result<T, QueueEngineError>;
