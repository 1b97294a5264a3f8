use thiserror::Error;

/// Failures surfaced by the roster manager and the record store underneath it.
///
/// `NotFound` and `Conflict` are user-visible (mapped to ephemeral messages at
/// the interaction boundary), never fatal. Everything else bubbles up as a
/// database error and disables the component it came from.
#[derive(Debug, Error)]
pub enum RosterError {
    #[error("raid {0} does not exist")]
    NotFound(i64),

    #[error("concurrent update conflict, retries exhausted")]
    Conflict,

    #[error("database error: {0}")]
    Db(#[from] sqlx::Error),
}

impl RosterError {
    /// Short text shown to the acting user.
    pub fn user_message(&self) -> String {
        match self {
            RosterError::NotFound(_) => "That is not a valid raid.".to_string(),
            RosterError::Conflict => {
                "The roster is busy right now, please try again.".to_string()
            }
            RosterError::Db(_) => "Something went wrong, please try again later.".to_string(),
        }
    }
}
