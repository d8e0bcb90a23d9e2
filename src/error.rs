use sled::transaction::TransactionError;

#[derive(thiserror::Error, Debug)]
pub enum CaseError {
    #[error("No valid session was presented")]
    Unauthenticated,
    #[error("Not permitted: {0}")]
    Unauthorized(String),
    #[error("{0} not found")]
    NotFound(String),
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error("Advisor {advisor_id} has already responded to case {case_id}")]
    AlreadyResponded { case_id: String, advisor_id: String },
    #[error("Email address is already registered")]
    EmailTaken,
    #[error("Email or password is incorrect")]
    Credentials,
    #[error("Storage failure: {0}")]
    Storage(#[from] sled::Error),
    #[error("Failed to encode or decode a stored document: {0}")]
    Codec(String),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, CaseError>;

impl CaseError {
    pub fn unauthorized(reason: impl Into<String>) -> Self {
        CaseError::Unauthorized(reason.into())
    }
    pub fn not_found(what: impl Into<String>) -> Self {
        CaseError::NotFound(what.into())
    }
    pub fn invalid(reason: impl Into<String>) -> Self {
        CaseError::InvalidInput(reason.into())
    }
}

impl From<TransactionError<CaseError>> for CaseError {
    fn from(value: TransactionError<CaseError>) -> Self {
        match value {
            TransactionError::Abort(err) => err,
            TransactionError::Storage(err) => CaseError::Storage(err),
        }
    }
}

impl From<minicbor::decode::Error> for CaseError {
    fn from(value: minicbor::decode::Error) -> Self {
        CaseError::Codec(value.to_string())
    }
}

impl<E: std::fmt::Display> From<minicbor::encode::Error<E>> for CaseError {
    fn from(value: minicbor::encode::Error<E>) -> Self {
        CaseError::Codec(value.to_string())
    }
}
