use crate::order::OrderStatus;

pub type Result<T> = std::result::Result<T, Error>;

/// Expected domain outcomes are reported as typed errors so the caller can
/// render current truth instead of crashing a session. Only the store and
/// codec variants are fatal to the operation that hit them.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("{reason}")]
    StudentBlocked { reason: String },
    #[error("cannot {event} an order in state {from}")]
    InvalidTransition {
        from: OrderStatus,
        event: &'static str,
    },
    #[error("code not found or already verified")]
    CodeNotFound,
    #[error("no {kind} with id {id}")]
    NotFound { kind: &'static str, id: String },
    #[error(transparent)]
    Store(#[from] sled::Error),
    #[error("failed to encode record: {0}")]
    Encode(#[from] minicbor::encode::Error<std::convert::Infallible>),
    #[error("failed to decode record: {0}")]
    Decode(#[from] minicbor::decode::Error),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}
