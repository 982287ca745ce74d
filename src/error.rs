//! Error taxonomy for the marketplace lifecycle engine
use crate::trade::{TradeAction, TradeStatus};

/// Broad classification of a [`TradeError`], used by callers to decide how a
/// failure should be presented.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed or missing input, including stored records that fail to decode.
    Validation,
    /// A referenced record does not resolve.
    NotFound,
    /// The operation targeted a transaction in the wrong status.
    State,
    /// The acting user is not permitted to perform the operation.
    Authorization,
    /// The underlying store or codec failed.
    Store,
}

#[derive(thiserror::Error, Debug)]
pub enum TradeError {
    #[error("authenticated identity has an empty uid")]
    EmptyIdentity,
    #[error("an account already exists for {0}")]
    UserExists(String),
    #[error("no food selected")]
    NoFoodSelected,
    #[error("food name must not be empty")]
    EmptyFoodName,
    #[error("{0} is not a listed food")]
    UnknownFood(String),
    #[error("rating {0} is outside 1..=5")]
    RatingOutOfRange(u32),
    #[error("cannot trade against your own offer")]
    SelfTrade,
    #[error("cancellation was not confirmed")]
    NotConfirmed,
    #[error("{collection} record {id} is malformed: {reason}")]
    MalformedRecord {
        collection: &'static str,
        id: String,
        reason: String,
    },

    #[error("user {0} does not exist")]
    UserNotFound(String),
    #[error("food {0} does not exist")]
    FoodNotFound(String),
    #[error("transaction {0} does not exist")]
    TransactionNotFound(String),
    #[error("offer {0} is gone or no longer open")]
    OfferNotOpen(String),

    #[error("cannot {action} a transaction in {from} state")]
    InvalidTransition {
        from: TradeStatus,
        action: TradeAction,
    },
    #[error("transaction {0} has not been completed")]
    NotCompleted(String),

    #[error("only the offer owner may cancel it")]
    NotOfferOwner,
    #[error("request {0} is not addressed to this user")]
    NotRequestRecipient(String),
    #[error("admin privileges required")]
    AdminOnly,
    #[error("only trade participants may rate transaction {0}")]
    NotParticipant(String),

    #[error("store failure: {0}")]
    Store(#[from] sled::Error),
    #[error("record encoding failed: {0}")]
    Codec(String),
}

impl TradeError {
    pub fn kind(&self) -> ErrorKind {
        use TradeError::*;
        match self {
            EmptyIdentity
            | UserExists(_)
            | NoFoodSelected
            | EmptyFoodName
            | UnknownFood(_)
            | RatingOutOfRange(_)
            | SelfTrade
            | NotConfirmed
            | MalformedRecord { .. } => ErrorKind::Validation,
            UserNotFound(_) | FoodNotFound(_) | TransactionNotFound(_) | OfferNotOpen(_) => {
                ErrorKind::NotFound
            }
            InvalidTransition { .. } | NotCompleted(_) => ErrorKind::State,
            NotOfferOwner | NotRequestRecipient(_) | AdminOnly | NotParticipant(_) => {
                ErrorKind::Authorization
            }
            Store(_) | Codec(_) => ErrorKind::Store,
        }
    }
}
