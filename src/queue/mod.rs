mod expiration;
pub mod token_queue;

pub use token_queue::{
    ExpirationPredicate, NextToken, PendingToken, SweepOutcome, TokenQueue, UpdateCallback,
};
