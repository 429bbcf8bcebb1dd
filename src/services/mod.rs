//! Application services.

pub mod accumulator;
pub mod consumer_member;

pub use accumulator::{AccumulatorService, ConflictRetry};
pub use consumer_member::{ConsumerMember, MemberState, MemberStatus};
