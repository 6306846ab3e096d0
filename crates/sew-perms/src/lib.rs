//! Rank-based permissions.
//!
//! Ranks carry `+node` / `-node` decisions and a single parent. Players hold
//! an ordered list of ranks; the wildcard rank `*` applies to everyone. See
//! [`RankDocument::resolve`] for how a decision is reached.

pub mod document;
pub mod error;
pub mod rank;
pub mod resolver;

pub use document::{RankDocument, WILDCARD};
pub use error::PermError;
pub use rank::{Decision, Rank};
pub use resolver::PermissionResolver;
