//! Chunk claims: who owns which chunk, and what others may do there.

pub mod claim;
pub mod error;
pub mod registry;

pub use claim::{ClaimAction, ClaimChunk, ClaimRecord, PermissionSlice};
pub use error::ClaimError;
pub use registry::ClaimRegistry;
