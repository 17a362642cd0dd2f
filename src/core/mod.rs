/*!
 * Core Module
 * Blocking primitives, shared types, clock, limits and error handling
 */

pub mod clock;
pub mod errors;
pub mod limits;
pub mod sync;
pub mod types;

// Re-export for convenience
pub use clock::Timestamp;
pub use errors::*;
pub use types::*;
