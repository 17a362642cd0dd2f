/*!
 * Wait/Notify Primitives
 *
 * Ownerless generation-checked gates:
 * - `CasGate`: raw generation + slot stack
 * - `Semaphore`: single wake per release
 * - `Monitor`: broadcast wake per notification
 */

mod gate;
mod wake;

pub use gate::{CasGate, Monitor, Semaphore};
pub use wake::WakeResult;
