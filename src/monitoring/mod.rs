/*!
 * Monitoring
 * Tracing setup and execution spans
 */

mod tracer;

pub use tracer::{init_tracing, JobSpan};
