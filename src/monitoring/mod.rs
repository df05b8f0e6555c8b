/*!
 * Monitoring
 * Tracing setup and per-handle transfer statistics
 */

mod stats;
mod tracer;

pub use stats::{ChannelCounters, ChannelStats};
pub use tracer::{init_tracing, ENV_TRACE_JSON};
