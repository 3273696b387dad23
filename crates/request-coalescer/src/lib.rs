//! Single-flight request coalescing
//!
//! Collapses concurrent requests for the same key into one upstream fetch
//! whose outcome, value or error, is handed to every caller that joined it.

mod coalescer;
mod types;

pub use coalescer::RequestCoalescer;
pub use types::CoalescerConfig;
