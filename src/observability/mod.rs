//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! contexts, listener, registry produce:
//!     → tracing events (context_id, peer_addr, state, kind fields)
//!     → metrics.rs (counters, gauges)
//!
//! Consumers:
//!     → logging.rs subscriber (pretty or JSON to stdout)
//!     → Prometheus scrape endpoint
//! ```

pub mod logging;
pub mod metrics;
