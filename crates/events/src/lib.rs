//! Event fan-out infrastructure for the vlab generation queue.
//!
//! Two complementary mechanisms:
//!
//! - [`EventBus`]: in-process publish/subscribe hub backed by
//!   `tokio::sync::broadcast`, carrying typed [`QueueEvent`]s (upload
//!   summaries, item failures).
//! - [`ObserverRegistry`]: a keyed list of refresh callbacks for
//!   components that want to reload a display when new assets land,
//!   without being coupled to the polling mechanism.

pub mod bus;
pub mod registry;

pub use bus::{EventBus, QueueEvent};
pub use registry::ObserverRegistry;
