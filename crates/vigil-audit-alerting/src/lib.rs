//! Threshold-based alert detection over the Vigil audit ledger.
//!
//! The engine watches the event stream two ways. Sensitive administrative
//! changes raise an alert the moment they are appended; windowed patterns
//! (repeated login failures, denied-access bursts, export spikes, bulk
//! patient access) are swept up by a periodic detection pass. A failed
//! chain integrity check raises through a third entry point. Every path
//! deduplicates via TTL claims so a sustained condition produces one
//! alert per window, and every stored alert is handed to a pluggable
//! publisher for downstream delivery.

mod config;
mod dedup;
mod engine;
mod error;
mod publish;
mod scheduler;
mod store;

pub use config::AlertConfig;
pub use dedup::{DedupEntry, DedupStore, InMemoryDedupStore};
pub use engine::AlertEngine;
pub use error::{AlertError, AlertResult};
pub use publish::{AlertMessage, AlertPublisher, ChannelPublisher, LogPublisher};
pub use scheduler::DetectionLoop;
pub use store::{AlertStats, AlertStore, InMemoryAlertStore};
