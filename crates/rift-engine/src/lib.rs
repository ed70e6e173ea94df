//! Bulk-synchronous coordination for rift worlds.
//!
//! Each worker is single-threaded and synchronous; the only suspension
//! points are the collectives inside halo sync, transporter sync,
//! rebalance staging, and the global time reduction. [`SimState`] wires
//! the partition, the transporter, and the registered fields into the
//! per-tick order: synchronize fields, exchange envelopes, drain the
//! inbox into the agenda and the fields, publish read snapshots, then
//! hand control to the application's scheduler step and finally agree on
//! the next tick time with a global min-reduction.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod agenda;
pub mod config;
pub mod context;
pub mod error;
pub mod state;
pub mod timing;

pub use agenda::{Agenda, LocalAgenda};
pub use config::{ConfigError, EngineConfig};
pub use context::RuntimeContext;
pub use error::EngineError;
pub use state::SimState;
pub use timing::TickTimer;
