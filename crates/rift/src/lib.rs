//! rift: a distributed agent-based simulation substrate.
//!
//! A 2D-or-higher toroidal integer world is spatially partitioned across
//! a fixed set of workers by a quadtree of nested rectangles. Each
//! worker holds its partition plus a ghost ring kept coherent by halo
//! exchange, migrates agents and work items through an envelope
//! transporter with multi-hop forwarding, answers foreign point reads
//! from published snapshots, and advances in bulk-synchronous ticks
//! whose clock is agreed by a global min-reduction.
//!
//! This facade crate re-exports the public API of the sub-crates.
//!
//! # Quick start
//!
//! ```rust
//! use rift::prelude::*;
//! use std::rc::Rc;
//!
//! // Four workers share a 40x40 toroidal world, one heat field each.
//! let directory = CellDirectory::new();
//! let finals = LocalCluster::run(4, |comm| {
//!     let world = HyperRect::new(-1, Point::from([0, 0]), Point::from([40, 40]));
//!     let config = EngineConfig::new(world, 4, &[1, 1], true);
//!     let comm: Rc<dyn Communicator> = Rc::new(comm);
//!     let mut state = SimState::new(
//!         &config,
//!         comm,
//!         directory.clone(),
//!         Box::new(LocalAgenda::new()),
//!     )
//!     .unwrap();
//!     let field = state.create_field(0.0f64, WritePolicy::Strict).unwrap();
//!
//!     // Tick once: synchronize, run the (empty) step, agree on time.
//!     state.pre_step().unwrap();
//!     let rect = field.borrow().owned_rect().clone();
//!     field.borrow_mut().set(&rect.ul, 1.0).unwrap();
//!     state.revise_time(f64::INFINITY).unwrap()
//! });
//! assert!(finals.iter().all(|t| t.is_infinite()));
//! ```
//!
//! # Modules
//!
//! | Module | Sub-crate | Contents |
//! |--------|-----------|----------|
//! | [`geom`] | `rift-geom` | Points, hyperrectangles, toroidal arithmetic |
//! | [`grid`] | `rift-grid` | Dense storage, cell codec, pack/unpack |
//! | [`partition`] | `rift-partition` | Quadtree, rank assignment, commit protocol |
//! | [`comm`] | `rift-comm` | Collectives, in-process cluster, read registry |
//! | [`field`] | `rift-field` | Halo fields and ghost exchange |
//! | [`transport`] | `rift-transport` | Envelopes and multi-hop migration |
//! | [`engine`] | `rift-engine` | Simulation state and the tick loop |

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

/// Integer geometry (`rift-geom`).
pub use rift_geom as geom;

/// Dense grid storage and the cell codec (`rift-grid`).
pub use rift_grid as grid;

/// Quadtree partition management (`rift-partition`).
pub use rift_partition as partition;

/// Collective transport and the read registry (`rift-comm`).
pub use rift_comm as comm;

/// Halo-exchanged fields (`rift-field`).
pub use rift_field as field;

/// Envelope transport (`rift-transport`).
pub use rift_transport as transport;

/// Simulation state and the coordination loop (`rift-engine`).
pub use rift_engine as engine;

/// Common imports for typical rift usage.
pub mod prelude {
    pub use rift_comm::{CellDirectory, CommError, Communicator, LocalCluster};
    pub use rift_engine::{
        Agenda, EngineConfig, EngineError, LocalAgenda, SimState, TickTimer,
    };
    pub use rift_field::{FieldError, FieldSlot, HaloField, WritePolicy};
    pub use rift_geom::{HyperRect, Point};
    pub use rift_grid::{Cell, DenseGrid, GridError};
    pub use rift_partition::{Mutation, Partition, QuadTree, TopologyError};
    pub use rift_transport::{Envelope, FieldIndex, Payload, Transporter};
}
