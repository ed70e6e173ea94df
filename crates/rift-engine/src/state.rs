//! The per-worker simulation state and the tick synchronization order.

use crate::agenda::Agenda;
use crate::config::{ConfigError, EngineConfig};
use crate::context::RuntimeContext;
use crate::error::EngineError;
use rift_comm::{CellDirectory, Communicator};
use rift_field::{FieldSlot, HaloField, WritePolicy};
use rift_geom::Point;
use rift_grid::Cell;
use rift_partition::{client_handle, Mutation, Partition};
use rift_transport::{Envelope, FieldIndex, Payload, Transporter};
use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;
use tracing::{debug, info};

/// One worker's view of the distributed simulation.
///
/// Owns the partition replica, the transporter, the registered fields,
/// the agenda, and the shared clock. The application drives it in a
/// bulk-synchronous loop:
///
/// 1. [`pre_step`](Self::pre_step) — synchronize fields and envelopes,
///    drain arrivals into the agenda and fields, publish read snapshots;
/// 2. the application's own scheduler step;
/// 3. [`revise_time`](Self::revise_time) — agree on the next tick time.
pub struct SimState {
    partition: Rc<RefCell<Partition>>,
    comm: Rc<dyn Communicator>,
    transporter: Rc<RefCell<Transporter>>,
    directory: CellDirectory,
    fields: Vec<Rc<RefCell<dyn FieldSlot>>>,
    agenda: Box<dyn Agenda>,
    context: RuntimeContext,
    clock: f64,
}

impl SimState {
    /// Build a worker: validate the configuration, partition the world
    /// uniformly, and wire up the transporter.
    ///
    /// `directory` must be the registry shared by every worker of the
    /// cluster (workers of a [`rift_comm::LocalCluster`] clone one).
    pub fn new(
        config: &EngineConfig,
        comm: Rc<dyn Communicator>,
        directory: CellDirectory,
        agenda: Box<dyn Agenda>,
    ) -> Result<Self, EngineError> {
        config.validate()?;
        let rank = comm.rank();
        let mut partition = Partition::new(
            config.world.clone(),
            config.workers,
            rank,
            config.toroidal,
            &config.aoi,
        )?;
        partition.init_uniform()?;

        // Every initial partition must hold a non-empty private region.
        for member in 0..config.workers {
            if let Some(rect) = partition.rect_of_rank(member) {
                let size = rect.size();
                for (d, &aoi) in config.aoi.iter().enumerate() {
                    if size[d] <= 2 * aoi {
                        return Err(EngineError::Config(
                            ConfigError::PartitionThinnerThanHalo {
                                rank: member,
                                dim: d,
                                side: size[d],
                                aoi,
                            },
                        ));
                    }
                }
            }
        }

        let partition = Rc::new(RefCell::new(partition));
        let transporter = Rc::new(RefCell::new(Transporter::new(
            comm.clone(),
            &partition.borrow(),
        )?));
        partition
            .borrow_mut()
            .register_client(client_handle(&transporter));

        info!(
            target: "rift::engine",
            rank,
            workers = config.workers,
            world = %config.world,
            "worker initialized"
        );

        Ok(Self {
            partition,
            comm,
            transporter,
            directory,
            fields: Vec::new(),
            agenda,
            context: RuntimeContext::new(rank, config.window),
            clock: 0.0,
        })
    }

    // ── Wiring ──────────────────────────────────────────────────

    /// Construct and register a halo field, returning its handle.
    ///
    /// Fields must be created in the same order on every worker; the
    /// returned index is that shared order.
    pub fn create_field<T: Cell + 'static>(
        &mut self,
        init: T,
        policy: WritePolicy,
    ) -> Result<Rc<RefCell<HaloField<T>>>, EngineError> {
        let field = Rc::new(RefCell::new(HaloField::new(
            self.partition.clone(),
            self.comm.clone(),
            self.transporter.clone(),
            self.directory.clone(),
            init,
            policy,
        )?));
        let index = FieldIndex(self.fields.len() as u32);
        field.borrow_mut().set_index(index);
        self.fields.push(field.clone());
        self.partition
            .borrow_mut()
            .register_client(client_handle(&field));
        Ok(field)
    }

    /// This worker's rank.
    pub fn rank(&self) -> usize {
        self.context.rank
    }

    /// The shared partition replica.
    pub fn partition(&self) -> &Rc<RefCell<Partition>> {
        &self.partition
    }

    /// The envelope transporter.
    pub fn transporter(&self) -> &Rc<RefCell<Transporter>> {
        &self.transporter
    }

    /// The communicator.
    pub fn comm(&self) -> &Rc<dyn Communicator> {
        &self.comm
    }

    /// The agenda.
    pub fn agenda(&self) -> &dyn Agenda {
        self.agenda.as_ref()
    }

    /// The agenda, mutably.
    pub fn agenda_mut(&mut self) -> &mut dyn Agenda {
        self.agenda.as_mut()
    }

    /// The shared tick clock, as of the last [`revise_time`](Self::revise_time).
    pub fn clock(&self) -> f64 {
        self.clock
    }

    /// Mean application-step cost over the timing window.
    pub fn tick_cost(&self) -> Option<Duration> {
        self.context.timer.mean()
    }

    // ── The coordination loop ───────────────────────────────────

    /// Hand an envelope to the transporter.
    pub fn migrate(&self, envelope: Envelope) -> Result<(), EngineError> {
        self.transporter.borrow_mut().migrate(envelope)?;
        Ok(())
    }

    /// The synchronization phase that precedes every application step.
    ///
    /// Stops the tick timer, halo-syncs every field in registration
    /// order, exchanges envelopes, dispatches arrivals into the agenda
    /// and fields, publishes remote-read snapshots, and restarts the
    /// timer.
    pub fn pre_step(&mut self) -> Result<(), EngineError> {
        self.context.timer.stop();

        for field in &self.fields {
            field.borrow_mut().sync_slot()?;
        }
        self.transporter.borrow_mut().sync()?;

        let arrivals = self.transporter.borrow_mut().take_inbox();
        if !arrivals.is_empty() {
            debug!(
                target: "rift::engine",
                rank = self.context.rank,
                count = arrivals.len(),
                "dispatching arrived envelopes"
            );
        }
        for envelope in arrivals {
            self.dispatch(envelope)?;
        }

        for field in &self.fields {
            field.borrow().publish()?;
        }

        self.context.timer.start();
        Ok(())
    }

    /// Agree on the shared clock: the minimum of every worker's next
    /// scheduled time.
    pub fn revise_time(&mut self, local_next: f64) -> Result<f64, EngineError> {
        let t = self.comm.all_reduce_min_f64(local_next)?;
        self.clock = t;
        Ok(t)
    }

    /// Run a coordinated topology change: every field and the
    /// transporter stage under the old decomposition, the tree mutates,
    /// and everything reloads and redistributes. Read snapshots are
    /// republished afterwards.
    pub fn rebalance(&mut self, mutation: Mutation) -> Result<(), EngineError> {
        self.partition.borrow_mut().commit(mutation)?;
        for field in &self.fields {
            field.borrow().publish()?;
        }
        self.comm.barrier()?;
        Ok(())
    }

    fn dispatch(&mut self, envelope: Envelope) -> Result<(), EngineError> {
        match &envelope.payload {
            Payload::Object(bytes) => {
                self.add_to_field(envelope.field, &envelope.location, bytes)?;
            }
            Payload::Agent {
                agent,
                ordering,
                time,
            } => {
                let at = if *time < 0.0 { self.clock + 1.0 } else { *time };
                self.agenda.schedule_once(at, *ordering, agent.clone());
                self.add_to_field(envelope.field, &envelope.location, agent)?;
            }
            Payload::Repeat {
                step,
                ordering,
                time,
                interval,
            } => {
                self.agenda
                    .schedule_repeating(*time, *ordering, step.clone(), *interval);
                self.add_to_field(envelope.field, &envelope.location, step)?;
            }
        }
        Ok(())
    }

    fn add_to_field(
        &self,
        field: Option<FieldIndex>,
        location: &Point,
        bytes: &[u8],
    ) -> Result<(), EngineError> {
        let Some(index) = field else {
            return Ok(());
        };
        let slot = self
            .fields
            .get(index.0 as usize)
            .ok_or(EngineError::UnknownField { index: index.0 })?;
        slot.borrow_mut().absorb(location, bytes)?;
        Ok(())
    }
}
