//! The halo field: partition-bound grid storage with ghost exchange.

use crate::error::FieldError;
use crate::link::NeighborLink;
use rift_comm::{CellDirectory, CellLayout, Communicator};
use rift_geom::{torus, Axes, HyperRect, Point};
use rift_grid::{ByteReader, Cell, DenseGrid};
use rift_partition::{CommitClient, CommitError, Partition};
use rift_transport::{Envelope, FieldIndex, Payload, Transporter};
use smallvec::SmallVec;
use std::cell::RefCell;
use std::rc::Rc;
use tracing::debug;

/// What happens to writes outside the owned rectangle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WritePolicy {
    /// The write is a programming error (numeric fields: cell values
    /// cannot be migrated as entities).
    Strict,
    /// The value is wrapped in an envelope and migrated to the owner
    /// (object fields).
    Migrate,
}

/// A dense grid bound to the spatial partition.
///
/// The local storage covers `halo_rect` — the owned rectangle grown by
/// the area of interest. Cells of `owned_rect` are writable; the ghost
/// ring around it is read-only and refreshed by [`sync`](Self::sync);
/// anything further away is reachable read-only through the snapshot
/// registry. All coordinates are world coordinates.
pub struct HaloField<T: Cell> {
    partition: Rc<RefCell<Partition>>,
    comm: Rc<dyn Communicator>,
    transporter: Rc<RefCell<Transporter>>,
    directory: CellDirectory,
    policy: WritePolicy,
    aoi: Axes,
    world: HyperRect,
    toroidal: bool,
    owned: HyperRect,
    halo: HyperRect,
    private: HyperRect,
    links: Vec<NeighborLink>,
    peer_ranks: Vec<usize>,
    grid: DenseGrid<T>,
    staged: Vec<DenseGrid<T>>,
    index: Option<FieldIndex>,
}

fn void_rect(world: &HyperRect) -> HyperRect {
    HyperRect::new(world.id, world.ul.clone(), world.ul.clone())
}

impl<T: Cell> HaloField<T> {
    /// Bind a new field to the partition. Register it with the
    /// simulation state before first use so it receives its index.
    pub fn new(
        partition: Rc<RefCell<Partition>>,
        comm: Rc<dyn Communicator>,
        transporter: Rc<RefCell<Transporter>>,
        directory: CellDirectory,
        init: T,
        policy: WritePolicy,
    ) -> Result<Self, FieldError> {
        let (world, toroidal, aoi) = {
            let p = partition.borrow();
            (
                p.world().clone(),
                p.is_toroidal(),
                SmallVec::from_slice(p.aoi()),
            )
        };
        let placeholder = void_rect(&world);
        let mut field = Self {
            partition: partition.clone(),
            comm,
            transporter,
            directory,
            policy,
            aoi,
            owned: placeholder.clone(),
            halo: placeholder.clone(),
            private: placeholder.clone(),
            world,
            toroidal,
            links: Vec::new(),
            peer_ranks: Vec::new(),
            grid: DenseGrid::new(placeholder, init),
            staged: Vec::new(),
            index: None,
        };
        let p = partition.borrow();
        field.reload_in(&p)?;
        Ok(field)
    }

    // ── Geometry accessors ──────────────────────────────────────

    /// The worker's owned rectangle (empty when this rank has no leaf).
    pub fn owned_rect(&self) -> &HyperRect {
        &self.owned
    }

    /// The owned rectangle grown by the area of interest.
    pub fn halo_rect(&self) -> &HyperRect {
        &self.halo
    }

    /// The owned rectangle shrunk by the area of interest; writes here
    /// never land in a neighbor's ghost ring.
    pub fn private_rect(&self) -> &HyperRect {
        &self.private
    }

    /// The exchange parameters, one entry per direct neighbor.
    pub fn links(&self) -> &[NeighborLink] {
        &self.links
    }

    /// The local storage.
    pub fn storage(&self) -> &DenseGrid<T> {
        &self.grid
    }

    /// The local storage, mutably, for bulk sweeps that index cells
    /// directly.
    ///
    /// Bypasses the write policy: keep writes inside the owned
    /// rectangle — ghost cells written here are overwritten by the next
    /// [`sync`](Self::sync).
    pub fn storage_mut(&mut self) -> &mut DenseGrid<T> {
        &mut self.grid
    }

    /// The index assigned at registration.
    pub fn index(&self) -> Option<FieldIndex> {
        self.index
    }

    // ── Stabbing queries ────────────────────────────────────────

    /// `true` when `p` is inside the world rectangle.
    pub fn in_world(&self, p: &Point) -> bool {
        self.world.contains(p)
    }

    /// `true` when this worker owns the cell at `p`.
    pub fn in_owned(&self, p: &Point) -> bool {
        self.owned.contains(p)
    }

    /// `true` when `p` is so deep inside the owned rectangle that a
    /// write there never shows up in any neighbor's ghost ring.
    pub fn in_private(&self, p: &Point) -> bool {
        self.private.contains(p)
    }

    /// `true` when `p` is owned but visible to some neighbor.
    pub fn in_shared(&self, p: &Point) -> bool {
        self.in_owned(p) && !self.in_private(p)
    }

    /// `true` when `p` is readable locally (owned or ghost).
    pub fn in_owned_or_halo(&self, p: &Point) -> bool {
        self.halo.contains(p)
    }

    /// `true` when `p` is a ghost cell.
    pub fn in_halo_only(&self, p: &Point) -> bool {
        self.in_owned_or_halo(p) && !self.in_owned(p)
    }

    // ── Toroidal helpers ────────────────────────────────────────

    /// Reduce a point into the world rectangle.
    pub fn wrap_point(&self, p: &Point) -> Point {
        torus::wrap_point(p, &self.world)
    }

    /// Reduce a single axis value into the world's extent along `dim`.
    pub fn wrap_axis(&self, x: i32, dim: usize) -> i32 {
        self.world.ul[dim] + torus::wrap(x - self.world.ul[dim], self.world.size()[dim])
    }

    /// Shorter-arc difference `x1 - x2` along `dim`.
    pub fn diff_axis(&self, x1: i32, x2: i32, dim: usize) -> i32 {
        torus::diff_axis(x1, x2, self.world.size()[dim])
    }

    // ── Reads and writes ────────────────────────────────────────

    /// Read the cell at `p`.
    ///
    /// Local within the halo; anywhere else in the world resolves
    /// through the owner's published snapshot, which is a slow path a
    /// tuned simulation should not hit.
    pub fn get(&self, p: &Point) -> Result<T, FieldError> {
        if let Some(v) = self.grid.cell(p) {
            return Ok(v.clone());
        }
        let q = if self.toroidal {
            self.wrap_point(p)
        } else {
            p.clone()
        };
        if let Some(v) = self.grid.cell(&q) {
            return Ok(v.clone());
        }
        if !self.world.contains(&q) {
            return Err(FieldError::OutOfWorld { point: p.clone() });
        }
        let index = self.index.ok_or(FieldError::Unregistered)?;
        let owner = self.partition.borrow().owner_of(&q)?;
        debug!(
            target: "rift::field",
            rank = self.comm.rank(),
            point = %q,
            owner,
            "read outside local halo, falling back to the snapshot registry"
        );
        let bytes = self.directory.get_cell(owner, index.0, &q)?;
        let mut reader = ByteReader::new(&bytes);
        Ok(T::decode(&mut reader)?)
    }

    /// Write the cell at `p`.
    ///
    /// Outside the owned rectangle the write policy decides: `Strict`
    /// fields refuse, `Migrate` fields wrap the value in an envelope to
    /// the owning worker, where it is inserted on arrival.
    pub fn set(&mut self, p: &Point, v: T) -> Result<(), FieldError> {
        if self.owned.contains(p) {
            self.grid.put(p, v);
            return Ok(());
        }
        let q = if self.toroidal {
            self.wrap_point(p)
        } else {
            p.clone()
        };
        if self.owned.contains(&q) {
            self.grid.put(&q, v);
            return Ok(());
        }
        if !self.world.contains(&q) {
            return Err(FieldError::OutOfWorld { point: p.clone() });
        }
        match self.policy {
            WritePolicy::Strict => Err(FieldError::OutOfLocalWrite {
                point: p.clone(),
                owned: self.owned.clone(),
            }),
            WritePolicy::Migrate => {
                let index = self.index.ok_or(FieldError::Unregistered)?;
                let owner = self.partition.borrow().owner_of(&q)?;
                let mut bytes = Vec::new();
                v.encode(&mut bytes);
                self.transporter.borrow_mut().migrate(Envelope {
                    destination: owner,
                    field: Some(index),
                    location: q,
                    payload: Payload::Object(bytes),
                })?;
                Ok(())
            }
        }
    }

    /// Reset the cell at `p` to the field's init value.
    pub fn clear(&mut self, p: &Point) -> Result<(), FieldError> {
        let init = self.grid.init().clone();
        self.set(p, init)
    }

    /// `clear(from)` followed by `set(to, v)`.
    pub fn relocate(&mut self, from: &Point, to: &Point, v: T) -> Result<(), FieldError> {
        self.clear(from)?;
        self.set(to, v)
    }

    // ── Halo exchange ───────────────────────────────────────────

    /// Exchange ghost regions with every direct neighbor.
    ///
    /// Afterwards every ghost cell equals the owner's value as of the
    /// moment the owner packed its buffers.
    pub fn sync(&mut self) -> Result<(), FieldError> {
        let mut sends = Vec::with_capacity(self.links.len());
        for link in &self.links {
            sends.push(self.grid.pack(&link.send)?);
        }
        let counts: Vec<u32> = sends.iter().map(|b| b.len() as u32).collect();
        let recv_counts = self.comm.exchange_counts(&self.peer_ranks, &counts)?;
        let segments = self
            .comm
            .exchange_bytes(&self.peer_ranks, sends, &recv_counts)?;
        for (link, segment) in self.links.iter().zip(&segments) {
            self.grid.unpack(&link.recv, segment)?;
        }
        Ok(())
    }

    /// Assemble the full world grid at `root`.
    pub fn collect(&self, root: usize, full: &mut DenseGrid<T>) -> Result<(), FieldError> {
        let partition = self.partition.borrow();
        self.collect_in(&partition, root, full)
    }

    /// Scatter a full world grid from `root` into every worker's owned
    /// rectangle, then restore the halos.
    pub fn distribute(&mut self, root: usize, full: &DenseGrid<T>) -> Result<(), FieldError> {
        let partition = self.partition.clone();
        let partition = partition.borrow();
        self.distribute_in(&partition, root, full)
    }

    /// Assemble the subtree grid of this worker's group at `level` at
    /// the group master. Workers without a group at that level only take
    /// part in the closing barrier.
    pub fn collect_group(
        &self,
        level: u32,
        group_grid: Option<&mut DenseGrid<T>>,
    ) -> Result<(), FieldError> {
        let partition = self.partition.borrow();
        self.collect_group_in(&partition, level, group_grid)
    }

    /// Scatter a subtree grid from the group master into its members'
    /// owned rectangles, then restore the halos everywhere.
    pub fn distribute_group(
        &mut self,
        level: u32,
        group_grid: Option<&DenseGrid<T>>,
    ) -> Result<(), FieldError> {
        let partition = self.partition.clone();
        let partition = partition.borrow();
        self.distribute_group_in(&partition, level, group_grid)
    }

    /// Recompute every partition-derived cache: rectangles, neighbor
    /// links, and the storage shape. Existing cell data is dropped.
    pub fn reload(&mut self) -> Result<(), FieldError> {
        let partition = self.partition.clone();
        let partition = partition.borrow();
        self.reload_in(&partition)
    }

    // ── Partition-explicit internals ────────────────────────────
    //
    // The commit protocol hands callbacks a `&Partition` while the
    // shared handle is mutably borrowed, so everything reachable from a
    // commit callback takes the partition as an argument instead of
    // borrowing `self.partition`.

    fn reload_in(&mut self, partition: &Partition) -> Result<(), FieldError> {
        let my = self.comm.rank();
        self.world = partition.world().clone();
        self.toroidal = partition.is_toroidal();
        match partition.rect_of_rank(my) {
            Some(owned) => {
                self.halo = owned.resize(&self.aoi);
                self.private = owned.shrink(&self.aoi);
                self.owned = owned;
                self.peer_ranks = partition.neighbor_ranks(my)?;
                let mut links = Vec::with_capacity(self.peer_ranks.len());
                for &r in &self.peer_ranks {
                    if let Some(rect) = partition.rect_of_rank(r) {
                        links.push(NeighborLink::derive(
                            r,
                            &self.owned,
                            &self.halo,
                            &rect,
                            &self.aoi,
                            &self.world,
                            self.toroidal,
                        ));
                    }
                }
                self.links = links;
            }
            None => {
                let empty = void_rect(&self.world);
                self.owned = empty.clone();
                self.halo = empty.clone();
                self.private = empty;
                self.peer_ranks = Vec::new();
                self.links = Vec::new();
            }
        }
        self.grid.reshape(self.halo.clone());
        Ok(())
    }

    fn collect_in(
        &self,
        partition: &Partition,
        root: usize,
        full: &mut DenseGrid<T>,
    ) -> Result<(), FieldError> {
        let payload = self.grid.pack(&[self.owned.clone()])?;
        if let Some(buffers) = self.comm.gather(root, payload)? {
            for (i, &member) in self.comm.members().iter().enumerate() {
                if let Some(rect) = partition.rect_of_rank(member) {
                    full.unpack(&[rect], &buffers[i])?;
                }
            }
        }
        Ok(())
    }

    fn distribute_in(
        &mut self,
        partition: &Partition,
        root: usize,
        full: &DenseGrid<T>,
    ) -> Result<(), FieldError> {
        let payloads = if self.comm.rank() == root {
            let mut out = Vec::with_capacity(self.comm.size());
            for &member in self.comm.members() {
                match partition.rect_of_rank(member) {
                    Some(rect) => out.push(full.pack(&[rect])?),
                    None => out.push(Vec::new()),
                }
            }
            Some(out)
        } else {
            None
        };
        let mine = self.comm.scatter(root, payloads)?;
        self.grid.unpack(&[self.owned.clone()], &mine)?;
        self.sync()
    }

    fn collect_group_in(
        &self,
        partition: &Partition,
        level: u32,
        group_grid: Option<&mut DenseGrid<T>>,
    ) -> Result<(), FieldError> {
        let my = self.comm.rank();
        if let Some(group) = partition.group_at(level, my) {
            let gc = self.comm.group(&group.members)?;
            let payload = self.grid.pack(&[self.owned.clone()])?;
            if let Some(buffers) = gc.gather(group.master, payload)? {
                let grid = group_grid.ok_or(FieldError::MissingGroupStorage)?;
                for (i, &member) in gc.members().iter().enumerate() {
                    if let Some(rect) = partition.rect_of_rank(member) {
                        grid.unpack(&[rect], &buffers[i])?;
                    }
                }
            }
        }
        self.comm.barrier()?;
        Ok(())
    }

    fn distribute_group_in(
        &mut self,
        partition: &Partition,
        level: u32,
        group_grid: Option<&DenseGrid<T>>,
    ) -> Result<(), FieldError> {
        let my = self.comm.rank();
        if let Some(group) = partition.group_at(level, my) {
            let gc = self.comm.group(&group.members)?;
            let payloads = if my == group.master {
                let grid = group_grid.ok_or(FieldError::MissingGroupStorage)?;
                let mut out = Vec::with_capacity(gc.size());
                for &member in gc.members() {
                    match partition.rect_of_rank(member) {
                        Some(rect) => out.push(grid.pack(&[rect])?),
                        None => out.push(Vec::new()),
                    }
                }
                Some(out)
            } else {
                None
            };
            let mine = gc.scatter(group.master, payloads)?;
            self.grid.unpack(&[self.owned.clone()], &mine)?;
        }
        self.sync()
    }

    fn require_index(&self) -> Result<FieldIndex, FieldError> {
        self.index.ok_or(FieldError::Unregistered)
    }
}

/// Object-safe view over a registered field, used by the simulation
/// state to drive synchronization, inbox dispatch, and snapshot
/// publication without knowing the cell type.
pub trait FieldSlot {
    /// Record the index assigned at registration.
    fn set_index(&mut self, index: FieldIndex);

    /// The assigned index, if registered.
    fn slot_index(&self) -> Option<FieldIndex>;

    /// Run the halo exchange.
    fn sync_slot(&mut self) -> Result<(), FieldError>;

    /// Insert an arrived payload (the field's cell encoding) at a world
    /// location.
    fn absorb(&mut self, location: &Point, bytes: &[u8]) -> Result<(), FieldError>;

    /// Refresh this worker's snapshot in the remote-read registry.
    fn publish(&self) -> Result<(), FieldError>;
}

impl<T: Cell> FieldSlot for HaloField<T> {
    fn set_index(&mut self, index: FieldIndex) {
        self.index = Some(index);
    }

    fn slot_index(&self) -> Option<FieldIndex> {
        self.index
    }

    fn sync_slot(&mut self) -> Result<(), FieldError> {
        self.sync()
    }

    fn absorb(&mut self, location: &Point, bytes: &[u8]) -> Result<(), FieldError> {
        let mut reader = ByteReader::new(bytes);
        let v = T::decode(&mut reader)?;
        self.set(location, v)
    }

    fn publish(&self) -> Result<(), FieldError> {
        let index = self.require_index()?;
        let rank = self.comm.rank();
        if self.owned.is_empty() {
            self.directory.withdraw(rank, index.0);
            return Ok(());
        }
        let (bytes, layout) = match T::fixed_width() {
            Some(width) => (self.grid.pack(&[self.owned.clone()])?, CellLayout::Fixed(width)),
            None => {
                let mut bytes = Vec::new();
                let mut offsets = Vec::with_capacity(self.owned.area() as usize + 1);
                offsets.push(0u32);
                for p in self.owned.points() {
                    if let Some(v) = self.grid.cell(&p) {
                        v.encode(&mut bytes);
                    }
                    offsets.push(bytes.len() as u32);
                }
                (bytes, CellLayout::Offsets(offsets))
            }
        };
        self.directory
            .publish(rank, index.0, self.owned.clone(), bytes, layout);
        Ok(())
    }
}

impl<T: Cell> CommitClient for HaloField<T> {
    fn name(&self) -> &'static str {
        "halo-field"
    }

    fn before_commit(&mut self, level: u32, partition: &Partition) -> Result<(), CommitError> {
        let my = self.comm.rank();
        let group = partition.group_at(level, my);
        let mut stage = match &group {
            Some(g) if g.master == my => Some(self.grid.fresh(g.rect.clone())),
            _ => None,
        };
        self.collect_group_in(partition, level, stage.as_mut())
            .map_err(|e| CommitError {
                client: "halo-field",
                detail: e.to_string(),
            })?;
        if let Some(stage) = stage {
            self.staged.push(stage);
        }
        Ok(())
    }

    fn after_commit(&mut self, level: u32, partition: &Partition) -> Result<(), CommitError> {
        self.reload_in(partition).map_err(|e| CommitError {
            client: "halo-field",
            detail: e.to_string(),
        })?;
        let my = self.comm.rank();
        let group = partition.group_at(level, my);
        let stage = match &group {
            Some(g) if g.master == my => Some(self.staged.pop().ok_or(CommitError {
                client: "halo-field",
                detail: "post-commit master holds no staged snapshot; \
                         the rebalance moved group mastership across ranks"
                    .to_string(),
            })?),
            _ => {
                if !self.staged.is_empty() {
                    return Err(CommitError {
                        client: "halo-field",
                        detail: "staged snapshot orphaned; this rank stopped being \
                                 its group's master during the rebalance"
                            .to_string(),
                    });
                }
                None
            }
        };
        self.distribute_group_in(partition, level, stage.as_ref())
            .map_err(|e| CommitError {
                client: "halo-field",
                detail: e.to_string(),
            })
    }
}
