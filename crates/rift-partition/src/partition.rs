//! Worker-facing partition manager: the quadtree plus rank assignment,
//! neighbor lookup, level groups, and the coordinated commit protocol.

use crate::error::{CommitError, PartitionError, TopologyError};
use crate::tree::{QuadTree, ROOT_ID};
use indexmap::IndexMap;
use rift_geom::{shifted_copies, Axes, HyperRect, Point};
use smallvec::SmallVec;
use std::cell::RefCell;
use std::collections::BTreeSet;
use std::rc::{Rc, Weak};
use tracing::debug;

/// A topology mutation applied through the commit protocol.
#[derive(Clone, Debug)]
pub enum Mutation {
    /// Split the leaf containing the point, partitioning at it.
    Split(Point),
    /// Collapse the subtree below a node.
    Merge(i32),
    /// Re-partition a node's rectangle at a new origin, keeping its id.
    MoveOrigin(i32, Point),
}

/// A participant in the commit protocol.
///
/// Clients register once at startup and are invoked in registration
/// order on every worker: all `before_commit` calls, then the topology
/// mutation, then all `after_commit` calls. `before_commit` snapshots
/// state that depends on the old topology; `after_commit` reloads
/// partition-derived caches and redistributes the snapshot.
pub trait CommitClient {
    /// Name used in commit failure diagnostics.
    fn name(&self) -> &'static str;

    /// Stage state before the topology changes. `level` is the level of
    /// the node about to change.
    fn before_commit(&mut self, level: u32, partition: &Partition) -> Result<(), CommitError>;

    /// Reload and redistribute after the topology changed.
    fn after_commit(&mut self, level: u32, partition: &Partition) -> Result<(), CommitError>;
}

/// The workers spanned by one internal node at a given level.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Group {
    /// The internal node's rectangle.
    pub rect: HyperRect,
    /// Member ranks, ascending.
    pub members: Vec<usize>,
    /// The aggregating member (lowest rank).
    pub master: usize,
}

impl Group {
    /// Position of `rank` within the member list.
    pub fn position_of(&self, rank: usize) -> Option<usize> {
        self.members.iter().position(|&r| r == rank)
    }
}

/// Spatial partition manager for one worker.
///
/// Every worker holds an identical replica and applies identical
/// mutations in the same order, so owner lookups and group membership
/// agree across the cluster without communication.
pub struct Partition {
    tree: QuadTree,
    workers: usize,
    my_rank: usize,
    toroidal: bool,
    aoi: Axes,
    rank_of_leaf: IndexMap<i32, usize>,
    clients: Vec<Weak<RefCell<dyn CommitClient>>>,
}

impl Partition {
    /// Create a partition of `world` across `workers` ranks.
    ///
    /// Starts with the whole world owned by rank 0; call
    /// [`init_uniform`](Self::init_uniform) or apply mutations to spread
    /// it out.
    pub fn new(
        world: HyperRect,
        workers: usize,
        my_rank: usize,
        toroidal: bool,
        aoi: &[i32],
    ) -> Result<Self, TopologyError> {
        let tree = QuadTree::new(world, workers)?;
        let mut rank_of_leaf = IndexMap::new();
        rank_of_leaf.insert(ROOT_ID, 0);
        Ok(Self {
            tree,
            workers,
            my_rank,
            toroidal,
            aoi: SmallVec::from_slice(aoi),
            rank_of_leaf,
            clients: Vec::new(),
        })
    }

    /// Split the largest leaf at its center until every worker owns one.
    ///
    /// Setup-phase only: no commit callbacks run.
    pub fn init_uniform(&mut self) -> Result<(), TopologyError> {
        while self.tree.leaf_ids().len() < self.workers {
            let mut best: Option<(i64, i32)> = None;
            for id in self.tree.leaf_ids() {
                let area = self.tree.rect(id)?.area();
                match best {
                    Some((b, _)) if area <= b => {}
                    _ => best = Some((area, id)),
                }
            }
            let Some((_, id)) = best else { break };
            let rect = self.tree.rect(id)?.clone();
            let size = rect.size();
            let center: Vec<i32> = (0..rect.ndim())
                .map(|d| rect.ul[d] + size[d] / 2)
                .collect();
            self.apply(Mutation::Split(Point::new(&center)))?;
        }
        Ok(())
    }

    // ── Accessors ───────────────────────────────────────────────

    /// The underlying tree.
    pub fn tree(&self) -> &QuadTree {
        &self.tree
    }

    /// The world rectangle.
    pub fn world(&self) -> &HyperRect {
        self.tree.world()
    }

    /// Total worker count.
    pub fn workers(&self) -> usize {
        self.workers
    }

    /// This worker's rank.
    pub fn my_rank(&self) -> usize {
        self.my_rank
    }

    /// Whether the world wraps toroidally.
    pub fn is_toroidal(&self) -> bool {
        self.toroidal
    }

    /// Halo thickness per dimension.
    pub fn aoi(&self) -> &[i32] {
        &self.aoi
    }

    /// The leaf currently assigned to `rank`, if any.
    pub fn leaf_of_rank(&self, rank: usize) -> Option<i32> {
        self.rank_of_leaf
            .iter()
            .find(|(_, &r)| r == rank)
            .map(|(&leaf, _)| leaf)
    }

    /// The rectangle owned by `rank`; `None` for ranks without a leaf.
    pub fn rect_of_rank(&self, rank: usize) -> Option<HyperRect> {
        let leaf = self.leaf_of_rank(rank)?;
        self.tree.rect(leaf).ok().cloned()
    }

    /// This worker's owned rectangle, if it has one.
    pub fn my_rect(&self) -> Option<HyperRect> {
        self.rect_of_rank(self.my_rank)
    }

    /// The rank owning the cell at `p`.
    pub fn owner_of(&self, p: &Point) -> Result<usize, TopologyError> {
        let leaf = self.tree.leaf_at(p)?;
        self.rank_of_leaf
            .get(&leaf)
            .copied()
            .ok_or(TopologyError::UnknownNode { id: leaf })
    }

    /// Ranks whose rectangles intersect `rank`'s halo, ascending.
    ///
    /// Under toroidal topology the halo is replicated by world-sized
    /// shifts and each image is probed against the tree.
    pub fn neighbor_ranks(&self, rank: usize) -> Result<Vec<usize>, TopologyError> {
        let Some(leaf) = self.leaf_of_rank(rank) else {
            return Ok(Vec::new());
        };
        let mut ids: BTreeSet<i32> = self.tree.neighbors(leaf, &self.aoi)?.into_iter().collect();
        if self.toroidal {
            let halo = self.tree.rect(leaf)?.resize(&self.aoi);
            for image in shifted_copies(&halo, self.world()).iter().skip(1) {
                for id in self.tree.leaves_intersecting(image) {
                    if id != leaf {
                        ids.insert(id);
                    }
                }
            }
        }
        let mut ranks = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(&r) = self.rank_of_leaf.get(&id) {
                ranks.push(r);
            }
        }
        ranks.sort_unstable();
        Ok(ranks)
    }

    /// This worker's direct neighbors.
    pub fn my_neighbor_ranks(&self) -> Result<Vec<usize>, TopologyError> {
        self.neighbor_ranks(self.my_rank)
    }

    /// The group `rank` belongs to at `level`: the members and master of
    /// the level-`level` ancestor of its leaf. `None` when the rank has
    /// no leaf or its leaf sits above that level.
    pub fn group_at(&self, level: u32, rank: usize) -> Option<Group> {
        let leaf = self.leaf_of_rank(rank)?;
        let mut id = leaf;
        loop {
            let lv = self.tree.level(id).ok()?;
            if lv == level {
                break;
            }
            if lv < level {
                return None;
            }
            id = self.tree.parent(id).ok()??;
        }
        let mut members: Vec<usize> = self
            .tree
            .descendant_leaves(id)
            .ok()?
            .iter()
            .filter_map(|l| self.rank_of_leaf.get(l).copied())
            .collect();
        members.sort_unstable();
        let master = *members.first()?;
        Some(Group {
            rect: self.tree.rect(id).ok()?.clone(),
            members,
            master,
        })
    }

    // ── Mutation ────────────────────────────────────────────────

    /// Register a participant in the commit protocol. Registration order
    /// is invocation order and must be identical on every worker.
    pub fn register_client(&mut self, client: Weak<RefCell<dyn CommitClient>>) {
        self.clients.push(client);
    }

    /// Apply a mutation without running commit callbacks.
    ///
    /// Setup-phase only: once fields hold data, use
    /// [`commit`](Self::commit) so their contents survive the move.
    pub fn apply(&mut self, mutation: Mutation) -> Result<u32, TopologyError> {
        let target = match &mutation {
            Mutation::Split(p) => self.tree.leaf_at(p)?,
            Mutation::Merge(id) | Mutation::MoveOrigin(id, _) => *id,
        };
        let level = self.tree.level(target)?;

        let mut prev_ranks: Vec<usize> = self
            .tree
            .descendant_leaves(target)?
            .iter()
            .filter_map(|l| self.rank_of_leaf.get(l).copied())
            .collect();
        prev_ranks.sort_unstable();

        match &mutation {
            Mutation::Split(p) => {
                self.tree.split_node(target, p)?;
            }
            Mutation::Merge(id) => {
                self.tree.merge(*id)?;
            }
            Mutation::MoveOrigin(id, p) => {
                self.tree.move_origin(*id, p)?;
            }
        }

        // Drop assignments that no longer name a live leaf, then hand the
        // subtree's previous ranks (and any unused ones) to the new
        // leaves in ascending leaf-id order. Ranks outside the subtree
        // are untouched.
        let tree = &self.tree;
        self.rank_of_leaf
            .retain(|leaf, _| tree.contains_node(*leaf) && tree.is_leaf(*leaf).unwrap_or(false));

        let assigned: BTreeSet<usize> = self.rank_of_leaf.values().copied().collect();
        let mut candidates = prev_ranks.clone();
        candidates.extend(
            (0..self.workers).filter(|r| !assigned.contains(r) && !prev_ranks.contains(r)),
        );

        let mut new_leaves = self.tree.descendant_leaves(target)?;
        new_leaves.sort_unstable();
        debug_assert!(new_leaves.len() <= candidates.len());
        for (leaf, rank) in new_leaves.into_iter().zip(candidates) {
            self.rank_of_leaf.insert(leaf, rank);
        }

        debug!(target: "rift::partition", ?mutation, level, "topology changed");
        Ok(level)
    }

    /// Run the coordinated commit: every registered client's
    /// `before_commit`, the mutation, then every `after_commit`, in
    /// registration order.
    pub fn commit(&mut self, mutation: Mutation) -> Result<(), PartitionError> {
        let target = match &mutation {
            Mutation::Split(p) => self.tree.leaf_at(p)?,
            Mutation::Merge(id) | Mutation::MoveOrigin(id, _) => *id,
        };
        let level = self.tree.level(target)?;

        let clients = self.clients.clone();
        for client in &clients {
            if let Some(client) = client.upgrade() {
                client.borrow_mut().before_commit(level, self)?;
            }
        }
        self.apply(mutation)?;
        for client in &clients {
            if let Some(client) = client.upgrade() {
                client.borrow_mut().after_commit(level, self)?;
            }
        }
        Ok(())
    }
}

/// Convenience alias for registering concrete clients.
pub fn client_handle<C: CommitClient + 'static>(client: &Rc<RefCell<C>>) -> Weak<RefCell<dyn CommitClient>> {
    let rc: Rc<RefCell<dyn CommitClient>> = client.clone();
    Rc::downgrade(&rc)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn world_100() -> HyperRect {
        HyperRect::new(-1, Point::from([0, 0]), Point::from([100, 100]))
    }

    fn world_1000() -> HyperRect {
        HyperRect::new(-1, Point::from([0, 0]), Point::from([1000, 1000]))
    }

    #[test]
    fn uniform_init_assigns_every_worker_a_leaf() {
        let mut p = Partition::new(world_1000(), 4, 0, true, &[5, 5]).unwrap();
        p.init_uniform().unwrap();
        let mut rects = Vec::new();
        for r in 0..4 {
            let rect = p.rect_of_rank(r).expect("every rank owns a leaf");
            rects.push(rect);
        }
        let total: i64 = rects.iter().map(|r| r.area()).sum();
        assert_eq!(total, 1000 * 1000);
        // The first split owner keeps rank 0 on the low/low quadrant.
        assert_eq!(p.owner_of(&Point::from([0, 0])).unwrap(), 0);
        assert_eq!(p.owner_of(&Point::from([750, 750])).unwrap(), 3);
    }

    #[test]
    fn owner_lookup_follows_splits() {
        let mut p = Partition::new(world_100(), 7, 0, false, &[1, 1]).unwrap();
        p.apply(Mutation::Split(Point::from([40, 60]))).unwrap();
        p.apply(Mutation::Split(Point::from([10, 80]))).unwrap();
        assert_eq!(p.tree().leaf_ids().len(), 7);
        // Every worker owns exactly one leaf.
        let owners: BTreeSet<usize> =
            (0..7).filter_map(|r| p.rect_of_rank(r).map(|_| r)).collect();
        assert_eq!(owners.len(), 7);
    }

    #[test]
    fn move_origin_keeps_outside_ranks_stable() {
        let mut p = Partition::new(world_100(), 7, 0, false, &[1, 1]).unwrap();
        p.apply(Mutation::Split(Point::from([40, 60]))).unwrap();
        p.apply(Mutation::Split(Point::from([10, 80]))).unwrap();
        let outside_before = p.owner_of(&Point::from([70, 30])).unwrap();

        // Re-partition only the subtree that was split second.
        let sub = p.tree().leaf_at(&Point::from([10, 80])).unwrap();
        let parent = p.tree().parent(sub).unwrap().unwrap();
        p.apply(Mutation::MoveOrigin(parent, Point::from([20, 70])))
            .unwrap();

        assert_eq!(p.owner_of(&Point::from([70, 30])).unwrap(), outside_before);
        let owners: BTreeSet<usize> =
            (0..7).filter_map(|r| p.rect_of_rank(r).map(|_| r)).collect();
        assert_eq!(owners.len(), 7);
    }

    #[test]
    fn shrinking_move_leaves_spare_ranks_idle() {
        let mut p = Partition::new(world_100(), 7, 0, false, &[1, 1]).unwrap();
        p.apply(Mutation::Split(Point::from([40, 60]))).unwrap();
        p.apply(Mutation::Split(Point::from([10, 80]))).unwrap();
        p.apply(Mutation::MoveOrigin(ROOT_ID, Point::from([60, 70])))
            .unwrap();

        let with_leaf: Vec<usize> =
            (0..7).filter(|&r| p.rect_of_rank(r).is_some()).collect();
        assert_eq!(with_leaf.len(), 4);
        // The lowest previous ranks are reused first.
        assert_eq!(with_leaf, vec![0, 1, 2, 3]);
        assert_eq!(p.tree().avail_ids().count(), 4);
    }

    #[test]
    fn toroidal_neighbors_wrap_around_the_world() {
        let mut p = Partition::new(world_1000(), 4, 0, true, &[5, 5]).unwrap();
        p.init_uniform().unwrap();
        // In a 2x2 toroidal split every quadrant touches every other,
        // through shared edges and through the wrap.
        for r in 0..4 {
            let mut want: Vec<usize> = (0..4).filter(|&o| o != r).collect();
            want.sort_unstable();
            assert_eq!(p.neighbor_ranks(r).unwrap(), want, "rank {r}");
        }
    }

    #[test]
    fn non_toroidal_quadrants_still_meet_at_the_center() {
        let mut p = Partition::new(world_1000(), 4, 0, false, &[5, 5]).unwrap();
        p.init_uniform().unwrap();
        for r in 0..4 {
            let mut want: Vec<usize> = (0..4).filter(|&o| o != r).collect();
            want.sort_unstable();
            assert_eq!(p.neighbor_ranks(r).unwrap(), want, "rank {r}");
        }
    }

    #[test]
    fn group_at_root_spans_everyone() {
        let mut p = Partition::new(world_1000(), 4, 2, true, &[5, 5]).unwrap();
        p.init_uniform().unwrap();
        let g = p.group_at(0, 2).unwrap();
        assert_eq!(g.members, vec![0, 1, 2, 3]);
        assert_eq!(g.master, 0);
        assert_eq!(g.rect, *p.world());
    }

    #[test]
    fn group_at_level_one_is_the_leaf_itself_in_a_flat_tree() {
        let mut p = Partition::new(world_1000(), 4, 1, true, &[5, 5]).unwrap();
        p.init_uniform().unwrap();
        let g = p.group_at(1, 1).unwrap();
        assert_eq!(g.members, vec![1]);
        assert_eq!(g.master, 1);
    }

    #[test]
    fn commit_runs_clients_in_registration_order() {
        use std::rc::Rc;

        struct Probe {
            label: &'static str,
            log: Rc<RefCell<Vec<String>>>,
        }
        impl CommitClient for Probe {
            fn name(&self) -> &'static str {
                self.label
            }
            fn before_commit(&mut self, level: u32, _: &Partition) -> Result<(), CommitError> {
                self.log.borrow_mut().push(format!("pre-{}-{level}", self.label));
                Ok(())
            }
            fn after_commit(&mut self, level: u32, _: &Partition) -> Result<(), CommitError> {
                self.log.borrow_mut().push(format!("post-{}-{level}", self.label));
                Ok(())
            }
        }

        let log = Rc::new(RefCell::new(Vec::new()));
        let a = Rc::new(RefCell::new(Probe { label: "a", log: log.clone() }));
        let b = Rc::new(RefCell::new(Probe { label: "b", log: log.clone() }));

        let mut p = Partition::new(world_100(), 4, 0, false, &[1, 1]).unwrap();
        p.register_client(client_handle(&a));
        p.register_client(client_handle(&b));
        p.commit(Mutation::Split(Point::from([50, 50]))).unwrap();

        assert_eq!(
            log.borrow().as_slice(),
            &[
                "pre-a-0".to_string(),
                "pre-b-0".to_string(),
                "post-a-0".to_string(),
                "post-b-0".to_string(),
            ]
        );
    }

    #[test]
    fn dropped_clients_are_skipped() {
        let mut p = Partition::new(world_100(), 4, 0, false, &[1, 1]).unwrap();
        {
            struct Nop;
            impl CommitClient for Nop {
                fn name(&self) -> &'static str {
                    "nop"
                }
                fn before_commit(&mut self, _: u32, _: &Partition) -> Result<(), CommitError> {
                    Ok(())
                }
                fn after_commit(&mut self, _: u32, _: &Partition) -> Result<(), CommitError> {
                    Ok(())
                }
            }
            let c = Rc::new(RefCell::new(Nop));
            p.register_client(client_handle(&c));
            // c drops here.
        }
        p.commit(Mutation::Split(Point::from([50, 50]))).unwrap();
        assert_eq!(p.tree().leaf_ids().len(), 4);
    }
}
