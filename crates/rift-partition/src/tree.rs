//! The recursive rectangular decomposition of the world.
//!
//! A [`QuadTree`] owns every node in an arena keyed by id; parent links
//! are ids looked up in the arena, child links are ids held by the parent.
//! The root has id 0; fresh ids come from the front of a bounded pool and
//! return to it ascending when a subtree is merged away, so every worker
//! that replays the same mutations ends up with the same tree.

use crate::error::TopologyError;
use indexmap::IndexMap;
use rift_geom::{HyperRect, Point};
use std::collections::{BTreeSet, VecDeque};

/// Id of the root node.
pub const ROOT_ID: i32 = 0;

#[derive(Clone, Debug)]
struct Node {
    level: u32,
    parent: Option<i32>,
    /// Empty for leaves; `2^D` ids in child order for internal nodes.
    children: Vec<i32>,
    /// The split origin; `Some` exactly when the node is internal.
    origin: Option<Point>,
    rect: HyperRect,
}

/// A `2^D`-way tree of nested hyperrectangles tiling the world.
///
/// At all times the leaf rectangles exactly tile the world rectangle:
/// splitting a leaf replaces it with `2^D` children partitioning it at
/// the split origin, and merging a node removes its whole subtree.
#[derive(Clone, Debug)]
pub struct QuadTree {
    world: HyperRect,
    fanout: usize,
    nodes: IndexMap<i32, Node>,
    avail: VecDeque<i32>,
    depth: u32,
}

impl QuadTree {
    /// Build a tree over `world` able to hold at most `capacity` leaves.
    ///
    /// `capacity` must satisfy `capacity ≡ 1 (mod 2^D − 1)`: every split
    /// turns one leaf into `2^D`, so only such counts are reachable.
    pub fn new(world: HyperRect, capacity: usize) -> Result<Self, TopologyError> {
        let fanout = 1usize << world.ndim();
        if capacity % (fanout - 1) != 1 {
            return Err(TopologyError::InadmissibleWorkerCount {
                count: capacity,
                fanout,
            });
        }
        let pool = capacity / (fanout - 1) * fanout;
        let mut root_rect = world.clone();
        root_rect.id = ROOT_ID;
        let mut nodes = IndexMap::new();
        nodes.insert(
            ROOT_ID,
            Node {
                level: 0,
                parent: None,
                children: Vec::new(),
                origin: None,
                rect: root_rect,
            },
        );
        Ok(Self {
            world,
            fanout,
            nodes,
            avail: (1..=pool as i32).collect(),
            depth: 0,
        })
    }

    /// The world rectangle.
    pub fn world(&self) -> &HyperRect {
        &self.world
    }

    /// `2^D` — children per internal node.
    pub fn fanout(&self) -> usize {
        self.fanout
    }

    /// Deepest level currently present (root = 0).
    pub fn depth(&self) -> u32 {
        self.depth
    }

    /// Ids still available for new nodes, in allocation order.
    pub fn avail_ids(&self) -> impl Iterator<Item = i32> + '_ {
        self.avail.iter().copied()
    }

    /// `true` when the id names a live node.
    pub fn contains_node(&self, id: i32) -> bool {
        self.nodes.contains_key(&id)
    }

    /// The rectangle of a node.
    pub fn rect(&self, id: i32) -> Result<&HyperRect, TopologyError> {
        self.node(id).map(|n| &n.rect)
    }

    /// The level of a node (root = 0).
    pub fn level(&self, id: i32) -> Result<u32, TopologyError> {
        self.node(id).map(|n| n.level)
    }

    /// The parent id, `None` for the root.
    pub fn parent(&self, id: i32) -> Result<Option<i32>, TopologyError> {
        self.node(id).map(|n| n.parent)
    }

    /// Child ids in child order; empty for leaves.
    pub fn children(&self, id: i32) -> Result<&[i32], TopologyError> {
        self.node(id).map(|n| n.children.as_slice())
    }

    /// `true` when the node has no children.
    pub fn is_leaf(&self, id: i32) -> Result<bool, TopologyError> {
        self.node(id).map(|n| n.children.is_empty())
    }

    /// All leaf ids, ascending.
    pub fn leaf_ids(&self) -> Vec<i32> {
        let mut ids: Vec<i32> = self
            .nodes
            .iter()
            .filter(|(_, n)| n.children.is_empty())
            .map(|(&id, _)| id)
            .collect();
        ids.sort_unstable();
        ids
    }

    /// The leaf whose rectangle contains `p`.
    pub fn leaf_at(&self, p: &Point) -> Result<i32, TopologyError> {
        if !self.world.contains(p) {
            return Err(TopologyError::OutsideWorld { point: p.clone() });
        }
        let mut id = ROOT_ID;
        loop {
            let node = &self.nodes[&id];
            let origin = match &node.origin {
                Some(o) => o,
                None => return Ok(id),
            };
            let ndim = self.world.ndim();
            let mut child_idx = 0usize;
            for d in 0..ndim {
                if p[d] >= origin[d] {
                    child_idx |= 1 << (ndim - 1 - d);
                }
            }
            id = node.children[child_idx];
        }
    }

    /// Split the leaf containing `origin` into `2^D` children partitioned
    /// at `origin`. Returns the new child ids in child order.
    pub fn split(&mut self, origin: &Point) -> Result<Vec<i32>, TopologyError> {
        let leaf = self.leaf_at(origin)?;
        self.split_node(leaf, origin)
    }

    /// Split at each point in order.
    pub fn split_many(&mut self, origins: &[Point]) -> Result<(), TopologyError> {
        for origin in origins {
            self.split(origin)?;
        }
        Ok(())
    }

    /// Split a specific leaf at `origin`.
    pub fn split_node(&mut self, id: i32, origin: &Point) -> Result<Vec<i32>, TopologyError> {
        let (rect, level) = {
            let node = self.node(id)?;
            if !node.children.is_empty() {
                return Err(TopologyError::NotALeaf { id });
            }
            (node.rect.clone(), node.level)
        };
        let ndim = rect.ndim();
        if !(0..ndim).all(|d| rect.ul[d] < origin[d] && origin[d] < rect.br[d]) {
            return Err(TopologyError::NotInterior {
                point: origin.clone(),
                rect,
            });
        }
        if self.avail.len() < self.fanout {
            return Err(TopologyError::IdPoolExhausted);
        }

        let mut child_ids = Vec::with_capacity(self.fanout);
        for i in 0..self.fanout {
            let child_id = match self.avail.pop_front() {
                Some(cid) => cid,
                None => return Err(TopologyError::IdPoolExhausted),
            };
            let mut child_rect = Self::child_rect(&rect, origin, i, ndim);
            child_rect.id = child_id;
            self.nodes.insert(
                child_id,
                Node {
                    level: level + 1,
                    parent: Some(id),
                    children: Vec::new(),
                    origin: None,
                    rect: child_rect,
                },
            );
            child_ids.push(child_id);
        }
        let node = &mut self.nodes[&id];
        node.children = child_ids.clone();
        node.origin = Some(origin.clone());
        self.depth = self.depth.max(level + 1);
        Ok(child_ids)
    }

    /// Remove the whole subtree below `id`, returning its ids to the pool
    /// ascending. `id` becomes a leaf. Returns the freed ids.
    pub fn merge(&mut self, id: i32) -> Result<Vec<i32>, TopologyError> {
        self.node(id)?;
        let mut freed = Vec::new();
        let mut stack: Vec<i32> = self.nodes[&id].children.clone();
        while let Some(c) = stack.pop() {
            stack.extend_from_slice(&self.nodes[&c].children);
            freed.push(c);
        }
        freed.sort_unstable();
        for &c in &freed {
            self.nodes.swap_remove(&c);
        }
        self.avail.extend(freed.iter().copied());
        let node = &mut self.nodes[&id];
        node.children.clear();
        node.origin = None;
        self.depth = self.nodes.values().map(|n| n.level).max().unwrap_or(0);
        Ok(freed)
    }

    /// Re-partition `id`'s rectangle at a new origin, preserving `id`:
    /// the subtree is merged away and the node split again at
    /// `new_origin`. Returns the new child ids.
    pub fn move_origin(&mut self, id: i32, new_origin: &Point) -> Result<Vec<i32>, TopologyError> {
        let rect = self.rect(id)?.clone();
        let ndim = rect.ndim();
        if !(0..ndim).all(|d| rect.ul[d] < new_origin[d] && new_origin[d] < rect.br[d]) {
            return Err(TopologyError::NotInterior {
                point: new_origin.clone(),
                rect,
            });
        }
        self.merge(id)?;
        self.split_node(id, new_origin)
    }

    /// All descendant leaves of `id` (just `id` when it is a leaf).
    pub fn descendant_leaves(&self, id: i32) -> Result<Vec<i32>, TopologyError> {
        self.node(id)?;
        let mut out = Vec::new();
        let mut stack = vec![id];
        while let Some(c) = stack.pop() {
            let node = &self.nodes[&c];
            if node.children.is_empty() {
                out.push(c);
            } else {
                stack.extend(node.children.iter().rev());
            }
        }
        Ok(out)
    }

    /// Leaves whose rectangles intersect `probe`, pruned by subtree
    /// rectangles. Used for the shifted-halo passes of toroidal neighbor
    /// search.
    pub fn leaves_intersecting(&self, probe: &HyperRect) -> Vec<i32> {
        let mut out = Vec::new();
        let mut stack = vec![ROOT_ID];
        while let Some(c) = stack.pop() {
            let node = &self.nodes[&c];
            if !probe.intersects(&node.rect) {
                continue;
            }
            if node.children.is_empty() {
                out.push(c);
            } else {
                stack.extend(node.children.iter().rev());
            }
        }
        out
    }

    /// The leaves adjacent to `id` under a halo of thickness `aoi`:
    /// sibling leaves plus, per dimension, the leaves reached by crossing
    /// into the opposite half at the nearest ancestor on this side.
    ///
    /// The result excludes `id` itself and is sorted ascending. The root
    /// has no neighbors. Toroidal wrap is handled a level up by repeating
    /// the search against world-shifted halos.
    pub fn neighbors(&self, id: i32, aoi: &[i32]) -> Result<Vec<i32>, TopologyError> {
        let node = self.node(id)?;
        let parent = match node.parent {
            Some(p) => p,
            None => return Ok(Vec::new()),
        };
        let halo = node.rect.resize(aoi);
        let mut found: BTreeSet<i32> = BTreeSet::new();

        // Siblings first: a leaf sibling is always adjacent; an internal
        // sibling contributes its leaves that reach the halo.
        for sib in self.siblings(id) {
            if self.nodes[&sib].children.is_empty() {
                found.insert(sib);
            } else {
                for leaf in self.descendant_leaves(sib)? {
                    if halo.intersects(&self.nodes[&leaf].rect) {
                        found.insert(leaf);
                    }
                }
            }
        }

        let ndim = self.world.ndim();
        for dim in 0..ndim {
            let dir = self.dir(id, dim);

            // Climb until crossing to the opposite half of this
            // dimension, or the root.
            let mut curr = parent;
            loop {
                match self.nodes[&curr].parent {
                    Some(p) if self.dir(curr, dim) == dir => curr = p,
                    _ => break,
                }
            }

            // Descend back down on our side of that ancestor's siblings,
            // keeping only subtrees that can touch the halo.
            let mut stack: VecDeque<i32> = self
                .siblings(curr)
                .into_iter()
                .filter(|&s| self.dir(s, dim) == dir)
                .collect();
            while let Some(c) = stack.pop_front() {
                if !halo.intersects(&self.nodes[&c].rect) {
                    continue;
                }
                if self.nodes[&c].children.is_empty() {
                    found.insert(c);
                } else {
                    for &child in &self.nodes[&c].children {
                        if self.dir(child, dim) != dir {
                            stack.push_back(child);
                        }
                    }
                }
            }
        }

        Ok(found.into_iter().collect())
    }

    // ── Internal helpers ────────────────────────────────────────

    fn node(&self, id: i32) -> Result<&Node, TopologyError> {
        self.nodes.get(&id).ok_or(TopologyError::UnknownNode { id })
    }

    fn siblings(&self, id: i32) -> Vec<i32> {
        match self.nodes[&id].parent {
            Some(p) => self.nodes[&p]
                .children
                .iter()
                .copied()
                .filter(|&c| c != id)
                .collect(),
            None => Vec::new(),
        }
    }

    /// Which half of its parent's split a node occupies along `dim`
    /// (`true` = upper half). Must not be called on the root.
    fn dir(&self, id: i32, dim: usize) -> bool {
        let node = &self.nodes[&id];
        match node.parent.and_then(|p| self.nodes[&p].origin.clone()) {
            Some(origin) => node.rect.ul[dim] >= origin[dim],
            None => false,
        }
    }

    fn child_rect(parent: &HyperRect, origin: &Point, i: usize, ndim: usize) -> HyperRect {
        let mut ul = Vec::with_capacity(ndim);
        let mut br = Vec::with_capacity(ndim);
        for d in 0..ndim {
            let high = (i >> (ndim - 1 - d)) & 1 == 1;
            if high {
                ul.push(origin[d]);
                br.push(parent.br[d]);
            } else {
                ul.push(parent.ul[d]);
                br.push(origin[d]);
            }
        }
        HyperRect::new(0, Point::new(&ul), Point::new(&br))
    }
}
