//! Published-snapshot registry behind remote point reads.
//!
//! Every worker publishes a packed snapshot of its owned cells at each
//! synchronization point; any worker can then answer a point query for a
//! foreign cell without interrupting the owner mid-step. This is the
//! correctness fallback for reads outside a worker's halo — well-tuned
//! simulations read only locally and never touch it.

use rift_geom::{HyperRect, Point};
use std::collections::HashMap;
use std::error::Error;
use std::fmt;
use std::sync::{Arc, RwLock};

/// How a published snapshot's bytes map to cells.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CellLayout {
    /// Every cell occupies the same number of bytes.
    Fixed(usize),
    /// Cell `i` occupies `offsets[i] .. offsets[i + 1]`.
    Offsets(Vec<u32>),
}

#[derive(Clone, Debug)]
struct Published {
    rect: HyperRect,
    bytes: Vec<u8>,
    layout: CellLayout,
}

/// Shared registry of `(rank, field) → packed owned cells`.
///
/// Handles are cheap clones of one shared registry. Readers observe the
/// most recently published snapshot for an owner, which — because
/// publication happens at the tick boundary and rebalance is a barrier —
/// is always a consistent view of that worker's owned rectangle.
#[derive(Clone, Default)]
pub struct CellDirectory {
    inner: Arc<RwLock<HashMap<(usize, u32), Published>>>,
}

impl CellDirectory {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish `rank`'s owned cells for one field, replacing any earlier
    /// snapshot.
    pub fn publish(
        &self,
        rank: usize,
        field: u32,
        rect: HyperRect,
        bytes: Vec<u8>,
        layout: CellLayout,
    ) {
        if let Ok(mut map) = self.inner.write() {
            map.insert((rank, field), Published { rect, bytes, layout });
        }
    }

    /// Drop `rank`'s snapshot for one field (used when a rebalance takes
    /// its leaf away).
    pub fn withdraw(&self, rank: usize, field: u32) {
        if let Ok(mut map) = self.inner.write() {
            map.remove(&(rank, field));
        }
    }

    /// The encoded value of the cell at `p` in `owner`'s snapshot of
    /// `field`.
    pub fn get_cell(&self, owner: usize, field: u32, p: &Point) -> Result<Vec<u8>, ProxyError> {
        let map = self.inner.read().map_err(|_| ProxyError::Corrupt {
            detail: "registry lock poisoned".into(),
        })?;
        let published = map.get(&(owner, field)).ok_or(ProxyError::Unpublished {
            owner,
            field,
        })?;
        let idx = published
            .rect
            .flat_index(p)
            .ok_or_else(|| ProxyError::OutOfLocal {
                owner,
                field,
                point: p.clone(),
            })?;
        let (start, end) = match &published.layout {
            CellLayout::Fixed(width) => (idx * width, (idx + 1) * width),
            CellLayout::Offsets(offsets) => {
                let lo = offsets.get(idx).copied().ok_or_else(|| ProxyError::Corrupt {
                    detail: format!("offset table too short for cell {idx}"),
                })?;
                let hi = offsets
                    .get(idx + 1)
                    .copied()
                    .ok_or_else(|| ProxyError::Corrupt {
                        detail: format!("offset table too short for cell {idx}"),
                    })?;
                (lo as usize, hi as usize)
            }
        };
        published
            .bytes
            .get(start..end)
            .map(<[u8]>::to_vec)
            .ok_or_else(|| ProxyError::Corrupt {
                detail: format!("cell {idx} range {start}..{end} outside snapshot"),
            })
    }
}

/// Errors from remote point reads.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ProxyError {
    /// The owner has not published this field yet.
    Unpublished {
        /// Queried rank.
        owner: usize,
        /// Queried field.
        field: u32,
    },
    /// The point is not inside the owner's published rectangle.
    OutOfLocal {
        /// Queried rank.
        owner: usize,
        /// Queried field.
        field: u32,
        /// The point that missed.
        point: Point,
    },
    /// The snapshot's layout is internally inconsistent.
    Corrupt {
        /// What was inconsistent.
        detail: String,
    },
}

impl fmt::Display for ProxyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unpublished { owner, field } => {
                write!(f, "rank {owner} has not published field {field}")
            }
            Self::OutOfLocal { owner, field, point } => write!(
                f,
                "point {point} outside rank {owner}'s partition for field {field}"
            ),
            Self::Corrupt { detail } => write!(f, "corrupt snapshot: {detail}"),
        }
    }
}

impl Error for ProxyError {}

#[cfg(test)]
mod tests {
    use super::*;

    fn rect(ul: [i32; 2], br: [i32; 2]) -> HyperRect {
        HyperRect::new(1, Point::from(ul), Point::from(br))
    }

    #[test]
    fn fixed_layout_slices_cells() {
        let dir = CellDirectory::new();
        // 2x2 rect of i32 cells 10, 11, 12, 13.
        let bytes: Vec<u8> = [10i32, 11, 12, 13]
            .iter()
            .flat_map(|v| v.to_le_bytes())
            .collect();
        dir.publish(2, 0, rect([0, 0], [2, 2]), bytes, CellLayout::Fixed(4));

        let cell = dir.get_cell(2, 0, &Point::from([1, 0])).unwrap();
        assert_eq!(i32::from_le_bytes(cell.try_into().unwrap()), 12);
    }

    #[test]
    fn offsets_layout_handles_variable_width() {
        let dir = CellDirectory::new();
        let bytes = vec![0xAA, 0xBB, 0xCC]; // cell 0 = [AA], cell 1 = [BB, CC]
        dir.publish(
            0,
            3,
            rect([0, 0], [1, 2]),
            bytes,
            CellLayout::Offsets(vec![0, 1, 3]),
        );
        assert_eq!(dir.get_cell(0, 3, &Point::from([0, 0])).unwrap(), vec![0xAA]);
        assert_eq!(
            dir.get_cell(0, 3, &Point::from([0, 1])).unwrap(),
            vec![0xBB, 0xCC]
        );
    }

    #[test]
    fn miss_reports_out_of_local() {
        let dir = CellDirectory::new();
        dir.publish(1, 0, rect([0, 0], [2, 2]), vec![0; 16], CellLayout::Fixed(4));
        assert!(matches!(
            dir.get_cell(1, 0, &Point::from([5, 5])),
            Err(ProxyError::OutOfLocal { owner: 1, .. })
        ));
        assert!(matches!(
            dir.get_cell(9, 0, &Point::from([0, 0])),
            Err(ProxyError::Unpublished { owner: 9, .. })
        ));
    }

    #[test]
    fn republish_replaces_the_snapshot() {
        let dir = CellDirectory::new();
        let r = rect([0, 0], [1, 1]);
        dir.publish(0, 0, r.clone(), 1i32.to_le_bytes().to_vec(), CellLayout::Fixed(4));
        dir.publish(0, 0, r, 2i32.to_le_bytes().to_vec(), CellLayout::Fixed(4));
        let cell = dir.get_cell(0, 0, &Point::from([0, 0])).unwrap();
        assert_eq!(i32::from_le_bytes(cell.try_into().unwrap()), 2);
    }

    #[test]
    fn withdraw_removes_the_snapshot() {
        let dir = CellDirectory::new();
        let r = rect([0, 0], [1, 1]);
        dir.publish(4, 1, r, vec![0; 4], CellLayout::Fixed(4));
        dir.withdraw(4, 1);
        assert!(matches!(
            dir.get_cell(4, 1, &Point::from([0, 0])),
            Err(ProxyError::Unpublished { .. })
        ));
    }
}
