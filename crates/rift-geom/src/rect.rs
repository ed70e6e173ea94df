//! Half-open axis-aligned integer hyperrectangles.

use crate::point::{Axes, Point};
use std::cmp::Ordering;
use std::fmt;

/// The id carried by the world rectangle.
pub const WORLD_ID: i32 = -1;

/// An axis-aligned integer hyperrectangle `[ul, br)` with a stable id.
///
/// `ul` is the inclusive lower corner, `br` the exclusive upper corner.
/// Partition leaves carry their tree node id; the world carries
/// [`WORLD_ID`]; derived rectangles (overlaps, halos) inherit the id of
/// the rectangle they were cut from.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct HyperRect {
    /// Stable identifier; [`WORLD_ID`] for the world rectangle.
    pub id: i32,
    /// Inclusive lower corner.
    pub ul: Point,
    /// Exclusive upper corner.
    pub br: Point,
}

impl HyperRect {
    /// Create a rectangle. `ul` must be element-wise `<= br`.
    pub fn new(id: i32, ul: Point, br: Point) -> Self {
        debug_assert_eq!(ul.ndim(), br.ndim());
        debug_assert!(
            ul.as_slice().iter().zip(br.as_slice()).all(|(a, b)| a <= b),
            "rect corners out of order: {ul} !<= {br}"
        );
        Self { id, ul, br }
    }

    /// Number of dimensions.
    pub fn ndim(&self) -> usize {
        self.ul.ndim()
    }

    /// Per-dimension extents `br - ul`.
    pub fn size(&self) -> Axes {
        self.br.sub(&self.ul).as_slice().iter().copied().collect()
    }

    /// Number of cells; zero when any dimension collapses.
    pub fn area(&self) -> i64 {
        self.size().iter().map(|&s| s.max(0) as i64).product()
    }

    /// `true` when the rectangle covers no cells.
    pub fn is_empty(&self) -> bool {
        self.area() == 0
    }

    /// `true` when `p` lies inside `[ul, br)`.
    pub fn contains(&self, p: &Point) -> bool {
        debug_assert_eq!(self.ndim(), p.ndim());
        (0..self.ndim()).all(|d| p[d] >= self.ul[d] && p[d] < self.br[d])
    }

    /// `true` when `other` lies entirely inside `self`.
    pub fn contains_rect(&self, other: &HyperRect) -> bool {
        (0..self.ndim()).all(|d| other.ul[d] >= self.ul[d] && other.br[d] <= self.br[d])
    }

    /// `true` when the rectangles share at least one cell.
    pub fn intersects(&self, other: &HyperRect) -> bool {
        (0..self.ndim()).all(|d| self.ul[d] < other.br[d] && other.ul[d] < self.br[d])
    }

    /// The shared cells, or `None` when disjoint.
    ///
    /// The result inherits `self`'s id.
    pub fn intersection(&self, other: &HyperRect) -> Option<HyperRect> {
        let ndim = self.ndim();
        let mut ul = Vec::with_capacity(ndim);
        let mut br = Vec::with_capacity(ndim);
        for d in 0..ndim {
            let lo = self.ul[d].max(other.ul[d]);
            let hi = self.br[d].min(other.br[d]);
            if lo >= hi {
                return None;
            }
            ul.push(lo);
            br.push(hi);
        }
        Some(HyperRect::new(self.id, Point::new(&ul), Point::new(&br)))
    }

    /// Translate both corners by a per-dimension offset.
    pub fn shift(&self, offsets: &[i32]) -> HyperRect {
        HyperRect {
            id: self.id,
            ul: self.ul.shift_up(offsets),
            br: self.br.shift_up(offsets),
        }
    }

    /// Grow (positive) or shrink (negative) each face by a per-dimension
    /// amount: `ul - amount`, `br + amount`.
    ///
    /// Shrinking past the center collapses the rectangle to empty rather
    /// than inverting it.
    pub fn resize(&self, amounts: &[i32]) -> HyperRect {
        debug_assert_eq!(self.ndim(), amounts.len());
        let mut ul = Vec::with_capacity(self.ndim());
        let mut br = Vec::with_capacity(self.ndim());
        for d in 0..self.ndim() {
            let lo = self.ul[d] - amounts[d];
            let hi = self.br[d] + amounts[d];
            ul.push(lo.min(hi));
            br.push(hi.max(lo));
        }
        HyperRect::new(self.id, Point::new(&ul), Point::new(&br))
    }

    /// [`resize`](Self::resize) with every amount negated.
    pub fn shrink(&self, amounts: &[i32]) -> HyperRect {
        let neg: Vec<i32> = amounts.iter().map(|a| -a).collect();
        self.resize(&neg)
    }

    /// Flat row-major index of `p` relative to this rectangle's origin,
    /// or `None` when `p` is outside.
    pub fn flat_index(&self, p: &Point) -> Option<usize> {
        if !self.contains(p) {
            return None;
        }
        let size = self.size();
        let mut idx: usize = 0;
        for d in 0..self.ndim() {
            idx = idx * size[d] as usize + (p[d] - self.ul[d]) as usize;
        }
        Some(idx)
    }

    /// Iterate the contained points in row-major order.
    pub fn points(&self) -> PointIter {
        PointIter {
            rect: self.clone(),
            next: if self.is_empty() {
                None
            } else {
                Some(self.ul.clone())
            },
        }
    }
}

// Ordering is geometric (ul, then br, then id) so that sorted overlap
// lists pair up deterministically across workers.
impl Ord for HyperRect {
    fn cmp(&self, other: &Self) -> Ordering {
        self.ul
            .cmp(&other.ul)
            .then_with(|| self.br.cmp(&other.br))
            .then_with(|| self.id.cmp(&other.id))
    }
}

impl PartialOrd for HyperRect {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Debug for HyperRect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Rect#{}[{} .. {})", self.id, self.ul, self.br)
    }
}

impl fmt::Display for HyperRect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{} .. {})", self.ul, self.br)
    }
}

/// Row-major iterator over a rectangle's points.
pub struct PointIter {
    rect: HyperRect,
    next: Option<Point>,
}

impl Iterator for PointIter {
    type Item = Point;

    fn next(&mut self) -> Option<Point> {
        let current = self.next.take()?;
        let ndim = self.rect.ndim();
        let mut coords: Vec<i32> = current.as_slice().to_vec();
        for d in (0..ndim).rev() {
            coords[d] += 1;
            if coords[d] < self.rect.br[d] {
                self.next = Some(Point::new(&coords));
                break;
            }
            coords[d] = self.rect.ul[d];
        }
        Some(current)
    }
}
