//! N-dimensional integer points.

use smallvec::SmallVec;
use std::fmt;
use std::ops::Index;

/// Per-dimension integer extents (sizes, halo widths, shift offsets).
///
/// Uses `SmallVec<[i32; 4]>` to avoid heap allocation for worlds up to
/// 4 dimensions; higher-dimensional worlds spill to the heap transparently.
pub type Axes = SmallVec<[i32; 4]>;

/// A point in the integer world lattice.
///
/// Comparison is lexicographic over the coordinates, which gives the
/// deterministic orderings the halo-overlap pairing relies on.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Point(Axes);

impl Point {
    /// Create a point from a coordinate slice.
    pub fn new(coords: &[i32]) -> Self {
        Self(SmallVec::from_slice(coords))
    }

    /// The origin of an `ndim`-dimensional lattice.
    pub fn zero(ndim: usize) -> Self {
        Self(SmallVec::from_elem(0, ndim))
    }

    /// Number of dimensions.
    pub fn ndim(&self) -> usize {
        self.0.len()
    }

    /// Coordinates as a slice.
    pub fn as_slice(&self) -> &[i32] {
        &self.0
    }

    /// Element-wise sum.
    pub fn add(&self, other: &Point) -> Point {
        debug_assert_eq!(self.ndim(), other.ndim());
        Point(self.0.iter().zip(&other.0).map(|(a, b)| a + b).collect())
    }

    /// Element-wise difference.
    pub fn sub(&self, other: &Point) -> Point {
        debug_assert_eq!(self.ndim(), other.ndim());
        Point(self.0.iter().zip(&other.0).map(|(a, b)| a - b).collect())
    }

    /// Translate by a per-dimension offset slice.
    pub fn shift_up(&self, offsets: &[i32]) -> Point {
        debug_assert_eq!(self.ndim(), offsets.len());
        Point(self.0.iter().zip(offsets).map(|(a, b)| a + b).collect())
    }

    /// Translate by the negation of a per-dimension offset slice.
    ///
    /// `p.shift_down(rect_ul)` maps a world coordinate into a rectangle's
    /// local frame.
    pub fn shift_down(&self, offsets: &[i32]) -> Point {
        debug_assert_eq!(self.ndim(), offsets.len());
        Point(self.0.iter().zip(offsets).map(|(a, b)| a - b).collect())
    }
}

impl Index<usize> for Point {
    type Output = i32;

    fn index(&self, dim: usize) -> &i32 {
        &self.0[dim]
    }
}

impl From<&[i32]> for Point {
    fn from(coords: &[i32]) -> Self {
        Self::new(coords)
    }
}

impl<const N: usize> From<[i32; N]> for Point {
    fn from(coords: [i32; N]) -> Self {
        Self::new(&coords)
    }
}

impl fmt::Debug for Point {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Point{:?}", self.0.as_slice())
    }
}

impl fmt::Display for Point {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(")?;
        for (i, c) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{c}")?;
        }
        write!(f, ")")
    }
}
