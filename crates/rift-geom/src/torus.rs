//! Toroidal coordinate arithmetic and world-shift enumeration.

use crate::point::{Axes, Point};
use crate::rect::HyperRect;

/// Reduce a single axis value into `[0, len)`.
pub fn wrap(x: i32, len: i32) -> i32 {
    debug_assert!(len > 0);
    ((x % len) + len) % len
}

/// Reduce a point into the world rectangle along every axis.
pub fn wrap_point(p: &Point, world: &HyperRect) -> Point {
    let size = world.size();
    let coords: Vec<i32> = (0..p.ndim())
        .map(|d| world.ul[d] + wrap(p[d] - world.ul[d], size[d]))
        .collect();
    Point::new(&coords)
}

/// Shorter-arc difference `x1 - x2` on a ring of length `len`.
///
/// When the straight difference already spans at most half the ring it is
/// returned as-is; otherwise the wrapped difference is folded onto the
/// shorter arc.
pub fn diff_axis(x1: i32, x2: i32, len: i32) -> i32 {
    if (x1 - x2).abs() <= len / 2 {
        return x1 - x2;
    }
    let dx = wrap(x1, len) - wrap(x2, len);
    if 2 * dx > len {
        dx - len
    } else if 2 * dx < -len {
        dx + len
    } else {
        dx
    }
}

/// The non-zero offset vectors of `{-1, 0, 1}^ndim`, in deterministic
/// row-major order. There are `3^ndim - 1` of them.
pub fn layer(ndim: usize) -> Vec<Axes> {
    let total = 3usize.pow(ndim as u32);
    let mut out = Vec::with_capacity(total - 1);
    for mut code in 0..total {
        let mut offsets = Axes::from_elem(0, ndim);
        for d in (0..ndim).rev() {
            offsets[d] = (code % 3) as i32 - 1;
            code /= 3;
        }
        if offsets.iter().any(|&o| o != 0) {
            out.push(offsets);
        }
    }
    out
}

/// All toroidal images of `rect`: the rectangle itself followed by its
/// `3^ndim - 1` world-sized translates.
///
/// Non-toroidal callers use only the first element.
pub fn shifted_copies(rect: &HyperRect, world: &HyperRect) -> Vec<HyperRect> {
    let size = world.size();
    let mut copies = Vec::with_capacity(3usize.pow(rect.ndim() as u32));
    copies.push(rect.clone());
    for offsets in layer(rect.ndim()) {
        let scaled: Vec<i32> = offsets
            .iter()
            .zip(size.iter())
            .map(|(&o, &s)| o * s)
            .collect();
        copies.push(rect.shift(&scaled));
    }
    copies
}
