//! Per-neighbor send/receive exchange parameters.

use rift_geom::{shifted_copies, HyperRect};

/// The sub-rectangles exchanged with one neighbor during a halo sync.
///
/// `send` lies inside the owned rectangle, `recv` inside the halo
/// rectangle. The lists are sorted in opposite directions: my ascending
/// i-th send rectangle is the neighbor's descending i-th receive
/// rectangle, so packing in list order on both sides lines the buffers
/// up without any per-rectangle header. Under toroidal wrap one neighbor
/// can contribute several overlaps, one per world-shifted image; the
/// opposite sort directions pair those too, because a send rectangle at
/// my high edge lands at the neighbor's low edge.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NeighborLink {
    /// The neighbor's world rank.
    pub rank: usize,
    /// Sub-rectangles of the owned rectangle to pack and send, ascending.
    pub send: Vec<HyperRect>,
    /// Sub-rectangles of the halo rectangle to fill from the neighbor's
    /// buffer, descending.
    pub recv: Vec<HyperRect>,
}

impl NeighborLink {
    /// Derive the exchange parameters from a neighbor's rectangle.
    pub fn derive(
        rank: usize,
        owned: &HyperRect,
        halo: &HyperRect,
        neighbor_rect: &HyperRect,
        aoi: &[i32],
        world: &HyperRect,
        toroidal: bool,
    ) -> Self {
        let mut send = overlaps(owned, &neighbor_rect.resize(aoi), world, toroidal);
        let mut recv = overlaps(halo, neighbor_rect, world, toroidal);
        debug_assert_eq!(send.len(), recv.len(), "send/recv overlap counts differ");
        send.sort();
        recv.sort();
        recv.reverse();
        Self { rank, send, recv }
    }

    /// Cells covered by the send list.
    pub fn send_area(&self) -> i64 {
        self.send.iter().map(HyperRect::area).sum()
    }

    /// Cells covered by the receive list.
    pub fn recv_area(&self) -> i64 {
        self.recv.iter().map(HyperRect::area).sum()
    }
}

/// Intersections of `a` with every toroidal image of `b` (just `b`
/// itself when the world does not wrap).
fn overlaps(a: &HyperRect, b: &HyperRect, world: &HyperRect, toroidal: bool) -> Vec<HyperRect> {
    if toroidal {
        shifted_copies(b, world)
            .iter()
            .filter_map(|image| a.intersection(image))
            .collect()
    } else {
        a.intersection(b).into_iter().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rift_geom::Point;

    fn rect(id: i32, ul: [i32; 2], br: [i32; 2]) -> HyperRect {
        HyperRect::new(id, Point::from(ul), Point::from(br))
    }

    #[test]
    fn interior_neighbors_exchange_one_strip() {
        let world = rect(-1, [0, 0], [100, 100]);
        let owned = rect(1, [0, 0], [50, 100]);
        let halo = owned.resize(&[2, 2]);
        let neighbor = rect(2, [50, 0], [100, 100]);

        let link = NeighborLink::derive(1, &owned, &halo, &neighbor, &[2, 2], &world, false);
        assert_eq!(link.send, vec![rect(1, [48, 0], [50, 100])]);
        assert_eq!(link.recv, vec![rect(1, [50, 0], [52, 100])]);
        assert_eq!(link.send_area(), link.recv_area());
    }

    #[test]
    fn toroidal_pair_on_a_strip_world_has_two_overlaps_each_way() {
        // Two half-world strips on a wrapping 10-wide ring in x.
        let world = rect(-1, [0, 0], [10, 4]);
        let owned = rect(1, [0, 0], [5, 4]);
        let halo = owned.resize(&[1, 0]);
        let neighbor = rect(2, [5, 0], [10, 4]);

        let link = NeighborLink::derive(1, &owned, &halo, &neighbor, &[1, 0], &world, true);
        assert_eq!(link.send.len(), 2);
        assert_eq!(link.recv.len(), 2);
        // Sends: my west edge (wraps to the neighbor's east halo) and my
        // east edge (their west halo).
        assert_eq!(link.send[0], rect(1, [0, 0], [1, 4]));
        assert_eq!(link.send[1], rect(1, [4, 0], [5, 4]));
        // Recvs descending: my east ghost column first, then my west.
        assert_eq!(link.recv[0], rect(1, [5, 0], [6, 4]));
        assert_eq!(link.recv[1], rect(1, [-1, 0], [0, 4]));
    }

    #[test]
    fn opposite_sort_orders_pair_the_wrapped_strips() {
        // For the strip world above, my ascending send list must match
        // the neighbor's descending recv list cell-for-cell through the
        // wrap.
        let world = rect(-1, [0, 0], [10, 4]);
        let a = rect(1, [0, 0], [5, 4]);
        let b = rect(2, [5, 0], [10, 4]);
        let aoi = [1, 0];

        let a_link = NeighborLink::derive(2, &a, &a.resize(&aoi), &b, &aoi, &world, true);
        let b_link = NeighborLink::derive(1, &b, &b.resize(&aoi), &a, &aoi, &world, true);

        assert_eq!(a_link.send.len(), b_link.recv.len());
        let world_size = world.size();
        for (send, recv) in a_link.send.iter().zip(&b_link.recv) {
            // The paired rectangles are world-shift images of each other.
            assert_eq!(send.size(), recv.size());
            for d in 0..2 {
                let delta = recv.ul[d] - send.ul[d];
                assert_eq!(
                    delta % world_size[d],
                    0,
                    "paired rects differ by a non-world shift in dim {d}"
                );
            }
        }
    }

    #[test]
    fn disjoint_rects_produce_no_link_overlap() {
        let world = rect(-1, [0, 0], [100, 100]);
        let owned = rect(1, [0, 0], [20, 20]);
        let halo = owned.resize(&[1, 1]);
        let far = rect(9, [60, 60], [80, 80]);
        let link = NeighborLink::derive(9, &owned, &halo, &far, &[1, 1], &world, false);
        assert!(link.send.is_empty());
        assert!(link.recv.is_empty());
    }
}
