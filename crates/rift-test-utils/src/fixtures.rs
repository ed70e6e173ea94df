//! The classical 22-partition reference decomposition and small world
//! builders.

use rift_geom::{HyperRect, Point};
use rift_partition::{Mutation, Partition, QuadTree};

/// A square world `[0, side)^2` with the world id.
pub fn square_world(side: i32) -> HyperRect {
    HyperRect::new(-1, Point::from([0, 0]), Point::from([side, side]))
}

/// Split points producing the classical 22-leaf tree over a 100x100
/// world: a uniform 4-way split, one split per quadrant, then two
/// uneven refinements in the first quadrant.
pub fn reference_split_points() -> [Point; 7] {
    [
        Point::from([50, 50]),
        Point::from([25, 25]),
        Point::from([25, 75]),
        Point::from([75, 25]),
        Point::from([75, 75]),
        Point::from([35, 15]),
        Point::from([40, 35]),
    ]
}

/// The 22-leaf reference tree.
pub fn reference_tree() -> QuadTree {
    let mut tree = QuadTree::new(square_world(100), 22).expect("22 is admissible");
    tree.split_many(&reference_split_points())
        .expect("reference split points are interior");
    tree
}

/// A 22-worker partition replica built from the reference splits.
pub fn reference_partition(my_rank: usize, toroidal: bool, aoi: &[i32]) -> Partition {
    let mut partition = Partition::new(square_world(100), 22, my_rank, toroidal, aoi)
        .expect("22 is admissible");
    for p in reference_split_points() {
        partition
            .apply(Mutation::Split(p))
            .expect("reference split points are interior");
    }
    partition
}

/// Known neighbor sets in the reference tree for a halo of one cell,
/// `(node id, sorted neighbor ids)`.
pub fn reference_neighbor_table() -> Vec<(i32, Vec<i32>)> {
    vec![
        (22, vec![5, 6, 21, 23, 24, 25]),
        (24, vec![13, 14, 21, 22, 23, 25, 27]),
        (13, vec![14, 15, 16, 23, 24, 27]),
        (15, vec![13, 14, 16]),
        (20, vec![17, 18, 19]),
        (10, vec![9, 11, 12]),
        (5, vec![6, 21, 22, 25]),
        (6, vec![5, 9, 11, 22, 25, 26]),
        (26, vec![6, 9, 11, 25, 27, 28]),
        (11, vec![6, 9, 10, 12, 14, 17, 18, 26, 28]),
        (17, vec![11, 12, 14, 16, 18, 19, 20, 28]),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reference_tree_has_22_leaves() {
        let tree = reference_tree();
        assert_eq!(tree.leaf_ids().len(), 22);
        let total: i64 = tree
            .leaf_ids()
            .iter()
            .map(|&id| tree.rect(id).unwrap().area())
            .sum();
        assert_eq!(total, 100 * 100);
    }

    #[test]
    fn reference_partition_assigns_every_rank() {
        let p = reference_partition(0, false, &[1, 1]);
        for rank in 0..22 {
            assert!(p.rect_of_rank(rank).is_some(), "rank {rank} has no leaf");
        }
    }
}
