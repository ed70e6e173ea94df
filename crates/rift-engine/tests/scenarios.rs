//! End-to-end scenarios driving full worker clusters: heat diffusion
//! across a 4-way split, agent hand-off across the diagonal, multi-hop
//! delivery in the 22-partition reference tree, and foreign point reads.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rift_comm::{CellDirectory, Communicator, LocalCluster};
use rift_engine::{Agenda, EngineConfig, LocalAgenda, SimState};
use rift_field::{HaloField, WritePolicy};
use rift_geom::Point;
use rift_grid::Cell;
use rift_test_utils::{reference_partition, square_world};
use rift_transport::{Envelope, FieldIndex, Payload, Transporter};
use std::rc::Rc;

fn make_state(
    comm: rift_comm::LocalComm,
    side: i32,
    workers: usize,
    aoi: [i32; 2],
    directory: CellDirectory,
) -> SimState {
    let config = EngineConfig::new(square_world(side), workers, &aoi, true);
    let comm: Rc<dyn Communicator> = Rc::new(comm);
    SimState::new(&config, comm, directory, Box::new(LocalAgenda::new()))
        .expect("valid configuration")
}

/// One Jacobi step over the owned region: each cell becomes the mean of
/// its eight neighbors, read from the tick-start view (owned plus ghost
/// ring).
fn diffuse_eight_neighbor(field: &mut HaloField<f64>) {
    let owned = field.owned_rect().clone();
    let halo = field.halo_rect().clone();
    let cols = halo.size()[1] as usize;
    let at = |x: i32, y: i32| ((x - halo.ul[0]) as usize) * cols + (y - halo.ul[1]) as usize;

    let grid = field.storage();
    let mut next = Vec::with_capacity(owned.area() as usize);
    for x in owned.ul[0]..owned.br[0] {
        for y in owned.ul[1]..owned.br[1] {
            let mut sum = 0.0;
            for (dx, dy) in [
                (-1, -1),
                (-1, 0),
                (-1, 1),
                (0, -1),
                (0, 1),
                (1, -1),
                (1, 0),
                (1, 1),
            ] {
                sum += *grid.get(at(x + dx, y + dy));
            }
            next.push(sum / 8.0);
        }
    }

    let grid = field.storage_mut();
    let mut k = 0;
    for x in owned.ul[0]..owned.br[0] {
        for y in owned.ul[1]..owned.br[1] {
            grid.set(at(x, y), next[k]);
            k += 1;
        }
    }
}

#[test]
fn heat_stays_inside_its_quadrant_until_diffusion_reaches_the_boundary() {
    let directory = CellDirectory::new();
    let results = LocalCluster::run(4, |comm| {
        let mut state = make_state(comm, 1000, 4, [5, 5], directory.clone());
        let field = state.create_field(0.0f64, WritePolicy::Strict).unwrap();

        let source = Point::from([250, 250]);
        let far_probe = Point::from([750, 750]);
        let mut far_at_tick_5 = None;

        for tick in 0..10 {
            state.pre_step().unwrap();

            {
                let mut f = field.borrow_mut();
                if f.in_owned(&source) {
                    let heat = f.get(&source).unwrap();
                    f.set(&source, heat + 100.0).unwrap();
                }
                diffuse_eight_neighbor(&mut f);
            }

            if tick == 4 {
                let f = field.borrow();
                if f.in_owned(&far_probe) {
                    far_at_tick_5 = Some(f.get(&far_probe).unwrap());
                }
            }
            state.revise_time(f64::INFINITY).unwrap();
        }

        let f = field.borrow();
        let near = if f.in_owned(&Point::from([255, 250])) {
            Some(f.get(&Point::from([255, 250])).unwrap())
        } else {
            None
        };
        let far = if f.in_owned(&far_probe) {
            Some(f.get(&far_probe).unwrap())
        } else {
            None
        };
        let boundary = if f.in_owned(&Point::from([499, 250])) {
            Some(f.get(&Point::from([499, 250])).unwrap())
        } else {
            None
        };
        (far_at_tick_5, near, far, boundary)
    });

    let mut saw_far_owner = false;
    for (far5, near, far, boundary) in results {
        if let Some(v) = far5 {
            // The source sits 500 cells away; after five ticks the
            // diffusion front has moved five cells, so the far quadrant
            // is still cold.
            assert_eq!(v, 0.0, "far probe warmed too early");
        }
        if let Some(v) = near {
            assert!(v > 0.0, "cell five steps from the source must have warmed");
        }
        if let Some(v) = far {
            saw_far_owner = true;
            assert_eq!(v, 0.0, "far probe must still be cold after ten ticks");
        }
        if let Some(v) = boundary {
            // 249 cells from the source: unreached in ten ticks.
            assert_eq!(v, 0.0);
        }
    }
    assert!(saw_far_owner, "some worker must own the far probe");
}

#[test]
fn heat_crosses_a_partition_boundary_through_the_ghost_ring() {
    let directory = CellDirectory::new();
    let results = LocalCluster::run(4, |comm| {
        let mut state = make_state(comm, 100, 4, [2, 2], directory.clone());
        let field = state.create_field(0.0f64, WritePolicy::Strict).unwrap();

        // Two cells from the quadrant boundary at (50, 50).
        let source = Point::from([48, 48]);
        for _ in 0..8 {
            state.pre_step().unwrap();
            let mut f = field.borrow_mut();
            if f.in_owned(&source) {
                let heat = f.get(&source).unwrap();
                f.set(&source, heat + 100.0).unwrap();
            }
            diffuse_eight_neighbor(&mut f);
        }
        // One more exchange so freshly diffused boundary cells are
        // visible in the neighbors' ghost rings.
        state.pre_step().unwrap();

        let f = field.borrow();
        let probe = Point::from([52, 52]);
        if f.in_owned(&probe) {
            Some(f.get(&probe).unwrap())
        } else {
            None
        }
    });

    let across: Vec<f64> = results.into_iter().flatten().collect();
    assert_eq!(across.len(), 1, "exactly one worker owns the diagonal probe");
    assert!(
        across[0] > 0.0,
        "heat must have crossed the diagonal boundary, got {}",
        across[0]
    );
}

#[test]
fn agent_hand_off_across_the_diagonal_schedules_on_the_new_owner() {
    let directory = CellDirectory::new();
    let results = LocalCluster::run(4, |comm| {
        let mut state = make_state(comm, 1000, 4, [5, 5], directory.clone());
        let field = state
            .create_field::<Option<Vec<u8>>>(None, WritePolicy::Migrate)
            .unwrap();
        let index = field.borrow().index().unwrap();

        let from = Point::from([499, 499]);
        let to = Point::from([501, 501]);
        let agent_cell: Option<Vec<u8>> = Some(vec![7]);

        if state.rank() == 0 {
            field.borrow_mut().set(&from, agent_cell.clone()).unwrap();
            // The agent steps diagonally out of rank 0's quadrant: it
            // leaves the field here and rides an envelope to the owner
            // of its new position.
            field.borrow_mut().clear(&from).unwrap();
            let destination = state
                .partition()
                .borrow()
                .owner_of(&to)
                .unwrap();
            let mut bytes = Vec::new();
            agent_cell.encode(&mut bytes);
            state
                .migrate(Envelope {
                    destination,
                    field: Some(index),
                    location: to.clone(),
                    payload: Payload::Agent {
                        agent: bytes,
                        ordering: 0,
                        time: -1.0,
                    },
                })
                .unwrap();
        }

        // One coordination cycle delivers and schedules the agent.
        state.pre_step().unwrap();

        let f = field.borrow();
        let holds_agent = f.in_owned(&to) && f.get(&to).unwrap() == Some(vec![7]);
        let old_cell_empty = !f.in_owned(&from) || f.get(&from).unwrap().is_none();
        (state.rank(), holds_agent, old_cell_empty, state.agenda().next_time())
    });

    for (rank, holds_agent, old_cell_empty, next_time) in results {
        assert!(old_cell_empty, "rank {rank} still sees the agent's old cell");
        if rank == 3 {
            assert!(holds_agent, "rank 3 must hold the agent at (501, 501)");
            assert_eq!(next_time, 1.0, "the agent must be scheduled for the next step");
        } else {
            assert!(!holds_agent);
            assert!(next_time.is_infinite(), "rank {rank} must schedule nothing");
        }
    }
}

#[test]
fn migration_between_distant_leaves_of_the_reference_tree_delivers_once() {
    let results = LocalCluster::run(22, |comm| {
        let partition = reference_partition(comm.rank(), false, &[1, 1]);
        let src = (0..22)
            .find(|&r| partition.leaf_of_rank(r) == Some(5))
            .unwrap();
        let dst = (0..22)
            .find(|&r| partition.leaf_of_rank(r) == Some(17))
            .unwrap();
        assert!(
            !partition.neighbor_ranks(src).unwrap().contains(&dst),
            "the reference leaves 5 and 17 must not be adjacent"
        );
        let target = {
            let rect = partition.rect_of_rank(dst).unwrap();
            Point::from([rect.ul[0] + 1, rect.ul[1] + 1])
        };

        let me = comm.rank();
        let comm: Rc<dyn Communicator> = Rc::new(comm);
        let mut transporter = Transporter::new(comm, &partition).unwrap();
        if me == src {
            transporter
                .migrate(Envelope {
                    destination: dst,
                    field: Some(FieldIndex(0)),
                    location: target,
                    payload: Payload::Agent {
                        agent: vec![0xA5],
                        ordering: 0,
                        time: -1.0,
                    },
                })
                .unwrap();
        }

        // The reference tree is three levels deep; a handful of syncs
        // bounds any route through its neighbor graph.
        let mut arrived = Vec::new();
        for _ in 0..8 {
            transporter.sync().unwrap();
            arrived.extend(transporter.take_inbox());
        }
        (me == dst, arrived.len())
    });

    let mut total = 0;
    for (is_dst, count) in results {
        if is_dst {
            assert_eq!(count, 1, "destination must receive the agent exactly once");
        } else {
            assert_eq!(count, 0, "in-transit workers must not keep the agent");
        }
        total += count;
    }
    assert_eq!(total, 1);
}

#[test]
fn reads_beyond_the_halo_resolve_through_the_owner_snapshot() {
    let directory = CellDirectory::new();
    let results = LocalCluster::run(4, |comm| {
        let mut state = make_state(comm, 40, 4, [2, 2], directory.clone());
        let field = state.create_field(0i64, WritePolicy::Strict).unwrap();

        // Every worker stamps its owned cells.
        {
            let mut f = field.borrow_mut();
            for p in f.owned_rect().clone().points() {
                f.set(&p, (p[0] * 100 + p[1]) as i64).unwrap();
            }
        }
        // The synchronization phase publishes the snapshots.
        state.pre_step().unwrap();

        // (25, 25) is five cells inside the far quadrant: outside every
        // other worker's halo, so those readers take the registry path.
        let probe = Point::from([25, 25]);
        let f = field.borrow();
        let value = f.get(&probe).unwrap();
        (f.in_owned_or_halo(&probe), value)
    });

    let mut remote_readers = 0;
    for &(local, value) in &results {
        assert_eq!(value, 25 * 100 + 25);
        if !local {
            remote_readers += 1;
        }
    }
    assert_eq!(
        remote_readers, 3,
        "the three foreign quadrants must read through the registry"
    );
}

#[test]
fn random_walks_conserve_the_agent_population() {
    const TICKS: u64 = 6;

    let directory = CellDirectory::new();
    let results = LocalCluster::run(4, |comm| {
        let mut state = make_state(comm, 100, 4, [2, 2], directory.clone());
        let field = state
            .create_field::<Option<Vec<u8>>>(None, WritePolicy::Migrate)
            .unwrap();
        let index = field.borrow().index().unwrap();

        // One agent per quadrant, seeded two cells from its high corner
        // so the walk can spill into neighboring quadrants.
        let me = state.rank();
        let start = {
            let rect = field.borrow().owned_rect().clone();
            Point::from([rect.br[0] - 2, rect.br[1] - 2])
        };
        field
            .borrow_mut()
            .set(&start, Some(vec![me as u8]))
            .unwrap();

        for tick in 0..TICKS {
            state.pre_step().unwrap();

            // Collect this worker's agents from its owned cells.
            let mut moves = Vec::new();
            {
                let f = field.borrow();
                for p in f.owned_rect().clone().points() {
                    if let Some(tag) = f.get(&p).unwrap() {
                        moves.push((p, tag));
                    }
                }
            }
            for (p, tag) in moves {
                // A deterministic per-agent step, reproducible on any
                // worker that might own it.
                let mut rng = ChaCha8Rng::seed_from_u64(tag[0] as u64 * 1000 + tick);
                let step = Point::from([rng.gen_range(-1..=1), rng.gen_range(-1..=1)]);
                let to = field.borrow().wrap_point(&p.add(&step));

                let mut f = field.borrow_mut();
                f.clear(&p).unwrap();
                if f.in_owned(&to) {
                    f.set(&to, Some(tag)).unwrap();
                } else {
                    drop(f);
                    let destination = state.partition().borrow().owner_of(&to).unwrap();
                    let mut bytes = Vec::new();
                    Some(tag).encode(&mut bytes);
                    state
                        .migrate(Envelope {
                            destination,
                            field: Some(index),
                            location: to,
                            payload: Payload::Object(bytes),
                        })
                        .unwrap();
                }
            }
            state.revise_time(f64::INFINITY).unwrap();
        }
        // Flush the last tick's migrations.
        state.pre_step().unwrap();

        let f = field.borrow();
        let mut tags = Vec::new();
        for p in f.owned_rect().clone().points() {
            if let Some(tag) = f.get(&p).unwrap() {
                tags.push(tag[0]);
            }
        }
        tags
    });

    let mut all: Vec<u8> = results.into_iter().flatten().collect();
    all.sort_unstable();
    assert_eq!(all, vec![0, 1, 2, 3], "every agent survives, none duplicates");
}

#[test]
fn the_shared_clock_is_the_minimum_pending_time() {
    let directory = CellDirectory::new();
    let results = LocalCluster::run(4, |comm| {
        let mut state = make_state(comm, 40, 4, [1, 1], directory.clone());
        // Each worker schedules something at a rank-dependent time; the
        // cluster must settle on the earliest.
        let local = 10.0 + state.rank() as f64 * 3.0;
        state.agenda_mut().schedule_once(local, 0, Vec::new());
        let agreed = state.revise_time(state.agenda().next_time()).unwrap();
        (local, agreed, state.clock())
    });

    for (local, agreed, clock) in results {
        assert_eq!(agreed, 10.0);
        assert_eq!(clock, 10.0);
        assert!(agreed <= local, "the agreed clock may never pass a worker");
    }
}
