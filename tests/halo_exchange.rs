use halo_poisson::algs::communicator::{Communicator, ThreadComm};
use halo_poisson::algs::halo::HaloExchange;
use halo_poisson::data::partition::OwnedRegion;
use halo_poisson::data::tile::Tile;
use halo_poisson::topology::{Direction, ProcessGrid};

const SENTINEL: f64 = -1.0;

fn field(g: [usize; 2]) -> f64 {
    (g[0] * 1000 + g[1]) as f64
}

/// Fill every interior cell with `field(global)` and the halo with a sentinel,
/// exchange once, and return each worker's tile and process grid.
fn exchange_on(shape: [usize; 2], grid_size: [usize; 2]) -> Vec<(ProcessGrid, Tile)> {
    let size = shape[0] * shape[1];
    let world = ThreadComm::world(size);
    std::thread::scope(|s| {
        let handles: Vec<_> = world
            .iter()
            .map(|comm| {
                s.spawn(move || {
                    let topo = ProcessGrid::new(shape, comm.rank(), comm.size()).unwrap();
                    let region = OwnedRegion::for_worker(grid_size, shape, topo.coord()).unwrap();
                    let mut tile = Tile::zeros(&region).unwrap();
                    for v in tile.as_mut_slice() {
                        *v = SENTINEL;
                    }
                    for (x, y) in tile.interior() {
                        let g = tile.to_global(x, y);
                        tile.set(x, y, field(g));
                    }
                    HaloExchange::new(&topo).exchange(&mut tile, comm).unwrap();
                    (topo, tile)
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    })
}

fn check(shape: [usize; 2], grid_size: [usize; 2]) {
    for (topo, tile) in exchange_on(shape, grid_size) {
        let [dx, dy] = tile.dim();
        let sides = [
            (Direction::Top, (1..dx - 1).map(|x| (x, 0)).collect::<Vec<_>>()),
            (Direction::Bottom, (1..dx - 1).map(|x| (x, dy - 1)).collect()),
            (Direction::Left, (1..dy - 1).map(|y| (0, y)).collect()),
            (Direction::Right, (1..dy - 1).map(|y| (dx - 1, y)).collect()),
        ];
        for (dir, cells) in sides {
            for (x, y) in cells {
                let expected = if topo.neighbor(dir).is_some() {
                    field(tile.to_global(x, y))
                } else {
                    SENTINEL
                };
                assert_eq!(tile.get(x, y), expected, "rank {} {dir:?} ({x}, {y})", topo.rank());
            }
        }
        for (x, y) in [(0, 0), (0, dy - 1), (dx - 1, 0), (dx - 1, dy - 1)] {
            assert_eq!(tile.get(x, y), SENTINEL, "corner ({x}, {y}) was written");
        }
        for (x, y) in tile.interior() {
            assert_eq!(tile.get(x, y), field(tile.to_global(x, y)));
        }
    }
}

#[test]
fn two_by_two_halo_matches_neighbour_interior() {
    check([2, 2], [6, 5]);
}

#[test]
fn three_by_two_halo_matches_neighbour_interior() {
    check([3, 2], [7, 4]);
}

#[test]
fn single_column_of_workers() {
    check([1, 4], [3, 9]);
}

#[test]
fn repeated_exchanges_are_idempotent() {
    let shape = [2, 2];
    let world = ThreadComm::world(4);
    let tiles: Vec<(Tile, Tile)> = std::thread::scope(|s| {
        let handles: Vec<_> = world
            .iter()
            .map(|comm| {
                s.spawn(move || {
                    let topo = ProcessGrid::new(shape, comm.rank(), 4).unwrap();
                    let region = OwnedRegion::for_worker([4, 4], shape, topo.coord()).unwrap();
                    let mut tile = Tile::zeros(&region).unwrap();
                    for (x, y) in tile.interior() {
                        tile.set(x, y, field(tile.to_global(x, y)));
                    }
                    let mut halo = HaloExchange::new(&topo);
                    halo.exchange(&mut tile, comm).unwrap();
                    let once = tile.clone();
                    halo.exchange(&mut tile, comm).unwrap();
                    (once, tile)
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });
    for (once, twice) in tiles {
        assert_eq!(once, twice);
    }
}
