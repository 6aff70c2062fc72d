use halo_poisson::data::partition::{OwnedRegion, block_range};
use halo_poisson::topology::{Direction, ProcessGrid};
use proptest::prelude::*;

proptest! {
    #[test]
    fn block_ranges_tile_the_axis(n in 1usize..500, parts in 1usize..40) {
        prop_assume!(parts <= n);
        let mut next = 0;
        let mut lens = Vec::new();
        for i in 0..parts {
            let r = block_range(n, parts, i);
            prop_assert_eq!(r.start, next);
            prop_assert!(!r.is_empty());
            next = r.end;
            lens.push(r.len());
        }
        prop_assert_eq!(next, n);
        let (min, max) = (lens.iter().min().unwrap(), lens.iter().max().unwrap());
        prop_assert!(max - min <= 1);
    }

    #[test]
    fn regions_cover_every_cell_once(
        nx in 1usize..40,
        ny in 1usize..40,
        px in 1usize..6,
        py in 1usize..6,
    ) {
        prop_assume!(px <= nx && py <= ny);
        let mut owners = vec![0u32; nx * ny];
        for x in 0..px {
            for y in 0..py {
                let region = OwnedRegion::for_worker([nx, ny], [px, py], [x, y]).unwrap();
                for gx in region.offset[0] + 1..=region.offset[0] + region.extent[0] {
                    for gy in region.offset[1] + 1..=region.offset[1] + region.extent[1] {
                        prop_assert!(region.contains([gx, gy]));
                        owners[(gx - 1) * ny + (gy - 1)] += 1;
                    }
                }
            }
        }
        prop_assert!(owners.iter().all(|&c| c == 1));
    }

    #[test]
    fn neighbour_relation_is_symmetric(px in 1usize..7, py in 1usize..7) {
        let size = px * py;
        let grids: Vec<_> = (0..size)
            .map(|r| ProcessGrid::new([px, py], r, size).unwrap())
            .collect();
        for g in &grids {
            for (dir, n) in g.neighbors().iter() {
                prop_assert_eq!(grids[n].neighbor(dir.opposite()), Some(g.rank()));
            }
            prop_assert_eq!(g.neighbor(Direction::Top).is_some(), g.coord()[1] > 0);
            prop_assert_eq!(g.neighbor(Direction::Right).is_some(), g.coord()[0] + 1 < px);
        }
    }
}

#[test]
fn too_few_cells_for_the_process_grid_is_rejected() {
    assert!(OwnedRegion::for_worker([3, 10], [4, 1], [0, 0]).is_err());
}
