// crates/gl_foundation/tests/ghost_exchange.rs

//! 2×2 worker 组上的幽灵层交换与自然顺序收集

use gl_foundation::prelude::*;
use std::sync::Arc;

const MX: usize = 7;
const MY: usize = 5;

fn value(i: i32, j: i32) -> f64 {
    (100 * j + i) as f64
}

fn make_field(comm: Arc<dyn Communicator>, width: usize) -> Field<f64> {
    let params = GridParams::new(MX, MY, 3e3, 2e3).with_procs(2, 2);
    let grid = Arc::new(Grid::new(params, comm).unwrap());
    let mut f = Field::<f64>::scalar(grid.clone(), FieldMeta::new("f", "", ""), width).unwrap();
    {
        let mut v = f.view_mut();
        for (i, j) in grid.points() {
            v[(i, j)] = value(i, j);
        }
    }
    f
}

#[test]
fn test_ghosts_match_neighbours() {
    let ok = ThreadComm::run(4, |comm| {
        let mut f = make_field(comm, 2);
        f.update_ghosts().unwrap();

        let grid = f.grid().clone();
        let v = f.view();
        grid.points_with_ghosts(2).all(|(i, j)| {
            let (ci, cj) = grid.wrap_or_clamp(i, j);
            v[(i, j)] == value(ci, cj)
        })
    });
    assert!(ok.iter().all(|&b| b));
}

#[test]
fn test_gather_natural_order() {
    let gathered = ThreadComm::run(4, |comm| make_field(comm, 1).gather_natural(0).unwrap());

    let expected: Vec<f64> = (0..MY as i32)
        .flat_map(|j| (0..MX as i32).map(move |i| value(i, j)))
        .collect();
    assert_eq!(gathered[0].as_ref(), Some(&expected));
    assert!(gathered[1..].iter().all(Option::is_none));
}

#[test]
fn test_scatter_then_reduce() {
    let sums = ThreadComm::run(4, |comm| {
        let mut f = make_field(comm.clone(), 1);
        let global = (comm.rank() == 0).then(|| vec![1.0; MX * MY]);
        f.scatter_natural(0, global.as_deref()).unwrap();
        f.global_sum()
    });
    assert!(sums.iter().all(|&s| (s - (MX * MY) as f64).abs() < 1e-12));
}
