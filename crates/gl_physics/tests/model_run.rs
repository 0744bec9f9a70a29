// crates/gl_physics/tests/model_run.rs

//! 模型驱动测试
//! 多步运行、多 worker 一致性以及归档重启

use std::path::Path;
use std::sync::Arc;

use gl_config::{Config, SECONDS_PER_YEAR};
use gl_foundation::prelude::*;
use gl_physics::archive::Archive;
use gl_physics::bedrock::LITHO_TEMP;
use gl_physics::model::{grid_params_from_config, IceModel, StepReport};

fn config(extra: &[&str]) -> Config {
    let mut config = Config::default();
    config
        .apply_overrides([
            "-Mx", "13", "-My", "11", "-Lx", "60e3", "-Ly", "50e3", "-Mz", "5", "-Lz", "2000",
            "-Mbz", "6", "-Lbz", "500", "-mu_sliding", "1e-10",
        ])
        .unwrap();
    config.apply_overrides(extra.iter().copied()).unwrap();
    config
}

fn fill(model: &IceModel, name: &str, f: impl Fn(f64, f64) -> f64) {
    let shared = model.vars().get::<f64>(name).unwrap();
    let mut field = shared.write();
    let grid = model.grid().clone();
    let mut view = field.view_mut();
    for (i, j) in grid.points() {
        view[(i, j)] = f(grid.x()[i as usize], grid.y()[j as usize]);
    }
}

/// 陆地冰穹加上西侧的海域
fn dome(model: &IceModel) {
    fill(model, "bedrock_altitude", |x, _| if x < -40e3 { -800.0 } else { 300.0 });
    fill(model, "land_ice_thickness", |x, y| {
        let r2 = ((x - 10e3).powi(2) + y * y) / (40e3 * 40e3);
        (1800.0 * (1.0 - r2)).max(0.0)
    });
    model.set_uniform_ice_temperature(272.0).unwrap();
}

fn run(workers: usize, config: &Config, steps: usize) -> Vec<Vec<StepReport>> {
    ThreadComm::run(workers, |comm| {
        let grid = Arc::new(Grid::new(grid_params_from_config(config).unwrap(), comm).unwrap());
        let mut model = IceModel::new(grid, config).unwrap();
        dome(&model);
        model.init().unwrap();
        (0..steps)
            .map(|_| model.step(10.0 * SECONDS_PER_YEAR).unwrap())
            .collect()
    })
}

fn close(a: f64, b: f64) -> bool {
    (a - b).abs() <= 1e-12 * a.abs().max(b.abs()).max(1e-30)
}

/// 多步运行：温底冰穹滑动，冰体积随积累增加
#[test]
fn test_dome_run() {
    let reports = run(1, &config(&[]), 3).remove(0);
    assert_eq!(reports.len(), 3);
    for pair in reports.windows(2) {
        assert!(pair[1].time > pair[0].time);
        assert!(pair[1].ice_volume > pair[0].ice_volume);
    }
    assert!(reports[0].max_sliding_speed > 0.0);
    assert!((reports[2].time - 30.0 * SECONDS_PER_YEAR).abs() < 1.0);
}

/// 诊断量与 worker 数量无关
#[test]
fn test_reports_independent_of_worker_count() {
    let config = config(&[]);
    let serial = run(1, &config, 2).remove(0);
    for workers in [2, 4] {
        for reports in run(workers, &config, 2) {
            for (a, b) in reports.iter().zip(&serial) {
                assert_eq!(a.dt, b.dt);
                assert_eq!(a.icebergs_removed, b.icebergs_removed);
                assert!(close(a.ice_volume, b.ice_volume), "{} vs {}", a.ice_volume, b.ice_volume);
                assert!(close(a.max_sliding_speed, b.max_sliding_speed));
            }
        }
    }
}

fn write_and_restart(workers: usize, dir: &Path) {
    let output = dir.join(format!("state_{workers}.json"));
    let base = config(&[]);
    ThreadComm::run(workers, |comm| {
        let grid = Arc::new(Grid::new(grid_params_from_config(&base).unwrap(), comm).unwrap());
        let mut model = IceModel::new(grid, &base).unwrap();
        dome(&model);
        model.init().unwrap();
        model.step(5.0 * SECONDS_PER_YEAR).unwrap();
        model.write_archive(&output).unwrap();
    });

    let archive = Archive::open(&output).unwrap();
    for name in ["land_ice_thickness", "mask", "enthalpy", "tauc", "tillphi", LITHO_TEMP] {
        assert!(archive.inq_var(name), "归档缺少 {name}");
    }
    assert_eq!(archive.levels("enthalpy").unwrap().len(), 5);
    assert_eq!(archive.levels(LITHO_TEMP).unwrap().len(), 6);
    let saved_thk = archive.variable("land_ice_thickness").unwrap().records[0].clone();
    let saved_litho = archive.variable(LITHO_TEMP).unwrap().records[0].clone();

    let restart = config(&["-i", output.to_str().unwrap()]);
    ThreadComm::run(workers, |comm| {
        let grid = Arc::new(Grid::new(grid_params_from_config(&restart).unwrap(), comm).unwrap());
        let mut model = IceModel::new(grid, &restart).unwrap();
        model.init().unwrap();
        assert!((model.time() - 5.0 * SECONDS_PER_YEAR).abs() < 1e-3);

        let thk = model.vars().get::<f64>("land_ice_thickness").unwrap();
        assert_eq!(thk.read().all_gather_natural().unwrap(), saved_thk);
        let litho = model.bedrock().temperature().unwrap();
        assert_eq!(litho.all_gather_natural().unwrap(), saved_litho);

        model.step(5.0 * SECONDS_PER_YEAR).unwrap();
    });
}

/// 归档写出后可作为输入重启，基岩温度柱不再自举
#[test]
fn test_archive_restart() {
    let dir = tempfile::tempdir().unwrap();
    write_and_restart(1, dir.path());
    write_and_restart(2, dir.path());
}

/// 关闭冰山移除后浮冰保留
#[test]
fn test_kill_icebergs_switch() {
    // 海平面高于冰面，整个冰穹漂浮
    let mut kept = config(&["-no_kill_icebergs"]);
    kept.set_double("sea_level", 2000.0).unwrap();
    let reports = run(1, &kept, 1).remove(0);
    assert_eq!(reports[0].icebergs_removed, 0);
    assert!(reports[0].ice_volume > 0.0);

    let mut removed = config(&[]);
    removed.set_double("sea_level", 2000.0).unwrap();
    let reports = run(1, &removed, 1).remove(0);
    assert!(reports[0].icebergs_removed > 0);
    assert_eq!(reports[0].ice_volume, 0.0);
}
