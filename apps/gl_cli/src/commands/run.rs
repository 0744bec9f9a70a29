// apps/gl_cli/src/commands/run.rs

//! 模型运行命令
//!
//! 每个 worker 持有一个子区域，所有 worker 执行相同的步进序列。
//! 额外的模型参数以 `-name value` 形式跟在 `--` 之后：
//!
//! ```text
//! gl_cli run --workers 4 --steps 20 -- -Mx 61 -My 61 -gradient mahaffy
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use anyhow::{bail, Result};
use clap::Args;
use gl_config::{Config, SECONDS_PER_YEAR};
use gl_foundation::comm::{Communicator, ThreadComm};
use gl_foundation::error::{GlError, GlResult};
use gl_foundation::grid::Grid;
use gl_physics::{grid_params_from_config, IceModel, StepReport};
use tracing::info;

use crate::scenario::Scenario;

/// 运行参数
#[derive(Args)]
pub struct RunArgs {
    /// JSON 配置文件路径
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// 输出归档路径（覆盖 output_file）
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// x 方向格点数（覆盖 grid_Mx）
    #[arg(long)]
    pub mx: Option<usize>,

    /// y 方向格点数（覆盖 grid_My）
    #[arg(long)]
    pub my: Option<usize>,

    /// worker 数量
    #[arg(short, long, default_value_t = 1)]
    pub workers: usize,

    /// 时间步数
    #[arg(short = 'n', long, default_value_t = 10)]
    pub steps: usize,

    /// 最大时间步长 [年]
    #[arg(long, default_value_t = 10.0)]
    pub dt_years: f64,

    /// 初始场景（指定输入归档时忽略）
    #[arg(long, value_enum, default_value_t = Scenario::Dome)]
    pub scenario: Scenario,

    /// 以 JSON 打印逐步诊断量
    #[arg(long)]
    pub json: bool,

    /// 模型参数覆盖，如 `-Mx 61 -no_kill_icebergs`
    #[arg(last = true, allow_hyphen_values = true)]
    pub overrides: Vec<String>,
}

/// 执行运行命令
pub fn execute(args: RunArgs) -> Result<()> {
    info!("=== Glacier 模型启动 ===");

    let mut config = super::load_config(args.config.as_ref(), &args.overrides)?;
    if let Some(mx) = args.mx {
        config.set_double("grid_Mx", mx as f64)?;
    }
    if let Some(my) = args.my {
        config.set_double("grid_My", my as f64)?;
    }
    if let Some(output) = &args.output {
        config.set_string("output_file", output.to_string_lossy())?;
    }
    config.validate()?;
    if args.workers == 0 {
        bail!("worker 数量至少为 1");
    }
    if args.dt_years.is_nan() || args.dt_years <= 0.0 {
        bail!("时间步长必须为正: {}", args.dt_years);
    }

    let output = config.get_string("output_file")?;
    let output = (!output.is_empty()).then(|| PathBuf::from(output));
    let from_input = !config.get_string("input_file")?.is_empty();

    info!(
        "网格: {} x {}, worker: {}, 步数: {}, 时间步长: {} 年",
        config.get_integer("grid_Mx")?,
        config.get_integer("grid_My")?,
        args.workers,
        args.steps,
        args.dt_years
    );

    let start = Instant::now();
    let results = ThreadComm::run(args.workers, |comm| {
        run_worker(comm, &config, &args, from_input, output.as_deref())
    });

    let reports = match pick_result(results) {
        Ok(reports) => reports,
        Err(e) => bail!("运行失败 [{}]: {}", e.kind(), e),
    };
    let elapsed = start.elapsed();

    if args.json {
        println!("{}", serde_json::to_string_pretty(&reports)?);
    }

    info!("=== 模型运行完成 ===");
    if let Some(last) = reports.last() {
        info!("模型时间: {:.2} 年", last.time / SECONDS_PER_YEAR);
        info!("冰体积: {:.6e} m3", last.ice_volume);
    }
    let removed: u64 = reports.iter().map(|r| r.icebergs_removed).sum();
    info!("移除冰山单元: {}", removed);
    info!("计算时间: {:.2} s", elapsed.as_secs_f64());
    if let Some(path) = &output {
        info!("输出归档: {}", path.display());
    }

    Ok(())
}

fn run_worker(
    comm: Arc<dyn Communicator>,
    config: &Config,
    args: &RunArgs,
    from_input: bool,
    output: Option<&Path>,
) -> GlResult<Vec<StepReport>> {
    let grid = Arc::new(Grid::new(grid_params_from_config(config)?, comm)?);
    let root = grid.rank() == 0;
    let mut model = IceModel::new(grid, config)?;
    if !from_input {
        args.scenario.apply(&model)?;
    }
    model.init()?;

    let max_dt = args.dt_years * SECONDS_PER_YEAR;
    let mut reports = Vec::with_capacity(args.steps);
    for _ in 0..args.steps {
        let report = model.step(max_dt)?;
        if root {
            info!(
                "t={:.2} 年: dt={:.3} 年, 冰体积={:.6e} m3, 最大滑动速度={:.3} m/年, 冰山={}",
                report.time / SECONDS_PER_YEAR,
                report.dt / SECONDS_PER_YEAR,
                report.ice_volume,
                report.max_sliding_speed * SECONDS_PER_YEAR,
                report.icebergs_removed
            );
        }
        reports.push(report);
    }

    if let Some(path) = output {
        model.write_archive(path)?;
    }
    Ok(reports)
}

/// 取 0 号 worker 的结果；出错时优先返回发起失败的 worker 的错误
fn pick_result(results: Vec<GlResult<Vec<StepReport>>>) -> GlResult<Vec<StepReport>> {
    let mut first = None;
    let mut errors = Vec::new();
    for result in results {
        match result {
            Ok(reports) => {
                if first.is_none() {
                    first = Some(reports);
                }
            }
            Err(e) => errors.push(e),
        }
    }
    if let Some(pos) = errors
        .iter()
        .position(|e| !matches!(e, GlError::RemoteFailure { .. }))
    {
        return Err(errors.swap_remove(pos));
    }
    if let Some(e) = errors.pop() {
        return Err(e);
    }
    first.ok_or_else(|| GlError::internal("没有 worker 返回结果"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(overrides: &[&str]) -> RunArgs {
        RunArgs {
            config: None,
            output: None,
            mx: Some(21),
            my: Some(11),
            workers: 2,
            steps: 2,
            dt_years: 1.0,
            scenario: Scenario::Shelf,
            json: false,
            overrides: overrides.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn test_run_writes_archive() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.json");
        let mut a = args(&["-Lx", "100e3", "-Ly", "50e3"]);
        a.output = Some(path.clone());
        execute(a).unwrap();
        assert!(path.exists());
    }

    #[test]
    fn test_run_rejects_bad_gradient() {
        assert!(execute(args(&["-gradient", "upwind"])).is_err());
    }

    #[test]
    fn test_pick_result_prefers_origin_error() {
        let results = vec![
            Err(GlError::RemoteFailure { ranks: vec![1] }),
            Err(GlError::invalid_input("dt")),
        ];
        let err = pick_result(results).unwrap_err();
        assert_eq!(err.kind(), gl_foundation::error::ErrorKind::InvalidInput);
    }
}
