// crates/gl_physics/src/bedrock.rs

//! 基岩热层
//!
//! 每个水平单元下有一根等距的一维基岩柱，z_k = -Lbz + k·Δz，顶层 z = 0 为
//! 冰/岩界面。显式格式求解热传导：
//!
//! ```text
//! T_k^{n+1} = T_k^n + R (T_{k-1}^n - 2 T_k^n + T_{k+1}^n),   R = D Δt / Δz²
//! ```
//!
//! 稳定条件 R ≤ 1/2，即 Δt ≤ Δz² / (2D)。顶部为 Dirichlet 条件（`bedtoptemp`），
//! 底部用虚拟点 T_{-1} = T_1 + 2 G Δz / k 施加地热通量 G（`bheatflx`）。
//!
//! Mbz = 1 为最小模型：不分配温度柱，地热通量直接传给冰底。

use std::sync::Arc;

use gl_config::BedrockParams;
use gl_foundation::error::{GlError, GlResult};
use gl_foundation::field::{Field, FieldMeta};
use gl_foundation::grid::Grid;
use gl_foundation::vars::{upgrade, Vars, WeakField};
use rayon::prelude::*;
use tracing::{debug, info, warn};

use crate::archive::Archive;

/// 基岩温度变量名
pub const LITHO_TEMP: &str = "litho_temp";

/// 基岩热层状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BedrockState {
    /// 尚未 init
    Uninitialized,
    /// Mbz = 1，无温度柱
    Minimal,
    /// 温度柱已分配
    Ready,
}

/// 基岩热层
#[derive(Debug)]
pub struct BedrockThermalUnit {
    grid: Arc<Grid>,
    params: BedrockParams,
    mbz: usize,
    lbz: f64,
    temp: Option<Field<f64>>,
    bedtoptemp: Option<WeakField<f64>>,
    ghf: Option<WeakField<f64>>,
    /// 上一次更新的 (t, Δt)
    clock: Option<(f64, f64)>,
}

impl BedrockThermalUnit {
    /// 按参数分配
    ///
    /// 有输入归档时层数和厚度取自其中的 `litho_temp`（不存在则为最小模型），
    /// 忽略用户设置的 Mbz/Lbz；自举时 Mbz 与 Lbz 必须同时设置，除非 Mbz = 1。
    pub fn new(grid: Arc<Grid>, params: BedrockParams) -> GlResult<Self> {
        if params.mbz < 1.0 || params.mbz.fract() != 0.0 {
            return Err(GlError::invalid_config(
                "grid_Mbz",
                params.mbz.to_string(),
                "基岩层数必须是正整数",
            ));
        }
        let mut mbz = params.mbz as usize;
        let mut lbz = params.lbz;

        if let Some(path) = &params.input_file {
            if params.mbz_set || params.lbz_set {
                warn!("有输入文件 {}，忽略 -Mbz 和 -Lbz", path.display());
            }
            let archive = Archive::open(path)?;
            if archive.inq_var(LITHO_TEMP) {
                let levels = archive.levels(LITHO_TEMP)?;
                mbz = levels.len();
                lbz = levels.first().map_or(0.0, |z| -z);
            } else {
                mbz = 1;
                lbz = 0.0;
            }
        } else if params.mbz_set && mbz == 1 {
            if params.lbz_set {
                warn!("Mbz = 1，忽略 -Lbz");
            }
            lbz = 0.0;
        } else if params.mbz_set != params.lbz_set {
            return Err(GlError::config("基岩热层需要同时指定 -Mbz 和 -Lbz"));
        }

        if lbz <= 0.0 && mbz > 1 {
            return Err(GlError::invalid_config(
                "grid_Lbz",
                lbz.to_string(),
                "多于一层的基岩热层厚度必须为正",
            ));
        }

        let temp = if mbz > 1 {
            let dz = lbz / (mbz - 1) as f64;
            let mut z: Vec<f64> = (0..mbz).map(|k| -lbz + k as f64 * dz).collect();
            if let Some(top) = z.last_mut() {
                *top = 0.0;
            }
            let meta = FieldMeta::new(LITHO_TEMP, "lithosphere (bedrock) temperature", "K")
                .with_valid_min(0.0);
            Some(Field::column(Arc::clone(&grid), meta, z, 0)?)
        } else {
            None
        };

        Ok(Self {
            grid,
            params,
            mbz,
            lbz,
            temp,
            bedtoptemp: None,
            ghf: None,
            clock: None,
        })
    }

    /// 层数
    pub fn mbz(&self) -> usize {
        self.mbz
    }

    /// 厚度 [m]
    pub fn lbz(&self) -> f64 {
        self.lbz
    }

    /// 状态
    pub fn state(&self) -> BedrockState {
        match (&self.bedtoptemp, &self.temp) {
            (None, _) => BedrockState::Uninitialized,
            (Some(_), None) => BedrockState::Minimal,
            (Some(_), Some(_)) => BedrockState::Ready,
        }
    }

    /// 温度柱场，最小模型为 `None`
    pub fn temperature(&self) -> Option<&Field<f64>> {
        self.temp.as_ref()
    }

    /// 可写温度柱场
    pub fn temperature_mut(&mut self) -> Option<&mut Field<f64>> {
        self.temp.as_mut()
    }

    /// 垂向间距，最小模型为 0
    pub fn vertical_spacing(&self) -> f64 {
        if self.temp.is_some() {
            self.lbz / (self.mbz as f64 - 1.0)
        } else {
            0.0
        }
    }

    /// 稳定时间步上限 [s]，最小模型不限制
    pub fn max_timestep(&self) -> Option<f64> {
        self.temp.as_ref().map(|_| {
            let dz = self.vertical_spacing();
            dz * dz / (2.0 * self.params.diffusivity())
        })
    }

    fn resolve(&self) -> GlResult<(WeakField<f64>, WeakField<f64>)> {
        match (&self.bedtoptemp, &self.ghf) {
            (Some(top), Some(ghf)) => Ok((top.clone(), ghf.clone())),
            _ => Err(GlError::contract("基岩热层尚未 init")),
        }
    }

    /// 初始化
    ///
    /// 返回是否需要自举（温度柱未从归档读取）。
    pub fn init(&mut self, vars: &Vars) -> GlResult<bool> {
        let top = vars
            .get_weak::<f64>("bedtoptemp")
            .ok_or_else(|| GlError::invalid_input("基岩热层需要 bedtoptemp"))?;
        let ghf = vars
            .get_weak::<f64>("bheatflx")
            .ok_or_else(|| GlError::invalid_input("基岩热层需要 bheatflx"))?;
        self.bedtoptemp = Some(top);
        self.ghf = Some(ghf);
        self.clock = None;

        let root = self.grid.rank() == 0;
        if root {
            info!("初始化基岩热层: Mbz = {}, Lbz = {} m", self.mbz, self.lbz);
        }

        let Some(temp) = self.temp.as_mut() else {
            if root {
                info!("基岩最小模型: 地热通量直接作用于冰底");
            }
            return Ok(false);
        };

        let revision = temp.state_counter();
        if let Some(path) = &self.params.input_file {
            let archive = Archive::open(path)?;
            if archive.inq_var(LITHO_TEMP) {
                let n = archive.n_records(LITHO_TEMP)?;
                if n > 0 {
                    archive.read_column_variable(temp, n - 1)?;
                }
            }
        }
        Ok(temp.state_counter() == revision)
    }

    /// 由 bedtoptemp 和地热通量构造线性温度柱
    pub fn bootstrap(&mut self) -> GlResult<()> {
        if self.mbz < 2 {
            return Ok(());
        }
        let (top, ghf) = self.resolve()?;
        let top = upgrade(&top, "bedtoptemp", "BedrockThermalUnit")?;
        let ghf = upgrade(&ghf, "bheatflx", "BedrockThermalUnit")?;
        let dz = self.vertical_spacing();
        let k_b = self.params.conductivity;

        if self.grid.rank() == 0 {
            info!("自举基岩温度: 顶部取 bedtoptemp，按地热通量线性外推");
        }

        let top = top.read();
        let ghf = ghf.read();
        let (tv, gv) = (top.view(), ghf.view());
        let Some(temp) = self.temp.as_mut() else {
            return Ok(());
        };
        let mut view = temp.view_mut();
        view.owned_columns_mut()
            .into_par_iter()
            .for_each(|((i, j), column)| {
                let k0 = column.len() - 1;
                column[k0] = tv[(i, j)];
                for k in (0..k0).rev() {
                    column[k] = column[k + 1] + dz * gv[(i, j)] / k_b;
                }
            });
        Ok(())
    }

    /// 推进 [t, t + Δt]
    pub fn update(&mut self, t: f64, dt: f64) -> GlResult<()> {
        if self.temp.is_none() {
            return Ok(());
        }

        if let Some((t_prev, dt_prev)) = self.clock {
            if (t - t_prev).abs() < 1e-12 && (dt - dt_prev).abs() < 1e-12 {
                return Ok(());
            }
        }

        if dt < 0.0 {
            return Err(GlError::invalid_input(format!("基岩热层不接受负时间步 dt = {dt} s")));
        }

        if let Some((t_prev, dt_prev)) = self.clock {
            let end = t_prev + dt_prev;
            let contiguous = if end.abs() < 1.0 {
                (t - end).abs() < 1e-12
            } else {
                ((t - end) / end).abs() < 1e-12
            };
            if !contiguous {
                return Err(GlError::contract(format!(
                    "基岩热层的更新必须与上一次连续: 上次 t = {t_prev} s, dt = {dt_prev} s; 本次 t = {t} s, dt = {dt} s"
                )));
            }
        }

        if let Some(max_dt) = self.max_timestep() {
            if max_dt < dt {
                return Err(GlError::contract(format!(
                    "基岩热层时间步 dt = {dt} s 超过稳定上限 {max_dt} s"
                )));
            }
        }

        let (top, ghf) = self.resolve()?;
        let top = upgrade(&top, "bedtoptemp", "BedrockThermalUnit")?;
        let ghf = upgrade(&ghf, "bheatflx", "BedrockThermalUnit")?;

        self.clock = Some((t, dt));

        let dz = self.vertical_spacing();
        let k_b = self.params.conductivity;
        let r = self.params.diffusivity() * dt / (dz * dz);
        debug!("基岩热层: t = {t} s, dt = {dt} s, R = {r}");

        let top = top.read();
        let ghf = ghf.read();
        let (tv, gv) = (top.view(), ghf.view());
        let Some(temp) = self.temp.as_mut() else {
            return Ok(());
        };
        let mut view = temp.view_mut();
        view.owned_columns_mut()
            .into_par_iter()
            .for_each(|((i, j), column)| {
                let k0 = column.len() - 1;
                let surface = tv[(i, j)];
                column[k0] = surface;

                // 上一层的旧值，从底部虚拟点开始
                let mut below = column[1] + 2.0 * gv[(i, j)] * dz / k_b;
                for k in 0..k0 {
                    let old = column[k];
                    column[k] = old + r * (below - 2.0 * old + column[k + 1]);
                    below = old;
                }
                column[k0] = surface;
            });
        Ok(())
    }

    /// 冰/岩界面向上的热通量 G_0 = -k ∂T/∂z
    ///
    /// Mbz ≥ 3 用二阶单侧差分，Mbz = 2 用一阶差分，最小模型直接复制 `bheatflx`。
    pub fn upward_geothermal_flux(&self, result: &mut Field<f64>) -> GlResult<()> {
        let (_, ghf) = self.resolve()?;
        let Some(temp) = self.temp.as_ref() else {
            let ghf = upgrade(&ghf, "bheatflx", "BedrockThermalUnit")?;
            let ghf = ghf.read();
            return result.copy_from(&ghf);
        };

        let dz = self.vertical_spacing();
        let k_b = self.params.conductivity;
        let tv = temp.view();
        let mut out = result.view_mut();
        for (i, j) in self.grid.points() {
            let col = tv.column(i, j);
            let k0 = col.len() - 1;
            out[(i, j)] = if col.len() >= 3 {
                -k_b * (3.0 * col[k0] - 4.0 * col[k0 - 1] + col[k0 - 2]) / (2.0 * dz)
            } else {
                -k_b * (col[k0] - col[k0 - 1]) / dz
            };
        }
        Ok(())
    }

    /// 把温度柱写入归档（集合操作）
    pub fn write_variables(&self, archive: &mut Archive) -> GlResult<()> {
        match &self.temp {
            Some(temp) => archive.write_column_variable(temp, Some("zb")),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gl_foundation::comm::SerialComm;
    use gl_foundation::error::ErrorKind;
    use gl_foundation::grid::GridParams;

    fn params(mbz: f64, lbz: f64) -> BedrockParams {
        BedrockParams {
            density: 3300.0,
            specific_heat: 1000.0,
            conductivity: 3.0,
            mbz,
            lbz,
            mbz_set: true,
            lbz_set: true,
            input_file: None,
        }
    }

    fn setup(mbz: f64, lbz: f64) -> (BedrockThermalUnit, Vars) {
        let grid = Arc::new(Grid::new(GridParams::new(3, 3, 1e3, 1e3), SerialComm::shared()).unwrap());
        let mut vars = Vars::new();
        let mut top = Field::scalar(grid.clone(), FieldMeta::new("bedtoptemp", "", "K"), 0).unwrap();
        let mut ghf = Field::scalar(grid.clone(), FieldMeta::new("bheatflx", "", "W m-2"), 0).unwrap();
        top.set(270.0);
        ghf.set(0.05);
        vars.add(top).unwrap();
        vars.add(ghf).unwrap();
        let unit = BedrockThermalUnit::new(grid, params(mbz, lbz)).unwrap();
        (unit, vars)
    }

    #[test]
    fn test_max_timestep() {
        let (unit, _) = setup(21.0, 1000.0);
        assert_eq!(unit.vertical_spacing(), 50.0);
        let dt = unit.max_timestep().unwrap();
        let expected = 2500.0 / (2.0 * 3.0 / 3.3e6);
        assert!((dt - expected).abs() < 1e-6 * expected);
        assert!((dt - 1.375e9).abs() < 1e6);
    }

    #[test]
    fn test_allocation_rules() {
        let grid = Arc::new(Grid::new(GridParams::new(3, 3, 1e3, 1e3), SerialComm::shared()).unwrap());

        let mut p = params(11.0, 0.0);
        let err = BedrockThermalUnit::new(grid.clone(), p.clone()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);

        p.lbz_set = false;
        p.lbz = 1000.0;
        let err = BedrockThermalUnit::new(grid.clone(), p.clone()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);

        // Mbz = 1 时忽略 Lbz
        let unit = BedrockThermalUnit::new(grid.clone(), params(1.0, 500.0)).unwrap();
        assert_eq!(unit.lbz(), 0.0);
        assert!(unit.max_timestep().is_none());

        let mut defaults = params(1.0, 0.0);
        defaults.mbz_set = false;
        defaults.lbz_set = false;
        assert!(BedrockThermalUnit::new(grid, defaults).unwrap().temperature().is_none());
    }

    #[test]
    fn test_bootstrap_and_step() {
        let (mut unit, vars) = setup(21.0, 1000.0);
        assert_eq!(unit.state(), BedrockState::Uninitialized);
        assert!(unit.init(&vars).unwrap());
        assert_eq!(unit.state(), BedrockState::Ready);
        unit.bootstrap().unwrap();

        let step = 50.0 * 0.05 / 3.0;
        {
            let col = unit.temperature().unwrap().view().column(1, 1).to_vec();
            for (k, t) in col.iter().enumerate() {
                assert!((t - (270.0 + (20 - k) as f64 * step)).abs() < 1e-9);
            }
        }

        // 线性剖面满足底部通量条件，一步后保持不变
        unit.update(0.0, 1e8).unwrap();
        let col = unit.temperature().unwrap().view().column(1, 1).to_vec();
        assert_eq!(col[20], 270.0);
        assert!((col[0] - (270.0 + 20.0 * step)).abs() < 1e-9);

        let mut flux = Field::scalar(Arc::clone(&unit.grid), FieldMeta::new("hfgeoubed", "", "W m-2"), 0)
            .unwrap();
        unit.upward_geothermal_flux(&mut flux).unwrap();
        assert!((flux.view()[(0, 0)] - 0.05).abs() < 1e-9);
    }

    #[test]
    fn test_step_relaxes_perturbation() {
        let (mut unit, vars) = setup(21.0, 1000.0);
        unit.init(&vars).unwrap();
        unit.bootstrap().unwrap();
        let before = unit.temperature().unwrap().view().column(0, 0)[0];
        {
            let top = vars.get::<f64>("bedtoptemp").unwrap();
            top.write().set(260.0);
        }
        unit.update(0.0, 1e9).unwrap();
        let col = unit.temperature().unwrap().view().column(0, 0).to_vec();
        assert_eq!(col[20], 260.0);
        assert!(col[19] < 270.0 + 50.0 * 0.05 / 3.0);
        assert!((col[0] - before).abs() < 1e-9);
    }

    #[test]
    fn test_idempotent_repeat() {
        let (mut unit, vars) = setup(21.0, 1000.0);
        unit.init(&vars).unwrap();
        unit.bootstrap().unwrap();
        unit.update(0.0, 1e8).unwrap();
        let counter = unit.temperature().unwrap().state_counter();
        unit.update(0.0, 1e8).unwrap();
        assert_eq!(unit.temperature().unwrap().state_counter(), counter);
    }

    #[test]
    fn test_contiguity_and_cfl() {
        let (mut unit, vars) = setup(21.0, 1000.0);
        unit.init(&vars).unwrap();
        unit.bootstrap().unwrap();
        unit.update(0.0, 1e8).unwrap();

        let err = unit.update(5e8, 1e8).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ContractViolation);

        let max_dt = unit.max_timestep().unwrap();
        let err = unit.update(1e8, max_dt * 1.01).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ContractViolation);

        let err = unit.update(1e8, -1.0).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);

        unit.update(1e8, 1e8).unwrap();
    }

    #[test]
    fn test_minimal_model() {
        let (mut unit, vars) = setup(1.0, 0.0);
        assert!(!unit.init(&vars).unwrap());
        assert_eq!(unit.state(), BedrockState::Minimal);
        unit.bootstrap().unwrap();
        unit.update(0.0, 1e12).unwrap();

        let mut flux = Field::scalar(Arc::clone(&unit.grid), FieldMeta::new("hfgeoubed", "", "W m-2"), 0)
            .unwrap();
        unit.upward_geothermal_flux(&mut flux).unwrap();
        assert_eq!(flux.view()[(2, 2)], 0.05);
    }

    #[test]
    fn test_missing_inputs() {
        let (mut unit, _) = setup(21.0, 1000.0);
        let err = unit.init(&Vars::new()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
    }

    #[test]
    fn test_read_from_archive() {
        let (mut unit, vars) = setup(5.0, 400.0);
        unit.init(&vars).unwrap();
        unit.bootstrap().unwrap();

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("restart.json");
        let mut archive = Archive::new();
        unit.write_variables(&mut archive).unwrap();
        archive.save(&path).unwrap();

        let grid = Arc::clone(&unit.grid);
        let mut p = params(21.0, 1000.0);
        p.input_file = Some(path);
        let mut restarted = BedrockThermalUnit::new(grid, p).unwrap();
        assert_eq!(restarted.mbz(), 5);
        assert_eq!(restarted.lbz(), 400.0);
        assert!(!restarted.init(&vars).unwrap());
        assert_eq!(
            restarted.temperature().unwrap().view().column(2, 1),
            unit.temperature().unwrap().view().column(2, 1)
        );
    }
}
