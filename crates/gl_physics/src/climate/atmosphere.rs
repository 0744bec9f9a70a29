// crates/gl_physics/src/climate/atmosphere.rs

//! 大气模型
//!
//! - [`GivenAtmosphere`]: 常数气温和降水
//! - [`FaustoAtmosphere`]: Fausto et al. (2009) 格陵兰气温参数化加年周期
//! - [`DeltaT`]: 在任一大气模型的气温上叠加常数偏移
//!
//! 年周期：
//!
//! ```text
//! T(t) = T_ma + (T_mj - T_ma) cos(2π/yr · (t mod yr - july_day · 86400))
//! ```
//!
//! 快照取区间中点 t + dt/2。

use std::f64::consts::PI;
use std::fmt;
use std::sync::Arc;

use gl_config::{ClimateParams, FaustoParams, SECONDS_PER_YEAR};
use gl_foundation::error::{GlError, GlResult};
use gl_foundation::field::{Field, FieldMeta};
use gl_foundation::grid::Grid;
use gl_foundation::vars::{upgrade, Vars, WeakField};
use tracing::info;

use super::add_constant;

/// 每天的秒数
const SECONDS_PER_DAY: f64 = 8.64e4;

/// 大气模型
pub trait AtmosphereModel: Send + Sync + fmt::Debug {
    /// 名称
    fn name(&self) -> &'static str;

    /// 取得输入场
    fn init(&mut self, vars: &Vars) -> GlResult<()>;

    /// 更新到 [t, t + dt]
    fn update(&mut self, t: f64, dt: f64) -> GlResult<()>;

    /// 平均降水率（冰当量）[m s-1]
    fn mean_precipitation(&self, result: &mut Field<f64>) -> GlResult<()>;

    /// 年均近地面气温 [K]
    fn mean_annual_temp(&self, result: &mut Field<f64>) -> GlResult<()>;

    /// 区间中点的气温 [K]
    fn temp_snapshot(&self, result: &mut Field<f64>) -> GlResult<()>;

    /// 单点气温时间序列
    fn temp_time_series(&self, i: i32, j: i32, ts: &[f64]) -> GlResult<Vec<f64>>;
}

// ============================================================================
// 常数大气
// ============================================================================

/// 常数大气
#[derive(Debug, Clone)]
pub struct GivenAtmosphere {
    air_temp: f64,
    precipitation: f64,
}

impl GivenAtmosphere {
    /// 由参数创建
    pub fn new(params: &ClimateParams) -> Self {
        Self {
            air_temp: params.given_air_temp,
            precipitation: params.given_precipitation,
        }
    }
}

impl AtmosphereModel for GivenAtmosphere {
    fn name(&self) -> &'static str {
        "given"
    }

    fn init(&mut self, _vars: &Vars) -> GlResult<()> {
        Ok(())
    }

    fn update(&mut self, _t: f64, _dt: f64) -> GlResult<()> {
        Ok(())
    }

    fn mean_precipitation(&self, result: &mut Field<f64>) -> GlResult<()> {
        result.set(self.precipitation);
        Ok(())
    }

    fn mean_annual_temp(&self, result: &mut Field<f64>) -> GlResult<()> {
        result.set(self.air_temp);
        Ok(())
    }

    fn temp_snapshot(&self, result: &mut Field<f64>) -> GlResult<()> {
        result.set(self.air_temp);
        Ok(())
    }

    fn temp_time_series(&self, _i: i32, _j: i32, ts: &[f64]) -> GlResult<Vec<f64>> {
        Ok(vec![self.air_temp; ts.len()])
    }
}

// ============================================================================
// Fausto 参数化
// ============================================================================

const FAUSTO: &str = "FaustoAtmosphere";

#[derive(Debug)]
struct FaustoInputs {
    surface: WeakField<f64>,
    latitude: WeakField<f64>,
    longitude: WeakField<f64>,
    precipitation: Option<WeakField<f64>>,
}

/// Fausto 年周期气温参数化
///
/// ```text
/// T_ma = d_ma + γ_ma h + c_ma lat + κ_ma (-lon)
/// T_mj = d_mj + γ_mj h + c_mj lat + κ_mj (-lon)
/// ```
#[derive(Debug)]
pub struct FaustoAtmosphere {
    grid: Arc<Grid>,
    coefficients: FaustoParams,
    july_day: f64,
    default_precipitation: f64,
    temp_ma: Field<f64>,
    temp_mj: Field<f64>,
    clock: Option<(f64, f64)>,
    inputs: Option<FaustoInputs>,
}

impl FaustoAtmosphere {
    /// 创建
    pub fn new(grid: Arc<Grid>, params: &ClimateParams) -> GlResult<Self> {
        let temp_ma = Field::scalar(
            Arc::clone(&grid),
            FieldMeta::new("air_temp_mean_annual", "mean annual near-surface air temperature", "K"),
            0,
        )?;
        let temp_mj = Field::scalar(
            Arc::clone(&grid),
            FieldMeta::new("air_temp_mean_july", "mean July near-surface air temperature", "K"),
            0,
        )?;
        Ok(Self {
            grid,
            coefficients: params.fausto,
            july_day: params.july_day,
            default_precipitation: params.given_precipitation,
            temp_ma,
            temp_mj,
            clock: None,
            inputs: None,
        })
    }

    fn inputs(&self) -> GlResult<&FaustoInputs> {
        self.inputs
            .as_ref()
            .ok_or_else(|| GlError::contract("FaustoAtmosphere 尚未初始化"))
    }

    fn time(&self) -> GlResult<(f64, f64)> {
        self.clock
            .ok_or_else(|| GlError::contract("FaustoAtmosphere 尚未更新"))
    }

    #[inline]
    fn cycle(&self, ma: f64, mj: f64, t: f64) -> f64 {
        let radpersec = 2.0 * PI / SECONDS_PER_YEAR;
        let july = SECONDS_PER_DAY * self.july_day;
        let t_sec = t.rem_euclid(SECONDS_PER_YEAR);
        ma + (mj - ma) * (radpersec * (t_sec - july)).cos()
    }
}

impl AtmosphereModel for FaustoAtmosphere {
    fn name(&self) -> &'static str {
        "fausto"
    }

    fn init(&mut self, vars: &Vars) -> GlResult<()> {
        if self.grid.rank() == 0 {
            info!("初始化 Fausto et al. (2009) 气温参数化");
        }
        self.inputs = Some(FaustoInputs {
            surface: vars.require("surface_altitude", FAUSTO)?,
            latitude: vars.require("latitude", FAUSTO)?,
            longitude: vars.require("longitude", FAUSTO)?,
            precipitation: vars.get_weak("precipitation"),
        });
        self.clock = None;
        Ok(())
    }

    fn update(&mut self, t: f64, dt: f64) -> GlResult<()> {
        if let Some((t_prev, dt_prev)) = self.clock {
            if (t - t_prev).abs() < 1e-12 && (dt - dt_prev).abs() < 1e-12 {
                return Ok(());
            }
        }
        let inputs = self.inputs()?;
        let surface = upgrade(&inputs.surface, "surface_altitude", FAUSTO)?;
        let latitude = upgrade(&inputs.latitude, "latitude", FAUSTO)?;
        let longitude = upgrade(&inputs.longitude, "longitude", FAUSTO)?;
        self.clock = Some((t, dt));

        let c = self.coefficients;
        let (surface, latitude, longitude) = (surface.read(), latitude.read(), longitude.read());
        let (h, lat, lon) = (surface.view(), latitude.view(), longitude.view());
        let mut ma = self.temp_ma.view_mut();
        let mut mj = self.temp_mj.view_mut();
        for (i, j) in self.grid.points() {
            let (hv, latv, lonv) = (h[(i, j)], lat[(i, j)], lon[(i, j)]);
            ma[(i, j)] = c.d_ma + c.gamma_ma * hv + c.c_ma * latv + c.kappa_ma * (-lonv);
            mj[(i, j)] = c.d_mj + c.gamma_mj * hv + c.c_mj * latv + c.kappa_mj * (-lonv);
        }
        Ok(())
    }

    fn mean_precipitation(&self, result: &mut Field<f64>) -> GlResult<()> {
        match &self.inputs()?.precipitation {
            Some(weak) => {
                let precipitation = upgrade(weak, "precipitation", FAUSTO)?;
                let precipitation = precipitation.read();
                result.copy_from(&precipitation)
            }
            None => {
                result.set(self.default_precipitation);
                Ok(())
            }
        }
    }

    fn mean_annual_temp(&self, result: &mut Field<f64>) -> GlResult<()> {
        result.copy_from(&self.temp_ma)
    }

    fn temp_snapshot(&self, result: &mut Field<f64>) -> GlResult<()> {
        let (t, dt) = self.time()?;
        let midpoint = t + 0.5 * dt;
        let (ma, mj) = (self.temp_ma.view(), self.temp_mj.view());
        let mut out = result.view_mut();
        for (i, j) in self.grid.points() {
            out[(i, j)] = self.cycle(ma[(i, j)], mj[(i, j)], midpoint);
        }
        Ok(())
    }

    fn temp_time_series(&self, i: i32, j: i32, ts: &[f64]) -> GlResult<Vec<f64>> {
        self.time()?;
        if !self.grid.patch().contains(i, j) {
            return Err(GlError::invalid_input(format!(
                "点 ({i}, {j}) 不属于本 worker 的分块"
            )));
        }
        let (ma, mj) = (self.temp_ma.view()[(i, j)], self.temp_mj.view()[(i, j)]);
        Ok(ts.iter().map(|&t| self.cycle(ma, mj, t)).collect())
    }
}

// ============================================================================
// 气温偏移
// ============================================================================

/// 气温常数偏移修正
#[derive(Debug)]
pub struct DeltaT {
    input: Box<dyn AtmosphereModel>,
    offset: f64,
}

impl DeltaT {
    /// 包装
    pub fn new(input: Box<dyn AtmosphereModel>, offset: f64) -> Self {
        Self { input, offset }
    }
}

impl AtmosphereModel for DeltaT {
    fn name(&self) -> &'static str {
        "delta_T"
    }

    fn init(&mut self, vars: &Vars) -> GlResult<()> {
        self.input.init(vars)
    }

    fn update(&mut self, t: f64, dt: f64) -> GlResult<()> {
        self.input.update(t, dt)
    }

    fn mean_precipitation(&self, result: &mut Field<f64>) -> GlResult<()> {
        self.input.mean_precipitation(result)
    }

    fn mean_annual_temp(&self, result: &mut Field<f64>) -> GlResult<()> {
        self.input.mean_annual_temp(result)?;
        add_constant(result, self.offset);
        Ok(())
    }

    fn temp_snapshot(&self, result: &mut Field<f64>) -> GlResult<()> {
        self.input.temp_snapshot(result)?;
        add_constant(result, self.offset);
        Ok(())
    }

    fn temp_time_series(&self, i: i32, j: i32, ts: &[f64]) -> GlResult<Vec<f64>> {
        let mut values = self.input.temp_time_series(i, j, ts)?;
        values.iter_mut().for_each(|v| *v += self.offset);
        Ok(values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gl_config::Config;
    use gl_foundation::comm::SerialComm;
    use gl_foundation::error::ErrorKind;
    use gl_foundation::grid::GridParams;

    fn setup() -> (Arc<Grid>, Vars, ClimateParams) {
        let grid = Arc::new(Grid::new(GridParams::new(3, 3, 1e3, 1e3), SerialComm::shared()).unwrap());
        let mut vars = Vars::new();
        for (name, value) in [("surface_altitude", 1500.0), ("latitude", 70.0), ("longitude", -40.0)] {
            let mut f = Field::scalar(grid.clone(), FieldMeta::new(name, name, ""), 0).unwrap();
            f.set(value);
            vars.add(f).unwrap();
        }
        let params = ClimateParams::from_config(&Config::default()).unwrap();
        (grid, vars, params)
    }

    fn out(grid: &Arc<Grid>) -> Field<f64> {
        Field::scalar(grid.clone(), FieldMeta::new("out", "", "K"), 0).unwrap()
    }

    #[test]
    fn test_fausto_mean_annual() {
        let (grid, vars, params) = setup();
        let mut atm = FaustoAtmosphere::new(grid.clone(), &params).unwrap();
        atm.init(&vars).unwrap();
        atm.update(0.0, SECONDS_PER_YEAR).unwrap();

        let mut result = out(&grid);
        atm.mean_annual_temp(&mut result).unwrap();
        let c = params.fausto;
        let expected = c.d_ma + c.gamma_ma * 1500.0 + c.c_ma * 70.0 + c.kappa_ma * 40.0;
        assert!((result.view()[(1, 1)] - expected).abs() < 1e-12);
    }

    #[test]
    fn test_yearly_cycle() {
        let (grid, vars, params) = setup();
        let mut atm = FaustoAtmosphere::new(grid.clone(), &params).unwrap();
        atm.init(&vars).unwrap();
        atm.update(0.0, 1.0).unwrap();

        let c = params.fausto;
        let ma = c.d_ma + c.gamma_ma * 1500.0 + c.c_ma * 70.0 + c.kappa_ma * 40.0;
        let mj = c.d_mj + c.gamma_mj * 1500.0 + c.c_mj * 70.0 + c.kappa_mj * 40.0;

        let july = params.july_day * SECONDS_PER_DAY;
        let half_year = 0.5 * SECONDS_PER_YEAR;
        let series = atm
            .temp_time_series(1, 1, &[july, july + half_year, july + 3.0 * SECONDS_PER_YEAR])
            .unwrap();
        assert!((series[0] - mj).abs() < 1e-9);
        assert!((series[1] - (2.0 * ma - mj)).abs() < 1e-9);
        assert!((series[2] - mj).abs() < 1e-9);

        // 快照取区间中点
        atm.update(july - 10.0, 20.0).unwrap();
        let mut result = out(&grid);
        atm.temp_snapshot(&mut result).unwrap();
        assert!((result.view()[(0, 2)] - mj).abs() < 1e-9);
    }

    #[test]
    fn test_fausto_requires_latitude() {
        let (grid, mut vars, params) = setup();
        vars.remove("latitude");
        let mut atm = FaustoAtmosphere::new(grid, &params).unwrap();
        assert_eq!(atm.init(&vars).unwrap_err().kind(), ErrorKind::InvariantViolation);
    }

    #[test]
    fn test_delta_t() {
        let (grid, vars, params) = setup();
        let mut atm = DeltaT::new(Box::new(GivenAtmosphere::new(&params)), -5.0);
        atm.init(&vars).unwrap();
        atm.update(0.0, 1.0).unwrap();
        let mut result = out(&grid);
        atm.mean_annual_temp(&mut result).unwrap();
        assert_eq!(result.view()[(2, 2)], params.given_air_temp - 5.0);
        assert_eq!(
            atm.temp_time_series(0, 0, &[0.0, 1.0]).unwrap(),
            vec![params.given_air_temp - 5.0; 2]
        );
        atm.mean_precipitation(&mut result).unwrap();
        assert_eq!(result.view()[(0, 0)], params.given_precipitation);
    }
}
