// crates/gl_physics/src/climate/ocean.rs

//! 海洋模型
//!
//! 提供海平面、冰架底部温度和冰架底部质量通量。
//!
//! ```text
//! T_shelf = T_melt - β_CC ρ_i g H
//! M_shelf = Q / (L ρ_i)          [m s-1]，正值为融化
//! ```

use std::fmt;

use gl_config::ClimateParams;
use gl_foundation::error::{GlError, GlResult};
use gl_foundation::field::Field;
use gl_foundation::vars::{upgrade, Vars, WeakField};

/// 海洋模型
pub trait OceanModel: Send + Sync + fmt::Debug {
    /// 名称
    fn name(&self) -> &'static str;

    /// 初始化
    fn init(&mut self, vars: &Vars) -> GlResult<()>;

    /// 更新到 [t, t + dt]
    fn update(&mut self, t: f64, dt: f64) -> GlResult<()>;

    /// 海平面高程 [m]
    fn sea_level_elevation(&self) -> f64;

    /// 冰架底部温度 [K]
    fn shelf_base_temperature(&self, result: &mut Field<f64>) -> GlResult<()>;

    /// 冰架底部质量通量 [m s-1]
    fn shelf_base_mass_flux(&self, result: &mut Field<f64>) -> GlResult<()>;

    /// 混杂冰背压比例
    fn melange_back_pressure_fraction(&self, result: &mut Field<f64>) -> GlResult<()> {
        result.set(0.0);
        Ok(())
    }
}

/// 常数海洋
#[derive(Debug)]
pub struct ConstantOcean {
    sea_level: f64,
    melting_point: f64,
    beta_cc_grad: f64,
    melt_rate: f64,
    thickness: Option<WeakField<f64>>,
}

impl ConstantOcean {
    /// 由参数创建
    pub fn new(params: &ClimateParams) -> Self {
        Self {
            sea_level: params.sea_level,
            melting_point: params.melting_point,
            beta_cc_grad: params.beta_cc * params.ice_density * params.gravity,
            melt_rate: params.sub_shelf_heat_flux / (params.latent_heat * params.ice_density),
            thickness: None,
        }
    }
}

impl OceanModel for ConstantOcean {
    fn name(&self) -> &'static str {
        "constant"
    }

    fn init(&mut self, vars: &Vars) -> GlResult<()> {
        self.thickness = Some(vars.require("land_ice_thickness", "ConstantOcean")?);
        Ok(())
    }

    fn update(&mut self, _t: f64, _dt: f64) -> GlResult<()> {
        Ok(())
    }

    fn sea_level_elevation(&self) -> f64 {
        self.sea_level
    }

    fn shelf_base_temperature(&self, result: &mut Field<f64>) -> GlResult<()> {
        let weak = self
            .thickness
            .as_ref()
            .ok_or_else(|| GlError::contract("ConstantOcean 尚未初始化"))?;
        let thickness = upgrade(weak, "land_ice_thickness", "ConstantOcean")?;
        let thickness = thickness.read();
        let grid = thickness.grid().clone();
        let h = thickness.view();
        let mut out = result.view_mut();
        for (i, j) in grid.points() {
            out[(i, j)] = self.melting_point - self.beta_cc_grad * h[(i, j)];
        }
        Ok(())
    }

    fn shelf_base_mass_flux(&self, result: &mut Field<f64>) -> GlResult<()> {
        result.set(self.melt_rate);
        Ok(())
    }
}

/// 海平面常数偏移修正
#[derive(Debug)]
pub struct DeltaSeaLevel {
    input: Box<dyn OceanModel>,
    offset: f64,
}

impl DeltaSeaLevel {
    /// 包装
    pub fn new(input: Box<dyn OceanModel>, offset: f64) -> Self {
        Self { input, offset }
    }
}

impl OceanModel for DeltaSeaLevel {
    fn name(&self) -> &'static str {
        "delta_SL"
    }

    fn init(&mut self, vars: &Vars) -> GlResult<()> {
        self.input.init(vars)
    }

    fn update(&mut self, t: f64, dt: f64) -> GlResult<()> {
        self.input.update(t, dt)
    }

    fn sea_level_elevation(&self) -> f64 {
        self.input.sea_level_elevation() + self.offset
    }

    fn shelf_base_temperature(&self, result: &mut Field<f64>) -> GlResult<()> {
        self.input.shelf_base_temperature(result)
    }

    fn shelf_base_mass_flux(&self, result: &mut Field<f64>) -> GlResult<()> {
        self.input.shelf_base_mass_flux(result)
    }

    fn melange_back_pressure_fraction(&self, result: &mut Field<f64>) -> GlResult<()> {
        self.input.melange_back_pressure_fraction(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gl_config::Config;
    use gl_foundation::comm::SerialComm;
    use gl_foundation::field::FieldMeta;
    use gl_foundation::grid::{Grid, GridParams};
    use std::sync::Arc;

    #[test]
    fn test_constant_ocean() {
        let grid = Arc::new(Grid::new(GridParams::new(2, 2, 1e3, 1e3), SerialComm::shared()).unwrap());
        let mut thk = Field::scalar(grid.clone(), FieldMeta::new("land_ice_thickness", "", "m"), 0).unwrap();
        thk.set(500.0);
        let mut vars = Vars::new();
        vars.add(thk).unwrap();

        let params = ClimateParams::from_config(&Config::default()).unwrap();
        let mut ocean = DeltaSeaLevel::new(Box::new(ConstantOcean::new(&params)), -3.0);
        ocean.init(&vars).unwrap();
        assert_eq!(ocean.sea_level_elevation(), -3.0);

        let mut out = Field::scalar(grid, FieldMeta::new("out", "", ""), 0).unwrap();
        ocean.shelf_base_temperature(&mut out).unwrap();
        let expected = 273.15 - 7.9e-8 * 910.0 * 9.81 * 500.0;
        assert!((out.view()[(1, 1)] - expected).abs() < 1e-12);

        ocean.shelf_base_mass_flux(&mut out).unwrap();
        assert!((out.view()[(0, 0)] - 0.5 / (3.34e5 * 910.0)).abs() < 1e-20);

        ocean.melange_back_pressure_fraction(&mut out).unwrap();
        assert_eq!(out.view()[(0, 1)], 0.0);
    }
}
