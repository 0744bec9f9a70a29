// crates/gl_physics/src/climate/surface.rs

//! 冰面模型
//!
//! 提供冰面质量通量（冰当量，m/s）和冰面温度。

use std::fmt;

use gl_config::ClimateParams;
use gl_foundation::error::GlResult;
use gl_foundation::field::Field;
use gl_foundation::vars::Vars;

use super::atmosphere::AtmosphereModel;

/// 冰面模型
pub trait SurfaceModel: Send + Sync + fmt::Debug {
    /// 名称
    fn name(&self) -> &'static str;

    /// 初始化
    fn init(&mut self, vars: &Vars) -> GlResult<()>;

    /// 更新到 [t, t + dt]
    fn update(&mut self, t: f64, dt: f64) -> GlResult<()>;

    /// 冰面质量通量 [m s-1]
    fn mass_flux(&self, result: &mut Field<f64>) -> GlResult<()>;

    /// 冰面温度 [K]
    fn temperature(&self, result: &mut Field<f64>) -> GlResult<()>;

    /// 驱动本模型的大气模型
    fn atmosphere(&self) -> Option<&dyn AtmosphereModel> {
        None
    }
}

/// 简单冰面：降水全部成冰，冰面温度等于年均气温
#[derive(Debug)]
pub struct SimpleSurface {
    atmosphere: Box<dyn AtmosphereModel>,
}

impl SimpleSurface {
    /// 包装大气模型
    pub fn new(atmosphere: Box<dyn AtmosphereModel>) -> Self {
        Self { atmosphere }
    }
}

impl SurfaceModel for SimpleSurface {
    fn name(&self) -> &'static str {
        "simple"
    }

    fn init(&mut self, vars: &Vars) -> GlResult<()> {
        self.atmosphere.init(vars)
    }

    fn update(&mut self, t: f64, dt: f64) -> GlResult<()> {
        self.atmosphere.update(t, dt)
    }

    fn mass_flux(&self, result: &mut Field<f64>) -> GlResult<()> {
        self.atmosphere.mean_precipitation(result)
    }

    fn temperature(&self, result: &mut Field<f64>) -> GlResult<()> {
        self.atmosphere.mean_annual_temp(result)
    }

    fn atmosphere(&self) -> Option<&dyn AtmosphereModel> {
        Some(self.atmosphere.as_ref())
    }
}

/// 常数冰面
#[derive(Debug, Clone)]
pub struct GivenSurface {
    mass_flux: f64,
    temperature: f64,
}

impl GivenSurface {
    /// 由参数创建
    pub fn new(params: &ClimateParams) -> Self {
        Self {
            mass_flux: params.given_mass_flux,
            temperature: params.given_surface_temperature,
        }
    }
}

impl SurfaceModel for GivenSurface {
    fn name(&self) -> &'static str {
        "given"
    }

    fn init(&mut self, _vars: &Vars) -> GlResult<()> {
        Ok(())
    }

    fn update(&mut self, _t: f64, _dt: f64) -> GlResult<()> {
        Ok(())
    }

    fn mass_flux(&self, result: &mut Field<f64>) -> GlResult<()> {
        result.set(self.mass_flux);
        Ok(())
    }

    fn temperature(&self, result: &mut Field<f64>) -> GlResult<()> {
        result.set(self.temperature);
        Ok(())
    }
}
