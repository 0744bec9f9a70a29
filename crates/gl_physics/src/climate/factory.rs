// crates/gl_physics/src/climate/factory.rs

//! 气候模型工厂
//!
//! 模型描述字符串形如 `模型名,修正1,修正2`，修正按顺序包装在模型外层：
//!
//! | 选项 | 模型 | 修正 |
//! |------|------|------|
//! | `atmosphere` | `given`, `fausto` (`searise_greenland`) | `delta_T` |
//! | `surface` | `simple`, `given` | 无 |
//! | `ocean` | `constant` | `delta_SL` |

use std::sync::Arc;

use gl_config::ClimateParams;
use gl_foundation::error::{GlError, GlResult};
use gl_foundation::grid::Grid;

use super::atmosphere::{AtmosphereModel, DeltaT, FaustoAtmosphere, GivenAtmosphere};
use super::ocean::{ConstantOcean, DeltaSeaLevel, OceanModel};
use super::surface::{GivenSurface, SimpleSurface, SurfaceModel};

type Build<T> = fn(&ClimateFactory) -> GlResult<Box<T>>;
type Wrap<T> = fn(&ClimateFactory, Box<T>) -> Box<T>;

const ATMOSPHERE_MODELS: &[(&str, Build<dyn AtmosphereModel>)] = &[
    ("given", |f| Ok(Box::new(GivenAtmosphere::new(&f.params)))),
    ("fausto", |f| Ok(Box::new(FaustoAtmosphere::new(Arc::clone(&f.grid), &f.params)?))),
    ("searise_greenland", |f| {
        Ok(Box::new(FaustoAtmosphere::new(Arc::clone(&f.grid), &f.params)?))
    }),
];

const ATMOSPHERE_MODIFIERS: &[(&str, Wrap<dyn AtmosphereModel>)] =
    &[("delta_T", |f, input| Box::new(DeltaT::new(input, f.params.delta_t)))];

const SURFACE_MODELS: &[(&str, Build<dyn SurfaceModel>)] = &[
    ("simple", |f| Ok(Box::new(SimpleSurface::new(f.atmosphere()?)))),
    ("given", |f| Ok(Box::new(GivenSurface::new(&f.params)))),
];

const SURFACE_MODIFIERS: &[(&str, Wrap<dyn SurfaceModel>)] = &[];

const OCEAN_MODELS: &[(&str, Build<dyn OceanModel>)] =
    &[("constant", |f| Ok(Box::new(ConstantOcean::new(&f.params))))];

const OCEAN_MODIFIERS: &[(&str, Wrap<dyn OceanModel>)] =
    &[("delta_SL", |f, input| Box::new(DeltaSeaLevel::new(input, f.params.delta_sea_level)))];

/// 拆分 `模型,修正…`
fn parse<'a>(option: &str, spec: &'a str) -> GlResult<(&'a str, Vec<&'a str>)> {
    let mut parts = spec.split(',').map(str::trim);
    let model = parts.next().unwrap_or_default();
    if model.is_empty() {
        return Err(GlError::invalid_config(option, spec, "缺少模型名称"));
    }
    let modifiers: Vec<&str> = parts.collect();
    if modifiers.iter().any(|m| m.is_empty()) {
        return Err(GlError::invalid_config(option, spec, "修正名称为空"));
    }
    Ok((model, modifiers))
}

fn lookup<F: Copy>(option: &str, table: &[(&str, F)], name: &str) -> GlResult<F> {
    table
        .iter()
        .find(|(key, _)| *key == name)
        .map(|(_, f)| *f)
        .ok_or_else(|| {
            let known: Vec<&str> = table.iter().map(|(key, _)| *key).collect();
            GlError::invalid_config(option, name, format!("可选值为 [{}]", known.join(", ")))
        })
}

/// 气候模型工厂
#[derive(Debug, Clone)]
pub struct ClimateFactory {
    grid: Arc<Grid>,
    params: ClimateParams,
}

impl ClimateFactory {
    /// 创建
    pub fn new(grid: Arc<Grid>, params: ClimateParams) -> Self {
        Self { grid, params }
    }

    /// 参数
    pub fn params(&self) -> &ClimateParams {
        &self.params
    }

    fn build<T: ?Sized>(
        &self,
        option: &str,
        spec: &str,
        models: &[(&str, Build<T>)],
        modifiers: &[(&str, Wrap<T>)],
    ) -> GlResult<Box<T>> {
        let (model, wrappers) = parse(option, spec)?;
        let mut result = lookup(option, models, model)?(self)?;
        for name in wrappers {
            result = lookup(option, modifiers, name)?(self, result);
        }
        Ok(result)
    }

    /// 按 `atmosphere` 选项创建
    pub fn atmosphere(&self) -> GlResult<Box<dyn AtmosphereModel>> {
        self.atmosphere_from(&self.params.atmosphere)
    }

    /// 按描述字符串创建大气模型
    pub fn atmosphere_from(&self, spec: &str) -> GlResult<Box<dyn AtmosphereModel>> {
        self.build("atmosphere", spec, ATMOSPHERE_MODELS, ATMOSPHERE_MODIFIERS)
    }

    /// 按 `surface` 选项创建
    pub fn surface(&self) -> GlResult<Box<dyn SurfaceModel>> {
        self.surface_from(&self.params.surface)
    }

    /// 按描述字符串创建冰面模型
    pub fn surface_from(&self, spec: &str) -> GlResult<Box<dyn SurfaceModel>> {
        self.build("surface", spec, SURFACE_MODELS, SURFACE_MODIFIERS)
    }

    /// 按 `ocean` 选项创建
    pub fn ocean(&self) -> GlResult<Box<dyn OceanModel>> {
        self.ocean_from(&self.params.ocean)
    }

    /// 按描述字符串创建海洋模型
    pub fn ocean_from(&self, spec: &str) -> GlResult<Box<dyn OceanModel>> {
        self.build("ocean", spec, OCEAN_MODELS, OCEAN_MODIFIERS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gl_config::Config;
    use gl_foundation::comm::SerialComm;
    use gl_foundation::error::ErrorKind;
    use gl_foundation::grid::GridParams;

    fn factory() -> ClimateFactory {
        let grid = Arc::new(Grid::new(GridParams::new(3, 3, 1e3, 1e3), SerialComm::shared()).unwrap());
        ClimateFactory::new(grid, ClimateParams::from_config(&Config::default()).unwrap())
    }

    #[test]
    fn test_defaults() {
        let f = factory();
        let surface = f.surface().unwrap();
        assert_eq!(surface.name(), "simple");
        assert_eq!(surface.atmosphere().map(|a| a.name()), Some("given"));
        assert_eq!(f.ocean().unwrap().name(), "constant");
    }

    #[test]
    fn test_modifier_chain() {
        let f = factory();
        assert_eq!(f.atmosphere_from("fausto,delta_T").unwrap().name(), "delta_T");
        assert_eq!(f.atmosphere_from(" searise_greenland ").unwrap().name(), "fausto");
        assert_eq!(f.ocean_from("constant,delta_SL,delta_SL").unwrap().name(), "delta_SL");
    }

    #[test]
    fn test_unknown_names() {
        let f = factory();
        for (result, what) in [
            (f.atmosphere_from("pdd").map(|_| ()), "未知模型"),
            (f.atmosphere_from("given,delta_P").map(|_| ()), "未知修正"),
            (f.atmosphere_from("").map(|_| ()), "空描述"),
            (f.ocean_from("constant,").map(|_| ()), "空修正"),
            (f.surface_from("given,delta_T").map(|_| ()), "冰面无修正"),
        ] {
            assert_eq!(result.unwrap_err().kind(), ErrorKind::Configuration, "{what}");
        }
    }
}
