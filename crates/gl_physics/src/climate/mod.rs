// crates/gl_physics/src/climate/mod.rs

//! 气候强迫
//!
//! 三类能力接口，由 [`ClimateFactory`] 按选项字符串组装：
//! - [`AtmosphereModel`]: 近地面气温与降水
//! - [`SurfaceModel`]: 冰面质量通量与温度
//! - [`OceanModel`]: 海平面与冰架底部边界条件
//!
//! 所有量使用 SI 单位（时间为秒）。

pub mod atmosphere;
pub mod factory;
pub mod ocean;
pub mod surface;

pub use atmosphere::{AtmosphereModel, DeltaT, FaustoAtmosphere, GivenAtmosphere};
pub use factory::ClimateFactory;
pub use ocean::{ConstantOcean, DeltaSeaLevel, OceanModel};
pub use surface::{GivenSurface, SimpleSurface, SurfaceModel};

use gl_foundation::field::Field;

/// 拥有的点上加常数
pub(crate) fn add_constant(field: &mut Field<f64>, offset: f64) {
    let grid = field.grid().clone();
    let mut view = field.view_mut();
    for (i, j) in grid.points() {
        view[(i, j)] += offset;
    }
}
