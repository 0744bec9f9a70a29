// apps/gl_cli/src/scenario.rs

//! 理想化初始场景
//!
//! 没有输入归档时用于填充几何与冰温。坐标原点位于区域中心。

use clap::ValueEnum;
use gl_foundation::error::{GlError, GlResult};
use gl_physics::IceModel;

/// 初始场景
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Scenario {
    /// 陆地上的抛物线冰穹
    Dome,
    /// 西侧陆地冰盖连接东侧冰架，外海另有一块孤立浮冰
    Shelf,
}

/// 初始冰温 [K]
const ICE_TEMPERATURE: f64 = 263.15;

fn fill(model: &IceModel, name: &str, f: impl Fn(f64, f64) -> f64) -> GlResult<()> {
    let shared = model
        .vars()
        .get::<f64>(name)
        .ok_or_else(|| GlError::missing_field(name, "scenario"))?;
    let mut field = shared.write();
    let grid = model.grid().clone();
    let mut view = field.view_mut();
    for (i, j) in grid.points() {
        view[(i, j)] = f(grid.x()[i as usize], grid.y()[j as usize]);
    }
    Ok(())
}

impl Scenario {
    /// 填充床面高程、冰厚、经纬度与冰温
    pub fn apply(self, model: &IceModel) -> GlResult<()> {
        let lx = model.grid().lx();
        let ly = model.grid().ly();

        match self {
            Self::Dome => {
                let radius = 0.8 * lx.min(ly);
                fill(model, "bedrock_altitude", |_, _| 0.0)?;
                fill(model, "land_ice_thickness", |x, y| {
                    let r2 = (x * x + y * y) / (radius * radius);
                    (3000.0 * (1.0 - r2)).max(0.0)
                })?;
            }
            Self::Shelf => {
                fill(model, "bedrock_altitude", |x, _| if x < 0.0 { 200.0 } else { -600.0 })?;
                fill(model, "land_ice_thickness", |x, y| {
                    if x < 0.0 {
                        // 接地部分从西边界向接地线减薄
                        300.0 + 1200.0 * (-x / lx).sqrt()
                    } else if x < 0.5 * lx {
                        300.0
                    } else if x > 0.75 * lx && y > 0.5 * ly {
                        250.0
                    } else {
                        0.0
                    }
                })?;
            }
        }

        // 格陵兰中部附近
        fill(model, "latitude", |_, y| 72.0 + y / 111e3)?;
        fill(model, "longitude", |x, _| -40.0 + x / 40e3)?;
        model.set_uniform_ice_temperature(ICE_TEMPERATURE)
    }
}
