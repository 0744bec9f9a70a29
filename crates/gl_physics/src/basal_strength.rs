// crates/gl_physics/src/basal_strength.rs

//! 底部屈服应力 τ_c
//!
//! 供外部应力平衡求解器使用的底部材料强度。
//!
//! # Mohr-Coulomb 模型
//!
//! ```text
//! P_o   = ρ g H
//! N_til = min(P_o, δ P_o 10^((e_0/C_c)(1 - W_til/W_max)))
//! τ_c   = c_0 + N_til tan(φ)
//! ```
//!
//! - 海洋单元: τ_c = 0
//! - 接地无冰单元: τ_c = `high_tauc`
//! - 开启 slippery grounding lines 时，床面不高于海平面且与浮冰或
//!   无冰海洋相邻的单元视为冰碛饱和 (W_til = W_max)
//!
//! 摩擦角 φ 依次取自 `tillphi` 场、`topg_to_phi` 分段线性参数化或常数
//! `default_till_phi`。

use std::fmt;
use std::sync::Arc;

use gl_config::YieldStressParams;
use gl_foundation::error::{GlError, GlResult};
use gl_foundation::field::{Field, FieldMeta};
use gl_foundation::grid::Grid;
use gl_foundation::vars::{upgrade, Vars, WeakField};
use tracing::info;

use crate::archive::Archive;
use crate::mask::MaskQuery;

/// 屈服应力模型
pub trait YieldStress: Send + Sync + fmt::Debug {
    /// 名称
    fn name(&self) -> &'static str;

    /// 取得输入场并初始化内部状态
    fn init(&mut self, vars: &Vars) -> GlResult<()>;

    /// 更新到 [t, t + dt]
    fn update(&mut self, t: f64, dt: f64) -> GlResult<()>;

    /// 复制当前屈服应力 [Pa]
    fn basal_material_yield_stress(&self, result: &mut Field<f64>) -> GlResult<()>;

    /// 设置海平面，用于判定海洋性接地线
    fn set_sea_level(&mut self, _sea_level: f64) {}

    /// 写出内部变量
    fn write_variables(&self, _archive: &mut Archive) -> GlResult<()> {
        Ok(())
    }
}

fn tauc_field(grid: &Arc<Grid>) -> GlResult<Field<f64>> {
    Field::scalar(
        Arc::clone(grid),
        FieldMeta::new("tauc", "yield stress for basal till (plastic or pseudo-plastic model)", "Pa")
            .with_valid_min(0.0),
        1,
    )
}

// ============================================================================
// 常数模型
// ============================================================================

/// 常数屈服应力
#[derive(Debug)]
pub struct ConstantYieldStress {
    tauc: Field<f64>,
    value: f64,
}

impl ConstantYieldStress {
    /// 创建
    pub fn new(grid: &Arc<Grid>, params: &YieldStressParams) -> GlResult<Self> {
        Ok(Self {
            tauc: tauc_field(grid)?,
            value: params.default_tauc,
        })
    }
}

impl YieldStress for ConstantYieldStress {
    fn name(&self) -> &'static str {
        "constant"
    }

    fn init(&mut self, _vars: &Vars) -> GlResult<()> {
        self.tauc.set(self.value);
        Ok(())
    }

    fn update(&mut self, _t: f64, _dt: f64) -> GlResult<()> {
        Ok(())
    }

    fn basal_material_yield_stress(&self, result: &mut Field<f64>) -> GlResult<()> {
        result.copy_from(&self.tauc)
    }
}

// ============================================================================
// topg_to_phi
// ============================================================================

/// 摩擦角的分段线性床面参数化
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TopgToPhi {
    /// 最小摩擦角 [度]
    pub phi_min: f64,
    /// 最大摩擦角 [度]
    pub phi_max: f64,
    /// 低于此高程取 phi_min [m]
    pub topg_min: f64,
    /// 高于此高程取 phi_max [m]
    pub topg_max: f64,
}

impl TopgToPhi {
    /// 从 (phi_min, phi_max, topg_min, topg_max) 创建并校验
    pub fn new([phi_min, phi_max, topg_min, topg_max]: [f64; 4]) -> GlResult<Self> {
        if phi_min >= phi_max {
            return Err(GlError::invalid_config(
                "topg_to_phi",
                format!("{phi_min},{phi_max},{topg_min},{topg_max}"),
                "要求 phi_min < phi_max",
            ));
        }
        if topg_min >= topg_max {
            return Err(GlError::invalid_config(
                "topg_to_phi",
                format!("{phi_min},{phi_max},{topg_min},{topg_max}"),
                "要求 topg_min < topg_max",
            ));
        }
        Ok(Self {
            phi_min,
            phi_max,
            topg_min,
            topg_max,
        })
    }

    /// 床面高程处的摩擦角
    #[inline]
    pub fn phi(&self, bed: f64) -> f64 {
        if bed <= self.topg_min {
            self.phi_min
        } else if bed >= self.topg_max {
            self.phi_max
        } else {
            let slope = (self.phi_max - self.phi_min) / (self.topg_max - self.topg_min);
            self.phi_min + (bed - self.topg_min) * slope
        }
    }
}

// ============================================================================
// Mohr-Coulomb
// ============================================================================

const CONTEXT: &str = "MohrCoulombYieldStress";

#[derive(Debug)]
struct Inputs {
    mask: WeakField<i32>,
    bed: WeakField<f64>,
    thickness: WeakField<f64>,
    tillwat: Option<WeakField<f64>>,
}

/// Mohr-Coulomb 冰碛屈服应力
#[derive(Debug)]
pub struct MohrCoulombYieldStress {
    grid: Arc<Grid>,
    params: YieldStressParams,
    tauc: Field<f64>,
    till_phi: Field<f64>,
    sea_level: f64,
    clock: Option<(f64, f64)>,
    inputs: Option<Inputs>,
}

impl MohrCoulombYieldStress {
    /// 创建
    pub fn new(grid: Arc<Grid>, params: YieldStressParams) -> GlResult<Self> {
        let tauc = tauc_field(&grid)?;
        let till_phi = Field::scalar(
            Arc::clone(&grid),
            FieldMeta::new("tillphi", "friction angle for till under grounded ice sheet", "degrees")
                .with_valid_min(0.0),
            1,
        )?;
        Ok(Self {
            grid,
            params,
            tauc,
            till_phi,
            sea_level: 0.0,
            clock: None,
            inputs: None,
        })
    }

    /// 摩擦角场
    pub fn till_phi(&self) -> &Field<f64> {
        &self.till_phi
    }

    /// 有效压力
    #[inline]
    pub fn effective_pressure(&self, overburden: f64, water: f64) -> f64 {
        let p = &self.params;
        let n_til = p.effective_fraction_overburden
            * overburden
            * 10f64.powf(p.e0_over_cc * (1.0 - water / p.tillwat_max));
        overburden.min(n_til)
    }
}

impl YieldStress for MohrCoulombYieldStress {
    fn name(&self) -> &'static str {
        "mohr_coulomb"
    }

    fn init(&mut self, vars: &Vars) -> GlResult<()> {
        if self.params.tillwat_max <= 0.0 {
            return Err(GlError::invalid_config(
                "hydrology_tillwat_max",
                self.params.tillwat_max.to_string(),
                "Mohr-Coulomb 模型要求冰碛最大含水厚度为正",
            ));
        }

        let inputs = Inputs {
            mask: vars.require("mask", CONTEXT)?,
            bed: vars.require("bedrock_altitude", CONTEXT)?,
            thickness: vars.require("land_ice_thickness", CONTEXT)?,
            tillwat: vars.get_weak("tillwat"),
        };
        let root = self.grid.rank() == 0;

        if let Some(phi) = vars.get::<f64>("tillphi") {
            self.till_phi.copy_from(&phi.read())?;
            if root {
                info!("冰碛摩擦角取自 tillphi 场");
            }
        } else if let Some(values) = self.params.topg_to_phi {
            let rule = TopgToPhi::new(values)?;
            if root {
                info!(
                    "冰碛摩擦角按床面高程分段线性: {} 度 (topg <= {} m) 到 {} 度 (topg >= {} m)",
                    rule.phi_min, rule.topg_min, rule.phi_max, rule.topg_max
                );
            }
            let bed = upgrade(&inputs.bed, "bedrock_altitude", CONTEXT)?;
            let bed = bed.read();
            let b = bed.view();
            let mut phi = self.till_phi.view_mut();
            for (i, j) in self.grid.points() {
                phi[(i, j)] = rule.phi(b[(i, j)]);
            }
        } else {
            self.till_phi.set(self.params.default_till_phi);
        }
        self.till_phi.update_ghosts()?;

        self.inputs = Some(inputs);
        self.clock = None;
        Ok(())
    }

    fn update(&mut self, t: f64, dt: f64) -> GlResult<()> {
        if let Some((t_prev, dt_prev)) = self.clock {
            if (t - t_prev).abs() < 1e-12 && (dt - dt_prev).abs() < 1e-12 {
                return Ok(());
            }
        }
        let Some(inputs) = self.inputs.as_ref() else {
            return Err(GlError::contract("MohrCoulombYieldStress 尚未初始化"));
        };
        let mask = upgrade(&inputs.mask, "mask", CONTEXT)?;
        let bed = upgrade(&inputs.bed, "bedrock_altitude", CONTEXT)?;
        let thickness = upgrade(&inputs.thickness, "land_ice_thickness", CONTEXT)?;
        let tillwat = match &inputs.tillwat {
            Some(weak) => Some(upgrade(weak, "tillwat", CONTEXT)?),
            None => None,
        };
        self.clock = Some((t, dt));

        let p = self.params.clone();
        let rho_g = p.ice_density * p.gravity;

        let mask = mask.read();
        let bed = bed.read();
        let thickness = thickness.read();
        let tillwat_guard = tillwat.as_ref().map(|f| f.read());

        let m = MaskQuery::new(&mask);
        let b = bed.view();
        let thk = thickness.view();
        let w = tillwat_guard.as_ref().map(|f| f.view());

        let mut values = Vec::with_capacity(self.grid.patch().len());
        {
            let phi = self.till_phi.view();
            for (i, j) in self.grid.points() {
                let tauc = if m.ocean(i, j) {
                    0.0
                } else if m.ice_free(i, j) {
                    p.high_tauc
                } else {
                    let marine_margin = p.slippery_grounding_lines
                        && b[(i, j)] <= self.sea_level
                        && (m.next_to_floating_ice(i, j) || m.next_to_ice_free_ocean(i, j));
                    let water = if marine_margin {
                        p.tillwat_max
                    } else {
                        w.as_ref().map_or(0.0, |w| w[(i, j)])
                    };
                    let n_til = self.effective_pressure(rho_g * thk[(i, j)], water);
                    p.till_c_0 + n_til * phi[(i, j)].to_radians().tan()
                };
                values.push(((i, j), tauc));
            }
        }

        {
            let mut tauc = self.tauc.view_mut();
            for ((i, j), value) in values {
                tauc[(i, j)] = value;
            }
        }
        self.tauc.update_ghosts()
    }

    fn basal_material_yield_stress(&self, result: &mut Field<f64>) -> GlResult<()> {
        result.copy_from(&self.tauc)
    }

    fn set_sea_level(&mut self, sea_level: f64) {
        self.sea_level = sea_level;
    }

    fn write_variables(&self, archive: &mut Archive) -> GlResult<()> {
        archive.write_column_variable(&self.till_phi, None)
    }
}

/// 按 `yield_stress_model` 创建模型
pub fn yield_stress_model(grid: Arc<Grid>, params: YieldStressParams) -> GlResult<Box<dyn YieldStress>> {
    let model = params.model.clone();
    match model.as_str() {
        "constant" => Ok(Box::new(ConstantYieldStress::new(&grid, &params)?)),
        "mohr_coulomb" => Ok(Box::new(MohrCoulombYieldStress::new(grid, params)?)),
        other => Err(GlError::invalid_config(
            "yield_stress_model",
            other,
            "可选值为 constant, mohr_coulomb",
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mask::{MASK_FLOATING, MASK_GROUNDED, MASK_ICE_FREE_BEDROCK};
    use gl_config::Config;
    use gl_foundation::comm::SerialComm;
    use gl_foundation::error::ErrorKind;
    use gl_foundation::grid::GridParams;

    fn setup(masks: [i32; 4], topg: f64) -> (Arc<Grid>, Vars) {
        let grid = Arc::new(Grid::new(GridParams::new(4, 2, 1e3, 1e3), SerialComm::shared()).unwrap());
        let meta = |n: &str| FieldMeta::new(n, n, "");
        let mut mask = Field::<i32>::scalar(grid.clone(), meta("mask"), 2).unwrap();
        let mut bed = Field::scalar(grid.clone(), meta("bedrock_altitude"), 2).unwrap();
        let mut thk = Field::scalar(grid.clone(), meta("land_ice_thickness"), 2).unwrap();
        {
            let mut m = mask.view_mut();
            for (i, j) in grid.points() {
                m[(i, j)] = masks[i as usize];
            }
        }
        mask.update_ghosts().unwrap();
        bed.set(topg);
        thk.set(1000.0);

        let mut vars = Vars::new();
        vars.add(mask).unwrap();
        vars.add(bed).unwrap();
        vars.add(thk).unwrap();
        (grid, vars)
    }

    fn params(config: &Config) -> YieldStressParams {
        YieldStressParams::from_config(config).unwrap()
    }

    #[test]
    fn test_mohr_coulomb_by_cell_type() {
        let (grid, vars) = setup(
            [MASK_GROUNDED, MASK_GROUNDED, MASK_ICE_FREE_BEDROCK, MASK_FLOATING],
            100.0,
        );
        let p = params(&Config::default());
        let mut model = MohrCoulombYieldStress::new(grid.clone(), p.clone()).unwrap();
        model.init(&vars).unwrap();
        model.update(0.0, 1.0).unwrap();

        let mut out = Field::scalar(grid, FieldMeta::new("tauc", "", "Pa"), 1).unwrap();
        model.basal_material_yield_stress(&mut out).unwrap();
        let v = out.view();

        // 干冰碛: N_til = min(P_o, δ P_o 10^(e0/Cc))，指数很大时取 P_o
        let po = 910.0 * 9.81 * 1000.0;
        let expected = p.till_c_0 + po * 30f64.to_radians().tan();
        assert!((v[(0, 0)] - expected).abs() / expected < 1e-12);
        assert_eq!(v[(2, 0)], p.high_tauc);
        assert_eq!(v[(3, 1)], 0.0);
    }

    #[test]
    fn test_saturated_till_at_marine_grounding_line() {
        let (grid, vars) = setup(
            [MASK_GROUNDED, MASK_GROUNDED, MASK_FLOATING, MASK_FLOATING],
            -200.0,
        );
        let mut config = Config::default();
        config.set_flag("tauc_slippery_grounding_lines", true).unwrap();
        let p = params(&config);
        let mut model = MohrCoulombYieldStress::new(grid.clone(), p.clone()).unwrap();
        model.init(&vars).unwrap();
        model.update(0.0, 1.0).unwrap();

        let po = 910.0 * 9.81 * 1000.0;
        let tan_phi = 30f64.to_radians().tan();
        let tauc = model.tauc.view();
        // (1, j) 与浮冰相邻: N_til = δ P_o
        let expected = p.effective_fraction_overburden * po * tan_phi;
        assert!((tauc[(1, 0)] - expected).abs() / expected < 1e-12);
        // (0, j) 不相邻
        assert!((tauc[(0, 0)] - po * tan_phi).abs() / (po * tan_phi) < 1e-12);
    }

    #[test]
    fn test_topg_to_phi_piecewise_linear() {
        let rule = TopgToPhi::new([5.0, 15.0, -1000.0, 1000.0]).unwrap();
        assert_eq!(rule.phi(-2000.0), 5.0);
        assert_eq!(rule.phi(2000.0), 15.0);
        assert!((rule.phi(0.0) - 10.0).abs() < 1e-12);
        assert!((rule.phi(500.0) - 12.5).abs() < 1e-12);

        assert!(TopgToPhi::new([15.0, 5.0, -1000.0, 1000.0]).is_err());
        let err = TopgToPhi::new([5.0, 15.0, 1000.0, 1000.0]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);
    }

    #[test]
    fn test_topg_to_phi_applied_at_init() {
        let (grid, vars) = setup([MASK_GROUNDED; 4], 500.0);
        let mut config = Config::default();
        config.set_flag("topg_to_phi", true).unwrap();
        let mut model = MohrCoulombYieldStress::new(grid, params(&config)).unwrap();
        model.init(&vars).unwrap();
        assert!((model.till_phi().view()[(1, 1)] - 12.5).abs() < 1e-12);
    }

    #[test]
    fn test_repeat_update_is_noop() {
        let (grid, vars) = setup([MASK_GROUNDED; 4], 0.0);
        let mut model = MohrCoulombYieldStress::new(grid, params(&Config::default())).unwrap();
        model.init(&vars).unwrap();
        model.update(10.0, 5.0).unwrap();
        let counter = model.tauc.state_counter();
        model.update(10.0, 5.0).unwrap();
        assert_eq!(model.tauc.state_counter(), counter);
    }

    #[test]
    fn test_invalid_tillwat_max() {
        let (grid, vars) = setup([MASK_GROUNDED; 4], 0.0);
        let mut config = Config::default();
        config.set_double("hydrology_tillwat_max", 0.0).unwrap();
        let mut model = MohrCoulombYieldStress::new(grid, params(&config)).unwrap();
        assert_eq!(model.init(&vars).unwrap_err().kind(), ErrorKind::Configuration);
    }

    #[test]
    fn test_factory() {
        let (grid, vars) = setup([MASK_GROUNDED; 4], 0.0);
        let mut config = Config::default();
        config.set_string("yield_stress_model", "constant").unwrap();
        let mut model = yield_stress_model(grid.clone(), params(&config)).unwrap();
        assert_eq!(model.name(), "constant");
        model.init(&vars).unwrap();
        let mut out = Field::scalar(grid.clone(), FieldMeta::new("tauc", "", "Pa"), 1).unwrap();
        model.basal_material_yield_stress(&mut out).unwrap();
        assert_eq!(out.view()[(0, 0)], 2e5);

        config.set_string("yield_stress_model", "viscous").unwrap();
        assert!(yield_stress_model(grid, params(&config)).is_err());
    }
}
