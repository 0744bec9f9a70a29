// crates/gl_physics/src/stressbalance/sia_sliding.rs

//! SIA 型底部滑动
//!
//! 滑动速度与冰面梯度成正比：
//!
//! ```text
//! v_b = -C ∇h
//! C   = μ ρ g H     当 T_b + β_CC ρ g H > T_min
//!     = 0           否则
//! Q_b = -(P h_x) u_b - (P h_y) v_b,   P = ρ g H
//! ```
//!
//! 其中 T_b 由底层焓值换算，∇h 为交错梯度在单元中心的四点平均。
//! 海洋单元（浮冰、无冰海洋）速度和摩擦生热为零。
//!
//! # 所需场
//!
//! `land_ice_thickness`、`bedrock_altitude`、`surface_altitude`（模板宽度 ≥ 2），
//! `enthalpy`（柱场），`mask`。

use std::sync::Arc;

use gl_config::SlidingParams;
use gl_foundation::comm::parallel_section;
use gl_foundation::error::{GlError, GlResult};
use gl_foundation::field::{Field, FieldMeta};
use gl_foundation::grid::Grid;
use gl_foundation::vars::{upgrade, Vars, WeakField};
use glam::DVec2;
use tracing::{debug, info};

use super::surface_gradient::{GradientInputs, SurfaceGradient, SurfaceGradientMethod};
use crate::enthalpy::EnthalpyConverter;
use crate::mask::is_grounded;

const CONTEXT: &str = "SiaSliding";

/// 所需外部场
#[derive(Debug)]
struct Inputs {
    thickness: WeakField<f64>,
    bed: WeakField<f64>,
    surface: WeakField<f64>,
    enthalpy: WeakField<f64>,
    mask: WeakField<i32>,
}

/// SIA 滑动计算器
#[derive(Debug)]
pub struct SiaSliding {
    grid: Arc<Grid>,
    params: SlidingParams,
    converter: Arc<dyn EnthalpyConverter>,
    gradient: SurfaceGradient,
    h_x: Field<f64>,
    h_y: Field<f64>,
    velocity: Field<DVec2>,
    frictional_heating: Field<f64>,
    inputs: Option<Inputs>,
}

impl SiaSliding {
    /// 创建
    ///
    /// 梯度方法名称无法识别时返回配置错误。
    pub fn new(
        grid: Arc<Grid>,
        params: SlidingParams,
        converter: Arc<dyn EnthalpyConverter>,
    ) -> GlResult<Self> {
        let method: SurfaceGradientMethod = params.surface_gradient_method.parse()?;
        let gradient = SurfaceGradient::new(&grid, method, params.glen_exponent)?;

        let h_x = Field::staggered(
            Arc::clone(&grid),
            FieldMeta::new("h_x", "x component of the surface gradient on the staggered grid", ""),
            1,
        )?;
        let h_y = Field::staggered(
            Arc::clone(&grid),
            FieldMeta::new("h_y", "y component of the surface gradient on the staggered grid", ""),
            1,
        )?;
        let velocity = Field::scalar(
            Arc::clone(&grid),
            FieldMeta::new("velbase_sliding", "basal sliding velocity", "m s-1")
                .with_glaciological_units("m year-1"),
            1,
        )?;
        let frictional_heating = Field::scalar(
            Arc::clone(&grid),
            FieldMeta::new("bfrict", "basal frictional heating", "W m-2"),
            0,
        )?;

        Ok(Self {
            grid,
            params,
            converter,
            gradient,
            h_x,
            h_y,
            velocity,
            frictional_heating,
            inputs: None,
        })
    }

    /// 取得所需场
    pub fn init(&mut self, vars: &Vars) -> GlResult<()> {
        if self.grid.rank() == 0 {
            info!(
                "SIA 滑动: mu = {} Pa-1 m s-1, 梯度方法 {}",
                self.params.mu,
                self.gradient.method()
            );
        }
        self.inputs = Some(Inputs {
            thickness: vars.require("land_ice_thickness", CONTEXT)?,
            bed: vars.require("bedrock_altitude", CONTEXT)?,
            surface: vars.require("surface_altitude", CONTEXT)?,
            enthalpy: vars.require("enthalpy", CONTEXT)?,
            mask: vars.require("mask", CONTEXT)?,
        });
        Ok(())
    }

    /// 梯度方法
    pub fn method(&self) -> SurfaceGradientMethod {
        self.gradient.method()
    }

    /// 滑动速度 [m s-1]
    pub fn velocity(&self) -> &Field<DVec2> {
        &self.velocity
    }

    /// 底部摩擦生热 [W m-2]
    pub fn basal_frictional_heating(&self) -> &Field<f64> {
        &self.frictional_heating
    }

    /// 交错梯度 (h_x, h_y)
    pub fn surface_gradient(&self) -> (&Field<f64>, &Field<f64>) {
        (&self.h_x, &self.h_y)
    }

    /// 滑动系数 C
    #[inline]
    pub fn sliding_coefficient(&self, thickness: f64, temperature: f64) -> f64 {
        let p = &self.params;
        let overburden = p.ice_density * p.gravity * thickness;
        if temperature + p.beta_cc * overburden > p.min_temperature {
            p.mu * overburden
        } else {
            0.0
        }
    }

    /// 计算滑动速度和摩擦生热（集合操作）
    pub fn update(&mut self) -> GlResult<()> {
        let Some(inputs) = self.inputs.as_ref() else {
            return Err(GlError::contract("SiaSliding 尚未初始化"));
        };
        let thickness = upgrade(&inputs.thickness, "land_ice_thickness", CONTEXT)?;
        let bed = upgrade(&inputs.bed, "bedrock_altitude", CONTEXT)?;
        let surface = upgrade(&inputs.surface, "surface_altitude", CONTEXT)?;
        let enthalpy = upgrade(&inputs.enthalpy, "enthalpy", CONTEXT)?;
        let mask = upgrade(&inputs.mask, "mask", CONTEXT)?;

        let thickness = thickness.read();
        let bed = bed.read();
        let surface = surface.read();
        let enthalpy = enthalpy.read();
        let mask = mask.read();

        let gradient_inputs = GradientInputs {
            surface: &surface,
            thickness: &thickness,
            bed: &bed,
        };
        self.gradient
            .compute(&gradient_inputs, &mut self.h_x, &mut self.h_y)?;

        let comm = Arc::clone(self.grid.comm());
        parallel_section(comm.as_ref(), || {
            self.sliding_law(&thickness, &enthalpy, &mask)
        })?;

        self.velocity.update_ghosts()?;
        debug!("SIA 滑动最大速度 {} m/s", self.velocity.global_max_magnitude());
        Ok(())
    }

    fn sliding_law(
        &mut self,
        thickness: &Field<f64>,
        enthalpy: &Field<f64>,
        mask: &Field<i32>,
    ) -> GlResult<()> {
        let rho_g = self.params.ice_density * self.params.gravity;
        let grid = Arc::clone(&self.grid);

        let hx = self.h_x.view();
        let hy = self.h_y.view();
        let thk = thickness.view();
        let enth = enthalpy.view();
        let m = mask.view();

        let mut results = Vec::with_capacity(grid.patch().len());
        for (i, j) in grid.points() {
            if !is_grounded(m[(i, j)]) {
                results.push(((i, j), DVec2::ZERO, 0.0));
                continue;
            }

            let grad = DVec2::new(
                0.25 * (hx[(i, j, 0)] + hx[(i - 1, j, 0)] + hx[(i, j, 1)] + hx[(i, j - 1, 1)]),
                0.25 * (hy[(i, j, 0)] + hy[(i - 1, j, 0)] + hy[(i, j, 1)] + hy[(i, j - 1, 1)]),
            );

            let h = thk[(i, j)];
            let base_enthalpy = enth.column(i, j)[0];
            let temperature = self
                .converter
                .temperature(base_enthalpy, self.converter.pressure(h))?;

            let c = self.sliding_coefficient(h, temperature);
            let v = -c * grad;
            let p = rho_g * h;
            let heating = -(p * grad.x) * v.x - (p * grad.y) * v.y;
            results.push(((i, j), v, heating));
        }

        let mut vel = self.velocity.view_mut();
        let mut bfrict = self.frictional_heating.view_mut();
        for ((i, j), v, heating) in results {
            vel[(i, j)] = v;
            bfrict[(i, j)] = heating;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::enthalpy::{enthalpy_converter, ConstantCEnthalpyConverter};
    use crate::mask::{MASK_FLOATING, MASK_GROUNDED, MASK_UNKNOWN};
    use gl_config::{Config, EnthalpyParams};
    use gl_foundation::comm::SerialComm;
    use gl_foundation::error::ErrorKind;
    use gl_foundation::grid::GridParams;
    use gl_foundation::vars::SharedField;

    struct Model {
        grid: Arc<Grid>,
        vars: Vars,
        enthalpy: SharedField<f64>,
        mask: SharedField<i32>,
    }

    /// 沿 x 方向倾斜的接地冰
    fn model(slope: f64, base_temperature: f64) -> Model {
        let grid = Arc::new(
            Grid::new(
                GridParams::new(7, 5, 3e3, 2e3).with_ice_levels(3, 2000.0),
                SerialComm::shared(),
            )
            .unwrap(),
        );
        let meta = |n: &str| FieldMeta::new(n, n, "m");
        let mut vars = Vars::new();
        let mut thk = Field::scalar(grid.clone(), meta("land_ice_thickness"), 2).unwrap();
        let mut topg = Field::scalar(grid.clone(), meta("bedrock_altitude"), 2).unwrap();
        let mut usurf = Field::scalar(grid.clone(), meta("surface_altitude"), 2).unwrap();
        {
            let mut h = thk.view_mut();
            let mut s = usurf.view_mut();
            for (i, j) in grid.points() {
                let x = grid.x()[i as usize];
                h[(i, j)] = 1000.0 + slope * x;
                s[(i, j)] = 1000.0 + slope * x;
            }
        }
        topg.set(0.0);
        thk.update_ghosts().unwrap();
        usurf.update_ghosts().unwrap();

        let converter = ConstantCEnthalpyConverter::new(EnthalpyParams::default());
        let mut enthalpy =
            Field::column(grid.clone(), meta("enthalpy"), grid.z().to_vec(), 0).unwrap();
        enthalpy.set(converter.e_from_t(base_temperature));
        let mut mask = Field::<i32>::scalar(grid.clone(), meta("mask"), 2).unwrap();
        mask.set(MASK_GROUNDED);

        vars.add(thk).unwrap();
        vars.add(topg).unwrap();
        vars.add(usurf).unwrap();
        let enthalpy = vars.add(enthalpy).unwrap();
        let mask = vars.add(mask).unwrap();
        Model {
            grid,
            vars,
            enthalpy,
            mask,
        }
    }

    fn sliding(m: &Model, method: &str, mu: f64) -> SiaSliding {
        let mut config = Config::default();
        config.set_double("mu_sliding", mu).unwrap();
        config.set_string("surface_gradient_method", method).unwrap();
        let params = SlidingParams::from_config(&config).unwrap();
        let ec = enthalpy_converter(EnthalpyParams::from_config(&config).unwrap());
        let mut s = SiaSliding::new(m.grid.clone(), params, ec).unwrap();
        s.init(&m.vars).unwrap();
        s
    }

    #[test]
    fn test_sliding_downslope_on_temperate_bed() {
        let m = model(0.01, 272.5);
        let mut s = sliding(&m, "mahaffy", 1e-10);
        s.update().unwrap();

        let (u, q) = (s.velocity().view()[(3, 2)], s.basal_frictional_heating().view()[(3, 2)]);
        assert!(u.x < 0.0, "沿坡向下");
        assert!(u.y.abs() < 1e-20);
        // C = μ ρ g H
        let h = 1000.0;
        let expected = 1e-10 * 910.0 * 9.81 * h * 0.01;
        assert!((u.x + expected).abs() / expected < 1e-9);
        assert!(q > 0.0);
        assert!(s.velocity().ghosts_fresh());
    }

    #[test]
    fn test_cold_bed_does_not_slide() {
        let m = model(0.01, 250.0);
        let mut s = sliding(&m, "haseloff", 1e-10);
        s.update().unwrap();
        assert_eq!(s.velocity().global_max_magnitude(), 0.0);
        assert_eq!(s.basal_frictional_heating().global_max(), 0.0);
    }

    #[test]
    fn test_ocean_cells_are_zeroed() {
        let m = model(0.01, 272.5);
        {
            let mut mask = m.mask.write();
            let mut v = mask.view_mut();
            for j in 0..5 {
                v[(3, j)] = MASK_FLOATING;
            }
        }
        m.mask.write().update_ghosts().unwrap();
        let mut s = sliding(&m, "eta", 1e-10);
        s.update().unwrap();
        assert_eq!(s.velocity().view()[(3, 2)], DVec2::ZERO);
        assert!(s.velocity().view()[(2, 2)].x < 0.0);
    }

    #[test]
    fn test_unknown_cells_do_not_slide() {
        let m = model(0.01, 272.5);
        {
            let mut mask = m.mask.write();
            mask.view_mut()[(2, 2)] = MASK_UNKNOWN;
        }
        m.mask.write().update_ghosts().unwrap();
        let mut s = sliding(&m, "mahaffy", 1e-10);
        s.update().unwrap();
        assert_eq!(s.velocity().view()[(2, 2)], DVec2::ZERO);
        assert_eq!(s.basal_frictional_heating().view()[(2, 2)], 0.0);
        assert!(s.velocity().view()[(3, 2)].x < 0.0);
    }

    #[test]
    fn test_frictional_heating_nonnegative() {
        let m = model(-0.02, 273.0);
        let mut s = sliding(&m, "haseloff", 3e-10);
        s.update().unwrap();
        let q = s.basal_frictional_heating().view();
        for (i, j) in m.grid.points() {
            assert!(q[(i, j)] >= 0.0);
        }
        assert!(s.velocity().view()[(3, 2)].x > 0.0);
    }

    #[test]
    fn test_unknown_method_rejected() {
        let m = model(0.0, 260.0);
        let mut config = Config::default();
        config.set_string("surface_gradient_method", "upwind").unwrap();
        let params = SlidingParams::from_config(&config).unwrap();
        let ec = enthalpy_converter(EnthalpyParams::default());
        let err = SiaSliding::new(m.grid.clone(), params, ec).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);
    }

    #[test]
    fn test_missing_field() {
        let mut m = model(0.0, 260.0);
        m.vars.remove("mask");
        let params = SlidingParams::from_config(&Config::default()).unwrap();
        let ec = enthalpy_converter(EnthalpyParams::default());
        let mut s = SiaSliding::new(m.grid.clone(), params, ec).unwrap();
        let err = s.init(&m.vars).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvariantViolation);
    }

    #[test]
    fn test_removed_field_detected_on_update() {
        let mut m = model(0.0, 260.0);
        let mut s = sliding(&m, "mahaffy", 0.0);
        drop(m.enthalpy);
        m.vars.remove("enthalpy");
        let err = s.update().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvariantViolation);
    }
}
