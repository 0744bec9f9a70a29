// crates/gl_physics/src/enthalpy.rs

//! 焓与温度换算
//!
//! 冰的内能用比焓 E [J kg-1] 表示，E(T_0, ω = 0) = 0。冷冰区 E 与温度一一对应；
//! 达到压力熔点后进入温性区，温度固定为 T_m(p)，多出的焓对应含水率 ω。
//!
//! # 换算器
//!
//! - [`ConstantCEnthalpyConverter`]: 常比热容，E = c_i (T - T_0)
//! - [`VarcEnthalpyConverter`]: 比热容随温度线性变化，C(T) = c_i + g (T - T_r)
//!
//! 两者共享 [`EnthalpyConverter`] 的默认方法（压力、熔点、CTS 焓、含水率等），
//! 只需实现冷冰区的 `e_from_t` / `t_from_e` / `c_from_t`。
//!
//! # 公式
//!
//! ```text
//! p(d)     = p_air + ρ g d
//! T_m(p)   = T_melt - β p
//! E_cts(p) = EfromT(T_m(p))
//! E_l(p)   = E_cts(p) + L
//! ```

use std::fmt;
use std::sync::Arc;

use gl_config::EnthalpyParams;
use gl_foundation::error::{GlError, GlResult};
use gl_foundation::field::Field;
use rayon::prelude::*;

/// 合法性判断的容差
pub const ENTHALPY_EPS: f64 = 1e-6;

// ============================================================================
// 换算器 trait
// ============================================================================

/// 焓换算器
pub trait EnthalpyConverter: Send + Sync + fmt::Debug {
    /// 名称
    fn name(&self) -> &'static str;

    /// 参数
    fn params(&self) -> &EnthalpyParams;

    /// 冷冰区: 由温度计算焓
    fn e_from_t(&self, temperature: f64) -> f64;

    /// 冷冰区: 由焓计算温度
    fn t_from_e(&self, enthalpy: f64) -> GlResult<f64>;

    /// 比热容 [J kg-1 K-1]
    fn c_from_t(&self, temperature: f64) -> f64;

    /// 冰面以下深度 `depth` 处的压力 [Pa]
    fn pressure(&self, depth: f64) -> f64 {
        let p = self.params();
        p.surface_pressure + p.ice_density * p.gravity * depth
    }

    /// 压力熔点 [K]
    fn melting_temperature(&self, pressure: f64) -> f64 {
        let p = self.params();
        p.melting_point - p.beta_cc * pressure
    }

    /// 冷温转换面 (CTS) 处的焓
    fn enthalpy_cts(&self, pressure: f64) -> f64 {
        self.e_from_t(self.melting_temperature(pressure))
    }

    /// 完全液化时的焓
    fn enthalpy_liquid(&self, pressure: f64) -> f64 {
        self.enthalpy_cts(pressure) + self.params().latent_heat
    }

    /// 是否为温性冰
    fn is_temperate(&self, enthalpy: f64, pressure: f64) -> bool {
        enthalpy >= self.enthalpy_cts(pressure)
    }

    /// 绝对温度 [K]
    ///
    /// E ≥ E_l(p) 表示液态水，不支持。
    fn temperature(&self, enthalpy: f64, pressure: f64) -> GlResult<f64> {
        let e_liquid = self.enthalpy_liquid(pressure);
        if enthalpy >= e_liquid {
            return Err(GlError::invalid_input(format!(
                "焓 E = {enthalpy} J/kg 不小于液态焓 {e_liquid} J/kg (p = {pressure} Pa)，液态水不受支持"
            )));
        }
        if enthalpy < self.enthalpy_cts(pressure) {
            self.t_from_e(enthalpy)
        } else {
            Ok(self.melting_temperature(pressure))
        }
    }

    /// 压力修正温度，T_pa = T - T_m(p) + T_melt
    fn pressure_adjusted_temperature(&self, enthalpy: f64, pressure: f64) -> GlResult<f64> {
        let t = self.temperature(enthalpy, pressure)?;
        Ok(t - self.melting_temperature(pressure) + self.params().melting_point)
    }

    /// 含水率，冷冰为 0
    fn water_fraction(&self, enthalpy: f64, pressure: f64) -> GlResult<f64> {
        let e_liquid = self.enthalpy_liquid(pressure);
        if enthalpy >= e_liquid {
            return Err(GlError::invalid_input(format!(
                "焓 E = {enthalpy} J/kg 不小于液态焓 {e_liquid} J/kg，无法计算含水率"
            )));
        }
        let e_cts = self.enthalpy_cts(pressure);
        if enthalpy <= e_cts {
            Ok(0.0)
        } else {
            Ok((enthalpy - e_cts) / self.params().latent_heat)
        }
    }

    /// 由 (T, ω, p) 计算焓
    fn enthalpy(&self, temperature: f64, omega: f64, pressure: f64) -> GlResult<f64> {
        let t_m = self.melting_temperature(pressure);

        if temperature <= 0.0 {
            return Err(GlError::invalid_input(format!(
                "温度 T = {temperature} K 不是正的绝对温度"
            )));
        }
        if !(-ENTHALPY_EPS..=1.0 + ENTHALPY_EPS).contains(&omega) {
            return Err(GlError::invalid_input(format!("含水率 omega = {omega} 超出 [0, 1]")));
        }
        if temperature > t_m + ENTHALPY_EPS {
            return Err(GlError::invalid_input(format!(
                "温度 T = {temperature} K 高于压力熔点 {t_m} K"
            )));
        }
        if temperature < t_m - ENTHALPY_EPS && omega > ENTHALPY_EPS {
            return Err(GlError::invalid_input(format!(
                "冷冰 (T = {temperature} K < T_m = {t_m} K) 的含水率 omega = {omega} 必须为 0"
            )));
        }

        if temperature < t_m {
            Ok(self.e_from_t(temperature))
        } else {
            Ok(self.enthalpy_cts(pressure) + omega * self.params().latent_heat)
        }
    }

    /// 宽松版本：冷冰忽略 ω，温性冰把 ω 截断到 [0, 1]，温度高于熔点按熔点处理
    fn enthalpy_permissive(&self, temperature: f64, omega: f64, pressure: f64) -> f64 {
        let t_m = self.melting_temperature(pressure);
        if temperature < t_m {
            self.e_from_t(temperature)
        } else {
            self.enthalpy_cts(pressure) + omega.clamp(0.0, 1.0) * self.params().latent_heat
        }
    }
}

// ============================================================================
// 常比热容
// ============================================================================

/// 常比热容换算器
#[derive(Debug, Clone)]
pub struct ConstantCEnthalpyConverter {
    params: EnthalpyParams,
}

impl ConstantCEnthalpyConverter {
    /// 创建换算器
    pub fn new(params: EnthalpyParams) -> Self {
        Self { params }
    }
}

impl EnthalpyConverter for ConstantCEnthalpyConverter {
    fn name(&self) -> &'static str {
        "constant_c"
    }

    fn params(&self) -> &EnthalpyParams {
        &self.params
    }

    #[inline]
    fn e_from_t(&self, temperature: f64) -> f64 {
        self.params.c_i * (temperature - self.params.t_0)
    }

    #[inline]
    fn t_from_e(&self, enthalpy: f64) -> GlResult<f64> {
        Ok(enthalpy / self.params.c_i + self.params.t_0)
    }

    fn c_from_t(&self, _temperature: f64) -> f64 {
        self.params.c_i
    }
}

// ============================================================================
// 变比热容
// ============================================================================

/// 变比热容换算器
///
/// 冷冰区对 C(T) 积分：
///
/// ```text
/// E(T) = (c_i + g ((T + T_0)/2 - T_r)) (T - T_0)
/// ```
///
/// 逆运算解 ΔT² + β ΔT - α E = 0，α = 2/g，β = α c_i + 2 (T_0 - T_r)，
/// 取无相消误差的根 ΔT = 2αE / (sqrt(β² + 4αE) + β)。
#[derive(Debug, Clone)]
pub struct VarcEnthalpyConverter {
    params: EnthalpyParams,
}

impl VarcEnthalpyConverter {
    /// 创建换算器
    pub fn new(params: EnthalpyParams) -> Self {
        Self { params }
    }
}

impl EnthalpyConverter for VarcEnthalpyConverter {
    fn name(&self) -> &'static str {
        "varc"
    }

    fn params(&self) -> &EnthalpyParams {
        &self.params
    }

    #[inline]
    fn e_from_t(&self, temperature: f64) -> f64 {
        let p = &self.params;
        let t_mean = 0.5 * (temperature + p.t_0);
        (p.c_i + p.c_gradient * (t_mean - p.t_r)) * (temperature - p.t_0)
    }

    #[inline]
    fn t_from_e(&self, enthalpy: f64) -> GlResult<f64> {
        if enthalpy < 0.0 {
            return Err(GlError::invalid_input(format!(
                "焓 E = {enthalpy} J/kg 为负，低于变比热容换算的参考点"
            )));
        }
        let p = &self.params;
        if !(p.c_gradient > 0.0) {
            return Err(GlError::invalid_input(format!(
                "比热容梯度 c_gradient = {} 必须为正",
                p.c_gradient
            )));
        }
        let alpha = 2.0 / p.c_gradient;
        let beta = alpha * p.c_i + 2.0 * (p.t_0 - p.t_r);
        let tmp = 2.0 * alpha * enthalpy;
        let dt = tmp / ((beta * beta + 2.0 * tmp).sqrt() + beta);
        Ok(p.t_0 + dt)
    }

    #[inline]
    fn c_from_t(&self, temperature: f64) -> f64 {
        self.params.c_i + self.params.c_gradient * (temperature - self.params.t_r)
    }
}

/// 按 `varc` 开关选择换算器
pub fn enthalpy_converter(params: EnthalpyParams) -> Arc<dyn EnthalpyConverter> {
    if params.varc {
        Arc::new(VarcEnthalpyConverter::new(params))
    } else {
        Arc::new(ConstantCEnthalpyConverter::new(params))
    }
}

// ============================================================================
// 场换算
// ============================================================================

/// 把焓柱场换算为温度柱场
///
/// 第 k 层深度取 max(H - z_k, 0)。各柱独立，在 worker 内部用 rayon 并行。
pub fn compute_temperature_field(
    converter: &dyn EnthalpyConverter,
    enthalpy: &Field<f64>,
    thickness: &Field<f64>,
    temperature: &mut Field<f64>,
) -> GlResult<()> {
    GlError::check_size("temperature levels", enthalpy.dof(), temperature.dof())?;
    let levels = enthalpy.levels().to_vec();
    let e = enthalpy.view();
    let h = thickness.view();

    let mut out = temperature.view_mut();
    out.owned_columns_mut()
        .into_par_iter()
        .try_for_each(|((i, j), column)| -> GlResult<()> {
            let thk = h[(i, j)];
            let e_col = e.column(i, j);
            for (k, t) in column.iter_mut().enumerate() {
                let depth = (thk - levels[k]).max(0.0);
                *t = converter.temperature(e_col[k], converter.pressure(depth))?;
            }
            Ok(())
        })
}

// ============================================================================
// 测试
// ============================================================================
