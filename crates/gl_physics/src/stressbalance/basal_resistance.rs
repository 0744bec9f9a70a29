// crates/gl_physics/src/stressbalance/basal_resistance.rs

//! 底部阻力律
//!
//! 给定屈服应力 τ_c 和底部速度 (u, v)，返回拖曳系数 β，
//! 使底部剪应力 τ_b = -β v。
//!
//! # 公式
//!
//! 塑性 (q = 0):
//! ```text
//! β = τ_c / sqrt(ε² + |v|²)
//! ```
//!
//! 伪塑性:
//! ```text
//! β = τ_c · u_th^(-q) · (ε² + |v|²)^((q-1)/2)
//! ```
//!
//! `drag_with_derivative` 同时返回 dβ/dα，其中 α = |v|²/2。

use std::fmt;

use gl_config::BasalResistanceParams;

/// 底部阻力律
pub trait BasalResistanceLaw: Send + Sync + fmt::Debug {
    /// 名称
    fn name(&self) -> &'static str;

    /// 拖曳系数 β [Pa s m-1]
    fn drag(&self, tauc: f64, u: f64, v: f64) -> f64;

    /// 拖曳系数及其对 |v|²/2 的导数
    fn drag_with_derivative(&self, tauc: f64, u: f64, v: f64) -> (f64, f64);
}

/// 塑性律
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlasticLaw {
    /// 正则化速度 ε [m s-1]
    pub regularization: f64,
}

impl PlasticLaw {
    #[inline]
    fn magreg2(&self, u: f64, v: f64) -> f64 {
        self.regularization * self.regularization + u * u + v * v
    }
}

impl BasalResistanceLaw for PlasticLaw {
    fn name(&self) -> &'static str {
        "plastic"
    }

    fn drag(&self, tauc: f64, u: f64, v: f64) -> f64 {
        tauc / self.magreg2(u, v).sqrt()
    }

    fn drag_with_derivative(&self, tauc: f64, u: f64, v: f64) -> (f64, f64) {
        let magreg2 = self.magreg2(u, v);
        let beta = tauc / magreg2.sqrt();
        (beta, -beta / magreg2)
    }
}

/// 伪塑性律
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PseudoPlasticLaw {
    /// 正则化速度 ε [m s-1]
    pub regularization: f64,
    /// 指数 q
    pub q: f64,
    /// 阈值速度 u_th [m s-1]
    pub u_threshold: f64,
}

impl PseudoPlasticLaw {
    #[inline]
    fn magreg2(&self, u: f64, v: f64) -> f64 {
        self.regularization * self.regularization + u * u + v * v
    }
}

impl BasalResistanceLaw for PseudoPlasticLaw {
    fn name(&self) -> &'static str {
        "pseudo_plastic"
    }

    fn drag(&self, tauc: f64, u: f64, v: f64) -> f64 {
        let magreg2 = self.magreg2(u, v);
        tauc * self.u_threshold.powf(-self.q) * magreg2.powf(0.5 * (self.q - 1.0))
    }

    fn drag_with_derivative(&self, tauc: f64, u: f64, v: f64) -> (f64, f64) {
        let magreg2 = self.magreg2(u, v);
        let beta = tauc * self.u_threshold.powf(-self.q) * magreg2.powf(0.5 * (self.q - 1.0));
        (beta, (self.q - 1.0) * beta / magreg2)
    }
}

/// 按参数选择阻力律
pub fn basal_resistance_law(params: &BasalResistanceParams) -> Box<dyn BasalResistanceLaw> {
    if params.pseudo_plastic {
        Box::new(PseudoPlasticLaw {
            regularization: params.regularization,
            q: params.q,
            u_threshold: params.u_threshold,
        })
    } else {
        Box::new(PlasticLaw {
            regularization: params.regularization,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gl_config::{Config, SECONDS_PER_YEAR};

    #[test]
    fn test_plastic_stress_equals_yield_stress() {
        let law = PlasticLaw { regularization: 1e-12 };
        let (u, v) = (3.0 / SECONDS_PER_YEAR, 4.0 / SECONDS_PER_YEAR);
        let beta = law.drag(1e5, u, v);
        let speed = (u * u + v * v).sqrt();
        assert!((beta * speed - 1e5).abs() / 1e5 < 1e-6);
    }

    #[test]
    fn test_pseudo_plastic_at_threshold() {
        let u_th = 100.0 / SECONDS_PER_YEAR;
        let law = PseudoPlasticLaw {
            regularization: 0.0,
            q: 0.25,
            u_threshold: u_th,
        };
        // |v| = u_th 时 τ_b = τ_c
        let beta = law.drag(2e5, u_th, 0.0);
        assert!((beta * u_th - 2e5).abs() / 2e5 < 1e-12);
    }

    #[test]
    fn test_q_zero_matches_plastic() {
        let eps = 0.01 / SECONDS_PER_YEAR;
        let plastic = PlasticLaw { regularization: eps };
        let pseudo = PseudoPlasticLaw {
            regularization: eps,
            q: 0.0,
            u_threshold: 1.0,
        };
        let (u, v) = (1e-6, -2e-6);
        let (b1, d1) = plastic.drag_with_derivative(5e4, u, v);
        let (b2, d2) = pseudo.drag_with_derivative(5e4, u, v);
        assert!((b1 - b2).abs() / b1 < 1e-12);
        assert!((d1 - d2).abs() / d1.abs() < 1e-12);
    }

    #[test]
    fn test_derivative_matches_finite_difference() {
        let law = PseudoPlasticLaw {
            regularization: 1e-9,
            q: 0.25,
            u_threshold: 3e-6,
        };
        let u = 2e-6;
        let (beta, dbeta) = law.drag_with_derivative(1e5, u, 0.0);
        // α = u²/2, dα = u du
        let du = 1e-12;
        let fd = (law.drag(1e5, u + du, 0.0) - beta) / (u * du);
        assert!((fd - dbeta).abs() / dbeta.abs() < 1e-4);
    }

    #[test]
    fn test_factory() {
        let mut config = Config::default();
        let params = BasalResistanceParams::from_config(&config).unwrap();
        assert_eq!(basal_resistance_law(&params).name(), "plastic");

        config.set_flag("do_pseudo_plastic_till", true).unwrap();
        let params = BasalResistanceParams::from_config(&config).unwrap();
        assert_eq!(basal_resistance_law(&params).name(), "pseudo_plastic");
    }
}
