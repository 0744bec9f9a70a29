// crates/gl_physics/src/stressbalance/surface_gradient.rs

//! 交错网格上的冰面梯度
//!
//! 输出两个交错场 `h_x`、`h_y`，分量 o = 0 位于东边 (i+1/2, j)，
//! o = 1 位于北边 (i, j+1/2)。在拥有的点及一圈幽灵点上计算，
//! 因此输入场模板宽度至少为 2，输出至少为 1。
//!
//! # 方法
//!
//! - `mahaffy`: 直接差分冰面高程
//! - `eta`: 对 η = H^{(2n+2)/n} 差分后换算，再加上床面坡度
//! - `haseloff`: Mahaffy 差分，高于对侧冰面的无冰邻点用伪冰面替换
//!
//! ```text
//! o = 0:  h_x = (h[i+1,j] - h[i,j]) / dx
//!         h_y = (h[i+1,j+1] + h[i,j+1] - h[i+1,j-1] - h[i,j-1]) / (4 dy)
//! o = 1:  h_y = (h[i,j+1] - h[i,j]) / dy
//!         h_x = (h[i+1,j+1] + h[i+1,j] - h[i-1,j+1] - h[i-1,j]) / (4 dx)
//! ```

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use gl_foundation::error::{GlError, GlResult};
use gl_foundation::field::{Field, FieldMeta, FieldView};
use gl_foundation::grid::Grid;

/// 梯度离散方法
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SurfaceGradientMethod {
    /// Mahaffy 差分
    Mahaffy,
    /// η 变换
    Eta,
    /// Haseloff 伪冰面
    Haseloff,
}

impl FromStr for SurfaceGradientMethod {
    type Err = GlError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "mahaffy" => Ok(Self::Mahaffy),
            "eta" => Ok(Self::Eta),
            "haseloff" => Ok(Self::Haseloff),
            other => Err(GlError::invalid_config(
                "surface_gradient_method",
                other,
                "可选值为 mahaffy, eta, haseloff",
            )),
        }
    }
}

impl fmt::Display for SurfaceGradientMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Mahaffy => "mahaffy",
            Self::Eta => "eta",
            Self::Haseloff => "haseloff",
        };
        f.write_str(name)
    }
}

/// 梯度计算的输入
pub struct GradientInputs<'a> {
    /// 冰面高程
    pub surface: &'a Field<f64>,
    /// 冰厚
    pub thickness: &'a Field<f64>,
    /// 床面高程
    pub bed: &'a Field<f64>,
}

// ============================================================================
// 模板
// ============================================================================

/// 东边上的 x 差分
#[inline]
fn diff_x_stag_e(f: &FieldView<'_, f64>, i: i32, j: i32, dx: f64) -> f64 {
    (f[(i + 1, j)] - f[(i, j)]) / dx
}

/// 东边上的 y 差分（四点平均）
#[inline]
fn diff_y_stag_e(f: &FieldView<'_, f64>, i: i32, j: i32, dy: f64) -> f64 {
    (f[(i + 1, j + 1)] + f[(i, j + 1)] - f[(i + 1, j - 1)] - f[(i, j - 1)]) / (4.0 * dy)
}

/// 北边上的 y 差分
#[inline]
fn diff_y_stag_n(f: &FieldView<'_, f64>, i: i32, j: i32, dy: f64) -> f64 {
    (f[(i, j + 1)] - f[(i, j)]) / dy
}

/// 北边上的 x 差分（四点平均）
#[inline]
fn diff_x_stag_n(f: &FieldView<'_, f64>, i: i32, j: i32, dx: f64) -> f64 {
    (f[(i + 1, j + 1)] + f[(i + 1, j)] - f[(i - 1, j + 1)] - f[(i - 1, j)]) / (4.0 * dx)
}

// ============================================================================
// 计算器
// ============================================================================

/// 冰面梯度计算器
#[derive(Debug)]
pub struct SurfaceGradient {
    method: SurfaceGradientMethod,
    glen_exponent: f64,
    /// η 工作场（模板宽度 2）
    eta: Option<Field<f64>>,
}

impl SurfaceGradient {
    /// 创建
    pub fn new(grid: &Arc<Grid>, method: SurfaceGradientMethod, glen_exponent: f64) -> GlResult<Self> {
        let eta = match method {
            SurfaceGradientMethod::Eta => {
                if glen_exponent <= 0.0 {
                    return Err(GlError::invalid_config(
                        "sia_Glen_exponent",
                        glen_exponent.to_string(),
                        "必须为正",
                    ));
                }
                Some(Field::scalar(
                    Arc::clone(grid),
                    FieldMeta::new("eta", "thickness raised to (2n+2)/n", ""),
                    2,
                )?)
            }
            _ => None,
        };
        Ok(Self {
            method,
            glen_exponent,
            eta,
        })
    }

    /// 方法
    pub fn method(&self) -> SurfaceGradientMethod {
        self.method
    }

    /// 计算 `h_x`、`h_y`
    pub fn compute(
        &mut self,
        inputs: &GradientInputs<'_>,
        h_x: &mut Field<f64>,
        h_y: &mut Field<f64>,
    ) -> GlResult<()> {
        check_staggered(h_x)?;
        check_staggered(h_y)?;
        match self.method {
            SurfaceGradientMethod::Mahaffy => {
                check_input(inputs.surface)?;
                mahaffy(inputs.surface, h_x, h_y);
            }
            SurfaceGradientMethod::Haseloff => {
                check_input(inputs.surface)?;
                check_input(inputs.thickness)?;
                check_input(inputs.bed)?;
                haseloff(inputs, h_x, h_y);
            }
            SurfaceGradientMethod::Eta => {
                check_input(inputs.thickness)?;
                check_input(inputs.bed)?;
                let n = self.glen_exponent;
                let eta = self
                    .eta
                    .as_mut()
                    .ok_or_else(|| GlError::internal("η 工作场未分配"))?;
                eta_method(n, inputs.thickness, inputs.bed, eta, h_x, h_y);
            }
        }
        Ok(())
    }
}

fn check_staggered(field: &Field<f64>) -> GlResult<()> {
    if field.dof() != 2 || field.stencil_width() < 1 {
        return Err(GlError::contract(format!(
            "梯度输出 {} 须为交错场且模板宽度 >= 1 (dof = {}, 宽度 = {})",
            field.name(),
            field.dof(),
            field.stencil_width()
        )));
    }
    Ok(())
}

fn check_input(field: &Field<f64>) -> GlResult<()> {
    if field.stencil_width() < 2 {
        return Err(GlError::contract(format!(
            "梯度输入 {} 的模板宽度 {} < 2",
            field.name(),
            field.stencil_width()
        )));
    }
    Ok(())
}

fn mahaffy(surface: &Field<f64>, h_x: &mut Field<f64>, h_y: &mut Field<f64>) {
    let grid = surface.grid().clone();
    let (dx, dy) = (grid.dx(), grid.dy());
    let h = surface.view();
    let mut hx = h_x.view_mut();
    let mut hy = h_y.view_mut();

    for (i, j) in grid.points_with_ghosts(1) {
        hx[(i, j, 0)] = diff_x_stag_e(&h, i, j, dx);
        hy[(i, j, 0)] = diff_y_stag_e(&h, i, j, dy);
        hy[(i, j, 1)] = diff_y_stag_n(&h, i, j, dy);
        hx[(i, j, 1)] = diff_x_stag_n(&h, i, j, dx);
    }
    hx.mark_ghosts_written();
    hy.mark_ghosts_written();
}

fn eta_method(
    n: f64,
    thickness: &Field<f64>,
    bed: &Field<f64>,
    eta: &mut Field<f64>,
    h_x: &mut Field<f64>,
    h_y: &mut Field<f64>,
) {
    let etapow = (2.0 * n + 2.0) / n;
    let invpow = 1.0 / etapow;
    let dinvpow = (-n - 2.0) / (2.0 * n + 2.0);

    let grid = thickness.grid().clone();
    let (dx, dy) = (grid.dx(), grid.dy());

    {
        let thk = thickness.view();
        let mut e = eta.view_mut();
        for (i, j) in grid.points_with_ghosts(2) {
            e[(i, j)] = thk[(i, j)].powf(etapow);
        }
        e.mark_ghosts_written();
    }

    let e = eta.view();
    let b = bed.view();
    let mut hx = h_x.view_mut();
    let mut hy = h_y.view_mut();

    for (i, j) in grid.points_with_ghosts(1) {
        // 东边
        let mean_eta = 0.5 * (e[(i + 1, j)] + e[(i, j)]);
        let (gx, gy) = if mean_eta > 0.0 {
            let factor = invpow * mean_eta.powf(dinvpow);
            (
                factor * diff_x_stag_e(&e, i, j, dx),
                factor * diff_y_stag_e(&e, i, j, dy),
            )
        } else {
            (0.0, 0.0)
        };
        hx[(i, j, 0)] = gx + diff_x_stag_e(&b, i, j, dx);
        hy[(i, j, 0)] = gy + diff_y_stag_e(&b, i, j, dy);

        // 北边
        let mean_eta = 0.5 * (e[(i, j + 1)] + e[(i, j)]);
        let (gx, gy) = if mean_eta > 0.0 {
            let factor = invpow * mean_eta.powf(dinvpow);
            (
                factor * diff_x_stag_n(&e, i, j, dx),
                factor * diff_y_stag_n(&e, i, j, dy),
            )
        } else {
            (0.0, 0.0)
        };
        hy[(i, j, 1)] = gy + diff_y_stag_n(&b, i, j, dy);
        hx[(i, j, 1)] = gx + diff_x_stag_n(&b, i, j, dx);
    }
    hx.mark_ghosts_written();
    hy.mark_ghosts_written();
}

fn haseloff(inputs: &GradientInputs<'_>, h_x: &mut Field<f64>, h_y: &mut Field<f64>) {
    const H_ICEFREE: f64 = 0.0;

    let grid = inputs.surface.grid().clone();
    let (dx, dy) = (grid.dx(), grid.dy());
    let h = inputs.surface.view();
    let thk = inputs.thickness.view();
    let b = inputs.bed.view();
    let mut hx = h_x.view_mut();
    let mut hy = h_y.view_mut();

    let icefree = |i: i32, j: i32| thk[(i, j)] <= H_ICEFREE;
    // 从 (pi, pj) 看邻点 (qi, qj) 的伪冰面高程
    let pseudo = |pi: i32, pj: i32, qi: i32, qj: i32| {
        let blocked = (icefree(qi, qj) && b[(qi, qj)] > h[(pi, pj)])
            || (icefree(pi, pj) && b[(pi, pj)] > h[(qi, qj)]);
        if blocked {
            h[(pi, pj)]
        } else {
            h[(qi, qj)]
        }
    };

    for (i, j) in grid.points_with_ghosts(1) {
        // 东边
        let hh_e = pseudo(i, j, i + 1, j);
        hx[(i, j, 0)] = (hh_e - h[(i, j)]) / dx;

        let hh_n = pseudo(i, j, i, j + 1);
        let hh_s = pseudo(i, j, i, j - 1);
        let hh_ne = pseudo(i + 1, j, i + 1, j + 1);
        let hh_se = pseudo(i + 1, j, i + 1, j - 1);
        hy[(i, j, 0)] = (hh_ne + hh_n - hh_se - hh_s) / (4.0 * dy);

        // 北边
        let hh_n = pseudo(i, j, i, j + 1);
        hy[(i, j, 1)] = (hh_n - h[(i, j)]) / dy;

        let hh_e = pseudo(i, j, i + 1, j);
        let hh_w = pseudo(i, j, i - 1, j);
        let hh_ne = pseudo(i, j + 1, i + 1, j + 1);
        let hh_nw = pseudo(i, j + 1, i - 1, j + 1);
        hx[(i, j, 1)] = (hh_ne + hh_e - hh_nw - hh_w) / (4.0 * dx);
    }
    hx.mark_ghosts_written();
    hy.mark_ghosts_written();
}
