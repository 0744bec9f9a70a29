// crates/gl_physics/src/mask.rs

//! 单元类型掩码与几何计算
//!
//! 掩码取值：
//!
//! | 值 | 含义 |
//! |----|------|
//! | -1 | 未知 |
//! | 0  | 无冰基岩 |
//! | 2  | 接地冰 |
//! | 3  | 浮冰 |
//! | 4  | 无冰海洋 |
//!
//! [`GeometryCalculator`] 由床面高程和冰厚按浮力判据计算掩码和冰面高程；
//! [`MaskQuery`] 在掩码视图上提供谓词。

use gl_config::GeometryParams;
use gl_foundation::error::{GlError, GlResult};
use gl_foundation::field::{Field, FieldView};

/// 未知
pub const MASK_UNKNOWN: i32 = -1;
/// 无冰基岩
pub const MASK_ICE_FREE_BEDROCK: i32 = 0;
/// 接地冰
pub const MASK_GROUNDED: i32 = 2;
/// 浮冰
pub const MASK_FLOATING: i32 = 3;
/// 无冰海洋
pub const MASK_ICE_FREE_OCEAN: i32 = 4;

/// 海洋（浮冰或无冰海洋）
#[inline]
pub fn is_ocean(m: i32) -> bool {
    m >= MASK_FLOATING
}

/// 接地（接地冰或无冰基岩），未知类型不算接地
#[inline]
pub fn is_grounded(m: i32) -> bool {
    m == MASK_GROUNDED || m == MASK_ICE_FREE_BEDROCK
}

/// 有冰
#[inline]
pub fn is_icy(m: i32) -> bool {
    m == MASK_GROUNDED || m == MASK_FLOATING
}

/// 无冰
#[inline]
pub fn is_ice_free(m: i32) -> bool {
    !is_icy(m)
}

/// 接地冰
#[inline]
pub fn is_grounded_ice(m: i32) -> bool {
    m == MASK_GROUNDED
}

/// 浮冰
#[inline]
pub fn is_floating_ice(m: i32) -> bool {
    m == MASK_FLOATING
}

/// 无冰海洋
#[inline]
pub fn is_ice_free_ocean(m: i32) -> bool {
    m == MASK_ICE_FREE_OCEAN
}

/// 无冰陆地
#[inline]
pub fn is_ice_free_land(m: i32) -> bool {
    m == MASK_ICE_FREE_BEDROCK
}

// ============================================================================
// 掩码查询
// ============================================================================

/// 掩码谓词
///
/// `next_to_*` 读取四邻域，需要掩码幽灵点有效。
pub struct MaskQuery<'a> {
    mask: FieldView<'a, i32>,
}

impl<'a> MaskQuery<'a> {
    /// 包装掩码场
    pub fn new(mask: &'a Field<i32>) -> Self {
        Self { mask: mask.view() }
    }

    /// 原始值
    #[inline]
    pub fn value(&self, i: i32, j: i32) -> i32 {
        self.mask[(i, j)]
    }

    /// 海洋
    #[inline]
    pub fn ocean(&self, i: i32, j: i32) -> bool {
        is_ocean(self.value(i, j))
    }

    /// 接地
    #[inline]
    pub fn grounded(&self, i: i32, j: i32) -> bool {
        is_grounded(self.value(i, j))
    }

    /// 有冰
    #[inline]
    pub fn icy(&self, i: i32, j: i32) -> bool {
        is_icy(self.value(i, j))
    }

    /// 无冰
    #[inline]
    pub fn ice_free(&self, i: i32, j: i32) -> bool {
        is_ice_free(self.value(i, j))
    }

    /// 接地冰
    #[inline]
    pub fn grounded_ice(&self, i: i32, j: i32) -> bool {
        is_grounded_ice(self.value(i, j))
    }

    /// 浮冰
    #[inline]
    pub fn floating_ice(&self, i: i32, j: i32) -> bool {
        is_floating_ice(self.value(i, j))
    }

    /// 无冰海洋
    #[inline]
    pub fn ice_free_ocean(&self, i: i32, j: i32) -> bool {
        is_ice_free_ocean(self.value(i, j))
    }

    /// 无冰陆地
    #[inline]
    pub fn ice_free_land(&self, i: i32, j: i32) -> bool {
        is_ice_free_land(self.value(i, j))
    }

    fn any_neighbor(&self, i: i32, j: i32, pred: impl Fn(i32) -> bool) -> bool {
        [(i + 1, j), (i - 1, j), (i, j + 1), (i, j - 1)]
            .into_iter()
            .any(|(a, b)| pred(self.value(a, b)))
    }

    /// 四邻域内有浮冰
    pub fn next_to_floating_ice(&self, i: i32, j: i32) -> bool {
        self.any_neighbor(i, j, is_floating_ice)
    }

    /// 四邻域内有无冰海洋
    pub fn next_to_ice_free_ocean(&self, i: i32, j: i32) -> bool {
        self.any_neighbor(i, j, is_ice_free_ocean)
    }

    /// 四邻域内有接地冰
    pub fn next_to_grounded_ice(&self, i: i32, j: i32) -> bool {
        self.any_neighbor(i, j, is_grounded_ice)
    }

    /// 四邻域内有无冰陆地
    pub fn next_to_ice_free_land(&self, i: i32, j: i32) -> bool {
        self.any_neighbor(i, j, is_ice_free_land)
    }
}

// ============================================================================
// 几何计算
// ============================================================================

/// 浮力判据下的掩码与冰面计算
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeometryCalculator {
    /// 海平面 [m]
    pub sea_level: f64,
    /// 冰密度 [kg m-3]
    pub ice_density: f64,
    /// 海水密度 [kg m-3]
    pub ocean_density: f64,
    /// 不超过该厚度视为无冰 [m]
    pub icefree_thickness: f64,
}

impl GeometryCalculator {
    /// 由参数创建
    pub fn new(params: &GeometryParams, sea_level: f64) -> Self {
        Self {
            sea_level,
            ice_density: params.ice_density,
            ocean_density: params.ocean_density,
            icefree_thickness: params.icefree_thickness,
        }
    }

    /// 单点计算，返回 (掩码, 冰面高程)
    #[inline]
    pub fn compute_point(&self, bed: f64, thickness: f64) -> (i32, f64) {
        let h_grounded = bed + thickness;
        let h_floating = self.sea_level + (1.0 - self.ice_density / self.ocean_density) * thickness;
        let floating = h_floating > h_grounded;
        let ice_free = thickness <= self.icefree_thickness;

        let mask = match (floating, ice_free) {
            (true, true) => MASK_ICE_FREE_OCEAN,
            (true, false) => MASK_FLOATING,
            (false, true) => MASK_ICE_FREE_BEDROCK,
            (false, false) => MASK_GROUNDED,
        };
        let surface = if floating { h_floating } else { h_grounded };
        (mask, surface)
    }

    /// 在拥有的点及幽灵环上计算掩码和冰面
    ///
    /// 输入场的幽灵点须有效；计算宽度取两个输出场模板宽度的较小值，
    /// 输出幽灵点直接写入，无需再交换。
    pub fn compute(
        &self,
        bed: &Field<f64>,
        thickness: &Field<f64>,
        mask: &mut Field<i32>,
        surface: &mut Field<f64>,
    ) -> GlResult<()> {
        let width = mask
            .stencil_width()
            .min(surface.stencil_width())
            .min(bed.stencil_width())
            .min(thickness.stencil_width());
        if width < mask.stencil_width() || width < surface.stencil_width() {
            return Err(GlError::contract(format!(
                "几何计算的输入模板宽度 ({}, {}) 小于输出模板宽度 ({}, {})",
                bed.stencil_width(),
                thickness.stencil_width(),
                mask.stencil_width(),
                surface.stencil_width()
            )));
        }

        let grid = bed.grid().clone();
        let b = bed.view();
        let h = thickness.view();
        let mut m = mask.view_mut();
        let mut s = surface.view_mut();
        for (i, j) in grid.points_with_ghosts(width) {
            let (mask_value, surface_value) = self.compute_point(b[(i, j)], h[(i, j)]);
            m[(i, j)] = mask_value;
            s[(i, j)] = surface_value;
        }
        m.mark_ghosts_written();
        s.mark_ghosts_written();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gl_foundation::comm::SerialComm;
    use gl_foundation::field::FieldMeta;
    use gl_foundation::grid::{Grid, GridParams};
    use std::sync::Arc;

    fn calculator() -> GeometryCalculator {
        GeometryCalculator {
            sea_level: 0.0,
            ice_density: 910.0,
            ocean_density: 1028.0,
            icefree_thickness: 0.01,
        }
    }

    #[test]
    fn test_classification() {
        let gc = calculator();
        // 陆地上的冰
        assert_eq!(gc.compute_point(100.0, 500.0), (MASK_GROUNDED, 600.0));
        // 陆地无冰
        assert_eq!(gc.compute_point(100.0, 0.0).0, MASK_ICE_FREE_BEDROCK);
        // 深水中的薄冰漂浮
        let (m, s) = gc.compute_point(-1000.0, 200.0);
        assert_eq!(m, MASK_FLOATING);
        assert!((s - 200.0 * (1.0 - 910.0 / 1028.0)).abs() < 1e-9);
        // 浅水中的厚冰接地
        assert_eq!(gc.compute_point(-100.0, 500.0).0, MASK_GROUNDED);
        // 海底无冰
        assert_eq!(gc.compute_point(-10.0, 0.0).0, MASK_ICE_FREE_OCEAN);
    }

    #[test]
    fn test_flotation_threshold() {
        let gc = calculator();
        let h = 1000.0;
        let b_flot = -910.0 / 1028.0 * h;
        assert_eq!(gc.compute_point(b_flot - 1.0, h).0, MASK_FLOATING);
        assert_eq!(gc.compute_point(b_flot + 1.0, h).0, MASK_GROUNDED);
    }

    #[test]
    fn test_predicates() {
        assert!(is_ocean(MASK_FLOATING) && is_ocean(MASK_ICE_FREE_OCEAN));
        assert!(is_grounded(MASK_GROUNDED) && is_grounded(MASK_ICE_FREE_BEDROCK));
        assert!(!is_grounded(MASK_UNKNOWN) && !is_ocean(MASK_UNKNOWN));
        assert!(is_icy(MASK_GROUNDED) && is_icy(MASK_FLOATING));
        assert!(is_ice_free(MASK_ICE_FREE_OCEAN) && is_ice_free(MASK_UNKNOWN));
    }

    #[test]
    fn test_compute_field_and_query() {
        let grid = Arc::new(Grid::new(GridParams::new(4, 3, 1.0, 1.0), SerialComm::shared()).unwrap());
        let meta = |n: &str| FieldMeta::new(n, n, "m");
        let mut bed = Field::scalar(grid.clone(), meta("topg"), 2).unwrap();
        let mut thk = Field::scalar(grid.clone(), meta("thk"), 2).unwrap();
        let mut mask = Field::scalar(grid.clone(), meta("mask"), 2).unwrap();
        let mut usurf = Field::scalar(grid.clone(), meta("usurf"), 2).unwrap();
        {
            let mut b = bed.view_mut();
            let mut h = thk.view_mut();
            for (i, j) in grid.points() {
                b[(i, j)] = if i < 2 { 100.0 } else { -1000.0 };
                h[(i, j)] = if i == 3 { 0.0 } else { 300.0 };
            }
        }
        bed.update_ghosts().unwrap();
        thk.update_ghosts().unwrap();

        calculator().compute(&bed, &thk, &mut mask, &mut usurf).unwrap();
        assert!(mask.ghosts_fresh());

        let q = MaskQuery::new(&mask);
        assert!(q.grounded_ice(1, 1));
        assert!(q.floating_ice(2, 1));
        assert!(q.ice_free_ocean(3, 1));
        assert!(q.next_to_floating_ice(1, 1));
        assert!(q.next_to_ice_free_ocean(2, 1));
        assert!(q.next_to_grounded_ice(2, 1));
        assert!(!q.next_to_ice_free_land(2, 1));
        // 非周期边界复制最近单元
        assert!(q.ice_free_ocean(4, 1));
        assert_eq!(usurf.view()[(0, 0)], 400.0);
    }
}
