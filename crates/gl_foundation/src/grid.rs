// crates/gl_foundation/src/grid.rs

//! 分布式结构网格
//!
//! 水平域为 Mx × My 个单元，x ∈ [−Lx, Lx]，y ∈ [−Ly, Ly]。
//! 域按近似正方形的 px × py 进程布局划分，rank = pj·px + pi，
//! 每个 worker 拥有一个分块 (xs..xs+xm, ys..ys+ym)。
//!
//! # 坐标
//!
//! - 非周期方向: dx = 2Lx/(Mx−1)，x_i = −Lx + i·dx（节点位于边界上）
//! - 周期方向: dx = 2Lx/Mx，x_i = −Lx + (i + 1/2)·dx（单元中心）
//!
//! # 自然顺序
//!
//! 全局数组按行主序排列，index = j·Mx + i。

use crate::comm::Communicator;
use crate::error::{GlError, GlResult};
use serde::{Deserialize, Serialize};
use tracing::debug;
use std::fmt;
use std::sync::Arc;

/// 周期性
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Periodicity {
    /// 无周期
    #[default]
    None,
    /// x 方向周期
    X,
    /// y 方向周期
    Y,
    /// 两个方向都周期
    XY,
}

impl Periodicity {
    /// x 方向是否周期
    pub fn x(self) -> bool {
        matches!(self, Self::X | Self::XY)
    }

    /// y 方向是否周期
    pub fn y(self) -> bool {
        matches!(self, Self::Y | Self::XY)
    }
}

/// 网格参数
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GridParams {
    /// x 方向单元数
    pub mx: usize,
    /// y 方向单元数
    pub my: usize,
    /// x 方向半宽 [m]
    pub lx: f64,
    /// y 方向半宽 [m]
    pub ly: f64,
    /// 周期性
    #[serde(default)]
    pub periodicity: Periodicity,
    /// 进程布局 (px, py)，缺省时自动选择
    #[serde(default)]
    pub procs: Option<(usize, usize)>,
    /// 冰柱层数
    #[serde(default = "default_mz")]
    pub mz: usize,
    /// 冰柱高度 [m]
    #[serde(default)]
    pub lz: f64,
    /// 最大模板宽度
    #[serde(default = "default_stencil")]
    pub max_stencil_width: usize,
}

fn default_mz() -> usize {
    1
}

fn default_stencil() -> usize {
    2
}

impl GridParams {
    /// 创建正方形单元的二维网格参数
    pub fn new(mx: usize, my: usize, lx: f64, ly: f64) -> Self {
        Self {
            mx,
            my,
            lx,
            ly,
            periodicity: Periodicity::None,
            procs: None,
            mz: default_mz(),
            lz: 0.0,
            max_stencil_width: default_stencil(),
        }
    }

    /// 设置冰柱层
    pub fn with_ice_levels(mut self, mz: usize, lz: f64) -> Self {
        self.mz = mz;
        self.lz = lz;
        self
    }

    /// 设置周期性
    pub fn with_periodicity(mut self, periodicity: Periodicity) -> Self {
        self.periodicity = periodicity;
        self
    }

    /// 指定进程布局
    pub fn with_procs(mut self, px: usize, py: usize) -> Self {
        self.procs = Some((px, py));
        self
    }

    /// 验证参数
    pub fn validate(&self) -> GlResult<()> {
        if self.mx < 2 || self.my < 2 {
            return Err(GlError::invalid_config(
                "grid",
                format!("{}x{}", self.mx, self.my),
                "Mx 和 My 至少为 2",
            ));
        }
        if !(self.lx > 0.0 && self.ly > 0.0) {
            return Err(GlError::invalid_config(
                "grid",
                format!("Lx={}, Ly={}", self.lx, self.ly),
                "半宽必须为正",
            ));
        }
        if self.mz > 1 && self.lz <= 0.0 {
            return Err(GlError::invalid_config(
                "grid_Lz",
                self.lz.to_string(),
                "Mz > 1 时 Lz 必须为正",
            ));
        }
        Ok(())
    }
}

/// worker 拥有的分块
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Patch {
    /// 起始 i
    pub xs: i32,
    /// i 方向宽度
    pub xm: i32,
    /// 起始 j
    pub ys: i32,
    /// j 方向宽度
    pub ym: i32,
}

impl Patch {
    /// 是否包含 (i, j)
    #[inline]
    pub fn contains(&self, i: i32, j: i32) -> bool {
        i >= self.xs && i < self.xs + self.xm && j >= self.ys && j < self.ys + self.ym
    }

    /// 单元数
    #[inline]
    pub fn len(&self) -> usize {
        (self.xm.max(0) * self.ym.max(0)) as usize
    }

    /// 是否为空
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 按行主序遍历分块内的点
    pub fn points(&self) -> impl Iterator<Item = (i32, i32)> {
        let Patch { xs, xm, ys, ym } = *self;
        (ys..ys + ym).flat_map(move |j| (xs..xs + xm).map(move |i| (i, j)))
    }

    /// 向外扩展 `w` 层
    pub fn grown(&self, w: i32) -> Patch {
        Patch {
            xs: self.xs - w,
            xm: self.xm + 2 * w,
            ys: self.ys - w,
            ym: self.ym + 2 * w,
        }
    }
}

/// 一维均匀划分：返回第 `p` 段的 (起点, 长度)
fn split(n: usize, parts: usize, p: usize) -> (i32, i32) {
    let base = n / parts;
    let extra = n % parts;
    let start = p * base + p.min(extra);
    let len = base + usize::from(p < extra);
    (start as i32, len as i32)
}

/// 为 `size` 个 worker 选择最接近网格长宽比的布局
fn choose_layout(mx: usize, my: usize, size: usize) -> (usize, usize) {
    let mut best = (size, 1);
    let mut best_cost = f64::INFINITY;
    for px in (1..=size).filter(|px| size % px == 0) {
        let py = size / px;
        let cost = (mx as f64 / px as f64 - my as f64 / py as f64).abs();
        if cost < best_cost {
            best = (px, py);
            best_cost = cost;
        }
    }
    best
}

/// 分布式网格
pub struct Grid {
    params: GridParams,
    comm: Arc<dyn Communicator>,
    px: usize,
    py: usize,
    dx: f64,
    dy: f64,
    x: Vec<f64>,
    y: Vec<f64>,
    zlevels: Vec<f64>,
    patches: Vec<Patch>,
}

impl fmt::Debug for Grid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Grid")
            .field("mx", &self.params.mx)
            .field("my", &self.params.my)
            .field("dx", &self.dx)
            .field("dy", &self.dy)
            .field("procs", &(self.px, self.py))
            .field("rank", &self.comm.rank())
            .finish()
    }
}

impl Grid {
    /// 创建网格
    pub fn new(params: GridParams, comm: Arc<dyn Communicator>) -> GlResult<Self> {
        params.validate()?;

        let size = comm.size();
        let (px, py) = match params.procs {
            Some((px, py)) => {
                if px * py != size {
                    return Err(GlError::invalid_config(
                        "procs",
                        format!("{px}x{py}"),
                        format!("进程布局与 worker 数 {size} 不一致"),
                    ));
                }
                (px, py)
            }
            None => choose_layout(params.mx, params.my, size),
        };
        if px > params.mx || py > params.my {
            return Err(GlError::invalid_config(
                "procs",
                format!("{px}x{py}"),
                format!("网格 {}x{} 过小，无法划分", params.mx, params.my),
            ));
        }

        let patches = (0..size)
            .map(|r| {
                let (pi, pj) = (r % px, r / px);
                let (xs, xm) = split(params.mx, px, pi);
                let (ys, ym) = split(params.my, py, pj);
                Patch { xs, xm, ys, ym }
            })
            .collect();

        let (dx, x) = axis(params.mx, params.lx, params.periodicity.x());
        let (dy, y) = axis(params.my, params.ly, params.periodicity.y());
        let zlevels = if params.mz > 1 {
            let dz = params.lz / (params.mz - 1) as f64;
            (0..params.mz).map(|k| k as f64 * dz).collect()
        } else {
            vec![0.0]
        };

        if comm.rank() == 0 {
            debug!(
                "网格 {}x{} 划分为 {}x{} 块, dx = {}, dy = {}",
                params.mx, params.my, px, py, dx, dy
            );
        }

        Ok(Self {
            params,
            comm,
            px,
            py,
            dx,
            dy,
            x,
            y,
            zlevels,
            patches,
        })
    }

    /// 网格参数
    pub fn params(&self) -> &GridParams {
        &self.params
    }

    /// 通信器
    pub fn comm(&self) -> &Arc<dyn Communicator> {
        &self.comm
    }

    /// 当前 worker 编号
    pub fn rank(&self) -> usize {
        self.comm.rank()
    }

    /// worker 数
    pub fn size(&self) -> usize {
        self.comm.size()
    }

    /// x 方向单元数
    pub fn mx(&self) -> usize {
        self.params.mx
    }

    /// y 方向单元数
    pub fn my(&self) -> usize {
        self.params.my
    }

    /// x 方向间距
    pub fn dx(&self) -> f64 {
        self.dx
    }

    /// y 方向间距
    pub fn dy(&self) -> f64 {
        self.dy
    }

    /// x 半宽
    pub fn lx(&self) -> f64 {
        self.params.lx
    }

    /// y 半宽
    pub fn ly(&self) -> f64 {
        self.params.ly
    }

    /// 进程布局
    pub fn procs(&self) -> (usize, usize) {
        (self.px, self.py)
    }

    /// 周期性
    pub fn periodicity(&self) -> Periodicity {
        self.params.periodicity
    }

    /// 最大模板宽度
    pub fn max_stencil_width(&self) -> usize {
        self.params.max_stencil_width
    }

    /// x 坐标
    pub fn x(&self) -> &[f64] {
        &self.x
    }

    /// y 坐标
    pub fn y(&self) -> &[f64] {
        &self.y
    }

    /// 冰柱层高度 z ∈ [0, Lz]
    pub fn z(&self) -> &[f64] {
        &self.zlevels
    }

    /// 冰柱层数
    pub fn mz(&self) -> usize {
        self.zlevels.len()
    }

    /// 单元面积
    pub fn cell_area(&self) -> f64 {
        self.dx * self.dy
    }

    /// 当前 worker 的分块
    pub fn patch(&self) -> Patch {
        self.patches[self.comm.rank()]
    }

    /// 指定 worker 的分块
    pub fn patch_of(&self, rank: usize) -> Patch {
        self.patches[rank]
    }

    /// 自然顺序索引
    #[inline]
    pub fn natural_index(&self, i: i32, j: i32) -> usize {
        j as usize * self.params.mx + i as usize
    }

    /// 将任意索引映射到域内：周期方向回绕，非周期方向截断到最近的域内单元
    #[inline]
    pub fn wrap_or_clamp(&self, i: i32, j: i32) -> (i32, i32) {
        let (mx, my) = (self.params.mx as i32, self.params.my as i32);
        let i = if self.params.periodicity.x() {
            i.rem_euclid(mx)
        } else {
            i.clamp(0, mx - 1)
        };
        let j = if self.params.periodicity.y() {
            j.rem_euclid(my)
        } else {
            j.clamp(0, my - 1)
        };
        (i, j)
    }

    /// 遍历当前 worker 拥有的点
    pub fn points(&self) -> impl Iterator<Item = (i32, i32)> {
        self.patch().points()
    }

    /// 遍历拥有的点及 `width` 层幽灵点
    pub fn points_with_ghosts(&self, width: usize) -> impl Iterator<Item = (i32, i32)> {
        self.patch().grown(width as i32).points()
    }
}

/// 一维坐标轴
fn axis(m: usize, half: f64, periodic: bool) -> (f64, Vec<f64>) {
    if periodic {
        let d = 2.0 * half / m as f64;
        (d, (0..m).map(|i| -half + (i as f64 + 0.5) * d).collect())
    } else {
        let d = 2.0 * half / (m - 1) as f64;
        (d, (0..m).map(|i| -half + i as f64 * d).collect())
    }
}

// ============================================================================
// 测试
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::comm::{SerialComm, ThreadComm};

    #[test]
    fn test_coordinates_non_periodic() {
        let grid = Grid::new(GridParams::new(5, 3, 1000.0, 500.0), SerialComm::shared()).unwrap();
        assert!((grid.dx() - 500.0).abs() < 1e-12);
        assert!((grid.dy() - 500.0).abs() < 1e-12);
        assert!((grid.x()[0] + 1000.0).abs() < 1e-12);
        assert!((grid.x()[4] - 1000.0).abs() < 1e-12);
        assert_eq!(grid.patch(), Patch { xs: 0, xm: 5, ys: 0, ym: 3 });
    }

    #[test]
    fn test_coordinates_periodic() {
        let params = GridParams::new(4, 4, 2.0, 2.0).with_periodicity(Periodicity::XY);
        let grid = Grid::new(params, SerialComm::shared()).unwrap();
        assert!((grid.dx() - 1.0).abs() < 1e-12);
        assert!((grid.x()[0] + 1.5).abs() < 1e-12);
        assert_eq!(grid.wrap_or_clamp(-1, 4), (3, 0));
    }

    #[test]
    fn test_clamp_non_periodic() {
        let grid = Grid::new(GridParams::new(4, 4, 1.0, 1.0), SerialComm::shared()).unwrap();
        assert_eq!(grid.wrap_or_clamp(-2, 5), (0, 3));
    }

    #[test]
    fn test_decomposition_covers_domain() {
        let patches = ThreadComm::run(6, |comm| {
            let grid = Grid::new(GridParams::new(13, 7, 1.0, 1.0), comm).unwrap();
            (grid.procs(), grid.patch())
        });

        let mut covered = vec![0u8; 13 * 7];
        for (procs, patch) in &patches {
            assert_eq!(procs.0 * procs.1, 6);
            for (i, j) in patch.points() {
                covered[j as usize * 13 + i as usize] += 1;
            }
        }
        assert!(covered.iter().all(|&c| c == 1));
    }

    #[test]
    fn test_layout_follows_aspect_ratio() {
        assert_eq!(choose_layout(100, 100, 4), (2, 2));
        assert_eq!(choose_layout(400, 100, 4), (4, 1));
    }

    #[test]
    fn test_invalid_params() {
        assert!(Grid::new(GridParams::new(1, 5, 1.0, 1.0), SerialComm::shared()).is_err());
        let params = GridParams::new(5, 5, 1.0, 1.0).with_procs(2, 2);
        assert!(Grid::new(params, SerialComm::shared()).is_err());
    }

    #[test]
    fn test_ice_levels() {
        let params = GridParams::new(3, 3, 1.0, 1.0).with_ice_levels(5, 4000.0);
        let grid = Grid::new(params, SerialComm::shared()).unwrap();
        assert_eq!(grid.mz(), 5);
        assert!((grid.z()[4] - 4000.0).abs() < 1e-9);
    }
}
