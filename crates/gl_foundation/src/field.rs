// crates/gl_foundation/src/field.rs

//! 分布式场
//!
//! `Field<T>` 在网格上为每个单元存储 `dof` 个值：
//!
//! - 标量场: dof = 1
//! - 交错场: dof = 2，o = 0 为东侧边，o = 1 为北侧边
//! - 柱场: dof = 层数
//!
//! 本地存储覆盖拥有的分块加上 `stencil_width` 层幽灵点。
//!
//! # 访问会话
//!
//! 读写都通过作用域视图进行：
//!
//! - [`Field::view`] 返回只读的 [`FieldView`]
//! - [`Field::view_mut`] 返回可写的 [`FieldViewMut`]，释放时幽灵点标记为过期、
//!   状态计数器加一
//!
//! 幽灵点过期时读取分块之外的值会触发 debug 断言；
//! 调用 [`Field::update_ghosts`] 后幽灵点恢复有效。
//!
//! # 示例
//!
//! ```
//! use std::sync::Arc;
//! use gl_foundation::comm::SerialComm;
//! use gl_foundation::grid::{Grid, GridParams};
//! use gl_foundation::field::{Field, FieldMeta};
//!
//! let grid = Arc::new(Grid::new(GridParams::new(4, 4, 1.0, 1.0), SerialComm::shared()).unwrap());
//! let mut thk = Field::<f64>::scalar(grid, FieldMeta::new("thk", "ice thickness", "m"), 1).unwrap();
//! {
//!     let mut v = thk.view_mut();
//!     v[(1, 1)] = 100.0;
//! }
//! thk.update_ghosts().unwrap();
//! assert_eq!(thk.view()[(1, 1)], 100.0);
//! ```

use crate::comm::CommExt;
use crate::error::{GlError, GlResult};
use crate::grid::{Grid, Patch};
use bytemuck::Pod;
use glam::DVec2;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Index, IndexMut};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// 可存储在场中的值类型
pub trait FieldValue: Pod + Default + Send + Sync + PartialEq + fmt::Debug {}

impl<T> FieldValue for T where T: Pod + Default + Send + Sync + PartialEq + fmt::Debug {}

// ============================================================================
// 元数据
// ============================================================================

/// 场元数据
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FieldMeta {
    /// 短名称（注册表键）
    pub name: String,
    /// 长名称
    pub long_name: String,
    /// 内部单位
    pub units: String,
    /// 输出单位
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub glaciological_units: Option<String>,
    /// 标准名称
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub standard_name: Option<String>,
    /// 有效最小值
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub valid_min: Option<f64>,
}

impl FieldMeta {
    /// 创建元数据
    pub fn new(
        name: impl Into<String>,
        long_name: impl Into<String>,
        units: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            long_name: long_name.into(),
            units: units.into(),
            ..Default::default()
        }
    }

    /// 设置输出单位
    pub fn with_glaciological_units(mut self, units: impl Into<String>) -> Self {
        self.glaciological_units = Some(units.into());
        self
    }

    /// 设置标准名称
    pub fn with_standard_name(mut self, name: impl Into<String>) -> Self {
        self.standard_name = Some(name.into());
        self
    }

    /// 设置有效最小值
    pub fn with_valid_min(mut self, min: f64) -> Self {
        self.valid_min = Some(min);
        self
    }
}

// ============================================================================
// 场
// ============================================================================

/// 分布式场
pub struct Field<T: FieldValue> {
    grid: Arc<Grid>,
    meta: FieldMeta,
    dof: usize,
    levels: Vec<f64>,
    stencil_width: usize,
    ghosted: Patch,
    data: Vec<T>,
    ghosts_fresh: bool,
    state: AtomicU64,
}

impl<T: FieldValue> fmt::Debug for Field<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Field")
            .field("name", &self.meta.name)
            .field("dof", &self.dof)
            .field("stencil_width", &self.stencil_width)
            .field("patch", &self.grid.patch())
            .field("state", &self.state_counter())
            .finish()
    }
}

impl<T: FieldValue> Field<T> {
    /// 通用构造
    pub fn new(
        grid: Arc<Grid>,
        meta: FieldMeta,
        dof: usize,
        levels: Vec<f64>,
        stencil_width: usize,
    ) -> GlResult<Self> {
        if dof == 0 {
            return Err(GlError::invalid_input(format!("场 {} 的 dof 为 0", meta.name)));
        }
        if stencil_width > grid.max_stencil_width() {
            return Err(GlError::invalid_input(format!(
                "场 {} 的模板宽度 {} 超过网格最大值 {}",
                meta.name,
                stencil_width,
                grid.max_stencil_width()
            )));
        }
        let ghosted = grid.patch().grown(stencil_width as i32);
        let data = vec![T::default(); ghosted.len() * dof];
        Ok(Self {
            grid,
            meta,
            dof,
            levels,
            stencil_width,
            ghosted,
            data,
            ghosts_fresh: stencil_width == 0,
            state: AtomicU64::new(0),
        })
    }

    /// 标量场
    pub fn scalar(grid: Arc<Grid>, meta: FieldMeta, stencil_width: usize) -> GlResult<Self> {
        Self::new(grid, meta, 1, vec![0.0], stencil_width)
    }

    /// 交错场（每个单元的东侧边和北侧边）
    pub fn staggered(grid: Arc<Grid>, meta: FieldMeta, stencil_width: usize) -> GlResult<Self> {
        Self::new(grid, meta, 2, vec![0.0, 1.0], stencil_width)
    }

    /// 柱场
    pub fn column(
        grid: Arc<Grid>,
        meta: FieldMeta,
        levels: Vec<f64>,
        stencil_width: usize,
    ) -> GlResult<Self> {
        let dof = levels.len();
        Self::new(grid, meta, dof, levels, stencil_width)
    }

    /// 网格
    pub fn grid(&self) -> &Arc<Grid> {
        &self.grid
    }

    /// 元数据
    pub fn meta(&self) -> &FieldMeta {
        &self.meta
    }

    /// 修改元数据
    pub fn meta_mut(&mut self) -> &mut FieldMeta {
        &mut self.meta
    }

    /// 名称
    pub fn name(&self) -> &str {
        &self.meta.name
    }

    /// 每个单元的值个数
    pub fn dof(&self) -> usize {
        self.dof
    }

    /// 层坐标
    pub fn levels(&self) -> &[f64] {
        &self.levels
    }

    /// 模板宽度
    pub fn stencil_width(&self) -> usize {
        self.stencil_width
    }

    /// 本地存储覆盖的区域
    pub fn ghosted_patch(&self) -> Patch {
        self.ghosted
    }

    /// 幽灵点是否有效
    pub fn ghosts_fresh(&self) -> bool {
        self.ghosts_fresh
    }

    /// 状态计数器
    pub fn state_counter(&self) -> u64 {
        self.state.load(Ordering::Acquire)
    }

    /// 状态计数器加一
    pub fn inc_state_counter(&self) {
        self.state.fetch_add(1, Ordering::AcqRel);
    }

    #[inline]
    fn offset(&self, i: i32, j: i32) -> usize {
        debug_assert!(
            self.ghosted.contains(i, j),
            "场 {} 访问 ({i}, {j}) 超出本地存储 {:?}",
            self.meta.name,
            self.ghosted
        );
        let g = self.ghosted;
        ((j - g.ys) as usize * g.xm as usize + (i - g.xs) as usize) * self.dof
    }

    #[inline]
    fn check_read(&self, i: i32, j: i32) {
        debug_assert!(
            self.ghosts_fresh || self.grid.patch().contains(i, j),
            "场 {} 的幽灵点已过期，读取 ({i}, {j}) 前需要 update_ghosts",
            self.meta.name
        );
    }

    /// 只读视图
    pub fn view(&self) -> FieldView<'_, T> {
        FieldView { field: self }
    }

    /// 可写视图
    pub fn view_mut(&mut self) -> FieldViewMut<'_, T> {
        FieldViewMut {
            field: self,
            ghosts_written: false,
        }
    }

    /// 所有值（含幽灵点）设为 `value`
    pub fn set(&mut self, value: T) {
        self.data.fill(value);
        self.ghosts_fresh = true;
        self.inc_state_counter();
    }

    /// 从同形状的场复制
    pub fn copy_from(&mut self, other: &Field<T>) -> GlResult<()> {
        GlError::check_size("dof", self.dof, other.dof)?;
        GlError::check_size("patch", self.grid.patch().len(), other.grid.patch().len())?;

        if self.stencil_width == other.stencil_width {
            self.data.copy_from_slice(&other.data);
            self.ghosts_fresh = other.ghosts_fresh;
        } else {
            for (i, j) in self.grid.points() {
                let (dst, src) = (self.offset(i, j), other.offset(i, j));
                self.data[dst..dst + self.dof].copy_from_slice(&other.data[src..src + self.dof]);
            }
            self.ghosts_fresh = self.stencil_width == 0;
        }
        self.inc_state_counter();
        Ok(())
    }

    /// 拥有分块的值（行主序）
    pub fn owned_values(&self) -> Vec<T> {
        let mut out = Vec::with_capacity(self.grid.patch().len() * self.dof);
        for (i, j) in self.grid.points() {
            let k = self.offset(i, j);
            out.extend_from_slice(&self.data[k..k + self.dof]);
        }
        out
    }

    /// 由各 worker 的分块数据组装自然顺序的全局数组
    fn assemble(&self, parts: Vec<Vec<u8>>) -> GlResult<Vec<T>> {
        let mx = self.grid.mx();
        let mut global = vec![T::default(); mx * self.grid.my() * self.dof];
        for (rank, bytes) in parts.iter().enumerate() {
            let patch = self.grid.patch_of(rank);
            let values = decode::<T>(bytes)?;
            GlError::check_size("patch", patch.len() * self.dof, values.len())?;
            for (n, (i, j)) in patch.points().enumerate() {
                let dst = self.grid.natural_index(i, j) * self.dof;
                global[dst..dst + self.dof]
                    .copy_from_slice(&values[n * self.dof..(n + 1) * self.dof]);
            }
        }
        Ok(global)
    }

    /// 在所有 worker 上得到自然顺序的全局数组
    pub fn all_gather_natural(&self) -> GlResult<Vec<T>> {
        let local = bytemuck::cast_slice::<T, u8>(&self.owned_values()).to_vec();
        let parts = self.grid.comm().all_gather_bytes(local);
        self.assemble(parts)
    }

    /// 收集到 `root`，得到自然顺序（index = j·Mx + i）的全局数组
    pub fn gather_natural(&self, root: usize) -> GlResult<Option<Vec<T>>> {
        let local = bytemuck::cast_slice::<T, u8>(&self.owned_values()).to_vec();
        match self.grid.comm().gather_bytes(root, local) {
            Some(parts) => self.assemble(parts).map(Some),
            None => Ok(None),
        }
    }

    /// 从 `root` 上的自然顺序全局数组分发到各 worker 的分块
    ///
    /// 非根 worker 传入 `None`。根上的数组长度错误时所有 worker 都返回错误。
    pub fn scatter_natural(&mut self, root: usize, global: Option<&[T]>) -> GlResult<()> {
        let comm = Arc::clone(self.grid.comm());
        let expected = self.grid.mx() * self.grid.my() * self.dof;

        let mut root_error = None;
        let parts = if comm.rank() == root {
            match global {
                Some(g) if g.len() == expected => Some(
                    (0..comm.size())
                        .map(|rank| {
                            let mut piece = Vec::new();
                            for (i, j) in self.grid.patch_of(rank).points() {
                                let k = self.grid.natural_index(i, j) * self.dof;
                                piece.extend_from_slice(&g[k..k + self.dof]);
                            }
                            bytemuck::cast_slice::<T, u8>(&piece).to_vec()
                        })
                        .collect(),
                ),
                other => {
                    root_error = Some(GlError::size_mismatch(
                        "global",
                        expected,
                        other.map_or(0, <[T]>::len),
                    ));
                    Some(Vec::new())
                }
            }
        } else {
            None
        };

        let bytes = comm.scatter_bytes(root, parts);
        if let Some(e) = root_error {
            return Err(e);
        }
        let values = decode::<T>(&bytes)?;
        GlError::check_size("patch", self.grid.patch().len() * self.dof, values.len())?;

        for (n, (i, j)) in self.grid.points().enumerate() {
            let k = self.offset(i, j);
            self.data[k..k + self.dof].copy_from_slice(&values[n * self.dof..(n + 1) * self.dof]);
        }
        self.ghosts_fresh = self.stencil_width == 0;
        self.inc_state_counter();
        Ok(())
    }

    /// 幽灵层交换
    ///
    /// 周期方向回绕；非周期方向的域外幽灵点复制最近的域内单元。
    pub fn update_ghosts(&mut self) -> GlResult<()> {
        if self.stencil_width == 0 {
            self.ghosts_fresh = true;
            return Ok(());
        }

        let global = self.all_gather_natural()?;
        let owned = self.grid.patch();
        for (i, j) in self.ghosted.points() {
            if owned.contains(i, j) {
                continue;
            }
            let (gi, gj) = self.grid.wrap_or_clamp(i, j);
            let src = self.grid.natural_index(gi, gj) * self.dof;
            let dst = self.offset(i, j);
            self.data[dst..dst + self.dof].copy_from_slice(&global[src..src + self.dof]);
        }
        self.ghosts_fresh = true;
        Ok(())
    }
}

impl Field<f64> {
    /// 拥有分块上值的全局和
    pub fn global_sum(&self) -> f64 {
        let local: f64 = self.owned_values().iter().sum();
        self.grid.comm().sum_f64(local)
    }

    /// 拥有分块上的全局最大值
    pub fn global_max(&self) -> f64 {
        let local = self
            .owned_values()
            .into_iter()
            .fold(f64::NEG_INFINITY, f64::max);
        self.grid.comm().max_f64(local)
    }
}

impl Field<DVec2> {
    /// 向量模的全局最大值
    pub fn global_max_magnitude(&self) -> f64 {
        let local = self
            .owned_values()
            .into_iter()
            .map(|v| v.length())
            .fold(0.0, f64::max);
        self.grid.comm().max_f64(local)
    }
}

fn decode<T: FieldValue>(bytes: &[u8]) -> GlResult<Vec<T>> {
    let width = std::mem::size_of::<T>();
    if bytes.len() % width != 0 {
        return Err(GlError::serialization(format!(
            "字节长度 {} 不是元素大小 {} 的整数倍",
            bytes.len(),
            width
        )));
    }
    let mut out = vec![<T as bytemuck::Zeroable>::zeroed(); bytes.len() / width];
    bytemuck::cast_slice_mut::<T, u8>(&mut out).copy_from_slice(bytes);
    Ok(out)
}

// ============================================================================
// 视图
// ============================================================================

/// 只读访问会话
pub struct FieldView<'a, T: FieldValue> {
    field: &'a Field<T>,
}

impl<'a, T: FieldValue> FieldView<'a, T> {
    /// 所属场
    pub fn field(&self) -> &'a Field<T> {
        self.field
    }

    /// (i, j) 处的柱
    pub fn column(&self, i: i32, j: i32) -> &'a [T] {
        self.field.check_read(i, j);
        let k = self.field.offset(i, j);
        &self.field.data[k..k + self.field.dof]
    }
}

impl<T: FieldValue> Index<(i32, i32)> for FieldView<'_, T> {
    type Output = T;

    #[inline]
    fn index(&self, (i, j): (i32, i32)) -> &T {
        self.field.check_read(i, j);
        &self.field.data[self.field.offset(i, j)]
    }
}

impl<T: FieldValue> Index<(i32, i32, usize)> for FieldView<'_, T> {
    type Output = T;

    #[inline]
    fn index(&self, (i, j, k): (i32, i32, usize)) -> &T {
        self.field.check_read(i, j);
        debug_assert!(k < self.field.dof);
        &self.field.data[self.field.offset(i, j) + k]
    }
}

/// 可写访问会话
///
/// 释放时幽灵点标记为过期（除非调用了 [`FieldViewMut::mark_ghosts_written`]），
/// 状态计数器加一。
pub struct FieldViewMut<'a, T: FieldValue> {
    field: &'a mut Field<T>,
    ghosts_written: bool,
}

impl<T: FieldValue> FieldViewMut<'_, T> {
    /// 声明本会话已直接写入了全部幽灵点
    pub fn mark_ghosts_written(&mut self) {
        self.ghosts_written = true;
    }

    /// (i, j) 处的柱
    pub fn column(&self, i: i32, j: i32) -> &[T] {
        self.field.check_read(i, j);
        let k = self.field.offset(i, j);
        &self.field.data[k..k + self.field.dof]
    }

    /// (i, j) 处的可写柱
    pub fn column_mut(&mut self, i: i32, j: i32) -> &mut [T] {
        let k = self.field.offset(i, j);
        let dof = self.field.dof;
        &mut self.field.data[k..k + dof]
    }

    /// 拥有分块内所有单元的可写柱，便于并行处理
    pub fn owned_columns_mut(&mut self) -> Vec<((i32, i32), &mut [T])> {
        let g = self.field.ghosted;
        let owned = self.field.grid.patch();
        self.field
            .data
            .chunks_mut(self.field.dof)
            .enumerate()
            .map(|(n, col)| {
                let n = n as i32;
                ((g.xs + n % g.xm, g.ys + n / g.xm), col)
            })
            .filter(|((i, j), _)| owned.contains(*i, *j))
            .collect()
    }
}

impl<T: FieldValue> Index<(i32, i32)> for FieldViewMut<'_, T> {
    type Output = T;

    #[inline]
    fn index(&self, (i, j): (i32, i32)) -> &T {
        self.field.check_read(i, j);
        &self.field.data[self.field.offset(i, j)]
    }
}

impl<T: FieldValue> IndexMut<(i32, i32)> for FieldViewMut<'_, T> {
    #[inline]
    fn index_mut(&mut self, (i, j): (i32, i32)) -> &mut T {
        let k = self.field.offset(i, j);
        &mut self.field.data[k]
    }
}

impl<T: FieldValue> Index<(i32, i32, usize)> for FieldViewMut<'_, T> {
    type Output = T;

    #[inline]
    fn index(&self, (i, j, k): (i32, i32, usize)) -> &T {
        self.field.check_read(i, j);
        debug_assert!(k < self.field.dof);
        &self.field.data[self.field.offset(i, j) + k]
    }
}

impl<T: FieldValue> IndexMut<(i32, i32, usize)> for FieldViewMut<'_, T> {
    #[inline]
    fn index_mut(&mut self, (i, j, k): (i32, i32, usize)) -> &mut T {
        debug_assert!(k < self.field.dof);
        let n = self.field.offset(i, j) + k;
        &mut self.field.data[n]
    }
}

impl<T: FieldValue> Drop for FieldViewMut<'_, T> {
    fn drop(&mut self) {
        self.field.ghosts_fresh = self.field.stencil_width == 0 || self.ghosts_written;
        self.field.inc_state_counter();
    }
}

// ============================================================================
// 测试
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::comm::SerialComm;
    use crate::grid::{GridParams, Periodicity};

    fn grid(mx: usize, my: usize) -> Arc<Grid> {
        Arc::new(Grid::new(GridParams::new(mx, my, 1.0, 1.0), SerialComm::shared()).unwrap())
    }

    fn meta(name: &str) -> FieldMeta {
        FieldMeta::new(name, name, "1")
    }

    #[test]
    fn test_view_mut_increments_state() {
        let mut f = Field::<f64>::scalar(grid(3, 3), meta("a"), 1).unwrap();
        let before = f.state_counter();
        {
            let mut v = f.view_mut();
            v[(0, 0)] = 1.0;
        }
        assert_eq!(f.state_counter(), before + 1);
        assert!(!f.ghosts_fresh());
        f.update_ghosts().unwrap();
        assert!(f.ghosts_fresh());
    }

    #[test]
    fn test_clamped_ghosts() {
        let g = grid(3, 3);
        let mut f = Field::<f64>::scalar(g.clone(), meta("a"), 2).unwrap();
        {
            let mut v = f.view_mut();
            for (i, j) in g.points() {
                v[(i, j)] = (10 * j + i) as f64;
            }
        }
        f.update_ghosts().unwrap();
        let v = f.view();
        assert_eq!(v[(-1, 0)], 0.0);
        assert_eq!(v[(-2, -2)], 0.0);
        assert_eq!(v[(4, 1)], 12.0);
        assert_eq!(v[(1, 3)], 21.0);
    }

    #[test]
    fn test_periodic_ghosts() {
        let params = GridParams::new(4, 4, 1.0, 1.0).with_periodicity(Periodicity::XY);
        let g = Arc::new(Grid::new(params, SerialComm::shared()).unwrap());
        let mut f = Field::<i32>::scalar(g, meta("m"), 1).unwrap();
        {
            let mut v = f.view_mut();
            v[(3, 0)] = 7;
        }
        f.update_ghosts().unwrap();
        assert_eq!(f.view()[(-1, 0)], 7);
        assert_eq!(f.view()[(-1, 4)], 7);
    }

    #[test]
    fn test_column_access() {
        let mut f = Field::<f64>::column(grid(2, 2), meta("c"), vec![-2.0, -1.0, 0.0], 0).unwrap();
        {
            let mut v = f.view_mut();
            v.column_mut(1, 1).copy_from_slice(&[3.0, 2.0, 1.0]);
            v[(0, 1, 2)] = 5.0;
        }
        let v = f.view();
        assert_eq!(v.column(1, 1), &[3.0, 2.0, 1.0]);
        assert_eq!(v[(0, 1, 2)], 5.0);
        assert!(f.ghosts_fresh());
    }

    #[test]
    fn test_gather_scatter_serial() {
        let mut f = Field::<f64>::scalar(grid(3, 2), meta("a"), 1).unwrap();
        let global: Vec<f64> = (0..6).map(f64::from).collect();
        f.scatter_natural(0, Some(&global)).unwrap();
        assert_eq!(f.view()[(2, 1)], 5.0);
        assert_eq!(f.gather_natural(0).unwrap().unwrap(), global);
    }

    #[test]
    fn test_scatter_wrong_length() {
        let mut f = Field::<f64>::scalar(grid(3, 2), meta("a"), 1).unwrap();
        assert!(f.scatter_natural(0, Some(&[1.0, 2.0])).is_err());
    }

    #[test]
    fn test_owned_columns_mut() {
        let mut f = Field::<f64>::column(grid(3, 2), meta("c"), vec![0.0, 1.0], 1).unwrap();
        {
            let mut v = f.view_mut();
            let cols = v.owned_columns_mut();
            assert_eq!(cols.len(), 6);
            for ((i, j), col) in cols {
                col[1] = (i + 10 * j) as f64;
            }
        }
        f.update_ghosts().unwrap();
        assert_eq!(f.view()[(2, 1, 1)], 12.0);
    }

    #[test]
    fn test_copy_from_and_set() {
        let g = grid(3, 3);
        let mut a = Field::<f64>::scalar(g.clone(), meta("a"), 1).unwrap();
        let mut b = Field::<f64>::scalar(g, meta("b"), 0).unwrap();
        a.set(4.0);
        assert!(a.ghosts_fresh());
        b.copy_from(&a).unwrap();
        assert_eq!(b.view()[(2, 2)], 4.0);
        assert!((b.global_sum() - 36.0).abs() < 1e-12);
        assert_eq!(b.global_max(), 4.0);
    }

    #[test]
    fn test_stencil_too_wide() {
        assert!(Field::<f64>::scalar(grid(3, 3), meta("a"), 5).is_err());
    }
}
