// crates/gl_physics/src/iceberg.rs

//! 冰山移除
//!
//! 与接地冰（或 Dirichlet 固定的有冰单元）不连通的浮冰视为冰山，
//! 其厚度置零、掩码改为无冰海洋。
//!
//! # 流程
//!
//! 1. 在私有标签场上标记：接地冰为 2（种子），浮冰为 1（候选），其余为 0；
//!    固定 (`bcflag` = 1) 且有冰的单元标为 2
//! 2. 把标签按自然顺序收集到 worker 0，串行求四邻域连通分量，
//!    不与任何种子连通的候选单元为冰山；结果分发回各 worker
//! 3. 拥有的冰山单元（未固定）: H = 0，掩码 = 无冰海洋
//! 4. 交换 H 和掩码的幽灵点
//!
//! 结果与 worker 数和划分方式无关。

use std::collections::VecDeque;
use std::sync::Arc;

use gl_foundation::comm::CommExt;
use gl_foundation::error::GlResult;
use gl_foundation::field::{Field, FieldMeta};
use gl_foundation::grid::Grid;
use gl_foundation::vars::{upgrade, Vars, WeakField};
use tracing::debug;

use crate::mask::{is_floating_ice, is_grounded_ice, is_icy, MASK_ICE_FREE_OCEAN};

/// 种子标签
const LABEL_SEED: i32 = 2;
/// 候选标签
const LABEL_CANDIDATE: i32 = 1;

/// 在自然顺序的标签数组上标出冰山
///
/// 输入: 2 = 种子，1 = 候选，0 = 空。输出: 1 = 冰山，0 = 保留。
/// 四邻域连通，不跨越区域边界。
pub fn label_icebergs(labels: &mut [i32], mx: usize, my: usize) {
    debug_assert_eq!(labels.len(), mx * my);

    let mut reached = vec![false; labels.len()];
    let mut queue: VecDeque<usize> = labels
        .iter()
        .enumerate()
        .filter(|(_, &l)| l == LABEL_SEED)
        .map(|(n, _)| n)
        .collect();
    for &n in &queue {
        reached[n] = true;
    }

    while let Some(n) = queue.pop_front() {
        let (i, j) = (n % mx, n / mx);
        let mut visit = |m: usize| {
            if !reached[m] && labels[m] != 0 {
                reached[m] = true;
                queue.push_back(m);
            }
        };
        if i + 1 < mx {
            visit(n + 1);
        }
        if i > 0 {
            visit(n - 1);
        }
        if j + 1 < my {
            visit(n + mx);
        }
        if j > 0 {
            visit(n - mx);
        }
    }

    for (label, &kept) in labels.iter_mut().zip(&reached) {
        *label = i32::from(*label == LABEL_CANDIDATE && !kept);
    }
}

/// 冰山移除器
#[derive(Debug)]
pub struct IcebergRemover {
    grid: Arc<Grid>,
    labels: Field<i32>,
    bcflag: Option<WeakField<i32>>,
    /// worker 0 上的全局标签缓冲
    buffer: Vec<i32>,
}

impl IcebergRemover {
    /// 创建
    pub fn new(grid: Arc<Grid>) -> GlResult<Self> {
        let labels = Field::scalar(
            Arc::clone(&grid),
            FieldMeta::new("iceberg_labels", "iceberg identification labels", ""),
            0,
        )?;
        Ok(Self {
            grid,
            labels,
            bcflag: None,
            buffer: Vec::new(),
        })
    }

    /// 取得可选的 `bcflag`
    pub fn init(&mut self, vars: &Vars) -> GlResult<()> {
        self.bcflag = vars.get_weak::<i32>("bcflag");
        Ok(())
    }

    /// 移除冰山（集合操作）
    ///
    /// 返回全局移除的单元数。
    pub fn update(&mut self, mask: &mut Field<i32>, thickness: &mut Field<f64>) -> GlResult<u64> {
        let bcflag = match &self.bcflag {
            Some(weak) => Some(upgrade(weak, "bcflag", "IcebergRemover")?),
            None => None,
        };
        let bc_guard = bcflag.as_ref().map(|f| f.read());
        let bc = bc_guard.as_ref().map(|f| f.view());
        let pinned = |i: i32, j: i32| bc.as_ref().is_some_and(|v| v[(i, j)] == 1);

        {
            let m = mask.view();
            let mut labels = self.labels.view_mut();
            for (i, j) in self.grid.points() {
                let value = m[(i, j)];
                labels[(i, j)] = if is_grounded_ice(value) || (pinned(i, j) && is_icy(value)) {
                    LABEL_SEED
                } else if is_floating_ice(value) {
                    LABEL_CANDIDATE
                } else {
                    0
                };
            }
        }

        let gathered = self.labels.gather_natural(0)?;
        if let Some(global) = gathered {
            self.buffer = global;
            label_icebergs(&mut self.buffer, self.grid.mx(), self.grid.my());
        }
        let root = self.grid.rank() == 0;
        self.labels
            .scatter_natural(0, root.then_some(self.buffer.as_slice()))?;

        let mut removed = 0u64;
        {
            let labels = self.labels.view();
            let mut m = mask.view_mut();
            let mut h = thickness.view_mut();
            for (i, j) in self.grid.points() {
                if labels[(i, j)] == 1 && !pinned(i, j) {
                    h[(i, j)] = 0.0;
                    m[(i, j)] = MASK_ICE_FREE_OCEAN;
                    removed += 1;
                }
            }
        }

        mask.update_ghosts()?;
        thickness.update_ghosts()?;

        let total = self.grid.comm().sum_u64(removed);
        if total > 0 {
            debug!("移除冰山单元 {} 个", total);
        }
        Ok(total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_label_cross() {
        // 5x5: 种子在中心，十字形候选，(0,0) 孤立
        let mx = 5;
        let mut labels = vec![0; 25];
        labels[2 * mx + 2] = 2;
        for (i, j) in [(1, 2), (3, 2), (2, 1), (2, 3), (0, 0)] {
            labels[j * mx + i] = 1;
        }
        label_icebergs(&mut labels, 5, 5);
        assert_eq!(labels[0], 1);
        assert_eq!(labels.iter().sum::<i32>(), 1);
    }

    #[test]
    fn test_diagonal_not_connected() {
        let mut labels = vec![2, 0, 0, 1];
        label_icebergs(&mut labels, 2, 2);
        assert_eq!(labels, vec![0, 0, 0, 1]);
    }

    #[test]
    fn test_no_wrap_across_rows() {
        // (2,0) 与 (0,1) 在数组中相邻，但在网格上不相邻
        let mut labels = vec![0, 0, 2, 1, 0, 0];
        label_icebergs(&mut labels, 3, 2);
        assert_eq!(labels[3], 1);
    }

    #[test]
    fn test_chain_kept() {
        let mut labels = vec![2, 1, 1, 1, 1];
        label_icebergs(&mut labels, 5, 1);
        assert!(labels.iter().all(|&l| l == 0));
    }
}
