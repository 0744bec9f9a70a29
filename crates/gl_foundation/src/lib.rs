// crates/gl_foundation/src/lib.rs

//! Glacier Foundation Layer
//!
//! 基础层，提供整个项目共享的并行数据抽象。
//!
//! # 模块概览
//!
//! - [`error`]: 统一错误类型与错误类别
//! - [`comm`]: 进程内 SPMD 通信器与集合操作
//! - [`grid`]: 分布式结构网格与区域划分
//! - [`field`]: 带幽灵层的分布式场及访问会话
//! - [`vars`]: 命名场注册表
//!
//! # 设计原则
//!
//! 1. **所有权明确**: 注册表拥有场，子系统只持有弱引用
//! 2. **会话访问**: 读写通过作用域视图，释放时维护幽灵点状态
//! 3. **集合一致**: 所有 worker 以相同顺序进入集合操作
//!
//! # 示例
//!
//! ```
//! use std::sync::Arc;
//! use gl_foundation::prelude::*;
//!
//! let results = ThreadComm::run(2, |comm| {
//!     let grid = Arc::new(Grid::new(GridParams::new(6, 4, 3e3, 2e3), comm).unwrap());
//!     let mut thk = Field::<f64>::scalar(grid.clone(), FieldMeta::new("thk", "", "m"), 1).unwrap();
//!     thk.set(10.0);
//!     thk.global_sum()
//! });
//! assert_eq!(results, vec![240.0, 240.0]);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod comm;
pub mod error;
pub mod field;
pub mod grid;
pub mod vars;

// 重导出常用类型
pub use comm::{parallel_section, CommExt, Communicator, GroupAborted, SerialComm, ThreadComm};
pub use error::{ErrorKind, GlError, GlResult};
pub use field::{Field, FieldMeta, FieldValue, FieldView, FieldViewMut};
pub use grid::{Grid, GridParams, Patch, Periodicity};
pub use vars::{SharedField, Vars, WeakField};

/// Prelude 模块，包含常用类型
pub mod prelude {
    pub use crate::comm::{parallel_section, CommExt, Communicator, SerialComm, ThreadComm};
    pub use crate::error::{ErrorKind, GlError, GlResult};
    pub use crate::field::{Field, FieldMeta, FieldValue};
    pub use crate::grid::{Grid, GridParams, Patch, Periodicity};
    pub use crate::vars::{upgrade, SharedField, Vars, WeakField};
    pub use crate::{ensure, require};
}
