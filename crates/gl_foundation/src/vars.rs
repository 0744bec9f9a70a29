// crates/gl_foundation/src/vars.rs

//! 命名场注册表
//!
//! 模型驱动器通过 `Vars` 拥有所有场；子系统在 `init` 时取得弱引用，
//! 不延长场的生命周期。每次使用前升级弱引用，场已被移除时返回
//! [`GlError::MissingField`]。
//!
//! 支持三类值：`f64` 标量/柱场、`i32` 掩码场、`DVec2` 向量场。

use crate::error::{GlError, GlResult};
use crate::field::{Field, FieldValue};
use glam::DVec2;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::{Arc, Weak};

/// 共享场
pub type SharedField<T> = Arc<RwLock<Field<T>>>;

/// 场的弱引用
pub type WeakField<T> = Weak<RwLock<Field<T>>>;

/// 升级弱引用
pub fn upgrade<T: FieldValue>(weak: &WeakField<T>, name: &str, context: &str) -> GlResult<SharedField<T>> {
    weak.upgrade()
        .ok_or_else(|| GlError::missing_field(name, context))
}

mod sealed {
    pub trait Sealed {}
    impl Sealed for f64 {}
    impl Sealed for i32 {}
    impl Sealed for glam::DVec2 {}
}

/// 可注册到 [`Vars`] 的值类型
pub trait VarValue: FieldValue + sealed::Sealed {
    #[doc(hidden)]
    fn table(vars: &Vars) -> &BTreeMap<String, SharedField<Self>>;
    #[doc(hidden)]
    fn table_mut(vars: &mut Vars) -> &mut BTreeMap<String, SharedField<Self>>;
}

impl VarValue for f64 {
    fn table(vars: &Vars) -> &BTreeMap<String, SharedField<Self>> {
        &vars.scalars
    }
    fn table_mut(vars: &mut Vars) -> &mut BTreeMap<String, SharedField<Self>> {
        &mut vars.scalars
    }
}

impl VarValue for i32 {
    fn table(vars: &Vars) -> &BTreeMap<String, SharedField<Self>> {
        &vars.integers
    }
    fn table_mut(vars: &mut Vars) -> &mut BTreeMap<String, SharedField<Self>> {
        &mut vars.integers
    }
}

impl VarValue for DVec2 {
    fn table(vars: &Vars) -> &BTreeMap<String, SharedField<Self>> {
        &vars.vectors
    }
    fn table_mut(vars: &mut Vars) -> &mut BTreeMap<String, SharedField<Self>> {
        &mut vars.vectors
    }
}

/// 命名场注册表
#[derive(Debug, Default)]
pub struct Vars {
    scalars: BTreeMap<String, SharedField<f64>>,
    integers: BTreeMap<String, SharedField<i32>>,
    vectors: BTreeMap<String, SharedField<DVec2>>,
}

impl Vars {
    /// 创建空注册表
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册场，名称取自元数据；重名时报错
    pub fn add<T: VarValue>(&mut self, field: Field<T>) -> GlResult<SharedField<T>> {
        let name = field.name().to_string();
        if self.contains(&name) {
            return Err(GlError::invalid_input(format!("场 {name} 已注册")));
        }
        let shared = Arc::new(RwLock::new(field));
        T::table_mut(self).insert(name, Arc::clone(&shared));
        Ok(shared)
    }

    /// 移除场，已分发的弱引用随之失效
    pub fn remove(&mut self, name: &str) -> bool {
        self.scalars.remove(name).is_some()
            || self.integers.remove(name).is_some()
            || self.vectors.remove(name).is_some()
    }

    /// 是否存在任意类型的同名场
    pub fn contains(&self, name: &str) -> bool {
        self.scalars.contains_key(name)
            || self.integers.contains_key(name)
            || self.vectors.contains_key(name)
    }

    /// 获取共享场
    pub fn get<T: VarValue>(&self, name: &str) -> Option<SharedField<T>> {
        T::table(self).get(name).cloned()
    }

    /// 获取弱引用
    pub fn get_weak<T: VarValue>(&self, name: &str) -> Option<WeakField<T>> {
        T::table(self).get(name).map(Arc::downgrade)
    }

    /// 获取必需场的弱引用，缺失时返回 invariant-violation
    pub fn require<T: VarValue>(&self, name: &str, context: &str) -> GlResult<WeakField<T>> {
        self.get_weak(name)
            .ok_or_else(|| GlError::missing_field(name, context))
    }

    /// 所有已注册名称（排序）
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .scalars
            .keys()
            .chain(self.integers.keys())
            .chain(self.vectors.keys())
            .cloned()
            .collect();
        names.sort();
        names
    }
}

// ============================================================================
// 测试
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::comm::SerialComm;
    use crate::error::ErrorKind;
    use crate::field::FieldMeta;
    use crate::grid::{Grid, GridParams};

    fn grid() -> Arc<Grid> {
        Arc::new(Grid::new(GridParams::new(3, 3, 1.0, 1.0), SerialComm::shared()).unwrap())
    }

    #[test]
    fn test_add_and_get() {
        let mut vars = Vars::new();
        let g = grid();
        vars.add(Field::<f64>::scalar(g.clone(), FieldMeta::new("thk", "thickness", "m"), 1).unwrap())
            .unwrap();
        vars.add(Field::<i32>::scalar(g, FieldMeta::new("mask", "mask", ""), 1).unwrap())
            .unwrap();

        assert!(vars.get::<f64>("thk").is_some());
        assert!(vars.get::<f64>("mask").is_none());
        assert!(vars.get::<i32>("mask").is_some());
        assert_eq!(vars.names(), vec!["mask".to_string(), "thk".to_string()]);
    }

    #[test]
    fn test_duplicate_name() {
        let mut vars = Vars::new();
        let g = grid();
        vars.add(Field::<f64>::scalar(g.clone(), FieldMeta::new("a", "", ""), 0).unwrap())
            .unwrap();
        assert!(vars
            .add(Field::<i32>::scalar(g, FieldMeta::new("a", "", ""), 0).unwrap())
            .is_err());
    }

    #[test]
    fn test_weak_reference_expires() {
        let mut vars = Vars::new();
        vars.add(Field::<f64>::scalar(grid(), FieldMeta::new("a", "", ""), 0).unwrap())
            .unwrap();
        let weak = vars.require::<f64>("a", "test").unwrap();
        assert!(upgrade(&weak, "a", "test").is_ok());

        assert!(vars.remove("a"));
        let err = upgrade(&weak, "a", "test").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvariantViolation);
    }

    #[test]
    fn test_require_missing() {
        let vars = Vars::new();
        let err = vars.require::<f64>("enthalpy", "SIA sliding").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvariantViolation);
    }
}
