// crates/gl_physics/src/archive.rs

//! JSON 归档
//!
//! 以 `serde_json` 存储二维场和柱场。每个变量记录网格尺寸、元数据、
//! 可选的垂向坐标轴以及若干条记录；记录按自然顺序排列：
//!
//! ```text
//! value(i, j, k) = record[(j * Mx + i) * n_levels + k]
//! ```
//!
//! 写入是集合操作：各 worker 把拥有的分块收集到 worker 0，只有 worker 0 的
//! 归档对象得到新记录，因此只应在 worker 0 上调用 [`Archive::save`]。
//! 读取时每个 worker 都打开同一文件，数据由 worker 0 分发。

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use gl_foundation::error::{GlError, GlResult};
use gl_foundation::field::{Field, FieldMeta, FieldValue};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// 归档中的变量
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ArchiveVariable {
    /// 元数据
    pub meta: FieldMeta,
    /// x 方向点数
    pub mx: usize,
    /// y 方向点数
    pub my: usize,
    /// 垂向坐标轴名称
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub axis: Option<String>,
    /// 垂向坐标
    pub levels: Vec<f64>,
    /// 记录
    #[serde(default)]
    pub records: Vec<Vec<f64>>,
}

impl ArchiveVariable {
    /// 每条记录的长度
    pub fn record_len(&self) -> usize {
        self.mx * self.my * self.levels.len()
    }
}

/// JSON 归档
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Archive {
    /// 全局属性
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
    /// 时间坐标 [s]
    #[serde(default)]
    pub time: Vec<f64>,
    /// 变量
    #[serde(default)]
    pub variables: BTreeMap<String, ArchiveVariable>,
}

impl Archive {
    /// 空归档
    pub fn new() -> Self {
        Self::default()
    }

    /// 打开归档文件
    pub fn open<P: AsRef<Path>>(path: P) -> GlResult<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(GlError::file_not_found(path));
        }
        let text = fs::read_to_string(path)
            .map_err(|e| GlError::io_with_source(format!("读取归档 {} 失败", path.display()), e))?;
        let archive: Archive = serde_json::from_str(&text)
            .map_err(|e| GlError::serialization(format!("解析归档 {} 失败: {e}", path.display())))?;
        debug!("打开归档 {}，变量 {:?}", path.display(), archive.variables.keys());
        Ok(archive)
    }

    /// 保存到文件
    pub fn save<P: AsRef<Path>>(&self, path: P) -> GlResult<()> {
        let path = path.as_ref();
        let text = serde_json::to_string_pretty(self)
            .map_err(|e| GlError::serialization(format!("序列化归档失败: {e}")))?;
        fs::write(path, text)
            .map_err(|e| GlError::io_with_source(format!("写入归档 {} 失败", path.display()), e))
    }

    /// 设置全局属性
    pub fn set_attribute(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.attributes.insert(key.into(), value.into());
    }

    /// 追加时间坐标
    pub fn append_time(&mut self, t: f64) {
        self.time.push(t);
    }

    /// 变量是否存在
    pub fn inq_var(&self, name: &str) -> bool {
        self.variables.contains_key(name)
    }

    /// 获取变量
    pub fn variable(&self, name: &str) -> GlResult<&ArchiveVariable> {
        self.variables
            .get(name)
            .ok_or_else(|| GlError::invalid_input(format!("归档中没有变量 {name}")))
    }

    /// 记录条数
    pub fn n_records(&self, name: &str) -> GlResult<usize> {
        Ok(self.variable(name)?.records.len())
    }

    /// 垂向坐标
    pub fn levels(&self, name: &str) -> GlResult<&[f64]> {
        Ok(&self.variable(name)?.levels)
    }

    /// 追加场的一条记录（集合操作）
    ///
    /// 同名变量已存在时尺寸必须一致。
    pub fn write_column_variable<T>(&mut self, field: &Field<T>, axis: Option<&str>) -> GlResult<()>
    where
        T: FieldValue + Into<f64>,
    {
        let gathered = field.gather_natural(0)?;
        let Some(values) = gathered else {
            return Ok(());
        };

        let grid = field.grid();
        let record: Vec<f64> = values.into_iter().map(Into::into).collect();
        let var = self
            .variables
            .entry(field.name().to_string())
            .or_insert_with(|| ArchiveVariable {
                meta: field.meta().clone(),
                mx: grid.mx(),
                my: grid.my(),
                axis: axis.map(str::to_string),
                levels: field.levels().to_vec(),
                records: Vec::new(),
            });
        GlError::check_size("archive record", var.record_len(), record.len())?;
        var.records.push(record);
        Ok(())
    }

    /// 读取第 `record` 条记录到场（集合操作）
    pub fn read_column_variable(&self, field: &mut Field<f64>, record: usize) -> GlResult<()> {
        let var = self.variable(field.name())?;
        let grid = field.grid();
        if var.mx != grid.mx() || var.my != grid.my() {
            return Err(GlError::invalid_input(format!(
                "归档变量 {} 的网格 {}x{} 与模型网格 {}x{} 不一致",
                field.name(),
                var.mx,
                var.my,
                grid.mx(),
                grid.my()
            )));
        }
        GlError::check_size("archive levels", field.dof(), var.levels.len())?;
        let values = var
            .records
            .get(record)
            .ok_or_else(|| GlError::index_out_of_bounds("record", record, var.records.len()))?;

        let root = grid.rank() == 0;
        field.scatter_natural(0, root.then_some(values.as_slice()))
    }
}
