// apps/gl_cli/src/commands/mod.rs

//! 子命令实现

pub mod info;
pub mod run;
pub mod validate;

use std::path::PathBuf;

use anyhow::{Context, Result};
use gl_config::Config;
use tracing::warn;

/// 默认值、JSON 文件与 `-name value` 覆盖依次叠加
pub(crate) fn load_config(path: Option<&PathBuf>, overrides: &[String]) -> Result<Config> {
    let mut config = Config::default();
    if let Some(path) = path {
        config
            .merge_json_file(path)
            .with_context(|| format!("无法读取配置文件 {}", path.display()))?;
    }
    let report = config
        .apply_overrides(overrides)
        .context("命令行参数解析失败")?;
    for option in &report.ignored {
        warn!("忽略未知选项 {}", option);
    }
    Ok(config)
}
