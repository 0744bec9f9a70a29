// crates/gl_config/src/lib.rs

//! Glacier Config Layer
//!
//! 配置层，提供键值参数记录、类型化参数结构和命令行覆盖。
//!
//! # 模块概览
//!
//! - [`config`]: Config 键值记录与默认值表
//! - [`options`]: `-name value` 形式的命令行覆盖
//! - [`params`]: 组件构造时读取的类型化参数
//! - [`error`]: 配置错误类型
//!
//! # 层级架构
//!
//! ```text
//! gl_cli        ─> Config::apply_overrides, Config::from_file
//! gl_physics    ─> *Params::from_config
//! gl_config     ─> Config, ConfigValue, 参数结构 (本层)
//! gl_foundation
//! ```
//!
//! # 示例
//!
//! ```
//! use gl_config::{Config, SlidingParams};
//!
//! let mut config = Config::default();
//! config.apply_overrides(["-mu_sliding", "1e-10", "-gradient", "mahaffy"]).unwrap();
//! let sliding = SlidingParams::from_config(&config).unwrap();
//! assert_eq!(sliding.surface_gradient_method, "mahaffy");
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod error;
pub mod options;
pub mod params;

// 重导出核心类型
pub use config::{Config, ConfigValue, SECONDS_PER_YEAR};
pub use error::ConfigError;
pub use options::OverrideReport;
pub use params::{
    BasalResistanceParams, BedrockParams, ClimateParams, EnthalpyParams, FaustoParams,
    GeometryParams, SlidingParams, YieldStressParams,
};
