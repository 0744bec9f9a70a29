// crates/gl_physics/src/lib.rs

//! 冰盖物理模块
//!
//! 提供冰盖热力学与底部过程的分布式实现，包括：
//! - 焓与温度换算 (enthalpy)
//! - 基岩热层 (bedrock)
//! - 冰山移除 (iceberg)
//! - SIA 滑动与冰面梯度 (stressbalance)
//! - 几何与掩码 (mask)
//! - 底部屈服应力 (basal_strength)
//! - 气候强迫 (climate)
//! - JSON 归档 (archive)
//! - 模型驱动 (model)
//!
//! # Trait 抽象
//!
//! - [`EnthalpyConverter`]: 焓换算
//! - [`YieldStress`]: 底部屈服应力提供者
//! - [`BasalResistanceLaw`]: 底部阻力律
//! - [`AtmosphereModel`] / [`SurfaceModel`] / [`OceanModel`]: 气候强迫
//!
//! # 示例
//!
//! ```
//! use std::sync::Arc;
//! use gl_config::Config;
//! use gl_foundation::prelude::*;
//! use gl_physics::{grid_params_from_config, IceModel};
//!
//! let mut config = Config::default();
//! config.apply_overrides(["-Mx", "5", "-My", "5", "-Lx", "1e4", "-Ly", "1e4"]).unwrap();
//! let grid = Arc::new(Grid::new(grid_params_from_config(&config).unwrap(), SerialComm::shared()).unwrap());
//! let mut model = IceModel::new(grid, &config).unwrap();
//! model.init().unwrap();
//! let report = model.step(gl_config::SECONDS_PER_YEAR).unwrap();
//! assert!(report.ice_volume > 0.0);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod archive;
pub mod basal_strength;
pub mod bedrock;
pub mod climate;
pub mod enthalpy;
pub mod iceberg;
pub mod mask;
pub mod model;
pub mod stressbalance;

// 重导出常用类型
pub use archive::{Archive, ArchiveVariable};
pub use basal_strength::{
    yield_stress_model, ConstantYieldStress, MohrCoulombYieldStress, TopgToPhi, YieldStress,
};
pub use bedrock::{BedrockState, BedrockThermalUnit, LITHO_TEMP};
pub use climate::{
    AtmosphereModel, ClimateFactory, ConstantOcean, DeltaSeaLevel, DeltaT, FaustoAtmosphere,
    GivenAtmosphere, GivenSurface, OceanModel, SimpleSurface, SurfaceModel,
};
pub use enthalpy::{
    compute_temperature_field, enthalpy_converter, ConstantCEnthalpyConverter, EnthalpyConverter,
    VarcEnthalpyConverter,
};
pub use iceberg::{label_icebergs, IcebergRemover};
pub use mask::{GeometryCalculator, MaskQuery};
pub use model::{grid_params_from_config, IceModel, StepReport};
pub use stressbalance::{
    basal_resistance_law, BasalResistanceLaw, GradientInputs, PlasticLaw, PseudoPlasticLaw,
    SiaSliding, SurfaceGradient, SurfaceGradientMethod,
};

/// Prelude 模块，包含常用类型
pub mod prelude {
    pub use crate::basal_strength::YieldStress;
    pub use crate::climate::{AtmosphereModel, OceanModel, SurfaceModel};
    pub use crate::enthalpy::EnthalpyConverter;
    pub use crate::model::{IceModel, StepReport};
    pub use crate::stressbalance::BasalResistanceLaw;
}
