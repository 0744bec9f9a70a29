// crates/gl_physics/src/stressbalance/mod.rs

//! 应力平衡相关模块
//!
//! 本工程只实现应力平衡中与底部有关的部分：
//! - [`surface_gradient`]: 交错网格冰面梯度（mahaffy / eta / haseloff）
//! - [`sia_sliding`]: SIA 型底部滑动速度与摩擦生热
//! - [`basal_resistance`]: 塑性与伪塑性底部阻力律
//!
//! 完整的 SIA/SSA 速度求解不在本工程范围内。

pub mod basal_resistance;
pub mod sia_sliding;
pub mod surface_gradient;

pub use basal_resistance::{basal_resistance_law, BasalResistanceLaw, PlasticLaw, PseudoPlasticLaw};
pub use sia_sliding::SiaSliding;
pub use surface_gradient::{GradientInputs, SurfaceGradient, SurfaceGradientMethod};
