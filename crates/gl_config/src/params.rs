// crates/gl_config/src/params.rs

//! 类型化参数结构
//!
//! 组件在构造时从 [`Config`] 读取一次参数，之后只使用这些结构，
//! 不再按名称查询记录。

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::config::Config;
use crate::error::ConfigError;

// ============================================================================
// 焓换算
// ============================================================================

/// 焓换算参数
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EnthalpyParams {
    /// 冰比热容 c_i [J kg-1 K-1]
    pub c_i: f64,
    /// 比热容温度梯度 g [J kg-1 K-2]
    pub c_gradient: f64,
    /// 比热容参考温度 T_r [K]
    pub t_r: f64,
    /// 焓零点温度 T_0 [K]
    pub t_0: f64,
    /// 熔化潜热 L [J kg-1]
    pub latent_heat: f64,
    /// 常压熔点 [K]
    pub melting_point: f64,
    /// Clausius-Clapeyron 常数 [K Pa-1]
    pub beta_cc: f64,
    /// 冰密度 [kg m-3]
    pub ice_density: f64,
    /// 重力加速度 [m s-2]
    pub gravity: f64,
    /// 冰面气压 [Pa]
    pub surface_pressure: f64,
    /// 是否使用温度相关比热容
    pub varc: bool,
}

impl EnthalpyParams {
    /// 从配置读取
    pub fn from_config(config: &Config) -> Result<Self, ConfigError> {
        Ok(Self {
            c_i: config.get_double("ice_specific_heat_capacity")?,
            c_gradient: config.get_double("c_gradient")?,
            t_r: config.get_double("T_r")?,
            t_0: config.get_double("enthalpy_reference_temperature")?,
            latent_heat: config.get_double("water_latent_heat_fusion")?,
            melting_point: config.get_double("water_melting_point_temperature")?,
            beta_cc: config.get_double("beta_CC")?,
            ice_density: config.get_double("ice_density")?,
            gravity: config.get_double("standard_gravity")?,
            surface_pressure: config.get_double("surface_pressure")?,
            varc: config.get_flag("varc")?,
        })
    }
}

impl Default for EnthalpyParams {
    fn default() -> Self {
        Self {
            c_i: 2009.0,
            c_gradient: 7.253,
            t_r: 256.81786846822,
            t_0: 223.15,
            latent_heat: 3.34e5,
            melting_point: 273.15,
            beta_cc: 7.9e-8,
            ice_density: 910.0,
            gravity: 9.81,
            surface_pressure: 0.0,
            varc: false,
        }
    }
}

// ============================================================================
// 基岩热层
// ============================================================================

/// 基岩热层参数
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BedrockParams {
    /// 基岩密度 [kg m-3]
    pub density: f64,
    /// 基岩比热容 [J kg-1 K-1]
    pub specific_heat: f64,
    /// 基岩热导率 [W m-1 K-1]
    pub conductivity: f64,
    /// 层数
    pub mbz: f64,
    /// 厚度 [m]
    pub lbz: f64,
    /// 层数由用户设置
    pub mbz_set: bool,
    /// 厚度由用户设置
    pub lbz_set: bool,
    /// 输入归档
    pub input_file: Option<PathBuf>,
}

impl BedrockParams {
    /// 从配置读取
    pub fn from_config(config: &Config) -> Result<Self, ConfigError> {
        let input = config.get_string("input_file")?;
        Ok(Self {
            density: config.get_double("bedrock_thermal_density")?,
            specific_heat: config.get_double("bedrock_thermal_specific_heat_capacity")?,
            conductivity: config.get_double("bedrock_thermal_conductivity")?,
            mbz: config.get_double("grid_Mbz")?,
            lbz: config.get_double("grid_Lbz")?,
            mbz_set: config.is_set("grid_Mbz"),
            lbz_set: config.is_set("grid_Lbz"),
            input_file: (!input.is_empty()).then(|| PathBuf::from(input)),
        })
    }

    /// 热扩散系数 D = k/(ρc) [m2 s-1]
    pub fn diffusivity(&self) -> f64 {
        self.conductivity / (self.density * self.specific_heat)
    }
}

// ============================================================================
// SIA 滑动
// ============================================================================

/// SIA 滑动参数
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlidingParams {
    /// 滑动系数 μ [Pa-1 m s-1]
    pub mu: f64,
    /// 允许滑动的最低温度 [K]
    pub min_temperature: f64,
    /// 冰密度 [kg m-3]
    pub ice_density: f64,
    /// 重力加速度 [m s-2]
    pub gravity: f64,
    /// Clausius-Clapeyron 常数 [K Pa-1]
    pub beta_cc: f64,
    /// 表面梯度方法名称
    pub surface_gradient_method: String,
    /// Glen 流动律指数
    pub glen_exponent: f64,
}

impl SlidingParams {
    /// 从配置读取
    pub fn from_config(config: &Config) -> Result<Self, ConfigError> {
        Ok(Self {
            mu: config.get_double("mu_sliding")?,
            min_temperature: config.get_double("minimum_temperature_for_sliding")?,
            ice_density: config.get_double("ice_density")?,
            gravity: config.get_double("standard_gravity")?,
            beta_cc: config.get_double("beta_CC")?,
            surface_gradient_method: config.get_string("surface_gradient_method")?.to_string(),
            glen_exponent: config.get_double("sia_Glen_exponent")?,
        })
    }
}

// ============================================================================
// 几何
// ============================================================================

/// 几何与掩码参数
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeometryParams {
    /// 冰密度 [kg m-3]
    pub ice_density: f64,
    /// 海水密度 [kg m-3]
    pub ocean_density: f64,
    /// 无冰厚度阈值 [m]
    pub icefree_thickness: f64,
}

impl GeometryParams {
    /// 从配置读取
    pub fn from_config(config: &Config) -> Result<Self, ConfigError> {
        Ok(Self {
            ice_density: config.get_double("ice_density")?,
            ocean_density: config.get_double("sea_water_density")?,
            icefree_thickness: config.get_double("mask_icefree_thickness_standard")?,
        })
    }
}

// ============================================================================
// 屈服应力与底部阻力
// ============================================================================

/// 屈服应力参数
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct YieldStressParams {
    /// 模型名称
    pub model: String,
    /// 常数屈服应力 [Pa]
    pub default_tauc: f64,
    /// 无冰接地区屈服应力 [Pa]
    pub high_tauc: f64,
    /// 冰碛黏聚力 c_0 [Pa]
    pub till_c_0: f64,
    /// e_0 / C_c
    pub e0_over_cc: f64,
    /// 有效压力比例 delta
    pub effective_fraction_overburden: f64,
    /// 默认摩擦角 [度]
    pub default_till_phi: f64,
    /// 冰碛最大含水厚度 [m]
    pub tillwat_max: f64,
    /// 海洋性接地线处视为饱和
    pub slippery_grounding_lines: bool,
    /// topg_to_phi 参数 (phi_min, phi_max, topg_min, topg_max)
    pub topg_to_phi: Option<[f64; 4]>,
    /// 冰密度 [kg m-3]
    pub ice_density: f64,
    /// 重力加速度 [m s-2]
    pub gravity: f64,
}

impl YieldStressParams {
    /// 从配置读取
    pub fn from_config(config: &Config) -> Result<Self, ConfigError> {
        let topg_to_phi = if config.get_flag("topg_to_phi")? {
            Some([
                config.get_double("topg_to_phi_phi_min")?,
                config.get_double("topg_to_phi_phi_max")?,
                config.get_double("topg_to_phi_topg_min")?,
                config.get_double("topg_to_phi_topg_max")?,
            ])
        } else {
            None
        };

        Ok(Self {
            model: config.get_string("yield_stress_model")?.to_string(),
            default_tauc: config.get_double("default_tauc")?,
            high_tauc: config.get_double("high_tauc")?,
            till_c_0: config.get_double("till_c_0")?,
            e0_over_cc: config.get_double("till_reference_void_ratio")?
                / config.get_double("till_compressibility_coefficient")?,
            effective_fraction_overburden: config.get_double("till_effective_fraction_overburden")?,
            default_till_phi: config.get_double("default_till_phi")?,
            tillwat_max: config.get_double("hydrology_tillwat_max")?,
            slippery_grounding_lines: config.get_flag("tauc_slippery_grounding_lines")?,
            topg_to_phi,
            ice_density: config.get_double("ice_density")?,
            gravity: config.get_double("standard_gravity")?,
        })
    }
}

/// 底部阻力律参数
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BasalResistanceParams {
    /// 是否伪塑性
    pub pseudo_plastic: bool,
    /// 伪塑性指数 q
    pub q: f64,
    /// 阈值速度 [m s-1]
    pub u_threshold: f64,
    /// 正则化速度 [m s-1]
    pub regularization: f64,
}

impl BasalResistanceParams {
    /// 从配置读取
    pub fn from_config(config: &Config) -> Result<Self, ConfigError> {
        Ok(Self {
            pseudo_plastic: config.get_flag("do_pseudo_plastic_till")?,
            q: config.get_double("pseudo_plastic_q")?,
            u_threshold: config.get_double("pseudo_plastic_uthreshold")?,
            regularization: config.get_double("plastic_regularization")?,
        })
    }
}

// ============================================================================
// 气候
// ============================================================================

/// Fausto 年周期温度参数化系数
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FaustoParams {
    /// 年均温度常数项 [K]
    pub d_ma: f64,
    /// 年均温度高程系数 [K m-1]
    pub gamma_ma: f64,
    /// 年均温度纬度系数 [K degN-1]
    pub c_ma: f64,
    /// 年均温度经度系数 [K degW-1]
    pub kappa_ma: f64,
    /// 七月温度常数项 [K]
    pub d_mj: f64,
    /// 七月温度高程系数 [K m-1]
    pub gamma_mj: f64,
    /// 七月温度纬度系数 [K degN-1]
    pub c_mj: f64,
    /// 七月温度经度系数 [K degW-1]
    pub kappa_mj: f64,
}

/// 气候参数
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClimateParams {
    /// 大气模型描述
    pub atmosphere: String,
    /// 表面模型描述
    pub surface: String,
    /// 海洋模型描述
    pub ocean: String,
    /// 常数气温 [K]
    pub given_air_temp: f64,
    /// 常数降水率 [m s-1]
    pub given_precipitation: f64,
    /// 常数表面质量通量 [m s-1]
    pub given_mass_flux: f64,
    /// 常数冰面温度 [K]
    pub given_surface_temperature: f64,
    /// 七月平均温度年积日
    pub july_day: f64,
    /// Fausto 系数
    pub fausto: FaustoParams,
    /// 气温偏移 [K]
    pub delta_t: f64,
    /// 海平面 [m]
    pub sea_level: f64,
    /// 海平面偏移 [m]
    pub delta_sea_level: f64,
    /// 冰架底部热通量 [W m-2]
    pub sub_shelf_heat_flux: f64,
    /// 冰密度 [kg m-3]
    pub ice_density: f64,
    /// 重力加速度 [m s-2]
    pub gravity: f64,
    /// Clausius-Clapeyron 常数 [K Pa-1]
    pub beta_cc: f64,
    /// 常压熔点 [K]
    pub melting_point: f64,
    /// 熔化潜热 [J kg-1]
    pub latent_heat: f64,
}

impl ClimateParams {
    /// 从配置读取
    pub fn from_config(config: &Config) -> Result<Self, ConfigError> {
        Ok(Self {
            atmosphere: config.get_string("atmosphere")?.to_string(),
            surface: config.get_string("surface")?.to_string(),
            ocean: config.get_string("ocean")?.to_string(),
            given_air_temp: config.get_double("atmosphere_given_air_temp")?,
            given_precipitation: config.get_double("atmosphere_given_precipitation")?,
            given_mass_flux: config.get_double("surface_given_mass_flux")?,
            given_surface_temperature: config.get_double("surface_given_temperature")?,
            july_day: config.get_double("snow_temp_july_day")?,
            fausto: FaustoParams {
                d_ma: config.get_double("snow_temp_fausto_d_ma")?,
                gamma_ma: config.get_double("snow_temp_fausto_gamma_ma")?,
                c_ma: config.get_double("snow_temp_fausto_c_ma")?,
                kappa_ma: config.get_double("snow_temp_fausto_kappa_ma")?,
                d_mj: config.get_double("snow_temp_fausto_d_mj")?,
                gamma_mj: config.get_double("snow_temp_fausto_gamma_mj")?,
                c_mj: config.get_double("snow_temp_fausto_c_mj")?,
                kappa_mj: config.get_double("snow_temp_fausto_kappa_mj")?,
            },
            delta_t: config.get_double("atmosphere_delta_T")?,
            sea_level: config.get_double("sea_level")?,
            delta_sea_level: config.get_double("ocean_delta_sea_level")?,
            sub_shelf_heat_flux: config.get_double("ocean_sub_shelf_heat_flux_into_ice")?,
            ice_density: config.get_double("ice_density")?,
            gravity: config.get_double("standard_gravity")?,
            beta_cc: config.get_double("beta_CC")?,
            melting_point: config.get_double("water_melting_point_temperature")?,
            latent_heat: config.get_double("water_latent_heat_fusion")?,
        })
    }
}
