// crates/gl_config/src/config.rs

//! Config - 键值参数记录
//!
//! 每个参数是名称到 {数值, 字符串, 开关} 之一的映射，带有默认值和
//! “由用户设置”标记。默认值表见 [`DEFAULTS`]；JSON 文件和命令行参数
//! 覆盖默认值时保留其类型。
//!
//! 所有物理量使用 SI 单位（速率为 m/s，时间为 s）。

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::Path;
use tracing::warn;

use crate::error::ConfigError;

/// 参数值
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConfigValue {
    /// 数值
    Number(f64),
    /// 开关
    Flag(bool),
    /// 字符串
    String(String),
}

impl ConfigValue {
    /// 类型名称
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Number(_) => "number",
            Self::Flag(_) => "flag",
            Self::String(_) => "string",
        }
    }
}

impl fmt::Display for ConfigValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(v) => write!(f, "{v}"),
            Self::Flag(v) => write!(f, "{}", if *v { "yes" } else { "no" }),
            Self::String(v) => write!(f, "\"{v}\""),
        }
    }
}

/// 默认值表中的值
#[derive(Debug, Clone, Copy)]
pub enum DefaultValue {
    /// 数值
    Number(f64),
    /// 开关
    Flag(bool),
    /// 字符串
    Text(&'static str),
}

impl From<DefaultValue> for ConfigValue {
    fn from(v: DefaultValue) -> Self {
        match v {
            DefaultValue::Number(x) => ConfigValue::Number(x),
            DefaultValue::Flag(x) => ConfigValue::Flag(x),
            DefaultValue::Text(x) => ConfigValue::String(x.to_string()),
        }
    }
}

/// 一年的秒数
pub const SECONDS_PER_YEAR: f64 = 3.15569259747e7;

use DefaultValue::{Flag, Number, Text};

/// 默认值表：(名称, 默认值, 说明)
pub const DEFAULTS: &[(&str, DefaultValue, &str)] = &[
    // 网格
    ("grid_Mx", Number(61.0), "x 方向单元数"),
    ("grid_My", Number(61.0), "y 方向单元数"),
    ("grid_Lx", Number(750e3), "x 方向半宽 [m]"),
    ("grid_Ly", Number(750e3), "y 方向半宽 [m]"),
    ("grid_Mz", Number(31.0), "冰柱层数"),
    ("grid_Lz", Number(4000.0), "冰柱高度 [m]"),
    ("grid_max_stencil_width", Number(2.0), "场的最大模板宽度"),
    ("grid_Mbz", Number(1.0), "基岩热层层数"),
    ("grid_Lbz", Number(0.0), "基岩热层厚度 [m]"),
    // 输入输出
    ("input_file", Text(""), "输入归档（空表示自举）"),
    ("output_file", Text(""), "输出归档"),
    // 物理常数
    ("ice_density", Number(910.0), "冰密度 [kg m-3]"),
    ("sea_water_density", Number(1028.0), "海水密度 [kg m-3]"),
    ("standard_gravity", Number(9.81), "重力加速度 [m s-2]"),
    ("beta_CC", Number(7.9e-8), "Clausius-Clapeyron 常数 [K Pa-1]"),
    ("ice_specific_heat_capacity", Number(2009.0), "冰比热容 [J kg-1 K-1]"),
    ("c_gradient", Number(7.253), "比热容温度梯度 [J kg-1 K-2]"),
    ("T_r", Number(256.81786846822), "比热容参考温度 [K]"),
    ("enthalpy_reference_temperature", Number(223.15), "焓零点温度 [K]"),
    ("water_latent_heat_fusion", Number(3.34e5), "水的熔化潜热 [J kg-1]"),
    ("water_melting_point_temperature", Number(273.15), "常压下的熔点 [K]"),
    ("surface_pressure", Number(0.0), "冰面气压 [Pa]"),
    ("varc", Flag(false), "使用温度相关比热容的焓换算"),
    // 基岩热层
    ("bedrock_thermal_density", Number(3300.0), "基岩密度 [kg m-3]"),
    ("bedrock_thermal_specific_heat_capacity", Number(1000.0), "基岩比热容 [J kg-1 K-1]"),
    ("bedrock_thermal_conductivity", Number(3.0), "基岩热导率 [W m-1 K-1]"),
    ("bootstrapping_geothermal_flux", Number(0.042), "自举时的地热通量 [W m-2]"),
    // SIA 滑动
    ("mu_sliding", Number(0.0), "SIA 滑动系数 [Pa-1 m s-1]"),
    ("minimum_temperature_for_sliding", Number(273.0), "允许滑动的最低底部温度 [K]"),
    ("surface_gradient_method", Text("haseloff"), "表面梯度离散: mahaffy, eta, haseloff"),
    ("sia_Glen_exponent", Number(3.0), "Glen 流动律指数"),
    // 几何与掩码
    ("sea_level", Number(0.0), "海平面高程 [m]"),
    ("mask_icefree_thickness_standard", Number(0.01), "无冰厚度阈值 [m]"),
    ("kill_icebergs", Flag(true), "每步移除冰山"),
    // 屈服应力
    ("yield_stress_model", Text("mohr_coulomb"), "屈服应力模型: constant, mohr_coulomb"),
    ("default_tauc", Number(2e5), "常数屈服应力 [Pa]"),
    ("high_tauc", Number(1e6), "无冰接地区的屈服应力 [Pa]"),
    ("till_c_0", Number(0.0), "冰碛黏聚力 [Pa]"),
    ("till_reference_void_ratio", Number(0.69), "冰碛参考孔隙比 e_0"),
    ("till_compressibility_coefficient", Number(0.12), "冰碛压缩系数 C_c"),
    ("till_effective_fraction_overburden", Number(0.02), "有效压力占上覆压力的比例 delta"),
    ("default_till_phi", Number(30.0), "默认冰碛摩擦角 [度]"),
    ("hydrology_tillwat_max", Number(2.0), "冰碛最大含水厚度 [m]"),
    ("tauc_slippery_grounding_lines", Flag(false), "海洋性接地线处冰碛视为饱和"),
    ("topg_to_phi", Flag(false), "由基岩高程分段线性确定摩擦角"),
    ("topg_to_phi_phi_min", Number(5.0), "topg_to_phi 最小摩擦角 [度]"),
    ("topg_to_phi_phi_max", Number(15.0), "topg_to_phi 最大摩擦角 [度]"),
    ("topg_to_phi_topg_min", Number(-1000.0), "topg_to_phi 最低高程 [m]"),
    ("topg_to_phi_topg_max", Number(1000.0), "topg_to_phi 最高高程 [m]"),
    // 底部阻力
    ("do_pseudo_plastic_till", Flag(false), "使用伪塑性底部阻力"),
    ("pseudo_plastic_q", Number(0.25), "伪塑性指数 q"),
    ("pseudo_plastic_uthreshold", Number(100.0 / SECONDS_PER_YEAR), "伪塑性阈值速度 [m s-1]"),
    ("plastic_regularization", Number(0.01 / SECONDS_PER_YEAR), "塑性正则化速度 [m s-1]"),
    // 气候
    ("atmosphere", Text("given"), "大气模型及修正，如 fausto,delta_T"),
    ("surface", Text("simple"), "表面模型及修正"),
    ("ocean", Text("constant"), "海洋模型及修正，如 constant,delta_SL"),
    ("atmosphere_given_air_temp", Number(253.15), "常数近地面气温 [K]"),
    ("atmosphere_given_precipitation", Number(0.3 / SECONDS_PER_YEAR), "冰当量降水率 [m s-1]"),
    ("surface_given_mass_flux", Number(0.0), "常数表面质量通量 [m s-1]"),
    ("surface_given_temperature", Number(253.15), "常数冰面温度 [K]"),
    ("snow_temp_july_day", Number(196.0), "七月平均温度对应的年积日"),
    ("snow_temp_fausto_d_ma", Number(314.98), "Fausto 年均温度常数项 [K]"),
    ("snow_temp_fausto_gamma_ma", Number(-0.006309), "Fausto 年均温度高程系数 [K m-1]"),
    ("snow_temp_fausto_c_ma", Number(-0.7189), "Fausto 年均温度纬度系数 [K degN-1]"),
    ("snow_temp_fausto_kappa_ma", Number(0.0672), "Fausto 年均温度经度系数 [K degW-1]"),
    ("snow_temp_fausto_d_mj", Number(287.85), "Fausto 七月温度常数项 [K]"),
    ("snow_temp_fausto_gamma_mj", Number(-0.005426), "Fausto 七月温度高程系数 [K m-1]"),
    ("snow_temp_fausto_c_mj", Number(-0.1585), "Fausto 七月温度纬度系数 [K degN-1]"),
    ("snow_temp_fausto_kappa_mj", Number(0.0518), "Fausto 七月温度经度系数 [K degW-1]"),
    ("atmosphere_delta_T", Number(0.0), "近地面气温偏移 [K]"),
    ("ocean_delta_sea_level", Number(0.0), "海平面偏移 [m]"),
    ("ocean_sub_shelf_heat_flux_into_ice", Number(0.5), "冰架底部热通量 [W m-2]"),
];

/// 命令行别名：(别名, 参数名)
pub const ALIASES: &[(&str, &str)] = &[
    ("Mx", "grid_Mx"),
    ("My", "grid_My"),
    ("Lx", "grid_Lx"),
    ("Ly", "grid_Ly"),
    ("Mz", "grid_Mz"),
    ("Lz", "grid_Lz"),
    ("Mbz", "grid_Mbz"),
    ("Lbz", "grid_Lbz"),
    ("i", "input_file"),
    ("o", "output_file"),
    ("gradient", "surface_gradient_method"),
    ("yield_stress", "yield_stress_model"),
    ("pseudo_plastic", "do_pseudo_plastic_till"),
];

/// 将命令行名称解析为参数名
pub fn resolve_alias(name: &str) -> &str {
    ALIASES
        .iter()
        .find(|(alias, _)| *alias == name)
        .map_or(name, |(_, key)| key)
}

/// 键值参数记录
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    values: BTreeMap<String, ConfigValue>,
    set_by_user: BTreeSet<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl Config {
    /// 空记录
    pub fn empty() -> Self {
        Self {
            values: BTreeMap::new(),
            set_by_user: BTreeSet::new(),
        }
    }

    /// 装载默认值表
    pub fn with_defaults() -> Self {
        let values = DEFAULTS
            .iter()
            .map(|(k, v, _)| (k.to_string(), ConfigValue::from(*v)))
            .collect();
        Self {
            values,
            set_by_user: BTreeSet::new(),
        }
    }

    /// 参数说明
    pub fn describe(key: &str) -> Option<&'static str> {
        DEFAULTS.iter().find(|(k, _, _)| *k == key).map(|(_, _, d)| *d)
    }

    /// 是否存在参数
    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    /// 参数是否由用户设置
    pub fn is_set(&self, key: &str) -> bool {
        self.set_by_user.contains(key)
    }

    /// 原始值
    pub fn get(&self, key: &str) -> Result<&ConfigValue, ConfigError> {
        self.values
            .get(key)
            .ok_or_else(|| ConfigError::Missing(key.to_string()))
    }

    /// 数值参数
    pub fn get_double(&self, key: &str) -> Result<f64, ConfigError> {
        match self.get(key)? {
            ConfigValue::Number(v) => Ok(*v),
            other => Err(mismatch(key, "number", other)),
        }
    }

    /// 整数参数（数值向零取整前必须为整数）
    pub fn get_integer(&self, key: &str) -> Result<i64, ConfigError> {
        let v = self.get_double(key)?;
        if v.fract() != 0.0 || !v.is_finite() {
            return Err(ConfigError::invalid(key, v, "需要整数"));
        }
        Ok(v as i64)
    }

    /// 字符串参数
    pub fn get_string(&self, key: &str) -> Result<&str, ConfigError> {
        match self.get(key)? {
            ConfigValue::String(v) => Ok(v),
            other => Err(mismatch(key, "string", other)),
        }
    }

    /// 开关参数
    pub fn get_flag(&self, key: &str) -> Result<bool, ConfigError> {
        match self.get(key)? {
            ConfigValue::Flag(v) => Ok(*v),
            other => Err(mismatch(key, "flag", other)),
        }
    }

    /// 设置参数并标记为用户设置；已有参数必须保持类型
    pub fn set(&mut self, key: &str, value: ConfigValue) -> Result<(), ConfigError> {
        if let Some(old) = self.values.get(key) {
            if old.type_name() != value.type_name() {
                return Err(ConfigError::TypeMismatch {
                    key: key.to_string(),
                    expected: old.type_name(),
                    found: value.type_name(),
                });
            }
        }
        self.values.insert(key.to_string(), value);
        self.set_by_user.insert(key.to_string());
        Ok(())
    }

    /// 设置数值参数
    pub fn set_double(&mut self, key: &str, value: f64) -> Result<(), ConfigError> {
        self.set(key, ConfigValue::Number(value))
    }

    /// 设置字符串参数
    pub fn set_string(&mut self, key: &str, value: impl Into<String>) -> Result<(), ConfigError> {
        self.set(key, ConfigValue::String(value.into()))
    }

    /// 设置开关参数
    pub fn set_flag(&mut self, key: &str, value: bool) -> Result<(), ConfigError> {
        self.set(key, ConfigValue::Flag(value))
    }

    /// 遍历所有参数
    pub fn iter(&self) -> impl Iterator<Item = (&str, &ConfigValue)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// 用户设置过的参数名
    pub fn user_set_keys(&self) -> impl Iterator<Item = &str> {
        self.set_by_user.iter().map(String::as_str)
    }

    /// 合并 JSON 对象 `{"name": value, ...}`，合并的键标记为用户设置
    pub fn merge_json_str(&mut self, json: &str) -> Result<(), ConfigError> {
        let map: BTreeMap<String, ConfigValue> =
            serde_json::from_str(json).map_err(|e| ConfigError::Parse(e.to_string()))?;
        for (key, value) in map {
            if !self.contains(&key) {
                warn!("配置文件中的未知参数 '{}' 已加入记录", key);
            }
            self.set(&key, value)?;
        }
        Ok(())
    }

    /// 合并 JSON 文件
    pub fn merge_json_file<P: AsRef<Path>>(&mut self, path: P) -> Result<(), ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        self.merge_json_str(&content)
    }

    /// 从 JSON 文件加载：默认值加文件内容，随后验证
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let mut config = Self::with_defaults();
        config.merge_json_file(path)?;
        config.validate()?;
        Ok(config)
    }

    /// 保存到 JSON 文件
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let content = serde_json::to_string_pretty(&self.values)
            .map_err(|e| ConfigError::Parse(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// 验证配置有效性
    pub fn validate(&self) -> Result<(), ConfigError> {
        for key in [
            "ice_density",
            "sea_water_density",
            "standard_gravity",
            "ice_specific_heat_capacity",
            "water_latent_heat_fusion",
            "bedrock_thermal_density",
            "bedrock_thermal_specific_heat_capacity",
            "bedrock_thermal_conductivity",
            "grid_Lx",
            "grid_Ly",
        ] {
            let v = self.get_double(key)?;
            if !(v > 0.0) {
                return Err(ConfigError::invalid(key, v, "必须为正"));
            }
        }

        for key in ["mu_sliding", "grid_Lbz", "high_tauc", "default_tauc", "surface_pressure"] {
            let v = self.get_double(key)?;
            if v < 0.0 {
                return Err(ConfigError::invalid(key, v, "不能为负"));
            }
        }

        if self.get_integer("grid_Mbz")? < 1 {
            return Err(ConfigError::invalid("grid_Mbz", self.get_double("grid_Mbz")?, "至少为 1"));
        }
        if self.get_integer("grid_Mx")? < 2 || self.get_integer("grid_My")? < 2 {
            return Err(ConfigError::invalid("grid_Mx/grid_My", "", "至少为 2"));
        }

        let method = self.get_string("surface_gradient_method")?;
        if !matches!(method, "mahaffy" | "eta" | "haseloff") {
            return Err(ConfigError::invalid(
                "surface_gradient_method",
                method,
                "可选值为 mahaffy, eta, haseloff",
            ));
        }

        if self.get_flag("varc")? {
            let g = self.get_double("c_gradient")?;
            if !(g > 0.0) {
                return Err(ConfigError::invalid("c_gradient", g, "varc 打开时必须为正"));
            }
        }

        let q = self.get_double("pseudo_plastic_q")?;
        if !(0.0..=1.0).contains(&q) {
            return Err(ConfigError::invalid("pseudo_plastic_q", q, "必须在 [0, 1] 范围内"));
        }

        Ok(())
    }
}

fn mismatch(key: &str, expected: &'static str, found: &ConfigValue) -> ConfigError {
    ConfigError::TypeMismatch {
        key: key.to_string(),
        expected,
        found: found.type_name(),
    }
}
