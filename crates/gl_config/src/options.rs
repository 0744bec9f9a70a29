// crates/gl_config/src/options.rs

//! 命令行形式的参数覆盖
//!
//! 识别以下形式（前导单横线，双横线同样接受）：
//!
//! - `-name value`: 数值或字符串参数
//! - `-name`: 打开开关
//! - `-no_name`: 关闭开关
//! - `-name yes|no|true|false|on|off`: 显式设置开关
//!
//! 别名见 [`crate::config::ALIASES`]，例如 `-Mbz` 对应 `grid_Mbz`。
//! 未知选项被忽略并记录警告。

use tracing::{debug, warn};

use crate::config::{resolve_alias, Config, ConfigValue};
use crate::error::ConfigError;

/// 覆盖结果
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OverrideReport {
    /// 已应用的参数名
    pub applied: Vec<String>,
    /// 被忽略的选项
    pub ignored: Vec<String>,
}

fn parse_flag_word(word: &str) -> Option<bool> {
    match word.to_ascii_lowercase().as_str() {
        "yes" | "true" | "on" => Some(true),
        "no" | "false" | "off" => Some(false),
        _ => None,
    }
}

fn strip_dashes(arg: &str) -> Option<&str> {
    arg.strip_prefix("--")
        .or_else(|| arg.strip_prefix('-'))
        .filter(|s| !s.is_empty())
}

/// 看起来是选项名（而不是负数值）
fn is_option(arg: &str) -> bool {
    strip_dashes(arg).is_some() && arg.parse::<f64>().is_err()
}

impl Config {
    /// 应用命令行形式的覆盖
    pub fn apply_overrides<I, S>(&mut self, args: I) -> Result<OverrideReport, ConfigError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let args: Vec<String> = args.into_iter().map(|s| s.as_ref().to_string()).collect();
        let mut report = OverrideReport::default();
        let mut k = 0;

        while k < args.len() {
            let arg = &args[k];
            let name = strip_dashes(arg)
                .ok_or_else(|| ConfigError::Parse(format!("意外的参数 '{arg}'，选项需以 '-' 开头")))?;
            let key = resolve_alias(name).to_string();
            let next = args.get(k + 1);

            match self.get(&key).ok().cloned() {
                Some(ConfigValue::Flag(_)) => {
                    match next.and_then(|w| parse_flag_word(w)) {
                        Some(v) => {
                            self.set_flag(&key, v)?;
                            k += 2;
                        }
                        None => {
                            self.set_flag(&key, true)?;
                            k += 1;
                        }
                    }
                    report.applied.push(key);
                }
                Some(ConfigValue::Number(_)) => {
                    let value = next.ok_or_else(|| {
                        ConfigError::Parse(format!("选项 -{name} 需要一个数值"))
                    })?;
                    let v: f64 = value
                        .parse()
                        .map_err(|_| ConfigError::invalid(&key, value, "不是有效的数值"))?;
                    self.set_double(&key, v)?;
                    report.applied.push(key);
                    k += 2;
                }
                Some(ConfigValue::String(_)) => {
                    let value = next.ok_or_else(|| {
                        ConfigError::Parse(format!("选项 -{name} 需要一个字符串值"))
                    })?;
                    self.set_string(&key, value.as_str())?;
                    report.applied.push(key);
                    k += 2;
                }
                None => {
                    let negated = key
                        .strip_prefix("no_")
                        .map(|base| resolve_alias(base).to_string())
                        .filter(|base| matches!(self.get(base), Ok(ConfigValue::Flag(_))));

                    if let Some(base) = negated {
                        self.set_flag(&base, false)?;
                        report.applied.push(base);
                        k += 1;
                    } else {
                        warn!("忽略未知选项 {}", arg);
                        report.ignored.push(arg.clone());
                        // 跳过紧随的值
                        k += if next.is_some_and(|n| !is_option(n)) { 2 } else { 1 };
                    }
                }
            }
        }

        debug!("命令行覆盖: {:?}", report.applied);
        Ok(report)
    }
}
