// apps/gl_cli/src/commands/validate.rs

//! 配置验证命令
//!
//! 按运行时的顺序叠加默认值、配置文件与命令行覆盖，检查参数取值，
//! 并在单 worker 上构造一次模型以检查各组件的选项。

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Result};
use clap::Args;
use gl_config::{
    BasalResistanceParams, BedrockParams, ClimateParams, Config, ConfigError, EnthalpyParams,
    GeometryParams, SlidingParams, YieldStressParams,
};
use gl_foundation::comm::SerialComm;
use gl_foundation::grid::Grid;
use gl_physics::{grid_params_from_config, IceModel};
use tracing::{error, info, warn};

/// 验证参数
#[derive(Args)]
pub struct ValidateArgs {
    /// 配置文件路径
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// 严格模式（警告也视为错误）
    #[arg(long)]
    pub strict: bool,

    /// 跳过模型构造，只检查参数
    #[arg(long)]
    pub params_only: bool,

    /// 模型参数覆盖
    #[arg(last = true, allow_hyphen_values = true)]
    pub overrides: Vec<String>,
}

/// 验证结果
#[derive(Default)]
struct ValidationResult {
    errors: Vec<String>,
    warnings: Vec<String>,
}

impl ValidationResult {
    fn add_error(&mut self, msg: impl Into<String>) {
        self.errors.push(msg.into());
    }

    fn add_warning(&mut self, msg: impl Into<String>) {
        self.warnings.push(msg.into());
    }

    fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }

    fn is_ok_strict(&self) -> bool {
        self.errors.is_empty() && self.warnings.is_empty()
    }

    fn check<T, E: std::fmt::Display>(&mut self, what: &str, r: Result<T, E>) -> Option<T> {
        match r {
            Ok(v) => Some(v),
            Err(e) => {
                self.add_error(format!("{what}: {e}"));
                None
            }
        }
    }
}

/// 执行验证命令
pub fn execute(args: ValidateArgs) -> Result<()> {
    info!("=== Glacier 配置验证 ===");
    let result = validate(&args);
    print_validation_result(&result, args.strict)
}

fn validate(args: &ValidateArgs) -> ValidationResult {
    let mut result = ValidationResult::default();

    let mut config = Config::default();
    if let Some(path) = &args.config {
        println!("检查配置文件: {}", path.display());
        if !path.exists() {
            result.add_error(format!("配置文件不存在: {}", path.display()));
            return result;
        }
        if result.check("配置文件", config.merge_json_file(path)).is_none() {
            return result;
        }
    }

    match config.apply_overrides(&args.overrides) {
        Ok(report) => {
            for option in report.ignored {
                result.add_warning(format!("未使用的命令行选项: {option}"));
            }
        }
        Err(e) => {
            result.add_error(format!("命令行参数: {e}"));
            return result;
        }
    }

    let unknown: Vec<String> = config
        .user_set_keys()
        .filter(|key| Config::describe(key).is_none())
        .map(str::to_string)
        .collect();
    for key in unknown {
        result.add_warning(format!("未知参数 '{key}' 不会被任何组件读取"));
    }

    result.check("参数取值", config.validate());
    check_params(&config, &mut result);

    match config.get_string("input_file") {
        Ok(input) if !input.is_empty() && !std::path::Path::new(input).exists() => {
            result.add_error(format!("输入归档不存在: {input}"));
        }
        Ok(_) => {}
        Err(e) => result.add_error(format!("input_file: {e}")),
    }

    if result.is_ok() && !args.params_only {
        check_model(&config, &mut result);
    }
    result
}

fn check_params(config: &Config, result: &mut ValidationResult) {
    fn ok<T>(r: Result<T, ConfigError>) -> Result<(), ConfigError> {
        r.map(|_| ())
    }
    let checks = [
        ("焓参数", ok(EnthalpyParams::from_config(config))),
        ("基岩参数", ok(BedrockParams::from_config(config))),
        ("几何参数", ok(GeometryParams::from_config(config))),
        ("滑动参数", ok(SlidingParams::from_config(config))),
        ("屈服应力参数", ok(YieldStressParams::from_config(config))),
        ("底部阻力参数", ok(BasalResistanceParams::from_config(config))),
        ("气候参数", ok(ClimateParams::from_config(config))),
    ];
    for (what, r) in checks {
        result.check(what, r);
    }
}

fn check_model(config: &Config, result: &mut ValidationResult) {
    let Some(params) = result.check("网格", grid_params_from_config(config)) else {
        return;
    };
    println!("构造模型: {} x {} 网格", params.mx, params.my);
    let Some(grid) = result.check("网格", Grid::new(params, SerialComm::shared())) else {
        return;
    };
    result.check("模型组件", IceModel::new(Arc::new(grid), config));
}

fn print_validation_result(result: &ValidationResult, strict: bool) -> Result<()> {
    println!("\n=== 验证结果 ===");

    if !result.errors.is_empty() {
        println!("\n错误 ({}):", result.errors.len());
        for err in &result.errors {
            error!("  ✗ {}", err);
            println!("  ✗ {}", err);
        }
    }

    if !result.warnings.is_empty() {
        println!("\n警告 ({}):", result.warnings.len());
        for warning in &result.warnings {
            warn!("  ⚠ {}", warning);
            println!("  ⚠ {}", warning);
        }
    }

    let success = if strict {
        result.is_ok_strict()
    } else {
        result.is_ok()
    };

    if success {
        println!("\n✓ 验证通过");
        Ok(())
    } else {
        println!("\n✗ 验证失败");
        bail!(
            "验证失败：发现 {} 个错误，{} 个警告",
            result.errors.len(),
            result.warnings.len()
        )
    }
}
