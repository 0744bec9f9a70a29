// apps/gl_cli/src/commands/info.rs

//! 信息显示命令
//!
//! 显示版本、可选模型和参数默认值。

use anyhow::{bail, Result};
use clap::Args;
use gl_config::config::{resolve_alias, ALIASES};
use gl_config::Config;
use tracing::info;

/// 信息显示参数
#[derive(Args)]
pub struct InfoArgs {
    /// 显示系统信息
    #[arg(long)]
    pub system: bool,

    /// 显示参数默认值
    #[arg(long)]
    pub defaults: bool,

    /// 只显示名称包含该字符串的参数
    #[arg(short, long)]
    pub filter: Option<String>,

    /// 显示单个参数的说明
    #[arg(short, long)]
    pub key: Option<String>,
}

/// 执行信息命令
pub fn execute(args: InfoArgs) -> Result<()> {
    info!("=== Glacier 信息 ===");

    if let Some(key) = &args.key {
        return print_key(key);
    }

    if args.system {
        print_system_info();
    }

    if args.defaults || args.filter.is_some() {
        print_defaults(args.filter.as_deref());
    }

    if !args.system && !args.defaults && args.filter.is_none() {
        print_system_info();
        println!();
        print_defaults(None);
    }

    Ok(())
}

fn print_system_info() {
    println!("=== 系统信息 ===");
    println!("Glacier CLI 版本: {}", env!("CARGO_PKG_VERSION"));
    println!("目标平台: {}", std::env::consts::ARCH);
    println!("操作系统: {}", std::env::consts::OS);
    println!(
        "可用线程: {}",
        std::thread::available_parallelism().map_or(1, |n| n.get())
    );

    println!("\n冰面梯度方法: mahaffy, eta, haseloff");
    println!("屈服应力模型: constant, mohr_coulomb");
    println!("大气模型: given, fausto (修正: delta_T)");
    println!("地表模型: simple, given");
    println!("海洋模型: constant (修正: delta_SL)");

    println!("\n命令行别名:");
    for (alias, key) in ALIASES {
        println!("  -{:<16} {}", alias, key);
    }
}

fn print_defaults(filter: Option<&str>) {
    println!("=== 参数默认值 ===");
    let config = Config::default();
    for (key, value) in config.iter() {
        if filter.is_some_and(|f| !key.contains(f)) {
            continue;
        }
        println!(
            "  {:<42} {:<14} {}",
            key,
            value.to_string(),
            Config::describe(key).unwrap_or("")
        );
    }
}

fn print_key(key: &str) -> Result<()> {
    let key = resolve_alias(key.trim_start_matches('-'));
    let config = Config::default();
    let Ok(value) = config.get(key) else {
        bail!("未知参数: {}", key);
    };
    println!("{key}");
    println!("  类型:   {}", value.type_name());
    println!("  默认值: {value}");
    if let Some(doc) = Config::describe(key) {
        println!("  说明:   {doc}");
    }
    Ok(())
}
