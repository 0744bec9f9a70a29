// apps/gl_cli/src/main.rs

//! gl_cli: 冰盖热力学与 SIA 底部滑动
//!
//! 典型流程：
//!
//! 1. `gl_cli validate -c run.json -- -varc` 检查参数与场景
//! 2. `gl_cli run --scenario dome --steps 20 -o out.json` 在多个 worker 上推进模型
//! 3. `gl_cli info --key c_gradient` 查询某个参数的默认值
//!
//! 参数可以来自 JSON 配置文件，也可以在 `--` 之后用 `-key value` 形式的选项覆盖。

mod commands;
mod scenario;

use clap::{Parser, Subcommand, ValueEnum};
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

#[derive(Parser)]
#[command(name = "gl_cli", version, about = "Ice sheet enthalpy, bedrock heat and basal sliding")]
struct Cli {
    /// 日志详细程度
    #[arg(short, long, value_enum, default_value_t = Verbosity::Info, global = true)]
    log_level: Verbosity,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Verbosity {
    Quiet,
    Info,
    Debug,
    Trace,
}

impl From<Verbosity> for Level {
    fn from(v: Verbosity) -> Self {
        match v {
            Verbosity::Quiet => Level::WARN,
            Verbosity::Info => Level::INFO,
            Verbosity::Debug => Level::DEBUG,
            Verbosity::Trace => Level::TRACE,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// 推进模型若干步，可写出 JSON 归档
    Run(commands::run::RunArgs),
    /// 列出参数别名与默认值
    Info(commands::info::InfoArgs),
    /// 检查参数组合与场景几何
    Validate(commands::validate::ValidateArgs),
}

impl Commands {
    fn execute(self) -> anyhow::Result<()> {
        match self {
            Self::Run(args) => commands::run::execute(args),
            Self::Info(args) => commands::info::execute(args),
            Self::Validate(args) => commands::validate::execute(args),
        }
    }
}

/// worker 线程的日志带线程 id，便于区分 rank
fn init_logging(verbosity: Verbosity) -> anyhow::Result<()> {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::from(verbosity))
        .with_target(false)
        .with_thread_ids(true)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.log_level)?;
    cli.command.execute()
}
