//! avc-cli - H.264 宏块编码层自检工具
//!
//! 按给定种子生成合成图像, 逐宏块编码再解码, 检查语法元素与重建误差.

mod logging;

use std::path::PathBuf;
use std::process;

use anyhow::Result;
use clap::{Parser, Subcommand};
use log::info;

use avc::config::SelfTestConfig;
use avc_codec::h264::{SelfTestParams, run_self_test};

#[derive(Parser, Debug)]
#[command(name = "avc-cli", version, about = "H.264 宏块编码层工具")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// 日志级别 (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// 运行宏块层编解码自检
    Selftest {
        /// JSON 配置文件
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// 轮数 (覆盖配置文件)
        #[arg(short, long)]
        trials: Option<u32>,

        /// 随机种子 (覆盖配置文件)
        #[arg(short, long)]
        seed: Option<u64>,

        /// 首次失败即停止
        #[arg(long)]
        stop_on_failure: bool,
    },
    /// 显示版本信息
    Version,
}

fn main() {
    let cli = Cli::parse();
    if let Err(e) = logging::init("avc-cli", cli.verbose) {
        eprintln!("警告: 日志初始化失败: {e:#}");
    }

    match run(cli.command) {
        Ok(true) => {}
        Ok(false) => process::exit(1),
        Err(e) => {
            eprintln!("错误: {e:#}");
            process::exit(2);
        }
    }
}

fn run(command: Command) -> Result<bool> {
    match command {
        Command::Selftest {
            config,
            trials,
            seed,
            stop_on_failure,
        } => {
            let mut cfg = match config {
                Some(path) => SelfTestConfig::load(path)?,
                None => SelfTestConfig::default(),
            };
            if let Some(trials) = trials {
                cfg.trials = trials;
            }
            if let Some(seed) = seed {
                cfg.seed = seed;
            }
            cfg.stop_on_failure |= stop_on_failure;
            cfg.validate()?;

            let params = SelfTestParams::from(cfg);
            info!("自检参数: {:?}", params);
            let report = run_self_test(&params)?;
            println!(
                "自检{}: {}/{} 轮通过, 共编码 {} 位",
                if report.passed() { "通过" } else { "失败" },
                report.trials - report.failures,
                report.trials,
                report.total_bits
            );
            Ok(report.passed())
        }
        Command::Version => {
            println!("avc-cli 版本 {}", avc::version());
            Ok(true)
        }
    }
}
