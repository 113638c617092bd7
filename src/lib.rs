//! # avc
//!
//! 纯 Rust 实现的 H.264 宏块编码层.
//!
//! 提供宏块级的完整编解码链路:
//! - **比特流**: MSB 优先的按位读写
//! - **熵编码**: Exp-Golomb、CAVLC 及其结构化码表
//! - **变换量化**: 4x4 整数变换、DC Hadamard 变换与按 QP 量化
//! - **宏块层**: 邻居关系、coded_block_pattern、mb_type 与宏块语法读写
//!
//! # 快速开始
//!
//! ```rust,no_run
//! use avc::config::SelfTestConfig;
//! use avc::codec::h264::run_self_test;
//!
//! let config = SelfTestConfig::default();
//! let report = run_self_test(&config.into()).unwrap();
//! println!("{}/{} 轮通过", report.trials - report.failures, report.trials);
//! ```
//!
//! # Crate 结构
//!
//! | Crate | 功能 |
//! |-------|------|
//! | `avc-core` | 错误类型、比特流读写、平面叠加视图 |
//! | `avc-codec` | H.264 宏块编码层 |

pub mod config;

/// 核心类型与工具
pub use avc_core as core;

/// H.264 宏块编码层
pub use avc_codec as codec;

/// 获取版本号
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
