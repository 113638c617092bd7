//! # avc-codec
//!
//! H.264 宏块编码层: Exp-Golomb 与 CAVLC 熵编码、4x4 整数变换与量化、
//! 宏块/块的邻居关系与编码顺序, 以及宏块层语法的读写.
//!
//! ## 使用示例
//!
//! ```rust
//! use avc_codec::h264::{SelfTestParams, run_self_test};
//!
//! let params = SelfTestParams { trials: 4, ..Default::default() };
//! let report = run_self_test(&params).unwrap();
//! assert_eq!(report.trials, 4);
//! ```

pub mod h264;

// 重导出常用类型
pub use h264::{
    Cavlc, CavlcContext, CavlcMode, CodecHeader, MacroblockGrid, MacroblockLayer,
    PictureCodingType, SelfTestParams, SelfTestReport, SliceType, Transform, run_self_test,
};
