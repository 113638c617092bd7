//! H.264 宏块编码层.
//!
//! 自底向上:
//! - [`exp_golomb`]: ue/se/te 编码
//! - [`vlc`]: CAVLC 使用的各个结构化码表
//! - [`cavlc`]: 4x4 与色度 DC 块的 run-level 熵编码
//! - [`transform`]: 整数变换、Hadamard 与量化
//! - [`block`] / [`macroblock`] / [`grid`]: 块、宏块与邻居关系
//! - [`residual`]: 宏块残差的变换流程与平面样本搬运
//! - [`layer`]: 宏块层语法读写
//! - [`header`]: NAL 单元与帧头信息
//! - [`selftest`]: 端到端自检

pub mod block;
pub mod cavlc;
pub mod exp_golomb;
pub mod grid;
pub mod header;
pub mod layer;
pub mod macroblock;
pub mod residual;
pub mod selftest;
pub mod transform;
pub mod vlc;

pub use block::{Block, BlockRef, Colour};
pub use cavlc::{BlockCoding, Cavlc, CavlcContext, CavlcMode};
pub use grid::MacroblockGrid;
pub use header::{
    CodecHeader, NalUnit, NalUnitType, PictureCodingType, build_annex_b_nal, split_annex_b,
    write_rbsp_trailing_bits,
};
pub use layer::MacroblockLayer;
pub use macroblock::{Macroblock, MbPartPredMode, MotionVector, SliceType};
pub use residual::{Yuv420Picture, forward_residual, inverse_residual};
pub use selftest::{Lcg, SelfTestParams, SelfTestReport, run_self_test};
pub use transform::{Transform, TransformKind, TransformMode, chroma_qp, quant_error_bound};
