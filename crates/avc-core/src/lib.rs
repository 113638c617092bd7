//! # avc-core
//!
//! H.264 宏块编码层的底层基础设施: 统一错误类型、按位读写的比特流,
//! 以及在平面采样缓冲区上开窗的二维叠加视图.

pub mod bitreader;
pub mod bitwriter;
pub mod error;
pub mod overlay;

// 重导出常用类型
pub use bitreader::BitReader;
pub use bitwriter::BitWriter;
pub use error::{AvcError, AvcResult};
pub use overlay::Overlay2d;
