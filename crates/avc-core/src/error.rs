//! 统一错误类型定义.
//!
//! 比特流、VLC 码表、CAVLC 与宏块层共用的错误类型, 各层通过 `?` 逐级传播.

use thiserror::Error;

/// 宏块编码层统一错误类型
#[derive(Debug, Error)]
pub enum AvcError {
    /// 无效参数
    #[error("无效参数: {0}")]
    InvalidArgument(String),

    /// 符号不在码表定义域内, 或解码时没有匹配的码字
    #[error("VLC 码表未命中: {0}")]
    VlcTableMiss(String),

    /// 编解码器错误 (CAVLC 或宏块层)
    #[error("编解码器错误: {0}")]
    Codec(String),

    /// 读写越过了绑定的比特长度
    #[error("比特流耗尽: 位置 {position}, 长度 {length}")]
    StreamExhausted {
        /// 出错时的比特位置
        position: usize,
        /// 绑定的比特长度
        length: usize,
    },

    /// 编解码头部解析失败
    #[error("头部解析失败: {0}")]
    HeaderParse(String),

    /// 无效数据 (损坏的码流等)
    #[error("无效数据: {0}")]
    InvalidData(String),

    /// I/O 错误
    #[error("I/O 错误: {0}")]
    Io(#[from] std::io::Error),
}

/// 宏块编码层统一 Result 类型
pub type AvcResult<T> = Result<T, AvcError>;
