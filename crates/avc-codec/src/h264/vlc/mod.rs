//! 结构化 VLC 码表 (H.264 9.2).
//!
//! 每个码表都是固定的查找表, 编码时按符号直接查表得到 (位数, 码字),
//! 解码时逐项窥视比特流做前缀匹配. 所有码表都无内部状态, 可在任意多个块之间复用.

pub mod cbp;
pub mod coeff_token;
pub mod prefix;
pub mod run_before;
pub mod total_zeros;

use log::warn;

use avc_core::{AvcError, AvcResult, BitReader, BitWriter};

pub use cbp::{decode_cbp, encode_cbp};
pub use coeff_token::{CoeffTokenTable, decode_coeff_token, encode_coeff_token};
pub use prefix::{decode_level_prefix, encode_level_prefix};
pub use run_before::{decode_run_before, encode_run_before};
pub use total_zeros::{TotalZerosTable, decode_total_zeros, encode_total_zeros};

/// VLC 码字, 位数为 0 表示该符号不在码表中
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VlcCode {
    /// 码长 (位)
    pub len: u8,
    /// 码字, 低 `len` 位有效
    pub code: u32,
}

impl VlcCode {
    /// 无效码字
    pub const NONE: Self = Self { len: 0, code: 0 };

    /// 创建码字
    pub const fn new(len: u8, code: u32) -> Self {
        Self { len, code }
    }

    /// 是否为有效码字
    pub fn is_valid(&self) -> bool {
        self.len > 0
    }

    /// 写入比特流, 返回写入的位数
    pub fn write(self, bw: &mut BitWriter) -> AvcResult<u32> {
        bw.write_bits(self.code, u32::from(self.len))?;
        Ok(u32::from(self.len))
    }
}

/// 在候选码字中做前缀匹配, 命中时消耗对应的位数并返回符号
///
/// 流尾剩余位数不足以比较某个候选时跳过该候选; 全部未命中时,
/// 若有候选因位数不足被跳过则报告比特流耗尽, 否则报告码表未命中.
pub(crate) fn decode_symbol<T, I>(br: &mut BitReader, candidates: I, what: &str) -> AvcResult<T>
where
    I: IntoIterator<Item = (VlcCode, T)>,
{
    let mut short = false;
    for (vlc, symbol) in candidates {
        if !vlc.is_valid() {
            continue;
        }
        match br.peek_bits(u32::from(vlc.len)) {
            Ok(bits) if bits == vlc.code => {
                br.skip_bits(usize::from(vlc.len))?;
                return Ok(symbol);
            }
            Ok(_) => {}
            Err(_) => short = true,
        }
    }

    if short {
        return Err(AvcError::StreamExhausted {
            position: br.position(),
            length: br.bit_len(),
        });
    }
    warn!("{} 解码失败: 比特位置 = {}", what, br.position());
    Err(AvcError::VlcTableMiss(format!(
        "{} 无匹配码字, 比特位置 {}",
        what,
        br.position()
    )))
}
