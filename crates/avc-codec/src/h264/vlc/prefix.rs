//! level_prefix 码 (H.264 9.2.2.1).
//!
//! `level_prefix` 个 0 后跟一个 1, 取值 0..=31.

use avc_core::{AvcError, AvcResult, BitReader, BitWriter};

use super::VlcCode;

/// level_prefix 最大取值
pub const MAX_LEVEL_PREFIX: u32 = 31;

/// 查询码字, 超出范围返回 [`VlcCode::NONE`]
pub fn level_prefix_code(prefix: u32) -> VlcCode {
    if prefix > MAX_LEVEL_PREFIX {
        return VlcCode::NONE;
    }
    VlcCode::new(prefix as u8 + 1, 1)
}

/// 编码 level_prefix, 返回写入的位数
pub fn encode_level_prefix(bw: &mut BitWriter, prefix: u32) -> AvcResult<u32> {
    let vlc = level_prefix_code(prefix);
    if !vlc.is_valid() {
        return Err(AvcError::VlcTableMiss(format!(
            "level_prefix {} 超过 {}",
            prefix, MAX_LEVEL_PREFIX
        )));
    }
    bw.write_unary(prefix, 1)?;
    Ok(u32::from(vlc.len))
}

/// 解码 level_prefix
pub fn decode_level_prefix(br: &mut BitReader) -> AvcResult<u32> {
    br.read_unary(1, MAX_LEVEL_PREFIX)
}
