//! coded_block_pattern 映射 (H.264 表 9-4, chroma_format_idc = 1).
//!
//! 编码块模式先按 Intra/Inter 映射成码号, 再以 ue(v) 写出 (即 me(v)).

use avc_core::{AvcError, AvcResult, BitReader, BitWriter};

use crate::h264::exp_golomb::{read_ue, write_ue};

/// Intra_4x4 / Intra_8x8 宏块: 按编码块模式索引的码号
const INTRA_CODE_NUM: [u8; 48] = [
    3, 29, 30, 17, 31, 18, 37, 8, 32, 38, 19, 9, 20, 10, 11, 2,
    16, 33, 34, 21, 35, 22, 39, 4, 36, 40, 23, 5, 24, 6, 7, 1,
    41, 42, 43, 25, 44, 26, 46, 12, 45, 47, 27, 13, 28, 14, 15, 0,
];

/// Inter 宏块: 按编码块模式索引的码号
const INTER_CODE_NUM: [u8; 48] = [
    0, 2, 3, 7, 4, 8, 17, 13, 5, 18, 9, 14, 10, 15, 16, 11,
    1, 32, 33, 36, 34, 37, 44, 40, 35, 45, 38, 41, 39, 42, 43, 19,
    6, 24, 25, 20, 26, 21, 46, 28, 27, 47, 22, 29, 23, 30, 31, 12,
];

fn table(inter: bool) -> &'static [u8; 48] {
    if inter { &INTER_CODE_NUM } else { &INTRA_CODE_NUM }
}

/// 编码 coded_block_pattern, 返回写入的位数
pub fn encode_cbp(bw: &mut BitWriter, cbp: u8, inter: bool) -> AvcResult<u32> {
    let code_num = table(inter).get(usize::from(cbp)).ok_or_else(|| {
        AvcError::VlcTableMiss(format!("coded_block_pattern {} 超出 [0, 47]", cbp))
    })?;
    write_ue(bw, u32::from(*code_num))
}

/// 解码 coded_block_pattern
pub fn decode_cbp(br: &mut BitReader, inter: bool) -> AvcResult<u8> {
    let code_num = read_ue(br)?;
    table(inter)
        .iter()
        .position(|&c| u32::from(c) == code_num)
        .map(|cbp| cbp as u8)
        .ok_or_else(|| {
            AvcError::VlcTableMiss(format!("coded_block_pattern 码号 {} 超出 [0, 47]", code_num))
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tables_are_permutations() {
        for inter in [false, true] {
            let mut seen = [false; 48];
            for &c in table(inter) {
                assert!(!seen[usize::from(c)]);
                seen[usize::from(c)] = true;
            }
        }
    }

    #[test]
    fn test_cbp_roundtrip() {
        for inter in [false, true] {
            let mut bw = BitWriter::new();
            for cbp in 0..48u8 {
                encode_cbp(&mut bw, cbp, inter).unwrap();
            }
            let len = bw.bits_written();
            let data = bw.finish();
            let mut br = BitReader::with_bit_len(&data, len).unwrap();
            for cbp in 0..48u8 {
                assert_eq!(decode_cbp(&mut br, inter).unwrap(), cbp);
            }
        }
    }

    #[test]
    fn test_common_patterns_are_short() {
        // Inter cbp=0 -> 码号 0 -> "1"; Intra cbp=47 -> 码号 0
        let mut bw = BitWriter::new();
        assert_eq!(encode_cbp(&mut bw, 0, true).unwrap(), 1);
        assert_eq!(encode_cbp(&mut bw, 47, false).unwrap(), 1);
        assert!(matches!(
            encode_cbp(&mut bw, 48, true),
            Err(AvcError::VlcTableMiss(_))
        ));
    }
}
