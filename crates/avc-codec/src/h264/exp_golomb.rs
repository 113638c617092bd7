//! Exp-Golomb 通用码 (H.264 9.1).
//!
//! - ue(v): 无符号, `lz` 个 0、一个 1、再加 `lz` 位后缀, `lz = floor(log2(v + 1))`
//! - se(v): 有符号, 0 -> 0, 正数 k -> 2k-1, 负数 -k -> 2k
//! - te(v): 截断, 取值范围为 [0, 1] 时退化为 1 位反码
//!
//! 前缀和后缀分开写入, 因此码长可以超过 32 位 (最多 63 位).

use avc_core::{AvcError, AvcResult, BitReader, BitWriter};

/// ue(v) 允许的最大前导零个数
const MAX_LEADING_ZEROS: u32 = 31;

/// ue(v) 码长
pub fn ue_len(value: u32) -> u32 {
    let lz = 63 - (u64::from(value) + 1).leading_zeros();
    2 * lz + 1
}

/// 写入 ue(v), 返回写入的位数
pub fn write_ue(bw: &mut BitWriter, value: u32) -> AvcResult<u32> {
    if value == u32::MAX {
        return Err(AvcError::VlcTableMiss(format!("ue(v) 无法表示 {}", value)));
    }
    let code = value + 1;
    let lz = 31 - code.leading_zeros();
    bw.write_bits(0, lz)?;
    bw.write_bit(1)?;
    bw.write_bits(code - (1 << lz), lz)?;
    Ok(2 * lz + 1)
}

/// 读取 ue(v)
pub fn read_ue(br: &mut BitReader) -> AvcResult<u32> {
    let mut leading_zeros = 0u32;
    while br.read_bit()? == 0 {
        leading_zeros += 1;
        if leading_zeros > MAX_LEADING_ZEROS {
            return Err(AvcError::VlcTableMiss("ue(v) 前导零超过 31".into()));
        }
    }
    if leading_zeros == 0 {
        return Ok(0);
    }
    let suffix = br.read_bits(leading_zeros)?;
    Ok(((1u64 << leading_zeros) - 1 + u64::from(suffix)) as u32)
}

/// 有符号值映射为 ue(v) 码号
fn se_to_code(value: i32) -> u32 {
    if value > 0 {
        (2 * i64::from(value) - 1) as u32
    } else {
        (-2 * i64::from(value)) as u32
    }
}

/// 写入 se(v), 返回写入的位数
pub fn write_se(bw: &mut BitWriter, value: i32) -> AvcResult<u32> {
    write_ue(bw, se_to_code(value))
}

/// 读取 se(v)
pub fn read_se(br: &mut BitReader) -> AvcResult<i32> {
    let code = i64::from(read_ue(br)?);
    Ok(if code & 1 == 1 {
        ((code + 1) / 2) as i32
    } else {
        (-(code / 2)) as i32
    })
}

/// 写入 te(v), `range` 为语法元素的最大取值
pub fn write_te(bw: &mut BitWriter, value: u32, range: u32) -> AvcResult<u32> {
    if range == 1 {
        if value > 1 {
            return Err(AvcError::VlcTableMiss(format!(
                "te(v) 取值 {} 超出范围 [0, 1]",
                value
            )));
        }
        bw.write_bit(1 - value)?;
        return Ok(1);
    }
    write_ue(bw, value)
}

/// 读取 te(v)
pub fn read_te(br: &mut BitReader, range: u32) -> AvcResult<u32> {
    if range == 1 {
        return Ok(1 - br.read_bit()?);
    }
    read_ue(br)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bits_of(bw: BitWriter) -> (Vec<u8>, usize) {
        let len = bw.bits_written();
        (bw.finish(), len)
    }

    #[test]
    fn test_ue_known_codewords() {
        // 0 -> 1, 1 -> 010, 2 -> 011, 3 -> 00100
        let mut bw = BitWriter::new();
        assert_eq!(write_ue(&mut bw, 0).unwrap(), 1);
        assert_eq!(write_ue(&mut bw, 1).unwrap(), 3);
        assert_eq!(write_ue(&mut bw, 2).unwrap(), 3);
        assert_eq!(write_ue(&mut bw, 3).unwrap(), 5);
        let (data, len) = bits_of(bw);
        assert_eq!(len, 12);
        assert_eq!(data, vec![0b1010_0110, 0b0100_0000]);
    }

    #[test]
    fn test_ue_len_matches_writer() {
        for v in [0u32, 1, 2, 6, 7, 254, 255, 65_534, 65_535, 1 << 20] {
            let mut bw = BitWriter::new();
            assert_eq!(write_ue(&mut bw, v).unwrap(), ue_len(v), "v={}", v);
            assert_eq!(bw.bits_written() as u32, ue_len(v));
        }
    }

    #[test]
    fn test_ue_roundtrip_16_bit_range() {
        let mut bw = BitWriter::new();
        for v in 0..(1u32 << 16) {
            write_ue(&mut bw, v).unwrap();
        }
        let (data, len) = bits_of(bw);
        let mut br = BitReader::with_bit_len(&data, len).unwrap();
        for v in 0..(1u32 << 16) {
            assert_eq!(read_ue(&mut br).unwrap(), v);
        }
        assert!(br.is_eof());
    }

    #[test]
    fn test_ue_long_code_beyond_32_bits() {
        let v = (1u32 << 20) + 12_345;
        let mut bw = BitWriter::new();
        assert_eq!(write_ue(&mut bw, v).unwrap(), 41);
        let (data, len) = bits_of(bw);
        let mut br = BitReader::with_bit_len(&data, len).unwrap();
        assert_eq!(read_ue(&mut br).unwrap(), v);
        assert!(write_ue(&mut BitWriter::new(), u32::MAX).is_err());
    }

    #[test]
    fn test_ue_too_many_leading_zeros() {
        let data = [0u8; 8];
        let mut br = BitReader::new(&data);
        assert!(matches!(read_ue(&mut br), Err(AvcError::VlcTableMiss(_))));
    }

    #[test]
    fn test_se_mapping_order() {
        // 0 -> 0, 1 -> 1, -1 -> 2, 2 -> 3, -2 -> 4
        let expected = [(0, 0u32), (1, 1), (-1, 2), (2, 3), (-2, 4)];
        for (value, code) in expected {
            assert_eq!(se_to_code(value), code, "value={}", value);
        }
    }

    #[test]
    fn test_se_roundtrip() {
        let values = [0, 1, -1, 2, -2, 100, -100, 8191, -8192, 32_767, -32_768];
        let mut bw = BitWriter::new();
        for &v in &values {
            write_se(&mut bw, v).unwrap();
        }
        let (data, len) = bits_of(bw);
        let mut br = BitReader::with_bit_len(&data, len).unwrap();
        for &v in &values {
            assert_eq!(read_se(&mut br).unwrap(), v);
        }
    }

    #[test]
    fn test_te_single_bit_range() {
        let mut bw = BitWriter::new();
        assert_eq!(write_te(&mut bw, 1, 1).unwrap(), 1);
        assert_eq!(write_te(&mut bw, 0, 1).unwrap(), 1);
        assert_eq!(write_te(&mut bw, 5, 7).unwrap(), 5);
        assert!(write_te(&mut bw, 2, 1).is_err());
        let (data, len) = bits_of(bw);
        assert_eq!(data[0] >> 6, 0b01);
        let mut br = BitReader::with_bit_len(&data, len).unwrap();
        assert_eq!(read_te(&mut br, 1).unwrap(), 1);
        assert_eq!(read_te(&mut br, 1).unwrap(), 0);
        assert_eq!(read_te(&mut br, 7).unwrap(), 5);
    }
}
