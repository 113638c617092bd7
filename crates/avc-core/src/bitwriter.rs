//! 比特流写入器.
//!
//! 按位写入字节缓冲区, 大端位序 (MSB first), 与 [`BitReader`](crate::BitReader) 对应.
//! 可以按比特数限定容量, 对应调用方预先分配的固定码流缓冲区:
//! 超出容量的写入返回 [`AvcError::StreamExhausted`].

use log::trace;

use crate::{AvcError, AvcResult};

/// 比特流写入器
///
/// # 示例
/// ```
/// use avc_core::bitwriter::BitWriter;
///
/// let mut bw = BitWriter::new();
/// bw.write_bits(0b1011, 4).unwrap();
/// bw.write_bits(0b0001, 4).unwrap();
/// bw.write_bits(0b01010101, 8).unwrap();
/// assert_eq!(bw.finish(), vec![0b10110001, 0b01010101]);
/// ```
#[derive(Debug, Clone)]
pub struct BitWriter {
    /// 已完成的字节
    data: Vec<u8>,
    /// 正在填充的字节
    current_byte: u8,
    /// 当前字节中已填充的位数 (0-7)
    bit_count: u8,
    /// 容量上限 (比特), None 表示不限
    limit_bits: Option<usize>,
}

impl BitWriter {
    /// 创建不限容量的写入器
    pub fn new() -> Self {
        Self {
            data: Vec::new(),
            current_byte: 0,
            bit_count: 0,
            limit_bits: None,
        }
    }

    /// 创建限定比特容量的写入器
    pub fn with_bit_capacity(limit_bits: usize) -> Self {
        Self {
            data: Vec::with_capacity(limit_bits.div_ceil(8)),
            current_byte: 0,
            bit_count: 0,
            limit_bits: Some(limit_bits),
        }
    }

    /// 获取已写入的总位数
    pub fn bits_written(&self) -> usize {
        self.data.len() * 8 + self.bit_count as usize
    }

    /// 清空已写入的内容, 保留容量设置
    pub fn reset(&mut self) {
        self.data.clear();
        self.current_byte = 0;
        self.bit_count = 0;
    }

    fn ensure_room(&self, n: u32) -> AvcResult<()> {
        if let Some(limit) = self.limit_bits {
            let needed = self.bits_written() + n as usize;
            if needed > limit {
                trace!("码流缓冲区已满: 需要 {} 位, 容量 {}", needed, limit);
                return Err(AvcError::StreamExhausted {
                    position: self.bits_written(),
                    length: limit,
                });
            }
        }
        Ok(())
    }

    /// 写入 1 个位
    pub fn write_bit(&mut self, bit: u32) -> AvcResult<()> {
        self.ensure_room(1)?;
        self.push_bits(bit & 1, 1);
        Ok(())
    }

    /// 写入 N 个位 (最多 32 位)
    ///
    /// 值的低 N 位被写入, 高位在前. 可在字节中间连续调用.
    pub fn write_bits(&mut self, value: u32, n: u32) -> AvcResult<()> {
        if n > 32 {
            return Err(AvcError::InvalidArgument(format!(
                "write_bits: n={} 超过 32 位",
                n
            )));
        }
        if n == 0 {
            return Ok(());
        }
        self.ensure_room(n)?;
        self.push_bits(value, n);
        Ok(())
    }

    fn push_bits(&mut self, value: u32, n: u32) {
        let mut remaining = n;
        while remaining > 0 {
            let available = 8 - self.bit_count as u32;
            let take = remaining.min(available);
            let shift = remaining - take;
            let bits = ((value >> shift) & ((1u32 << take) - 1)) as u8;

            self.current_byte = if take == 8 {
                bits
            } else {
                (self.current_byte << take) | bits
            };
            self.bit_count += take as u8;
            if self.bit_count == 8 {
                self.data.push(self.current_byte);
                self.current_byte = 0;
                self.bit_count = 0;
            }
            remaining -= take;
        }
    }

    /// 写入一元编码: `count` 个 `!stop_bit`, 然后一个 `stop_bit`
    pub fn write_unary(&mut self, count: u32, stop_bit: u32) -> AvcResult<()> {
        self.ensure_room(count + 1)?;
        let fill = 1 - (stop_bit & 1);
        for _ in 0..count {
            self.push_bits(fill, 1);
        }
        self.push_bits(stop_bit & 1, 1);
        Ok(())
    }

    /// 对齐到字节边界 (用 0 填充)
    pub fn align_to_byte(&mut self) {
        if self.bit_count > 0 {
            let pad = 8 - self.bit_count;
            self.data.push(self.current_byte << pad);
            self.current_byte = 0;
            self.bit_count = 0;
        }
    }

    /// 当前内容的字节拷贝, 末尾不完整的字节以 0 补齐, 不改变写入状态
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = self.data.clone();
        if self.bit_count > 0 {
            out.push(self.current_byte << (8 - self.bit_count));
        }
        out
    }

    /// 完成写入, 返回字节数据
    pub fn finish(mut self) -> Vec<u8> {
        self.align_to_byte();
        self.data
    }
}

impl Default for BitWriter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bitreader::BitReader;

    #[test]
    fn test_write_bits_basic() {
        let mut bw = BitWriter::new();
        bw.write_bits(0b1011, 4).unwrap();
        bw.write_bits(0b0001, 4).unwrap();
        assert_eq!(bw.finish(), vec![0b10110001]);
    }

    #[test]
    fn test_write_bits_mid_byte_32_bit() {
        let mut bw = BitWriter::new();
        bw.write_bit(1).unwrap();
        bw.write_bits(0xFF00FF00, 32).unwrap();
        assert_eq!(bw.bits_written(), 33);
        assert_eq!(bw.finish(), vec![0xFF, 0x80, 0x7F, 0x80, 0x00]);
    }

    #[test]
    fn test_write_unary() {
        let mut bw = BitWriter::new();
        bw.write_unary(3, 1).unwrap();
        bw.write_unary(0, 1).unwrap();
        assert_eq!(bw.finish(), vec![0b00011000]);
    }

    #[test]
    fn test_capacity_limit() {
        let mut bw = BitWriter::with_bit_capacity(10);
        bw.write_bits(0xFF, 8).unwrap();
        assert!(matches!(
            bw.write_bits(0, 3),
            Err(AvcError::StreamExhausted {
                position: 8,
                length: 10
            })
        ));
        bw.write_bits(0b10, 2).unwrap();
        assert!(bw.write_bit(0).is_err());
        assert_eq!(bw.bits_written(), 10);
    }

    #[test]
    fn test_reset_keeps_capacity() {
        let mut bw = BitWriter::with_bit_capacity(8);
        bw.write_bits(0xAB, 8).unwrap();
        bw.reset();
        assert_eq!(bw.bits_written(), 0);
        bw.write_bits(0xCD, 8).unwrap();
        assert!(bw.write_bit(1).is_err());
        assert_eq!(bw.to_bytes(), vec![0xCD]);
    }

    #[test]
    fn test_to_bytes_then_read_back() {
        let mut bw = BitWriter::new();
        bw.write_bits(0b10110, 5).unwrap();
        bw.write_bits(0xFF, 8).unwrap();
        let bytes = bw.to_bytes();
        let mut br = BitReader::with_bit_len(&bytes, bw.bits_written()).unwrap();
        assert_eq!(br.read_bits(5).unwrap(), 0b10110);
        assert_eq!(br.read_bits(8).unwrap(), 0xFF);
        assert!(br.is_eof());
    }
}
