//! 比特流读取器.
//!
//! 在固定字节缓冲区上按位读取, 大端位序 (MSB first). 读取器绑定一个比特长度,
//! 位置永远不会越过该长度: 越界读取返回 [`AvcError::StreamExhausted`],
//! 而不是读出缓冲区尾部的垃圾数据.

use log::trace;

use crate::{AvcError, AvcResult};

/// 比特流读取器
///
/// # 示例
/// ```
/// use avc_core::bitreader::BitReader;
///
/// let data = [0b10110001, 0b01010101];
/// let mut br = BitReader::new(&data);
/// assert_eq!(br.read_bits(4).unwrap(), 0b1011);
/// assert_eq!(br.read_bits(4).unwrap(), 0b0001);
/// assert_eq!(br.read_bits(8).unwrap(), 0b01010101);
/// ```
#[derive(Debug, Clone)]
pub struct BitReader<'a> {
    /// 源数据
    data: &'a [u8],
    /// 绑定的有效比特长度
    bit_len: usize,
    /// 当前比特位置
    pos: usize,
}

impl<'a> BitReader<'a> {
    /// 以整个缓冲区为有效长度创建读取器
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            bit_len: data.len() * 8,
            pos: 0,
        }
    }

    /// 以指定比特长度创建读取器
    ///
    /// `bit_len` 不能超过缓冲区容量.
    pub fn with_bit_len(data: &'a [u8], bit_len: usize) -> AvcResult<Self> {
        let mut br = Self::new(data);
        br.set_stream(data, bit_len)?;
        Ok(br)
    }

    /// 重新绑定缓冲区和比特长度, 位置归零
    pub fn set_stream(&mut self, data: &'a [u8], bit_len: usize) -> AvcResult<()> {
        if bit_len > data.len() * 8 {
            return Err(AvcError::InvalidArgument(format!(
                "比特长度 {} 超过缓冲区容量 {} 位",
                bit_len,
                data.len() * 8,
            )));
        }
        self.data = data;
        self.bit_len = bit_len;
        self.pos = 0;
        Ok(())
    }

    /// 回到第 0 位, 不重新绑定缓冲区
    pub fn reset(&mut self) {
        self.pos = 0;
    }

    /// 当前比特位置
    pub fn position(&self) -> usize {
        self.pos
    }

    /// 绑定的比特长度
    pub fn bit_len(&self) -> usize {
        self.bit_len
    }

    /// 剩余可读位数
    pub fn bits_left(&self) -> usize {
        self.bit_len - self.pos
    }

    /// 是否已到达绑定长度
    pub fn is_eof(&self) -> bool {
        self.pos >= self.bit_len
    }

    fn exhausted(&self) -> AvcError {
        trace!("比特流已读尽: 位置 {}, 长度 {}", self.pos, self.bit_len);
        AvcError::StreamExhausted {
            position: self.pos,
            length: self.bit_len,
        }
    }

    /// 读取 1 个位
    pub fn read_bit(&mut self) -> AvcResult<u32> {
        if self.pos >= self.bit_len {
            return Err(self.exhausted());
        }
        let bit = (self.data[self.pos >> 3] >> (7 - (self.pos & 7))) & 1;
        self.pos += 1;
        Ok(u32::from(bit))
    }

    /// 读取 N 个位 (最多 32 位), 返回值的低 N 位有效
    pub fn read_bits(&mut self, n: u32) -> AvcResult<u32> {
        let value = self.peek_bits(n)?;
        self.pos += n as usize;
        Ok(value)
    }

    /// 窥视 N 个位 (不移动位置)
    pub fn peek_bits(&self, n: u32) -> AvcResult<u32> {
        if n > 32 {
            return Err(AvcError::InvalidArgument(format!(
                "peek_bits: n={} 超过 32 位",
                n,
            )));
        }
        if n as usize > self.bits_left() {
            return Err(self.exhausted());
        }

        let mut result: u32 = 0;
        let mut pos = self.pos;
        let mut remaining = n;
        while remaining > 0 {
            let bit_in_byte = (pos & 7) as u32;
            let available = 8 - bit_in_byte;
            let take = remaining.min(available);
            let shift = available - take;
            let mask = ((1u32 << take) - 1) as u8;
            let bits = (self.data[pos >> 3] >> shift) & mask;
            result = (result << take) | u32::from(bits);
            pos += take as usize;
            remaining -= take;
        }
        Ok(result)
    }

    /// 读取一元编码值
    ///
    /// 统计 `stop_bit` 出现之前的相反位个数, 例如 `read_unary(1)` 从 `0001` 读出 3.
    /// `limit` 限制最大计数, 超过时视为码表未命中.
    pub fn read_unary(&mut self, stop_bit: u32, limit: u32) -> AvcResult<u32> {
        let stop = stop_bit & 1;
        let mut count = 0u32;
        loop {
            if self.read_bit()? == stop {
                return Ok(count);
            }
            count += 1;
            if count > limit {
                return Err(AvcError::VlcTableMiss(format!(
                    "一元码长度超过上限 {}",
                    limit
                )));
            }
        }
    }

    /// 跳过 N 个位
    pub fn skip_bits(&mut self, n: usize) -> AvcResult<()> {
        if n > self.bits_left() {
            return Err(self.exhausted());
        }
        self.pos += n;
        Ok(())
    }

    /// 定位到指定比特位置
    pub fn seek(&mut self, bit_pos: usize) -> AvcResult<()> {
        if bit_pos > self.bit_len {
            trace!("定位越界: 目标 {}, 长度 {}", bit_pos, self.bit_len);
            return Err(AvcError::StreamExhausted {
                position: bit_pos,
                length: self.bit_len,
            });
        }
        self.pos = bit_pos;
        Ok(())
    }

    /// 对齐到下一个字节边界
    pub fn align_to_byte(&mut self) {
        self.pos = ((self.pos + 7) & !7).min(self.bit_len);
    }

    /// 获取底层数据的引用
    pub fn data(&self) -> &'a [u8] {
        self.data
    }
}
