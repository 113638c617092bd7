//! CAVLC 残差块编解码 (H.264 9.2).
//!
//! 单个块的游程-幅值编码:
//! 1. coeff_token (TotalCoeff, TrailingOnes), 由 nC 选表
//! 2. 拖尾 ±1 的符号位
//! 3. 其余幅值: level_prefix + level_suffix, suffixLength 随幅值自适应增长
//! 4. total_zeros 与每个系数前的 run_before (最后一个游程由剩余零数推出)
//!
//! 编解码器本身无状态, suffixLength 只是单次调用内的局部变量, 同一实例可在任意块间复用.
//! nC 与 DC 跳过标志每次调用都由调用方显式传入.

use log::trace;

use avc_core::{AvcError, AvcResult, BitReader, BitWriter};

use super::vlc::{
    TotalZerosTable, decode_coeff_token, decode_level_prefix, decode_run_before,
    decode_total_zeros, encode_coeff_token, encode_level_prefix, encode_run_before,
    encode_total_zeros,
};

/// 4x4 块 zigzag 扫描顺序 (扫描序号 -> 光栅位置)
pub const ZIGZAG_4X4: [usize; 16] = [0, 1, 4, 8, 5, 2, 3, 6, 9, 12, 13, 10, 7, 11, 14, 15];

/// 2x2 色度 DC 扫描顺序
pub const SCAN_2X2: [usize; 4] = [0, 1, 2, 3];

/// 2x4 (宽 2, 高 4) 色度 DC 扫描顺序
pub const SCAN_2X4: [usize; 8] = [0, 2, 1, 4, 6, 3, 5, 7];

/// 块尺寸模式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CavlcMode {
    /// 16 系数块 (亮度、色度 AC、Intra16x16 亮度 DC)
    Block4x4,
    /// 4:2:0 色度 DC
    ChromaDc2x2,
    /// 4:2:2 色度 DC
    ChromaDc2x4,
}

impl CavlcMode {
    /// 扫描顺序
    pub fn scan(&self) -> &'static [usize] {
        match self {
            Self::Block4x4 => &ZIGZAG_4X4,
            Self::ChromaDc2x2 => &SCAN_2X2,
            Self::ChromaDc2x4 => &SCAN_2X4,
        }
    }

    /// 块系数个数
    pub fn max_coeffs(&self) -> usize {
        self.scan().len()
    }

    fn total_zeros_table(&self) -> TotalZerosTable {
        match self {
            Self::Block4x4 => TotalZerosTable::Block4x4,
            Self::ChromaDc2x2 => TotalZerosTable::ChromaDc2x2,
            Self::ChromaDc2x4 => TotalZerosTable::ChromaDc2x4,
        }
    }
}

/// 单次调用的上下文参数
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CavlcContext {
    /// 邻块系数个数 nC, 负值 (-1/-2) 直接选择色度 DC 码表
    pub nc: i32,
    /// 位置 0 的 DC 系数已由独立的 DC 块承载, 扫描从第 1 个系数开始
    pub dc_skip: bool,
}

impl CavlcContext {
    /// 创建上下文
    pub fn new(nc: i32, dc_skip: bool) -> Self {
        Self { nc, dc_skip }
    }
}

/// 单块编解码结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockCoding {
    /// 写入或读取的位数
    pub bits: u32,
    /// 非零系数个数
    pub total_coeffs: u8,
}

/// CAVLC 游程-幅值编解码器
#[derive(Debug, Clone, Copy)]
pub struct Cavlc {
    mode: CavlcMode,
}

// ============================================================
// 幅值编码辅助
// ============================================================

/// 拖尾 1 之后的幅值按 suffixLength 切分为前缀与后缀, 返回 (prefix, suffix, suffix_size)
fn split_level_code(level_code: i32, suffix_length: u32) -> (u32, u32, u32) {
    let sl = suffix_length;
    if sl == 0 && (14..30).contains(&level_code) {
        return (14, (level_code - 14) as u32, 4);
    }
    if level_code < (15 << sl) {
        let mask = (1i32 << sl) - 1;
        return ((level_code >> sl) as u32, (level_code & mask) as u32, sl);
    }

    let mut rest = i64::from(level_code) - (15i64 << sl);
    if sl == 0 {
        rest -= 15;
    }
    let mut prefix = 15u32;
    while rest >= (1i64 << (prefix - 2)) - 4096 {
        prefix += 1;
    }
    if prefix >= 16 {
        rest -= (1i64 << (prefix - 3)) - 4096;
    }
    (prefix, rest as u32, prefix - 3)
}

fn next_suffix_length(suffix_length: u32, level: i32) -> u32 {
    let mut sl = suffix_length.max(1);
    if level.unsigned_abs() > (3u32 << (sl - 1)) && sl < 6 {
        sl += 1;
    }
    sl
}

impl Cavlc {
    /// 创建指定块模式的编解码器
    pub fn new(mode: CavlcMode) -> Self {
        Self { mode }
    }

    /// 块模式
    pub fn mode(&self) -> CavlcMode {
        self.mode
    }

    fn coded_range(&self, ctx: CavlcContext) -> usize {
        let skip = usize::from(ctx.dc_skip);
        self.mode.max_coeffs() - skip
    }

    /// 编码一个块 (系数为自然光栅顺序)
    pub fn encode(
        &self,
        bw: &mut BitWriter,
        coeffs: &[i32],
        ctx: CavlcContext,
    ) -> AvcResult<BlockCoding> {
        let scan = self.mode.scan();
        if coeffs.len() < scan.len() {
            return Err(AvcError::InvalidArgument(format!(
                "CAVLC 块系数不足: {} < {}",
                coeffs.len(),
                scan.len()
            )));
        }
        let skip = usize::from(ctx.dc_skip);
        let start_bits = bw.bits_written();

        // 从最高频向低频扫描, levels/runs 按高频到低频排列
        let mut levels = [0i32; 16];
        let mut runs = [0u8; 16];
        let mut total_coeffs = 0usize;
        let mut trailing_ones = 0usize;
        let mut trailing_done = false;
        let mut total_zeros = 0u8;
        for pos in (skip..scan.len()).rev() {
            let value = coeffs[scan[pos]];
            if value != 0 {
                if !trailing_done && trailing_ones < 3 && value.abs() == 1 {
                    trailing_ones += 1;
                } else {
                    trailing_done = true;
                }
                levels[total_coeffs] = value;
                total_coeffs += 1;
            } else if total_coeffs > 0 {
                runs[total_coeffs - 1] += 1;
                total_zeros += 1;
            }
        }

        encode_coeff_token(bw, total_coeffs as u8, trailing_ones as u8, ctx.nc)?;

        if total_coeffs > 0 {
            for &level in &levels[..trailing_ones] {
                bw.write_bit(u32::from(level < 0))?;
            }

            let mut suffix_length = u32::from(total_coeffs > 10 && trailing_ones < 3);
            for (i, &level) in levels
                .iter()
                .enumerate()
                .take(total_coeffs)
                .skip(trailing_ones)
            {
                let mut level_code = if level > 0 {
                    2 * level - 2
                } else {
                    -2 * level - 1
                };
                if i == trailing_ones && trailing_ones < 3 {
                    level_code -= 2;
                }
                let (prefix, suffix, suffix_size) = split_level_code(level_code, suffix_length);
                encode_level_prefix(bw, prefix)?;
                bw.write_bits(suffix, suffix_size)?;
                suffix_length = next_suffix_length(suffix_length, level);
            }

            if total_coeffs < self.coded_range(ctx) {
                encode_total_zeros(
                    bw,
                    self.mode.total_zeros_table(),
                    total_zeros,
                    total_coeffs as u8,
                )?;
                let mut zeros_left = total_zeros;
                for &run in &runs[..total_coeffs - 1] {
                    if zeros_left == 0 {
                        break;
                    }
                    encode_run_before(bw, run, zeros_left)?;
                    zeros_left -= run;
                }
            }
        }

        let bits = (bw.bits_written() - start_bits) as u32;
        trace!(
            "CAVLC 编码: TotalCoeff={}, TrailingOnes={}, nC={}, bits={}",
            total_coeffs, trailing_ones, ctx.nc, bits
        );
        Ok(BlockCoding {
            bits,
            total_coeffs: total_coeffs as u8,
        })
    }

    /// 解码一个块, 按自然光栅顺序写回系数 (先清零)
    pub fn decode(
        &self,
        br: &mut BitReader,
        coeffs: &mut [i32],
        ctx: CavlcContext,
    ) -> AvcResult<BlockCoding> {
        let scan = self.mode.scan();
        if coeffs.len() < scan.len() {
            return Err(AvcError::InvalidArgument(format!(
                "CAVLC 块系数不足: {} < {}",
                coeffs.len(),
                scan.len()
            )));
        }
        let skip = usize::from(ctx.dc_skip);
        let coded_range = self.coded_range(ctx);
        let start_bits = br.position();
        coeffs[..scan.len()].fill(0);

        let (total_coeffs, trailing_ones) = decode_coeff_token(br, ctx.nc)?;
        let total_coeffs = usize::from(total_coeffs);
        let trailing_ones = usize::from(trailing_ones);
        if total_coeffs > coded_range {
            return Err(AvcError::Codec(format!(
                "CAVLC TotalCoeff={} 超过块容量 {}",
                total_coeffs, coded_range
            )));
        }

        if total_coeffs > 0 {
            let mut levels = [0i32; 16];
            for level in levels.iter_mut().take(trailing_ones) {
                *level = if br.read_bit()? == 1 { -1 } else { 1 };
            }

            let mut suffix_length = u32::from(total_coeffs > 10 && trailing_ones < 3);
            for i in trailing_ones..total_coeffs {
                let prefix = decode_level_prefix(br)?;
                let suffix_size = if prefix >= 15 {
                    prefix - 3
                } else if prefix == 14 && suffix_length == 0 {
                    4
                } else {
                    suffix_length
                };
                let suffix = br.read_bits(suffix_size)?;

                let mut level_code = (i64::from(prefix.min(15)) << suffix_length) + i64::from(suffix);
                if prefix >= 15 && suffix_length == 0 {
                    level_code += 15;
                }
                if prefix >= 16 {
                    level_code += (1i64 << (prefix - 3)) - 4096;
                }
                if i == trailing_ones && trailing_ones < 3 {
                    level_code += 2;
                }
                let level = if level_code & 1 == 0 {
                    (level_code + 2) >> 1
                } else {
                    (-level_code - 1) >> 1
                };
                let level = i32::try_from(level)
                    .map_err(|_| AvcError::Codec(format!("CAVLC 幅值溢出: {}", level)))?;
                levels[i] = level;
                suffix_length = next_suffix_length(suffix_length, level);
            }

            let total_zeros = if total_coeffs < coded_range {
                usize::from(decode_total_zeros(
                    br,
                    self.mode.total_zeros_table(),
                    total_coeffs as u8,
                )?)
            } else {
                0
            };
            if total_zeros + total_coeffs > coded_range {
                return Err(AvcError::Codec(format!(
                    "CAVLC TotalZeros={} 与 TotalCoeff={} 超过块容量 {}",
                    total_zeros, total_coeffs, coded_range
                )));
            }

            let mut runs = [0usize; 16];
            let mut zeros_left = total_zeros;
            for run in runs.iter_mut().take(total_coeffs - 1) {
                if zeros_left == 0 {
                    break;
                }
                *run = usize::from(decode_run_before(br, zeros_left as u8)?);
                zeros_left -= *run;
            }
            runs[total_coeffs - 1] = zeros_left;

            // 从最低频的系数开始放置
            let mut coeff_num = 0usize;
            for i in (0..total_coeffs).rev() {
                coeff_num += runs[i];
                coeffs[scan[coeff_num + skip]] = levels[i];
                coeff_num += 1;
            }
        }

        let bits = (br.position() - start_bits) as u32;
        trace!(
            "CAVLC 解码: TotalCoeff={}, TrailingOnes={}, nC={}, bits={}",
            total_coeffs, trailing_ones, ctx.nc, bits
        );
        Ok(BlockCoding {
            bits,
            total_coeffs: total_coeffs as u8,
        })
    }
}
