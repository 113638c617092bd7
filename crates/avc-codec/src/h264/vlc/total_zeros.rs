//! total_zeros 码表 (H.264 表 9-7, 9-8, 9-9).
//!
//! 符号为 (TotalZeros, TotalCoeff), TotalCoeff 选择码表中的一行.

use avc_core::{AvcError, AvcResult, BitReader, BitWriter};

use super::{VlcCode, decode_symbol};

/// 4x4 块, 按 `[TotalCoeff - 1][TotalZeros]` 索引, 格式 (位数, 码字)
const TOTAL_ZEROS_4X4: [&[(u8, u8)]; 15] = [
    &[
        (1, 1), (3, 3), (3, 2), (4, 3), (4, 2), (5, 3), (5, 2), (6, 3),
        (6, 2), (7, 3), (7, 2), (8, 3), (8, 2), (9, 3), (9, 2), (9, 1),
    ],
    &[
        (3, 7), (3, 6), (3, 5), (3, 4), (3, 3), (4, 5), (4, 4), (4, 3),
        (4, 2), (5, 3), (5, 2), (6, 3), (6, 2), (6, 1), (6, 0),
    ],
    &[
        (4, 5), (3, 7), (3, 6), (3, 5), (4, 4), (4, 3), (3, 4), (3, 3),
        (4, 2), (5, 3), (5, 2), (6, 1), (5, 1), (6, 0),
    ],
    &[
        (5, 3), (3, 7), (4, 5), (4, 4), (3, 6), (3, 5), (3, 4), (4, 3),
        (3, 3), (4, 2), (5, 2), (5, 1), (5, 0),
    ],
    &[
        (4, 5), (4, 4), (4, 3), (3, 7), (3, 6), (3, 5), (3, 4), (3, 3),
        (4, 2), (5, 1), (4, 1), (5, 0),
    ],
    &[
        (6, 1), (5, 1), (3, 7), (3, 6), (3, 5), (3, 4), (3, 3), (3, 2),
        (4, 1), (3, 1), (6, 0),
    ],
    &[
        (6, 1), (5, 1), (3, 5), (3, 4), (3, 3), (2, 3), (3, 2), (4, 1),
        (3, 1), (6, 0),
    ],
    &[(6, 1), (4, 1), (5, 1), (3, 3), (2, 3), (2, 2), (3, 2), (3, 1), (6, 0)],
    &[(6, 1), (6, 0), (4, 1), (2, 3), (2, 2), (3, 1), (2, 1), (5, 1)],
    &[(5, 1), (5, 0), (3, 1), (2, 3), (2, 2), (2, 1), (4, 1)],
    &[(4, 0), (4, 1), (3, 1), (3, 2), (1, 1), (3, 3)],
    &[(4, 0), (4, 1), (2, 1), (1, 1), (3, 1)],
    &[(3, 0), (3, 1), (1, 1), (2, 1)],
    &[(2, 0), (2, 1), (1, 1)],
    &[(1, 0), (1, 1)],
];

/// 4:2:0 色度 DC 2x2 块
const TOTAL_ZEROS_2X2: [&[(u8, u8)]; 3] = [
    &[(1, 1), (2, 1), (3, 1), (3, 0)],
    &[(1, 1), (2, 1), (2, 0)],
    &[(1, 1), (1, 0)],
];

/// 4:2:2 色度 DC 2x4 块
const TOTAL_ZEROS_2X4: [&[(u8, u8)]; 7] = [
    &[(1, 1), (3, 2), (3, 3), (4, 2), (4, 3), (4, 1), (5, 1), (5, 0)],
    &[(3, 0), (2, 1), (3, 1), (3, 4), (3, 5), (3, 6), (3, 7)],
    &[(3, 0), (3, 1), (2, 1), (2, 2), (3, 6), (3, 7)],
    &[(3, 6), (2, 0), (2, 1), (2, 2), (3, 7)],
    &[(2, 0), (2, 1), (2, 2), (2, 3)],
    &[(2, 0), (2, 1), (1, 1)],
    &[(1, 0), (1, 1)],
];

/// total_zeros 码表选择
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TotalZerosTable {
    /// 16 系数块
    Block4x4,
    /// 4:2:0 色度 DC (4 系数)
    ChromaDc2x2,
    /// 4:2:2 色度 DC (8 系数)
    ChromaDc2x4,
}

impl TotalZerosTable {
    /// 块的系数个数
    pub fn max_coeffs(&self) -> u8 {
        match self {
            Self::Block4x4 => 16,
            Self::ChromaDc2x2 => 4,
            Self::ChromaDc2x4 => 8,
        }
    }

    fn row(&self, total_coeffs: u8) -> Option<&'static [(u8, u8)]> {
        if total_coeffs == 0 {
            return None;
        }
        let idx = usize::from(total_coeffs - 1);
        match self {
            Self::Block4x4 => TOTAL_ZEROS_4X4.get(idx).copied(),
            Self::ChromaDc2x2 => TOTAL_ZEROS_2X2.get(idx).copied(),
            Self::ChromaDc2x4 => TOTAL_ZEROS_2X4.get(idx).copied(),
        }
    }

    /// 查询码字, 非法组合返回 [`VlcCode::NONE`]
    pub fn code(&self, total_zeros: u8, total_coeffs: u8) -> VlcCode {
        self.row(total_coeffs)
            .and_then(|row| row.get(usize::from(total_zeros)))
            .map_or(VlcCode::NONE, |&(len, code)| {
                VlcCode::new(len, u32::from(code))
            })
    }
}

/// 编码 total_zeros, 返回写入的位数
pub fn encode_total_zeros(
    bw: &mut BitWriter,
    table: TotalZerosTable,
    total_zeros: u8,
    total_coeffs: u8,
) -> AvcResult<u32> {
    let vlc = table.code(total_zeros, total_coeffs);
    if !vlc.is_valid() {
        return Err(AvcError::VlcTableMiss(format!(
            "total_zeros 不支持: TotalZeros={}, TotalCoeff={}, {:?}",
            total_zeros, total_coeffs, table
        )));
    }
    vlc.write(bw)
}

/// 解码 total_zeros
pub fn decode_total_zeros(
    br: &mut BitReader,
    table: TotalZerosTable,
    total_coeffs: u8,
) -> AvcResult<u8> {
    let row = table.row(total_coeffs).ok_or_else(|| {
        AvcError::VlcTableMiss(format!(
            "total_zeros 无对应码表: TotalCoeff={}, {:?}",
            total_coeffs, table
        ))
    })?;
    let candidates = row
        .iter()
        .enumerate()
        .map(|(tz, &(len, code))| (VlcCode::new(len, u32::from(code)), tz as u8));
    decode_symbol(br, candidates, "total_zeros")
}
