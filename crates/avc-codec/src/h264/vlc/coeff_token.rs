//! coeff_token 码表 (H.264 表 9-5).
//!
//! 符号为 (TotalCoeff, TrailingOnes), 由邻块系数个数 nC 选择码表:
//! 0..=1, 2..=3, 4..=7, >= 8 (6 位定长), 以及色度 DC 专用的 -1 (4:2:0) 和 -2 (4:2:2).

use avc_core::{AvcError, AvcResult, BitReader, BitWriter};

use super::{VlcCode, decode_symbol};

/// 表项格式: (位数, 码字), 按 `[TrailingOnes][TotalCoeff]` 索引, 位数 0 为非法组合
type TokenRow<const N: usize> = [(u8, u16); N];

const NC_0_TO_1: [TokenRow<17>; 4] = [
    [
        (1, 1), (6, 5), (8, 7), (9, 7), (10, 7), (11, 7), (13, 15), (13, 11), (13, 8),
        (14, 15), (14, 11), (15, 15), (15, 11), (16, 15), (16, 11), (16, 7), (16, 4),
    ],
    [
        (0, 0), (2, 1), (6, 4), (8, 6), (9, 6), (10, 6), (11, 6), (13, 14), (13, 10),
        (14, 14), (14, 10), (15, 14), (15, 10), (15, 1), (16, 14), (16, 10), (16, 6),
    ],
    [
        (0, 0), (0, 0), (3, 1), (7, 5), (8, 5), (9, 5), (10, 5), (11, 5), (13, 13),
        (13, 9), (14, 13), (14, 9), (15, 13), (15, 9), (16, 13), (16, 9), (16, 5),
    ],
    [
        (0, 0), (0, 0), (0, 0), (5, 3), (6, 3), (7, 4), (8, 4), (9, 4), (10, 4),
        (11, 4), (13, 12), (14, 12), (14, 8), (15, 12), (15, 8), (16, 12), (16, 8),
    ],
];

const NC_2_TO_3: [TokenRow<17>; 4] = [
    [
        (2, 3), (6, 11), (6, 7), (7, 7), (8, 7), (8, 4), (9, 7), (11, 15), (11, 11),
        (12, 15), (12, 11), (12, 8), (13, 15), (13, 11), (13, 7), (14, 9), (14, 7),
    ],
    [
        (0, 0), (2, 2), (5, 7), (6, 10), (6, 6), (7, 6), (8, 6), (9, 6), (11, 14),
        (11, 10), (12, 14), (12, 10), (13, 14), (13, 10), (14, 11), (14, 8), (14, 6),
    ],
    [
        (0, 0), (0, 0), (3, 3), (6, 9), (6, 5), (7, 5), (8, 5), (9, 5), (11, 13),
        (11, 9), (12, 13), (12, 9), (13, 13), (13, 9), (13, 6), (14, 10), (14, 5),
    ],
    [
        (0, 0), (0, 0), (0, 0), (4, 5), (4, 4), (5, 6), (6, 8), (6, 4), (7, 4),
        (9, 4), (11, 12), (11, 8), (12, 12), (13, 12), (13, 8), (13, 1), (14, 4),
    ],
];

const NC_4_TO_7: [TokenRow<17>; 4] = [
    [
        (4, 15), (6, 15), (6, 11), (6, 8), (7, 15), (7, 11), (7, 9), (7, 8), (8, 15),
        (8, 11), (9, 15), (9, 11), (9, 8), (10, 13), (10, 9), (10, 5), (10, 1),
    ],
    [
        (0, 0), (4, 14), (5, 15), (5, 12), (5, 10), (5, 8), (6, 14), (6, 10), (7, 14),
        (8, 14), (8, 10), (9, 14), (9, 10), (9, 7), (10, 12), (10, 8), (10, 4),
    ],
    [
        (0, 0), (0, 0), (4, 13), (5, 14), (5, 11), (5, 9), (6, 13), (6, 9), (7, 13),
        (7, 10), (8, 13), (8, 9), (9, 13), (9, 9), (10, 11), (10, 7), (10, 3),
    ],
    [
        (0, 0), (0, 0), (0, 0), (4, 12), (4, 11), (4, 10), (4, 9), (4, 8), (5, 13),
        (6, 12), (7, 12), (8, 12), (8, 8), (9, 12), (10, 10), (10, 6), (10, 2),
    ],
];

const CHROMA_DC_420: [TokenRow<5>; 4] = [
    [(2, 1), (6, 7), (6, 4), (6, 3), (6, 2)],
    [(0, 0), (1, 1), (6, 6), (7, 3), (8, 3)],
    [(0, 0), (0, 0), (3, 1), (7, 2), (8, 2)],
    [(0, 0), (0, 0), (0, 0), (6, 5), (7, 0)],
];

const CHROMA_DC_422: [TokenRow<9>; 4] = [
    [(1, 1), (7, 15), (7, 14), (9, 7), (9, 6), (10, 7), (11, 7), (12, 7), (13, 7)],
    [(0, 0), (2, 1), (7, 13), (7, 12), (9, 5), (10, 6), (11, 6), (12, 6), (12, 5)],
    [(0, 0), (0, 0), (3, 1), (7, 11), (7, 10), (9, 4), (10, 5), (11, 5), (12, 4)],
    [(0, 0), (0, 0), (0, 0), (5, 1), (6, 1), (7, 9), (7, 8), (10, 4), (11, 4)],
];

/// coeff_token 码表选择
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoeffTokenTable {
    /// 0 <= nC < 2
    Nc0To1,
    /// 2 <= nC < 4
    Nc2To3,
    /// 4 <= nC < 8
    Nc4To7,
    /// nC >= 8, 6 位定长码
    Nc8Up,
    /// nC == -1, 4:2:0 色度 DC
    ChromaDc420,
    /// nC == -2, 4:2:2 色度 DC
    ChromaDc422,
}

impl CoeffTokenTable {
    /// 由 nC 选择码表, -1 与 -2 是色度 DC 的固定协议常量
    pub fn from_nc(nc: i32) -> AvcResult<Self> {
        match nc {
            -2 => Ok(Self::ChromaDc422),
            -1 => Ok(Self::ChromaDc420),
            0..=1 => Ok(Self::Nc0To1),
            2..=3 => Ok(Self::Nc2To3),
            4..=7 => Ok(Self::Nc4To7),
            n if n >= 8 => Ok(Self::Nc8Up),
            _ => Err(AvcError::InvalidArgument(format!("无效的 nC: {}", nc))),
        }
    }

    /// 该码表允许的最大 TotalCoeff
    pub fn max_total_coeffs(&self) -> u8 {
        match self {
            Self::ChromaDc420 => 4,
            Self::ChromaDc422 => 8,
            _ => 16,
        }
    }

    /// 查询码字, 非法组合返回 [`VlcCode::NONE`]
    pub fn code(&self, total_coeffs: u8, trailing_ones: u8) -> VlcCode {
        if trailing_ones > 3
            || trailing_ones > total_coeffs
            || total_coeffs > self.max_total_coeffs()
        {
            return VlcCode::NONE;
        }
        let (t1, tc) = (usize::from(trailing_ones), usize::from(total_coeffs));
        let (len, code) = match self {
            Self::Nc0To1 => NC_0_TO_1[t1][tc],
            Self::Nc2To3 => NC_2_TO_3[t1][tc],
            Self::Nc4To7 => NC_4_TO_7[t1][tc],
            Self::ChromaDc420 => CHROMA_DC_420[t1][tc],
            Self::ChromaDc422 => CHROMA_DC_422[t1][tc],
            Self::Nc8Up => {
                if total_coeffs == 0 {
                    (6, 3)
                } else {
                    (6, (((total_coeffs - 1) as u16) << 2) | u16::from(trailing_ones))
                }
            }
        };
        VlcCode::new(len, u32::from(code))
    }

    fn candidates(self) -> impl Iterator<Item = (VlcCode, (u8, u8))> {
        let max = self.max_total_coeffs();
        (0..=3u8).flat_map(move |t1| {
            (t1..=max).map(move |tc| (self.code(tc, t1), (tc, t1)))
        })
    }
}

/// 编码 coeff_token, 返回写入的位数
pub fn encode_coeff_token(
    bw: &mut BitWriter,
    total_coeffs: u8,
    trailing_ones: u8,
    nc: i32,
) -> AvcResult<u32> {
    let vlc = CoeffTokenTable::from_nc(nc)?.code(total_coeffs, trailing_ones);
    if !vlc.is_valid() {
        return Err(AvcError::VlcTableMiss(format!(
            "coeff_token 不支持: TotalCoeff={}, TrailingOnes={}, nC={}",
            total_coeffs, trailing_ones, nc
        )));
    }
    vlc.write(bw)
}

/// 解码 coeff_token, 返回 (TotalCoeff, TrailingOnes)
pub fn decode_coeff_token(br: &mut BitReader, nc: i32) -> AvcResult<(u8, u8)> {
    let table = CoeffTokenTable::from_nc(nc)?;
    decode_symbol(br, table.candidates(), "coeff_token")
}
