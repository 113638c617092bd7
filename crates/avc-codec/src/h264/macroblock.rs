//! H.264 宏块 (4:2:0).
//!
//! 每个宏块按编码顺序持有 27 个系数块:
//! - 0: 亮度 DC (4x4, 仅 Intra_16x16)
//! - 1..=16: 亮度 4x4 块, 按 8x8 象限依次排列
//! - 17, 18: Cb / Cr DC (2x2)
//! - 19..=22: Cb 4x4 块, 23..=26: Cr 4x4 块
//!
//! 邻块关系统一由 [`MacroblockGrid`](super::grid::MacroblockGrid) 建立.

use avc_core::{AvcError, AvcResult};

use super::block::{Block, Colour};

/// 每个宏块的块数
pub const NUM_BLOCKS: usize = 27;
/// 亮度 DC 块
pub const LUMA_DC: usize = 0;
/// 第一个亮度 4x4 块
pub const LUMA_FIRST: usize = 1;
/// 最后一个亮度 4x4 块
pub const LUMA_LAST: usize = 16;
/// Cb DC 块
pub const CB_DC: usize = 17;
/// Cr DC 块
pub const CR_DC: usize = 18;
/// 第一个 Cb 4x4 块
pub const CB_FIRST: usize = 19;
/// 第一个 Cr 4x4 块
pub const CR_FIRST: usize = 23;
/// 最后一个块
pub const LAST_BLOCK: usize = 26;

/// 色度 DC 块的 nC: 4:2:0 固定使用 nC = -1 码表
pub const CHROMA_DC_NC: i32 = -1;

/// Intra_16x16 mb_type 中的 (预测模式, 色度 cbp, 亮度 cbp), 按 mb_type - 1 索引
const INTRA_16X16_TYPES: [(u8, u8, u8); 24] = [
    (0, 0, 0),
    (1, 0, 0),
    (2, 0, 0),
    (3, 0, 0),
    (0, 1, 0),
    (1, 1, 0),
    (2, 1, 0),
    (3, 1, 0),
    (0, 2, 0),
    (1, 2, 0),
    (2, 2, 0),
    (3, 2, 0),
    (0, 0, 15),
    (1, 0, 15),
    (2, 0, 15),
    (3, 0, 15),
    (0, 1, 15),
    (1, 1, 15),
    (2, 1, 15),
    (3, 1, 15),
    (0, 2, 15),
    (1, 2, 15),
    (2, 2, 15),
    (3, 2, 15),
];

/// P 条带中帧内 mb_type 的偏移
const P_SLICE_INTRA_OFFSET: u32 = 5;

/// 条带类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SliceType {
    /// 只含帧内宏块
    I,
    /// 允许帧间宏块
    P,
}

/// 宏块分区预测模式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MbPartPredMode {
    /// P_L0_16x16, 单个 16x16 分区
    Inter16x16,
    /// P_L0_L0_16x8
    Inter16x8,
    /// P_L0_L0_8x16
    Inter8x16,
    /// P_8x8, 带子宏块类型
    Inter8x8,
    /// P_8x8ref0, 全部参考索引为 0
    Inter8x8Ref0,
    /// I_NxN, 4x4 亮度预测
    Intra4x4,
    /// I_NxN 且启用 8x8 变换
    Intra8x8,
    /// Intra_16x16
    Intra16x16,
}

impl MbPartPredMode {
    /// P 条带帧间 mb_type 0..=4 对应的模式
    fn from_inter_type(mb_type: u32) -> Option<Self> {
        match mb_type {
            0 => Some(Self::Inter16x16),
            1 => Some(Self::Inter16x8),
            2 => Some(Self::Inter8x16),
            3 => Some(Self::Inter8x8),
            4 => Some(Self::Inter8x8Ref0),
            _ => None,
        }
    }

    /// 帧间模式对应的 mb_type
    fn inter_type(self) -> Option<u32> {
        match self {
            Self::Inter16x16 => Some(0),
            Self::Inter16x8 => Some(1),
            Self::Inter8x16 => Some(2),
            Self::Inter8x8 => Some(3),
            Self::Inter8x8Ref0 => Some(4),
            _ => None,
        }
    }

    pub fn is_intra(self) -> bool {
        matches!(self, Self::Intra4x4 | Self::Intra8x8 | Self::Intra16x16)
    }
}

/// 运动矢量 (1/4 像素单位)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MotionVector {
    pub x: i32,
    pub y: i32,
}

impl MotionVector {
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

/// 亮度块光栅位置 (行, 列) 到编码顺序索引
pub fn luma_index(row: usize, col: usize) -> usize {
    let quadrant = (row / 2) * 2 + col / 2;
    let sub = (row % 2) * 2 + col % 2;
    LUMA_FIRST + quadrant * 4 + sub
}

/// 色度块光栅位置 (行, 列) 到编码顺序索引
pub fn chroma_index(colour: Colour, row: usize, col: usize) -> usize {
    let first = if colour == Colour::Cr { CR_FIRST } else { CB_FIRST };
    first + row * 2 + col
}

/// 编码顺序索引到 (颜色, 行, 列), DC 块返回 `None`
pub fn block_position(index: usize) -> Option<(Colour, usize, usize)> {
    match index {
        LUMA_FIRST..=LUMA_LAST => {
            let k = index - LUMA_FIRST;
            let (quadrant, sub) = (k / 4, k % 4);
            Some((
                Colour::Luma,
                (quadrant / 2) * 2 + sub / 2,
                (quadrant % 2) * 2 + sub % 2,
            ))
        }
        CB_FIRST..=LAST_BLOCK => {
            let (colour, k) = if index >= CR_FIRST {
                (Colour::Cr, index - CR_FIRST)
            } else {
                (Colour::Cb, index - CB_FIRST)
            };
            Some((colour, k / 2, k % 2))
        }
        _ => None,
    }
}

/// 宏块
#[derive(Debug, Clone)]
pub struct Macroblock {
    /// 网格中的光栅索引
    pub index: usize,
    /// 所属条带
    pub slice: usize,
    /// 亮度左上角像素坐标 (x, y)
    pub luma_offset: (usize, usize),
    /// 色度左上角像素坐标 (x, y)
    pub chroma_offset: (usize, usize),

    /// 邻居宏块 (mbAddrA / B / C / D), 不可用时为 `None`
    pub left: Option<usize>,
    pub above: Option<usize>,
    pub above_right: Option<usize>,
    pub above_left: Option<usize>,

    /// 宏块 QP
    pub qp: u8,
    /// mb_qp_delta
    pub qp_delta: i32,

    pub intra: bool,
    pub part_pred_mode: MbPartPredMode,
    /// Intra_16x16 预测模式 (0..=3)
    pub intra16x16_pred_mode: u8,
    /// 帧内色度预测模式 (0..=3)
    pub intra_chroma_pred_mode: u8,

    pub cbp_luma: u8,
    pub cbp_chroma: u8,
    /// 合并后的 coded_block_pattern: 亮度 | (色度 << 4)
    pub coded_block_pattern: u8,
    pub mb_type: u32,

    /// 16x16 分区运动矢量
    pub mv: MotionVector,
    /// 运动矢量差
    pub mvd: MotionVector,

    blocks: [Block; NUM_BLOCKS],
}

impl Macroblock {
    /// 创建宏块, 块的尺寸、颜色与块内偏移按编码顺序初始化
    pub fn new(index: usize) -> Self {
        let blocks = std::array::from_fn(|i| {
            let mut blk = match i {
                LUMA_DC => Block::new(4, 4, Colour::Luma, true),
                CB_DC => Block::new(2, 2, Colour::Cb, true),
                CR_DC => Block::new(2, 2, Colour::Cr, true),
                _ => match block_position(i) {
                    Some((colour, _, _)) => Block::new(4, 4, colour, false),
                    None => Block::new(4, 4, Colour::Luma, false),
                },
            };
            if let Some((_, row, col)) = block_position(i) {
                blk.set_offset(col * 4, row * 4);
            }
            blk
        });

        Self {
            index,
            slice: 0,
            luma_offset: (0, 0),
            chroma_offset: (0, 0),
            left: None,
            above: None,
            above_right: None,
            above_left: None,
            qp: 1,
            qp_delta: 0,
            intra: true,
            part_pred_mode: MbPartPredMode::Intra16x16,
            intra16x16_pred_mode: 2,
            intra_chroma_pred_mode: 0,
            cbp_luma: 0,
            cbp_chroma: 0,
            coded_block_pattern: 0,
            mb_type: 1,
            mv: MotionVector::default(),
            mvd: MotionVector::default(),
            blocks,
        }
    }

    /// 复位逐帧状态, 位置与邻居关系保持不变
    pub fn reset(&mut self) {
        self.qp = 1;
        self.qp_delta = 0;
        self.intra = true;
        self.part_pred_mode = MbPartPredMode::Intra16x16;
        self.intra16x16_pred_mode = 2;
        self.intra_chroma_pred_mode = 0;
        self.cbp_luma = 0;
        self.cbp_chroma = 0;
        self.coded_block_pattern = 0;
        self.mb_type = 1;
        self.mv = MotionVector::default();
        self.mvd = MotionVector::default();
        for blk in self.blocks.iter_mut() {
            blk.clear();
        }
    }

    pub fn block(&self, index: usize) -> &Block {
        &self.blocks[index]
    }

    pub fn block_mut(&mut self, index: usize) -> &mut Block {
        &mut self.blocks[index]
    }

    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    pub fn is_intra16x16(&self) -> bool {
        self.intra && self.part_pred_mode == MbPartPredMode::Intra16x16
    }

    /// 块编码时位置 0 是否由独立 DC 块承载
    pub fn dc_skip(&self, index: usize) -> bool {
        match index {
            LUMA_FIRST..=LUMA_LAST => self.is_intra16x16(),
            CB_FIRST..=LAST_BLOCK => true,
            _ => false,
        }
    }

    // ============================================================
    // coded_block_pattern
    // ============================================================

    /// 由量化后的系数计算 coded_block_pattern, 并同步各块的已编码标志
    pub fn set_coded_block_pattern(&mut self) {
        let intra16 = self.is_intra16x16();
        self.blocks[LUMA_DC].set_coded(intra16);

        self.cbp_luma = 0;
        if intra16 {
            // 任一 AC 块非零则全部 16 个块都编码
            let any = self.blocks[LUMA_FIRST..=LUMA_LAST].iter().any(|b| !b.is_zero());
            for blk in &mut self.blocks[LUMA_FIRST..=LUMA_LAST] {
                blk.set_coded(any);
            }
            if any {
                self.cbp_luma = 15;
            }
        } else {
            for (k, blk) in self.blocks[LUMA_FIRST..=LUMA_LAST].iter().enumerate() {
                if !blk.is_zero() {
                    self.cbp_luma |= 1 << (k / 4);
                }
            }
            let cbp_luma = self.cbp_luma;
            for (k, blk) in self.blocks[LUMA_FIRST..=LUMA_LAST].iter_mut().enumerate() {
                blk.set_coded(cbp_luma & (1 << (k / 4)) != 0);
            }
        }

        let any_ac = self.blocks[CB_FIRST..=LAST_BLOCK].iter().any(|b| !b.is_zero());
        let any_dc = !self.blocks[CB_DC].is_zero() || !self.blocks[CR_DC].is_zero();
        self.cbp_chroma = if any_ac {
            2
        } else if any_dc {
            1
        } else {
            0
        };
        self.sync_chroma_coded();

        self.coded_block_pattern = self.cbp_luma | (self.cbp_chroma << 4);
    }

    /// 从解码得到的 coded_block_pattern 拆出亮度/色度部分, 并同步各块的已编码标志
    pub fn apply_coded_block_pattern(&mut self) {
        self.cbp_luma = self.coded_block_pattern & 0x0F;
        self.cbp_chroma = (self.coded_block_pattern >> 4) & 0x03;

        self.blocks[LUMA_DC].set_coded(true);
        let cbp_luma = self.cbp_luma;
        for (k, blk) in self.blocks[LUMA_FIRST..=LUMA_LAST].iter_mut().enumerate() {
            blk.set_coded(cbp_luma & (1 << (k / 4)) != 0);
        }
        self.sync_chroma_coded();
    }

    fn sync_chroma_coded(&mut self) {
        let dc_coded = self.cbp_chroma != 0;
        let ac_coded = self.cbp_chroma == 2;
        self.blocks[CB_DC].set_coded(dc_coded);
        self.blocks[CR_DC].set_coded(dc_coded);
        for blk in &mut self.blocks[CB_FIRST..=LAST_BLOCK] {
            blk.set_coded(ac_coded);
        }
    }

    // ============================================================
    // mb_type
    // ============================================================

    /// 由预测模式与 coded_block_pattern 组合出 mb_type
    pub fn set_type(&mut self, slice_type: SliceType) {
        let mut mb_type = 0u32;
        if self.is_intra16x16() {
            mb_type = 1;
            if self.cbp_luma != 0 {
                mb_type += 12;
            }
            mb_type += 4 * u32::from(self.cbp_chroma) + u32::from(self.intra16x16_pred_mode);
        }

        if slice_type == SliceType::P {
            if self.intra {
                mb_type += P_SLICE_INTRA_OFFSET;
            } else {
                mb_type = self.part_pred_mode.inter_type().unwrap_or(0);
            }
        }
        self.mb_type = mb_type;
    }

    /// 从 mb_type 还原帧内/帧间标志与预测模式.
    ///
    /// Intra_16x16 时同时还原预测模式与 coded_block_pattern,
    /// 之后应调用 [`Self::apply_coded_block_pattern`].
    pub fn unpack_mb_type(&mut self, slice_type: SliceType) -> AvcResult<()> {
        let mut mb_type = self.mb_type;
        self.intra = match slice_type {
            SliceType::I => true,
            SliceType::P if mb_type >= P_SLICE_INTRA_OFFSET => {
                mb_type -= P_SLICE_INTRA_OFFSET;
                true
            }
            SliceType::P => false,
        };

        if !self.intra {
            self.part_pred_mode = MbPartPredMode::from_inter_type(mb_type).ok_or_else(|| {
                AvcError::InvalidData(format!("P 条带帧间 mb_type {} 无效", mb_type))
            })?;
            return Ok(());
        }

        if mb_type == 0 {
            self.part_pred_mode = MbPartPredMode::Intra4x4;
            return Ok(());
        }
        let &(pred_mode, cbp_chroma, cbp_luma) = INTRA_16X16_TYPES
            .get(mb_type as usize - 1)
            .ok_or_else(|| AvcError::InvalidData(format!("帧内 mb_type {} 不支持", mb_type)))?;
        self.part_pred_mode = MbPartPredMode::Intra16x16;
        self.intra16x16_pred_mode = pred_mode;
        self.coded_block_pattern = cbp_luma | (cbp_chroma << 4);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_block_layout() {
        let mb = Macroblock::new(0);
        assert_eq!(mb.blocks().len(), NUM_BLOCKS);
        assert!(mb.block(LUMA_DC).is_dc());
        assert_eq!(mb.block(CB_DC).len(), 4);
        assert_eq!(mb.block(CR_DC).colour(), Colour::Cr);
        assert_eq!(mb.block(CB_FIRST + 3).colour(), Colour::Cb);
        assert_eq!(mb.block(CR_FIRST).colour(), Colour::Cr);
        // 第 2 象限第 1 个块位于 (2, 0)
        assert_eq!(mb.block(LUMA_FIRST + 8).offset(), (0, 8));
        assert_eq!(mb.block(LUMA_FIRST + 3).offset(), (4, 4));
    }

    #[test]
    fn test_index_mapping_is_bijective() {
        for row in 0..4 {
            for col in 0..4 {
                let idx = luma_index(row, col);
                assert_eq!(block_position(idx), Some((Colour::Luma, row, col)));
            }
        }
        for colour in [Colour::Cb, Colour::Cr] {
            for row in 0..2 {
                for col in 0..2 {
                    let idx = chroma_index(colour, row, col);
                    assert_eq!(block_position(idx), Some((colour, row, col)));
                }
            }
        }
        assert_eq!(block_position(LUMA_DC), None);
        assert_eq!(block_position(CB_DC), None);
        assert_eq!(luma_index(0, 2), 5);
        assert_eq!(luma_index(1, 1), 4);
    }

    #[test]
    fn test_cbp_inter_marks_quadrants() {
        let mut mb = Macroblock::new(0);
        mb.intra = false;
        mb.part_pred_mode = MbPartPredMode::Inter16x16;
        mb.block_mut(luma_index(3, 3)).set_dc(1);
        mb.set_coded_block_pattern();
        assert_eq!(mb.cbp_luma, 0b1000);
        assert_eq!(mb.cbp_chroma, 0);
        assert!(mb.block(luma_index(2, 2)).is_coded());
        assert!(!mb.block(luma_index(0, 0)).is_coded());
        assert!(!mb.block(LUMA_DC).is_coded());
    }

    #[test]
    fn test_cbp_intra16x16_all_or_nothing() {
        let mut mb = Macroblock::new(0);
        mb.set_coded_block_pattern();
        assert_eq!(mb.coded_block_pattern, 0);
        assert!(mb.block(LUMA_DC).is_coded());

        mb.block_mut(luma_index(1, 2)).coeffs_mut()[5] = -2;
        mb.block_mut(CR_DC).set_dc(3);
        mb.set_coded_block_pattern();
        assert_eq!(mb.cbp_luma, 15);
        assert_eq!(mb.cbp_chroma, 1);
        assert_eq!(mb.coded_block_pattern, 0x1F);
        assert!(mb.block(luma_index(0, 0)).is_coded());
        assert!(mb.block(CB_DC).is_coded());
        assert!(!mb.block(CB_FIRST).is_coded());

        mb.block_mut(CB_FIRST + 2).coeffs_mut()[9] = 1;
        mb.set_coded_block_pattern();
        assert_eq!(mb.cbp_chroma, 2);
        assert!(mb.block(CR_FIRST + 1).is_coded());
    }

    #[test]
    fn test_apply_cbp_matches_set_cbp() {
        let mut src = Macroblock::new(0);
        src.intra = false;
        src.part_pred_mode = MbPartPredMode::Inter16x16;
        src.block_mut(luma_index(0, 3)).set_dc(4);
        src.block_mut(CB_FIRST).set_dc(-1);
        src.set_coded_block_pattern();

        let mut dst = Macroblock::new(0);
        dst.coded_block_pattern = src.coded_block_pattern;
        dst.apply_coded_block_pattern();
        for i in LUMA_FIRST..=LAST_BLOCK {
            assert_eq!(dst.block(i).is_coded(), src.block(i).is_coded(), "block {}", i);
        }
    }

    #[test]
    fn test_mb_type_packing_inverse() {
        for slice_type in [SliceType::I, SliceType::P] {
            for pred in 0..4u8 {
                for cbp_chroma in 0..3u8 {
                    for cbp_luma in [0u8, 15] {
                        let mut mb = Macroblock::new(0);
                        mb.intra16x16_pred_mode = pred;
                        mb.cbp_luma = cbp_luma;
                        mb.cbp_chroma = cbp_chroma;
                        mb.set_type(slice_type);

                        let mut out = Macroblock::new(0);
                        out.intra = false;
                        out.mb_type = mb.mb_type;
                        out.unpack_mb_type(slice_type).unwrap();
                        out.apply_coded_block_pattern();
                        assert!(out.intra);
                        assert_eq!(out.part_pred_mode, MbPartPredMode::Intra16x16);
                        assert_eq!(out.intra16x16_pred_mode, pred);
                        assert_eq!(out.cbp_luma, cbp_luma);
                        assert_eq!(out.cbp_chroma, cbp_chroma);
                    }
                }
            }
        }

        let mut mb = Macroblock::new(0);
        mb.intra = false;
        mb.part_pred_mode = MbPartPredMode::Inter16x16;
        mb.set_type(SliceType::P);
        assert_eq!(mb.mb_type, 0);
        let mut out = Macroblock::new(0);
        out.mb_type = 0;
        out.unpack_mb_type(SliceType::P).unwrap();
        assert!(!out.intra);
        assert_eq!(out.part_pred_mode, MbPartPredMode::Inter16x16);
    }

    #[test]
    fn test_unpack_rejects_unsupported_types() {
        let mut mb = Macroblock::new(0);
        mb.mb_type = 25;
        assert!(mb.unpack_mb_type(SliceType::I).is_err());
        mb.mb_type = 0;
        mb.unpack_mb_type(SliceType::I).unwrap();
        assert_eq!(mb.part_pred_mode, MbPartPredMode::Intra4x4);
    }

    #[test]
    fn test_reset_clears_state() {
        let mut mb = Macroblock::new(4);
        mb.qp = 30;
        mb.mv = MotionVector::new(3, -4);
        mb.block_mut(CB_FIRST).set_dc(9);
        mb.left = Some(3);
        mb.reset();
        assert_eq!(mb.qp, 1);
        assert_eq!(mb.mv, MotionVector::default());
        assert!(mb.block(CB_FIRST).is_zero());
        assert_eq!(mb.left, Some(3));
        assert_eq!(mb.index, 4);
    }
}
