//! 宏块层语法的编码与解码 (H.264 7.3.5 的子集).
//!
//! 每个宏块依次写出:
//! 1. `ue(mb_type)`
//! 2. 帧间: `se(mvd_x) se(mvd_y)`; 帧内: `ue(intra_chroma_pred_mode)`
//! 3. 非 Intra_16x16 时 `me(coded_block_pattern)`
//! 4. `se(mb_qp_delta)`
//! 5. 按编码顺序写出已编码的残差块
//!
//! 只支持 Intra_16x16 与 Inter 16x16 两种宏块.

use log::{debug, warn};

use avc_core::{AvcError, AvcResult, BitReader, BitWriter};

use super::cavlc::{Cavlc, CavlcContext, CavlcMode};
use super::exp_golomb::{read_se, read_ue, write_se, write_ue};
use super::grid::{MacroblockGrid, describe_block};
use super::macroblock::{
    CB_DC, CR_DC, LAST_BLOCK, LUMA_DC, LUMA_FIRST, MbPartPredMode, MotionVector, SliceType,
};
use super::transform::QP_MAX;
use super::vlc::{decode_cbp, encode_cbp};

/// 帧内色度预测模式取值上限
const MAX_CHROMA_PRED_MODE: u32 = 3;

/// 宏块层编解码器.
///
/// 持有 4x4 与色度 DC 两个 CAVLC 实例, 逐块的 nC 与 DC 跳过标志每次调用时重新推导.
#[derive(Debug, Clone, Copy)]
pub struct MacroblockLayer {
    cavlc_4x4: Cavlc,
    cavlc_chroma_dc: Cavlc,
}

impl Default for MacroblockLayer {
    fn default() -> Self {
        Self::new()
    }
}

impl MacroblockLayer {
    pub fn new() -> Self {
        Self {
            cavlc_4x4: Cavlc::new(CavlcMode::Block4x4),
            cavlc_chroma_dc: Cavlc::new(CavlcMode::ChromaDc2x2),
        }
    }

    fn cavlc_for(&self, block: usize) -> &Cavlc {
        if block == CB_DC || block == CR_DC {
            &self.cavlc_chroma_dc
        } else {
            &self.cavlc_4x4
        }
    }

    fn context(grid: &MacroblockGrid, index: usize, block: usize) -> CavlcContext {
        CavlcContext::new(
            grid.neighbour_coeffs(index, block),
            grid.mb(index).dc_skip(block),
        )
    }

    fn check_supported(mode: MbPartPredMode, index: usize) -> AvcResult<()> {
        match mode {
            MbPartPredMode::Intra16x16 | MbPartPredMode::Inter16x16 => Ok(()),
            other => Err(AvcError::Codec(format!(
                "宏块 {}: 不支持的预测模式 {:?}",
                index, other
            ))),
        }
    }

    /// 编码一个已完成量化的宏块, 返回写入的位数.
    ///
    /// 同时推导 coded_block_pattern、mb_type、mb_qp_delta 与运动矢量差,
    /// 宏块须按光栅顺序逐个编码.
    pub fn encode(
        &self,
        grid: &mut MacroblockGrid,
        index: usize,
        slice_type: SliceType,
        slice_qp: u8,
        bw: &mut BitWriter,
    ) -> AvcResult<u32> {
        let start = bw.bits_written();
        let qp_pred = grid.predict_qp(index, slice_qp);
        let mv_pred = grid.predict_mv(index);

        let mb = grid.mb_mut(index);
        Self::check_supported(mb.part_pred_mode, index)?;
        if mb.intra != mb.part_pred_mode.is_intra() {
            return Err(AvcError::Codec(format!(
                "宏块 {}: 帧内标志与预测模式 {:?} 不一致",
                index, mb.part_pred_mode
            )));
        }
        if !mb.intra && slice_type == SliceType::I {
            return Err(AvcError::Codec(format!("宏块 {}: I 条带中出现帧间宏块", index)));
        }
        if mb.qp > QP_MAX {
            return Err(AvcError::Codec(format!("宏块 {}: QP {} 超出范围", index, mb.qp)));
        }

        mb.set_coded_block_pattern();
        mb.set_type(slice_type);
        mb.qp_delta = i32::from(mb.qp) - i32::from(qp_pred);

        write_ue(bw, mb.mb_type)?;
        if mb.intra {
            write_ue(bw, u32::from(mb.intra_chroma_pred_mode))?;
        } else {
            mb.mvd = MotionVector::new(mb.mv.x - mv_pred.x, mb.mv.y - mv_pred.y);
            write_se(bw, mb.mvd.x)?;
            write_se(bw, mb.mvd.y)?;
        }
        if !mb.is_intra16x16() {
            encode_cbp(bw, mb.coded_block_pattern, !mb.intra)?;
        }
        write_se(bw, mb.qp_delta)?;

        let first = if mb.is_intra16x16() { LUMA_DC } else { LUMA_FIRST };
        for block in first..=LAST_BLOCK {
            if !grid.mb(index).block(block).is_coded() {
                grid.mb_mut(index).block_mut(block).set_total_coeffs(0);
                continue;
            }
            let ctx = Self::context(grid, index, block);
            let cavlc = self.cavlc_for(block);
            grid.mb_mut(index)
                .block_mut(block)
                .encode(cavlc, bw, ctx)
                .inspect_err(|e| {
                    warn!("宏块 {} {} 编码失败: {}", index, describe_block(block), e)
                })?;
        }

        let bits = (bw.bits_written() - start) as u32;
        let mb = grid.mb(index);
        debug!(
            "编码宏块 {}: mb_type={}, cbp={:#04x}, qp={}, bits={}",
            index, mb.mb_type, mb.coded_block_pattern, mb.qp, bits
        );
        Ok(bits)
    }

    /// 解码一个宏块的语法与量化系数, 返回读取的位数.
    ///
    /// 解码前应复位宏块状态; 未编码的块系数保持为零.
    pub fn decode(
        &self,
        grid: &mut MacroblockGrid,
        index: usize,
        slice_type: SliceType,
        slice_qp: u8,
        br: &mut BitReader,
    ) -> AvcResult<u32> {
        let start = br.position();
        let qp_pred = grid.predict_qp(index, slice_qp);
        let mv_pred = grid.predict_mv(index);

        let mb = grid.mb_mut(index);
        mb.mb_type = read_ue(br)?;
        mb.unpack_mb_type(slice_type)?;
        Self::check_supported(mb.part_pred_mode, index)?;

        if mb.intra {
            let mode = read_ue(br)?;
            if mode > MAX_CHROMA_PRED_MODE {
                return Err(AvcError::InvalidData(format!(
                    "宏块 {}: intra_chroma_pred_mode {} 无效",
                    index, mode
                )));
            }
            mb.intra_chroma_pred_mode = mode as u8;
        } else {
            mb.mvd = MotionVector::new(read_se(br)?, read_se(br)?);
            mb.mv = MotionVector::new(mv_pred.x + mb.mvd.x, mv_pred.y + mb.mvd.y);
        }
        if !mb.is_intra16x16() {
            mb.coded_block_pattern = decode_cbp(br, !mb.intra)?;
        }
        mb.apply_coded_block_pattern();

        mb.qp_delta = read_se(br)?;
        let qp = i32::from(qp_pred) + mb.qp_delta;
        if !(0..=i32::from(QP_MAX)).contains(&qp) {
            return Err(AvcError::InvalidData(format!(
                "宏块 {}: QP {} + {} 超出范围",
                index, qp_pred, mb.qp_delta
            )));
        }
        mb.qp = qp as u8;

        let first = if mb.is_intra16x16() { LUMA_DC } else { LUMA_FIRST };
        for block in first..=LAST_BLOCK {
            if !grid.mb(index).block(block).is_coded() {
                let blk = grid.mb_mut(index).block_mut(block);
                blk.coeffs_mut().fill(0);
                blk.set_total_coeffs(0);
                continue;
            }
            let ctx = Self::context(grid, index, block);
            let cavlc = self.cavlc_for(block);
            grid.mb_mut(index)
                .block_mut(block)
                .decode(cavlc, br, ctx)
                .inspect_err(|e| {
                    warn!("宏块 {} {} 解码失败: {}", index, describe_block(block), e)
                })?;
        }

        let bits = (br.position() - start) as u32;
        debug!(
            "解码宏块 {}: mb_type={}, qp={}, bits={}",
            index,
            grid.mb(index).mb_type,
            grid.mb(index).qp,
            bits
        );
        Ok(bits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::h264::macroblock::{CB_FIRST, luma_index};

    fn intra_grid() -> MacroblockGrid {
        let mut grid = MacroblockGrid::new(2, 2).unwrap();
        for i in 0..grid.len() {
            let mb = grid.mb_mut(i);
            mb.qp = 20 + i as u8;
            mb.intra16x16_pred_mode = (i % 4) as u8;
            mb.intra_chroma_pred_mode = ((i + 1) % 4) as u8;
        }
        grid.mb_mut(0).block_mut(LUMA_DC).coeffs_mut()[0] = 12;
        grid.mb_mut(1).block_mut(luma_index(2, 1)).coeffs_mut()[3] = -2;
        grid.mb_mut(3).block_mut(CB_DC).coeffs_mut()[2] = 5;
        grid.mb_mut(3).block_mut(CB_FIRST + 1).coeffs_mut()[7] = 1;
        grid
    }

    fn roundtrip(src: &mut MacroblockGrid, slice_type: SliceType, slice_qp: u8) -> MacroblockGrid {
        let layer = MacroblockLayer::new();
        let mut bw = BitWriter::new();
        let mut total = 0;
        for i in 0..src.len() {
            total += layer.encode(src, i, slice_type, slice_qp, &mut bw).unwrap();
        }
        assert_eq!(total as usize, bw.bits_written());

        let len = bw.bits_written();
        let data = bw.finish();
        let mut br = BitReader::with_bit_len(&data, len).unwrap();
        let mut dst = MacroblockGrid::new(src.cols(), src.rows()).unwrap();
        for i in 0..dst.len() {
            layer.decode(&mut dst, i, slice_type, slice_qp, &mut br).unwrap();
        }
        assert!(br.is_eof());
        dst
    }

    #[test]
    fn test_intra_grid_roundtrip() {
        let mut src = intra_grid();
        let dst = roundtrip(&mut src, SliceType::I, 24);
        for i in 0..src.len() {
            let (a, b) = (src.mb(i), dst.mb(i));
            assert_eq!(a.mb_type, b.mb_type);
            assert_eq!(a.qp, b.qp);
            assert_eq!(a.intra_chroma_pred_mode, b.intra_chroma_pred_mode);
            assert_eq!(a.intra16x16_pred_mode, b.intra16x16_pred_mode);
            assert_eq!(a.coded_block_pattern, b.coded_block_pattern);
            for blk in 0..=LAST_BLOCK {
                assert_eq!(a.block(blk).coeffs(), b.block(blk).coeffs(), "mb {} blk {}", i, blk);
            }
        }
        assert_eq!(src.mb(1).coded_block_pattern, 0x0F);
        assert_eq!(src.mb(3).coded_block_pattern, 0x20);
    }

    #[test]
    fn test_inter_grid_roundtrip() {
        let mut src = MacroblockGrid::new(3, 2).unwrap();
        for i in 0..src.len() {
            let mb = src.mb_mut(i);
            mb.qp = 30 - i as u8;
            if i == 2 {
                continue;
            }
            mb.intra = false;
            mb.part_pred_mode = MbPartPredMode::Inter16x16;
            mb.mv = MotionVector::new(i as i32 * 37 - 90, 12 - i as i32 * 5);
        }
        src.mb_mut(4).block_mut(luma_index(3, 0)).coeffs_mut()[1] = 9;
        src.mb_mut(5).block_mut(CR_DC).coeffs_mut()[0] = -3;

        let dst = roundtrip(&mut src, SliceType::P, 30);
        for i in 0..src.len() {
            let (a, b) = (src.mb(i), dst.mb(i));
            assert_eq!(a.intra, b.intra);
            assert_eq!(a.mb_type, b.mb_type);
            assert_eq!(a.qp, b.qp);
            if !a.intra {
                assert_eq!(a.mv, b.mv);
                assert_eq!(a.mvd, b.mvd);
            }
            for blk in LUMA_FIRST..=LAST_BLOCK {
                assert_eq!(a.block(blk).coeffs(), b.block(blk).coeffs());
            }
        }
        // 帧内宏块在 P 条带中偏移 5: 1 + 预测模式 2 + 5
        assert_eq!(src.mb(2).mb_type, 8);
        assert_eq!(src.mb(4).coded_block_pattern, 0x04);
        assert_eq!(src.mb(5).coded_block_pattern, 0x10);
    }

    #[test]
    fn test_unsupported_mode_is_rejected() {
        let mut grid = MacroblockGrid::new(1, 1).unwrap();
        grid.mb_mut(0).part_pred_mode = MbPartPredMode::Intra4x4;
        let mut bw = BitWriter::new();
        let layer = MacroblockLayer::new();
        assert!(matches!(
            layer.encode(&mut grid, 0, SliceType::I, 26, &mut bw),
            Err(AvcError::Codec(_))
        ));

        // mb_type = 0 (I_NxN) -> "1"
        let data = [0x80u8];
        let mut br = BitReader::with_bit_len(&data, 1).unwrap();
        assert!(layer.decode(&mut grid, 0, SliceType::I, 26, &mut br).is_err());
    }

    #[test]
    fn test_truncated_stream_fails() {
        let mut src = intra_grid();
        let layer = MacroblockLayer::new();
        let mut bw = BitWriter::new();
        layer.encode(&mut src, 0, SliceType::I, 24, &mut bw).unwrap();
        let len = bw.bits_written();
        let data = bw.finish();
        let mut br = BitReader::with_bit_len(&data, len - 3).unwrap();
        let mut dst = MacroblockGrid::new(2, 2).unwrap();
        assert!(layer.decode(&mut dst, 0, SliceType::I, 24, &mut br).is_err());
    }
}
