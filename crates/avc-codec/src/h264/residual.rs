//! 宏块残差的变换/量化流程与平面采样搬运.
//!
//! 正向: 每个 4x4 块先做整数变换; Intra_16x16 亮度与全部色度块的 DC 系数
//! 取出放入 DC 块并在原位置清零; 之后按宏块 QP (色度为 QPc) 量化.
//! DC 块再单独做 Hadamard 变换与量化.
//!
//! 反向按相反顺序: DC 块先反变换, 各块反量化后填回 DC, 最后做反整数变换.

use avc_core::{AvcError, AvcResult, Overlay2d};

use super::block::Colour;
use super::macroblock::{
    CB_DC, CR_DC, LUMA_DC, Macroblock, chroma_index, luma_index,
};
use super::transform::{Transform, TransformKind, TransformMode, chroma_qp};

/// 4:2:0 平面图像, 样本为有符号 16 位
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Yuv420Picture {
    width: usize,
    height: usize,
    y: Vec<i16>,
    cb: Vec<i16>,
    cr: Vec<i16>,
}

impl Yuv420Picture {
    /// 创建全零图像, 宽高须为 16 的倍数
    pub fn new(width: usize, height: usize) -> AvcResult<Self> {
        if width == 0 || height == 0 || width % 16 != 0 || height % 16 != 0 {
            return Err(AvcError::InvalidArgument(format!(
                "图像尺寸 {}x{} 不是 16 的倍数",
                width, height
            )));
        }
        Ok(Self {
            width,
            height,
            y: vec![0; width * height],
            cb: vec![0; width * height / 4],
            cr: vec![0; width * height / 4],
        })
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn plane(&self, colour: Colour) -> &[i16] {
        match colour {
            Colour::Luma => &self.y,
            Colour::Cb => &self.cb,
            Colour::Cr => &self.cr,
        }
    }

    pub fn plane_mut(&mut self, colour: Colour) -> &mut [i16] {
        match colour {
            Colour::Luma => &mut self.y,
            Colour::Cb => &mut self.cb,
            Colour::Cr => &mut self.cr,
        }
    }

    /// 平面宽高
    pub fn plane_size(&self, colour: Colour) -> (usize, usize) {
        match colour {
            Colour::Luma => (self.width, self.height),
            Colour::Cb | Colour::Cr => (self.width / 2, self.height / 2),
        }
    }

    /// 全部样本清零
    pub fn clear(&mut self) {
        self.y.fill(0);
        self.cb.fill(0);
        self.cr.fill(0);
    }

    /// 把宏块覆盖区域的样本读入各 4x4 块
    pub fn load_macroblock(&mut self, mb: &mut Macroblock) -> AvcResult<()> {
        for colour in [Colour::Luma, Colour::Cb, Colour::Cr] {
            let (w, h) = self.plane_size(colour);
            let (ox, oy) = origin_of(mb, colour);
            let mut overlay = Overlay2d::new(self.plane_mut(colour), w, h)?;
            for index in block_indices(colour) {
                let blk = mb.block_mut(index);
                let (bx, by) = blk.offset();
                overlay.set_origin(ox + bx, oy + by);
                blk.load(&overlay)?;
            }
        }
        Ok(())
    }

    /// 把各 4x4 块的样本写回宏块覆盖区域
    pub fn store_macroblock(&mut self, mb: &Macroblock) -> AvcResult<()> {
        for colour in [Colour::Luma, Colour::Cb, Colour::Cr] {
            let (w, h) = self.plane_size(colour);
            let (ox, oy) = origin_of(mb, colour);
            let mut overlay = Overlay2d::new(self.plane_mut(colour), w, h)?;
            for index in block_indices(colour) {
                let blk = mb.block(index);
                let (bx, by) = blk.offset();
                overlay.set_origin(ox + bx, oy + by);
                blk.store(&mut overlay)?;
            }
        }
        Ok(())
    }
}

fn origin_of(mb: &Macroblock, colour: Colour) -> (usize, usize) {
    match colour {
        Colour::Luma => mb.luma_offset,
        Colour::Cb | Colour::Cr => mb.chroma_offset,
    }
}

/// 某颜色分量全部 4x4 块的编码顺序索引, 按光栅顺序
fn block_indices(colour: Colour) -> Vec<usize> {
    let n = if colour == Colour::Luma { 4 } else { 2 };
    (0..n * n)
        .map(|k| {
            let (row, col) = (k / n, k % n);
            if colour == Colour::Luma {
                luma_index(row, col)
            } else {
                chroma_index(colour, row, col)
            }
        })
        .collect()
}

// ============================================================
// 正向
// ============================================================

/// 对已载入样本的宏块做正向变换与量化
pub fn forward_residual(mb: &mut Macroblock) -> AvcResult<()> {
    let qp = mb.qp;
    let qpc = chroma_qp(qp);
    let intra16 = mb.is_intra16x16();

    let transform_only =
        Transform::new(TransformKind::Block4x4).with_mode(TransformMode::TransformOnly);
    let quant_luma = Transform::new(TransformKind::Block4x4)
        .with_mode(TransformMode::QuantOnly)
        .with_qp(qp)?
        .with_intra(mb.intra);
    let quant_chroma = quant_luma.with_qp(qpc)?;

    let mut luma_dc = [0i32; 16];
    for (k, index) in block_indices(Colour::Luma).into_iter().enumerate() {
        let blk = mb.block_mut(index);
        blk.forward(&transform_only)?;
        if intra16 {
            luma_dc[k] = blk.dc();
            blk.set_dc(0);
        }
        blk.forward(&quant_luma)?;
    }

    let lum_dc_blk = mb.block_mut(LUMA_DC);
    lum_dc_blk.clear();
    if intra16 {
        lum_dc_blk.coeffs_mut().copy_from_slice(&luma_dc);
        lum_dc_blk.forward(&Transform::new(TransformKind::LumaDc4x4).with_qp(qp)?)?;
    }

    let chroma_dc_transform = Transform::new(TransformKind::ChromaDc2x2).with_qp(qpc)?;
    for (colour, dc_index) in [(Colour::Cb, CB_DC), (Colour::Cr, CR_DC)] {
        let mut dc = [0i32; 4];
        for (k, index) in block_indices(colour).into_iter().enumerate() {
            let blk = mb.block_mut(index);
            blk.forward(&transform_only)?;
            dc[k] = blk.dc();
            blk.set_dc(0);
            blk.forward(&quant_chroma)?;
        }
        let dc_blk = mb.block_mut(dc_index);
        dc_blk.clear();
        dc_blk.coeffs_mut().copy_from_slice(&dc);
        dc_blk.forward(&chroma_dc_transform)?;
    }
    Ok(())
}

// ============================================================
// 反向
// ============================================================

/// 对解码得到的量化系数做反量化与反变换, 块内结果为重建样本
pub fn inverse_residual(mb: &mut Macroblock) -> AvcResult<()> {
    let qp = mb.qp;
    let qpc = chroma_qp(qp);
    let intra16 = mb.is_intra16x16();

    let transform_only =
        Transform::new(TransformKind::Block4x4).with_mode(TransformMode::TransformOnly);
    let dequant_luma = Transform::new(TransformKind::Block4x4)
        .with_mode(TransformMode::QuantOnly)
        .with_qp(qp)?;
    let dequant_chroma = dequant_luma.with_qp(qpc)?;

    let mut luma_dc = [0i32; 16];
    if intra16 {
        let dc_blk = mb.block_mut(LUMA_DC);
        dc_blk.inverse(&Transform::new(TransformKind::LumaDc4x4).with_qp(qp)?)?;
        luma_dc.copy_from_slice(dc_blk.coeffs());
    }
    for (k, index) in block_indices(Colour::Luma).into_iter().enumerate() {
        let blk = mb.block_mut(index);
        blk.inverse(&dequant_luma)?;
        if intra16 {
            blk.set_dc(luma_dc[k]);
        }
        blk.inverse(&transform_only)?;
    }

    let chroma_dc_transform = Transform::new(TransformKind::ChromaDc2x2).with_qp(qpc)?;
    for (colour, dc_index) in [(Colour::Cb, CB_DC), (Colour::Cr, CR_DC)] {
        let dc_blk = mb.block_mut(dc_index);
        dc_blk.inverse(&chroma_dc_transform)?;
        let mut dc = [0i32; 4];
        dc.copy_from_slice(dc_blk.coeffs());
        for (k, index) in block_indices(colour).into_iter().enumerate() {
            let blk = mb.block_mut(index);
            blk.inverse(&dequant_chroma)?;
            blk.set_dc(dc[k]);
            blk.inverse(&transform_only)?;
        }
    }
    Ok(())
}
