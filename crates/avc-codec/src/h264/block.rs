//! 宏块内的 4x4 / 2x2 系数块.
//!
//! 系数按自然光栅顺序存放. 邻块关系用 [`BlockRef`] 索引表示, 由宏块网格统一持有,
//! 图像边界或条带边界处为 `None`.

use avc_core::{AvcResult, BitReader, BitWriter, Overlay2d};

use super::cavlc::{Cavlc, CavlcContext};
use super::transform::Transform;

/// 颜色分量
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Colour {
    Luma,
    Cb,
    Cr,
}

/// 指向网格中某个宏块的某个块
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockRef {
    /// 宏块在网格中的光栅索引
    pub mb: usize,
    /// 块在宏块内的编码顺序索引
    pub block: usize,
}

impl BlockRef {
    pub fn new(mb: usize, block: usize) -> Self {
        Self { mb, block }
    }
}

/// 系数块
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    coeffs: [i32; 16],
    width: usize,
    height: usize,
    dc: bool,
    coded: bool,
    total_coeffs: u8,
    colour: Colour,
    off_x: usize,
    off_y: usize,
    above: Option<BlockRef>,
    left: Option<BlockRef>,
}

impl Block {
    /// 创建 `width x height` 的空块 (4x4 或 2x2)
    pub fn new(width: usize, height: usize, colour: Colour, dc: bool) -> Self {
        debug_assert!(width * height <= 16);
        Self {
            coeffs: [0; 16],
            width,
            height,
            dc,
            coded: false,
            total_coeffs: 0,
            colour,
            off_x: 0,
            off_y: 0,
            above: None,
            left: None,
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    /// 系数个数
    pub fn len(&self) -> usize {
        self.width * self.height
    }

    pub fn is_dc(&self) -> bool {
        self.dc
    }

    pub fn colour(&self) -> Colour {
        self.colour
    }

    /// 系数 (光栅顺序)
    pub fn coeffs(&self) -> &[i32] {
        &self.coeffs[..self.width * self.height]
    }

    pub fn coeffs_mut(&mut self) -> &mut [i32] {
        &mut self.coeffs[..self.width * self.height]
    }

    pub fn dc(&self) -> i32 {
        self.coeffs[0]
    }

    pub fn set_dc(&mut self, dc: i32) {
        self.coeffs[0] = dc;
    }

    /// 是否全零
    pub fn is_zero(&self) -> bool {
        self.coeffs().iter().all(|&c| c == 0)
    }

    /// 系数清零, 编码状态复位
    pub fn clear(&mut self) {
        self.coeffs = [0; 16];
        self.coded = false;
        self.total_coeffs = 0;
    }

    pub fn is_coded(&self) -> bool {
        self.coded
    }

    pub fn set_coded(&mut self, coded: bool) {
        self.coded = coded;
    }

    /// 最近一次 CAVLC 编解码得到的非零系数个数
    pub fn total_coeffs(&self) -> u8 {
        self.total_coeffs
    }

    pub fn set_total_coeffs(&mut self, total_coeffs: u8) {
        self.total_coeffs = total_coeffs;
    }

    /// 块在宏块内的像素偏移 (x, y)
    pub fn offset(&self) -> (usize, usize) {
        (self.off_x, self.off_y)
    }

    pub fn set_offset(&mut self, x: usize, y: usize) {
        self.off_x = x;
        self.off_y = y;
    }

    pub fn above(&self) -> Option<BlockRef> {
        self.above
    }

    pub fn left(&self) -> Option<BlockRef> {
        self.left
    }

    pub fn set_neighbours(&mut self, above: Option<BlockRef>, left: Option<BlockRef>) {
        self.above = above;
        self.left = left;
    }

    // ============================================================
    // 采样搬运
    // ============================================================

    /// 从叠加视图读出采样, 视图原点应已指向宏块左上角加块偏移
    pub fn load(&mut self, overlay: &Overlay2d) -> AvcResult<()> {
        let (w, h) = (self.width, self.height);
        overlay.read(&mut self.coeffs[..w * h], w, h)
    }

    /// 把系数作为采样写回叠加视图
    pub fn store(&self, overlay: &mut Overlay2d) -> AvcResult<()> {
        overlay.write(self.coeffs(), self.width, self.height)
    }

    // ============================================================
    // 变换与熵编码
    // ============================================================

    /// 正向变换/量化, 具体步骤由变换对象的模式决定
    pub fn forward(&mut self, transform: &Transform) -> AvcResult<()> {
        transform.forward(self.coeffs_mut())
    }

    /// 反量化/反变换
    pub fn inverse(&mut self, transform: &Transform) -> AvcResult<()> {
        transform.inverse(self.coeffs_mut())
    }

    /// CAVLC 编码, 记录非零系数个数并返回写入的位数
    pub fn encode(&mut self, cavlc: &Cavlc, bw: &mut BitWriter, ctx: CavlcContext) -> AvcResult<u32> {
        let coding = cavlc.encode(bw, self.coeffs(), ctx)?;
        self.total_coeffs = coding.total_coeffs;
        Ok(coding.bits)
    }

    /// CAVLC 解码, 记录非零系数个数并返回读取的位数
    pub fn decode(&mut self, cavlc: &Cavlc, br: &mut BitReader, ctx: CavlcContext) -> AvcResult<u32> {
        let len = self.len();
        let coding = cavlc.decode(br, &mut self.coeffs[..len], ctx)?;
        self.total_coeffs = coding.total_coeffs;
        Ok(coding.bits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::h264::cavlc::CavlcMode;
    use crate::h264::transform::{TransformKind, TransformMode};

    #[test]
    fn test_dc_block_dimensions() {
        let blk = Block::new(2, 2, Colour::Cb, true);
        assert_eq!(blk.len(), 4);
        assert_eq!(blk.coeffs().len(), 4);
        assert!(blk.is_dc());
        assert!(blk.is_zero());
    }

    #[test]
    fn test_set_dc_and_clear() {
        let mut blk = Block::new(4, 4, Colour::Luma, false);
        blk.set_dc(-7);
        blk.set_coded(true);
        blk.set_total_coeffs(1);
        assert_eq!(blk.dc(), -7);
        assert!(!blk.is_zero());
        blk.clear();
        assert!(blk.is_zero());
        assert!(!blk.is_coded());
        assert_eq!(blk.total_coeffs(), 0);
    }

    #[test]
    fn test_load_store_through_overlay() {
        let mut plane: Vec<i16> = (0..64).map(|v| v as i16).collect();
        let mut blk = Block::new(4, 4, Colour::Luma, false);
        {
            let mut overlay = Overlay2d::new(&mut plane, 8, 8).unwrap();
            overlay.set_origin(4, 4);
            blk.load(&overlay).unwrap();
        }
        assert_eq!(blk.coeffs()[0], 36);
        assert_eq!(blk.coeffs()[15], 63);

        let mut out = vec![0i16; 64];
        let mut overlay = Overlay2d::new(&mut out, 8, 8).unwrap();
        overlay.set_origin(0, 4);
        blk.store(&mut overlay).unwrap();
        assert_eq!(out[32], 36);
        assert_eq!(out[59], 63);
    }

    #[test]
    fn test_encode_decode_records_total_coeffs() {
        let cavlc = Cavlc::new(CavlcMode::Block4x4);
        let mut src = Block::new(4, 4, Colour::Luma, false);
        src.coeffs_mut().copy_from_slice(&[0, 3, -1, 0, 0, -1, 1, 0, 1, 0, 0, 0, 0, 0, 0, 0]);
        let mut bw = BitWriter::new();
        let bits = src.encode(&cavlc, &mut bw, CavlcContext::new(0, false)).unwrap();
        assert_eq!(src.total_coeffs(), 5);

        let len = bw.bits_written();
        let data = bw.finish();
        let mut br = BitReader::with_bit_len(&data, len).unwrap();
        let mut dst = Block::new(4, 4, Colour::Luma, false);
        assert_eq!(dst.decode(&cavlc, &mut br, CavlcContext::new(0, false)).unwrap(), bits);
        assert_eq!(dst.coeffs(), src.coeffs());
        assert_eq!(dst.total_coeffs(), 5);
    }

    #[test]
    fn test_forward_inverse_flat_block() {
        let t = Transform::new(TransformKind::Block4x4).with_qp(20).unwrap();
        let mut blk = Block::new(4, 4, Colour::Cr, false);
        blk.coeffs_mut().fill(40);
        blk.forward(&t).unwrap();
        assert!(blk.coeffs()[1..].iter().all(|&c| c == 0));
        blk.inverse(&t.with_mode(TransformMode::TransformAndQuant)).unwrap();
        assert!(blk.coeffs().iter().all(|&c| (c - 40).abs() <= 2));
    }
}
