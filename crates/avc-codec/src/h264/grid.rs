//! 光栅扫描宏块网格.
//!
//! 网格持有全部宏块, 宏块与块之间的邻居关系都以索引表示.
//! 邻居只在图像边界内且属于同一条带时可用.

use log::debug;

use avc_core::{AvcError, AvcResult};

use super::block::{BlockRef, Colour};
use super::macroblock::{
    CB_DC, CHROMA_DC_NC, CR_DC, LUMA_DC, Macroblock, MotionVector, block_position,
    chroma_index, luma_index,
};

/// 宏块网格
#[derive(Debug, Clone)]
pub struct MacroblockGrid {
    cols: usize,
    rows: usize,
    mbs: Vec<Macroblock>,
}

impl MacroblockGrid {
    /// 创建 `cols x rows` 的网格, 全部宏块属于条带 0
    pub fn new(cols: usize, rows: usize) -> AvcResult<Self> {
        if cols == 0 || rows == 0 {
            return Err(AvcError::InvalidArgument(format!(
                "宏块网格尺寸无效: {}x{}",
                cols, rows
            )));
        }
        let mbs = (0..cols * rows).map(Macroblock::new).collect();
        let mut grid = Self { cols, rows, mbs };
        grid.assign_slice(0, cols * rows - 1, 0)?;
        Ok(grid)
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    /// 宏块总数
    pub fn len(&self) -> usize {
        self.mbs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mbs.is_empty()
    }

    pub fn mb(&self, index: usize) -> &Macroblock {
        &self.mbs[index]
    }

    pub fn mb_mut(&mut self, index: usize) -> &mut Macroblock {
        &mut self.mbs[index]
    }

    pub fn iter(&self) -> impl Iterator<Item = &Macroblock> {
        self.mbs.iter()
    }

    /// 复位所有宏块的逐帧状态
    pub fn reset(&mut self) {
        for mb in self.mbs.iter_mut() {
            mb.reset();
        }
    }

    /// 把 `[start, end]` 范围的宏块划入条带 `slice`, 并重建它们的邻居关系.
    ///
    /// 按光栅顺序处理, 之前的宏块应已完成划分.
    pub fn assign_slice(&mut self, start: usize, end: usize, slice: usize) -> AvcResult<()> {
        if start > end || end >= self.mbs.len() {
            return Err(AvcError::InvalidArgument(format!(
                "条带范围 [{}, {}] 超出网格 ({} 个宏块)",
                start,
                end,
                self.mbs.len()
            )));
        }

        for index in start..=end {
            self.mbs[index].slice = slice;
        }
        for index in start..=end {
            self.link_macroblock(index);
        }
        debug!("条带 {} 覆盖宏块 [{}, {}]", slice, start, end);
        Ok(())
    }

    /// 同一条带内 (row, col) 处的宏块
    fn neighbour_at(&self, row: isize, col: isize, slice: usize) -> Option<usize> {
        if row < 0 || col < 0 || row as usize >= self.rows || col as usize >= self.cols {
            return None;
        }
        let index = row as usize * self.cols + col as usize;
        (self.mbs[index].slice == slice).then_some(index)
    }

    fn link_macroblock(&mut self, index: usize) {
        let row = (index / self.cols) as isize;
        let col = (index % self.cols) as isize;
        let slice = self.mbs[index].slice;

        let left = self.neighbour_at(row, col - 1, slice);
        let above = self.neighbour_at(row - 1, col, slice);
        let above_right = self.neighbour_at(row - 1, col + 1, slice);
        let above_left = self.neighbour_at(row - 1, col - 1, slice);

        let mb = &mut self.mbs[index];
        mb.luma_offset = (col as usize * 16, row as usize * 16);
        mb.chroma_offset = (col as usize * 8, row as usize * 8);
        mb.left = left;
        mb.above = above;
        mb.above_right = above_right;
        mb.above_left = above_left;

        // 4x4 块: 宏块内部的邻块, 或相邻宏块中行/列对齐的边缘块
        for r in 0..4 {
            for c in 0..4 {
                let blk_above = if r > 0 {
                    Some(BlockRef::new(index, luma_index(r - 1, c)))
                } else {
                    above.map(|n| BlockRef::new(n, luma_index(3, c)))
                };
                let blk_left = if c > 0 {
                    Some(BlockRef::new(index, luma_index(r, c - 1)))
                } else {
                    left.map(|n| BlockRef::new(n, luma_index(r, 3)))
                };
                mb.block_mut(luma_index(r, c)).set_neighbours(blk_above, blk_left);
            }
        }
        for colour in [Colour::Cb, Colour::Cr] {
            for r in 0..2 {
                for c in 0..2 {
                    let blk_above = if r > 0 {
                        Some(BlockRef::new(index, chroma_index(colour, r - 1, c)))
                    } else {
                        above.map(|n| BlockRef::new(n, chroma_index(colour, 1, c)))
                    };
                    let blk_left = if c > 0 {
                        Some(BlockRef::new(index, chroma_index(colour, r, c - 1)))
                    } else {
                        left.map(|n| BlockRef::new(n, chroma_index(colour, r, 1)))
                    };
                    mb.block_mut(chroma_index(colour, r, c))
                        .set_neighbours(blk_above, blk_left);
                }
            }
        }

        // DC 块取第一个 4x4 块的外部邻居
        mb.block_mut(LUMA_DC).set_neighbours(
            above.map(|n| BlockRef::new(n, luma_index(3, 0))),
            left.map(|n| BlockRef::new(n, luma_index(0, 3))),
        );
        for (dc, colour) in [(CB_DC, Colour::Cb), (CR_DC, Colour::Cr)] {
            mb.block_mut(dc).set_neighbours(
                above.map(|n| BlockRef::new(n, chroma_index(colour, 1, 0))),
                left.map(|n| BlockRef::new(n, chroma_index(colour, 0, 1))),
            );
        }
    }

    // ============================================================
    // 上下文推导
    // ============================================================

    fn total_coeffs_of(&self, r: BlockRef) -> i32 {
        i32::from(self.mbs[r.mb].block(r.block).total_coeffs())
    }

    /// 块的 CAVLC nC 上下文.
    ///
    /// 色度 DC 块固定为 -1; 其余块取上/左邻块非零系数个数,
    /// 两者都可用时取 (nA + nB + 1) / 2.
    pub fn neighbour_coeffs(&self, mb: usize, block: usize) -> i32 {
        if block == CB_DC || block == CR_DC {
            return CHROMA_DC_NC;
        }
        let blk = self.mbs[mb].block(block);
        let above = blk.above().map(|r| self.total_coeffs_of(r));
        let left = blk.left().map(|r| self.total_coeffs_of(r));
        match (above, left) {
            (Some(a), Some(b)) => (a + b + 1) / 2,
            (Some(n), None) | (None, Some(n)) => n,
            (None, None) => 0,
        }
    }

    /// 16x16 分区的运动矢量预测 (A/B/C 三者取中值).
    ///
    /// 帧内或不可用的邻居按零矢量计; C 不可用时用 D 替代;
    /// B、C 都不可用时 B、C 取 A.
    pub fn predict_mv(&self, index: usize) -> MotionVector {
        let mb = &self.mbs[index];
        let mv_of = |n: Option<usize>| -> MotionVector {
            match n {
                Some(i) if !self.mbs[i].intra => self.mbs[i].mv,
                _ => MotionVector::default(),
            }
        };

        let a = mv_of(mb.left);
        let mut b = mv_of(mb.above);
        let mut c = if mb.above_right.is_some() {
            mv_of(mb.above_right)
        } else {
            mv_of(mb.above_left)
        };
        if mb.above.is_none() && mb.above_right.is_none() {
            b = a;
            c = a;
        }

        MotionVector::new(median(a.x, b.x, c.x), median(a.y, b.y, c.y))
    }

    /// QP 预测值: 同一条带中的前一个宏块的 QP, 否则为条带 QP
    pub fn predict_qp(&self, index: usize, slice_qp: u8) -> u8 {
        if index == 0 {
            return slice_qp;
        }
        let prev = &self.mbs[index - 1];
        if prev.slice == self.mbs[index].slice {
            prev.qp
        } else {
            slice_qp
        }
    }
}

/// 三个数的中值
pub fn median(x: i32, y: i32, z: i32) -> i32 {
    x.max(y).min(x.min(y).max(z))
}

/// 编码顺序索引对应块的描述, 用于日志
pub(crate) fn describe_block(index: usize) -> String {
    match (index, block_position(index)) {
        (LUMA_DC, _) => "亮度 DC".to_string(),
        (CB_DC, _) => "Cb DC".to_string(),
        (CR_DC, _) => "Cr DC".to_string(),
        (_, Some((colour, row, col))) => format!("{:?}[{}][{}]", colour, row, col),
        _ => format!("块 {}", index),
    }
}
