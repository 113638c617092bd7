//! 平面采样缓冲区上的二维叠加视图.
//!
//! 颜色空间转换等外部模块产出连续存放的平面采样 (Y / Cb / Cr), 宏块层只需要
//! 以 4x4 块为单位把采样搬进搬出. [`Overlay2d`] 在平面上设置一个可移动的原点,
//! 从原点处读出或写入一个矩形块.

use crate::{AvcError, AvcResult};

/// 平面缓冲区上的二维叠加视图
pub struct Overlay2d<'a> {
    plane: &'a mut [i16],
    width: usize,
    height: usize,
    origin_x: usize,
    origin_y: usize,
}

impl<'a> Overlay2d<'a> {
    /// 在 `width * height` 的平面上创建视图, 原点位于 (0, 0)
    pub fn new(plane: &'a mut [i16], width: usize, height: usize) -> AvcResult<Self> {
        if width == 0 || height == 0 || plane.len() < width * height {
            return Err(AvcError::InvalidArgument(format!(
                "平面尺寸无效: {}x{}, 缓冲区长度 {}",
                width,
                height,
                plane.len()
            )));
        }
        Ok(Self {
            plane,
            width,
            height,
            origin_x: 0,
            origin_y: 0,
        })
    }

    /// 平面宽度
    pub fn width(&self) -> usize {
        self.width
    }

    /// 平面高度
    pub fn height(&self) -> usize {
        self.height
    }

    /// 设置视图原点
    pub fn set_origin(&mut self, x: usize, y: usize) {
        self.origin_x = x;
        self.origin_y = y;
    }

    fn check_region(&self, block_w: usize, block_h: usize, len: usize) -> AvcResult<()> {
        if len < block_w * block_h {
            return Err(AvcError::InvalidArgument(format!(
                "块缓冲区长度 {} 小于 {}x{}",
                len, block_w, block_h
            )));
        }
        if self.origin_x + block_w > self.width || self.origin_y + block_h > self.height {
            return Err(AvcError::InvalidArgument(format!(
                "块区域 ({}, {}) {}x{} 越出平面 {}x{}",
                self.origin_x, self.origin_y, block_w, block_h, self.width, self.height
            )));
        }
        Ok(())
    }

    /// 从原点处读出 `block_w x block_h` 的采样到块 (行优先)
    pub fn read(&self, block: &mut [i32], block_w: usize, block_h: usize) -> AvcResult<()> {
        self.check_region(block_w, block_h, block.len())?;
        for (y, row) in block.chunks_mut(block_w).take(block_h).enumerate() {
            let start = (self.origin_y + y) * self.width + self.origin_x;
            for (dst, &src) in row.iter_mut().zip(&self.plane[start..start + block_w]) {
                *dst = i32::from(src);
            }
        }
        Ok(())
    }

    /// 把块 (行优先) 写入原点处, 超出 i16 范围的值被截断到边界
    pub fn write(&mut self, block: &[i32], block_w: usize, block_h: usize) -> AvcResult<()> {
        self.check_region(block_w, block_h, block.len())?;
        for (y, row) in block.chunks(block_w).take(block_h).enumerate() {
            let start = (self.origin_y + y) * self.width + self.origin_x;
            for (dst, &src) in self.plane[start..start + block_w].iter_mut().zip(row) {
                *dst = src.clamp(i32::from(i16::MIN), i32::from(i16::MAX)) as i16;
            }
        }
        Ok(())
    }
}
