//! H.264 整数变换与量化.
//!
//! 三类变换各有正反两个方向:
//! - 4x4 残差块 (核心整数 DCT)
//! - 4x4 亮度 DC 块 (Intra_16x16 的 Hadamard)
//! - 2x2 色度 DC 块 (4:2:0 的 Hadamard)
//!
//! 系数均按光栅顺序存放. 量化使用乘法因子与移位, 全程不涉及浮点.

use avc_core::{AvcError, AvcResult};

/// 最大量化参数
pub const QP_MAX: u8 = 51;

// ============================================================
// 量化参数表
// ============================================================

/// 正向量化乘法因子 MF: [qP % 6][位置类别]
/// 位置类别: 0=偶行偶列, 1=奇行奇列, 2=其余
const QUANT_MF: [[i32; 3]; 6] = [
    [13107, 5243, 8066],
    [11916, 4660, 7490],
    [10082, 4194, 6554],
    [9362, 3647, 5825],
    [8192, 3355, 5243],
    [7282, 2893, 4559],
];

/// 反量化缩放 (H.264 表 8-14 的 v 值): [qP % 6][位置类别]
const DEQUANT_V: [[i32; 3]; 6] = [
    [10, 16, 13],
    [11, 18, 14],
    [13, 20, 16],
    [14, 23, 18],
    [16, 25, 20],
    [18, 29, 23],
];

/// 4x4 块内各位置所属的类别
const POSITION_CLASS: [usize; 16] = [0, 2, 0, 2, 2, 1, 2, 1, 0, 2, 0, 2, 2, 1, 2, 1];

/// 亮度 QP 到色度 QPc 的映射 (H.264 表 8-15)
const CHROMA_QP: [u8; 52] = [
    0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15, 16, 17, 18, 19, 20, 21, 22, 23, 24, 25,
    26, 27, 28, 29, 29, 30, 31, 32, 32, 33, 34, 34, 35, 35, 36, 36, 37, 37, 37, 38, 38, 38, 39,
    39, 39, 39,
];

/// 量化步长基数, 对应 Qstep * 16
const QSTEP_X16: [i32; 6] = [10, 11, 13, 14, 16, 18];

/// 由亮度 QP 求色度 QPc
pub fn chroma_qp(qp: u8) -> u8 {
    CHROMA_QP[usize::from(qp.min(QP_MAX))]
}

/// 正反变换往返后单个样本允许的最大误差
pub fn quant_error_bound(qp: u8) -> i32 {
    let qp = qp.min(QP_MAX);
    let q_step = (QSTEP_X16[usize::from(qp % 6)] << (qp / 6)) / 16;
    (q_step + (i32::from(qp) * 2 + 2) / 3).max(1)
}

// ============================================================
// 正向变换
// ============================================================

/// 4x4 核心整数变换 (未缩放)
pub fn forward_core_4x4(block: &mut [i32; 16]) {
    let mut temp = [0i32; 16];

    // 行变换
    for i in 0..4 {
        let s = i * 4;
        let a = block[s] + block[s + 3];
        let d = block[s] - block[s + 3];
        let b = block[s + 1] + block[s + 2];
        let c = block[s + 1] - block[s + 2];
        temp[s] = a + b;
        temp[s + 1] = c + 2 * d;
        temp[s + 2] = a - b;
        temp[s + 3] = d - 2 * c;
    }

    // 列变换
    for j in 0..4 {
        let a = temp[j] + temp[12 + j];
        let d = temp[j] - temp[12 + j];
        let b = temp[4 + j] + temp[8 + j];
        let c = temp[4 + j] - temp[8 + j];
        block[j] = a + b;
        block[4 + j] = c + 2 * d;
        block[8 + j] = a - b;
        block[12 + j] = d - 2 * c;
    }
}

/// 4x4 亮度 DC 正向 Hadamard 变换, 列方向结果除以 2
pub fn forward_hadamard_4x4(block: &mut [i32; 16]) {
    let mut temp = [0i32; 16];

    for i in 0..4 {
        let s = i * 4;
        let a = block[s] + block[s + 3];
        let d = block[s] - block[s + 3];
        let b = block[s + 1] + block[s + 2];
        let c = block[s + 1] - block[s + 2];
        temp[s] = a + b;
        temp[s + 1] = c + d;
        temp[s + 2] = a - b;
        temp[s + 3] = d - c;
    }

    for j in 0..4 {
        let a = temp[j] + temp[12 + j];
        let d = temp[j] - temp[12 + j];
        let b = temp[4 + j] + temp[8 + j];
        let c = temp[4 + j] - temp[8 + j];
        block[j] = (a + b) >> 1;
        block[4 + j] = (c + d) >> 1;
        block[8 + j] = (a - b) >> 1;
        block[12 + j] = (d - c) >> 1;
    }
}

/// 2x2 色度 DC Hadamard 变换 (正反相同)
pub fn hadamard_2x2(block: &mut [i32; 4]) {
    let a = block[0] + block[1];
    let b = block[0] - block[1];
    let c = block[2] + block[3];
    let d = block[2] - block[3];
    block[0] = a + c;
    block[1] = b + d;
    block[2] = a - c;
    block[3] = b - d;
}

// ============================================================
// 正向量化
// ============================================================

/// 以零为中心的对称量化: sign(x) * ((|x| * mf + f) >> shift)
#[inline]
fn quant_value(x: i32, mf: i32, f: i32, shift: u32) -> i32 {
    let level = (x.abs() * mf + f) >> shift;
    if x < 0 { -level } else { level }
}

/// 4x4 残差块量化. 帧内块的舍入偏移为 1/3, 帧间为 1/6.
pub fn quant_4x4(block: &mut [i32; 16], qp: u8, intra: bool) {
    let rem = usize::from(qp % 6);
    let shift = 15 + u32::from(qp / 6);
    let f = if intra { (1 << shift) / 3 } else { (1 << shift) / 6 };
    for (pos, c) in block.iter_mut().enumerate() {
        *c = quant_value(*c, QUANT_MF[rem][POSITION_CLASS[pos]], f, shift);
    }
}

/// DC 块量化 (亮度 4x4 与色度 2x2 共用)
pub fn quant_dc(block: &mut [i32], qp: u8) {
    let mf = QUANT_MF[usize::from(qp % 6)][0];
    let shift = 16 + u32::from(qp / 6);
    let f = 2 * ((1 << (shift - 1)) / 3);
    for c in block.iter_mut() {
        *c = quant_value(*c, mf, f, shift);
    }
}

// ============================================================
// 反量化
// ============================================================

/// 4x4 残差块反量化
pub fn dequant_4x4(block: &mut [i32; 16], qp: u8) {
    let rem = usize::from(qp % 6);
    let per = i32::from(qp / 6);

    for (pos, c) in block.iter_mut().enumerate() {
        let scale = DEQUANT_V[rem][POSITION_CLASS[pos]] * 16;
        if per >= 4 {
            *c = (*c * scale) << (per - 4);
        } else {
            *c = (*c * scale + (1 << (3 - per))) >> (4 - per);
        }
    }
}

/// Luma DC 系数反量化 (Hadamard 反变换之后)
pub fn dequant_luma_dc(block: &mut [i32; 16], qp: u8) {
    let scale = DEQUANT_V[usize::from(qp % 6)][0] * 16;
    let per = i32::from(qp / 6);

    for c in block.iter_mut() {
        if per >= 6 {
            *c = (*c * scale) << (per - 6);
        } else {
            *c = (*c * scale + (1 << (5 - per))) >> (6 - per);
        }
    }
}

/// Chroma DC 系数反量化 (4:2:0, Hadamard 反变换之后)
pub fn dequant_chroma_dc(block: &mut [i32; 4], qp: u8) {
    let scale = DEQUANT_V[usize::from(qp % 6)][0] * 16;
    let per = u32::from(qp / 6);

    for c in block.iter_mut() {
        *c = ((*c * scale) << per) >> 5;
    }
}

// ============================================================
// 反变换
// ============================================================

/// 4x4 亮度 DC 反 Hadamard 变换
pub fn inverse_hadamard_4x4(block: &mut [i32; 16]) {
    let mut temp = [0i32; 16];

    // 行变换
    for i in 0..4 {
        let s = i * 4;
        let a = block[s] + block[s + 2];
        let b = block[s] - block[s + 2];
        let c = block[s + 1] - block[s + 3];
        let d = block[s + 1] + block[s + 3];
        temp[s] = a + d;
        temp[s + 1] = b + c;
        temp[s + 2] = b - c;
        temp[s + 3] = a - d;
    }

    // 列变换
    for j in 0..4 {
        let a = temp[j] + temp[8 + j];
        let b = temp[j] - temp[8 + j];
        let c = temp[4 + j] - temp[12 + j];
        let d = temp[4 + j] + temp[12 + j];
        block[j] = a + d;
        block[4 + j] = b + c;
        block[8 + j] = b - c;
        block[12 + j] = a - d;
    }
}

/// 4x4 反整数 DCT 变换, 结果右移 6 位并四舍五入
pub fn inverse_core_4x4(block: &mut [i32; 16]) {
    let mut temp = [0i32; 16];

    // 行变换
    for i in 0..4 {
        let s = i * 4;
        let e0 = block[s] + block[s + 2];
        let e1 = block[s] - block[s + 2];
        let e2 = (block[s + 1] >> 1) - block[s + 3];
        let e3 = block[s + 1] + (block[s + 3] >> 1);
        temp[s] = e0 + e3;
        temp[s + 1] = e1 + e2;
        temp[s + 2] = e1 - e2;
        temp[s + 3] = e0 - e3;
    }

    // 列变换
    for j in 0..4 {
        let e0 = temp[j] + temp[8 + j];
        let e1 = temp[j] - temp[8 + j];
        let e2 = (temp[4 + j] >> 1) - temp[12 + j];
        let e3 = temp[4 + j] + (temp[12 + j] >> 1);
        block[j] = (e0 + e3 + 32) >> 6;
        block[4 + j] = (e1 + e2 + 32) >> 6;
        block[8 + j] = (e1 - e2 + 32) >> 6;
        block[12 + j] = (e0 - e3 + 32) >> 6;
    }
}

// ============================================================
// 变换对象
// ============================================================

/// 变换作用的块类别
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransformKind {
    /// 4x4 残差块
    Block4x4,
    /// Intra_16x16 亮度 DC 块 (4x4)
    LumaDc4x4,
    /// 4:2:0 色度 DC 块 (2x2)
    ChromaDc2x2,
}

impl TransformKind {
    /// 块内系数个数
    pub fn len(&self) -> usize {
        match self {
            Self::Block4x4 | Self::LumaDc4x4 => 16,
            Self::ChromaDc2x2 => 4,
        }
    }
}

/// 变换执行的步骤
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransformMode {
    /// 变换加量化
    TransformAndQuant,
    /// 只做变换
    TransformOnly,
    /// 只做量化
    QuantOnly,
}

/// 一个配置好的正/反变换.
///
/// 不保存逐块状态, 可在多个块之间复用. 宏块层按需调整 QP 和模式.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transform {
    kind: TransformKind,
    mode: TransformMode,
    qp: u8,
    intra: bool,
}

impl Transform {
    /// 创建变换, 默认变换加量化, QP=1, 帧内舍入
    pub fn new(kind: TransformKind) -> Self {
        Self {
            kind,
            mode: TransformMode::TransformAndQuant,
            qp: 1,
            intra: true,
        }
    }

    /// 指定执行步骤
    pub fn with_mode(mut self, mode: TransformMode) -> Self {
        self.mode = mode;
        self
    }

    /// 指定量化参数, 超出 [0, 51] 返回错误
    pub fn with_qp(mut self, qp: u8) -> AvcResult<Self> {
        self.set_qp(qp)?;
        Ok(self)
    }

    /// 指定量化舍入: 帧内 1/3, 帧间 1/6
    pub fn with_intra(mut self, intra: bool) -> Self {
        self.intra = intra;
        self
    }

    /// 变换种类
    pub fn kind(&self) -> TransformKind {
        self.kind
    }

    /// 当前执行步骤
    pub fn mode(&self) -> TransformMode {
        self.mode
    }

    /// 当前量化参数
    pub fn qp(&self) -> u8 {
        self.qp
    }

    /// 修改执行步骤
    pub fn set_mode(&mut self, mode: TransformMode) {
        self.mode = mode;
    }

    /// 设置量化参数, 超出 [0, 51] 返回错误
    pub fn set_qp(&mut self, qp: u8) -> AvcResult<()> {
        if qp > QP_MAX {
            return Err(AvcError::InvalidArgument(format!(
                "量化参数 {} 超出 [0, {}]",
                qp, QP_MAX
            )));
        }
        self.qp = qp;
        Ok(())
    }

    /// 切换帧内/帧间量化舍入
    pub fn set_intra(&mut self, intra: bool) {
        self.intra = intra;
    }

    /// 正向变换/量化, 原地修改系数
    pub fn forward(&self, coeffs: &mut [i32]) -> AvcResult<()> {
        let transform = self.mode != TransformMode::QuantOnly;
        let quant = self.mode != TransformMode::TransformOnly;
        match self.kind {
            TransformKind::Block4x4 => {
                let block = as_block16(coeffs)?;
                if transform {
                    forward_core_4x4(block);
                }
                if quant {
                    quant_4x4(block, self.qp, self.intra);
                }
            }
            TransformKind::LumaDc4x4 => {
                let block = as_block16(coeffs)?;
                if transform {
                    forward_hadamard_4x4(block);
                }
                if quant {
                    quant_dc(block, self.qp);
                }
            }
            TransformKind::ChromaDc2x2 => {
                let block = as_block4(coeffs)?;
                if transform {
                    hadamard_2x2(block);
                }
                if quant {
                    quant_dc(block, self.qp);
                }
            }
        }
        Ok(())
    }

    /// 反量化/反变换, 原地修改系数
    pub fn inverse(&self, coeffs: &mut [i32]) -> AvcResult<()> {
        let transform = self.mode != TransformMode::QuantOnly;
        let quant = self.mode != TransformMode::TransformOnly;
        match self.kind {
            TransformKind::Block4x4 => {
                let block = as_block16(coeffs)?;
                if quant {
                    dequant_4x4(block, self.qp);
                }
                if transform {
                    inverse_core_4x4(block);
                }
            }
            // DC 块先做 Hadamard 再缩放
            TransformKind::LumaDc4x4 => {
                let block = as_block16(coeffs)?;
                if transform {
                    inverse_hadamard_4x4(block);
                }
                if quant {
                    dequant_luma_dc(block, self.qp);
                }
            }
            TransformKind::ChromaDc2x2 => {
                let block = as_block4(coeffs)?;
                if transform {
                    hadamard_2x2(block);
                }
                if quant {
                    dequant_chroma_dc(block, self.qp);
                }
            }
        }
        Ok(())
    }
}

fn as_block16(coeffs: &mut [i32]) -> AvcResult<&mut [i32; 16]> {
    let len = coeffs.len();
    coeffs
        .try_into()
        .map_err(|_| AvcError::InvalidArgument(format!("4x4 变换需要 16 个系数, 实际 {}", len)))
}

fn as_block4(coeffs: &mut [i32]) -> AvcResult<&mut [i32; 4]> {
    let len = coeffs.len();
    coeffs
        .try_into()
        .map_err(|_| AvcError::InvalidArgument(format!("2x2 变换需要 4 个系数, 实际 {}", len)))
}
