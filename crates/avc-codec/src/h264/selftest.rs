//! 宏块层端到端自检.
//!
//! 每轮随机生成一幅合成的 4:2:0 图像和逐宏块的编码参数 (条带类型、QP、
//! 帧内/帧间、预测模式、运动矢量), 经变换量化与宏块层编码写成比特流,
//! 再解码重建. 解码出的 mb_type、QP、色度预测模式或运动矢量必须与编码端一致,
//! 重建样本与原始样本的差不得超过 [`quant_error_bound`].

use log::{debug, info, warn};

use avc_core::{AvcResult, BitReader, BitWriter};

use super::block::Colour;
use super::grid::MacroblockGrid;
use super::layer::MacroblockLayer;
use super::macroblock::{Macroblock, MbPartPredMode, MotionVector, SliceType};
use super::residual::{Yuv420Picture, forward_residual, inverse_residual};
use super::transform::{QP_MAX, quant_error_bound};

/// 合成样本中点范围
const MIDPOINT_RANGE: (i32, i32) = (-256, 255);
/// 合成样本偏差上限
const MAX_DEVIATION: i32 = 128;
/// 样本幅度上限
const SAMPLE_LIMIT: i32 = 255;
/// 运动矢量范围 (1/4 像素)
const MV_X_RANGE: (i32, i32) = (-8192, 8191);
const MV_Y_RANGE: (i32, i32) = (-512, 511);

// ============================================================
// 伪随机数
// ============================================================

/// 64 位线性同余发生器, 同一种子得到相同序列
#[derive(Debug, Clone)]
pub struct Lcg {
    state: u64,
}

impl Lcg {
    const MUL: u64 = 6_364_136_223_846_793_005;
    const INC: u64 = 1_442_695_040_888_963_407;

    pub fn new(seed: u64) -> Self {
        Self { state: seed }
    }

    /// 下一个 32 位值 (取状态高 32 位)
    pub fn next_u32(&mut self) -> u32 {
        self.state = self.state.wrapping_mul(Self::MUL).wrapping_add(Self::INC);
        (self.state >> 32) as u32
    }

    /// `[lo, hi]` 内的整数
    pub fn range(&mut self, lo: i32, hi: i32) -> i32 {
        debug_assert!(lo <= hi);
        let span = (i64::from(hi) - i64::from(lo) + 1) as u64;
        lo + (u64::from(self.next_u32()) % span) as i32
    }

    pub fn coin(&mut self) -> bool {
        self.range(0, 1) == 1
    }
}

// ============================================================
// 参数与结果
// ============================================================

/// 自检参数
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelfTestParams {
    /// 轮数, 第 n 轮的条带 QP 为 n % 52
    pub trials: u32,
    pub seed: u64,
    pub mb_cols: usize,
    pub mb_rows: usize,
    /// 宏块 QP 相对条带 QP 的最大降幅
    pub max_qp_drop: u8,
    /// 首次失败即停止
    pub stop_on_failure: bool,
}

impl Default for SelfTestParams {
    fn default() -> Self {
        Self {
            trials: 1024,
            seed: 23995,
            mb_cols: 3,
            mb_rows: 3,
            max_qp_drop: 25,
            stop_on_failure: false,
        }
    }
}

/// 自检结果
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SelfTestReport {
    /// 实际运行的轮数
    pub trials: u32,
    /// 失败轮数
    pub failures: u32,
    /// 全部轮次编码的总位数
    pub total_bits: u64,
}

impl SelfTestReport {
    pub fn passed(&self) -> bool {
        self.failures == 0 && self.trials > 0
    }
}

// ============================================================
// 执行
// ============================================================

/// 一轮中的一处不一致
#[derive(Debug)]
enum Mismatch {
    Syntax { mb: usize, what: &'static str },
    Sample { colour: Colour, pos: usize, error: i32, bound: i32 },
}

impl std::fmt::Display for Mismatch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Syntax { mb, what } => write!(f, "宏块 {} 的 {} 不一致", mb, what),
            Self::Sample {
                colour,
                pos,
                error,
                bound,
            } => write!(f, "{:?} 样本 {} 误差 {} 超过 {}", colour, pos, error, bound),
        }
    }
}

struct Scenario {
    layer: MacroblockLayer,
    original: Yuv420Picture,
    recon: Yuv420Picture,
    enc: MacroblockGrid,
    dec: MacroblockGrid,
}

/// 运行自检. 只有参数非法时返回错误, 编解码失败计入失败轮数.
pub fn run_self_test(params: &SelfTestParams) -> AvcResult<SelfTestReport> {
    let (w, h) = (params.mb_cols * 16, params.mb_rows * 16);
    let mut scenario = Scenario {
        layer: MacroblockLayer::new(),
        original: Yuv420Picture::new(w, h)?,
        recon: Yuv420Picture::new(w, h)?,
        enc: MacroblockGrid::new(params.mb_cols, params.mb_rows)?,
        dec: MacroblockGrid::new(params.mb_cols, params.mb_rows)?,
    };
    let mut rng = Lcg::new(params.seed);
    let mut report = SelfTestReport::default();

    info!(
        "宏块层自检: {} 轮, 种子 {}, 网格 {}x{}",
        params.trials, params.seed, params.mb_cols, params.mb_rows
    );

    for trial in 0..params.trials {
        let slice_qp = (trial % (u32::from(QP_MAX) + 1)) as u8;
        report.trials += 1;
        match scenario.run_trial(&mut rng, slice_qp, params.max_qp_drop) {
            Ok((bits, None)) => {
                report.total_bits += u64::from(bits);
                debug!("第 {} 轮通过: slice_qp={}, bits={}", trial, slice_qp, bits);
            }
            Ok((bits, Some(mismatch))) => {
                report.total_bits += u64::from(bits);
                report.failures += 1;
                warn!("第 {} 轮失败: slice_qp={}, {}", trial, slice_qp, mismatch);
            }
            Err(e) => {
                report.failures += 1;
                warn!("第 {} 轮编解码出错: slice_qp={}, {}", trial, slice_qp, e);
            }
        }
        if params.stop_on_failure && report.failures > 0 {
            break;
        }
    }

    info!(
        "自检结束: {}/{} 轮通过, 共 {} 位",
        report.trials - report.failures,
        report.trials,
        report.total_bits
    );
    Ok(report)
}

impl Scenario {
    fn run_trial(
        &mut self,
        rng: &mut Lcg,
        slice_qp: u8,
        max_qp_drop: u8,
    ) -> AvcResult<(u32, Option<Mismatch>)> {
        let slice_type = if rng.coin() { SliceType::P } else { SliceType::I };
        fill_picture(&mut self.original, rng);
        self.enc.reset();
        self.dec.reset();
        self.recon.clear();

        // 编码
        let mut bw = BitWriter::new();
        let mut bits = 0;
        for i in 0..self.enc.len() {
            let mb = self.enc.mb_mut(i);
            choose_mode(mb, rng, slice_type, slice_qp, max_qp_drop);
            self.original.load_macroblock(mb)?;
            forward_residual(mb)?;
            bits += self.layer.encode(&mut self.enc, i, slice_type, slice_qp, &mut bw)?;
        }

        // 解码重建
        let len = bw.bits_written();
        let data = bw.finish();
        let mut br = BitReader::with_bit_len(&data, len)?;
        for i in 0..self.dec.len() {
            self.layer.decode(&mut self.dec, i, slice_type, slice_qp, &mut br)?;
            let mb = self.dec.mb_mut(i);
            inverse_residual(mb)?;
            self.recon.store_macroblock(mb)?;
        }

        Ok((bits, self.compare(quant_error_bound(slice_qp))))
    }

    fn compare(&self, bound: i32) -> Option<Mismatch> {
        for (a, b) in self.enc.iter().zip(self.dec.iter()) {
            let what = if a.mb_type != b.mb_type {
                "mb_type"
            } else if a.qp != b.qp {
                "qp"
            } else if a.intra && a.intra_chroma_pred_mode != b.intra_chroma_pred_mode {
                "intra_chroma_pred_mode"
            } else if !a.intra && a.mv != b.mv {
                "mv"
            } else {
                continue;
            };
            return Some(Mismatch::Syntax { mb: a.index, what });
        }

        for colour in [Colour::Luma, Colour::Cb, Colour::Cr] {
            let orig = self.original.plane(colour);
            let recon = self.recon.plane(colour);
            for (pos, (&o, &r)) in orig.iter().zip(recon).enumerate() {
                let error = (i32::from(o) - i32::from(r)).abs();
                if error > bound {
                    return Some(Mismatch::Sample {
                        colour,
                        pos,
                        error,
                        bound,
                    });
                }
            }
        }
        None
    }
}

/// 以随机中点和偏差填充图像, 色度偏差为亮度的一半
fn fill_picture(picture: &mut Yuv420Picture, rng: &mut Lcg) {
    let mid = rng.range(MIDPOINT_RANGE.0, MIDPOINT_RANGE.1);
    let dev = rng.range(0, MAX_DEVIATION);
    for (colour, spread) in [(Colour::Luma, dev / 2), (Colour::Cb, dev / 4), (Colour::Cr, dev / 4)] {
        for s in picture.plane_mut(colour).iter_mut() {
            let v = mid + rng.range(-spread, spread);
            *s = v.clamp(-SAMPLE_LIMIT, SAMPLE_LIMIT) as i16;
        }
    }
}

/// 为宏块随机选择 QP 与预测方式
fn choose_mode(mb: &mut Macroblock, rng: &mut Lcg, slice_type: SliceType, slice_qp: u8, max_qp_drop: u8) {
    let drop = rng.range(0, i32::from(max_qp_drop));
    mb.qp = (i32::from(slice_qp) - drop).clamp(0, i32::from(QP_MAX)) as u8;
    mb.intra = slice_type == SliceType::I || rng.coin();
    if mb.intra {
        mb.part_pred_mode = MbPartPredMode::Intra16x16;
        mb.intra16x16_pred_mode = rng.range(0, 3) as u8;
        mb.intra_chroma_pred_mode = rng.range(0, 3) as u8;
    } else {
        mb.part_pred_mode = MbPartPredMode::Inter16x16;
        let x = rng.range(MV_X_RANGE.0, MV_X_RANGE.1);
        let y = rng.range(MV_Y_RANGE.0, MV_Y_RANGE.1);
        mb.mv = MotionVector::new(x, y);
    }
}
