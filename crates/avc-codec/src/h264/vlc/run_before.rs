//! run_before 码表 (H.264 表 9-10).
//!
//! 符号为 (run_before, zerosLeft). zerosLeft 大于 6 时共用最后一行, run_before 最大为 14.

use avc_core::{AvcError, AvcResult, BitReader, BitWriter};

use super::{VlcCode, decode_symbol};

/// 按 `[min(zerosLeft, 7) - 1][run_before]` 索引, 格式 (位数, 码字)
const RUN_BEFORE: [&[(u8, u8)]; 7] = [
    &[(1, 1), (1, 0)],
    &[(1, 1), (2, 1), (2, 0)],
    &[(2, 3), (2, 2), (2, 1), (2, 0)],
    &[(2, 3), (2, 2), (2, 1), (3, 1), (3, 0)],
    &[(2, 3), (2, 2), (3, 3), (3, 2), (3, 1), (3, 0)],
    &[(2, 3), (3, 0), (3, 1), (3, 3), (3, 2), (3, 5), (3, 4)],
    &[
        (3, 7), (3, 6), (3, 5), (3, 4), (3, 3), (3, 2), (3, 1), (4, 1),
        (5, 1), (6, 1), (7, 1), (8, 1), (9, 1), (10, 1), (11, 1),
    ],
];

fn row(zeros_left: u8) -> Option<&'static [(u8, u8)]> {
    if zeros_left == 0 {
        return None;
    }
    Some(RUN_BEFORE[usize::from(zeros_left.min(7) - 1)])
}

/// 查询码字, 非法组合返回 [`VlcCode::NONE`]
pub fn run_before_code(run_before: u8, zeros_left: u8) -> VlcCode {
    if run_before > zeros_left {
        return VlcCode::NONE;
    }
    row(zeros_left)
        .and_then(|r| r.get(usize::from(run_before)))
        .map_or(VlcCode::NONE, |&(len, code)| {
            VlcCode::new(len, u32::from(code))
        })
}

/// 编码 run_before, 返回写入的位数
pub fn encode_run_before(bw: &mut BitWriter, run_before: u8, zeros_left: u8) -> AvcResult<u32> {
    let vlc = run_before_code(run_before, zeros_left);
    if !vlc.is_valid() {
        return Err(AvcError::VlcTableMiss(format!(
            "run_before 不支持: run_before={}, zerosLeft={}",
            run_before, zeros_left
        )));
    }
    vlc.write(bw)
}

/// 解码 run_before
pub fn decode_run_before(br: &mut BitReader, zeros_left: u8) -> AvcResult<u8> {
    let r = row(zeros_left).ok_or_else(|| {
        AvcError::VlcTableMiss(format!("run_before 无对应码表: zerosLeft={}", zeros_left))
    })?;
    let candidates = r
        .iter()
        .enumerate()
        .take(usize::from(zeros_left) + 1)
        .map(|(run, &(len, code))| (VlcCode::new(len, u32::from(code)), run as u8));
    decode_symbol(br, candidates, "run_before")
}
