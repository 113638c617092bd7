//! H.264 NAL 单元与编解码头信息提取.
//!
//! # Annex B 格式
//!
//! NAL 单元由起始码分隔:
//! - 3 字节起始码: `00 00 01`
//! - 4 字节起始码: `00 00 00 01`
//!
//! # NAL 头部 (1 字节)
//! ```text
//! ┌──────────────────────────────────────┐
//! │ forbidden(1) | ref_idc(2) | type(5) │
//! └──────────────────────────────────────┘
//! ```
//!
//! [`CodecHeader`] 只看帧首的起始码与 NAL 头, 用来判断一帧是
//! IDR 图像、非 IDR 图像还是参数集.

use bytes::Bytes;
use log::{debug, warn};

use avc_core::{AvcError, AvcResult, BitReader, BitWriter};

/// 帧首至少需要的位数: 32 位起始码 + 8 位 NAL 头
pub const MIN_HEADER_BITS: usize = 32 + 8;

/// 4 字节起始码的值
const START_CODE: u32 = 0x0000_0001;

/// `get` 支持的头字段名
const FIELD_PICTURE_CODING_TYPE: &str = "picture coding type";

/// NAL 单元类型. 只区分宏块层关心的四种, 其余保留原始编号
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NalUnitType {
    /// 非 IDR 图像切片 (1)
    Slice,
    /// IDR 图像切片 (5)
    SliceIdr,
    /// 序列参数集 (7)
    Sps,
    /// 图像参数集 (8)
    Pps,
    /// 其他类型
    Other(u8),
}

impl NalUnitType {
    /// 从 5 位类型编号创建
    pub fn from_id(id: u8) -> Self {
        match id & 0x1F {
            1 => Self::Slice,
            5 => Self::SliceIdr,
            7 => Self::Sps,
            8 => Self::Pps,
            other => Self::Other(other),
        }
    }

    pub fn id(self) -> u8 {
        match self {
            Self::Slice => 1,
            Self::SliceIdr => 5,
            Self::Sps => 7,
            Self::Pps => 8,
            Self::Other(id) => id & 0x1F,
        }
    }
}

// ============================================================
// Annex B 拆分
// ============================================================

/// NAL 单元, 数据与输入缓冲区共享存储
#[derive(Debug, Clone)]
pub struct NalUnit {
    pub nal_type: NalUnitType,
    /// nal_ref_idc (0-3)
    pub ref_idc: u8,
    /// 不含起始码, 含 NAL 头字节
    pub data: Bytes,
}

impl NalUnit {
    /// 从含头字节的 NAL 数据解析
    pub fn parse(data: Bytes) -> AvcResult<Self> {
        let Some(&header) = data.first() else {
            return Err(AvcError::InvalidData("NAL 单元数据为空".into()));
        };
        if header & 0x80 != 0 {
            return Err(AvcError::InvalidData(format!(
                "forbidden_zero_bit 非法, header={:#04x}",
                header
            )));
        }
        Ok(Self {
            nal_type: NalUnitType::from_id(header),
            ref_idc: (header >> 5) & 0x03,
            data,
        })
    }

    /// NAL 头之后的载荷
    pub fn payload(&self) -> Bytes {
        self.data.slice(1..)
    }

    /// 去掉防竞争字节后的 RBSP
    pub fn rbsp(&self) -> Vec<u8> {
        remove_emulation_prevention(&self.data[1..])
    }
}

/// 组装一个带 4 字节起始码的 Annex B NAL 单元, 载荷按需插入防竞争字节.
///
/// `rbsp` 应以 rbsp_trailing_bits 结尾 (最后一个字节非零).
pub fn build_annex_b_nal(nal_type: NalUnitType, ref_idc: u8, rbsp: &[u8]) -> Vec<u8> {
    let header = ((ref_idc & 0x03) << 5) | nal_type.id();
    let mut out = Vec::with_capacity(rbsp.len() + rbsp.len() / 64 + 5);
    out.extend_from_slice(&[0x00, 0x00, 0x00, 0x01, header]);
    out.extend(insert_emulation_prevention(rbsp));
    out
}

/// 写 rbsp_trailing_bits: 停止位 1, 然后补零到字节边界
pub fn write_rbsp_trailing_bits(bw: &mut BitWriter) -> AvcResult<()> {
    bw.write_bit(1)?;
    bw.align_to_byte();
    Ok(())
}

/// 在 RBSP 中插入防竞争字节: 连续两个 0x00 之后若为 0x00..=0x03, 先插入 0x03
pub fn insert_emulation_prevention(rbsp: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(rbsp.len() + rbsp.len() / 64);
    let mut zeros = 0;
    for &b in rbsp {
        if zeros >= 2 && b <= 0x03 {
            out.push(0x03);
            zeros = 0;
        }
        out.push(b);
        zeros = if b == 0x00 { zeros + 1 } else { 0 };
    }
    out
}

/// 移除防竞争字节 (`00 00 03` -> `00 00`)
pub fn remove_emulation_prevention(data: &[u8]) -> Vec<u8> {
    let mut rbsp = Vec::with_capacity(data.len());
    let mut zeros = 0;
    for &b in data {
        if zeros >= 2 && b == 0x03 {
            zeros = 0;
            continue;
        }
        rbsp.push(b);
        zeros = if b == 0x00 { zeros + 1 } else { 0 };
    }
    rbsp
}

/// 从 Annex B 字节流拆出全部 NAL 单元 (不含起始码).
///
/// 非法的 NAL 头被跳过.
pub fn split_annex_b(data: &Bytes) -> Vec<NalUnit> {
    let offsets = find_start_codes(data);
    let mut nalus = Vec::with_capacity(offsets.len());

    for (i, &start) in offsets.iter().enumerate() {
        let end = offsets.get(i + 1).copied().unwrap_or(data.len());
        let nal_start = skip_start_code(data, start);

        // 去掉尾部补零
        let mut nal_end = end;
        while nal_end > nal_start && data[nal_end - 1] == 0x00 {
            nal_end -= 1;
        }
        if nal_end <= nal_start {
            continue;
        }

        match NalUnit::parse(data.slice(nal_start..nal_end)) {
            Ok(nalu) => nalus.push(nalu),
            Err(e) => warn!("跳过 NAL 单元 @{}: {}", start, e),
        }
    }
    nalus
}

/// 起始码位置 (指向起始码第一个字节, 4 字节起始码包含前导零)
fn find_start_codes(data: &[u8]) -> Vec<usize> {
    let mut offsets = Vec::new();
    let mut i = 0;
    while i + 2 < data.len() {
        if data[i] == 0 && data[i + 1] == 0 && data[i + 2] == 1 {
            let start = if i > 0 && data[i - 1] == 0 { i - 1 } else { i };
            offsets.push(start);
            i += 3;
        } else {
            i += 1;
        }
    }
    offsets
}

fn skip_start_code(data: &[u8], pos: usize) -> usize {
    if data[pos..].starts_with(&[0, 0, 0, 1]) {
        pos + 4
    } else {
        pos + 3
    }
}

// ============================================================
// 编解码头
// ============================================================

/// 帧的图像编码类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PictureCodingType {
    Intra,
    Inter,
    SequenceParams,
    PictureParams,
}

impl PictureCodingType {
    /// 对外的数值编码
    pub fn value(self) -> i32 {
        match self {
            Self::Intra => 0,
            Self::Inter => 1,
            Self::SequenceParams => 2,
            Self::PictureParams => 3,
        }
    }
}

/// 从帧首提取的头信息
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CodecHeader {
    pub ref_idc: u8,
    pub nal_type: NalUnitType,
    pub picture_coding_type: PictureCodingType,
}

impl Default for CodecHeader {
    fn default() -> Self {
        Self {
            ref_idc: 0,
            nal_type: NalUnitType::SliceIdr,
            picture_coding_type: PictureCodingType::Intra,
        }
    }
}

impl CodecHeader {
    /// 从帧首 `bit_len` 位中提取头信息.
    ///
    /// 只接受 IDR 切片、非 IDR 切片、SPS 与 PPS, 其余类型调用方应丢弃该帧.
    pub fn extract(stream: &[u8], bit_len: usize) -> AvcResult<Self> {
        if bit_len < MIN_HEADER_BITS {
            return Err(AvcError::HeaderParse(format!(
                "帧头过短: {} 位, 至少需要 {} 位",
                bit_len, MIN_HEADER_BITS
            )));
        }
        let mut br = BitReader::with_bit_len(stream, bit_len)?;

        let start_code = br.read_bits(32)?;
        if start_code != START_CODE {
            warn!("帧首起始码异常: {:#010x}", start_code);
        }
        if br.read_bit()? != 0 {
            return Err(AvcError::HeaderParse("forbidden_zero_bit 为 1".into()));
        }
        let ref_idc = br.read_bits(2)? as u8;
        let nal_type = NalUnitType::from_id(br.read_bits(5)? as u8);

        let picture_coding_type = match nal_type {
            NalUnitType::SliceIdr => PictureCodingType::Intra,
            NalUnitType::Slice => PictureCodingType::Inter,
            NalUnitType::Sps => PictureCodingType::SequenceParams,
            NalUnitType::Pps => PictureCodingType::PictureParams,
            other => {
                return Err(AvcError::HeaderParse(format!(
                    "不支持的 NAL 单元类型: {}",
                    other.id()
                )));
            }
        };
        debug!(
            "帧头: nal_type={:?}, ref_idc={}, coding_type={:?}",
            nal_type, ref_idc, picture_coding_type
        );

        Ok(Self {
            ref_idc,
            nal_type,
            picture_coding_type,
        })
    }

    /// 按名称取头字段 (不区分大小写, 允许前缀).
    ///
    /// 目前只有 "picture coding type".
    pub fn get(&self, name: &str) -> Option<i32> {
        let field = FIELD_PICTURE_CODING_TYPE;
        let is_prefix = !name.is_empty()
            && name.len() <= field.len()
            && field.as_bytes()[..name.len()].eq_ignore_ascii_case(name.as_bytes());
        is_prefix.then(|| self.picture_coding_type.value())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(header: u8) -> Vec<u8> {
        vec![0x00, 0x00, 0x00, 0x01, header, 0x88, 0x84]
    }

    #[test]
    fn test_nal_type_mapping() {
        for (id, t) in [
            (1, NalUnitType::Slice),
            (5, NalUnitType::SliceIdr),
            (7, NalUnitType::Sps),
            (8, NalUnitType::Pps),
        ] {
            assert_eq!(NalUnitType::from_id(id), t);
            assert_eq!(t.id(), id);
        }
        assert_eq!(NalUnitType::from_id(9), NalUnitType::Other(9));
        assert_eq!(NalUnitType::Other(6).id(), 6);
        // 高位 (forbidden 与 ref_idc) 不影响类型
        assert_eq!(NalUnitType::from_id(0x65), NalUnitType::SliceIdr);
    }

    #[test]
    fn test_extract_picture_types() {
        let cases = [
            (0x65, PictureCodingType::Intra, 3),
            (0x41, PictureCodingType::Inter, 2),
            (0x67, PictureCodingType::SequenceParams, 3),
            (0x68, PictureCodingType::PictureParams, 3),
        ];
        for (header, expected, ref_idc) in cases {
            let data = frame(header);
            let h = CodecHeader::extract(&data, data.len() * 8).unwrap();
            assert_eq!(h.picture_coding_type, expected);
            assert_eq!(h.ref_idc, ref_idc);
            assert_eq!(h.get("picture coding type"), Some(expected.value()));
        }
    }

    #[test]
    fn test_extract_rejects_other_types() {
        // SEI
        let data = frame(0x06);
        assert!(matches!(
            CodecHeader::extract(&data, 56),
            Err(AvcError::HeaderParse(_))
        ));
    }

    #[test]
    fn test_extract_requires_forty_bits() {
        let data = frame(0x65);
        assert!(matches!(
            CodecHeader::extract(&data, 39),
            Err(AvcError::HeaderParse(_))
        ));
        assert!(CodecHeader::extract(&data, 40).is_ok());
    }

    #[test]
    fn test_extract_rejects_forbidden_bit() {
        // 0xE5: forbidden_zero_bit=1, ref_idc=3, type=5
        let data = frame(0xE5);
        assert!(matches!(
            CodecHeader::extract(&data, data.len() * 8),
            Err(AvcError::HeaderParse(_))
        ));
    }

    #[test]
    fn test_get_field_names() {
        let h = CodecHeader {
            picture_coding_type: PictureCodingType::Inter,
            ..Default::default()
        };
        assert_eq!(h.get("Picture Coding Type"), Some(1));
        assert_eq!(h.get("picture"), Some(1));
        assert_eq!(h.get("width"), None);
        assert_eq!(h.get(""), None);
    }

    #[test]
    fn test_emulation_prevention() {
        let rbsp = [0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x00, 0x00, 0x04, 0x80];
        let escaped = insert_emulation_prevention(&rbsp);
        assert_eq!(
            escaped,
            [0x00, 0x00, 0x03, 0x01, 0x00, 0x00, 0x03, 0x00, 0x00, 0x03, 0x00, 0x04, 0x80]
        );
        assert_eq!(remove_emulation_prevention(&escaped), rbsp);
    }

    #[test]
    fn test_build_nal_with_trailing_bits() {
        let mut bw = BitWriter::new();
        bw.write_bits(0b101, 3).unwrap();
        write_rbsp_trailing_bits(&mut bw).unwrap();
        assert_eq!(bw.bits_written(), 8);
        let rbsp = bw.finish();
        assert_eq!(rbsp, [0b1011_0000]);

        let nal = build_annex_b_nal(NalUnitType::Slice, 2, &rbsp);
        assert_eq!(nal, [0x00, 0x00, 0x00, 0x01, 0x41, 0xB0]);
        let h = CodecHeader::extract(&nal, nal.len() * 8).unwrap();
        assert_eq!(h.picture_coding_type, PictureCodingType::Inter);
    }

    #[test]
    fn test_split_annex_b() {
        let stream = Bytes::from_static(&[
            0x00, 0x00, 0x00, 0x01, 0x67, 0x42, 0x00, // SPS
            0x00, 0x00, 0x01, 0x68, 0xCE, // PPS
            0x00, 0x00, 0x01, 0x80, 0x00, // forbidden 位非法
            0x00, 0x00, 0x00, 0x01, 0x65, 0x88, 0x00, 0x00,
        ]);
        let nalus = split_annex_b(&stream);
        assert_eq!(nalus.len(), 3);
        assert_eq!(nalus[0].nal_type, NalUnitType::Sps);
        assert_eq!(&nalus[0].data[..], &[0x67, 0x42]);
        assert_eq!(nalus[1].nal_type, NalUnitType::Pps);
        assert_eq!(&nalus[1].payload()[..], &[0xCE]);
        assert_eq!(nalus[2].nal_type, NalUnitType::SliceIdr);
        assert_eq!(nalus[2].ref_idc, 3);
        assert_eq!(&nalus[2].data[..], &[0x65, 0x88]);
    }
}
