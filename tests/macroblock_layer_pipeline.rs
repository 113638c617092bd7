//! 宏块层端到端集成测试: 变换量化 -> 宏块层编码 -> Annex B 封装 -> 拆分 -> 解码重建

use bytes::Bytes;

use avc::codec::h264::{
    CodecHeader, MacroblockGrid, MacroblockLayer, MbPartPredMode, MotionVector, NalUnitType,
    PictureCodingType, SelfTestParams, SliceType, Yuv420Picture, build_annex_b_nal,
    forward_residual, inverse_residual, quant_error_bound, run_self_test, split_annex_b,
    write_rbsp_trailing_bits,
};
use avc::core::{AvcError, BitReader, BitWriter};

const COLS: usize = 4;
const ROWS: usize = 3;

// ============================================================
// 辅助函数
// ============================================================

/// 构造带纹理的合成图像
fn synthetic_picture(phase: i32) -> Yuv420Picture {
    let mut pic = Yuv420Picture::new(COLS * 16, ROWS * 16).unwrap();
    for colour in [
        avc::codec::h264::Colour::Luma,
        avc::codec::h264::Colour::Cb,
        avc::codec::h264::Colour::Cr,
    ] {
        let (w, _) = pic.plane_size(colour);
        let luma = colour == avc::codec::h264::Colour::Luma;
        for (i, s) in pic.plane_mut(colour).iter_mut().enumerate() {
            let (x, y) = ((i % w) as i32, (i / w) as i32);
            *s = if luma {
                ((x * 5 + y * 3 + phase) % 97 - 48) as i16
            } else {
                ((x * 2 + y * 7 + phase) % 41 - 20) as i16
            };
        }
    }
    pic
}

/// 逐宏块设置编码参数: P 条带中奇数宏块为帧间
fn configure(grid: &mut MacroblockGrid, slice_type: SliceType, slice_qp: u8) {
    for i in 0..grid.len() {
        let mb = grid.mb_mut(i);
        mb.qp = slice_qp - (i % 3) as u8;
        if slice_type == SliceType::P && i % 2 == 1 {
            mb.intra = false;
            mb.part_pred_mode = MbPartPredMode::Inter16x16;
            mb.mv = MotionVector::new(i as i32 * 4 - 10, 3 - i as i32);
        } else {
            mb.intra = true;
            mb.part_pred_mode = MbPartPredMode::Intra16x16;
            mb.intra16x16_pred_mode = (i % 4) as u8;
            mb.intra_chroma_pred_mode = ((i + 1) % 4) as u8;
        }
    }
}

/// 编码一帧, 返回 (RBSP, 宏块层位数, 编码端网格)
fn encode_frame(
    pic: &mut Yuv420Picture,
    slice_type: SliceType,
    slice_qp: u8,
) -> (Vec<u8>, usize, MacroblockGrid) {
    let layer = MacroblockLayer::new();
    let mut grid = MacroblockGrid::new(COLS, ROWS).unwrap();
    configure(&mut grid, slice_type, slice_qp);

    let mut bw = BitWriter::new();
    for i in 0..grid.len() {
        let mb = grid.mb_mut(i);
        pic.load_macroblock(mb).unwrap();
        forward_residual(mb).unwrap();
        layer.encode(&mut grid, i, slice_type, slice_qp, &mut bw).unwrap();
    }
    let bits = bw.bits_written();
    write_rbsp_trailing_bits(&mut bw).unwrap();
    (bw.finish(), bits, grid)
}

/// 解码一帧, 返回 (解码端网格, 重建图像)
fn decode_frame(
    rbsp: &[u8],
    bits: usize,
    slice_type: SliceType,
    slice_qp: u8,
) -> Result<(MacroblockGrid, Yuv420Picture), AvcError> {
    let layer = MacroblockLayer::new();
    let mut grid = MacroblockGrid::new(COLS, ROWS)?;
    let mut recon = Yuv420Picture::new(COLS * 16, ROWS * 16)?;
    let mut br = BitReader::with_bit_len(rbsp, bits)?;
    for i in 0..grid.len() {
        layer.decode(&mut grid, i, slice_type, slice_qp, &mut br)?;
        let mb = grid.mb_mut(i);
        inverse_residual(mb)?;
        recon.store_macroblock(mb)?;
    }
    assert!(br.is_eof(), "宏块层数据应恰好读完");
    Ok((grid, recon))
}

fn max_error(a: &Yuv420Picture, b: &Yuv420Picture) -> i32 {
    [
        avc::codec::h264::Colour::Luma,
        avc::codec::h264::Colour::Cb,
        avc::codec::h264::Colour::Cr,
    ]
    .into_iter()
    .flat_map(|c| {
        a.plane(c)
            .iter()
            .zip(b.plane(c))
            .map(|(&x, &y)| (i32::from(x) - i32::from(y)).abs())
            .collect::<Vec<_>>()
    })
    .max()
    .unwrap_or(0)
}

// ============================================================
// 端到端
// ============================================================

#[test]
fn test_annex_b_stream_roundtrip() {
    let _ = env_logger::builder().is_test(true).try_init();

    let frames = [(SliceType::I, 28u8, 0), (SliceType::P, 22u8, 11)];
    let mut stream = Vec::new();
    stream.extend(build_annex_b_nal(NalUnitType::Sps, 3, &[0x42, 0x00, 0x1E, 0x80]));
    stream.extend(build_annex_b_nal(NalUnitType::Pps, 3, &[0xCE, 0x38, 0x80]));

    let mut encoded = Vec::new();
    for &(slice_type, slice_qp, phase) in &frames {
        let mut pic = synthetic_picture(phase);
        let (rbsp, bits, grid) = encode_frame(&mut pic, slice_type, slice_qp);
        let nal_type = if slice_type == SliceType::I {
            NalUnitType::SliceIdr
        } else {
            NalUnitType::Slice
        };
        stream.extend(build_annex_b_nal(nal_type, 2, &rbsp));
        encoded.push((pic, bits, grid));
    }

    let stream = Bytes::from(stream);
    let nalus = split_annex_b(&stream);
    assert_eq!(nalus.len(), 4);

    let expected_types = [
        PictureCodingType::SequenceParams,
        PictureCodingType::PictureParams,
        PictureCodingType::Intra,
        PictureCodingType::Inter,
    ];
    for (nalu, expected) in nalus.iter().zip(expected_types) {
        let mut frame = vec![0x00, 0x00, 0x00, 0x01];
        frame.extend_from_slice(&nalu.data);
        let header = CodecHeader::extract(&frame, frame.len() * 8).unwrap();
        assert_eq!(header.picture_coding_type, expected);
        assert_eq!(header.get("picture coding type"), Some(expected.value()));
    }

    for (k, nalu) in nalus[2..].iter().enumerate() {
        let (slice_type, slice_qp, _) = frames[k];
        let (original, bits, enc) = &encoded[k];
        let (dec, recon) = decode_frame(&nalu.rbsp(), *bits, slice_type, slice_qp).unwrap();

        for i in 0..enc.len() {
            let (a, b) = (enc.mb(i), dec.mb(i));
            assert_eq!(a.mb_type, b.mb_type, "帧 {} 宏块 {}", k, i);
            assert_eq!(a.qp, b.qp, "帧 {} 宏块 {}", k, i);
            assert_eq!(a.intra, b.intra);
            if a.intra {
                assert_eq!(a.intra_chroma_pred_mode, b.intra_chroma_pred_mode);
                assert_eq!(a.intra16x16_pred_mode, b.intra16x16_pred_mode);
            } else {
                assert_eq!(a.mv, b.mv);
            }
        }
        let err = max_error(original, &recon);
        assert!(
            err <= quant_error_bound(slice_qp),
            "帧 {} 重建误差 {} 超过 {}",
            k,
            err,
            quant_error_bound(slice_qp)
        );
    }
}

#[test]
fn test_truncated_slice_is_stream_exhausted() {
    let mut pic = synthetic_picture(5);
    let (rbsp, bits, _) = encode_frame(&mut pic, SliceType::I, 20);
    let err = decode_frame(&rbsp, bits / 2, SliceType::I, 20).unwrap_err();
    assert!(matches!(err, AvcError::StreamExhausted { .. }), "实际错误: {err}");
}

#[test]
fn test_header_rejects_unsupported_nal() {
    let aud = build_annex_b_nal(NalUnitType::Other(9), 0, &[0xF0]);
    assert!(matches!(
        CodecHeader::extract(&aud, aud.len() * 8),
        Err(AvcError::HeaderParse(_))
    ));
}

// ============================================================
// 自检
// ============================================================

#[test]
fn test_self_test_prefix_passes() {
    let params = SelfTestParams {
        trials: 52,
        ..Default::default()
    };
    let report = run_self_test(&params).unwrap();
    assert_eq!(report.trials, 52);
    assert_eq!(report.failures, 0);
    assert!(report.passed());
}

#[test]
fn test_self_test_default_scenario() {
    let report = run_self_test(&SelfTestParams::default()).unwrap();
    assert_eq!(report.trials, 1024);
    assert!(report.passed(), "失败 {} 轮", report.failures);
}

#[test]
fn test_self_test_is_reproducible() {
    let params = SelfTestParams {
        trials: 8,
        seed: 99,
        mb_cols: 2,
        mb_rows: 2,
        ..Default::default()
    };
    let a = run_self_test(&params).unwrap();
    let b = run_self_test(&params).unwrap();
    assert_eq!(a, b);
    assert!(a.total_bits > 0);
}
