// Copyright (c) 2024, The cuquad contributors. All rights reserved
//
// This source code is subject to the terms of the BSD 2 Clause License and
// the Alliance for Open Media Patent License 1.0. If the BSD 2 Clause License
// was not distributed with this source code in the LICENSE file, you can
// obtain it at www.aomedia.org/license/software. If the Alliance for Open
// Media Patent License 1.0 was not distributed with this source code in the
// PATENTS file, you can obtain it at www.aomedia.org/license/patent.

//! Residual coding of a CU: transform, quantization and reconstruction of
//! every transform block of its tree.

use crate::cu::*;
use crate::encoder::tu::*;
use crate::encoder::FrameInvariants;
use crate::frame::*;
use crate::partition::*;
use crate::predict::*;
use crate::primitives::Primitives;
use crate::quantize::*;
use crate::scan_order::CHROMA_422_MODE_MAP;
use crate::transform::MAX_TX_SQUARE;
use crate::util::*;
use crate::yuv::Yuv;

/// Quantizer set up of a CU.
pub struct TuCoder<'a, T: Pixel> {
  pub prims: &'a Primitives<T>,
  pub bit_depth: usize,
  pub qp_luma: i32,
  pub qp_chroma: i32,
  pub is_intra: bool,
  /// Lossless coding: the residual is its own coefficient block.
  pub bypass: bool,
}

impl<'a, T: Pixel> TuCoder<'a, T> {
  pub fn new(
    fi: &FrameInvariants, prims: &'a Primitives<T>, is_intra: bool,
    bypass: bool,
  ) -> Self {
    TuCoder {
      prims,
      bit_depth: fi.bit_depth,
      qp_luma: fi.qp,
      qp_chroma: chroma_qp(fi.qp, fi.chroma_sampling),
      is_intra,
      bypass,
    }
  }

  /// Codes the `2^log2` block `org - pred` into `coeffs` and writes its
  /// reconstruction to `rec`. Returns whether any level is nonzero.
  pub fn code_block(
    &self, org: &[T], org_stride: usize, pred: &[T], pred_stride: usize,
    rec: &mut [T], rec_stride: usize, coeffs: &mut [i32], log2: usize,
    luma: bool,
  ) -> bool {
    let n = 1 << log2;
    let mut residual = [0i16; MAX_TX_SQUARE];
    for y in 0..n {
      for x in 0..n {
        residual[y * n + x] = (org[y * org_stride + x].to_i32()
          - pred[y * pred_stride + x].to_i32())
          as i16;
      }
    }

    if self.bypass {
      let mut nonzero = false;
      for i in 0..n * n {
        coeffs[i] = residual[i] as i32;
        nonzero |= coeffs[i] != 0;
      }
      for y in 0..n {
        rec[y * rec_stride..][..n]
          .copy_from_slice(&org[y * org_stride..][..n]);
      }
      return nonzero;
    }

    let use_dst = luma && self.is_intra && log2 == 2;
    let mut tcoeffs = [0i32; MAX_TX_SQUARE];
    let mut delta_u = [0i32; MAX_TX_SQUARE];
    let bd = self.bit_depth;
    self.prims.forward(&residual, &mut tcoeffs, n, log2, bd, use_dst);

    let qp = if luma { self.qp_luma } else { self.qp_chroma };
    let mut qc = QuantizationContext::default();
    qc.update(qp, log2, self.is_intra, bd);
    let num_sig = qc.quantize(&tcoeffs, &mut coeffs[..n * n], &mut delta_u);

    if num_sig == 0 {
      for y in 0..n {
        rec[y * rec_stride..][..n]
          .copy_from_slice(&pred[y * pred_stride..][..n]);
      }
      return false;
    }

    qc.dequantize(&coeffs[..n * n], &mut tcoeffs);
    self.prims.inverse(&tcoeffs, &mut residual, n, log2, bd, use_dst);
    for y in 0..n {
      for x in 0..n {
        rec[y * rec_stride + x] = T::clip(
          pred[y * pred_stride + x].to_i32() + residual[y * n + x] as i32,
          self.bit_depth,
        );
      }
    }
    true
  }
}

/// Sum of squared errors of every plane of `a` against `b`.
pub fn yuv_sse<T: Pixel>(
  prims: &Primitives<T>, a: &Yuv<T>, b: &Yuv<T>,
) -> u64 {
  (0..3)
    .map(|p| {
      let (xd, yd) = a.dec(p);
      let (w, h) = ((1 << a.log2) >> xd, (1 << a.log2) >> yd);
      prims.sse(w, h, &a.planes[p], a.stride(p), &b.planes[p], b.stride(p))
    })
    .sum()
}

/// Codes the residual of an inter CU whose prediction is in `cu.pred`,
/// using the shallowest legal transform tree. Sets the transform depth,
/// the coded block flags and the distortion.
pub fn encode_inter_residual<T: Pixel>(
  fi: &FrameInvariants, coder: &TuCoder<T>, cu: &mut CodingUnit<T>,
  org: &Yuv<T>,
) {
  let log2_cu = cu.geom.log2_size;
  let p0 = cu.parts[0];
  let tr_idx = min_tr_idx(fi, log2_cu, p0.pred_mode, p0.part_size);
  cu.update_parts(0, cu.num_parts(), |p| {
    p.tr_idx = tr_idx as u8;
    p.cbf = [0; 3];
  });

  for (rel, log2) in luma_leaves(log2_cu, tr_idx) {
    let (x, y) = zscan_to_raster(rel);
    let n = 1 << (2 * (log2 - PART_LOG2));
    let reco_stride = cu.reco.stride(0);
    let nz = coder.code_block(
      org.at(0, x, y),
      org.stride(0),
      cu.pred.at(0, x, y),
      cu.pred.stride(0),
      cu.reco.at_mut(0, x, y),
      reco_stride,
      &mut cu.coeff[0][rel * coeffs_per_part(0, 0, 0)..],
      log2,
      true,
    );
    set_cbf(&mut cu.parts[rel..rel + n], 0, tr_idx, nz);
  }
  propagate_cbf(&mut cu.parts, 0, tr_idx);

  let mut chroma_depth = tr_idx;
  for tu in chroma_tus(fi, log2_cu, tr_idx) {
    chroma_depth = tu.tr_depth;
    for comp in 1..3 {
      let per = coeffs_per_part(comp, fi.xdec, fi.ydec);
      let mut cursor = tu.cursor();
      loop {
        let abs = cursor.abs_part;
        let (x, y) = chroma_block_origin(fi, &tu, &cursor);
        let reco_stride = cu.reco.stride(comp);
        let nz = coder.code_block(
          org.at(comp, x, y),
          org.stride(comp),
          cu.pred.at(comp, x, y),
          cu.pred.stride(comp),
          cu.reco.at_mut(comp, x, y),
          reco_stride,
          &mut cu.coeff[comp][abs * per..],
          tu.log2c,
          false,
        );
        let parts = &mut cu.parts[abs..abs + cursor.part_step];
        set_cbf(parts, comp, tu.tr_depth, nz);
        if !cursor.next_section() {
          break;
        }
      }
    }
  }
  for comp in 1..3 {
    propagate_cbf(&mut cu.parts, comp, chroma_depth);
  }

  cu.distortion = yuv_sse(coder.prims, &cu.reco, org);
}

/// Luma offset, relative to the CU, of the chroma block at `cursor`.
pub fn chroma_block_origin(
  fi: &FrameInvariants, tu: &ChromaTu, cursor: &TuCursor,
) -> (usize, usize) {
  let (x, y) = zscan_to_raster(tu.rel);
  // 4:2:2 halves are stacked; chroma rows are luma rows there
  let dy = cursor.section << tu.log2c << fi.ydec;
  (x, y + dy)
}

/// Direction used by chroma of the partition `p`.
pub fn chroma_pred_dir(fi: &FrameInvariants, p: &PartInfo) -> u8 {
  let dir = chroma_dir(p.chroma_idx, p.luma_dir);
  if fi.is_422() {
    CHROMA_422_MODE_MAP[dir as usize]
  } else {
    dir
  }
}

/// Predicts, codes and reconstructs one intra luma transform block. The
/// reconstruction lands in both `cu.reco` and `rec`.
pub fn code_intra_luma_tu<T: Pixel>(
  coder: &TuCoder<T>, rec: &mut Frame<T>, store: &CuStore,
  cu: &mut CodingUnit<T>, org: &Yuv<T>, rel: usize, log2: usize,
) -> bool {
  let (x, y) = zscan_to_raster(rel);
  let (px, py) = (cu.geom.x + x, cu.geom.y + y);
  let n = 1 << log2;
  let dir = cu.parts[rel].luma_dir;
  let edge = {
    let view = CuView::with_cu(store, &cu.geom, &cu.parts, rel);
    IntraEdge::new(&rec.planes[0], px, py, log2, coder.bit_depth, |a, b| {
      view.sample_available(a, b, 0, 0)
    })
  };
  let stride = cu.pred.stride(0);
  predict_intra(
    cu.pred.at_mut(0, x, y),
    stride,
    &edge,
    dir,
    log2,
    coder.bit_depth,
    true,
    false,
  );
  let reco_stride = cu.reco.stride(0);
  let nz = coder.code_block(
    org.at(0, x, y),
    org.stride(0),
    cu.pred.at(0, x, y),
    stride,
    cu.reco.at_mut(0, x, y),
    reco_stride,
    &mut cu.coeff[0][rel * coeffs_per_part(0, 0, 0)..],
    log2,
    true,
  );
  rec.planes[0].write_block(px, py, n, n, cu.reco.at(0, x, y), stride);
  nz
}

/// Predicts, codes and reconstructs every chroma block of an intra CU in
/// coding order, setting the chroma coded block flags.
pub fn code_intra_chroma<T: Pixel>(
  fi: &FrameInvariants, coder: &TuCoder<T>, rec: &mut Frame<T>,
  store: &CuStore, cu: &mut CodingUnit<T>, org: &Yuv<T>,
) {
  let log2_cu = cu.geom.log2_size;
  let tr_idx = cu.parts[0].tr_idx as usize;
  let mut chroma_depth = tr_idx;
  for tu in chroma_tus(fi, log2_cu, tr_idx) {
    chroma_depth = tu.tr_depth;
    let dir = chroma_pred_dir(fi, &cu.parts[tu.rel]);
    let n = 1 << tu.log2c;
    for comp in 1..3 {
      let per = coeffs_per_part(comp, fi.xdec, fi.ydec);
      let mut cursor = tu.cursor();
      loop {
        let abs = cursor.abs_part;
        let (x, y) = chroma_block_origin(fi, &tu, &cursor);
        let cx = (cu.geom.x + x) >> fi.xdec;
        let cy = (cu.geom.y + y) >> fi.ydec;
        let edge = {
          let view = CuView::with_cu(store, &cu.geom, &cu.parts, abs);
          IntraEdge::new(
            &rec.planes[comp],
            cx,
            cy,
            tu.log2c,
            coder.bit_depth,
            |a, b| view.sample_available(a, b, fi.xdec, fi.ydec),
          )
        };
        let stride = cu.pred.stride(comp);
        predict_intra(
          cu.pred.at_mut(comp, x, y),
          stride,
          &edge,
          dir,
          tu.log2c,
          coder.bit_depth,
          false,
          fi.is_444(),
        );
        let reco_stride = cu.reco.stride(comp);
        let nz = coder.code_block(
          org.at(comp, x, y),
          org.stride(comp),
          cu.pred.at(comp, x, y),
          stride,
          cu.reco.at_mut(comp, x, y),
          reco_stride,
          &mut cu.coeff[comp][abs * per..],
          tu.log2c,
          false,
        );
        let reco = cu.reco.at(comp, x, y);
        rec.planes[comp].write_block(cx, cy, n, n, reco, stride);
        let parts = &mut cu.parts[abs..abs + cursor.part_step];
        set_cbf(parts, comp, tu.tr_depth, nz);
        if !cursor.next_section() {
          break;
        }
      }
    }
  }
  for comp in 1..3 {
    propagate_cbf(&mut cu.parts, comp, chroma_depth);
  }
}

#[cfg(test)]
mod test {
  use super::*;
  use crate::api::*;
  use rand::{Rng, SeedableRng};
  use rand_chacha::ChaCha8Rng;

  fn fi(cs: ChromaSampling) -> FrameInvariants {
    let config = EncoderConfig {
      width: 64,
      height: 64,
      chroma_sampling: cs,
      qp: 22,
      slice_type: SliceType::P,
      ref_count: [1, 0],
      ..Default::default()
    };
    FrameInvariants::new(config, 1).unwrap()
  }

  fn noisy_yuv(log2: usize, cs: ChromaSampling, seed: u64) -> Yuv<u8> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut yuv = Yuv::new(log2, cs);
    for p in &mut yuv.planes {
      p.iter_mut().for_each(|v| *v = rng.gen_range(60..200));
    }
    yuv
  }

  #[test]
  fn bypass_reconstructs_exactly() {
    let prims = Primitives::<u8>::new();
    let f = fi(ChromaSampling::Cs420);
    let coder = TuCoder::new(&f, &prims, false, true);
    let org = noisy_yuv(3, ChromaSampling::Cs420, 1);
    let pred = Yuv::<u8>::new(3, ChromaSampling::Cs420);
    let mut rec = [0u8; 64];
    let mut coeffs = [0i32; 64];
    assert!(coder.code_block(
      &org.planes[0],
      8,
      &pred.planes[0],
      8,
      &mut rec,
      8,
      &mut coeffs,
      3,
      true
    ));
    assert_eq!(&rec[..], &org.planes[0][..]);
    assert_eq!(coeffs[5], org.planes[0][5] as i32);
  }

  #[test]
  fn exact_prediction_codes_nothing() {
    let prims = Primitives::<u8>::new();
    let f = fi(ChromaSampling::Cs420);
    let coder = TuCoder::new(&f, &prims, true, false);
    let org = noisy_yuv(4, ChromaSampling::Cs420, 2);
    let mut rec = [0u8; 256];
    let mut coeffs = [7i32; 256];
    assert!(!coder.code_block(
      &org.planes[0],
      16,
      &org.planes[0],
      16,
      &mut rec,
      16,
      &mut coeffs,
      4,
      true
    ));
    assert!(coeffs.iter().all(|&c| c == 0));
    assert_eq!(&rec[..], &org.planes[0][..]);
  }

  #[test]
  fn inter_residual_sets_consistent_flags() {
    let prims = Primitives::<u8>::new();
    for cs in
      [ChromaSampling::Cs420, ChromaSampling::Cs422, ChromaSampling::Cs444]
    {
      let f = fi(cs);
      let coder = TuCoder::new(&f, &prims, false, false);
      let org = noisy_yuv(4, cs, 3);
      let mut cu = CodingUnit::<u8>::new(4, cs);
      cu.init_cu(CuGeom::lcu(0, 0, 0, 6).child(0).child(0), f.qp);
      cu.set_mode(PartSize::SizeNx2N, PredMode::Inter);
      for p in &mut cu.pred.planes {
        p.fill(128);
      }
      encode_inter_residual(&f, &coder, &mut cu, &org);
      // hierarchy depth 1 forces one split for Nx2N
      assert!(cu.parts.iter().all(|p| p.tr_idx == 1));
      assert!(cu.root_cbf());
      for comp in 0..3 {
        for (i, p) in cu.parts.iter().enumerate() {
          if p.cbf_at(comp, 1) {
            assert!(p.cbf_at(comp, 0), "{cs} comp {comp} part {i}");
          }
        }
      }
      assert!(cu.distortion < yuv_sse(&prims, &cu.pred, &org));
    }
  }
}
