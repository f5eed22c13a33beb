// Copyright (c) 2024, The cuquad contributors. All rights reserved
//
// This source code is subject to the terms of the BSD 2 Clause License and
// the Alliance for Open Media Patent License 1.0. If the BSD 2 Clause License
// was not distributed with this source code in the LICENSE file, you can
// obtain it at www.aomedia.org/license/software. If the Alliance for Open
// Media Patent License 1.0 was not distributed with this source code in the
// PATENTS file, you can obtain it at www.aomedia.org/license/patent.

//! Serialization of the coding quadtree, coding units, transform trees and
//! SAO parameters.

use std::ops::Range;

use arrayvec::ArrayVec;

use crate::api::SliceType;
use crate::context::*;
use crate::cu::*;
use crate::ec::Writer;
use crate::encoder::inter::AMVP_MAX_NUM_CANDS;
use crate::encoder::residual::chroma_pred_dir;
use crate::encoder::tu::*;
use crate::encoder::{sao_merge_candidates, FrameInvariants};
use crate::partition::*;
use crate::sao::*;
use crate::scan_order::ScanType;
use crate::util::*;

/// Decisions and levels of one coding unit, either under evaluation or
/// committed.
#[derive(Clone, Copy)]
pub struct CuData<'a> {
  pub geom: CuGeom,
  pub parts: &'a [PartInfo],
  pub coeff: [&'a [i32]; 3],
}

impl<'a> CuData<'a> {
  pub fn from_cu<T: Pixel>(cu: &'a CodingUnit<T>) -> Self {
    CuData {
      geom: cu.geom,
      parts: &cu.parts,
      coeff: [&cu.coeff[0], &cu.coeff[1], &cu.coeff[2]],
    }
  }

  pub fn from_store(store: &'a CuStore, geom: CuGeom) -> Self {
    CuData {
      geom,
      parts: store.cu_parts(&geom),
      coeff: store.cu_coeffs(&geom),
    }
  }
}

/// Whether `pcm_flag` is present for an intra 2Nx2N CU of `log2` size.
fn pcm_flag_present(fi: &FrameInvariants, log2: usize) -> bool {
  let size = 1 << log2;
  fi.config.pcm
    && size >= fi.config.pcm_min_size
    && size <= fi.config.pcm_max_size
}

/// Whether the inter PUs of a CU may use both lists: 8x4 and 4x8 may not.
pub fn bi_allowed(log2: usize, part_size: PartSize) -> bool {
  !(log2 == 3 && part_size != PartSize::Size2Nx2N)
}

/// Codes `coding_unit()`. `code_dqp` is cleared once the quantizer delta
/// has been sent.
pub fn encode_cu_data<W: Writer>(
  fi: &FrameInvariants, cw: &mut ContextWriter, w: &mut W, view: &CuView,
  cu: &CuData, code_dqp: &mut bool,
) {
  let geom = &cu.geom;
  let log2 = geom.log2_size;
  let n = cu.parts.len();
  let p0 = cu.parts[0];

  if fi.config.transquant_bypass || fi.config.lossless {
    cw.write_cu_transquant_bypass_flag(w, p0.transquant_bypass);
  }
  if !fi.slice_type.is_intra() {
    cw.write_skip_flag(w, view.skip_ctx(geom), p0.skip);
  }
  if p0.skip {
    cw.write_merge_index(w, p0.merge_idx as usize, fi.config.max_merge_cands);
    return;
  }
  if !fi.slice_type.is_intra() {
    cw.write_pred_mode(w, p0.pred_mode);
  }
  let min_cu = log2 == fi.min_cu_log2;
  cw.write_part_size(w, p0.part_size, p0.pred_mode, log2, min_cu);

  let num_pus = p0.part_size.num_pus();
  if p0.is_intra() {
    if p0.part_size == PartSize::Size2Nx2N && pcm_flag_present(fi, log2) {
      cw.write_ipcm_info(w, false);
    }
    let dirs: ArrayVec<_, 4> = (0..num_pus)
      .map(|i| {
        let rel = p0.part_size.pu_part_offset(n, i);
        (cu.parts[rel].luma_dir, view.intra_dir_pred(geom, rel))
      })
      .collect();
    cw.write_intra_dir_luma(w, &dirs);
    cw.write_intra_dir_chroma(w, p0.chroma_idx);
  } else {
    for i in 0..num_pus {
      let p = &cu.parts[p0.part_size.pu_part_offset(n, i)];
      cw.write_merge_flag(w, p.merge);
      if p.merge {
        let max = fi.config.max_merge_cands;
        cw.write_merge_index(w, p.merge_idx as usize, max);
        continue;
      }
      if fi.slice_type == SliceType::B {
        cw.write_inter_dir(
          w,
          p.inter_dir,
          geom.depth,
          bi_allowed(log2, p0.part_size),
        );
      }
      for list in 0..2 {
        if p.inter_dir & (1 << list) != 0 {
          cw.write_ref_frame_idx(
            w,
            p.mv[list].ref_idx as usize,
            fi.num_refs[list],
          );
          cw.write_mvd(w, p.mvd[list]);
          cw.write_mvp_idx(w, p.mvp_idx[list] as usize, AMVP_MAX_NUM_CANDS);
        }
      }
    }
    let root_cbf = cu.parts.iter().any(|p| p.cbf.iter().any(|&c| c & 1 != 0));
    if p0.part_size == PartSize::Size2Nx2N && p0.merge {
      assert!(root_cbf, "2Nx2N merge without residual must be coded as skip");
    } else {
      cw.write_qt_root_cbf(w, root_cbf);
    }
    if !root_cbf {
      return;
    }
  }

  encode_transform(fi, cw, w, cu, 0, log2, 0, code_dqp);
}

fn chroma_cbf(
  parts: &[PartInfo], rel: usize, n: usize, comp: usize, tr_depth: usize,
) -> bool {
  parts[rel..rel + n].iter().any(|p| p.cbf_at(comp, tr_depth))
}

/// Codes `transform_tree()` of the node at relative partition `rel`.
pub fn encode_transform<W: Writer>(
  fi: &FrameInvariants, cw: &mut ContextWriter, w: &mut W, cu: &CuData,
  rel: usize, log2: usize, tr_depth: usize, code_dqp: &mut bool,
) {
  let p = cu.parts[rel];
  let (pred_mode, part_size) = (p.pred_mode, p.part_size);
  let subdiv = p.tr_idx as usize > tr_depth;
  let n = 1 << (2 * (log2 - PART_LOG2));

  if implicit_split(fi, log2, tr_depth, pred_mode, part_size) {
    assert!(subdiv, "transform node of size {} must split", 1 << log2);
  } else if subdiv_flag_coded(
    fi,
    cu.geom.log2_size,
    log2,
    tr_depth,
    pred_mode,
    part_size,
  ) {
    cw.write_transform_subdiv_flag(w, subdiv, log2);
  } else {
    assert!(!subdiv, "transform node of size {} may not split", 1 << log2);
  }

  if log2 > 2 || fi.is_444() {
    for comp in 1..3 {
      if tr_depth == 0 || p.cbf_at(comp, tr_depth - 1) {
        if fi.is_422() && (!subdiv || log2 == 3) {
          cw.write_qt_cbf(w, false, tr_depth, p.cbf_at(comp, tr_depth));
          let lower = cu.parts[rel + n / 2].cbf_at(comp, tr_depth);
          cw.write_qt_cbf(w, false, tr_depth, lower);
        } else {
          cw.write_qt_cbf(w, false, tr_depth, p.cbf_at(comp, tr_depth));
        }
      }
    }
  }

  if subdiv {
    let mut cursor = TuCursor::new(TuSplit::Quad, rel, n);
    loop {
      encode_transform(
        fi,
        cw,
        w,
        cu,
        cursor.abs_part,
        log2 - 1,
        tr_depth + 1,
        code_dqp,
      );
      if !cursor.next_section() {
        break;
      }
    }
    return;
  }

  // chroma of four 4x4 luma blocks is sent with the last one
  let (chroma_rel, chroma_n, chroma_depth, log2c, chroma_here) =
    if fi.is_444() {
      (rel, n, tr_depth, log2, true)
    } else if log2 > 2 {
      (rel, n, tr_depth, log2 - 1, true)
    } else {
      (rel & !3, 4, tr_depth - 1, 2, rel & 3 == 3)
    };
  let cbf_u = chroma_cbf(cu.parts, chroma_rel, chroma_n, 1, chroma_depth);
  let cbf_v = chroma_cbf(cu.parts, chroma_rel, chroma_n, 2, chroma_depth);

  let cbf_y = p.cbf_at(0, tr_depth);
  if p.is_inter() && tr_depth == 0 && !cbf_u && !cbf_v {
    assert!(cbf_y, "implied luma cbf of an inter CU is not set");
  } else {
    cw.write_qt_cbf(w, true, tr_depth, cbf_y);
  }

  if *code_dqp && (cbf_y || cbf_u || cbf_v) {
    cw.write_delta_qp(w, p.qp as i32 - fi.qp);
    *code_dqp = false;
  }

  if cbf_y {
    let scan = if p.is_intra() {
      ScanType::for_intra(p.luma_dir, log2, true)
    } else {
      ScanType::Diag
    };
    let off = rel * coeffs_per_part(0, 0, 0);
    let coeffs = &cu.coeff[0][off..][..1 << (2 * log2)];
    cw.write_coeff_nxn(w, coeffs, log2, true, scan);
  }

  if chroma_here && (cbf_u || cbf_v) {
    let scan = if p.is_intra() {
      ScanType::for_intra(
        chroma_pred_dir(fi, &cu.parts[chroma_rel]),
        log2c,
        fi.is_444(),
      )
    } else {
      ScanType::Diag
    };
    let split =
      if fi.is_422() { TuSplit::VerticalChroma422 } else { TuSplit::None };
    for comp in 1..3 {
      let per = coeffs_per_part(comp, fi.xdec, fi.ydec);
      let mut cursor = TuCursor::new(split, chroma_rel, chroma_n);
      loop {
        let abs = cursor.abs_part;
        if cu.parts[abs].cbf_at(comp, chroma_depth) {
          cw.write_coeff_nxn(
            w,
            &cu.coeff[comp][abs * per..][..1 << (2 * log2c)],
            log2c,
            false,
            scan,
          );
        }
        if !cursor.next_section() {
          break;
        }
      }
    }
  }
}

/// Codes `coding_quadtree()` of the committed node `geom`, restricted to
/// the slice segment `range` of partition addresses.
pub fn encode_cu<W: Writer>(
  fi: &FrameInvariants, cw: &mut ContextWriter, w: &mut W, store: &CuStore,
  geom: CuGeom, range: &Range<usize>, code_dqp: &mut bool,
) {
  let start = geom.global_addr();
  let end = start + geom.num_parts();
  if end <= range.start
    || start >= range.end
    || !geom.intersects(fi.width, fi.height)
  {
    return;
  }

  let inside = geom.is_inside(fi.width, fi.height);
  let straddles = store.straddles_slice(&geom);
  let split = !inside
    || straddles
    || store.parts[start].depth as usize > geom.depth;
  if inside && !straddles && geom.depth < fi.max_depth {
    let view = CuView::new(store, start);
    cw.write_split_flag(w, view.split_ctx(&geom), split);
  }

  if split {
    for idx in 0..4 {
      encode_cu(fi, cw, w, store, geom.child(idx), range, code_dqp);
    }
    return;
  }

  let view = CuView::new(store, start);
  encode_cu_data(fi, cw, w, &view, &CuData::from_store(store, geom), code_dqp);
}

pub fn encode_sao_offset<W: Writer>(
  cw: &mut ContextWriter, w: &mut W, offset: &SaoOffset, comp: usize,
  bit_depth: usize,
) {
  if comp != 2 {
    cw.write_sao_type_idx(w, offset.kind.type_idx());
  }
  let max = sao_max_offset(bit_depth) as u32;
  let offset = offset.clamped(bit_depth);
  match offset.kind {
    SaoType::Off => {}
    SaoType::Band { position } => {
      for &o in &offset.offsets {
        cw.write_sao_max_uvlc(w, o.unsigned_abs(), max);
      }
      for &o in &offset.offsets {
        if o != 0 {
          cw.write_sao_sign(w, o < 0);
        }
      }
      cw.write_sao_uflc(w, 5, position as u32);
    }
    SaoType::Edge { class } => {
      for (i, &o) in offset.offsets.iter().enumerate() {
        cw.write_sao_max_uvlc(w, o.unsigned_abs(), max);
      }
      if comp != 2 {
        cw.write_sao_uflc(w, 2, class as u32);
      }
    }
  }
}

/// Codes `sao()` of LCU `addr`.
pub fn encode_sao_unit_interleaving<W: Writer>(
  fi: &FrameInvariants, cw: &mut ContextWriter, w: &mut W,
  sao: &[SaoLcuParams], addr: usize,
) {
  let params = &sao[addr];
  let (left, up) = sao_merge_candidates(fi, addr);
  if left.is_some() {
    cw.write_sao_merge(w, params.merge_left);
    if params.merge_left {
      return;
    }
  }
  if up.is_some() {
    cw.write_sao_merge(w, params.merge_up);
    if params.merge_up {
      return;
    }
  }
  debug_assert_eq!(
    params.comps[1].kind.type_idx(),
    params.comps[2].kind.type_idx()
  );
  for comp in 0..3 {
    let enabled =
      if comp == 0 { fi.config.sao_luma } else { fi.config.sao_chroma };
    if enabled {
      encode_sao_offset(cw, w, &params.comps[comp], comp, fi.bit_depth);
    }
  }
}

/// Codes `coding_tree_unit()` of LCU `addr` inside the slice segment
/// `range`.
pub fn encode_lcu<W: Writer>(
  fi: &FrameInvariants, cw: &mut ContextWriter, w: &mut W, store: &CuStore,
  sao: &[SaoLcuParams], addr: usize, range: Range<usize>,
) {
  let geom = store.lcu_geom(addr);
  if fi.sao_enabled() && range.contains(&geom.global_addr()) {
    encode_sao_unit_interleaving(fi, cw, w, sao, addr);
  }
  let mut code_dqp = fi.config.delta_qp;
  encode_cu(fi, cw, w, store, geom, &range, &mut code_dqp);
}

#[cfg(test)]
mod test {
  use super::*;
  use crate::api::*;
  use crate::ec::{Bin, WriterRecorder};
  use crate::mc::{MotionVector, MvField};
  use pretty_assertions::assert_eq;

  fn fi(slice_type: SliceType) -> FrameInvariants {
    let ref_count = match slice_type {
      SliceType::I => [0, 0],
      SliceType::P => [1, 0],
      SliceType::B => [1, 1],
    };
    let config = EncoderConfig {
      width: 64,
      height: 64,
      slice_type,
      ref_count,
      tu_depth_inter: 1,
      ..Default::default()
    };
    FrameInvariants::new(config, 0).unwrap()
  }

  fn cu16() -> CodingUnit<u8> {
    let mut cu = CodingUnit::new(4, ChromaSampling::Cs420);
    cu.init_cu(CuGeom::lcu(0, 0, 0, 6).child(0).child(0), 32);
    cu.set_mode(PartSize::Size2Nx2N, PredMode::Inter);
    cu
  }

  fn coded(f: &FrameInvariants, cu: &CodingUnit<u8>) -> Vec<Bin> {
    let store = CuStore::new(64, 64, 6, ChromaSampling::Cs420, vec![0]);
    let view = CuView::with_cu(&store, &cu.geom, &cu.parts, 0);
    let mut cw = ContextWriter::new(CabacContexts::new(f.slice_type, f.qp));
    let mut w = WriterRecorder::new();
    let mut dqp = f.config.delta_qp;
    encode_cu_data(f, &mut cw, &mut w, &view, &CuData::from_cu(cu), &mut dqp);
    w.recorded().bins().to_vec()
  }

  #[test]
  fn skip_codes_flag_and_index_only() {
    let f = fi(SliceType::P);
    let mut cu = cu16();
    cu.update_parts(0, 16, |p| {
      p.skip = true;
      p.merge = true;
      p.merge_idx = 2;
    });

    let mut cw = ContextWriter::new(CabacContexts::new(f.slice_type, f.qp));
    let mut w = WriterRecorder::new();
    cw.write_skip_flag(&mut w, 0, true);
    cw.write_merge_index(&mut w, 2, 5);
    assert_eq!(coded(&f, &cu), w.recorded().bins().to_vec());
  }

  #[test]
  fn implied_luma_cbf_is_not_coded() {
    let f = fi(SliceType::P);
    let mut cu = cu16();
    let mvd = MotionVector::new(-3, 5);
    cu.update_parts(0, 16, |p| {
      p.inter_dir = INTER_DIR_L0;
      p.mv[0] = MvField::new(MotionVector::new(-3, 9), 0);
      p.mvd[0] = mvd;
      p.mvp_idx[0] = 1;
      p.cbf = [1, 0, 0];
    });
    cu.coeff[0][0] = 3;
    cu.coeff[0][17] = -1;

    let mut cw = ContextWriter::new(CabacContexts::new(f.slice_type, f.qp));
    let mut w = WriterRecorder::new();
    cw.write_skip_flag(&mut w, 0, false);
    cw.write_pred_mode(&mut w, PredMode::Inter);
    cw.write_part_size(&mut w, PartSize::Size2Nx2N, PredMode::Inter, 4, false);
    cw.write_merge_flag(&mut w, false);
    cw.write_mvd(&mut w, mvd);
    cw.write_mvp_idx(&mut w, 1, AMVP_MAX_NUM_CANDS);
    cw.write_qt_root_cbf(&mut w, true);
    cw.write_qt_cbf(&mut w, false, 0, false);
    cw.write_qt_cbf(&mut w, false, 0, false);
    cw.write_coeff_nxn(&mut w, &cu.coeff[0][..256], 4, true, ScanType::Diag);
    assert_eq!(coded(&f, &cu), w.recorded().bins().to_vec());
  }

  #[test]
  fn empty_inter_cu_stops_at_root_cbf() {
    let f = fi(SliceType::B);
    let mut cu = cu16();
    cu.set_mode(PartSize::Size2NxN, PredMode::Inter);
    cu.update_parts(0, 16, |p| {
      p.merge = true;
      p.merge_idx = 0;
    });

    let mut cw = ContextWriter::new(CabacContexts::new(f.slice_type, f.qp));
    let mut w = WriterRecorder::new();
    cw.write_skip_flag(&mut w, 0, false);
    cw.write_pred_mode(&mut w, PredMode::Inter);
    cw.write_part_size(&mut w, PartSize::Size2NxN, PredMode::Inter, 4, false);
    for _ in 0..2 {
      cw.write_merge_flag(&mut w, true);
      cw.write_merge_index(&mut w, 0, 5);
    }
    cw.write_qt_root_cbf(&mut w, false);
    assert_eq!(coded(&f, &cu), w.recorded().bins().to_vec());
  }

  #[test]
  #[should_panic]
  fn illegal_transform_split_is_fatal() {
    let f = fi(SliceType::I);
    let mut cu = cu16();
    cu.set_mode(PartSize::Size2Nx2N, PredMode::Intra);
    // one level deeper than the hierarchy depth allows
    cu.update_parts(0, 16, |p| {
      p.tr_idx = 1;
      p.cbf = [3, 0, 0];
      p.chroma_idx = DM_CHROMA_IDX;
    });
    cu.coeff[0].iter_mut().for_each(|c| *c = 1);
    coded(&f, &cu);
  }

  fn sao_bins(offset: SaoOffset, comp: usize) -> Vec<Bin> {
    let mut cw = ContextWriter::new(CabacContexts::new(SliceType::I, 32));
    let mut w = WriterRecorder::new();
    encode_sao_offset(&mut cw, &mut w, &offset, comp, 8);
    w.recorded().bins().to_vec()
  }

  fn bypass_bins(bins: &[Bin]) -> u32 {
    bins
      .iter()
      .map(|b| match *b {
        Bin::Bypass { n, .. } => n,
        _ => 0,
      })
      .sum()
  }

  #[test]
  fn sao_off_codes_type_only() {
    let bins = sao_bins(SaoOffset::default(), 0);
    assert_eq!(bins.len(), 1);
    assert!(sao_bins(SaoOffset::default(), 2).is_empty());
  }

  #[test]
  fn sao_band_signs_only_nonzero_offsets() {
    let zero =
      SaoOffset { kind: SaoType::Band { position: 9 }, offsets: [0; 4] };
    // type, 4 magnitudes and the position
    assert_eq!(bypass_bins(&sao_bins(zero, 0)), 1 + 4 + 5);

    let some =
      SaoOffset {
        kind: SaoType::Band { position: 9 },
        offsets: [1, 0, -2, 0],
      };
    // magnitudes 1 and 2 add 1 and 2 bins, plus two signs
    assert_eq!(bypass_bins(&sao_bins(some, 0)), 1 + 4 + 3 + 2 + 5);
  }

  #[test]
  fn sao_edge_class_not_repeated_for_cr() {
    let edge =
      SaoOffset { kind: SaoType::Edge { class: 2 }, offsets: [1, 0, 0, -1] };
    let cb = bypass_bins(&sao_bins(edge, 1));
    let cr = bypass_bins(&sao_bins(edge, 2));
    // type bins and the class are sent once for both chroma components
    assert_eq!(cb - cr, 1 + 2);
  }

  #[test]
  fn sao_band_magnitudes_are_capped() {
    let band =
      |offsets| SaoOffset { kind: SaoType::Band { position: 3 }, offsets };
    assert_eq!(
      sao_bins(band([100, -9, 7, 0]), 0),
      sao_bins(band([7, -7, 7, 0]), 0)
    );
    // 7 is coded without a terminating bin at 8 bits
    let bins = sao_bins(band([100, 0, 0, 0]), 0);
    assert_eq!(bypass_bins(&bins), 1 + 7 + 3 + 1 + 5);
  }

  #[test]
  fn sao_edge_offsets_keep_their_sign() {
    let edge =
      |offsets| SaoOffset { kind: SaoType::Edge { class: 1 }, offsets };
    let bins = sao_bins(edge([-1, 3, 2, -30]), 0);
    assert_eq!(bins, sao_bins(edge([0, 3, 0, -7]), 0));
    // type, magnitudes 0, 3, 0 and 7, then the class
    assert_eq!(bypass_bins(&bins), 1 + 1 + 4 + 1 + 7 + 2);
  }
}
