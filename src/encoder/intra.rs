// Copyright (c) 2024, The cuquad contributors. All rights reserved
//
// This source code is subject to the terms of the BSD 2 Clause License and
// the Alliance for Open Media Patent License 1.0. If the BSD 2 Clause License
// was not distributed with this source code in the LICENSE file, you can
// obtain it at www.aomedia.org/license/software. If the Alliance for Open
// Media Patent License 1.0 was not distributed with this source code in the
// PATENTS file, you can obtain it at www.aomedia.org/license/patent.

//! Intra mode decision of one CU.

use crate::context::*;
use crate::cu::*;
use crate::ec::{Writer, WriterCounter};
use crate::encoder::residual::*;
use crate::encoder::search::*;
use crate::encoder::tu::*;
use crate::encoder::{FrameInvariants, FrameState};
use crate::frame::*;
use crate::partition::*;
use crate::predict::*;
use crate::primitives::Primitives;
use crate::rdo::{CtxSlot, MAX_COST};
use crate::scan_order::ScanType;
use crate::transform::MAX_TX_SQUARE;
use crate::util::*;
use crate::yuv::Yuv;

use std::ops::Range;

/// Rough rate of a luma direction given the most probable modes.
fn luma_dir_bits(mode: u8, preds: &[u8; NUM_MOST_PROBABLE_MODES]) -> u32 {
  match preds.iter().position(|&p| p == mode) {
    Some(0) => 2,
    Some(_) => 3,
    None => 6,
  }
}

/// Leaves of the CU tree lying in the partitions `pu`.
fn pu_leaves(
  log2_cu: usize, tr_idx: usize, pu: Range<usize>,
) -> impl Iterator<Item = (usize, usize)> {
  luma_leaves(log2_cu, tr_idx).filter(move |(rel, _)| pu.contains(rel))
}

/// Ranks the luma directions of a PU by SATD of an open loop prediction,
/// built from the original samples, and returns the most promising ones
/// followed by the most probable modes not already listed.
fn fast_luma_candidates<T: Pixel>(
  fi: &FrameInvariants, prims: &Primitives<T>, input: &Frame<T>,
  store: &CuStore, cu: &CodingUnit<T>, org: &Yuv<T>, pu: Range<usize>,
  preds: &[u8; NUM_MOST_PROBABLE_MODES],
) -> Vec<u8> {
  let num = fi.search.intra_fast_candidates;
  if num >= NUM_INTRA_MODE as usize {
    return (0..NUM_INTRA_MODE).collect();
  }
  let tr_idx = cu.parts[0].tr_idx as usize;
  let edges: Vec<_> = pu_leaves(cu.geom.log2_size, tr_idx, pu)
    .map(|(rel, log2)| {
      let (x, y) = zscan_to_raster(rel);
      let view = CuView::with_cu(store, &cu.geom, &cu.parts, rel);
      let edge = IntraEdge::new(
        &input.planes[0],
        cu.geom.x + x,
        cu.geom.y + y,
        log2,
        fi.bit_depth,
        |a, b| view.sample_available(a, b, 0, 0),
      );
      (x, y, log2, edge)
    })
    .collect();

  let mut pred = [T::cast_from(0u8); MAX_TX_SQUARE];
  let mut costs: Vec<(u64, u8)> = (0..NUM_INTRA_MODE)
    .map(|mode| {
      let satd: u32 = edges
        .iter()
        .map(|(x, y, log2, edge)| {
          let n = 1 << log2;
          let bd = fi.bit_depth;
          predict_intra(&mut pred, n, edge, mode, *log2, bd, true, false);
          prims.satd(n, n, org.at(0, *x, *y), org.stride(0), &pred, n)
        })
        .sum();
      (fi.rd.calc_rd_sad_cost(satd, luma_dir_bits(mode, preds)), mode)
    })
    .collect();
  costs.sort_unstable();

  let mut cands: Vec<u8> =
    costs.iter().take(num.max(1)).map(|c| c.1).collect();
  for &p in preds {
    if !cands.contains(&p) {
      cands.push(p);
    }
  }
  cands
}

/// Codes the luma of one PU with direction `mode`; returns its distortion.
fn code_luma_pu<T: Pixel>(
  coder: &TuCoder<T>, rec: &mut Frame<T>, store: &CuStore,
  cu: &mut CodingUnit<T>, org: &Yuv<T>, pu: Range<usize>, mode: u8,
) -> u64 {
  let tr_idx = cu.parts[0].tr_idx as usize;
  cu.update_parts(pu.start, pu.len(), |p| p.luma_dir = mode);
  for (rel, log2) in pu_leaves(cu.geom.log2_size, tr_idx, pu.clone()) {
    let nz = code_intra_luma_tu(coder, rec, store, cu, org, rel, log2);
    let n = 1 << (2 * (log2 - PART_LOG2));
    set_cbf(&mut cu.parts[rel..rel + n], 0, tr_idx, nz);
  }
  let (x, y) = zscan_to_raster(pu.start);
  let side = 1 << (PART_LOG2 + pu.len().trailing_zeros() as usize / 2);
  coder.prims.sse(
    side,
    side,
    org.at(0, x, y),
    org.stride(0),
    cu.reco.at(0, x, y),
    cu.reco.stride(0),
  )
}

/// Direction and residual bits of the luma of one PU.
fn luma_pu_bits<T: Pixel>(
  fc: &CabacContexts, cu: &CodingUnit<T>, pu: Range<usize>,
  preds: &[u8; NUM_MOST_PROBABLE_MODES],
) -> u32 {
  let mut cw = ContextWriter::new(*fc);
  let mut w = WriterCounter::new();
  let mode = cu.parts[pu.start].luma_dir;
  cw.write_intra_dir_luma(&mut w, &[(mode, *preds)]);
  let tr_idx = cu.parts[0].tr_idx as usize;
  for (rel, log2) in pu_leaves(cu.geom.log2_size, tr_idx, pu) {
    if cu.parts[rel].cbf_at(0, tr_idx) {
      let len = 1 << (2 * log2);
      cw.write_coeff_nxn(
        &mut w,
        &cu.coeff[0][rel * coeffs_per_part(0, 0, 0)..][..len],
        log2,
        true,
        ScanType::for_intra(mode, log2, true),
      );
    }
  }
  w.tell()
}

/// Chroma direction and residual bits of the CU.
fn chroma_bits<T: Pixel>(
  fi: &FrameInvariants, fc: &CabacContexts, cu: &CodingUnit<T>,
) -> u32 {
  let mut cw = ContextWriter::new(*fc);
  let mut w = WriterCounter::new();
  cw.write_intra_dir_chroma(&mut w, cu.parts[0].chroma_idx);
  let tr_idx = cu.parts[0].tr_idx as usize;
  for tu in chroma_tus(fi, cu.geom.log2_size, tr_idx) {
    let scan = ScanType::for_intra(
      chroma_pred_dir(fi, &cu.parts[tu.rel]),
      tu.log2c,
      fi.is_444(),
    );
    for comp in 1..3 {
      let per = coeffs_per_part(comp, fi.xdec, fi.ydec);
      let mut cursor = tu.cursor();
      loop {
        let abs = cursor.abs_part;
        if cu.parts[abs].cbf_at(comp, tu.tr_depth) {
          cw.write_coeff_nxn(
            &mut w,
            &cu.coeff[comp][abs * per..][..1 << (2 * tu.log2c)],
            tu.log2c,
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
  w.tell()
}

fn chroma_sse<T: Pixel>(prims: &Primitives<T>, a: &Yuv<T>, b: &Yuv<T>) -> u64 {
  (1..3)
    .map(|p| {
      let (xd, yd) = a.dec(p);
      let (w, h) = ((1 << a.log2) >> xd, (1 << a.log2) >> yd);
      prims.sse(w, h, &a.planes[p], a.stride(p), &b.planes[p], b.stride(p))
    })
    .sum()
}

impl<'a, T: Pixel> CuSearch<'a, T> {
  /// Evaluates the intra CU with `part_size` at `geom` into the temp slot
  /// and keeps it when it beats the best one.
  pub(crate) fn check_intra(
    &mut self, fs: &mut FrameState<T>, geom: CuGeom, part_size: PartSize,
  ) {
    let fi = self.fi;
    let d = geom.depth;
    let fc = *self.ctx.get(d, CtxSlot::CurrBest);
    {
      let prims = &self.prims;
      let DepthScratch { temp: cu, org, .. } = &mut self.md[d];
      init_candidate(fi, cu, geom, part_size, PredMode::Intra);
      let tr_idx = min_tr_idx(fi, geom.log2_size, PredMode::Intra, part_size);
      let n = cu.num_parts();
      cu.update_parts(0, n, |p| p.tr_idx = tr_idx as u8);
      let coder = TuCoder::new(fi, prims, true, cu.parts[0].transquant_bypass);

      let pu_parts = n / part_size.num_pus();
      for pu_idx in 0..part_size.num_pus() {
        let start = part_size.pu_part_offset(n, pu_idx);
        let pu = start..start + pu_parts;
        let preds = CuView::with_cu(&fs.store, &geom, &cu.parts, start)
          .intra_dir_pred(&geom, start);
        let cands = fast_luma_candidates(
          fi,
          prims,
          &fs.input,
          &fs.store,
          cu,
          org,
          pu.clone(),
          &preds,
        );
        let mut best = (MAX_COST, DC_IDX);
        for mode in cands {
          let dist = code_luma_pu(
            &coder,
            &mut fs.rec,
            &fs.store,
            cu,
            org,
            pu.clone(),
            mode,
          );
          let bits = luma_pu_bits(&fc, cu, pu.clone(), &preds);
          let cost = fi.rd.calc_rd_cost(dist, bits);
          if cost < best.0 {
            best = (cost, mode);
          }
        }
        code_luma_pu(&coder, &mut fs.rec, &fs.store, cu, org, pu, best.1);
      }
      propagate_cbf(&mut cu.parts, 0, tr_idx);

      let mut best = (MAX_COST, DM_CHROMA_IDX);
      for idx in [DM_CHROMA_IDX, 0, 1, 2, 3] {
        cu.update_parts(0, n, |p| p.chroma_idx = idx);
        code_intra_chroma(fi, &coder, &mut fs.rec, &fs.store, cu, org);
        let dist = chroma_sse(prims, &cu.reco, org);
        let cost = fi.rd.calc_rd_cost(dist, chroma_bits(fi, &fc, cu));
        if cost < best.0 {
          best = (cost, idx);
        }
      }
      cu.update_parts(0, n, |p| p.chroma_idx = best.1);
      code_intra_chroma(fi, &coder, &mut fs.rec, &fs.store, cu, org);

      cu.distortion = yuv_sse(prims, &cu.reco, org);
    }
    self.finish_candidate(fs, d);
    self.check_best(d);
  }
}

#[cfg(test)]
mod test {
  use super::*;

  #[test]
  fn direction_rate_prefers_first_mpm() {
    let preds = most_probable_modes(VER_IDX, HOR_IDX);
    assert_eq!(luma_dir_bits(VER_IDX, &preds), 2);
    assert_eq!(luma_dir_bits(HOR_IDX, &preds), 3);
    assert_eq!(luma_dir_bits(18, &preds), 6);
  }

  #[test]
  fn leaves_are_filtered_by_pu() {
    let leaves: Vec<_> = pu_leaves(3, 1, 2..3).collect();
    assert_eq!(leaves, vec![(2, 2)]);
    assert_eq!(pu_leaves(6, 1, 0..256).count(), 4);
  }
}
