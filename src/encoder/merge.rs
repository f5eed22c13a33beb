// Copyright (c) 2024, The cuquad contributors. All rights reserved
//
// This source code is subject to the terms of the BSD 2 Clause License and
// the Alliance for Open Media Patent License 1.0. If the BSD 2 Clause License
// was not distributed with this source code in the LICENSE file, you can
// obtain it at www.aomedia.org/license/software. If the Alliance for Open
// Media Patent License 1.0 was not distributed with this source code in the
// PATENTS file, you can obtain it at www.aomedia.org/license/patent.

//! Merge candidate list and the merge/skip evaluation of 2Nx2N CUs.

use arrayvec::ArrayVec;

use crate::api::SliceType;
use crate::context::*;
use crate::cu::*;
use crate::encoder::inter::*;
use crate::encoder::residual::*;
use crate::encoder::search::*;
use crate::encoder::{FrameInvariants, FrameState};
use crate::mc::*;
use crate::partition::*;
use crate::rdo::MAX_COST;
use crate::util::*;

pub const MRG_MAX_NUM_CANDS: usize = 5;

/// Order in which pairs of candidates combine into bi-directional ones.
const COMBINED_PAIRS: [(usize, usize); 12] = [
  (0, 1),
  (1, 0),
  (0, 2),
  (2, 0),
  (1, 2),
  (2, 1),
  (0, 3),
  (3, 0),
  (1, 3),
  (3, 1),
  (2, 3),
  (3, 2),
];

/// Merge candidates of one PU, in index order.
#[derive(Clone, Debug, Default)]
pub struct MergeCandidates {
  pub cands: ArrayVec<PuMotion, MRG_MAX_NUM_CANDS>,
}

impl MergeCandidates {
  pub fn new(
    fi: &FrameInvariants, nb: &PuNeighbours, col: Option<&Collocated>,
    ref_pocs: &[Vec<i32>; 2], part_size: PartSize, pu: usize,
  ) -> Self {
    let max = fi.config.max_merge_cands.min(MRG_MAX_NUM_CANDS);
    let mut cands = ArrayVec::<PuMotion, MRG_MAX_NUM_CANDS>::new();
    let full = |c: &ArrayVec<PuMotion, MRG_MAX_NUM_CANDS>| c.len() >= max;

    // the second PU may not merge into the first
    let second = pu == 1;
    let a1 = nb
      .a1()
      .filter(|_| !(second && part_size == PartSize::SizeNx2N))
      .map(PuMotion::of);
    let b1 = nb
      .b1()
      .filter(|_| !(second && part_size == PartSize::Size2NxN))
      .map(PuMotion::of);
    let b0 = nb.b0().map(PuMotion::of);
    let a0 = nb.a0().map(PuMotion::of);
    let b2 = nb.b2().map(PuMotion::of);

    let differs = |c: Option<PuMotion>, other: Option<PuMotion>| {
      c.filter(|c| other.map_or(true, |o| o != *c))
    };
    let spatial = [
      a1,
      differs(b1, a1),
      differs(b0, b1),
      differs(a0, a1),
    ];
    for c in spatial.into_iter().flatten() {
      if !full(&cands) {
        cands.push(c);
      }
    }
    if cands.len() < 4 && !full(&cands) {
      if let Some(c) = differs(differs(b2, a1), b1) {
        cands.push(c);
      }
    }

    if !full(&cands) {
      if let Some(col) = col {
        let mut t = PuMotion { inter_dir: 0, mv: [MvField::NONE; 2] };
        for list in 0..fi.slice_type.num_lists() {
          if let Some(mv) = col.mv(fi, nb, list, ref_pocs[list][0]) {
            t.inter_dir |= 1 << list;
            t.mv[list] = MvField::new(mv, 0);
          }
        }
        if t.inter_dir != 0 {
          cands.push(t);
        }
      }
    }

    if fi.slice_type == SliceType::B {
      let n = cands.len();
      for &(i, j) in COMBINED_PAIRS.iter().take(n * n.saturating_sub(1)) {
        if full(&cands) {
          break;
        }
        let (c0, c1) = (cands[i], cands[j]);
        if !c0.uses(0) || !c1.uses(1) {
          continue;
        }
        let (m0, m1) = (c0.mv[0], c1.mv[1]);
        let same = ref_pocs[0][m0.ref_idx as usize]
          == ref_pocs[1][m1.ref_idx as usize]
          && m0.mv == m1.mv;
        if !same {
          cands.push(PuMotion::bi(m0, m1));
        }
      }
    }

    let num_refs = match fi.slice_type {
      SliceType::B => fi.num_refs[0].min(fi.num_refs[1]),
      _ => fi.num_refs[0],
    };
    let mut zero_idx = 0;
    while !full(&cands) {
      let ref_idx = if zero_idx < num_refs { zero_idx } else { 0 } as i8;
      let f = MvField::new(MotionVector::ZERO, ref_idx);
      cands.push(if fi.slice_type == SliceType::B {
        PuMotion::bi(f, f)
      } else {
        PuMotion::uni(0, f)
      });
      zero_idx += 1;
    }
    MergeCandidates { cands }
  }

  #[inline]
  pub fn len(&self) -> usize {
    self.cands.len()
  }

  #[inline]
  pub fn is_empty(&self) -> bool {
    self.cands.is_empty()
  }
}

/// What the merge evaluation tells the rest of the node's search.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MergeOutcome {
  /// The best candidate so far is a skip CU and the other modes of the
  /// node are not worth evaluating.
  pub early_skip: bool,
}

impl<'a, T: Pixel> CuSearch<'a, T> {
  /// Evaluates the 2Nx2N merge candidates at `geom`, as a skip CU and with
  /// a coded residual.
  pub(crate) fn check_merge_2nx2n(
    &mut self, fs: &mut FrameState<T>, geom: CuGeom,
  ) -> MergeOutcome {
    let fi = self.fi;
    let d = geom.depth;
    let size = geom.size();
    let col = Collocated::new(fi, fs);
    let ref_pocs = fs.ref_pocs(fi);

    let merge = {
      let parts = &self.md[d].temp.parts;
      let nb =
        PuNeighbours::new(&fs.store, &geom, parts, PartSize::Size2Nx2N, 0);
      let col = col.as_ref();
      MergeCandidates::new(fi, &nb, col, &ref_pocs, PartSize::Size2Nx2N, 0)
    };
    if merge.is_empty() {
      return MergeOutcome::default();
    }

    let mut best = (MAX_COST, 0);
    {
      let DepthScratch { org, merge_pred, .. } = &mut self.md[d];
      for (idx, motion) in merge.cands.iter().enumerate() {
        let rect = (0, 0, size, size);
        predict_inter(fi, &fs.refs, merge_pred, &geom, rect, motion, 0..1);
        let sse = self.prims.sse(
          size,
          size,
          &org.planes[0],
          org.stride(0),
          &merge_pred.planes[0],
          merge_pred.stride(0),
        );
        let cost = fi.rd.calc_rd_cost(sse, idx as u32 + 1);
        if cost < best.0 {
          best = (cost, idx);
        }
      }
      let rect = (0, 0, size, size);
      let motion = &merge.cands[best.1];
      predict_inter(fi, &fs.refs, merge_pred, &geom, rect, motion, 0..3);
    }
    let motion = merge.cands[best.1];
    let merge_idx = best.1 as u8;
    let set_merge = |cu: &mut CodingUnit<T>, skip: bool| {
      init_candidate(fi, cu, geom, PartSize::Size2Nx2N, PredMode::Inter);
      let n = cu.num_parts();
      cu.update_parts(0, n, |p| {
        p.skip = skip;
        p.merge = true;
        p.merge_idx = merge_idx;
        p.inter_dir = motion.inter_dir;
        p.mv = motion.mv;
      });
    };

    {
      let DepthScratch { temp, org, merge_pred, .. } = &mut self.md[d];
      set_merge(temp, true);
      temp.pred.planes.clone_from(&merge_pred.planes);
      temp.reco.planes.clone_from(&merge_pred.planes);
      temp.distortion = yuv_sse(&self.prims, &temp.reco, org);
    }
    self.finish_candidate(fs, d);
    self.check_best(d);

    let coded = {
      let DepthScratch { temp, org, merge_pred, .. } = &mut self.md[d];
      set_merge(temp, false);
      temp.pred.planes.clone_from(&merge_pred.planes);
      let bypass = temp.parts[0].transquant_bypass;
      let coder = TuCoder::new(fi, &self.prims, false, bypass);
      encode_inter_residual(fi, &coder, temp, org);
      temp.root_cbf()
    };
    // without residual the candidate is the skip CU already evaluated
    if coded {
      self.finish_candidate(fs, d);
      self.check_best(d);
    }

    let best = &self.md[d].best;
    let p = &best.parts[0];
    let no_mvd = (0..2).all(|l| !p.mv[l].is_valid() || p.mvd[l].is_zero());
    MergeOutcome {
      early_skip: fi.search.early_skip
        && !best.root_cbf()
        && (p.merge || no_mvd),
    }
  }
}

#[cfg(test)]
mod test {
  use super::*;
  use crate::api::*;
  use pretty_assertions::assert_eq;

  fn fi(slice_type: SliceType, ref_count: [usize; 2]) -> FrameInvariants {
    let config = EncoderConfig {
      width: 64,
      height: 64,
      slice_type,
      ref_count,
      temporal_mvp: false,
      ..Default::default()
    };
    FrameInvariants::new(config, 8).unwrap()
  }

  fn commit(store: &mut CuStore, geom: CuGeom, motion: PuMotion) {
    let mut cu = CodingUnit::<u8>::new(geom.log2_size, ChromaSampling::Cs420);
    cu.init_cu(geom, 32);
    cu.set_mode(PartSize::Size2Nx2N, PredMode::Inter);
    cu.update_parts(0, cu.num_parts(), |p| {
      p.inter_dir = motion.inter_dir;
      p.mv = motion.mv;
    });
    cu.cost = 0;
    store.copy_to_pic(&cu);
  }

  fn candidates(
    f: &FrameInvariants, store: &CuStore, geom: CuGeom,
    ref_pocs: &[Vec<i32>; 2],
  ) -> MergeCandidates {
    let parts = vec![PartInfo::default(); geom.num_parts()];
    let nb = PuNeighbours::new(store, &geom, &parts, PartSize::Size2Nx2N, 0);
    MergeCandidates::new(f, &nb, None, ref_pocs, PartSize::Size2Nx2N, 0)
  }

  #[test]
  fn zero_candidates_cycle_references() {
    let f = fi(SliceType::P, [2, 0]);
    let store = CuStore::new(64, 64, 6, ChromaSampling::Cs420, vec![0]);
    let lcu = CuGeom::lcu(0, 0, 0, 6);
    let m = candidates(&f, &store, lcu, &[vec![7, 6], vec![]]);
    assert_eq!(m.len(), f.config.max_merge_cands);
    let refs: Vec<_> = m.cands.iter().map(|c| c.mv[0].ref_idx).collect();
    assert_eq!(refs, vec![0, 1, 0, 0, 0]);
    assert!(m.cands.iter().all(|c| c.inter_dir == INTER_DIR_L0));
  }

  #[test]
  fn identical_neighbours_are_pruned() {
    let f = fi(SliceType::P, [1, 0]);
    let mut store = CuStore::new(64, 64, 6, ChromaSampling::Cs420, vec![0]);
    let lcu = CuGeom::lcu(0, 0, 0, 6);
    let m = PuMotion::uni(0, MvField::new(MotionVector::new(4, -4), 0));
    let other = PuMotion::uni(0, MvField::new(MotionVector::new(0, 8), 0));
    commit(&mut store, lcu.child(0), m);
    commit(&mut store, lcu.child(1), m);
    commit(&mut store, lcu.child(2), other);
    // A1 = other, B1 = m, B0 unavailable, A0 unavailable, B2 = m
    let list = candidates(&f, &store, lcu.child(3), &[vec![7], vec![]]);
    assert_eq!(list.cands[0], other);
    assert_eq!(list.cands[1], m);
    assert_eq!(list.cands[2].mv[0].mv, MotionVector::ZERO);
  }

  #[test]
  fn bi_candidates_combine_lists() {
    let f = fi(SliceType::B, [1, 1]);
    let mut store = CuStore::new(64, 64, 6, ChromaSampling::Cs420, vec![0]);
    let lcu = CuGeom::lcu(0, 0, 0, 6);
    let l0 = PuMotion::uni(0, MvField::new(MotionVector::new(4, 0), 0));
    let l1 = PuMotion::uni(1, MvField::new(MotionVector::new(-4, 0), 0));
    commit(&mut store, lcu.child(2), l0);
    commit(&mut store, lcu.child(1), l1);
    let list = candidates(&f, &store, lcu.child(3), &[vec![4], vec![12]]);
    assert_eq!(&list.cands[..2], &[l0, l1]);
    assert_eq!(list.cands[2], PuMotion::bi(l0.mv[0], l1.mv[1]));
    let zero = MvField::new(MotionVector::ZERO, 0);
    assert_eq!(list.cands[3], PuMotion::bi(zero, zero));
  }
}
