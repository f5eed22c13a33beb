// Copyright (c) 2024, The cuquad contributors. All rights reserved
//
// This source code is subject to the terms of the BSD 2 Clause License and
// the Alliance for Open Media Patent License 1.0. If the BSD 2 Clause License
// was not distributed with this source code in the LICENSE file, you can
// obtain it at www.aomedia.org/license/software. If the Alliance for Open
// Media Patent License 1.0 was not distributed with this source code in the
// PATENTS file, you can obtain it at www.aomedia.org/license/patent.

//! Motion vector prediction, motion search and motion compensation of
//! inter prediction units.

use std::ops::Range;
use std::sync::Arc;

use arrayvec::ArrayVec;

use crate::api::SliceType;
use crate::context::*;
use crate::cu::*;
use crate::encoder::entropy::bi_allowed;
use crate::encoder::residual::*;
use crate::encoder::search::*;
use crate::encoder::{FrameInvariants, FrameState, ReferenceFrame};
use crate::mc::*;
use crate::me::*;
use crate::partition::*;
use crate::util::*;
use crate::yuv::Yuv;

pub const AMVP_MAX_NUM_CANDS: usize = 2;

/// Motion of one prediction unit.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PuMotion {
  pub inter_dir: u8,
  /// Unused lists hold [`MvField::NONE`].
  pub mv: [MvField; 2],
}

impl PuMotion {
  pub fn uni(list: usize, mv: MvField) -> Self {
    let mut m = PuMotion { inter_dir: 1 << list, mv: [MvField::NONE; 2] };
    m.mv[list] = mv;
    m
  }

  pub fn bi(mv0: MvField, mv1: MvField) -> Self {
    PuMotion { inter_dir: INTER_DIR_BI, mv: [mv0, mv1] }
  }

  pub fn of(p: &PartInfo) -> Self {
    PuMotion { inter_dir: p.inter_dir, mv: p.mv }
  }

  #[inline]
  pub fn uses(&self, list: usize) -> bool {
    self.inter_dir & (1 << list) != 0
  }
}

/// Scales `mv`, which spans `col_poc - col_ref_poc`, to the distance
/// `poc - ref_poc`.
pub fn scale_mv(
  mv: MotionVector, poc: i32, ref_poc: i32, col_poc: i32, col_ref_poc: i32,
) -> MotionVector {
  let td = (col_poc - col_ref_poc).clamp(-128, 127);
  let tb = (poc - ref_poc).clamp(-128, 127);
  if td == tb || td == 0 {
    return mv;
  }
  let tx = (16384 + td.abs() / 2) / td;
  let dist_scale = ((tb * tx + 32) >> 6).clamp(-4096, 4095);
  mv.scale(dist_scale)
}

/// Spatial neighbourhood of a PU under evaluation. Partitions of the CU
/// itself are available only when they belong to an earlier PU.
pub struct PuNeighbours<'a> {
  view: CuView<'a>,
  geom: &'a CuGeom,
  parts: &'a [PartInfo],
  part_size: PartSize,
  pu: usize,
  /// Luma rectangle of the PU in the picture.
  pub x: usize,
  pub y: usize,
  pub w: usize,
  pub h: usize,
}

impl<'a> PuNeighbours<'a> {
  pub fn new(
    store: &'a CuStore, geom: &'a CuGeom, parts: &'a [PartInfo],
    part_size: PartSize, pu: usize,
  ) -> Self {
    let (px, py, w, h) = part_size.pu_rect(geom.size(), pu);
    PuNeighbours {
      view: CuView::new(store, geom.global_addr()),
      geom,
      parts,
      part_size,
      pu,
      x: geom.x + px,
      y: geom.y + py,
      w,
      h,
    }
  }

  fn at(&self, x: isize, y: isize) -> Option<&'a PartInfo> {
    let (x4, y4) = (x >> PART_LOG2, y >> PART_LOG2);
    let p = match self.geom.rel_part(x4, y4) {
      Some(rel) => {
        let pu = self.part_size.pu_of_part(self.parts.len(), rel);
        let earlier = pu < self.pu;
        earlier.then(|| &self.parts[rel])
      }
      None => self.view.part(x4, y4),
    };
    p.filter(|p| p.is_inter())
  }

  fn corner(&self, dx: isize, dy: isize) -> Option<&'a PartInfo> {
    let (x, y) = (self.x as isize, self.y as isize);
    let (w, h) = (self.w as isize, self.h as isize);
    let px = if dx < 0 { x - 1 } else { x + w - 1 + dx };
    let py = if dy < 0 { y - 1 } else { y + h - 1 + dy };
    self.at(px, py)
  }

  /// Below left.
  pub fn a0(&self) -> Option<&'a PartInfo> {
    self.corner(-1, 1)
  }

  /// Left, bottom row.
  pub fn a1(&self) -> Option<&'a PartInfo> {
    self.corner(-1, 0)
  }

  /// Above right.
  pub fn b0(&self) -> Option<&'a PartInfo> {
    self.at((self.x + self.w) as isize, self.y as isize - 1)
  }

  /// Above, rightmost column.
  pub fn b1(&self) -> Option<&'a PartInfo> {
    self.corner(0, -1)
  }

  /// Above left.
  pub fn b2(&self) -> Option<&'a PartInfo> {
    self.at(self.x as isize - 1, self.y as isize - 1)
  }
}

/// Collocated picture used for temporal motion vector prediction.
pub struct Collocated<'a> {
  poc: i32,
  motion: &'a MotionField,
  /// Every reference precedes the current picture.
  low_delay: bool,
  /// List read when both lists of the collocated block are valid and the
  /// pictures are not low delay.
  col_list: usize,
}

impl<'a> Collocated<'a> {
  /// The first reference of list 1 for B slices, of list 0 otherwise, when
  /// it carries a motion field.
  pub fn new<T: Pixel>(
    fi: &FrameInvariants, fs: &'a FrameState<T>,
  ) -> Option<Self> {
    if !fi.config.temporal_mvp || fi.slice_type.is_intra() {
      return None;
    }
    let from_l0 = fi.slice_type != SliceType::B;
    let r = fs.refs[!from_l0 as usize].first()?;
    let low_delay = fs.ref_pocs(fi).iter().flatten().all(|&p| p <= fi.poc);
    Some(Collocated {
      poc: r.poc,
      motion: r.motion.as_ref()?,
      low_delay,
      col_list: from_l0 as usize,
    })
  }

  fn at(
    &self, x: usize, y: usize, list: usize, poc: i32, target_poc: i32,
  ) -> Option<MotionVector> {
    let c = self.motion.at(x, y)?;
    let l = match (c.mv[0].is_valid(), c.mv[1].is_valid()) {
      (false, false) => return None,
      (true, false) => 0,
      (false, true) => 1,
      (true, true) if self.low_delay => list,
      (true, true) => self.col_list,
    };
    Some(scale_mv(c.mv[l].mv, poc, target_poc, self.poc, c.ref_poc[l]))
  }

  /// Temporal predictor of list `list` pointing to `target_poc`: the
  /// bottom right collocated block when it lies in the picture and in the
  /// same LCU row, else the centre one.
  pub fn mv(
    &self, fi: &FrameInvariants, nb: &PuNeighbours, list: usize,
    target_poc: i32,
  ) -> Option<MotionVector> {
    let (xbr, ybr) = (nb.x + nb.w, nb.y + nb.h);
    let bottom_right = if (nb.y >> fi.lcu_log2) == (ybr >> fi.lcu_log2)
      && xbr < fi.width
      && ybr < fi.height
    {
      self.at(xbr, ybr, list, fi.poc, target_poc)
    } else {
      None
    };
    bottom_right.or_else(|| {
      self.at(nb.x + nb.w / 2, nb.y + nb.h / 2, list, fi.poc, target_poc)
    })
  }
}

/// Vector of `p` pointing to `target_poc`, list `list` first.
fn same_ref_mv(
  p: &PartInfo, list: usize, target_poc: i32, ref_pocs: &[Vec<i32>; 2],
) -> Option<MotionVector> {
  [list, 1 - list].into_iter().find_map(|l| {
    let f = p.mv[l];
    (f.is_valid() && ref_pocs[l][f.ref_idx as usize] == target_poc)
      .then(|| f.mv)
  })
}

/// First vector of `p`, list `list` first, scaled to `target_poc`.
fn scaled_ref_mv(
  p: &PartInfo, list: usize, poc: i32, target_poc: i32,
  ref_pocs: &[Vec<i32>; 2],
) -> Option<MotionVector> {
  [list, 1 - list].into_iter().find_map(|l| {
    let f = p.mv[l];
    f.is_valid().then(|| {
      scale_mv(f.mv, poc, target_poc, poc, ref_pocs[l][f.ref_idx as usize])
    })
  })
}

/// Motion vector predictors of reference `ref_idx` of list `list`.
pub fn amvp_candidates(
  fi: &FrameInvariants, nb: &PuNeighbours, col: Option<&Collocated>,
  list: usize, ref_idx: usize, ref_pocs: &[Vec<i32>; 2],
) -> [MotionVector; AMVP_MAX_NUM_CANDS] {
  let target = ref_pocs[list][ref_idx];
  let poc = fi.poc;
  let left = [nb.a0(), nb.a1()];
  let above = [nb.b0(), nb.b1(), nb.b2()];

  let mut a = left
    .iter()
    .flatten()
    .find_map(|p| same_ref_mv(p, list, target, ref_pocs))
    .or_else(|| {
      left
        .iter()
        .flatten()
        .find_map(|p| scaled_ref_mv(p, list, poc, target, ref_pocs))
    });
  let mut b = above
    .iter()
    .flatten()
    .find_map(|p| same_ref_mv(p, list, target, ref_pocs));
  // with no inter block on the left the above predictor moves to the left
  // slot and a scaled one may take its place
  if left.iter().all(Option::is_none) {
    if b.is_some() {
      a = b;
    }
    b = above
      .iter()
      .flatten()
      .find_map(|p| scaled_ref_mv(p, list, poc, target, ref_pocs));
  }

  let mut cands: ArrayVec<MotionVector, 3> = a.into_iter().chain(b).collect();
  if cands.len() == 2 && cands[0] == cands[1] {
    cands.pop();
  }
  if cands.len() < AMVP_MAX_NUM_CANDS {
    if let Some(t) = col.and_then(|c| c.mv(fi, nb, list, target)) {
      cands.push(t);
    }
  }
  while cands.len() < AMVP_MAX_NUM_CANDS {
    cands.push(MotionVector::ZERO);
  }
  [cands[0], cands[1]]
}

/// Motion compensated prediction of the PU at luma offset `(px, py)`, size
/// `w`x`h`, of the CU at `geom` into `dst`, for the planes in `planes`.
pub fn predict_inter<T: Pixel>(
  fi: &FrameInvariants, refs: &[Vec<Arc<ReferenceFrame<T>>>; 2],
  dst: &mut Yuv<T>, geom: &CuGeom, rect: (usize, usize, usize, usize),
  motion: &PuMotion, planes: Range<usize>,
) {
  let (px, py, pw, ph) = rect;
  for p in planes {
    let (xd, yd) = dst.dec(p);
    let (x, y) = ((geom.x + px) >> xd, (geom.y + py) >> yd);
    let (w, h) = (pw >> xd, ph >> yd);
    let stride = dst.stride(p);
    let luma = p == 0;
    let plane = |l: usize| {
      &refs[l][motion.mv[l].ref_idx as usize].frame.planes[p]
    };
    let out = dst.at_mut(p, px, py);
    if motion.inter_dir == INTER_DIR_BI {
      let mut t0 = vec![0i16; w * h];
      let mut t1 = vec![0i16; w * h];
      let bd = fi.bit_depth;
      prep_8tap(&mut t0, plane(0), x, y, w, h, motion.mv[0].mv, luma, bd);
      prep_8tap(&mut t1, plane(1), x, y, w, h, motion.mv[1].mv, luma, bd);
      mc_avg(out, stride, &t0, &t1, w, h, bd);
    } else {
      let l = motion.uses(1) as usize;
      let mv = motion.mv[l].mv;
      put_8tap(out, stride, plane(l), x, y, w, h, mv, luma, fi.bit_depth);
    }
  }
}

/// Outcome of the motion search of one list of a PU.
#[derive(Clone, Copy, Debug)]
struct ListSearch {
  mv: MvField,
  mvp: MotionVector,
  mvp_idx: u8,
  cost: u64,
}

/// Applies `f` to every partition of PU `pu`.
pub fn update_pu<T: Pixel>(
  cu: &mut CodingUnit<T>, part_size: PartSize, pu: usize,
  mut f: impl FnMut(&mut PartInfo),
) {
  let n = cu.num_parts();
  for (rel, p) in cu.parts.iter_mut().enumerate() {
    if part_size.pu_of_part(n, rel) == pu {
      f(p);
    }
  }
}

impl<'a, T: Pixel> CuSearch<'a, T> {
  /// Searches the best uni or bi-directional motion of PU `pu`.
  fn search_pu(
    &self, fs: &FrameState<T>, nb: &PuNeighbours, col: Option<&Collocated>,
    ref_pocs: &[Vec<i32>; 2], org: &Yuv<T>, rect: (usize, usize),
    allow_bi: bool,
  ) -> (PuMotion, [MotionVector; 2], [u8; 2]) {
    let fi = self.fi;
    let mut best: [Option<ListSearch>; 2] = [None; 2];
    for list in 0..fi.slice_type.num_lists() {
      for ref_idx in 0..fi.num_refs[list] {
        let amvp = amvp_candidates(fi, nb, col, list, ref_idx, ref_pocs);
        let blk = MeBlock::new(
          nb.x,
          nb.y,
          nb.w,
          nb.h,
          fi.width,
          fi.height,
          amvp[0],
          fi.search.search_range,
        );
        let reference = &fs.refs[list][ref_idx].frame.planes[0];
        let (mv, cost) = motion_estimation(
          &fs.input.planes[0],
          reference,
          &blk,
          &amvp,
          amvp[0],
          &fi.rd,
        );
        let mvp_idx = (mv_bits(mv, amvp[1]) < mv_bits(mv, amvp[0])) as usize;
        let ref_cost = fi.rd.calc_rd_sad_cost(0, ref_idx as u32);
        let cost = cost.saturating_add(ref_cost);
        if best[list].map_or(true, |b| cost < b.cost) {
          best[list] = Some(ListSearch {
            mv: MvField::new(mv, ref_idx as i8),
            mvp: amvp[mvp_idx],
            mvp_idx: mvp_idx as u8,
            cost,
          });
        }
      }
    }

    let uni = |l: usize, s: ListSearch| {
      let mut mvd = [MotionVector::ZERO; 2];
      let mut mvp_idx = [0; 2];
      mvd[l] = s.mv.mv - s.mvp;
      mvp_idx[l] = s.mvp_idx;
      (PuMotion::uni(l, s.mv), mvd, mvp_idx, s.cost)
    };
    let mut choice = match best {
      [Some(s0), Some(s1)] if s1.cost < s0.cost => uni(1, s1),
      [Some(s0), _] => uni(0, s0),
      [None, Some(s1)] => uni(1, s1),
      [None, None] => unreachable!("inter search without references"),
    };

    if let ([Some(s0), Some(s1)], true) = (best, allow_bi) {
      let motion = PuMotion::bi(s0.mv, s1.mv);
      let (w, h) = (nb.w, nb.h);
      let mut t0 = vec![0i16; w * h];
      let mut t1 = vec![0i16; w * h];
      let mut pred = vec![T::cast_from(0u8); w * h];
      let bd = fi.bit_depth;
      for (tmp, l, s) in [(&mut t0, 0, s0), (&mut t1, 1, s1)] {
        let src = &fs.refs[l][s.mv.ref_idx as usize].frame.planes[0];
        prep_8tap(tmp, src, nb.x, nb.y, w, h, s.mv.mv, true, bd);
      }
      mc_avg(&mut pred, w, &t0, &t1, w, h, bd);
      let (ox, oy) = rect;
      let sad =
        self.prims.sad(w, h, org.at(0, ox, oy), org.stride(0), &pred, w);
      let bits = mv_bits(s0.mv.mv, s0.mvp)
        + mv_bits(s1.mv.mv, s1.mvp)
        + s0.mv.ref_idx as u32
        + s1.mv.ref_idx as u32;
      let cost = fi.rd.calc_rd_sad_cost(sad, bits);
      if cost < choice.3 {
        choice = (
          motion,
          [s0.mv.mv - s0.mvp, s1.mv.mv - s1.mvp],
          [s0.mvp_idx, s1.mvp_idx],
          cost,
        );
      }
    }
    (choice.0, choice.1, choice.2)
  }

  /// Evaluates the AMVP coded inter CU with `part_size` at `geom`.
  pub(crate) fn check_inter(
    &mut self, fs: &mut FrameState<T>, geom: CuGeom, part_size: PartSize,
  ) {
    let fi = self.fi;
    let d = geom.depth;
    let col = Collocated::new(fi, fs);
    let ref_pocs = fs.ref_pocs(fi);
    let allow_bi = fi.slice_type == SliceType::B
      && bi_allowed(geom.log2_size, part_size);

    init_candidate(fi, &mut self.md[d].temp, geom, part_size, PredMode::Inter);
    for pu in 0..part_size.num_pus() {
      let (px, py, w, h) = part_size.pu_rect(geom.size(), pu);
      let (motion, mvd, mvp_idx) = {
        let DepthScratch { temp, org, .. } = &self.md[d];
        let nb =
          PuNeighbours::new(&fs.store, &geom, &temp.parts, part_size, pu);
        let rect = (px, py);
        self.search_pu(fs, &nb, col.as_ref(), &ref_pocs, org, rect, allow_bi)
      };
      let temp = &mut self.md[d].temp;
      update_pu(temp, part_size, pu, |p| {
        p.merge = false;
        p.inter_dir = motion.inter_dir;
        p.mv = motion.mv;
        p.mvd = mvd;
        p.mvp_idx = mvp_idx;
      });
      let rect = (px, py, w, h);
      predict_inter(fi, &fs.refs, &mut temp.pred, &geom, rect, &motion, 0..3);
    }
    {
      let DepthScratch { temp, org, .. } = &mut self.md[d];
      let bypass = temp.parts[0].transquant_bypass;
      let coder = TuCoder::new(fi, &self.prims, false, bypass);
      encode_inter_residual(fi, &coder, temp, org);
    }

    self.finish_candidate(fs, d);
    self.check_best(d);
  }
}

#[cfg(test)]
mod test {
  use super::*;
  use crate::api::*;
  use pretty_assertions::assert_eq;

  #[test]
  fn scaling_follows_poc_distance() {
    let mv = MotionVector::new(8, -16);
    // same distance
    assert_eq!(scale_mv(mv, 4, 2, 8, 6), mv);
    // twice the distance
    assert_eq!(scale_mv(mv, 4, 0, 4, 2), MotionVector::new(16, -32));
    // opposite direction
    assert_eq!(scale_mv(mv, 4, 6, 4, 2), MotionVector::new(-8, 16));
  }

  fn fi() -> FrameInvariants {
    let config = EncoderConfig {
      width: 64,
      height: 64,
      slice_type: SliceType::P,
      ref_count: [2, 0],
      temporal_mvp: false,
      ..Default::default()
    };
    FrameInvariants::new(config, 4).unwrap()
  }

  fn committed(store: &mut CuStore, geom: CuGeom, motion: PuMotion) {
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

  #[test]
  fn amvp_prefers_left_then_above() {
    let f = fi();
    let ref_pocs = [vec![3, 2], vec![]];
    let mut store = CuStore::new(64, 64, 6, ChromaSampling::Cs420, vec![0]);
    let lcu = CuGeom::lcu(0, 0, 0, 6);
    let left = MvField::new(MotionVector::new(4, 4), 0);
    let above = MvField::new(MotionVector::new(-8, 12), 0);
    committed(&mut store, lcu.child(0), PuMotion::uni(0, above));
    committed(&mut store, lcu.child(2), PuMotion::uni(0, left));

    let geom = lcu.child(3);
    let parts = vec![PartInfo::default(); geom.num_parts()];
    let nb = PuNeighbours::new(&store, &geom, &parts, PartSize::Size2Nx2N, 0);
    assert!(nb.a1().is_some() && nb.b2().is_some());
    let amvp = amvp_candidates(&f, &nb, None, 0, 0, &ref_pocs);
    assert_eq!(amvp, [left.mv, above.mv]);

    // a neighbour pointing elsewhere is scaled: distance 2 instead of 1
    let amvp = amvp_candidates(&f, &nb, None, 0, 1, &ref_pocs);
    assert_eq!(amvp[0], left.mv.scale(512));
  }

  #[test]
  fn amvp_fills_with_zero() {
    let f = fi();
    let store = CuStore::new(64, 64, 6, ChromaSampling::Cs420, vec![0]);
    let geom = CuGeom::lcu(0, 0, 0, 6);
    let parts = vec![PartInfo::default(); geom.num_parts()];
    let nb = PuNeighbours::new(&store, &geom, &parts, PartSize::Size2Nx2N, 0);
    let amvp = amvp_candidates(&f, &nb, None, 0, 0, &[vec![3, 2], vec![]]);
    assert_eq!(amvp, [MotionVector::ZERO; 2]);
  }

  #[test]
  fn second_pu_sees_the_first() {
    let store = CuStore::new(64, 64, 6, ChromaSampling::Cs420, vec![0]);
    let geom = CuGeom::lcu(0, 0, 0, 6).child(0);
    let mut parts = vec![PartInfo::default(); geom.num_parts()];
    let n = parts.len();
    for (rel, p) in parts.iter_mut().enumerate() {
      p.pred_mode = PredMode::Inter;
      if PartSize::SizeNx2N.pu_of_part(n, rel) == 0 {
        p.inter_dir = INTER_DIR_L0;
        p.mv[0] = MvField::new(MotionVector::new(1, 1), 0);
      }
    }
    let nb = PuNeighbours::new(&store, &geom, &parts, PartSize::SizeNx2N, 1);
    assert_eq!(nb.a1().map(PuMotion::of), Some(PuMotion::of(&parts[0])));
    let nb = PuNeighbours::new(&store, &geom, &parts, PartSize::SizeNx2N, 0);
    assert!(nb.a1().is_none() && nb.b0().is_none());
  }
}
