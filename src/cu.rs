// Copyright (c) 2024, The cuquad contributors. All rights reserved
//
// This source code is subject to the terms of the BSD 2 Clause License and
// the Alliance for Open Media Patent License 1.0. If the BSD 2 Clause License
// was not distributed with this source code in the LICENSE file, you can
// obtain it at www.aomedia.org/license/software. If the Alliance for Open
// Media Patent License 1.0 was not distributed with this source code in the
// PATENTS file, you can obtain it at www.aomedia.org/license/patent.

//! Coding unit data: the per-partition decisions of a CU under evaluation,
//! the picture-wide store they are committed to, and neighbour access.

use crate::frame::ChromaSampling;
use crate::mc::*;
use crate::partition::*;
use crate::predict::most_probable_modes;
use crate::rdo::MAX_COST;
use crate::util::*;
use crate::yuv::Yuv;

use crate::context::NUM_MOST_PROBABLE_MODES;

/// Decisions carried by one 4x4 luma partition.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PartInfo {
  pub depth: u8,
  pub part_size: PartSize,
  pub pred_mode: PredMode,
  pub skip: bool,
  pub merge: bool,
  pub merge_idx: u8,
  /// Bit 0 for list 0, bit 1 for list 1.
  pub inter_dir: u8,
  pub mv: [MvField; 2],
  pub mvd: [MotionVector; 2],
  pub mvp_idx: [u8; 2],
  pub luma_dir: u8,
  /// Chroma candidate index, [`DM_CHROMA_IDX`] for the luma direction.
  pub chroma_idx: u8,
  /// Transform depth of the leaves.
  pub tr_idx: u8,
  /// Coded block flags per component, bit `d` for transform depth `d`.
  pub cbf: [u8; 3],
  pub qp: i8,
  pub transquant_bypass: bool,
}

impl Default for PartInfo {
  fn default() -> Self {
    PartInfo {
      depth: 0,
      part_size: PartSize::None,
      pred_mode: PredMode::None,
      skip: false,
      merge: false,
      merge_idx: 0,
      inter_dir: 0,
      mv: [MvField::NONE; 2],
      mvd: [MotionVector::ZERO; 2],
      mvp_idx: [0; 2],
      luma_dir: DC_IDX,
      chroma_idx: DM_CHROMA_IDX,
      tr_idx: 0,
      cbf: [0; 3],
      qp: 0,
      transquant_bypass: false,
    }
  }
}

impl PartInfo {
  #[inline]
  pub fn is_intra(&self) -> bool {
    self.pred_mode == PredMode::Intra
  }

  #[inline]
  pub fn is_inter(&self) -> bool {
    self.pred_mode == PredMode::Inter
  }

  #[inline]
  pub fn cbf_at(&self, comp: usize, tr_depth: usize) -> bool {
    (self.cbf[comp] >> tr_depth) & 1 != 0
  }
}

/// Number of coefficients carried by one partition in component `comp`.
#[inline]
pub const fn coeffs_per_part(comp: usize, xdec: usize, ydec: usize) -> usize {
  let luma = 1 << (2 * PART_LOG2);
  if comp == 0 {
    luma
  } else {
    luma >> (xdec + ydec)
  }
}

/// A CU under evaluation.
#[derive(Clone, Debug)]
pub struct CodingUnit<T: Pixel> {
  pub geom: CuGeom,
  /// Per partition data in z-order, relative to the CU origin.
  pub parts: Vec<PartInfo>,
  pub coeff: [Vec<i32>; 3],
  pub pred: Yuv<T>,
  pub reco: Yuv<T>,
  pub distortion: u64,
  pub bits: u32,
  pub cost: u64,
}

impl<T: Pixel> CodingUnit<T> {
  pub fn new(log2: usize, cs: ChromaSampling) -> Self {
    let (xdec, ydec) = cs.decimation();
    let num_parts = 1 << (2 * (log2 - PART_LOG2));
    CodingUnit {
      geom: CuGeom::default(),
      parts: vec![PartInfo::default(); num_parts],
      coeff: [
        vec![0; num_parts * coeffs_per_part(0, xdec, ydec)],
        vec![0; num_parts * coeffs_per_part(1, xdec, ydec)],
        vec![0; num_parts * coeffs_per_part(2, xdec, ydec)],
      ],
      pred: Yuv::new(log2, cs),
      reco: Yuv::new(log2, cs),
      distortion: 0,
      bits: 0,
      cost: MAX_COST,
    }
  }

  /// Resets the CU for a visit of the quadtree node `geom`.
  pub fn init_cu(&mut self, geom: CuGeom, qp: i32) {
    debug_assert_eq!(geom.num_parts(), self.parts.len());
    self.geom = geom;
    let part = PartInfo {
      depth: geom.depth as u8,
      qp: qp as i8,
      ..Default::default()
    };
    self.parts.fill(part);
    for c in &mut self.coeff {
      c.fill(0);
    }
    self.distortion = 0;
    self.bits = 0;
    self.cost = MAX_COST;
  }

  /// Resets the CU for child `idx` of `parent`.
  pub fn init_sub_cu(&mut self, parent: &CuGeom, idx: usize, qp: i32) {
    self.init_cu(parent.child(idx), qp);
  }

  /// Starts an accumulation of the children of the node: zero cost.
  pub fn init_split(&mut self, geom: CuGeom, qp: i32) {
    self.init_cu(geom, qp);
    self.cost = 0;
  }

  #[inline]
  pub fn num_parts(&self) -> usize {
    self.parts.len()
  }

  /// Applies `f` to the partitions `rel .. rel + n`.
  pub fn update_parts(
    &mut self, rel: usize, n: usize, mut f: impl FnMut(&mut PartInfo),
  ) {
    self.parts[rel..rel + n].iter_mut().for_each(|p| f(p));
  }

  /// Sets the prediction unit layout and mode of the whole CU.
  pub fn set_mode(&mut self, part_size: PartSize, pred_mode: PredMode) {
    for p in &mut self.parts {
      p.part_size = part_size;
      p.pred_mode = pred_mode;
    }
  }

  pub fn root_cbf(&self) -> bool {
    self.parts.iter().any(|p| p.cbf.iter().any(|&c| c & 1 != 0))
  }

  /// Clears the residual: flags and coefficients.
  pub fn clear_residual(&mut self) {
    for p in &mut self.parts {
      p.cbf = [0; 3];
    }
    for c in &mut self.coeff {
      c.fill(0);
    }
  }

  /// Copies the decisions, coefficients and reconstruction of `child`, a
  /// quadtree child of this node, and accumulates its cost.
  pub fn copy_part_from(&mut self, child: &CodingUnit<T>) {
    let rel = child.geom.abs_idx - self.geom.abs_idx;
    let n = child.num_parts();
    self.parts[rel..rel + n].copy_from_slice(&child.parts);
    for c in 0..3 {
      let per = child.coeff[c].len() / n;
      self.coeff[c][rel * per..(rel + n) * per]
        .copy_from_slice(&child.coeff[c]);
    }
    let off_x = child.geom.x - self.geom.x;
    let off_y = child.geom.y - self.geom.y;
    self.reco.copy_part_from(&child.reco, off_x, off_y);
    self.distortion += child.distortion;
    self.bits += child.bits;
    self.cost = self.cost.saturating_add(child.cost);
  }
}

/// Running average RD cost of the decisions made at one depth of an LCU.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DepthCostStats {
  pub avg_cost: u64,
  pub count: u64,
}

impl DepthCostStats {
  pub fn update(&mut self, cost: u64) {
    let total = self.avg_cost as u128 * self.count as u128 + cost as u128;
    self.count += 1;
    self.avg_cost = (total / self.count as u128) as u64;
  }

  #[inline]
  fn total(&self) -> u128 {
    self.avg_cost as u128 * self.count as u128
  }
}

/// Committed decisions of a whole picture.
#[derive(Clone, Debug)]
pub struct CuStore {
  pub width: usize,
  pub height: usize,
  pub lcu_log2: usize,
  pub lcu_cols: usize,
  pub lcu_rows: usize,
  pub xdec: usize,
  pub ydec: usize,
  /// Slice segment start addresses, the first one being 0.
  pub slice_starts: Vec<usize>,
  /// Per partition data, `lcu_addr * parts_per_lcu + z`.
  pub parts: Vec<PartInfo>,
  pub coeff: [Vec<i32>; 3],
  pub stats: Vec<[DepthCostStats; MAX_CU_DEPTH]>,
}

impl CuStore {
  pub fn new(
    width: usize, height: usize, lcu_log2: usize, cs: ChromaSampling,
    slice_starts: Vec<usize>,
  ) -> Self {
    let (xdec, ydec) = cs.decimation();
    let lcu_cols = width.align_power_of_two_and_shift(lcu_log2);
    let lcu_rows = height.align_power_of_two_and_shift(lcu_log2);
    let num_parts =
      lcu_cols * lcu_rows * (1 << (2 * (lcu_log2 - PART_LOG2)));
    let slice_starts =
      if slice_starts.is_empty() { vec![0] } else { slice_starts };
    CuStore {
      width,
      height,
      lcu_log2,
      lcu_cols,
      lcu_rows,
      xdec,
      ydec,
      slice_starts,
      parts: vec![PartInfo::default(); num_parts],
      coeff: [
        vec![0; num_parts * coeffs_per_part(0, xdec, ydec)],
        vec![0; num_parts * coeffs_per_part(1, xdec, ydec)],
        vec![0; num_parts * coeffs_per_part(2, xdec, ydec)],
      ],
      stats: vec![Default::default(); lcu_cols * lcu_rows],
    }
  }

  #[inline]
  pub const fn parts_per_lcu(&self) -> usize {
    1 << (2 * (self.lcu_log2 - PART_LOG2))
  }

  #[inline]
  pub fn num_lcus(&self) -> usize {
    self.lcu_cols * self.lcu_rows
  }

  /// Luma origin of LCU `addr`.
  #[inline]
  pub fn lcu_origin(&self, addr: usize) -> (usize, usize) {
    (
      (addr % self.lcu_cols) << self.lcu_log2,
      (addr / self.lcu_cols) << self.lcu_log2,
    )
  }

  pub fn lcu_geom(&self, addr: usize) -> CuGeom {
    let (x, y) = self.lcu_origin(addr);
    CuGeom::lcu(x, y, addr, self.lcu_log2)
  }

  /// Coding order address of the partition at `(x4, y4)`, in partition
  /// units, when it lies inside the picture.
  pub fn key(&self, x4: isize, y4: isize) -> Option<usize> {
    if x4 < 0 || y4 < 0 {
      return None;
    }
    let (x4, y4) = (x4 as usize, y4 as usize);
    if x4 << PART_LOG2 >= self.width || y4 << PART_LOG2 >= self.height {
      return None;
    }
    let shift = self.lcu_log2 - PART_LOG2;
    let addr = (y4 >> shift) * self.lcu_cols + (x4 >> shift);
    let mask = (1 << shift) - 1;
    Some(addr * self.parts_per_lcu() + morton_encode(x4 & mask, y4 & mask))
  }

  /// Start address of the slice segment holding `key`.
  pub fn slice_start(&self, key: usize) -> usize {
    let idx = self.slice_starts.partition_point(|&s| s <= key);
    self.slice_starts[idx - 1]
  }

  /// End address, exclusive, of the slice segment holding `key`.
  pub fn slice_end(&self, key: usize) -> usize {
    let idx = self.slice_starts.partition_point(|&s| s <= key);
    self
      .slice_starts
      .get(idx)
      .copied()
      .unwrap_or(self.num_lcus() * self.parts_per_lcu())
  }

  /// Whether the node starts a slice segment strictly inside itself.
  pub fn straddles_slice(&self, geom: &CuGeom) -> bool {
    let start = geom.global_addr();
    let end = start + geom.num_parts();
    self.slice_starts.iter().any(|&s| s > start && s < end)
  }

  /// Commits the decided fields and coefficients of `cu`.
  pub fn copy_to_pic<T: Pixel>(&mut self, cu: &CodingUnit<T>) {
    let first = cu.parts[0];
    assert!(first.part_size != PartSize::None, "partition size not decided");
    assert!(first.pred_mode != PredMode::None, "prediction mode not decided");
    assert!(cu.cost != MAX_COST, "committed CU has no cost");

    let base = cu.geom.global_addr();
    let n = cu.num_parts();
    self.parts[base..base + n].copy_from_slice(&cu.parts);
    for c in 0..3 {
      let per = coeffs_per_part(c, self.xdec, self.ydec);
      self.coeff[c][base * per..(base + n) * per]
        .copy_from_slice(&cu.coeff[c][..n * per]);
    }
  }

  /// Decisions of the node `geom`.
  #[inline]
  pub fn cu_parts(&self, geom: &CuGeom) -> &[PartInfo] {
    let base = geom.global_addr();
    &self.parts[base..base + geom.num_parts()]
  }

  /// Coefficients of the node `geom`, per component.
  pub fn cu_coeffs(&self, geom: &CuGeom) -> [&[i32]; 3] {
    let base = geom.global_addr();
    let n = geom.num_parts();
    let slice = |c: usize| {
      let per = coeffs_per_part(c, self.xdec, self.ydec);
      &self.coeff[c][base * per..(base + n) * per]
    };
    [slice(0), slice(1), slice(2)]
  }

  /// LCU addresses of the above-left, above, above-right and left
  /// neighbours of `addr` that lie in the picture.
  pub fn neighbour_lcus(&self, addr: usize) -> impl Iterator<Item = usize> {
    let cols = self.lcu_cols as isize;
    let x = (addr % self.lcu_cols) as isize;
    let y = (addr / self.lcu_cols) as isize;
    [(-1, -1), (0, -1), (1, -1), (-1, 0)]
      .into_iter()
      .filter(move |&(dx, dy)| {
        (0..cols).contains(&(x + dx)) && y + dy >= 0
      })
      .map(move |(dx, dy)| ((y + dy) * cols + x + dx) as usize)
  }

  /// Blended running average cost at `depth` of LCU `addr` and its
  /// neighbours, 0 when nothing was recorded yet.
  pub fn blended_average(
    &self, addr: usize, depth: usize, cu_weight: u64, neighbour_weight: u64,
  ) -> u64 {
    let own = self.stats[addr][depth];
    let (nb_cost, nb_count) = self
      .neighbour_lcus(addr)
      .map(|a| self.stats[a][depth])
      .fold((0u128, 0u128), |(c, n), s| (c + s.total(), n + s.count as u128));
    let num =
      cu_weight as u128 * own.total() + neighbour_weight as u128 * nb_cost;
    let den = cu_weight as u128 * own.count as u128
      + neighbour_weight as u128 * nb_count;
    if den == 0 {
      0
    } else {
      (num / den).min(u64::MAX as u128) as u64
    }
  }
}

/// Neighbour access for the block whose first partition has coding order
/// address `cur_key`: a partition is available when it is inside the
/// picture, in the same slice segment and earlier in coding order. The
/// partitions of `cur`, a CU still under evaluation, take precedence over
/// the committed ones.
#[derive(Clone, Copy)]
pub struct CuView<'a> {
  pub store: &'a CuStore,
  cur: Option<(&'a CuGeom, &'a [PartInfo])>,
  cur_key: usize,
  slice_start: usize,
}

impl<'a> CuView<'a> {
  /// View for coding the committed node starting at `key`.
  pub fn new(store: &'a CuStore, key: usize) -> Self {
    let slice_start = store.slice_start(key);
    CuView { store, cur: None, cur_key: key, slice_start }
  }

  /// View for a CU under evaluation, seen from its relative partition
  /// `rel`.
  pub fn with_cu(
    store: &'a CuStore, geom: &'a CuGeom, parts: &'a [PartInfo], rel: usize,
  ) -> Self {
    let key = geom.global_addr() + rel;
    CuView {
      store,
      cur: Some((geom, parts)),
      cur_key: key,
      slice_start: store.slice_start(geom.global_addr()),
    }
  }

  /// The same view seen from relative partition `rel` of `geom`.
  pub fn at(&self, geom: &CuGeom, rel: usize) -> Self {
    CuView { cur_key: geom.global_addr() + rel, ..*self }
  }

  #[inline]
  pub fn available(&self, x4: isize, y4: isize) -> bool {
    self
      .store
      .key(x4, y4)
      .map_or(false, |k| k < self.cur_key && k >= self.slice_start)
  }

  /// Whether the sample at `(px, py)` of a plane with decimation
  /// `(xdec, ydec)` is reconstructed.
  #[inline]
  pub fn sample_available(
    &self, px: isize, py: isize, xdec: usize, ydec: usize,
  ) -> bool {
    if px < 0 || py < 0 {
      return false;
    }
    self.available((px << xdec) >> PART_LOG2, (py << ydec) >> PART_LOG2)
  }

  pub fn part(&self, x4: isize, y4: isize) -> Option<&'a PartInfo> {
    if !self.available(x4, y4) {
      return None;
    }
    if let Some((geom, parts)) = self.cur {
      if let Some(rel) = geom.rel_part(x4, y4) {
        return Some(&parts[rel]);
      }
    }
    let key = self.store.key(x4, y4)?;
    Some(&self.store.parts[key])
  }

  /// Left and above neighbours of the partition at `(x4, y4)`.
  pub fn left_above(
    &self, x4: isize, y4: isize,
  ) -> (Option<&'a PartInfo>, Option<&'a PartInfo>) {
    (self.part(x4 - 1, y4), self.part(x4, y4 - 1))
  }

  /// Context of `split_cu_flag` for the node `geom`.
  pub fn split_ctx(&self, geom: &CuGeom) -> usize {
    let (x4, y4) = geom.part_pos(0);
    let (l, a) = self.left_above(x4 as isize, y4 as isize);
    let deeper = |p: Option<&PartInfo>| {
      p.map_or(0, |p| (p.depth as usize > geom.depth) as usize)
    };
    deeper(l) + deeper(a)
  }

  /// Context of `cu_skip_flag` for the node `geom`.
  pub fn skip_ctx(&self, geom: &CuGeom) -> usize {
    let (x4, y4) = geom.part_pos(0);
    let (l, a) = self.left_above(x4 as isize, y4 as isize);
    let skipped = |p: Option<&PartInfo>| p.map_or(0, |p| p.skip as usize);
    skipped(l) + skipped(a)
  }

  /// Most probable luma modes of the PU whose first partition is `rel`.
  pub fn intra_dir_pred(
    &self, geom: &CuGeom, rel: usize,
  ) -> [u8; NUM_MOST_PROBABLE_MODES] {
    let (x4, y4) = geom.part_pos(rel);
    let view = self.at(geom, rel);
    let (l, a) = view.left_above(x4 as isize, y4 as isize);
    let dir = |p: Option<&PartInfo>| match p {
      Some(p) if p.is_intra() => p.luma_dir,
      _ => DC_IDX,
    };
    // the above neighbour must be in the same LCU row
    let lcu_top = (geom.y >> geom.lcu_log2) << geom.lcu_log2;
    let above =
      if (y4 << PART_LOG2) > lcu_top { dir(a) } else { DC_IDX };
    most_probable_modes(dir(l), above)
  }
}

/// Motion kept by a reference picture for temporal prediction.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ColMotion {
  pub mv: [MvField; 2],
  /// Picture order count of the picture each vector points to.
  pub ref_poc: [i32; 2],
}

/// Motion field of a picture compressed to one entry per 16x16 block.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MotionField {
  pub cols: usize,
  pub rows: usize,
  pub data: Vec<ColMotion>,
}

pub const MOTION_FIELD_LOG2: usize = 4;

impl MotionField {
  /// Samples the committed motion of `store`; `ref_pocs[l][i]` is the
  /// picture order count of reference `i` of list `l`.
  pub fn from_store(store: &CuStore, ref_pocs: &[Vec<i32>; 2]) -> Self {
    let cols = store.width.align_power_of_two_and_shift(MOTION_FIELD_LOG2);
    let rows = store.height.align_power_of_two_and_shift(MOTION_FIELD_LOG2);
    let step = 1 << (MOTION_FIELD_LOG2 - PART_LOG2);
    let mut data = Vec::with_capacity(cols * rows);
    for by in 0..rows {
      for bx in 0..cols {
        let key = store.key((bx * step) as isize, (by * step) as isize);
        let mut col = ColMotion::default();
        col.mv = [MvField::NONE; 2];
        if let Some(p) = key.map(|k| &store.parts[k]) {
          if p.is_inter() {
            for l in 0..2 {
              if p.mv[l].is_valid() {
                col.mv[l] = p.mv[l];
                col.ref_poc[l] = ref_pocs[l][p.mv[l].ref_idx as usize];
              }
            }
          }
        }
        data.push(col);
      }
    }
    MotionField { cols, rows, data }
  }

  /// Motion of the block covering luma position `(x, y)`.
  pub fn at(&self, x: usize, y: usize) -> Option<&ColMotion> {
    let (bx, by) = (x >> MOTION_FIELD_LOG2, y >> MOTION_FIELD_LOG2);
    if bx < self.cols && by < self.rows {
      Some(&self.data[by * self.cols + bx])
    } else {
      None
    }
  }
}

#[cfg(test)]
mod test {
  use super::*;
  use pretty_assertions::assert_eq;

  fn store() -> CuStore {
    CuStore::new(128, 64, 5, ChromaSampling::Cs420, vec![0, 128])
  }

  fn decided<T: Pixel>(geom: CuGeom) -> CodingUnit<T> {
    let mut cu = CodingUnit::<T>::new(geom.log2_size, ChromaSampling::Cs420);
    cu.init_cu(geom, 30);
    cu.set_mode(PartSize::Size2Nx2N, PredMode::Intra);
    cu.cost = 10;
    cu
  }

  #[test]
  fn keys_follow_lcu_raster_then_zorder() {
    let s = store();
    assert_eq!(s.key(0, 0), Some(0));
    assert_eq!(s.key(8, 0), Some(64));
    assert_eq!(s.key(1, 1), Some(3));
    assert_eq!(s.key(0, 8), Some(4 * 64));
    assert_eq!(s.key(-1, 0), None);
    assert_eq!(s.key(32, 0), None);
    assert_eq!(s.slice_start(130), 128);
    assert_eq!(s.slice_end(3), 128);
    assert_eq!(s.slice_end(200), 8 * 64);
  }

  #[test]
  fn straddling_nodes_are_detected() {
    let s = store();
    // slice segment 1 starts at LCU 2
    let lcu = s.lcu_geom(1);
    assert!(!s.straddles_slice(&lcu));
    let s = CuStore::new(128, 64, 5, ChromaSampling::Cs420, vec![0, 16]);
    assert!(s.straddles_slice(&s.lcu_geom(0)));
    assert!(!s.straddles_slice(&s.lcu_geom(0).child(0)));
    assert!(!s.straddles_slice(&s.lcu_geom(0).child(1)));
  }

  #[test]
  fn availability_respects_order_and_slices() {
    let mut s = store();
    let geom = s.lcu_geom(1).child(2);
    let cu = decided::<u8>(geom);
    s.copy_to_pic(&cu);
    // view from LCU 2 (second slice) towards LCU 1 (first slice)
    let v = CuView::new(&s, 128);
    assert!(!v.available(7, 8));
    // view from LCU 1 child 3
    let v = CuView::new(&s, s.lcu_geom(1).child(3).global_addr());
    assert!(v.available(8, 4));
    assert!(v.available(12, 0));
    assert_eq!(v.part(8, 4).map(|p| p.pred_mode), Some(PredMode::Intra));
    assert!(!v.available(13, 5));
  }

  #[test]
  fn in_progress_cu_overrides_store() {
    let s = store();
    let geom = s.lcu_geom(0).child(0);
    let mut cu = decided::<u8>(geom);
    cu.set_mode(PartSize::SizeNxN, PredMode::Intra);
    cu.update_parts(0, 4, |p| p.luma_dir = 17);
    let v = CuView::with_cu(&s, &geom, &cu.parts, 4);
    let preds = v.intra_dir_pred(&geom, 4);
    // left of the second PU is the first one, above is outside the picture
    assert_eq!(preds[0], 17);
    assert_eq!(v.part(1, 0).map(|p| p.luma_dir), Some(17));
  }

  #[test]
  #[should_panic(expected = "prediction mode not decided")]
  fn undecided_commit_panics() {
    let mut s = store();
    let geom = s.lcu_geom(0);
    let mut cu = decided::<u8>(geom);
    cu.set_mode(PartSize::Size2Nx2N, PredMode::None);
    s.copy_to_pic(&cu);
  }

  #[test]
  fn running_average_and_blend() {
    let mut s = store();
    s.stats[0][1].update(100);
    s.stats[0][1].update(200);
    assert_eq!(s.stats[0][1], DepthCostStats { avg_cost: 150, count: 2 });
    s.stats[4][1].update(400);
    // LCU 5 sees LCU 4 on its left and LCU 0 above-left
    assert_eq!(s.blended_average(5, 1, 3, 2), (2 * 300 + 2 * 400) / (2 * 3));
    assert_eq!(s.blended_average(5, 2, 3, 2), 0);
    let nb: Vec<_> = s.neighbour_lcus(5).collect();
    assert_eq!(nb, vec![0, 1, 2, 4]);
  }

  #[test]
  fn split_accumulates_children() {
    let parent = CuGeom::lcu(0, 0, 0, 4);
    let mut split = CodingUnit::<u8>::new(4, ChromaSampling::Cs420);
    split.init_split(parent, 30);
    for i in 0..4 {
      let mut child = decided::<u8>(parent.child(i));
      child.parts.iter_mut().for_each(|p| p.luma_dir = i as u8);
      child.reco.planes[0].fill(i as u8);
      child.distortion = 5;
      split.copy_part_from(&child);
    }
    assert_eq!(split.cost, 40);
    assert_eq!(split.distortion, 20);
    assert_eq!(split.parts[4 * 3].luma_dir, 3);
    assert_eq!(split.reco.planes[0][15], 1);
    assert_eq!(split.reco.planes[0][16 * 15], 2);
  }
}
