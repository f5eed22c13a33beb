// Copyright (c) 2024, The cuquad contributors. All rights reserved
//
// This source code is subject to the terms of the BSD 2 Clause License and
// the Alliance for Open Media Patent License 1.0. If the BSD 2 Clause License
// was not distributed with this source code in the LICENSE file, you can
// obtain it at www.aomedia.org/license/software. If the Alliance for Open
// Media Patent License 1.0 was not distributed with this source code in the
// PATENTS file, you can obtain it at www.aomedia.org/license/patent.

//! Recursive rate-distortion search of the CU quadtree.

use crate::api::SliceType;
use crate::prelude::ChromaSampling;
use crate::context::*;
use crate::cu::*;
use crate::ec::{Writer, WriterCounter};
use crate::encoder::entropy::*;
use crate::encoder::{FrameInvariants, FrameState};
use crate::partition::*;
use crate::primitives::Primitives;
use crate::rdo::{CtxSlot, RdContextStack};
use crate::stats::*;
use crate::util::*;
use crate::yuv::Yuv;

/// Buffers owned by one quadtree depth.
pub struct DepthScratch<T: Pixel> {
  /// Best candidate of the node being decided at this depth.
  pub best: CodingUnit<T>,
  /// Candidate under evaluation, then the accumulated split.
  pub temp: CodingUnit<T>,
  /// Source samples of the node.
  pub org: Yuv<T>,
  /// Prediction of the best merge candidate.
  pub merge_pred: Yuv<T>,
}

impl<T: Pixel> DepthScratch<T> {
  fn new(log2: usize, cs: ChromaSampling) -> Self {
    DepthScratch {
      best: CodingUnit::new(log2, cs),
      temp: CodingUnit::new(log2, cs),
      org: Yuv::new(log2, cs),
      merge_pred: Yuv::new(log2, cs),
    }
  }
}

/// Resets `cu` for a direct mode candidate at `geom`.
pub(crate) fn init_candidate<T: Pixel>(
  fi: &FrameInvariants, cu: &mut CodingUnit<T>, geom: CuGeom,
  part_size: PartSize, pred_mode: PredMode,
) {
  cu.init_cu(geom, fi.qp);
  cu.set_mode(part_size, pred_mode);
  let bypass = fi.config.lossless;
  let n = cu.num_parts();
  cu.update_parts(0, n, |p| p.transquant_bypass = bypass);
}

/// Mode decision state of a picture: per depth scratch CUs and the entropy
/// context snapshots of the path being searched.
pub struct CuSearch<'a, T: Pixel> {
  pub(crate) fi: &'a FrameInvariants,
  pub(crate) prims: Primitives<T>,
  pub(crate) md: Vec<DepthScratch<T>>,
  pub(crate) ctx: RdContextStack,
  stats: &'a mut EncoderStats,
  sink: &'a mut dyn DiagnosticsSink,
}

impl<'a, T: Pixel> CuSearch<'a, T> {
  pub fn new(
    fi: &'a FrameInvariants, stats: &'a mut EncoderStats,
    sink: &'a mut dyn DiagnosticsSink,
  ) -> Self {
    let md = (0..=fi.max_depth)
      .map(|d| DepthScratch::new(fi.lcu_log2 - d, fi.chroma_sampling))
      .collect();
    CuSearch {
      fi,
      prims: Primitives::new(),
      md,
      ctx: RdContextStack::new(CabacContexts::new(fi.slice_type, fi.qp)),
      stats,
      sink,
    }
  }

  /// Counts the bits of the temp candidate at depth `d` with the contexts
  /// the node starts from, split flag included, and derives its cost.
  pub(crate) fn finish_candidate(&mut self, fs: &FrameState<T>, d: usize) {
    let fi = self.fi;
    let cu = &mut self.md[d].temp;
    let geom = cu.geom;
    let mut cw = ContextWriter::new(*self.ctx.get(d, CtxSlot::CurrBest));
    let mut w = WriterCounter::new();
    {
      let view = CuView::with_cu(&fs.store, &geom, &cu.parts, 0);
      if d < fi.max_depth {
        cw.write_split_flag(&mut w, view.split_ctx(&geom), false);
      }
      let mut code_dqp = fi.config.delta_qp;
      let data = CuData::from_cu(cu);
      encode_cu_data(fi, &mut cw, &mut w, &view, &data, &mut code_dqp);
    }
    cu.bits = w.tell();
    cu.cost = fi.rd.calc_rd_cost(cu.distortion, cu.bits);
    self.ctx.set(d, CtxSlot::TempBest, &cw.fc);

    if self.sink.enabled() {
      let p = cu.parts[0];
      self.sink.candidate(
        &geom,
        p.pred_mode,
        p.part_size,
        p.merge,
        cu.distortion,
        cu.bits,
        cu.cost,
      );
    }
  }

  /// Keeps the temp candidate at depth `d` when it beats the best one.
  pub(crate) fn check_best(&mut self, d: usize) {
    let md = &mut self.md[d];
    if md.temp.cost < md.best.cost {
      std::mem::swap(&mut md.best, &mut md.temp);
      self.ctx.copy(d, CtxSlot::TempBest, d, CtxSlot::NextBest);
    }
  }

  /// Decides the LCU `addr` and commits it to `fs`.
  pub fn compress_lcu(&mut self, fs: &mut FrameState<T>, addr: usize) {
    let fi = self.fi;
    let geom = fs.store.lcu_geom(addr);
    if addr == 0 || fi.slice_starts.contains(&geom.global_addr()) {
      self.ctx = RdContextStack::new(CabacContexts::new(fi.slice_type, fi.qp));
    } else {
      self.ctx.copy(0, CtxSlot::NextBest, 0, CtxSlot::CurrBest);
    }
    self.compress_cu(fs, geom);
    self.count_leaves(&fs.store, geom);
    log::debug!(
      "lcu {} ({}, {}): cost {} bits {}",
      addr,
      geom.x,
      geom.y,
      self.md[0].best.cost,
      self.md[0].best.bits
    );
  }

  /// Evaluates the direct modes of the node, in the order the slice type
  /// allows.
  fn check_direct_modes(&mut self, fs: &mut FrameState<T>, geom: CuGeom) {
    let fi = self.fi;
    let d = geom.depth;
    self.md[d].org.copy_from_picture(&fs.input, geom.x, geom.y);

    if fi.slice_type.is_intra() {
      self.check_intra(fs, geom, PartSize::Size2Nx2N);
      if d == fi.max_depth
        && geom.log2_size > fi.min_tu_log2
        && !fi.is_444()
        && fi.search.intra_nxn
      {
        self.check_intra(fs, geom, PartSize::SizeNxN);
      }
      return;
    }

    if self.check_merge_2nx2n(fs, geom).early_skip {
      self.stats.early_skips += 1;
      return;
    }
    self.check_inter(fs, geom, PartSize::Size2Nx2N);
    if fi.search.rect_inter {
      self.check_inter(fs, geom, PartSize::SizeNx2N);
      self.check_inter(fs, geom, PartSize::Size2NxN);
    }
    if fi.slice_type == SliceType::P
      && fi.search.intra_in_inter
      && self.md[d].best.root_cbf()
    {
      self.check_intra(fs, geom, PartSize::Size2Nx2N);
    }
  }

  /// Whether the best cost of the node is already below the running
  /// average of its LCU and neighbours at this depth.
  fn early_exit(&mut self, fs: &FrameState<T>, geom: &CuGeom) -> bool {
    let fi = self.fi;
    let s = &fi.search;
    if !s.neighbour_early_exit || geom.depth == 0 {
      return false;
    }
    let avg = fs.store.blended_average(
      geom.lcu_addr,
      geom.depth,
      s.early_exit_cu_weight,
      s.early_exit_neighbour_weight,
    );
    let best = self.md[geom.depth].best.cost;
    let taken =
      avg != 0 && (best as f64) < s.early_exit_multiplier * avg as f64;
    if self.sink.enabled() {
      self.sink.early_exit_check(geom, best, avg, taken);
    }
    taken
  }

  /// Decides the quadtree node `geom`: its direct modes against its four
  /// children. The winner ends in the best slot of its depth, committed to
  /// the store and, when not split, to the reconstruction.
  ///
  /// # Panics
  ///
  /// - If a node that cannot be split has no legal candidate
  pub fn compress_cu(&mut self, fs: &mut FrameState<T>, geom: CuGeom) {
    let fi = self.fi;
    let d = geom.depth;
    let forced = !geom.is_inside(fi.width, fi.height)
      || fs.store.straddles_slice(&geom);
    self.stats.evaluated_nodes += 1;
    self.md[d].best.init_cu(geom, fi.qp);

    if forced {
      self.stats.forced_splits += 1;
    } else {
      self.check_direct_modes(fs, geom);
    }

    let mut try_split =
      d < fi.max_depth && (forced || !self.md[d].best.parts[0].skip);
    if try_split && !forced && self.early_exit(fs, &geom) {
      self.stats.early_exits += 1;
      try_split = false;
    }

    let mut split = false;
    if try_split {
      self.md[d].temp.init_split(geom, fi.qp);
      for idx in 0..4 {
        let child = geom.child(idx);
        if !child.intersects(fi.width, fi.height) {
          continue;
        }
        if idx == 0 {
          self.ctx.copy(d, CtxSlot::CurrBest, d + 1, CtxSlot::CurrBest);
        } else {
          self.ctx.copy(d + 1, CtxSlot::NextBest, d + 1, CtxSlot::CurrBest);
        }
        if fi.slice_starts.contains(&child.global_addr()) {
          let fresh = CabacContexts::new(fi.slice_type, fi.qp);
          self.ctx.set(d + 1, CtxSlot::CurrBest, &fresh);
        }
        self.compress_cu(fs, child);
        let (lo, hi) = self.md.split_at_mut(d + 1);
        lo[d].temp.copy_part_from(&hi[0].best);
      }

      let md = &mut self.md[d];
      if !forced {
        let mut cw = ContextWriter::new(*self.ctx.get(d, CtxSlot::CurrBest));
        let mut w = WriterCounter::new();
        let view = CuView::new(&fs.store, geom.global_addr());
        cw.write_split_flag(&mut w, view.split_ctx(&geom), true);
        md.temp.bits += w.tell();
        md.temp.cost = fi.rd.calc_rd_cost(md.temp.distortion, md.temp.bits);
      }
      if forced || md.temp.cost < md.best.cost {
        std::mem::swap(&mut md.best, &mut md.temp);
        self.ctx.copy(d + 1, CtxSlot::NextBest, d, CtxSlot::NextBest);
        split = true;
        if !forced {
          self.stats.splits_chosen += 1;
        }
      }
    }

    let best = &self.md[d].best;
    fs.store.copy_to_pic(best);
    if !split {
      best.reco.copy_to_picture(
        &mut fs.rec,
        geom.x,
        geom.y,
        0,
        0,
        geom.log2_size,
      );
    }
    if !forced {
      fs.store.stats[geom.lcu_addr][d].update(best.cost);
    }
    if self.sink.enabled() {
      self.sink.decision(&geom, split, best.cost);
    }
  }

  /// Adds the committed leaves under `geom` to the statistics.
  fn count_leaves(&mut self, store: &CuStore, geom: CuGeom) {
    if !geom.intersects(self.fi.width, self.fi.height) {
      return;
    }
    let parts = store.cu_parts(&geom);
    if parts[0].depth as usize > geom.depth {
      for idx in 0..4 {
        self.count_leaves(store, geom.child(idx));
      }
      return;
    }
    let p = parts[0];
    let log2 = geom.log2_size;
    self.stats.add_cu(log2, p.pred_mode, p.part_size, p.skip);
    if p.is_intra() {
      let n = parts.len();
      let pus = p.part_size.num_pus();
      for pu in 0..pus {
        let dir = parts[p.part_size.pu_part_offset(n, pu)].luma_dir;
        self.stats.add_luma_dir(dir, (1 << (2 * log2)) / pus);
      }
    }
  }
}
