// Copyright (c) 2024, The cuquad contributors. All rights reserved
//
// This source code is subject to the terms of the BSD 2 Clause License and
// the Alliance for Open Media Patent License 1.0. If the BSD 2 Clause License
// was not distributed with this source code in the LICENSE file, you can
// obtain it at www.aomedia.org/license/software. If the Alliance for Open
// Media Patent License 1.0 was not distributed with this source code in the
// PATENTS file, you can obtain it at www.aomedia.org/license/patent.

use crate::partition::{CuGeom, PartSize, PredMode};
use std::collections::BTreeMap;
use std::ops::{Add, AddAssign};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EncoderStats {
  /// Stores count of luma pixels coded with each CU log2 size
  pub cu_size_counts: BTreeMap<usize, usize>,
  /// Stores count of luma pixels coded with each prediction mode and
  /// partition size, skipped CUs excluded
  pub mode_counts: BTreeMap<(PredMode, PartSize), usize>,
  /// Stores count of luma pixels belonging to skipped CUs
  pub skip_pixel_count: usize,
  /// Stores count of luma pixels belonging to each intra luma direction
  pub luma_dir_counts: BTreeMap<u8, usize>,
  /// Number of quadtree nodes whose direct modes were evaluated
  pub evaluated_nodes: usize,
  /// Number of nodes split because of the picture or a slice boundary
  pub forced_splits: usize,
  /// Number of nodes whose merge evaluation signalled an early skip
  pub early_skips: usize,
  /// Number of nodes not subdivided because of the neighbour cost average
  pub early_exits: usize,
  /// Number of nodes where the split won
  pub splits_chosen: usize,
}

impl EncoderStats {
  /// Accounts a committed CU.
  pub fn add_cu(
    &mut self, log2: usize, pred_mode: PredMode, part_size: PartSize,
    skip: bool,
  ) {
    let pixels = 1 << (2 * log2);
    *self.cu_size_counts.entry(log2).or_insert(0) += pixels;
    if skip {
      self.skip_pixel_count += pixels;
    } else {
      *self.mode_counts.entry((pred_mode, part_size)).or_insert(0) += pixels;
    }
  }

  pub fn add_luma_dir(&mut self, dir: u8, pixels: usize) {
    *self.luma_dir_counts.entry(dir).or_insert(0) += pixels;
  }

  pub fn total_pixels(&self) -> usize {
    self.cu_size_counts.values().sum()
  }
}

impl Add<&Self> for EncoderStats {
  type Output = Self;

  fn add(self, rhs: &EncoderStats) -> Self::Output {
    let mut lhs = self;
    lhs += rhs;
    lhs
  }
}

impl AddAssign<&Self> for EncoderStats {
  fn add_assign(&mut self, rhs: &EncoderStats) {
    rhs.cu_size_counts.iter().for_each(|(&k, &v)| {
      *self.cu_size_counts.entry(k).or_insert(0) += v;
    });
    rhs.mode_counts.iter().for_each(|(&k, &v)| {
      *self.mode_counts.entry(k).or_insert(0) += v;
    });
    rhs.luma_dir_counts.iter().for_each(|(&k, &v)| {
      *self.luma_dir_counts.entry(k).or_insert(0) += v;
    });
    self.skip_pixel_count += rhs.skip_pixel_count;
    self.evaluated_nodes += rhs.evaluated_nodes;
    self.forced_splits += rhs.forced_splits;
    self.early_skips += rhs.early_skips;
    self.early_exits += rhs.early_exits;
    self.splits_chosen += rhs.splits_chosen;
  }
}

/// Receiver of per-candidate search diagnostics. Callers check
/// [`DiagnosticsSink::enabled`] before assembling a report.
pub trait DiagnosticsSink {
  fn enabled(&self) -> bool;

  /// A direct mode was evaluated at `geom`.
  fn candidate(
    &mut self, geom: &CuGeom, pred_mode: PredMode, part_size: PartSize,
    merge: bool, distortion: u64, bits: u32, cost: u64,
  );

  /// The neighbour early exit was checked at `geom`: `best_cost` against
  /// the blended running `average`.
  fn early_exit_check(
    &mut self, geom: &CuGeom, best_cost: u64, average: u64, taken: bool,
  );

  /// The node `geom` was decided.
  fn decision(&mut self, geom: &CuGeom, split: bool, cost: u64);
}

/// Sink that records nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl DiagnosticsSink for NullSink {
  fn enabled(&self) -> bool {
    false
  }

  fn candidate(
    &mut self, _: &CuGeom, _: PredMode, _: PartSize, _: bool, _: u64, _: u32,
    _: u64,
  ) {
  }

  fn early_exit_check(&mut self, _: &CuGeom, _: u64, _: u64, _: bool) {}

  fn decision(&mut self, _: &CuGeom, _: bool, _: u64) {}
}

/// Sink forwarding every report to the `log` facade at trace level.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogSink;

impl DiagnosticsSink for LogSink {
  fn enabled(&self) -> bool {
    log::log_enabled!(log::Level::Trace)
  }

  fn candidate(
    &mut self, geom: &CuGeom, pred_mode: PredMode, part_size: PartSize,
    merge: bool, distortion: u64, bits: u32, cost: u64,
  ) {
    log::trace!(
      "cu ({}, {}) depth {} {:?} {}{} dist {} bits {} cost {}",
      geom.x,
      geom.y,
      geom.depth,
      pred_mode,
      part_size,
      if merge { " merge" } else { "" },
      distortion,
      bits,
      cost
    );
  }

  fn early_exit_check(
    &mut self, geom: &CuGeom, best_cost: u64, average: u64, taken: bool,
  ) {
    log::trace!(
      "cu ({}, {}) depth {} cost {} average {}{}",
      geom.x,
      geom.y,
      geom.depth,
      best_cost,
      average,
      if taken { " early exit" } else { "" }
    );
  }

  fn decision(&mut self, geom: &CuGeom, split: bool, cost: u64) {
    log::trace!(
      "cu ({}, {}) depth {} {} cost {}",
      geom.x,
      geom.y,
      geom.depth,
      if split { "split" } else { "leaf" },
      cost
    );
  }
}

/// Sink keeping every report, for inspection by tests and tools.
#[derive(Debug, Clone, Default)]
pub struct RecordingSink {
  pub candidates: Vec<(CuGeom, PredMode, PartSize, bool, u64)>,
  pub decisions: Vec<(CuGeom, bool, u64)>,
  /// Early exit checks: node, best cost, average, taken.
  pub early_exit_checks: Vec<(CuGeom, u64, u64, bool)>,
}

impl DiagnosticsSink for RecordingSink {
  fn enabled(&self) -> bool {
    true
  }

  fn candidate(
    &mut self, geom: &CuGeom, pred_mode: PredMode, part_size: PartSize,
    merge: bool, _distortion: u64, _bits: u32, cost: u64,
  ) {
    self.candidates.push((*geom, pred_mode, part_size, merge, cost));
  }

  fn early_exit_check(
    &mut self, geom: &CuGeom, best_cost: u64, average: u64, taken: bool,
  ) {
    self.early_exit_checks.push((*geom, best_cost, average, taken));
  }

  fn decision(&mut self, geom: &CuGeom, split: bool, cost: u64) {
    self.decisions.push((*geom, split, cost));
  }
}

#[cfg(test)]
mod test {
  use super::*;
  use pretty_assertions::assert_eq;

  #[test]
  fn stats_accumulate() {
    let mut a = EncoderStats::default();
    a.add_cu(4, PredMode::Inter, PartSize::Size2Nx2N, true);
    a.add_cu(3, PredMode::Intra, PartSize::SizeNxN, false);
    a.early_exits = 2;
    let mut b = EncoderStats::default();
    b.add_cu(3, PredMode::Intra, PartSize::SizeNxN, false);
    b.add_luma_dir(26, 64);
    b.early_exits = 1;

    let c = a.clone() + &b;
    assert_eq!(c.skip_pixel_count, 256);
    assert_eq!(c.cu_size_counts[&3], 128);
    assert_eq!(c.mode_counts[&(PredMode::Intra, PartSize::SizeNxN)], 128);
    assert_eq!(c.luma_dir_counts[&26], 64);
    assert_eq!(c.early_exits, 3);
    assert_eq!(c.total_pixels(), 256 + 128);
  }

  #[test]
  fn null_sink_is_disabled() {
    assert!(!NullSink.enabled());
    let mut r = RecordingSink::default();
    r.decision(&CuGeom::lcu(0, 0, 0, 6), true, 5);
    assert_eq!(r.decisions.len(), 1);
  }
}
