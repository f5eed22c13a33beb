// Copyright (c) 2024, The cuquad contributors. All rights reserved
//
// This source code is subject to the terms of the BSD 2 Clause License and
// the Alliance for Open Media Patent License 1.0. If the BSD 2 Clause License
// was not distributed with this source code in the LICENSE file, you can
// obtain it at www.aomedia.org/license/software. If the Alliance for Open
// Media Patent License 1.0 was not distributed with this source code in the
// PATENTS file, you can obtain it at www.aomedia.org/license/patent.

use crate::serialize::{Deserialize, Serialize};

use std::fmt;

/// Contains the mode decision settings.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct SearchSettings {
  /// Evaluates the Nx2N and 2NxN inter partitions.
  ///
  /// Enabled is slower.
  pub rect_inter: bool,

  /// Stops the mode search of a CU once merge signals a skip.
  ///
  /// Enabled is faster.
  pub early_skip: bool,

  /// Skips the subdivision of a CU whose best cost is already below the
  /// blended average cost of this LCU and its neighbours at that depth.
  ///
  /// Enabled is faster.
  pub neighbour_early_exit: bool,

  /// Weight of the running average of the current LCU in the early exit
  /// average.
  pub early_exit_cu_weight: u64,

  /// Weight of the running averages of the neighbouring LCUs in the early
  /// exit average.
  pub early_exit_neighbour_weight: u64,

  /// The best cost must stay below `multiplier` times the blended average
  /// for the early exit to fire.
  pub early_exit_multiplier: f64,

  /// Evaluates intra modes in inter slices when the best inter mode left
  /// residual.
  ///
  /// Enabled is slower.
  pub intra_in_inter: bool,

  /// Evaluates intra NxN at the deepest CU level.
  ///
  /// Enabled is slower.
  pub intra_nxn: bool,

  /// Number of luma intra modes kept after the SATD pre-selection.
  ///
  /// Higher is slower.
  pub intra_fast_candidates: usize,

  /// Integer-pel motion search range around the predictor, in luma samples.
  ///
  /// Higher is slower.
  pub search_range: usize,
}

impl Default for SearchSettings {
  /// The default settings are equivalent to speed 0
  fn default() -> Self {
    SearchSettings {
      rect_inter: true,
      early_skip: false,
      neighbour_early_exit: false,
      early_exit_cu_weight: 3,
      early_exit_neighbour_weight: 2,
      early_exit_multiplier: 1.0,
      intra_in_inter: true,
      intra_nxn: true,
      intra_fast_candidates: 8,
      search_range: 32,
    }
  }
}

impl SearchSettings {
  /// Set the search settings according to a numeric speed preset.
  pub fn from_preset(speed: usize) -> Self {
    // The default settings are equivalent to speed 0
    let mut settings = SearchSettings::default();

    if speed >= 1 {
      settings.intra_fast_candidates = 5;
    }

    if speed >= 2 {
      settings.search_range = 24;
    }

    if speed >= 3 {
      settings.neighbour_early_exit = true;
    }

    if speed >= 4 {
      settings.early_skip = true;
      settings.intra_fast_candidates = 3;
    }

    if speed >= 5 {
      settings.search_range = 16;
    }

    if speed >= 6 {
      settings.rect_inter = false;
    }

    if speed >= 7 {
      settings.intra_nxn = false;
    }

    if speed >= 8 {
      settings.intra_fast_candidates = 2;
      settings.search_range = 8;
    }

    if speed >= 9 {
      settings.intra_in_inter = false;
    }

    if speed >= 10 {
      settings.intra_fast_candidates = 1;
      settings.early_exit_multiplier = 1.5;
    }

    settings
  }
}

impl fmt::Display for SearchSettings {
  fn fmt(&self, f: &mut fmt::Formatter) -> Result<(), fmt::Error> {
    write!(
      f,
      "rect_inter={} early_skip={} early_exit={}({}:{}x{}) \
       intra_in_inter={} intra_nxn={} intra_candidates={} search_range={}",
      self.rect_inter,
      self.early_skip,
      self.neighbour_early_exit,
      self.early_exit_cu_weight,
      self.early_exit_neighbour_weight,
      self.early_exit_multiplier,
      self.intra_in_inter,
      self.intra_nxn,
      self.intra_fast_candidates,
      self.search_range
    )
  }
}

#[cfg(test)]
mod test {
  use super::*;

  #[test]
  fn presets_only_ever_reduce_work() {
    let mut prev = SearchSettings::from_preset(0);
    assert_eq!(prev, SearchSettings::default());
    for speed in 1..=10 {
      let cur = SearchSettings::from_preset(speed);
      assert!(cur.search_range <= prev.search_range);
      assert!(cur.intra_fast_candidates <= prev.intra_fast_candidates);
      assert!(!cur.rect_inter || prev.rect_inter);
      prev = cur;
    }
    assert_eq!(
      SearchSettings::from_preset(20),
      SearchSettings::from_preset(10)
    );
  }
}
