// Copyright (c) 2024, The cuquad contributors. All rights reserved
//
// This source code is subject to the terms of the BSD 2 Clause License and
// the Alliance for Open Media Patent License 1.0. If the BSD 2 Clause License
// was not distributed with this source code in the LICENSE file, you can
// obtain it at www.aomedia.org/license/software. If the Alliance for Open
// Media Patent License 1.0 was not distributed with this source code in the
// PATENTS file, you can obtain it at www.aomedia.org/license/patent.

//! Syntax element binarization and context selection.

use crate::api::SliceType;
use crate::ec::{ContextModel, Writer};
use crate::mc::MotionVector;
use crate::partition::*;
use crate::scan_order::*;

mod cabac_context;
pub use cabac_context::*;

mod cu_unit;
pub use cu_unit::*;

mod transform_unit;
pub use transform_unit::*;

mod sao_unit;
pub use sao_unit::*;

/// Writes syntax elements through a [`Writer`], adapting its own copy of
/// the context models.
#[derive(Clone, Debug)]
pub struct ContextWriter {
  pub fc: CabacContexts,
}

impl ContextWriter {
  pub fn new(fc: CabacContexts) -> Self {
    ContextWriter { fc }
  }

  /// Truncated unary code with the first bin context coded and the rest
  /// bypass coded.
  fn write_unary_max_first_ctx<W: Writer>(
    w: &mut W, ctx: &mut ContextModel, value: usize, max: usize,
  ) {
    if max == 0 {
      return;
    }
    w.encode_bin(value > 0, ctx);
    for i in 1..max.min(value + 1) {
      w.encode_bin_ep(i < value);
    }
  }

  /// k-th order exp-Golomb code, bypass coded.
  pub fn write_ep_ex_golomb<W: Writer>(w: &mut W, mut value: u32, mut k: u32) {
    let mut bins = 0u32;
    let mut num_bins = 0u32;
    while value >= (1 << k) {
      bins = 2 * bins + 1;
      num_bins += 1;
      value -= 1 << k;
      k += 1;
    }
    bins *= 2;
    num_bins += 1;
    bins = (bins << k) | value;
    num_bins += k;
    w.encode_bins_ep(bins, num_bins);
  }
}

#[cfg(test)]
mod test {
  use super::*;
  use crate::ec::{WriterCounter, WriterRecorder};

  #[test]
  fn unary_codes_stop_at_max() {
    let mut cw = ContextWriter::new(CabacContexts::new(SliceType::P, 30));
    for (value, bins) in [(0, 1), (2, 3), (3, 4), (4, 4)] {
      let mut w = WriterRecorder::new();
      let ctx = &mut cw.fc.merge_idx[0];
      ContextWriter::write_unary_max_first_ctx(&mut w, ctx, value, 4);
      assert_eq!(w.recorded().bins().len(), bins, "value {value}");
    }
  }

  #[test]
  fn ex_golomb_lengths() {
    for (value, k, bits) in
      [(0, 0, 1), (1, 0, 3), (2, 0, 3), (3, 0, 5), (0, 1, 2)]
    {
      let mut w = WriterCounter::new();
      ContextWriter::write_ep_ex_golomb(&mut w, value, k);
      assert_eq!(w.tell(), bits, "value {value} k {k}");
    }
  }
}
