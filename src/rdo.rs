// Copyright (c) 2024, The cuquad contributors. All rights reserved
//
// This source code is subject to the terms of the BSD 2 Clause License and
// the Alliance for Open Media Patent License 1.0. If the BSD 2 Clause License
// was not distributed with this source code in the LICENSE file, you can
// obtain it at www.aomedia.org/license/software. If the Alliance for Open
// Media Patent License 1.0 was not distributed with this source code in the
// PATENTS file, you can obtain it at www.aomedia.org/license/patent.

use crate::api::SliceType;
use crate::context::CabacContexts;
use crate::partition::MAX_CU_DEPTH;

/// Cost of a candidate that was not evaluated.
pub const MAX_COST: u64 = u64::MAX;

const LAMBDA_SHIFT: u32 = 8;

/// Rate-distortion cost model of one picture.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RdCost {
  /// Multiplier of the rate, in squared error units per bit.
  pub lambda: f64,
  lambda_fp: u64,
  lambda_sad_fp: u64,
}

impl RdCost {
  pub fn new(lambda: f64) -> Self {
    let scale = (1u64 << LAMBDA_SHIFT) as f64;
    RdCost {
      lambda,
      lambda_fp: (lambda * scale).round() as u64,
      lambda_sad_fp: (lambda.sqrt() * scale).round() as u64,
    }
  }

  /// Default lambda for `qp`, grows by 2x every 3 QP steps.
  pub fn lambda_for(qp: i32, slice_type: SliceType, bit_depth: usize) -> f64 {
    let base = if slice_type.is_intra() { 0.57 } else { 0.68 };
    let depth_scale = (1u64 << (2 * (bit_depth - 8))) as f64;
    base * 2f64.powf((qp - 12) as f64 / 3.0) * depth_scale
  }

  /// `distortion + lambda * bits`, both squared error based.
  #[inline]
  pub fn calc_rd_cost(&self, distortion: u64, bits: u32) -> u64 {
    let rate = (bits as u64 * self.lambda_fp + (1 << (LAMBDA_SHIFT - 1)))
      >> LAMBDA_SHIFT;
    distortion.saturating_add(rate)
  }

  /// `sad + sqrt(lambda) * bits`, for absolute difference distortions.
  #[inline]
  pub fn calc_rd_sad_cost(&self, sad: u32, bits: u32) -> u64 {
    let rate = (bits as u64 * self.lambda_sad_fp
      + (1 << (LAMBDA_SHIFT - 1)))
      >> LAMBDA_SHIFT;
    sad as u64 + rate
  }
}

/// Snapshot slots kept at each quadtree depth.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CtxSlot {
  /// State before coding the node, then after its best decision.
  CurrBest = 0,
  /// State after the best decision, handed to the next sibling.
  NextBest = 1,
  /// Scratch of the candidate under evaluation.
  TempBest = 2,
}

/// Entropy context snapshots along the path of the quadtree search.
#[derive(Clone, Debug)]
pub struct RdContextStack {
  slots: [[CabacContexts; 3]; MAX_CU_DEPTH + 1],
}

impl RdContextStack {
  pub fn new(fc: CabacContexts) -> Self {
    RdContextStack { slots: [[fc; 3]; MAX_CU_DEPTH + 1] }
  }

  #[inline]
  pub fn get(&self, depth: usize, slot: CtxSlot) -> &CabacContexts {
    &self.slots[depth][slot as usize]
  }

  #[inline]
  pub fn set(&mut self, depth: usize, slot: CtxSlot, fc: &CabacContexts) {
    self.slots[depth][slot as usize] = *fc;
  }

  /// Copies a snapshot between two slots.
  #[inline]
  pub fn copy(
    &mut self, from_depth: usize, from: CtxSlot, to_depth: usize, to: CtxSlot,
  ) {
    self.slots[to_depth][to as usize] = self.slots[from_depth][from as usize];
  }
}

#[cfg(test)]
mod test {
  use super::*;
  use crate::ec::{Writer, WriterCounter};

  #[test]
  fn lambda_doubles_every_three_qp() {
    let a = RdCost::lambda_for(30, SliceType::P, 8);
    let b = RdCost::lambda_for(33, SliceType::P, 8);
    assert!((b / a - 2.0).abs() < 1e-9);
    assert!(
      RdCost::lambda_for(30, SliceType::I, 8)
        < RdCost::lambda_for(30, SliceType::B, 8)
    );
    let hbd = RdCost::lambda_for(30, SliceType::I, 10);
    let lbd = RdCost::lambda_for(30, SliceType::I, 8);
    assert!((hbd / lbd - 16.0).abs() < 1e-9);
  }

  #[test]
  fn costs_add_weighted_rate() {
    let rd = RdCost::new(4.0);
    assert_eq!(rd.calc_rd_cost(100, 10), 140);
    assert_eq!(rd.calc_rd_sad_cost(100, 10), 120);
    assert_eq!(rd.calc_rd_cost(u64::MAX - 1, 10), u64::MAX);
    let zero = RdCost::new(0.0);
    assert_eq!(zero.calc_rd_cost(7, 1000), 7);
  }

  #[test]
  fn snapshots_are_independent_copies() {
    let fc = CabacContexts::new(SliceType::P, 32);
    let mut stack = RdContextStack::new(fc);
    let mut adapted = fc;
    let mut w = WriterCounter::new();
    for _ in 0..8 {
      w.encode_bin(true, &mut adapted.split_flag[0]);
    }
    stack.set(1, CtxSlot::TempBest, &adapted);
    assert_eq!(stack.get(1, CtxSlot::CurrBest), &fc);
    stack.copy(1, CtxSlot::TempBest, 2, CtxSlot::NextBest);
    assert_eq!(stack.get(2, CtxSlot::NextBest), &adapted);
    assert_ne!(
      stack.get(2, CtxSlot::NextBest),
      stack.get(2, CtxSlot::CurrBest)
    );
  }
}
