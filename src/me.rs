// Copyright (c) 2024, The cuquad contributors. All rights reserved
//
// This source code is subject to the terms of the BSD 2 Clause License and
// the Alliance for Open Media Patent License 1.0. If the BSD 2 Clause License
// was not distributed with this source code in the LICENSE file, you can
// obtain it at www.aomedia.org/license/software. If the Alliance for Open
// Media Patent License 1.0 was not distributed with this source code in the
// PATENTS file, you can obtain it at www.aomedia.org/license/patent.

//! Integer sample motion search.

use crate::dist::get_sad;
use crate::frame::{Plane, PlaneOffset};
use crate::mc::MotionVector;
use crate::rdo::{RdCost, MAX_COST};
use crate::util::*;

/// Block being searched and the window its vectors may point to.
#[derive(Clone, Copy, Debug)]
pub struct MeBlock {
  pub x: usize,
  pub y: usize,
  pub w: usize,
  pub h: usize,
  /// Full sample displacement bounds `(min_x, max_x, min_y, max_y)`.
  range: (isize, isize, isize, isize),
}

impl MeBlock {
  /// Block at `(x, y)` of a `width`x`height` picture searched at most
  /// `search_range` full samples away from `center`.
  pub fn new(
    x: usize, y: usize, w: usize, h: usize, width: usize, height: usize,
    center: MotionVector, search_range: usize,
  ) -> Self {
    let c = center.quantize_to_fullpel();
    let (cx, cy) = ((c.col >> 2) as isize, (c.row >> 2) as isize);
    let r = search_range as isize;
    let range = (
      (cx - r).max(-(x as isize)),
      (cx + r).min((width - w - x) as isize),
      (cy - r).max(-(y as isize)),
      (cy + r).min((height - h - y) as isize),
    );
    MeBlock { x, y, w, h, range }
  }

  #[inline]
  fn contains(&self, dx: isize, dy: isize) -> bool {
    dx >= self.range.0
      && dx <= self.range.1
      && dy >= self.range.2
      && dy <= self.range.3
  }
}

/// Estimated bits of one motion vector difference component.
fn mvd_component_bits(d: i32) -> u32 {
  let a = d.unsigned_abs();
  match a {
    0 => 1,
    1 => 3,
    _ => {
      // sign, two flags and a first order exp-Golomb suffix
      let v = a - 2;
      let k = msb((v >> 1) as i32 + 1) as u32;
      3 + 2 * k + 2
    }
  }
}

/// Estimated bits of coding `mv` against the predictor `mvp`.
pub fn mv_bits(mv: MotionVector, mvp: MotionVector) -> u32 {
  mvd_component_bits(mv.col as i32 - mvp.col as i32)
    + mvd_component_bits(mv.row as i32 - mvp.row as i32)
}

fn get_mv_cost<T: Pixel>(
  org: &Plane<T>, reference: &Plane<T>, blk: &MeBlock, dx: isize, dy: isize,
  mvp: MotionVector, rd: &RdCost,
) -> u64 {
  if !blk.contains(dx, dy) {
    return MAX_COST;
  }
  let org_slice =
    org.slice(PlaneOffset { x: blk.x as isize, y: blk.y as isize });
  let ref_slice = reference
    .slice(PlaneOffset { x: blk.x as isize + dx, y: blk.y as isize + dy });
  let sad = get_sad(
    org_slice,
    org.cfg.stride,
    ref_slice,
    reference.cfg.stride,
    blk.w,
    blk.h,
  );
  let mv = MotionVector::from_fullpel(dy as i32, dx as i32);
  rd.calc_rd_sad_cost(sad, mv_bits(mv, mvp))
}

/// Searches the luma displacement of `blk` in `reference` minimizing SAD
/// plus the rate of the difference to `mvp`. Starts from the cheapest of
/// `predictors`, then walks a shrinking diamond. Returns the full sample
/// vector, in quarter samples, and its cost.
pub fn motion_estimation<T: Pixel>(
  org: &Plane<T>, reference: &Plane<T>, blk: &MeBlock,
  predictors: &[MotionVector], mvp: MotionVector, rd: &RdCost,
) -> (MotionVector, u64) {
  let mut center = (0isize, 0isize);
  let mut center_cost = MAX_COST;
  for &p in predictors.iter().chain(std::iter::once(&MotionVector::ZERO)) {
    let p = p.quantize_to_fullpel();
    let (dx, dy) = ((p.col >> 2) as isize, (p.row >> 2) as isize);
    let dx = dx.clamp(blk.range.0, blk.range.1);
    let dy = dy.clamp(blk.range.2, blk.range.3);
    let cost = get_mv_cost(org, reference, blk, dx, dy, mvp, rd);
    if cost < center_cost {
      center = (dx, dy);
      center_cost = cost;
    }
  }

  let diamond_pattern = [(1isize, 0isize), (0, 1), (-1, 0), (0, -1)];
  let span = (blk.range.1 - blk.range.0).max(blk.range.3 - blk.range.2);
  let mut radius = ((span.max(2) / 2) as usize).next_power_of_two() as isize;
  radius = radius.min(16);

  loop {
    let mut best_diamond_cost = MAX_COST;
    let mut best_diamond = center;
    for &(px, py) in diamond_pattern.iter() {
      let cand = (center.0 + radius * px, center.1 + radius * py);
      let cost = get_mv_cost(org, reference, blk, cand.0, cand.1, mvp, rd);
      if cost < best_diamond_cost {
        best_diamond_cost = cost;
        best_diamond = cand;
      }
    }

    if center_cost <= best_diamond_cost {
      if radius == 1 {
        break;
      }
      radius /= 2;
    } else {
      center = best_diamond;
      center_cost = best_diamond_cost;
    }
  }

  assert!(center_cost < MAX_COST);
  (MotionVector::from_fullpel(center.1 as i32, center.0 as i32), center_cost)
}

#[cfg(test)]
mod test {
  use super::*;
  use rand::{Rng, SeedableRng};
  use rand_chacha::ChaCha8Rng;

  fn noise(seed: u64) -> Plane<u8> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    Plane::from_fn(64, 64, 0, 0, |_, _| rng.gen())
  }

  fn shifted(src: &Plane<u8>, dx: isize, dy: isize) -> Plane<u8> {
    Plane::from_fn(64, 64, 0, 0, |x, y| {
      src.p_clamped(x as isize + dx, y as isize + dy)
    })
  }

  #[test]
  fn finds_translation_from_predictor() {
    let reference = noise(7);
    let org = shifted(&reference, 3, -2);
    let blk = MeBlock::new(24, 24, 16, 16, 64, 64, MotionVector::ZERO, 8);
    let rd = RdCost::new(1.0);
    let pred = [MotionVector::from_fullpel(-2, 3)];
    let (mv, cost) =
      motion_estimation(
        &org,
        &reference,
        &blk,
        &pred,
        MotionVector::ZERO,
        &rd,
      );
    assert_eq!(mv, MotionVector::from_fullpel(-2, 3));
    assert_eq!(cost, rd.calc_rd_sad_cost(0, mv_bits(mv, MotionVector::ZERO)));
  }

  #[test]
  fn vectors_stay_in_picture_and_range() {
    let reference = noise(3);
    let org = noise(4);
    let blk = MeBlock::new(0, 48, 16, 16, 64, 64, MotionVector::ZERO, 4);
    let rd = RdCost::new(1.0);
    let far = [MotionVector::from_fullpel(30, -30)];
    let (mv, _) =
      motion_estimation(&org, &reference, &blk, &far, MotionVector::ZERO, &rd);
    assert!(mv.col >= 0 && mv.col <= 16);
    assert!(mv.row <= 0 && mv.row >= -16);
  }

  #[test]
  fn rate_grows_with_difference() {
    let z = MotionVector::ZERO;
    assert_eq!(mv_bits(z, z), 2);
    let near = mv_bits(MotionVector::new(0, 1), z);
    assert!(near < mv_bits(MotionVector::new(0, 40), z));
  }
}
