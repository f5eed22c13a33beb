// Copyright (c) 2024, The cuquad contributors. All rights reserved
//
// This source code is subject to the terms of the BSD 2 Clause License and
// the Alliance for Open Media Patent License 1.0. If the BSD 2 Clause License
// was not distributed with this source code in the LICENSE file, you can
// obtain it at www.aomedia.org/license/software. If the Alliance for Open
// Media Patent License 1.0 was not distributed with this source code in the
// PATENTS file, you can obtain it at www.aomedia.org/license/patent.

//! Intra prediction: reference sample gathering, smoothing and the planar,
//! DC and angular predictors.

use crate::context::NUM_MOST_PROBABLE_MODES;
use crate::frame::*;
use crate::partition::*;
use crate::transform::MAX_TX_SIZE;
use crate::util::*;

/// Reference samples on one side: the corner followed by `2 * size`
/// neighbours.
pub const MAX_REF: usize = 2 * MAX_TX_SIZE + 1;

#[rustfmt::skip]
static INTRA_PRED_ANGLE: [i32; 33] = [
  32, 26, 21, 17, 13, 9, 5, 2, 0, -2, -5, -9, -13, -17, -21, -26,
  -32, -26, -21, -17, -13, -9, -5, -2, 0, 2, 5, 9, 13, 17, 21, 26, 32,
];

/// `invAngle` of the modes 11 to 25.
#[rustfmt::skip]
static INV_ANGLE: [i32; 15] = [
  -4096, -1638, -910, -630, -482, -390, -315, -256, -315, -390, -482, -630,
  -910, -1638, -4096,
];

/// Neighbouring samples of a square block, in the plane's own sample grid.
#[derive(Clone, Debug)]
pub struct IntraEdge {
  /// `above[0]` is the top-left corner, `above[1 + x]` the sample at
  /// `(x, -1)`.
  pub above: [i32; MAX_REF],
  /// `left[0]` is the top-left corner, `left[1 + y]` the sample at
  /// `(-1, y)`.
  pub left: [i32; MAX_REF],
}

impl IntraEdge {
  /// Gathers the references of the `2^log2` block at `(x, y)` of `rec`,
  /// substituting unavailable samples. `avail` reports whether the sample
  /// at a plane position is reconstructed and usable.
  pub fn new<T: Pixel>(
    rec: &Plane<T>, x: usize, y: usize, log2: usize, bit_depth: usize,
    avail: impl Fn(isize, isize) -> bool,
  ) -> Self {
    let n = 1isize << log2;
    let (x, y) = (x as isize, y as isize);
    let len = 4 * n as usize + 1;

    // bottom-left to top-left, corner, then left to right above
    let pos = |i: usize| -> (isize, isize) {
      let i = i as isize;
      if i < 2 * n {
        (x - 1, y + 2 * n - 1 - i)
      } else {
        (x - 1 + (i - 2 * n), y - 1)
      }
    };
    let mut line = [0i32; 2 * MAX_REF];
    let mut known = [false; 2 * MAX_REF];
    for i in 0..len {
      let (px, py) = pos(i);
      if avail(px, py) {
        line[i] = rec.p(px as usize, py as usize).to_i32();
        known[i] = true;
      }
    }

    match known[..len].iter().position(|&k| k) {
      None => line[..len].fill(1 << (bit_depth - 1)),
      Some(first) => {
        let v = line[first];
        line[..first].fill(v);
        for i in first + 1..len {
          if !known[i] {
            line[i] = line[i - 1];
          }
        }
      }
    }

    let n = n as usize;
    let mut edge = IntraEdge { above: [0; MAX_REF], left: [0; MAX_REF] };
    let corner = 2 * n;
    for k in 0..=2 * n {
      edge.above[k] = line[corner + k];
      edge.left[k] = line[corner - k];
    }
    edge
  }

  /// `[1, 2, 1]` smoothing of the references, the far ends kept.
  pub fn filtered(&self, log2: usize) -> Self {
    let last = 2 << log2;
    let mut out = self.clone();
    let corner =
      (self.left[1] + 2 * self.above[0] + self.above[1] + 2) >> 2;
    out.above[0] = corner;
    out.left[0] = corner;
    for k in 1..last {
      out.above[k] =
        (self.above[k - 1] + 2 * self.above[k] + self.above[k + 1] + 2) >> 2;
      out.left[k] =
        (self.left[k - 1] + 2 * self.left[k] + self.left[k + 1] + 2) >> 2;
    }
    out
  }
}

/// Whether the references of a `2^log2` block are smoothed for `mode`.
pub fn filter_needed(mode: u8, log2: usize) -> bool {
  if mode == DC_IDX || log2 == 2 {
    return false;
  }
  let to_ver = (mode as i32 - VER_IDX as i32).abs();
  let dist = to_ver.min((mode as i32 - HOR_IDX as i32).abs());
  let threshold = match log2 {
    3 => 7,
    4 => 1,
    _ => 0,
  };
  dist > threshold
}

fn pred_planar(dst: &mut [i32], edge: &IntraEdge, log2: usize) {
  let n = 1 << log2;
  let top_right = edge.above[1 + n];
  let bottom_left = edge.left[1 + n];
  for y in 0..n {
    for x in 0..n {
      dst[y * n + x] = ((n - 1 - x) as i32 * edge.left[1 + y]
        + (x + 1) as i32 * top_right
        + (n - 1 - y) as i32 * edge.above[1 + x]
        + (y + 1) as i32 * bottom_left
        + n as i32)
        >> (log2 + 1);
    }
  }
}

fn pred_dc(dst: &mut [i32], edge: &IntraEdge, log2: usize, edge_filter: bool) {
  let n = 1 << log2;
  let sum: i32 = edge.above[1..=n].iter().chain(&edge.left[1..=n]).sum();
  let dc = (sum + n as i32) >> (log2 + 1);
  dst[..n * n].fill(dc);
  if edge_filter {
    dst[0] = (edge.left[1] + 2 * dc + edge.above[1] + 2) >> 2;
    for x in 1..n {
      dst[x] = (edge.above[1 + x] + 3 * dc + 2) >> 2;
    }
    for y in 1..n {
      dst[y * n] = (edge.left[1 + y] + 3 * dc + 2) >> 2;
    }
  }
}

fn pred_angular(
  dst: &mut [i32], edge: &IntraEdge, log2: usize, mode: u8,
  edge_filter: bool, bit_depth: usize,
) {
  let n = 1usize << log2;
  let vertical = mode >= 18;
  let angle = INTRA_PRED_ANGLE[mode as usize - 2];
  let (main, side) = if vertical {
    (&edge.above, &edge.left)
  } else {
    (&edge.left, &edge.above)
  };

  // ref[k] lives at refs[k + n]
  let mut refs = [0i32; 3 * MAX_TX_SIZE + 1];
  refs[n..=2 * n].copy_from_slice(&main[..=n]);
  if angle < 0 {
    let inv = INV_ANGLE[mode as usize - 11];
    let last = (n as i32 * angle) >> 5;
    for k in last..0 {
      let idx = ((k * inv + 128) >> 8) as usize;
      refs[(n as i32 + k) as usize] = side[idx];
    }
  } else {
    refs[2 * n + 1..=3 * n].copy_from_slice(&main[n + 1..=2 * n]);
  }

  for j in 0..n {
    let pos = (j as i32 + 1) * angle;
    let idx = pos >> 5;
    let fact = pos & 31;
    for i in 0..n {
      let base = (n as i32 + i as i32 + idx + 1) as usize;
      let v = if fact != 0 {
        ((32 - fact) * refs[base] + fact * refs[base + 1] + 16) >> 5
      } else {
        refs[base]
      };
      // j runs along the prediction direction
      let (x, y) = if vertical { (i, j) } else { (j, i) };
      dst[y * n + x] = v;
    }
  }

  if edge_filter && angle == 0 {
    let max = (1 << bit_depth) - 1;
    for k in 0..n {
      let v = (main[1] + ((side[1 + k] - side[0]) >> 1)).clamp(0, max);
      let (x, y) = if vertical { (0, k) } else { (k, 0) };
      dst[y * n + x] = v;
    }
  }
}

/// Predicts the `2^log2` block of `mode` from `edge` into `dst`.
///
/// `luma` enables the smoothing of the references and the boundary
/// filters of the DC and pure horizontal/vertical modes; `filter_refs`
/// extends the smoothing to chroma blocks of 4:4:4 pictures.
pub fn predict_intra<T: Pixel>(
  dst: &mut [T], stride: usize, edge: &IntraEdge, mode: u8, log2: usize,
  bit_depth: usize, luma: bool, filter_refs: bool,
) {
  debug_assert!(mode < NUM_INTRA_MODE);
  let n = 1 << log2;
  let filtered;
  let edge = if (luma || filter_refs) && filter_needed(mode, log2) {
    filtered = edge.filtered(log2);
    &filtered
  } else {
    edge
  };
  let edge_filter = luma && log2 < 5;

  let mut tmp = [0i32; MAX_TX_SIZE * MAX_TX_SIZE];
  match mode {
    PLANAR_IDX => pred_planar(&mut tmp, edge, log2),
    DC_IDX => pred_dc(&mut tmp, edge, log2, edge_filter),
    _ => pred_angular(&mut tmp, edge, log2, mode, edge_filter, bit_depth),
  }
  for y in 0..n {
    for x in 0..n {
      dst[y * stride + x] = T::clip(tmp[y * n + x], bit_depth);
    }
  }
}

/// Most probable luma modes given the modes of the left and above
/// neighbours ([`DC_IDX`] when unavailable or not intra).
pub fn most_probable_modes(
  left: u8, above: u8,
) -> [u8; NUM_MOST_PROBABLE_MODES] {
  if left == above {
    if left < 2 {
      [PLANAR_IDX, DC_IDX, VER_IDX]
    } else {
      [left, 2 + ((left + 29) % 32), 2 + ((left - 2 + 1) % 32)]
    }
  } else {
    let third = if left != PLANAR_IDX && above != PLANAR_IDX {
      PLANAR_IDX
    } else if left != DC_IDX && above != DC_IDX {
      DC_IDX
    } else {
      VER_IDX
    };
    [left, above, third]
  }
}

/// Chroma candidate directions before the luma substitution.
pub const CHROMA_CANDIDATES: [u8; 4] = [PLANAR_IDX, VER_IDX, HOR_IDX, DC_IDX];

/// Direction used by chroma for candidate `idx` when luma uses
/// `luma_dir`.
pub fn chroma_dir(idx: u8, luma_dir: u8) -> u8 {
  if idx == DM_CHROMA_IDX {
    return luma_dir;
  }
  let dir = CHROMA_CANDIDATES[idx as usize];
  if dir == luma_dir {
    NUM_INTRA_MODE - 1
  } else {
    dir
  }
}

#[cfg(test)]
mod test {
  use super::*;
  use pretty_assertions::assert_eq;

  fn predict(edge: &IntraEdge, mode: u8, log2: usize) -> Vec<u8> {
    let n = 1 << log2;
    let mut dst = vec![0u8; n * n];
    predict_intra(&mut dst, n, edge, mode, log2, 8, true, false);
    dst
  }

  #[test]
  fn unavailable_neighbours_give_mid_grey() {
    let rec = Plane::<u8>::new(16, 16, 0, 0);
    let edge = IntraEdge::new(&rec, 0, 0, 2, 8, |_, _| false);
    assert!(edge.above[..9].iter().all(|&v| v == 128));
    assert!(edge.left[..9].iter().all(|&v| v == 128));
  }

  #[test]
  fn substitution_copies_previous_available_sample() {
    let rec = Plane::<u8>::from_fn(16, 16, 0, 0, |x, y| (x + 10 * y) as u8);
    // only the row above the block and the corner are available
    let edge = IntraEdge::new(&rec, 4, 4, 2, 8, |_, y| y == 3);
    // the left column takes the corner, the first available sample
    assert_eq!(edge.left[4], rec.p(3, 3) as i32);
    assert_eq!(edge.left[8], rec.p(3, 3) as i32);
    assert_eq!(edge.above[1], rec.p(4, 3) as i32);
    assert_eq!(edge.above[8], rec.p(11, 3) as i32);
  }

  #[test]
  fn flat_references_predict_flat_blocks() {
    let rec = Plane::<u8>::from_fn(64, 64, 0, 0, |_, _| 77);
    for log2 in 2..=5 {
      let edge = IntraEdge::new(&rec, 32, 32, log2, 8, |x, y| {
        (0..64).contains(&x) && (0..64).contains(&y)
      });
      for mode in 0..NUM_INTRA_MODE {
        assert!(
          predict(&edge, mode, log2).iter().all(|&v| v == 77),
          "mode {mode} log2 {log2}"
        );
      }
    }
  }

  #[test]
  fn pure_directions_copy_the_references() {
    let rec = Plane::<u8>::from_fn(32, 32, 0, 0, |x, y| (3 * x + 5 * y) as u8);
    let edge = IntraEdge::new(&rec, 8, 8, 3, 8, |x, y| x >= 0 && y >= 0);
    let ver = predict(&edge, VER_IDX, 3);
    // column 0 carries the boundary filter
    for y in 0..8 {
      for x in 1..8 {
        assert_eq!(ver[y * 8 + x], rec.p(8 + x, 7));
      }
    }
    let hor = predict(&edge, HOR_IDX, 3);
    for y in 1..8 {
      for x in 0..8 {
        assert_eq!(hor[y * 8 + x], rec.p(7, 8 + y));
      }
    }
  }

  #[test]
  fn diagonal_mode_reads_above_right() {
    let rec = Plane::<u8>::from_fn(32, 32, 0, 0, |x, y| (x + 2 * y) as u8);
    let edge = IntraEdge::new(&rec, 8, 8, 2, 8, |x, y| x >= 0 && y >= 0);
    let d = predict(&edge, 34, 2);
    // mode 34 follows 45 degrees up-right
    assert_eq!(d[0], rec.p(9, 7));
    assert_eq!(d[3 * 4 + 3], rec.p(15, 7));
  }

  #[test]
  fn smoothing_thresholds() {
    assert!(!filter_needed(DC_IDX, 4));
    assert!(!filter_needed(PLANAR_IDX, 2));
    assert!(filter_needed(PLANAR_IDX, 3));
    assert!(!filter_needed(VER_IDX + 1, 4));
    assert!(filter_needed(VER_IDX + 1, 5));
    assert!(filter_needed(2, 3));
  }

  #[test]
  fn mpm_derivation() {
    assert_eq!(most_probable_modes(DC_IDX, DC_IDX), [0, 1, 26]);
    assert_eq!(most_probable_modes(10, 10), [10, 9, 11]);
    assert_eq!(most_probable_modes(2, 2), [2, 33, 3]);
    assert_eq!(most_probable_modes(0, 26), [0, 26, 1]);
    assert_eq!(most_probable_modes(0, 1), [0, 1, 26]);
    assert_eq!(most_probable_modes(5, 7), [5, 7, 0]);
  }

  #[test]
  fn chroma_candidates_avoid_luma_duplicate() {
    assert_eq!(chroma_dir(DM_CHROMA_IDX, 17), 17);
    assert_eq!(chroma_dir(1, 26), 34);
    assert_eq!(chroma_dir(2, 26), 10);
  }
}
