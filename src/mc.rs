// Copyright (c) 2024, The cuquad contributors. All rights reserved
//
// This source code is subject to the terms of the BSD 2 Clause License and
// the Alliance for Open Media Patent License 1.0. If the BSD 2 Clause License
// was not distributed with this source code in the LICENSE file, you can
// obtain it at www.aomedia.org/license/software. If the Alliance for Open
// Media Patent License 1.0 was not distributed with this source code in the
// PATENTS file, you can obtain it at www.aomedia.org/license/patent.

use crate::frame::*;
use crate::util::*;

use std::ops;

/// Motion vector in quarter luma samples.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct MotionVector {
  pub row: i16,
  pub col: i16,
}

impl MotionVector {
  pub const ZERO: MotionVector = MotionVector { row: 0, col: 0 };

  #[inline]
  pub const fn new(row: i16, col: i16) -> Self {
    MotionVector { row, col }
  }

  /// Builds a vector from full-sample offsets.
  #[inline]
  pub const fn from_fullpel(row: i32, col: i32) -> Self {
    MotionVector { row: (row * 4) as i16, col: (col * 4) as i16 }
  }

  #[inline]
  pub const fn quantize_to_fullpel(self) -> Self {
    Self { row: (self.row >> 2) << 2, col: (self.col >> 2) << 2 }
  }

  #[inline]
  pub const fn is_zero(self) -> bool {
    self.row == 0 && self.col == 0
  }

  /// Scales the vector by a POC distance factor (`dist_scale` in 1/256).
  pub fn scale(self, dist_scale: i32) -> Self {
    let scale_one = |v: i16| -> i16 {
      let prod = dist_scale * v as i32;
      let mag = (prod.abs() + 127) >> 8;
      (signum(prod) * mag).clamp(i16::MIN as i32, i16::MAX as i32) as i16
    };
    MotionVector { row: scale_one(self.row), col: scale_one(self.col) }
  }
}

impl ops::Add<MotionVector> for MotionVector {
  type Output = MotionVector;

  #[inline]
  fn add(self, rhs: MotionVector) -> MotionVector {
    MotionVector {
      row: self.row.wrapping_add(rhs.row),
      col: self.col.wrapping_add(rhs.col),
    }
  }
}

impl ops::Sub<MotionVector> for MotionVector {
  type Output = MotionVector;

  #[inline]
  fn sub(self, rhs: MotionVector) -> MotionVector {
    MotionVector {
      row: self.row.wrapping_sub(rhs.row),
      col: self.col.wrapping_sub(rhs.col),
    }
  }
}

impl ops::Shl<u8> for MotionVector {
  type Output = MotionVector;

  #[inline]
  fn shl(self, rhs: u8) -> MotionVector {
    MotionVector { row: self.row << rhs, col: self.col << rhs }
  }
}

impl ops::Shr<u8> for MotionVector {
  type Output = MotionVector;

  #[inline]
  fn shr(self, rhs: u8) -> MotionVector {
    MotionVector { row: self.row >> rhs, col: self.col >> rhs }
  }
}

/// Motion of one reference list: a vector and the reference index it
/// points into, negative when the list is unused.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct MvField {
  pub mv: MotionVector,
  pub ref_idx: i8,
}

impl MvField {
  pub const NONE: MvField = MvField { mv: MotionVector::ZERO, ref_idx: -1 };

  #[inline]
  pub const fn new(mv: MotionVector, ref_idx: i8) -> Self {
    MvField { mv, ref_idx }
  }

  #[inline]
  pub const fn is_valid(&self) -> bool {
    self.ref_idx >= 0
  }
}

impl Default for MvField {
  fn default() -> Self {
    MvField::NONE
  }
}

pub const LUMA_FILTER_TAPS: usize = 8;
pub const CHROMA_FILTER_TAPS: usize = 4;

const LUMA_FILTERS: [[i32; LUMA_FILTER_TAPS]; 4] = [
  [0, 0, 0, 64, 0, 0, 0, 0],
  [-1, 4, -10, 58, 17, -5, 1, 0],
  [-1, 4, -11, 40, 40, -11, 4, -1],
  [0, 1, -5, 17, 58, -10, 4, -1],
];

const CHROMA_FILTERS: [[i32; CHROMA_FILTER_TAPS]; 8] = [
  [0, 64, 0, 0],
  [-2, 58, 10, -2],
  [-4, 54, 16, -2],
  [-6, 46, 28, -4],
  [-4, 36, 36, -4],
  [-4, 28, 46, -6],
  [-2, 16, 54, -4],
  [-2, 10, 58, -2],
];

/// Precision of the intermediate prediction samples.
pub const INTERNAL_PREC: usize = 14;

/// Integer offset and filter phase of `mv` along one axis of a plane with
/// decimation `dec`.
#[inline]
const fn split_mv(v: i16, dec: usize, luma: bool) -> (isize, usize) {
  let v = v as isize;
  if luma {
    (v >> 2, (v & 3) as usize)
  } else if dec == 1 {
    (v >> 3, (v & 7) as usize)
  } else {
    (v >> 2, ((v & 3) << 1) as usize)
  }
}

fn run_filter<T: Pixel>(
  src: &Plane<T>, x: isize, y: isize, dx: isize, dy: isize, taps: &[i32],
) -> i32 {
  let back = (taps.len() / 2 - 1) as isize;
  taps
    .iter()
    .enumerate()
    .map(|(i, &f)| {
      let i = i as isize - back;
      f * src.p_clamped(x + i * dx, y + i * dy).to_i32()
    })
    .sum()
}

/// Interpolates a `w`x`h` block at `(x, y)` of `src` displaced by `mv` into
/// 14-bit intermediate samples.
pub fn prep_8tap<T: Pixel>(
  tmp: &mut [i16], src: &Plane<T>, x: usize, y: usize, w: usize, h: usize,
  mv: MotionVector, luma: bool, bit_depth: usize,
) {
  let (ix, fx) = split_mv(mv.col, src.cfg.xdec, luma);
  let (iy, fy) = split_mv(mv.row, src.cfg.ydec, luma);
  let (x_taps, y_taps): (&[i32], &[i32]) = if luma {
    (&LUMA_FILTERS[fx], &LUMA_FILTERS[fy])
  } else {
    (&CHROMA_FILTERS[fx], &CHROMA_FILTERS[fy])
  };
  let x0 = x as isize + ix;
  let y0 = y as isize + iy;
  let shift1 = bit_depth - 8;
  let shift3 = INTERNAL_PREC - bit_depth;

  match (fx, fy) {
    (0, 0) => {
      for r in 0..h {
        for c in 0..w {
          let p = src.p_clamped(x0 + c as isize, y0 + r as isize).to_i32();
          tmp[r * w + c] = (p << shift3) as i16;
        }
      }
    }
    (_, 0) => {
      for r in 0..h {
        for c in 0..w {
          let v =
            run_filter(src, x0 + c as isize, y0 + r as isize, 1, 0, x_taps);
          tmp[r * w + c] = (v >> shift1) as i16;
        }
      }
    }
    (0, _) => {
      for r in 0..h {
        for c in 0..w {
          let v =
            run_filter(src, x0 + c as isize, y0 + r as isize, 0, 1, y_taps);
          tmp[r * w + c] = (v >> shift1) as i16;
        }
      }
    }
    (_, _) => {
      let taps = y_taps.len();
      let back = taps / 2 - 1;
      let rows = h + taps - 1;
      let mut intermediate = vec![0i32; rows * w];
      for r in 0..rows {
        let ry = y0 + r as isize - back as isize;
        for c in 0..w {
          let v = run_filter(src, x0 + c as isize, ry, 1, 0, x_taps);
          intermediate[r * w + c] = v >> shift1;
        }
      }
      for r in 0..h {
        for c in 0..w {
          let v: i32 = y_taps
            .iter()
            .enumerate()
            .map(|(i, &f)| f * intermediate[(r + i) * w + c])
            .sum();
          tmp[r * w + c] = (v >> 6) as i16;
        }
      }
    }
  }
}

/// Uni-directional prediction of a `w`x`h` block into `dst`.
pub fn put_8tap<T: Pixel>(
  dst: &mut [T], dst_stride: usize, src: &Plane<T>, x: usize, y: usize,
  w: usize, h: usize, mv: MotionVector, luma: bool, bit_depth: usize,
) {
  let mut tmp = vec![0i16; w * h];
  prep_8tap(&mut tmp, src, x, y, w, h, mv, luma, bit_depth);
  let shift = INTERNAL_PREC - bit_depth;
  for r in 0..h {
    for c in 0..w {
      dst[r * dst_stride + c] =
        T::clip(round_shift_any(tmp[r * w + c] as i32, shift), bit_depth);
    }
  }
}

/// Averages two intermediate predictions into `dst`.
pub fn mc_avg<T: Pixel>(
  dst: &mut [T], dst_stride: usize, tmp1: &[i16], tmp2: &[i16], w: usize,
  h: usize, bit_depth: usize,
) {
  let shift = INTERNAL_PREC + 1 - bit_depth;
  for r in 0..h {
    for c in 0..w {
      let sum = tmp1[r * w + c] as i32 + tmp2[r * w + c] as i32;
      dst[r * dst_stride + c] = T::clip(round_shift(sum, shift), bit_depth);
    }
  }
}

#[cfg(test)]
mod test {
  use super::*;

  fn ramp() -> Plane<u8> {
    Plane::from_fn(32, 32, 0, 0, |x, y| (4 * x + y) as u8)
  }

  #[test]
  fn fullpel_prediction_copies_reference() {
    let src = ramp();
    let mut dst = [0u8; 64];
    let mv = MotionVector::from_fullpel(2, -3);
    put_8tap(&mut dst, 8, &src, 8, 8, 8, 8, mv, true, 8);
    assert_eq!(dst[0], src.p(5, 10));
    assert_eq!(dst[63], src.p(12, 17));
  }

  #[test]
  fn out_of_picture_vectors_replicate_edges() {
    let src = ramp();
    let mut dst = [0u8; 16];
    let mv = MotionVector::from_fullpel(-40, -40);
    put_8tap(&mut dst, 4, &src, 0, 0, 4, 4, mv, true, 8);
    assert!(dst.iter().all(|&p| p == src.p(0, 0)));
  }

  #[test]
  fn halfpel_of_linear_ramp_is_midpoint() {
    let src = ramp();
    let mut dst = [0u8; 16];
    put_8tap(&mut dst, 4, &src, 8, 8, 4, 4, MotionVector::new(0, 2), true, 8);
    // the horizontal ramp steps by 4, half a sample lands on +2
    assert_eq!(dst[0] as i32, src.p(8, 8) as i32 + 2);
  }

  #[test]
  fn average_of_identical_predictions_is_identity() {
    let src = ramp();
    let mut tmp = [0i16; 16];
    prep_8tap(&mut tmp, &src, 4, 4, 4, 4, MotionVector::ZERO, true, 8);
    let mut dst = [0u8; 16];
    mc_avg(&mut dst, 4, &tmp, &tmp, 4, 4, 8);
    assert_eq!(dst[5], src.p(5, 5));
  }

  #[test]
  fn vector_scaling_rounds_away_from_zero() {
    let mv = MotionVector::new(8, -8);
    assert_eq!(mv.scale(128), MotionVector::new(4, -4));
    assert_eq!(mv.scale(256), mv);
    assert_eq!(
      MotionVector::new(-5, 3).quantize_to_fullpel(),
      MotionVector::new(-8, 0)
    );
  }
}
