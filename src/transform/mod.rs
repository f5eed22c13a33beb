// Copyright (c) 2024, The cuquad contributors. All rights reserved
//
// This source code is subject to the terms of the BSD 2 Clause License and
// the Alliance for Open Media Patent License 1.0. If the BSD 2 Clause License
// was not distributed with this source code in the LICENSE file, you can
// obtain it at www.aomedia.org/license/software. If the Alliance for Open
// Media Patent License 1.0 was not distributed with this source code in the
// PATENTS file, you can obtain it at www.aomedia.org/license/patent.

//! Integer DCT (4x4 to 32x32) and the 4x4 DST used by intra luma.

use crate::util::*;

pub const MIN_TX_LOG2: usize = 2;
pub const MAX_TX_LOG2: usize = 5;
pub const MAX_TX_SIZE: usize = 1 << MAX_TX_LOG2;
pub const MAX_TX_SQUARE: usize = MAX_TX_SIZE * MAX_TX_SIZE;

/// Scaled `cos(pi * m / 64)` for `m` in `0..=32`; `m == 0` carries the DC
/// basis scale.
const COS64: [i32; 33] = [
  64, 90, 90, 90, 89, 88, 87, 85, 83, 82, 80, 78, 75, 73, 70, 67, 64, 61, 57,
  54, 50, 46, 43, 38, 36, 31, 25, 22, 18, 13, 9, 4, 0,
];

const fn cos_coef(m: usize) -> i32 {
  let r = m % 128;
  if r <= 32 {
    COS64[r]
  } else if r <= 64 {
    -COS64[64 - r]
  } else if r <= 96 {
    -COS64[r - 64]
  } else {
    COS64[128 - r]
  }
}

const fn dct32_matrix() -> [[i32; MAX_TX_SIZE]; MAX_TX_SIZE] {
  let mut m = [[0; MAX_TX_SIZE]; MAX_TX_SIZE];
  let mut k = 0;
  while k < MAX_TX_SIZE {
    let mut n = 0;
    while n < MAX_TX_SIZE {
      m[k][n] = if k == 0 { 64 } else { cos_coef(k * (2 * n + 1)) };
      n += 1;
    }
    k += 1;
  }
  m
}

/// 32-point basis; the `N`-point basis is made of every `32 / N`-th row.
pub static DCT32: [[i32; MAX_TX_SIZE]; MAX_TX_SIZE] = dct32_matrix();

pub static DST4: [[i32; 4]; 4] =
  [[29, 55, 74, 84], [74, 74, 0, -74], [84, -29, -74, 55], [55, -84, 74, -29]];

#[inline(always)]
fn dct_coef(log2: usize, k: usize, n: usize) -> i32 {
  DCT32[k << (MAX_TX_LOG2 - log2)][n]
}

#[inline(always)]
fn basis(log2: usize, use_dst: bool) -> impl Fn(usize, usize) -> i32 {
  move |k, n| if use_dst { DST4[k][n] } else { dct_coef(log2, k, n) }
}

/// Forward 2-D transform of a `2^log2` square residual.
pub fn forward_transform(
  src: &[i16], src_stride: usize, dst: &mut [i32], log2: usize,
  bit_depth: usize, use_dst: bool,
) {
  let n = 1 << log2;
  let m = basis(log2, use_dst);
  let shift1 = log2 + bit_depth - 9;
  let shift2 = log2 + 6;
  let mut tmp = [0i32; MAX_TX_SQUARE];

  // rows, stored transposed
  for j in 0..n {
    let row = &src[j * src_stride..][..n];
    for k in 0..n {
      let sum: i32 =
        row.iter().enumerate().map(|(i, &x)| m(k, i) * x as i32).sum();
      tmp[k * n + j] = round_shift_any(sum, shift1);
    }
  }
  // columns
  for k in 0..n {
    let col = &tmp[k * n..][..n];
    for k2 in 0..n {
      let sum: i32 =
        col.iter().enumerate().map(|(j, &t)| m(k2, j) * t).sum();
      dst[k2 * n + k] = round_shift(sum, shift2);
    }
  }
}

/// Inverse 2-D transform of a `2^log2` square coefficient block.
pub fn inverse_transform(
  src: &[i32], dst: &mut [i16], dst_stride: usize, log2: usize,
  bit_depth: usize, use_dst: bool,
) {
  let n = 1 << log2;
  let m = basis(log2, use_dst);
  let shift2 = 20 - bit_depth;
  let mut tmp = [0i32; MAX_TX_SQUARE];

  // columns
  for h in 0..n {
    for r in 0..n {
      let sum: i32 = (0..n).map(|k| m(k, r) * src[k * n + h]).sum();
      tmp[r * n + h] = clip16(round_shift(sum, 7));
    }
  }
  // rows
  for r in 0..n {
    let row = &tmp[r * n..][..n];
    for c in 0..n {
      let sum: i32 =
        row.iter().enumerate().map(|(h, &t)| m(h, c) * t).sum();
      dst[r * dst_stride + c] = clip16(round_shift(sum, shift2)) as i16;
    }
  }
}

pub fn fdct<const LOG2: usize>(
  src: &[i16], dst: &mut [i32], stride: usize, bit_depth: usize,
) {
  forward_transform(src, stride, dst, LOG2, bit_depth, false);
}

pub fn idct<const LOG2: usize>(
  src: &[i32], dst: &mut [i16], stride: usize, bit_depth: usize,
) {
  inverse_transform(src, dst, stride, LOG2, bit_depth, false);
}

pub fn fdst4(src: &[i16], dst: &mut [i32], stride: usize, bit_depth: usize) {
  forward_transform(src, stride, dst, 2, bit_depth, true);
}

pub fn idst4(src: &[i32], dst: &mut [i16], stride: usize, bit_depth: usize) {
  inverse_transform(src, dst, stride, 2, bit_depth, true);
}

#[cfg(test)]
mod test {
  use super::*;
  use rand::{Rng, SeedableRng};
  use rand_chacha::ChaCha8Rng;

  #[test]
  fn basis_matches_known_rows() {
    assert_eq!(DCT32[1][..4], [90, 90, 88, 85]);
    assert_eq!(DCT32[16][..4], [64, -64, -64, 64]);
    assert_eq!(DCT32[8][..4], [83, 36, -36, -83]);
    assert_eq!(DCT32[31][31], -4);
    // 4-point rows of the 32-point basis
    assert_eq!(dct_coef(2, 1, 0), 83);
    assert_eq!(dct_coef(2, 3, 3), -36);
  }

  #[test]
  fn flat_residual_has_only_dc() {
    let src = [10i16; 64];
    let mut coeffs = [0i32; 64];
    forward_transform(&src, 8, &mut coeffs, 3, 8, false);
    assert!(coeffs[0] > 0);
    assert!(coeffs[1..].iter().all(|&c| c == 0));
  }

  fn round_trip(log2: usize, use_dst: bool) {
    let n = 1 << log2;
    let mut rng = ChaCha8Rng::from_seed([log2 as u8; 32]);
    let src: Vec<i16> =
      (0..n * n).map(|_| rng.gen_range(-255..=255)).collect();
    let mut coeffs = vec![0i32; n * n];
    let mut out = vec![0i16; n * n];
    forward_transform(&src, n, &mut coeffs, log2, 8, use_dst);
    inverse_transform(&coeffs, &mut out, n, log2, 8, use_dst);
    for (a, b) in src.iter().zip(&out) {
      assert!((a - b).abs() <= 2, "{log2}: {a} vs {b}");
    }
  }

  #[test]
  fn inverse_undoes_forward() {
    for log2 in MIN_TX_LOG2..=MAX_TX_LOG2 {
      round_trip(log2, false);
    }
    round_trip(2, true);
  }
}
