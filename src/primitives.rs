// Copyright (c) 2024, The cuquad contributors. All rights reserved
//
// This source code is subject to the terms of the BSD 2 Clause License and
// the Alliance for Open Media Patent License 1.0. If the BSD 2 Clause License
// was not distributed with this source code in the LICENSE file, you can
// obtain it at www.aomedia.org/license/software. If the Alliance for Open
// Media Patent License 1.0 was not distributed with this source code in the
// PATENTS file, you can obtain it at www.aomedia.org/license/patent.

//! Table of pixel kernels indexed by block size.

use crate::dist::*;
use crate::quantize;
use crate::transform::*;
use crate::util::*;

pub type DctFn = fn(&[i16], &mut [i32], usize, usize);
pub type IdctFn = fn(&[i32], &mut [i16], usize, usize);
pub type QuantFn =
  fn(&[i32], i32, &mut [i32], &mut [i32], i32, i32, usize) -> u32;
pub type DequantFn = fn(
  usize,
  &[i32],
  &mut [i32],
  usize,
  usize,
  i32,
  i32,
  bool,
  usize,
  &[i32],
);
pub type SadFn<T> = fn(&[T], usize, &[T], usize) -> u32;
pub type SseFn<T> = fn(&[T], usize, &[T], usize) -> u64;

/// Number of block side sizes from 4 to 64.
pub const NUM_BLOCK_LOG2: usize = 5;

/// Block kernels, indexed by `log2 - 2` of the transform size or of the
/// block width and height.
pub struct Primitives<T: Pixel> {
  pub dct: [DctFn; 4],
  pub idct: [IdctFn; 4],
  pub dst4: DctFn,
  pub idst4: IdctFn,
  pub quant: QuantFn,
  pub dequant: DequantFn,
  pub sad: [[SadFn<T>; NUM_BLOCK_LOG2]; NUM_BLOCK_LOG2],
  pub satd: [[SadFn<T>; NUM_BLOCK_LOG2]; NUM_BLOCK_LOG2],
  pub sse: [[SseFn<T>; NUM_BLOCK_LOG2]; NUM_BLOCK_LOG2],
}

macro_rules! block_table {
  ($f:ident, $T:ty) => {
    block_table!(@rows $f, $T, [4, 8, 16, 32, 64])
  };
  (@rows $f:ident, $T:ty, [$($w:literal),*]) => {
    [$(block_table!(@row $f, $T, $w)),*]
  };
  (@row $f:ident, $T:ty, $w:literal) => {
    [
      $f::<$T, $w, 4>,
      $f::<$T, $w, 8>,
      $f::<$T, $w, 16>,
      $f::<$T, $w, 32>,
      $f::<$T, $w, 64>,
    ]
  };
}

impl<T: Pixel> Primitives<T> {
  pub fn new() -> Self {
    Primitives {
      dct: [fdct::<2>, fdct::<3>, fdct::<4>, fdct::<5>],
      idct: [idct::<2>, idct::<3>, idct::<4>, idct::<5>],
      dst4: fdst4,
      idst4,
      quant: quantize::quant,
      dequant: quantize::dequant,
      sad: block_table!(sad_wxh, T),
      satd: block_table!(satd_wxh, T),
      sse: block_table!(sse_wxh, T),
    }
  }

  /// Forward transform of a `2^log2` block, DST for 4x4 intra luma.
  #[inline]
  pub fn forward(
    &self, src: &[i16], dst: &mut [i32], stride: usize, log2: usize,
    bit_depth: usize, use_dst: bool,
  ) {
    if use_dst {
      (self.dst4)(src, dst, stride, bit_depth)
    } else {
      self.dct[log2 - 2](src, dst, stride, bit_depth)
    }
  }

  #[inline]
  pub fn inverse(
    &self, src: &[i32], dst: &mut [i16], stride: usize, log2: usize,
    bit_depth: usize, use_dst: bool,
  ) {
    if use_dst {
      (self.idst4)(src, dst, stride, bit_depth)
    } else {
      self.idct[log2 - 2](src, dst, stride, bit_depth)
    }
  }

  #[inline]
  pub fn sad(
    &self, w: usize, h: usize, org: &[T], org_stride: usize, rec: &[T],
    rec_stride: usize,
  ) -> u32 {
    block_kernel(&self.sad, w, h)
      .map(|f| f(org, org_stride, rec, rec_stride))
      .unwrap_or_else(|| get_sad(org, org_stride, rec, rec_stride, w, h))
  }

  #[inline]
  pub fn satd(
    &self, w: usize, h: usize, org: &[T], org_stride: usize, rec: &[T],
    rec_stride: usize,
  ) -> u32 {
    block_kernel(&self.satd, w, h)
      .map(|f| f(org, org_stride, rec, rec_stride))
      .unwrap_or_else(|| get_satd(org, org_stride, rec, rec_stride, w, h))
  }

  #[inline]
  pub fn sse(
    &self, w: usize, h: usize, org: &[T], org_stride: usize, rec: &[T],
    rec_stride: usize,
  ) -> u64 {
    block_kernel(&self.sse, w, h)
      .map(|f| f(org, org_stride, rec, rec_stride))
      .unwrap_or_else(|| get_sse(org, org_stride, rec, rec_stride, w, h))
  }
}

impl<T: Pixel> Default for Primitives<T> {
  fn default() -> Self {
    Self::new()
  }
}

/// Kernel for a `w`x`h` block when both sides are powers of two in
/// `4..=64`.
#[inline]
fn block_kernel<F: Copy>(
  table: &[[F; NUM_BLOCK_LOG2]; NUM_BLOCK_LOG2], w: usize, h: usize,
) -> Option<F> {
  let index = |v: usize| {
    (v.is_power_of_two() && (4..=64).contains(&v))
      .then(|| v.trailing_zeros() as usize - 2)
  };
  Some(table[index(w)?][index(h)?])
}

#[cfg(test)]
mod test {
  use super::*;
  use interpolate_name::interpolate_test;
  use rand::{Rng, SeedableRng};
  use rand_chacha::ChaCha8Rng;

  fn random_block(rng: &mut ChaCha8Rng, len: usize) -> Vec<u8> {
    (0..len).map(|_| rng.gen()).collect()
  }

  #[interpolate_test(b4x4, 4, 4)]
  #[interpolate_test(b8x16, 8, 16)]
  #[interpolate_test(b32x8, 32, 8)]
  #[interpolate_test(b64x64, 64, 64)]
  fn table_matches_generic_kernels(w: usize, h: usize) {
    let p = Primitives::<u8>::new();
    let mut rng = ChaCha8Rng::from_seed([7; 32]);
    let a = random_block(&mut rng, 64 * 64);
    let b = random_block(&mut rng, 64 * 64);
    assert_eq!(p.sad(w, h, &a, 64, &b, 64), get_sad(&a, 64, &b, 64, w, h));
    assert_eq!(p.satd(w, h, &a, 64, &b, 64), get_satd(&a, 64, &b, 64, w, h));
    assert_eq!(p.sse(w, h, &a, 64, &b, 64), get_sse(&a, 64, &b, 64, w, h));
  }

  #[test]
  fn odd_sizes_fall_back() {
    let p = Primitives::<u16>::new();
    let a = vec![3u16; 12 * 12];
    let b = vec![1u16; 12 * 12];
    assert_eq!(p.sad(12, 12, &a, 12, &b, 12), 288);
  }

  #[test]
  fn dst_is_selected_for_intra_4x4() {
    let p = Primitives::<u8>::new();
    let src: Vec<i16> = (0..16).map(|i| i as i16).collect();
    let mut a = [0i32; 16];
    let mut b = [0i32; 16];
    p.forward(&src, &mut a, 4, 2, 8, true);
    fdst4(&src, &mut b, 4, 8);
    assert_eq!(a, b);
    p.forward(&src, &mut b, 4, 2, 8, false);
    assert_ne!(a, b);
  }
}
