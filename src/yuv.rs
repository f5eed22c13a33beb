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

/// Sample buffer of one CU: three planes sized for a `2^log2` luma block.
#[derive(Clone, Debug)]
pub struct Yuv<T: Pixel> {
  pub planes: [Vec<T>; 3],
  pub log2: usize,
  pub xdec: usize,
  pub ydec: usize,
}

impl<T: Pixel> Yuv<T> {
  pub fn new(log2: usize, cs: ChromaSampling) -> Self {
    let (xdec, ydec) = cs.decimation();
    let luma = 1 << (2 * log2);
    let chroma = luma >> (xdec + ydec);
    Yuv {
      planes: [
        vec![T::cast_from(0u8); luma],
        vec![T::cast_from(0u8); chroma],
        vec![T::cast_from(0u8); chroma],
      ],
      log2,
      xdec,
      ydec,
    }
  }

  #[inline]
  pub const fn dec(&self, p: usize) -> (usize, usize) {
    if p == 0 {
      (0, 0)
    } else {
      (self.xdec, self.ydec)
    }
  }

  #[inline]
  pub const fn stride(&self, p: usize) -> usize {
    (1 << self.log2) >> self.dec(p).0
  }

  /// Slice of plane `p` starting at luma offset `(x, y)` from the block
  /// origin.
  #[inline]
  pub fn at(&self, p: usize, x: usize, y: usize) -> &[T] {
    let (xd, yd) = self.dec(p);
    &self.planes[p][(y >> yd) * self.stride(p) + (x >> xd)..]
  }

  #[inline]
  pub fn at_mut(&mut self, p: usize, x: usize, y: usize) -> &mut [T] {
    let (xd, yd) = self.dec(p);
    let stride = self.stride(p);
    &mut self.planes[p][(y >> yd) * stride + (x >> xd)..]
  }

  /// Loads the block at luma position `(x, y)` of `frame`.
  pub fn copy_from_picture(&mut self, frame: &Frame<T>, x: usize, y: usize) {
    for p in 0..3 {
      let (xd, yd) = self.dec(p);
      let stride = self.stride(p);
      let h = (1 << self.log2) >> yd;
      frame.planes[p].read_block(
        x >> xd,
        y >> yd,
        stride,
        h,
        &mut self.planes[p],
        stride,
      );
    }
  }

  /// Stores the `2^log2` luma block at offset `(off_x, off_y)` of this
  /// buffer, with its chroma, to luma position `(x, y)` of `frame`.
  pub fn copy_to_picture(
    &self, frame: &mut Frame<T>, x: usize, y: usize, off_x: usize,
    off_y: usize, log2: usize,
  ) {
    for p in 0..3 {
      let (xd, yd) = self.dec(p);
      let (w, h) = ((1 << log2) >> xd, (1 << log2) >> yd);
      frame.planes[p].write_block(
        x >> xd,
        y >> yd,
        w,
        h,
        self.at(p, off_x, off_y),
        self.stride(p),
      );
    }
  }

  /// Copies the whole of `src`, a smaller block, to luma offset
  /// `(off_x, off_y)`.
  pub fn copy_part_from(&mut self, src: &Yuv<T>, off_x: usize, off_y: usize) {
    debug_assert!(src.log2 <= self.log2);
    for p in 0..3 {
      let (xd, yd) = self.dec(p);
      let (w, h) = ((1 << src.log2) >> xd, (1 << src.log2) >> yd);
      let dst_stride = self.stride(p);
      let src_stride = src.stride(p);
      let dst = self.at_mut(p, off_x, off_y);
      for r in 0..h {
        dst[r * dst_stride..][..w]
          .copy_from_slice(&src.planes[p][r * src_stride..][..w]);
      }
    }
  }

  /// Copies the rectangle at luma offset `(x, y)` of size `w`x`h` (luma
  /// samples) of plane `p` from `src`, both buffers having the same size.
  pub fn copy_rect_from(
    &mut self, src: &Yuv<T>, p: usize, x: usize, y: usize, w: usize,
    h: usize,
  ) {
    debug_assert_eq!(src.log2, self.log2);
    let (xd, yd) = self.dec(p);
    let (w, h) = (w >> xd, h >> yd);
    let stride = self.stride(p);
    let start = (y >> yd) * stride + (x >> xd);
    for r in 0..h {
      let row = start + r * stride;
      self.planes[p][row..row + w]
        .copy_from_slice(&src.planes[p][row..row + w]);
    }
  }
}

#[cfg(test)]
mod test {
  use super::*;

  #[test]
  fn picture_round_trip() {
    let mut frame = Frame::<u8>::new(32, 32, ChromaSampling::Cs420);
    frame.planes[0] = Plane::from_fn(32, 32, 0, 0, |x, y| (x + y) as u8);
    frame.planes[1] = Plane::from_fn(16, 16, 1, 1, |x, _| x as u8);
    let mut yuv = Yuv::<u8>::new(4, ChromaSampling::Cs420);
    yuv.copy_from_picture(&frame, 16, 8);
    assert_eq!(yuv.planes[0][0], 24);
    assert_eq!(yuv.at(1, 2, 0)[0], 9);

    let mut out = Frame::<u8>::new(32, 32, ChromaSampling::Cs420);
    yuv.copy_to_picture(&mut out, 0, 0, 8, 8, 3);
    assert_eq!(out.planes[0].p(0, 0), frame.planes[0].p(24, 16));
    assert_eq!(out.planes[1].p(3, 3), frame.planes[1].p(15, 11));
  }

  #[test]
  fn sub_block_copies_land_at_offset() {
    let mut big = Yuv::<u16>::new(4, ChromaSampling::Cs422);
    let mut small = Yuv::<u16>::new(3, ChromaSampling::Cs422);
    small.planes[2].fill(7);
    big.copy_part_from(&small, 8, 8);
    assert_eq!(big.at(2, 8, 8)[0], 7);
    assert_eq!(big.planes[2].iter().filter(|&&v| v == 7).count(), 32);
    assert_eq!(big.at(2, 0, 0)[0], 0);
  }
}
