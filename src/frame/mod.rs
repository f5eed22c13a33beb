// Copyright (c) 2024, The cuquad contributors. All rights reserved
//
// This source code is subject to the terms of the BSD 2 Clause License and
// the Alliance for Open Media Patent License 1.0. If the BSD 2 Clause License
// was not distributed with this source code in the LICENSE file, you can
// obtain it at www.aomedia.org/license/software. If the Alliance for Open
// Media Patent License 1.0 was not distributed with this source code in the
// PATENTS file, you can obtain it at www.aomedia.org/license/patent.

use std::fmt;
use std::iter::FusedIterator;

use crate::serialize::{Deserialize, Serialize};
use crate::util::Pixel;

/// Chroma subsampling format
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[repr(C)]
pub enum ChromaSampling {
  /// Both vertically and horizontally subsampled.
  Cs420,
  /// Horizontally subsampled.
  Cs422,
  /// Not subsampled.
  Cs444,
  /// Monochrome.
  Cs400,
}

impl fmt::Display for ChromaSampling {
  fn fmt(&self, f: &mut fmt::Formatter) -> Result<(), fmt::Error> {
    write!(
      f,
      "{}",
      match self {
        ChromaSampling::Cs420 => "4:2:0",
        ChromaSampling::Cs422 => "4:2:2",
        ChromaSampling::Cs444 => "4:4:4",
        ChromaSampling::Cs400 => "Monochrome",
      }
    )
  }
}

impl Default for ChromaSampling {
  fn default() -> Self {
    ChromaSampling::Cs420
  }
}

impl ChromaSampling {
  /// Provides the amount to right shift the luma plane dimensions to get the
  ///  chroma plane dimensions.
  /// Cs400 returns None, as there are no chroma planes.
  pub const fn get_decimation(self) -> Option<(usize, usize)> {
    use self::ChromaSampling::*;
    match self {
      Cs420 => Some((1, 1)),
      Cs422 => Some((1, 0)),
      Cs444 => Some((0, 0)),
      Cs400 => None,
    }
  }

  /// Decimation of the chroma planes, `(0, 0)` for monochrome.
  pub const fn decimation(self) -> (usize, usize) {
    match self.get_decimation() {
      Some(dec) => dec,
      None => (0, 0),
    }
  }

  /// Calculates the size of a chroma plane for this sampling type, given the
  /// luma plane dimensions.
  pub fn get_chroma_dimensions(
    self, luma_width: usize, luma_height: usize,
  ) -> (usize, usize) {
    if let Some((ss_x, ss_y)) = self.get_decimation() {
      ((luma_width + ss_x) >> ss_x, (luma_height + ss_y) >> ss_y)
    } else {
      (0, 0)
    }
  }
}

/// Plane-specific configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaneConfig {
  /// Data stride.
  pub stride: usize,
  /// Width in samples.
  pub width: usize,
  /// Height in samples.
  pub height: usize,
  /// Decimator along the X axis.
  pub xdec: usize,
  /// Decimator along the Y axis.
  pub ydec: usize,
}

/// Absolute offset in samples inside a plane
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PlaneOffset {
  pub x: isize,
  pub y: isize,
}

/// One sample plane, rows stored contiguously without padding.
#[derive(Clone, PartialEq, Eq)]
pub struct Plane<T: Pixel> {
  pub data: Vec<T>,
  pub cfg: PlaneConfig,
}

impl<T: Pixel> fmt::Debug for Plane<T> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(
      f,
      "Plane {{ data: [{}, ...], cfg: {:?} }}",
      self.data.first().copied().unwrap_or_default(),
      self.cfg
    )
  }
}

impl<T: Pixel> Plane<T> {
  pub fn new(width: usize, height: usize, xdec: usize, ydec: usize) -> Self {
    Plane {
      data: vec![T::cast_from(0u8); width * height],
      cfg: PlaneConfig { stride: width, width, height, xdec, ydec },
    }
  }

  /// Builds a plane by evaluating `f(x, y)` for every sample.
  pub fn from_fn(
    width: usize, height: usize, xdec: usize, ydec: usize,
    mut f: impl FnMut(usize, usize) -> T,
  ) -> Self {
    let mut plane = Plane::new(width, height, xdec, ydec);
    for (y, row) in plane.data.chunks_mut(width.max(1)).enumerate() {
      for (x, px) in row.iter_mut().enumerate() {
        *px = f(x, y);
      }
    }
    plane
  }

  /// Copy of the plane grown to `width`x`height`, the new samples
  /// replicating the right and bottom edges.
  pub fn padded(&self, width: usize, height: usize) -> Self {
    Plane::from_fn(width, height, self.cfg.xdec, self.cfg.ydec, |x, y| {
      self.p_clamped(x as isize, y as isize)
    })
  }

  #[inline(always)]
  pub fn p(&self, x: usize, y: usize) -> T {
    self.data[y * self.cfg.stride + x]
  }

  /// Sample at a possibly out of bounds position, replicating the edges.
  #[inline(always)]
  pub fn p_clamped(&self, x: isize, y: isize) -> T {
    let x = x.clamp(0, self.cfg.width as isize - 1) as usize;
    let y = y.clamp(0, self.cfg.height as isize - 1) as usize;
    self.data[y * self.cfg.stride + x]
  }

  #[inline(always)]
  pub fn row(&self, y: usize) -> &[T] {
    let start = y * self.cfg.stride;
    &self.data[start..start + self.cfg.width]
  }

  #[inline(always)]
  pub fn row_mut(&mut self, y: usize) -> &mut [T] {
    let start = y * self.cfg.stride;
    &mut self.data[start..start + self.cfg.width]
  }

  /// Slice starting at `po` and running to the end of the plane; rows are
  /// `cfg.stride` apart.
  pub fn slice(&self, po: PlaneOffset) -> &[T] {
    &self.data[po.y as usize * self.cfg.stride + po.x as usize..]
  }

  pub fn rows_iter(&self) -> RowsIter<'_, T> {
    RowsIter { plane: self, y: 0 }
  }

  /// Copies a `w`x`h` block from `src` (with `src_stride`) to `(x, y)`.
  pub fn write_block(
    &mut self, x: usize, y: usize, w: usize, h: usize, src: &[T],
    src_stride: usize,
  ) {
    let stride = self.cfg.stride;
    for r in 0..h {
      let dst = &mut self.data[(y + r) * stride + x..][..w];
      dst.copy_from_slice(&src[r * src_stride..][..w]);
    }
  }

  /// Copies a `w`x`h` block at `(x, y)` into `dst` (with `dst_stride`).
  pub fn read_block(
    &self, x: usize, y: usize, w: usize, h: usize, dst: &mut [T],
    dst_stride: usize,
  ) {
    let stride = self.cfg.stride;
    for r in 0..h {
      dst[r * dst_stride..][..w]
        .copy_from_slice(&self.data[(y + r) * stride + x..][..w]);
    }
  }
}

pub struct RowsIter<'a, T: Pixel> {
  plane: &'a Plane<T>,
  y: usize,
}

impl<'a, T: Pixel> Iterator for RowsIter<'a, T> {
  type Item = &'a [T];

  fn next(&mut self) -> Option<Self::Item> {
    if self.y < self.plane.cfg.height {
      let row = self.plane.row(self.y);
      self.y += 1;
      Some(row)
    } else {
      None
    }
  }

  fn size_hint(&self) -> (usize, Option<usize>) {
    let remaining = self.plane.cfg.height - self.y;
    (remaining, Some(remaining))
  }
}

impl<'a, T: Pixel> ExactSizeIterator for RowsIter<'a, T> {}
impl<'a, T: Pixel> FusedIterator for RowsIter<'a, T> {}

/// A picture: one luma and two chroma planes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame<T: Pixel> {
  pub planes: [Plane<T>; 3],
  pub chroma_sampling: ChromaSampling,
}

impl<T: Pixel> Frame<T> {
  pub fn new(
    width: usize, height: usize, chroma_sampling: ChromaSampling,
  ) -> Self {
    let (xdec, ydec) = chroma_sampling.decimation();
    let (cw, ch) = chroma_sampling.get_chroma_dimensions(width, height);
    Frame {
      planes: [
        Plane::new(width, height, 0, 0),
        Plane::new(cw, ch, xdec, ydec),
        Plane::new(cw, ch, xdec, ydec),
      ],
      chroma_sampling,
    }
  }

  pub fn width(&self) -> usize {
    self.planes[0].cfg.width
  }

  pub fn height(&self) -> usize {
    self.planes[0].cfg.height
  }

  /// Copy of the frame grown to a `width`x`height` luma area by edge
  /// replication.
  pub fn padded(&self, width: usize, height: usize) -> Self {
    let (cw, ch) = self.chroma_sampling.get_chroma_dimensions(width, height);
    Frame {
      planes: [
        self.planes[0].padded(width, height),
        self.planes[1].padded(cw, ch),
        self.planes[2].padded(cw, ch),
      ],
      chroma_sampling: self.chroma_sampling,
    }
  }
}

#[cfg(test)]
mod test {
  use super::*;

  #[test]
  fn chroma_planes_follow_sampling() {
    let f = Frame::<u8>::new(64, 32, ChromaSampling::Cs422);
    assert_eq!(f.planes[1].cfg.width, 32);
    assert_eq!(f.planes[1].cfg.height, 32);
    assert_eq!(f.planes[2].cfg.xdec, 1);
    assert_eq!(f.planes[2].cfg.ydec, 0);
  }

  #[test]
  fn block_copies_and_clamped_reads() {
    let src = Plane::<u16>::from_fn(16, 16, 0, 0, |x, y| (x + 16 * y) as u16);
    let mut buf = [0u16; 16];
    src.read_block(4, 4, 4, 4, &mut buf, 4);
    assert_eq!(buf[0], 68);
    assert_eq!(buf[15], 68 + 3 + 48);

    let mut dst = Plane::<u16>::new(16, 16, 0, 0);
    dst.write_block(8, 8, 4, 4, &buf, 4);
    assert_eq!(dst.p(8, 8), 68);
    assert_eq!(dst.p(11, 11), 119);

    assert_eq!(src.p_clamped(-3, -3), 0);
    assert_eq!(src.p_clamped(40, 0), 15);
    assert_eq!(src.rows_iter().count(), 16);
  }

  #[test]
  fn padding_replicates_the_edges() {
    let mut f = Frame::<u8>::new(6, 5, ChromaSampling::Cs420);
    for p in &mut f.planes {
      let w = p.cfg.width;
      for (i, v) in p.data.iter_mut().enumerate() {
        *v = (i % w + 10 * (i / w)) as u8;
      }
    }
    let padded = f.padded(8, 8);
    assert_eq!(padded.width(), 8);
    assert_eq!(padded.planes[1].cfg.width, 4);
    assert_eq!(padded.planes[1].cfg.height, 4);
    assert_eq!(padded.planes[0].p(3, 2), 23);
    assert_eq!(padded.planes[0].p(7, 2), 25);
    assert_eq!(padded.planes[0].p(7, 7), 45);
    assert_eq!(padded.planes[2].p(3, 3), 22);
  }
}
