// Copyright (c) 2024, The cuquad contributors. All rights reserved
//
// This source code is subject to the terms of the BSD 2 Clause License and
// the Alliance for Open Media Patent License 1.0. If the BSD 2 Clause License
// was not distributed with this source code in the LICENSE file, you can
// obtain it at www.aomedia.org/license/software. If the Alliance for Open
// Media Patent License 1.0 was not distributed with this source code in the
// PATENTS file, you can obtain it at www.aomedia.org/license/patent.

use crate::util::*;

use std::fmt;

/// Number of CU depth levels (64x64 down to 8x8).
pub const MAX_CU_DEPTH: usize = 4;
/// Log2 of the partition unit, the granularity of the per-part CU data.
pub const PART_LOG2: usize = 2;

pub const PLANAR_IDX: u8 = 0;
pub const DC_IDX: u8 = 1;
pub const HOR_IDX: u8 = 10;
pub const VER_IDX: u8 = 26;
pub const NUM_INTRA_MODE: u8 = 35;
/// Chroma candidate index meaning "same mode as luma".
pub const DM_CHROMA_IDX: u8 = 4;
pub const NUM_CHROMA_MODE: u8 = 5;

/// Prediction unit layout of a CU.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord)]
pub enum PartSize {
  Size2Nx2N,
  Size2NxN,
  SizeNx2N,
  SizeNxN,
  #[default]
  None,
}

impl PartSize {
  pub const fn num_pus(self) -> usize {
    match self {
      PartSize::Size2Nx2N => 1,
      PartSize::Size2NxN | PartSize::SizeNx2N => 2,
      PartSize::SizeNxN => 4,
      PartSize::None => 0,
    }
  }

  /// Position and dimensions, in luma samples, of PU `idx` inside a CU of
  /// `size`.
  pub const fn pu_rect(
    self, size: usize, idx: usize,
  ) -> (usize, usize, usize, usize) {
    let half = size >> 1;
    match self {
      PartSize::Size2NxN => (0, idx * half, size, half),
      PartSize::SizeNx2N => (idx * half, 0, half, size),
      PartSize::SizeNxN => ((idx & 1) * half, (idx >> 1) * half, half, half),
      PartSize::Size2Nx2N | PartSize::None => (0, 0, size, size),
    }
  }

  /// Z-order offset of the first partition of PU `idx`, for a CU made of
  /// `num_parts` partitions.
  pub const fn pu_part_offset(self, num_parts: usize, idx: usize) -> usize {
    match self {
      PartSize::Size2NxN => idx * (num_parts >> 1),
      PartSize::SizeNx2N | PartSize::SizeNxN => idx * (num_parts >> 2),
      PartSize::Size2Nx2N | PartSize::None => 0,
    }
  }

  /// Index of the PU that covers relative partition `rel_z` of a CU made of
  /// `num_parts` partitions.
  pub const fn pu_of_part(self, num_parts: usize, rel_z: usize) -> usize {
    let quarter = num_parts >> 2;
    let quadrant = rel_z / if quarter > 1 { quarter } else { 1 };
    match self {
      PartSize::Size2NxN => quadrant >> 1,
      PartSize::SizeNx2N => quadrant & 1,
      PartSize::SizeNxN => quadrant,
      PartSize::Size2Nx2N | PartSize::None => 0,
    }
  }
}

impl fmt::Display for PartSize {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let s = match self {
      PartSize::Size2Nx2N => "2Nx2N",
      PartSize::Size2NxN => "2NxN",
      PartSize::SizeNx2N => "Nx2N",
      PartSize::SizeNxN => "NxN",
      PartSize::None => "none",
    };
    f.write_str(s)
  }
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord)]
pub enum PredMode {
  Inter,
  Intra,
  #[default]
  None,
}

/// Geometry of one quadtree node.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct CuGeom {
  /// Luma position inside the picture.
  pub x: usize,
  pub y: usize,
  pub log2_size: usize,
  pub depth: usize,
  /// Raster address of the LCU holding the node.
  pub lcu_addr: usize,
  pub lcu_log2: usize,
  /// Z-order index of the first partition inside the LCU.
  pub abs_idx: usize,
}

impl CuGeom {
  pub fn lcu(x: usize, y: usize, lcu_addr: usize, lcu_log2: usize) -> Self {
    CuGeom {
      x,
      y,
      log2_size: lcu_log2,
      depth: 0,
      lcu_addr,
      lcu_log2,
      abs_idx: 0,
    }
  }

  #[inline]
  pub const fn size(&self) -> usize {
    1 << self.log2_size
  }

  #[inline]
  pub const fn num_parts(&self) -> usize {
    1 << ((self.log2_size - PART_LOG2) * 2)
  }

  #[inline]
  pub const fn parts_per_lcu(&self) -> usize {
    1 << ((self.lcu_log2 - PART_LOG2) * 2)
  }

  /// Address of the first partition in picture partition units.
  #[inline]
  pub const fn global_addr(&self) -> usize {
    self.lcu_addr * self.parts_per_lcu() + self.abs_idx
  }

  /// Child `idx` (raster order) of the quadtree node.
  pub fn child(&self, idx: usize) -> CuGeom {
    debug_assert!(idx < 4 && self.log2_size > 3);
    let half = self.size() >> 1;
    CuGeom {
      x: self.x + (idx & 1) * half,
      y: self.y + (idx >> 1) * half,
      log2_size: self.log2_size - 1,
      depth: self.depth + 1,
      lcu_addr: self.lcu_addr,
      lcu_log2: self.lcu_log2,
      abs_idx: self.abs_idx + idx * (self.num_parts() >> 2),
    }
  }

  /// Picture position, in partition units, of relative partition `rel_z`.
  #[inline]
  pub fn part_pos(&self, rel_z: usize) -> (usize, usize) {
    let (dx, dy) = morton_decode(rel_z);
    ((self.x >> PART_LOG2) + dx, (self.y >> PART_LOG2) + dy)
  }

  /// Relative z-order index of the partition at picture partition position
  /// `(x4, y4)`, if it lies inside the node.
  #[inline]
  pub fn rel_part(&self, x4: isize, y4: isize) -> Option<usize> {
    let dx = x4 - (self.x >> PART_LOG2) as isize;
    let dy = y4 - (self.y >> PART_LOG2) as isize;
    let n = 1isize << (self.log2_size - PART_LOG2);
    if (0..n).contains(&dx) && (0..n).contains(&dy) {
      Some(morton_encode(dx as usize, dy as usize))
    } else {
      None
    }
  }

  pub const fn is_inside(&self, width: usize, height: usize) -> bool {
    self.x + self.size() <= width && self.y + self.size() <= height
  }

  pub const fn intersects(&self, width: usize, height: usize) -> bool {
    self.x < width && self.y < height
  }
}

/// Z-order partition index inside an LCU of the partition at luma sample
/// offset `(x, y)` relative to the LCU origin.
#[inline]
pub const fn raster_to_zscan(x: usize, y: usize) -> usize {
  morton_encode(x >> PART_LOG2, y >> PART_LOG2)
}

/// Luma sample offset, relative to the LCU origin, of partition `z`.
#[inline]
pub const fn zscan_to_raster(z: usize) -> (usize, usize) {
  let (x, y) = morton_decode(z);
  (x << PART_LOG2, y << PART_LOG2)
}

#[cfg(test)]
mod test {
  use super::*;

  #[test]
  fn pu_layout_covers_cu() {
    for ps in [
      PartSize::Size2Nx2N,
      PartSize::Size2NxN,
      PartSize::SizeNx2N,
      PartSize::SizeNxN,
    ] {
      let area: usize = (0..ps.num_pus())
        .map(|i| {
          let (_, _, w, h) = ps.pu_rect(16, i);
          w * h
        })
        .sum();
      assert_eq!(area, 256, "{ps}");
    }
    assert_eq!(PartSize::SizeNx2N.pu_part_offset(16, 1), 4);
    assert_eq!(PartSize::Size2NxN.pu_part_offset(16, 1), 8);
    assert_eq!(PartSize::SizeNxN.pu_part_offset(4, 3), 3);
  }

  #[test]
  fn pu_of_part_matches_rect() {
    let cu = CuGeom::lcu(0, 0, 0, 4);
    for ps in [PartSize::Size2NxN, PartSize::SizeNx2N, PartSize::SizeNxN] {
      for z in 0..cu.num_parts() {
        let (x4, y4) = cu.part_pos(z);
        let pu = ps.pu_of_part(cu.num_parts(), z);
        let (px, py, w, h) = ps.pu_rect(16, pu);
        assert!((px..px + w).contains(&(x4 * 4)), "{ps} part {z}");
        assert!((py..py + h).contains(&(y4 * 4)), "{ps} part {z}");
      }
    }
  }

  #[test]
  fn children_tile_parent() {
    let lcu = CuGeom::lcu(64, 0, 1, 6);
    let c3 = lcu.child(3);
    assert_eq!((c3.x, c3.y, c3.log2_size, c3.abs_idx), (96, 32, 5, 192));
    assert_eq!(c3.global_addr(), 256 + 192);
    assert_eq!(lcu.rel_part(16 + 8, 8), Some(192));
    assert_eq!(lcu.rel_part(15, 0), None);
    assert_eq!(raster_to_zscan(8, 4), morton_encode(2, 1));
    assert_eq!(zscan_to_raster(3), (4, 4));
  }
}
