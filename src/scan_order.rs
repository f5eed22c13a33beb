// Copyright (c) 2024, The cuquad contributors. All rights reserved
//
// This source code is subject to the terms of the BSD 2 Clause License and
// the Alliance for Open Media Patent License 1.0. If the BSD 2 Clause License
// was not distributed with this source code in the LICENSE file, you can
// obtain it at www.aomedia.org/license/software. If the Alliance for Open
// Media Patent License 1.0 was not distributed with this source code in the
// PATENTS file, you can obtain it at www.aomedia.org/license/patent.

//! Coefficient scan orders.

use crate::partition::*;

use std::sync::OnceLock;

pub const LOG2_SCAN_SET_SIZE: usize = 4;
pub const SCAN_SET_SIZE: usize = 1 << LOG2_SCAN_SET_SIZE;
/// Log2 of the side of a coefficient group.
pub const CG_LOG2: usize = 2;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum ScanType {
  Diag = 0,
  Hor = 1,
  Ver = 2,
}

impl ScanType {
  /// Scan of an intra block coded with `mode`, `log2` being the size of the
  /// block in its own plane.
  pub fn for_intra(mode: u8, log2: usize, luma: bool) -> Self {
    if !(log2 == 2 || (log2 == 3 && luma)) {
      return ScanType::Diag;
    }
    match mode {
      6..=14 => ScanType::Ver,
      22..=30 => ScanType::Hor,
      _ => ScanType::Diag,
    }
  }
}

/// Positions, as `(x, y)`, of an `n`x`n` grid visited in `scan` order.
fn grid_scan(n: usize, scan: ScanType) -> Vec<(u8, u8)> {
  let mut out = Vec::with_capacity(n * n);
  match scan {
    ScanType::Hor => {
      for y in 0..n {
        for x in 0..n {
          out.push((x as u8, y as u8));
        }
      }
    }
    ScanType::Ver => {
      for x in 0..n {
        for y in 0..n {
          out.push((x as u8, y as u8));
        }
      }
    }
    ScanType::Diag => {
      // up-right diagonals, each starting at the bottom-left end
      for line in 0..2 * n - 1 {
        let mut y = line.min(n - 1) as isize;
        let mut x = line as isize - y;
        while y >= 0 && (x as usize) < n {
          out.push((x as u8, y as u8));
          x += 1;
          y -= 1;
        }
      }
    }
  }
  out
}

/// Scan of a whole transform block: coefficient groups in `scan` order and
/// positions inside each group in the same order.
pub struct ScanOrder {
  /// Raster index of the coefficient at each scan position.
  pub scan: Vec<u16>,
  /// Coefficient group position, as `(x, y)`, of each group in scan order.
  pub cg: Vec<(u8, u8)>,
}

impl ScanOrder {
  fn new(log2: usize, scan_type: ScanType) -> Self {
    let n = 1usize << log2;
    let cg_n = n >> CG_LOG2;
    let cg = grid_scan(cg_n, scan_type);
    let inner = grid_scan(1 << CG_LOG2, scan_type);
    let mut scan = Vec::with_capacity(n * n);
    for &(gx, gy) in &cg {
      for &(x, y) in &inner {
        let px = ((gx as usize) << CG_LOG2) + x as usize;
        let py = ((gy as usize) << CG_LOG2) + y as usize;
        scan.push((py * n + px) as u16);
      }
    }
    ScanOrder { scan, cg }
  }
}

/// Scan tables for transform sizes 4x4 to 32x32.
pub fn scan_order(log2: usize, scan_type: ScanType) -> &'static ScanOrder {
  static TABLES: OnceLock<Vec<[ScanOrder; 3]>> = OnceLock::new();
  let tables = TABLES.get_or_init(|| {
    (2..=5)
      .map(|log2| {
        [
          ScanOrder::new(log2, ScanType::Diag),
          ScanOrder::new(log2, ScanType::Hor),
          ScanOrder::new(log2, ScanType::Ver),
        ]
      })
      .collect()
  });
  &tables[log2 - 2][scan_type as usize]
}

/// Maps an intra direction to the one used by 4:2:2 chroma, whose samples
/// are twice as tall as they are wide.
pub static CHROMA_422_MODE_MAP: [u8; NUM_INTRA_MODE as usize] = [
  0, 1, 2, 2, 2, 2, 3, 5, 7, 8, 10, 11, 13, 15, 16, 18, 19, 20, 21, 22, 23,
  23, 24, 24, 25, 25, 26, 27, 27, 28, 28, 29, 29, 30, 31,
];

#[cfg(test)]
mod test {
  use super::*;

  #[test]
  fn diagonal_4x4_order() {
    let s = scan_order(2, ScanType::Diag);
    assert_eq!(
      s.scan,
      vec![0, 4, 1, 8, 5, 2, 12, 9, 6, 3, 13, 10, 7, 14, 11, 15]
    );
  }

  #[test]
  fn scans_are_permutations() {
    for log2 in 2..=5 {
      for t in [ScanType::Diag, ScanType::Hor, ScanType::Ver] {
        let mut s = scan_order(log2, t).scan.clone();
        s.sort_unstable();
        assert!(s.iter().enumerate().all(|(i, &v)| i == v as usize));
      }
    }
  }

  #[test]
  fn grouped_horizontal_8x8() {
    let s = scan_order(3, ScanType::Hor);
    assert_eq!(&s.scan[..5], &[0, 1, 2, 3, 8]);
    // second group is the top-right one
    assert_eq!(s.scan[16], 4);
    assert_eq!(s.cg, vec![(0, 0), (1, 0), (0, 1), (1, 1)]);
  }

  #[test]
  fn mode_dependent_selection() {
    assert_eq!(ScanType::for_intra(10, 2, true), ScanType::Ver);
    assert_eq!(ScanType::for_intra(26, 3, true), ScanType::Hor);
    assert_eq!(ScanType::for_intra(26, 3, false), ScanType::Diag);
    assert_eq!(ScanType::for_intra(26, 2, false), ScanType::Hor);
    assert_eq!(ScanType::for_intra(10, 4, true), ScanType::Diag);
  }
}
