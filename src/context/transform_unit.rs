// Copyright (c) 2024, The cuquad contributors. All rights reserved
//
// This source code is subject to the terms of the BSD 2 Clause License and
// the Alliance for Open Media Patent License 1.0. If the BSD 2 Clause License
// was not distributed with this source code in the LICENSE file, you can
// obtain it at www.aomedia.org/license/software. If the Alliance for Open
// Media Patent License 1.0 was not distributed with this source code in the
// PATENTS file, you can obtain it at www.aomedia.org/license/patent.

use super::*;

/// Number of greater-1 flags coded per coefficient group.
const C1FLAG_NUMBER: usize = 8;
const COEF_REMAIN_BIN_REDUCTION: u32 = 3;

static GROUP_IDX: [u8; 32] = [
  0, 1, 2, 3, 4, 4, 5, 5, 6, 6, 6, 6, 7, 7, 7, 7, 8, 8, 8, 8, 8, 8, 8, 8, 9,
  9, 9, 9, 9, 9, 9, 9,
];
static MIN_IN_GROUP: [u8; 10] = [0, 1, 2, 3, 4, 6, 8, 12, 16, 24];

static CTX_IND_MAP_4X4: [u8; 16] =
  [0, 1, 4, 5, 2, 3, 4, 5, 6, 6, 8, 8, 7, 7, 8, 8];

/// Context offset and shift of the last position prefix bins.
const fn last_ctx_offset_shift(log2: usize, luma: bool) -> (usize, usize) {
  if luma {
    (3 * (log2 - 2) + ((log2 - 1) >> 2), (log2 + 1) >> 2)
  } else {
    (NUM_LAST_FLAG_XY_LUMA, log2 - 2)
  }
}

/// Context increment of `sig_coeff_flag` at `(x, y)`; `pattern` holds the
/// coded sub-block flags of the right (bit 0) and lower (bit 1) groups.
fn sig_ctx_inc(
  pattern: usize, x: usize, y: usize, log2: usize, scan: ScanType,
  luma: bool,
) -> usize {
  let chroma_offset = if luma { 0 } else { NUM_SIG_FLAG_CTX_LUMA };
  if x + y == 0 {
    return chroma_offset;
  }
  if log2 == 2 {
    return chroma_offset + CTX_IND_MAP_4X4[4 * y + x] as usize;
  }
  let offset = if log2 == 3 {
    if scan == ScanType::Diag {
      9
    } else {
      15
    }
  } else if luma {
    21
  } else {
    12
  };
  let (xs, ys) = (x & 3, y & 3);
  let cnt = match pattern {
    0 => match xs + ys {
      0 => 2,
      1 | 2 => 1,
      _ => 0,
    },
    1 => match ys {
      0 => 2,
      1 => 1,
      _ => 0,
    },
    2 => match xs {
      0 => 2,
      1 => 1,
      _ => 0,
    },
    _ => 2,
  };
  let not_first_group = (x >> 2) + (y >> 2) > 0;
  chroma_offset
    + if luma && not_first_group { 3 } else { 0 }
    + offset
    + cnt
}

impl ContextWriter {
  fn write_last_significant_xy<W: Writer>(
    &mut self, w: &mut W, mut x: usize, mut y: usize, log2: usize,
    luma: bool, scan: ScanType,
  ) {
    if scan == ScanType::Ver {
      std::mem::swap(&mut x, &mut y);
    }
    let (offset, shift) = last_ctx_offset_shift(log2, luma);
    let max_group = GROUP_IDX[(1 << log2) - 1] as usize;
    let gx = GROUP_IDX[x] as usize;
    let gy = GROUP_IDX[y] as usize;

    for i in 0..gx {
      w.encode_bin(true, &mut self.fc.last_x[offset + (i >> shift)]);
    }
    if gx < max_group {
      w.encode_bin(false, &mut self.fc.last_x[offset + (gx >> shift)]);
    }
    for i in 0..gy {
      w.encode_bin(true, &mut self.fc.last_y[offset + (i >> shift)]);
    }
    if gy < max_group {
      w.encode_bin(false, &mut self.fc.last_y[offset + (gy >> shift)]);
    }
    for (pos, g) in [(x, gx), (y, gy)] {
      if g > 3 {
        let suffix = pos - MIN_IN_GROUP[g] as usize;
        w.encode_bins_ep(suffix as u32, ((g - 2) >> 1) as u32);
      }
    }
  }

  fn write_coef_remain_ex_golomb<W: Writer>(
    w: &mut W, symbol: u32, rice: u32,
  ) {
    if symbol < (COEF_REMAIN_BIN_REDUCTION << rice) {
      let length = symbol >> rice;
      w.encode_bins_ep((1 << (length + 1)) - 2, length + 1);
      w.encode_bins_ep(symbol & ((1 << rice) - 1), rice);
    } else {
      let mut length = rice;
      let mut code = symbol - (COEF_REMAIN_BIN_REDUCTION << rice);
      while code >= (1 << length) {
        code -= 1 << length;
        length += 1;
      }
      let prefix = COEF_REMAIN_BIN_REDUCTION + length + 1 - rice;
      w.encode_bins_ep((1 << prefix) - 2, prefix);
      w.encode_bins_ep(code, length);
    }
  }

  /// `residual_coding` of a `2^log2` square block of levels in raster
  /// order. The block must hold at least one nonzero level.
  pub fn write_coeff_nxn<W: Writer>(
    &mut self, w: &mut W, coeffs: &[i32], log2: usize, luma: bool,
    scan_type: ScanType,
  ) {
    let n = 1usize << log2;
    let scan = scan_order(log2, scan_type);
    let cg_side = n >> CG_LOG2;

    let last_scan_pos = scan.scan[..n * n]
      .iter()
      .rposition(|&p| coeffs[p as usize] != 0)
      .expect("write_coeff_nxn called on an empty block");
    let last_pos = scan.scan[last_scan_pos] as usize;
    self.write_last_significant_xy(
      w,
      last_pos & (n - 1),
      last_pos >> log2,
      log2,
      luma,
      scan_type,
    );

    let mut coded_cg = [false; 64];
    let last_subset = last_scan_pos >> LOG2_SCAN_SET_SIZE;
    let mut c1 = 1usize;
    let sig_cg_offset = if luma { 0 } else { NUM_SIG_CG_FLAG_CTX };
    let one_offset = if luma { 0 } else { NUM_ONE_FLAG_CTX_LUMA };
    let abs_offset = if luma { 0 } else { NUM_ABS_FLAG_CTX_LUMA };

    for subset in (0..=last_subset).rev() {
      let (cgx, cgy) = scan.cg[subset];
      let (cgx, cgy) = (cgx as usize, cgy as usize);
      let first_pos = subset << LOG2_SCAN_SET_SIZE;
      let right = cgx + 1 < cg_side && coded_cg[cgy * cg_side + cgx + 1];
      let below = cgy + 1 < cg_side && coded_cg[(cgy + 1) * cg_side + cgx];
      let pattern = right as usize + 2 * below as usize;

      let mut abs_levels = [0u32; SCAN_SET_SIZE];
      let mut signs = 0u32;
      let mut num_nonzero = 0usize;
      let mut scan_pos = first_pos + SCAN_SET_SIZE - 1;

      if subset == last_subset {
        scan_pos = last_scan_pos;
        let level = coeffs[last_pos];
        abs_levels[0] = level.unsigned_abs();
        signs = (level < 0) as u32;
        num_nonzero = 1;
        coded_cg[cgy * cg_side + cgx] = true;
      } else {
        let any = scan.scan[first_pos..first_pos + SCAN_SET_SIZE]
          .iter()
          .any(|&p| coeffs[p as usize] != 0);
        if subset > 0 {
          let ctx = sig_cg_offset + right.max(below) as usize;
          w.encode_bin(any, &mut self.fc.sig_cg[ctx]);
        }
        coded_cg[cgy * cg_side + cgx] = any || subset == 0;
        if !coded_cg[cgy * cg_side + cgx] {
          continue;
        }
        scan_pos += 1;
      }

      // significance, in reverse scan order
      let infer_dc = subset != last_subset && subset > 0;
      while scan_pos > first_pos {
        scan_pos -= 1;
        let pos = scan.scan[scan_pos] as usize;
        let level = coeffs[pos];
        let sig = level != 0;
        if scan_pos == first_pos && infer_dc && num_nonzero == 0 {
          // the flag is inferred
        } else {
          let (x, y) = (pos & (n - 1), pos >> log2);
          let ctx = sig_ctx_inc(pattern, x, y, log2, scan_type, luma);
          w.encode_bin(sig, &mut self.fc.sig_flag[ctx]);
        }
        if sig {
          abs_levels[num_nonzero] = level.unsigned_abs();
          signs = (signs << 1) | (level < 0) as u32;
          num_nonzero += 1;
        }
      }

      if num_nonzero == 0 {
        continue;
      }

      let mut ctx_set = if subset > 0 && luma { 2 } else { 0 };
      if c1 == 0 {
        ctx_set += 1;
      }
      c1 = 1;
      let mut first_c2_idx = None;
      let num_c1 = num_nonzero.min(C1FLAG_NUMBER);
      for (idx, &abs) in abs_levels[..num_c1].iter().enumerate() {
        let greater1 = abs > 1;
        let ctx = one_offset + ctx_set * 4 + c1;
        w.encode_bin(greater1, &mut self.fc.one_flag[ctx]);
        if greater1 {
          c1 = 0;
          first_c2_idx.get_or_insert(idx);
        } else if c1 > 0 && c1 < 3 {
          c1 += 1;
        }
      }
      if let Some(idx) = first_c2_idx {
        w.encode_bin(
          abs_levels[idx] > 2,
          &mut self.fc.abs_flag[abs_offset + ctx_set],
        );
      }

      w.encode_bins_ep(signs, num_nonzero as u32);

      if c1 == 0 || num_nonzero > C1FLAG_NUMBER {
        let mut first_coeff2 = 1;
        let mut rice = 0u32;
        for (idx, &abs) in abs_levels[..num_nonzero].iter().enumerate() {
          let base = if idx < C1FLAG_NUMBER { 2 + first_coeff2 } else { 1 };
          if abs >= base {
            Self::write_coef_remain_ex_golomb(w, abs - base, rice);
            if abs > 3 * (1 << rice) {
              rice = (rice + 1).min(4);
            }
          }
          if abs >= 2 {
            first_coeff2 = 0;
          }
        }
      }
    }
  }
}

#[cfg(test)]
mod test {
  use super::*;
  use crate::ec::{Bin, WriterCounter, WriterRecorder};

  fn cw() -> ContextWriter {
    ContextWriter::new(CabacContexts::new(SliceType::I, 32))
  }

  #[test]
  fn last_position_contexts() {
    assert_eq!(last_ctx_offset_shift(2, true), (0, 0));
    assert_eq!(last_ctx_offset_shift(3, true), (3, 1));
    assert_eq!(last_ctx_offset_shift(5, true), (10, 1));
    assert_eq!(last_ctx_offset_shift(4, false), (15, 2));
  }

  #[test]
  fn dc_only_block_is_cheap() {
    let mut coeffs = [0i32; 64];
    coeffs[0] = 1;
    let mut w = WriterRecorder::new();
    cw().write_coeff_nxn(&mut w, &coeffs, 3, true, ScanType::Diag);
    let bins = w.recorded().bins();
    // last x, last y, greater1, sign
    assert_eq!(bins.len(), 4);
    assert_eq!(bins[3], Bin::Bypass { value: 0, n: 1 });
  }

  #[test]
  fn sig_context_of_dc_and_4x4() {
    assert_eq!(sig_ctx_inc(0, 0, 0, 4, ScanType::Diag, true), 0);
    assert_eq!(sig_ctx_inc(0, 3, 3, 2, ScanType::Diag, true), 8);
    assert_eq!(sig_ctx_inc(0, 1, 0, 3, ScanType::Diag, true), 10);
    assert_eq!(sig_ctx_inc(3, 5, 5, 4, ScanType::Diag, true), 26);
    assert_eq!(sig_ctx_inc(0, 0, 0, 2, ScanType::Diag, false), 27);
  }

  #[test]
  fn remain_code_lengths() {
    for (symbol, rice, bits) in [(0, 0, 1), (2, 0, 3), (3, 0, 4), (0, 1, 2)] {
      let mut w = WriterCounter::new();
      ContextWriter::write_coef_remain_ex_golomb(&mut w, symbol, rice);
      assert_eq!(w.tell(), bits, "symbol {symbol} rice {rice}");
    }
  }

  #[test]
  fn dense_blocks_cost_more() {
    let sparse: Vec<i32> =
      (0..256).map(|i| if i == 17 { -3 } else { 0 }).collect();
    let dense: Vec<i32> = (0..256).map(|i| (i % 7) - 3).collect();
    let mut w = WriterCounter::new();
    cw().write_coeff_nxn(&mut w, &sparse, 4, true, ScanType::Diag);
    let a = w.tell();
    w.reset_bits();
    cw().write_coeff_nxn(&mut w, &dense, 4, true, ScanType::Diag);
    assert!(w.tell() > 4 * a);
  }
}
