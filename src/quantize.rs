// Copyright (c) 2024, The cuquad contributors. All rights reserved
//
// This source code is subject to the terms of the BSD 2 Clause License and
// the Alliance for Open Media Patent License 1.0. If the BSD 2 Clause License
// was not distributed with this source code in the LICENSE file, you can
// obtain it at www.aomedia.org/license/software. If the Alliance for Open
// Media Patent License 1.0 was not distributed with this source code in the
// PATENTS file, you can obtain it at www.aomedia.org/license/patent.

use crate::frame::ChromaSampling;
use crate::util::*;

pub const QUANT_SCALES: [i32; 6] = [26214, 23302, 20560, 18396, 16384, 14564];
pub const INV_QUANT_SCALES: [i32; 6] = [40, 45, 51, 57, 64, 72];

pub const QUANT_SHIFT: usize = 14;
pub const IQUANT_SHIFT: usize = 6;
pub const MAX_TR_DYNAMIC_RANGE: usize = 15;
/// Flat scaling list entry.
pub const FLAT_SCALING_M: i32 = 16;

/// `QpC` as a function of `qPi` for 4:2:0, `qPi` in `30..=43`.
const CHROMA_QP_420: [i32; 14] =
  [29, 30, 31, 32, 33, 33, 34, 34, 35, 35, 36, 36, 37, 37];

/// Maps a luma QP to the chroma QP of the given sampling, before the bit
/// depth offset.
pub fn chroma_qp(qp: i32, cs: ChromaSampling) -> i32 {
  let qpi = qp.clamp(0, 57);
  match cs {
    ChromaSampling::Cs420 => match qpi {
      0..=29 => qpi,
      30..=43 => CHROMA_QP_420[(qpi - 30) as usize],
      _ => qpi - 6,
    },
    _ => qpi.min(51),
  }
}

/// QP split into its period and remainder.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct QpParam {
  pub qp: i32,
  pub per: i32,
  pub rem: i32,
}

impl QpParam {
  /// `qp` already includes the bit depth offset.
  pub const fn new(qp: i32) -> Self {
    QpParam { qp, per: qp / 6, rem: qp % 6 }
  }
}

/// Quantizes `num_coeff` coefficients with a flat `scale`, returning the
/// number of nonzero levels. `delta_u` receives the scaled rounding error.
pub fn quant(
  coef: &[i32], scale: i32, qcoef: &mut [i32], delta_u: &mut [i32],
  qbits: i32, add: i32, num_coeff: usize,
) -> u32 {
  let qbits8 = qbits - 8;
  let mut num_sig = 0;
  for i in 0..num_coeff {
    let level = coef[i];
    let tmp = level.unsigned_abs() as i64 * scale as i64;
    let q = (tmp + add as i64) >> qbits;
    delta_u[i] = ((tmp - (q << qbits)) >> qbits8) as i32;
    num_sig += (q != 0) as u32;
    let q = q.min(i16::MAX as i64) as i32;
    qcoef[i] = if level < 0 { -q } else { q };
  }
  num_sig
}

/// Scales quantized levels back to transform coefficients.
pub fn dequant(
  bit_depth: usize, src: &[i32], dst: &mut [i32], width: usize,
  height: usize, per: i32, rem: i32, use_scaling_list: bool,
  log2_tr_size: usize, scaling_factors: &[i32],
) {
  let transform_shift =
    MAX_TR_DYNAMIC_RANGE as i32 - bit_depth as i32 - log2_tr_size as i32;
  let mut shift = QUANT_IQUANT_SHIFT - transform_shift;
  let n = width * height;

  if use_scaling_list {
    shift += 4;
    if shift > per {
      let rshift = shift - per;
      let add = 1 << (rshift - 1);
      for i in 0..n {
        let v = (src[i] as i64 * scaling_factors[i] as i64 + add) >> rshift;
        dst[i] = clip16(v.clamp(i32::MIN as i64, i32::MAX as i64) as i32);
      }
    } else {
      let lshift = per - shift;
      for i in 0..n {
        let v = (src[i] as i64 * scaling_factors[i] as i64) << lshift;
        dst[i] = clip16(v.clamp(i32::MIN as i64, i32::MAX as i64) as i32);
      }
    }
  } else {
    let scale = (INV_QUANT_SCALES[rem as usize] << per) as i64;
    let add = 1i64 << (shift - 1);
    for i in 0..n {
      let v = (src[i] as i64 * scale + add) >> shift;
      dst[i] = clip16(v.clamp(i32::MIN as i64, i32::MAX as i64) as i32);
    }
  }
}

const QUANT_IQUANT_SHIFT: i32 = 20 - QUANT_SHIFT as i32;

/// Flat scaling factors for one transform size.
pub fn flat_scaling_factors(rem: i32, num_coeff: usize) -> Vec<i32> {
  vec![FLAT_SCALING_M * INV_QUANT_SCALES[rem as usize]; num_coeff]
}

/// Per transform block quantizer state.
#[derive(Clone, Copy, Debug, Default)]
pub struct QuantizationContext {
  pub qp: QpParam,
  log2: usize,
  bit_depth: usize,
  qbits: i32,
  add: i32,
}

impl QuantizationContext {
  /// `qp` is the luma or chroma QP without the bit depth offset.
  pub fn update(
    &mut self, qp: i32, log2: usize, is_intra: bool, bit_depth: usize,
  ) {
    self.qp = QpParam::new(qp + 6 * (bit_depth as i32 - 8));
    self.log2 = log2;
    self.bit_depth = bit_depth;
    let transform_shift =
      MAX_TR_DYNAMIC_RANGE as i32 - bit_depth as i32 - log2 as i32;
    self.qbits = QUANT_SHIFT as i32 + self.qp.per + transform_shift;
    self.add = (if is_intra { 171 } else { 85 }) << (self.qbits - 9);
  }

  pub fn quantize(
    &self, coeffs: &[i32], qcoeffs: &mut [i32], delta_u: &mut [i32],
  ) -> u32 {
    let n = 1 << (2 * self.log2);
    quant(
      coeffs,
      QUANT_SCALES[self.qp.rem as usize],
      qcoeffs,
      delta_u,
      self.qbits,
      self.add,
      n,
    )
  }

  pub fn dequantize(&self, qcoeffs: &[i32], rcoeffs: &mut [i32]) {
    let n = 1 << self.log2;
    dequant(
      self.bit_depth,
      qcoeffs,
      rcoeffs,
      n,
      n,
      self.qp.per,
      self.qp.rem,
      false,
      self.log2,
      &[],
    );
  }
}

#[cfg(test)]
mod test {
  use super::*;

  #[test]
  fn chroma_qp_mapping() {
    assert_eq!(chroma_qp(29, ChromaSampling::Cs420), 29);
    assert_eq!(chroma_qp(35, ChromaSampling::Cs420), 33);
    assert_eq!(chroma_qp(51, ChromaSampling::Cs420), 45);
    assert_eq!(chroma_qp(51, ChromaSampling::Cs444), 51);
  }

  #[test]
  fn quantization_reconstructs_within_step() {
    let mut qc = QuantizationContext::default();
    qc.update(22, 3, true, 8);
    let coeffs: Vec<i32> = (0..64).map(|i| (i * 37 % 400) - 200).collect();
    let mut q = [0i32; 64];
    let mut du = [0i32; 64];
    let mut r = [0i32; 64];
    let nz = qc.quantize(&coeffs, &mut q, &mut du);
    assert_eq!(nz as usize, q.iter().filter(|&&v| v != 0).count());
    qc.dequantize(&q, &mut r);
    // step size at qp 22 is 2^((22 - 4) / 6) = 8, in coefficient units
    for (c, r) in coeffs.iter().zip(&r) {
      assert!((c - r).abs() <= 8, "{c} vs {r}");
    }
  }

  #[test]
  fn flat_scaling_list_matches_direct_path() {
    let src: Vec<i32> = (0..16).map(|i| i - 8).collect();
    let mut a = [0i32; 16];
    let mut b = [0i32; 16];
    for qp in [4, 22, 37, 51] {
      let p = QpParam::new(qp);
      dequant(8, &src, &mut a, 4, 4, p.per, p.rem, false, 2, &[]);
      let factors = flat_scaling_factors(p.rem, 16);
      dequant(8, &src, &mut b, 4, 4, p.per, p.rem, true, 2, &factors);
      assert_eq!(a, b, "qp {qp}");
    }
  }
}
