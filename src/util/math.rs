// Copyright (c) 2024, The cuquad contributors. All rights reserved
//
// This source code is subject to the terms of the BSD 2 Clause License and
// the Alliance for Open Media Patent License 1.0. If the BSD 2 Clause License
// was not distributed with this source code in the LICENSE file, you can
// obtain it at www.aomedia.org/license/software. If the Alliance for Open
// Media Patent License 1.0 was not distributed with this source code in the
// PATENTS file, you can obtain it at www.aomedia.org/license/patent.

pub trait Fixed {
  fn floor_log2(&self, n: usize) -> usize;
  fn ceil_log2(&self, n: usize) -> usize;
  fn align_power_of_two(&self, n: usize) -> usize;
  fn align_power_of_two_and_shift(&self, n: usize) -> usize;
}

impl Fixed for usize {
  #[inline]
  fn floor_log2(&self, n: usize) -> usize {
    self & !((1 << n) - 1)
  }
  #[inline]
  fn ceil_log2(&self, n: usize) -> usize {
    (self + (1 << n) - 1).floor_log2(n)
  }
  #[inline]
  fn align_power_of_two(&self, n: usize) -> usize {
    self.ceil_log2(n)
  }
  #[inline]
  fn align_power_of_two_and_shift(&self, n: usize) -> usize {
    (self + (1 << n) - 1) >> n
  }
}

#[inline(always)]
pub fn msb(x: i32) -> i32 {
  debug_assert!(x > 0);
  31 ^ (x.leading_zeros() as i32)
}

#[inline(always)]
pub const fn round_shift(value: i32, bit: usize) -> i32 {
  (value + (1 << bit >> 1)) >> bit
}

/// Rounding right shift that tolerates a zero shift.
#[inline(always)]
pub const fn round_shift_any(value: i32, bit: usize) -> i32 {
  if bit == 0 {
    value
  } else {
    round_shift(value, bit)
  }
}

#[inline(always)]
pub fn clip16(v: i32) -> i32 {
  v.clamp(i16::MIN as i32, i16::MAX as i32)
}

#[inline(always)]
pub const fn signum(v: i32) -> i32 {
  (v > 0) as i32 - (v < 0) as i32
}

/// Interleaves the bits of `x` and `y` into a z-order (Morton) index, `x`
/// occupying the even bit positions.
#[inline]
pub const fn morton_encode(x: usize, y: usize) -> usize {
  const fn spread(mut v: usize) -> usize {
    v &= 0xffff;
    v = (v | (v << 8)) & 0x00ff_00ff;
    v = (v | (v << 4)) & 0x0f0f_0f0f;
    v = (v | (v << 2)) & 0x3333_3333;
    (v | (v << 1)) & 0x5555_5555
  }
  spread(x) | (spread(y) << 1)
}

/// Inverse of [`morton_encode`].
#[inline]
pub const fn morton_decode(z: usize) -> (usize, usize) {
  const fn compact(mut v: usize) -> usize {
    v &= 0x5555_5555;
    v = (v | (v >> 1)) & 0x3333_3333;
    v = (v | (v >> 2)) & 0x0f0f_0f0f;
    v = (v | (v >> 4)) & 0x00ff_00ff;
    (v | (v >> 8)) & 0x0000_ffff
  }
  (compact(z), compact(z >> 1))
}

#[cfg(test)]
mod test {
  use super::*;

  #[test]
  fn fixed_alignment() {
    assert_eq!(100usize.align_power_of_two(3), 104);
    assert_eq!(100usize.align_power_of_two_and_shift(6), 2);
    assert_eq!(64usize.floor_log2(6), 64);
  }

  #[test]
  fn morton_order() {
    let order: Vec<_> = (0..4).map(morton_decode).collect();
    assert_eq!(order, vec![(0, 0), (1, 0), (0, 1), (1, 1)]);
    for y in 0..16 {
      for x in 0..16 {
        assert_eq!(morton_decode(morton_encode(x, y)), (x, y));
      }
    }
    assert_eq!(morton_encode(2, 0), 4);
  }

  #[test]
  fn shifts_and_signs() {
    assert_eq!(round_shift(5, 1), 3);
    assert_eq!(round_shift_any(5, 0), 5);
    assert_eq!(clip16(70000), 32767);
    assert_eq!(signum(-3), -1);
    assert_eq!(msb(64), 6);
  }
}
