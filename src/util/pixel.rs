// Copyright (c) 2024, The cuquad contributors. All rights reserved
//
// This source code is subject to the terms of the BSD 2 Clause License and
// the Alliance for Open Media Patent License 1.0. If the BSD 2 Clause License
// was not distributed with this source code in the LICENSE file, you can
// obtain it at www.aomedia.org/license/software. If the Alliance for Open
// Media Patent License 1.0 was not distributed with this source code in the
// PATENTS file, you can obtain it at www.aomedia.org/license/patent.

use num_traits::{AsPrimitive, PrimInt};
use std::fmt::{Debug, Display};

/// Trait for casting between primitive types.
pub trait CastFromPrimitive<T>: Copy + 'static {
  /// Casts the given value into `Self`.
  fn cast_from(v: T) -> Self;
}

macro_rules! impl_cast_from_primitive {
  ( $T:ty => $U:ty ) => {
    impl CastFromPrimitive<$U> for $T {
      #[inline(always)]
      fn cast_from(v: $U) -> Self { v as Self }
    }
  };
  ( $T:ty => { $( $U:ty ),* } ) => {
    $( impl_cast_from_primitive!($T => $U); )*
  };
}

// Casts into the sample and residual types go through `RegisteredPrimitive`
// so that `CastFromPrimitive<T: Pixel>` is always known to hold.
impl_cast_from_primitive!(u8 => { u32, u64, usize, i64, isize });
impl_cast_from_primitive!(u16 => { u32, u64, usize, i64, isize });
impl_cast_from_primitive!(i16 => { u32, u64, usize, i64, isize });
impl_cast_from_primitive!(i32 => { u32, u64, usize, i64, isize });

/// Primitive integers which samples, residuals and coefficients are
/// converted between.
pub trait RegisteredPrimitive:
  PrimInt
  + AsPrimitive<u8>
  + AsPrimitive<i16>
  + AsPrimitive<u16>
  + AsPrimitive<i32>
  + AsPrimitive<u32>
  + AsPrimitive<usize>
  + CastFromPrimitive<u8>
  + CastFromPrimitive<i16>
  + CastFromPrimitive<u16>
  + CastFromPrimitive<i32>
  + CastFromPrimitive<u32>
  + CastFromPrimitive<usize>
{
}

impl RegisteredPrimitive for u8 {}
impl RegisteredPrimitive for u16 {}
impl RegisteredPrimitive for i16 {}
impl RegisteredPrimitive for i32 {}

macro_rules! impl_cast_from_registered {
  ( $T:ty ) => {
    impl<T: RegisteredPrimitive> CastFromPrimitive<T> for $T {
      #[inline(always)]
      fn cast_from(v: T) -> Self {
        v.as_()
      }
    }
  };
}

impl_cast_from_registered!(u8);
impl_cast_from_registered!(i16);
impl_cast_from_registered!(u16);
impl_cast_from_registered!(i32);
impl_cast_from_registered!(u32);

/// Storage types for samples.
#[derive(Clone, Copy, Debug, Eq, PartialEq, PartialOrd, Ord)]
pub enum PixelType {
  /// 8 bits per sample, stored in a `u8`.
  U8,
  /// 9 to 12 bits per sample, stored in a `u16`.
  U16,
}

/// A type that can be used as a sample type.
pub trait Pixel:
  RegisteredPrimitive
  + Into<u32>
  + Into<i32>
  + Debug
  + Display
  + Default
  + Send
  + Sync
  + 'static
{
  /// Returns a [`PixelType`] variant corresponding to this type.
  fn type_enum() -> PixelType;

  /// Largest bit depth the storage type can carry.
  fn max_bit_depth() -> usize {
    match Self::type_enum() {
      PixelType::U8 => 8,
      PixelType::U16 => 12,
    }
  }

  /// Clips an intermediate value into the valid range for `bit_depth` and
  /// converts it into a sample.
  #[inline(always)]
  fn clip(v: i32, bit_depth: usize) -> Self {
    Self::cast_from(v.clamp(0, (1 << bit_depth) - 1))
  }

  /// Widens a sample to `i32`.
  #[inline(always)]
  fn to_i32(self) -> i32 {
    self.into()
  }
}

impl Pixel for u8 {
  #[inline(always)]
  fn type_enum() -> PixelType {
    PixelType::U8
  }
}

impl Pixel for u16 {
  #[inline(always)]
  fn type_enum() -> PixelType {
    PixelType::U16
  }
}

#[cfg(test)]
mod test {
  use super::*;

  #[test]
  fn clip_saturates_to_bit_depth() {
    assert_eq!(u8::clip(300, 8), 255);
    assert_eq!(u8::clip(-4, 8), 0);
    assert_eq!(u16::clip(1500, 10), 1023);
    assert_eq!(u16::clip(512, 10), 512);
  }

  #[test]
  #[allow(overflowing_literals)]
  fn storage_limits() {
    assert_eq!(u8::max_bit_depth(), 8);
    assert_eq!(u16::max_bit_depth(), 12);
    assert_eq!(i32::cast_from(200u8), 200);
    assert_eq!(u16::cast_from(70000i32 & 0xffff), 70000 & 0xffff);
  }
}
