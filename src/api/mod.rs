// Copyright (c) 2024, The cuquad contributors. All rights reserved
//
// This source code is subject to the terms of the BSD 2 Clause License and
// the Alliance for Open Media Patent License 1.0. If the BSD 2 Clause License
// was not distributed with this source code in the LICENSE file, you can
// obtain it at www.aomedia.org/license/software. If the Alliance for Open
// Media Patent License 1.0 was not distributed with this source code in the
// PATENTS file, you can obtain it at www.aomedia.org/license/patent.

//! Configuration surface of the coding core.

mod config;
mod settings;

pub use config::*;
pub use settings::*;

pub use crate::frame::ChromaSampling;

use num_derive::FromPrimitive;
use num_traits::FromPrimitive;

use crate::serialize::{Deserialize, Serialize};

use std::fmt;

/// Slice type, numbered as `slice_type` is coded in the slice header.
#[derive(
  Clone,
  Copy,
  Debug,
  PartialEq,
  Eq,
  Hash,
  FromPrimitive,
  Serialize,
  Deserialize,
)]
pub enum SliceType {
  B = 0,
  P = 1,
  I = 2,
}

impl SliceType {
  /// Maps a coded `slice_type` value.
  pub fn from_code(code: u32) -> Option<SliceType> {
    SliceType::from_u32(code)
  }

  #[inline]
  pub const fn is_intra(self) -> bool {
    matches!(self, SliceType::I)
  }

  /// Number of reference picture lists used by the slice.
  #[inline]
  pub const fn num_lists(self) -> usize {
    match self {
      SliceType::I => 0,
      SliceType::P => 1,
      SliceType::B => 2,
    }
  }
}

impl fmt::Display for SliceType {
  fn fmt(&self, f: &mut fmt::Formatter) -> Result<(), fmt::Error> {
    write!(
      f,
      "{}",
      match self {
        SliceType::B => "B",
        SliceType::P => "P",
        SliceType::I => "I",
      }
    )
  }
}

#[cfg(test)]
mod test {
  use super::*;

  #[test]
  fn slice_type_codes() {
    assert_eq!(SliceType::from_code(0), Some(SliceType::B));
    assert_eq!(SliceType::from_code(2), Some(SliceType::I));
    assert_eq!(SliceType::from_code(3), None);
    assert_eq!(SliceType::P.num_lists(), 1);
    assert!(SliceType::I.is_intra());
  }
}
