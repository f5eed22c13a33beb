// Copyright (c) 2024, The cuquad contributors. All rights reserved
//
// This source code is subject to the terms of the BSD 2 Clause License and
// the Alliance for Open Media Patent License 1.0. If the BSD 2 Clause License
// was not distributed with this source code in the LICENSE file, you can
// obtain it at www.aomedia.org/license/software. If the Alliance for Open
// Media Patent License 1.0 was not distributed with this source code in the
// PATENTS file, you can obtain it at www.aomedia.org/license/patent.

//! cuquad is the coding unit decision and entropy serialization core of an
//! HEVC-style encoder.
//!
//! A picture is split into LCUs, each the root of a quadtree of coding units.
//! [`encoder::CuSearch`] walks every quadtree top-down, evaluating merge,
//! skip, inter and intra candidates by rate-distortion cost and comparing
//! each node against its four children. The decisions are then serialized
//! by walking the same trees and emitting their syntax elements through a
//! context-adaptive binary arithmetic coder.
//!
//! # Basic usage
//!
//! ```
//! use cuquad::prelude::*;
//!
//! # fn main() -> Result<(), EncoderError> {
//! let config = EncoderConfig { width: 64, height: 64, ..Default::default() };
//! let input = Frame::<u8>::new(64, 64, ChromaSampling::Cs420);
//! let picture = encode_picture(&config, input, [Vec::new(), Vec::new()], 0)?;
//! assert_eq!(picture.segments.len(), 1);
//! # Ok(())
//! # }
//! ```

#![deny(bare_trait_objects)]
#![allow(clippy::cast_lossless)]
#![allow(clippy::cast_ptr_alignment)]
#![allow(clippy::cognitive_complexity)]
#![allow(clippy::needless_range_loop)]
#![allow(clippy::too_many_arguments)]
#![allow(clippy::verbose_bit_mask)]
#![allow(clippy::unreadable_literal)]
#![allow(clippy::many_single_char_names)]
#![allow(clippy::upper_case_acronyms)]
#![warn(clippy::expl_impl_clone_on_copy)]
#![warn(clippy::linkedlist)]
#![warn(clippy::map_flatten)]
#![warn(clippy::mem_forget)]
#![warn(clippy::mut_mut)]
#![warn(clippy::mutex_integer)]
#![warn(clippy::needless_borrow)]
#![warn(clippy::needless_continue)]
#![warn(clippy::path_buf_push_overwrite)]
#![warn(clippy::range_plus_one)]

mod serialize {
  cfg_if::cfg_if! {
    if #[cfg(feature="serialize")] {
      pub use serde::*;
    } else {
      pub use noop_proc_macro::{Deserialize, Serialize};
    }
  }
}

#[macro_use]
mod util;

mod dist;
mod predict;
mod primitives;
mod quantize;
mod scan_order;
mod transform;

pub mod api;
pub mod context;
pub mod cu;
pub mod ec;
pub mod encoder;
pub mod frame;
pub mod mc;
pub mod me;
pub mod partition;
pub mod rdo;
pub mod sao;
pub mod stats;
pub mod yuv;

pub use util::{CastFromPrimitive, Pixel, PixelType};

/// Commonly used types and functions.
pub mod prelude {
  pub use crate::api::*;
  pub use crate::encoder::{
    encode_frame, encode_picture, EncodedPicture, EncodedSegment,
    EncoderError, FrameInvariants, FrameState, ReferenceFrame,
  };
  pub use crate::frame::{ChromaSampling, Frame, Plane};
  pub use crate::stats::{
    DiagnosticsSink, EncoderStats, LogSink, NullSink, RecordingSink,
  };
  pub use crate::util::Pixel;
}

/// Internal kernels, exposed for the benchmarks.
#[cfg(feature = "bench")]
pub mod bench {
  pub use crate::dist::*;
  pub use crate::primitives::Primitives;
  pub use crate::quantize::*;
  pub use crate::transform::*;
}
