// Copyright (c) 2024, The cuquad contributors. All rights reserved
//
// This source code is subject to the terms of the BSD 2 Clause License and
// the Alliance for Open Media Patent License 1.0. If the BSD 2 Clause License
// was not distributed with this source code in the LICENSE file, you can
// obtain it at www.aomedia.org/license/software. If the Alliance for Open
// Media Patent License 1.0 was not distributed with this source code in the
// PATENTS file, you can obtain it at www.aomedia.org/license/patent.

use itertools::*;
use thiserror::Error;

use crate::api::{SearchSettings, SliceType};
use crate::frame::ChromaSampling;
use crate::serialize::{Deserialize, Serialize};

use std::fmt;

/// Largest supported luma dimension.
pub const MAX_PICTURE_SIZE: usize = 16384;
/// Largest motion search range, keeps every vector inside `i16`.
pub const MAX_SEARCH_RANGE: usize = 1024;

/// Enumeration of possible invalid configuration errors.
#[derive(Debug, Clone, Copy, PartialEq, Error)]
#[non_exhaustive]
pub enum InvalidConfig {
  /// The width is invalid.
  #[error("invalid width {0} (expected > 0, <= 16384)")]
  InvalidWidth(usize),
  /// The height is invalid.
  #[error("invalid height {0} (expected > 0, <= 16384)")]
  InvalidHeight(usize),
  /// The bit depth is invalid or too large for the sample type.
  #[error("invalid bit depth {actual} (expected >= 8, <= {max})")]
  InvalidBitDepth {
    /// The actual value.
    actual: usize,
    /// The maximal supported value.
    max: usize,
  },
  /// The chroma sampling has no coding path.
  #[error("unsupported chroma sampling {0}")]
  UnsupportedChromaSampling(ChromaSampling),
  /// The LCU size is invalid.
  #[error("invalid LCU size {0} (expected 16, 32 or 64)")]
  InvalidLcuSize(usize),
  /// The minimum CU size is invalid.
  #[error("invalid minimum CU size {actual} (expected power of 2, >= 8, <= {max})")]
  InvalidMinCuSize {
    /// The actual value.
    actual: usize,
    /// The maximal supported value.
    max: usize,
  },
  /// The transform size range is invalid.
  #[error("invalid transform sizes {min}..={max} (expected 4 <= min < minimum CU size, min <= max <= 32)")]
  InvalidTuSizes {
    /// The minimum transform size.
    min: usize,
    /// The maximum transform size.
    max: usize,
  },
  /// A transform hierarchy depth is invalid.
  #[error("invalid transform hierarchy depth {0} (expected >= 1, <= 4)")]
  InvalidTuDepth(usize),
  /// The quantizer is invalid.
  #[error("invalid quantizer {0} (expected >= 0, <= 51)")]
  InvalidQp(i32),
  /// The lambda override is invalid.
  #[error("invalid lambda {0} (expected finite, > 0)")]
  InvalidLambda(f64),
  /// The merge candidate count is invalid.
  #[error("invalid merge candidate count {0} (expected >= 1, <= 5)")]
  InvalidMergeCandidates(usize),
  /// The active reference counts do not match the slice type.
  #[error("invalid reference counts {l0}/{l1} for {slice_type} slice")]
  InvalidReferenceCount {
    /// The slice type.
    slice_type: SliceType,
    /// Active list 0 references.
    l0: usize,
    /// Active list 1 references.
    l1: usize,
  },
  /// Fewer references were supplied than the active counts require.
  #[error("missing reference pictures in list {list} (need {needed}, have {have})")]
  MissingReferences {
    /// The reference list.
    list: usize,
    /// The active count.
    needed: usize,
    /// The supplied count.
    have: usize,
  },
  /// A slice segment start address is invalid.
  #[error("invalid slice segment start {0} (expected increasing, starting at 0, aligned to the minimum CU)")]
  InvalidSliceSegment(usize),
  /// The motion search range is invalid.
  #[error("invalid search range {0} (expected <= 1024)")]
  InvalidSearchRange(usize),
  /// The PCM size range is invalid.
  #[error("invalid PCM sizes {min}..={max} (expected 8 <= min <= max <= 32)")]
  InvalidPcmSizes {
    /// The minimum PCM size.
    min: usize,
    /// The maximum PCM size.
    max: usize,
  },
  /// The picture does not match the configured dimensions or sampling.
  #[error("picture geometry does not match the configuration")]
  FrameMismatch,
}

/// Encoder settings which impact the produced syntax.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EncoderConfig {
  // picture format
  /// Width of the pictures in luma samples.
  pub width: usize,
  /// Height of the pictures in luma samples.
  pub height: usize,
  /// Bit depth.
  pub bit_depth: usize,
  /// Chroma subsampling.
  pub chroma_sampling: ChromaSampling,

  // block structure
  /// Size of the largest coding unit.
  pub lcu_size: usize,
  /// Size of the smallest coding unit.
  pub min_cu_size: usize,
  /// Size of the smallest transform unit.
  pub min_tu_size: usize,
  /// Size of the largest transform unit.
  pub max_tu_size: usize,
  /// Transform hierarchy depth limit of intra CUs.
  pub tu_depth_intra: usize,
  /// Transform hierarchy depth limit of inter CUs.
  ///
  /// A value of 1 forces one implicit split for non-2Nx2N partitions.
  pub tu_depth_inter: usize,

  // slice
  /// The quantizer.
  pub qp: i32,
  /// Replaces the lambda derived from the quantizer.
  pub lambda: Option<f64>,
  /// Slice type of the picture.
  pub slice_type: SliceType,
  /// Number of active references in list 0 and list 1.
  pub ref_count: [usize; 2],
  /// Maximum number of merge candidates.
  pub max_merge_cands: usize,
  /// Enables temporal motion vector prediction.
  pub temporal_mvp: bool,
  /// Slice segment start addresses in picture partition units (4x4 luma,
  /// z-order inside each LCU, LCUs in raster order).
  ///
  /// An empty list means a single segment.
  pub slice_segments: Vec<usize>,

  // coding tools
  /// Signals a delta QP once per LCU.
  pub delta_qp: bool,
  /// Enables `pcm_flag` signalling.
  pub pcm: bool,
  /// Smallest CU size that signals `pcm_flag`.
  pub pcm_min_size: usize,
  /// Largest CU size that signals `pcm_flag`.
  pub pcm_max_size: usize,
  /// Enables `cu_transquant_bypass_flag` signalling.
  pub transquant_bypass: bool,
  /// Codes every CU losslessly; implies `transquant_bypass`.
  pub lossless: bool,
  /// Enables luma SAO.
  pub sao_luma: bool,
  /// Enables chroma SAO.
  pub sao_chroma: bool,

  /// Settings which affect the encoding speed vs. quality trade-off.
  pub search: SearchSettings,
}

/// Default preset for EncoderConfig: it is a balance between quality and
/// speed.
impl Default for EncoderConfig {
  fn default() -> Self {
    const DEFAULT_SPEED: usize = 4;
    Self::with_speed_preset(DEFAULT_SPEED)
  }
}

impl EncoderConfig {
  /// This is a preset which provides default settings according to a speed
  /// value in the specific range 0–10. See
  /// [`SearchSettings::from_preset`].
  pub fn with_speed_preset(speed: usize) -> Self {
    EncoderConfig {
      width: 416,
      height: 240,
      bit_depth: 8,
      chroma_sampling: ChromaSampling::Cs420,

      lcu_size: 64,
      min_cu_size: 8,
      min_tu_size: 4,
      max_tu_size: 32,
      tu_depth_intra: 1,
      tu_depth_inter: 1,

      qp: 32,
      lambda: None,
      slice_type: SliceType::I,
      ref_count: [0, 0],
      max_merge_cands: 5,
      temporal_mvp: true,
      slice_segments: Vec::new(),

      delta_qp: false,
      pcm: false,
      pcm_min_size: 8,
      pcm_max_size: 32,
      transquant_bypass: false,
      lossless: false,
      sao_luma: true,
      sao_chroma: true,

      search: SearchSettings::from_preset(speed),
    }
  }

  /// Number of 4x4 partitions in one LCU.
  pub const fn parts_per_lcu(&self) -> usize {
    (self.lcu_size / 4) * (self.lcu_size / 4)
  }

  /// Coded picture size: the picture size rounded up to whole minimum CUs.
  /// The samples past `width` and `height` lie outside the conformance
  /// window.
  pub const fn coded_size(&self) -> (usize, usize) {
    let align = self.min_cu_size;
    (
      (self.width + align - 1) / align * align,
      (self.height + align - 1) / align * align,
    )
  }

  /// Number of LCUs in a row and in a column.
  pub const fn lcu_dims(&self) -> (usize, usize) {
    let (w, h) = self.coded_size();
    let lcu = self.lcu_size;
    ((w + lcu - 1) / lcu, (h + lcu - 1) / lcu)
  }

  /// Checks the configuration for values the coding core cannot honour.
  ///
  /// # Errors
  ///
  /// Returns the first [`InvalidConfig`] found.
  pub fn validate(&self) -> Result<(), InvalidConfig> {
    use InvalidConfig::*;

    if !(8..=12).contains(&self.bit_depth) {
      return Err(InvalidBitDepth { actual: self.bit_depth, max: 12 });
    }
    if self.chroma_sampling == ChromaSampling::Cs400 {
      return Err(UnsupportedChromaSampling(self.chroma_sampling));
    }
    if ![16, 32, 64].contains(&self.lcu_size) {
      return Err(InvalidLcuSize(self.lcu_size));
    }
    if !self.min_cu_size.is_power_of_two()
      || self.min_cu_size < 8
      || self.min_cu_size > self.lcu_size
    {
      return Err(InvalidMinCuSize {
        actual: self.min_cu_size,
        max: self.lcu_size,
      });
    }
    if self.width == 0 || self.width > MAX_PICTURE_SIZE {
      return Err(InvalidWidth(self.width));
    }
    if self.height == 0 || self.height > MAX_PICTURE_SIZE {
      return Err(InvalidHeight(self.height));
    }
    if !self.min_tu_size.is_power_of_two()
      || !self.max_tu_size.is_power_of_two()
      || self.min_tu_size < 4
      || self.min_tu_size >= self.min_cu_size
      || self.max_tu_size < self.min_tu_size
      || self.max_tu_size > 32.min(self.lcu_size)
    {
      return Err(InvalidTuSizes {
        min: self.min_tu_size,
        max: self.max_tu_size,
      });
    }
    for depth in [self.tu_depth_intra, self.tu_depth_inter] {
      if !(1..=4).contains(&depth) {
        return Err(InvalidTuDepth(depth));
      }
    }
    if !(0..=51).contains(&self.qp) {
      return Err(InvalidQp(self.qp));
    }
    if let Some(lambda) = self.lambda {
      if !lambda.is_finite() || lambda <= 0. {
        return Err(InvalidLambda(lambda));
      }
    }
    if !(1..=5).contains(&self.max_merge_cands) {
      return Err(InvalidMergeCandidates(self.max_merge_cands));
    }
    let [l0, l1] = self.ref_count;
    let refs_ok = match self.slice_type {
      SliceType::I => l0 == 0 && l1 == 0,
      SliceType::P => (1..=16).contains(&l0) && l1 == 0,
      SliceType::B => (1..=16).contains(&l0) && (1..=16).contains(&l1),
    };
    if !refs_ok {
      return Err(InvalidReferenceCount {
        slice_type: self.slice_type,
        l0,
        l1,
      });
    }
    if self.search.search_range > MAX_SEARCH_RANGE {
      return Err(InvalidSearchRange(self.search.search_range));
    }
    if self.pcm
      && (!self.pcm_min_size.is_power_of_two()
        || !self.pcm_max_size.is_power_of_two()
        || self.pcm_min_size < 8
        || self.pcm_max_size < self.pcm_min_size
        || self.pcm_max_size > 32)
    {
      return Err(InvalidPcmSizes {
        min: self.pcm_min_size,
        max: self.pcm_max_size,
      });
    }
    self.validate_slice_segments()
  }

  fn validate_slice_segments(&self) -> Result<(), InvalidConfig> {
    let (cols, rows) = self.lcu_dims();
    let total = cols * rows * self.parts_per_lcu();
    let min_cu_parts = (self.min_cu_size / 4) * (self.min_cu_size / 4);
    if let Some(&first) = self.slice_segments.first() {
      if first != 0 {
        return Err(InvalidConfig::InvalidSliceSegment(first));
      }
    }
    for (&prev, &next) in self.slice_segments.iter().tuple_windows() {
      if next <= prev {
        return Err(InvalidConfig::InvalidSliceSegment(next));
      }
    }
    match self
      .slice_segments
      .iter()
      .find(|&&start| start >= total || start % min_cu_parts != 0)
    {
      Some(&start) => Err(InvalidConfig::InvalidSliceSegment(start)),
      None => Ok(()),
    }
  }
}

impl fmt::Display for EncoderConfig {
  fn fmt(&self, f: &mut fmt::Formatter) -> Result<(), fmt::Error> {
    let pairs = [
      ("size", format!("{}x{}", self.width, self.height)),
      ("bit_depth", self.bit_depth.to_string()),
      ("chroma_sampling", self.chroma_sampling.to_string()),
      ("lcu", self.lcu_size.to_string()),
      ("min_cu", self.min_cu_size.to_string()),
      ("tu", format!("{}..{}", self.min_tu_size, self.max_tu_size)),
      (
        "tu_depth",
        format!("{}/{}", self.tu_depth_intra, self.tu_depth_inter),
      ),
      ("qp", self.qp.to_string()),
      ("slice_type", self.slice_type.to_string()),
      ("refs", format!("{}/{}", self.ref_count[0], self.ref_count[1])),
      ("merge_cands", self.max_merge_cands.to_string()),
      ("tmvp", self.temporal_mvp.to_string()),
      ("delta_qp", self.delta_qp.to_string()),
      ("pcm", self.pcm.to_string()),
      ("lossless", self.lossless.to_string()),
      ("sao", format!("{}/{}", self.sao_luma, self.sao_chroma)),
      ("slice_segments", self.slice_segments.len().max(1).to_string()),
    ];
    write!(
      f,
      "{} {}",
      pairs.iter().map(|pair| format!("{}={}", pair.0, pair.1)).join(" "),
      self.search
    )
  }
}

#[cfg(test)]
mod test {
  use super::*;

  #[test]
  fn default_config_is_valid() {
    assert_eq!(EncoderConfig::default().validate(), Ok(()));
    for speed in 0..=10 {
      assert_eq!(EncoderConfig::with_speed_preset(speed).validate(), Ok(()));
    }
  }

  #[test]
  fn unaligned_dimensions_are_padded() {
    let cfg = EncoderConfig { width: 100, height: 60, ..Default::default() };
    assert_eq!(cfg.validate(), Ok(()));
    assert_eq!(cfg.coded_size(), (104, 64));
    assert_eq!(cfg.lcu_dims(), (2, 1));
    let cfg = EncoderConfig { width: 416, ..Default::default() };
    assert_eq!(cfg.coded_size(), (416, 240));
    let cfg = EncoderConfig { height: 0, ..Default::default() };
    assert_eq!(cfg.validate(), Err(InvalidConfig::InvalidHeight(0)));
    let cfg =
      EncoderConfig { width: MAX_PICTURE_SIZE + 1, ..Default::default() };
    assert_eq!(
      cfg.validate(),
      Err(InvalidConfig::InvalidWidth(MAX_PICTURE_SIZE + 1))
    );
  }

  #[test]
  fn rejects_monochrome_and_bad_block_sizes() {
    let cfg = EncoderConfig {
      chroma_sampling: ChromaSampling::Cs400,
      ..Default::default()
    };
    assert_eq!(
      cfg.validate(),
      Err(InvalidConfig::UnsupportedChromaSampling(ChromaSampling::Cs400))
    );
    let cfg = EncoderConfig { lcu_size: 128, ..Default::default() };
    assert_eq!(cfg.validate(), Err(InvalidConfig::InvalidLcuSize(128)));
    let cfg = EncoderConfig { min_tu_size: 8, ..Default::default() };
    assert_eq!(
      cfg.validate(),
      Err(InvalidConfig::InvalidTuSizes { min: 8, max: 32 })
    );
  }

  #[test]
  fn reference_counts_follow_slice_type() {
    let cfg = EncoderConfig {
      slice_type: SliceType::P,
      ref_count: [0, 0],
      ..Default::default()
    };
    assert_eq!(
      cfg.validate(),
      Err(InvalidConfig::InvalidReferenceCount {
        slice_type: SliceType::P,
        l0: 0,
        l1: 0
      })
    );
    let cfg = EncoderConfig {
      slice_type: SliceType::B,
      ref_count: [1, 1],
      ..Default::default()
    };
    assert_eq!(cfg.validate(), Ok(()));
  }

  #[test]
  fn slice_segments_must_be_aligned_and_increasing() {
    let mut cfg = EncoderConfig::default();
    cfg.slice_segments = vec![0, 256, 260];
    assert_eq!(cfg.validate(), Ok(()));
    cfg.slice_segments = vec![0, 258];
    assert_eq!(cfg.validate(), Err(InvalidConfig::InvalidSliceSegment(258)));
    cfg.slice_segments = vec![4, 256];
    assert_eq!(cfg.validate(), Err(InvalidConfig::InvalidSliceSegment(4)));
    cfg.slice_segments = vec![0, 512, 256];
    assert_eq!(cfg.validate(), Err(InvalidConfig::InvalidSliceSegment(256)));
  }
}
