// Copyright (c) 2024, The cuquad contributors. All rights reserved
//
// This source code is subject to the terms of the BSD 2 Clause License and
// the Alliance for Open Media Patent License 1.0. If the BSD 2 Clause License
// was not distributed with this source code in the LICENSE file, you can
// obtain it at www.aomedia.org/license/software. If the Alliance for Open
// Media Patent License 1.0 was not distributed with this source code in the
// PATENTS file, you can obtain it at www.aomedia.org/license/patent.

//! Picture level driver: CU decisions, SAO and slice segment data.

use std::io;
use std::sync::Arc;

use thiserror::Error;

use crate::api::*;
use crate::context::*;
use crate::cu::*;
use crate::ec::*;
use crate::frame::*;
use crate::partition::*;
use crate::rdo::RdCost;
use crate::sao::*;
use crate::stats::*;
use crate::util::*;

mod entropy;
mod inter;
mod intra;
mod merge;
mod residual;
mod search;
mod tu;

pub use entropy::*;
pub use merge::{MergeCandidates, MergeOutcome, MRG_MAX_NUM_CANDS};
pub use search::*;
pub use tu::*;

/// Values derived from a validated [`EncoderConfig`], fixed for a picture.
#[derive(Debug, Clone)]
pub struct FrameInvariants {
  pub config: EncoderConfig,
  /// Coded picture size, a whole number of minimum CUs.
  pub width: usize,
  pub height: usize,
  /// Conformance window, the top-left part of the coded picture holding
  /// the input samples.
  pub display_width: usize,
  pub display_height: usize,
  pub bit_depth: usize,
  pub chroma_sampling: ChromaSampling,
  pub xdec: usize,
  pub ydec: usize,
  pub lcu_log2: usize,
  pub min_cu_log2: usize,
  /// Deepest quadtree depth, reached by minimum size CUs.
  pub max_depth: usize,
  pub min_tu_log2: usize,
  pub max_tu_log2: usize,
  /// Transform hierarchy depths, 1 meaning no split beyond the implicit
  /// ones.
  pub tu_depth_intra: usize,
  pub tu_depth_inter: usize,
  pub slice_type: SliceType,
  pub qp: i32,
  pub rd: RdCost,
  pub lcu_cols: usize,
  pub lcu_rows: usize,
  /// Slice segment start addresses in partitions, the first being 0.
  pub slice_starts: Vec<usize>,
  pub num_refs: [usize; 2],
  pub poc: i32,
  pub search: SearchSettings,
}

impl FrameInvariants {
  /// # Errors
  ///
  /// Returns the first [`InvalidConfig`] found in `config`.
  pub fn new(config: EncoderConfig, poc: i32) -> Result<Self, InvalidConfig> {
    config.validate()?;
    let (xdec, ydec) = config.chroma_sampling.decimation();
    let lcu_log2 = config.lcu_size.trailing_zeros() as usize;
    let min_cu_log2 = config.min_cu_size.trailing_zeros() as usize;
    let (lcu_cols, lcu_rows) = config.lcu_dims();
    let (width, height) = config.coded_size();
    let lambda = config.lambda.unwrap_or_else(|| {
      RdCost::lambda_for(config.qp, config.slice_type, config.bit_depth)
    });
    let slice_starts = if config.slice_segments.is_empty() {
      vec![0]
    } else {
      config.slice_segments.clone()
    };
    Ok(FrameInvariants {
      width,
      height,
      display_width: config.width,
      display_height: config.height,
      bit_depth: config.bit_depth,
      chroma_sampling: config.chroma_sampling,
      xdec,
      ydec,
      lcu_log2,
      min_cu_log2,
      max_depth: lcu_log2 - min_cu_log2,
      min_tu_log2: config.min_tu_size.trailing_zeros() as usize,
      max_tu_log2: config.max_tu_size.trailing_zeros() as usize,
      tu_depth_intra: config.tu_depth_intra,
      tu_depth_inter: config.tu_depth_inter,
      slice_type: config.slice_type,
      qp: config.qp,
      rd: RdCost::new(lambda),
      lcu_cols,
      lcu_rows,
      slice_starts,
      num_refs: config.ref_count,
      poc,
      search: config.search,
      config,
    })
  }

  #[inline]
  pub const fn parts_per_lcu(&self) -> usize {
    1 << (2 * (self.lcu_log2 - PART_LOG2))
  }

  #[inline]
  pub fn num_lcus(&self) -> usize {
    self.lcu_cols * self.lcu_rows
  }

  #[inline]
  pub fn is_444(&self) -> bool {
    self.chroma_sampling == ChromaSampling::Cs444
  }

  #[inline]
  pub fn is_422(&self) -> bool {
    self.chroma_sampling == ChromaSampling::Cs422
  }

  /// Index of the slice segment holding partition address `key`.
  pub fn segment_of(&self, key: usize) -> usize {
    self.slice_starts.partition_point(|&s| s <= key) - 1
  }

  /// Partition address range of slice segment `idx`.
  pub fn segment_range(&self, idx: usize) -> std::ops::Range<usize> {
    let end = self
      .slice_starts
      .get(idx + 1)
      .copied()
      .unwrap_or(self.num_lcus() * self.parts_per_lcu());
    self.slice_starts[idx]..end
  }

  pub fn sao_enabled(&self) -> bool {
    self.config.sao_luma || self.config.sao_chroma
  }
}

/// A reconstructed picture usable for prediction.
#[derive(Debug, Clone)]
pub struct ReferenceFrame<T: Pixel> {
  pub frame: Frame<T>,
  pub poc: i32,
  /// Committed motion, kept for temporal motion vector prediction.
  pub motion: Option<MotionField>,
}

/// Mutable state of the picture being coded.
#[derive(Debug, Clone)]
pub struct FrameState<T: Pixel> {
  pub input: Frame<T>,
  pub rec: Frame<T>,
  pub refs: [Vec<Arc<ReferenceFrame<T>>>; 2],
  pub store: CuStore,
}

impl<T: Pixel> FrameState<T> {
  /// `input` has the configured size and is padded to the coded size.
  /// References are reconstructions, already at the coded size.
  ///
  /// # Errors
  ///
  /// Fails when `input` does not match the configured geometry or when
  /// fewer reference pictures than the active counts are supplied.
  pub fn new(
    fi: &FrameInvariants, input: Frame<T>,
    refs: [Vec<Arc<ReferenceFrame<T>>>; 2],
  ) -> Result<Self, InvalidConfig> {
    if input.width() != fi.display_width
      || input.height() != fi.display_height
      || input.chroma_sampling != fi.chroma_sampling
      || fi.bit_depth > T::max_bit_depth()
    {
      return Err(InvalidConfig::FrameMismatch);
    }
    for (list, refs) in refs.iter().enumerate() {
      if refs.len() < fi.num_refs[list] {
        return Err(InvalidConfig::MissingReferences {
          list,
          needed: fi.num_refs[list],
          have: refs.len(),
        });
      }
      if refs.iter().any(|r| {
        r.frame.width() != fi.width || r.frame.height() != fi.height
      }) {
        return Err(InvalidConfig::FrameMismatch);
      }
    }
    let input = if (fi.width, fi.height) == (input.width(), input.height()) {
      input
    } else {
      input.padded(fi.width, fi.height)
    };
    let rec = Frame::new(fi.width, fi.height, fi.chroma_sampling);
    let store = CuStore::new(
      fi.width,
      fi.height,
      fi.lcu_log2,
      fi.chroma_sampling,
      fi.slice_starts.clone(),
    );
    Ok(FrameState { input, rec, refs, store })
  }

  /// Picture order counts of the active references of each list.
  pub fn ref_pocs(&self, fi: &FrameInvariants) -> [Vec<i32>; 2] {
    [0, 1].map(|l| {
      self.refs[l][..fi.num_refs[l]].iter().map(|r| r.poc).collect()
    })
  }
}

#[derive(Debug, Error)]
pub enum EncoderError {
  #[error("invalid configuration: {0}")]
  Config(#[from] InvalidConfig),
  #[error("bitstream write failed: {0}")]
  Io(#[from] io::Error),
}

/// Coded data of one slice segment.
#[derive(Debug, Clone)]
pub struct EncodedSegment {
  /// Partition address of the first CU.
  pub start: usize,
  /// Every bin in coding order, with the context state it was coded with.
  pub bins: Vec<Bin>,
  /// Arithmetic coded `slice_segment_data()`.
  pub data: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct EncodedPicture<T: Pixel> {
  pub poc: i32,
  pub segments: Vec<EncodedSegment>,
  /// Reconstruction after SAO, at the coded size.
  pub rec: Frame<T>,
  pub cu: CuStore,
  pub sao: Vec<SaoLcuParams>,
  pub motion: MotionField,
  pub stats: EncoderStats,
}

impl<T: Pixel> EncodedPicture<T> {
  pub fn into_reference(self) -> ReferenceFrame<T> {
    ReferenceFrame {
      frame: self.rec,
      poc: self.poc,
      motion: Some(self.motion),
    }
  }
}

/// Chooses the SAO parameters of every LCU of the reconstruction.
fn estimate_sao<T: Pixel>(
  fi: &FrameInvariants, fs: &FrameState<T>,
) -> Vec<SaoLcuParams> {
  let est = SaoEstimator {
    bit_depth: fi.bit_depth,
    lambda: fi.rd.lambda,
    luma: fi.config.sao_luma,
    chroma: fi.config.sao_chroma,
  };
  let lcu_size = 1 << fi.lcu_log2;
  let mut params: Vec<SaoLcuParams> = Vec::with_capacity(fi.num_lcus());
  for addr in 0..fi.num_lcus() {
    let (x, y) = fs.store.lcu_origin(addr);
    let mut p = est.estimate(&fs.input, &fs.rec, x, y, lcu_size);
    let (left, up) = sao_merge_candidates(fi, addr);
    decide_merge(
      &mut p,
      left.map(|a| &params[a]),
      up.map(|a| &params[a]),
    );
    params.push(p);
  }
  params
}

/// LCUs whose SAO parameters the LCU `addr` may merge with: the left and
/// upper ones starting in the same slice segment.
pub fn sao_merge_candidates(
  fi: &FrameInvariants, addr: usize,
) -> (Option<usize>, Option<usize>) {
  let ppl = fi.parts_per_lcu();
  let seg = fi.segment_of(addr * ppl);
  let same = |a: usize| fi.segment_of(a * ppl) == seg;
  let (rx, ry) = (addr % fi.lcu_cols, addr / fi.lcu_cols);
  let left = (rx > 0).then(|| addr - 1).filter(|&a| same(a));
  let up = (ry > 0).then(|| addr - fi.lcu_cols).filter(|&a| same(a));
  (left, up)
}

/// Serializes slice segment `idx`.
fn write_segment<T: Pixel>(
  fi: &FrameInvariants, store: &CuStore, sao: &[SaoLcuParams], idx: usize,
) -> io::Result<EncodedSegment> {
  let range = fi.segment_range(idx);
  let ppl = fi.parts_per_lcu();
  let first_lcu = range.start / ppl;
  let last_lcu = (range.end - 1) / ppl;
  let mut cw = ContextWriter::new(CabacContexts::new(fi.slice_type, fi.qp));
  let mut w = WriterRecorder::new();
  for addr in first_lcu..=last_lcu {
    encode_lcu(fi, &mut cw, &mut w, store, sao, addr, range.clone());
    cw.write_end_of_slice_segment_flag(&mut w, addr == last_lcu);
  }
  let mut packed = WriterEncoder::new();
  w.replay_into(&mut packed);
  log::debug!(
    "slice segment {} ({} LCUs): {} bins, {} bits estimated",
    idx,
    last_lcu + 1 - first_lcu,
    w.recorded().bins().len(),
    w.tell()
  );
  Ok(EncodedSegment {
    start: range.start,
    bins: w.recorded().bins().to_vec(),
    data: packed.done()?,
  })
}

/// Codes a picture whose state has been set up: decides every LCU, filters
/// the reconstruction and writes each slice segment.
///
/// # Errors
///
/// Returns an error when the bitstream cannot be written.
pub fn encode_frame<T: Pixel>(
  fi: &FrameInvariants, mut fs: FrameState<T>, sink: &mut dyn DiagnosticsSink,
) -> Result<EncodedPicture<T>, EncoderError> {
  let mut stats = EncoderStats::default();
  {
    let mut search = CuSearch::new(fi, &mut stats, sink);
    for addr in 0..fi.num_lcus() {
      search.compress_lcu(&mut fs, addr);
    }
  }

  let sao = if fi.sao_enabled() {
    estimate_sao(fi, &fs)
  } else {
    vec![SaoLcuParams::default(); fi.num_lcus()]
  };

  let segments = (0..fi.slice_starts.len())
    .map(|idx| write_segment::<T>(fi, &fs.store, &sao, idx))
    .collect::<io::Result<Vec<_>>>()?;

  let motion = MotionField::from_store(&fs.store, &fs.ref_pocs(fi));
  let rec = if fi.sao_enabled() {
    apply_sao(&fs.rec, &sao, 1 << fi.lcu_log2, fi.bit_depth)
  } else {
    fs.rec
  };

  Ok(EncodedPicture {
    poc: fi.poc,
    segments,
    rec,
    cu: fs.store,
    sao,
    motion,
    stats,
  })
}

/// Codes `input` as picture `poc` predicting from `refs`.
///
/// # Errors
///
/// Fails on an invalid configuration, a picture or reference list not
/// matching it, or a bitstream write error.
pub fn encode_picture<T: Pixel>(
  config: &EncoderConfig, input: Frame<T>,
  refs: [Vec<Arc<ReferenceFrame<T>>>; 2], poc: i32,
) -> Result<EncodedPicture<T>, EncoderError> {
  let fi = FrameInvariants::new(config.clone(), poc)?;
  let fs = FrameState::new(&fi, input, refs)?;
  encode_frame(&fi, fs, &mut NullSink)
}
