// Copyright (c) 2024, The cuquad contributors. All rights reserved
//
// This source code is subject to the terms of the BSD 2 Clause License and
// the Alliance for Open Media Patent License 1.0. If the BSD 2 Clause License
// was not distributed with this source code in the LICENSE file, you can
// obtain it at www.aomedia.org/license/software. If the Alliance for Open
// Media Patent License 1.0 was not distributed with this source code in the
// PATENTS file, you can obtain it at www.aomedia.org/license/patent.

//! Transform tree layout: implicit splits, leaf depth and coded block flag
//! bookkeeping.

use crate::cu::PartInfo;
use crate::encoder::FrameInvariants;
use crate::partition::*;

/// How a transform node is divided into sections.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TuSplit {
  None = 0,
  /// The two square chroma halves of a 4:2:2 block, top then bottom.
  VerticalChroma422 = 1,
  Quad = 2,
}

/// Walks the sections of a transform node.
#[derive(Clone, Copy, Debug)]
pub struct TuCursor {
  pub section: usize,
  /// Relative partition index of the current section.
  pub abs_part: usize,
  split: TuSplit,
  pub part_step: usize,
}

impl TuCursor {
  /// Cursor over a node of `num_parts` partitions starting at `abs_part`.
  pub fn new(split: TuSplit, abs_part: usize, num_parts: usize) -> Self {
    TuCursor {
      section: 0,
      abs_part,
      split,
      part_step: num_parts >> split as usize,
    }
  }

  #[inline]
  pub const fn num_sections(&self) -> usize {
    1 << self.split as usize
  }

  /// Moves to the next section, returns false past the last one.
  pub fn next_section(&mut self) -> bool {
    self.section += 1;
    self.abs_part += self.part_step;
    self.section < self.num_sections()
  }
}

/// Largest transform hierarchy depth reachable in the CU, as the log2
/// size of its smallest allowed transform.
pub fn quadtree_min_log2(
  fi: &FrameInvariants, log2_cu: usize, pred_mode: PredMode,
  part_size: PartSize,
) -> usize {
  let intra = pred_mode == PredMode::Intra;
  let max_depth = if intra { fi.tu_depth_intra } else { fi.tu_depth_inter };
  let intra_split = (intra && part_size == PartSize::SizeNxN) as usize;
  let inter_split = (max_depth == 1
    && !intra
    && part_size != PartSize::Size2Nx2N) as usize;
  let extra = max_depth - 1 + intra_split + inter_split;
  let log2 = if log2_cu < fi.min_tu_log2 + extra {
    fi.min_tu_log2
  } else {
    log2_cu - extra
  };
  log2.min(fi.max_tu_log2)
}

/// Whether the inter CU must split its root transform node.
pub fn inter_split(
  fi: &FrameInvariants, log2: usize, tr_depth: usize, pred_mode: PredMode,
  part_size: PartSize,
) -> bool {
  fi.tu_depth_inter == 1
    && pred_mode == PredMode::Inter
    && part_size != PartSize::Size2Nx2N
    && tr_depth == 0
    && log2 > fi.min_tu_log2
}

/// Whether the node is split without a coded flag.
pub fn implicit_split(
  fi: &FrameInvariants, log2: usize, tr_depth: usize, pred_mode: PredMode,
  part_size: PartSize,
) -> bool {
  log2 > fi.max_tu_log2
    || (pred_mode == PredMode::Intra
      && part_size == PartSize::SizeNxN
      && tr_depth == 0)
    || inter_split(fi, log2, tr_depth, pred_mode, part_size)
}

/// Whether `transform_split_flag` is coded at the node.
pub fn subdiv_flag_coded(
  fi: &FrameInvariants, log2_cu: usize, log2: usize, tr_depth: usize,
  pred_mode: PredMode, part_size: PartSize,
) -> bool {
  !implicit_split(fi, log2, tr_depth, pred_mode, part_size)
    && log2 > fi.min_tu_log2
    && log2 > quadtree_min_log2(fi, log2_cu, pred_mode, part_size)
}

/// Shallowest legal leaf depth of a CU: every implicit split taken, no
/// optional one.
pub fn min_tr_idx(
  fi: &FrameInvariants, log2_cu: usize, pred_mode: PredMode,
  part_size: PartSize,
) -> usize {
  let mut tr_idx = log2_cu.saturating_sub(fi.max_tu_log2);
  while implicit_split(fi, log2_cu - tr_idx, tr_idx, pred_mode, part_size) {
    tr_idx += 1;
  }
  tr_idx
}

/// Luma leaves of a uniform tree of depth `tr_idx`: relative partition
/// index and log2 size, in coding order.
pub fn luma_leaves(
  log2_cu: usize, tr_idx: usize,
) -> impl Iterator<Item = (usize, usize)> {
  let log2 = log2_cu - tr_idx;
  let step = 1 << (2 * (log2 - PART_LOG2));
  (0..1 << (2 * tr_idx)).map(move |i| (i * step, log2))
}

/// A chroma transform node: its luma footprint and chroma block size.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChromaTu {
  pub rel: usize,
  pub num_parts: usize,
  pub log2c: usize,
  pub tr_depth: usize,
  // 2 square blocks per component for 4:2:2
  pub split: TuSplit,
}

impl ChromaTu {
  pub fn cursor(&self) -> TuCursor {
    TuCursor::new(self.split, self.rel, self.num_parts)
  }
}

/// Chroma nodes of a uniform tree of depth `tr_idx`. Four 4x4 luma leaves
/// share the chroma of their 8x8 parent unless the format is 4:4:4.
pub fn chroma_tus(
  fi: &FrameInvariants, log2_cu: usize, tr_idx: usize,
) -> impl Iterator<Item = ChromaTu> {
  let leaf_log2 = log2_cu - tr_idx;
  let (log2, tr_depth, log2c) = if fi.is_444() {
    (leaf_log2, tr_idx, leaf_log2)
  } else if leaf_log2 > 2 {
    (leaf_log2, tr_idx, leaf_log2 - 1)
  } else {
    (3, tr_idx - 1, 2)
  };
  let split =
    if fi.is_422() { TuSplit::VerticalChroma422 } else { TuSplit::None };
  let num_parts = 1 << (2 * (log2 - PART_LOG2));
  (0..1 << (2 * tr_depth)).map(move |i| ChromaTu {
    rel: i * num_parts,
    num_parts,
    log2c,
    tr_depth,
    split,
  })
}

pub fn set_cbf(
  parts: &mut [PartInfo], comp: usize, tr_depth: usize, cbf: bool,
) {
  for p in parts {
    if cbf {
      p.cbf[comp] |= 1 << tr_depth;
    } else {
      p.cbf[comp] &= !(1 << tr_depth);
    }
  }
}

/// Derives the flags of the depths above `leaf_depth` from the leaves: a
/// node flag is set when any of its children's is.
pub fn propagate_cbf(parts: &mut [PartInfo], comp: usize, leaf_depth: usize) {
  let n = parts.len();
  for d in (0..leaf_depth).rev() {
    let chunk = (n >> (2 * d)).max(1);
    for node in parts.chunks_mut(chunk) {
      let any = node.iter().any(|p| p.cbf_at(comp, d + 1));
      set_cbf(node, comp, d, any);
    }
  }
}
