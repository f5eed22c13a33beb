// Copyright (c) 2024, The cuquad contributors. All rights reserved
//
// This source code is subject to the terms of the BSD 2 Clause License and
// the Alliance for Open Media Patent License 1.0. If the BSD 2 Clause License
// was not distributed with this source code in the LICENSE file, you can
// obtain it at www.aomedia.org/license/software. If the Alliance for Open
// Media Patent License 1.0 was not distributed with this source code in the
// PATENTS file, you can obtain it at www.aomedia.org/license/patent.

use super::*;

/// Number of most probable modes of a luma intra direction.
pub const NUM_MOST_PROBABLE_MODES: usize = 3;

/// Bits of `rem_intra_luma_pred_mode`.
const REM_INTRA_MODE_BITS: u32 = 5;

/// Inter direction bitmask values.
pub const INTER_DIR_L0: u8 = 1;
pub const INTER_DIR_L1: u8 = 2;
pub const INTER_DIR_BI: u8 = 3;

impl ContextWriter {
  pub fn write_split_flag<W: Writer>(
    &mut self, w: &mut W, ctx: usize, split: bool,
  ) {
    w.encode_bin(split, &mut self.fc.split_flag[ctx]);
  }

  pub fn write_skip_flag<W: Writer>(
    &mut self, w: &mut W, ctx: usize, skip: bool,
  ) {
    w.encode_bin(skip, &mut self.fc.skip_flag[ctx]);
  }

  pub fn write_cu_transquant_bypass_flag<W: Writer>(
    &mut self, w: &mut W, bypass: bool,
  ) {
    w.encode_bin(bypass, &mut self.fc.transquant_bypass[0]);
  }

  pub fn write_merge_flag<W: Writer>(&mut self, w: &mut W, merge: bool) {
    w.encode_bin(merge, &mut self.fc.merge_flag[0]);
  }

  pub fn write_merge_index<W: Writer>(
    &mut self, w: &mut W, idx: usize, max_cands: usize,
  ) {
    debug_assert!(idx < max_cands);
    Self::write_unary_max_first_ctx(
      w,
      &mut self.fc.merge_idx[0],
      idx,
      max_cands - 1,
    );
  }

  pub fn write_pred_mode<W: Writer>(&mut self, w: &mut W, mode: PredMode) {
    debug_assert!(mode != PredMode::None);
    w.encode_bin(mode == PredMode::Intra, &mut self.fc.pred_mode[0]);
  }

  /// `part_mode`; `min_cu` is set when the CU has the minimum CU size.
  pub fn write_part_size<W: Writer>(
    &mut self, w: &mut W, part_size: PartSize, pred_mode: PredMode,
    log2_size: usize, min_cu: bool,
  ) {
    let ctx = &mut self.fc.part_size;
    if pred_mode == PredMode::Intra {
      if min_cu {
        w.encode_bin(part_size == PartSize::Size2Nx2N, &mut ctx[0]);
      }
      return;
    }
    match part_size {
      PartSize::Size2Nx2N => w.encode_bin(true, &mut ctx[0]),
      PartSize::Size2NxN => {
        w.encode_bin(false, &mut ctx[0]);
        w.encode_bin(true, &mut ctx[1]);
      }
      PartSize::SizeNx2N => {
        w.encode_bin(false, &mut ctx[0]);
        w.encode_bin(false, &mut ctx[1]);
        if min_cu && log2_size > 3 {
          w.encode_bin(true, &mut ctx[2]);
        }
      }
      PartSize::SizeNxN => {
        debug_assert!(min_cu && log2_size > 3);
        w.encode_bin(false, &mut ctx[0]);
        w.encode_bin(false, &mut ctx[1]);
        w.encode_bin(false, &mut ctx[2]);
      }
      PartSize::None => panic!("partition size not decided"),
    }
  }

  /// Luma directions of every PU of an intra CU: all the
  /// `prev_intra_luma_pred_flag`s first, then each index or remainder.
  pub fn write_intra_dir_luma<W: Writer>(
    &mut self, w: &mut W, dirs: &[(u8, [u8; NUM_MOST_PROBABLE_MODES])],
  ) {
    let mpm_idx = |&(dir, preds): &(u8, [u8; 3])| {
      preds.iter().position(|&p| p == dir)
    };
    for d in dirs {
      w.encode_bin(mpm_idx(d).is_some(), &mut self.fc.intra_pred[0]);
    }
    for d in dirs {
      match mpm_idx(d) {
        Some(idx) => {
          w.encode_bin_ep(idx > 0);
          if idx > 0 {
            w.encode_bin_ep(idx > 1);
          }
        }
        None => {
          let (mut dir, mut preds) = *d;
          preds.sort_unstable();
          for &p in preds.iter().rev() {
            if dir > p {
              dir -= 1;
            }
          }
          w.encode_bins_ep(dir as u32, REM_INTRA_MODE_BITS);
        }
      }
    }
  }

  /// `intra_chroma_pred_mode` as a candidate index, [`DM_CHROMA_IDX`]
  /// meaning the luma direction.
  pub fn write_intra_dir_chroma<W: Writer>(&mut self, w: &mut W, idx: u8) {
    if idx == DM_CHROMA_IDX {
      w.encode_bin(false, &mut self.fc.chroma_pred[0]);
    } else {
      w.encode_bin(true, &mut self.fc.chroma_pred[0]);
      w.encode_bins_ep(idx as u32, 2);
    }
  }

  /// `inter_pred_idc`; bi-prediction is not allowed for 8x4 and 4x8 PUs.
  pub fn write_inter_dir<W: Writer>(
    &mut self, w: &mut W, inter_dir: u8, depth: usize, allow_bi: bool,
  ) {
    debug_assert!(allow_bi || inter_dir != INTER_DIR_BI);
    let ctx = &mut self.fc.inter_dir;
    if allow_bi {
      w.encode_bin(inter_dir == INTER_DIR_BI, &mut ctx[depth]);
    }
    if inter_dir != INTER_DIR_BI {
      w.encode_bin(inter_dir == INTER_DIR_L1, &mut ctx[4]);
    }
  }

  pub fn write_ref_frame_idx<W: Writer>(
    &mut self, w: &mut W, ref_idx: usize, num_refs: usize,
  ) {
    if num_refs <= 1 {
      return;
    }
    let ctx = &mut self.fc.ref_pic;
    w.encode_bin(ref_idx > 0, &mut ctx[0]);
    if ref_idx == 0 || num_refs == 2 {
      return;
    }
    w.encode_bin(ref_idx > 1, &mut ctx[1]);
    if ref_idx > 1 {
      let max = num_refs - 3;
      let value = ref_idx - 2;
      for i in 0..max.min(value + 1) {
        w.encode_bin_ep(i < value);
      }
    }
  }

  pub fn write_mvd<W: Writer>(&mut self, w: &mut W, mvd: MotionVector) {
    let (hor, ver) = (mvd.col as i32, mvd.row as i32);
    let ctx = &mut self.fc.mvd;
    w.encode_bin(hor != 0, &mut ctx[0]);
    w.encode_bin(ver != 0, &mut ctx[0]);
    if hor != 0 {
      w.encode_bin(hor.abs() > 1, &mut ctx[1]);
    }
    if ver != 0 {
      w.encode_bin(ver.abs() > 1, &mut ctx[1]);
    }
    for v in [hor, ver] {
      if v != 0 {
        if v.abs() > 1 {
          Self::write_ep_ex_golomb(w, (v.abs() - 2) as u32, 1);
        }
        w.encode_bin_ep(v < 0);
      }
    }
  }

  pub fn write_mvp_idx<W: Writer>(
    &mut self, w: &mut W, idx: usize, num_cands: usize,
  ) {
    Self::write_unary_max_first_ctx(
      w,
      &mut self.fc.mvp_idx[0],
      idx,
      num_cands - 1,
    );
  }

  pub fn write_qt_root_cbf<W: Writer>(&mut self, w: &mut W, cbf: bool) {
    w.encode_bin(cbf, &mut self.fc.qt_root_cbf[0]);
  }

  pub fn write_transform_subdiv_flag<W: Writer>(
    &mut self, w: &mut W, subdiv: bool, log2_size: usize,
  ) {
    w.encode_bin(subdiv, &mut self.fc.trans_subdiv[5 - log2_size]);
  }

  pub fn write_qt_cbf<W: Writer>(
    &mut self, w: &mut W, luma: bool, tr_depth: usize, cbf: bool,
  ) {
    let ctx = if luma {
      (tr_depth == 0) as usize
    } else {
      NUM_QT_CBF_CTX_PER_SET + tr_depth
    };
    w.encode_bin(cbf, &mut self.fc.qt_cbf[ctx]);
  }

  /// `cu_qp_delta_abs` and its sign.
  pub fn write_delta_qp<W: Writer>(&mut self, w: &mut W, dqp: i32) {
    const PREFIX_MAX: u32 = 5;
    let abs = dqp.unsigned_abs();
    let prefix = abs.min(PREFIX_MAX);
    let ctx = &mut self.fc.delta_qp;
    w.encode_bin(prefix > 0, &mut ctx[0]);
    for i in 1..PREFIX_MAX.min(prefix + 1) {
      w.encode_bin(i < prefix, &mut ctx[1]);
    }
    if abs >= PREFIX_MAX {
      Self::write_ep_ex_golomb(w, abs - PREFIX_MAX, 0);
    }
    if abs > 0 {
      w.encode_bin_ep(dqp < 0);
    }
  }

  /// `pcm_flag`, only ever coded as 0.
  pub fn write_ipcm_info<W: Writer>(&mut self, w: &mut W, pcm: bool) {
    debug_assert!(!pcm);
    w.encode_bin_trm(pcm);
  }

  pub fn write_end_of_slice_segment_flag<W: Writer>(
    &mut self, w: &mut W, last: bool,
  ) {
    w.encode_bin_trm(last);
  }
}

#[cfg(test)]
mod test {
  use super::*;
  use crate::ec::{Bin, WriterRecorder};
  use pretty_assertions::assert_eq;

  fn cw() -> ContextWriter {
    ContextWriter::new(CabacContexts::new(SliceType::B, 27))
  }

  fn bins(f: impl FnOnce(&mut ContextWriter, &mut WriterBase)) -> Vec<Bin> {
    let mut w = WriterRecorder::new();
    f(&mut cw(), &mut w);
    w.recorded().bins().to_vec()
  }

  type WriterBase = crate::ec::WriterBase<crate::ec::WriterRecorder>;

  fn values(bins: &[Bin]) -> Vec<u32> {
    bins
      .iter()
      .map(|b| match *b {
        Bin::Regular { bin, .. } => bin as u32,
        Bin::Bypass { value, .. } => value,
        Bin::Terminate(bin) => bin as u32,
      })
      .collect()
  }

  #[test]
  fn rem_intra_mode_skips_predictors() {
    // 20 lies above the predictors 0, 1 and 10
    let b = bins(|cw, w| cw.write_intra_dir_luma(w, &[(20, [10, 0, 1])]));
    assert_eq!(values(&b), vec![0, 17]);
    let b = bins(|cw, w| cw.write_intra_dir_luma(w, &[(1, [10, 0, 1])]));
    assert_eq!(values(&b), vec![1, 1, 1]);
  }

  #[test]
  fn prev_flags_come_first() {
    let dirs = [(26, [26, 0, 1]), (5, [0, 1, 26]), (0, [0, 1, 26])];
    let b = bins(|cw, w| cw.write_intra_dir_luma(w, &dirs));
    assert_eq!(values(&b), vec![1, 0, 1, 0, 3, 0]);
  }

  #[test]
  fn part_size_binarization() {
    let b = bins(|cw, w| {
      cw.write_part_size(w, PartSize::SizeNx2N, PredMode::Inter, 3, true)
    });
    assert_eq!(values(&b), vec![0, 0]);
    let b = bins(|cw, w| {
      cw.write_part_size(w, PartSize::SizeNx2N, PredMode::Inter, 4, true)
    });
    assert_eq!(values(&b), vec![0, 0, 1]);
    let b = bins(|cw, w| {
      cw.write_part_size(w, PartSize::Size2Nx2N, PredMode::Intra, 4, false)
    });
    assert!(b.is_empty());
  }

  #[test]
  fn mvd_binarization() {
    let b = bins(|cw, w| cw.write_mvd(w, MotionVector::new(0, -1)));
    // greater0 x, greater0 y, greater1 x, sign x
    assert_eq!(values(&b), vec![1, 0, 0, 1]);
    let b = bins(|cw, w| cw.write_mvd(w, MotionVector::ZERO));
    assert_eq!(values(&b), vec![0, 0]);
  }

  #[test]
  fn inter_dir_and_ref_idx() {
    let b = bins(|cw, w| cw.write_inter_dir(w, INTER_DIR_L1, 1, true));
    assert_eq!(values(&b), vec![0, 1]);
    let b = bins(|cw, w| cw.write_inter_dir(w, INTER_DIR_L0, 1, false));
    assert_eq!(values(&b), vec![0]);
    let b = bins(|cw, w| cw.write_ref_frame_idx(w, 3, 4));
    assert_eq!(values(&b), vec![1, 1, 1]);
    let b = bins(|cw, w| cw.write_ref_frame_idx(w, 0, 1));
    assert!(b.is_empty());
  }

  #[test]
  fn delta_qp_zero_is_one_bin() {
    let b = bins(|cw, w| cw.write_delta_qp(w, 0));
    assert_eq!(values(&b), vec![0]);
    let b = bins(|cw, w| cw.write_delta_qp(w, -2));
    assert_eq!(values(&b), vec![1, 1, 0, 1]);
  }
}
