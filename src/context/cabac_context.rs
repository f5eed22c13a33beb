// Copyright (c) 2024, The cuquad contributors. All rights reserved
//
// This source code is subject to the terms of the BSD 2 Clause License and
// the Alliance for Open Media Patent License 1.0. If the BSD 2 Clause License
// was not distributed with this source code in the LICENSE file, you can
// obtain it at www.aomedia.org/license/software. If the Alliance for Open
// Media Patent License 1.0 was not distributed with this source code in the
// PATENTS file, you can obtain it at www.aomedia.org/license/patent.

use super::*;

const CNU: u8 = ContextModel::CNU;

pub const NUM_SPLIT_FLAG_CTX: usize = 3;
pub const NUM_SKIP_FLAG_CTX: usize = 3;
pub const NUM_PART_SIZE_CTX: usize = 4;
pub const NUM_CHROMA_PRED_CTX: usize = 2;
pub const NUM_INTER_DIR_CTX: usize = 5;
pub const NUM_MVD_CTX: usize = 2;
pub const NUM_REF_NO_CTX: usize = 2;
pub const NUM_DELTA_QP_CTX: usize = 3;
pub const NUM_QT_CBF_CTX_PER_SET: usize = 5;
pub const NUM_QT_CBF_CTX: usize = 2 * NUM_QT_CBF_CTX_PER_SET;
pub const NUM_LAST_FLAG_XY_LUMA: usize = 15;
pub const NUM_LAST_FLAG_XY: usize = 2 * NUM_LAST_FLAG_XY_LUMA;
pub const NUM_SIG_CG_FLAG_CTX: usize = 2;
pub const NUM_SIG_FLAG_CTX_LUMA: usize = 27;
pub const NUM_SIG_FLAG_CTX_CHROMA: usize = 15;
pub const NUM_SIG_FLAG_CTX: usize =
  NUM_SIG_FLAG_CTX_LUMA + NUM_SIG_FLAG_CTX_CHROMA;
pub const NUM_ONE_FLAG_CTX_LUMA: usize = 16;
pub const NUM_ONE_FLAG_CTX: usize = 24;
pub const NUM_ABS_FLAG_CTX_LUMA: usize = 4;
pub const NUM_ABS_FLAG_CTX: usize = 6;
pub const NUM_TRANS_SUBDIV_CTX: usize = 3;

// Initialization values, one row per slice type in B, P, I order.

static SPLIT_FLAG_INIT: [[u8; NUM_SPLIT_FLAG_CTX]; 3] =
  [[107, 139, 126], [107, 139, 126], [139, 141, 157]];
static SKIP_FLAG_INIT: [[u8; NUM_SKIP_FLAG_CTX]; 3] =
  [[197, 185, 201], [197, 185, 201], [CNU, CNU, CNU]];
static MERGE_FLAG_INIT: [[u8; 1]; 3] = [[154], [110], [CNU]];
static MERGE_IDX_INIT: [[u8; 1]; 3] = [[137], [122], [CNU]];
static PART_SIZE_INIT: [[u8; NUM_PART_SIZE_CTX]; 3] =
  [[154, 139, 154, 154], [154, 139, 154, 154], [184, CNU, CNU, CNU]];
static PRED_MODE_INIT: [[u8; 1]; 3] = [[134], [149], [CNU]];
static INTRA_PRED_INIT: [[u8; 1]; 3] = [[183], [154], [184]];
static CHROMA_PRED_INIT: [[u8; NUM_CHROMA_PRED_CTX]; 3] =
  [[152, 139], [152, 139], [63, 139]];
static INTER_DIR_INIT: [[u8; NUM_INTER_DIR_CTX]; 3] = [
  [95, 79, 63, 31, 31],
  [95, 79, 63, 31, 31],
  [CNU, CNU, CNU, CNU, CNU],
];
static MVD_INIT: [[u8; NUM_MVD_CTX]; 3] =
  [[169, 198], [140, 198], [CNU, CNU]];
static REF_PIC_INIT: [[u8; NUM_REF_NO_CTX]; 3] =
  [[153, 153], [153, 153], [CNU, CNU]];
static DELTA_QP_INIT: [[u8; NUM_DELTA_QP_CTX]; 3] =
  [[154, 154, 154], [154, 154, 154], [154, 154, 154]];
static QT_CBF_INIT: [[u8; NUM_QT_CBF_CTX]; 3] = [
  [153, 111, CNU, CNU, CNU, 149, 92, 167, 154, 154],
  [153, 111, CNU, CNU, CNU, 149, 107, 167, 154, 154],
  [111, 141, CNU, CNU, CNU, 94, 138, 182, 154, 154],
];
static QT_ROOT_CBF_INIT: [[u8; 1]; 3] = [[79], [79], [CNU]];
#[rustfmt::skip]
static LAST_INIT: [[u8; NUM_LAST_FLAG_XY]; 3] = [
  [
    125, 110, 124, 110,  95,  94, 125, 111, 111,  79, 125, 126, 111, 111,  79,
    108, 123,  93, CNU, CNU, CNU, CNU, CNU, CNU, CNU, CNU, CNU, CNU, CNU, CNU,
  ],
  [
    125, 110,  94, 110,  95,  79, 125, 111, 110,  78, 110, 111, 111,  95,  94,
    108, 123, 108, CNU, CNU, CNU, CNU, CNU, CNU, CNU, CNU, CNU, CNU, CNU, CNU,
  ],
  [
    110, 110, 124, 125, 140, 153, 125, 127, 140, 109, 111, 143, 127, 111,  79,
    108, 123,  63, CNU, CNU, CNU, CNU, CNU, CNU, CNU, CNU, CNU, CNU, CNU, CNU,
  ],
];
static SIG_CG_INIT: [[u8; 2 * NUM_SIG_CG_FLAG_CTX]; 3] =
  [[121, 140, 61, 154], [121, 140, 61, 154], [91, 171, 134, 141]];
#[rustfmt::skip]
static SIG_FLAG_INIT: [[u8; NUM_SIG_FLAG_CTX]; 3] = [
  [
    170, 154, 139, 153, 139, 123, 123,  63, 124, 166, 183, 140, 136, 153,
    154, 166, 183, 140, 136, 153, 154, 166, 183, 140, 136, 153, 154,
    170, 153, 138, 138, 122, 121, 122, 121, 167, 151, 183, 140, 151, 183,
    140,
  ],
  [
    155, 154, 139, 153, 139, 123, 123,  63, 153, 166, 183, 140, 136, 153,
    154, 166, 183, 140, 136, 153, 154, 166, 183, 140, 136, 153, 154,
    170, 153, 123, 123, 107, 121, 107, 121, 167, 151, 183, 140, 151, 183,
    140,
  ],
  [
    111, 111, 125, 110, 110,  94, 124, 108, 124, 107, 125, 141, 179, 153,
    125, 107, 125, 141, 179, 153, 125, 107, 125, 141, 179, 153, 125,
    140, 139, 182, 182, 152, 136, 152, 136, 153, 136, 139, 111, 136, 139,
    111,
  ],
];
#[rustfmt::skip]
static ONE_FLAG_INIT: [[u8; NUM_ONE_FLAG_CTX]; 3] = [
  [
    154, 196, 167, 167, 154, 152, 167, 182, 182, 134, 149, 136, 153, 121,
    136, 122, 169, 208, 166, 167, 154, 152, 167, 182,
  ],
  [
    154, 196, 196, 167, 154, 152, 167, 182, 182, 134, 149, 136, 153, 121,
    136, 137, 169, 194, 166, 167, 154, 167, 137, 182,
  ],
  [
    140,  92, 137, 138, 140, 152, 138, 139, 153,  74, 149,  92, 139, 107,
    122, 152, 140, 179, 166, 182, 140, 227, 122, 197,
  ],
];
static ABS_FLAG_INIT: [[u8; NUM_ABS_FLAG_CTX]; 3] = [
  [107, 167, 91, 107, 107, 167],
  [107, 167, 91, 122, 107, 167],
  [138, 153, 136, 167, 152, 152],
];
static MVP_IDX_INIT: [[u8; 1]; 3] = [[168], [168], [CNU]];
static SAO_MERGE_INIT: [[u8; 1]; 3] = [[153], [153], [153]];
static SAO_TYPE_INIT: [[u8; 1]; 3] = [[160], [185], [200]];
static TRANS_SUBDIV_INIT: [[u8; NUM_TRANS_SUBDIV_CTX]; 3] =
  [[224, 167, 122], [124, 138, 94], [153, 138, 138]];
static TRANSQUANT_BYPASS_INIT: [[u8; 1]; 3] = [[154], [154], [154]];

fn init_set<const N: usize>(
  table: &[[u8; N]; 3], slice_type: SliceType, qp: i32,
) -> [ContextModel; N] {
  let row = &table[slice_type as usize];
  std::array::from_fn(|i| ContextModel::new(row[i], qp))
}

/// Every context model of the coding unit and SAO syntax.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CabacContexts {
  pub split_flag: [ContextModel; NUM_SPLIT_FLAG_CTX],
  pub skip_flag: [ContextModel; NUM_SKIP_FLAG_CTX],
  pub merge_flag: [ContextModel; 1],
  pub merge_idx: [ContextModel; 1],
  pub part_size: [ContextModel; NUM_PART_SIZE_CTX],
  pub pred_mode: [ContextModel; 1],
  pub intra_pred: [ContextModel; 1],
  pub chroma_pred: [ContextModel; NUM_CHROMA_PRED_CTX],
  pub inter_dir: [ContextModel; NUM_INTER_DIR_CTX],
  pub mvd: [ContextModel; NUM_MVD_CTX],
  pub ref_pic: [ContextModel; NUM_REF_NO_CTX],
  pub delta_qp: [ContextModel; NUM_DELTA_QP_CTX],
  pub qt_cbf: [ContextModel; NUM_QT_CBF_CTX],
  pub qt_root_cbf: [ContextModel; 1],
  pub last_x: [ContextModel; NUM_LAST_FLAG_XY],
  pub last_y: [ContextModel; NUM_LAST_FLAG_XY],
  pub sig_cg: [ContextModel; 2 * NUM_SIG_CG_FLAG_CTX],
  pub sig_flag: [ContextModel; NUM_SIG_FLAG_CTX],
  pub one_flag: [ContextModel; NUM_ONE_FLAG_CTX],
  pub abs_flag: [ContextModel; NUM_ABS_FLAG_CTX],
  pub mvp_idx: [ContextModel; 1],
  pub sao_merge: [ContextModel; 1],
  pub sao_type: [ContextModel; 1],
  pub trans_subdiv: [ContextModel; NUM_TRANS_SUBDIV_CTX],
  pub transquant_bypass: [ContextModel; 1],
}

impl CabacContexts {
  /// Contexts at the start of a slice segment.
  pub fn new(slice_type: SliceType, qp: i32) -> Self {
    CabacContexts {
      split_flag: init_set(&SPLIT_FLAG_INIT, slice_type, qp),
      skip_flag: init_set(&SKIP_FLAG_INIT, slice_type, qp),
      merge_flag: init_set(&MERGE_FLAG_INIT, slice_type, qp),
      merge_idx: init_set(&MERGE_IDX_INIT, slice_type, qp),
      part_size: init_set(&PART_SIZE_INIT, slice_type, qp),
      pred_mode: init_set(&PRED_MODE_INIT, slice_type, qp),
      intra_pred: init_set(&INTRA_PRED_INIT, slice_type, qp),
      chroma_pred: init_set(&CHROMA_PRED_INIT, slice_type, qp),
      inter_dir: init_set(&INTER_DIR_INIT, slice_type, qp),
      mvd: init_set(&MVD_INIT, slice_type, qp),
      ref_pic: init_set(&REF_PIC_INIT, slice_type, qp),
      delta_qp: init_set(&DELTA_QP_INIT, slice_type, qp),
      qt_cbf: init_set(&QT_CBF_INIT, slice_type, qp),
      qt_root_cbf: init_set(&QT_ROOT_CBF_INIT, slice_type, qp),
      last_x: init_set(&LAST_INIT, slice_type, qp),
      last_y: init_set(&LAST_INIT, slice_type, qp),
      sig_cg: init_set(&SIG_CG_INIT, slice_type, qp),
      sig_flag: init_set(&SIG_FLAG_INIT, slice_type, qp),
      one_flag: init_set(&ONE_FLAG_INIT, slice_type, qp),
      abs_flag: init_set(&ABS_FLAG_INIT, slice_type, qp),
      mvp_idx: init_set(&MVP_IDX_INIT, slice_type, qp),
      sao_merge: init_set(&SAO_MERGE_INIT, slice_type, qp),
      sao_type: init_set(&SAO_TYPE_INIT, slice_type, qp),
      trans_subdiv: init_set(&TRANS_SUBDIV_INIT, slice_type, qp),
      transquant_bypass: init_set(&TRANSQUANT_BYPASS_INIT, slice_type, qp),
    }
  }
}

#[cfg(test)]
mod test {
  use super::*;

  #[test]
  fn init_depends_on_slice_type_and_qp() {
    let i = CabacContexts::new(SliceType::I, 32);
    let p = CabacContexts::new(SliceType::P, 32);
    assert_ne!(i, p);
    assert_eq!(i.skip_flag[0], ContextModel::new(CNU, 32));
    assert_ne!(
      CabacContexts::new(SliceType::I, 22).sig_flag,
      CabacContexts::new(SliceType::I, 37).sig_flag
    );
    assert_eq!(i.last_x, i.last_y);
  }
}
