// Copyright (c) 2024, The cuquad contributors. All rights reserved
//
// This source code is subject to the terms of the BSD 2 Clause License and
// the Alliance for Open Media Patent License 1.0. If the BSD 2 Clause License
// was not distributed with this source code in the LICENSE file, you can
// obtain it at www.aomedia.org/license/software. If the Alliance for Open
// Media Patent License 1.0 was not distributed with this source code in the
// PATENTS file, you can obtain it at www.aomedia.org/license/patent.

use super::*;

impl ContextWriter {
  /// `sao_merge_left_flag` or `sao_merge_up_flag`.
  pub fn write_sao_merge<W: Writer>(&mut self, w: &mut W, merge: bool) {
    w.encode_bin(merge, &mut self.fc.sao_merge[0]);
  }

  /// `sao_type_idx`: 0 off, 1 band offset, 2 edge offset.
  pub fn write_sao_type_idx<W: Writer>(&mut self, w: &mut W, type_idx: u8) {
    debug_assert!(type_idx <= 2);
    w.encode_bin(type_idx != 0, &mut self.fc.sao_type[0]);
    if type_idx != 0 {
      w.encode_bin_ep(type_idx == 2);
    }
  }

  /// Truncated unary magnitude of an offset, bypass coded. `code` is
  /// capped at `max`.
  pub fn write_sao_max_uvlc<W: Writer>(
    &mut self, w: &mut W, code: u32, max: u32,
  ) {
    let code = code.min(max);
    if max == 0 {
      return;
    }
    w.encode_bin_ep(code != 0);
    if code == 0 {
      return;
    }
    for _ in 1..code {
      w.encode_bin_ep(true);
    }
    if code < max {
      w.encode_bin_ep(false);
    }
  }

  pub fn write_sao_sign<W: Writer>(&mut self, w: &mut W, negative: bool) {
    w.encode_bin_ep(negative);
  }

  /// Fixed length code: band position or edge class.
  pub fn write_sao_uflc<W: Writer>(&mut self, w: &mut W, len: u32, code: u32) {
    w.encode_bins_ep(code, len);
  }
}

#[cfg(test)]
mod test {
  use super::*;
  use crate::ec::WriterRecorder;

  fn count(
    f: impl FnOnce(&mut ContextWriter, &mut WriterBase),
  ) -> (usize, u32) {
    let mut cw = ContextWriter::new(CabacContexts::new(SliceType::I, 32));
    let mut w = WriterRecorder::new();
    f(&mut cw, &mut w);
    let n = w.recorded().bins().len();
    (n, w.tell())
  }

  type WriterBase = crate::ec::WriterBase<crate::ec::WriterRecorder>;

  #[test]
  fn type_idx_off_is_a_single_bin() {
    assert_eq!(count(|cw, w| cw.write_sao_type_idx(w, 0)).0, 1);
    assert_eq!(count(|cw, w| cw.write_sao_type_idx(w, 1)).0, 2);
    assert_eq!(count(|cw, w| cw.write_sao_type_idx(w, 2)).0, 2);
  }

  #[test]
  fn max_uvlc_is_truncated() {
    for (code, max, bits) in
      [(0, 7, 1), (1, 7, 2), (3, 7, 4), (7, 7, 7), (0, 0, 0), (u32::MAX, 7, 7)]
    {
      let (_, tell) = count(|cw, w| cw.write_sao_max_uvlc(w, code, max));
      assert_eq!(tell, bits, "code {code} max {max}");
    }
  }

  #[test]
  fn uflc_writes_exactly_len_bits() {
    let (_, tell) = count(|cw, w| cw.write_sao_uflc(w, 5, 21));
    assert_eq!(tell, 5);
    let (_, tell) = count(|cw, w| cw.write_sao_sign(w, true));
    assert_eq!(tell, 1);
  }
}
