// Copyright (c) 2024, The cuquad contributors. All rights reserved
//
// This source code is subject to the terms of the BSD 2 Clause License and
// the Alliance for Open Media Patent License 1.0. If the BSD 2 Clause License
// was not distributed with this source code in the LICENSE file, you can
// obtain it at www.aomedia.org/license/software. If the Alliance for Open
// Media Patent License 1.0 was not distributed with this source code in the
// PATENTS file, you can obtain it at www.aomedia.org/license/patent.

//! Binary arithmetic coder front end.
//!
//! [`WriterBase`] owns the context adaptation and forwards every bin to a
//! [`StorageBackend`]: [`WriterCounter`] only estimates the cost,
//! [`WriterRecorder`] keeps the bins for a later [`WriterRecorder::replay`]
//! and [`WriterEncoder`] runs the arithmetic coder proper.

#![allow(clippy::identity_op)]

use bitstream_io::{BigEndian, BitWrite, BitWriter};

use std::io;
use std::sync::OnceLock;

/// Fractional bit precision of [`Writer::tell_frac`].
pub const FRAC_BITS: u32 = 15;

const NUM_STATES: usize = 64;

#[rustfmt::skip]
static RANGE_TAB_LPS: [[u8; 4]; NUM_STATES] = [
  [128, 176, 208, 240], [128, 167, 197, 227], [128, 158, 187, 216],
  [123, 150, 178, 205], [116, 142, 169, 195], [111, 135, 160, 185],
  [105, 128, 152, 175], [100, 122, 144, 166], [ 95, 116, 137, 158],
  [ 90, 110, 130, 150], [ 85, 104, 123, 142], [ 81,  99, 117, 135],
  [ 77,  94, 111, 128], [ 73,  89, 105, 122], [ 69,  85, 100, 116],
  [ 66,  80,  95, 110], [ 62,  76,  90, 104], [ 59,  72,  86,  99],
  [ 56,  69,  81,  94], [ 53,  65,  77,  89], [ 51,  62,  73,  85],
  [ 48,  59,  69,  80], [ 46,  56,  66,  76], [ 43,  53,  63,  72],
  [ 41,  50,  59,  69], [ 39,  48,  56,  65], [ 37,  45,  54,  62],
  [ 35,  43,  51,  59], [ 33,  41,  48,  56], [ 32,  39,  46,  53],
  [ 30,  37,  43,  50], [ 29,  35,  41,  48], [ 27,  33,  39,  45],
  [ 26,  31,  37,  43], [ 24,  30,  35,  41], [ 23,  28,  33,  39],
  [ 22,  27,  32,  37], [ 21,  26,  30,  35], [ 20,  24,  29,  33],
  [ 19,  23,  27,  31], [ 18,  22,  26,  30], [ 17,  21,  25,  28],
  [ 16,  20,  23,  27], [ 15,  19,  22,  25], [ 14,  18,  21,  24],
  [ 14,  17,  20,  23], [ 13,  16,  19,  22], [ 12,  15,  18,  21],
  [ 12,  14,  17,  20], [ 11,  14,  16,  19], [ 11,  13,  15,  18],
  [ 10,  12,  15,  17], [ 10,  12,  14,  16], [  9,  11,  13,  15],
  [  9,  11,  12,  14], [  8,  10,  12,  14], [  8,   9,  11,  13],
  [  7,   9,  11,  12], [  7,   9,  10,  12], [  7,   8,  10,  11],
  [  6,   8,   9,  11], [  6,   7,   9,  10], [  6,   7,   8,   9],
  [  2,   2,   2,   2],
];

#[rustfmt::skip]
static TRANS_IDX_LPS: [u8; NUM_STATES] = [
   0,  0,  1,  2,  2,  4,  4,  5,  6,  7,  8,  9,  9, 11, 11, 12,
  13, 13, 15, 15, 16, 16, 18, 18, 19, 19, 21, 21, 22, 22, 23, 24,
  24, 25, 26, 26, 27, 27, 28, 29, 29, 30, 30, 30, 31, 32, 32, 33,
  33, 33, 34, 34, 35, 35, 35, 36, 36, 36, 37, 37, 37, 38, 38, 63,
];

/// Renormalization shift after coding an LPS, indexed by `lps >> 3`.
#[rustfmt::skip]
static RENORM_TABLE: [u8; 32] = [
  6, 5, 4, 4, 3, 3, 3, 3, 2, 2, 2, 2, 2, 2, 2, 2,
  1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1,
];

/// Cost in `1 / (1 << FRAC_BITS)` bits of coding a bin, indexed by
/// `state ^ bin` where the low bit of `state` is the MPS.
fn entropy_bits() -> &'static [u32; 2 * NUM_STATES] {
  static TABLE: OnceLock<[u32; 2 * NUM_STATES]> = OnceLock::new();
  TABLE.get_or_init(|| {
    let alpha = (0.01875f64 / 0.5).powf(1. / 63.);
    let scale = (1u32 << FRAC_BITS) as f64;
    let mut t = [0; 2 * NUM_STATES];
    for s in 0..NUM_STATES {
      let p_lps = 0.5 * alpha.powi(s as i32);
      t[2 * s] = (-(1. - p_lps).log2() * scale).round() as u32;
      t[2 * s + 1] = (-p_lps.log2() * scale).round() as u32;
    }
    t
  })
}

/// Adaptive probability model of one context coded bin.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct ContextModel {
  /// `(probability_state << 1) | mps`
  state: u8,
}

impl ContextModel {
  pub const CNU: u8 = 154;

  /// Initial state for `init_value` at the slice QP.
  pub fn new(init_value: u8, qp: i32) -> Self {
    let slope = (init_value >> 4) as i32 * 5 - 45;
    let offset = (((init_value & 15) as i32) << 3) - 16;
    let state =
      (((slope * qp.clamp(0, 51)) >> 4) + offset).clamp(1, 126) as u8;
    let mps = (state >= 64) as u8;
    let pstate = if mps != 0 { state - 64 } else { 63 - state };
    ContextModel { state: (pstate << 1) | mps }
  }

  #[inline]
  pub const fn state(self) -> u8 {
    self.state
  }

  #[inline]
  pub const fn mps(self) -> bool {
    self.state & 1 != 0
  }

  #[inline]
  pub const fn pstate(self) -> usize {
    (self.state >> 1) as usize
  }

  #[inline]
  fn update(&mut self, bin: bool) {
    let mps = self.mps();
    let s = self.pstate();
    if bin == mps {
      self.state = (((s + 1).min(62) as u8) << 1) | mps as u8;
    } else if s == 0 {
      self.state = !mps as u8;
    } else {
      self.state = (TRANS_IDX_LPS[s] << 1) | mps as u8;
    }
  }

  /// Estimated cost of coding `bin` in this state.
  #[inline]
  pub fn cost(self, bin: bool) -> u32 {
    entropy_bits()[(self.state ^ bin as u8) as usize]
  }
}

pub trait Writer {
  /// Context coded bin, adapting `ctx`.
  fn encode_bin(&mut self, bin: bool, ctx: &mut ContextModel);
  /// Equiprobable bin.
  fn encode_bin_ep(&mut self, bin: bool);
  /// `n` equiprobable bins, most significant first.
  fn encode_bins_ep(&mut self, value: u32, n: u32);
  /// Terminating bin.
  fn encode_bin_trm(&mut self, bin: bool);
  /// Restarts the bit count.
  fn reset_bits(&mut self);
  /// Bits written since the last reset, rounded to whole bits.
  fn tell(&mut self) -> u32;
  /// Bits written since the last reset in `1 / (1 << FRAC_BITS)` units.
  fn tell_frac(&mut self) -> u64;
}

/// Destination of the bins produced by a [`WriterBase`].
pub trait StorageBackend {
  /// Context coded bin; `state` is the context state before adaptation.
  fn store_bin(&mut self, bin: bool, state: u8);
  fn store_bypass(&mut self, value: u32, n: u32);
  fn store_terminate(&mut self, bin: bool);
  /// Bits produced so far in `1 / (1 << FRAC_BITS)` units.
  fn stream_bits(&self) -> u64;
}

#[derive(Debug, Clone)]
pub struct WriterBase<S> {
  /// Stream position at the last [`Writer::reset_bits`].
  base: u64,
  /// Enables bin tracing through `log`.
  debug: bool,
  s: S,
}

impl<S> WriterBase<S> {
  fn new(storage: S) -> Self {
    WriterBase { base: 0, debug: false, s: storage }
  }

  /// Enables logging of every bin at the `trace` level.
  pub fn set_debug(&mut self, debug: bool) {
    self.debug = debug;
  }
}

impl<S: StorageBackend> Writer for WriterBase<S> {
  #[inline]
  fn encode_bin(&mut self, bin: bool, ctx: &mut ContextModel) {
    if self.debug {
      log::trace!("bin {} state {}", bin as u8, ctx.state());
    }
    self.s.store_bin(bin, ctx.state());
    ctx.update(bin);
  }

  #[inline]
  fn encode_bin_ep(&mut self, bin: bool) {
    self.s.store_bypass(bin as u32, 1);
  }

  #[inline]
  fn encode_bins_ep(&mut self, value: u32, n: u32) {
    debug_assert!(n <= 32);
    if self.debug {
      log::trace!("bypass {value:#x} ({n} bins)");
    }
    if n > 0 {
      self.s.store_bypass(value, n);
    }
  }

  #[inline]
  fn encode_bin_trm(&mut self, bin: bool) {
    self.s.store_terminate(bin);
  }

  fn reset_bits(&mut self) {
    self.base = self.s.stream_bits();
  }

  fn tell(&mut self) -> u32 {
    let frac = self.tell_frac();
    ((frac + (1 << (FRAC_BITS - 1))) >> FRAC_BITS) as u32
  }

  fn tell_frac(&mut self) -> u64 {
    self.s.stream_bits() - self.base
  }
}

/// Storage backend that only accumulates the estimated cost.
#[derive(Debug, Clone, Default)]
pub struct WriterCounter {
  frac_bits: u64,
}

impl WriterCounter {
  pub fn new() -> WriterBase<WriterCounter> {
    WriterBase::new(WriterCounter::default())
  }
}

impl StorageBackend for WriterCounter {
  #[inline]
  fn store_bin(&mut self, bin: bool, state: u8) {
    self.frac_bits += entropy_bits()[(state ^ bin as u8) as usize] as u64;
  }

  #[inline]
  fn store_bypass(&mut self, _value: u32, n: u32) {
    self.frac_bits += (n as u64) << FRAC_BITS;
  }

  #[inline]
  fn store_terminate(&mut self, bin: bool) {
    // the terminating bin has a fixed range of 2 out of roughly 2^8
    if bin {
      self.frac_bits += 7 << FRAC_BITS;
    }
  }

  fn stream_bits(&self) -> u64 {
    self.frac_bits
  }
}

/// One recorded bin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bin {
  Regular { bin: bool, state: u8 },
  Bypass { value: u32, n: u32 },
  Terminate(bool),
}

/// Storage backend that keeps every bin for replay into another backend.
#[derive(Debug, Clone, Default)]
pub struct WriterRecorder {
  bins: Vec<Bin>,
  counter: WriterCounter,
}

impl WriterRecorder {
  pub fn new() -> WriterBase<WriterRecorder> {
    WriterBase::new(WriterRecorder::default())
  }

  /// Sends the recorded bins, in order, to `dest`.
  pub fn replay(&self, dest: &mut dyn StorageBackend) {
    for &b in &self.bins {
      match b {
        Bin::Regular { bin, state } => dest.store_bin(bin, state),
        Bin::Bypass { value, n } => dest.store_bypass(value, n),
        Bin::Terminate(bin) => dest.store_terminate(bin),
      }
    }
  }

  pub fn bins(&self) -> &[Bin] {
    &self.bins
  }
}

impl StorageBackend for WriterRecorder {
  fn store_bin(&mut self, bin: bool, state: u8) {
    self.bins.push(Bin::Regular { bin, state });
    self.counter.store_bin(bin, state);
  }

  fn store_bypass(&mut self, value: u32, n: u32) {
    self.bins.push(Bin::Bypass { value, n });
    self.counter.store_bypass(value, n);
  }

  fn store_terminate(&mut self, bin: bool) {
    self.bins.push(Bin::Terminate(bin));
    self.counter.store_terminate(bin);
  }

  fn stream_bits(&self) -> u64 {
    self.counter.stream_bits()
  }
}

impl WriterBase<WriterRecorder> {
  pub fn replay(&self, dest: &mut dyn StorageBackend) {
    self.s.replay(dest);
  }

  /// Sends the recorded bins to the backend of another writer.
  pub fn replay_into<S: StorageBackend>(&self, dest: &mut WriterBase<S>) {
    self.s.replay(&mut dest.s);
  }

  pub fn recorded(&self) -> &WriterRecorder {
    &self.s
  }
}

/// Storage backend running the binary arithmetic coder into a byte buffer.
pub struct WriterEncoder {
  bw: BitWriter<Vec<u8>, BigEndian>,
  low: u32,
  range: u32,
  bits_left: i32,
  num_buffered: u32,
  buffered_byte: u32,
  written_bits: u64,
  /// First I/O error of the bit writer, reported by `done`.
  error: Option<io::ErrorKind>,
}

impl WriterEncoder {
  pub fn new() -> WriterBase<WriterEncoder> {
    WriterBase::new(WriterEncoder {
      bw: BitWriter::endian(Vec::new(), BigEndian),
      low: 0,
      range: 510,
      bits_left: 23,
      num_buffered: 0,
      buffered_byte: 0xff,
      written_bits: 0,
      error: None,
    })
  }

  fn put(&mut self, n: u32, value: u32) {
    if n == 0 {
      return;
    }
    let value = if n < 32 { value & ((1 << n) - 1) } else { value };
    if let Err(e) = self.bw.write(n, value) {
      self.error.get_or_insert(e.kind());
    }
    self.written_bits += n as u64;
  }

  #[inline]
  fn test_and_write_out(&mut self) {
    if self.bits_left < 12 {
      self.write_out();
    }
  }

  fn write_out(&mut self) {
    let lead_byte = self.low >> (24 - self.bits_left);
    self.bits_left += 8;
    self.low &= 0xffff_ffffu32 >> self.bits_left;

    if lead_byte == 0xff {
      self.num_buffered += 1;
    } else if self.num_buffered > 0 {
      let carry = lead_byte >> 8;
      let byte = self.buffered_byte + carry;
      self.buffered_byte = lead_byte & 0xff;
      self.put(8, byte);
      let byte = (0xff + carry) & 0xff;
      while self.num_buffered > 1 {
        self.put(8, byte);
        self.num_buffered -= 1;
      }
    } else {
      self.num_buffered = 1;
      self.buffered_byte = lead_byte;
    }
  }

  fn finish(&mut self) {
    if (self.low >> (32 - self.bits_left)) != 0 {
      self.put(8, self.buffered_byte + 1);
      while self.num_buffered > 1 {
        self.put(8, 0x00);
        self.num_buffered -= 1;
      }
      self.low -= 1 << (32 - self.bits_left);
    } else {
      if self.num_buffered > 0 {
        self.put(8, self.buffered_byte);
      }
      while self.num_buffered > 1 {
        self.put(8, 0xff);
        self.num_buffered -= 1;
      }
    }
    self.put((24 - self.bits_left) as u32, self.low >> 8);
  }
}

impl StorageBackend for WriterEncoder {
  fn store_bin(&mut self, bin: bool, state: u8) {
    let pstate = (state >> 1) as usize;
    let mps = state & 1 != 0;
    let lps = RANGE_TAB_LPS[pstate][((self.range >> 6) & 3) as usize] as u32;
    self.range -= lps;

    if bin != mps {
      let num_bits = RENORM_TABLE[(lps >> 3) as usize] as i32;
      self.low = (self.low + self.range) << num_bits;
      self.range = lps << num_bits;
      self.bits_left -= num_bits;
    } else {
      if self.range >= 256 {
        return;
      }
      self.low <<= 1;
      self.range <<= 1;
      self.bits_left -= 1;
    }
    self.test_and_write_out();
  }

  fn store_bypass(&mut self, mut value: u32, mut n: u32) {
    while n > 8 {
      n -= 8;
      let pattern = value >> n;
      self.low <<= 8;
      self.low += self.range * pattern;
      value -= pattern << n;
      self.bits_left -= 8;
      self.test_and_write_out();
    }
    self.low <<= n;
    self.low += self.range * value;
    self.bits_left -= n as i32;
    self.test_and_write_out();
  }

  fn store_terminate(&mut self, bin: bool) {
    self.range -= 2;
    if bin {
      self.low += self.range;
      self.low <<= 7;
      self.range = 2 << 7;
      self.bits_left -= 7;
    } else if self.range >= 256 {
      return;
    } else {
      self.low <<= 1;
      self.range <<= 1;
      self.bits_left -= 1;
    }
    self.test_and_write_out();
  }

  fn stream_bits(&self) -> u64 {
    (self.written_bits + 8 * self.num_buffered as u64 + 23
      - self.bits_left as u64)
      << FRAC_BITS
  }
}

impl WriterBase<WriterEncoder> {
  /// Flushes the coder after the final `end_of_slice_segment_flag` and
  /// returns the coded bytes, including the stop bit and the alignment.
  ///
  /// # Errors
  ///
  /// Returns the first error of the underlying bit writer.
  pub fn done(mut self) -> io::Result<Vec<u8>> {
    let enc = &mut self.s;
    enc.finish();
    enc.put(1, 1);
    if let Some(kind) = enc.error {
      return Err(kind.into());
    }
    enc.bw.byte_align()?;
    Ok(self.s.bw.into_writer())
  }
}

#[cfg(test)]
mod test {
  use super::*;

  #[test]
  fn context_init_matches_known_states() {
    // CNU at any QP is the equiprobable state with MPS 1
    let c = ContextModel::new(ContextModel::CNU, 32);
    assert_eq!((c.pstate(), c.mps()), (0, true));
    // 111 at QP 26: slope -15, offset 104 -> state 79
    let c = ContextModel::new(111, 26);
    assert_eq!((c.pstate(), c.mps()), (15, true));
    // 139 at QP 26: slope -5, offset 72 -> state 63
    let c = ContextModel::new(139, 26);
    assert_eq!((c.pstate(), c.mps()), (0, false));
  }

  #[test]
  fn adaptation_moves_towards_coded_values() {
    let mut c = ContextModel::new(ContextModel::CNU, 26);
    let mut w = WriterCounter::new();
    for _ in 0..20 {
      w.encode_bin(true, &mut c);
    }
    assert!(c.mps());
    assert!(c.pstate() > 10);
    assert!(c.cost(true) < c.cost(false));
    // an LPS at state 0 flips the MPS
    let mut c = ContextModel::new(ContextModel::CNU, 26);
    w.encode_bin(false, &mut c);
    assert_eq!((c.pstate(), c.mps()), (0, false));
  }

  #[test]
  fn counter_reports_whole_bypass_bits() {
    let mut w = WriterCounter::new();
    w.encode_bins_ep(0b1011, 4);
    w.encode_bin_ep(true);
    assert_eq!(w.tell(), 5);
    w.reset_bits();
    assert_eq!(w.tell_frac(), 0);
    let mut c = ContextModel::new(ContextModel::CNU, 26);
    w.encode_bin(true, &mut c);
    assert_eq!(w.tell(), 1);
  }

  #[test]
  fn replay_reproduces_the_recorded_cost() {
    let mut rec = WriterRecorder::new();
    let mut c = ContextModel::new(110, 30);
    for i in 0..50 {
      rec.encode_bin(i % 3 == 0, &mut c);
      rec.encode_bins_ep(i, 6);
    }
    let recorded = rec.tell_frac();
    let mut counter = WriterCounter::default();
    rec.replay(&mut counter);
    assert_eq!(counter.stream_bits(), recorded);
    assert_eq!(rec.recorded().bins().len(), 100);
  }

  #[test]
  fn replayed_stream_packs_like_direct_coding() {
    let mut rec = WriterRecorder::new();
    let mut direct = WriterEncoder::new();
    let mut c1 = ContextModel::new(154, 30);
    let mut c2 = c1;
    for i in 0..300u32 {
      rec.encode_bin(i % 5 == 0, &mut c1);
      direct.encode_bin(i % 5 == 0, &mut c2);
      rec.encode_bins_ep(i & 3, 2);
      direct.encode_bins_ep(i & 3, 2);
    }
    rec.encode_bin_trm(true);
    direct.encode_bin_trm(true);
    let mut packed = WriterEncoder::new();
    rec.replay_into(&mut packed);
    assert_eq!(packed.done().unwrap(), direct.done().unwrap());
  }

  #[test]
  fn encoder_output_size_tracks_estimate() {
    let mut enc = WriterEncoder::new();
    let mut est = WriterCounter::new();
    let mut c1 = ContextModel::new(140, 32);
    let mut c2 = c1;
    for i in 0..2000u32 {
      let bin = (i * 7919) % 11 < 3;
      enc.encode_bin(bin, &mut c1);
      est.encode_bin(bin, &mut c2);
      enc.encode_bins_ep(i & 7, 3);
      est.encode_bins_ep(i & 7, 3);
    }
    enc.encode_bin_trm(true);
    let bits = enc.done().unwrap().len() as i64 * 8;
    let estimate = est.tell() as i64;
    assert!((bits - estimate).abs() < estimate / 20, "{bits} vs {estimate}");
  }
}
