// Copyright (c) 2024, The cuquad contributors. All rights reserved
//
// This source code is subject to the terms of the BSD 2 Clause License and
// the Alliance for Open Media Patent License 1.0. If the BSD 2 Clause License
// was not distributed with this source code in the LICENSE file, you can
// obtain it at www.aomedia.org/license/software. If the Alliance for Open
// Media Patent License 1.0 was not distributed with this source code in the
// PATENTS file, you can obtain it at www.aomedia.org/license/patent.

//! Sample adaptive offset: per LCU parameter estimation and filtering.

use crate::frame::*;
use crate::util::*;

pub const NUM_SAO_BANDS: usize = 32;
pub const SAO_BAND_WINDOW: usize = 4;
pub const NUM_SAO_EDGE_CLASSES: usize = 4;
pub const NUM_SAO_OFFSETS: usize = 4;

/// Neighbour displacements `(a, b)` of each edge class: horizontal,
/// vertical, 135 and 45 degrees.
const EDGE_NEIGHBOURS: [[(isize, isize); 2]; NUM_SAO_EDGE_CLASSES] = [
  [(-1, 0), (1, 0)],
  [(0, -1), (0, 1)],
  [(-1, -1), (1, 1)],
  [(1, -1), (-1, 1)],
];

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SaoType {
  #[default]
  Off,
  Band {
    position: u8,
  },
  Edge {
    class: u8,
  },
}

impl SaoType {
  /// Value of `sao_type_idx`.
  pub const fn type_idx(self) -> u8 {
    match self {
      SaoType::Off => 0,
      SaoType::Band { .. } => 1,
      SaoType::Edge { .. } => 2,
    }
  }
}

/// Parameters of one component. Edge offsets 0 and 1 are never negative,
/// 2 and 3 never positive.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SaoOffset {
  pub kind: SaoType,
  /// Offsets in units of `1 << sao_offset_shift(bit_depth)`.
  pub offsets: [i32; NUM_SAO_OFFSETS],
}

/// Parameters of one LCU. `comps` always holds the effective parameters,
/// also when they are inherited through a merge flag.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SaoLcuParams {
  pub merge_left: bool,
  pub merge_up: bool,
  pub comps: [SaoOffset; 3],
}

impl SaoOffset {
  /// Offsets brought into the codable range: magnitudes capped at
  /// `sao_max_offset(bit_depth)` and edge offsets forced to their sign.
  pub fn clamped(&self, bit_depth: usize) -> Self {
    let max = sao_max_offset(bit_depth);
    let mut offsets = self.offsets;
    for (i, o) in offsets.iter_mut().enumerate() {
      *o = match self.kind {
        SaoType::Off => 0,
        SaoType::Band { .. } => (*o).clamp(-max, max),
        SaoType::Edge { .. } if i < 2 => (*o).clamp(0, max),
        SaoType::Edge { .. } => (*o).clamp(-max, 0),
      };
    }
    SaoOffset { kind: self.kind, offsets }
  }
}

impl SaoLcuParams {
  pub fn is_off(&self) -> bool {
    self.comps.iter().all(|c| c.kind == SaoType::Off)
  }
}

#[inline]
pub const fn sao_offset_shift(bit_depth: usize) -> usize {
  bit_depth - if bit_depth < 10 { bit_depth } else { 10 }
}

/// Largest coded offset magnitude.
#[inline]
pub const fn sao_max_offset(bit_depth: usize) -> i32 {
  let bd = if bit_depth < 10 { bit_depth } else { 10 };
  (1 << (bd - 5)) - 1
}

/// Edge category index of `c` between `a` and `b`: 0 local minimum,
/// 1 and 2 edges, 3 local maximum.
#[inline]
fn edge_category(c: i32, a: i32, b: i32) -> Option<usize> {
  match 2 + signum(c - a) + signum(c - b) {
    0 => Some(0),
    1 => Some(1),
    3 => Some(2),
    4 => Some(3),
    _ => None,
  }
}

/// Plane rectangle `(x, y, w, h)` covered by an LCU.
fn lcu_rect(
  plane: &PlaneConfig, lcu_x: usize, lcu_y: usize, lcu_size: usize,
) -> (usize, usize, usize, usize) {
  let x = lcu_x >> plane.xdec;
  let y = lcu_y >> plane.ydec;
  let w = (lcu_size >> plane.xdec).min(plane.width - x);
  let h = (lcu_size >> plane.ydec).min(plane.height - y);
  (x, y, w, h)
}

/// Visits the samples of `rect` taking part in edge class `class` with
/// their category.
fn for_each_edge<T: Pixel>(
  rec: &Plane<T>, rect: (usize, usize, usize, usize), class: usize,
  mut f: impl FnMut(usize, usize, usize),
) {
  let (x0, y0, w, h) = rect;
  let [(ax, ay), (bx, by)] = EDGE_NEIGHBOURS[class];
  let (pw, ph) = (rec.cfg.width as isize, rec.cfg.height as isize);
  for y in y0..y0 + h {
    for x in x0..x0 + w {
      let (xi, yi) = (x as isize, y as isize);
      let inside = |dx: isize, dy: isize| {
        (0..pw).contains(&(xi + dx)) && (0..ph).contains(&(yi + dy))
      };
      if !inside(ax, ay) || !inside(bx, by) {
        continue;
      }
      let c = rec.p(x, y).to_i32();
      let a = rec.p((xi + ax) as usize, (yi + ay) as usize).to_i32();
      let b = rec.p((xi + bx) as usize, (yi + by) as usize).to_i32();
      if let Some(cat) = edge_category(c, a, b) {
        f(x, y, cat);
      }
    }
  }
}

#[derive(Clone, Copy, Debug, Default)]
struct Acc {
  /// Sum of `org - rec`.
  diff: i64,
  count: i64,
}

#[derive(Clone, Debug)]
struct SaoStats {
  edge: [[Acc; NUM_SAO_OFFSETS]; NUM_SAO_EDGE_CLASSES],
  band: [Acc; NUM_SAO_BANDS],
}

impl SaoStats {
  fn collect<T: Pixel>(
    org: &Plane<T>, rec: &Plane<T>, rect: (usize, usize, usize, usize),
    bit_depth: usize,
  ) -> Self {
    let mut stats = SaoStats {
      edge: Default::default(),
      band: [Acc::default(); NUM_SAO_BANDS],
    };
    let diff = |x: usize, y: usize| {
      (org.p(x, y).to_i32() - rec.p(x, y).to_i32()) as i64
    };
    for class in 0..NUM_SAO_EDGE_CLASSES {
      let edge = &mut stats.edge[class];
      for_each_edge(rec, rect, class, |x, y, cat| {
        edge[cat].diff += diff(x, y);
        edge[cat].count += 1;
      });
    }
    let (x0, y0, w, h) = rect;
    let band_shift = bit_depth - 5;
    for y in y0..y0 + h {
      for x in x0..x0 + w {
        let band = (rec.p(x, y).to_i32() >> band_shift) as usize;
        stats.band[band].diff += diff(x, y);
        stats.band[band].count += 1;
      }
    }
    stats
  }
}

/// Bits of a truncated unary magnitude.
#[inline]
fn uvlc_bits(mag: i32, max: i32) -> u32 {
  if max == 0 {
    0
  } else if mag == max {
    mag as u32
  } else {
    mag as u32 + 1
  }
}

/// Chooses an offset in `lo..=hi` for a category, returning it with its
/// distortion change and bits.
fn best_offset(
  acc: Acc, lo: i32, hi: i32, shift: usize, lambda: f64, signed: bool,
  max: i32,
) -> (i32, f64) {
  let bits =
    |o: i32| uvlc_bits(o.abs(), max) as f64 + (signed && o != 0) as u8 as f64;
  if acc.count == 0 {
    return (0, lambda * bits(0));
  }
  let unit = (acc.count << shift) as f64;
  let start =
    (acc.diff as f64 / unit).round().clamp(lo as f64, hi as f64) as i32;
  let mut best = (0, lambda * bits(0));
  let mut o = start;
  while o != 0 {
    let v = (o as i64) << shift;
    let delta_d = (acc.count * v * v - 2 * v * acc.diff) as f64;
    let cost = delta_d + lambda * bits(o);
    if cost < best.1 {
      best = (o, cost);
    }
    o -= signum(o);
  }
  best
}

/// Rate-distortion choice of the SAO parameters of an LCU.
#[derive(Clone, Copy, Debug)]
pub struct SaoEstimator {
  pub bit_depth: usize,
  pub lambda: f64,
  pub luma: bool,
  pub chroma: bool,
}

impl SaoEstimator {
  fn edge_option(
    &self, stats: &SaoStats, class: usize,
  ) -> ([i32; NUM_SAO_OFFSETS], f64) {
    let shift = sao_offset_shift(self.bit_depth);
    let max = sao_max_offset(self.bit_depth);
    let mut offsets = [0; NUM_SAO_OFFSETS];
    let mut cost = 0.;
    for (cat, o) in offsets.iter_mut().enumerate() {
      let (lo, hi) = if cat < 2 { (0, max) } else { (-max, 0) };
      let (v, c) = best_offset(
        stats.edge[class][cat],
        lo,
        hi,
        shift,
        self.lambda,
        false,
        max,
      );
      *o = v;
      cost += c;
    }
    (offsets, cost)
  }

  fn band_option(
    &self, stats: &SaoStats,
  ) -> (u8, [i32; NUM_SAO_OFFSETS], f64) {
    let shift = sao_offset_shift(self.bit_depth);
    let max = sao_max_offset(self.bit_depth);
    let per_band: Vec<(i32, f64)> = stats
      .band
      .iter()
      .map(|&acc| best_offset(acc, -max, max, shift, self.lambda, true, max))
      .collect();
    let mut best = (0u8, [0; NUM_SAO_OFFSETS], f64::MAX);
    for position in 0..NUM_SAO_BANDS {
      let mut offsets = [0; NUM_SAO_OFFSETS];
      let mut cost = 0.;
      for (k, o) in offsets.iter_mut().enumerate() {
        let (v, c) = per_band[(position + k) % NUM_SAO_BANDS];
        *o = v;
        cost += c;
      }
      if cost < best.2 {
        best = (position as u8, offsets, cost);
      }
    }
    best
  }

  fn estimate_luma(&self, stats: &SaoStats) -> SaoOffset {
    // type bins: one for off, two otherwise; edge adds the 2 bit class and
    // band the 5 bit position
    let mut best = (SaoOffset::default(), self.lambda);
    for class in 0..NUM_SAO_EDGE_CLASSES {
      let (offsets, cost) = self.edge_option(stats, class);
      let cost = cost + self.lambda * 4.;
      if cost < best.1 {
        let kind = SaoType::Edge { class: class as u8 };
        best = (SaoOffset { kind, offsets }, cost);
      }
    }
    let (position, offsets, cost) = self.band_option(stats);
    let cost = cost + self.lambda * 7.;
    if cost < best.1 {
      best = (SaoOffset { kind: SaoType::Band { position }, offsets }, cost);
    }
    best.0
  }

  /// Both chroma components share the type and the edge class.
  fn estimate_chroma(&self, stats: [&SaoStats; 2]) -> [SaoOffset; 2] {
    let mut best = ([SaoOffset::default(); 2], self.lambda);
    for class in 0..NUM_SAO_EDGE_CLASSES {
      let (o1, c1) = self.edge_option(stats[0], class);
      let (o2, c2) = self.edge_option(stats[1], class);
      let cost = c1 + c2 + self.lambda * 4.;
      if cost < best.1 {
        let kind = SaoType::Edge { class: class as u8 };
        best = (
          [SaoOffset { kind, offsets: o1 }, SaoOffset { kind, offsets: o2 }],
          cost,
        );
      }
    }
    let (p1, o1, c1) = self.band_option(stats[0]);
    let (p2, o2, c2) = self.band_option(stats[1]);
    let cost = c1 + c2 + self.lambda * 12.;
    if cost < best.1 {
      best = (
        [
          SaoOffset { kind: SaoType::Band { position: p1 }, offsets: o1 },
          SaoOffset { kind: SaoType::Band { position: p2 }, offsets: o2 },
        ],
        cost,
      );
    }
    best.0
  }

  /// Parameters of the LCU at luma position `(lcu_x, lcu_y)`, without
  /// merge decisions.
  pub fn estimate<T: Pixel>(
    &self, org: &Frame<T>, rec: &Frame<T>, lcu_x: usize, lcu_y: usize,
    lcu_size: usize,
  ) -> SaoLcuParams {
    let mut params = SaoLcuParams::default();
    let stats = |p: usize| {
      let rect = lcu_rect(&rec.planes[p].cfg, lcu_x, lcu_y, lcu_size);
      SaoStats::collect(&org.planes[p], &rec.planes[p], rect, self.bit_depth)
    };
    if self.luma {
      params.comps[0] = self.estimate_luma(&stats(0));
    }
    if self.chroma {
      let [u, v] = self.estimate_chroma([&stats(1), &stats(2)]);
      params.comps[1] = u;
      params.comps[2] = v;
    }
    params
  }
}

/// Sets the merge flags of `params` when a candidate neighbour carries the
/// same parameters.
pub fn decide_merge(
  params: &mut SaoLcuParams, left: Option<&SaoLcuParams>,
  up: Option<&SaoLcuParams>,
) {
  params.merge_left = left.map_or(false, |l| l.comps == params.comps);
  params.merge_up =
    !params.merge_left && up.map_or(false, |u| u.comps == params.comps);
}

/// Filters `rec` with the per LCU `params`, in raster order, into a new
/// picture. Classification reads the unfiltered samples.
pub fn apply_sao<T: Pixel>(
  rec: &Frame<T>, params: &[SaoLcuParams], lcu_size: usize,
  bit_depth: usize,
) -> Frame<T> {
  let mut out = rec.clone();
  let lcu_cols = (rec.width() + lcu_size - 1) / lcu_size;
  let shift = sao_offset_shift(bit_depth);
  for (addr, lcu) in params.iter().enumerate() {
    let lcu_x = (addr % lcu_cols) * lcu_size;
    let lcu_y = (addr / lcu_cols) * lcu_size;
    for p in 0..3 {
      let comp = &lcu.comps[p];
      let src = &rec.planes[p];
      if src.cfg.width == 0 {
        continue;
      }
      let dst = &mut out.planes[p];
      let rect = lcu_rect(&src.cfg, lcu_x, lcu_y, lcu_size);
      let apply = |dst: &mut Plane<T>, x: usize, y: usize, o: i32| {
        let v = src.p(x, y).to_i32() + (o << shift);
        let stride = dst.cfg.stride;
        dst.data[y * stride + x] = T::clip(v, bit_depth);
      };
      match comp.kind {
        SaoType::Off => {}
        SaoType::Edge { class } => {
          for_each_edge(src, rect, class as usize, |x, y, cat| {
            apply(dst, x, y, comp.offsets[cat]);
          });
        }
        SaoType::Band { position } => {
          let (x0, y0, w, h) = rect;
          let band_shift = bit_depth - 5;
          for y in y0..y0 + h {
            for x in x0..x0 + w {
              let band = (src.p(x, y).to_i32() >> band_shift) as usize;
              let k =
                (band + NUM_SAO_BANDS - position as usize) % NUM_SAO_BANDS;
              if k < SAO_BAND_WINDOW {
                apply(dst, x, y, comp.offsets[k]);
              }
            }
          }
        }
      }
    }
  }
  out
}

#[cfg(test)]
mod test {
  use super::*;
  use crate::dist::get_sse;
  use rand::{Rng, SeedableRng};
  use rand_chacha::ChaCha8Rng;

  fn sse(a: &Plane<u8>, b: &Plane<u8>) -> u64 {
    let (w, h) = (a.cfg.width, a.cfg.height);
    get_sse(&a.data, a.cfg.stride, &b.data, b.cfg.stride, w, h)
  }

  #[test]
  fn edge_categories() {
    assert_eq!(edge_category(1, 5, 5), Some(0));
    assert_eq!(edge_category(5, 5, 9), Some(1));
    assert_eq!(edge_category(5, 5, 5), None);
    assert_eq!(edge_category(9, 5, 9), Some(2));
    assert_eq!(edge_category(9, 5, 5), Some(3));
  }

  #[test]
  fn offset_limits_follow_bit_depth() {
    assert_eq!(sao_max_offset(8), 7);
    assert_eq!(sao_max_offset(10), 31);
    assert_eq!(sao_max_offset(12), 31);
    assert_eq!(sao_offset_shift(8), 0);
    assert_eq!(sao_offset_shift(12), 2);
  }

  #[test]
  fn identical_pictures_turn_sao_off() {
    let mut rng = ChaCha8Rng::seed_from_u64(1);
    let mut org = Frame::<u8>::new(64, 64, ChromaSampling::Cs420);
    for p in &mut org.planes {
      p.data.iter_mut().for_each(|v| *v = rng.gen());
    }
    let est =
      SaoEstimator { bit_depth: 8, lambda: 10., luma: true, chroma: true };
    let params = est.estimate(&org, &org, 0, 0, 64);
    assert!(params.is_off());
  }

  #[test]
  fn biased_reconstruction_gets_band_offsets() {
    let org = Frame {
      planes: [
        Plane::from_fn(64, 64, 0, 0, |x, _| (100 + (x & 3)) as u8),
        Plane::new(32, 32, 1, 1),
        Plane::new(32, 32, 1, 1),
      ],
      chroma_sampling: ChromaSampling::Cs420,
    };
    let mut rec = org.clone();
    rec.planes[0].data.iter_mut().for_each(|v| *v -= 3);
    let est =
      SaoEstimator { bit_depth: 8, lambda: 1., luma: true, chroma: false };
    let params = est.estimate(&org, &rec, 0, 0, 64);
    let position = match params.comps[0].kind {
      SaoType::Band { position } => position as usize,
      kind => panic!("expected band offset, got {kind:?}"),
    };
    // every window covering band 12 costs the same
    assert!((9..=12).contains(&position));
    assert_eq!(params.comps[0].offsets[12 - position], 3);

    let out = apply_sao(&rec, &[params], 64, 8);
    assert_eq!(out.planes[0], org.planes[0]);
    let before = sse(&rec.planes[0], &org.planes[0]);
    assert!(sse(&out.planes[0], &org.planes[0]) < before);
  }

  #[test]
  fn band_window_wraps() {
    let rec = Frame {
      planes: [
        Plane::from_fn(16, 16, 0, 0, |x, _| (x * 16) as u8),
        Plane::new(8, 8, 1, 1),
        Plane::new(8, 8, 1, 1),
      ],
      chroma_sampling: ChromaSampling::Cs420,
    };
    let mut params = SaoLcuParams::default();
    params.comps[0] =
      SaoOffset {
        kind: SaoType::Band { position: 30 },
        offsets: [1, 2, 3, 4],
      };
    let out = apply_sao(&rec, &[params], 16, 8);
    // band 0 is the third of the window, band 30 the first
    assert_eq!(out.planes[0].p(0, 0), 3);
    assert_eq!(out.planes[0].p(15, 0), 240 + 1);
    assert_eq!(out.planes[0].p(1, 0), 16);
  }

  #[test]
  fn edge_offsets_skip_picture_border() {
    let rec: Frame<u8> = Frame {
      planes: [
        Plane::from_fn(16, 16, 0, 0, |x, _| if x % 2 == 0 { 50 } else { 60 }),
        Plane::new(8, 8, 1, 1),
        Plane::new(8, 8, 1, 1),
      ],
      chroma_sampling: ChromaSampling::Cs420,
    };
    let mut params = SaoLcuParams::default();
    params.comps[0] =
      SaoOffset { kind: SaoType::Edge { class: 0 }, offsets: [2, 0, 0, -2] };
    let out = apply_sao(&rec, &[params], 16, 8);
    assert_eq!(out.planes[0].p(0, 3), 50);
    assert_eq!(out.planes[0].p(2, 3), 52);
    assert_eq!(out.planes[0].p(3, 3), 58);
    assert_eq!(out.planes[0].p(15, 3), 60);
  }

  #[test]
  fn merge_prefers_left() {
    let mut a = SaoLcuParams::default();
    a.comps[0].kind = SaoType::Edge { class: 1 };
    let mut b = a;
    decide_merge(&mut b, Some(&a), Some(&a));
    assert!(b.merge_left && !b.merge_up);
    decide_merge(&mut b, None, Some(&a));
    assert!(!b.merge_left && b.merge_up);
    decide_merge(&mut b, None, Some(&SaoLcuParams::default()));
    assert!(!b.merge_left && !b.merge_up);
  }
}
