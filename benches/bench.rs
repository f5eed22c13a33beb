// Copyright (c) 2024, The cuquad contributors. All rights reserved
//
// This source code is subject to the terms of the BSD 2 Clause License and
// the Alliance for Open Media Patent License 1.0. If the BSD 2 Clause License
// was not distributed with this source code in the LICENSE file, you can
// obtain it at www.aomedia.org/license/software. If the Alliance for Open
// Media Patent License 1.0 was not distributed with this source code in the
// PATENTS file, you can obtain it at www.aomedia.org/license/patent.

use criterion::*;
use cuquad::bench::*;
use cuquad::context::{CabacContexts, ContextWriter};
use cuquad::ec::{Writer, WriterCounter};
use cuquad::encoder::encode_lcu;
use cuquad::prelude::*;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaChaRng;
use std::sync::Arc;

const WIDTH: usize = 256;
const HEIGHT: usize = 128;

fn noisy_frame(ra: &mut ChaChaRng) -> Frame<u8> {
  let mut f = Frame::new(WIDTH, HEIGHT, ChromaSampling::Cs420);
  for p in &mut f.planes {
    // a smooth ramp with noise on top, closer to camera content than
    // white noise
    let w = p.cfg.width;
    for (i, v) in p.data.iter_mut().enumerate() {
      let ramp = ((i % w) + (i / w)) as i32;
      *v = (ramp / 2 + ra.gen_range(0..24)).clamp(0, 255) as u8;
    }
  }
  f
}

fn config(slice_type: SliceType, speed: usize) -> EncoderConfig {
  EncoderConfig {
    width: WIDTH,
    height: HEIGHT,
    slice_type,
    ref_count: if slice_type == SliceType::P { [1, 0] } else { [0, 0] },
    ..EncoderConfig::with_speed_preset(speed)
  }
}

fn bench_intra_picture(c: &mut Criterion) {
  let mut ra = ChaChaRng::from_seed([0; 32]);
  let input = noisy_frame(&mut ra);
  let mut group = c.benchmark_group("intra_picture");
  for speed in [4, 8] {
    let cfg = config(SliceType::I, speed);
    group.bench_with_input(BenchmarkId::from_parameter(speed), &cfg, |b, cfg| {
      b.iter(|| {
        encode_picture(cfg, input.clone(), [Vec::new(), Vec::new()], 0)
          .unwrap()
      })
    });
  }
  group.finish();
}

fn bench_inter_picture(c: &mut Criterion) {
  let mut ra = ChaChaRng::from_seed([1; 32]);
  let first = encode_picture(
    &config(SliceType::I, 8),
    noisy_frame(&mut ra),
    [Vec::new(), Vec::new()],
    0,
  )
  .unwrap();
  let reference = Arc::new(first.into_reference());
  let input = noisy_frame(&mut ra);
  let cfg = config(SliceType::P, 8);
  c.bench_function("inter_picture", |b| {
    b.iter(|| {
      let refs = [vec![reference.clone()], Vec::new()];
      encode_picture(&cfg, input.clone(), refs, 1).unwrap()
    })
  });
}

fn bench_serialize(c: &mut Criterion) {
  let mut ra = ChaChaRng::from_seed([2; 32]);
  let cfg = config(SliceType::I, 8);
  let picture =
    encode_picture(&cfg, noisy_frame(&mut ra), [Vec::new(), Vec::new()], 0)
      .unwrap();
  let fi = FrameInvariants::new(cfg, 0).unwrap();
  c.bench_function("serialize_picture", |b| {
    b.iter(|| {
      let mut cw =
        ContextWriter::new(CabacContexts::new(fi.slice_type, fi.qp));
      let mut w = WriterCounter::new();
      for addr in 0..fi.num_lcus() {
        let range = fi.segment_range(0);
        let (cu, sao) = (&picture.cu, &picture.sao);
        encode_lcu(&fi, &mut cw, &mut w, cu, sao, addr, range);
      }
      black_box(w.tell())
    })
  });
}

fn bench_satd(c: &mut Criterion) {
  let mut ra = ChaChaRng::from_seed([3; 32]);
  let prims = Primitives::<u8>::new();
  let org: Vec<u8> = (0..64 * 64).map(|_| ra.gen()).collect();
  let rec: Vec<u8> = (0..64 * 64).map(|_| ra.gen()).collect();
  let mut group = c.benchmark_group("satd");
  for size in [4usize, 8, 16, 32] {
    group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, &n| {
      b.iter(|| black_box(prims.satd(n, n, &org, 64, &rec, 64)))
    });
  }
  group.finish();
}

criterion_group!(
  benches,
  bench_intra_picture,
  bench_inter_picture,
  bench_serialize,
  bench_satd
);
criterion_main!(benches);
