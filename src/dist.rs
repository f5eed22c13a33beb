// Copyright (c) 2024, The cuquad contributors. All rights reserved
//
// This source code is subject to the terms of the BSD 2 Clause License and
// the Alliance for Open Media Patent License 1.0. If the BSD 2 Clause License
// was not distributed with this source code in the LICENSE file, you can
// obtain it at www.aomedia.org/license/software. If the Alliance for Open
// Media Patent License 1.0 was not distributed with this source code in the
// PATENTS file, you can obtain it at www.aomedia.org/license/patent.

pub use self::native::*;

mod native {
  use crate::util::*;

  #[inline(always)]
  fn rows<'a, T: Pixel>(
    org: &'a [T], org_stride: usize, rec: &'a [T], rec_stride: usize,
    w: usize, h: usize,
  ) -> impl Iterator<Item = (&'a [T], &'a [T])> {
    (0..h).map(move |r| {
      (&org[r * org_stride..][..w], &rec[r * rec_stride..][..w])
    })
  }

  /// Sum of absolute differences
  pub fn get_sad<T: Pixel>(
    org: &[T], org_stride: usize, rec: &[T], rec_stride: usize, w: usize,
    h: usize,
  ) -> u32 {
    rows(org, org_stride, rec, rec_stride, w, h)
      .map(|(a, b)| {
        a.iter()
          .zip(b)
          .map(|(&a, &b)| (a.to_i32() - b.to_i32()).unsigned_abs())
          .sum::<u32>()
      })
      .sum()
  }

  /// Sum of squared errors
  pub fn get_sse<T: Pixel>(
    org: &[T], org_stride: usize, rec: &[T], rec_stride: usize, w: usize,
    h: usize,
  ) -> u64 {
    rows(org, org_stride, rec, rec_stride, w, h)
      .map(|(a, b)| {
        a.iter()
          .zip(b)
          .map(|(&a, &b)| {
            let d = (a.to_i32() - b.to_i32()) as i64;
            (d * d) as u64
          })
          .sum::<u64>()
      })
      .sum()
  }

  #[inline(always)]
  fn butterfly(a: i32, b: i32) -> (i32, i32) {
    ((a + b), (a - b))
  }

  #[inline(always)]
  #[allow(clippy::identity_op, clippy::erasing_op)]
  fn hadamard4_1d(data: &mut [i32], n: usize, stride0: usize, stride1: usize) {
    for i in 0..n {
      let sub: &mut [i32] = &mut data[i * stride0..];
      let (a0, a1) = butterfly(sub[0 * stride1], sub[1 * stride1]);
      let (a2, a3) = butterfly(sub[2 * stride1], sub[3 * stride1]);
      let (b0, b2) = butterfly(a0, a2);
      let (b1, b3) = butterfly(a1, a3);
      sub[0 * stride1] = b0;
      sub[1 * stride1] = b1;
      sub[2 * stride1] = b2;
      sub[3 * stride1] = b3;
    }
  }

  #[inline(always)]
  #[allow(clippy::identity_op, clippy::erasing_op)]
  fn hadamard8_1d(data: &mut [i32], n: usize, stride0: usize, stride1: usize) {
    for i in 0..n {
      let sub: &mut [i32] = &mut data[i * stride0..];
      let v: [i32; 8] = std::array::from_fn(|k| sub[k * stride1]);
      let (a0, a1) = butterfly(v[0], v[1]);
      let (a2, a3) = butterfly(v[2], v[3]);
      let (a4, a5) = butterfly(v[4], v[5]);
      let (a6, a7) = butterfly(v[6], v[7]);
      let (b0, b2) = butterfly(a0, a2);
      let (b1, b3) = butterfly(a1, a3);
      let (b4, b6) = butterfly(a4, a6);
      let (b5, b7) = butterfly(a5, a7);
      let out = [
        b0 + b4,
        b1 + b5,
        b2 + b6,
        b3 + b7,
        b0 - b4,
        b1 - b5,
        b2 - b6,
        b3 - b7,
      ];
      for (k, o) in out.into_iter().enumerate() {
        sub[k * stride1] = o;
      }
    }
  }

  fn hadamard2d(data: &mut [i32], size: usize) {
    let transform = if size == 4 { hadamard4_1d } else { hadamard8_1d };
    // columns, then rows
    transform(data, size, 1, size);
    transform(data, size, size, 1);
  }

  /// Sum of absolute transformed differences over 4x4 or 8x8 Hadamard
  /// transforms. Blocks with a 4 sample side use 4x4.
  pub fn get_satd<T: Pixel>(
    org: &[T], org_stride: usize, rec: &[T], rec_stride: usize, w: usize,
    h: usize,
  ) -> u32 {
    let size = w.min(h).min(8);
    let mut sum = 0u64;
    let mut buf = [0i32; 64];

    for chunk_y in (0..h).step_by(size) {
      for chunk_x in (0..w).step_by(size) {
        let buf = &mut buf[..size * size];
        for r in 0..size {
          let a = &org[(chunk_y + r) * org_stride + chunk_x..][..size];
          let b = &rec[(chunk_y + r) * rec_stride + chunk_x..][..size];
          for (c, (&a, &b)) in a.iter().zip(b).enumerate() {
            buf[r * size + c] = a.to_i32() - b.to_i32();
          }
        }
        hadamard2d(buf, size);
        sum += buf.iter().map(|a| a.unsigned_abs() as u64).sum::<u64>();
      }
    }

    // Normalize the results
    let ln = msb(size as i32) as u64;
    ((sum + (1 << ln >> 1)) >> ln) as u32
  }

  pub fn sad_wxh<T: Pixel, const W: usize, const H: usize>(
    org: &[T], org_stride: usize, rec: &[T], rec_stride: usize,
  ) -> u32 {
    get_sad(org, org_stride, rec, rec_stride, W, H)
  }

  pub fn satd_wxh<T: Pixel, const W: usize, const H: usize>(
    org: &[T], org_stride: usize, rec: &[T], rec_stride: usize,
  ) -> u32 {
    get_satd(org, org_stride, rec, rec_stride, W, H)
  }

  pub fn sse_wxh<T: Pixel, const W: usize, const H: usize>(
    org: &[T], org_stride: usize, rec: &[T], rec_stride: usize,
  ) -> u64 {
    get_sse(org, org_stride, rec, rec_stride, W, H)
  }
}

#[cfg(test)]
pub mod test {
  use super::*;
  use crate::frame::*;
  use crate::util::Pixel;

  // Two planes whose difference is a diagonal pattern
  fn setup_planes<T: Pixel>() -> (Plane<T>, Plane<T>) {
    let input =
      Plane::from_fn(128, 128, 0, 0, |x, y| T::cast_from((x + y) & 255));
    let rec = Plane::from_fn(128, 128, 0, 0, |x, y| {
      T::cast_from((x as isize - y as isize) as usize & 255)
    });
    (input, rec)
  }

  fn reference_sad<T: Pixel>(
    a: &Plane<T>, b: &Plane<T>, x: usize, y: usize, w: usize, h: usize,
  ) -> u32 {
    let mut sum = 0;
    for r in y..y + h {
      for c in x..x + w {
        sum += (a.p(c, r).to_i32() - b.p(c, r).to_i32()).unsigned_abs();
      }
    }
    sum
  }

  fn get_sad_same_inner<T: Pixel>() {
    let (input, rec) = setup_planes::<T>();
    let po = PlaneOffset { x: 32, y: 40 };
    for &(w, h) in &[(4, 4), (8, 4), (4, 8), (16, 16), (32, 16), (64, 64)] {
      assert_eq!(
        get_sad(input.slice(po), 128, rec.slice(po), 128, w, h),
        reference_sad(&input, &rec, 32, 40, w, h)
      );
    }
  }

  #[test]
  fn get_sad_same_u8() {
    get_sad_same_inner::<u8>();
  }

  #[test]
  fn get_sad_same_u16() {
    get_sad_same_inner::<u16>();
  }

  #[test]
  fn satd_of_flat_difference_is_dc_only() {
    let a = Plane::<u8>::from_fn(8, 8, 0, 0, |_, _| 20);
    let b = Plane::<u8>::from_fn(8, 8, 0, 0, |_, _| 10);
    // 4x4 DC term: 16 * 10, normalized by 4
    assert_eq!(get_satd(&a.data, 8, &b.data, 8, 4, 4), 40);
    // 8x8 DC term: 64 * 10, normalized by 8
    assert_eq!(get_satd(&a.data, 8, &b.data, 8, 8, 8), 80);
    assert_eq!(get_sse(&a.data, 8, &b.data, 8, 8, 8), 6400);
    assert_eq!(sad_wxh::<u8, 8, 4>(&a.data, 8, &b.data, 8), 320);
    assert_eq!(satd_wxh::<u8, 4, 4>(&a.data, 8, &a.data, 8), 0);
    assert_eq!(sse_wxh::<u8, 4, 8>(&a.data, 8, &b.data, 8), 3200);
  }
}
