//! Binary masks: dense boolean grids plus the COCO RLE codecs needed to read
//! them out of annotation files.
//!
//! RLE is column-major (pixel `(x, y)` is run position `y + h * x`) while
//! [`Mask`] is row-major, which is the layout every measure works in.

use crate::types::Rle;

/// A dense row-major binary mask.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mask {
    height: u32,
    width: u32,
    data: Vec<bool>,
}

impl Mask {
    /// An all-background mask.
    pub fn zeros(height: u32, width: u32) -> Self {
        Mask {
            height,
            width,
            data: vec![false; height as usize * width as usize],
        }
    }

    /// Build a mask by evaluating `f(y, x)` for every pixel.
    pub fn from_fn(height: u32, width: u32, mut f: impl FnMut(usize, usize) -> bool) -> Self {
        let (h, w) = (height as usize, width as usize);
        let mut data = Vec::with_capacity(h * w);
        for y in 0..h {
            for x in 0..w {
                data.push(f(y, x));
            }
        }
        Mask {
            height,
            width,
            data,
        }
    }

    /// Decode a column-major RLE.
    pub fn from_rle(rle: &Rle) -> Self {
        let h = rle.h as usize;
        let n = h * rle.w as usize;
        let mut mask = Mask::zeros(rle.h, rle.w);
        let mut pos = 0usize;
        for (i, &run) in rle.counts.iter().enumerate() {
            let end = (pos + run as usize).min(n);
            if i % 2 == 1 {
                for p in pos..end {
                    let (x, y) = (p / h, p % h);
                    mask.data[y * mask.width as usize + x] = true;
                }
            }
            pos = end;
            if pos >= n {
                break;
            }
        }
        mask
    }

    /// Rasterise a `[x, y, w, h]` box, clamped to the mask bounds.
    pub fn from_bbox(bb: &[f64; 4], height: u32, width: u32) -> Self {
        let x0 = bb[0].max(0.0).floor() as usize;
        let y0 = bb[1].max(0.0).floor() as usize;
        let x1 = ((bb[0] + bb[2]).ceil().max(0.0) as usize).min(width as usize);
        let y1 = ((bb[1] + bb[3]).ceil().max(0.0) as usize).min(height as usize);
        Mask::from_fn(height, width, |y, x| (y0..y1).contains(&y) && (x0..x1).contains(&x))
    }

    /// Encode into a column-major RLE.
    pub fn to_rle(&self) -> Rle {
        let (h, w) = (self.height as usize, self.width as usize);
        let mut counts = Vec::new();
        let mut current = false;
        let mut run = 0u32;
        for x in 0..w {
            for y in 0..h {
                let v = self.data[y * w + x];
                if v != current {
                    counts.push(run);
                    run = 0;
                    current = v;
                }
                run += 1;
            }
        }
        counts.push(run);
        Rle {
            h: self.height,
            w: self.width,
            counts,
        }
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    /// `(height, width)`.
    pub fn shape(&self) -> (u32, u32) {
        (self.height, self.width)
    }

    pub fn get(&self, y: usize, x: usize) -> bool {
        self.data[y * self.width as usize + x]
    }

    pub fn set(&mut self, y: usize, x: usize, value: bool) {
        let w = self.width as usize;
        self.data[y * w + x] = value;
    }

    /// Row-major pixel buffer.
    pub fn as_slice(&self) -> &[bool] {
        &self.data
    }

    /// Number of foreground pixels.
    pub fn count(&self) -> u64 {
        self.data.iter().filter(|&&v| v).count() as u64
    }

    /// Number of pixels set in both masks. Masks must share a shape.
    pub fn intersection_count(&self, other: &Mask) -> u64 {
        self.data
            .iter()
            .zip(&other.data)
            .filter(|(&a, &b)| a && b)
            .count() as u64
    }

    /// Number of pixels set in either mask. Masks must share a shape.
    pub fn union_count(&self, other: &Mask) -> u64 {
        self.data
            .iter()
            .zip(&other.data)
            .filter(|(&a, &b)| a || b)
            .count() as u64
    }

    /// In-place union with a mask of the same shape.
    pub fn union_with(&mut self, other: &Mask) {
        for (a, &b) in self.data.iter_mut().zip(&other.data) {
            *a |= b;
        }
    }

    /// Tight `[x, y, w, h]` box around the foreground, all zeros when empty.
    pub fn bbox(&self) -> [f64; 4] {
        let w = self.width as usize;
        let mut extent: Option<(usize, usize, usize, usize)> = None;
        for (i, _) in self.data.iter().enumerate().filter(|(_, &v)| v) {
            let (y, x) = (i / w, i % w);
            extent = Some(match extent {
                None => (x, y, x, y),
                Some((x0, y0, x1, y1)) => (x0.min(x), y0.min(y), x1.max(x), y1.max(y)),
            });
        }
        match extent {
            Some((x0, y0, x1, y1)) => [
                x0 as f64,
                y0 as f64,
                (x1 - x0 + 1) as f64,
                (y1 - y0 + 1) as f64,
            ],
            None => [0.0; 4],
        }
    }
}

impl AsRef<Mask> for Mask {
    fn as_ref(&self) -> &Mask {
        self
    }
}

/// Foreground pixel count of an RLE (sum of odd-indexed runs).
pub fn area(rle: &Rle) -> u64 {
    rle.counts.iter().skip(1).step_by(2).map(|&c| c as u64).sum()
}

/// Pack RLE counts into the COCO ASCII string format (`rleToString` in maskApi.c).
///
/// From the fourth run on, each count is stored as the difference to the run
/// two places earlier. Values are written as sign-extended 5-bit groups with a
/// continuation bit, offset into printable ASCII by 48.
pub fn rle_to_string(rle: &Rle) -> String {
    let mut s = String::new();
    for (i, &count) in rle.counts.iter().enumerate() {
        let mut x = count as i64;
        if i > 2 {
            x -= rle.counts[i - 2] as i64;
        }
        loop {
            let mut c = (x & 0x1f) as u8;
            x >>= 5;
            let more = if c & 0x10 != 0 { x != -1 } else { x != 0 };
            if more {
                c |= 0x20;
            }
            s.push((c + 48) as char);
            if !more {
                break;
            }
        }
    }
    s
}

/// Unpack the COCO ASCII string format (`rleFrString` in maskApi.c).
///
/// Returns `None` for strings that do not decode to valid run lengths: a
/// count spanning more than 12 characters, or a count outside `u32`.
pub fn rle_from_string(s: &str, h: u32, w: u32) -> Option<Rle> {
    const MAX_SHIFT: u32 = 60;
    let bytes = s.as_bytes();
    let mut counts: Vec<u32> = Vec::new();
    let mut i = 0;
    while i < bytes.len() {
        let mut x = 0i64;
        let mut shift = 0u32;
        loop {
            if shift >= MAX_SHIFT {
                return None;
            }
            let c = bytes[i].wrapping_sub(48) as i64;
            i += 1;
            x |= (c & 0x1f) << shift;
            shift += 5;
            if c & 0x20 == 0 || i >= bytes.len() {
                break;
            }
        }
        if x & (1 << (shift - 1)) != 0 {
            x |= !0i64 << shift;
        }
        if counts.len() > 2 {
            x += counts[counts.len() - 2] as i64;
        }
        counts.push(u32::try_from(x).ok()?);
    }
    Some(Rle { h, w, counts })
}

/// Rasterise one polygon `[x0, y0, x1, y1, ...]` to RLE.
///
/// Bit-compatible with `rleFrPoly` from maskApi.c: vertices are upsampled 5x,
/// edges walked densely, and only the crossings of pixel-column centres are
/// kept as run boundaries.
pub fn fr_poly(xy: &[f64], h: u32, w: u32) -> Rle {
    if xy.len() / 2 < 3 {
        return Rle {
            h,
            w,
            counts: vec![h * w],
        };
    }
    let (u, v) = walk_polygon_edges(xy);
    let crossings = column_crossings(&u, &v, h, w);
    Rle {
        h,
        w,
        counts: counts_from_crossings(crossings, h, w),
    }
}

const POLY_SCALE: f64 = 5.0;

// Dense boundary points of the upsampled, closed polygon.
fn walk_polygon_edges(xy: &[f64]) -> (Vec<i32>, Vec<i32>) {
    let k = xy.len() / 2;
    let mut xs: Vec<i32> = (0..k)
        .map(|j| (POLY_SCALE * xy[2 * j] + 0.5) as i32)
        .collect();
    let mut ys: Vec<i32> = (0..k)
        .map(|j| (POLY_SCALE * xy[2 * j + 1] + 0.5) as i32)
        .collect();
    xs.push(xs[0]);
    ys.push(ys[0]);

    let mut u = Vec::new();
    let mut v = Vec::new();
    for j in 0..k {
        let (mut x0, mut x1, mut y0, mut y1) = (xs[j], xs[j + 1], ys[j], ys[j + 1]);
        let dx = (x1 - x0).abs();
        let dy = (y0 - y1).abs();
        let flip = (dx >= dy && x0 > x1) || (dx < dy && y0 > y1);
        if flip {
            std::mem::swap(&mut x0, &mut x1);
            std::mem::swap(&mut y0, &mut y1);
        }
        if dx >= dy {
            let slope = if dx == 0 {
                0.0
            } else {
                (y1 - y0) as f64 / dx as f64
            };
            for d in 0..=dx {
                let t = if flip { dx - d } else { d };
                u.push(t + x0);
                v.push((y0 as f64 + slope * t as f64 + 0.5) as i32);
            }
        } else {
            let slope = (x1 - x0) as f64 / dy as f64;
            for d in 0..=dy {
                let t = if flip { dy - d } else { d };
                v.push(t + y0);
                u.push((x0 as f64 + slope * t as f64 + 0.5) as i32);
            }
        }
    }
    (u, v)
}

// Downsampled (column, row) points where the boundary crosses a column centre.
fn column_crossings(u: &[i32], v: &[i32], h: u32, w: u32) -> Vec<(u32, u32)> {
    let mut out = Vec::with_capacity(u.len());
    for j in 1..u.len() {
        if u[j] == u[j - 1] {
            continue;
        }
        let xr = if u[j] < u[j - 1] { u[j] } else { u[j] - 1 };
        let xd = (xr as f64 + 0.5) / POLY_SCALE - 0.5;
        if xd != xd.floor() || xd < 0.0 || xd > (w as f64 - 1.0) {
            continue;
        }
        let yr = v[j].min(v[j - 1]);
        let yd = ((yr as f64 + 0.5) / POLY_SCALE - 0.5).clamp(0.0, h as f64).ceil();
        out.push((xd as u32, yd as u32));
    }
    out
}

// Sorted crossing positions become run lengths; zero-length runs are folded
// into their neighbours so the parity of the runs is preserved.
fn counts_from_crossings(crossings: Vec<(u32, u32)>, h: u32, w: u32) -> Vec<u32> {
    let mut positions: Vec<u32> = crossings.into_iter().map(|(x, y)| x * h + y).collect();
    positions.push(h * w);
    positions.sort_unstable();

    let mut prev = 0u32;
    let deltas: Vec<u32> = positions
        .into_iter()
        .map(|p| {
            let d = p - prev;
            prev = p;
            d
        })
        .collect();

    let mut counts = Vec::with_capacity(deltas.len());
    let mut it = deltas.into_iter();
    if let Some(first) = it.next() {
        counts.push(first);
    }
    while let Some(d) = it.next() {
        if d > 0 {
            counts.push(d);
        } else if let Some(next) = it.next() {
            if let Some(last) = counts.last_mut() {
                *last += next;
            }
        }
    }
    counts
}

/// Rasterise every polygon of one object and take their union.
pub fn fr_polys(polygons: &[Vec<f64>], h: u32, w: u32) -> Mask {
    let mut mask = Mask::zeros(h, w);
    for poly in polygons {
        mask.union_with(&Mask::from_rle(&fr_poly(poly, h, w)));
    }
    mask
}
