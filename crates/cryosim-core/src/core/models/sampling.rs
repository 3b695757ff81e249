use ndarray::{Array1, Array2, Array3};
use std::ops::{Add, Mul};

/// Coordinates of `n` samples spaced by `spacing`, with the sample at index `n / 2`
/// sitting at the origin.
pub fn make_1d_coordinate_grid(n: usize, spacing: f64) -> Array1<f64> {
    let center = (n / 2) as f64;
    Array1::from_shape_fn(n, |i| (i as f64 - center) * spacing)
}

/// A `(ny, nx, 3)` grid of `(kx, ky, kz = 0)` frequency indices in DFT ordering,
/// used to extract central slices from a 3D spectrum.
pub fn make_frequency_slice_in_pixels(ny: usize, nx: usize) -> Array3<f64> {
    let wrap = |i: usize, n: usize| -> f64 {
        if i < n.div_ceil(2) {
            i as f64
        } else {
            i as f64 - n as f64
        }
    };
    Array3::from_shape_fn((ny, nx, 3), |(iy, ix, c)| match c {
        0 => wrap(ix, nx),
        1 => wrap(iy, ny),
        _ => 0.0,
    })
}

/// Values that can be linearly interpolated.
pub trait Interpolate: Copy + Default + Add<Output = Self> + Mul<f64, Output = Self> {}

impl<T> Interpolate for T where T: Copy + Default + Add<Output = T> + Mul<f64, Output = T> {}

fn linear_weights(coordinate: f64) -> (isize, f64) {
    let base = coordinate.floor();
    (base as isize, coordinate - base)
}

/// Trilinear interpolation at fractional `(z, y, x)` indices. Samples outside the
/// volume contribute zero.
pub fn trilinear_sample<A: Interpolate>(volume: &Array3<A>, z: f64, y: f64, x: f64) -> A {
    let (nz, ny, nx) = volume.dim();
    let (z0, tz) = linear_weights(z);
    let (y0, ty) = linear_weights(y);
    let (x0, tx) = linear_weights(x);
    let mut acc = A::default();
    for (dz, wz) in [(0, 1.0 - tz), (1, tz)] {
        let iz = z0 + dz;
        if wz == 0.0 || iz < 0 || iz >= nz as isize {
            continue;
        }
        for (dy, wy) in [(0, 1.0 - ty), (1, ty)] {
            let iy = y0 + dy;
            if wy == 0.0 || iy < 0 || iy >= ny as isize {
                continue;
            }
            for (dx, wx) in [(0, 1.0 - tx), (1, tx)] {
                let ix = x0 + dx;
                if wx == 0.0 || ix < 0 || ix >= nx as isize {
                    continue;
                }
                acc = acc + volume[[iz as usize, iy as usize, ix as usize]] * (wz * wy * wx);
            }
        }
    }
    acc
}

/// Trilinear interpolation at fractional `(z, y, x)` indices of a periodic volume,
/// as needed for a spectrum stored in DFT ordering.
pub fn trilinear_sample_periodic<A: Interpolate>(volume: &Array3<A>, z: f64, y: f64, x: f64) -> A {
    let (nz, ny, nx) = volume.dim();
    let (z0, tz) = linear_weights(z);
    let (y0, ty) = linear_weights(y);
    let (x0, tx) = linear_weights(x);
    let wrap = |i: isize, n: usize| i.rem_euclid(n as isize) as usize;
    let mut acc = A::default();
    for (dz, wz) in [(0, 1.0 - tz), (1, tz)] {
        for (dy, wy) in [(0, 1.0 - ty), (1, ty)] {
            for (dx, wx) in [(0, 1.0 - tx), (1, tx)] {
                let weight = wz * wy * wx;
                if weight == 0.0 {
                    continue;
                }
                let value = volume[[wrap(z0 + dz, nz), wrap(y0 + dy, ny), wrap(x0 + dx, nx)]];
                acc = acc + value * weight;
            }
        }
    }
    acc
}

/// Bilinear interpolation at fractional `(y, x)` indices; samples outside contribute zero.
pub fn bilinear_sample<A: Interpolate>(image: &Array2<A>, y: f64, x: f64) -> A {
    let (ny, nx) = image.dim();
    let (y0, ty) = linear_weights(y);
    let (x0, tx) = linear_weights(x);
    let mut acc = A::default();
    for (dy, wy) in [(0, 1.0 - ty), (1, ty)] {
        let iy = y0 + dy;
        if wy == 0.0 || iy < 0 || iy >= ny as isize {
            continue;
        }
        for (dx, wx) in [(0, 1.0 - tx), (1, tx)] {
            let ix = x0 + dx;
            if wx == 0.0 || ix < 0 || ix >= nx as isize {
                continue;
            }
            acc = acc + image[[iy as usize, ix as usize]] * (wy * wx);
        }
    }
    acc
}

/// Resamples a centered image with pixel size `input_spacing` onto a centered grid of
/// `output_shape` with pixel size `output_spacing`.
///
/// When the output pixels are coarser, each one is the average of bilinear samples
/// spread over its footprint, so the image is box-filtered before decimation.
pub fn rescale_image<A: Interpolate>(
    image: &Array2<A>,
    input_spacing: f64,
    output_shape: (usize, usize),
    output_spacing: f64,
) -> Array2<A> {
    let (ny_in, nx_in) = image.dim();
    let center_in = ((ny_in / 2) as f64, (nx_in / 2) as f64);
    let center_out = ((output_shape.0 / 2) as f64, (output_shape.1 / 2) as f64);
    let ratio = output_spacing / input_spacing;
    let n_sub = ratio.ceil().max(1.0) as usize;
    let offsets: Vec<f64> = (0..n_sub)
        .map(|j| ((j as f64 + 0.5) / n_sub as f64 - 0.5) * ratio)
        .collect();
    let weight = 1.0 / (n_sub * n_sub) as f64;
    Array2::from_shape_fn(output_shape, |(iy, ix)| {
        let y = (iy as f64 - center_out.0) * ratio + center_in.0;
        let x = (ix as f64 - center_out.1) * ratio + center_in.1;
        let mut acc = A::default();
        for dy in &offsets {
            for dx in &offsets {
                acc = acc + bilinear_sample(image, y + dy, x + dx);
            }
        }
        acc * weight
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use num_complex::Complex64;

    #[test]
    fn coordinate_grid_is_centered_for_even_and_odd_sizes() {
        assert_eq!(make_1d_coordinate_grid(4, 0.5).to_vec(), vec![-1.0, -0.5, 0.0, 0.5]);
        assert_eq!(make_1d_coordinate_grid(3, 2.0).to_vec(), vec![-2.0, 0.0, 2.0]);
        assert_eq!(make_1d_coordinate_grid(1, 1.0).to_vec(), vec![0.0]);
    }

    #[test]
    fn frequency_slice_follows_dft_ordering_with_zero_kz() {
        let slice = make_frequency_slice_in_pixels(4, 3);
        assert_eq!(slice[[0, 0, 0]], 0.0);
        assert_eq!(slice[[0, 2, 0]], -1.0);
        assert_eq!(slice[[2, 0, 1]], -2.0);
        assert!(slice.index_axis(ndarray::Axis(2), 2).iter().all(|&v| v == 0.0));
    }

    #[test]
    fn trilinear_sample_reproduces_grid_values_and_midpoints() {
        let volume = Array3::from_shape_fn((2, 2, 2), |(z, y, x)| (4 * z + 2 * y + x) as f64);
        assert_abs_diff_eq!(trilinear_sample(&volume, 1.0, 0.0, 1.0), 5.0, epsilon = 1e-12);
        assert_abs_diff_eq!(trilinear_sample(&volume, 0.5, 0.5, 0.5), 3.5, epsilon = 1e-12);
        assert_abs_diff_eq!(trilinear_sample(&volume, 5.0, 0.0, 0.0), 0.0, epsilon = 1e-12);
    }

    #[test]
    fn periodic_sample_wraps_negative_indices() {
        let volume = Array3::from_shape_fn((1, 1, 4), |(_, _, x)| Complex64::new(x as f64, 0.0));
        let value = trilinear_sample_periodic(&volume, 0.0, 0.0, -1.0);
        assert_abs_diff_eq!(value.re, 3.0, epsilon = 1e-12);
        let value = trilinear_sample_periodic(&volume, 0.0, 0.0, -0.5);
        assert_abs_diff_eq!(value.re, 1.5, epsilon = 1e-12);
    }

    #[test]
    fn rescale_with_equal_spacing_and_shape_is_identity() {
        let image = Array2::from_shape_fn((5, 4), |(y, x)| (y * 4 + x) as f64);
        let rescaled = rescale_image(&image, 1.2, (5, 4), 1.2);
        assert_eq!(rescaled, image);
    }

    #[test]
    fn rescale_to_coarser_pixels_conserves_mass() {
        let image = Array2::from_shape_fn((8, 8), |(y, x)| {
            if y == 4 && x == 4 { 10.0 } else { 0.0 }
        });
        let rescaled = rescale_image(&image, 1.0, (4, 4), 2.0);
        assert_abs_diff_eq!(rescaled[[2, 2]], 2.5, epsilon = 1e-12);
        assert_abs_diff_eq!(rescaled[[0, 0]], 0.0, epsilon = 1e-12);
        assert_abs_diff_eq!(rescaled.sum() * 4.0, 10.0, epsilon = 1e-12);
    }

    #[test]
    fn rescale_to_coarser_pixels_suppresses_nyquist_aliasing() {
        let checkerboard = Array2::from_shape_fn((8, 8), |(y, x)| {
            if (y + x) % 2 == 0 { 1.0 } else { -1.0 }
        });
        let rescaled = rescale_image(&checkerboard, 1.0, (4, 4), 2.0);
        for iy in 1..4 {
            for ix in 1..4 {
                assert_abs_diff_eq!(rescaled[[iy, ix]], 0.0, epsilon = 1e-12);
            }
        }
    }

    #[test]
    fn rescale_to_finer_pixels_interpolates() {
        let image = Array2::from_shape_fn((4, 4), |(_, x)| x as f64);
        let rescaled = rescale_image(&image, 1.0, (8, 8), 0.5);
        assert_abs_diff_eq!(rescaled[[4, 4]], 2.0, epsilon = 1e-12);
        assert_abs_diff_eq!(rescaled[[4, 5]], 2.5, epsilon = 1e-12);
    }
}
