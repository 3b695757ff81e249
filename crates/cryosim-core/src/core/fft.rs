//! Discrete Fourier transforms over `ndarray` arrays.
//!
//! Forward transforms are unnormalized and inverse transforms divide by the number of
//! samples, so that `ifft(fft(x)) == x` and the zero-frequency bin of a forward
//! transform holds the plain sum of the input. Images are transformed with their center
//! (index `n / 2` along each axis) moved to index `0`, so rotations and projections act
//! about the center of the box.

use ndarray::{Array, Array1, Array2, Array3, Axis, Dimension, RemoveAxis};
use num_complex::Complex64;
use rustfft::{FftDirection, FftPlanner};

/// Sample frequencies of a length-`n` transform with sample spacing `spacing`, in the
/// standard DFT ordering (non-negative frequencies first).
pub fn fftfreq(n: usize, spacing: f64) -> Array1<f64> {
    let scale = 1.0 / (n as f64 * spacing);
    let half = n.div_ceil(2);
    Array1::from_shape_fn(n, |k| {
        if k < half {
            k as f64 * scale
        } else {
            (k as f64 - n as f64) * scale
        }
    })
}

fn transform_along_axis<D>(data: &mut Array<Complex64, D>, axis: Axis, direction: FftDirection)
where
    D: Dimension,
{
    let len = data.len_of(axis);
    if len <= 1 {
        return;
    }
    let mut planner = FftPlanner::<f64>::new();
    let fft = planner.plan_fft(len, direction);
    let mut buffer = vec![Complex64::default(); len];
    let mut scratch = vec![Complex64::default(); fft.get_inplace_scratch_len()];

    for mut lane in data.lanes_mut(axis) {
        for (slot, value) in buffer.iter_mut().zip(lane.iter()) {
            *slot = *value;
        }
        fft.process_with_scratch(&mut buffer, &mut scratch);
        for (value, slot) in lane.iter_mut().zip(buffer.iter()) {
            *value = *slot;
        }
    }
}

fn transform<D: Dimension>(
    input: &Array<Complex64, D>,
    direction: FftDirection,
) -> Array<Complex64, D> {
    let mut output = input.as_standard_layout().into_owned();
    for axis in 0..output.ndim() {
        transform_along_axis(&mut output, Axis(axis), direction);
    }
    if direction == FftDirection::Inverse && !output.is_empty() {
        let norm = 1.0 / output.len() as f64;
        output.mapv_inplace(|v| v * norm);
    }
    output
}

pub fn fft2(input: &Array2<Complex64>) -> Array2<Complex64> {
    transform(input, FftDirection::Forward)
}

pub fn ifft2(input: &Array2<Complex64>) -> Array2<Complex64> {
    transform(input, FftDirection::Inverse)
}

pub fn fft3(input: &Array3<Complex64>) -> Array3<Complex64> {
    transform(input, FftDirection::Forward)
}

fn roll<A, D>(input: &Array<A, D>, axis: Axis, shift: isize) -> Array<A, D>
where
    A: Clone,
    D: Dimension + RemoveAxis,
{
    let n = input.len_of(axis);
    let mut output = input.clone();
    if n == 0 {
        return output;
    }
    for src in 0..n {
        let dst = (src as isize + shift).rem_euclid(n as isize) as usize;
        output
            .index_axis_mut(axis, dst)
            .assign(&input.index_axis(axis, src));
    }
    output
}

/// Moves the zero-frequency (or origin) sample to the center of every axis.
pub fn fftshift<A, D>(input: &Array<A, D>) -> Array<A, D>
where
    A: Clone,
    D: Dimension + RemoveAxis,
{
    (0..input.ndim()).fold(input.clone(), |acc, axis| {
        let shift = (acc.len_of(Axis(axis)) / 2) as isize;
        roll(&acc, Axis(axis), shift)
    })
}

/// Inverse of [`fftshift`]; moves the central sample of every axis to index `0`.
pub fn ifftshift<A, D>(input: &Array<A, D>) -> Array<A, D>
where
    A: Clone,
    D: Dimension + RemoveAxis,
{
    (0..input.ndim()).fold(input.clone(), |acc, axis| {
        let shift = (acc.len_of(Axis(axis)) / 2) as isize;
        roll(&acc, Axis(axis), -shift)
    })
}

/// Spectrum of a real image whose center sits at index `n / 2`.
pub fn fft2_centered(image: &Array2<f64>) -> Array2<Complex64> {
    fft2(&ifftshift(&image.mapv(|v| Complex64::new(v, 0.0))))
}

/// Spectrum of a complex image whose center sits at index `n / 2`.
pub fn fft2_centered_complex(image: &Array2<Complex64>) -> Array2<Complex64> {
    fft2(&ifftshift(image))
}

/// Inverse of [`fft2_centered_complex`]; the returned image is centered at `n / 2`.
pub fn ifft2_centered(spectrum: &Array2<Complex64>) -> Array2<Complex64> {
    fftshift(&ifft2(spectrum))
}

/// Spectrum of a real volume whose center sits at index `n / 2` along every axis.
pub fn fft3_centered(volume: &Array3<f64>) -> Array3<Complex64> {
    fft3(&ifftshift(&volume.mapv(|v| Complex64::new(v, 0.0))))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    #[test]
    fn fftfreq_matches_standard_ordering_for_even_length() {
        let freqs = fftfreq(4, 0.5);
        assert_eq!(freqs.to_vec(), vec![0.0, 0.5, -1.0, -0.5]);
    }

    #[test]
    fn fftfreq_matches_standard_ordering_for_odd_length() {
        let freqs = fftfreq(5, 1.0);
        assert_eq!(freqs.to_vec(), vec![0.0, 0.2, 0.4, -0.4, -0.2]);
    }

    #[test]
    fn fft2_of_constant_puts_sum_in_dc_bin() {
        let image = Array2::from_elem((4, 6), Complex64::new(1.0, 0.0));
        let spectrum = fft2(&image);
        assert_abs_diff_eq!(spectrum[[0, 0]].re, 24.0, epsilon = 1e-12);
        for ((i, j), value) in spectrum.indexed_iter() {
            if (i, j) != (0, 0) {
                assert_abs_diff_eq!(value.norm(), 0.0, epsilon = 1e-12);
            }
        }
    }

    #[test]
    fn ifft2_inverts_fft2() {
        let image = Array2::from_shape_fn((5, 4), |(i, j)| {
            Complex64::new((i * 3 + j) as f64, (i as f64 - j as f64) * 0.5)
        });
        let restored = ifft2(&fft2(&image));
        for (a, b) in image.iter().zip(restored.iter()) {
            assert_abs_diff_eq!((a - b).norm(), 0.0, epsilon = 1e-10);
        }
    }

    #[test]
    fn fft3_of_delta_at_origin_is_flat() {
        let mut volume = Array3::from_elem((3, 4, 2), Complex64::default());
        volume[[0, 0, 0]] = Complex64::new(1.0, 0.0);
        let spectrum = fft3(&volume);
        for value in spectrum.iter() {
            assert_abs_diff_eq!(value.re, 1.0, epsilon = 1e-12);
            assert_abs_diff_eq!(value.im, 0.0, epsilon = 1e-12);
        }
    }

    #[test]
    fn fftshift_and_ifftshift_are_inverse_for_odd_and_even_axes() {
        let input = array![[0, 1, 2], [3, 4, 5], [6, 7, 8], [9, 10, 11]];
        assert_eq!(ifftshift(&fftshift(&input)), input);
        assert_eq!(fftshift(&array![0, 1, 2, 3, 4]), array![3, 4, 0, 1, 2]);
        assert_eq!(ifftshift(&array![0, 1, 2, 3, 4]), array![2, 3, 4, 0, 1]);
    }

    #[test]
    fn centered_transform_of_central_delta_is_real_and_flat() {
        let mut image = Array2::<f64>::zeros((4, 4));
        image[[2, 2]] = 1.0;
        let spectrum = fft2_centered(&image);
        for value in spectrum.iter() {
            assert_abs_diff_eq!(value.re, 1.0, epsilon = 1e-12);
            assert_abs_diff_eq!(value.im, 0.0, epsilon = 1e-12);
        }
        let restored = ifft2_centered(&spectrum);
        assert_abs_diff_eq!(restored[[2, 2]].re, 1.0, epsilon = 1e-12);
    }
}
