use crate::spectrum::AnalysisError;
use rustfft::{FftPlanner, num_complex::Complex};
use std::f32::consts::PI;

/// Added to the squared magnitude before taking the log
pub const DB_EPSILON: f32 = 1.0e-12;

const TUKEY_ALPHA: f32 = 0.25;

#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Debug, Default)]
pub enum WindowType {
    #[default]
    Tukey,
    Hann,
    Hamming,
    Rectangular,
}

#[derive(Copy, Clone, PartialEq, Eq, Debug, Default)]
pub enum Scaling {
    /// |X[k]| of the windowed segment
    Magnitude,
    /// sqrt of the one-sided power spectral density, V/sqrt(Hz)
    #[default]
    Density,
}

/// Parameters of the sliding-window transform
#[derive(Debug, Clone, Copy)]
pub struct SpectrogramParams {
    pub sample_rate: f64,
    pub segment_len: usize,
    pub overlap: usize,
    pub window_type: WindowType,
    pub scaling: Scaling,
}

impl SpectrogramParams {
    pub fn new(sample_rate: f64, segment_len: usize, overlap: usize) -> Self {
        Self {
            sample_rate,
            segment_len,
            overlap,
            window_type: WindowType::default(),
            scaling: Scaling::default(),
        }
    }

    /// Distance between the starts of two consecutive segments
    pub fn step(&self) -> usize {
        self.segment_len - self.overlap
    }

    pub fn num_bins(&self) -> usize {
        self.segment_len / 2 + 1
    }

    pub fn num_segments(&self, buffer_len: usize) -> usize {
        if buffer_len < self.segment_len || self.segment_len == 0 || self.overlap >= self.segment_len {
            0
        } else {
            (buffer_len - self.segment_len) / self.step() + 1
        }
    }

    pub fn validate(&self, buffer_len: usize) -> Result<(), AnalysisError> {
        if !(self.sample_rate.is_finite() && self.sample_rate > 0.0) {
            return Err(AnalysisError::InvalidSampleRate(self.sample_rate));
        }
        if self.segment_len == 0 || self.overlap >= self.segment_len || buffer_len < self.segment_len {
            return Err(AnalysisError::InvalidSegment {
                segment: self.segment_len,
                overlap: self.overlap,
                buffer: buffer_len,
            });
        }
        Ok(())
    }
}

/// Time-frequency magnitude grid
///
/// Stored column-major: `data[segment][bin]`, so one column is the spectrum of
/// one segment. Row `k` corresponds to `frequencies[k]`.
#[derive(Debug, Clone, PartialEq)]
pub struct SpectrogramData {
    pub data: Vec<Vec<f32>>,
    pub frequencies: Vec<f64>,
    pub times: Vec<f64>,
    pub sample_rate: f64,
    pub n_fft: usize,
}

impl SpectrogramData {
    pub fn num_rows(&self) -> usize {
        self.frequencies.len()
    }

    pub fn num_columns(&self) -> usize {
        self.data.len()
    }

    pub fn get(&self, row: usize, column: usize) -> Option<f32> {
        self.data.get(column).and_then(|col| col.get(row)).copied()
    }

    /// Row whose centre frequency is closest to `frequency`
    pub fn nearest_row(&self, frequency: f64) -> Option<usize> {
        self.frequencies
            .iter()
            .enumerate()
            .min_by(|(_, a), (_, b)| (*a - frequency).abs().total_cmp(&(*b - frequency).abs()))
            .map(|(i, _)| i)
    }

    /// Row holding the largest value of a column
    pub fn ridge_row(&self, column: usize) -> Option<usize> {
        let col = self.data.get(column)?;
        col.iter()
            .enumerate()
            .max_by(|(_, a), (_, b)| a.total_cmp(b))
            .map(|(i, _)| i)
    }

    /// Every cell as `10 * log10(m^2 + eps)`
    pub fn to_db(&self) -> Vec<Vec<f32>> {
        self.data
            .iter()
            .map(|col| col.iter().map(|&m| 10.0 * (m * m + DB_EPSILON).log10()).collect())
            .collect()
    }
}

/// Splits `samples` into overlapping segments and transforms each of them.
/// Nothing is cached between calls.
pub fn calculate_spectrogram(
    samples: &[f32],
    params: &SpectrogramParams,
) -> Result<SpectrogramData, AnalysisError> {
    params.validate(samples.len())?;

    let n_fft = params.segment_len;
    let window = make_window(params.window_type, n_fft);
    let num_bins = params.num_bins();
    let fs = params.sample_rate;

    let mut planner = FftPlanner::<f32>::new();
    let fft = planner.plan_fft_forward(n_fft);

    let total_frames = params.num_segments(samples.len());
    let mut spectrogram_data: Vec<Vec<f32>> = Vec::with_capacity(total_frames);
    let mut times = Vec::with_capacity(total_frames);

    let window_power: f32 = window.iter().map(|w| w * w).sum();
    let density_scale = 1.0 / (fs as f32 * window_power);

    let mut frame_buffer = vec![Complex::new(0.0, 0.0); n_fft];

    for i in 0..total_frames {
        let start = i * params.step();
        let segment = &samples[start..start + n_fft];

        // Constant detrend, then window
        let mean = segment.iter().sum::<f32>() / n_fft as f32;
        for (j, slot) in frame_buffer.iter_mut().enumerate() {
            *slot = Complex::new((segment[j] - mean) * window[j], 0.0);
        }

        fft.process(&mut frame_buffer);

        let column: Vec<f32> = frame_buffer[..num_bins]
            .iter()
            .enumerate()
            .map(|(k, x)| match params.scaling {
                Scaling::Magnitude => x.norm(),
                Scaling::Density => {
                    // DC and (for even sizes) Nyquist appear once in the one-sided spectrum
                    let doubled = k != 0 && !(n_fft % 2 == 0 && k == n_fft / 2);
                    let factor = if doubled { 2.0 } else { 1.0 };
                    (x.norm_sqr() * density_scale * factor).sqrt()
                }
            })
            .collect();

        spectrogram_data.push(column);
        times.push((start as f64 + n_fft as f64 / 2.0) / fs);
    }

    let frequencies = (0..num_bins).map(|k| k as f64 * fs / n_fft as f64).collect();

    log::debug!(
        "spectrogram: {} samples -> {} bins x {} segments",
        samples.len(),
        num_bins,
        total_frames
    );

    Ok(SpectrogramData {
        data: spectrogram_data,
        frequencies,
        times,
        sample_rate: fs,
        n_fft,
    })
}

/// Periodic window of the given type, as used for spectral analysis
pub fn make_window(window_type: WindowType, size: usize) -> Vec<f32> {
    if size == 1 {
        return vec![1.0];
    }
    match window_type {
        WindowType::Tukey => tukey_window(size, TUKEY_ALPHA),
        WindowType::Hann => hann_window(size),
        WindowType::Hamming => hamming_window(size),
        WindowType::Rectangular => vec![1.0; size],
    }
}

/// Window function Hann
fn hann_window(size: usize) -> Vec<f32> {
    let mut window = Vec::with_capacity(size);
    for i in 0..size {
        let val = 0.5 * (1.0 - (2.0 * PI * i as f32 / size as f32).cos());
        window.push(val);
    }
    window
}

/// Window function Hamming
fn hamming_window(size: usize) -> Vec<f32> {
    let mut window = Vec::with_capacity(size);
    for i in 0..size {
        let val = 0.54 - 0.46 * (2.0 * PI * i as f32 / size as f32).cos();
        window.push(val);
    }
    window
}

/// Tapered cosine: flat top, cosine ramps covering `alpha` of the window
fn tukey_window(size: usize, alpha: f32) -> Vec<f32> {
    let mut window = Vec::with_capacity(size);
    for i in 0..size {
        let x = i as f32 / size as f32;
        let val = if x < alpha / 2.0 {
            0.5 * (1.0 + (PI * (2.0 * x / alpha - 1.0)).cos())
        } else if x <= 1.0 - alpha / 2.0 {
            1.0
        } else {
            0.5 * (1.0 + (PI * (2.0 * x / alpha - 2.0 / alpha + 1.0)).cos())
        };
        window.push(val);
    }
    window
}
