use crate::synth::Signal;
use rustfft::{FftPlanner, num_complex::Complex};
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum AnalysisError {
    #[error("cannot transform an empty buffer")]
    EmptySignal,
    #[error("sample rate must be positive, got {0}")]
    InvalidSampleRate(f64),
    #[error("invalid segmentation: segment {segment}, overlap {overlap}, buffer {buffer}")]
    InvalidSegment { segment: usize, overlap: usize, buffer: usize },
}

/// How FFT magnitudes are reported
#[derive(Copy, Clone, PartialEq, Eq, Debug, Default)]
pub enum MagnitudeScale {
    /// |X[k]|
    #[default]
    Raw,
    /// |X[k]| / L, comparable across buffer lengths
    PerSample,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpectrumBin {
    pub frequency: f64,
    pub magnitude: f32,
}

/// One-sided magnitude spectrum of a full buffer
#[derive(Debug, Clone, PartialEq)]
pub struct Spectrum {
    bins: Vec<SpectrumBin>,
    bin_width: f64,
}

impl Spectrum {
    pub fn len(&self) -> usize {
        self.bins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bins.is_empty()
    }

    /// Frequency resolution, sample_rate / buffer length
    pub fn bin_width(&self) -> f64 {
        self.bin_width
    }

    /// Bin with the largest magnitude, first one on ties
    pub fn peak(&self) -> Option<SpectrumBin> {
        self.bins.iter().copied().fold(None, |best, bin| match best {
            Some(b) if b.magnitude >= bin.magnitude => Some(b),
            _ => Some(bin),
        })
    }

    /// Bins at or below `max_hz`
    pub fn up_to(&self, max_hz: f64) -> &[SpectrumBin] {
        let end = self.bins.partition_point(|b| b.frequency <= max_hz);
        &self.bins[..end]
    }
}

/// Sample frequencies of an `n`-point DFT in the usual order:
/// `0, 1, ..., ceil(n/2)-1` bins positive, the rest negative.
pub fn fft_frequencies(n: usize, sample_rate: f64) -> Vec<f64> {
    let step = sample_rate / n as f64;
    let positive = n.div_ceil(2);
    (0..n)
        .map(|k| {
            if k < positive {
                k as f64 * step
            } else {
                -((n - k) as f64) * step
            }
        })
        .collect()
}

/// Full-buffer forward FFT, keeping the first floor(L/2) bins
pub fn analyze(signal: &Signal, scale: MagnitudeScale) -> Result<Spectrum, AnalysisError> {
    analyze_samples(signal.samples(), signal.sample_rate(), scale)
}

pub fn analyze_samples(
    samples: &[f32],
    sample_rate: f64,
    scale: MagnitudeScale,
) -> Result<Spectrum, AnalysisError> {
    if samples.is_empty() {
        return Err(AnalysisError::EmptySignal);
    }
    if !(sample_rate.is_finite() && sample_rate > 0.0) {
        return Err(AnalysisError::InvalidSampleRate(sample_rate));
    }

    let len = samples.len();
    let mut buffer: Vec<Complex<f32>> = samples.iter().map(|&s| Complex::new(s, 0.0)).collect();

    let mut planner = FftPlanner::<f32>::new();
    let fft = planner.plan_fft_forward(len);
    fft.process(&mut buffer);

    let divisor = match scale {
        MagnitudeScale::Raw => 1.0,
        MagnitudeScale::PerSample => len as f32,
    };

    let half = len / 2;
    let frequencies = fft_frequencies(len, sample_rate);
    let bins = frequencies
        .into_iter()
        .zip(buffer.iter())
        .take(half)
        .map(|(frequency, x)| SpectrumBin { frequency, magnitude: x.norm() / divisor })
        .collect();

    log::debug!("fft of {} samples, {} bins kept", len, half);
    Ok(Spectrum { bins, bin_width: sample_rate / len as f64 })
}
