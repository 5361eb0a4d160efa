use std::f64::consts::PI;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum SynthError {
    #[error("sample rate must be a positive finite number, got {0}")]
    InvalidSampleRate(f64),
    #[error("duration must be a positive finite number, got {0}")]
    InvalidDuration(f64),
    #[error("tone {index} has a non-finite frequency or amplitude")]
    NonFiniteTone { index: usize },
    #[error("{frequencies} frequencies but {amplitudes} amplitudes")]
    LengthMismatch { frequencies: usize, amplitudes: usize },
    #[error("cannot parse tone '{0}', expected FREQ:AMP")]
    BadTone(String),
}

/// One sinusoidal component: frequency in Hz and a relative weight
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Tone {
    pub frequency: f64,
    pub amplitude: f64,
}

impl Tone {
    pub const fn new(frequency: f64, amplitude: f64) -> Self {
        Self { frequency, amplitude }
    }
}

impl FromStr for Tone {
    type Err = SynthError;

    /// Parses `440:0.4`. A bare frequency gets amplitude 1.0.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bad = || SynthError::BadTone(s.to_string());
        let mut parts = s.trim().split(':');
        let frequency = parts.next().ok_or_else(bad)?.trim().parse().map_err(|_| bad())?;
        let amplitude = match parts.next() {
            Some(a) => a.trim().parse().map_err(|_| bad())?,
            None => 1.0,
        };
        if parts.next().is_some() {
            return Err(bad());
        }
        Ok(Tone::new(frequency, amplitude))
    }
}

/// Ordered list of tones summed by the synthesizer
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ToneSpec {
    tones: Vec<Tone>,
}

impl ToneSpec {
    pub fn new(tones: Vec<Tone>) -> Self {
        Self { tones }
    }

    pub fn single(frequency: f64, amplitude: f64) -> Self {
        Self::new(vec![Tone::new(frequency, amplitude)])
    }

    /// Zips parallel frequency and amplitude lists, which must have equal length
    pub fn from_parallel(frequencies: &[f64], amplitudes: &[f64]) -> Result<Self, SynthError> {
        if frequencies.len() != amplitudes.len() {
            return Err(SynthError::LengthMismatch {
                frequencies: frequencies.len(),
                amplitudes: amplitudes.len(),
            });
        }
        Ok(Self::new(
            frequencies.iter().zip(amplitudes).map(|(&f, &a)| Tone::new(f, a)).collect(),
        ))
    }

    pub fn tones(&self) -> &[Tone] {
        &self.tones
    }

    pub fn is_empty(&self) -> bool {
        self.tones.is_empty()
    }

    pub fn frequencies(&self) -> Vec<f64> {
        self.tones.iter().map(|t| t.frequency).collect()
    }

    /// Instantaneous (unnormalized) value of the tone sum at time `t`
    pub fn value_at(&self, t: f64) -> f64 {
        self.tones
            .iter()
            .map(|tone| tone.amplitude * (2.0 * PI * tone.frequency * t).sin())
            .sum()
    }

    /// Same tones with the largest |amplitude| scaled to 1.0
    fn scaled_to_unit_weight(&self) -> ToneSpec {
        let max = self.tones.iter().fold(0.0f64, |m, t| m.max(t.amplitude.abs()));
        if max == 0.0 {
            return self.clone();
        }
        ToneSpec::new(
            self.tones
                .iter()
                .map(|t| Tone::new(t.frequency, t.amplitude / max))
                .collect(),
        )
    }

    fn validate(&self) -> Result<(), SynthError> {
        match self
            .tones
            .iter()
            .position(|t| !t.frequency.is_finite() || !t.amplitude.is_finite())
        {
            Some(index) => Err(SynthError::NonFiniteTone { index }),
            None => Ok(()),
        }
    }
}

#[derive(Copy, Clone, PartialEq, Eq, Debug, Default)]
pub enum Normalization {
    /// Divide by the peak absolute value so the output peaks at exactly 1.0
    #[default]
    Peak,
    /// Keep the literal amplitudes
    Literal,
}

#[derive(Debug, Clone, Copy)]
pub struct SynthParams {
    pub sample_rate: f64,
    pub duration: f64,
    pub normalization: Normalization,
}

impl SynthParams {
    pub fn new(sample_rate: f64, duration: f64) -> Self {
        Self { sample_rate, duration, normalization: Normalization::Peak }
    }

    pub fn validate(&self) -> Result<(), SynthError> {
        if !(self.sample_rate.is_finite() && self.sample_rate > 0.0) {
            return Err(SynthError::InvalidSampleRate(self.sample_rate));
        }
        if !(self.duration.is_finite() && self.duration > 0.0) {
            return Err(SynthError::InvalidDuration(self.duration));
        }
        Ok(())
    }

    /// round(sample_rate * duration)
    pub fn sample_count(&self) -> usize {
        (self.sample_rate * self.duration).round() as usize
    }
}

/// Uniformly sampled, fixed-length real signal
#[derive(Debug, Clone, PartialEq)]
pub struct Signal {
    samples: Vec<f32>,
    sample_rate: f64,
}

impl Signal {
    pub fn new(samples: Vec<f32>, sample_rate: f64) -> Self {
        Self { samples, sample_rate }
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Length in seconds
    pub fn duration(&self) -> f64 {
        self.samples.len() as f64 / self.sample_rate
    }

    /// Time offset of every sample, starting at 0 and excluding the endpoint
    pub fn time_offsets(&self) -> impl Iterator<Item = f64> + '_ {
        let rate = self.sample_rate;
        (0..self.samples.len()).map(move |i| i as f64 / rate)
    }

    /// Largest absolute sample; NaN if any sample is NaN
    pub fn peak(&self) -> f32 {
        self.samples
            .iter()
            .map(|s| s.abs())
            .fold(0.0f32, |m, a| if a > m || a.is_nan() { a } else { m })
    }
}

/// Sum of sinusoids, normalized according to `params.normalization`
pub fn synthesize(tones: &ToneSpec, params: &SynthParams) -> Result<Signal, SynthError> {
    params.validate()?;
    tones.validate()?;

    // Amplitudes are relative weights; rescaling them keeps the sum finite
    let weights = match params.normalization {
        Normalization::Peak => tones.scaled_to_unit_weight(),
        Normalization::Literal => tones.clone(),
    };
    let raw: Vec<f64> = (0..params.sample_count())
        .map(|i| weights.value_at(i as f64 / params.sample_rate))
        .collect();

    let peak = raw.iter().fold(0.0f64, |m, v| m.max(v.abs()));
    // All-zero input stays all-zero
    let divisor = match params.normalization {
        Normalization::Peak if peak > 0.0 => peak,
        _ => 1.0,
    };
    log::debug!(
        "synthesized {} samples from {} tones, raw peak {:.6}",
        raw.len(),
        tones.tones().len(),
        peak
    );

    let samples = raw.into_iter().map(|v| (v / divisor) as f32).collect();
    Ok(Signal::new(samples, params.sample_rate))
}

/// Literal-amplitude sum of sinusoids
pub fn synthesize_unnormalized(tones: &ToneSpec, params: &SynthParams) -> Result<Signal, SynthError> {
    let params = SynthParams { normalization: Normalization::Literal, ..*params };
    synthesize(tones, &params)
}
