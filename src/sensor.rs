use crate::audio::AudioReader;
use crate::synth::ToneSpec;
use std::thread;
use std::time::{Duration, Instant};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SensorError {
    #[error("unsupported gain {0}, expected one of 2/3, 1, 2, 4, 8, 16")]
    InvalidGain(f64),
    #[error("channel {channel} is not available, source has {available}")]
    InvalidChannel { channel: u8, available: u16 },
    #[error("sample rate must be positive")]
    InvalidSampleRate,
    #[error("end of recording")]
    EndOfStream,
    #[error(transparent)]
    Source(#[from] anyhow::Error),
}

/// Programmable gain of the ADC front end, selecting its full-scale range
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum Gain {
    TwoThirds,
    One,
    Two,
    Four,
    Eight,
    Sixteen,
}

impl Gain {
    pub fn from_factor(factor: f64) -> Result<Self, SensorError> {
        let gain = match factor {
            f if (f - 2.0 / 3.0).abs() < 0.01 => Gain::TwoThirds,
            f if f == 1.0 => Gain::One,
            f if f == 2.0 => Gain::Two,
            f if f == 4.0 => Gain::Four,
            f if f == 8.0 => Gain::Eight,
            f if f == 16.0 => Gain::Sixteen,
            _ => return Err(SensorError::InvalidGain(factor)),
        };
        Ok(gain)
    }

    /// Input voltage that maps to the top of the converter's range
    pub fn full_scale_volts(self) -> f32 {
        match self {
            Gain::TwoThirds => 6.144,
            Gain::One => 4.096,
            Gain::Two => 2.048,
            Gain::Four => 1.024,
            Gain::Eight => 0.512,
            Gain::Sixteen => 0.256,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct SensorConfig {
    pub gain: Gain,
    pub channel: u8,
    pub sample_rate: u32,
    /// Block on each read until the next sampling instant
    pub paced: bool,
}

impl SensorConfig {
    fn to_volts(&self, normalized: f32) -> f32 {
        // The converter saturates outside its range
        normalized.clamp(-1.0, 1.0) * self.gain.full_scale_volts()
    }
}

/// A source of one scalar reading per call
pub trait Sensor {
    fn read(&mut self) -> Result<f32, SensorError>;
    fn describe(&self) -> String;
}

/// Sleeps until the next sampling instant
#[derive(Debug)]
struct Pacer {
    period: Duration,
    next: Option<Instant>,
    enabled: bool,
}

impl Pacer {
    fn new(sample_rate: u32, enabled: bool) -> Self {
        Self {
            period: Duration::from_secs_f64(1.0 / sample_rate as f64),
            next: None,
            enabled,
        }
    }

    fn wait(&mut self) {
        if !self.enabled {
            return;
        }
        let now = Instant::now();
        let next = self.next.unwrap_or(now);
        if next > now {
            thread::sleep(next - now);
        }
        // Fall back to "now" after a stall instead of bursting to catch up
        self.next = Some(next.max(now) + self.period);
    }
}

const REPLAY_CHUNK_FRAMES: usize = 1024;

/// Replays one channel of a recording as if it came from the converter, looping at the end
pub struct ReplaySensor {
    reader: Box<dyn AudioReader>,
    config: SensorConfig,
    channels: usize,
    chunk: Vec<f32>,
    filled: usize,
    cursor: usize,
    looping: bool,
    pacer: Pacer,
}

impl ReplaySensor {
    pub fn new(
        reader: Box<dyn AudioReader>,
        config: SensorConfig,
        looping: bool,
    ) -> Result<Self, SensorError> {
        if config.sample_rate == 0 {
            return Err(SensorError::InvalidSampleRate);
        }
        let metadata = reader.metadata();
        if config.channel as u16 >= metadata.channels {
            return Err(SensorError::InvalidChannel {
                channel: config.channel,
                available: metadata.channels,
            });
        }
        if metadata.sample_rate != config.sample_rate {
            log::warn!(
                "recording is {} Hz, replaying at {} Hz",
                metadata.sample_rate,
                config.sample_rate
            );
        }
        let channels = metadata.channels as usize;
        Ok(Self {
            reader,
            config,
            channels,
            chunk: vec![0.0; channels * REPLAY_CHUNK_FRAMES],
            filled: 0,
            cursor: 0,
            looping,
            pacer: Pacer::new(config.sample_rate, config.paced),
        })
    }

    fn refill(&mut self) -> Result<(), SensorError> {
        self.filled = self.reader.read(&mut self.chunk)?;
        if self.filled == 0 && self.looping {
            log::debug!("recording exhausted, rewinding");
            self.reader.seek(0)?;
            self.filled = self.reader.read(&mut self.chunk)?;
        }
        // Partial trailing frames are dropped
        self.filled -= self.filled % self.channels;
        self.cursor = 0;
        if self.filled == 0 {
            return Err(SensorError::EndOfStream);
        }
        Ok(())
    }
}

impl Sensor for ReplaySensor {
    fn read(&mut self) -> Result<f32, SensorError> {
        if self.cursor >= self.filled {
            self.refill()?;
        }
        let normalized = self.chunk[self.cursor + self.config.channel as usize];
        self.cursor += self.channels;
        self.pacer.wait();
        Ok(self.config.to_volts(normalized))
    }

    fn describe(&self) -> String {
        format!(
            "replay {} channel {} ({:?} V full scale)",
            self.reader.metadata().to_pretty_string(),
            self.config.channel,
            self.config.gain.full_scale_volts()
        )
    }
}

/// Endless synthetic tone, sampled at the configured rate
pub struct ToneSensor {
    tones: ToneSpec,
    config: SensorConfig,
    index: u64,
    pacer: Pacer,
}

impl ToneSensor {
    pub fn new(tones: ToneSpec, config: SensorConfig) -> Result<Self, SensorError> {
        if config.sample_rate == 0 {
            return Err(SensorError::InvalidSampleRate);
        }
        Ok(Self {
            tones,
            config,
            index: 0,
            pacer: Pacer::new(config.sample_rate, config.paced),
        })
    }
}

impl Sensor for ToneSensor {
    fn read(&mut self) -> Result<f32, SensorError> {
        let t = self.index as f64 / self.config.sample_rate as f64;
        self.index += 1;
        self.pacer.wait();
        Ok(self.config.to_volts(self.tones.value_at(t) as f32))
    }

    fn describe(&self) -> String {
        format!("synthetic tone {:?} Hz", self.tones.frequencies())
    }
}
