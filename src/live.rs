use crate::interrupt::StopFlag;
use crate::rolling::{Cadence, RollingBuffer};
use crate::scalc::{SpectrogramData, SpectrogramParams, calculate_spectrogram};
use crate::sensor::{Sensor, SensorError};
use crate::srend::{ColorScheme, DynamicRange, create_spectrogram_image};
use anyhow::Context;
use std::path::PathBuf;

#[derive(Debug, Clone, Copy)]
pub struct LiveParams {
    pub sample_rate: u32,
    /// Length of the rolling window in seconds
    pub window_seconds: f64,
    pub spectrogram: SpectrogramParams,
    /// Stop on its own after this many samples
    pub max_samples: Option<u64>,
}

impl LiveParams {
    pub fn buffer_len(&self) -> usize {
        (self.sample_rate as f64 * self.window_seconds).round() as usize
    }
}

#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum LiveOutcome {
    Interrupted,
    SampleLimit,
    SourceExhausted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LiveSummary {
    pub samples: u64,
    pub refreshes: u64,
    pub outcome: LiveOutcome,
}

/// Receives every recomputed spectrogram
pub trait FrameSink {
    fn show(&mut self, frame: &SpectrogramData) -> anyhow::Result<()>;
}

/// Rewrites a PNG heat map on every refresh
pub struct PngFrameSink {
    pub path: PathBuf,
    pub width: u32,
    pub height: u32,
    pub color_scheme: ColorScheme,
    pub dynamic_range: DynamicRange,
}

impl FrameSink for PngFrameSink {
    fn show(&mut self, frame: &SpectrogramData) -> anyhow::Result<()> {
        let image = create_spectrogram_image(frame, self.width, self.height, self.color_scheme, self.dynamic_range);
        image
            .save(&self.path)
            .with_context(|| format!("cannot save spectrogram to {:?}", self.path))
    }
}

/// Samples one value at a time into the rolling window and re-renders the
/// spectrogram every half second of samples, until interrupted
pub fn run_live(
    sensor: &mut dyn Sensor,
    params: &LiveParams,
    sink: &mut dyn FrameSink,
    stop: &StopFlag,
) -> anyhow::Result<LiveSummary> {
    params.spectrogram.validate(params.buffer_len())?;
    let mut buffer = RollingBuffer::new(params.buffer_len());
    let mut cadence = Cadence::half_second(params.sample_rate);
    let mut samples = 0u64;
    let mut refreshes = 0u64;

    log::info!(
        "live: {} sample window, refresh every {} samples",
        buffer.capacity(),
        cadence.every()
    );

    let outcome = loop {
        if stop.is_raised() {
            break LiveOutcome::Interrupted;
        }
        if params.max_samples.is_some_and(|max| samples >= max) {
            break LiveOutcome::SampleLimit;
        }

        let value = match sensor.read() {
            Ok(value) => value,
            Err(SensorError::EndOfStream) => break LiveOutcome::SourceExhausted,
            Err(e) => return Err(e.into()),
        };
        buffer.push(value);
        samples += 1;

        if cadence.tick() {
            let frame = calculate_spectrogram(buffer.as_slice(), &params.spectrogram)?;
            sink.show(&frame)?;
            refreshes += 1;
            let dominant = frame
                .num_columns()
                .checked_sub(1)
                .and_then(|last| frame.ridge_row(last))
                .map(|row| frame.frequencies[row]);
            log::debug!("refresh {} after {} samples, dominant {:?} Hz", refreshes, samples, dominant);
        }
    };

    Ok(LiveSummary { samples, refreshes, outcome })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sensor::{Gain, SensorConfig, ToneSensor};
    use crate::spectrum::AnalysisError;
    use crate::synth::ToneSpec;

    #[derive(Default)]
    struct CaptureSink {
        frames: Vec<SpectrogramData>,
    }

    impl FrameSink for CaptureSink {
        fn show(&mut self, frame: &SpectrogramData) -> anyhow::Result<()> {
            self.frames.push(frame.clone());
            Ok(())
        }
    }

    /// Counts reads and raises the stop flag on the given one
    struct StoppingSensor {
        reads: u64,
        stop_at: u64,
        stop: StopFlag,
    }

    impl Sensor for StoppingSensor {
        fn read(&mut self) -> Result<f32, SensorError> {
            self.reads += 1;
            if self.reads == self.stop_at {
                self.stop.raise();
            }
            Ok(0.0)
        }

        fn describe(&self) -> String {
            "stopping".to_string()
        }
    }

    fn params(max_samples: Option<u64>) -> LiveParams {
        LiveParams {
            sample_rate: 1000,
            window_seconds: 10.0,
            spectrogram: SpectrogramParams::new(1000.0, 256, 128),
            max_samples,
        }
    }

    fn tone_sensor(frequency: f64) -> ToneSensor {
        let config = SensorConfig { gain: Gain::One, channel: 0, sample_rate: 1000, paced: false };
        ToneSensor::new(ToneSpec::single(frequency, 0.5), config).unwrap()
    }

    #[test]
    fn test_refreshes_every_half_second() {
        let mut sensor = tone_sensor(125.0);
        let mut sink = CaptureSink::default();
        let summary = run_live(&mut sensor, &params(Some(2_600)), &mut sink, &StopFlag::new()).unwrap();

        assert_eq!(summary.samples, 2_600);
        assert_eq!(summary.refreshes, 5);
        assert_eq!(summary.outcome, LiveOutcome::SampleLimit);
        assert_eq!(sink.frames.len(), 5);
        // Every frame covers the full 10 s window
        assert!(sink.frames.iter().all(|f| f.num_columns() == (10_000 - 256) / 128 + 1));
    }

    #[test]
    fn test_full_window_shows_ridge_in_every_column() {
        let mut sensor = tone_sensor(125.0);
        let mut sink = CaptureSink::default();
        run_live(&mut sensor, &params(Some(10_000)), &mut sink, &StopFlag::new()).unwrap();

        let last = sink.frames.last().unwrap();
        let row = last.nearest_row(125.0).unwrap();
        for column in 0..last.num_columns() {
            assert_eq!(last.ridge_row(column), Some(row));
        }
    }

    #[test]
    fn test_interrupt_stops_within_one_iteration() {
        let stop = StopFlag::new();
        let mut sensor = StoppingSensor { reads: 0, stop_at: 1_234, stop: stop.clone() };
        let mut sink = CaptureSink::default();
        let summary = run_live(&mut sensor, &params(None), &mut sink, &stop).unwrap();

        assert_eq!(summary.outcome, LiveOutcome::Interrupted);
        assert_eq!(summary.samples, 1_234);
        assert_eq!(sensor.reads, 1_234);
        assert_eq!(summary.refreshes, 2);
    }

    #[test]
    fn test_already_stopped() {
        let stop = StopFlag::new();
        stop.raise();
        let mut sensor = tone_sensor(50.0);
        let mut sink = CaptureSink::default();
        let summary = run_live(&mut sensor, &params(None), &mut sink, &stop).unwrap();
        assert_eq!(summary.samples, 0);
        assert!(sink.frames.is_empty());
    }

    #[test]
    fn test_bad_segmentation_fails_before_sampling() {
        let stop = StopFlag::new();
        let mut sensor = StoppingSensor { reads: 0, stop_at: u64::MAX, stop: stop.clone() };
        let mut sink = CaptureSink::default();
        let mut bad = params(None);
        bad.spectrogram.overlap = 256;
        let err = run_live(&mut sensor, &bad, &mut sink, &stop).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<AnalysisError>(),
            Some(AnalysisError::InvalidSegment { segment: 256, overlap: 256, .. })
        ));
        assert_eq!(sensor.reads, 0);

        bad.spectrogram.segment_len = 0;
        bad.spectrogram.overlap = 0;
        assert!(run_live(&mut sensor, &bad, &mut sink, &stop).is_err());
        assert_eq!(sensor.reads, 0);
    }

    #[test]
    fn test_png_sink_writes_image() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("live.png");
        let mut sink = PngFrameSink {
            path: path.clone(),
            width: 64,
            height: 32,
            color_scheme: ColorScheme::Viridis,
            dynamic_range: DynamicRange::Auto,
        };
        let mut sensor = tone_sensor(125.0);
        let summary = run_live(&mut sensor, &params(Some(500)), &mut sink, &StopFlag::new()).unwrap();
        assert_eq!(summary.refreshes, 1);
        assert_eq!(image::open(&path).unwrap().width(), 64);
    }
}
