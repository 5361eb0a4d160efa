use crate::audio::write_wav;
use crate::interrupt::StopFlag;
use crate::synth::Signal;
use anyhow::anyhow;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, FromSample, SampleFormat, SizedSample, StreamConfig};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;

const POLL_INTERVAL: Duration = Duration::from_millis(20);
/// Time left for the device to drain its last buffer
const DRAIN_TIME: Duration = Duration::from_millis(100);

#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum PlaybackOutcome {
    Finished,
    Interrupted,
}

/// Something that consumes a whole signal, blocking until done or stopped
pub trait Playback {
    fn play(&mut self, signal: &Signal, stop: &StopFlag) -> anyhow::Result<PlaybackOutcome>;
}

/// Blocks until `position()` reaches `total` or the stop flag is raised
pub fn wait_for_playback<P, F>(
    total: usize,
    mut position: P,
    stop: &StopFlag,
    mut on_progress: F,
) -> PlaybackOutcome
where
    P: FnMut() -> usize,
    F: FnMut(usize),
{
    loop {
        if stop.is_raised() {
            return PlaybackOutcome::Interrupted;
        }
        let played = position().min(total);
        on_progress(played);
        if played >= total {
            return PlaybackOutcome::Finished;
        }
        thread::sleep(POLL_INTERVAL);
    }
}

/// Plays through the default output device
pub struct DevicePlayer {
    device: Device,
    show_progress: bool,
}

impl DevicePlayer {
    pub fn new(show_progress: bool) -> anyhow::Result<Self> {
        let host = cpal::default_host();
        log::info!("cpal host: {}", host.id().name());
        let device = host
            .default_output_device()
            .ok_or(anyhow!("no output device"))?;
        if let Ok(name) = device.name() {
            log::info!("cpal device: {}", name);
        } else {
            log::info!("cpal device: (no name)");
        }
        Ok(Self { device, show_progress })
    }

    /// First supported configuration at the signal's rate, preferring f32 output
    fn choose_config(&self, sample_rate: u32) -> anyhow::Result<(StreamConfig, SampleFormat)> {
        let rate = cpal::SampleRate(sample_rate);
        let mut candidates: Vec<_> = self
            .device
            .supported_output_configs()?
            .filter(|range| range.min_sample_rate() <= rate && rate <= range.max_sample_rate())
            .collect();
        candidates.sort_by_key(|range| range.sample_format() != SampleFormat::F32);
        let range = candidates
            .into_iter()
            .next()
            .ok_or(anyhow!("output device does not support {} Hz", sample_rate))?;
        let supported = range.with_sample_rate(rate);
        Ok((supported.config(), supported.sample_format()))
    }

    fn build_stream<T>(
        &self,
        config: &StreamConfig,
        samples: Arc<Vec<f32>>,
        cursor: Arc<AtomicUsize>,
    ) -> anyhow::Result<cpal::Stream>
    where
        T: SizedSample + FromSample<f32>,
    {
        let channels = config.channels as usize;
        let stream = self.device.build_output_stream(
            config,
            move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                let mut pos = cursor.load(Ordering::Acquire);
                for frame in data.chunks_mut(channels) {
                    let value = samples.get(pos).copied().unwrap_or(0.0);
                    for element in frame {
                        *element = T::from_sample(value);
                    }
                    pos += 1;
                }
                cursor.store(pos, Ordering::Release);
            },
            |err| log::error!("stream error: {}", err),
            None,
        )?;
        Ok(stream)
    }
}

impl Playback for DevicePlayer {
    fn play(&mut self, signal: &Signal, stop: &StopFlag) -> anyhow::Result<PlaybackOutcome> {
        let sample_rate = signal.sample_rate().round() as u32;
        let (config, format) = self.choose_config(sample_rate)?;
        log::info!("sample rate: {}", config.sample_rate.0);
        log::info!("num channels: {}", config.channels);
        log::info!("sample format: {:?}", format);

        let samples = Arc::new(signal.samples().to_vec());
        let cursor = Arc::new(AtomicUsize::new(0));
        let stream = match format {
            SampleFormat::F32 => self.build_stream::<f32>(&config, Arc::clone(&samples), Arc::clone(&cursor))?,
            SampleFormat::I16 => self.build_stream::<i16>(&config, Arc::clone(&samples), Arc::clone(&cursor))?,
            SampleFormat::U16 => self.build_stream::<u16>(&config, Arc::clone(&samples), Arc::clone(&cursor))?,
            other => return Err(anyhow!("unsupported output sample format {:?}", other)),
        };

        let pb = if self.show_progress {
            ProgressBar::new(samples.len() as u64)
        } else {
            ProgressBar::hidden()
        };
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({percent}%)")?
                .progress_chars("#>-"),
        );

        stream.play()?;
        let outcome = wait_for_playback(
            samples.len(),
            || cursor.load(Ordering::Acquire),
            stop,
            |played| pb.set_position(played as u64),
        );

        match outcome {
            PlaybackOutcome::Finished => {
                thread::sleep(DRAIN_TIME);
                pb.finish();
            }
            PlaybackOutcome::Interrupted => {
                stream.pause()?;
                pb.abandon();
            }
        }
        Ok(outcome)
    }
}

/// Writes the signal to a WAV file instead of a device
pub struct WavExport {
    path: PathBuf,
}

impl WavExport {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl Playback for WavExport {
    fn play(&mut self, signal: &Signal, _stop: &StopFlag) -> anyhow::Result<PlaybackOutcome> {
        write_wav(&self.path, signal)?;
        log::info!("wrote {} samples to {:?}", signal.len(), self.path);
        Ok(PlaybackOutcome::Finished)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn test_wait_finishes_when_position_reaches_total() {
        let position = Cell::new(0usize);
        let mut reported = Vec::new();
        let outcome = wait_for_playback(
            3,
            || {
                position.set(position.get() + 2);
                position.get()
            },
            &StopFlag::new(),
            |p| reported.push(p),
        );
        assert_eq!(outcome, PlaybackOutcome::Finished);
        assert_eq!(reported, vec![2, 3]);
    }

    #[test]
    fn test_wait_stops_on_interrupt() {
        let stop = StopFlag::new();
        let polls = Cell::new(0);
        let outcome = wait_for_playback(
            usize::MAX,
            || {
                polls.set(polls.get() + 1);
                if polls.get() == 2 {
                    stop.raise();
                }
                0
            },
            &stop,
            |_| {},
        );
        assert_eq!(outcome, PlaybackOutcome::Interrupted);
        assert_eq!(polls.get(), 2);
    }

    #[test]
    fn test_wav_export_writes_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.wav");
        let signal = Signal::new(vec![0.0, 0.25, -0.25], 44100.0);
        let outcome = WavExport::new(&path).play(&signal, &StopFlag::new()).unwrap();
        assert_eq!(outcome, PlaybackOutcome::Finished);

        let reader = hound::WavReader::open(&path).unwrap();
        assert_eq!(reader.spec().sample_rate, 44100);
        assert_eq!(reader.duration(), 3);
    }
}
