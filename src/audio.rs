use crate::synth::Signal;
use anyhow::{Context, anyhow, bail};
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleType {
    U8,
    I16,
    I24,
    I32,
    F32,
}

#[derive(Debug, Clone)]
pub struct AudioMetadata {
    pub codec: String,
    pub sample_rate: u32,
    /// Frames, i.e. samples per channel
    pub total_frames: u64,
    pub channels: u16,
    pub sample_type: SampleType,
}

fn format_duration(duration: f64) -> String {
    if duration < 0.0 {
        return format!("-{}", format_duration(-duration));
    }

    if duration < 1.0 {
        let ms = (duration * 1000.0).round() as u32;
        return format!("{}ms", ms);
    }

    let zero_ms = ((duration * 1000.0).round() as u64) % 1000 == 0;
    if duration < 60.0 {
        return if zero_ms {
            format!("{:.0}s", duration)
        } else {
            format!("{:.3}s", duration)
        };
    }

    if duration < 3600.0 {
        let minutes = (duration / 60.0).trunc() as u32;
        let seconds = duration % 60.0;
        return if zero_ms {
            format!("{}:{:02.0}m", minutes, seconds)
        } else {
            format!("{}:{:06.3}m", minutes, seconds)
        };
    }

    let hours = (duration / 3600.0).trunc() as u32;
    let remainder = duration % 3600.0;
    let minutes = (remainder / 60.0).trunc() as u32;
    let seconds = remainder % 60.0;
    if zero_ms {
        format!("{}:{:02}:{:02.0}h", hours, minutes, seconds)
    } else {
        format!("{}:{:02}:{:06.3}h", hours, minutes, seconds)
    }
}

impl AudioMetadata {
    pub fn duration(&self) -> f64 {
        self.total_frames as f64 / self.sample_rate as f64
    }

    pub fn to_pretty_string(&self) -> String {
        format!(
            "'{}', {} Hz, {} ch, {}, {}",
            self.codec,
            self.sample_rate,
            self.channels,
            match self.sample_type {
                SampleType::U8 => "u8",
                SampleType::I16 => "i16",
                SampleType::I24 => "i24",
                SampleType::I32 => "i32",
                SampleType::F32 => "f32",
            },
            format_duration(self.duration())
        )
    }
}

/// Sequential reader of interleaved samples normalized to [-1.0, 1.0]
pub trait AudioReader {
    fn metadata(&self) -> &AudioMetadata;

    /// Moves to the given frame
    fn seek(&mut self, frame: u64) -> anyhow::Result<()>;
    /// Fills `samples` with interleaved data, returns how many were written (0 at end of stream)
    fn read(&mut self, samples: &mut [f32]) -> anyhow::Result<usize>;
}

pub fn open_audio(path: &Path) -> anyhow::Result<Box<dyn AudioReader>> {
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .unwrap_or("")
        .to_lowercase();

    match extension.as_str() {
        "wav" => Ok(Box::new(WavReader::open(path)?)),
        "flac" => Ok(Box::new(FlacReader::open(path)?)),
        _ => match WavReader::open(path) {
            Ok(reader) => Ok(Box::new(reader)),
            Err(_) => bail!("Unsupported audio format: '{}' from path {:?}", extension, path),
        },
    }
}

pub struct WavReader {
    metadata: AudioMetadata,
    reader: hound::WavReader<std::io::BufReader<std::fs::File>>,
}

impl WavReader {
    pub fn open(path: &Path) -> anyhow::Result<Self> {
        let reader = hound::WavReader::open(path)
            .with_context(|| format!("cannot open WAV file {:?}", path))?;
        let spec = reader.spec();

        let metadata = AudioMetadata {
            codec: "wav".to_string(),
            sample_rate: spec.sample_rate,
            total_frames: reader.duration() as u64,
            channels: spec.channels,
            sample_type: match spec.sample_format {
                hound::SampleFormat::Int => match spec.bits_per_sample {
                    8 => SampleType::U8,
                    16 => SampleType::I16,
                    24 => SampleType::I24,
                    32 => SampleType::I32,
                    bits => bail!("Unsupported WAV sample width: {} bits", bits),
                },
                hound::SampleFormat::Float => SampleType::F32,
            },
        };

        Ok(WavReader { metadata, reader })
    }
}

impl AudioReader for WavReader {
    fn metadata(&self) -> &AudioMetadata {
        &self.metadata
    }

    fn seek(&mut self, frame: u64) -> anyhow::Result<()> {
        let frame_32: u32 = frame
            .try_into()
            .map_err(|e| anyhow!("Seek position {} is too large for a WAV file: {}", frame, e))?;
        self.reader.seek(frame_32)?;
        Ok(())
    }

    fn read(&mut self, samples: &mut [f32]) -> anyhow::Result<usize> {
        let mut read_count = 0;
        match self.metadata.sample_type {
            SampleType::F32 => {
                for (slot, sample) in samples.iter_mut().zip(self.reader.samples::<f32>()) {
                    *slot = sample?;
                    read_count += 1;
                }
            }
            _ => {
                let bits = self.reader.spec().bits_per_sample;
                let full_scale = (1u64 << (bits - 1)) as f32;
                for (slot, sample) in samples.iter_mut().zip(self.reader.samples::<i32>()) {
                    *slot = sample? as f32 / full_scale;
                    read_count += 1;
                }
            }
        }
        Ok(read_count)
    }
}

/// FLAC is decoded up front; recordings used for replay are short
pub struct FlacReader {
    metadata: AudioMetadata,
    samples: Vec<f32>,
    current_position: usize,
}

impl FlacReader {
    pub fn open(path: &Path) -> anyhow::Result<Self> {
        let mut reader = claxon::FlacReader::open(path)
            .with_context(|| format!("cannot open FLAC file {:?}", path))?;
        let info = reader.streaminfo();
        let full_scale = (1u64 << (info.bits_per_sample - 1)) as f32;

        let samples = reader
            .samples()
            .map(|s| s.map(|v| v as f32 / full_scale))
            .collect::<Result<Vec<f32>, _>>()?;

        let metadata = AudioMetadata {
            codec: "flac".to_string(),
            sample_rate: info.sample_rate,
            total_frames: info.samples.unwrap_or(samples.len() as u64 / info.channels as u64),
            channels: info.channels as u16,
            sample_type: SampleType::F32,
        };

        Ok(FlacReader { metadata, samples, current_position: 0 })
    }
}

impl AudioReader for FlacReader {
    fn metadata(&self) -> &AudioMetadata {
        &self.metadata
    }

    fn seek(&mut self, frame: u64) -> anyhow::Result<()> {
        let position = frame as usize * self.metadata.channels as usize;
        if position > self.samples.len() {
            bail!("Seek position {} is past the end of the stream", frame);
        }
        self.current_position = position;
        Ok(())
    }

    fn read(&mut self, samples: &mut [f32]) -> anyhow::Result<usize> {
        let remaining = self.samples.len() - self.current_position;
        let count = remaining.min(samples.len());

        let start = self.current_position;
        samples[..count].copy_from_slice(&self.samples[start..start + count]);
        self.current_position += count;

        Ok(count)
    }
}

/// Writes a mono 32-bit float WAV
pub fn write_wav(path: &Path, signal: &Signal) -> anyhow::Result<()> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: signal.sample_rate().round() as u32,
        bits_per_sample: 32,
        sample_format: hound::SampleFormat::Float,
    };

    let mut writer = hound::WavWriter::create(path, spec)
        .with_context(|| format!("cannot create WAV file {:?}", path))?;
    for &sample in signal.samples() {
        writer.write_sample(sample)?;
    }
    writer.finalize()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flac_with(samples: Vec<f32>, channels: u16) -> FlacReader {
        let metadata = AudioMetadata {
            codec: "flac".to_string(),
            sample_rate: 44100,
            total_frames: samples.len() as u64 / channels as u64,
            channels,
            sample_type: SampleType::F32,
        };
        FlacReader { metadata, samples, current_position: 0 }
    }

    #[test]
    fn test_flac_reader_seek() {
        let mut reader = flac_with(vec![0.1, 0.2, 0.3, 0.4, 0.5, 0.6, 0.7, 0.8, 0.9, 1.0], 1);

        assert!(reader.seek(5).is_ok());
        assert_eq!(reader.current_position, 5);

        assert!(reader.seek(15).is_err());

        let mut buffer = [0.0f32; 3];
        let read_count = reader.read(&mut buffer).unwrap();
        assert_eq!(read_count, 3);
        assert_eq!(buffer, [0.6, 0.7, 0.8]);
        assert_eq!(reader.current_position, 8);
    }

    #[test]
    fn test_flac_reader_seek_is_in_frames() {
        let mut reader = flac_with(vec![1.0, -1.0, 2.0, -2.0, 3.0, -3.0], 2);
        reader.seek(2).unwrap();
        let mut buffer = [0.0f32; 2];
        assert_eq!(reader.read(&mut buffer).unwrap(), 2);
        assert_eq!(buffer, [3.0, -3.0]);
    }

    #[test]
    fn test_flac_reader_read() {
        let mut reader = flac_with(vec![1.0, 2.0, 3.0, 4.0, 5.0], 1);

        let mut buffer = [0.0f32; 3];
        assert_eq!(reader.read(&mut buffer).unwrap(), 3);
        assert_eq!(buffer, [1.0, 2.0, 3.0]);

        let mut buffer2 = [0.0f32; 5];
        assert_eq!(reader.read(&mut buffer2).unwrap(), 2);
        assert_eq!(&buffer2[..2], &[4.0, 5.0]);

        let mut buffer3 = [0.0f32; 2];
        assert_eq!(reader.read(&mut buffer3).unwrap(), 0);
    }

    #[test]
    fn test_audio_metadata_pretty_string() {
        let metadata = AudioMetadata {
            codec: "wav".to_string(),
            sample_rate: 44100,
            total_frames: 88200,
            channels: 1,
            sample_type: SampleType::F32,
        };

        assert_eq!(metadata.to_pretty_string(), "'wav', 44100 Hz, 1 ch, f32, 2s");
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(0.5), "500ms");
        assert_eq!(format_duration(0.001), "1ms");

        assert_eq!(format_duration(1.0), "1s");
        assert_eq!(format_duration(5.123), "5.123s");

        assert_eq!(format_duration(65.0), "1:05m");
        assert_eq!(format_duration(125.456), "2:05.456m");

        assert_eq!(format_duration(3665.0), "1:01:05h");
        assert_eq!(format_duration(7325.123), "2:02:05.123h");
    }

    #[test]
    fn test_open_audio_nonexistent_file() {
        assert!(open_audio(Path::new("nonexistent_file.wav")).is_err());
    }

    #[test]
    fn test_wav_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tone.wav");
        let signal = Signal::new(vec![0.0, 0.5, -0.5, 1.0, -1.0], 8000.0);
        write_wav(&path, &signal).unwrap();

        let mut reader = open_audio(&path).unwrap();
        assert_eq!(reader.metadata().sample_rate, 8000);
        assert_eq!(reader.metadata().channels, 1);
        assert_eq!(reader.metadata().total_frames, 5);
        assert_eq!(reader.metadata().sample_type, SampleType::F32);

        let mut buffer = [0.0f32; 8];
        assert_eq!(reader.read(&mut buffer).unwrap(), 5);
        assert_eq!(&buffer[..5], signal.samples());

        reader.seek(3).unwrap();
        let mut tail = [0.0f32; 2];
        assert_eq!(reader.read(&mut tail).unwrap(), 2);
        assert_eq!(tail, [1.0, -1.0]);
    }

    #[test]
    fn test_int_wav_is_normalized() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("int.wav");
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: 1000,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(&path, spec).unwrap();
        for s in [0i16, 16384, -32768] {
            writer.write_sample(s).unwrap();
        }
        writer.finalize().unwrap();

        let mut reader = WavReader::open(&path).unwrap();
        let mut buffer = [0.0f32; 3];
        assert_eq!(reader.read(&mut buffer).unwrap(), 3);
        assert_eq!(buffer, [0.0, 0.5, -1.0]);
    }
}
