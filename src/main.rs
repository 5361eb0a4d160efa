// tonespec/src/main.rs

mod audio;
mod interrupt;
mod live;
mod playback;
mod plot;
mod rolling;
mod scalc;
mod sensor;
mod spectrum;
mod srend;
mod synth;

use anyhow::bail;
use clap::{Args as ClapArgs, Parser, Subcommand, ValueEnum};
use interrupt::StopFlag;
use playback::{DevicePlayer, Playback, PlaybackOutcome, WavExport};
use plot::{Figure, Panel, Series};
use spectrum::{MagnitudeScale, Spectrum};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Instant;
use synth::{Signal, SynthParams, Tone, ToneSpec};

const DEFAULT_FREQUENCIES: [f64; 3] = [440.0, 880.0, 1320.0];
const DEFAULT_AMPLITUDES: [f64; 3] = [0.4, 0.2, 0.1];

/// Samples shown in time-domain plots
const TIME_PLOT_SAMPLES: usize = 1000;

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum CliMagnitude {
    /// |X[k]|
    Raw,
    /// |X[k]| / N
    Normalized,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum CliWindowType {
    Tukey,
    Hann,
    Hamming,
    Rectangular,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum CliScaling {
    Magnitude,
    Density,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum CliColorScheme {
    Viridis,
    Inferno,
    Oceanic,
    Grayscale,
}

/// Tone synthesis, playback and spectral plots
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Play a single sine tone, optionally plotting its waveform and spectrum
    Tone(ToneArgs),
    /// Play a normalized sum of tones and save time and frequency plots
    Harmonic(HarmonicArgs),
    /// Sample a sensor into a rolling window and keep a spectrogram image up to date
    Live(LiveArgs),
}

#[derive(ClapArgs, Debug)]
struct PlaybackArgs {
    /// Skip audio device playback
    #[arg(long)]
    no_play: bool,

    /// Also write the signal to a WAV file
    #[arg(long, value_name = "FILE")]
    wav: Option<PathBuf>,

    /// Sample rate in Hz
    #[arg(short = 'r', long, default_value_t = 44100)]
    sample_rate: u32,
}

#[derive(ClapArgs, Debug)]
struct PlotArgs {
    /// Spectrum magnitude: raw or divided by the buffer length
    #[arg(short = 'm', long, value_enum)]
    magnitude: Option<CliMagnitude>,

    /// Upper frequency shown in the spectrum plot (Hz)
    #[arg(long, value_name = "HZ")]
    xlim: Option<f64>,

    /// Figure size in WxH pixels
    #[arg(short = 'i', long = "figure-size", value_name = "WxH")]
    figure_size: Option<String>,
}

#[derive(ClapArgs, Debug)]
struct ToneArgs {
    /// Frequency in Hz
    #[arg(short = 'f', long, default_value_t = 440.0)]
    frequency: f64,

    /// Linear amplitude, played as is
    #[arg(short = 'a', long, default_value_t = 0.4)]
    amplitude: f64,

    /// Duration in seconds (default: 5, or 2 when plotting)
    #[arg(short = 'd', long)]
    duration: Option<f64>,

    /// Save a combined time/frequency figure to this PNG
    #[arg(short = 'p', long, value_name = "FILE")]
    plot: Option<PathBuf>,

    #[command(flatten)]
    playback: PlaybackArgs,

    #[command(flatten)]
    plot_args: PlotArgs,
}

#[derive(ClapArgs, Debug)]
struct HarmonicArgs {
    /// Tone as FREQ:AMP, repeatable (default: 440:0.4 880:0.2 1320:0.1)
    #[arg(short = 't', long = "tone", value_name = "FREQ:AMP")]
    tones: Vec<Tone>,

    /// Duration in seconds
    #[arg(short = 'd', long, default_value_t = 2.0)]
    duration: f64,

    /// Time-domain plot file
    #[arg(long, default_value = "time_domain_plot.png")]
    time_plot: PathBuf,

    /// Frequency-domain plot file
    #[arg(long, default_value = "frequency_spectrum_plot.png")]
    spectrum_plot: PathBuf,

    #[command(flatten)]
    playback: PlaybackArgs,

    #[command(flatten)]
    plot_args: PlotArgs,
}

#[derive(ClapArgs, Debug)]
#[command(group = clap::ArgGroup::new("source").required(true).args(["replay", "sine"]))]
struct LiveArgs {
    /// Replay a WAV or FLAC recording as the sensor
    #[arg(long, value_name = "FILE")]
    replay: Option<PathBuf>,

    /// Use a synthetic sine of this frequency as the sensor
    #[arg(long, value_name = "HZ")]
    sine: Option<f64>,

    /// Rewind the recording when it ends
    #[arg(long = "loop")]
    looping: bool,

    /// Converter gain: 0.667, 1, 2, 4, 8 or 16
    #[arg(short = 'g', long, default_value_t = 16.0)]
    gain: f64,

    /// Input channel
    #[arg(long, default_value_t = 0, value_parser = clap::value_parser!(u8).range(0..=3))]
    channel: u8,

    /// Sampling rate in Hz
    #[arg(short = 'r', long, default_value_t = 1000)]
    sample_rate: u32,

    /// Rolling window length in seconds
    #[arg(long, default_value_t = 10.0)]
    window: f64,

    /// Samples per spectrogram segment
    #[arg(long, default_value_t = 256)]
    nperseg: usize,

    /// Samples shared by consecutive segments
    #[arg(long, default_value_t = 128)]
    noverlap: usize,

    /// Segment window function
    #[arg(short = 'w', long = "window-type", value_enum, default_value_t = CliWindowType::Tukey)]
    window_type: CliWindowType,

    /// Cell values: magnitude or spectral density
    #[arg(long, value_enum, default_value_t = CliScaling::Density)]
    scaling: CliScaling,

    /// Color scheme
    #[arg(short = 'c', long = "color-scheme", value_enum, default_value_t = CliColorScheme::Viridis)]
    color_scheme: CliColorScheme,

    /// Show only the top N dB (default: full range of each frame)
    #[arg(long, value_name = "DB")]
    dynamic_range: Option<f32>,

    /// Image size in WxH pixels
    #[arg(short = 'i', long = "image-size", default_value = "1024x512")]
    image_size: String,

    /// Spectrogram image, rewritten on every refresh
    #[arg(short = 'o', long, default_value = "live_spectrogram.png")]
    output: PathBuf,

    /// Stop after this many samples
    #[arg(long)]
    max_samples: Option<u64>,

    /// Read samples as fast as possible instead of in real time
    #[arg(long)]
    no_pace: bool,
}

impl From<CliMagnitude> for MagnitudeScale {
    fn from(m: CliMagnitude) -> Self {
        match m {
            CliMagnitude::Raw => MagnitudeScale::Raw,
            CliMagnitude::Normalized => MagnitudeScale::PerSample,
        }
    }
}

impl From<CliWindowType> for scalc::WindowType {
    fn from(w: CliWindowType) -> Self {
        match w {
            CliWindowType::Tukey => scalc::WindowType::Tukey,
            CliWindowType::Hann => scalc::WindowType::Hann,
            CliWindowType::Hamming => scalc::WindowType::Hamming,
            CliWindowType::Rectangular => scalc::WindowType::Rectangular,
        }
    }
}

impl From<CliScaling> for scalc::Scaling {
    fn from(s: CliScaling) -> Self {
        match s {
            CliScaling::Magnitude => scalc::Scaling::Magnitude,
            CliScaling::Density => scalc::Scaling::Density,
        }
    }
}

impl From<CliColorScheme> for srend::ColorScheme {
    fn from(c: CliColorScheme) -> Self {
        match c {
            CliColorScheme::Viridis => srend::ColorScheme::Viridis,
            CliColorScheme::Inferno => srend::ColorScheme::Inferno,
            CliColorScheme::Oceanic => srend::ColorScheme::Oceanic,
            CliColorScheme::Grayscale => srend::ColorScheme::Grayscale,
        }
    }
}

/// Plot settings after per-command defaults are applied
#[derive(Debug, Clone, Copy, PartialEq)]
struct PlotSettings {
    magnitude: MagnitudeScale,
    xlim: f64,
    size: (u32, u32),
}

impl PlotArgs {
    fn resolve(&self, defaults: PlotSettings) -> PlotSettings {
        PlotSettings {
            magnitude: self.magnitude.map_or(defaults.magnitude, Into::into),
            xlim: self.xlim.unwrap_or(defaults.xlim),
            size: self
                .figure_size
                .as_deref()
                .map_or(defaults.size, |s| plot::parse_image_size(s, defaults.size)),
        }
    }
}

impl ToneArgs {
    fn duration(&self) -> f64 {
        self.duration
            .unwrap_or(if self.plot.is_some() { 2.0 } else { 5.0 })
    }
}

impl HarmonicArgs {
    fn tone_spec(&self) -> Result<ToneSpec, synth::SynthError> {
        if self.tones.is_empty() {
            ToneSpec::from_parallel(&DEFAULT_FREQUENCIES, &DEFAULT_AMPLITUDES)
        } else {
            Ok(ToneSpec::new(self.tones.clone()))
        }
    }
}

fn time_domain_panel(signal: &Signal, title: String) -> Panel {
    let n = signal.len().min(TIME_PLOT_SAMPLES);
    let x = signal.time_offsets().take(n).collect();
    let y = signal.samples()[..n].iter().map(|&s| s as f64).collect();
    Panel::new(title).with_series(Series::new(x, y))
}

fn spectrum_panel(spectrum: &Spectrum, xlim: f64) -> Panel {
    let zoom = spectrum.up_to(xlim);
    let x = zoom.iter().map(|b| b.frequency).collect();
    let y = zoom.iter().map(|b| b.magnitude as f64).collect();
    Panel::new("Frequency Spectrum")
        .with_series(Series::new(x, y))
        .with_x_limits(0.0, xlim)
}

/// Writes the WAV copy if asked, then plays on the device unless disabled
fn play(signal: &Signal, args: &PlaybackArgs, stop: &StopFlag) -> anyhow::Result<PlaybackOutcome> {
    if let Some(path) = &args.wav {
        WavExport::new(path).play(signal, stop)?;
        println!("  Saved signal to {}", path.display());
    }
    if stop.is_raised() {
        return Ok(PlaybackOutcome::Interrupted);
    }
    if args.no_play {
        return Ok(PlaybackOutcome::Finished);
    }
    DevicePlayer::new(true)?.play(signal, stop)
}

fn report_saved(path: &Path) {
    println!("  Plot saved to {}", path.display());
}

fn run_tone(args: &ToneArgs, stop: &StopFlag) -> anyhow::Result<()> {
    let params = SynthParams::new(args.playback.sample_rate as f64, args.duration());
    let signal = synth::synthesize_unnormalized(&ToneSpec::single(args.frequency, args.amplitude), &params)?;

    println!(
        "Playing {} Hz sine wave for {} seconds...",
        args.frequency,
        params.duration
    );
    if play(&signal, &args.playback, stop)? == PlaybackOutcome::Interrupted {
        println!("\nPlayback interrupted.");
        return Ok(());
    }
    println!("Done.");

    let Some(plot_path) = &args.plot else {
        return Ok(());
    };
    let settings = args.plot_args.resolve(PlotSettings {
        magnitude: MagnitudeScale::PerSample,
        xlim: 2000.0,
        size: (1200, 600),
    });
    let spectrum = spectrum::analyze(&signal, settings.magnitude)?;

    let figure = Figure::new(settings.size.0, settings.size.1)
        .with_panel(
            time_domain_panel(
                &signal,
                format!("{} Hz Sine Wave - Time Domain (First {} Samples)", args.frequency, TIME_PLOT_SAMPLES),
            )
            .with_grid(),
        )
        .with_panel(spectrum_panel(&spectrum, settings.xlim).with_grid());
    figure.save(plot_path)?;
    report_saved(plot_path);
    Ok(())
}

fn run_harmonic(args: &HarmonicArgs, stop: &StopFlag) -> anyhow::Result<()> {
    let tones = args.tone_spec()?;
    let params = SynthParams::new(args.playback.sample_rate as f64, args.duration);

    println!("Parameters:");
    println!("  Tones (Hz): {:?}", tones.frequencies());
    println!("  Duration: {} s at {} Hz", params.duration, args.playback.sample_rate);
    println!("--------------------------------------------------");

    println!("Stage 1: Synthesizing...");
    let start_synth = Instant::now();
    let signal = synth::synthesize(&tones, &params)?;
    println!(
        "  {} samples ({:.2} s, peak {:.3}) in {:.2?}",
        signal.len(),
        signal.duration(),
        signal.peak(),
        start_synth.elapsed()
    );

    println!("\nStage 2: Playing combined tone: {:?} Hz", tones.frequencies());
    if play(&signal, &args.playback, stop)? == PlaybackOutcome::Interrupted {
        println!("\nPlayback interrupted.");
        return Ok(());
    }
    println!("  Playback finished.");

    if stop.is_raised() {
        println!("\nStopped.");
        return Ok(());
    }

    println!("\nStage 3: Plotting...");
    let settings = args.plot_args.resolve(PlotSettings {
        magnitude: MagnitudeScale::Raw,
        xlim: 5000.0,
        size: (1000, 400),
    });
    let (width, height) = settings.size;

    Figure::new(width, height)
        .with_panel(time_domain_panel(
            &signal,
            format!("Time-Domain Signal (First {} Samples)", TIME_PLOT_SAMPLES),
        ))
        .save(&args.time_plot)?;
    report_saved(&args.time_plot);

    let spectrum = spectrum::analyze(&signal, settings.magnitude)?;
    log::info!("{} bins, {:.3} Hz apart", spectrum.len(), spectrum.bin_width());
    if let Some(peak) = spectrum.peak() {
        log::info!("spectrum peak at {:.1} Hz", peak.frequency);
    }
    Figure::new(width, height)
        .with_panel(spectrum_panel(&spectrum, settings.xlim))
        .save(&args.spectrum_plot)?;
    report_saved(&args.spectrum_plot);

    println!("\nPlots saved. Exiting.");
    Ok(())
}

fn run_live(args: &LiveArgs, stop: &StopFlag) -> anyhow::Result<()> {
    let config = sensor::SensorConfig {
        gain: sensor::Gain::from_factor(args.gain)?,
        channel: args.channel,
        sample_rate: args.sample_rate,
        paced: !args.no_pace,
    };

    let mut source: Box<dyn sensor::Sensor> = match (&args.replay, args.sine) {
        (Some(path), _) => {
            let reader = audio::open_audio(path)?;
            Box::new(sensor::ReplaySensor::new(reader, config, args.looping)?)
        }
        (None, Some(frequency)) => Box::new(sensor::ToneSensor::new(ToneSpec::single(frequency, 1.0), config)?),
        (None, None) => bail!("no sensor source given"),
    };

    let params = live::LiveParams {
        sample_rate: args.sample_rate,
        window_seconds: args.window,
        spectrogram: scalc::SpectrogramParams {
            sample_rate: args.sample_rate as f64,
            segment_len: args.nperseg,
            overlap: args.noverlap,
            window_type: args.window_type.into(),
            scaling: args.scaling.into(),
        },
        max_samples: args.max_samples,
    };
    params.spectrogram.validate(params.buffer_len())?;

    let (width, height) = plot::parse_image_size(&args.image_size, (1024, 512));
    let mut sink = live::PngFrameSink {
        path: args.output.clone(),
        width,
        height,
        color_scheme: args.color_scheme.into(),
        dynamic_range: args
            .dynamic_range
            .map_or(srend::DynamicRange::Auto, srend::DynamicRange::Decibels),
    };

    println!("Source: {}", source.describe());
    println!("Spectrogram: {}", args.output.display());
    println!("Recording and visualizing... Press Ctrl+C to stop.");

    let summary = live::run_live(source.as_mut(), &params, &mut sink, stop)?;
    match summary.outcome {
        live::LiveOutcome::Interrupted => println!("\nStopped."),
        live::LiveOutcome::SampleLimit => println!("Sample limit reached."),
        live::LiveOutcome::SourceExhausted => println!("Recording finished."),
    }
    println!("  {} samples, {} refreshes", summary.samples, summary.refreshes);
    Ok(())
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let args = Args::parse();

    let stop = StopFlag::install().unwrap_or_else(|e| {
        log::warn!("cannot install Ctrl+C handler: {}", e);
        StopFlag::new()
    });

    let result = match &args.command {
        Command::Tone(a) => run_tone(a, &stop),
        Command::Harmonic(a) => run_harmonic(a, &stop),
        Command::Live(a) => run_live(a, &stop),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}
