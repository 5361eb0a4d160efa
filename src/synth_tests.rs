#[allow(unused_imports)]
use super::*;
use proptest::prelude::*;

fn harmonic() -> ToneSpec {
    ToneSpec::from_parallel(&[440.0, 880.0, 1320.0], &[0.4, 0.2, 0.1]).unwrap()
}

#[test]
fn test_signal_length_is_rounded_product() {
    let signal = synthesize(&harmonic(), &SynthParams::new(44100.0, 2.0)).unwrap();
    assert_eq!(signal.len(), 88200);

    // 2.6 samples round up, not down
    let signal = synthesize(&harmonic(), &SynthParams::new(1000.0, 0.0026)).unwrap();
    assert_eq!(signal.len(), 3);
}

#[test]
fn test_normalized_peak_is_one() {
    let signal = synthesize(&harmonic(), &SynthParams::new(44100.0, 2.0)).unwrap();
    assert_eq!(signal.peak(), 1.0);
}

#[test]
fn test_empty_tone_spec_gives_silence() {
    let signal = synthesize(&ToneSpec::default(), &SynthParams::new(8000.0, 0.5)).unwrap();
    assert_eq!(signal.len(), 4000);
    assert!(signal.samples().iter().all(|&s| s == 0.0));
}

#[test]
fn test_zero_amplitudes_give_silence() {
    let tones = ToneSpec::from_parallel(&[100.0, 200.0], &[0.0, 0.0]).unwrap();
    let signal = synthesize(&tones, &SynthParams::new(8000.0, 0.25)).unwrap();
    assert_eq!(signal.len(), 2000);
    assert!(signal.samples().iter().all(|&s| s == 0.0));
}

#[test]
fn test_unnormalized_keeps_amplitude() {
    let tones = ToneSpec::single(440.0, 0.4);
    let signal = synthesize_unnormalized(&tones, &SynthParams::new(44100.0, 1.0)).unwrap();
    let peak = signal.peak();
    assert!(peak <= 0.4 + 1e-6);
    assert!(peak > 0.399);
}

#[test]
fn test_first_sample_is_zero_phase() {
    let signal = synthesize(&harmonic(), &SynthParams::new(44100.0, 0.1)).unwrap();
    assert_eq!(signal.samples()[0], 0.0);
}

#[test]
fn test_time_offsets_exclude_endpoint() {
    let signal = synthesize(&harmonic(), &SynthParams::new(1000.0, 1.0)).unwrap();
    let offsets: Vec<f64> = signal.time_offsets().collect();
    assert_eq!(offsets.len(), 1000);
    assert_eq!(offsets[0], 0.0);
    assert!((offsets[1] - 0.001).abs() < 1e-12);
    assert!(*offsets.last().unwrap() < 1.0);
    assert!((signal.duration() - 1.0).abs() < 1e-12);
}

#[test]
fn test_invalid_sample_rate_and_duration() {
    let tones = harmonic();
    assert_eq!(
        synthesize(&tones, &SynthParams::new(0.0, 1.0)),
        Err(SynthError::InvalidSampleRate(0.0))
    );
    assert_eq!(
        synthesize(&tones, &SynthParams::new(-44100.0, 1.0)),
        Err(SynthError::InvalidSampleRate(-44100.0))
    );
    assert_eq!(
        synthesize(&tones, &SynthParams::new(44100.0, -1.0)),
        Err(SynthError::InvalidDuration(-1.0))
    );
    assert!(matches!(
        synthesize(&tones, &SynthParams::new(f64::NAN, 1.0)),
        Err(SynthError::InvalidSampleRate(_))
    ));
}

#[test]
fn test_non_finite_tone_is_rejected() {
    let tones = ToneSpec::new(vec![Tone::new(440.0, 1.0), Tone::new(f64::INFINITY, 1.0)]);
    assert_eq!(
        synthesize(&tones, &SynthParams::new(8000.0, 1.0)),
        Err(SynthError::NonFiniteTone { index: 1 })
    );
}

#[test]
fn test_parallel_lists_must_match() {
    let err = ToneSpec::from_parallel(&[440.0, 880.0], &[0.4]).unwrap_err();
    assert_eq!(err, SynthError::LengthMismatch { frequencies: 2, amplitudes: 1 });
}

#[test]
fn test_tone_from_str() {
    assert_eq!("440:0.4".parse::<Tone>().unwrap(), Tone::new(440.0, 0.4));
    assert_eq!(" 880 : 0.2 ".parse::<Tone>().unwrap(), Tone::new(880.0, 0.2));
    assert_eq!("1320".parse::<Tone>().unwrap(), Tone::new(1320.0, 1.0));
    assert!("abc:1".parse::<Tone>().is_err());
    assert!("440:0.4:1".parse::<Tone>().is_err());
    assert!("".parse::<Tone>().is_err());
}

#[test]
fn test_tone_spec_accessors() {
    let tones = harmonic();
    assert!(!tones.is_empty());
    assert_eq!(tones.frequencies(), vec![440.0, 880.0, 1320.0]);
    assert_eq!(tones.tones()[1], Tone::new(880.0, 0.2));
    assert_eq!(tones.value_at(0.0), 0.0);
}

proptest! {
    #[test]
    fn prop_peak_is_one_for_nonzero_tones(
        tones in prop::collection::vec((20.0f64..4000.0, 0.01f64..1.0), 1..5),
        sample_rate in 8000.0f64..48000.0,
        duration in 0.05f64..0.5,
    ) {
        let spec = ToneSpec::new(tones.into_iter().map(|(f, a)| Tone::new(f, a)).collect());
        let params = SynthParams::new(sample_rate, duration);
        let signal = synthesize(&spec, &params).unwrap();
        prop_assert_eq!(signal.len(), (sample_rate * duration).round() as usize);
        prop_assert!((signal.peak() - 1.0).abs() < 1e-6);
    }
}

#[test]
fn test_huge_weights_still_peak_at_one() {
    let tones = ToneSpec::from_parallel(&[100.0, 100.0], &[1e308, 1e308]).unwrap();
    let signal = synthesize(&tones, &SynthParams::new(8000.0, 0.1)).unwrap();
    assert_eq!(signal.len(), 800);
    assert!(signal.samples().iter().all(|s| s.is_finite()));
    assert_eq!(signal.peak(), 1.0);
}

#[test]
fn test_weights_are_scale_free() {
    let small = ToneSpec::from_parallel(&[440.0, 880.0], &[0.4, 0.2]).unwrap();
    let large = ToneSpec::from_parallel(&[440.0, 880.0], &[4e300, 2e300]).unwrap();
    let params = SynthParams::new(8000.0, 0.05);
    let a = synthesize(&small, &params).unwrap();
    let b = synthesize(&large, &params).unwrap();
    for (x, y) in a.samples().iter().zip(b.samples()) {
        assert!((x - y).abs() < 1e-6);
    }
}

#[test]
fn test_peak_reports_nan() {
    let signal = Signal::new(vec![0.5, f32::NAN, 0.25], 8000.0);
    assert!(signal.peak().is_nan());
}
