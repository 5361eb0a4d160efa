use crate::scalc::SpectrogramData;
use hsl::HSL;
use image::{Rgb, RgbImage};

/// RGB color used for gradient stops
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Color {
    r: u8,
    g: u8,
    b: u8,
}

impl Color {
    const fn new(r: u8, g: u8, b: u8) -> Self { Self { r, g, b } }
    const fn new_rgb(rgb: u32) -> Self {
        Self {
            r: ((rgb >> 16) & 0xFF) as u8,
            g: ((rgb >>  8) & 0xFF) as u8,
            b: (rgb         & 0xFF) as u8,
        }
    }
}

/// Supported color schemes for spectrogram rendering
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Debug, Default)]
pub enum ColorScheme {
    #[default]
    Viridis,   // #440154, #3b528b, #21918c, #5ec962, #fde725
    Inferno,   // #000004, #3b0f70, #ac255e, #f98e09, #fcfd21
    Oceanic,   // #01041B, #072e69, #4da4d5, #dcf3ff
    Grayscale, // #000000, #888888, #ffffff
}

const VIRIDIS: [Color; 5] = [
    Color::new_rgb(0x440154),
    Color::new_rgb(0x3b528b),
    Color::new_rgb(0x21918c),
    Color::new_rgb(0x5ec962),
    Color::new_rgb(0xfde725),
];

const INFERNO: [Color; 5] = [
    Color::new_rgb(0x000004),
    Color::new_rgb(0x3b0f70),
    Color::new_rgb(0xac255e),
    Color::new_rgb(0xf98e09),
    Color::new_rgb(0xfcfd21),
];

const OCEANIC: [Color; 4] = [
    Color::new_rgb(0x01041B),
    Color::new_rgb(0x072e69),
    Color::new_rgb(0x4da4d5),
    Color::new_rgb(0xdcf3ff),
];

const GRAYSCALE: [Color; 3] = [
    Color::new_rgb(0x000000),
    Color::new_rgb(0x888888),
    Color::new_rgb(0xffffff),
];

fn get_color_stops(scheme: ColorScheme) -> &'static [Color] {
    match scheme {
        ColorScheme::Viridis   => &VIRIDIS,
        ColorScheme::Inferno   => &INFERNO,
        ColorScheme::Oceanic   => &OCEANIC,
        ColorScheme::Grayscale => &GRAYSCALE,
    }
}

/// How the dB values are mapped onto the gradient
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DynamicRange {
    /// From the quietest to the loudest cell of the frame
    Auto,
    /// The top `x` dB below the loudest cell; anything quieter is clamped
    Decibels(f32),
}

const GRADIENT_SIZE: usize = 256;

/// Precomputed lookup table for one color scheme
struct Colormap {
    table: [Color; GRADIENT_SIZE],
}

impl Colormap {
    fn new(scheme: ColorScheme) -> Self {
        Self { table: generate_gradient_hsl(get_color_stops(scheme)) }
    }

    /// Color for a value in [0, 1]; out-of-range values are clamped
    fn color(&self, normalized: f32) -> Rgb<u8> {
        let idx = (normalized.clamp(0.0, 1.0) * (GRADIENT_SIZE as f32 - 1.0)).round() as usize;
        let c = self.table[idx.min(GRADIENT_SIZE - 1)];
        Rgb([c.r, c.g, c.b])
    }
}

/// Render a spectrogram as a heat map
///
/// - `spec_data`: magnitude grid, shown as `10*log10(m^2 + eps)`
/// - `width`, `height`: output image size in pixels
/// - `color_scheme`: gradient to use
/// - `dynamic_range`: span of dB values covered by the gradient
///
/// Low frequencies are at the bottom, time runs left to right.
pub fn create_spectrogram_image(
    spec_data: &SpectrogramData,
    width: u32,
    height: u32,
    color_scheme: ColorScheme,
    dynamic_range: DynamicRange,
) -> RgbImage {
    let colormap = Colormap::new(color_scheme);
    let mut img = RgbImage::new(width, height);

    let db = spec_data.to_db();
    if db.is_empty() || db[0].is_empty() {
        return img;
    }

    let master_width  = db.len();
    let master_height = db[0].len();

    let cells = || db.iter().flat_map(|col| col.iter()).cloned();
    let max_db = cells().fold(f32::MIN, f32::max);
    let min_db = match dynamic_range {
        DynamicRange::Auto => cells().fold(f32::MAX, f32::min),
        DynamicRange::Decibels(range) => max_db - range,
    };
    // Flat data maps to the bottom of the gradient
    let span = if max_db > min_db { max_db - min_db } else { 1.0 };

    for x in 0..width {
        // Columns of master data covered by this pixel column
        let start_col = (x as usize * master_width) / width as usize;
        let end_col = ((x as usize + 1) * master_width) / width as usize;
        let end_col = end_col.max(start_col + 1).min(master_width);

        for y in 0..height {
            // Nearest neighbour on the frequency axis, inverted so row 0 is at the bottom
            let freq_bin_index = ((height - 1 - y) as usize * master_height) / height as usize;

            // MAX over the covered columns keeps short events visible
            let max_val = db[start_col..end_col]
                .iter()
                .filter_map(|col| col.get(freq_bin_index))
                .cloned()
                .fold(f32::NEG_INFINITY, f32::max);

            img.put_pixel(x, y, colormap.color((max_val - min_db) / span));
        }
    }

    img
}

/// Interpolate between two HSL colors, hue along the short way round the circle
fn lerp_hsl(start: HSL, end: HSL, t: f64) -> HSL {
    let s = start.s + (end.s - start.s) * t;
    let l = start.l + (end.l - start.l) * t;

    let mut h_start = start.h;
    let h_diff = end.h - h_start;
    if h_diff.abs() > 180.0 {
        if h_diff > 0.0 {
            h_start += 360.0;
        } else {
            h_start -= 360.0;
        }
    }
    let h = (h_start + (end.h - h_start) * t).rem_euclid(360.0);

    HSL { h, s, l }
}

/// Generate a smooth HSL gradient from a list of color stops
///
/// - `stops`: reference colors; none gives black, one gives a flat gradient
fn generate_gradient_hsl(stops: &[Color]) -> [Color; GRADIENT_SIZE] {
    match stops {
        [] => return [Color::new(0, 0, 0); GRADIENT_SIZE],
        [only] => return [*only; GRADIENT_SIZE],
        _ => {}
    }

    let hsl_stops: Vec<HSL> = stops.iter()
        .map(|c| HSL::from_rgb(&[c.r, c.g, c.b]))
        .collect();

    let mut gradient = [Color::new(0, 0, 0); GRADIENT_SIZE];
    let num_segments = hsl_stops.len() - 1;

    for (i, slot) in gradient.iter_mut().enumerate() {
        let progress = i as f64 / (GRADIENT_SIZE - 1) as f64;

        let (segment_index, segment_progress) = if progress >= 1.0 {
            (num_segments - 1, 1.0)
        } else {
            let segment_float = progress * num_segments as f64;
            (segment_float.floor() as usize, segment_float.fract())
        };

        let hsl = lerp_hsl(hsl_stops[segment_index], hsl_stops[segment_index + 1], segment_progress);
        let (r, g, b) = hsl.to_rgb();
        *slot = Color::new(r, g, b);
    }

    gradient
}
