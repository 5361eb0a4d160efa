use anyhow::Context;
use image::{Rgb, RgbImage};
use std::path::Path;

const BACKGROUND: Rgb<u8> = Rgb([255, 255, 255]);
const FRAME: Rgb<u8> = Rgb([60, 60, 60]);
const GRID: Rgb<u8> = Rgb([225, 225, 225]);
pub const LINE_BLUE: Rgb<u8> = Rgb([31, 119, 180]);

const MARGIN: u32 = 40;
const PANEL_GAP: u32 = 30;
const TARGET_TICKS: usize = 8;

/// One polyline
#[derive(Debug, Clone)]
pub struct Series {
    pub x: Vec<f64>,
    pub y: Vec<f64>,
    pub color: Rgb<u8>,
}

impl Series {
    pub fn new(x: Vec<f64>, y: Vec<f64>) -> Self {
        Self { x, y, color: LINE_BLUE }
    }
}

/// A single set of axes
#[derive(Debug, Clone, Default)]
pub struct Panel {
    pub title: String,
    pub series: Vec<Series>,
    pub x_limits: Option<(f64, f64)>,
    pub grid: bool,
}

impl Panel {
    pub fn new(title: impl Into<String>) -> Self {
        Self { title: title.into(), ..Default::default() }
    }

    pub fn with_series(mut self, series: Series) -> Self {
        self.series.push(series);
        self
    }

    pub fn with_x_limits(mut self, min: f64, max: f64) -> Self {
        self.x_limits = Some((min, max));
        self
    }

    pub fn with_grid(mut self) -> Self {
        self.grid = true;
        self
    }

    /// Data bounds, honouring x limits; y is padded by 5%
    fn bounds(&self) -> Option<((f64, f64), (f64, f64))> {
        let points = self
            .series
            .iter()
            .flat_map(|s| s.x.iter().copied().zip(s.y.iter().copied()))
            .filter(|(x, y)| x.is_finite() && y.is_finite());

        let mut x_range: Option<(f64, f64)> = None;
        let mut y_range: Option<(f64, f64)> = None;
        for (x, y) in points {
            if let Some((lo, hi)) = self.x_limits {
                if x < lo || x > hi {
                    continue;
                }
            }
            x_range = Some(x_range.map_or((x, x), |(a, b)| (a.min(x), b.max(x))));
            y_range = Some(y_range.map_or((y, y), |(a, b)| (a.min(y), b.max(y))));
        }

        let x_range = self.x_limits.or(x_range)?;
        let (y_lo, y_hi) = y_range?;
        let y_range = if y_hi > y_lo {
            let pad = (y_hi - y_lo) * 0.05;
            (y_lo - pad, y_hi + pad)
        } else {
            (y_lo - 1.0, y_hi + 1.0)
        };
        Some((x_range, y_range))
    }
}

/// Rectangle in pixel space
#[derive(Debug, Clone, Copy)]
struct Area {
    left: u32,
    top: u32,
    width: u32,
    height: u32,
}

impl Area {
    fn contains(&self, x: i64, y: i64) -> bool {
        x >= self.left as i64
            && y >= self.top as i64
            && x < (self.left + self.width) as i64
            && y < (self.top + self.height) as i64
    }
}

/// Stacked panels rendered to a raster image
#[derive(Debug, Clone)]
pub struct Figure {
    pub width: u32,
    pub height: u32,
    pub panels: Vec<Panel>,
}

impl Figure {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height, panels: Vec::new() }
    }

    pub fn with_panel(mut self, panel: Panel) -> Self {
        self.panels.push(panel);
        self
    }

    pub fn render(&self) -> RgbImage {
        let mut img = RgbImage::from_pixel(self.width, self.height, BACKGROUND);
        if self.panels.is_empty() {
            return img;
        }

        let count = self.panels.len() as u32;
        let usable_w = self.width.saturating_sub(2 * MARGIN);
        let usable_h = self
            .height
            .saturating_sub(2 * MARGIN + PANEL_GAP * (count - 1));
        let panel_h = usable_h / count;

        for (i, panel) in self.panels.iter().enumerate() {
            let area = Area {
                left: MARGIN,
                top: MARGIN + i as u32 * (panel_h + PANEL_GAP),
                width: usable_w,
                height: panel_h,
            };
            if area.width < 2 || area.height < 2 {
                continue;
            }
            draw_panel(&mut img, panel, area);
        }
        img
    }

    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        for panel in &self.panels {
            if let Some(((x0, x1), (y0, y1))) = panel.bounds() {
                log::info!(
                    "plot '{}': x [{:.4}, {:.4}], y [{:.4}, {:.4}]",
                    panel.title, x0, x1, y0, y1
                );
            }
        }
        self.render()
            .save(path)
            .with_context(|| format!("cannot save plot to {:?}", path))
    }
}

fn draw_panel(img: &mut RgbImage, panel: &Panel, area: Area) {
    let Some(((x0, x1), (y0, y1))) = panel.bounds() else {
        draw_frame(img, area);
        return;
    };
    let x_span = if x1 > x0 { x1 - x0 } else { 1.0 };
    let y_span = y1 - y0;

    let to_px = |x: f64, y: f64| -> (i64, i64) {
        let px = area.left as f64 + (x - x0) / x_span * (area.width - 1) as f64;
        let py = area.top as f64 + (y1 - y) / y_span * (area.height - 1) as f64;
        (px.round() as i64, py.round() as i64)
    };

    if panel.grid {
        for tick in nice_ticks(x0, x1, TARGET_TICKS) {
            let (px, _) = to_px(tick, y0);
            draw_line(img, area, (px, area.top as i64), (px, (area.top + area.height) as i64), GRID);
        }
        for tick in nice_ticks(y0, y1, TARGET_TICKS) {
            let (_, py) = to_px(x0, tick);
            draw_line(img, area, (area.left as i64, py), ((area.left + area.width) as i64, py), GRID);
        }
    }

    for series in &panel.series {
        let mut previous: Option<(i64, i64)> = None;
        for (&x, &y) in series.x.iter().zip(series.y.iter()) {
            if !x.is_finite() || !y.is_finite() {
                previous = None;
                continue;
            }
            let point = to_px(x, y);
            match previous {
                Some(prev) => draw_line(img, area, prev, point, series.color),
                None => put_clipped(img, area, point.0, point.1, series.color),
            }
            previous = Some(point);
        }
    }

    draw_frame(img, area);
}

fn draw_frame(img: &mut RgbImage, area: Area) {
    let (l, t) = (area.left as i64, area.top as i64);
    let (r, b) = (l + area.width as i64 - 1, t + area.height as i64 - 1);
    draw_line(img, area, (l, t), (r, t), FRAME);
    draw_line(img, area, (l, b), (r, b), FRAME);
    draw_line(img, area, (l, t), (l, b), FRAME);
    draw_line(img, area, (r, t), (r, b), FRAME);
}

fn put_clipped(img: &mut RgbImage, area: Area, x: i64, y: i64, color: Rgb<u8>) {
    if area.contains(x, y) {
        img.put_pixel(x as u32, y as u32, color);
    }
}

/// Bresenham line, clipped to the panel area
fn draw_line(img: &mut RgbImage, area: Area, from: (i64, i64), to: (i64, i64), color: Rgb<u8>) {
    let Some((from, to)) = clip_line(area, from, to) else {
        return;
    };
    let (mut x, mut y) = from;
    let dx = (to.0 - x).abs();
    let dy = -(to.1 - y).abs();
    let sx = if x < to.0 { 1 } else { -1 };
    let sy = if y < to.1 { 1 } else { -1 };
    let mut err = dx + dy;

    loop {
        put_clipped(img, area, x, y, color);
        if x == to.0 && y == to.1 {
            break;
        }
        let e2 = 2 * err;
        if e2 >= dy {
            err += dy;
            x += sx;
        }
        if e2 <= dx {
            err += dx;
            y += sy;
        }
    }
}

const OUT_LEFT: u8 = 1;
const OUT_RIGHT: u8 = 2;
const OUT_ABOVE: u8 = 4;
const OUT_BELOW: u8 = 8;

impl Area {
    fn last_x(&self) -> f64 {
        (self.left + self.width).saturating_sub(1) as f64
    }

    fn last_y(&self) -> f64 {
        (self.top + self.height).saturating_sub(1) as f64
    }

    fn outcode(&self, x: f64, y: f64) -> u8 {
        let mut code = 0;
        if x < self.left as f64 {
            code |= OUT_LEFT;
        } else if x > self.last_x() {
            code |= OUT_RIGHT;
        }
        if y < self.top as f64 {
            code |= OUT_ABOVE;
        } else if y > self.last_y() {
            code |= OUT_BELOW;
        }
        code
    }
}

/// Cohen-Sutherland: the part of the segment inside `area`, if any
fn clip_line(area: Area, from: (i64, i64), to: (i64, i64)) -> Option<((i64, i64), (i64, i64))> {
    let (mut x0, mut y0) = (from.0 as f64, from.1 as f64);
    let (mut x1, mut y1) = (to.0 as f64, to.1 as f64);
    let mut code0 = area.outcode(x0, y0);
    let mut code1 = area.outcode(x1, y1);

    loop {
        if code0 | code1 == 0 {
            return Some((
                (x0.round() as i64, y0.round() as i64),
                (x1.round() as i64, y1.round() as i64),
            ));
        }
        if code0 & code1 != 0 {
            return None;
        }

        let out = if code0 != 0 { code0 } else { code1 };
        let (x, y) = if out & OUT_ABOVE != 0 {
            let y = area.top as f64;
            (x0 + (x1 - x0) * (y - y0) / (y1 - y0), y)
        } else if out & OUT_BELOW != 0 {
            let y = area.last_y();
            (x0 + (x1 - x0) * (y - y0) / (y1 - y0), y)
        } else if out & OUT_RIGHT != 0 {
            let x = area.last_x();
            (x, y0 + (y1 - y0) * (x - x0) / (x1 - x0))
        } else {
            let x = area.left as f64;
            (x, y0 + (y1 - y0) * (x - x0) / (x1 - x0))
        };

        if out == code0 {
            (x0, y0) = (x, y);
            code0 = area.outcode(x0, y0);
        } else {
            (x1, y1) = (x, y);
            code1 = area.outcode(x1, y1);
        }
    }
}

/// Round tick positions (steps of 1, 2 or 5 times a power of ten) inside [min, max]
pub fn nice_ticks(min: f64, max: f64, target: usize) -> Vec<f64> {
    if !(max > min) || target == 0 {
        return Vec::new();
    }
    let raw_step = (max - min) / target as f64;
    let magnitude = 10f64.powi(raw_step.log10().floor() as i32);
    let step = [1.0, 2.0, 5.0, 10.0]
        .iter()
        .map(|m| m * magnitude)
        .find(|s| *s >= raw_step * (1.0 - 1e-9))
        .unwrap_or(10.0 * magnitude);

    let first = (min / step).ceil() as i64;
    let last = (max / step).floor() as i64;
    (first..=last).map(|i| i as f64 * step).collect()
}

/// Parses "WxH" pixel sizes, falling back to the given default
pub fn parse_image_size(s: &str, default: (u32, u32)) -> (u32, u32) {
    let parts: Vec<&str> = s.split('x').collect();
    if parts.len() == 2 {
        let w = parts[0].parse().ok().filter(|&w| w > 0).unwrap_or(default.0);
        let h = parts[1].parse().ok().filter(|&h| h > 0).unwrap_or(default.1);
        (w, h)
    } else {
        default
    }
}
