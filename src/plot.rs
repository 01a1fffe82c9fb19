use anyhow::{Result, ensure};
use embedded_graphics::{
    pixelcolor::{Rgb888, RgbColor},
    prelude::{Drawable, Primitive},
    primitives::{Line, PrimitiveStyle},
    text::{Alignment, Baseline, TextStyleBuilder},
};
use image::RgbImage;
use serde::{Deserialize, Serialize};

use crate::raster::{Raster, TextFont, draw_text, snap, stroke_px};
use crate::ticks::{MultipleLocator, format_tick};

pub const POINTS_PER_INCH: f64 = 72.0;

// Default subplot box, as fractions of the figure
const SUBPLOT_LEFT: f64 = 0.125;
const SUBPLOT_RIGHT: f64 = 0.9;
const SUBPLOT_BOTTOM: f64 = 0.11;
const SUBPLOT_TOP: f64 = 0.88;

pub const BACKGROUND: Rgb888 = Rgb888::BLACK;
pub const FOREGROUND: Rgb888 = Rgb888::WHITE;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rect {
    pub left: f64,
    pub top: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub const fn new(left: f64, top: f64, width: f64, height: f64) -> Self {
        Self {
            left,
            top,
            width,
            height,
        }
    }

    pub fn right(&self) -> f64 {
        self.left + self.width
    }

    pub fn bottom(&self) -> f64 {
        self.top + self.height
    }

    pub fn center(&self) -> Point {
        Point::new(self.left + self.width / 2.0, self.top + self.height / 2.0)
    }
}

/// The value range the number line is built around, in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AxisRange {
    pub min: f64,
    pub max: f64,
}

impl AxisRange {
    pub const fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    /// Magnitude of the lower bound; every other size on the figure is a
    /// multiple of it.
    pub fn unit(&self) -> f64 {
        self.min.abs()
    }

    /// Value `index` of `steps + 1` evenly spaced values from `min` to `max`,
    /// endpoints included. `None` past the last one.
    pub fn step_value(&self, index: u32, steps: u32) -> Option<f64> {
        if steps == 0 || index > steps {
            return None;
        }
        let span = self.max - self.min;
        Some(self.min + span * index as f64 / steps as f64)
    }
}

impl Default for AxisRange {
    fn default() -> Self {
        Self::new(-500.0, 500.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TickStyle {
    pub length_pt: f64,
    pub width_pt: f64,
    /// Distance from the spine to the labels. Negative values put the labels
    /// inside the axes.
    pub pad_pt: f64,
    pub color: Rgb888,
}

impl Default for TickStyle {
    fn default() -> Self {
        Self {
            length_pt: 20.0,
            width_pt: 2.0,
            pad_pt: -36.0,
            color: FOREGROUND,
        }
    }
}

/// Size and resolution of the rendered figure.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FigureLayout {
    pub size_inches: (f64, f64),
    pub dpi: f64,
    pub font_size_pt: f64,
}

impl Default for FigureLayout {
    fn default() -> Self {
        Self {
            size_inches: (8.0, 4.5),
            dpi: 240.0,
            font_size_pt: 16.0,
        }
    }
}

/// A number line through the origin with everything but the x axis hidden.
#[derive(Debug, Clone, PartialEq)]
pub struct Figure {
    pub range: AxisRange,
    pub layout: FigureLayout,
    pub xlim: (f64, f64),
    pub ylim: (f64, f64),
    /// Axes box in pixels, already shrunk to keep one data unit square.
    pub axes: Rect,
    pub major: MultipleLocator,
    pub minor: MultipleLocator,
    pub ticks: TickStyle,
    pub spine_width_pt: f64,
}

pub fn base_plot(range: AxisRange, layout: FigureLayout) -> Result<Figure> {
    ensure!(
        range.min.is_finite() && range.max.is_finite(),
        "Axis range must be finite, got {:?}",
        range
    );
    ensure!(
        range.min != 0.0,
        "Axis range minimum must be non-zero, tick spacing is derived from it"
    );
    ensure!(
        range.min < range.max,
        "Axis range minimum {} must be below maximum {}",
        range.min,
        range.max
    );
    ensure!(
        layout.dpi > 0.0 && layout.size_inches.0 > 0.0 && layout.size_inches.1 > 0.0,
        "Figure size and dpi must be positive"
    );

    let unit = range.unit();
    let xlim = (range.min - 0.2 * unit, range.max + 0.2 * unit);
    let ylim = (-0.5625 * unit, 0.5625 * unit);

    let (fig_w, fig_h) = figure_pixels(layout);
    let (fig_w, fig_h) = (fig_w as f64, fig_h as f64);
    let subplot = Rect::new(
        SUBPLOT_LEFT * fig_w,
        (1.0 - SUBPLOT_TOP) * fig_h,
        (SUBPLOT_RIGHT - SUBPLOT_LEFT) * fig_w,
        (SUBPLOT_TOP - SUBPLOT_BOTTOM) * fig_h,
    );
    let axes = equal_aspect_box(subplot, xlim, ylim);

    log::debug!(
        "Figure {}x{} px, axes {:?}, xlim {:?}, ylim {:?}",
        fig_w,
        fig_h,
        axes,
        xlim,
        ylim
    );

    Ok(Figure {
        range,
        layout,
        xlim,
        ylim,
        axes,
        major: MultipleLocator::new(unit),
        minor: MultipleLocator::new(unit * 0.1),
        ticks: TickStyle::default(),
        spine_width_pt: 0.8,
    })
}

fn figure_pixels(layout: FigureLayout) -> (u32, u32) {
    let w = (layout.size_inches.0 * layout.dpi).round() as u32;
    let h = (layout.size_inches.1 * layout.dpi).round() as u32;
    (w, h)
}

/// Shrinks `bounds` about its center until x and y data units have the same
/// pixel length.
fn equal_aspect_box(bounds: Rect, xlim: (f64, f64), ylim: (f64, f64)) -> Rect {
    let data_ratio = (ylim.1 - ylim.0) / (xlim.1 - xlim.0);
    let (width, height) = if bounds.height / bounds.width > data_ratio {
        (bounds.width, bounds.width * data_ratio)
    } else {
        (bounds.height / data_ratio, bounds.height)
    };
    let center = bounds.center();
    Rect::new(
        center.x - width / 2.0,
        center.y - height / 2.0,
        width,
        height,
    )
}

impl Figure {
    pub fn pixel_size(&self) -> (u32, u32) {
        figure_pixels(self.layout)
    }

    pub fn points_to_pixels(&self, points: f64) -> f64 {
        points * self.layout.dpi / POINTS_PER_INCH
    }

    /// Maps data coordinates to pixel coordinates (y grows downwards).
    pub fn to_pixel(&self, p: Point) -> Point {
        let fx = (p.x - self.xlim.0) / (self.xlim.1 - self.xlim.0);
        let fy = (self.ylim.1 - p.y) / (self.ylim.1 - self.ylim.0);
        Point::new(
            self.axes.left + fx * self.axes.width,
            self.axes.top + fy * self.axes.height,
        )
    }

    /// Pixel row of the bottom spine, which sits at the vertical center.
    pub fn spine_y(&self) -> f64 {
        self.axes.top + self.axes.height / 2.0
    }

    pub fn major_ticks(&self) -> Vec<f64> {
        self.major.tick_values(self.xlim.0, self.xlim.1)
    }

    /// Minor tick positions that do not coincide with a major tick.
    pub fn minor_ticks(&self) -> Vec<f64> {
        let major = self.major_ticks();
        let tolerance = self.minor.base * 1e-6;
        self.minor
            .tick_values(self.xlim.0, self.xlim.1)
            .into_iter()
            .filter(|m| !major.iter().any(|t| (t - m).abs() < tolerance))
            .collect()
    }

    pub fn major_tick_labels(&self) -> Vec<(f64, String)> {
        self.major_ticks()
            .into_iter()
            .map(|t| (t, format_tick(t)))
            .collect()
    }

    pub fn text_font(&self, font_size_pt: f64) -> TextFont {
        TextFont::for_pixels(self.points_to_pixels(font_size_pt))
    }

    /// Renders the static part of the figure: background, spine, ticks and
    /// tick labels.
    pub fn render_background(&self) -> Result<RgbImage> {
        let (w, h) = self.pixel_size();
        let mut raster = Raster::new(w, h, BACKGROUND);

        let spine_y = self.spine_y();
        let spine = PrimitiveStyle::with_stroke(
            FOREGROUND,
            stroke_px(self.points_to_pixels(self.spine_width_pt)),
        );
        Line::new(
            snap(Point::new(self.axes.left, spine_y)),
            snap(Point::new(self.axes.right(), spine_y)),
        )
        .into_styled(spine)
        .draw(&mut raster)?;

        // Ticks point into the axes, i.e. upwards from the spine
        let tick_len = self.points_to_pixels(self.ticks.length_pt);
        let tick = PrimitiveStyle::with_stroke(
            self.ticks.color,
            stroke_px(self.points_to_pixels(self.ticks.width_pt)),
        );
        for x in self.major_ticks().into_iter().chain(self.minor_ticks()) {
            let px = self.to_pixel(Point::new(x, 0.0)).x;
            Line::new(
                snap(Point::new(px, spine_y)),
                snap(Point::new(px, spine_y - tick_len)),
            )
            .into_styled(tick)
            .draw(&mut raster)?;
        }

        let font = self.text_font(self.layout.font_size_pt);
        let label_style = TextStyleBuilder::new()
            .alignment(Alignment::Center)
            .baseline(Baseline::Top)
            .build();
        let label_top = spine_y + self.points_to_pixels(self.ticks.pad_pt);
        for (x, label) in self.major_tick_labels() {
            let px = self.to_pixel(Point::new(x, 0.0)).x;
            draw_text(
                &mut raster,
                &label,
                snap(Point::new(px, label_top)),
                font,
                label_style,
                FOREGROUND,
            )?;
        }

        Ok(raster.into_image())
    }
}
