use std::{fmt, io::Write};

use anyhow::{Context, Result, ensure};
use embedded_graphics::{
    pixelcolor::{Rgb888, RgbColor},
    prelude::{DrawTargetExt, Drawable, Primitive, Size},
    primitives::{PrimitiveStyle, PrimitiveStyleBuilder, Rectangle, Triangle},
    text::{Alignment, Baseline, TextStyleBuilder},
};
use image::RgbImage;

use crate::config::RenderConfig;
use crate::encoder::FrameSink;
use crate::plot::{AxisRange, FOREGROUND, Figure, Point};
use crate::raster::{Raster, TextFont, draw_text, pixel_rect, snap, stroke_px};

pub const MARKER_COLOR: Rgb888 = Rgb888::RED;
const LINE_ALPHA: f32 = 0.6;
const LINE_WIDTH_PT: f64 = 2.0;
const EDGE_WIDTH_PT: f64 = 1.0;
/// Annotation anchor relative to the trailing triangle corner, in data units.
const LABEL_OFFSET: Point = Point::new(5.0, -27.0);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    VideoAhead,
    AudioAhead,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OffsetLabel {
    pub direction: Direction,
    pub millis: i64,
}

impl fmt::Display for OffsetLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.direction {
            Direction::VideoAhead => write!(f, "{:04} ms\nVideo ahead", self.millis),
            Direction::AudioAhead => write!(f, "{:03} ms\nAudio ahead", self.millis),
        }
    }
}

/// Everything that moves in one frame, in data coordinates.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameState {
    pub index: u32,
    pub line_x: f64,
    pub line: [Point; 2],
    /// Horizontal shift applied to the triangle.
    pub shift: f64,
    pub triangle: [Point; 3],
    pub label: OffsetLabel,
}

impl FrameState {
    /// The triangle corner touching the number line.
    pub fn apex(&self) -> Point {
        self.triangle[1]
    }

    /// Baseline start of the annotation's first line.
    pub fn label_anchor(&self) -> Point {
        let corner = self.triangle[2];
        Point::new(corner.x + LABEL_OFFSET.x, corner.y + LABEL_OFFSET.y)
    }
}

/// Marker shapes at frame 0 and how they move.
#[derive(Debug, Clone, PartialEq)]
pub struct MarkerGeometry {
    pub triangle: [Point; 3],
    pub shift_per_frame: f64,
    pub line_height: f64,
    range: AxisRange,
    steps: u32,
}

impl MarkerGeometry {
    pub fn new(range: AxisRange, steps: u32) -> Self {
        let (min, unit) = (range.min, range.unit());
        Self {
            triangle: [
                Point::new(min - 0.2 * min, -0.2 * unit),
                Point::new(min, 0.0),
                Point::new(min + 0.2 * min, -0.2 * unit),
            ],
            shift_per_frame: 0.01 * unit,
            line_height: 0.1 * unit,
            range,
            steps,
        }
    }

    /// State of frame `index`, or `None` past the last interpolation step.
    pub fn frame(&self, index: u32) -> Option<FrameState> {
        let line_x = self.range.step_value(index, self.steps)?;
        let shift = index as f64 * self.shift_per_frame;
        let triangle = self.triangle.map(|p| Point::new(p.x + shift, p.y));
        let direction = if triangle[1].x < 0.0 {
            Direction::VideoAhead
        } else {
            Direction::AudioAhead
        };

        Some(FrameState {
            index,
            line_x,
            line: [
                Point::new(line_x, 0.0),
                Point::new(line_x, self.line_height),
            ],
            shift,
            triangle,
            label: OffsetLabel {
                direction,
                millis: line_x.trunc() as i64,
            },
        })
    }
}

/// Draws the moving parts over a pre-rendered figure, frame by frame.
pub struct Animator<'a> {
    figure: &'a Figure,
    geometry: MarkerGeometry,
    frames: u32,
    steps: u32,
    annotation_font: TextFont,
    background: RgbImage,
}

impl<'a> Animator<'a> {
    pub fn new(
        figure: &'a Figure,
        frames: u32,
        steps: u32,
        annotation_font_size: f64,
    ) -> Result<Self> {
        ensure!(frames > 0, "Nothing to animate with 0 frames");
        ensure!(
            steps > 0 && u64::from(frames) <= u64::from(steps) + 1,
            "{} frames need at least {} interpolation steps",
            frames,
            frames - 1
        );

        Ok(Self {
            figure,
            geometry: MarkerGeometry::new(figure.range, steps),
            frames,
            steps,
            annotation_font: figure.text_font(annotation_font_size),
            background: figure
                .render_background()
                .context("Failed to render figure background")?,
        })
    }

    pub fn from_config(figure: &'a Figure, config: &RenderConfig) -> Result<Self> {
        Self::new(
            figure,
            config.frames,
            config.steps,
            config.annotation_font_size,
        )
    }

    pub fn geometry(&self) -> &MarkerGeometry {
        &self.geometry
    }

    #[cfg(test)]
    fn background(&self) -> &RgbImage {
        &self.background
    }

    pub fn states(&self) -> impl Iterator<Item = FrameState> + '_ {
        (0..self.frames).filter_map(|i| self.geometry.frame(i))
    }

    pub fn render(&self, state: &FrameState) -> Result<RgbImage> {
        let figure = self.figure;
        let mut raster = Raster::from_image(self.background.clone());

        // Marker shapes stay inside the axes, the annotation does not
        let axes = pixel_rect(figure.axes);

        let [a, b, c] = state.triangle.map(|p| snap(figure.to_pixel(p)));
        let marker = PrimitiveStyleBuilder::new()
            .fill_color(MARKER_COLOR)
            .stroke_color(MARKER_COLOR)
            .stroke_width(stroke_px(figure.points_to_pixels(EDGE_WIDTH_PT)))
            .build();
        Triangle::new(a, b, c)
            .into_styled(marker)
            .draw(&mut raster.clipped(&axes))?;

        // The line is vertical, so it is drawn as a rectangle with butt ends
        let [bottom, top] = state.line.map(|p| figure.to_pixel(p));
        let width = stroke_px(figure.points_to_pixels(LINE_WIDTH_PT));
        let top_left = snap(Point::new(top.x - width as f64 / 2.0, top.y));
        let height = (snap(bottom).y - top_left.y).max(0) as u32;
        raster.set_opacity(LINE_ALPHA);
        Rectangle::new(top_left, Size::new(width, height))
            .into_styled(PrimitiveStyle::with_fill(MARKER_COLOR))
            .draw(&mut raster.clipped(&axes))?;
        raster.set_opacity(1.0);

        // First line's baseline at the anchor, lines centered over each other
        let text = state.label.to_string();
        let anchor = figure.to_pixel(state.label_anchor());
        let font = self.annotation_font;
        let center_x = anchor.x + font.block_width(&text) as f64 / 2.0;
        let style = TextStyleBuilder::new()
            .alignment(Alignment::Center)
            .baseline(Baseline::Alphabetic)
            .build();
        draw_text(
            &mut raster,
            &text,
            snap(Point::new(center_x, anchor.y)),
            font,
            style,
            FOREGROUND,
        )?;

        Ok(raster.into_image())
    }

    /// Renders every frame into `sink`, then finishes it.
    ///
    /// A carriage-return progress percentage is written to `progress` after
    /// each frame.
    pub fn run(&self, sink: &mut dyn FrameSink, progress: &mut dyn Write) -> Result<u32> {
        let (width, height) = self.figure.pixel_size();
        log::info!("###############################");
        log::info!(
            "[0/2] Start rendering {} frames at {}x{}",
            self.frames,
            width,
            height
        );

        let mut rendered = 0;
        for state in self.states() {
            let frame = self.render(&state)?;
            sink.push_frame(&frame)
                .with_context(|| format!("Failed to emit frame {}", state.index))?;
            rendered += 1;

            write!(
                progress,
                "\r{:.0}%",
                state.index as f64 * 100.0 / self.steps as f64
            )?;
            progress.flush()?;
        }
        writeln!(progress)?;

        log::info!("[1/2] Rendered {} frames, finishing output", rendered);
        sink.finish()?;
        log::info!("[2/2] Finished rendering");

        Ok(rendered)
    }
}

/// Renders the configured animation over `figure` into `sink`.
pub fn movie(
    figure: &Figure,
    config: &RenderConfig,
    sink: &mut dyn FrameSink,
    progress: &mut dyn Write,
) -> Result<u32> {
    Animator::from_config(figure, config)?.run(sink, progress)
}
