use std::convert::Infallible;

use embedded_graphics::{
    mono_font::{
        MonoFont, MonoTextStyle,
        ascii::{FONT_6X10, FONT_8X13, FONT_10X20},
    },
    pixelcolor::{Rgb888, RgbColor},
    prelude::{Dimensions, DrawTarget, Drawable, OriginDimensions, Pixel, Point, Size},
    primitives::Rectangle,
    text::{Text, TextStyle},
};
use image::{Rgb, RgbImage};

use crate::plot;

const FONTS: [&MonoFont<'static>; 3] = [&FONT_6X10, &FONT_8X13, &FONT_10X20];

pub fn to_rgb(color: Rgb888) -> Rgb<u8> {
    Rgb([color.r(), color.g(), color.b()])
}

/// Nearest pixel to a point in pixel coordinates.
pub fn snap(p: plot::Point) -> Point {
    Point::new(p.x.round() as i32, p.y.round() as i32)
}

pub fn pixel_rect(rect: plot::Rect) -> Rectangle {
    let top_left = snap(plot::Point::new(rect.left, rect.top));
    let bottom_right = snap(plot::Point::new(rect.right(), rect.bottom()));
    let size = bottom_right - top_left;
    Rectangle::new(
        top_left,
        Size::new(size.x.max(0) as u32, size.y.max(0) as u32),
    )
}

/// Stroke width in whole pixels, never thinner than one pixel.
pub fn stroke_px(width: f64) -> u32 {
    width.round().max(1.0) as u32
}

/// An `RgbImage` as an embedded-graphics draw target.
///
/// Pixels outside the image are dropped. Colors are blended over the existing
/// pixels with the current opacity.
pub struct Raster {
    image: RgbImage,
    opacity: f32,
}

impl Raster {
    pub fn new(width: u32, height: u32, background: Rgb888) -> Self {
        Self::from_image(RgbImage::from_pixel(width, height, to_rgb(background)))
    }

    pub fn from_image(image: RgbImage) -> Self {
        Self {
            image,
            opacity: 1.0,
        }
    }

    pub fn into_image(self) -> RgbImage {
        self.image
    }

    pub fn set_opacity(&mut self, opacity: f32) {
        self.opacity = opacity.clamp(0.0, 1.0);
    }
}

impl OriginDimensions for Raster {
    fn size(&self) -> Size {
        Size::new(self.image.width(), self.image.height())
    }
}

impl DrawTarget for Raster {
    type Color = Rgb888;
    type Error = Infallible;

    fn draw_iter<I>(&mut self, pixels: I) -> Result<(), Self::Error>
    where
        I: IntoIterator<Item = Pixel<Self::Color>>,
    {
        let (width, height) = self.image.dimensions();
        let alpha = self.opacity;
        for Pixel(point, color) in pixels {
            let (Ok(x), Ok(y)) = (u32::try_from(point.x), u32::try_from(point.y)) else {
                continue;
            };
            if x >= width || y >= height {
                continue;
            }
            let src = to_rgb(color);
            let dst = self.image.get_pixel_mut(x, y);
            if alpha >= 1.0 {
                *dst = src;
                continue;
            }
            for (d, s) in dst.0.iter_mut().zip(src.0) {
                *d = (s as f32 * alpha + *d as f32 * (1.0 - alpha)).round() as u8;
            }
        }
        Ok(())
    }
}

/// Draws every pixel as a `scale` x `scale` block, growing away from `origin`.
struct Magnified<'a, T> {
    target: &'a mut T,
    origin: Point,
    scale: u32,
}

impl<T: DrawTarget> Dimensions for Magnified<'_, T> {
    fn bounding_box(&self) -> Rectangle {
        self.target.bounding_box()
    }
}

impl<T: DrawTarget> DrawTarget for Magnified<'_, T> {
    type Color = T::Color;
    type Error = T::Error;

    fn draw_iter<I>(&mut self, pixels: I) -> Result<(), Self::Error>
    where
        I: IntoIterator<Item = Pixel<Self::Color>>,
    {
        let block = Size::new_equal(self.scale);
        for Pixel(point, color) in pixels {
            let top_left = self.origin + (point - self.origin) * self.scale as i32;
            self.target
                .fill_solid(&Rectangle::new(top_left, block), color)?;
        }
        Ok(())
    }
}

/// A built-in mono font and the whole-pixel magnification it is drawn at.
#[derive(Debug, Clone, Copy)]
pub struct TextFont {
    pub font: &'static MonoFont<'static>,
    pub scale: u32,
}

impl TextFont {
    /// The font and scale whose line height comes closest to `font_px`.
    pub fn for_pixels(font_px: f64) -> Self {
        let candidates = FONTS.into_iter().map(|font| {
            let cell = font.character_size.height as f64;
            let scale = (font_px / cell).round().max(1.0) as u32;
            TextFont { font, scale }
        });
        candidates
            .min_by(|a, b| {
                let da = (a.line_height() as f64 - font_px).abs();
                let db = (b.line_height() as f64 - font_px).abs();
                da.total_cmp(&db)
            })
            .unwrap_or(TextFont {
                font: &FONT_6X10,
                scale: 1,
            })
    }

    pub fn line_height(&self) -> u32 {
        self.font.character_size.height * self.scale
    }

    /// Pixel width of the widest line of `text`.
    pub fn block_width(&self, text: &str) -> u32 {
        let advance = self.font.character_size.width + self.font.character_spacing;
        let columns = text.lines().map(|l| l.chars().count()).max().unwrap_or(0) as u32;
        columns * advance * self.scale
    }
}

/// Draws `text` at `position`, magnified about that point.
pub fn draw_text<T>(
    target: &mut T,
    text: &str,
    position: Point,
    font: TextFont,
    style: TextStyle,
    color: T::Color,
) -> Result<(), T::Error>
where
    T: DrawTarget<Color = Rgb888>,
{
    let mut magnified = Magnified {
        target,
        origin: position,
        scale: font.scale,
    };
    Text::with_text_style(text, position, MonoTextStyle::new(font.font, color), style)
        .draw(&mut magnified)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use embedded_graphics::{
        prelude::{DrawTargetExt, Primitive},
        primitives::{Line, PrimitiveStyle, Triangle},
        text::{Alignment, Baseline, TextStyleBuilder},
    };

    fn lit(image: &RgbImage, color: Rgb888) -> Vec<(u32, u32)> {
        image
            .enumerate_pixels()
            .filter(|(_, _, p)| **p == to_rgb(color))
            .map(|(x, y, _)| (x, y))
            .collect()
    }

    #[test]
    fn opacity_blends_over_background() {
        let mut raster = Raster::new(4, 4, Rgb888::BLACK);
        raster.set_opacity(0.6);
        Rectangle::new(Point::new(1, 1), Size::new(2, 2))
            .into_styled(PrimitiveStyle::with_fill(Rgb888::RED))
            .draw(&mut raster)
            .unwrap();
        let image = raster.into_image();
        assert_eq!(*image.get_pixel(1, 1), Rgb([153, 0, 0]));
        assert_eq!(*image.get_pixel(0, 0), Rgb([0, 0, 0]));
    }

    #[test]
    fn pixels_outside_the_image_are_dropped() {
        let mut raster = Raster::new(8, 8, Rgb888::BLACK);
        Line::new(Point::new(-5, 3), Point::new(20, 3))
            .into_styled(PrimitiveStyle::with_stroke(Rgb888::WHITE, 1))
            .draw(&mut raster)
            .unwrap();
        assert_eq!(lit(&raster.into_image(), Rgb888::WHITE).len(), 8);
    }

    #[test]
    fn clipping_keeps_shapes_inside() {
        let mut raster = Raster::new(20, 20, Rgb888::BLACK);
        let clip = pixel_rect(plot::Rect::new(5.0, 5.0, 10.0, 10.0));
        Triangle::new(Point::new(0, 0), Point::new(19, 0), Point::new(10, 19))
            .into_styled(PrimitiveStyle::with_fill(Rgb888::RED))
            .draw(&mut raster.clipped(&clip))
            .unwrap();
        let red = lit(&raster.into_image(), Rgb888::RED);
        assert!(!red.is_empty());
        assert!(red.iter().all(|&(x, y)| (5..15).contains(&x) && (5..15).contains(&y)));
    }

    #[test]
    fn font_follows_pixel_size() {
        let small = TextFont::for_pixels(6.0);
        assert_eq!(small.scale, 1);
        assert_eq!(small.line_height(), 10);

        // 16 pt at 240 dpi
        let large = TextFont::for_pixels(16.0 * 240.0 / 72.0);
        assert!((large.line_height() as f64 - 53.3).abs() < 5.0);
        assert!(large.scale > 1);
    }

    #[test]
    fn block_width_uses_widest_line() {
        let font = TextFont {
            font: &FONT_6X10,
            scale: 2,
        };
        assert_eq!(font.block_width("ab\nabcd"), 4 * 6 * 2);
        assert_eq!(font.block_width(""), 0);
    }

    #[test]
    fn magnified_text_is_centered_on_position() {
        let mut raster = Raster::new(60, 30, Rgb888::BLACK);
        let font = TextFont {
            font: &FONT_6X10,
            scale: 3,
        };
        let style = TextStyleBuilder::new()
            .alignment(Alignment::Center)
            .baseline(Baseline::Top)
            .build();
        draw_text(&mut raster, "8", Point::new(30, 0), font, style, Rgb888::WHITE).unwrap();

        let white = lit(&raster.into_image(), Rgb888::WHITE);
        assert!(!white.is_empty());
        let left = white.iter().map(|p| p.0).min().unwrap();
        let right = white.iter().map(|p| p.0).max().unwrap();
        assert!(left >= 30 - 9 && right < 30 + 9);
        // Whole blocks only
        assert_eq!(white.len() % 9, 0);
    }

    #[test]
    fn every_formatted_number_has_glyphs() {
        let font = TextFont {
            font: &FONT_6X10,
            scale: 1,
        };
        let style = TextStyleBuilder::new().baseline(Baseline::Top).build();
        for text in ["nan", "inf", "-1e+06"] {
            let mut raster = Raster::new(48, 12, Rgb888::BLACK);
            draw_text(&mut raster, text, Point::new(0, 0), font, style, Rgb888::WHITE).unwrap();
            let white = lit(&raster.into_image(), Rgb888::WHITE);
            // Every character cell has ink
            for cell in 0..text.len() as u32 {
                assert!(
                    white.iter().any(|&(x, _)| x / 6 == cell),
                    "{text:?} cell {cell}"
                );
            }
        }
    }
}
