//! Shotwell's red-eye reduction operator.
//!
//! Each eye is a circle. Inside it the red channel is replaced by the mean
//! of green and blue, which keeps the pupil's achromatic intensity while
//! removing the red flare.

use image::{DynamicImage, ImageBuffer, Pixel};
use std::fmt;

/// Largest centre coordinate accepted from a descriptor.
pub const MAX_CENTER: i64 = u32::MAX as i64;
/// Largest radius accepted from a descriptor, the JPEG dimension limit.
pub const MAX_RADIUS: i64 = u16::MAX as i64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Eye {
    pub x: i64,
    pub y: i64,
    pub radius: i64,
}

impl fmt::Display for Eye {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{}+{}", self.x, self.y, self.radius)
    }
}

/// Channel types whose green/blue mean can be computed in native depth.
trait Channel: Copy {
    fn mean(a: Self, b: Self) -> Self;
}

impl Channel for u8 {
    fn mean(a: Self, b: Self) -> Self {
        ((a as u16 + b as u16) / 2) as u8
    }
}

impl Channel for u16 {
    fn mean(a: Self, b: Self) -> Self {
        ((a as u32 + b as u32) / 2) as u16
    }
}

impl Channel for f32 {
    fn mean(a: Self, b: Self) -> Self {
        (a + b) / 2.0
    }
}

/// Horizontal inset of the circle's edge from its bounding box, for scanline
/// offsets `r, r-1, ..., 0` from the centre.
pub fn insets(radius: i64) -> Vec<i64> {
    if radius <= 0 {
        return vec![0];
    }
    let r = radius as f64;
    (0..=radius)
        .rev()
        .map(|y| {
            let theta = (y as f64 / r).asin();
            let x = (r * theta.cos() + 0.5).floor() as i64;
            radius - x
        })
        .collect()
}

/// Apply every eye to `image` in place. Images without colour channels are
/// left alone.
pub fn apply(image: &mut DynamicImage, eyes: &[Eye]) {
    match image {
        DynamicImage::ImageRgb8(buffer) => apply_buffer(buffer, eyes),
        DynamicImage::ImageRgba8(buffer) => apply_buffer(buffer, eyes),
        DynamicImage::ImageRgb16(buffer) => apply_buffer(buffer, eyes),
        DynamicImage::ImageRgba16(buffer) => apply_buffer(buffer, eyes),
        DynamicImage::ImageRgb32F(buffer) => apply_buffer(buffer, eyes),
        DynamicImage::ImageRgba32F(buffer) => apply_buffer(buffer, eyes),
        _ => tracing::debug!("Skipping red-eye on image without a red channel"),
    }
}

fn apply_buffer<P>(buffer: &mut ImageBuffer<P, Vec<P::Subpixel>>, eyes: &[Eye])
where
    P: Pixel,
    P::Subpixel: Channel,
{
    for eye in eyes {
        reduce_eye(buffer, eye);
    }
}

fn reduce_eye<P>(buffer: &mut ImageBuffer<P, Vec<P::Subpixel>>, eye: &Eye)
where
    P: Pixel,
    P::Subpixel: Channel,
{
    let width = buffer.width() as i64;
    let height = buffer.height() as i64;
    let insets = insets(eye.radius);

    let x_bounds_min = eye.x - eye.radius;
    let x_bounds_max = eye.x + eye.radius;

    let reduce_row = |buffer: &mut ImageBuffer<P, Vec<P::Subpixel>>, y: i64, inset: i64| {
        let xmin = (x_bounds_min + inset).max(0);
        let xmax = (x_bounds_max - inset).min(width - 1);
        for x in xmin..=xmax {
            reduce_pixel(buffer, x, y, width, height);
        }
    };

    // top half-circle, inset table read forward from the first visible row
    let ymin = (eye.y - eye.radius).max(0);
    let ymax = eye.y.min(height - 1);
    for (index, y) in (ymin..=ymax).enumerate() {
        if let Some(&inset) = insets.get(index) {
            reduce_row(buffer, y, inset);
        }
    }

    // bottom half-circle, inset table read backward
    let ymin = eye.y;
    let ymax = (eye.y + eye.radius).min(height - 1);
    for (index, y) in (ymin..=ymax).enumerate() {
        if let Some(&inset) = insets.iter().rev().nth(index) {
            reduce_row(buffer, y, inset);
        }
    }
}

fn reduce_pixel<P>(buffer: &mut ImageBuffer<P, Vec<P::Subpixel>>, x: i64, y: i64, width: i64, height: i64)
where
    P: Pixel,
    P::Subpixel: Channel,
{
    if x < 0 || y < 0 || x >= width || y >= height {
        return;
    }
    let channels = buffer.get_pixel_mut(x as u32, y as u32).channels_mut();
    if channels.len() >= 3 {
        channels[0] = Channel::mean(channels[1], channels[2]);
    }
}
