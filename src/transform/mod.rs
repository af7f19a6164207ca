//! Per-photo transformations recorded by Shotwell: red-eye then crop.

pub mod descriptor;
pub mod redeye;

use image::{DynamicImage, ImageFormat};
use md5::{Digest, Md5};
use std::fmt;
use std::io::Cursor;

use crate::error::{Error, Result};

pub use redeye::Eye;

/// Bump when the pixel output of `apply` changes, so every cached file is
/// regenerated.
pub const VERSION: u32 = 1;

/// Format every derived file is stored in.
pub const OUTPUT_FORMAT: ImageFormat = ImageFormat::Jpeg;
pub const OUTPUT_EXTENSION: &str = "jpg";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Crop {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Crop {
    fn from_section(section: &descriptor::Section) -> Result<Self> {
        let left = descriptor::required_int(section, "crop", "left")?;
        let top = descriptor::required_int(section, "crop", "top")?;
        let right = descriptor::required_int(section, "crop", "right")?;
        let bottom = descriptor::required_int(section, "crop", "bottom")?;

        let to_u32 = |value: i64, what: &str| {
            u32::try_from(value).map_err(|_| {
                Error::MalformedDescriptor(format!("[crop] {} out of range: {}", what, value))
            })
        };

        let span = |from: i64, to: i64, what: &str| {
            to.checked_sub(from)
                .ok_or_else(|| Error::MalformedDescriptor(format!("[crop] {} overflows", what)))
                .and_then(|value| to_u32(value, what))
        };

        let width = span(left, right, "width")?;
        let height = span(top, bottom, "height")?;
        Ok(Self {
            x: to_u32(left, "left")?,
            y: to_u32(top, "top")?,
            width,
            height,
        })
    }
}

impl fmt::Display for Crop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Crop({},{},{},{})", self.x, self.y, self.width, self.height)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedEye {
    pub eyes: Vec<Eye>,
}

impl RedEye {
    fn from_section(section: &descriptor::Section) -> Result<Self> {
        let count = if section.contains_key("num_points") {
            descriptor::required_int(section, "redeye", "num_points")?
        } else {
            0
        };

        let eyes = (0..count.max(0))
            .map(|point| {
                let center = descriptor::required(section, "redeye", &format!("center{}", point))?;
                let (x, y) = descriptor::point(center)?;
                let radius = descriptor::required_int(section, "redeye", &format!("radius{}", point))?;
                if !(0..=redeye::MAX_RADIUS).contains(&radius) {
                    return Err(Error::MalformedDescriptor(format!(
                        "[redeye] radius{} out of range: {}",
                        point, radius
                    )));
                }
                let centers = -redeye::MAX_CENTER..=redeye::MAX_CENTER;
                if !centers.contains(&x) || !centers.contains(&y) {
                    return Err(Error::MalformedDescriptor(format!(
                        "[redeye] center{} out of range: ({}, {})",
                        point, x, y
                    )));
                }
                Ok(Eye { x, y, radius })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self { eyes })
    }
}

impl fmt::Display for RedEye {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let eyes: Vec<String> = self.eyes.iter().map(Eye::to_string).collect();
        write!(f, "RedEye({})", eyes.join(","))
    }
}

/// The effective operations parsed from a `transformations` descriptor.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransformSpec {
    pub crop: Option<Crop>,
    pub redeye: Option<RedEye>,
}

impl TransformSpec {
    pub fn parse(descriptor: &str) -> Result<Self> {
        let sections = descriptor::parse_sections(descriptor)?;
        let crop = sections.get("crop").map(Crop::from_section).transpose()?;
        let redeye = sections.get("redeye").map(RedEye::from_section).transpose()?;
        Ok(Self { crop, redeye })
    }

    pub fn is_noop(&self) -> bool {
        self.crop.is_none() && self.redeye.is_none()
    }

    /// Hex MD5 over the asset id and the canonical form of the operations,
    /// or `None` when there is nothing to apply.
    pub fn identity(&self, asset_id: i64) -> Option<String> {
        if self.is_noop() {
            return None;
        }
        let mut hasher = Md5::new();
        hasher.update(format!("{}:{}", asset_id, self).as_bytes());
        Some(format!("{:x}", hasher.finalize()))
    }

    /// Red-eye first, then crop.
    pub fn apply_image(&self, mut image: DynamicImage) -> DynamicImage {
        if let Some(redeye) = &self.redeye {
            redeye::apply(&mut image, &redeye.eyes);
        }
        if let Some(crop) = &self.crop {
            image = image.crop_imm(crop.x, crop.y, crop.width, crop.height);
        }
        image
    }

    /// Decode `source`, transform it and re-encode it as JPEG.
    pub fn apply(&self, source: &[u8]) -> Result<Vec<u8>> {
        let image = image::load_from_memory(source)?;
        let output = DynamicImage::ImageRgb8(self.apply_image(image).to_rgb8());

        let mut bytes = Vec::new();
        output.write_to(&mut Cursor::new(&mut bytes), OUTPUT_FORMAT)?;
        Ok(bytes)
    }
}

impl fmt::Display for TransformSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = Vec::new();
        if let Some(redeye) = &self.redeye {
            parts.push(redeye.to_string());
        }
        if let Some(crop) = &self.crop {
            parts.push(crop.to_string());
        }
        write!(f, "ShotwellFS::Transform:{}\n  {}", VERSION, parts.join("\n  "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GenericImageView, Rgb, RgbImage};

    const CROP: &str = "[crop]\nleft=10\ntop=10\nright=50\nbottom=40\n";
    const REDEYE: &str = "[redeye]\nnum_points=1\ncenter0=(100, 100)\nradius0=10\n";

    fn png(image: &RgbImage) -> Vec<u8> {
        let mut bytes = Vec::new();
        image
            .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
            .unwrap();
        bytes
    }

    #[test]
    fn test_parse_crop_and_redeye() {
        let spec = TransformSpec::parse(&format!("{}\n{}", CROP, REDEYE)).unwrap();
        assert_eq!(
            spec.crop,
            Some(Crop {
                x: 10,
                y: 10,
                width: 40,
                height: 30
            })
        );
        assert_eq!(
            spec.redeye.unwrap().eyes,
            vec![Eye {
                x: 100,
                y: 100,
                radius: 10
            }]
        );
    }

    #[test]
    fn test_unrelated_sections_are_noop() {
        let spec = TransformSpec::parse("[adjustments]\nexposure=0.5\n").unwrap();
        assert!(spec.is_noop());
        assert_eq!(spec.identity(1), None);
        assert!(TransformSpec::parse("").unwrap().is_noop());
    }

    #[test]
    fn test_malformed_descriptors() {
        assert!(matches!(
            TransformSpec::parse("[crop]\nleft=a\ntop=0\nright=1\nbottom=1"),
            Err(Error::MalformedDescriptor(_))
        ));
        assert!(TransformSpec::parse("[crop]\nleft=0\ntop=0\nright=1").is_err());
        assert!(TransformSpec::parse("[crop]\nleft=5\ntop=0\nright=1\nbottom=1").is_err());
        assert!(TransformSpec::parse("[redeye]\nnum_points=1\ncenter0=(1,1)").is_err());
        assert!(TransformSpec::parse("[redeye]\nnum_points=1\ncenter0=1,1\nradius0=2").is_err());
    }

    #[test]
    fn test_out_of_range_values_are_malformed() {
        let overflow = "[crop]\nleft=-9223372036854775808\ntop=0\nright=9223372036854775807\nbottom=1";
        assert!(matches!(TransformSpec::parse(overflow), Err(Error::MalformedDescriptor(_))));

        let huge_radius = "[redeye]\nnum_points=1\ncenter0=(1, 1)\nradius0=4000000000";
        assert!(matches!(TransformSpec::parse(huge_radius), Err(Error::MalformedDescriptor(_))));

        let far_center = "[redeye]\nnum_points=1\ncenter0=(-9223372036854775808, 0)\nradius0=5";
        assert!(matches!(TransformSpec::parse(far_center), Err(Error::MalformedDescriptor(_))));

        let largest = format!("[redeye]\nnum_points=1\ncenter0=(0, 0)\nradius0={}", redeye::MAX_RADIUS);
        assert!(TransformSpec::parse(&largest).is_ok());
    }

    #[test]
    fn test_canonical_form() {
        let spec = TransformSpec::parse(&format!("{}{}", REDEYE, CROP)).unwrap();
        assert_eq!(
            spec.to_string(),
            "ShotwellFS::Transform:1\n  RedEye(100,100+10)\n  Crop(10,10,40,30)"
        );
    }

    #[test]
    fn test_identity_is_stable_and_layout_independent() {
        let a = TransformSpec::parse(&format!("{}{}", CROP, REDEYE)).unwrap();
        let b = TransformSpec::parse(
            "[redeye]\nradius0 = 10\ncenter0 = (100,100)\nnum_points = 1\n\n[crop]\nbottom=40\nright=50\ntop=10\nleft=10",
        )
        .unwrap();

        let id = a.identity(7).unwrap();
        assert_eq!(id.len(), 32);
        assert_eq!(a.identity(7), b.identity(7));
        assert_eq!(a.identity(7), a.identity(7));
        assert_ne!(a.identity(7), a.identity(8));

        let crop_only = TransformSpec::parse(CROP).unwrap();
        assert_ne!(crop_only.identity(7), a.identity(7));
    }

    #[test]
    fn test_identity_known_value() {
        let spec = TransformSpec::parse(CROP).unwrap();
        let mut hasher = Md5::new();
        hasher.update(b"42:ShotwellFS::Transform:1\n  Crop(10,10,40,30)");
        assert_eq!(spec.identity(42), Some(format!("{:x}", hasher.finalize())));
    }

    #[test]
    fn test_crop_output_dimensions() {
        let source = png(&RgbImage::from_pixel(100, 80, Rgb([10, 20, 30])));
        let spec = TransformSpec::parse(CROP).unwrap();

        let output = spec.apply(&source).unwrap();
        assert_eq!(image::guess_format(&output).unwrap(), ImageFormat::Jpeg);

        let decoded = image::load_from_memory(&output).unwrap();
        assert_eq!(decoded.dimensions(), (40, 30));
    }

    #[test]
    fn test_redeye_runs_before_crop() {
        let image = DynamicImage::ImageRgb8(RgbImage::from_pixel(200, 200, Rgb([255, 0, 200])));
        let spec = TransformSpec::parse(
            "[redeye]\nnum_points=1\ncenter0=(100, 100)\nradius0=10\n[crop]\nleft=90\ntop=90\nright=111\nbottom=111\n",
        )
        .unwrap();

        let output = spec.apply_image(image);
        let rgb = output.as_rgb8().unwrap();
        assert_eq!(rgb.dimensions(), (21, 21));
        // crop origin is (90, 90): the eye centre lands at (10, 10)
        assert_eq!(rgb.get_pixel(10, 10)[0], 100);
        assert_eq!(rgb.get_pixel(10, 0)[0], 100);
        assert_eq!(rgb.get_pixel(0, 0)[0], 255);
    }

    #[test]
    fn test_apply_rejects_garbage_input() {
        let spec = TransformSpec::parse(CROP).unwrap();
        assert!(matches!(spec.apply(b"not an image"), Err(Error::Image(_))));
    }
}
