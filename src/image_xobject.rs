// This code is inspired by https://github.com/fschutt/printpdf/blob/2bebdc65d06dafbe926ed4b43fedd10f966c59d3/src/xobject.rs

use crate::Error;
use lopdf::ObjectId;
use png::{ColorType, Transformations};

#[derive(Debug, Clone)]
pub(crate) struct ImageXObject {
    /// Width of the image (original width, not scaled width)
    pub width: u32,
    /// Height of the image (original height, not scaled height)
    pub height: u32,
    /// Only `Rgb` and `Grayscale` after decoding.
    pub color_space: ColorType,
    /// Should the image be interpolated when scaled?
    pub interpolate: bool,
    /// 8 bits per component.
    pub image_data: Vec<u8>,
    /// Image used as a soft mask. (transparency)
    pub s_mask: Option<ObjectId>,
}

impl ImageXObject {
    /// Decode a PNG into 1 or 2 images. The first is the color image.
    /// The second is (if present) the alpha channel of the image.
    ///
    /// Palette and low bit depth images are expanded, 16 bit channels are
    /// stripped, so every component ends up 8 bits wide.
    pub fn from_png(bytes: &[u8]) -> Result<(Self, Option<Self>), Error> {
        let mut image_decoder = png::Decoder::new(bytes);
        image_decoder.set_transformations(Transformations::EXPAND | Transformations::STRIP_16);
        let mut image_reader = image_decoder.read_info()?;
        // Allocate the output buffer.
        let mut buf = vec![0; image_reader.output_buffer_size()];
        // Read the first frame. An APNG might contain more.
        let info = image_reader.next_frame(&mut buf)?;
        let image_data = &buf[..info.buffer_size()];

        let (color_type, image_color_data, alpha_data) = match info.color_type {
            ColorType::Rgba => (
                ColorType::Rgb,
                Self::split_channels(image_data, 4, 3),
                Some(Self::alpha_channel(image_data, 4)),
            ),
            ColorType::GrayscaleAlpha => (
                ColorType::Grayscale,
                Self::split_channels(image_data, 2, 1),
                Some(Self::alpha_channel(image_data, 2)),
            ),
            ColorType::Rgb => (ColorType::Rgb, image_data.to_vec(), None),
            ColorType::Grayscale => (ColorType::Grayscale, image_data.to_vec(), None),
            ColorType::Indexed => {
                return Err(Error::validation("Indexed PNG could not be expanded"));
            }
        };

        Ok((
            Self {
                width: info.width,
                height: info.height,
                color_space: color_type,
                image_data: image_color_data,
                interpolate: false,
                s_mask: None, // This should be filled in later
            },
            alpha_data.map(|alpha_data| Self {
                width: info.width,
                height: info.height,
                color_space: ColorType::Grayscale,
                image_data: alpha_data,
                interpolate: false,
                s_mask: None,
            }),
        ))
    }

    /// Keep the first `keep` components of every `stride` wide pixel.
    fn split_channels(data: &[u8], stride: usize, keep: usize) -> Vec<u8> {
        let mut output = Vec::with_capacity(data.len() / stride * keep);
        for pixel in data.chunks_exact(stride) {
            output.extend_from_slice(&pixel[..keep]);
        }
        output
    }

    /// Last component of every `stride` wide pixel.
    fn alpha_channel(data: &[u8], stride: usize) -> Vec<u8> {
        data.chunks_exact(stride)
            .map(|pixel| pixel[stride - 1])
            .collect()
    }
}

// Inspired and derived from: https://github.com/fschutt/printpdf/blob/2bebdc65d06dafbe926ed4b43fedd10f966c59d3/src/xobject.rs#L245
impl From<ImageXObject> for lopdf::Stream {
    fn from(image: ImageXObject) -> Self {
        use lopdf::Object::*;

        let cs: &'static str = match image.color_space {
            ColorType::Rgb => "DeviceRGB",
            _ => "DeviceGray",
        };

        let mut dict = lopdf::Dictionary::from_iter(vec![
            ("Type", Name("XObject".as_bytes().to_vec())),
            ("Subtype", Name("Image".as_bytes().to_vec())),
            ("Width", Integer(image.width as i64)),
            ("Height", Integer(image.height as i64)),
            ("Interpolate", image.interpolate.into()),
            ("BitsPerComponent", Integer(8)),
            ("ColorSpace", Name(cs.as_bytes().to_vec())),
        ]);
        if let Some(s_mask) = image.s_mask {
            dict.set("SMask", Reference(s_mask));
        }

        lopdf::Stream::new(dict, image.image_data)
    }
}

impl From<ImageXObject> for lopdf::Object {
    fn from(image: ImageXObject) -> Self {
        lopdf::Object::Stream(image.into())
    }
}
