use std::path::Path;

use image::{
    RgbImage,
    imageops::{self, FilterType},
};
use ndarray::Array3;

use crate::{DataErr, Result, SatType};

/// Per channel mean of the ImageNet training set.
pub const IMAGENET_MEAN: [f32; 3] = [0.485, 0.456, 0.406];
/// Per channel standard deviation of the ImageNet training set.
pub const IMAGENET_STD: [f32; 3] = [0.229, 0.224, 0.225];

/// Turns a satellite tile into a normalized (3, size, size) tensor.
///
/// The tile is center cropped to `crop` pixels (or less when it is smaller), resized to
/// `size x size`, optionally mirrored, scaled to [0, 1] and normalized per channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transform {
    crop: u32,
    size: u32,
    flip: bool,
}

impl Transform {
    pub fn new(crop: u32, size: u32, flip: bool) -> Self {
        Self { crop, size, flip }
    }

    /// The training transform of a satellite, with random horizontal flips.
    pub fn train(sat_type: SatType, size: u32) -> Self {
        Self::new(sat_type.crop(), size, true)
    }

    /// The evaluation transform of a satellite, deterministic.
    pub fn eval(sat_type: SatType, size: u32) -> Self {
        Self::new(sat_type.crop(), size, false)
    }

    /// Returns whether this transform mirrors some of the images.
    pub fn flips(&self) -> bool {
        self.flip
    }

    pub fn size(&self) -> u32 {
        self.size
    }

    /// Applies the transform to a decoded tile.
    ///
    /// # Arguments
    /// * `img` - The tile.
    /// * `flip` - Whether to mirror it, ignored unless this transform flips.
    ///
    /// # Returns
    /// The CHW tensor, or `None` if the tile or the output size is empty.
    pub fn apply(&self, img: &RgbImage, flip: bool) -> Option<Array3<f32>> {
        let (w, h) = img.dimensions();
        if w == 0 || h == 0 || self.size == 0 {
            return None;
        }

        let (cw, ch) = (self.crop.min(w), self.crop.min(h));
        let cropped = imageops::crop_imm(img, (w - cw) / 2, (h - ch) / 2, cw, ch).to_image();

        let mut resized = imageops::resize(&cropped, self.size, self.size, FilterType::Triangle);
        if self.flip && flip {
            imageops::flip_horizontal_in_place(&mut resized);
        }

        let size = self.size as usize;
        Some(Array3::from_shape_fn((3, size, size), |(c, y, x)| {
            let v = resized.get_pixel(x as u32, y as u32).0[c] as f32 / 255.0;
            (v - IMAGENET_MEAN[c]) / IMAGENET_STD[c]
        }))
    }

    /// Decodes a tile from disk and applies the transform.
    pub fn load<P: AsRef<Path>>(&self, path: P, flip: bool) -> Result<Array3<f32>> {
        let path = path.as_ref();
        let img = image::open(path)
            .map_err(|source| DataErr::Image {
                path: path.to_path_buf(),
                source,
            })?
            .to_rgb8();

        self.apply(&img, flip).ok_or_else(|| DataErr::EmptyImage {
            path: path.to_path_buf(),
        })
    }
}
