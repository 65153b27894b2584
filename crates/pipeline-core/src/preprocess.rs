//! Deterministic image preprocessing for the router and expert models
//!
//! Every model in the pipeline was trained on 64x64 images passed through the
//! Keras ResNet50 `preprocess_input` ("caffe" mode):
//! - RGB pixels are reordered to **BGR**
//! - the per-channel ImageNet mean is subtracted, in BGR order
//!   `(103.939, 116.779, 123.68)`
//! - values are **not** rescaled to `[0, 1]`
//!
//! Images were resized with Pillow's default bicubic filter, which maps to
//! [`ResizeFilter::CatmullRom`]. A drift in any of these constants does not
//! raise an error, it only lowers accuracy, so the contract is pinned in
//! [`PreprocessSpec::TRAINING`] and fingerprinted for the model manifest.

use image::imageops::FilterType;
use image::GenericImageView;
use ndarray::{Array4, ArrayView4};
use prismatic_common::{PipelineError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

/// Side length of the square model input
pub const INPUT_SIZE: u32 = 64;

/// Resampling filter used to reach the model input size
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResizeFilter {
    Nearest,
    Triangle,
    CatmullRom,
    Gaussian,
    Lanczos3,
}

impl ResizeFilter {
    #[must_use]
    pub fn to_filter_type(self) -> FilterType {
        match self {
            ResizeFilter::Nearest => FilterType::Nearest,
            ResizeFilter::Triangle => FilterType::Triangle,
            ResizeFilter::CatmullRom => FilterType::CatmullRom,
            ResizeFilter::Gaussian => FilterType::Gaussian,
            ResizeFilter::Lanczos3 => FilterType::Lanczos3,
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            ResizeFilter::Nearest => "nearest",
            ResizeFilter::Triangle => "triangle",
            ResizeFilter::CatmullRom => "catmull_rom",
            ResizeFilter::Gaussian => "gaussian",
            ResizeFilter::Lanczos3 => "lanczos3",
        }
    }
}

/// Channel order of the last tensor axis
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelOrder {
    Rgb,
    Bgr,
}

impl fmt::Display for ChannelOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChannelOrder::Rgb => f.write_str("rgb"),
            ChannelOrder::Bgr => f.write_str("bgr"),
        }
    }
}

/// Preprocessing contract shared with the training pipeline
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PreprocessSpec {
    pub input_size: u32,
    pub resize_filter: ResizeFilter,
    pub channel_order: ChannelOrder,
    /// Mean subtracted per output channel (in `channel_order`)
    pub mean: [f32; 3],
    /// Multiplier applied after mean subtraction
    pub scale: [f32; 3],
}

impl PreprocessSpec {
    /// Contract the deployed models were trained with
    pub const TRAINING: PreprocessSpec = PreprocessSpec {
        input_size: INPUT_SIZE,
        resize_filter: ResizeFilter::CatmullRom,
        channel_order: ChannelOrder::Bgr,
        mean: [103.939, 116.779, 123.68],
        scale: [1.0, 1.0, 1.0],
    };

    /// Stable blake3 digest of the contract, pinned by the model manifest
    #[must_use]
    pub fn fingerprint(&self) -> String {
        let canonical = format!(
            "size={};filter={};order={};mean={:?};scale={:?}",
            self.input_size,
            self.resize_filter.as_str(),
            self.channel_order,
            self.mean,
            self.scale
        );
        blake3::hash(canonical.as_bytes()).to_hex().to_string()
    }
}

impl Default for PreprocessSpec {
    fn default() -> Self {
        Self::TRAINING
    }
}

/// Normalized NHWC model input with a batch of one
#[derive(Debug, Clone, PartialEq)]
pub struct ImageTensor(Array4<f32>);

impl ImageTensor {
    /// Wrap an array of shape `(1, n, n, 3)`
    ///
    /// # Errors
    /// Returns [`PipelineError::InferenceRuntime`] for any other shape
    pub fn from_array(array: Array4<f32>) -> Result<Self> {
        let shape = array.shape();
        if shape[0] != 1 || shape[3] != 3 || shape[1] != shape[2] || shape[1] == 0 {
            return Err(PipelineError::InferenceRuntime(format!(
                "Invalid image tensor shape {:?}, expected [1, n, n, 3]",
                shape
            )));
        }
        Ok(Self(array))
    }

    /// All-zero tensor at the training input size
    #[must_use]
    pub fn zeros() -> Self {
        let side = INPUT_SIZE as usize;
        Self(Array4::zeros((1, side, side, 3)))
    }

    #[must_use]
    pub fn shape(&self) -> &[usize] {
        self.0.shape()
    }

    #[must_use]
    pub fn view(&self) -> ArrayView4<'_, f32> {
        self.0.view()
    }

    #[must_use]
    pub fn as_array(&self) -> &Array4<f32> {
        &self.0
    }
}

/// Turns encoded image bytes into [`ImageTensor`]s
#[derive(Debug, Clone, Copy, Default)]
pub struct Preprocessor {
    spec: PreprocessSpec,
}

impl Preprocessor {
    /// Preprocessor using [`PreprocessSpec::TRAINING`]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_spec(spec: PreprocessSpec) -> Self {
        Self { spec }
    }

    #[must_use]
    pub fn spec(&self) -> &PreprocessSpec {
        &self.spec
    }

    /// Decode, convert to RGB, resize and normalize
    ///
    /// # Errors
    /// Returns [`PipelineError::Decode`] if the bytes are not a supported image
    pub fn preprocess(&self, bytes: &[u8]) -> Result<ImageTensor> {
        if bytes.is_empty() {
            return Err(PipelineError::Decode("empty image buffer".to_string()));
        }

        let img = image::load_from_memory(bytes)
            .map_err(|e| PipelineError::Decode(e.to_string()))?;

        let (width, height) = img.dimensions();
        if width == 0 || height == 0 {
            return Err(PipelineError::Decode(format!(
                "image has no pixels ({}x{})",
                width, height
            )));
        }

        // Gray, palette and alpha formats all collapse to 3 channels here
        let rgb = img.to_rgb8();

        let size = self.spec.input_size;
        let resized = if width != size || height != size {
            image::imageops::resize(&rgb, size, size, self.spec.resize_filter.to_filter_type())
        } else {
            rgb
        };

        let side = size as usize;
        let mut array = Array4::<f32>::zeros((1, side, side, 3));
        let mean = self.spec.mean;
        let scale = self.spec.scale;

        for (x, y, pixel) in resized.enumerate_pixels() {
            let [r, g, b] = pixel.0;
            let ordered = match self.spec.channel_order {
                ChannelOrder::Rgb => [r, g, b],
                ChannelOrder::Bgr => [b, g, r],
            };
            for (c, value) in ordered.into_iter().enumerate() {
                array[[0, y as usize, x as usize, c]] = (f32::from(value) - mean[c]) * scale[c];
            }
        }

        Ok(ImageTensor(array))
    }

    /// Read an image file and preprocess it
    ///
    /// # Errors
    /// Returns [`PipelineError::Decode`] if the file cannot be read or decoded
    pub fn preprocess_file(&self, path: impl AsRef<Path>) -> Result<ImageTensor> {
        let path = path.as_ref();
        let bytes = std::fs::read(path).map_err(|e| {
            PipelineError::Decode(format!("Failed to read {}: {}", path.display(), e))
        })?;
        self.preprocess(&bytes)
    }
}
