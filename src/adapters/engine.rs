//! Bring-up inference engine.
//!
//! Implements the [`ModelLoader`] / [`InferenceSession`] ports without an
//! interpreter so the dispatch path can be brought up and timed on the
//! desk and in CI. A TFLite-Micro binding plugs into the same ports.
//!
//! What it does for real:
//!
//! - validates the model file as a TFLite flatbuffer (`TFL3` identifier
//!   at byte offset 4);
//! - decodes PNG, JPEG, PPM or BMP through the `image` crate (raw RGB of
//!   exactly the input size is accepted too), resizes to the model input
//!   with a triangle filter, and quantises with the usual uint8
//!   normalisation
//!   `q = (x - mean) / (std * scale) + zero_point`, clipped to `[0, 255]`;
//! - produces uint8 output scores (scale 1/256) and reduces them to the
//!   top classes.
//!
//! The scores themselves come from the frame's intensity histogram: one
//! equal-width bin per class.

use std::io::{Cursor, ErrorKind};

use image::imageops::{self, FilterType};
use image::{ImageReader, Limits, RgbImage};
use log::{debug, info};

use crate::app::classify::{ClassificationResult, dequantize};
use crate::app::ports::{InferenceSession, ModelLoader, PreparedInput};
use crate::error::{InferenceError, ModelLoadError, PreprocessError};

const TFLITE_IDENTIFIER: &[u8; 4] = b"TFL3";

/// Output tensor quantisation of the common uint8 classifiers.
const OUTPUT_SCALE: f32 = 1.0 / 256.0;
const OUTPUT_ZERO_POINT: i32 = 0;

/// Input tensor geometry, height × width × channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InputShape {
    pub width: usize,
    pub height: usize,
    pub channels: usize,
}

impl Default for InputShape {
    fn default() -> Self {
        Self {
            width: 224,
            height: 224,
            channels: 3,
        }
    }
}

impl InputShape {
    pub const fn len(&self) -> usize {
        self.width * self.height * self.channels
    }

    pub const fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Input tensor quantisation parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Quantization {
    pub scale: f32,
    pub zero_point: i32,
}

impl Default for Quantization {
    fn default() -> Self {
        Self {
            scale: 1.0 / 128.0,
            zero_point: 128,
        }
    }
}

// ───────────────────────────────────────────────────────────────
// Loader
// ───────────────────────────────────────────────────────────────

pub struct BringUpEngine {
    shape: InputShape,
    quant: Quantization,
    classes: usize,
    mean: f32,
    std: f32,
}

impl BringUpEngine {
    pub fn new(classes: usize, mean: f32, std: f32) -> Self {
        Self {
            shape: InputShape::default(),
            quant: Quantization::default(),
            classes,
            mean,
            std,
        }
    }

    pub fn with_shape(mut self, shape: InputShape) -> Self {
        self.shape = shape;
        self
    }

    pub fn with_quantization(mut self, quant: Quantization) -> Self {
        self.quant = quant;
        self
    }
}

impl ModelLoader for BringUpEngine {
    type Session = BringUpSession;

    fn load(&self, model_path: &str) -> Result<BringUpSession, ModelLoadError> {
        let model = std::fs::read(model_path).map_err(|e| match e.kind() {
            ErrorKind::NotFound => ModelLoadError::NotFound,
            _ => ModelLoadError::Io,
        })?;
        validate_model(&model)?;
        info!(
            "engine: {} bytes, input {}x{}x{}, {} classes",
            model.len(),
            self.shape.height,
            self.shape.width,
            self.shape.channels,
            self.classes
        );
        Ok(BringUpSession {
            shape: self.shape,
            quant: self.quant,
            classes: self.classes,
            mean: self.mean,
            std: self.std,
            invocations: 0,
        })
    }
}

/// Check the flatbuffer file identifier.
pub fn validate_model(bytes: &[u8]) -> Result<(), ModelLoadError> {
    if bytes.is_empty() {
        return Err(ModelLoadError::Empty);
    }
    match bytes.get(4..8) {
        Some(id) if id == TFLITE_IDENTIFIER => Ok(()),
        _ => Err(ModelLoadError::InvalidFormat),
    }
}

// ───────────────────────────────────────────────────────────────
// Session
// ───────────────────────────────────────────────────────────────

pub struct BringUpSession {
    shape: InputShape,
    quant: Quantization,
    classes: usize,
    mean: f32,
    std: f32,
    invocations: u32,
}

impl BringUpSession {
    pub fn shape(&self) -> InputShape {
        self.shape
    }

    pub fn invocations(&self) -> u32 {
        self.invocations
    }

    /// Whether the configured mean/std already match the input tensor's
    /// quantisation, so raw pixels can be copied through unchanged.
    fn passthrough(&self) -> bool {
        (self.std * self.quant.scale - 1.0).abs() < 1e-5
            && (self.mean - self.quant.zero_point as f32).abs() < 1e-5
    }
}

impl InferenceSession for BringUpSession {
    fn prepare_input(&mut self, image: &[u8]) -> Result<PreparedInput, PreprocessError> {
        if self.shape.channels != 3 {
            return Err(PreprocessError::ShapeMismatch);
        }
        let frame = decode_image(image, self.shape)?;
        let mut data = resize_to(&frame, self.shape)?.into_raw();

        if !self.passthrough() {
            let denom = self.std * self.quant.scale;
            let zp = self.quant.zero_point as f32;
            for px in &mut data {
                let q = (f32::from(*px) - self.mean) / denom + zp;
                *px = q.round().clamp(0.0, 255.0) as u8;
            }
        }

        Ok(PreparedInput {
            width: self.shape.width,
            height: self.shape.height,
            channels: self.shape.channels,
            data,
        })
    }

    fn invoke(
        &mut self,
        input: &PreparedInput,
        top_k: usize,
        threshold: f32,
    ) -> Result<ClassificationResult, InferenceError> {
        if input.data.len() != self.shape.len()
            || (input.width, input.height, input.channels)
                != (self.shape.width, self.shape.height, self.shape.channels)
        {
            return Err(InferenceError::InvokeFailed);
        }
        if self.classes == 0 {
            return Err(InferenceError::OutputMismatch);
        }
        self.invocations = self.invocations.wrapping_add(1);

        let mut bins = vec![0u32; self.classes];
        for &px in &input.data {
            let bin = usize::from(px) * self.classes / 256;
            bins[bin] += 1;
        }
        let total = input.data.len() as f32;
        let scores: Vec<f32> = bins
            .iter()
            .map(|&n| {
                let q = ((n as f32 / total) / OUTPUT_SCALE).round().clamp(0.0, 255.0) as u8;
                dequantize(q, OUTPUT_SCALE, OUTPUT_ZERO_POINT)
            })
            .collect();
        debug!("engine: invoke #{} scores {:?}", self.invocations, scores);

        Ok(ClassificationResult::from_scores(&scores, top_k, threshold))
    }
}

// ───────────────────────────────────────────────────────────────
// Image decoding
// ───────────────────────────────────────────────────────────────

/// Largest source image decoded, per side.
pub const MAX_SOURCE_SIDE: u32 = 4096;

/// Decode any supported image container (PNG, JPEG, PPM, BMP) to RGB8.
/// Bytes that are not a recognised container but match `shape` exactly
/// are taken as raw interleaved RGB.
pub fn decode_image(bytes: &[u8], shape: InputShape) -> Result<RgbImage, PreprocessError> {
    if image::guess_format(bytes).is_err() {
        return raw_rgb(bytes, shape);
    }

    let mut reader = ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(|_| PreprocessError::Decode)?;
    let mut limits = Limits::default();
    limits.max_image_width = Some(MAX_SOURCE_SIDE);
    limits.max_image_height = Some(MAX_SOURCE_SIDE);
    reader.limits(limits);

    let rgb = reader
        .decode()
        .map_err(|e| {
            debug!("engine: decode failed: {}", e);
            PreprocessError::Decode
        })?
        .into_rgb8();
    if rgb.width() == 0 || rgb.height() == 0 {
        return Err(PreprocessError::Decode);
    }
    Ok(rgb)
}

fn raw_rgb(bytes: &[u8], shape: InputShape) -> Result<RgbImage, PreprocessError> {
    if shape.is_empty() || bytes.len() != shape.width * shape.height * 3 {
        return Err(PreprocessError::Decode);
    }
    let width = u32::try_from(shape.width).map_err(|_| PreprocessError::ShapeMismatch)?;
    let height = u32::try_from(shape.height).map_err(|_| PreprocessError::ShapeMismatch)?;
    RgbImage::from_raw(width, height, bytes.to_vec()).ok_or(PreprocessError::Decode)
}

/// Resize to the model input with a triangle (bilinear) filter.
pub fn resize_to(image: &RgbImage, shape: InputShape) -> Result<RgbImage, PreprocessError> {
    let width = u32::try_from(shape.width).map_err(|_| PreprocessError::ShapeMismatch)?;
    let height = u32::try_from(shape.height).map_err(|_| PreprocessError::ShapeMismatch)?;
    if image.dimensions() == (width, height) {
        return Ok(image.clone());
    }
    Ok(imageops::resize(image, width, height, FilterType::Triangle))
}
