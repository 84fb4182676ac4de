//! CLIP ViT-B/32 inference via ONNX Runtime.
//!
//! Wraps a pair of ONNX sessions (vision encoder, text encoder) plus the
//! matching BPE tokenizer, exposing them through the
//! [`vismatch_core::EmbeddingProvider`] trait. Both encoders project into
//! the same 512-dimensional space, which is what makes zero-shot category
//! classification work: an image embedding can be compared directly against
//! label text embeddings.

use std::sync::Mutex;

use image::imageops::FilterType;
use ndarray::Array4;
use ort::session::{builder::GraphOptimizationLevel, Session};
use tokenizers::{PaddingDirection, PaddingParams, PaddingStrategy};

/// Embedding dimensionality of CLIP ViT-B/32.
pub const EMBEDDING_DIM: usize = 512;

/// Input image resolution.
const INPUT_SIZE: u32 = 224;

/// Token context length; shorter inputs are padded, longer truncated.
const CONTEXT_LENGTH: usize = 77;

/// CLIP preprocessing channel means (RGB).
const IMAGE_MEAN: [f32; 3] = [0.481_454_66, 0.457_827_5, 0.408_210_73];

/// CLIP preprocessing channel standard deviations (RGB).
const IMAGE_STD: [f32; 3] = [0.268_629_54, 0.261_302_58, 0.275_777_11];

/// Encoder-specific errors.
#[derive(Debug, thiserror::Error)]
pub enum ClipError {
    #[error("failed to load model from {path}: {cause}")]
    ModelLoad {
        path: std::path::PathBuf,
        cause: String,
    },

    #[error("failed to load tokenizer from {path}: {cause}")]
    TokenizerLoad {
        path: std::path::PathBuf,
        cause: String,
    },

    #[error("failed to decode image: {cause}")]
    ImageDecode { cause: String },

    #[error("CLIP inference failed: {cause}")]
    Inference { cause: String },
}

impl From<ClipError> for vismatch_core::Error {
    fn from(err: ClipError) -> Self {
        vismatch_core::Error::Embedding(err.to_string())
    }
}

/// A CLIP encoder holding ONNX sessions for the vision and text towers.
///
/// Sessions are guarded by mutexes because `ort` inference takes `&mut`;
/// callers share the encoder behind an `Arc` and serialize per tower.
pub struct ClipEncoder {
    vision: Mutex<Session>,
    text: Mutex<Session>,
    tokenizer: tokenizers::Tokenizer,
}

impl ClipEncoder {
    /// Load an encoder from local ONNX model files and a tokenizer JSON.
    ///
    /// # Arguments
    /// * `vision_path` - Path to the vision encoder .onnx file
    /// * `text_path` - Path to the text encoder .onnx file
    /// * `tokenizer_path` - Path to the tokenizer.json file
    pub fn load(
        vision_path: impl AsRef<std::path::Path>,
        text_path: impl AsRef<std::path::Path>,
        tokenizer_path: impl AsRef<std::path::Path>,
    ) -> Result<Self, ClipError> {
        let vision_path = vision_path.as_ref();
        let text_path = text_path.as_ref();
        let tokenizer_path = tokenizer_path.as_ref();

        tracing::info!(?vision_path, ?text_path, "loading CLIP ONNX models");

        let vision = load_session(vision_path)?;
        let text = load_session(text_path)?;

        tracing::info!(tokenizer_path = %tokenizer_path.display(), "loading tokenizer");

        let mut tokenizer = tokenizers::Tokenizer::from_file(tokenizer_path).map_err(|e| {
            ClipError::TokenizerLoad {
                path: tokenizer_path.to_path_buf(),
                cause: e.to_string(),
            }
        })?;

        // CLIP pads with token id 0 up to its fixed 77-token context.
        tokenizer.with_padding(Some(PaddingParams {
            strategy: PaddingStrategy::Fixed(CONTEXT_LENGTH),
            direction: PaddingDirection::Right,
            pad_to_multiple_of: None,
            pad_id: 0,
            pad_type_id: 0,
            pad_token: "[PAD]".to_string(),
        }));

        Ok(Self {
            vision: Mutex::new(vision),
            text: Mutex::new(text),
            tokenizer,
        })
    }

    /// Encode raw image bytes into a CLIP embedding.
    pub fn encode_image_bytes(&self, bytes: &[u8]) -> Result<Vec<f32>, ClipError> {
        let image = image::load_from_memory(bytes).map_err(|e| ClipError::ImageDecode {
            cause: e.to_string(),
        })?;

        let pixel_values = preprocess_image(&image);

        let mut session = self.vision.lock().map_err(|_| ClipError::Inference {
            cause: "vision session lock poisoned".to_string(),
        })?;

        let input_name = session
            .inputs
            .first()
            .map(|i| i.name.clone())
            .unwrap_or_else(|| "pixel_values".to_string());
        let output_name = session
            .outputs
            .first()
            .map(|o| o.name.clone())
            .unwrap_or_else(|| "image_embeds".to_string());

        let input_tensor =
            ort::value::Tensor::from_array(pixel_values).map_err(|e| ClipError::Inference {
                cause: format!("failed to create pixel tensor: {e}"),
            })?;

        let outputs = session
            .run(ort::inputs![input_name => input_tensor])
            .map_err(|e| ClipError::Inference {
                cause: format!("vision inference failed: {e}"),
            })?;

        let output = outputs.get(&output_name).ok_or_else(|| ClipError::Inference {
            cause: format!("no output {output_name:?} from vision model"),
        })?;
        let (_shape, data) = output
            .try_extract_tensor::<f32>()
            .map_err(|e| ClipError::Inference {
                cause: format!("failed to extract image embedding: {e}"),
            })?;

        let embedding = validate_embedding(data.to_vec())?;

        tracing::debug!(dim = embedding.len(), "encoded image");
        Ok(embedding)
    }

    /// Encode a text string into a CLIP embedding.
    pub fn encode_text(&self, text: &str) -> Result<Vec<f32>, ClipError> {
        let encoding = self
            .tokenizer
            .encode(text, true)
            .map_err(|e| ClipError::Inference {
                cause: format!("tokenization failed: {e}"),
            })?;

        let input_ids: Vec<i64> = encoding
            .get_ids()
            .iter()
            .take(CONTEXT_LENGTH)
            .map(|&id| i64::from(id))
            .collect();
        let attention_mask: Vec<i64> = encoding
            .get_attention_mask()
            .iter()
            .take(CONTEXT_LENGTH)
            .map(|&m| i64::from(m))
            .collect();
        let seq_len = input_ids.len();

        let input_ids_tensor =
            ort::value::Tensor::from_array((vec![1, seq_len], input_ids.into_boxed_slice()))
                .map_err(|e| ClipError::Inference {
                    cause: format!("failed to create input_ids tensor: {e}"),
                })?;
        let attention_mask_tensor =
            ort::value::Tensor::from_array((vec![1, seq_len], attention_mask.into_boxed_slice()))
                .map_err(|e| ClipError::Inference {
                    cause: format!("failed to create attention_mask tensor: {e}"),
                })?;

        let mut session = self.text.lock().map_err(|_| ClipError::Inference {
            cause: "text session lock poisoned".to_string(),
        })?;

        let input_names: Vec<String> = session.inputs.iter().map(|i| i.name.clone()).collect();
        let output_name = session
            .outputs
            .first()
            .map(|o| o.name.clone())
            .unwrap_or_else(|| "text_embeds".to_string());

        let outputs = if input_names.len() >= 2 {
            session
                .run(ort::inputs![
                    input_names[0].clone() => input_ids_tensor,
                    input_names[1].clone() => attention_mask_tensor,
                ])
                .map_err(|e| ClipError::Inference {
                    cause: format!("text inference failed: {e}"),
                })?
        } else {
            let name = input_names
                .first()
                .cloned()
                .unwrap_or_else(|| "input_ids".to_string());
            session
                .run(ort::inputs![name => input_ids_tensor])
                .map_err(|e| ClipError::Inference {
                    cause: format!("text inference failed: {e}"),
                })?
        };

        let output = outputs.get(&output_name).ok_or_else(|| ClipError::Inference {
            cause: format!("no output {output_name:?} from text model"),
        })?;
        let (_shape, data) = output
            .try_extract_tensor::<f32>()
            .map_err(|e| ClipError::Inference {
                cause: format!("failed to extract text embedding: {e}"),
            })?;

        let embedding = validate_embedding(data.to_vec())?;

        tracing::debug!(text_len = text.len(), dim = embedding.len(), "encoded text");
        Ok(embedding)
    }
}

impl vismatch_core::EmbeddingProvider for ClipEncoder {
    fn dim(&self) -> usize {
        EMBEDDING_DIM
    }

    fn encode_image(&self, bytes: &[u8]) -> vismatch_core::Result<vismatch_core::Embedding> {
        let values = self.encode_image_bytes(bytes)?;
        Ok(vismatch_core::Embedding::new(values))
    }

    fn encode_labels(
        &self,
        labels: &[String],
    ) -> vismatch_core::Result<Vec<vismatch_core::Embedding>> {
        labels
            .iter()
            .map(|label| {
                let values = self.encode_text(label)?;
                Ok(vismatch_core::Embedding::new(values))
            })
            .collect()
    }
}

fn load_session(path: &std::path::Path) -> Result<Session, ClipError> {
    let model_load = |e: ort::Error| ClipError::ModelLoad {
        path: path.to_path_buf(),
        cause: e.to_string(),
    };

    Session::builder()
        .map_err(model_load)?
        .with_optimization_level(GraphOptimizationLevel::Level3)
        .map_err(model_load)?
        .with_intra_threads(4)
        .map_err(model_load)?
        .commit_from_file(path)
        .map_err(model_load)
}

/// Preprocess an image for the CLIP vision tower.
///
/// Resize the shortest edge to 224 preserving aspect ratio, center-crop to
/// 224x224, scale to [0, 1], normalize with the CLIP channel mean/std, and
/// lay out as NCHW.
fn preprocess_image(image: &image::DynamicImage) -> Array4<f32> {
    let size = INPUT_SIZE;
    let rgb = image.to_rgb8();
    let (w, h) = rgb.dimensions();

    let scale = size as f32 / w.min(h).max(1) as f32;
    let new_w = ((w as f32) * scale).round().max(1.0) as u32;
    let new_h = ((h as f32) * scale).round().max(1.0) as u32;
    let resized = image.resize_exact(new_w, new_h, FilterType::Triangle);
    let resized = resized.to_rgb8();

    let start_x = resized.width().saturating_sub(size) / 2;
    let start_y = resized.height().saturating_sub(size) / 2;

    let mut array = Array4::<f32>::zeros((1, 3, size as usize, size as usize));
    for y in 0..size as usize {
        for x in 0..size as usize {
            let pixel = resized.get_pixel(start_x + x as u32, start_y + y as u32);
            for c in 0..3 {
                let value = pixel[c] as f32 / 255.0;
                array[[0, c, y, x]] = (value - IMAGE_MEAN[c]) / IMAGE_STD[c];
            }
        }
    }

    array
}

fn validate_embedding(embedding: Vec<f32>) -> Result<Vec<f32>, ClipError> {
    if embedding.len() != EMBEDDING_DIM {
        return Err(ClipError::Inference {
            cause: format!(
                "expected embedding dim {EMBEDDING_DIM}, got {}",
                embedding.len()
            ),
        });
    }
    if embedding.iter().any(|v| !v.is_finite()) {
        return Err(ClipError::Inference {
            cause: "embedding contains non-finite values".to_string(),
        });
    }

    Ok(embedding)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preprocess_shape_and_range() {
        let image = image::DynamicImage::new_rgb8(640, 480);
        let array = preprocess_image(&image);
        assert_eq!(array.shape(), &[1, 3, 224, 224]);

        // Black input maps to -mean/std per channel.
        for c in 0..3 {
            let expected = (0.0 - IMAGE_MEAN[c]) / IMAGE_STD[c];
            assert!((array[[0, c, 0, 0]] - expected).abs() < 1e-5);
        }
    }

    #[test]
    fn test_preprocess_handles_tiny_images() {
        let image = image::DynamicImage::new_rgb8(8, 3);
        let array = preprocess_image(&image);
        assert_eq!(array.shape(), &[1, 3, 224, 224]);
    }

    // Inference tests require the ONNX model files.
    // Run manually with: cargo test --package vismatch-clip -- --ignored

    #[test]
    #[ignore = "requires model files"]
    fn test_image_and_text_share_space() {
        let encoder = ClipEncoder::load(
            "models/vision_model.onnx",
            "models/text_model.onnx",
            "models/tokenizer.json",
        )
        .expect("failed to load encoder");

        let text = encoder.encode_text("a photo of a shoe").expect("text encoding failed");
        assert_eq!(text.len(), EMBEDDING_DIM);

        let bytes = std::fs::read("testdata/shoe.jpg").expect("missing test image");
        let image = encoder.encode_image_bytes(&bytes).expect("image encoding failed");
        assert_eq!(image.len(), EMBEDDING_DIM);
    }
}
