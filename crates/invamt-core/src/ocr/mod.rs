//! Text recognition boundary.
//!
//! The recognition engine itself is an external collaborator behind
//! [`TextRecognizer`]. This module owns the data it returns and the
//! conversion of positioned fragments into line-oriented raw text.

#[cfg(feature = "native")]
mod pure_engine;

#[cfg(feature = "native")]
pub use pure_engine::PureOcrRecognizer;

use serde::{Deserialize, Serialize};

use crate::error::RecognitionError;

/// Turns image bytes into positioned text fragments.
pub trait TextRecognizer: Send + Sync {
    /// Recognize text in an encoded image (PNG, JPEG, ...).
    fn recognize(&self, image: &[u8]) -> Result<OcrResult, RecognitionError>;

    /// Human-readable engine name.
    fn name(&self) -> &str;
}

/// A detected text box with its coordinates and content.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TextBox {
    /// Bounding box coordinates (x1, y1, x2, y2, x3, y3, x4, y4) for quadrilateral.
    pub bbox: [f32; 8],

    /// Recognized text content.
    pub text: String,

    /// Recognition confidence score (0.0 - 1.0).
    pub confidence: f32,
}

impl TextBox {
    pub fn new(bbox: [f32; 8], text: impl Into<String>, confidence: f32) -> Self {
        Self {
            bbox,
            text: text.into(),
            confidence,
        }
    }

    /// Axis-aligned box from its top-left corner and size.
    pub fn from_rect(x: f32, y: f32, width: f32, height: f32, text: impl Into<String>) -> Self {
        Self::new(
            [x, y, x + width, y, x + width, y + height, x, y + height],
            text,
            1.0,
        )
    }

    /// Get the center point of the bounding box.
    pub fn center(&self) -> (f32, f32) {
        let x = (self.bbox[0] + self.bbox[2] + self.bbox[4] + self.bbox[6]) / 4.0;
        let y = (self.bbox[1] + self.bbox[3] + self.bbox[5] + self.bbox[7]) / 4.0;
        (x, y)
    }

    /// Get the axis-aligned bounding rectangle.
    pub fn rect(&self) -> (f32, f32, f32, f32) {
        let xs = [self.bbox[0], self.bbox[2], self.bbox[4], self.bbox[6]];
        let ys = [self.bbox[1], self.bbox[3], self.bbox[5], self.bbox[7]];

        let min_x = xs.iter().cloned().fold(f32::INFINITY, f32::min);
        let max_x = xs.iter().cloned().fold(f32::NEG_INFINITY, f32::max);
        let min_y = ys.iter().cloned().fold(f32::INFINITY, f32::min);
        let max_y = ys.iter().cloned().fold(f32::NEG_INFINITY, f32::max);

        (min_x, min_y, max_x, max_y)
    }
}

/// Result of OCR processing on an image.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OcrResult {
    /// Detected and recognized text boxes.
    pub boxes: Vec<TextBox>,

    /// Processing time in milliseconds.
    pub processing_time_ms: u64,

    /// Image dimensions (width, height).
    pub image_size: (u32, u32),
}

impl OcrResult {
    pub fn from_boxes(boxes: Vec<TextBox>) -> Self {
        Self {
            boxes,
            ..Self::default()
        }
    }

    pub fn has_text(&self) -> bool {
        self.boxes.iter().any(|b| !b.text.trim().is_empty())
    }

    /// Group boxes into rows and render them as lines of text.
    ///
    /// Boxes whose vertical centers lie within `row_tolerance` pixels of the
    /// row's first box share a line and are joined left to right, so a label
    /// printed left of its amount ends up just before it on the same line.
    pub fn to_raw_text(&self, row_tolerance: f32) -> String {
        let mut boxes: Vec<&TextBox> = self
            .boxes
            .iter()
            .filter(|b| !b.text.trim().is_empty())
            .collect();
        boxes.sort_by(|a, b| a.center().1.total_cmp(&b.center().1));

        let mut rows: Vec<(f32, Vec<&TextBox>)> = Vec::new();
        for text_box in boxes {
            let y = text_box.center().1;
            match rows.last_mut() {
                Some((row_y, row)) if (y - *row_y).abs() < row_tolerance => row.push(text_box),
                _ => rows.push((y, vec![text_box])),
            }
        }

        rows.into_iter()
            .map(|(_, mut row)| {
                row.sort_by(|a, b| a.rect().0.total_cmp(&b.rect().0));
                row.iter()
                    .map(|b| b.text.trim())
                    .collect::<Vec<_>>()
                    .join(" ")
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}
