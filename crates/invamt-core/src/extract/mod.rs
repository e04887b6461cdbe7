//! Amount candidate extraction from raw text.

pub mod amounts;
pub mod correction;
pub mod patterns;

pub use amounts::{dominant_currency, format_amount, parse_amount, AmountExtractor};
pub use correction::correct_ocr_digits;

/// Trait for field extractors.
pub trait FieldExtractor {
    /// The type of value this extractor produces.
    type Output;

    /// Extract the first occurrence of the field.
    fn extract(&self, text: &str) -> Option<Self::Output>;

    /// Extract all occurrences of the field, in order of appearance.
    fn extract_all(&self, text: &str) -> Vec<Self::Output>;
}
