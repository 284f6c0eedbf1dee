//! Dictionary metadata and packed marker codes.

use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::path::Path;

#[derive(thiserror::Error, Debug)]
pub enum DictionaryError {
    #[error("failed to read dictionary: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid dictionary json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("marker_size {marker_size} gives {bits} bits, at most 64 are supported")]
    TooManyBits { marker_size: usize, bits: usize },
    #[error("dictionary has no codes")]
    Empty,
    #[error("code {index} sets bits outside the {bits}-bit grid")]
    CodeOutOfRange { index: usize, bits: usize },
}

/// A square-marker dictionary, passed by value to identification.
///
/// Codes hold the inner `marker_size × marker_size` bits in row-major order,
/// bit index `y * marker_size + x` (LSB is the top-left cell), with
/// **white = 1**. This matches the OpenCV byte tables read MSB first.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dictionary {
    /// Human-readable name (for logging).
    pub name: Cow<'static, str>,
    /// Inner bits per side.
    pub marker_size: usize,
    /// Maximum Hamming distance corrected during identification.
    pub max_correction_bits: u8,
    /// One code per marker id.
    pub codes: Cow<'static, [u64]>,
}

impl Dictionary {
    /// Validated constructor for runtime dictionaries.
    pub fn new(
        name: impl Into<String>,
        marker_size: usize,
        max_correction_bits: u8,
        codes: Vec<u64>,
    ) -> Result<Self, DictionaryError> {
        let dict = Self {
            name: Cow::Owned(name.into()),
            marker_size,
            max_correction_bits,
            codes: Cow::Owned(codes),
        };
        dict.validate()?;
        Ok(dict)
    }

    /// Read a dictionary from a JSON file with the fields of this struct.
    pub fn load_json(path: impl AsRef<Path>) -> Result<Self, DictionaryError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    pub fn from_json_str(text: &str) -> Result<Self, DictionaryError> {
        let dict: Self = serde_json::from_str(text)?;
        dict.validate()?;
        Ok(dict)
    }

    pub fn validate(&self) -> Result<(), DictionaryError> {
        let bits = self.bit_count();
        if bits == 0 || bits > 64 {
            return Err(DictionaryError::TooManyBits {
                marker_size: self.marker_size,
                bits,
            });
        }
        if self.codes.is_empty() {
            return Err(DictionaryError::Empty);
        }
        if bits < 64 {
            if let Some(index) = self.codes.iter().position(|&c| c >> bits != 0) {
                return Err(DictionaryError::CodeOutOfRange { index, bits });
            }
        }
        Ok(())
    }

    /// Total number of inner bits per marker.
    #[inline]
    pub fn bit_count(&self) -> usize {
        self.marker_size * self.marker_size
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.codes.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.codes.is_empty()
    }

    pub fn code(&self, id: u32) -> Option<u64> {
        self.codes.get(id as usize).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn json_round_trip_through_file() {
        let dict = Dictionary::new("tiny", 3, 1, vec![0b101_010_101, 0b111_000_000]).expect("dict");
        let mut file = tempfile::NamedTempFile::new().expect("tempfile");
        write!(file, "{}", serde_json::to_string(&dict).expect("json")).expect("write");

        let loaded = Dictionary::load_json(file.path()).expect("load");
        assert_eq!(loaded, dict);
        assert_eq!(loaded.code(1), Some(0b111_000_000));
        assert_eq!(loaded.code(2), None);
    }

    #[test]
    fn validation_rejects_bad_tables() {
        assert!(matches!(
            Dictionary::new("big", 9, 0, vec![1]),
            Err(DictionaryError::TooManyBits { bits: 81, .. })
        ));
        assert!(matches!(
            Dictionary::new("empty", 4, 0, vec![]),
            Err(DictionaryError::Empty)
        ));
        assert!(matches!(
            Dictionary::new("wide", 4, 0, vec![0x1_0000]),
            Err(DictionaryError::CodeOutOfRange { index: 0, bits: 16 })
        ));
        assert!(Dictionary::from_json_str("{\"name\": 3}").is_err());
    }
}
