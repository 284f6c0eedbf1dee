//! Codeword matching under the four grid rotations.

use crate::{Dictionary, DictionaryError};

/// A dictionary match for an observed marker code.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Match {
    /// Marker id in the dictionary.
    pub id: u32,
    /// Rotation `0..=3` such that `observed == rotate_code_u64(code, n, rotation)`.
    pub rotation: u8,
    /// Hamming distance between the observed and the rotated dictionary code.
    pub hamming: u8,
}

/// Brute-force matcher with the rotated codebook precomputed once.
///
/// Dictionaries of a few hundred codes make the linear scan cheaper than any
/// index; it is shared read-only across frames.
#[derive(Clone, Debug)]
pub struct Matcher {
    dict: Dictionary,
    max_hamming: u8,
    rotated: Vec<[u64; 4]>,
}

impl Matcher {
    /// Matcher accepting codes within `max_hamming` bit errors.
    pub fn new(dict: Dictionary, max_hamming: u8) -> Result<Self, DictionaryError> {
        dict.validate()?;
        let n = dict.marker_size;
        let rotated = dict
            .codes
            .iter()
            .map(|&code| [0, 1, 2, 3].map(|rot| rotate_code_u64(code, n, rot)))
            .collect();

        Ok(Self {
            dict,
            max_hamming,
            rotated,
        })
    }

    /// Matcher using the dictionary's own correction capacity.
    pub fn for_dictionary(dict: Dictionary) -> Result<Self, DictionaryError> {
        let max = dict.max_correction_bits;
        Self::new(dict, max)
    }

    #[inline]
    pub fn dictionary(&self) -> &Dictionary {
        &self.dict
    }

    #[inline]
    pub fn max_hamming(&self) -> u8 {
        self.max_hamming
    }

    /// Closest codeword over all ids and rotations, if within `max_hamming`.
    ///
    /// Ties keep the lowest id and rotation.
    pub fn match_code(&self, observed: u64) -> Option<Match> {
        let mut best: Option<Match> = None;

        for (id, rots) in self.rotated.iter().enumerate() {
            for (rot, &cand) in rots.iter().enumerate() {
                let h = (observed ^ cand).count_ones();
                if h > self.max_hamming as u32 || best.is_some_and(|b| h >= b.hamming as u32) {
                    continue;
                }
                best = Some(Match {
                    id: id as u32,
                    rotation: rot as u8,
                    hamming: h as u8,
                });
                if h == 0 {
                    return best;
                }
            }
        }

        best
    }
}

/// Rotate a row-major code (`idx = y * n + x`) by `rot` quarter turns clockwise.
pub fn rotate_code_u64(code: u64, n: usize, rot: u8) -> u64 {
    let rot = rot & 3;
    if rot == 0 {
        return code;
    }

    let mut out = 0u64;
    for y in 0..n {
        for x in 0..n {
            let (sx, sy) = match rot {
                1 => (y, n - 1 - x),
                2 => (n - 1 - x, n - 1 - y),
                _ => (n - 1 - y, x),
            };
            out |= ((code >> (sy * n + sx)) & 1) << (y * n + x);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builtins::DICT_4X4_50;

    #[test]
    fn four_quarter_turns_are_identity() {
        let code = 0x0123_4567_89ab_cdef_u64;
        let r = (0..4).fold(code, |c, _| rotate_code_u64(c, 8, 1));
        assert_eq!(code, r);
        assert_eq!(rotate_code_u64(rotate_code_u64(code, 8, 1), 8, 3), code);
    }

    #[test]
    fn quarter_turn_is_clockwise() {
        // Top-left cell moves to the top-right corner.
        assert_eq!(rotate_code_u64(0b1, 3, 1), 1 << 2);
        assert_eq!(rotate_code_u64(0b1, 3, 2), 1 << 8);
    }

    #[test]
    fn matcher_finds_rotated_and_corrupted_codes() {
        let matcher = Matcher::for_dictionary(DICT_4X4_50).expect("matcher");
        let base = DICT_4X4_50.codes[5];

        let m = matcher.match_code(rotate_code_u64(base, 4, 1)).expect("match");
        assert_eq!((m.id, m.rotation, m.hamming), (5, 1, 0));

        let noisy = rotate_code_u64(base, 4, 3) ^ (1 << 6);
        let m = matcher.match_code(noisy).expect("match");
        assert_eq!((m.id, m.rotation, m.hamming), (5, 3, 1));

        assert!(matcher.match_code(base ^ 0b11).is_none());
    }
}
