//! Dictionary matching and rotation helpers.

use crate::Dictionary;
use std::collections::HashMap;

/// A dictionary match for an observed marker code.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Match {
    /// Marker id in the dictionary.
    pub id: u32,
    /// Rotation `0..=3` such that: `observed_code == rotate(dict_code, rotation)`.
    pub rotation: u8,
    /// Hamming distance between observed and dictionary code (after rotation).
    pub hamming: u8,
}

/// Matcher for a fixed dictionary.
///
/// Exact codes (in any rotation) resolve through a hash map. Only when
/// `max_hamming > 0` and no exact hit exists does it fall back to a linear
/// search over all ids and rotations.
#[derive(Clone, Debug)]
pub struct Matcher {
    dict: Dictionary,
    max_hamming: u8,
    rotated: Vec<[u64; 4]>,
    exact: HashMap<u64, (u32, u8)>,
}

impl Matcher {
    /// Build a matcher for the given dictionary and Hamming threshold.
    ///
    /// Dictionaries with more than 64 bits per marker cannot be packed into a
    /// `u64` and produce a matcher that never matches.
    pub fn new(dict: Dictionary, max_hamming: u8) -> Self {
        let n = dict.marker_size;
        let packable = dict.bit_count() <= 64;
        let mut rotated = Vec::with_capacity(dict.codes.len());
        let mut exact = HashMap::with_capacity(dict.codes.len() * 4);

        if packable {
            for (id, &base) in dict.codes.iter().enumerate() {
                let rots = [
                    rotate_code_u64(base, n, 0),
                    rotate_code_u64(base, n, 1),
                    rotate_code_u64(base, n, 2),
                    rotate_code_u64(base, n, 3),
                ];
                for (rot, &code) in rots.iter().enumerate() {
                    // Symmetric codes map to several rotations; keep the lowest.
                    exact.entry(code).or_insert((id as u32, rot as u8));
                }
                rotated.push(rots);
            }
        } else {
            log::warn!(
                "dictionary {} has {} bits per marker; matching disabled",
                dict.name,
                dict.bit_count()
            );
        }

        Self {
            dict,
            max_hamming,
            rotated,
            exact,
        }
    }

    /// Dictionary used by this matcher.
    #[inline]
    pub fn dictionary(&self) -> Dictionary {
        self.dict
    }

    /// Maximum Hamming distance allowed for matches.
    #[inline]
    pub fn max_hamming(&self) -> u8 {
        self.max_hamming
    }

    /// Find the best match within `max_hamming`.
    pub fn match_code(&self, observed: u64) -> Option<Match> {
        if let Some(&(id, rotation)) = self.exact.get(&observed) {
            return Some(Match {
                id,
                rotation,
                hamming: 0,
            });
        }
        if self.max_hamming == 0 {
            return None;
        }

        let mut best: Option<Match> = None;
        for (id, rots) in self.rotated.iter().enumerate() {
            for (rot, &cand) in rots.iter().enumerate() {
                let h = (observed ^ cand).count_ones() as u8;
                if h > self.max_hamming {
                    continue;
                }
                if best.map_or(true, |prev| h < prev.hamming) {
                    best = Some(Match {
                        id: id as u32,
                        rotation: rot as u8,
                        hamming: h,
                    });
                }
            }
        }
        best
    }
}

/// Rotate a code stored in row-major bits (`idx = y * N + x`) by
/// `rot * 90°` clockwise.
pub fn rotate_code_u64(code: u64, n: usize, rot: u8) -> u64 {
    let rot = rot & 3;
    if rot == 0 {
        return code;
    }

    #[inline]
    fn get(code: u64, idx: usize) -> u64 {
        (code >> idx) & 1
    }

    let mut out = 0u64;
    for y in 0..n {
        for x in 0..n {
            let (sx, sy) = match rot {
                1 => (y, n - 1 - x),
                2 => (n - 1 - x, n - 1 - y),
                _ => (n - 1 - y, x),
            };
            out |= get(code, sy * n + sx) << (y * n + x);
        }
    }
    out
}
