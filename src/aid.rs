//! Station membership tracking
//!
//! This module contains the association bitmap maintained from
//! association/disassociation notifications and the sorted AID list
//! snapshot generated from it.

use serde::{Deserialize, Serialize};
use crate::{RawError, Result, MAX_AID};

/// Sentinel stored in cached AID indices that could not be resolved
pub const INVALID_AID_IDX: i32 = -1;

const BITS_PER_WORD: usize = u64::BITS as usize;
const BITMAP_WORDS: usize = (MAX_AID as usize + 1).div_ceil(BITS_PER_WORD);

/// Bitmap of associated stations, bit position is the AID
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AidBitmap {
    /// Bitmap words, least significant bit of word 0 is AID 0
    words: Vec<u64>,
    /// Number of set bits
    count: usize,
}

impl AidBitmap {
    /// Create an empty bitmap covering the whole S1G AID space
    pub fn new() -> Self {
        Self {
            words: vec![0; BITMAP_WORDS],
            count: 0,
        }
    }

    fn check_aid(aid: u16) -> Result<()> {
        if aid == 0 || aid > MAX_AID {
            return Err(RawError::InvalidArgument(format!("AID {} out of range", aid)));
        }
        Ok(())
    }

    /// Mark a station as associated. Returns false if it was already present.
    pub fn insert(&mut self, aid: u16) -> Result<bool> {
        Self::check_aid(aid)?;
        let (word, bit) = (aid as usize / BITS_PER_WORD, aid as usize % BITS_PER_WORD);
        if self.words[word] & (1 << bit) != 0 {
            return Ok(false);
        }
        self.words[word] |= 1 << bit;
        self.count += 1;
        Ok(true)
    }

    /// Mark a station as disassociated. Returns false if it was not present.
    pub fn remove(&mut self, aid: u16) -> Result<bool> {
        Self::check_aid(aid)?;
        let (word, bit) = (aid as usize / BITS_PER_WORD, aid as usize % BITS_PER_WORD);
        if self.words[word] & (1 << bit) == 0 {
            return Ok(false);
        }
        self.words[word] &= !(1 << bit);
        self.count -= 1;
        Ok(true)
    }

    /// Check if a station is associated
    pub fn contains(&self, aid: u16) -> bool {
        let word = aid as usize / BITS_PER_WORD;
        word < self.words.len() && self.words[word] & (1 << (aid as usize % BITS_PER_WORD)) != 0
    }

    /// Number of associated stations
    pub fn count(&self) -> usize {
        self.count
    }

    /// Largest associated AID
    pub fn max_aid(&self) -> Option<u16> {
        self.words
            .iter()
            .enumerate()
            .rev()
            .find(|&(_, &w)| w != 0)
            .map(|(i, &w)| (i * BITS_PER_WORD + (BITS_PER_WORD - 1 - w.leading_zeros() as usize)) as u16)
    }

    /// Raw bitmap words
    pub fn words(&self) -> &[u64] {
        &self.words
    }

    /// Remove every station
    pub fn clear(&mut self) {
        self.words.iter_mut().for_each(|w| *w = 0);
        self.count = 0;
    }
}

impl Default for AidBitmap {
    fn default() -> Self {
        Self::new()
    }
}

/// Sorted snapshot of associated AIDs.
///
/// A list is never modified once generated; membership changes produce a new
/// list that replaces the old one.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AidList {
    aids: Vec<u16>,
}

impl AidList {
    /// Generate an ordered AID list from a membership bitmap.
    ///
    /// `num_aids` is the number of set bits and `max_aid` the highest one. The
    /// bitmap is scanned once up to and including `max_aid`; finding more or
    /// fewer stations than announced is a logic fault.
    pub fn generate(bitmap: &[u64], num_aids: usize, max_aid: u16) -> Result<Self> {
        let mut aids = Vec::new();
        aids.try_reserve_exact(num_aids)
            .map_err(|e| RawError::ResourceExhausted(format!("AID list: {}", e)))?;

        if num_aids > 0 {
            let num_bits = max_aid as usize + 1;
            for bit in 0..num_bits {
                let word = bit / BITS_PER_WORD;
                if word >= bitmap.len() {
                    break;
                }
                if bitmap[word] & (1 << (bit % BITS_PER_WORD)) == 0 {
                    continue;
                }
                if aids.len() >= num_aids {
                    return Err(RawError::InternalInconsistency(format!(
                        "AID bitmap holds more than {} stations",
                        num_aids
                    )));
                }
                aids.push(bit as u16);
            }
        }

        if aids.len() != num_aids {
            return Err(RawError::InternalInconsistency(format!(
                "AID bitmap holds {} stations, expected {}",
                aids.len(),
                num_aids
            )));
        }

        Ok(Self { aids })
    }

    /// Generate the list for the current contents of a membership bitmap
    pub fn from_bitmap(bitmap: &AidBitmap) -> Result<Self> {
        Self::generate(bitmap.words(), bitmap.count(), bitmap.max_aid().unwrap_or(0))
    }

    /// Build a list from arbitrary AIDs (sorted and deduplicated)
    pub fn from_aids(aids: impl IntoIterator<Item = u16>) -> Self {
        let mut aids: Vec<u16> = aids.into_iter().collect();
        aids.sort_unstable();
        aids.dedup();
        Self { aids }
    }

    pub fn len(&self) -> usize {
        self.aids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.aids.is_empty()
    }

    pub fn get(&self, idx: usize) -> Option<u16> {
        self.aids.get(idx).copied()
    }

    pub fn as_slice(&self) -> &[u16] {
        &self.aids
    }

    /// Index of `aid`, or of the closest smaller AID when it is not present
    pub fn closest_index_at_or_below(&self, aid: u16) -> Option<usize> {
        match self.aids.binary_search(&aid) {
            Ok(idx) => Some(idx),
            Err(0) => None,
            Err(idx) => Some(idx - 1),
        }
    }

    /// Resolve an inclusive AID range into cached list indices.
    ///
    /// Both indices are [`INVALID_AID_IDX`] when the range cannot be matched
    /// against the current membership.
    pub fn resolve_indices(&self, start_aid: u16, end_aid: u16) -> (i32, i32) {
        const INVALID: (i32, i32) = (INVALID_AID_IDX, INVALID_AID_IDX);

        let Some(start_idx) = self.closest_index_at_or_below(start_aid) else {
            return INVALID;
        };
        if self.aids[start_idx] < start_aid {
            return INVALID;
        }
        match self.closest_index_at_or_below(end_aid) {
            Some(end_idx) if end_idx >= start_idx => (start_idx as i32, end_idx as i32),
            _ => INVALID,
        }
    }
}
