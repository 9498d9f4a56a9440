//! Supported marker dictionaries.

use crate::ZolotoError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use zoloto_aruco::{builtins, Dictionary};

#[allow(non_camel_case_types)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MarkerType {
    #[serde(rename = "DICT_4X4_50")]
    Dict4x4_50,
    #[serde(rename = "DICT_4X4_100")]
    Dict4x4_100,
}

impl MarkerType {
    pub const ALL: [MarkerType; 2] = [MarkerType::Dict4x4_50, MarkerType::Dict4x4_100];

    pub fn dictionary(self) -> Dictionary {
        match self {
            MarkerType::Dict4x4_50 => builtins::DICT_4X4_50,
            MarkerType::Dict4x4_100 => builtins::DICT_4X4_100,
        }
    }

    pub fn name(self) -> &'static str {
        self.dictionary().name
    }

    /// Largest valid marker id.
    pub fn max_id(self) -> u32 {
        self.dictionary().len().saturating_sub(1) as u32
    }

    /// Inner bits per marker side.
    pub fn marker_bits(self) -> usize {
        self.dictionary().marker_size
    }
}

impl fmt::Display for MarkerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for MarkerType {
    type Err = ZolotoError;

    /// Accepts `DICT_4X4_50` as well as `4x4_50`, case-insensitively.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let upper = s.trim().to_ascii_uppercase();
        let name = upper.strip_prefix("DICT_").unwrap_or(&upper);
        MarkerType::ALL
            .into_iter()
            .find(|t| t.name().strip_prefix("DICT_") == Some(name))
            .ok_or_else(|| ZolotoError::UnknownMarkerType(s.to_string()))
    }
}
