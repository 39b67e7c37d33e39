//! Regional channel plans known to the link
//!
//! Only the identity of a region matters here: its stable numeric id, a
//! display name, and how many sub-bands the initial join may be pinned to.
//! Channel frequencies and data rates belong to the underlying service.

use serde::Serialize;

/// LoRaWAN regional parameter set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum Region {
    /// Asia 923 MHz
    As923 = 0,
    /// Australia 915 MHz
    #[default]
    Au915 = 1,
    /// China 470 MHz
    Cn470 = 2,
    /// China 779 MHz
    Cn779 = 3,
    /// Europe 433 MHz
    Eu433 = 4,
    /// Europe 868 MHz
    Eu868 = 5,
    /// Korea 920 MHz
    Kr920 = 6,
    /// India 865 MHz
    In865 = 7,
    /// US 915 MHz
    Us915 = 8,
    /// Asia 923 MHz, variant 2
    As923_2 = 9,
    /// Asia 923 MHz, variant 3
    As923_3 = 10,
    /// Asia 923 MHz, variant 4
    As923_4 = 11,
    /// Russia 864 MHz
    Ru864 = 12,
}

impl Region {
    /// Every supported region, ordered by id
    pub const ALL: [Region; 13] = [
        Region::As923,
        Region::Au915,
        Region::Cn470,
        Region::Cn779,
        Region::Eu433,
        Region::Eu868,
        Region::Kr920,
        Region::In865,
        Region::Us915,
        Region::As923_2,
        Region::As923_3,
        Region::As923_4,
        Region::Ru864,
    ];

    /// Look up a region by its numeric id
    pub fn from_id(id: u8) -> Option<Self> {
        Self::ALL.get(usize::from(id)).copied()
    }

    /// Stable numeric id, as persisted and reported
    pub fn id(self) -> u8 {
        self as u8
    }

    /// Human readable name
    pub fn name(self) -> &'static str {
        match self {
            Region::As923 => "Asia 923 MHz",
            Region::Au915 => "Australia 915 MHz",
            Region::Cn470 => "China 470 MHz",
            Region::Cn779 => "China 779 MHz",
            Region::Eu433 => "Europe 433 MHz",
            Region::Eu868 => "Europe 868 MHz",
            Region::Kr920 => "Korea 920 MHz",
            Region::In865 => "India 865 MHz",
            Region::Us915 => "US 915 MHz",
            Region::As923_2 => "Asia 923 MHz variant 2",
            Region::As923_3 => "Asia 923 MHz variant 3",
            Region::As923_4 => "Asia 923 MHz variant 4",
            Region::Ru864 => "Russia 864 MHz",
        }
    }

    /// Highest selectable sub-band; sub-bands are numbered from 1
    pub fn max_subband(self) -> u8 {
        match self {
            Region::Au915 | Region::Us915 => 9,
            Region::Cn470 => 12,
            Region::Cn779 | Region::Eu433 | Region::Eu868 | Region::Kr920 | Region::In865 => 2,
            Region::As923
            | Region::As923_2
            | Region::As923_3
            | Region::As923_4
            | Region::Ru864 => 1,
        }
    }

    /// Whether `subband` lies in `1..=max_subband()`
    pub fn accepts_subband(self, subband: u8) -> bool {
        (1..=self.max_subband()).contains(&subband)
    }

    /// Catalogue entry for reporting
    pub fn info(self) -> RegionInfo {
        RegionInfo {
            id: self.id(),
            name: self.name(),
            max_sb: self.max_subband(),
        }
    }
}

/// Region catalogue entry, as served to the configuration layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RegionInfo {
    /// Numeric region id
    pub id: u8,
    /// Display name
    pub name: &'static str,
    /// Highest selectable sub-band
    pub max_sb: u8,
}
