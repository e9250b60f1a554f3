use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Where a registration code is issued.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegionInfo {
    pub region_name: String,
    pub subregion: String,
}

impl RegionInfo {
    pub fn new(region_name: impl Into<String>, subregion: impl Into<String>) -> Self {
        Self {
            region_name: region_name.into(),
            subregion: subregion.into(),
        }
    }

    pub fn unknown() -> Self {
        Self::new("Unknown", "Unknown")
    }

    pub fn is_known(&self) -> bool {
        *self != Self::unknown()
    }
}

const DEFAULT_REGIONS: &[(&str, &str)] = &[
    ("AP", "Andhra Pradesh"),
    ("AR", "Arunachal Pradesh"),
    ("AS", "Assam"),
    ("BR", "Bihar"),
    ("CG", "Chhattisgarh"),
    ("GA", "Goa"),
    ("GJ", "Gujarat"),
    ("HR", "Haryana"),
    ("HP", "Himachal Pradesh"),
    ("JK", "Jammu and Kashmir"),
    ("JH", "Jharkhand"),
    ("KA", "Karnataka"),
    ("KL", "Kerala"),
    ("MP", "Madhya Pradesh"),
    ("MH", "Maharashtra"),
    ("MN", "Manipur"),
    ("ML", "Meghalaya"),
    ("MZ", "Mizoram"),
    ("NL", "Nagaland"),
    ("OR", "Odisha"),
    ("PB", "Punjab"),
    ("RJ", "Rajasthan"),
    ("SK", "Sikkim"),
    ("TN", "Tamil Nadu"),
    ("TS", "Telangana"),
    ("TR", "Tripura"),
    ("UP", "Uttar Pradesh"),
    ("UK", "Uttarakhand"),
    ("WB", "West Bengal"),
    ("US", "United States"),
    ("CA", "Canada"),
];

/// Registration-code prefix table.
///
/// Keys are the first two characters of the plate text, compared
/// case-insensitively.
#[derive(Debug, Clone)]
pub struct RegionLookup {
    table: HashMap<String, RegionInfo>,
}

impl RegionLookup {
    pub fn empty() -> Self {
        Self { table: HashMap::new() }
    }

    /// Add or replace the entry for a two-character code
    pub fn with_entry(mut self, code: &str, region_name: &str, subregion: &str) -> Self {
        self.table
            .insert(code.to_ascii_uppercase(), RegionInfo::new(region_name, subregion));
        self
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    pub fn lookup(&self, plate_text: &str) -> RegionInfo {
        let code: String = plate_text.chars().take(2).collect();
        if code.chars().count() < 2 {
            return RegionInfo::unknown();
        }
        self.table
            .get(&code.to_ascii_uppercase())
            .cloned()
            .unwrap_or_else(RegionInfo::unknown)
    }
}

impl Default for RegionLookup {
    fn default() -> Self {
        DEFAULT_REGIONS
            .iter()
            .fold(Self::empty(), |lookup, (code, name)| lookup.with_entry(code, name, "Various"))
    }
}
