//! Burst buffer size encoding
//!
//! Sizes travel as `u32` gigabytes. Two values are sentinels and the high bit
//! switches the unit from gigabytes to a node count.

use crate::error::{Error, Result};
use serde::{Deserialize, Deserializer};

/// Value not set
pub const NO_VAL: u32 = 0xffff_fffe;
/// Unlimited
pub const INFINITE: u32 = 0xffff_ffff;
/// High bit marking a size expressed in nodes
pub const SIZE_IN_NODES: u32 = 0x8000_0000;

const GB_PER_TB: u32 = 1024;
const GB_PER_PB: u32 = 1024 * 1024;

/// Check for either sentinel
#[inline]
pub fn is_unlimited(size: u32) -> bool {
    size == NO_VAL || size == INFINITE
}

/// Check for a node-count size
#[inline]
pub fn is_node_count(size: u32) -> bool {
    !is_unlimited(size) && (size & SIZE_IN_NODES) != 0
}

/// Render a size the way `show burst` prints it
pub fn format_size(size: u32) -> String {
    if is_unlimited(size) {
        "INFINITE".to_string()
    } else if size == 0 {
        "0GB".to_string()
    } else if size & SIZE_IN_NODES != 0 {
        format!("{}N", size & !SIZE_IN_NODES)
    } else if size % GB_PER_PB == 0 {
        format!("{}PB", size / GB_PER_PB)
    } else if size % GB_PER_TB == 0 {
        format!("{}TB", size / GB_PER_TB)
    } else {
        format!("{}GB", size)
    }
}

/// Parse `<n>[G|GB|T|TB|P|PB|N]` (case-insensitive, default GB) or `INFINITE`
pub fn parse_size(text: &str) -> Result<u32> {
    let text = text.trim();
    if text.eq_ignore_ascii_case("infinite") || text.eq_ignore_ascii_case("unlimited") {
        return Ok(INFINITE);
    }

    let split = text
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(text.len());
    let (digits, unit) = text.split_at(split);
    let value: u32 = digits
        .parse()
        .map_err(|_| Error::SizeParse(text.to_string()))?;

    let (multiplier, nodes) = match unit.trim().to_ascii_uppercase().as_str() {
        "" | "G" | "GB" => (1, false),
        "T" | "TB" => (GB_PER_TB, false),
        "P" | "PB" => (GB_PER_PB, false),
        "N" => (1, true),
        _ => return Err(Error::SizeParse(text.to_string())),
    };

    let size = value
        .checked_mul(multiplier)
        .filter(|v| *v & SIZE_IN_NODES == 0)
        .ok_or_else(|| Error::SizeParse(text.to_string()))?;

    Ok(if nodes { size | SIZE_IN_NODES } else { size })
}

/// Serde helper accepting either a raw gigabyte count or a size string
pub fn deserialize_size<'de, D>(deserializer: D) -> std::result::Result<u32, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Num(u32),
        Text(String),
    }

    match Raw::deserialize(deserializer)? {
        Raw::Num(n) => Ok(n),
        Raw::Text(s) => parse_size(&s).map_err(serde::de::Error::custom),
    }
}
