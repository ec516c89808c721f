//! Utility module
//!
//! Address formatting helpers shared by logging, serialization and the
//! presentation-layer request parsing.

use std::num::ParseIntError;

/// Formats a 16-bit short address as `0x0001`
pub fn format_short_address(addr: u16) -> String {
    format!("0x{:04X}", addr)
}

/// Formats a 64-bit extended address as `0x00124B0008682C02`
pub fn format_ext_address(addr: u64) -> String {
    format!("0x{:016X}", addr)
}

/// Parses a short address given either as hex (`0x0001`) or decimal (`1`)
pub fn parse_short_address(text: &str) -> Result<u16, ParseIntError> {
    let text = text.trim();
    match strip_hex_prefix(text) {
        Some(hex) => u16::from_str_radix(hex, 16),
        None => text.parse(),
    }
}

/// Parses an extended address given either as hex (`0x...`) or decimal
pub fn parse_ext_address(text: &str) -> Result<u64, ParseIntError> {
    let text = text.trim();
    match strip_hex_prefix(text) {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => text.parse(),
    }
}

fn strip_hex_prefix(text: &str) -> Option<&str> {
    text.strip_prefix("0x").or_else(|| text.strip_prefix("0X"))
}
