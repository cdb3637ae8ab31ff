// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

//! Signal-to-channel mapping for the 256-channel VCT target.
//!
//! Accepted interchange forms are a `Signal,Channel` CSV table and a JSON
//! object of channel arrays; both round-trip through the exporters.

use std::collections::HashMap;
use std::fmt::Write as _;
use std::path::Path;

use crate::core::error::{ConvertError, ConvertErrorKind};

pub const CHANNEL_COUNT: usize = 256;

/// Ordered mapping from signal name to tester channel indices.
#[derive(Debug, Clone, Default)]
pub struct ChannelMap {
    assignments: Vec<(String, Vec<u8>)>,
    index: HashMap<String, usize>,
}

impl ChannelMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, signal: &str, channels: Vec<u8>) -> Result<(), ConvertError> {
        if self.index.contains_key(signal) {
            return Err(ConvertError::new(
                ConvertErrorKind::ChannelMapParse,
                "Signal mapped more than once",
                Some(signal),
            ));
        }
        for &channel in &channels {
            if let Some(owner) = self.owner_of(channel) {
                let detail = format!("channel {channel} held by {owner} and {signal}");
                return Err(ConvertError::new(
                    ConvertErrorKind::ChannelMapConflict,
                    "Channel assigned to more than one signal",
                    Some(&detail),
                ));
            }
        }
        self.index.insert(signal.to_string(), self.assignments.len());
        self.assignments.push((signal.to_string(), channels));
        Ok(())
    }

    pub fn channels_of(&self, signal: &str) -> Option<&[u8]> {
        self.index
            .get(signal)
            .map(|&i| self.assignments[i].1.as_slice())
    }

    pub fn contains(&self, signal: &str) -> bool {
        self.index.contains_key(signal)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Vec<u8>)> {
        self.assignments.iter().map(|(name, chans)| (name, chans))
    }

    pub fn len(&self) -> usize {
        self.assignments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.assignments.is_empty()
    }

    fn owner_of(&self, channel: u8) -> Option<&str> {
        self.assignments
            .iter()
            .find(|(_, chans)| chans.contains(&channel))
            .map(|(name, _)| name.as_str())
    }

    /// Per-channel signal names for the DRVR header and the legend.
    pub fn channel_owners(&self) -> Vec<Option<&str>> {
        let mut owners: Vec<Option<&str>> = vec![None; CHANNEL_COUNT];
        for (name, channels) in &self.assignments {
            for &channel in channels {
                owners[channel as usize] = Some(name.as_str());
            }
        }
        owners
    }

    /// Load from a file, sniffing JSON by extension.
    pub fn from_path(path: &Path) -> Result<Self, ConvertError> {
        let text = std::fs::read_to_string(path).map_err(|err| {
            ConvertError::new(
                ConvertErrorKind::Io,
                &format!("Error reading channel map: {err}"),
                Some(path.to_string_lossy().as_ref()),
            )
        })?;
        let is_json = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
        if is_json {
            Self::from_json(&text)
        } else {
            Self::from_csv(&text)
        }
    }

    /// Parse the tabular form: a `Signal,Channel` header row, then one
    /// row per signal with one or more channel columns.
    pub fn from_csv(text: &str) -> Result<Self, ConvertError> {
        let mut map = Self::new();
        let mut rows = text.lines().filter(|line| !line.trim().is_empty());

        let header = rows.next().ok_or_else(|| {
            ConvertError::new(ConvertErrorKind::ChannelMapParse, "Channel map is empty", None)
        })?;
        let mut header_cells = header.split(',').map(str::trim);
        if header_cells.next() != Some("Signal") {
            return Err(ConvertError::new(
                ConvertErrorKind::ChannelMapParse,
                "First row must start with Signal,Channel",
                Some(header.trim()),
            ));
        }

        for row in rows {
            let mut cells = row.split(',').map(str::trim);
            let signal = match cells.next() {
                Some(name) if !name.is_empty() => name,
                _ => {
                    return Err(ConvertError::new(
                        ConvertErrorKind::ChannelMapParse,
                        "Row is missing a signal name",
                        Some(row.trim()),
                    ))
                }
            };
            let mut channels = Vec::new();
            for cell in cells {
                channels.push(parse_channel_cell(cell, signal)?);
            }
            if channels.is_empty() {
                return Err(ConvertError::new(
                    ConvertErrorKind::ChannelMapParse,
                    "Row has no channel columns",
                    Some(signal),
                ));
            }
            map.insert(signal, channels)?;
        }
        Ok(map)
    }

    pub fn to_csv(&self) -> String {
        let mut out = String::from("Signal,Channel\n");
        for (name, channels) in &self.assignments {
            let cells: Vec<String> = channels.iter().map(|c| c.to_string()).collect();
            let _ = writeln!(out, "{name},{}", cells.join(","));
        }
        out
    }

    /// Parse the structured form: `{ "<signal>": [<channels…>] }`.
    pub fn from_json(text: &str) -> Result<Self, ConvertError> {
        let value: serde_json::Value = serde_json::from_str(text).map_err(|err| {
            ConvertError::new(
                ConvertErrorKind::ChannelMapParse,
                &format!("Invalid channel map JSON: {err}"),
                None,
            )
        })?;
        let object = value.as_object().ok_or_else(|| {
            ConvertError::new(
                ConvertErrorKind::ChannelMapParse,
                "Channel map JSON must be an object",
                None,
            )
        })?;

        let mut map = Self::new();
        for (signal, channels) in object {
            let list = channels.as_array().ok_or_else(|| {
                ConvertError::new(
                    ConvertErrorKind::ChannelMapParse,
                    "Channel list must be an array",
                    Some(signal),
                )
            })?;
            let mut parsed = Vec::with_capacity(list.len());
            for value in list {
                let number = value.as_u64().ok_or_else(|| {
                    ConvertError::new(
                        ConvertErrorKind::ChannelMapParse,
                        "Channel index must be a non-negative integer",
                        Some(signal),
                    )
                })?;
                parsed.push(check_channel_range(number, signal)?);
            }
            map.insert(signal, parsed)?;
        }
        Ok(map)
    }

    pub fn to_json(&self) -> String {
        let mut object = serde_json::Map::new();
        for (name, channels) in &self.assignments {
            let list: Vec<serde_json::Value> = channels
                .iter()
                .map(|&c| serde_json::Value::from(u64::from(c)))
                .collect();
            object.insert(name.clone(), serde_json::Value::Array(list));
        }
        serde_json::Value::Object(object).to_string()
    }
}

fn parse_channel_cell(cell: &str, signal: &str) -> Result<u8, ConvertError> {
    if cell.is_empty() {
        return Err(ConvertError::new(
            ConvertErrorKind::ChannelMapParse,
            "Empty channel cell",
            Some(signal),
        ));
    }
    let number: u64 = cell.parse().map_err(|_| {
        ConvertError::new(
            ConvertErrorKind::ChannelMapParse,
            "Channel cell is not an integer",
            Some(cell),
        )
    })?;
    check_channel_range(number, signal)
}

fn check_channel_range(number: u64, signal: &str) -> Result<u8, ConvertError> {
    if number as usize >= CHANNEL_COUNT {
        let detail = format!("{number} for {signal}");
        return Err(ConvertError::new(
            ConvertErrorKind::ChannelMapParse,
            "Channel index out of range (0-255)",
            Some(&detail),
        ));
    }
    Ok(number as u8)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn csv_with_multiple_channel_columns() {
        let map = ChannelMap::from_csv("Signal,Channel\nclk,0\nbus,10,11,12,13\n").expect("parse");
        assert_eq!(map.channels_of("clk"), Some(&[0u8][..]));
        assert_eq!(map.channels_of("bus"), Some(&[10u8, 11, 12, 13][..]));
    }

    #[test]
    fn csv_rejects_non_integer_cell() {
        let err = ChannelMap::from_csv("Signal,Channel\nclk,zero\n").expect_err("bad cell");
        assert_eq!(err.kind(), ConvertErrorKind::ChannelMapParse);
    }

    #[test]
    fn csv_rejects_missing_cell() {
        let err = ChannelMap::from_csv("Signal,Channel\nclk,\n").expect_err("empty cell");
        assert_eq!(err.kind(), ConvertErrorKind::ChannelMapParse);
    }

    #[test]
    fn duplicate_channel_conflicts() {
        let err = ChannelMap::from_csv("Signal,Channel\na,3\nb,3\n").expect_err("conflict");
        assert_eq!(err.kind(), ConvertErrorKind::ChannelMapConflict);
    }

    #[test]
    fn json_round_trip() {
        let map = ChannelMap::from_json("{\"a\": [0, 1], \"b\": [255]}").expect("parse");
        assert_eq!(map.channels_of("b"), Some(&[255u8][..]));
        let again = ChannelMap::from_json(&map.to_json()).expect("reparse");
        assert_eq!(again.channels_of("a"), Some(&[0u8, 1][..]));
    }

    #[test]
    fn json_rejects_out_of_range_channel() {
        let err = ChannelMap::from_json("{\"a\": [256]}").expect_err("range");
        assert_eq!(err.kind(), ConvertErrorKind::ChannelMapParse);
    }

    #[test]
    fn channel_owners_cover_all_slots() {
        let map = ChannelMap::from_csv("Signal,Channel\na,1\n").expect("parse");
        let owners = map.channel_owners();
        assert_eq!(owners.len(), CHANNEL_COUNT);
        assert_eq!(owners[1], Some("a"));
        assert_eq!(owners[0], None);
    }
}
