// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

//! Waveform tables: per-signal WFC substitution derived from Timing events.

use std::collections::HashMap;

use crate::core::error::{ConvertError, ConvertErrorKind};
use crate::core::symbol_table::GroupTable;

/// One waveform declaration as written in the Timing block: a signal or
/// group reference, the WFC list it defines, and the timed event edges.
/// A multi-character WFC list is split per character; each edge's
/// slash-separated event list aligns with the WFC characters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WaveformEntry {
    pub sigref: String,
    pub wfcs: String,
    pub edges: Vec<WaveformEdge>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WaveformEdge {
    pub time: String,
    pub events: Vec<String>,
}

/// A named waveform table. After `finalize` the substitution map is total
/// over the declared WFCs; anything else passes through unchanged.
#[derive(Debug, Clone, Default)]
pub struct WaveformTable {
    pub name: String,
    pub period: Option<String>,
    pub entries: Vec<WaveformEntry>,
    map: HashMap<(String, char), char>,
}

impl WaveformTable {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            period: None,
            entries: Vec::new(),
            map: HashMap::new(),
        }
    }

    /// Substitute one raw WFC for `signal`. Unknown combinations pass
    /// through unchanged.
    pub fn drive(&self, signal: &str, raw: char) -> char {
        self.map
            .get(&(signal.to_string(), raw))
            .copied()
            .unwrap_or(raw)
    }

    pub fn substitution(&self, signal: &str) -> Vec<(char, char)> {
        let mut pairs: Vec<(char, char)> = self
            .map
            .iter()
            .filter(|((sig, _), _)| sig == signal)
            .map(|((_, raw), driven)| (*raw, *driven))
            .collect();
        pairs.sort();
        pairs
    }

    fn build_map(&mut self, groups: &GroupTable) {
        for entry in &self.entries {
            let signals: Vec<String> = match groups.flat(&entry.sigref) {
                Some(flat) => flat.as_ref().clone(),
                None => vec![entry.sigref.clone()],
            };

            for (idx, wfc) in entry.wfcs.chars().enumerate() {
                let events = collect_events(&entry.edges, idx);
                let driven = derive_driven(&events, wfc);
                for signal in &signals {
                    self.map.insert((signal.clone(), wfc), driven);
                }
            }
        }
    }
}

/// Concatenate the event letters a WFC sees across the entry's edges.
/// Edges with a single event apply it to every WFC in the list.
fn collect_events(edges: &[WaveformEdge], wfc_index: usize) -> String {
    let mut events = String::new();
    for edge in edges {
        let event = if edge.events.len() == 1 {
            edge.events.first()
        } else {
            edge.events.get(wfc_index)
        };
        if let Some(event) = event {
            events.push_str(event);
        }
    }
    events
}

/// Collapse an event sequence to a driven character. A single event
/// yields its own letter; the pulse shapes DUD and UDU become P and N;
/// anything else keeps the raw WFC.
pub fn derive_driven(events: &str, raw: char) -> char {
    let mut chars = events.chars();
    match (chars.next(), chars.next()) {
        (Some(only), None) => only,
        _ => match events {
            "DUD" => 'P',
            "UDU" => 'N',
            _ => raw,
        },
    }
}

/// All waveform tables in declaration order. Ids are first-seen indices
/// and double as the VCT RRADR digit.
#[derive(Debug, Default)]
pub struct WftTable {
    tables: Vec<WaveformTable>,
    index: HashMap<String, usize>,
    limit: Option<usize>,
}

impl WftTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cap the number of declarations (8 for the VCT target).
    pub fn with_limit(limit: Option<usize>) -> Self {
        Self {
            limit,
            ..Self::default()
        }
    }

    pub fn add(&mut self, table: WaveformTable) -> Result<usize, ConvertError> {
        if self.index.contains_key(&table.name) {
            return Err(ConvertError::new(
                ConvertErrorKind::SymbolTable,
                "Waveform table declared more than once",
                Some(&table.name),
            ));
        }
        if let Some(limit) = self.limit {
            if self.tables.len() >= limit {
                return Err(ConvertError::new(
                    ConvertErrorKind::WftLimit,
                    "Too many waveform tables for the target",
                    Some(&table.name),
                ));
            }
        }
        let id = self.tables.len();
        self.index.insert(table.name.clone(), id);
        self.tables.push(table);
        Ok(id)
    }

    pub fn get(&self, name: &str) -> Option<&WaveformTable> {
        self.index.get(name).map(|&i| &self.tables[i])
    }

    pub fn id(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    pub fn by_id(&self, id: usize) -> Option<&WaveformTable> {
        self.tables.get(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &WaveformTable> {
        self.tables.iter()
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    pub fn finalize(&mut self, groups: &GroupTable) -> Result<(), ConvertError> {
        for table in &mut self.tables {
            table.build_map(groups);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::symbol_table::GroupTable;

    fn entry(sigref: &str, wfcs: &str, edges: &[(&str, &[&str])]) -> WaveformEntry {
        WaveformEntry {
            sigref: sigref.to_string(),
            wfcs: wfcs.to_string(),
            edges: edges
                .iter()
                .map(|(time, events)| WaveformEdge {
                    time: time.to_string(),
                    events: events.iter().map(|e| e.to_string()).collect(),
                })
                .collect(),
        }
    }

    #[test]
    fn single_event_drives_its_letter() {
        let mut wft = WaveformTable::new("w");
        wft.entries.push(entry("a", "01", &[("0ns", &["D", "U"])]));
        wft.build_map(&GroupTable::new());
        assert_eq!(wft.drive("a", '0'), 'D');
        assert_eq!(wft.drive("a", '1'), 'U');
    }

    #[test]
    fn pulse_sequences_become_p_and_n() {
        assert_eq!(derive_driven("DUD", '0'), 'P');
        assert_eq!(derive_driven("UDU", '1'), 'N');
        assert_eq!(derive_driven("DU", '0'), '0');
        assert_eq!(derive_driven("", 'X'), 'X');
    }

    #[test]
    fn unknown_wfcs_pass_through() {
        let mut wft = WaveformTable::new("w");
        wft.entries.push(entry("a", "0", &[("0ns", &["D"])]));
        wft.build_map(&GroupTable::new());
        assert_eq!(wft.drive("a", 'N'), 'N');
        assert_eq!(wft.drive("other", '0'), '0');
    }

    #[test]
    fn group_sigref_expands_to_member_signals() {
        let mut signals = crate::core::symbol_table::SignalTable::new();
        for name in ["b0", "b1"] {
            signals
                .add(crate::core::symbol_table::Signal {
                    name: name.to_string(),
                    direction: crate::core::symbol_table::Direction::In,
                    default_wfc: None,
                })
                .expect("add signal");
        }
        let mut groups = GroupTable::new();
        groups
            .add("bus", vec!["b0".to_string(), "b1".to_string()])
            .expect("add group");
        groups.resolve_all(&signals).expect("resolve");

        let mut wft = WaveformTable::new("w");
        wft.entries.push(entry("bus", "01", &[("0ns", &["D", "U"])]));
        wft.build_map(&groups);
        assert_eq!(wft.drive("b0", '1'), 'U');
        assert_eq!(wft.drive("b1", '0'), 'D');
    }

    #[test]
    fn declaration_limit_is_enforced() {
        let mut wfts = WftTable::with_limit(Some(2));
        wfts.add(WaveformTable::new("w0")).expect("first");
        wfts.add(WaveformTable::new("w1")).expect("second");
        let err = wfts.add(WaveformTable::new("w2")).expect_err("limit");
        assert_eq!(err.kind(), ConvertErrorKind::WftLimit);
    }

    #[test]
    fn ids_follow_first_seen_order() {
        let mut wfts = WftTable::new();
        wfts.add(WaveformTable::new("slow")).expect("add");
        wfts.add(WaveformTable::new("fast")).expect("add");
        assert_eq!(wfts.id("slow"), Some(0));
        assert_eq!(wfts.id("fast"), Some(1));
    }
}
