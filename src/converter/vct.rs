// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

//! Fixed-column VCT emitter for the 256-channel HTOL tester.

use std::io::Write;

use crate::core::channel_map::{ChannelMap, CHANNEL_COUNT};
use crate::core::error::{ConvertError, ConvertErrorKind};
use crate::core::events::{Event, EventSink};
use crate::core::symbol_table::SymbolTables;

use super::engine::{LoweredVector, PatternSink};
use super::Emitter;

const MICRO_WIDTH: usize = 14;

pub struct VctEmitter<W: Write> {
    out: W,
    /// Channel slots per declared-signal index; empty when unmapped.
    slots: Vec<Vec<u8>>,
}

impl<W: Write> VctEmitter<W> {
    /// Build the emitter and write the file framing up to `START:`.
    /// Signals without a channel assignment are warned about once; their
    /// waveform characters are dropped and the channels stay `.`.
    pub fn new(
        mut out: W,
        tables: &SymbolTables,
        map: &ChannelMap,
        source_name: &str,
        sink: &mut dyn EventSink,
    ) -> Result<Self, ConvertError> {
        let mut slots = Vec::with_capacity(tables.signals.len());
        for signal in tables.signals.iter() {
            match map.channels_of(&signal.name) {
                Some(channels) => slots.push(channels.to_vec()),
                None => {
                    sink.emit(Event::Warning {
                        offset: None,
                        message: format!(
                            "Signal '{}' has no channel assignment; dropping its data",
                            signal.name
                        ),
                    });
                    slots.push(Vec::new());
                }
            }
        }

        let mut emitter = Self { out, slots };
        emitter
            .write_framing(tables, map, source_name)
            .map_err(io_error)?;
        Ok(emitter)
    }

    fn write_framing(
        &mut self,
        tables: &SymbolTables,
        map: &ChannelMap,
        source_name: &str,
    ) -> std::io::Result<()> {
        let date = chrono::Local::now().format("%a %b %d %H:%M:%S %Y");
        writeln!(self.out, ";")?;
        writeln!(
            self.out,
            ";  HTOL vector file created by the patforge translator"
        )?;
        writeln!(self.out, ";  from the source file {source_name}")?;
        writeln!(self.out, ";  translated {date}")?;
        writeln!(self.out, ";")?;
        writeln!(self.out)?;

        self.write_timing_summary(tables)?;
        self.write_drvr_section(map)?;
        writeln!(self.out)?;

        writeln!(self.out, "#VECTOR")?;
        writeln!(self.out, "  ORG 0")?;
        self.write_signal_legend(map)?;
        self.write_channel_ruler()?;
        writeln!(self.out, "VECTOR:")?;
        writeln!(self.out, "START:")?;
        Ok(())
    }

    fn write_timing_summary(&mut self, tables: &SymbolTables) -> std::io::Result<()> {
        if tables.wfts.is_empty() {
            return Ok(());
        }
        writeln!(self.out, ";")?;
        writeln!(self.out, ";       Timing definitions:")?;
        writeln!(self.out, ";")?;
        for (id, wft) in tables.wfts.iter().enumerate() {
            let period = wft.period.as_deref().unwrap_or("?");
            writeln!(
                self.out,
                ";  Timing [{}] RRADR {id} period {period} ({} entries):",
                wft.name,
                wft.entries.len()
            )?;
            for entry in &wft.entries {
                let mut line = format!(";    {}, {}", entry.sigref, entry.wfcs);
                for edge in &entry.edges {
                    line.push_str(&format!(", {}, {}", edge.time, edge.events.join("/")));
                }
                writeln!(self.out, "{line}")?;
            }
        }
        writeln!(self.out, ";")?;
        Ok(())
    }

    fn write_drvr_section(&mut self, map: &ChannelMap) -> std::io::Result<()> {
        writeln!(self.out, ";")?;
        writeln!(
            self.out,
            ";       driver/receiver pin to DUT signal assignments:"
        )?;
        writeln!(self.out, ";")?;
        let owners = map.channel_owners();
        for (channel, owner) in owners.iter().enumerate() {
            let name = owner.unwrap_or("<none>");
            writeln!(self.out, ";   DRVR{:>4}: {name}", channel)?;
        }
        writeln!(self.out, ";   DRVR  CS: '. .'")?;
        writeln!(self.out, ";")?;
        Ok(())
    }

    /// Signal names rendered vertically above their channel columns.
    fn write_signal_legend(&mut self, map: &ChannelMap) -> std::io::Result<()> {
        let owners = map.channel_owners();
        let rows = owners
            .iter()
            .flatten()
            .map(|name| name.len())
            .max()
            .unwrap_or(0);

        let prefix: String = std::iter::once(';').chain(std::iter::repeat(' ').take(50)).collect();
        for row in 0..rows {
            let mut line = prefix.clone();
            for owner in &owners {
                let ch = owner
                    .and_then(|name| name.as_bytes().get(row).copied())
                    .map(|b| b as char)
                    .unwrap_or(' ');
                line.push(ch);
            }
            writeln!(self.out, "{}", line.trim_end())?;
        }
        Ok(())
    }

    fn write_channel_ruler(&mut self) -> std::io::Result<()> {
        let mut hundreds = String::with_capacity(CHANNEL_COUNT);
        let mut tens = String::with_capacity(CHANNEL_COUNT);
        let mut ones = String::with_capacity(CHANNEL_COUNT);
        for i in 0..CHANNEL_COUNT {
            hundreds.push(if i >= 100 {
                char::from(b'0' + (i / 100) as u8)
            } else {
                ' '
            });
            tens.push(if i >= 10 {
                char::from(b'0' + ((i / 10) % 10) as u8)
            } else {
                ' '
            });
            ones.push(char::from(b'0' + (i % 10) as u8));
        }

        writeln!(self.out, ";                 MM GTT  C                S  T")?;
        writeln!(
            self.out,
            ";                 RC TEM  S                Y  0    {hundreds}"
        )?;
        writeln!(
            self.out,
            ";                 SM SNE  A  RESERVED      N  E C  {tens}"
        )?;
        writeln!(
            self.out,
            ";                 TP TAM  L                C  N S  {ones}"
        )?;
        Ok(())
    }
}

impl<W: Write> PatternSink for VctEmitter<W> {
    fn vector(&mut self, vector: &LoweredVector) -> Result<(), ConvertError> {
        for label in &vector.labels {
            writeln!(self.out, "{label}:").map_err(io_error)?;
        }

        let mut channels = ['.'; CHANNEL_COUNT];
        for (i, slots) in self.slots.iter().enumerate() {
            for &slot in slots {
                channels[slot as usize] = vector.driven[i];
            }
        }
        let channel_str: String = channels.iter().collect();

        let micro = vector.micro.format();
        let reserved = ".".repeat(16);
        writeln!(
            self.out,
            "  {micro:<width$}% .. ..0 {reserved} ... {rradr} 1  {channel_str} ; 0x{addr:06X}",
            width = MICRO_WIDTH,
            rradr = vector.wft_id,
            addr = vector.addr,
        )
        .map_err(io_error)
    }
}

impl<W: Write> Emitter for VctEmitter<W> {
    /// Closing marker; written on success and on cancellation, never
    /// after a fatal error.
    fn finish(&mut self) -> Result<(), ConvertError> {
        writeln!(self.out, "#VECTOREND").map_err(io_error)?;
        self.out.flush().map_err(io_error)
    }
}

fn io_error(err: std::io::Error) -> ConvertError {
    ConvertError::new(
        ConvertErrorKind::Io,
        &format!("Error writing VCT output: {err}"),
        None,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::converter::engine::Micro;
    use crate::core::events::CollectSink;

    fn lowered(addr: u32, micro: Micro, driven: Vec<char>) -> LoweredVector {
        LoweredVector {
            addr,
            micro,
            wft_name: Some("w".to_string()),
            wft_id: 0,
            wft_changed: false,
            labels: Vec::new(),
            driven,
        }
    }

    fn emitter_for<'a>(
        src: &str,
        map: &ChannelMap,
        out: &'a mut Vec<u8>,
    ) -> VctEmitter<&'a mut Vec<u8>> {
        let mut sink = CollectSink::new();
        let mut tables = SymbolTables::new();
        let mut parser = crate::core::parser::Parser::new(src.as_bytes(), &[]);
        parser.parse_header(&mut tables, &mut sink).expect("header");
        tables.finalize().expect("finalize");
        VctEmitter::new(out, &tables, map, "unit.stil", &mut sink).expect("emitter")
    }

    #[test]
    fn vector_line_has_256_channels_and_hex_address() {
        let map = ChannelMap::from_csv("Signal,Channel\na,0\n").expect("map");
        let mut out = Vec::new();
        let mut emitter = emitter_for("Signals { a In; }", &map, &mut out);
        emitter
            .vector(&lowered(0, Micro::Mssa, vec!['D']))
            .expect("vector");
        emitter.finish().expect("finish");

        let text = String::from_utf8(out).expect("utf8");
        let line = text
            .lines()
            .find(|line| line.contains("; 0x000000"))
            .expect("vector line");
        assert!(line.starts_with("  MSSA          % .. ..0"));
        let channels = line
            .split("1  ")
            .nth(1)
            .and_then(|rest| rest.split(" ; ").next())
            .expect("channel field");
        assert_eq!(channels.len(), 256);
        assert!(channels.starts_with('D'));
        assert!(channels[1..].chars().all(|c| c == '.'));
        assert!(text.trim_end().ends_with("#VECTOREND"));
    }

    #[test]
    fn framing_contains_vector_markers_and_ruler() {
        let map = ChannelMap::from_csv("Signal,Channel\na,5\n").expect("map");
        let mut out = Vec::new();
        let emitter = emitter_for("Signals { a In; }", &map, &mut out);
        drop(emitter);

        let text = String::from_utf8(out).expect("utf8");
        assert!(text.contains("#VECTOR\n"));
        assert!(text.contains("  ORG 0\n"));
        assert!(text.contains("VECTOR:\nSTART:\n"));
        assert!(text.contains(";   DRVR   5: a"));
        assert!(text.contains(";   DRVR   0: <none>"));
    }

    #[test]
    fn labels_render_as_their_own_lines() {
        let map = ChannelMap::from_csv("Signal,Channel\na,0\n").expect("map");
        let mut out = Vec::new();
        let mut emitter = emitter_for("Signals { a In; }", &map, &mut out);
        let mut vector = lowered(0, Micro::Adv, vec!['U']);
        vector.labels = vec!["top".to_string()];
        emitter.vector(&vector).expect("vector");

        let text = String::from_utf8(out).expect("utf8");
        assert!(text.contains("\ntop:\n"));
    }

    #[test]
    fn unmapped_signal_warns_and_stays_dotted() {
        let map = ChannelMap::new();
        let mut sink = CollectSink::new();
        let mut tables = SymbolTables::new();
        let mut parser = crate::core::parser::Parser::new(b"Signals { a In; }", &[]);
        parser.parse_header(&mut tables, &mut sink).expect("header");
        tables.finalize().expect("finalize");

        let mut out = Vec::new();
        let mut emitter =
            VctEmitter::new(&mut out, &tables, &map, "unit.stil", &mut sink).expect("emitter");
        assert_eq!(sink.warnings().count(), 1);

        emitter
            .vector(&lowered(0, Micro::Adv, vec!['D']))
            .expect("vector");
        let text = String::from_utf8(out).expect("utf8");
        let line = text
            .lines()
            .find(|line| line.contains("; 0x000000"))
            .expect("vector line");
        assert!(!line.contains('D'));
    }
}
