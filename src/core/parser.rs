// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

//! Block parser for the STIL grammar subset.
//!
//! Phase 1 walks the top-level blocks (`STIL`, `Header`, `Signals`,
//! `SignalGroups`, `Timing`, `Procedures`, `MacroDefs`) into the symbol
//! tables. Hitting `Pattern` ends the phase; the pattern body is then
//! pulled statement by statement so it is never held in memory whole.

use std::collections::HashSet;

use crate::core::error::{ConvertError, ConvertErrorKind};
use crate::core::events::{Event, EventSink};
use crate::core::symbol_table::{Direction, Signal, SymbolTables};
use crate::core::timing::{WaveformEdge, WaveformEntry, WaveformTable};
use crate::scanner::{Scanner, Token, TokenType};

/// One piece of a vector assignment's WFC data: either literal characters
/// or a `\rN C` repeat to be expanded in place.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WfcPiece {
    Chars(String),
    Repeat { count: u64, wfc: char },
}

/// One `target = wfc-data` assignment inside a `V { … }` statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VecAssign {
    pub target: String,
    pub pieces: Vec<WfcPiece>,
}

/// A pattern statement. Closed set; everything else is warned about and
/// skipped (or refused through the deny-list) before construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Stmt {
    Vector { assigns: Vec<VecAssign>, offset: usize },
    Waveform { name: String },
    Loop { count: u64, body: Vec<Stmt>, offset: usize },
    MatchLoop { count: u64, body: Vec<Stmt>, offset: usize },
    Call { name: String, offset: usize },
    Macro { name: String, offset: usize },
    Stop,
    Goto { label: String },
    IddqTestPoint,
    Return,
    Label { name: String },
}

/// Parser over a STIL source buffer.
pub struct Parser<'a> {
    scanner: Scanner<'a>,
    tok: Token,
    deny: HashSet<String>,
    pattern_name: Option<String>,
    pattern_done: bool,
    block: &'static str,
}

impl<'a> Parser<'a> {
    pub fn new(src: &'a [u8], deny: &[String]) -> Self {
        Self {
            scanner: Scanner::new(src),
            tok: Token {
                kind: TokenType::Eof,
                text: String::new(),
                value: 0,
                offset: 0,
            },
            deny: deny.iter().cloned().collect(),
            pattern_name: None,
            pattern_done: false,
            block: "top level",
        }
    }

    /// Byte offset of the scan cursor, for progress tracking.
    pub fn offset(&self) -> usize {
        self.scanner.offset()
    }

    pub fn source_len(&self) -> usize {
        self.scanner.source_len()
    }

    pub fn pattern_name(&self) -> Option<&str> {
        self.pattern_name.as_deref()
    }

    /// Parse every block before `Pattern` into `tables`. Returns true
    /// when a Pattern block was found and the parser is positioned on its
    /// first statement.
    pub fn parse_header(
        &mut self,
        tables: &mut SymbolTables,
        sink: &mut dyn EventSink,
    ) -> Result<bool, ConvertError> {
        self.bump()?;
        loop {
            match self.tok.kind {
                TokenType::Eof => return Ok(false),
                TokenType::Annotation | TokenType::Semi => {
                    self.bump()?;
                }
                TokenType::Word => {
                    let keyword = self.tok.text.clone();
                    match keyword.as_str() {
                        "STIL" => self.parse_stil_version()?,
                        "Header" => self.skip_named_block("Header")?,
                        "Signals" => self.parse_signals(tables)?,
                        "SignalGroups" => self.parse_signal_groups(tables)?,
                        "Timing" => self.parse_timing(tables, sink)?,
                        "Procedures" => self.parse_procedure_block(tables, sink, false)?,
                        "MacroDefs" => self.parse_procedure_block(tables, sink, true)?,
                        "Pattern" => {
                            self.bump()?;
                            if self.tok.kind == TokenType::Word || self.tok.kind == TokenType::Str {
                                self.pattern_name = Some(self.tok.text.clone());
                                self.bump()?;
                            }
                            self.expect(TokenType::LBrace, "{ after Pattern")?;
                            self.block = "Pattern";
                            return Ok(true);
                        }
                        _ => {
                            sink.emit(Event::Warning {
                                offset: Some(self.tok.offset),
                                message: format!("Skipping unrecognized block: {keyword}"),
                            });
                            self.skip_named_block("unrecognized block")?;
                        }
                    }
                }
                _ => {
                    return Err(self.err_here(
                        ConvertErrorKind::Parse,
                        "Expected a top-level block keyword",
                        Some(&self.tok.text.clone()),
                    ));
                }
            }
        }
    }

    /// Pull the next statement of the Pattern body. None once the
    /// pattern's closing brace is consumed.
    pub fn next_pattern_stmt(
        &mut self,
        sink: &mut dyn EventSink,
    ) -> Result<Option<Stmt>, ConvertError> {
        if self.pattern_done {
            return Ok(None);
        }
        match self.parse_stmt(sink)? {
            Some(stmt) => Ok(Some(stmt)),
            None => {
                self.pattern_done = true;
                Ok(None)
            }
        }
    }

    // ---- top-level blocks ------------------------------------------------

    fn parse_stil_version(&mut self) -> Result<(), ConvertError> {
        self.block = "STIL";
        self.bump()?;
        while self.tok.kind != TokenType::Semi {
            if self.tok.kind == TokenType::Eof {
                return Err(self.err_here(
                    ConvertErrorKind::Parse,
                    "Unterminated STIL version statement",
                    None,
                ));
            }
            self.bump()?;
        }
        self.bump()?;
        self.block = "top level";
        Ok(())
    }

    fn parse_signals(&mut self, tables: &mut SymbolTables) -> Result<(), ConvertError> {
        self.block = "Signals";
        self.bump()?;
        self.expect(TokenType::LBrace, "{ after Signals")?;

        while self.tok.kind != TokenType::RBrace {
            let name = self.expect_name("signal name")?;
            let dir_text = self.expect_name("signal direction")?;
            let direction = Direction::parse(&dir_text).ok_or_else(|| {
                self.err_at(
                    ConvertErrorKind::Parse,
                    "Unknown signal direction",
                    Some(&dir_text),
                    self.tok.offset,
                )
            })?;

            let mut default_wfc = None;
            if self.tok.kind == TokenType::LBrace {
                default_wfc = self.parse_signal_attributes()?;
            }
            if self.tok.kind == TokenType::Semi {
                self.bump()?;
            }

            tables
                .signals
                .add(Signal {
                    name,
                    direction,
                    default_wfc,
                })
                .map_err(|err| err.with_block(self.block))?;
        }
        self.bump()?;
        self.block = "top level";
        Ok(())
    }

    /// Braced signal attributes; only `Default <wfc>;` is extracted, the
    /// rest is skipped.
    fn parse_signal_attributes(&mut self) -> Result<Option<char>, ConvertError> {
        self.expect(TokenType::LBrace, "{")?;
        let mut default_wfc = None;
        while self.tok.kind != TokenType::RBrace {
            if self.tok.kind == TokenType::Eof {
                return Err(self.err_here(
                    ConvertErrorKind::Parse,
                    "Unterminated signal attribute block",
                    None,
                ));
            }
            if self.tok.kind == TokenType::Word && self.tok.text == "Default" {
                self.bump()?;
                let text = self.tok.text.clone();
                let mut chars = text.chars();
                match (chars.next(), chars.next()) {
                    (Some(wfc), None) => default_wfc = Some(wfc),
                    _ => {
                        return Err(self.err_here(
                            ConvertErrorKind::Parse,
                            "Default must name a single waveform character",
                            Some(&text),
                        ))
                    }
                }
                self.bump()?;
            }
            self.skip_past_semi_or_block()?;
        }
        self.bump()?;
        Ok(default_wfc)
    }

    fn parse_signal_groups(&mut self, tables: &mut SymbolTables) -> Result<(), ConvertError> {
        self.block = "SignalGroups";
        self.bump()?;
        if self.tok.kind == TokenType::Word || self.tok.kind == TokenType::Str {
            // Optional group-domain name; the subset keeps a single domain.
            self.bump()?;
        }
        self.expect(TokenType::LBrace, "{ after SignalGroups")?;

        while self.tok.kind != TokenType::RBrace {
            let name = self.expect_name("group name")?;
            self.expect(TokenType::Equals, "= in group definition")?;
            let members = self.parse_sigref_expr()?;
            if self.tok.kind == TokenType::LBrace {
                self.skip_balanced_braces()?;
            }
            if self.tok.kind == TokenType::Semi {
                self.bump()?;
            }
            tables
                .groups
                .add(&name, members)
                .map_err(|err| err.with_block(self.block))?;
        }
        self.bump()?;
        self.block = "top level";
        Ok(())
    }

    /// A sigref expression: either a quoted `'a + b + grp'` string or a
    /// bare name.
    fn parse_sigref_expr(&mut self) -> Result<Vec<String>, ConvertError> {
        match self.tok.kind {
            TokenType::Str => {
                let raw = self.tok.text.clone();
                self.bump()?;
                let members: Vec<String> = raw
                    .split('+')
                    .map(|part| part.trim().trim_matches('"').to_string())
                    .filter(|part| !part.is_empty())
                    .collect();
                if members.is_empty() {
                    return Err(self.err_here(
                        ConvertErrorKind::Parse,
                        "Empty signal reference expression",
                        Some(&raw),
                    ));
                }
                Ok(members)
            }
            TokenType::Word => {
                let name = self.tok.text.clone();
                self.bump()?;
                Ok(vec![name])
            }
            _ => Err(self.err_here(
                ConvertErrorKind::Parse,
                "Expected a signal reference expression",
                Some(&self.tok.text.clone()),
            )),
        }
    }

    fn parse_timing(
        &mut self,
        tables: &mut SymbolTables,
        sink: &mut dyn EventSink,
    ) -> Result<(), ConvertError> {
        self.block = "Timing";
        self.bump()?;
        if self.tok.kind == TokenType::Word || self.tok.kind == TokenType::Str {
            self.bump()?;
        }
        self.expect(TokenType::LBrace, "{ after Timing")?;

        while self.tok.kind != TokenType::RBrace {
            if self.tok.kind == TokenType::Word && self.tok.text == "WaveformTable" {
                let table = self.parse_waveform_table()?;
                tables
                    .wfts
                    .add(table)
                    .map_err(|err| err.with_block(self.block))?;
            } else if self.tok.kind == TokenType::Eof {
                return Err(self.err_here(
                    ConvertErrorKind::Parse,
                    "Unterminated Timing block",
                    None,
                ));
            } else {
                sink.emit(Event::Warning {
                    offset: Some(self.tok.offset),
                    message: format!("Skipping unrecognized Timing entry: {}", self.tok.text),
                });
                self.skip_past_semi_or_block()?;
            }
        }
        self.bump()?;
        self.block = "top level";
        Ok(())
    }

    fn parse_waveform_table(&mut self) -> Result<WaveformTable, ConvertError> {
        self.bump()?;
        let name = self.expect_name("waveform table name")?;
        let mut table = WaveformTable::new(&name);
        self.expect(TokenType::LBrace, "{ after WaveformTable")?;

        while self.tok.kind != TokenType::RBrace {
            match self.tok.kind {
                TokenType::Word if self.tok.text == "Period" => {
                    self.bump()?;
                    if self.tok.kind == TokenType::Str || self.tok.kind == TokenType::Word {
                        table.period = Some(self.tok.text.clone());
                        self.bump()?;
                    }
                    if self.tok.kind == TokenType::Semi {
                        self.bump()?;
                    }
                }
                TokenType::Word if self.tok.text == "Waveforms" => {
                    self.bump()?;
                    self.expect(TokenType::LBrace, "{ after Waveforms")?;
                    while self.tok.kind != TokenType::RBrace {
                        self.parse_waveforms_entry(&mut table)?;
                    }
                    self.bump()?;
                }
                TokenType::Eof => {
                    return Err(self.err_here(
                        ConvertErrorKind::Parse,
                        "Unterminated WaveformTable block",
                        None,
                    ));
                }
                _ => self.skip_past_semi_or_block()?,
            }
        }
        self.bump()?;
        Ok(table)
    }

    /// One `sigref { wfcs { 'time' event/…; … } … }` group.
    fn parse_waveforms_entry(&mut self, table: &mut WaveformTable) -> Result<(), ConvertError> {
        let sigref = self.expect_name("waveform signal reference")?;
        self.expect(TokenType::LBrace, "{ after waveform signal")?;

        while self.tok.kind != TokenType::RBrace {
            let wfcs = match self.tok.kind {
                TokenType::Word | TokenType::Number => {
                    let text = self.tok.text.clone();
                    self.bump()?;
                    text
                }
                _ => {
                    return Err(self.err_here(
                        ConvertErrorKind::Parse,
                        "Expected a WFC list in Waveforms",
                        Some(&self.tok.text.clone()),
                    ));
                }
            };
            self.expect(TokenType::LBrace, "{ after WFC list")?;

            let mut edges = Vec::new();
            while self.tok.kind != TokenType::RBrace {
                let time = match self.tok.kind {
                    TokenType::Str => {
                        let time = self.tok.text.clone();
                        self.bump()?;
                        time
                    }
                    _ => {
                        return Err(self.err_here(
                            ConvertErrorKind::Parse,
                            "Expected a quoted time expression",
                            Some(&self.tok.text.clone()),
                        ));
                    }
                };
                let mut events = Vec::new();
                loop {
                    match self.tok.kind {
                        TokenType::Word | TokenType::Number => {
                            events.push(self.tok.text.clone());
                            self.bump()?;
                        }
                        _ => {
                            return Err(self.err_here(
                                ConvertErrorKind::Parse,
                                "Expected a waveform event",
                                Some(&self.tok.text.clone()),
                            ));
                        }
                    }
                    if self.tok.kind == TokenType::Slash {
                        self.bump()?;
                        continue;
                    }
                    break;
                }
                self.expect(TokenType::Semi, "; after waveform event")?;
                edges.push(WaveformEdge { time, events });
            }
            self.bump()?;

            table.entries.push(WaveformEntry {
                sigref: sigref.clone(),
                wfcs,
                edges,
            });
        }
        self.bump()?;
        Ok(())
    }

    fn parse_procedure_block(
        &mut self,
        tables: &mut SymbolTables,
        sink: &mut dyn EventSink,
        macros: bool,
    ) -> Result<(), ConvertError> {
        self.block = if macros { "MacroDefs" } else { "Procedures" };
        self.bump()?;
        if self.tok.kind == TokenType::Word || self.tok.kind == TokenType::Str {
            self.bump()?;
        }
        self.expect(TokenType::LBrace, "{ after Procedures")?;

        while self.tok.kind != TokenType::RBrace {
            let name = self.expect_name("procedure name")?;
            self.expect(TokenType::LBrace, "{ after procedure name")?;
            let body = self.parse_stmt_list(sink)?;
            let table = if macros {
                &mut tables.macros
            } else {
                &mut tables.procedures
            };
            table
                .add(&name, body)
                .map_err(|err| err.with_block(self.block))?;
        }
        self.bump()?;
        self.block = "top level";
        Ok(())
    }

    // ---- pattern statements ---------------------------------------------

    /// Parse statements until the enclosing `}` is consumed.
    fn parse_stmt_list(&mut self, sink: &mut dyn EventSink) -> Result<Vec<Stmt>, ConvertError> {
        let mut body = Vec::new();
        while let Some(stmt) = self.parse_stmt(sink)? {
            body.push(stmt);
        }
        Ok(body)
    }

    /// Parse one statement; None when the enclosing `}` is consumed.
    fn parse_stmt(&mut self, sink: &mut dyn EventSink) -> Result<Option<Stmt>, ConvertError> {
        loop {
            match self.tok.kind {
                TokenType::RBrace => {
                    self.bump()?;
                    return Ok(None);
                }
                TokenType::Eof => {
                    return Err(self.err_here(
                        ConvertErrorKind::Parse,
                        "Unterminated block: missing }",
                        None,
                    ));
                }
                TokenType::Annotation | TokenType::Semi => {
                    self.bump()?;
                }
                TokenType::Word | TokenType::Str => {
                    let offset = self.tok.offset;
                    let word = self.tok.text.clone();

                    if self.deny.contains(&word) {
                        sink.emit(Event::Warning {
                            offset: Some(offset),
                            message: format!("Skipping deny-listed construct: {word}"),
                        });
                        self.bump()?;
                        self.skip_statement()?;
                        continue;
                    }

                    match word.as_str() {
                        "V" | "Vector" => return self.parse_vector(offset).map(Some),
                        "W" | "WaveformTable" => {
                            self.bump()?;
                            let name = self.expect_name("waveform table name")?;
                            self.expect(TokenType::Semi, "; after W")?;
                            return Ok(Some(Stmt::Waveform { name }));
                        }
                        "Loop" => return self.parse_loop(offset, false, sink).map(Some),
                        "MatchLoop" => return self.parse_loop(offset, true, sink).map(Some),
                        "Call" => {
                            self.bump()?;
                            let name = self.expect_name("procedure name")?;
                            if self.tok.kind == TokenType::LBrace {
                                return Err(self.err_at(
                                    ConvertErrorKind::Unsupported,
                                    "Call with an argument block is not supported",
                                    Some(&name),
                                    offset,
                                ));
                            }
                            self.expect(TokenType::Semi, "; after Call")?;
                            return Ok(Some(Stmt::Call { name, offset }));
                        }
                        "Macro" => {
                            self.bump()?;
                            let name = self.expect_name("macro name")?;
                            if self.tok.kind == TokenType::LBrace {
                                return Err(self.err_at(
                                    ConvertErrorKind::Unsupported,
                                    "Macro with an argument block is not supported",
                                    Some(&name),
                                    offset,
                                ));
                            }
                            self.expect(TokenType::Semi, "; after Macro")?;
                            return Ok(Some(Stmt::Macro { name, offset }));
                        }
                        "Stop" => {
                            self.bump()?;
                            self.expect(TokenType::Semi, "; after Stop")?;
                            return Ok(Some(Stmt::Stop));
                        }
                        "Goto" => {
                            self.bump()?;
                            let label = self.expect_name("goto label")?;
                            self.expect(TokenType::Semi, "; after Goto")?;
                            return Ok(Some(Stmt::Goto { label }));
                        }
                        "IddqTestPoint" | "IDDQTestPoint" => {
                            self.bump()?;
                            self.expect(TokenType::Semi, "; after IddqTestPoint")?;
                            return Ok(Some(Stmt::IddqTestPoint));
                        }
                        "Return" => {
                            self.bump()?;
                            self.expect(TokenType::Semi, "; after Return")?;
                            return Ok(Some(Stmt::Return));
                        }
                        "Ann" => {
                            self.bump()?;
                            if self.tok.kind == TokenType::Annotation {
                                self.bump()?;
                            }
                        }
                        _ => {
                            self.bump()?;
                            if self.tok.kind == TokenType::Colon {
                                self.bump()?;
                                return Ok(Some(Stmt::Label { name: word }));
                            }
                            sink.emit(Event::Warning {
                                offset: Some(offset),
                                message: format!("Skipping unrecognized statement: {word}"),
                            });
                            self.skip_statement()?;
                        }
                    }
                }
                _ => {
                    return Err(self.err_here(
                        ConvertErrorKind::Parse,
                        "Unexpected token in pattern body",
                        Some(&self.tok.text.clone()),
                    ));
                }
            }
        }
    }

    fn parse_vector(&mut self, offset: usize) -> Result<Stmt, ConvertError> {
        self.bump()?;
        self.expect(TokenType::LBrace, "{ after V")?;

        let mut assigns = Vec::new();
        while self.tok.kind != TokenType::RBrace {
            let target = self.expect_name("vector assignment target")?;
            self.expect(TokenType::Equals, "= in vector assignment")?;

            let mut pieces = Vec::new();
            loop {
                match self.tok.kind {
                    TokenType::Word | TokenType::Number => {
                        pieces.push(WfcPiece::Chars(self.tok.text.clone()));
                        self.bump()?;
                    }
                    TokenType::Str => {
                        // Quoted WFC data appears in machine-written files.
                        pieces.push(WfcPiece::Chars(self.tok.text.clone()));
                        self.bump()?;
                    }
                    TokenType::Repeat => {
                        let count = self.tok.value;
                        let wfc = self.tok.text.chars().next().unwrap_or('X');
                        pieces.push(WfcPiece::Repeat { count, wfc });
                        self.bump()?;
                    }
                    TokenType::Semi => break,
                    _ => {
                        return Err(self.err_here(
                            ConvertErrorKind::Parse,
                            "Unexpected token in vector data",
                            Some(&self.tok.text.clone()),
                        ));
                    }
                }
            }
            self.bump()?;
            if pieces.is_empty() {
                return Err(self.err_at(
                    ConvertErrorKind::Parse,
                    "Vector assignment has no waveform characters",
                    Some(&target),
                    offset,
                ));
            }
            assigns.push(VecAssign { target, pieces });
        }
        self.bump()?;
        if self.tok.kind == TokenType::Semi {
            self.bump()?;
        }
        Ok(Stmt::Vector { assigns, offset })
    }

    fn parse_loop(
        &mut self,
        offset: usize,
        matched: bool,
        sink: &mut dyn EventSink,
    ) -> Result<Stmt, ConvertError> {
        self.bump()?;
        let count = match self.tok.kind {
            TokenType::Number => {
                let count = self.tok.value;
                self.bump()?;
                count
            }
            _ => {
                return Err(self.err_here(
                    ConvertErrorKind::Parse,
                    "Loop count must be an integer",
                    Some(&self.tok.text.clone()),
                ));
            }
        };
        self.expect(TokenType::LBrace, "{ after loop count")?;
        let body = self.parse_stmt_list(sink)?;
        if matched {
            Ok(Stmt::MatchLoop {
                count,
                body,
                offset,
            })
        } else {
            Ok(Stmt::Loop {
                count,
                body,
                offset,
            })
        }
    }

    // ---- low-level helpers ----------------------------------------------

    fn bump(&mut self) -> Result<(), ConvertError> {
        let kind = self.scanner.next_token();
        if kind == TokenType::Error {
            return Err(ConvertError::new(
                ConvertErrorKind::Lex,
                self.scanner.get_error_msg(),
                None,
            )
            .with_offset(self.scanner.token().offset)
            .with_block(self.block));
        }
        self.tok = self.scanner.token().clone();
        Ok(())
    }

    fn expect(&mut self, kind: TokenType, what: &str) -> Result<(), ConvertError> {
        if self.tok.kind != kind {
            return Err(self.err_here(
                ConvertErrorKind::Parse,
                &format!("Expected {what}"),
                Some(&self.tok.text.clone()),
            ));
        }
        self.bump()
    }

    fn expect_name(&mut self, what: &str) -> Result<String, ConvertError> {
        match self.tok.kind {
            TokenType::Word | TokenType::Str | TokenType::Number => {
                let name = self.tok.text.clone();
                self.bump()?;
                Ok(name)
            }
            _ => Err(self.err_here(
                ConvertErrorKind::Parse,
                &format!("Expected {what}"),
                Some(&self.tok.text.clone()),
            )),
        }
    }

    /// Skip a named top-level block: optional name tokens, then either a
    /// balanced brace group or a terminating semicolon.
    fn skip_named_block(&mut self, _what: &str) -> Result<(), ConvertError> {
        self.bump()?;
        loop {
            match self.tok.kind {
                TokenType::LBrace => {
                    self.skip_balanced_braces()?;
                    return Ok(());
                }
                TokenType::Semi => {
                    self.bump()?;
                    return Ok(());
                }
                TokenType::Eof => {
                    return Err(self.err_here(
                        ConvertErrorKind::Parse,
                        "Unterminated block",
                        None,
                    ));
                }
                _ => self.bump()?,
            }
        }
    }

    /// Consume a `{ … }` group with balanced nesting. The current token
    /// must be the opening brace.
    fn skip_balanced_braces(&mut self) -> Result<(), ConvertError> {
        let open_offset = self.tok.offset;
        let mut depth = 0usize;
        loop {
            match self.tok.kind {
                TokenType::LBrace => depth += 1,
                TokenType::RBrace => {
                    depth -= 1;
                    if depth == 0 {
                        self.bump()?;
                        return Ok(());
                    }
                }
                TokenType::Eof => {
                    return Err(self.err_at(
                        ConvertErrorKind::Parse,
                        "Unbalanced braces: missing }",
                        None,
                        open_offset,
                    ));
                }
                _ => {}
            }
            self.bump()?;
        }
    }

    /// Skip the remainder of one statement: to its semicolon, through a
    /// balanced brace group, or up to (not including) an enclosing `}`.
    fn skip_statement(&mut self) -> Result<(), ConvertError> {
        loop {
            match self.tok.kind {
                TokenType::Semi => {
                    self.bump()?;
                    return Ok(());
                }
                TokenType::LBrace => {
                    self.skip_balanced_braces()?;
                    if self.tok.kind == TokenType::Semi {
                        self.bump()?;
                    }
                    return Ok(());
                }
                TokenType::RBrace | TokenType::Eof => return Ok(()),
                _ => self.bump()?,
            }
        }
    }

    /// Skip one entry inside a block, treating either form like
    /// `skip_statement` but starting at the entry keyword.
    fn skip_past_semi_or_block(&mut self) -> Result<(), ConvertError> {
        self.bump()?;
        self.skip_statement()
    }

    fn err_here(&self, kind: ConvertErrorKind, msg: &str, param: Option<&str>) -> ConvertError {
        self.err_at(kind, msg, param, self.tok.offset)
    }

    fn err_at(
        &self,
        kind: ConvertErrorKind,
        msg: &str,
        param: Option<&str>,
        offset: usize,
    ) -> ConvertError {
        ConvertError::new(kind, msg, param)
            .with_offset(offset)
            .with_block(self.block)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::events::CollectSink;

    fn parse_all(src: &str) -> (SymbolTables, Vec<Stmt>, CollectSink) {
        let mut sink = CollectSink::new();
        let mut tables = SymbolTables::new();
        let mut parser = Parser::new(src.as_bytes(), &[]);
        let found = parser
            .parse_header(&mut tables, &mut sink)
            .expect("header parse");
        let mut stmts = Vec::new();
        if found {
            while let Some(stmt) = parser.next_pattern_stmt(&mut sink).expect("stmt") {
                stmts.push(stmt);
            }
        }
        (tables, stmts, sink)
    }

    #[test]
    fn signals_and_groups_fill_tables() {
        let src = "STIL 1.0;\nSignals { clk In; dout Out; b0 In; b1 In; }\n\
                   SignalGroups { bus = 'b0 + b1'; }\n";
        let (tables, _, _) = parse_all(src);
        assert_eq!(tables.signals.len(), 4);
        assert_eq!(
            tables.signals.get("dout").map(|s| s.direction),
            Some(Direction::Out)
        );
        assert_eq!(
            tables.groups.members("bus"),
            Some(&["b0".to_string(), "b1".to_string()][..])
        );
    }

    #[test]
    fn timing_block_builds_waveform_entries() {
        let src = "Signals { a In; }\nTiming {\n  WaveformTable w1 {\n    Period '100ns';\n    \
                   Waveforms { a { 01 { '0ns' D/U; } } }\n  }\n}\n";
        let (tables, _, _) = parse_all(src);
        let wft = tables.wfts.get("w1").expect("table");
        assert_eq!(wft.period.as_deref(), Some("100ns"));
        assert_eq!(wft.entries.len(), 1);
        assert_eq!(wft.entries[0].wfcs, "01");
        assert_eq!(wft.entries[0].edges[0].events, vec!["D", "U"]);
    }

    #[test]
    fn pattern_statements_stream_in_order() {
        let src = "Signals { a In; }\nPattern p {\n  W w1;\n  V { a = 0; }\n  Stop;\n}\n";
        let (_, stmts, _) = parse_all(src);
        assert_eq!(stmts.len(), 3);
        assert!(matches!(&stmts[0], Stmt::Waveform { name } if name == "w1"));
        assert!(matches!(&stmts[2], Stmt::Stop));
    }

    #[test]
    fn repeats_survive_parsing() {
        let src = "Pattern p { V { bus = \\r4 0; } }";
        let (_, stmts, _) = parse_all(src);
        match &stmts[0] {
            Stmt::Vector { assigns, .. } => {
                assert_eq!(
                    assigns[0].pieces,
                    vec![WfcPiece::Repeat { count: 4, wfc: '0' }]
                );
            }
            other => panic!("expected vector, got {other:?}"),
        }
    }

    #[test]
    fn loops_nest() {
        let src = "Pattern p { Loop 2 { Loop 3 { V { a = 0; } V { a = 1; } } } }";
        let (_, stmts, _) = parse_all(src);
        match &stmts[0] {
            Stmt::Loop { count, body, .. } => {
                assert_eq!(*count, 2);
                assert!(matches!(&body[0], Stmt::Loop { count: 3, .. }));
            }
            other => panic!("expected loop, got {other:?}"),
        }
    }

    #[test]
    fn unknown_blocks_warn_and_skip() {
        let src = "UserKeywords Frob;\nSpecialBlock { nested { stuff; } }\nSignals { a In; }\n";
        let (tables, _, sink) = parse_all(src);
        assert_eq!(tables.signals.len(), 1);
        assert_eq!(sink.warnings().count(), 2);
    }

    #[test]
    fn deny_listed_statement_is_skipped_with_warning() {
        let mut sink = CollectSink::new();
        let mut tables = SymbolTables::new();
        let src = "Pattern p { ScanChain chain1; V { a = 0; } }";
        let mut parser = Parser::new(src.as_bytes(), &["ScanChain".to_string()]);
        parser
            .parse_header(&mut tables, &mut sink)
            .expect("header parse");
        let stmt = parser.next_pattern_stmt(&mut sink).expect("stmt");
        assert!(matches!(stmt, Some(Stmt::Vector { .. })));
        assert_eq!(sink.warnings().count(), 1);
    }

    #[test]
    fn labels_attach_to_statements() {
        let src = "Pattern p { start: V { a = 0; } }";
        let (_, stmts, _) = parse_all(src);
        assert!(matches!(&stmts[0], Stmt::Label { name } if name == "start"));
        assert!(matches!(&stmts[1], Stmt::Vector { .. }));
    }

    #[test]
    fn unbalanced_brace_is_a_parse_error() {
        let mut sink = CollectSink::new();
        let mut tables = SymbolTables::new();
        let src = "Signals { a In; ";
        let mut parser = Parser::new(src.as_bytes(), &[]);
        let err = parser
            .parse_header(&mut tables, &mut sink)
            .expect_err("unterminated");
        assert_eq!(err.kind(), ConvertErrorKind::Parse);
    }

    #[test]
    fn procedures_preparse_into_tables() {
        let src = "Procedures { warmup { W w1; V { a = 0; } } }\nPattern p { Call warmup; }";
        let (tables, stmts, _) = parse_all(src);
        let body = tables.procedures.get("warmup").expect("procedure");
        assert_eq!(body.len(), 2);
        assert!(matches!(&stmts[0], Stmt::Call { name, .. } if name == "warmup"));
    }
}
