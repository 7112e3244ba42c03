//! # Symbol decoding
//!
//! Decodes a beat group's unicode text into notation symbols: each
//! non-combining character starts a new [`RawSymbol`], and subsequent
//! combining characters attach to it as modifiers (§4.1, §9 "Polymorphism
//! over notation atoms" — `(base, modifier*) -> Note` is a reduction step
//! here, not yet resolved to a `Note`; that happens in `construction.rs`
//! once the font table is consulted for pitch/octave/stroke).

use crate::ast::RawSymbol;
use crate::error::{Diagnostics, GamelanError, TextLocation};
use crate::tables::FontTable;

pub struct SymbolDecoder<'a> {
    font: &'a FontTable,
}

impl<'a> SymbolDecoder<'a> {
    pub fn new(font: &'a FontTable) -> Self {
        Self { font }
    }

    /// Decodes one beat group (the text between two tabs on a stave line)
    /// into its constituent symbols, reporting `UnknownSymbolError` for
    /// any character absent from the font table and resuming at the next
    /// character rather than aborting the scan.
    pub fn decode(
        &self,
        text: &str,
        line: usize,
        column_start: usize,
        diag: &mut Diagnostics,
    ) -> Vec<RawSymbol> {
        let mut symbols = Vec::new();
        let mut chars = text.chars().peekable();
        let mut column = column_start;

        while let Some(c) = chars.next() {
            match self.font.get(c) {
                Some(entry) if entry.is_combining => {
                    diag.push_error(GamelanError::LineParseError {
                        location: TextLocation::new(line, column),
                        message: format!(
                            "combining modifier '{c}' has no preceding base symbol"
                        ),
                    });
                    column += 1;
                }
                Some(_) => {
                    let mut modifiers = Vec::new();
                    let mut end_column = column + 1;
                    while let Some(&next) = chars.peek() {
                        match self.font.get(next) {
                            Some(entry) if entry.is_combining => {
                                modifiers.push(next);
                                end_column += 1;
                                chars.next();
                            }
                            _ => break,
                        }
                    }
                    symbols.push(RawSymbol {
                        base: c,
                        modifiers,
                        location: TextLocation::new(line, column),
                    });
                    column = end_column;
                }
                None => {
                    diag.push_error(GamelanError::UnknownSymbolError {
                        location: TextLocation::new(line, column),
                        symbol: c,
                    });
                    column += 1;
                }
            }
        }

        symbols
    }
}
