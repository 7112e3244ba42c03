//! # Raw syntax tree
//!
//! The output of stage 2 (notation parse, §4.1): a tree of gongans,
//! staves, metadata directives, and comments, still in "generic" form —
//! symbols have been decoded against the font table but not yet bound to
//! instrument positions (that's stage 4, `binding.rs`).

use std::collections::HashMap;

use crate::error::TextLocation;
use crate::score::Pass;

/// A metadata directive keyword, from the catalog in `SPEC_FULL.md` §6.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Keyword {
    Gongan,
    Dynamics,
    Goto,
    Kempli,
    AutoKempyung,
    Label,
    Octavate,
    Part,
    Repeat,
    Sequence,
    Suppress,
    Tempo,
    Validation,
    Wait,
}

impl Keyword {
    pub fn parse(word: &str) -> Option<Self> {
        match word.to_ascii_uppercase().as_str() {
            "GONGAN" => Some(Keyword::Gongan),
            "DYNAMICS" => Some(Keyword::Dynamics),
            "GOTO" => Some(Keyword::Goto),
            "KEMPLI" => Some(Keyword::Kempli),
            "AUTOKEMPYUNG" => Some(Keyword::AutoKempyung),
            "LABEL" => Some(Keyword::Label),
            "OCTAVATE" => Some(Keyword::Octavate),
            "PART" => Some(Keyword::Part),
            "REPEAT" => Some(Keyword::Repeat),
            "SEQUENCE" => Some(Keyword::Sequence),
            "SUPPRESS" => Some(Keyword::Suppress),
            "TEMPO" => Some(Keyword::Tempo),
            "VALIDATION" => Some(Keyword::Validation),
            "WAIT" => Some(Keyword::Wait),
            _ => None,
        }
    }

    /// The name the keyword's first positional argument takes when
    /// written without an explicit `key=`, e.g. `TEMPO 120` instead of
    /// `TEMPO value=120`.
    pub fn default_param_name(&self) -> &'static str {
        match self {
            Keyword::Gongan => "type",
            Keyword::Dynamics => "value",
            Keyword::Goto => "label",
            Keyword::Kempli => "status",
            Keyword::AutoKempyung => "status",
            Keyword::Label => "name",
            Keyword::Octavate => "instrument",
            Keyword::Part => "name",
            Keyword::Repeat => "count",
            Keyword::Sequence => "value",
            Keyword::Suppress => "positions",
            Keyword::Tempo => "value",
            Keyword::Validation => "ignore",
            Keyword::Wait => "seconds",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Keyword::Gongan => "GONGAN",
            Keyword::Dynamics => "DYNAMICS",
            Keyword::Goto => "GOTO",
            Keyword::Kempli => "KEMPLI",
            Keyword::AutoKempyung => "AUTOKEMPYUNG",
            Keyword::Label => "LABEL",
            Keyword::Octavate => "OCTAVATE",
            Keyword::Part => "PART",
            Keyword::Repeat => "REPEAT",
            Keyword::Sequence => "SEQUENCE",
            Keyword::Suppress => "SUPPRESS",
            Keyword::Tempo => "TEMPO",
            Keyword::Validation => "VALIDATION",
            Keyword::Wait => "WAIT",
        }
    }
}

/// A single directive parameter's value. Kept as a small closed set of
/// shapes (string / int / float / bool / list / pass list) rather than a
/// generic `serde_json::Value`, since the directive catalog is fixed and
/// known (§6).
#[derive(Debug, Clone, PartialEq)]
pub enum DirectiveValue {
    Str(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    List(Vec<String>),
    /// An explicit `passes=[1,2]`-style list; an empty list means "all
    /// passes" per §4.6/§6.
    PassList(Vec<u32>),
}

/// A parsed `<KEYWORD> [k=v [, k=v]*]` directive.
#[derive(Debug, Clone, PartialEq)]
pub struct MetadataDirective {
    pub keyword: Keyword,
    pub params: HashMap<String, DirectiveValue>,
    pub location: TextLocation,
}

impl MetadataDirective {
    pub fn get_str(&self, key: &str) -> Option<&str> {
        match self.params.get(key) {
            Some(DirectiveValue::Str(s)) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn get_int(&self, key: &str) -> Option<i64> {
        match self.params.get(key) {
            Some(DirectiveValue::Int(v)) => Some(*v),
            _ => None,
        }
    }

    pub fn get_float(&self, key: &str) -> Option<f64> {
        match self.params.get(key) {
            Some(DirectiveValue::Float(v)) => Some(*v),
            Some(DirectiveValue::Int(v)) => Some(*v as f64),
            _ => None,
        }
    }

    pub fn get_bool(&self, key: &str) -> Option<bool> {
        match self.params.get(key) {
            Some(DirectiveValue::Bool(v)) => Some(*v),
            _ => None,
        }
    }

    pub fn get_list(&self, key: &str) -> Option<&[String]> {
        match self.params.get(key) {
            Some(DirectiveValue::List(v)) => Some(v.as_slice()),
            _ => None,
        }
    }

    pub fn get_passes(&self, key: &str) -> Option<&[u32]> {
        match self.params.get(key) {
            Some(DirectiveValue::PassList(v)) => Some(v.as_slice()),
            _ => None,
        }
    }
}

/// One decoded notation symbol: a base character plus any trailing
/// combining modifier characters, still in raw (un-font-resolved) form —
/// resolution against the font table happens in score construction.
#[derive(Debug, Clone, PartialEq)]
pub struct RawSymbol {
    pub base: char,
    pub modifiers: Vec<char>,
    pub location: TextLocation,
}

/// One stave line: a tag (optionally with a pass specifier), followed by
/// one beat group per tab-separated cell.
#[derive(Debug, Clone, PartialEq)]
pub struct RawStave {
    pub tag: String,
    pub pass: Pass,
    pub beats: Vec<Vec<RawSymbol>>,
    pub location: TextLocation,
}

/// One non-empty line inside (or preceding) a gongan.
#[derive(Debug, Clone, PartialEq)]
pub enum RawLine {
    Metadata(MetadataDirective),
    Comment(String),
    Stave(RawStave),
}

/// A maximal run of non-empty lines (§4.1).
#[derive(Debug, Clone, Default)]
pub struct RawGongan {
    pub lines: Vec<RawLine>,
}

impl RawGongan {
    pub fn staves(&self) -> impl Iterator<Item = &RawStave> {
        self.lines.iter().filter_map(|line| match line {
            RawLine::Stave(stave) => Some(stave),
            _ => None,
        })
    }

    pub fn metadata(&self) -> impl Iterator<Item = &MetadataDirective> {
        self.lines.iter().filter_map(|line| match line {
            RawLine::Metadata(directive) => Some(directive),
            _ => None,
        })
    }
}

/// The full syntactic tree produced by the parser: an optional leading
/// unbound block of metadata/comments, followed by the gongans.
#[derive(Debug, Clone, Default)]
pub struct RawNotation {
    pub unbound: Vec<RawLine>,
    pub gongans: Vec<RawGongan>,
}

impl RawNotation {
    pub fn unbound_metadata(&self) -> impl Iterator<Item = &MetadataDirective> {
        self.unbound.iter().filter_map(|line| match line {
            RawLine::Metadata(directive) => Some(directive),
            _ => None,
        })
    }
}
