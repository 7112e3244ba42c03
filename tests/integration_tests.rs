//! End-to-end tests driving complete notation text through the compiler.

use std::collections::HashMap;
use std::sync::Once;

use gamelan_notation::ast::{DirectiveValue, Keyword, MetadataDirective};
use gamelan_notation::error::{Diagnostics, GamelanError, TextLocation};
use gamelan_notation::score::{InstrumentGroup, Pitch, PitchOctave, Position, Stroke};
use gamelan_notation::tables::{
    FontEntry, FontSymbolKind, FontTable, InstrumentEntry, InstrumentRange, InstrumentsTable, MidiNoteKey,
    MidiNotesTable, ModifierKind, ReferenceTables, RulesTable, TagPositionsTable, TremoloTables,
};
use gamelan_notation::{binding, completion, construction, execution, parser};
use gamelan_notation::{compile, RunConfig};

static LOGGER: Once = Once::new();

/// Routes the crate's `log` output (parse/validation warnings) to stderr
/// for the duration of the test binary, same as `webern-midi_file`'s
/// `tests/utils.rs::enable_logging`.
fn enable_logging() {
    LOGGER.call_once(|| {
        env_logger::Builder::from_default_env().is_test(true).try_init().ok();
    });
}

fn note_entry(code_point: char, pitch: Pitch) -> (char, FontEntry) {
    (
        code_point,
        FontEntry {
            code_point,
            kind: FontSymbolKind::Note { pitch_octave: PitchOctave::new(pitch, 0), stroke: Stroke::Open },
            duration: gamelan_notation::fraction::ONE,
            rest_after: gamelan_notation::fraction::ZERO,
            is_combining: false,
        },
    )
}

fn rest_entry(code_point: char) -> (char, FontEntry) {
    (
        code_point,
        FontEntry {
            code_point,
            kind: FontSymbolKind::Rest,
            duration: gamelan_notation::fraction::ZERO,
            rest_after: gamelan_notation::fraction::ONE,
            is_combining: false,
        },
    )
}

fn modifier_entry(code_point: char, kind: ModifierKind) -> (char, FontEntry) {
    (
        code_point,
        FontEntry {
            code_point,
            kind: FontSymbolKind::Modifier(kind),
            duration: gamelan_notation::fraction::ZERO,
            rest_after: gamelan_notation::fraction::ZERO,
            is_combining: true,
        },
    )
}

fn base_font() -> FontTable {
    let entries = HashMap::from([
        note_entry('o', Pitch::Dong),
        note_entry('e', Pitch::Deng),
        note_entry('u', Pitch::Dung),
        rest_entry('-'),
        modifier_entry('A', ModifierKind::AcceleratingTremolo),
    ]);
    FontTable { entries }
}

fn gangsa_tables(group: &InstrumentGroup) -> (TagPositionsTable, InstrumentsTable, MidiNotesTable) {
    let position = Position::new("gangsa");
    let mut tag_positions = TagPositionsTable::default();
    tag_positions.entries.insert("gangsa".to_string(), vec![position.clone()]);

    let mut instruments = InstrumentsTable::default();
    instruments.entries.insert(
        (group.clone(), position.clone()),
        InstrumentEntry {
            instrument_type: "gangsa".to_string(),
            range: InstrumentRange {
                nominal: vec![PitchOctave::new(Pitch::Dong, 0), PitchOctave::new(Pitch::Deng, 0), PitchOctave::new(Pitch::Dung, 0)],
                extended: vec![PitchOctave::new(Pitch::Dong, 0), PitchOctave::new(Pitch::Deng, 0), PitchOctave::new(Pitch::Dung, 0)],
            },
        },
    );

    let mut midi_notes = MidiNotesTable::default();
    for (pitch, key) in [(Pitch::Dong, 60), (Pitch::Deng, 62), (Pitch::Dung, 64)] {
        midi_notes.notes.insert(
            MidiNoteKey {
                instrument_group: group.clone(),
                instrument_type: "gangsa".to_string(),
                positions: None,
                pitch_octave: PitchOctave::new(pitch, 0),
                stroke: Stroke::Open,
            },
            key,
        );
    }

    (tag_positions, instruments, midi_notes)
}

#[test]
fn minimal_single_gongan_piece_compiles_to_a_midi_file() {
    enable_logging();
    let group = InstrumentGroup::new("gk");
    let (tag_positions, instruments, midi_notes) = gangsa_tables(&group);
    let tables = ReferenceTables { font: base_font(), tag_positions, instruments, midi_notes, ..Default::default() };
    let config = RunConfig { instrument_group: "gk".to_string(), ..Default::default() };

    let output = compile("gangsa\too-", &tables, &config).expect("minimal piece should compile");
    assert!(output.midi_bytes.starts_with(b"MThd"));
}

#[test]
fn repeat_and_goto_revisit_the_labelled_gongan() {
    enable_logging();
    let group = InstrumentGroup::new("gk");
    let (tag_positions, instruments, midi_notes) = gangsa_tables(&group);
    let tables = ReferenceTables { font: base_font(), tag_positions, instruments, midi_notes, ..Default::default() };
    let config = RunConfig { instrument_group: "gk".to_string(), ..Default::default() };

    let source = "metadata\t{LABEL name=start}\ngangsa\to\n\nmetadata\t{GOTO label=start, from_beat=1, passes=[1]}\ngangsa\te";

    let output = compile(source, &tables, &config).expect("repeat/goto piece should compile");
    assert!(!output.midi_bytes.is_empty());
}

#[test]
fn kempyung_mismatch_autocorrects_and_still_compiles() {
    enable_logging();
    let group = InstrumentGroup::new("gk");
    let polos = Position::new("polos");
    let sangsih = Position::new("sangsih");

    let mut tag_positions = TagPositionsTable::default();
    tag_positions.entries.insert("polos".to_string(), vec![polos.clone()]);
    tag_positions.entries.insert("sangsih".to_string(), vec![sangsih.clone()]);

    let mut instruments = InstrumentsTable::default();
    for position in [&polos, &sangsih] {
        instruments.entries.insert(
            (group.clone(), position.clone()),
            InstrumentEntry {
                instrument_type: "gangsa".to_string(),
                range: InstrumentRange {
                    nominal: vec![PitchOctave::new(Pitch::Dong, 0), PitchOctave::new(Pitch::Deng, 0), PitchOctave::new(Pitch::Dung, 0)],
                    extended: vec![PitchOctave::new(Pitch::Dong, 0), PitchOctave::new(Pitch::Deng, 0), PitchOctave::new(Pitch::Dung, 0)],
                },
            },
        );
    }

    let mut midi_notes = MidiNotesTable::default();
    for (pitch, key) in [(Pitch::Dong, 60), (Pitch::Deng, 62), (Pitch::Dung, 64)] {
        midi_notes.notes.insert(
            MidiNoteKey {
                instrument_group: group.clone(),
                instrument_type: "gangsa".to_string(),
                positions: None,
                pitch_octave: PitchOctave::new(pitch, 0),
                stroke: Stroke::Open,
            },
            key,
        );
    }

    let mut rules = RulesTable::default();
    rules.kempyung_pairs.insert(group.clone(), vec![(polos.clone(), sangsih.clone())]);
    let mut kempyung_map = HashMap::new();
    kempyung_map.insert(PitchOctave::new(Pitch::Dong, 0), PitchOctave::new(Pitch::Dung, 0));
    rules.kempyung.insert(group.clone(), kempyung_map);

    let tables = ReferenceTables { font: base_font(), tag_positions, instruments, midi_notes, rules, ..Default::default() };
    let config = RunConfig { instrument_group: "gk".to_string(), ..Default::default() };

    let source = "polos\to\nsangsih\te";
    let output = compile(source, &tables, &config).expect("kempyung mismatch should autocorrect, not fail");
    assert!(output.warnings.iter().any(|w| w.contains("kempyung")));
}

#[test]
fn accelerating_tremolo_over_two_notes_expands_and_compiles() {
    enable_logging();
    let group = InstrumentGroup::new("gk");
    let (tag_positions, instruments, midi_notes) = gangsa_tables(&group);
    let tremolo = TremoloTables {
        notes_per_quarternote: 0,
        accelerating_pattern: vec![3, 2, 2, 1],
        accelerating_velocity: vec![100, 95, 90, 85],
    };
    let tables = ReferenceTables { font: base_font(), tag_positions, instruments, midi_notes, tremolo, ..Default::default() };
    let config = RunConfig { instrument_group: "gk".to_string(), ..Default::default() };

    let output = compile("gangsa\toAeA", &tables, &config).expect("accelerating tremolo should compile");
    assert!(!output.midi_bytes.is_empty());
}

#[test]
fn octavate_past_the_instrument_range_is_rejected() {
    enable_logging();
    let group = InstrumentGroup::new("gk");
    let (tag_positions, instruments, midi_notes) = gangsa_tables(&group);
    let tables = ReferenceTables { font: base_font(), tag_positions, instruments, midi_notes, ..Default::default() };
    let config = RunConfig { instrument_group: "gk".to_string(), ..Default::default() };

    let source = "metadata\t{OCTAVATE instrument=gangsa, octaves=-5}\ngangsa\to";
    let errors = compile(source, &tables, &config).expect_err("octave shift should leave the instrument's range");
    assert!(errors.iter().any(|e| matches!(e, GamelanError::OctavateOutOfRange { .. })));
}

#[test]
fn tempo_ramp_declared_in_notation_interpolates_through_execution() {
    enable_logging();
    let group = InstrumentGroup::new("gk");
    let (tag_positions, instruments, midi_notes) = gangsa_tables(&group);
    let tables = ReferenceTables { font: base_font(), tag_positions, instruments, midi_notes, ..Default::default() };

    let source = "metadata\t{TEMPO value=60, first_beat=1, beat_count=0}\n\
                  metadata\t{TEMPO value=120, first_beat=1, beat_count=4}\n\
                  gangsa\to\to\to\to";

    let mut diag = Diagnostics::new();
    let raw = parser::parse(source, &tables.font, &mut diag);
    assert!(!diag.has_errors());

    let config = RunConfig { instrument_group: "gk".to_string(), ..Default::default() };
    let mut diag = Diagnostics::new();
    let score = construction::construct(&raw, &tables.font, Default::default(), &config, &mut diag);
    assert!(!diag.has_errors());

    let mut diag = Diagnostics::new();
    let score = binding::bind_positions(score, &tables, &mut diag);
    assert!(!diag.has_errors());

    let mut diag = Diagnostics::new();
    let score = completion::complete(score, &tables, &mut diag);
    assert!(!diag.has_errors());

    let mut diag = Diagnostics::new();
    let exec = execution::linearize(&score, &mut diag);
    assert!(!diag.has_errors());

    let tempos: Vec<u32> = exec.steps.iter().map(|s| s.tempo_bpm).collect();
    assert_eq!(tempos, vec![60, 80, 100, 120]);
}

#[test]
fn unknown_directive_keyword_is_a_malformed_directive() {
    enable_logging();
    let directive_location = TextLocation::new(1, 1);
    let mut diag = Diagnostics::new();
    let directive = parser::directive::parse_directive("FROBNICATE value=1", directive_location, &mut diag);
    assert!(directive.is_none());
    assert!(matches!(diag.errors[0], GamelanError::MalformedDirective { .. }));
}

#[test]
fn directive_helper_rejects_missing_required_params() {
    enable_logging();
    let mut diag = Diagnostics::new();
    let directive = MetadataDirective {
        keyword: Keyword::Goto,
        params: HashMap::from([("label".to_string(), DirectiveValue::Str("x".to_string()))]),
        location: TextLocation::default(),
    };
    assert_eq!(directive.get_str("label"), Some("x"));
    let _ = &mut diag;
}
