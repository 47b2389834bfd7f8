//! Built-in fleet vocabulary.
//!
//! One table serves three consumers: the lane router (does the query mention
//! anything we know?), the pattern extractor (which spans are entities?) and
//! resolution stage 1 (which canonical token does a phrase map to?).

use std::collections::HashMap;
use std::sync::OnceLock;

use regex::Regex;

use crate::entity::{normalize_phrase, EntityKind, TextSpan};

/// One dictionary entry: a set of synonymous phrases mapping to a canonical token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VocabEntry {
    /// Declared entity kind.
    pub kind: EntityKind,
    /// Canonical token (e.g. `MAIN_ENGINE`). Never a storage id.
    pub token: &'static str,
    /// Lowercase synonyms.
    pub phrases: &'static [&'static str],
}

/// A dictionary hit inside a piece of text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VocabMatch {
    /// Matched span in the searched text.
    pub span: TextSpan,
    /// Matched text, as written.
    pub text: String,
    /// Index of the entry in the table.
    pub entry: usize,
}

const ENTRIES: &[VocabEntry] = &[
    // Equipment
    VocabEntry { kind: EntityKind::Equipment, token: "MAIN_ENGINE", phrases: &["main engine", "main engines", "engine", "engines", "propulsion engine"] },
    VocabEntry { kind: EntityKind::Equipment, token: "PORT_MAIN_ENGINE", phrases: &["port engine", "port main engine"] },
    VocabEntry { kind: EntityKind::Equipment, token: "STBD_MAIN_ENGINE", phrases: &["starboard engine", "stbd engine", "starboard main engine"] },
    VocabEntry { kind: EntityKind::Equipment, token: "GENERATOR", phrases: &["generator", "generators", "genset", "gensets", "gen set", "diesel generator"] },
    VocabEntry { kind: EntityKind::Equipment, token: "EMERGENCY_GENERATOR", phrases: &["emergency generator", "emergency genset"] },
    VocabEntry { kind: EntityKind::Equipment, token: "WATERMAKER", phrases: &["watermaker", "water maker", "desalinator"] },
    VocabEntry { kind: EntityKind::Equipment, token: "BOW_THRUSTER", phrases: &["bow thruster", "thruster"] },
    VocabEntry { kind: EntityKind::Equipment, token: "STABILIZER", phrases: &["stabilizer", "stabilizers", "stabiliser", "stabilisers"] },
    VocabEntry { kind: EntityKind::Equipment, token: "HVAC", phrases: &["hvac", "air conditioning", "air con", "aircon", "chiller"] },
    VocabEntry { kind: EntityKind::Equipment, token: "BILGE_PUMP", phrases: &["bilge pump", "bilge pumps"] },
    VocabEntry { kind: EntityKind::Equipment, token: "FIRE_PUMP", phrases: &["fire pump"] },
    VocabEntry { kind: EntityKind::Equipment, token: "FUEL_PUMP", phrases: &["fuel pump", "fuel transfer pump"] },
    VocabEntry { kind: EntityKind::Equipment, token: "STEERING_GEAR", phrases: &["steering gear", "steering"] },
    VocabEntry { kind: EntityKind::Equipment, token: "WINDLASS", phrases: &["windlass", "anchor windlass"] },
    VocabEntry { kind: EntityKind::Equipment, token: "SEWAGE_PLANT", phrases: &["sewage plant", "sewage treatment plant"] },
    VocabEntry { kind: EntityKind::Equipment, token: "TENDER", phrases: &["tender"] },
    // Parts
    VocabEntry { kind: EntityKind::Part, token: "OIL_FILTER", phrases: &["oil filter", "oil filters", "lube oil filter"] },
    VocabEntry { kind: EntityKind::Part, token: "FUEL_FILTER", phrases: &["fuel filter", "fuel filters"] },
    VocabEntry { kind: EntityKind::Part, token: "AIR_FILTER", phrases: &["air filter", "air filters"] },
    VocabEntry { kind: EntityKind::Part, token: "IMPELLER", phrases: &["impeller", "impellers", "raw water impeller"] },
    VocabEntry { kind: EntityKind::Part, token: "DRIVE_BELT", phrases: &["drive belt", "v-belt", "belt", "belts"] },
    VocabEntry { kind: EntityKind::Part, token: "ANODE", phrases: &["zinc anode", "anode", "anodes"] },
    VocabEntry { kind: EntityKind::Part, token: "FUEL_INJECTOR", phrases: &["fuel injector", "injector", "injectors"] },
    VocabEntry { kind: EntityKind::Part, token: "GASKET", phrases: &["gasket", "gaskets"] },
    VocabEntry { kind: EntityKind::Part, token: "RO_MEMBRANE", phrases: &["ro membrane", "membrane", "membranes"] },
    VocabEntry { kind: EntityKind::Part, token: "THERMOSTAT", phrases: &["thermostat"] },
    // Symptoms
    VocabEntry { kind: EntityKind::Symptom, token: "OVERHEATING", phrases: &["overheating", "overheat", "overheats", "high temperature", "running hot"] },
    VocabEntry { kind: EntityKind::Symptom, token: "VIBRATION", phrases: &["vibration", "vibrations", "vibrating", "vibrates"] },
    VocabEntry { kind: EntityKind::Symptom, token: "LEAK", phrases: &["leak", "leaks", "leaking"] },
    VocabEntry { kind: EntityKind::Symptom, token: "ABNORMAL_NOISE", phrases: &["noise", "noisy", "knocking", "rattling"] },
    VocabEntry { kind: EntityKind::Symptom, token: "SMOKE", phrases: &["smoke", "smoking", "black smoke", "white smoke"] },
    VocabEntry { kind: EntityKind::Symptom, token: "LOW_PRESSURE", phrases: &["low pressure", "low oil pressure"] },
    VocabEntry { kind: EntityKind::Symptom, token: "NO_START", phrases: &["won't start", "not starting", "fails to start", "no start"] },
    // People
    VocabEntry { kind: EntityKind::Person, token: "CHIEF_ENGINEER", phrases: &["chief engineer"] },
    VocabEntry { kind: EntityKind::Person, token: "SECOND_ENGINEER", phrases: &["2nd engineer", "second engineer"] },
    VocabEntry { kind: EntityKind::Person, token: "THIRD_ENGINEER", phrases: &["3rd engineer", "third engineer"] },
    VocabEntry { kind: EntityKind::Person, token: "ENGINEER_ON_DUTY", phrases: &["engineer", "duty engineer"] },
    VocabEntry { kind: EntityKind::Person, token: "CAPTAIN", phrases: &["captain", "skipper"] },
    VocabEntry { kind: EntityKind::Person, token: "CHIEF_OFFICER", phrases: &["chief officer", "first officer", "1st officer"] },
    VocabEntry { kind: EntityKind::Person, token: "BOSUN", phrases: &["bosun", "boatswain"] },
    VocabEntry { kind: EntityKind::Person, token: "ETO", phrases: &["eto", "electrician", "electro technical officer"] },
];

/// Compiled view of the built-in dictionary.
#[derive(Debug)]
pub struct Vocabulary {
    entries: &'static [VocabEntry],
    matcher: Regex,
    by_phrase: HashMap<&'static str, usize>,
}

static BUILTIN: OnceLock<Vocabulary> = OnceLock::new();

impl Vocabulary {
    /// The process-wide built-in vocabulary.
    pub fn builtin() -> &'static Self {
        BUILTIN.get_or_init(|| Self::compile(ENTRIES))
    }

    fn compile(entries: &'static [VocabEntry]) -> Self {
        let mut by_phrase = HashMap::new();
        let mut phrases: Vec<&'static str> = Vec::new();
        for (idx, entry) in entries.iter().enumerate() {
            for &phrase in entry.phrases {
                by_phrase.entry(phrase).or_insert(idx);
                phrases.push(phrase);
            }
        }

        // Longest phrase first so alternation prefers "main engine" over "engine".
        phrases.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));
        let alternation = phrases
            .iter()
            .map(|p| regex::escape(p).replace(' ', r"\s+"))
            .collect::<Vec<_>>()
            .join("|");
        let matcher = Regex::new(&format!(r"(?i)\b(?:{alternation})\b"))
            .expect("built-in vocabulary compiles to a valid regex");

        Self {
            entries,
            matcher,
            by_phrase,
        }
    }

    /// Returns the entry at `idx`.
    #[must_use]
    pub fn entry(&self, idx: usize) -> Option<&'static VocabEntry> {
        self.entries.get(idx)
    }

    /// All non-overlapping dictionary hits in `text`, in text order.
    #[must_use]
    pub fn find_all(&self, text: &str) -> Vec<VocabMatch> {
        self.matcher
            .find_iter(text)
            .filter_map(|m| {
                let entry = *self.by_phrase.get(normalize_phrase(m.as_str()).as_str())?;
                Some(VocabMatch {
                    span: TextSpan {
                        start: m.start(),
                        end: m.end(),
                    },
                    text: m.as_str().to_string(),
                    entry,
                })
            })
            .collect()
    }

    /// Returns true if `text` mentions any dictionary phrase.
    #[must_use]
    pub fn mentions_any(&self, text: &str) -> bool {
        self.matcher.is_match(text)
    }

    /// Exact lookup of a phrase (case and whitespace insensitive).
    #[must_use]
    pub fn lookup(&self, phrase: &str) -> Option<&'static VocabEntry> {
        let idx = *self.by_phrase.get(normalize_phrase(phrase).as_str())?;
        self.entries.get(idx)
    }

    /// Best fuzzy (Jaro-Winkler) phrase match of the given kind at or above `min_similarity`.
    ///
    /// Ties keep the earliest entry so the result is deterministic.
    #[must_use]
    pub fn fuzzy_lookup(
        &self,
        phrase: &str,
        kind: EntityKind,
        min_similarity: f64,
    ) -> Option<(&'static VocabEntry, f64)> {
        let needle = normalize_phrase(phrase);
        if needle.is_empty() {
            return None;
        }

        let mut best: Option<(&'static VocabEntry, f64)> = None;
        for entry in self.entries.iter().filter(|e| e.kind == kind) {
            for candidate in entry.phrases {
                let sim = strsim::jaro_winkler(&needle, candidate);
                if sim >= min_similarity && best.map_or(true, |(_, b)| sim > b) {
                    best = Some((entry, sim));
                }
            }
        }
        best
    }
}
