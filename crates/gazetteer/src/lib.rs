mod builtin;
mod extractor;
mod matching;

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use aura_core::{normalize_text, Location};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;
use walkdir::WalkDir;

pub use extractor::EntityExtractor;
pub use matching::levenshtein;

use matching::{select_non_overlapping, Candidate};

#[derive(Debug, Error)]
pub enum GazetteerError {
    #[error("failed reading gazetteer file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid gazetteer file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed walking gazetteer directory: {0}")]
    Walk(#[from] walkdir::Error),
    #[error("duplicate gazetteer id {0}")]
    DuplicateId(String),
    #[error("gazetteer entry {0} has no usable name or alias")]
    EmptyAliases(String),
    #[error("invalid extractor pattern: {0}")]
    Pattern(#[from] regex::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlaceKind {
    Stop,
    Landmark,
    Zone,
}

impl PlaceKind {
    pub const PLACES: &'static [PlaceKind] = &[PlaceKind::Stop, PlaceKind::Landmark];
    pub const ANY: &'static [PlaceKind] = &[PlaceKind::Stop, PlaceKind::Landmark, PlaceKind::Zone];
    pub const ZONES: &'static [PlaceKind] = &[PlaceKind::Zone];
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GazetteerEntry {
    pub id: String,
    pub name: String,
    pub kind: PlaceKind,
    #[serde(default)]
    pub aliases: Vec<String>,
    pub location: Location,
    /// Owning traffic zone, by zone name.
    #[serde(default)]
    pub zone: Option<String>,
    #[serde(default)]
    pub lines: Vec<String>,
}

#[derive(Debug, Clone)]
struct IndexedAlias {
    entry: usize,
    text: String,
}

#[derive(Debug, Clone, Copy)]
pub struct GazetteerMatch<'a> {
    pub entry: &'a GazetteerEntry,
    /// Byte span within the normalized text.
    pub start: usize,
    pub end: usize,
    pub fuzzy: bool,
}

/// Read-only index of named places. Aliases are normalized once at construction.
#[derive(Debug, Clone)]
pub struct Gazetteer {
    entries: Vec<GazetteerEntry>,
    aliases: Vec<IndexedAlias>,
}

impl Gazetteer {
    pub fn new(entries: Vec<GazetteerEntry>) -> Result<Self, GazetteerError> {
        let mut ids = HashSet::new();
        let mut aliases = Vec::new();

        for (index, entry) in entries.iter().enumerate() {
            if !ids.insert(entry.id.as_str()) {
                return Err(GazetteerError::DuplicateId(entry.id.clone()));
            }

            let mut seen = HashSet::new();
            for raw in std::iter::once(&entry.name).chain(entry.aliases.iter()) {
                let text = normalize_text(raw);
                if !text.is_empty() && seen.insert(text.clone()) {
                    aliases.push(IndexedAlias { entry: index, text });
                }
            }
            if seen.is_empty() {
                return Err(GazetteerError::EmptyAliases(entry.id.clone()));
            }
        }

        Ok(Self { entries, aliases })
    }

    /// Built-in Valencia stops, landmarks and traffic zones.
    pub fn builtin() -> Result<Self, GazetteerError> {
        Self::new(builtin::valencia_entries())
    }

    /// Built-in table extended with every `*.json` entry array under `dir`.
    pub fn with_extensions(dir: impl AsRef<Path>) -> Result<Self, GazetteerError> {
        let mut entries = builtin::valencia_entries();
        let extra = load_entries(dir.as_ref())?;
        info!(
            directory = %dir.as_ref().display(),
            entries = extra.len(),
            "loaded gazetteer extensions"
        );
        entries.extend(extra);
        Self::new(entries)
    }

    pub fn entries(&self) -> &[GazetteerEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&GazetteerEntry> {
        self.entries.iter().find(|entry| entry.id == id)
    }

    pub fn of_kind(&self, kind: PlaceKind) -> impl Iterator<Item = &GazetteerEntry> + '_ {
        self.entries.iter().filter(move |entry| entry.kind == kind)
    }

    /// All non-overlapping alias occurrences in `normalized`, in text order.
    /// The fuzzy pass only runs when no exact alias of the wanted kinds occurs.
    pub fn find(&self, normalized: &str, kinds: &[PlaceKind]) -> Vec<GazetteerMatch<'_>> {
        let wanted = |alias: &IndexedAlias| kinds.contains(&self.entries[alias.entry].kind);

        let mut candidates = Vec::new();
        for (order, alias) in self.aliases.iter().enumerate().filter(|(_, a)| wanted(*a)) {
            for start in matching::occurrences(normalized, &alias.text) {
                candidates.push(Candidate {
                    entry: alias.entry,
                    start,
                    end: start + alias.text.len(),
                    order,
                    fuzzy: false,
                });
            }
        }

        if candidates.is_empty() {
            let tokens = matching::token_spans(normalized);
            for (order, alias) in self.aliases.iter().enumerate().filter(|(_, a)| wanted(*a)) {
                candidates.extend(matching::fuzzy_candidates(&tokens, &alias.text, alias.entry, order));
            }
        }

        select_non_overlapping(candidates)
            .into_iter()
            .map(|candidate| GazetteerMatch {
                entry: &self.entries[candidate.entry],
                start: candidate.start,
                end: candidate.end,
                fuzzy: candidate.fuzzy,
            })
            .collect()
    }

    pub fn best(&self, normalized: &str, kinds: &[PlaceKind]) -> Option<GazetteerMatch<'_>> {
        self.find(normalized, kinds).into_iter().next()
    }

    /// Resolves free text such as "la estación del norte" to an entry.
    pub fn resolve(&self, query: &str, kinds: &[PlaceKind]) -> Option<&GazetteerEntry> {
        self.best(&normalize_text(query), kinds).map(|found| found.entry)
    }
}

fn load_entries(root: &Path) -> Result<Vec<GazetteerEntry>, GazetteerError> {
    let mut paths = Vec::new();
    for entry in WalkDir::new(root) {
        let entry = entry?;
        if entry.file_type().is_file()
            && entry.path().extension().and_then(|ext| ext.to_str()) == Some("json")
        {
            paths.push(entry.into_path());
        }
    }
    paths.sort();

    let mut entries = Vec::new();
    for path in paths {
        let raw = std::fs::read_to_string(&path).map_err(|source| GazetteerError::Io {
            path: path.clone(),
            source,
        })?;
        let parsed = serde_json::from_str::<Vec<GazetteerEntry>>(&raw)
            .map_err(|source| GazetteerError::Parse { path, source })?;
        entries.extend(parsed);
    }
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gazetteer() -> Gazetteer {
        Gazetteer::builtin().expect("builtin gazetteer")
    }

    #[test]
    fn longest_alias_wins_on_overlap() {
        let gazetteer = gazetteer();
        let found = gazetteer
            .best("parada de la plaza del ayuntamiento", PlaceKind::PLACES)
            .expect("match");
        assert_eq!(found.entry.id, "plaza-ayuntamiento");
        assert!(!found.fuzzy);
    }

    #[test]
    fn matches_respect_word_boundaries() {
        let gazetteer = gazetteer();
        assert!(gazetteer.find("colonia de verano", PlaceKind::PLACES).is_empty());
        assert_eq!(
            gazetteer.best("como llego a colon", PlaceKind::PLACES).map(|m| m.entry.id.as_str()),
            Some("colon")
        );
    }

    #[test]
    fn returns_matches_in_text_order() {
        let gazetteer = gazetteer();
        let found = gazetteer.find("desde la catedral hasta el ivam", PlaceKind::PLACES);
        let ids = found.iter().map(|m| m.entry.id.as_str()).collect::<Vec<_>>();
        assert_eq!(ids, vec!["catedral", "ivam"]);
    }

    #[test]
    fn kind_filter_separates_zones_from_places() {
        let gazetteer = gazetteer();
        let zone = gazetteer.best("trafico en malvarrosa", PlaceKind::ZONES).expect("zone");
        assert_eq!(zone.entry.kind, PlaceKind::Zone);
        assert!(gazetteer.best("trafico en malvarrosa", PlaceKind::PLACES).is_none());
    }

    #[test]
    fn fuzzy_pass_tolerates_single_typos() {
        let gazetteer = gazetteer();
        let found = gazetteer.best("trafico en benimaclt", PlaceKind::ZONES).expect("fuzzy");
        assert_eq!(found.entry.id, "benimaclet");
        assert!(found.fuzzy);
        assert!(gazetteer.best("trafico en bnmclt", PlaceKind::ZONES).is_none());
    }

    #[test]
    fn rejects_duplicate_ids() {
        let entry = gazetteer().entries()[0].clone();
        assert!(matches!(
            Gazetteer::new(vec![entry.clone(), entry]),
            Err(GazetteerError::DuplicateId(_))
        ));
    }

    #[test]
    fn loads_json_extensions() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(
            dir.path().join("extra.json"),
            r#"[{"id":"plaza-redonda","name":"Plaza Redonda","kind":"landmark","location":{"lat":39.4729,"lon":-0.3771},"zone":"Ciutat Vella"}]"#,
        )
        .expect("write");

        let gazetteer = Gazetteer::with_extensions(dir.path()).expect("gazetteer");
        assert_eq!(
            gazetteer.resolve("¿Dónde está la Plaza Redonda?", PlaceKind::PLACES).map(|e| e.id.as_str()),
            Some("plaza-redonda")
        );
    }

    #[test]
    fn reports_malformed_extensions() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(dir.path().join("broken.json"), "{not json").expect("write");
        assert!(matches!(
            Gazetteer::with_extensions(dir.path()),
            Err(GazetteerError::Parse { .. })
        ));
    }
}
