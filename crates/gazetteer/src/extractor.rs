use std::sync::Arc;

use aura_core::{
    normalize_text, EntityKind, EntitySet, EntityValue, Intent, Location, TransportMode,
    MAX_STOP_RADIUS_M, MIN_STOP_RADIUS_M,
};
use regex::Regex;

use crate::{Gazetteer, GazetteerEntry, GazetteerError, GazetteerMatch, PlaceKind};

const ARTICLES: &[&str] = &["el", "la", "los", "las", "l"];
const DESTINATION_MARKERS: &[&str] = &["a", "al", "hasta", "hacia", "para"];
const FREE_TEXT_STOPWORDS: &[&str] = &[
    "en", "desde", "por", "para", "con", "andando", "caminando", "ahora", "hoy", "mismo", "si",
];
const MAX_FREE_TEXT_TOKENS: usize = 6;

const MODE_SYNONYMS: &[(TransportMode, &[&str])] = &[
    (TransportMode::Bike, &["bici", "bicicleta", "valenbisi", "ciclista", "en bici"]),
    (
        TransportMode::Car,
        &["coche", "carro", "automovil", "vehiculo", "conducir", "conduciendo"],
    ),
    (TransportMode::Bus, &["bus", "autobus", "metro", "tranvia", "emt"]),
    (TransportMode::Foot, &["andando", "caminando", "a pie", "peatonal", "pie"]),
];

/// Pulls the entities an intent declares out of recognized text using the gazetteer
/// and a handful of Spanish phrase patterns.
#[derive(Debug, Clone)]
pub struct EntityExtractor {
    gazetteer: Arc<Gazetteer>,
    radius: Regex,
    accessibility_subject: Regex,
    accessibility_leading: Regex,
    geocode_subject: Regex,
    zone_subject: Regex,
}

impl EntityExtractor {
    pub fn new(gazetteer: Arc<Gazetteer>) -> Result<Self, GazetteerError> {
        Ok(Self {
            gazetteer,
            radius: Regex::new(r"\b(\d{1,5})\s*(m|metro|metros)\b")?,
            accessibility_subject: Regex::new(
                r"\b(?:accesibilidad|acceso|accesible|adaptado|adaptada)\s+(?:de|del|en|al|a|el|la|los|las)\s+(.+)$",
            )?,
            accessibility_leading: Regex::new(r"^(?:es|esta)?\s*(.+?)\s+(?:es|esta)\s+(?:accesible|adaptad[oa])\b")?,
            geocode_subject: Regex::new(
                r"\b(?:donde esta|donde queda|donde se encuentra|direccion de|direccion del|ubicacion de|ubicacion del|coordenadas de|coordenadas del)\s+(.+)$",
            )?,
            zone_subject: Regex::new(r"\b(?:zona|barrio|distrito)\s+(?:de\s+|del\s+)?(.+)$")?,
        })
    }

    pub fn gazetteer(&self) -> &Arc<Gazetteer> {
        &self.gazetteer
    }

    /// Entities for `intent` found in `text`. Only kinds the intent declares are returned;
    /// the caller location fills `origin_coords` when no origin place is named.
    pub fn extract(&self, text: &str, intent: Intent, caller: Option<Location>) -> EntitySet {
        let normalized = normalize_text(text);
        let mut entities = EntitySet::new();

        match intent {
            Intent::NearestStop => self.nearest_stop(&normalized, caller, &mut entities),
            Intent::Route => self.route(&normalized, caller, &mut entities),
            Intent::TrafficStatus => self.traffic(&normalized, &mut entities),
            Intent::AccessibilityInfo => self.accessibility(&normalized, &mut entities),
            Intent::Geocode => self.geocode(&normalized, &mut entities),
            Intent::Greeting | Intent::Farewell | Intent::Unknown => {}
        }

        entities.retain_declared(intent);
        entities
    }

    fn nearest_stop(&self, normalized: &str, caller: Option<Location>, entities: &mut EntitySet) {
        match self.gazetteer.best(normalized, PlaceKind::PLACES) {
            Some(found) => {
                insert_place(entities, found.entry);
                entities.insert(EntityKind::OriginCoords, EntityValue::Coords(found.entry.location));
            }
            None => {
                if let Some(location) = caller {
                    entities.insert(EntityKind::OriginCoords, EntityValue::Coords(location));
                }
            }
        }

        if let Some(radius) = self.radius_m(normalized) {
            entities.insert(EntityKind::Radius, EntityValue::Radius(radius));
        }
    }

    fn route(&self, normalized: &str, caller: Option<Location>, entities: &mut EntitySet) {
        let matches = self.gazetteer.find(normalized, PlaceKind::ANY);
        let origin_index = matches.iter().enumerate().position(|(index, found)| {
            match previous_word(normalized, found.start) {
                Some("desde") => true,
                Some("de") | Some("del") => index + 1 < matches.len(),
                _ => false,
            }
        });

        let origin = origin_index.map(|index| matches[index].entry.location).or(caller);
        if let Some(location) = origin {
            entities.insert(EntityKind::OriginCoords, EntityValue::Coords(location));
        }

        let destination = matches
            .iter()
            .enumerate()
            .find(|(index, _)| Some(*index) != origin_index)
            .map(|(_, found)| found);

        match destination {
            Some(found) => {
                insert_place(entities, found.entry);
                entities.insert(
                    EntityKind::DestinationCoords,
                    EntityValue::Coords(found.entry.location),
                );
                if let Some(zone) = owning_zone(found) {
                    entities.insert(EntityKind::Zone, EntityValue::Text(zone));
                }
            }
            None => {
                if let Some(free) = free_text_destination(normalized) {
                    entities.insert(EntityKind::Place, EntityValue::Text(free));
                }
            }
        }

        entities.insert(
            EntityKind::Mode,
            EntityValue::Mode(detect_mode(normalized).unwrap_or(TransportMode::Foot)),
        );
    }

    fn traffic(&self, normalized: &str, entities: &mut EntitySet) {
        if let Some(found) = self.gazetteer.best(normalized, PlaceKind::ZONES) {
            entities.insert(EntityKind::Zone, EntityValue::Text(found.entry.name.clone()));
            return;
        }

        if let Some(zone) = self
            .gazetteer
            .best(normalized, PlaceKind::PLACES)
            .and_then(|found| found.entry.zone.clone())
        {
            entities.insert(EntityKind::Zone, EntityValue::Text(zone));
            return;
        }

        if let Some(zone) = capture_free_text(&self.zone_subject, normalized) {
            entities.insert(EntityKind::Zone, EntityValue::Text(zone));
        }
    }

    fn accessibility(&self, normalized: &str, entities: &mut EntitySet) {
        if let Some(found) = self.gazetteer.best(normalized, PlaceKind::PLACES) {
            insert_place(entities, found.entry);
            return;
        }

        let free = capture_free_text(&self.accessibility_subject, normalized)
            .or_else(|| capture_free_text(&self.accessibility_leading, normalized));
        if let Some(place) = free {
            entities.insert(EntityKind::Place, EntityValue::Text(place));
        }
    }

    fn geocode(&self, normalized: &str, entities: &mut EntitySet) {
        if let Some(found) = self.gazetteer.best(normalized, PlaceKind::ANY) {
            insert_place(entities, found.entry);
            return;
        }

        if let Some(place) = capture_free_text(&self.geocode_subject, normalized) {
            entities.insert(EntityKind::Place, EntityValue::Text(place));
        }
    }

    fn radius_m(&self, normalized: &str) -> Option<u32> {
        let captures = self.radius.captures(normalized)?;
        let value = captures.get(1)?.as_str().parse::<u32>().ok()?;
        Some(value.clamp(MIN_STOP_RADIUS_M, MAX_STOP_RADIUS_M))
    }
}

fn insert_place(entities: &mut EntitySet, entry: &GazetteerEntry) {
    entities.insert(EntityKind::Place, EntityValue::Text(entry.name.clone()));
}

fn owning_zone(found: &GazetteerMatch<'_>) -> Option<String> {
    match found.entry.kind {
        PlaceKind::Zone => Some(found.entry.name.clone()),
        PlaceKind::Stop | PlaceKind::Landmark => found.entry.zone.clone(),
    }
}

fn previous_word(normalized: &str, start: usize) -> Option<&str> {
    normalized[..start]
        .split_whitespace()
        .rev()
        .find(|word| !ARTICLES.contains(word))
}

fn detect_mode(normalized: &str) -> Option<TransportMode> {
    let padded = format!(" {normalized} ");
    MODE_SYNONYMS.iter().find_map(|(mode, synonyms)| {
        synonyms
            .iter()
            .any(|synonym| padded.contains(&format!(" {synonym} ")))
            .then_some(*mode)
    })
}

/// Destination named after the last `a`/`al`/`hasta`/`hacia`/`para` that is not a mode phrase.
fn free_text_destination(normalized: &str) -> Option<String> {
    let tokens = normalized.split(' ').collect::<Vec<_>>();
    for marker in (0..tokens.len()).rev() {
        if !DESTINATION_MARKERS.contains(&tokens[marker]) {
            continue;
        }
        if let Some(place) = clean_free_text(&tokens[marker + 1..]) {
            if detect_mode(&place).is_none() {
                return Some(place);
            }
        }
    }
    None
}

fn capture_free_text(pattern: &Regex, normalized: &str) -> Option<String> {
    let captured = pattern.captures(normalized)?.get(1)?.as_str();
    clean_free_text(&captured.split(' ').collect::<Vec<_>>())
}

fn clean_free_text(tokens: &[&str]) -> Option<String> {
    let tokens = tokens
        .iter()
        .copied()
        .skip_while(|token| ARTICLES.contains(token) || token.is_empty())
        .take_while(|token| !FREE_TEXT_STOPWORDS.contains(token))
        .take(MAX_FREE_TEXT_TOKENS)
        .collect::<Vec<_>>();

    let text = tokens.join(" ");
    (text.chars().count() > 2).then_some(text)
}
