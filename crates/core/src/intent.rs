use std::collections::HashSet;

use regex::Regex;
use serde::Serialize;
use unicode_segmentation::UnicodeSegmentation;

use crate::error::RuleError;
use crate::models::{clamp_unit, ClassificationResult, Intent};

/// Lowercases, folds Spanish and Valencian diacritics and drops punctuation (including `¿` and `¡`).
pub fn normalize_text(input: &str) -> String {
    let folded = input
        .to_lowercase()
        .chars()
        .map(fold_diacritic)
        .collect::<String>();

    folded.unicode_words().collect::<Vec<_>>().join(" ")
}

fn fold_diacritic(ch: char) -> char {
    match ch {
        'á' | 'à' | 'â' | 'ä' => 'a',
        'é' | 'è' | 'ê' | 'ë' => 'e',
        'í' | 'ì' | 'î' | 'ï' => 'i',
        'ó' | 'ò' | 'ô' | 'ö' => 'o',
        'ú' | 'ù' | 'û' | 'ü' => 'u',
        'ñ' => 'n',
        'ç' => 'c',
        '·' => ' ',
        other => other,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchTier {
    Phrase,
    Partial,
    Keyword,
}

impl MatchTier {
    fn rank(self) -> usize {
        match self {
            Self::Phrase => 0,
            Self::Partial => 1,
            Self::Keyword => 2,
        }
    }

    pub fn confidence(self) -> f32 {
        match self {
            Self::Phrase => 0.95,
            Self::Partial => 0.8,
            Self::Keyword => 0.6,
        }
    }
}

#[derive(Debug, Clone)]
enum Pattern {
    Phrase(Regex),
    AllTerms(Vec<String>),
    AnyTerm(Vec<String>),
}

#[derive(Debug, Clone)]
pub struct IntentRule {
    id: String,
    intent: Intent,
    pattern: Pattern,
}

impl IntentRule {
    /// Regex evaluated against normalized text.
    pub fn phrase(id: &str, intent: Intent, pattern: &str) -> Result<Self, RuleError> {
        let regex = Regex::new(pattern).map_err(|source| RuleError::InvalidPattern {
            id: id.to_string(),
            source,
        })?;
        Ok(Self {
            id: id.to_string(),
            intent,
            pattern: Pattern::Phrase(regex),
        })
    }

    /// Matches when every term occurs as a whole word or word sequence.
    pub fn all_terms(id: &str, intent: Intent, terms: &[&str]) -> Result<Self, RuleError> {
        Ok(Self {
            id: id.to_string(),
            intent,
            pattern: Pattern::AllTerms(normalized_terms(id, terms)?),
        })
    }

    /// Matches when any single term occurs.
    pub fn any_term(id: &str, intent: Intent, terms: &[&str]) -> Result<Self, RuleError> {
        Ok(Self {
            id: id.to_string(),
            intent,
            pattern: Pattern::AnyTerm(normalized_terms(id, terms)?),
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn intent(&self) -> Intent {
        self.intent
    }

    pub fn tier(&self) -> MatchTier {
        match self.pattern {
            Pattern::Phrase(_) => MatchTier::Phrase,
            Pattern::AllTerms(_) => MatchTier::Partial,
            Pattern::AnyTerm(_) => MatchTier::Keyword,
        }
    }

    pub fn describe(&self) -> String {
        match &self.pattern {
            Pattern::Phrase(regex) => regex.as_str().to_string(),
            Pattern::AllTerms(terms) => format!("all of [{}]", terms.join(", ")),
            Pattern::AnyTerm(terms) => format!("any of [{}]", terms.join(", ")),
        }
    }

    fn matches(&self, normalized: &str, padded: &str) -> bool {
        match &self.pattern {
            Pattern::Phrase(regex) => regex.is_match(normalized),
            Pattern::AllTerms(terms) => terms.iter().all(|term| contains_term(padded, term)),
            Pattern::AnyTerm(terms) => terms.iter().any(|term| contains_term(padded, term)),
        }
    }
}

fn normalized_terms(id: &str, terms: &[&str]) -> Result<Vec<String>, RuleError> {
    let terms = terms
        .iter()
        .map(|term| normalize_text(term))
        .filter(|term| !term.is_empty())
        .collect::<Vec<_>>();
    if terms.is_empty() {
        return Err(RuleError::EmptyTerms(id.to_string()));
    }
    Ok(terms)
}

fn contains_term(padded: &str, term: &str) -> bool {
    padded.contains(&format!(" {term} "))
}

/// Ordered rule table. Tiers are tried from most to least specific and the first
/// rule that matches within a tier wins, so declaration order breaks ties.
#[derive(Debug, Clone)]
pub struct IntentClassifier {
    rules: Vec<IntentRule>,
}

impl IntentClassifier {
    /// Rules are regrouped by tier, keeping declaration order within a tier.
    pub fn new(mut rules: Vec<IntentRule>) -> Result<Self, RuleError> {
        let mut seen = HashSet::new();
        for rule in &rules {
            if !seen.insert(rule.id.as_str()) {
                return Err(RuleError::DuplicateId(rule.id.clone()));
            }
        }
        rules.sort_by_key(|rule| rule.tier().rank());
        Ok(Self { rules })
    }

    pub fn with_default_rules() -> Result<Self, RuleError> {
        Self::new(default_rules()?)
    }

    /// Rules in evaluation order.
    pub fn rules(&self) -> &[IntentRule] {
        &self.rules
    }

    pub fn classify(&self, text: &str) -> ClassificationResult {
        let normalized = normalize_text(text);
        if normalized.is_empty() {
            return ClassificationResult::unknown();
        }
        let padded = format!(" {normalized} ");

        self.rules
            .iter()
            .find(|rule| rule.matches(&normalized, &padded))
            .map(|rule| ClassificationResult {
                intent: rule.intent,
                confidence: clamp_unit(rule.tier().confidence()),
                matched_pattern_id: Some(rule.id.clone()),
            })
            .unwrap_or_else(ClassificationResult::unknown)
    }
}

const PHRASE_RULES: &[(&str, Intent, &str)] = &[
    (
        "nearest_stop.phrase.1",
        Intent::NearestStop,
        r"\b(parada|paradas|paradero)\b.*\b(cercana|cercanas|cerca|proxima|proximas)\b",
    ),
    (
        "nearest_stop.phrase.2",
        Intent::NearestStop,
        r"\b(mas cercana|mas proxima|mas cerca)\b.*\b(parada|paradero)\b",
    ),
    (
        "nearest_stop.phrase.3",
        Intent::NearestStop,
        r"\bdonde\b.*\b(parada|paradero)\b",
    ),
    (
        "nearest_stop.phrase.4",
        Intent::NearestStop,
        r"\b(bus|autobus|metro|tranvia|emt)\b.*\b(cerca|cercano|cercana)\b",
    ),
    (
        "route.phrase.1",
        Intent::Route,
        r"\bcomo\b.*\b(llegar|llego|voy|ir)\b",
    ),
    (
        "route.phrase.2",
        Intent::Route,
        r"\b(ruta|camino|indicaciones|direcciones)\b.*\b(hacia|hasta|para|a|al)\b",
    ),
    (
        "route.phrase.3",
        Intent::Route,
        r"\b(ir|llevame|llevar)\b.*\bdesde\b.*\b(hasta|a|al)\b",
    ),
    (
        "route.phrase.4",
        Intent::Route,
        r"\bquiero ir\b.*\b(a|al|hasta|hacia)\b",
    ),
    (
        "traffic.phrase.1",
        Intent::TrafficStatus,
        r"\b(como|que tal)\s+(esta|va|anda)\b.*\b(trafico|circulacion)\b",
    ),
    (
        "traffic.phrase.2",
        Intent::TrafficStatus,
        r"\bestado\b.*\b(trafico|circulacion|vias|carreteras)\b",
    ),
    (
        "traffic.phrase.3",
        Intent::TrafficStatus,
        r"\b(hay|habra)\b.*\b(atasco|atascos|retenciones|trafico)\b",
    ),
    (
        "accessibility.phrase.1",
        Intent::AccessibilityInfo,
        r"\b(es|esta)\b.*\b(accesible|adaptado|adaptada)\b",
    ),
    (
        "accessibility.phrase.2",
        Intent::AccessibilityInfo,
        r"\baccesibilidad\b.*\b(de|del|en)\b",
    ),
    (
        "accessibility.phrase.3",
        Intent::AccessibilityInfo,
        r"\bsilla de ruedas\b",
    ),
    (
        "accessibility.phrase.4",
        Intent::AccessibilityInfo,
        r"\bmovilidad reducida\b",
    ),
    (
        "geocode.phrase.1",
        Intent::Geocode,
        r"\b(donde esta|donde queda|donde se encuentra)\b",
    ),
    (
        "geocode.phrase.2",
        Intent::Geocode,
        r"\b(direccion|ubicacion|coordenadas)\s+(de|del)\b",
    ),
    (
        "greeting.phrase.1",
        Intent::Greeting,
        r"^(hola|buenas|buenos dias|buenas tardes|buenas noches)\b",
    ),
    (
        "farewell.phrase.1",
        Intent::Farewell,
        r"\b(adios|hasta luego|hasta pronto|nos vemos|chao|muchas gracias)\b",
    ),
];

const PARTIAL_RULES: &[(&str, Intent, &[&str])] = &[
    ("nearest_stop.partial.1", Intent::NearestStop, &["parada", "autobus"]),
    ("nearest_stop.partial.2", Intent::NearestStop, &["parada", "metro"]),
    ("route.partial.1", Intent::Route, &["ruta", "desde"]),
    ("route.partial.2", Intent::Route, &["ir", "desde"]),
    ("traffic.partial.1", Intent::TrafficStatus, &["trafico", "zona"]),
    ("traffic.partial.2", Intent::TrafficStatus, &["trafico", "barrio"]),
    ("accessibility.partial.1", Intent::AccessibilityInfo, &["acceso", "discapacitados"]),
    ("accessibility.partial.2", Intent::AccessibilityInfo, &["rampa", "acceso"]),
    ("geocode.partial.1", Intent::Geocode, &["buscar", "direccion"]),
];

const KEYWORD_RULES: &[(&str, Intent, &[&str])] = &[
    ("nearest_stop.keyword.1", Intent::NearestStop, &["parada", "paradas", "paradero"]),
    ("route.keyword.1", Intent::Route, &["ruta", "llegar", "camino", "indicaciones"]),
    (
        "traffic.keyword.1",
        Intent::TrafficStatus,
        &["trafico", "atasco", "atascos", "circulacion", "congestion", "retenciones"],
    ),
    (
        "accessibility.keyword.1",
        Intent::AccessibilityInfo,
        &["accesibilidad", "accesible", "rampa", "rampas", "ascensor", "discapacidad"],
    ),
    ("geocode.keyword.1", Intent::Geocode, &["direccion", "ubicacion", "coordenadas", "localizar"]),
    ("greeting.keyword.1", Intent::Greeting, &["hola", "buenas", "saludos"]),
    ("farewell.keyword.1", Intent::Farewell, &["adios", "gracias", "chao"]),
];

pub fn default_rules() -> Result<Vec<IntentRule>, RuleError> {
    let mut rules = Vec::with_capacity(PHRASE_RULES.len() + PARTIAL_RULES.len() + KEYWORD_RULES.len());
    for (id, intent, pattern) in PHRASE_RULES {
        rules.push(IntentRule::phrase(id, *intent, pattern)?);
    }
    for (id, intent, terms) in PARTIAL_RULES {
        rules.push(IntentRule::all_terms(id, *intent, terms)?);
    }
    for (id, intent, terms) in KEYWORD_RULES {
        rules.push(IntentRule::any_term(id, *intent, terms)?);
    }
    Ok(rules)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classifier() -> IntentClassifier {
        IntentClassifier::with_default_rules().expect("default rules compile")
    }

    #[test]
    fn normalizes_spanish_punctuation_and_accents() {
        assert_eq!(
            normalize_text("¿Dónde está la parada de autobús más cercana?"),
            "donde esta la parada de autobus mas cercana"
        );
        assert_eq!(normalize_text("  ¡Cómo   está el TRÁFICO!  "), "como esta el trafico");
        assert_eq!(normalize_text("Russafa, l·l"), "russafa l l");
    }

    #[test]
    fn classifies_nearest_stop_phrase() {
        let result = classifier().classify("¿Dónde está la parada de autobús más cercana?");
        assert_eq!(result.intent, Intent::NearestStop);
        assert!(result.confidence >= 0.9);
        assert_eq!(result.matched_pattern_id.as_deref(), Some("nearest_stop.phrase.1"));
    }

    #[test]
    fn classifies_traffic_without_zone() {
        let result = classifier().classify("¿Cómo está el tráfico?");
        assert_eq!(result.intent, Intent::TrafficStatus);
        assert!(result.confidence >= 0.9);
    }

    #[test]
    fn classifies_each_intent_family() {
        let classifier = classifier();
        let cases = [
            ("¿Cómo llego a la Ciudad de las Artes?", Intent::Route),
            ("¿Es accesible el IVAM?", Intent::AccessibilityInfo),
            ("¿Dónde está el Mercado Central?", Intent::Geocode),
            ("Hola, buenas tardes", Intent::Greeting),
            ("Muchas gracias, adiós", Intent::Farewell),
            ("¿Hay atascos en la avenida del Puerto?", Intent::TrafficStatus),
        ];
        for (text, expected) in cases {
            assert_eq!(classifier.classify(text).intent, expected, "{text}");
        }
    }

    #[test]
    fn lower_tiers_report_lower_confidence() {
        let classifier = classifier();

        let partial = classifier.classify("parada autobús");
        assert_eq!(partial.intent, Intent::NearestStop);
        assert_eq!(partial.confidence, MatchTier::Partial.confidence());

        let keyword = classifier.classify("tráfico");
        assert_eq!(keyword.intent, Intent::TrafficStatus);
        assert_eq!(keyword.confidence, MatchTier::Keyword.confidence());
    }

    #[test]
    fn earliest_declared_rule_wins_on_overlap() {
        let result = classifier().classify("Hola, ¿dónde está la parada más cercana?");
        assert_eq!(result.intent, Intent::NearestStop);
    }

    #[test]
    fn gibberish_and_empty_text_are_unknown() {
        let classifier = classifier();
        assert_eq!(classifier.classify("xzq blorf wibble"), ClassificationResult::unknown());
        assert_eq!(classifier.classify("   "), ClassificationResult::unknown());
    }

    #[test]
    fn classification_is_deterministic() {
        let classifier = classifier();
        let first = classifier.classify("ruta en bici hasta la Malvarrosa");
        for _ in 0..10 {
            assert_eq!(classifier.classify("ruta en bici hasta la Malvarrosa"), first);
        }
    }

    #[test]
    fn rejects_invalid_and_duplicate_rules() {
        assert!(matches!(
            IntentRule::phrase("bad", Intent::Route, "(unclosed"),
            Err(RuleError::InvalidPattern { .. })
        ));
        assert!(matches!(
            IntentRule::any_term("empty", Intent::Route, &["¿?"]),
            Err(RuleError::EmptyTerms(_))
        ));

        let rule = IntentRule::any_term("dup", Intent::Route, &["ruta"]).expect("rule");
        assert!(matches!(
            IntentClassifier::new(vec![rule.clone(), rule]),
            Err(RuleError::DuplicateId(_))
        ));
    }

    #[test]
    fn custom_rules_replace_the_table() {
        let classifier = IntentClassifier::new(vec![IntentRule::all_terms(
            "custom.partial",
            Intent::Geocode,
            &["plaza", "redonda"],
        )
        .expect("rule")])
        .expect("classifier");

        let result = classifier.classify("la Plaza Redonda");
        assert_eq!(result.intent, Intent::Geocode);
        assert_eq!(result.matched_pattern_id.as_deref(), Some("custom.partial"));
        assert_eq!(classifier.classify("parada").intent, Intent::Unknown);
    }

    #[test]
    fn interleaved_tiers_are_listed_in_evaluation_order() {
        let classifier = IntentClassifier::new(vec![
            IntentRule::any_term("custom.keyword", Intent::TrafficStatus, &["plaza"]).expect("rule"),
            IntentRule::phrase("custom.phrase", Intent::Geocode, r"\bplaza redonda\b")
                .expect("rule"),
        ])
        .expect("classifier");

        let ids = classifier.rules().iter().map(IntentRule::id).collect::<Vec<_>>();
        assert_eq!(ids, ["custom.phrase", "custom.keyword"]);

        let result = classifier.classify("la plaza redonda");
        assert_eq!(result.matched_pattern_id.as_deref(), Some("custom.phrase"));
        assert_eq!(classifier.classify("otra plaza").intent, Intent::TrafficStatus);
    }
}
