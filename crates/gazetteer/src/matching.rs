use std::cmp::Ordering;

const FUZZY_MIN_ALIAS_CHARS: usize = 5;
const FUZZY_MAX_DISTANCE: usize = 1;

#[derive(Debug, Clone, Copy)]
pub(crate) struct Candidate {
    pub entry: usize,
    pub start: usize,
    pub end: usize,
    pub order: usize,
    pub fuzzy: bool,
}

impl Candidate {
    fn overlaps(&self, other: &Candidate) -> bool {
        self.start < other.end && other.start < self.end
    }
}

/// Byte offsets where `needle` occurs in `text` delimited by spaces or the text edges.
pub(crate) fn occurrences(text: &str, needle: &str) -> Vec<usize> {
    if needle.is_empty() {
        return Vec::new();
    }
    let bytes = text.as_bytes();
    text.match_indices(needle)
        .map(|(start, _)| start)
        .filter(|start| {
            let end = start + needle.len();
            (*start == 0 || bytes[start - 1] == b' ') && (end == bytes.len() || bytes[end] == b' ')
        })
        .collect()
}

pub(crate) fn token_spans(text: &str) -> Vec<(usize, &str)> {
    let mut spans = Vec::new();
    let mut offset = 0;
    for token in text.split(' ') {
        if !token.is_empty() {
            spans.push((offset, token));
        }
        offset += token.len() + 1;
    }
    spans
}

pub(crate) fn fuzzy_candidates(
    tokens: &[(usize, &str)],
    alias: &str,
    entry: usize,
    order: usize,
) -> Vec<Candidate> {
    if alias.contains(' ') || alias.chars().count() < FUZZY_MIN_ALIAS_CHARS {
        return Vec::new();
    }

    tokens
        .iter()
        .filter(|(_, token)| token.chars().count() + FUZZY_MAX_DISTANCE >= FUZZY_MIN_ALIAS_CHARS)
        .filter(|(_, token)| levenshtein(token, alias) <= FUZZY_MAX_DISTANCE)
        .map(|(start, token)| Candidate {
            entry,
            start: *start,
            end: start + token.len(),
            order,
            fuzzy: true,
        })
        .collect()
}

/// Longest span first, then earliest start, then declaration order. Survivors are returned in text order.
pub(crate) fn select_non_overlapping(mut candidates: Vec<Candidate>) -> Vec<Candidate> {
    candidates.sort_by(|a, b| {
        (b.end - b.start)
            .cmp(&(a.end - a.start))
            .then(a.start.cmp(&b.start))
            .then(a.order.cmp(&b.order))
    });

    let mut selected: Vec<Candidate> = Vec::new();
    for candidate in candidates {
        if selected.iter().all(|kept| !kept.overlaps(&candidate)) {
            selected.push(candidate);
        }
    }

    selected.sort_by(|a, b| match a.start.cmp(&b.start) {
        Ordering::Equal => a.order.cmp(&b.order),
        other => other,
    });
    selected
}

pub fn levenshtein(a: &str, b: &str) -> usize {
    let a = a.chars().collect::<Vec<_>>();
    let b = b.chars().collect::<Vec<_>>();
    if a.is_empty() {
        return b.len();
    }

    let mut previous = (0..=b.len()).collect::<Vec<_>>();
    let mut current = vec![0; b.len() + 1];
    for (i, ca) in a.iter().enumerate() {
        current[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let substitution = previous[j] + usize::from(ca != cb);
            current[j + 1] = substitution.min(previous[j + 1] + 1).min(current[j] + 1);
        }
        std::mem::swap(&mut previous, &mut current);
    }
    previous[b.len()]
}
