use std::collections::BTreeMap;

use serde_json::Value;
use tracing::warn;

/// A span of text that accepts any of several equal-length renderings:
/// its base text or any replacement from the replace dictionary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Variant {
    base: Vec<char>,
    replacements: Vec<Vec<char>>,
}

impl Variant {
    /// Replacements that do not match the base's char length are dropped
    /// with a warning; equality over unequal lengths is meaningless here.
    pub fn new(base: &str, replacements: &[&str]) -> Self {
        let base: Vec<char> = base.chars().collect();
        let replacements = replacements
            .iter()
            .filter_map(|r| {
                let chars: Vec<char> = r.chars().collect();
                if chars.len() == base.len() {
                    Some(chars)
                } else {
                    warn!(replacement = r, "replacement length differs from its base; dropped");
                    None
                }
            })
            .collect();
        Self { base, replacements }
    }

    pub fn len(&self) -> usize {
        self.base.len()
    }

    pub fn is_empty(&self) -> bool {
        self.base.is_empty()
    }

    pub fn base(&self) -> String {
        self.base.iter().collect()
    }

    /// The full equality set: base first, then replacements in order.
    pub fn possibilities(&self) -> Vec<String> {
        std::iter::once(&self.base)
            .chain(self.replacements.iter())
            .map(|p| p.iter().collect())
            .collect()
    }

    pub fn matches_chars(&self, text: &[char]) -> bool {
        text == self.base.as_slice() || self.replacements.iter().any(|r| text == r.as_slice())
    }

    /// True if `text` is a strict prefix of at least one possibility.
    pub fn prefix_of_possibility(&self, text: &[char]) -> bool {
        text.len() < self.len()
            && (self.base.starts_with(text)
                || self.replacements.iter().any(|r| r.starts_with(text)))
    }

    /// A single-column atom: the i-th char of the base and of every
    /// replacement.
    pub fn column(&self, i: usize) -> Option<Variant> {
        let base = vec![*self.base.get(i)?];
        let replacements = self.replacements.iter().map(|r| vec![r[i]]).collect();
        Some(Variant { base, replacements })
    }
}

impl PartialEq<str> for Variant {
    fn eq(&self, other: &str) -> bool {
        let chars: Vec<char> = other.chars().collect();
        self.matches_chars(&chars)
    }
}

impl PartialEq<&str> for Variant {
    fn eq(&self, other: &&str) -> bool {
        self == *other
    }
}

/// One span of a [`ManifoldString`]: either literal text or a variant atom.
#[derive(Debug, Clone, PartialEq)]
pub enum Segment {
    Literal(Vec<char>),
    Atom(Variant),
}

impl Segment {
    fn len(&self) -> usize {
        match self {
            Segment::Literal(chars) => chars.len(),
            Segment::Atom(v) => v.len(),
        }
    }
}

/// Ordered mapping `substring -> [replacement]`, each replacement equal in
/// char length to its key. Scan order follows declaration order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReplaceDict {
    entries: Vec<(String, Vec<String>)>,
}

impl ReplaceDict {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: &str, replacements: Vec<String>) {
        let key_len = key.chars().count();
        if key_len == 0 {
            warn!("ignoring empty rdict key");
            return;
        }
        let replacements: Vec<String> = replacements
            .into_iter()
            .filter(|r| {
                let ok = r.chars().count() == key_len;
                if !ok {
                    warn!(key, replacement = %r, "rdict replacement length differs from key; dropped");
                }
                ok
            })
            .collect();
        if let Some(entry) = self.entries.iter_mut().find(|(k, _)| k == key) {
            entry.1 = replacements;
        } else {
            self.entries.push((key.to_string(), replacements));
        }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    /// Merge `other` into `self`; `other` wins on key conflicts.
    pub fn merge(&mut self, other: &ReplaceDict) {
        for (key, reps) in &other.entries {
            self.insert(key, reps.clone());
        }
    }

    /// Build from the `rdict` config value: `{"<substr>": ["<replacement>"]}`.
    pub fn from_value(value: &Value) -> Self {
        let mut dict = Self::new();
        let Some(map) = value.as_object() else {
            if !value.is_null() {
                warn!("rdict is not an object; using empty replace dictionary");
            }
            return dict;
        };
        for (key, entry) in map {
            match entry.as_array() {
                Some(reps) => {
                    let reps: Vec<String> = reps
                        .iter()
                        .filter_map(|r| r.as_str().map(str::to_string))
                        .collect();
                    dict.insert(key, reps);
                }
                None => warn!(key, "rdict entry is not an array; skipped"),
            }
        }
        dict
    }
}

/// How far a typed buffer matches a manifold, under atomic acceptance:
/// a variant atom only commits once a full-length possibility is present.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PrefixMatch {
    /// Chars of the buffer accepted so far (ends on a segment boundary or
    /// inside a literal).
    pub committed: usize,
    /// False when the buffer contains chars that can never extend into a
    /// match; those chars (from `committed` on) are a mistake.
    pub valid: bool,
}

/// A string interleaving literal spans with variant atoms. Its char length
/// always equals the base text's; equality accepts any combination of
/// per-atom renderings.
#[derive(Debug, Clone, PartialEq)]
pub struct ManifoldString {
    base: Vec<char>,
    segments: BTreeMap<usize, Segment>,
    rdict: ReplaceDict,
}

impl ManifoldString {
    /// Scan `base` for each rdict key in declared order and carve variant
    /// atoms out of the surrounding literal spans. An offset occupied by an
    /// atom is never subdivided by a later key.
    pub fn from_base(base: &str, rdict: &ReplaceDict) -> Self {
        let base_chars: Vec<char> = base.chars().collect();
        let mut segments = BTreeMap::new();
        if !base_chars.is_empty() {
            segments.insert(0, Segment::Literal(base_chars.clone()));
        }
        let mut manifold = Self {
            base: base_chars,
            segments,
            rdict: rdict.clone(),
        };
        for (key, replacements) in rdict.iter() {
            if replacements.is_empty() {
                continue;
            }
            let key_chars: Vec<char> = key.chars().collect();
            manifold.carve(&key_chars, replacements);
        }
        manifold
    }

    pub fn from_literal(text: &str) -> Self {
        Self::from_base(text, &ReplaceDict::new())
    }

    /// A manifold of a lone atom.
    pub fn from_variant(variant: Variant) -> Self {
        let base = variant.base.clone();
        let mut segments = BTreeMap::new();
        if !base.is_empty() {
            segments.insert(0, Segment::Atom(variant));
        }
        Self {
            base,
            segments,
            rdict: ReplaceDict::new(),
        }
    }

    fn carve(&mut self, key: &[char], replacements: &[String]) {
        let mut from = 0;
        while let Some(pos) = find_chars(&self.base, key, from) {
            from = pos + key.len();
            self.try_insert_atom(pos, key, replacements);
        }
    }

    /// Split the literal covering `[pos, pos+len)` and drop an atom in its
    /// place. No-op when the range crosses an existing atom.
    fn try_insert_atom(&mut self, pos: usize, key: &[char], replacements: &[String]) {
        let end = pos + key.len();
        let Some((&seg_start, segment)) = self.segments.range(..=pos).next_back() else {
            return;
        };
        let seg_end = seg_start + segment.len();
        if end > seg_end {
            return;
        }
        let Segment::Literal(chars) = segment else {
            return;
        };
        let before: Vec<char> = chars[..pos - seg_start].to_vec();
        let after: Vec<char> = chars[end - seg_start..].to_vec();
        let reps: Vec<&str> = replacements.iter().map(String::as_str).collect();
        let atom = Variant::new(&key.iter().collect::<String>(), &reps);

        self.segments.remove(&seg_start);
        if !before.is_empty() {
            self.segments.insert(seg_start, Segment::Literal(before));
        }
        self.segments.insert(pos, Segment::Atom(atom));
        if !after.is_empty() {
            self.segments.insert(end, Segment::Literal(after));
        }
    }

    pub fn len(&self) -> usize {
        self.base.len()
    }

    pub fn is_empty(&self) -> bool {
        self.base.is_empty()
    }

    pub fn base(&self) -> String {
        self.base.iter().collect()
    }

    pub fn base_chars(&self) -> &[char] {
        &self.base
    }

    pub fn segment_count(&self) -> usize {
        self.segments.len()
    }

    /// Concatenate, shifting the right-hand segment map past our base and
    /// merging replace dictionaries (right wins on conflicts).
    pub fn concat(mut self, other: ManifoldString) -> ManifoldString {
        let offset = self.base.len();
        self.base.extend(other.base);
        for (start, segment) in other.segments {
            self.segments.insert(offset + start, segment);
        }
        self.rdict.merge(&other.rdict);
        self
    }

    /// Full variant-aware equality: every segment must match its slice of
    /// `text`.
    pub fn matches(&self, text: &str) -> bool {
        let chars: Vec<char> = text.chars().collect();
        if chars.len() != self.base.len() {
            return false;
        }
        self.segments.iter().all(|(&start, segment)| {
            let slice = &chars[start..start + segment.len()];
            match segment {
                Segment::Literal(lit) => slice == lit.as_slice(),
                Segment::Atom(v) => v.matches_chars(slice),
            }
        })
    }

    /// Match a typed buffer against the first `limit` chars of this string.
    pub fn prefix_match(&self, text: &str, limit: usize) -> PrefixMatch {
        let chars: Vec<char> = text.chars().collect();
        self.prefix_match_chars(&chars, limit)
    }

    pub fn prefix_match_chars(&self, chars: &[char], limit: usize) -> PrefixMatch {
        let limit = limit.min(self.base.len());
        let mut committed = 0usize;

        for (&start, segment) in &self.segments {
            if start >= limit || start >= chars.len() {
                break;
            }
            let seg_len = segment.len().min(limit - start);
            let avail = &chars[start..chars.len().min(start + seg_len)];
            match segment {
                Segment::Literal(lit) => {
                    let matched = avail
                        .iter()
                        .zip(lit.iter())
                        .take_while(|(a, b)| a == b)
                        .count();
                    committed = start + matched;
                    if matched < avail.len() {
                        return PrefixMatch {
                            committed,
                            valid: false,
                        };
                    }
                }
                Segment::Atom(v) => {
                    if seg_len < segment.len() {
                        // Atom truncated by the limit: honored as its base.
                        let lit = &v.base[..seg_len];
                        let matched = avail
                            .iter()
                            .zip(lit.iter())
                            .take_while(|(a, b)| a == b)
                            .count();
                        committed = start + matched;
                        if matched < avail.len() {
                            return PrefixMatch {
                                committed,
                                valid: false,
                            };
                        }
                    } else if avail.len() == v.len() {
                        if v.matches_chars(avail) {
                            committed = start + v.len();
                        } else {
                            return PrefixMatch {
                                committed,
                                valid: false,
                            };
                        }
                    } else {
                        // Partial atom: pending if still a prefix of some
                        // possibility, otherwise a mistake.
                        return PrefixMatch {
                            committed,
                            valid: v.prefix_of_possibility(avail),
                        };
                    }
                }
            }
        }

        // Anything typed past the limit can never match.
        let valid = chars.len() <= limit.max(committed);
        PrefixMatch {
            committed,
            valid: valid && committed >= chars.len().min(limit),
        }
    }

    /// Slice `[range.start, range.end)`. Atoms fully inside the range are
    /// kept; an atom cut by the boundary degrades to its literal base.
    pub fn slice(&self, start: usize, end: usize) -> ManifoldString {
        let end = end.min(self.base.len());
        let start = start.min(end);
        let base: Vec<char> = self.base[start..end].to_vec();
        let mut segments = BTreeMap::new();
        for (&seg_start, segment) in &self.segments {
            let seg_end = seg_start + segment.len();
            if seg_end <= start || seg_start >= end {
                continue;
            }
            let lo = seg_start.max(start);
            let hi = seg_end.min(end);
            match segment {
                Segment::Atom(v) if seg_start >= start && seg_end <= end => {
                    segments.insert(seg_start - start, Segment::Atom(v.clone()));
                }
                Segment::Atom(v) => {
                    let lit = v.base[lo - seg_start..hi - seg_start].to_vec();
                    segments.insert(lo - start, Segment::Literal(lit));
                }
                Segment::Literal(lit) => {
                    let lit = lit[lo - seg_start..hi - seg_start].to_vec();
                    segments.insert(lo - start, Segment::Literal(lit));
                }
            }
        }
        ManifoldString {
            base,
            segments,
            rdict: self.rdict.clone(),
        }
    }
}

impl PartialEq<str> for ManifoldString {
    fn eq(&self, other: &str) -> bool {
        self.matches(other)
    }
}

impl PartialEq<&str> for ManifoldString {
    fn eq(&self, other: &&str) -> bool {
        self.matches(other)
    }
}

impl From<&str> for ManifoldString {
    fn from(text: &str) -> Self {
        Self::from_literal(text)
    }
}

impl From<Variant> for ManifoldString {
    fn from(variant: Variant) -> Self {
        Self::from_variant(variant)
    }
}

fn find_chars(haystack: &[char], needle: &[char], from: usize) -> Option<usize> {
    let last = haystack.len().checked_sub(needle.len())?;
    (from..=last).find(|&pos| haystack[pos..pos + needle.len()] == *needle)
}
