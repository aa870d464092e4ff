use serde_json::Value;
use tracing::warn;

/// The universal newline set: any of these, when configured as a splitter,
/// gets a literal `\n` indicator appended to the emitted line.
pub const UNIVERSAL_NEWLINES: [&str; 11] = [
    "\r\n",
    "\n",
    "\r",
    "\x0b",
    "\x0c",
    "\x1c",
    "\x1d",
    "\x1e",
    "\u{85}",
    "\u{2028}",
    "\u{2029}",
];

#[derive(Debug, Clone, PartialEq)]
struct SplitEntry {
    pattern: Vec<char>,
    keep: bool,
}

/// Ordered mapping of splitter substrings to their `keep` flag.
///
/// Order matters: when two splitters occur at the same position, the one
/// inserted first wins.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SplitDict {
    entries: Vec<SplitEntry>,
}

impl SplitDict {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a splitter. Re-inserting an existing pattern updates its
    /// `keep` flag in place without changing its position.
    pub fn insert(&mut self, pattern: &str, keep: bool) {
        let chars: Vec<char> = pattern.chars().collect();
        if chars.is_empty() {
            warn!("ignoring empty splitter pattern");
            return;
        }
        if let Some(entry) = self.entries.iter_mut().find(|e| e.pattern == chars) {
            entry.keep = keep;
        } else {
            self.entries.push(SplitEntry {
                pattern: chars,
                keep,
            });
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Build from the `sdict` config value: `{"<substr>": {"keep": bool}}`.
    /// Malformed entries are warned about and skipped.
    pub fn from_value(value: &Value) -> Self {
        let mut dict = Self::new();
        let Some(map) = value.as_object() else {
            if !value.is_null() {
                warn!("sdict is not an object; using empty split dictionary");
            }
            return dict;
        };
        for (pattern, entry) in map {
            match entry.get("keep").and_then(Value::as_bool) {
                Some(keep) => dict.insert(pattern, keep),
                None => warn!(%pattern, "sdict entry is missing a boolean `keep`; skipped"),
            }
        }
        dict
    }
}

fn is_universal_newline(pattern: &[char]) -> bool {
    UNIVERSAL_NEWLINES
        .iter()
        .any(|nl| nl.chars().eq(pattern.iter().copied()))
}

/// Find the first occurrence of `needle` in `haystack` at or after `from`.
fn find_from(haystack: &[char], needle: &[char], from: usize) -> Option<usize> {
    let last = haystack.len().checked_sub(needle.len())?;
    (from..=last).find(|&pos| haystack[pos..pos + needle.len()] == *needle)
}

/// Split `text` into typable lines.
///
/// Repeatedly picks the splitter with the nearest occurrence at or after the
/// scan position (ties broken by dictionary order) and emits the text up to
/// it. A splitter with `keep` stays on the end of its line; otherwise it is
/// replaced by `fill` characters (when `fill` is set) so that concatenating
/// the results preserves every downstream character offset.
///
/// With `indicate_newlines`, a splitter from [`UNIVERSAL_NEWLINES`] gets a
/// literal `\n` appended to the emitted line; the indicator counts towards
/// the fill budget, so offsets still line up. With `final_newline` the tail
/// line gets a trailing `\n` as well (one char beyond the input length).
pub fn split(
    text: &str,
    sdict: &SplitDict,
    indicate_newlines: bool,
    final_newline: bool,
    fill: Option<char>,
) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    let mut live: Vec<usize> = (0..sdict.entries.len()).collect();
    let mut out = Vec::new();
    let mut i = 0usize;

    loop {
        let mut best: Option<(usize, usize)> = None;
        let mut gone = Vec::new();
        for &ei in &live {
            match find_from(&chars, &sdict.entries[ei].pattern, i) {
                // Strict `<` keeps the earliest-inserted candidate on ties.
                Some(pos) => {
                    if best.is_none_or(|(bp, _)| pos < bp) {
                        best = Some((pos, ei));
                    }
                }
                None => gone.push(ei),
            }
        }
        live.retain(|ei| !gone.contains(ei));

        let Some((pos, ei)) = best else { break };
        let entry = &sdict.entries[ei];
        let pattern_len = entry.pattern.len();

        let mut item: String = chars[i..pos].iter().collect();
        if entry.keep {
            item.extend(chars[pos..pos + pattern_len].iter());
        }
        let newline = indicate_newlines && is_universal_newline(&entry.pattern);
        if !entry.keep {
            if let Some(f) = fill {
                let pad = pattern_len - usize::from(newline);
                item.extend(std::iter::repeat(f).take(pad));
            }
        }
        if newline {
            item.push('\n');
        }

        out.push(item);
        i = pos + pattern_len;
    }

    let mut tail: String = chars[i..].iter().collect();
    if final_newline {
        tail.push('\n');
    }
    out.push(tail);
    out
}
