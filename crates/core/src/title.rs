//! Title text preparation: font replacements, casing and line splitting.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Separators preferred as split points, in priority order.
const PRIORITY_SEPARATORS: [&str; 3] = [": ", ", ", "( "];

fn width(s: &str) -> usize {
    s.chars().count()
}

/// Split `title` into display lines.
///
/// A title shorter than `max_width` is returned unsplit. Otherwise the first
/// priority separator found in the first half of the remaining text is used
/// as the split point (the punctuation stays on the upper line), or the first
/// space if there is none. When no more lines are available, words move from
/// the remainder onto the line being built until the remainder fits. Never
/// more than `max_lines` lines are produced and no text is dropped.
///
/// Lines are returned in stacking order. With `top_heavy` and exactly two
/// lines, the stack is inverted so the renderer, which stacks top-heavy
/// titles from the bottom edge up, places the primary line last.
pub fn split(title: &str, max_width: usize, max_lines: usize, top_heavy: bool) -> Vec<String> {
    let title = title.trim();
    if title.is_empty() {
        return vec![String::new()];
    }
    if width(title) < max_width || max_lines <= 1 {
        return vec![title.to_string()];
    }

    let mut lines: Vec<String> = Vec::new();
    let mut rest = title.to_string();

    while width(&rest) >= max_width && lines.len() + 1 < max_lines {
        let Some((mut first, mut remainder)) = initial_split(&rest) else {
            break;
        };

        if width(&remainder) >= max_width && lines.len() + 2 < max_lines {
            lines.push(first);
            rest = remainder;
            continue;
        }

        while width(&remainder) >= max_width {
            let Some((word, tail)) = remainder.split_once(' ') else {
                break;
            };
            first.push(' ');
            first.push_str(word);
            remainder = tail.trim_start().to_string();
        }
        lines.push(first);
        rest = remainder;
        break;
    }
    lines.push(rest);

    if top_heavy && lines.len() == 2 {
        lines.reverse();
    }
    lines
}

/// First split of `text`: a priority separator in the first half, else the
/// first space. `None` for a single word.
fn initial_split(text: &str) -> Option<(String, String)> {
    let half = width(text) / 2;
    for sep in PRIORITY_SEPARATORS {
        if let Some(idx) = text.find(sep) {
            if width(&text[..idx]) <= half {
                let keep = idx + sep.trim_end().len();
                let first = text[..keep].to_string();
                let remainder = text[idx + sep.len()..].trim_start().to_string();
                if !remainder.is_empty() {
                    return Some((first, remainder));
                }
            }
        }
    }
    text.split_once(' ')
        .map(|(a, b)| (a.to_string(), b.trim_start().to_string()))
        .filter(|(_, b)| !b.is_empty())
}

// ---------------------------------------------------------------------------
// Casing and replacements
// ---------------------------------------------------------------------------

/// How title text is cased before splitting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FontCase {
    Upper,
    Lower,
    Title,
    #[default]
    Source,
    Blank,
}

impl FontCase {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "upper" => Some(Self::Upper),
            "lower" => Some(Self::Lower),
            "title" => Some(Self::Title),
            "source" => Some(Self::Source),
            "blank" => Some(Self::Blank),
            _ => None,
        }
    }

    pub fn apply(&self, text: &str) -> String {
        match self {
            Self::Upper => text.to_uppercase(),
            Self::Lower => text.to_lowercase(),
            Self::Title => title_case(text),
            Self::Source => text.to_string(),
            Self::Blank => String::new(),
        }
    }
}

fn title_case(text: &str) -> String {
    text.split(' ')
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(c) => c.to_uppercase().chain(chars).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Apply `font_replacements` (substring to replacement) in declared order.
/// Relies on `serde_json` keeping object keys in insertion order.
/// Non-string replacement values are ignored.
pub fn apply_replacements(text: &str, replacements: &Map<String, Value>) -> String {
    replacements
        .iter()
        .filter_map(|(from, to)| to.as_str().map(|to| (from, to)))
        .filter(|(from, _)| !from.is_empty())
        .fold(text.to_string(), |acc, (from, to)| acc.replace(from.as_str(), to))
}

/// Line-splitting parameters of a card.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LineCharacteristics {
    pub max_line_width: usize,
    pub max_line_count: usize,
    pub top_heavy: bool,
}

/// Full title pipeline: replacements, casing, then splitting.
pub fn format_title(
    title: &str,
    replacements: &Map<String, Value>,
    case: FontCase,
    lines: LineCharacteristics,
) -> Vec<String> {
    if case == FontCase::Blank {
        return vec![String::new()];
    }
    let replaced = apply_replacements(title, replacements);
    let cased = case.apply(&replaced);
    split(
        &cased,
        lines.max_line_width,
        lines.max_line_count,
        lines.top_heavy,
    )
}
