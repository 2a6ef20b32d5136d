//! Season and episode label resolution.
//!
//! Two independent resolvers live here:
//!
//! - [`LabelMap`]: manually specified label overrides indexed in exactly one
//!   mode (by season, by season+episode range, or by absolute range). The mode
//!   is inferred once, when the map is built from [`RawLabelOverrides`].
//! - [`SeasonTitleRanges`]: the season title table, where absolute ranges
//!   (`"12-24"`), index ranges (`"s2e1-s2e13"`) and bare seasons (`"2"`) are
//!   all active at once and the last declared entry is checked first.
//!
//! Labels may contain `{placeholder}` tokens, see [`substitute`].

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::CoreError;
use crate::numerals;

/// `{field}` or `{field:02}`.
static PLACEHOLDER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{([A-Za-z_][A-Za-z0-9_.]*)(?::(\d+))?\}").expect("valid regex")
});

static ABSOLUTE_RANGE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d+)\s*-\s*(\d+)$").expect("valid regex"));

static INDEX_RANGE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^s(\d+)\s*e(\d+)\s*-\s*s(\d+)\s*e(\d+)$").expect("valid regex")
});

static INDEX_SINGLE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^s(\d+)\s*e(\d+)$").expect("valid regex"));

/// Label used for season 0 when nothing more specific applies.
pub const SPECIALS_LABEL: &str = "Specials";

/// Default episode label format.
pub const DEFAULT_EPISODE_FORMAT: &str = "Episode {episode_number}";

// ---------------------------------------------------------------------------
// Episode index
// ---------------------------------------------------------------------------

/// Position of an episode within its series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EpisodeIndex {
    pub season_number: i32,
    pub episode_number: i32,
    #[serde(default)]
    pub absolute_number: Option<i32>,
}

impl EpisodeIndex {
    pub fn new(season_number: i32, episode_number: i32, absolute_number: Option<i32>) -> Self {
        Self {
            season_number,
            episode_number,
            absolute_number,
        }
    }
}

/// `"Specials"` for season 0, `"Season {n}"` otherwise.
pub fn generic_season_label(season_number: i32) -> String {
    if season_number == 0 {
        SPECIALS_LABEL.to_string()
    } else {
        format!("Season {season_number}")
    }
}

// ---------------------------------------------------------------------------
// Placeholder substitution
// ---------------------------------------------------------------------------

/// Replace `{field}` / `{field:0N}` tokens using the episode index and
/// caller-supplied `extras`.
///
/// Index fields are `season_number`, `episode_number` and `absolute_number`
/// (which falls back to the episode number). Any numeric field may take a
/// `_cardinal`, `_ordinal` or `_roman` suffix. An unknown field is an error.
pub fn substitute(
    template: &str,
    index: &EpisodeIndex,
    extras: &Map<String, Value>,
) -> Result<String, CoreError> {
    let mut failed: Option<String> = None;
    let text = PLACEHOLDER_RE
        .replace_all(template, |caps: &regex::Captures| {
            let key = &caps[1];
            match lookup_field(key, index, extras) {
                Some(value) => apply_width(value, caps.get(2).map(|m| m.as_str())),
                None => {
                    failed.get_or_insert_with(|| key.to_string());
                    caps[0].to_string()
                }
            }
        })
        .to_string();

    match failed {
        Some(placeholder) => Err(CoreError::Substitution {
            template: template.to_string(),
            placeholder,
        }),
        None => Ok(text),
    }
}

fn lookup_field(key: &str, index: &EpisodeIndex, extras: &Map<String, Value>) -> Option<String> {
    if let Some(n) = number_field(key, index, extras) {
        return Some(n.to_string());
    }
    let spellers: [(&str, fn(i64) -> String); 3] = [
        ("_cardinal", numerals::cardinal),
        ("_ordinal", numerals::ordinal),
        ("_roman", numerals::roman),
    ];
    for (suffix, spell) in spellers {
        let base = key.strip_suffix(suffix);
        if let Some(n) = base.and_then(|b| number_field(b, index, extras)) {
            return Some(spell(n));
        }
    }
    match extras.get(key)? {
        Value::String(s) => Some(s.clone()),
        Value::Null => None,
        other => Some(other.to_string()),
    }
}

fn number_field(key: &str, index: &EpisodeIndex, extras: &Map<String, Value>) -> Option<i64> {
    match key {
        "season_number" => Some(index.season_number.into()),
        "episode_number" => Some(index.episode_number.into()),
        "absolute_number" => Some(index.absolute_number.unwrap_or(index.episode_number).into()),
        _ => extras.get(key).and_then(Value::as_i64),
    }
}

/// Widest padding a placeholder may request.
const MAX_PAD_WIDTH: usize = 64;

/// `{x:02}` pads with zeros, `{x:4}` pads with spaces.
fn apply_width(value: String, width: Option<&str>) -> String {
    let Some(spec) = width else {
        return value;
    };
    let Ok(n) = spec.parse::<usize>().map(|n| n.min(MAX_PAD_WIDTH)) else {
        return value;
    };
    if spec.starts_with('0') {
        format!("{value:0>n$}")
    } else {
        format!("{value:>n$}")
    }
}

// ---------------------------------------------------------------------------
// Range keys
// ---------------------------------------------------------------------------

/// Inclusive absolute-number range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AbsoluteRange {
    pub start: i32,
    pub end: i32,
}

impl AbsoluteRange {
    pub fn contains(&self, absolute: i32) -> bool {
        (self.start..=self.end).contains(&absolute)
    }
}

/// Inclusive `(season, episode)` range, ordered lexicographically.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexRange {
    pub start: (i32, i32),
    pub end: (i32, i32),
}

impl IndexRange {
    pub fn contains(&self, season: i32, episode: i32) -> bool {
        (self.start..=self.end).contains(&(season, episode))
    }
}

fn invalid_range(key: &str, reason: impl Into<String>) -> CoreError {
    CoreError::InvalidLabelRange {
        key: key.to_string(),
        reason: reason.into(),
    }
}

fn parse_num(s: &str, key: &str) -> Result<i32, CoreError> {
    s.parse()
        .map_err(|_| invalid_range(key, format!("'{s}' is not a valid number")))
}

/// `"12-24"` or a single `"12"`.
pub fn parse_absolute_range(key: &str) -> Result<AbsoluteRange, CoreError> {
    let trimmed = key.trim();
    let (start, end) = if let Some(caps) = ABSOLUTE_RANGE_RE.captures(trimmed) {
        (parse_num(&caps[1], key)?, parse_num(&caps[2], key)?)
    } else if !trimmed.is_empty() && trimmed.chars().all(|c| c.is_ascii_digit()) {
        let n = parse_num(trimmed, key)?;
        (n, n)
    } else {
        return Err(invalid_range(key, "expected an absolute range like '12-24'"));
    };
    if start > end {
        return Err(invalid_range(key, "range start is after its end"));
    }
    Ok(AbsoluteRange { start, end })
}

/// `"s2e1-s2e13"` or a single `"s2e1"`.
pub fn parse_index_range(key: &str) -> Result<IndexRange, CoreError> {
    let trimmed = key.trim();
    let (start, end) = if let Some(caps) = INDEX_RANGE_RE.captures(trimmed) {
        (
            (parse_num(&caps[1], key)?, parse_num(&caps[2], key)?),
            (parse_num(&caps[3], key)?, parse_num(&caps[4], key)?),
        )
    } else if let Some(caps) = INDEX_SINGLE_RE.captures(trimmed) {
        let pair = (parse_num(&caps[1], key)?, parse_num(&caps[2], key)?);
        (pair, pair)
    } else {
        return Err(invalid_range(key, "expected an index range like 's1e1-s1e10'"));
    };
    if start > end {
        return Err(invalid_range(key, "range start is after its end"));
    }
    Ok(IndexRange { start, end })
}

fn parse_season(key: &str) -> Result<i32, CoreError> {
    key.trim()
        .parse()
        .map_err(|_| invalid_range(key, "expected a season number"))
}

fn looks_like_index_range(key: &str) -> bool {
    let trimmed = key.trim();
    INDEX_RANGE_RE.is_match(trimmed) || INDEX_SINGLE_RE.is_match(trimmed)
}

// ---------------------------------------------------------------------------
// Raw overrides (as stored on the series)
// ---------------------------------------------------------------------------

/// Whether a manual source override applies to every episode in its range or
/// only to unwatched ones. Consumed by the source-selection collaborator.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AppliesTo {
    #[default]
    All,
    Unwatched,
}

/// Label overrides exactly as declared, in declaration order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawLabelOverrides {
    /// Season keys (`"1"`) or index ranges (`"s1e1-s1e6"`) to labels.
    #[serde(default, with = "ordered_pairs")]
    pub seasons: Vec<(String, String)>,
    /// Absolute ranges (`"1-12"`) to labels.
    #[serde(default, with = "ordered_pairs")]
    pub episode_ranges: Vec<(String, String)>,
    /// Manual source images keyed like the labels.
    #[serde(default, with = "ordered_pairs")]
    pub sources: Vec<(String, String)>,
    #[serde(default)]
    pub applies_to: HashMap<String, AppliesTo>,
}

impl RawLabelOverrides {
    pub fn is_empty(&self) -> bool {
        self.seasons.is_empty() && self.episode_ranges.is_empty() && self.sources.is_empty()
    }
}

// ---------------------------------------------------------------------------
// LabelMap
// ---------------------------------------------------------------------------

/// A manual source image attached to a label key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceOverride {
    pub path: String,
    pub applies_to: AppliesTo,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LabelEntry<K> {
    pub key: K,
    pub label: Option<String>,
    pub source: Option<SourceOverride>,
}

/// Indexing mode of a [`LabelMap`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LabelMode {
    BySeason,
    ByIndex,
    ByAbsolute,
}

/// Label overrides in exactly one indexing mode, fixed at construction.
#[derive(Debug, Clone, PartialEq)]
pub enum LabelMap {
    BySeason(Vec<LabelEntry<i32>>),
    ByIndex(Vec<LabelEntry<IndexRange>>),
    ByAbsolute(Vec<LabelEntry<AbsoluteRange>>),
}

impl Default for LabelMap {
    fn default() -> Self {
        Self::BySeason(Vec::new())
    }
}

/// Non-fatal observation made while resolving a label.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LabelWarning {
    /// Absolute-indexed lookup used the episode number instead.
    AbsoluteNumberMissing { episode_number: i32 },
}

/// A resolved label and whether it came from an override.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedLabel {
    pub text: String,
    pub from_override: bool,
    pub warnings: Vec<LabelWarning>,
}

impl LabelMap {
    /// Build a map, inferring its mode from the shape of `raw`.
    ///
    /// Absolute mode wins when any episode range is declared; index mode when
    /// any season key is an `sXeY` range; season mode otherwise. Keys that do
    /// not parse in the chosen mode are skipped and returned.
    pub fn from_raw(raw: &RawLabelOverrides) -> (Self, Vec<CoreError>) {
        let mut skipped = Vec::new();
        let applies = |key: &str| raw.applies_to.get(key).copied().unwrap_or_default();

        let map = if !raw.episode_ranges.is_empty() {
            Self::ByAbsolute(build_entries(
                &raw.episode_ranges,
                &raw.sources,
                parse_absolute_range,
                applies,
                &mut skipped,
            ))
        } else if raw
            .seasons
            .iter()
            .chain(&raw.sources)
            .any(|(k, _)| looks_like_index_range(k))
        {
            Self::ByIndex(build_entries(
                &raw.seasons,
                &raw.sources,
                parse_index_range,
                applies,
                &mut skipped,
            ))
        } else {
            Self::BySeason(build_entries(
                &raw.seasons,
                &raw.sources,
                parse_season,
                applies,
                &mut skipped,
            ))
        };

        for err in &skipped {
            tracing::warn!(error = %err, mode = ?map.mode(), "Skipping label override");
        }
        (map, skipped)
    }

    pub fn mode(&self) -> LabelMode {
        match self {
            Self::BySeason(_) => LabelMode::BySeason,
            Self::ByIndex(_) => LabelMode::ByIndex,
            Self::ByAbsolute(_) => LabelMode::ByAbsolute,
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Self::BySeason(e) => e.is_empty(),
            Self::ByIndex(e) => e.is_empty(),
            Self::ByAbsolute(e) => e.is_empty(),
        }
    }

    fn has_sources(&self) -> bool {
        match self {
            Self::BySeason(e) => e.iter().any(|x| x.source.is_some()),
            Self::ByIndex(e) => e.iter().any(|x| x.source.is_some()),
            Self::ByAbsolute(e) => e.iter().any(|x| x.source.is_some()),
        }
    }

    /// A cleared map. The mode survives only when this map carries no manual
    /// source overrides; otherwise the cleared map is season-indexed.
    pub fn reset(&self) -> Self {
        if self.has_sources() {
            return Self::BySeason(Vec::new());
        }
        match self {
            Self::BySeason(_) => Self::BySeason(Vec::new()),
            Self::ByIndex(_) => Self::ByIndex(Vec::new()),
            Self::ByAbsolute(_) => Self::ByAbsolute(Vec::new()),
        }
    }

    /// The override entry covering `index`, plus any lookup warning.
    fn find(
        &self,
        index: &EpisodeIndex,
    ) -> (Option<(&Option<String>, &Option<SourceOverride>)>, Vec<LabelWarning>) {
        match self {
            Self::BySeason(entries) => (
                entries
                    .iter()
                    .find(|e| e.key == index.season_number)
                    .map(|e| (&e.label, &e.source)),
                Vec::new(),
            ),
            Self::ByIndex(entries) => (
                entries
                    .iter()
                    .find(|e| e.key.contains(index.season_number, index.episode_number))
                    .map(|e| (&e.label, &e.source)),
                Vec::new(),
            ),
            Self::ByAbsolute(entries) => {
                let mut warnings = Vec::new();
                let absolute = index.absolute_number.unwrap_or_else(|| {
                    warnings.push(LabelWarning::AbsoluteNumberMissing {
                        episode_number: index.episode_number,
                    });
                    index.episode_number
                });
                let found = entries
                    .iter()
                    .find(|e| e.key.contains(absolute))
                    .map(|e| (&e.label, &e.source));
                (found, warnings)
            }
        }
    }

    /// Resolve the season label for `index`, falling back to the generic
    /// season label when no override applies.
    pub fn label_for(
        &self,
        index: &EpisodeIndex,
        extras: &Map<String, Value>,
    ) -> Result<ResolvedLabel, CoreError> {
        let (found, warnings) = self.find(index);
        for warning in &warnings {
            tracing::warn!(?warning, "Label lookup fell back to the episode number");
        }
        let override_label = found.and_then(|(label, _)| label.as_deref());
        let (template, from_override) = match override_label {
            Some(label) => (label.to_string(), true),
            None => (generic_season_label(index.season_number), false),
        };
        Ok(ResolvedLabel {
            text: substitute(&template, index, extras)?,
            from_override,
            warnings,
        })
    }

    /// Manual source override for `index`, if one was declared.
    pub fn source_for(&self, index: &EpisodeIndex) -> Option<SourceOverride> {
        self.find(index).0.and_then(|(_, source)| source.clone())
    }
}

/// Free-function form of [`LabelMap::label_for`].
pub fn label_for(
    index: &EpisodeIndex,
    map: &LabelMap,
    extras: &Map<String, Value>,
) -> Result<ResolvedLabel, CoreError> {
    map.label_for(index, extras)
}

fn build_entries<K: PartialEq + Clone>(
    labels: &[(String, String)],
    sources: &[(String, String)],
    parse: fn(&str) -> Result<K, CoreError>,
    applies: impl Fn(&str) -> AppliesTo,
    skipped: &mut Vec<CoreError>,
) -> Vec<LabelEntry<K>> {
    let mut entries: Vec<LabelEntry<K>> = Vec::new();
    for (raw_key, label) in labels {
        match parse(raw_key) {
            Ok(key) => entries.push(LabelEntry {
                key,
                label: Some(label.clone()),
                source: None,
            }),
            Err(e) => skipped.push(e),
        }
    }
    for (raw_key, path) in sources {
        let key = match parse(raw_key) {
            Ok(key) => key,
            Err(e) => {
                skipped.push(e);
                continue;
            }
        };
        let source = SourceOverride {
            path: path.clone(),
            applies_to: applies(raw_key),
        };
        match entries.iter_mut().find(|e| e.key == key) {
            Some(entry) => entry.source = Some(source),
            None => entries.push(LabelEntry {
                key: key.clone(),
                label: None,
                source: Some(source),
            }),
        }
    }
    entries
}

// ---------------------------------------------------------------------------
// Season title range table
// ---------------------------------------------------------------------------

/// One parsed key of the season title table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangeKey {
    Absolute(AbsoluteRange),
    Index(IndexRange),
    Season(i32),
}

impl RangeKey {
    pub fn parse(key: &str) -> Result<Self, CoreError> {
        let trimmed = key.trim();
        if looks_like_index_range(trimmed) {
            parse_index_range(trimmed).map(Self::Index)
        } else if ABSOLUTE_RANGE_RE.is_match(trimmed) {
            parse_absolute_range(trimmed).map(Self::Absolute)
        } else {
            parse_season(trimmed).map(Self::Season)
        }
    }

    pub fn matches(&self, index: &EpisodeIndex) -> bool {
        match self {
            Self::Absolute(range) => index.absolute_number.is_some_and(|a| range.contains(a)),
            Self::Index(range) => range.contains(index.season_number, index.episode_number),
            Self::Season(season) => *season == index.season_number,
        }
    }
}

/// Season title table with mixed key syntaxes. Later declarations are
/// checked first; the first match wins.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SeasonTitleRanges {
    entries: Vec<(RangeKey, String)>,
    skipped: Vec<String>,
}

impl SeasonTitleRanges {
    /// Parse `(key, title)` pairs in declaration order. Bad keys are logged
    /// and skipped.
    pub fn parse(pairs: &[(String, String)]) -> Self {
        let mut entries = Vec::with_capacity(pairs.len());
        let mut skipped = Vec::new();
        for (key, title) in pairs {
            match RangeKey::parse(key) {
                Ok(range) => entries.push((range, title.clone())),
                Err(e) => {
                    tracing::warn!(error = %e, "Skipping season title range");
                    skipped.push(key.clone());
                }
            }
        }
        entries.reverse();
        Self { entries, skipped }
    }

    pub fn title_for(&self, index: &EpisodeIndex) -> Option<&str> {
        self.entries
            .iter()
            .find(|(range, _)| range.matches(index))
            .map(|(_, title)| title.as_str())
    }

    /// Raw keys that failed to parse.
    pub fn skipped(&self) -> &[String] {
        &self.skipped
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Ordered (de)serialization of JSON objects as pair lists
// ---------------------------------------------------------------------------

/// Serde adapter keeping a JSON object's member order as `Vec<(String, String)>`.
pub mod ordered_pairs {
    use std::fmt;

    use serde::de::{MapAccess, Visitor};
    use serde::ser::SerializeMap;
    use serde::{Deserializer, Serializer};

    pub fn serialize<S: Serializer>(
        pairs: &[(String, String)],
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(pairs.len()))?;
        for (k, v) in pairs {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Vec<(String, String)>, D::Error> {
        struct PairVisitor;

        impl<'de> Visitor<'de> for PairVisitor {
            type Value = Vec<(String, String)>;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a map of string keys to string values")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
                let mut pairs = Vec::with_capacity(access.size_hint().unwrap_or(0));
                while let Some((k, v)) = access.next_entry::<String, String>()? {
                    pairs.push((k, v));
                }
                Ok(pairs)
            }
        }

        deserializer.deserialize_map(PairVisitor)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
