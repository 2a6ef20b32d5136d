//! Render description construction and the comparison fingerprint.
//!
//! A [`RenderSpec`] is everything the rendering collaborator needs to draw
//! one card. Its [`Fingerprint`] is a fixed, ordered subset of those fields;
//! a stored fingerprint that differs from the fresh one means the card on
//! disk is stale.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::collaborators::Filesystem;
use crate::error::CoreError;
use crate::facts::{Episode, Series};
use crate::hashing::sha256_hex;
use crate::labels::{
    substitute, EpisodeIndex, LabelMap, LabelWarning, SeasonTitleRanges, SourceOverride,
    DEFAULT_EPISODE_FORMAT,
};
use crate::naming::{self, DEFAULT_CARD_EXTENSION, DEFAULT_FILENAME_FORMAT};
use crate::resolve::{combined_extras, ResolvedConfig};
use crate::title::{format_title, FontCase, LineCharacteristics};

/// Fingerprinted fields, in canonical order.
pub const FINGERPRINT_FIELDS: [&str; 18] = [
    "card_type",
    "title_text",
    "season_text",
    "episode_text",
    "hide_season_text",
    "hide_episode_text",
    "font_file",
    "font_color",
    "font_size",
    "font_kerning",
    "font_stroke_width",
    "font_interline_spacing",
    "font_vertical_shift",
    "blur",
    "grayscale",
    "source_file",
    "card_file",
    "extras",
];

/// Fully resolved description of one card.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RenderSpec {
    pub card_type: String,
    /// Title lines in stacking order.
    pub title_lines: Vec<String>,
    pub title_top_heavy: bool,
    pub season_text: String,
    pub episode_text: String,
    pub hide_season_text: bool,
    pub hide_episode_text: bool,
    pub font_file: String,
    pub font_color: String,
    pub font_size: f64,
    pub font_kerning: f64,
    pub font_stroke_width: f64,
    pub font_interline_spacing: i64,
    pub font_vertical_shift: i64,
    pub blur: bool,
    pub grayscale: bool,
    pub source_file: String,
    pub card_file: String,
    /// Series and episode extras, episode winning.
    pub extras: Map<String, Value>,
    /// Manual source override that supplied `source_file`, if any. Consumed
    /// by source selection, not by rendering.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_override: Option<SourceOverride>,
}

impl RenderSpec {
    pub fn title_text(&self) -> String {
        self.title_lines.join("\n")
    }

    pub fn card_path(&self) -> &Path {
        Path::new(&self.card_file)
    }

    pub fn source_path(&self) -> &Path {
        Path::new(&self.source_file)
    }

    /// The fixed comparison subset. Field order follows
    /// [`FINGERPRINT_FIELDS`].
    pub fn fingerprint(&self) -> Fingerprint {
        let values = [
            json!(self.card_type),
            json!(self.title_text()),
            json!(self.season_text),
            json!(self.episode_text),
            json!(self.hide_season_text),
            json!(self.hide_episode_text),
            json!(self.font_file),
            json!(self.font_color),
            json!(self.font_size),
            json!(self.font_kerning),
            json!(self.font_stroke_width),
            json!(self.font_interline_spacing),
            json!(self.font_vertical_shift),
            json!(self.blur),
            json!(self.grayscale),
            json!(self.source_file),
            json!(self.card_file),
            sorted_object(&self.extras),
        ];
        Fingerprint(
            FINGERPRINT_FIELDS
                .iter()
                .zip(values)
                .map(|(name, value)| (name.to_string(), value))
                .collect(),
        )
    }
}

/// Keys in sorted order, so equal extras always hash the same.
fn sorted_object(map: &Map<String, Value>) -> Value {
    let mut entries: Vec<(&String, &Value)> = map.iter().collect();
    entries.sort_by(|a, b| a.0.cmp(b.0));
    Value::Object(
        entries
            .into_iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect(),
    )
}

// ---------------------------------------------------------------------------
// Fingerprint
// ---------------------------------------------------------------------------

/// Ordered `(field, value)` pairs compared to detect stale cards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(Vec<(String, Value)>);

impl Fingerprint {
    pub fn fields(&self) -> &[(String, Value)] {
        &self.0
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.iter().find(|(k, _)| k == field).map(|(_, v)| v)
    }

    /// SHA-256 of the canonical JSON form.
    pub fn digest(&self) -> String {
        let canonical = Value::Array(self.0.iter().map(|(k, v)| json!([k, v])).collect());
        sha256_hex(canonical.to_string().as_bytes())
    }

    /// Names of fields whose values differ from `other` (including fields
    /// present on only one side).
    pub fn changed_fields<'a>(&'a self, other: &'a Fingerprint) -> Vec<&'a str> {
        let mut changed: Vec<&str> = self
            .0
            .iter()
            .filter(|(k, v)| other.get(k) != Some(v))
            .map(|(k, _)| k.as_str())
            .collect();
        changed.extend(
            other
                .0
                .iter()
                .filter(|(k, _)| self.get(k).is_none())
                .map(|(k, _)| k.as_str()),
        );
        changed
    }
}

// ---------------------------------------------------------------------------
// Construction
// ---------------------------------------------------------------------------

/// A render spec plus the non-fatal observations made while building it.
#[derive(Debug, Clone)]
pub struct ResolvedCard {
    pub spec: RenderSpec,
    pub warnings: Vec<LabelWarning>,
}

/// Placeholder fields for labels and filenames: series and episode names,
/// overlaid by extras.
fn substitution_fields(series: &Series, episode: &Episode) -> Map<String, Value> {
    let mut fields = Map::new();
    fields.insert("series_name".into(), json!(series.name));
    fields.insert("series_full_name".into(), json!(series.full_name()));
    fields.insert("title".into(), json!(episode.title));
    if let Some(year) = series.year {
        fields.insert("year".into(), json!(year));
    }
    fields.extend(combined_extras(series, episode));
    fields
}

/// Line characteristics of the card type, with per-attribute overrides.
fn line_characteristics(resolved: &ResolvedConfig) -> Result<LineCharacteristics, CoreError> {
    let cfg = &resolved.config;
    let base = resolved.profile.lines;
    let width = cfg.int_or("title_max_line_width", base.max_line_width as i64)?;
    let count = cfg.int_or("title_max_line_count", base.max_line_count as i64)?;
    if width < 1 || count < 1 {
        return Err(CoreError::Validation(format!(
            "Title line width and count must be positive, got {width} and {count}"
        )));
    }
    Ok(LineCharacteristics {
        max_line_width: width as usize,
        max_line_count: count as usize,
        top_heavy: cfg.bool_or("title_top_heavy", base.top_heavy)?,
    })
}

fn season_label(
    resolved: &ResolvedConfig,
    series: &Series,
    label_map: &LabelMap,
    index: &EpisodeIndex,
    fields: &Map<String, Value>,
    warnings: &mut Vec<LabelWarning>,
) -> Result<String, CoreError> {
    if let Some(text) = resolved.config.str("season_text") {
        return substitute(text, index, fields);
    }
    let ranges = SeasonTitleRanges::parse(&series.season_titles);
    if let Some(title) = ranges.title_for(index) {
        return substitute(title, index, fields);
    }
    let label = label_map.label_for(index, fields)?;
    warnings.extend(label.warnings);
    Ok(label.text)
}

/// First existing source image among: the episode's own source file, a
/// manual label override, then `<source_directory>/s{S}e{E}.jpg`.
fn select_source(
    episode: &Episode,
    resolved: &ResolvedConfig,
    label_map: &LabelMap,
    fs: &dyn Filesystem,
) -> Result<(String, Option<SourceOverride>), CoreError> {
    let index = episode.index();
    let mut candidates: Vec<(String, Option<SourceOverride>)> = Vec::new();
    if let Some(path) = &episode.source_file {
        candidates.push((path.clone(), None));
    }
    if let Some(source) = label_map.source_for(&index) {
        candidates.push((source.path.clone(), Some(source)));
    }
    if let Some(dir) = resolved.config.str("source_directory") {
        let path = Path::new(dir).join(format!(
            "s{}e{}.jpg",
            index.season_number, index.episode_number
        ));
        candidates.push((path.to_string_lossy().into_owned(), None));
    }

    let first = candidates.first().map(|(p, _)| p.clone());
    match candidates.into_iter().find(|(p, _)| fs.exists(Path::new(p))) {
        Some(found) => Ok(found),
        None => Err(CoreError::MissingSourceImage(first.unwrap_or_else(|| {
            format!("no source image configured for episode {}", episode.id)
        }))),
    }
}

/// Build the render spec for `episode` from its resolved configuration.
///
/// Fails on the first unresolved or invalid input; nothing is rendered or
/// written here.
pub fn build_render_spec(
    series: &Series,
    episode: &Episode,
    resolved: &ResolvedConfig,
    fs: &dyn Filesystem,
) -> Result<ResolvedCard, CoreError> {
    let cfg = &resolved.config;
    let index = episode.index();
    let fields = substitution_fields(series, episode);
    let mut warnings = Vec::new();

    let (label_map, _skipped) = LabelMap::from_raw(&series.label_overrides);

    // -- Title --
    let font_case = match cfg.str("font_case") {
        None => FontCase::default(),
        Some(raw) => FontCase::parse(raw)
            .ok_or_else(|| CoreError::Validation(format!("Unknown font case '{raw}'")))?,
    };
    let empty = Map::new();
    let replacements = cfg.object("font_replacements").unwrap_or(&empty);
    let lines = line_characteristics(resolved)?;
    let title = cfg.str_or("title_text", &episode.title)?;
    let title_lines = format_title(title, replacements, font_case, lines);

    // -- Labels --
    let hide_season_text = cfg.bool_or("hide_season_text", false)?;
    let hide_episode_text = cfg.bool_or("hide_episode_text", false)?;
    let season_text = if hide_season_text {
        String::new()
    } else {
        season_label(resolved, series, &label_map, &index, &fields, &mut warnings)?
    };
    let episode_text = if hide_episode_text {
        String::new()
    } else {
        let format = cfg.str_or("episode_text_format", DEFAULT_EPISODE_FORMAT)?;
        substitute(format, &index, &fields)?
    };

    // -- Files --
    let (source_file, source_override) = select_source(episode, resolved, &label_map, fs)?;
    let card_directory = PathBuf::from(cfg.require_str("card_directory")?);
    let card_file = naming::card_path(
        &card_directory,
        &series.full_name(),
        cfg.str_or("card_filename_format", DEFAULT_FILENAME_FORMAT)?,
        cfg.str_or("card_extension", DEFAULT_CARD_EXTENSION)?,
        &index,
        &fields,
    )?;

    let spec = RenderSpec {
        card_type: resolved.profile.identifier.to_string(),
        title_lines,
        title_top_heavy: lines.top_heavy,
        season_text,
        episode_text,
        hide_season_text,
        hide_episode_text,
        font_file: cfg.require_str("font_file")?.to_string(),
        font_color: cfg.require_str("font_color")?.to_string(),
        font_size: cfg.require_float("font_size")?,
        font_kerning: cfg.float_or("font_kerning", 1.0)?,
        font_stroke_width: cfg.float_or("font_stroke_width", 1.0)?,
        font_interline_spacing: cfg.int_or("font_interline_spacing", 0)?,
        font_vertical_shift: cfg.int_or("font_vertical_shift", 0)?,
        blur: cfg.bool_or("blur", false)?,
        grayscale: cfg.bool_or("grayscale", false)?,
        source_file,
        card_file: card_file.to_string_lossy().into_owned(),
        extras: combined_extras(series, episode),
        source_override,
    };
    Ok(ResolvedCard { spec, warnings })
}
