//! Series and episode entities as supplied by the entity store, and the flat
//! fact set that template filter conditions are evaluated against.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::labels::{EpisodeIndex, RawLabelOverrides};
use crate::types::DbId;

/// A series and the configuration it declares for all of its episodes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Series {
    pub id: DbId,
    pub name: String,
    #[serde(default)]
    pub year: Option<i32>,
    #[serde(default)]
    pub library_name: Option<String>,
    /// Templates declared directly on the series, in priority order.
    #[serde(default)]
    pub template_ids: Vec<DbId>,
    /// Series-level overrides (null members are unset).
    #[serde(default)]
    pub overrides: Map<String, Value>,
    #[serde(default)]
    pub extras: Map<String, Value>,
    /// Season title range table, e.g. `{"1": "Pilot Arc", "s2e1-s2e6": "Rising"}`.
    #[serde(default, with = "crate::labels::ordered_pairs")]
    pub season_titles: Vec<(String, String)>,
    /// Manually specified season/episode label overrides.
    #[serde(default)]
    pub label_overrides: RawLabelOverrides,
}

impl Series {
    /// `"Name (Year)"`, or just the name when the year is unknown.
    pub fn full_name(&self) -> String {
        match self.year {
            Some(year) => format!("{} ({year})", self.name),
            None => self.name.clone(),
        }
    }
}

/// A single episode and its own overrides.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Episode {
    pub id: DbId,
    pub series_id: DbId,
    pub season_number: i32,
    pub episode_number: i32,
    #[serde(default)]
    pub absolute_number: Option<i32>,
    pub title: String,
    #[serde(default)]
    pub airdate: Option<NaiveDate>,
    #[serde(default)]
    pub watched: Option<bool>,
    /// Source image chosen by the source-selection collaborator, if any.
    #[serde(default)]
    pub source_file: Option<String>,
    #[serde(default)]
    pub template_ids: Vec<DbId>,
    #[serde(default)]
    pub overrides: Map<String, Value>,
    #[serde(default)]
    pub extras: Map<String, Value>,
}

impl Episode {
    pub fn index(&self) -> EpisodeIndex {
        EpisodeIndex {
            season_number: self.season_number,
            episode_number: self.episode_number,
            absolute_number: self.absolute_number,
        }
    }
}

/// Normalise a filter argument such as `"Episode Number"` to `episode_number`.
pub fn normalize_argument(argument: &str) -> String {
    argument
        .trim()
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("_")
}

/// Flat, read-only view of a series/episode pair for filter evaluation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EntityFacts {
    facts: BTreeMap<String, Value>,
}

impl EntityFacts {
    pub fn for_episode(series: &Series, episode: &Episode) -> Self {
        let mut facts = BTreeMap::new();
        facts.insert("series_name".to_string(), Value::from(series.name.clone()));
        facts.insert("series_year".to_string(), Value::from(series.year));
        facts.insert("series_full_name".to_string(), Value::from(series.full_name()));
        facts.insert(
            "library_name".to_string(),
            Value::from(series.library_name.clone()),
        );
        facts.insert(
            "season_number".to_string(),
            Value::from(episode.season_number),
        );
        facts.insert(
            "episode_number".to_string(),
            Value::from(episode.episode_number),
        );
        facts.insert(
            "absolute_number".to_string(),
            Value::from(episode.absolute_number),
        );
        facts.insert("episode_title".to_string(), Value::from(episode.title.clone()));
        facts.insert(
            "episode_airdate".to_string(),
            Value::from(episode.airdate.map(|d| d.format("%Y-%m-%d").to_string())),
        );
        facts.insert("watched".to_string(), Value::from(episode.watched));

        for (key, value) in &series.extras {
            facts.insert(format!("series_extras.{key}"), value.clone());
        }
        for (key, value) in &episode.extras {
            facts.insert(format!("episode_extras.{key}"), value.clone());
        }

        Self { facts }
    }

    /// Build a fact set directly, mostly for tests and ad-hoc evaluation.
    pub fn from_pairs<I, K>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, Value)>,
        K: AsRef<str>,
    {
        Self {
            facts: pairs
                .into_iter()
                .map(|(k, v)| (normalize_argument(k.as_ref()), v))
                .collect(),
        }
    }

    /// Look up a fact. `None` means the argument is not part of the fact set,
    /// which is different from a present fact whose value is `null`.
    pub fn get(&self, argument: &str) -> Option<&Value> {
        if let Some(v) = self.facts.get(argument) {
            return Some(v);
        }
        self.facts.get(&normalize_argument(argument))
    }
}
