//! Template selection with strict three-tier precedence.
//!
//! Episode-declared templates shadow series-declared ones, which shadow the
//! global default list. Once a tier has any candidates, lower tiers are never
//! consulted, even when no candidate in that tier matches.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::facts::EntityFacts;
use crate::filter::{all_match, FilterCondition};
use crate::settings::{ConfigLayer, LayerSource};
use crate::types::DbId;

/// A named, conditionally applicable configuration overlay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateCandidate {
    pub id: DbId,
    pub name: String,
    #[serde(default)]
    pub filters: Vec<FilterCondition>,
    /// Overlay values; null members are unset.
    #[serde(default)]
    pub settings: Map<String, Value>,
}

impl TemplateCandidate {
    /// All filters match, or there are none.
    pub fn matches(&self, facts: &EntityFacts) -> bool {
        all_match(&self.filters, facts)
    }

    pub fn layer(&self) -> ConfigLayer {
        ConfigLayer::from_map(LayerSource::Template, &self.settings)
    }
}

/// Which entity a candidate list was declared on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TemplateTier {
    Episode,
    Series,
    Global,
}

/// Scope argument for loading candidates from the entity store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TemplateScope {
    Episode(DbId),
    Series(DbId),
    Global,
}

/// Candidate lists of all three tiers, each in declared order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TemplateTiers {
    pub episode: Vec<TemplateCandidate>,
    pub series: Vec<TemplateCandidate>,
    pub global: Vec<TemplateCandidate>,
}

impl TemplateTiers {
    /// The single tier that governs selection, or `None` if all are empty.
    pub fn applicable(&self) -> Option<(TemplateTier, &[TemplateCandidate])> {
        if !self.episode.is_empty() {
            Some((TemplateTier::Episode, &self.episode))
        } else if !self.series.is_empty() {
            Some((TemplateTier::Series, &self.series))
        } else if !self.global.is_empty() {
            Some((TemplateTier::Global, &self.global))
        } else {
            None
        }
    }
}

/// The template chosen for one episode.
#[derive(Debug, Clone, PartialEq)]
pub struct TemplateSelection<'a> {
    pub tier: TemplateTier,
    pub template: &'a TemplateCandidate,
}

/// First candidate in declared order whose filters all match.
pub fn select<'a>(
    facts: &EntityFacts,
    candidates: &'a [TemplateCandidate],
) -> Option<&'a TemplateCandidate> {
    candidates.iter().find(|c| {
        let matched = c.matches(facts);
        tracing::debug!(template_id = c.id, template = %c.name, matched, "Evaluated template");
        matched
    })
}

/// Select within the governing tier only.
pub fn select_tiered<'a>(
    facts: &EntityFacts,
    tiers: &'a TemplateTiers,
) -> Option<TemplateSelection<'a>> {
    let (tier, candidates) = tiers.applicable()?;
    select(facts, candidates).map(|template| TemplateSelection { tier, template })
}
