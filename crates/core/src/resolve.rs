//! Effective configuration for one episode.
//!
//! Layer order, lowest to highest: card type font defaults, global defaults,
//! the selected template, series overrides, episode overrides, then series
//! and episode extras. The card type is read from a first merge without its
//! own defaults, then the final merge includes them.

use std::collections::BTreeMap;

use serde_json::Map;

use crate::card_type::{self, CardTypeProfile};
use crate::error::CoreError;
use crate::facts::{EntityFacts, Episode, Series};
use crate::settings::{merge, merge_traced, ConfigLayer, EffectiveConfig, LayerSource};
use crate::template::{select_tiered, TemplateTier, TemplateTiers};
use crate::types::DbId;

/// Key naming the card type in every layer.
pub const CARD_TYPE_KEY: &str = "card_type";

/// Merged configuration plus how it was derived.
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub config: EffectiveConfig,
    pub profile: &'static CardTypeProfile,
    /// `(tier, template id)` of the selected template, if any.
    pub template: Option<(TemplateTier, DbId)>,
    /// Which layer supplied each key.
    pub origins: BTreeMap<String, LayerSource>,
}

/// Series extras overlaid by episode extras, as one flat layer.
pub fn extras_layer(series: &Series, episode: &Episode) -> ConfigLayer {
    let mut combined = Map::new();
    for (k, v) in series.extras.iter().chain(episode.extras.iter()) {
        combined.insert(k.clone(), v.clone());
    }
    ConfigLayer::from_map(LayerSource::Extras, &combined)
}

/// Series extras overlaid by episode extras, unset entries dropped.
pub fn combined_extras(series: &Series, episode: &Episode) -> Map<String, serde_json::Value> {
    extras_layer(series, episode)
        .values()
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}

/// Select the template and merge every layer for `episode`.
pub fn resolve_config(
    series: &Series,
    episode: &Episode,
    tiers: &TemplateTiers,
    global_defaults: &ConfigLayer,
) -> Result<ResolvedConfig, CoreError> {
    let facts = EntityFacts::for_episode(series, episode);
    let selection = select_tiered(&facts, tiers);
    if let Some(sel) = &selection {
        tracing::debug!(
            episode_id = episode.id,
            template_id = sel.template.id,
            tier = ?sel.tier,
            "Selected template"
        );
    }

    let mut layers = vec![global_defaults.clone()];
    if let Some(sel) = &selection {
        layers.push(sel.template.layer());
    }
    layers.push(ConfigLayer::from_map(LayerSource::Series, &series.overrides));
    layers.push(ConfigLayer::from_map(LayerSource::Episode, &episode.overrides));
    layers.push(extras_layer(series, episode));

    let identifier = merge(&layers).require_str(CARD_TYPE_KEY)?.to_string();
    let profile = card_type::lookup(&identifier)?;

    layers.insert(0, profile.defaults_layer());
    let (config, origins) = merge_traced(&layers);

    Ok(ResolvedConfig {
        config,
        profile,
        template: selection.map(|s| (s.tier, s.template.id)),
        origins,
    })
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;
    use crate::filter::FilterCondition;
    use crate::template::TemplateCandidate;
    use serde_json::json;

    fn series() -> Series {
        serde_json::from_value(json!({
            "id": 1,
            "name": "Severance",
            "year": 2022,
            "overrides": {"font_color": "#AAFFAA", "blur": null},
            "extras": {"separator": "-"}
        }))
        .unwrap()
    }

    fn episode() -> Episode {
        serde_json::from_value(json!({
            "id": 11,
            "series_id": 1,
            "season_number": 1,
            "episode_number": 2,
            "title": "Half Loop",
            "watched": false,
            "overrides": {"font_size": 1.4},
            "extras": {"separator": "|"}
        }))
        .unwrap()
    }

    fn defaults() -> ConfigLayer {
        ConfigLayer::new(LayerSource::GlobalDefaults)
            .with("card_type", "standard")
            .with("blur", true)
            .with("card_directory", "/cards")
    }

    fn unwatched_template() -> TemplateCandidate {
        TemplateCandidate {
            id: 5,
            name: "Unwatched".into(),
            filters: vec![FilterCondition::new("watched", "is false", None)],
            settings: json!({"blur": false, "card_type": "anime", "font_color": "#000000"})
                .as_object()
                .cloned()
                .unwrap(),
        }
    }

    #[test]
    fn layers_apply_in_order() {
        let tiers = TemplateTiers {
            global: vec![unwatched_template()],
            ..Default::default()
        };
        let resolved = resolve_config(&series(), &episode(), &tiers, &defaults()).unwrap();
        let cfg = &resolved.config;

        assert_eq!(resolved.profile.identifier, "anime");
        assert_eq!(resolved.template, Some((TemplateTier::Global, 5)));
        // Template beats defaults, series beats template.
        assert_eq!(cfg.bool("blur"), Some(false));
        assert_eq!(cfg.str("font_color"), Some("#AAFFAA"));
        assert_eq!(cfg.float("font_size"), Some(1.4));
        // Episode extras beat series extras.
        assert_eq!(cfg.str("separator"), Some("|"));
        // Card type defaults fill what nobody set.
        assert_eq!(cfg.str("font_file"), Some("fonts/Flanker Griffo.otf"));
        assert_eq!(resolved.origins["font_file"], LayerSource::GlobalDefaults);
        assert_eq!(resolved.origins["separator"], LayerSource::Extras);
    }

    #[test]
    fn missing_card_type_is_unresolved() {
        let defaults = ConfigLayer::new(LayerSource::GlobalDefaults);
        let err =
            resolve_config(&series(), &episode(), &TemplateTiers::default(), &defaults).unwrap_err();
        assert_matches!(err, CoreError::UnresolvedAttribute(ref k) if k == "card_type");
    }

    #[test]
    fn unknown_card_type_is_reported() {
        let defaults = ConfigLayer::new(LayerSource::GlobalDefaults).with("card_type", "hologram");
        let err =
            resolve_config(&series(), &episode(), &TemplateTiers::default(), &defaults).unwrap_err();
        assert_matches!(err, CoreError::UnknownCardType(_));
    }

    #[test]
    fn extras_combine_with_episode_priority() {
        let extras = combined_extras(&series(), &episode());
        assert_eq!(extras["separator"], json!("|"));
    }
}
