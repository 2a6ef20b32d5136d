//! Built-in card type profiles.
//!
//! A card type fixes how titles are split and supplies font defaults that
//! sit underneath every configuration layer.

use serde::Serialize;

use crate::error::CoreError;
use crate::settings::{ConfigLayer, LayerSource};
use crate::title::LineCharacteristics;

/// Static description of one card type.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CardTypeProfile {
    pub identifier: &'static str,
    pub lines: LineCharacteristics,
    pub font_file: &'static str,
    pub font_color: &'static str,
    pub font_size: f64,
}

impl CardTypeProfile {
    /// Font defaults as the lowest-priority layer.
    pub fn defaults_layer(&self) -> ConfigLayer {
        ConfigLayer::new(LayerSource::GlobalDefaults)
            .with("font_file", self.font_file)
            .with("font_color", self.font_color)
            .with("font_size", self.font_size)
    }
}

pub const STANDARD: CardTypeProfile = CardTypeProfile {
    identifier: "standard",
    lines: LineCharacteristics {
        max_line_width: 32,
        max_line_count: 3,
        top_heavy: false,
    },
    font_file: "fonts/Sequel-Neue.otf",
    font_color: "#EBEBEB",
    font_size: 1.0,
};

pub const ANIME: CardTypeProfile = CardTypeProfile {
    identifier: "anime",
    lines: LineCharacteristics {
        max_line_width: 25,
        max_line_count: 3,
        top_heavy: false,
    },
    font_file: "fonts/Flanker Griffo.otf",
    font_color: "#EBEBEB",
    font_size: 1.0,
};

pub const OLIVIER: CardTypeProfile = CardTypeProfile {
    identifier: "olivier",
    lines: LineCharacteristics {
        max_line_width: 16,
        max_line_count: 5,
        top_heavy: false,
    },
    font_file: "fonts/Montserrat-Bold.ttf",
    font_color: "white",
    font_size: 1.0,
};

pub const ROMAN_NUMERAL: CardTypeProfile = CardTypeProfile {
    identifier: "roman numeral",
    lines: LineCharacteristics {
        max_line_width: 24,
        max_line_count: 2,
        top_heavy: true,
    },
    font_file: "fonts/flanker-griffo.otf",
    font_color: "white",
    font_size: 1.0,
};

pub const TINTED_FRAME: CardTypeProfile = CardTypeProfile {
    identifier: "tinted frame",
    lines: LineCharacteristics {
        max_line_width: 35,
        max_line_count: 3,
        top_heavy: false,
    },
    font_file: "fonts/Galey Semi Bold.ttf",
    font_color: "white",
    font_size: 1.0,
};

/// Every built-in profile.
pub const BUILTIN_CARD_TYPES: &[CardTypeProfile] =
    &[STANDARD, ANIME, OLIVIER, ROMAN_NUMERAL, TINTED_FRAME];

fn normalize(identifier: &str) -> String {
    identifier
        .trim()
        .to_lowercase()
        .replace(['_', '-'], " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Find a built-in profile; `"Roman_Numeral"` and `"roman-numeral"` are the
/// same card type.
pub fn lookup(identifier: &str) -> Result<&'static CardTypeProfile, CoreError> {
    let wanted = normalize(identifier);
    BUILTIN_CARD_TYPES
        .iter()
        .find(|p| p.identifier == wanted)
        .ok_or_else(|| CoreError::UnknownCardType(identifier.to_string()))
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn lookup_normalises_identifier() {
        assert_eq!(lookup("Standard").unwrap().identifier, "standard");
        assert_eq!(lookup("roman_numeral").unwrap().identifier, "roman numeral");
        assert_eq!(lookup(" Tinted-Frame ").unwrap().identifier, "tinted frame");
    }

    #[test]
    fn unknown_card_type_is_an_error() {
        assert_matches!(
            lookup("hologram"),
            Err(CoreError::UnknownCardType(ref id)) if id == "hologram"
        );
    }

    #[test]
    fn identifiers_are_unique() {
        for (i, a) in BUILTIN_CARD_TYPES.iter().enumerate() {
            for b in &BUILTIN_CARD_TYPES[i + 1..] {
                assert_ne!(a.identifier, b.identifier);
            }
        }
    }

    #[test]
    fn defaults_layer_carries_font() {
        let layer = ANIME.defaults_layer();
        assert_eq!(
            layer.get("font_file").and_then(|s| s.as_value()),
            Some(&serde_json::json!("fonts/Flanker Griffo.otf"))
        );
    }
}
