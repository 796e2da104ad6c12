//! Element categories - the fixed set of world-building record kinds

use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// The kind of world-building record an element belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Place,
    Culture,
    Rule,
    HistoryLegend,
    MagicTechnology,
    GeographyEnvironment,
    FreeField,
    Worldmap,
    Setting,
    Character,
}

impl Category {
    pub const ALL: [Category; 10] = [
        Category::Place,
        Category::Culture,
        Category::Rule,
        Category::HistoryLegend,
        Category::MagicTechnology,
        Category::GeographyEnvironment,
        Category::FreeField,
        Category::Worldmap,
        Category::Setting,
        Category::Character,
    ];

    /// Wire name, identical to the serde representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Place => "place",
            Self::Culture => "culture",
            Self::Rule => "rule",
            Self::HistoryLegend => "history_legend",
            Self::MagicTechnology => "magic_technology",
            Self::GeographyEnvironment => "geography_environment",
            Self::FreeField => "free_field",
            Self::Worldmap => "worldmap",
            Self::Setting => "setting",
            Self::Character => "character",
        }
    }

    /// Human-facing name used in prompts
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Place => "場所",
            Self::Culture => "文化",
            Self::Rule => "ルール",
            Self::HistoryLegend => "歴史・伝説",
            Self::MagicTechnology => "魔法・技術",
            Self::GeographyEnvironment => "地理・環境",
            Self::FreeField => "自由項目",
            Self::Worldmap => "世界地図",
            Self::Setting => "世界観設定",
            Self::Character => "キャラクター",
        }
    }

    /// Resolve loose spellings produced by a model or a client.
    ///
    /// Accepts the wire name, camelCase and kebab-case variants, a few short
    /// English aliases and the Japanese display names.
    pub fn from_alias(value: &str) -> Option<Self> {
        let normalized: String = value
            .trim()
            .chars()
            .filter(|c| !matches!(c, '_' | '-' | ' ' | '・'))
            .flat_map(char::to_lowercase)
            .collect();

        let category = match normalized.as_str() {
            "place" | "places" | "location" | "場所" => Self::Place,
            "culture" | "cultures" | "文化" => Self::Culture,
            "rule" | "rules" | "ルール" | "法則" => Self::Rule,
            "historylegend" | "history" | "legend" | "歴史" | "伝説" | "歴史伝説" => {
                Self::HistoryLegend
            }
            "magictechnology" | "magic" | "technology" | "魔法" | "技術" | "魔法技術" => {
                Self::MagicTechnology
            }
            "geographyenvironment" | "geography" | "environment" | "地理" | "環境"
            | "地理環境" => Self::GeographyEnvironment,
            "freefield" | "free" | "自由項目" => Self::FreeField,
            "worldmap" | "map" | "世界地図" | "地図" => Self::Worldmap,
            "setting" | "settings" | "worldsetting" | "世界観" | "世界観設定" => Self::Setting,
            "character" | "characters" | "キャラクター" | "登場人物" => Self::Character,
            _ => return None,
        };
        Some(category)
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown category: {0}")]
pub struct UnknownCategory(pub String);

impl FromStr for Category {
    type Err = UnknownCategory;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_alias(s).ok_or_else(|| UnknownCategory(s.to_string()))
    }
}
