//! Category field schemas
//!
//! Every category owns a fixed table of optional attributes. Each entry maps
//! the attribute name stored on an element to the labels a writer (or a model)
//! uses for it in free text, and says whether the value is a single text or a
//! list of short items.

use serde::{Deserialize, Serialize};

use super::Category;

/// Labels that resolve an element's name in every category
pub const NAME_LABELS: &[&str] = &["名前", "名称", "name", "title"];

/// Shape of a field value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Text,
    List,
}

/// One attribute of a category schema
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSpec {
    /// Attribute name as stored on the element (camelCase)
    pub field: &'static str,
    /// Labels recognised at line starts, first one is canonical
    pub labels: &'static [&'static str],
    pub kind: FieldKind,
}

impl FieldSpec {
    const fn text(field: &'static str, labels: &'static [&'static str]) -> Self {
        Self {
            field,
            labels,
            kind: FieldKind::Text,
        }
    }

    const fn list(field: &'static str, labels: &'static [&'static str]) -> Self {
        Self {
            field,
            labels,
            kind: FieldKind::List,
        }
    }

    /// Empty value of the right shape
    pub fn empty_value(&self) -> FieldValue {
        match self.kind {
            FieldKind::Text => FieldValue::Text(String::new()),
            FieldKind::List => FieldValue::List(Vec::new()),
        }
    }

    /// The canonical label used when prompting for this field
    pub fn canonical_label(&self) -> &'static str {
        self.labels[0]
    }
}

/// A field value: either free text or a list of items
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Text(String),
    List(Vec<String>),
}

impl FieldValue {
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Text(text) => text.trim().is_empty(),
            Self::List(items) => items.iter().all(|item| item.trim().is_empty()),
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            Self::List(_) => None,
        }
    }
}

const DESCRIPTION: FieldSpec = FieldSpec::text("description", &["説明", "概要", "description"]);

const PLACE: &[FieldSpec] = &[
    DESCRIPTION,
    FieldSpec::text("location", &["場所", "所在地", "位置", "location"]),
    FieldSpec::text("population", &["人口", "population"]),
    FieldSpec::list("features", &["特徴", "features"]),
    FieldSpec::text("history", &["歴史", "history"]),
    FieldSpec::text("importance", &["重要性", "物語での重要性", "importance"]),
];

const CULTURE: &[FieldSpec] = &[
    DESCRIPTION,
    FieldSpec::text("socialStructure", &["社会構造", "social structure", "socialStructure"]),
    FieldSpec::text("religion", &["宗教", "religion"]),
    FieldSpec::text("language", &["言語", "language"]),
    FieldSpec::text("art", &["芸術", "art"]),
    FieldSpec::text("technology", &["技術", "technology"]),
    FieldSpec::list("customs", &["習慣", "風習", "customs"]),
    FieldSpec::text("values", &["価値観", "values"]),
];

const RULE: &[FieldSpec] = &[
    DESCRIPTION,
    FieldSpec::text("exceptions", &["例外", "exceptions"]),
    FieldSpec::text("origin", &["起源", "由来", "origin"]),
    FieldSpec::text("impact", &["影響", "impact"]),
    FieldSpec::text("limitations", &["制限", "制約", "limitations"]),
];

const HISTORY_LEGEND: &[FieldSpec] = &[
    DESCRIPTION,
    FieldSpec::text("period", &["時代", "時期", "period"]),
    FieldSpec::list(
        "significantEvents",
        &["重要な出来事", "主な出来事", "significant events", "significantEvents"],
    ),
    FieldSpec::text("consequences", &["結果", "影響", "consequences"]),
    FieldSpec::list("relatedCharacters", &["関連人物", "related characters", "relatedCharacters"]),
];

const MAGIC_TECHNOLOGY: &[FieldSpec] = &[
    DESCRIPTION,
    FieldSpec::text("type", &["種類", "分類", "type"]),
    FieldSpec::text("mechanism", &["原理", "仕組み", "mechanism"]),
    FieldSpec::text("limitations", &["制限", "制約", "limitations"]),
    FieldSpec::text("costs", &["代償", "コスト", "costs"]),
    FieldSpec::list("users", &["使用者", "users"]),
];

const GEOGRAPHY_ENVIRONMENT: &[FieldSpec] = &[
    DESCRIPTION,
    FieldSpec::text("climate", &["気候", "climate"]),
    FieldSpec::text("terrain", &["地形", "terrain"]),
    FieldSpec::list("resources", &["資源", "resources"]),
    FieldSpec::text("ecosystem", &["生態系", "ecosystem"]),
];

const FREE_FIELD: &[FieldSpec] = &[
    DESCRIPTION,
    FieldSpec::text("content", &["内容", "content"]),
];

const WORLDMAP: &[FieldSpec] = &[
    DESCRIPTION,
    FieldSpec::list("regions", &["地域", "regions"]),
    FieldSpec::text("scale", &["縮尺", "scale"]),
];

const SETTING: &[FieldSpec] = &[
    DESCRIPTION,
    FieldSpec::text("era", &["時代設定", "時代", "era"]),
    FieldSpec::text("tone", &["雰囲気", "tone"]),
    FieldSpec::list("themes", &["テーマ", "themes"]),
];

const CHARACTER: &[FieldSpec] = &[
    DESCRIPTION,
    FieldSpec::text("role", &["役割", "role"]),
    FieldSpec::text("gender", &["性別", "gender"]),
    FieldSpec::text("age", &["年齢", "age"]),
    FieldSpec::text("personality", &["性格", "personality"]),
    FieldSpec::text("appearance", &["外見", "appearance"]),
    FieldSpec::text("background", &["背景", "経歴", "background"]),
];

impl Category {
    /// The optional attributes elements of this category carry
    pub fn schema(&self) -> &'static [FieldSpec] {
        match self {
            Self::Place => PLACE,
            Self::Culture => CULTURE,
            Self::Rule => RULE,
            Self::HistoryLegend => HISTORY_LEGEND,
            Self::MagicTechnology => MAGIC_TECHNOLOGY,
            Self::GeographyEnvironment => GEOGRAPHY_ENVIRONMENT,
            Self::FreeField => FREE_FIELD,
            Self::Worldmap => WORLDMAP,
            Self::Setting => SETTING,
            Self::Character => CHARACTER,
        }
    }

    pub fn field_spec(&self, field: &str) -> Option<&'static FieldSpec> {
        self.schema().iter().find(|spec| spec.field == field)
    }
}
