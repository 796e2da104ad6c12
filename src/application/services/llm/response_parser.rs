//! Response parsing - Turns raw model replies into elements and manifests
//!
//! Replies arrive in three shapes: JSON (bare or fenced), one or more record
//! blocks written as `label: value` lines, or degenerate free text. JSON is
//! tried first and, when it decodes, is authoritative. Otherwise the text is
//! split into blocks and fields are read through the category's label table.
//! Only when no block contains a single recognised label does every line
//! become a minimal element.
//!
//! Every element gets a fresh id. Ids found in the reply are never reused.

use std::collections::{BTreeMap, HashMap};

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};
use tracing::debug;

use crate::domain::entities::{Element, GenerationManifestItem};
use crate::domain::value_objects::{Category, FieldKind, FieldSpec, FieldValue, NAME_LABELS};

static SEPARATOR_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*={50,}\s*$").expect("valid separator regex"));
static RECORD_HEADER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*【[^】]+】\s*(?P<rest>.*)$").expect("valid header regex"));
static CODE_FENCE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)```[A-Za-z]*[ \t]*\n(?P<body>.*?)```").expect("valid code fence regex")
});
static BULLET_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*(?:[-*・•]|\d+[.)．]|[（(]\d+[)）])\s*").expect("valid bullet regex")
});
static LABEL_TABLES: Lazy<HashMap<Category, LabelTable>> = Lazy::new(|| {
    Category::ALL
        .iter()
        .map(|category| (*category, LabelTable::build(*category)))
        .collect()
});

const MANIFEST_CATEGORY_KEYS: &[&str] = &["category", "type", "kind", "カテゴリ", "カテゴリー"];
const MANIFEST_WRAPPER_KEYS: &[&str] = &["items", "elements", "manifest", "records"];

/// Errors from the manifest phase
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ManifestParseError {
    #[error("manifest response is not a JSON array or object")]
    Undecodable,
    #[error("empty manifest")]
    Empty,
}

/// Parse a reply into elements of `category`. Never fails: a reply nothing
/// can be read from yields an empty list.
pub fn parse(raw: &str, category: Category) -> Vec<Element> {
    let text = normalize_newlines(raw);
    if text.trim().is_empty() {
        return Vec::new();
    }

    if let Some(values) = decode_json(&text) {
        let elements: Vec<Element> = values
            .iter()
            .filter_map(|value| element_from_json(value, category))
            .collect();
        debug!(%category, count = elements.len(), "Parsed JSON reply");
        return elements;
    }

    let table = label_table(category);
    let mut recognised = false;
    let mut elements = Vec::new();

    for block in split_blocks(&text) {
        let fields = extract_fields(&block, table);
        recognised |= fields.recognised;
        if let Some(element) = fields.into_element(category) {
            elements.push(element);
        }
    }

    if !recognised {
        let elements = elements_from_lines(&text, category);
        debug!(%category, count = elements.len(), "No labels found, fell back to one element per line");
        return elements;
    }

    debug!(%category, count = elements.len(), "Parsed record blocks");
    elements
}

/// Parse the phase-1 reply into manifest items.
///
/// Items without a usable name are skipped, as are items whose category is
/// neither resolvable nor covered by `default_category`.
pub fn parse_manifest(
    raw: &str,
    default_category: Option<Category>,
) -> Result<Vec<GenerationManifestItem>, ManifestParseError> {
    let text = normalize_newlines(raw);
    let mut values = decode_json(&text).ok_or(ManifestParseError::Undecodable)?;

    if let [Value::Object(map)] = values.as_slice() {
        if let Some(items) = unwrap_manifest_object(map) {
            values = items;
        }
    }

    let items: Vec<GenerationManifestItem> = values
        .iter()
        .filter_map(|value| manifest_item(value, default_category))
        .collect();

    if items.is_empty() {
        return Err(ManifestParseError::Empty);
    }
    Ok(items)
}

// ============================================================================
// JSON branch
// ============================================================================

/// Decode the reply as a JSON array or object.
///
/// Candidates, in order: a fenced code block, the whole text, the outermost
/// `[...]` slice and the outermost `{...}` slice. Slices are only accepted
/// when they hold a record, an object with a name key or a manifest wrapper,
/// so prose such as "see [1]" or a `{"tax": 3}` quoted inside a labelled
/// value is not mistaken for data.
fn decode_json(text: &str) -> Option<Vec<Value>> {
    let mut candidates: Vec<(&str, bool)> = Vec::new();
    if let Some(body) = CODE_FENCE_RE
        .captures(text)
        .and_then(|caps| caps.name("body"))
    {
        candidates.push((body.as_str(), false));
    }
    candidates.push((text, false));
    if let Some(slice) = outer_slice(text, '[', ']') {
        candidates.push((slice, true));
    }
    if let Some(slice) = outer_slice(text, '{', '}') {
        candidates.push((slice, true));
    }

    for (candidate, is_slice) in candidates {
        let Ok(value) = serde_json::from_str::<Value>(candidate.trim()) else {
            continue;
        };
        match value {
            Value::Array(items) => {
                if is_slice && !items.iter().any(is_record) {
                    continue;
                }
                return Some(items);
            }
            Value::Object(_) => {
                if is_slice && !is_record(&value) {
                    continue;
                }
                return Some(vec![value]);
            }
            _ => continue,
        }
    }
    None
}

fn is_record(value: &Value) -> bool {
    let Value::Object(map) = value else {
        return false;
    };
    map.keys().any(|key| {
        let key = key.to_lowercase();
        NAME_LABELS.iter().any(|label| label.to_lowercase() == key)
            || MANIFEST_WRAPPER_KEYS.contains(&key.as_str())
    })
}

fn outer_slice(text: &str, open: char, close: char) -> Option<&str> {
    let start = text.find(open)?;
    let end = text.rfind(close)?;
    if end > start {
        Some(&text[start..=end])
    } else {
        None
    }
}

fn element_from_json(value: &Value, category: Category) -> Option<Element> {
    match value {
        Value::Object(map) => element_from_object(map, category),
        Value::String(name) => {
            let name = clean_name(name);
            (!name.is_empty()).then(|| Element::new(name, category))
        }
        _ => None,
    }
}

fn element_from_object(map: &Map<String, Value>, category: Category) -> Option<Element> {
    let mut keys: HashMap<String, &Value> = HashMap::new();
    // Our own wire format nests attributes under "fields"
    if let Some(Value::Object(fields)) = map.get("fields") {
        for (key, value) in fields {
            keys.insert(key.to_lowercase(), value);
        }
    }
    for (key, value) in map {
        keys.insert(key.to_lowercase(), value);
    }

    let name = NAME_LABELS
        .iter()
        .find_map(|label| keys.get(&label.to_lowercase()))
        .map(|value| clean_name(&value_to_text(value)))
        .filter(|name| !name.is_empty())?;

    let mut element = Element::new(name, category);
    for spec in category.schema() {
        let value = json_keys(spec)
            .iter()
            .find_map(|key| keys.get(key))
            .map(|value| match spec.kind {
                FieldKind::Text => FieldValue::Text(value_to_text(value)),
                FieldKind::List => FieldValue::List(value_to_list(value)),
            });
        if let Some(value) = value {
            element.fields.insert(spec.field.to_string(), value);
        }
    }
    Some(element)
}

/// Lower-cased keys a JSON object may use for a field
fn json_keys(spec: &FieldSpec) -> Vec<String> {
    let mut keys = vec![spec.field.to_lowercase(), to_snake_case(spec.field)];
    keys.extend(spec.labels.iter().map(|label| label.to_lowercase()));
    keys
}

fn value_to_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(text) => text.trim().to_string(),
        Value::Array(items) => items
            .iter()
            .map(value_to_text)
            .filter(|item| !item.is_empty())
            .collect::<Vec<_>>()
            .join("\n"),
        other => other.to_string(),
    }
}

fn value_to_list(value: &Value) -> Vec<String> {
    match value {
        Value::Null => Vec::new(),
        Value::Array(items) => items
            .iter()
            .map(value_to_text)
            .filter(|item| !item.is_empty())
            .collect(),
        Value::String(text) => split_list(text),
        other => vec![other.to_string()],
    }
}

fn unwrap_manifest_object(map: &Map<String, Value>) -> Option<Vec<Value>> {
    if NAME_LABELS.iter().any(|label| map.contains_key(*label)) {
        return None;
    }
    MANIFEST_WRAPPER_KEYS.iter().find_map(|key| match map.get(*key) {
        Some(Value::Array(items)) => Some(items.clone()),
        _ => None,
    })
}

fn manifest_item(value: &Value, default_category: Option<Category>) -> Option<GenerationManifestItem> {
    let (name, category) = match value {
        Value::String(name) => (clean_name(name), default_category),
        Value::Object(map) => {
            let name = NAME_LABELS
                .iter()
                .find_map(|label| map.get(*label))
                .map(|value| clean_name(&value_to_text(value)))
                .unwrap_or_default();
            let category = MANIFEST_CATEGORY_KEYS
                .iter()
                .find_map(|key| map.get(*key))
                .and_then(Value::as_str)
                .and_then(Category::from_alias)
                .or(default_category);
            (name, category)
        }
        _ => return None,
    };

    if name.is_empty() {
        return None;
    }
    match category {
        Some(category) => Some(GenerationManifestItem::new(name, category)),
        None => {
            debug!(%name, "Skipping manifest item without a resolvable category");
            None
        }
    }
}

// ============================================================================
// Block branch
// ============================================================================

/// Split the reply into record blocks.
///
/// Strategies are tried in order and the first one producing more than one
/// block wins: separator lines of `=`, `【…】` header lines, then runs of two
/// or more blank lines. Otherwise the whole reply is one block.
fn split_blocks(text: &str) -> Vec<String> {
    let lines: Vec<&str> = text.lines().collect();

    let by_separator = split_at_markers(&lines, |line| {
        SEPARATOR_RE.is_match(line).then_some(None)
    });
    if by_separator.len() > 1 {
        return by_separator;
    }

    let by_header = split_at_markers(&lines, |line| {
        RECORD_HEADER_RE.captures(line).map(|caps| {
            caps.name("rest")
                .map(|rest| rest.as_str().trim())
                .filter(|rest| !rest.is_empty())
                .map(str::to_string)
        })
    });
    if by_header.len() > 1 {
        return by_header;
    }

    let by_blank_runs = split_at_blank_runs(&lines);
    if by_blank_runs.len() > 1 {
        return by_blank_runs;
    }

    vec![text.to_string()]
}

/// Split at marker lines. `marker` returns `None` for ordinary lines and
/// `Some(carry)` for markers, where `carry` is text on the marker line that
/// starts the next block.
fn split_at_markers<F>(lines: &[&str], marker: F) -> Vec<String>
where
    F: Fn(&str) -> Option<Option<String>>,
{
    let mut blocks = Vec::new();
    let mut current: Vec<String> = Vec::new();

    for line in lines {
        match marker(line) {
            Some(carry) => {
                push_block(&mut blocks, &mut current);
                current.extend(carry);
            }
            None => current.push((*line).to_string()),
        }
    }
    push_block(&mut blocks, &mut current);
    blocks
}

fn split_at_blank_runs(lines: &[&str]) -> Vec<String> {
    let mut blocks = Vec::new();
    let mut current: Vec<String> = Vec::new();
    let mut blank_run = 0;

    for line in lines {
        if line.trim().is_empty() {
            blank_run += 1;
            current.push(String::new());
            continue;
        }
        if blank_run >= 2 {
            push_block(&mut blocks, &mut current);
        }
        blank_run = 0;
        current.push((*line).to_string());
    }
    push_block(&mut blocks, &mut current);
    blocks
}

fn push_block(blocks: &mut Vec<String>, current: &mut Vec<String>) {
    let block = current.join("\n");
    current.clear();
    if !block.trim().is_empty() {
        blocks.push(block);
    }
}

#[derive(Debug, Clone, Copy)]
enum FieldTarget {
    Name,
    Field(&'static FieldSpec),
}

/// Recognised labels of one category
struct LabelTable {
    pattern: Regex,
    targets: HashMap<String, FieldTarget>,
}

impl LabelTable {
    fn build(category: Category) -> Self {
        let mut targets = HashMap::new();
        for label in NAME_LABELS {
            targets.insert(label.to_lowercase(), FieldTarget::Name);
        }
        for spec in category.schema() {
            for label in spec.labels {
                targets
                    .entry(label.to_lowercase())
                    .or_insert(FieldTarget::Field(spec));
            }
        }

        // Longest first so that e.g. "時代設定" wins over "時代"
        let mut labels: Vec<&String> = targets.keys().collect();
        labels.sort_by(|a, b| {
            b.chars()
                .count()
                .cmp(&a.chars().count())
                .then_with(|| a.cmp(b))
        });
        let alternation = labels
            .iter()
            .map(|label| regex::escape(label))
            .collect::<Vec<_>>()
            .join("|");

        let pattern = Regex::new(&format!(
            r"(?i)^\s*(?:#+\s*)?(?:[-*・•]\s*)?(?:\*\*)?(?P<label>{alternation})(?:\*\*)?\s*[：:]\s*(?:\*\*)?\s*(?P<value>.*)$"
        ))
        .expect("valid label regex");

        Self { pattern, targets }
    }

    fn match_line(&self, line: &str) -> Option<(FieldTarget, String)> {
        let caps = self.pattern.captures(line)?;
        let label = caps.name("label")?.as_str().to_lowercase();
        let target = *self.targets.get(&label)?;
        let value = caps
            .name("value")
            .map(|m| m.as_str().trim().to_string())
            .unwrap_or_default();
        Some((target, value))
    }
}

fn label_table(category: Category) -> &'static LabelTable {
    &LABEL_TABLES[&category]
}

/// Fields read from one block
#[derive(Debug, Default)]
struct BlockFields {
    name: Option<String>,
    name_overflow: Vec<String>,
    fields: BTreeMap<&'static str, (&'static FieldSpec, String)>,
    recognised: bool,
}

impl BlockFields {
    fn store(&mut self, target: FieldTarget, lines: Vec<String>) {
        let text = lines.join("\n").trim().to_string();
        if text.is_empty() {
            return;
        }
        match target {
            FieldTarget::Name => {
                if self.name.is_some() {
                    return;
                }
                let mut rest = text.lines().map(str::trim).filter(|l| !l.is_empty());
                self.name = rest.next().map(clean_name).filter(|name| !name.is_empty());
                self.name_overflow.extend(rest.map(str::to_string));
            }
            FieldTarget::Field(spec) => {
                self.fields.entry(spec.field).or_insert((spec, text));
            }
        }
    }

    fn into_element(mut self, category: Category) -> Option<Element> {
        let name = self.name.take()?;
        let mut element = Element::new(name, category);

        if !self.name_overflow.is_empty() && !self.fields.contains_key("description") {
            element.fields.insert(
                "description".to_string(),
                FieldValue::Text(self.name_overflow.join("\n")),
            );
        }

        for (field, (spec, text)) in self.fields {
            let value = match spec.kind {
                FieldKind::Text => FieldValue::Text(text),
                FieldKind::List => FieldValue::List(split_list(&text)),
            };
            element.fields.insert(field.to_string(), value);
        }
        Some(element)
    }
}

/// Read `label: value` fields from a block. A value runs across lines until
/// the next recognised label or two consecutive blank lines.
fn extract_fields(block: &str, table: &LabelTable) -> BlockFields {
    let mut out = BlockFields::default();
    let mut current: Option<(FieldTarget, Vec<String>)> = None;
    let mut blank_run = 0;

    for line in block.lines() {
        if let Some((target, value)) = table.match_line(line) {
            if let Some((previous, lines)) = current.take() {
                out.store(previous, lines);
            }
            current = Some((target, vec![value]));
            out.recognised = true;
            blank_run = 0;
            continue;
        }

        if line.trim().is_empty() {
            blank_run += 1;
            if blank_run >= 2 {
                if let Some((previous, lines)) = current.take() {
                    out.store(previous, lines);
                }
            } else if let Some((_, lines)) = current.as_mut() {
                lines.push(String::new());
            }
            continue;
        }

        blank_run = 0;
        if let Some((_, lines)) = current.as_mut() {
            lines.push(line.trim_end().to_string());
        }
    }

    if let Some((previous, lines)) = current.take() {
        out.store(previous, lines);
    }
    out
}

// ============================================================================
// Line fallback
// ============================================================================

/// Lossy last resort: every meaningful line names one element
fn elements_from_lines(text: &str, category: Category) -> Vec<Element> {
    text.lines()
        .filter(|line| !SEPARATOR_RE.is_match(line))
        .filter_map(|line| match RECORD_HEADER_RE.captures(line) {
            Some(caps) => caps.name("rest").map(|rest| rest.as_str().to_string()),
            None => Some(line.to_string()),
        })
        .map(|line| clean_name(&BULLET_RE.replace(&line, "")))
        .filter(|name| !name.is_empty())
        .map(|name| Element::new(name, category))
        .collect()
}

// ============================================================================
// Helpers
// ============================================================================

fn normalize_newlines(raw: &str) -> String {
    raw.replace("\r\n", "\n").replace('\r', "\n")
}

/// Strip Markdown emphasis, quotes and Japanese brackets around a name
fn clean_name(raw: &str) -> String {
    raw.trim()
        .trim_matches(|c: char| {
            matches!(c, '*' | '"' | '\'' | '「' | '」' | '『' | '』' | '`') || c.is_whitespace()
        })
        .to_string()
}

/// Split a list value: one item per line when it spans lines, otherwise on
/// commas and enumeration marks
fn split_list(text: &str) -> Vec<String> {
    let lines: Vec<&str> = text.lines().filter(|l| !l.trim().is_empty()).collect();
    let items: Vec<String> = if lines.len() > 1 {
        lines
            .iter()
            .map(|line| BULLET_RE.replace(line, "").trim().to_string())
            .collect()
    } else {
        text.split(['、', ',', '，', ';', '；'])
            .map(|item| BULLET_RE.replace(item, "").trim().to_string())
            .collect()
    };
    items.into_iter().filter(|item| !item.is_empty()).collect()
}

fn to_snake_case(field: &str) -> String {
    let mut out = String::with_capacity(field.len() + 4);
    for c in field.chars() {
        if c.is_ascii_uppercase() {
            out.push('_');
            out.push(c.to_ascii_lowercase());
        } else {
            out.push(c);
        }
    }
    out
}
