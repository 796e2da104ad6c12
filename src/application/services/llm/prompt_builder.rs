//! Prompt building functions for generation requests

use crate::domain::entities::Element;
use crate::domain::value_objects::{Category, FieldKind, NAME_LABELS};

/// System prompt for the manifest phase
pub fn build_manifest_system_prompt() -> String {
    let mut prompt = String::new();

    prompt.push_str(
        "You are a world-building assistant for a novelist. Plan the records \
         the writer asked for; do not describe them yet.\n\n",
    );
    prompt.push_str("=== RESPONSE FORMAT ===\n");
    prompt.push_str("Reply with a JSON array only, one object per record:\n");
    prompt.push_str("[{\"name\": \"<record name>\", \"category\": \"<category>\"}]\n\n");
    prompt.push_str("Valid categories:\n");
    for category in Category::ALL {
        prompt.push_str(&format!("  - {} ({})\n", category.as_str(), category.display_name()));
    }

    prompt
}

/// User message for the manifest phase
pub fn build_manifest_user_message(instruction: &str, context: &[Element], max_context: usize) -> String {
    let mut message = String::new();

    message.push_str(&format!("INSTRUCTION: {}\n", instruction.trim()));
    push_context(&mut message, context, max_context);

    message
}

/// System prompt for the detail phase of one category
pub fn build_detail_system_prompt(category: Category) -> String {
    let mut prompt = String::new();

    prompt.push_str(&format!(
        "You are a world-building assistant for a novelist. Write one {} record ({}).\n\n",
        category.display_name(),
        category.as_str()
    ));
    prompt.push_str("=== RESPONSE FORMAT ===\n");
    prompt.push_str("Write each attribute on its own line as `label: value`.\n");
    prompt.push_str(&format!("{}: <record name>\n", NAME_LABELS[0]));
    for spec in category.schema() {
        let hint = match spec.kind {
            FieldKind::Text => "<text>",
            FieldKind::List => "<item>, <item>, ...",
        };
        prompt.push_str(&format!("{}: {}\n", spec.canonical_label(), hint));
    }
    prompt.push_str("\nThe name line is required. Leave out attributes you have nothing for.\n");

    prompt
}

/// User message for the detail phase of one manifest item
pub fn build_detail_user_message(
    item_name: &str,
    category: Category,
    instruction: &str,
    context: &[Element],
    max_context: usize,
) -> String {
    let mut message = String::new();

    message.push_str(&format!("RECORD: {}\n", item_name.trim()));
    message.push_str(&format!("CATEGORY: {}\n", category.display_name()));
    message.push_str(&format!("ORIGINAL INSTRUCTION: {}\n", instruction.trim()));
    push_context(&mut message, context, max_context);

    message
}

/// List existing element names so the model avoids duplicating them
fn push_context(message: &mut String, context: &[Element], max_context: usize) {
    if context.is_empty() || max_context == 0 {
        return;
    }

    message.push_str("\nEXISTING RECORDS (do not duplicate):\n");
    for element in context.iter().take(max_context) {
        let description = element.description();
        if description.is_empty() {
            message.push_str(&format!("  - [{}] {}\n", element.category.display_name(), element.name));
        } else {
            message.push_str(&format!(
                "  - [{}] {}: {}\n",
                element.category.display_name(),
                element.name,
                truncate(description, 80)
            ));
        }
    }
    if context.len() > max_context {
        message.push_str(&format!("  ... and {} more\n", context.len() - max_context));
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    let mut chars = text.chars();
    let head: String = chars.by_ref().take(max_chars).collect();
    if chars.next().is_some() {
        format!("{}…", head)
    } else {
        head
    }
}
