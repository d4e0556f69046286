//! Task categories from item tags and PRD metadata.

use crate::agent::TaskCategory;
use crate::domain::{ChecklistItem, Prd};

const CATEGORY_PREFIX: &str = "Category:";

/// Leading `[tag]` on an item, if it names a category.
fn item_tag(text: &str) -> Option<TaskCategory> {
    let rest = text.trim_start().strip_prefix('[')?;
    let (tag, _) = rest.split_once(']')?;
    TaskCategory::parse(tag)
}

/// PRD-level `Category: <name>` line.
fn prd_category(prd: &Prd) -> Option<TaskCategory> {
    prd.content()
        .lines()
        .filter_map(|line| line.trim().strip_prefix(CATEGORY_PREFIX))
        .find_map(TaskCategory::parse)
}

/// Item tag, then PRD category, then implementation.
pub fn categorize(prd: &Prd, item: &ChecklistItem) -> TaskCategory {
    item_tag(&item.text)
        .or_else(|| prd_category(prd))
        .unwrap_or_default()
}

/// Item text without a recognised category tag.
pub fn task_text(item: &ChecklistItem) -> &str {
    let text = item.text.trim_start();
    if item_tag(text).is_some() {
        if let Some((_, rest)) = text.split_once(']') {
            return rest.trim();
        }
    }
    text
}
