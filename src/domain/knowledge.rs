//! Cross-iteration knowledge base (`AGENTS.md`).
//!
//! Four named sections of bullet entries. Appends splice a bullet into the
//! right section and leave every other byte alone.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::markdown;

/// Section a knowledge entry belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KnowledgeCategory {
    Conventions,
    Gotchas,
    Patterns,
    KeyDecisions,
}

impl KnowledgeCategory {
    pub const ALL: [KnowledgeCategory; 4] = [
        KnowledgeCategory::Conventions,
        KnowledgeCategory::Gotchas,
        KnowledgeCategory::Patterns,
        KnowledgeCategory::KeyDecisions,
    ];

    /// The `## ` heading used in the document.
    pub fn heading(&self) -> &'static str {
        match self {
            KnowledgeCategory::Conventions => "Conventions",
            KnowledgeCategory::Gotchas => "Gotchas",
            KnowledgeCategory::Patterns => "Patterns",
            KnowledgeCategory::KeyDecisions => "Key Decisions",
        }
    }

    /// Parse the line prefix a subagent uses to report a learning.
    pub fn from_learning_prefix(prefix: &str) -> Option<Self> {
        match prefix.trim().to_ascii_uppercase().as_str() {
            "CONVENTION" => Some(KnowledgeCategory::Conventions),
            "GOTCHA" => Some(KnowledgeCategory::Gotchas),
            "PATTERN" => Some(KnowledgeCategory::Patterns),
            "DECISION" | "KEY DECISION" => Some(KnowledgeCategory::KeyDecisions),
            _ => None,
        }
    }
}

impl fmt::Display for KnowledgeCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.heading())
    }
}

/// A single categorized fact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KnowledgeEntry {
    pub category: KnowledgeCategory,
    pub text: String,
}

impl KnowledgeEntry {
    pub fn new(category: KnowledgeCategory, text: impl Into<String>) -> Self {
        Self {
            category,
            text: text.into(),
        }
    }
}

/// Pull `GOTCHA: ...`-style learnings out of free-text subagent output.
pub fn extract_learnings(output: &str) -> Vec<KnowledgeEntry> {
    output
        .lines()
        .filter_map(|line| {
            let line = line.trim().trim_start_matches("- ").trim_start_matches('*').trim();
            let (prefix, text) = line.split_once(':')?;
            let category = KnowledgeCategory::from_learning_prefix(prefix)?;
            let text = text.trim();
            (!text.is_empty()).then(|| KnowledgeEntry::new(category, text))
        })
        .collect()
}

/// Seed document with the four empty sections.
pub fn template() -> String {
    let mut doc = String::from("# AGENTS.md\n\nShared knowledge for every agent working on this project.\n");
    for category in KnowledgeCategory::ALL {
        doc.push_str(&format!("\n## {}\n", category.heading()));
    }
    doc
}

/// The knowledge document, kept as text.
#[derive(Debug, Clone, Default)]
pub struct KnowledgeBase {
    content: String,
}

impl KnowledgeBase {
    pub fn parse(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
        }
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    /// Bullet entries of one section, in document order.
    pub fn entries(&self, category: KnowledgeCategory) -> Vec<String> {
        markdown::extract_section(&self.content, category.heading())
            .map(|body| markdown::bullets(&body))
            .unwrap_or_default()
    }

    pub fn all_entries(&self) -> Vec<KnowledgeEntry> {
        KnowledgeCategory::ALL
            .iter()
            .flat_map(|c| self.entries(*c).into_iter().map(|t| KnowledgeEntry::new(*c, t)))
            .collect()
    }

    pub fn contains(&self, entry: &KnowledgeEntry) -> bool {
        let wanted = single_line(&entry.text);
        self.entries(entry.category).iter().any(|e| *e == wanted)
    }

    /// Append a bullet under its section. Returns false for duplicates.
    pub fn append(&mut self, entry: &KnowledgeEntry) -> bool {
        if self.contains(entry) {
            return false;
        }
        let bullet = format!("- {}\n", single_line(&entry.text));

        match markdown::find_section(&self.content, entry.category.heading()) {
            Some(span) => {
                let body = &self.content[span.body.clone()];
                let insert_at = span.body.start + body.trim_end().len();
                if insert_at == span.body.start {
                    // Empty section: first bullet goes right under the heading
                    if insert_at > 0 && !self.content[..insert_at].ends_with('\n') {
                        self.content.insert(insert_at, '\n');
                        self.content.insert_str(insert_at + 1, &bullet);
                    } else {
                        self.content.insert_str(insert_at, &bullet);
                    }
                } else {
                    // After the last non-blank line, keeping the trailing blank lines
                    let line_end = self.content[insert_at..]
                        .find('\n')
                        .map(|p| insert_at + p + 1);
                    match line_end {
                        Some(pos) => self.content.insert_str(pos, &bullet),
                        None => {
                            self.content.push('\n');
                            self.content.push_str(&bullet);
                        }
                    }
                }
            }
            None => {
                if !self.content.is_empty() && !self.content.ends_with('\n') {
                    self.content.push('\n');
                }
                self.content
                    .push_str(&format!("\n## {}\n{}", entry.category.heading(), bullet));
            }
        }
        true
    }

    /// Render the sections a delegation should see.
    pub fn render(&self, categories: &[KnowledgeCategory]) -> String {
        let mut out = String::new();
        for category in categories {
            let entries = self.entries(*category);
            if entries.is_empty() {
                continue;
            }
            out.push_str(&format!("### {}\n", category.heading()));
            for entry in entries {
                out.push_str(&format!("- {}\n", entry));
            }
            out.push('\n');
        }
        out
    }
}

fn single_line(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_template_has_all_sections() {
        let doc = template();
        for category in KnowledgeCategory::ALL {
            assert!(markdown::find_section(&doc, category.heading()).is_some());
        }
    }

    #[test]
    fn test_append_into_empty_section() {
        let mut kb = KnowledgeBase::parse(template());
        assert!(kb.append(&KnowledgeEntry::new(KnowledgeCategory::Gotchas, "sqlx needs DATABASE_URL at build time")));

        assert_eq!(kb.entries(KnowledgeCategory::Gotchas), vec!["sqlx needs DATABASE_URL at build time"]);
        assert!(kb.entries(KnowledgeCategory::Conventions).is_empty());
        assert!(kb.content().contains("## Gotchas\n- sqlx needs DATABASE_URL at build time\n\n## Patterns"));
    }

    #[test]
    fn test_append_after_existing_entries_preserves_other_bytes() {
        let doc = "# K\n\n## Conventions\n\n- use snake_case\n\n## Gotchas\n\n- old gotcha\n\nTrailing prose.\n";
        let mut kb = KnowledgeBase::parse(doc);
        kb.append(&KnowledgeEntry::new(KnowledgeCategory::Conventions, "prefer Result over panics"));

        assert_eq!(
            kb.content(),
            "# K\n\n## Conventions\n\n- use snake_case\n- prefer Result over panics\n\n## Gotchas\n\n- old gotcha\n\nTrailing prose.\n"
        );
    }

    #[test]
    fn test_append_to_last_section_without_newline() {
        let mut kb = KnowledgeBase::parse("## Gotchas\n- first");
        kb.append(&KnowledgeEntry::new(KnowledgeCategory::Gotchas, "second"));
        assert_eq!(kb.content(), "## Gotchas\n- first\n- second\n");
    }

    #[test]
    fn test_append_under_trailing_heading_without_newline() {
        let mut kb = KnowledgeBase::parse("## Conventions\n- c\n\n## Gotchas");
        assert!(kb.append(&KnowledgeEntry::new(KnowledgeCategory::Gotchas, "g1")));
        assert_eq!(kb.content(), "## Conventions\n- c\n\n## Gotchas\n- g1\n");
        assert_eq!(kb.entries(KnowledgeCategory::Gotchas), vec!["g1"]);
        assert_eq!(kb.entries(KnowledgeCategory::Conventions), vec!["c"]);
    }

    #[test]
    fn test_append_creates_missing_section() {
        let mut kb = KnowledgeBase::parse("# Notes\n");
        kb.append(&KnowledgeEntry::new(KnowledgeCategory::KeyDecisions, "Postgres over SQLite"));
        assert_eq!(kb.content(), "# Notes\n\n## Key Decisions\n- Postgres over SQLite\n");
        assert_eq!(kb.entries(KnowledgeCategory::KeyDecisions), vec!["Postgres over SQLite"]);
    }

    #[test]
    fn test_duplicate_not_appended() {
        let mut kb = KnowledgeBase::parse(template());
        let entry = KnowledgeEntry::new(KnowledgeCategory::Patterns, "repository per aggregate");
        assert!(kb.append(&entry));
        assert!(!kb.append(&entry));
        assert_eq!(kb.entries(KnowledgeCategory::Patterns).len(), 1);
    }

    #[test]
    fn test_multiline_text_is_flattened() {
        let mut kb = KnowledgeBase::parse(template());
        kb.append(&KnowledgeEntry::new(KnowledgeCategory::Gotchas, "line one\nline two"));
        assert_eq!(kb.entries(KnowledgeCategory::Gotchas), vec!["line one line two"]);
    }

    #[test]
    fn test_extract_learnings() {
        let output = "Done.\nGOTCHA: vite needs --host in docker\n- PATTERN: services in src/services\nDecision: use zod\nnote: ignored\nCONVENTION:\n";
        let learnings = extract_learnings(output);
        assert_eq!(
            learnings,
            vec![
                KnowledgeEntry::new(KnowledgeCategory::Gotchas, "vite needs --host in docker"),
                KnowledgeEntry::new(KnowledgeCategory::Patterns, "services in src/services"),
                KnowledgeEntry::new(KnowledgeCategory::KeyDecisions, "use zod"),
            ]
        );
    }

    #[test]
    fn test_render_selected_sections() {
        let mut kb = KnowledgeBase::parse(template());
        kb.append(&KnowledgeEntry::new(KnowledgeCategory::Conventions, "c1"));
        kb.append(&KnowledgeEntry::new(KnowledgeCategory::Patterns, "p1"));

        let rendered = kb.render(&[KnowledgeCategory::Conventions, KnowledgeCategory::Gotchas]);
        assert_eq!(rendered, "### Conventions\n- c1\n\n");
    }
}
