//! PRD documents and their checklist items.
//!
//! A PRD is a markdown file named with a numeric prefix (`01-setup.md`). Its
//! checkbox lines are the units of work. Parsing keeps the original text so a
//! checkbox can be flipped by rewriting a single byte.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Result, TelosError};
use crate::markdown;

const UNCHECKED: &str = "- [ ] ";
const CHECKED_LOWER: &str = "- [x] ";
const CHECKED_UPPER: &str = "- [X] ";

/// Identity of a PRD: its file name within the PRD directory.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PrdRef(pub String);

impl PrdRef {
    pub fn new(file_name: impl Into<String>) -> Self {
        Self(file_name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PrdRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A specific checklist item: PRD plus zero-based index in file order.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ItemRef {
    pub prd: PrdRef,
    pub index: usize,
}

impl ItemRef {
    pub fn new(prd: PrdRef, index: usize) -> Self {
        Self { prd, index }
    }

    /// One-based item number as shown to humans and written to the progress log.
    pub fn number(&self) -> usize {
        self.index + 1
    }
}

impl fmt::Display for ItemRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} item {}", self.prd, self.number())
    }
}

/// One checkbox line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChecklistItem {
    pub text: String,
    pub done: bool,
    /// Byte offset of the character inside `[ ]`
    marker_offset: usize,
}

/// A parsed PRD file.
#[derive(Debug, Clone)]
pub struct Prd {
    pub number: u32,
    pub reference: PrdRef,
    pub title: String,
    pub items: Vec<ChecklistItem>,
    content: String,
}

/// Leading digits of a PRD file name, terminated by `-` or `_`.
pub fn priority_from_file_name(file_name: &str) -> Option<u32> {
    let digits: String = file_name.chars().take_while(|c| c.is_ascii_digit()).collect();
    if digits.is_empty() {
        return None;
    }
    match file_name[digits.len()..].chars().next() {
        Some('-') | Some('_') => digits.parse().ok(),
        _ => None,
    }
}

impl Prd {
    /// Parse a PRD from its file name and full text.
    pub fn parse(file_name: &str, content: impl Into<String>) -> Result<Self> {
        let content = content.into();
        let number = priority_from_file_name(file_name).ok_or_else(|| {
            TelosError::Prd(format!("{}: file name has no numeric priority prefix", file_name))
        })?;

        let stem = file_name.strip_suffix(".md").unwrap_or(file_name);
        let mut title = None;
        let mut items = Vec::new();

        for (start, line) in markdown::lines_with_offsets(&content) {
            if title.is_none() {
                if let Some(heading) = line.strip_prefix("# ") {
                    title = Some(heading.trim().to_string());
                }
            }

            let done = if line.starts_with(UNCHECKED) {
                false
            } else if line.starts_with(CHECKED_LOWER) || line.starts_with(CHECKED_UPPER) {
                true
            } else {
                continue;
            };

            let text = line[UNCHECKED.len()..].trim();
            if text.is_empty() {
                return Err(TelosError::Prd(format!(
                    "{}: empty checklist item at byte {}",
                    file_name, start
                )));
            }

            items.push(ChecklistItem {
                text: text.to_string(),
                done,
                marker_offset: start + 3,
            });
        }

        Ok(Self {
            number,
            reference: PrdRef::new(file_name),
            title: title.unwrap_or_else(|| stem.to_string()),
            items,
            content,
        })
    }

    /// The document text, including any checkbox rewrites.
    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn overview(&self) -> Option<String> {
        markdown::extract_section(&self.content, "Overview").filter(|s| !s.is_empty())
    }

    /// Mark an item done. Returns false when it was already done.
    ///
    /// Only the byte inside the item's `[ ]` changes.
    pub fn mark_done(&mut self, index: usize) -> Result<bool> {
        let item = self.items.get_mut(index).ok_or_else(|| {
            TelosError::Prd(format!("{}: no checklist item {}", self.reference, index + 1))
        })?;

        if item.done {
            return Ok(false);
        }

        let offset = item.marker_offset;
        if self.content.get(offset..offset + 1) != Some(" ") {
            return Err(TelosError::Prd(format!(
                "{}: checkbox for item {} moved since parsing",
                self.reference,
                index + 1
            )));
        }

        self.content.replace_range(offset..offset + 1, "x");
        item.done = true;
        Ok(true)
    }

    pub fn is_complete(&self) -> bool {
        self.items.iter().all(|i| i.done)
    }

    pub fn done_count(&self) -> usize {
        self.items.iter().filter(|i| i.done).count()
    }

    /// Criteria a reviewer must confirm for one item: the item itself, then
    /// the prose bullets of `## Definition of Done`.
    pub fn acceptance_criteria(&self, index: usize) -> Vec<String> {
        let mut criteria = Vec::new();
        if let Some(item) = self.items.get(index) {
            criteria.push(item.text.clone());
        }
        if let Some(dod) = markdown::extract_section(&self.content, "Definition of Done") {
            criteria.extend(markdown::bullets(&dod));
        }
        criteria
    }

    /// Title, overview and checklist with the target item marked.
    pub fn excerpt(&self, target: usize) -> String {
        let mut out = format!("# {} ({})\n\n", self.title, self.reference);

        if let Some(overview) = self.overview() {
            out.push_str("## Overview\n\n");
            out.push_str(&overview);
            out.push_str("\n\n");
        }

        out.push_str("## Checklist\n\n");
        for (i, item) in self.items.iter().enumerate() {
            let mark = if item.done { "x" } else { " " };
            let pointer = if i == target { "  <-- current task" } else { "" };
            out.push_str(&format!("- [{}] {}{}\n", mark, item.text, pointer));
        }
        out
    }
}

/// All PRDs of a build in priority order.
#[derive(Debug, Clone, Default)]
pub struct PrdSet {
    prds: Vec<Prd>,
}

impl PrdSet {
    /// Build a set from parsed PRDs, ordering by prefix then file name.
    pub fn new(mut prds: Vec<Prd>) -> Self {
        prds.sort_by(|a, b| a.number.cmp(&b.number).then_with(|| a.reference.cmp(&b.reference)));
        Self { prds }
    }

    pub fn prds(&self) -> &[Prd] {
        &self.prds
    }

    pub fn is_empty(&self) -> bool {
        self.prds.is_empty()
    }

    pub fn get(&self, prd: &PrdRef) -> Option<&Prd> {
        self.prds.iter().find(|p| &p.reference == prd)
    }

    pub fn get_mut(&mut self, prd: &PrdRef) -> Option<&mut Prd> {
        self.prds.iter_mut().find(|p| &p.reference == prd)
    }

    pub fn item(&self, item: &ItemRef) -> Option<(&Prd, &ChecklistItem)> {
        let prd = self.get(&item.prd)?;
        prd.items.get(item.index).map(|i| (prd, i))
    }

    /// First unchecked item: lowest PRD number, then lowest item index.
    pub fn first_open(&self) -> Option<ItemRef> {
        self.prds.iter().find_map(|prd| {
            prd.items
                .iter()
                .position(|i| !i.done)
                .map(|index| ItemRef::new(prd.reference.clone(), index))
        })
    }

    pub fn all_done(&self) -> bool {
        self.prds.iter().all(Prd::is_complete)
    }

    /// (done, total) across every PRD.
    pub fn counts(&self) -> (usize, usize) {
        self.prds.iter().fold((0, 0), |(done, total), prd| {
            (done + prd.done_count(), total + prd.items.len())
        })
    }

    pub fn mark_done(&mut self, item: &ItemRef) -> Result<bool> {
        let prd = self
            .get_mut(&item.prd)
            .ok_or_else(|| TelosError::Prd(format!("unknown PRD {}", item.prd)))?;
        prd.mark_done(item.index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SETUP: &str = "# Project Setup\n\n## Overview\n\nBootstrap the repo.\n\n## Tasks\n\n- [ ] Create Cargo workspace\n- [x] Add CI\n- [ ] Write README\n\n## Definition of Done\n\n- Tests pass in CI\n";

    #[test]
    fn test_priority_from_file_name() {
        assert_eq!(priority_from_file_name("01-setup.md"), Some(1));
        assert_eq!(priority_from_file_name("12_api.md"), Some(12));
        assert_eq!(priority_from_file_name("README.md"), None);
        assert_eq!(priority_from_file_name("2024.md"), None);
    }

    #[test]
    fn test_parse_items_and_title() {
        let prd = Prd::parse("01-setup.md", SETUP).unwrap();
        assert_eq!(prd.number, 1);
        assert_eq!(prd.title, "Project Setup");
        assert_eq!(prd.items.len(), 3);
        assert_eq!(prd.items[0].text, "Create Cargo workspace");
        assert!(!prd.items[0].done);
        assert!(prd.items[1].done);
        assert_eq!(prd.overview().as_deref(), Some("Bootstrap the repo."));
    }

    #[test]
    fn test_title_falls_back_to_stem() {
        let prd = Prd::parse("03-misc.md", "- [ ] one\n").unwrap();
        assert_eq!(prd.title, "03-misc");
    }

    #[test]
    fn test_indented_checkbox_is_not_an_item() {
        let prd = Prd::parse("01-a.md", "  - [ ] nested\n- [ ] top\n").unwrap();
        assert_eq!(prd.items.len(), 1);
        assert_eq!(prd.items[0].text, "top");
    }

    #[test]
    fn test_empty_item_is_an_error() {
        assert!(Prd::parse("01-a.md", "- [ ] \n").is_err());
    }

    #[test]
    fn test_mark_done_rewrites_single_byte() {
        let mut prd = Prd::parse("01-setup.md", SETUP).unwrap();
        assert!(prd.mark_done(2).unwrap());

        let expected = SETUP.replace("- [ ] Write README", "- [x] Write README");
        assert_eq!(prd.content(), expected);
        assert!(prd.items[2].done);

        let reparsed = Prd::parse("01-setup.md", prd.content()).unwrap();
        assert!(reparsed.items[2].done);
        assert!(!reparsed.items[0].done);
    }

    #[test]
    fn test_mark_done_is_idempotent() {
        let mut prd = Prd::parse("01-setup.md", SETUP).unwrap();
        assert!(!prd.mark_done(1).unwrap());
        assert_eq!(prd.content(), SETUP);
    }

    #[test]
    fn test_mark_done_out_of_range() {
        let mut prd = Prd::parse("01-setup.md", SETUP).unwrap();
        assert!(prd.mark_done(9).is_err());
    }

    #[test]
    fn test_crlf_content_is_preserved() {
        let text = "# T\r\n- [ ] one\r\n- [ ] two\r\n";
        let mut prd = Prd::parse("01-a.md", text).unwrap();
        assert_eq!(prd.items[1].text, "two");
        prd.mark_done(1).unwrap();
        assert_eq!(prd.content(), "# T\r\n- [ ] one\r\n- [x] two\r\n");
    }

    #[test]
    fn test_acceptance_criteria() {
        let prd = Prd::parse("01-setup.md", SETUP).unwrap();
        assert_eq!(
            prd.acceptance_criteria(0),
            vec!["Create Cargo workspace".to_string(), "Tests pass in CI".to_string()]
        );
    }

    #[test]
    fn test_excerpt_marks_target() {
        let prd = Prd::parse("01-setup.md", SETUP).unwrap();
        let excerpt = prd.excerpt(2);
        assert!(excerpt.contains("Bootstrap the repo."));
        assert!(excerpt.contains("- [ ] Write README  <-- current task"));
        assert!(excerpt.contains("- [x] Add CI\n"));
    }

    #[test]
    fn test_set_ordering_and_first_open() {
        let b = Prd::parse("02-b.md", "- [ ] b1\n").unwrap();
        let a = Prd::parse("01-a.md", "- [x] a1\n- [ ] a2\n").unwrap();
        let set = PrdSet::new(vec![b, a]);

        assert_eq!(set.prds()[0].reference.as_str(), "01-a.md");
        assert_eq!(set.first_open(), Some(ItemRef::new(PrdRef::new("01-a.md"), 1)));
        assert_eq!(set.counts(), (1, 3));
        assert!(!set.all_done());
    }

    #[test]
    fn test_set_ties_break_on_file_name() {
        let x = Prd::parse("01-x.md", "- [ ] x\n").unwrap();
        let w = Prd::parse("01-w.md", "- [ ] w\n").unwrap();
        let set = PrdSet::new(vec![x, w]);
        assert_eq!(set.first_open().unwrap().prd.as_str(), "01-w.md");
    }

    #[test]
    fn test_set_mark_done_until_complete() {
        let mut set = PrdSet::new(vec![Prd::parse("01-a.md", "- [ ] a\n").unwrap()]);
        let item = set.first_open().unwrap();
        set.mark_done(&item).unwrap();
        assert!(set.all_done());
        assert_eq!(set.first_open(), None);
    }

    #[test]
    fn test_item_ref_display() {
        let item = ItemRef::new(PrdRef::new("02-b.md"), 0);
        assert_eq!(item.to_string(), "02-b.md item 1");
    }
}
