//! Append-only progress log.
//!
//! One entry per loop iteration, numbered consecutively. The in-memory log
//! refuses appends that would leave a gap or reorder entries; the text form
//! is the `progress.txt` file shared with subagents.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use super::prd::{ItemRef, PrdRef};
use super::verdict::VerdictKind;
use crate::error::{Result, TelosError};

pub const PROGRESS_HEADER: &str = "# Progress Log\n";

/// Immutable record of one iteration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressEntry {
    pub iteration: u32,
    pub task: String,
    pub item: ItemRef,
    pub verdict: VerdictKind,
    pub details: String,
    pub timestamp: DateTime<Utc>,
    /// The loop stopped here for a human; later runs start a fresh streak
    #[serde(default)]
    pub handoff: bool,
}

impl ProgressEntry {
    pub fn new(iteration: u32, item: ItemRef, task: impl Into<String>, verdict: VerdictKind, details: impl Into<String>) -> Self {
        Self {
            iteration,
            task: task.into(),
            item,
            verdict,
            details: details.into(),
            timestamp: Utc::now(),
            handoff: false,
        }
    }

    pub fn with_handoff(mut self) -> Self {
        self.handoff = true;
        self
    }

    /// Render as a `## Iteration N` block.
    pub fn to_block(&self) -> String {
        let mut block = format!(
            "\n## Iteration {}\n- Timestamp: {}\n- PRD: {}\n- Item: {}\n- Task: {}\n- Verdict: {}\n",
            self.iteration,
            self.timestamp.to_rfc3339_opts(SecondsFormat::Secs, true),
            self.item.prd,
            self.item.number(),
            single_line(&self.task),
            self.verdict,
        );
        if self.handoff {
            block.push_str("- Handoff: yes\n");
        }

        let mut lines = self.details.lines();
        block.push_str("- Details: ");
        block.push_str(lines.next().unwrap_or(""));
        block.push('\n');
        for line in lines {
            block.push_str("  ");
            block.push_str(line);
            block.push('\n');
        }
        block
    }
}

fn single_line(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Ordered, append-only sequence of progress entries.
#[derive(Debug, Clone, Default)]
pub struct ProgressLog {
    entries: Vec<ProgressEntry>,
}

impl ProgressLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> &[ProgressEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn last(&self) -> Option<&ProgressEntry> {
        self.entries.last()
    }

    /// Number the next appended entry must carry.
    pub fn next_iteration(&self) -> u32 {
        self.entries.last().map(|e| e.iteration + 1).unwrap_or(1)
    }

    /// Append an entry; its iteration must be exactly `next_iteration()`.
    pub fn append(&mut self, entry: ProgressEntry) -> Result<()> {
        let expected = self.next_iteration();
        if entry.iteration != expected {
            return Err(TelosError::ProgressLog(format!(
                "expected iteration {}, got {}",
                expected, entry.iteration
            )));
        }
        self.entries.push(entry);
        Ok(())
    }

    /// Consecutive denials at the tail of the log. A handoff ends the streak.
    pub fn denial_streak(&self) -> u32 {
        self.entries
            .iter()
            .rev()
            .take_while(|e| e.verdict == VerdictKind::Denied && !e.handoff)
            .count() as u32
    }

    /// The most recent reviewed entry, if it is a denial. Handoff entries
    /// are skipped so the reviewer's own reason stays the one quoted.
    pub fn pending_denial(&self) -> Option<&ProgressEntry> {
        self.entries
            .iter()
            .rev()
            .find(|e| !e.handoff)
            .filter(|e| e.verdict == VerdictKind::Denied)
    }

    /// Items that have an approved entry.
    pub fn approved_items(&self) -> impl Iterator<Item = &ItemRef> {
        self.entries
            .iter()
            .filter(|e| e.verdict == VerdictKind::Approved)
            .map(|e| &e.item)
    }

    /// Render the whole log as `progress.txt` text.
    pub fn to_text(&self) -> String {
        let mut text = PROGRESS_HEADER.to_string();
        for entry in &self.entries {
            text.push_str(&entry.to_block());
        }
        text
    }

    /// Parse `progress.txt` text. Any malformed block is an error.
    pub fn parse(text: &str) -> Result<Self> {
        let mut log = ProgressLog::new();
        let mut current: Option<BlockBuilder> = None;

        for (line_no, line) in text.lines().enumerate() {
            if let Some(rest) = line.strip_prefix("## Iteration ") {
                if let Some(block) = current.take() {
                    log.append(block.finish()?)?;
                }
                let iteration = rest.trim().parse::<u32>().map_err(|_| {
                    TelosError::ProgressLog(format!("line {}: bad iteration number '{}'", line_no + 1, rest))
                })?;
                current = Some(BlockBuilder::new(iteration));
                continue;
            }

            let Some(block) = current.as_mut() else {
                continue;
            };

            if let Some(rest) = line.strip_prefix("- ") {
                let (key, value) = rest.split_once(": ").or_else(|| rest.strip_suffix(':').map(|k| (k, ""))).ok_or_else(|| {
                    TelosError::ProgressLog(format!("line {}: expected '- Key: value'", line_no + 1))
                })?;
                block.set(key, value, line_no + 1)?;
            } else if let Some(cont) = line.strip_prefix("  ") {
                block.continue_details(cont, line_no + 1)?;
            } else if !line.trim().is_empty() {
                return Err(TelosError::ProgressLog(format!(
                    "line {}: unexpected text in iteration {}",
                    line_no + 1,
                    block.iteration
                )));
            }
        }

        if let Some(block) = current.take() {
            log.append(block.finish()?)?;
        }
        Ok(log)
    }
}

struct BlockBuilder {
    iteration: u32,
    timestamp: Option<DateTime<Utc>>,
    prd: Option<String>,
    item: Option<usize>,
    task: Option<String>,
    verdict: Option<VerdictKind>,
    details: Option<String>,
    handoff: bool,
}

impl BlockBuilder {
    fn new(iteration: u32) -> Self {
        Self {
            iteration,
            timestamp: None,
            prd: None,
            item: None,
            task: None,
            verdict: None,
            details: None,
            handoff: false,
        }
    }

    fn set(&mut self, key: &str, value: &str, line: usize) -> Result<()> {
        let bad = |what: &str| TelosError::ProgressLog(format!("line {}: bad {} '{}'", line, what, value));
        match key {
            "Timestamp" => {
                let ts = DateTime::parse_from_rfc3339(value.trim()).map_err(|_| bad("timestamp"))?;
                self.timestamp = Some(ts.with_timezone(&Utc));
            }
            "PRD" => self.prd = Some(value.trim().to_string()),
            "Item" => {
                let number = value.trim().parse::<usize>().map_err(|_| bad("item number"))?;
                if number == 0 {
                    return Err(bad("item number"));
                }
                self.item = Some(number - 1);
            }
            "Task" => self.task = Some(value.to_string()),
            "Verdict" => self.verdict = Some(VerdictKind::parse(value).ok_or_else(|| bad("verdict"))?),
            "Details" => self.details = Some(value.to_string()),
            "Handoff" => {
                self.handoff = match value.trim() {
                    "yes" => true,
                    "no" => false,
                    _ => return Err(bad("handoff flag")),
                }
            }
            other => {
                return Err(TelosError::ProgressLog(format!("line {}: unknown field '{}'", line, other)));
            }
        }
        Ok(())
    }

    fn continue_details(&mut self, text: &str, line: usize) -> Result<()> {
        let details = self.details.as_mut().ok_or_else(|| {
            TelosError::ProgressLog(format!("line {}: continuation line before Details", line))
        })?;
        details.push('\n');
        details.push_str(text);
        Ok(())
    }

    fn finish(self) -> Result<ProgressEntry> {
        let missing = |field: &str| {
            TelosError::ProgressLog(format!("iteration {}: missing {}", self.iteration, field))
        };
        Ok(ProgressEntry {
            iteration: self.iteration,
            timestamp: self.timestamp.ok_or_else(|| missing("Timestamp"))?,
            item: ItemRef::new(
                PrdRef::new(self.prd.clone().ok_or_else(|| missing("PRD"))?),
                self.item.ok_or_else(|| missing("Item"))?,
            ),
            task: self.task.clone().ok_or_else(|| missing("Task"))?,
            verdict: self.verdict.ok_or_else(|| missing("Verdict"))?,
            details: self.details.clone().ok_or_else(|| missing("Details"))?,
            handoff: self.handoff,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(iteration: u32, index: usize, verdict: VerdictKind, details: &str) -> ProgressEntry {
        ProgressEntry::new(
            iteration,
            ItemRef::new(PrdRef::new("01-a.md"), index),
            format!("task {}", index + 1),
            verdict,
            details,
        )
    }

    #[test]
    fn test_append_enforces_consecutive_iterations() {
        let mut log = ProgressLog::new();
        assert_eq!(log.next_iteration(), 1);
        log.append(entry(1, 0, VerdictKind::Denied, "x")).unwrap();
        assert!(log.append(entry(3, 0, VerdictKind::Denied, "x")).is_err());
        assert!(log.append(entry(1, 0, VerdictKind::Denied, "x")).is_err());
        log.append(entry(2, 0, VerdictKind::Approved, "ok")).unwrap();
        assert_eq!(log.len(), 2);
    }

    #[test]
    fn test_denial_streak_counts_tail_only() {
        let mut log = ProgressLog::new();
        log.append(entry(1, 0, VerdictKind::Denied, "a")).unwrap();
        log.append(entry(2, 0, VerdictKind::Approved, "b")).unwrap();
        log.append(entry(3, 1, VerdictKind::Denied, "c")).unwrap();
        log.append(entry(4, 1, VerdictKind::Denied, "d")).unwrap();
        assert_eq!(log.denial_streak(), 2);
        assert_eq!(log.pending_denial().unwrap().details, "d");
    }

    #[test]
    fn test_no_pending_denial_after_approval() {
        let mut log = ProgressLog::new();
        log.append(entry(1, 0, VerdictKind::Approved, "ok")).unwrap();
        assert!(log.pending_denial().is_none());
        assert_eq!(log.denial_streak(), 0);
        assert_eq!(log.approved_items().count(), 1);
    }

    #[test]
    fn test_text_round_trip_with_multiline_details() {
        let mut log = ProgressLog::new();
        log.append(entry(1, 0, VerdictKind::Denied, "cargo test failed\n\nassertion at src/lib.rs:10")).unwrap();
        log.append(entry(2, 0, VerdictKind::Approved, "")).unwrap();

        let text = log.to_text();
        assert!(text.starts_with(PROGRESS_HEADER));
        assert!(text.contains("- Item: 1\n"));

        let parsed = ProgressLog::parse(&text).unwrap();
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed.entries()[0].details, log.entries()[0].details);
        assert_eq!(parsed.entries()[1].details, "");
        assert_eq!(parsed.entries()[0].item, log.entries()[0].item);
    }

    #[test]
    fn test_handoff_ends_streak_and_keeps_reviewer_reason() {
        let mut log = ProgressLog::new();
        log.append(entry(1, 0, VerdictKind::Denied, "criterion 1 fails")).unwrap();
        log.append(entry(2, 0, VerdictKind::Denied, "criterion 2 fails")).unwrap();
        log.append(entry(3, 0, VerdictKind::Denied, "handed off").with_handoff()).unwrap();

        assert_eq!(log.denial_streak(), 0);
        assert_eq!(log.pending_denial().unwrap().details, "criterion 2 fails");

        let parsed = ProgressLog::parse(&log.to_text()).unwrap();
        assert!(parsed.entries()[2].handoff);
        assert!(!parsed.entries()[1].handoff);
        assert_eq!(parsed.denial_streak(), 0);

        log.append(entry(4, 0, VerdictKind::Denied, "still failing")).unwrap();
        assert_eq!(log.denial_streak(), 1);
        assert_eq!(log.pending_denial().unwrap().details, "still failing");
    }

    #[test]
    fn test_task_is_written_on_one_line() {
        let e = ProgressEntry::new(1, ItemRef::new(PrdRef::new("01-a.md"), 0), "two\nlines", VerdictKind::Approved, "");
        assert!(e.to_block().contains("- Task: two lines\n"));
    }

    #[test]
    fn test_parse_empty_and_header_only() {
        assert!(ProgressLog::parse("").unwrap().is_empty());
        assert!(ProgressLog::parse(PROGRESS_HEADER).unwrap().is_empty());
    }

    #[test]
    fn test_parse_rejects_missing_field() {
        let text = "# Progress Log\n\n## Iteration 1\n- Timestamp: 2026-01-01T00:00:00Z\n- PRD: 01-a.md\n- Item: 1\n- Task: t\n- Details: d\n";
        let err = ProgressLog::parse(text).unwrap_err();
        assert!(err.to_string().contains("missing Verdict"));
    }

    #[test]
    fn test_parse_rejects_gap() {
        let block = |n: u32| {
            format!("## Iteration {}\n- Timestamp: 2026-01-01T00:00:00Z\n- PRD: 01-a.md\n- Item: 1\n- Task: t\n- Verdict: denied\n- Details: d\n", n)
        };
        let text = format!("{}{}", block(1), block(3));
        assert!(ProgressLog::parse(&text).is_err());
    }

    #[test]
    fn test_parse_rejects_garbage() {
        let text = "## Iteration 1\n- Timestamp: 2026-01-01T00:00:00Z\nrandom text\n";
        assert!(ProgressLog::parse(text).is_err());
    }
}
