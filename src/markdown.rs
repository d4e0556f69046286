//! Markdown section helpers shared by the PRD and knowledge base parsers.
//!
//! Sections are `## Heading` blocks running to the next `## ` heading or end
//! of file. Offsets are byte offsets into the original text so callers can
//! splice without disturbing anything else.

use std::ops::Range;

/// Byte layout of one `## ` section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SectionSpan {
    /// Offset of the `## ` heading line
    pub heading_start: usize,
    /// Offset just past the heading line's newline
    pub body: Range<usize>,
}

/// Iterate lines with the byte offset each one starts at.
pub fn lines_with_offsets(content: &str) -> impl Iterator<Item = (usize, &str)> {
    let mut offset = 0;
    content.split_inclusive('\n').map(move |raw| {
        let start = offset;
        offset += raw.len();
        (start, raw.trim_end_matches(['\n', '\r']))
    })
}

fn heading_text(line: &str) -> Option<&str> {
    line.strip_prefix("## ").map(str::trim)
}

/// Locate the section whose heading matches `heading` exactly (case-sensitive).
pub fn find_section(content: &str, heading: &str) -> Option<SectionSpan> {
    let mut found: Option<(usize, usize)> = None;

    for (start, line) in lines_with_offsets(content) {
        match (found, heading_text(line)) {
            (None, Some(text)) if text == heading => {
                let after = content[start..]
                    .find('\n')
                    .map(|pos| start + pos + 1)
                    .unwrap_or(content.len());
                found = Some((start, after));
            }
            (Some((heading_start, body_start)), Some(_)) => {
                return Some(SectionSpan {
                    heading_start,
                    body: body_start..start,
                });
            }
            _ => {}
        }
    }

    found.map(|(heading_start, body_start)| SectionSpan {
        heading_start,
        body: body_start..content.len(),
    })
}

/// Extract the trimmed body of `## heading`, if the section exists.
pub fn extract_section(content: &str, heading: &str) -> Option<String> {
    find_section(content, heading).map(|span| content[span.body].trim().to_string())
}

/// Plain `- ` bullets in a block of text, excluding checkbox lines.
pub fn bullets(text: &str) -> Vec<String> {
    text.lines()
        .filter_map(|line| line.strip_prefix("- "))
        .filter(|rest| !rest.starts_with("[ ]") && !rest.to_ascii_lowercase().starts_with("[x]"))
        .map(|rest| rest.trim().to_string())
        .filter(|rest| !rest.is_empty())
        .collect()
}
