//! Built-in prompt templates.

pub const DELEGATION: &str = "delegation";
pub const REVIEW: &str = "review";
pub const PLAN: &str = "plan";
pub const PRDS: &str = "prds";

pub(super) const BUILTIN: &[(&str, &str)] = &[
    (DELEGATION, DELEGATION_TEMPLATE),
    (REVIEW, REVIEW_TEMPLATE),
    (PLAN, PLAN_TEMPLATE),
    (PRDS, PRDS_TEMPLATE),
];

const DELEGATION_TEMPLATE: &str = r#"# Task

{{task}}

- Source: {{item_ref}}
- Subagent: {{identity}}

## PRD excerpt

{{excerpt}}

## Acceptance criteria

{{#each criteria}}
{{this.number}}. {{this.text}}
{{/each}}
{{#if knowledge}}

## Project knowledge (AGENTS.md)

{{knowledge}}
{{/if}}
{{#if prior_denial}}

## Previous attempt was denied

The reviewer denied the last attempt at this task. Address this reason literally, not approximately, before anything else:

{{prior_denial}}
{{/if}}
{{#if escalation}}

## ESCALATION: {{denial_streak}} consecutive denials

{{escalation}}
{{/if}}

## Rules

- Work on this task only. Do not start any other checklist item.
- Do not edit files under prds/, progress.txt or AGENTS.md.
{{#if self_verify}}
- Before finishing, run the tests, linter and type checker and leave all of them clean.
- Report learnings as lines starting with CONVENTION:, GOTCHA:, PATTERN: or DECISION:.
{{/if}}
"#;

const REVIEW_TEMPLATE: &str = r#"# Review

Task under review: {{task}} ({{item_ref}})

## Acceptance criteria

{{#each criteria}}
{{this.number}}. {{this.text}}
{{/each}}

## Change evidence

{{evidence}}

## Test suite

{{tests}}

## Instructions

Verify every criterion yourself by reading the changed files. Do not rely on the
implementer's summary. A partially met criterion is not met.

Then record exactly one verdict:

- `mcp__reviewer__approve` with `{"summary": "...", "confirmed": [criterion numbers]}` when every criterion holds.
- `mcp__reviewer__deny` with `{"reason": "..."}` otherwise. The reason must name the failing criterion and what is wrong, specifically enough to fix without asking.
"#;

const PLAN_TEMPLATE: &str = r#"You are generating a project plan from an interview transcript.

## Interview Transcript

{{transcript}}

## Your Task

Generate a complete project plan with these sections:
- North Star: the core vision and success criteria
- Architecture: high-level system design and key decisions
- Tech Stack: specific technologies and frameworks
- Implementation Phases: ordered work breakdown with concrete tasks
- Sequencing: dependencies between phases
- Risks: technical and project risks with mitigations
- Open Questions: anything that needs clarification

Use the context tools if you need additional project information.

Output ONLY the plan content in markdown format, nothing else.
"#;

const PRDS_TEMPLATE: &str = r#"You are splitting a project plan into individual PRD (Product Requirements Document) files.

## Project Plan

{{plan}}

## Your Task

Create individual PRD files in the `{{prds_dir}}/` directory. Each PRD should:
- Be named with a number prefix: `{{prds_dir}}/01-xxx.md`, `{{prds_dir}}/02-xxx.md`, etc.
- Start with a `# Title` line and an `## Overview` section
- Cover one logical phase or work unit from the plan
- Include specific, testable acceptance criteria as checkbox items: `- [ ] criterion`
- Be self-contained, so a developer can implement it without reading other PRDs

## Sizing Rules

- Target {{min_items}}-{{max_items}} checkboxes per PRD. Split a phase with more than {{max_items}} into separate PRDs.
- Only use `- [ ]` checkboxes for implementation work (writing code, creating files, configuring services).
- Verification steps belong in a prose `## Definition of Done` section, not in checkboxes.
- CRM, marketing and image work may be tagged at the start of the item: `[crm]`, `[marketing]`, `[image]`.

The numbering reflects implementation order (01 = do first).

Write each PRD file with the Write tool. After creating all PRDs, output a summary listing the files you created.
"#;
