//! Plan document analysis.
//!
//! A single line-oriented pass over the markdown. The parser never fails:
//! anything it does not recognise is ignored, so a mangled document simply
//! yields fewer (or zero) tasks.

use serde::Serialize;

/// Task progress under one top-level (`#` or `##`) heading.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SectionProgress {
    /// Heading text without the `#` markers
    pub heading: String,
    /// Checked tasks
    pub completed: usize,
    /// All tasks
    pub total: usize,
}

impl SectionProgress {
    /// At least one task, and none open.
    pub fn is_complete(&self) -> bool {
        self.total > 0 && self.completed == self.total
    }
}

/// Result of analysing a plan document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PlanAnalysis {
    /// Checked task lines
    pub tasks_completed: usize,
    /// All task lines
    pub tasks_total: usize,
    /// Labels of checked tasks, first occurrence order, deduplicated
    pub completed_tasks: Vec<String>,
    /// Labels of open tasks, first occurrence order, deduplicated
    pub active_tasks: Vec<String>,
    /// Entries found under a decision heading
    pub decisions: Vec<String>,
    /// Per-section counts, in document order
    pub sections: Vec<SectionProgress>,
}

impl PlanAnalysis {
    /// Combined progress of every section whose heading names `phase`.
    ///
    /// Matching ignores case and treats `_`, `-` and spaces alike, so phase
    /// `code_review` matches `## Code Review`.
    pub fn phase_progress(&self, phase: &str) -> Option<SectionProgress> {
        let wanted = normalize(phase);
        let mut found: Option<SectionProgress> = None;

        for section in self.sections.iter().filter(|s| normalize(&s.heading) == wanted) {
            let entry = found.get_or_insert_with(|| SectionProgress {
                heading: section.heading.clone(),
                completed: 0,
                total: 0,
            });
            entry.completed += section.completed;
            entry.total += section.total;
        }

        found
    }

    /// Whether the phase has tasks and all of them are checked.
    pub fn is_phase_complete(&self, phase: &str) -> bool {
        self.phase_progress(phase).is_some_and(|p| p.is_complete())
    }
}

/// Analyse plan markdown.
pub fn analyze(content: &str) -> PlanAnalysis {
    let mut analysis = PlanAnalysis::default();
    let mut current: Option<usize> = None;
    let mut section_is_decisions = false;
    let mut in_decisions = false;
    let mut in_code_block = false;

    for raw in content.lines() {
        let line = raw.trim();

        if line.starts_with("```") || line.starts_with("~~~") {
            in_code_block = !in_code_block;
            continue;
        }
        if in_code_block || line.is_empty() {
            continue;
        }

        if let Some((level, heading)) = parse_heading(line) {
            let mentions_decision = heading.to_lowercase().contains("decision");
            if level <= 2 {
                analysis.sections.push(SectionProgress {
                    heading: heading.to_string(),
                    completed: 0,
                    total: 0,
                });
                current = Some(analysis.sections.len() - 1);
                section_is_decisions = mentions_decision;
                in_decisions = mentions_decision;
            } else {
                in_decisions = section_is_decisions || mentions_decision;
            }
            continue;
        }

        if let Some((checked, label)) = parse_checkbox(line) {
            analysis.tasks_total += 1;
            if let Some(idx) = current {
                analysis.sections[idx].total += 1;
                if checked {
                    analysis.sections[idx].completed += 1;
                }
            }

            let labels = if checked {
                analysis.tasks_completed += 1;
                &mut analysis.completed_tasks
            } else {
                &mut analysis.active_tasks
            };
            push_unique(labels, label);

            if in_decisions {
                push_unique(&mut analysis.decisions, label);
            }
            continue;
        }

        if in_decisions && !is_placeholder(line) {
            let entry = strip_list_marker(line);
            if !entry.is_empty() {
                push_unique(&mut analysis.decisions, entry);
            }
        }
    }

    analysis
}

/// `## Heading` → `(2, "Heading")`. Requires a space after the markers.
fn parse_heading(line: &str) -> Option<(usize, &str)> {
    let level = line.chars().take_while(|&c| c == '#').count();
    if level == 0 || level > 6 {
        return None;
    }
    let rest = &line[level..];
    if !rest.starts_with(' ') {
        return None;
    }
    Some((level, rest.trim().trim_end_matches('#').trim()))
}

/// `- [x] label` → `(true, "label")`. Accepts `-`, `*` and `+` bullets.
fn parse_checkbox(line: &str) -> Option<(bool, &str)> {
    let rest = line
        .strip_prefix("- ")
        .or_else(|| line.strip_prefix("* "))
        .or_else(|| line.strip_prefix("+ "))?
        .trim_start();

    let checked = if rest.starts_with("[ ]") {
        false
    } else if rest.starts_with("[x]") || rest.starts_with("[X]") {
        true
    } else {
        return None;
    };

    Some((checked, rest[3..].trim()))
}

fn strip_list_marker(line: &str) -> &str {
    line.strip_prefix("- ")
        .or_else(|| line.strip_prefix("* "))
        .or_else(|| line.strip_prefix("+ "))
        .unwrap_or(line)
        .trim()
}

/// Template placeholder lines are a single italic span.
fn is_placeholder(line: &str) -> bool {
    line.len() > 1
        && ((line.starts_with('_') && line.ends_with('_'))
            || (line.starts_with('*') && line.ends_with('*') && !line.starts_with("* ")))
}

fn push_unique(labels: &mut Vec<String>, label: &str) {
    if !label.is_empty() && !labels.iter().any(|l| l == label) {
        labels.push(label.to_string());
    }
}

fn normalize(s: &str) -> String {
    s.to_lowercase()
        .replace(['_', '-'], " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}
