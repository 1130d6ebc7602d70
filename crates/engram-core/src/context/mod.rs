//! Context Formatter
//!
//! Shapes retrieved memories plus behavioral patterns into a
//! prompt-ready text block. Ordering is deterministic: a fixed category
//! sequence, and within each category the retrieval order.

use crate::memory::{BehavioralPatterns, MemoryCategory};
use crate::retrieval::RetrievedMemory;

/// Configuration for context formatting
#[derive(Debug, Clone)]
pub struct ContextConfig {
    /// Cap on memories rendered per category
    pub max_per_category: usize,
    /// Whether to annotate each line with its prominence
    pub show_prominence: bool,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            max_per_category: 8,
            show_prominence: true,
        }
    }
}

fn section_title(category: MemoryCategory) -> &'static str {
    match category {
        MemoryCategory::Preference => "Preferences",
        MemoryCategory::Fact => "Facts",
        MemoryCategory::Event => "Events",
        MemoryCategory::Relationship => "Relationships",
        MemoryCategory::Insight => "Insights",
    }
}

/// Render retrieved memories and behavioral patterns as a prompt block.
/// Returns an empty string when there is nothing to say.
pub fn format_context(
    results: &[RetrievedMemory],
    patterns: Option<&BehavioralPatterns>,
    config: &ContextConfig,
) -> String {
    if results.is_empty() && patterns.is_none() {
        return String::new();
    }
    let mut block = String::from("# What I remember about this user\n");

    if let Some(patterns) = patterns {
        block.push_str(&format!(
            "\nCurrent read: emotion {}, proactiveness dial {}.\n",
            if patterns.affect.emotion.is_empty() {
                "neutral"
            } else {
                &patterns.affect.emotion
            },
            patterns.preferences.proactiveness_dial,
        ));
        if let Some(goal_signal) = &patterns.affect.goal_signal {
            block.push_str(&format!("Goal signal: {goal_signal}.\n"));
        }
    }

    for category in MemoryCategory::ALL {
        let entries: Vec<&RetrievedMemory> = results
            .iter()
            .filter(|result| result.memory.category == category)
            .take(config.max_per_category)
            .collect();
        if entries.is_empty() {
            continue;
        }
        block.push_str(&format!("\n## {}\n", section_title(category)));
        for entry in entries {
            if config.show_prominence {
                block.push_str(&format!(
                    "- {} (prominence {:.2})\n",
                    entry.memory.content, entry.memory.prominence
                ));
            } else {
                block.push_str(&format!("- {}\n", entry.memory.content));
            }
        }
    }
    block
}

// ============================================================================
// TESTS
// ============================================================================
