//! Fixed capability tables.
//!
//! The intent × depth matrix, the combined and recovery capabilities, depth
//! progressions for chains, and the capabilities that answer from their own
//! knowledge without retrieval.

use crate::state::{Depth, Intent};

pub const EXPLAIN_AND_BUILD: &str = "explain_and_build";
pub const DIRECT_ANSWER: &str = "direct_answer";
pub const PRACTICAL_GUIDE: &str = "practical_guide";
pub const EMOTIONAL_SUPPORT: &str = "emotional_support";

/// Maps an (intent, depth) pair to its capability name.
pub fn capability_for(intent: Intent, depth: Depth) -> &'static str {
    use Depth::*;
    use Intent::*;
    match (intent, depth) {
        (Understand, Surface) => "quick_explainer",
        (Understand, Guided) => "concept_explorer",
        (Understand, Deep) => "deep_dive",
        (Create, Surface) => "brainstormer",
        (Create, Guided) => "writing_coach",
        (Create, Deep) => "project_builder",
        (Solve, Surface) => "quick_solver",
        (Solve, Guided) => "step_by_step_solver",
        (Solve, Deep) => "socratic_tutor",
        (Evaluate, Surface) => "quick_feedback",
        (Evaluate, Guided) => "rubric_reviewer",
        (Evaluate, Deep) => "critical_analyst",
        (Organize, Surface) => "summarizer",
        (Organize, Guided) => "study_planner",
        (Organize, Deep) => "knowledge_mapper",
        (Regulate, Surface) => "encouragement",
        (Regulate, Guided) => EMOTIONAL_SUPPORT,
        (Regulate, Deep) => "reflection_coach",
        (Explore, Surface) => "curiosity_spark",
        (Explore, Guided) => "topic_explorer",
        (Explore, Deep) => "research_guide",
        (Interact, Surface) => "chat_companion",
        (Interact, Guided) => "role_play",
        (Interact, Deep) => "debate_partner",
    }
}

/// Ordered capability progression when depth moves from `from` to `to`.
///
/// Only intents whose capabilities build on each other define a progression;
/// `None` means the caller should use its single default capability.
pub fn depth_progression(intent: Intent, from: Depth, to: Depth) -> Option<Vec<&'static str>> {
    if !matches!(
        intent,
        Intent::Understand | Intent::Create | Intent::Solve | Intent::Explore
    ) || from == to
    {
        return None;
    }

    let depths = [Depth::Surface, Depth::Guided, Depth::Deep];
    if from.rank() < to.rank() {
        Some(
            depths[from.rank()..=to.rank()]
                .iter()
                .map(|d| capability_for(intent, *d))
                .collect(),
        )
    } else {
        Some(vec![capability_for(intent, from), capability_for(intent, to)])
    }
}

/// Capabilities that answer from their own knowledge.
pub const RETRIEVAL_FREE_CAPABILITIES: &[&str] = &[
    "encouragement",
    EMOTIONAL_SUPPORT,
    "reflection_coach",
    "chat_companion",
    "role_play",
    "brainstormer",
    "study_planner",
];

pub fn requires_retrieval(capability: &str) -> bool {
    !RETRIEVAL_FREE_CAPABILITIES.contains(&capability)
}

/// Every capability name the dispatch engine may ask for.
pub fn all_capabilities() -> Vec<&'static str> {
    use strum::IntoEnumIterator;
    let mut names: Vec<&'static str> = Intent::iter()
        .flat_map(|i| Depth::iter().map(move |d| capability_for(i, d)))
        .collect();
    names.extend([EXPLAIN_AND_BUILD, DIRECT_ANSWER, PRACTICAL_GUIDE]);
    names
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_matrix_entries_are_unique() {
        let names = all_capabilities();
        let mut sorted = names.clone();
        sorted.sort_unstable();
        sorted.dedup();
        assert_eq!(sorted.len(), names.len());
        assert_eq!(names.len(), 8 * 3 + 3);
    }

    #[test]
    fn test_surface_understand_is_quick_explainer() {
        assert_eq!(capability_for(Intent::Understand, Depth::Surface), "quick_explainer");
    }

    #[test]
    fn test_deepening_progression_spans_all_levels() {
        assert_eq!(
            depth_progression(Intent::Understand, Depth::Surface, Depth::Deep),
            Some(vec!["quick_explainer", "concept_explorer", "deep_dive"])
        );
        assert_eq!(
            depth_progression(Intent::Solve, Depth::Guided, Depth::Deep),
            Some(vec!["step_by_step_solver", "socratic_tutor"])
        );
    }

    #[test]
    fn test_surfacing_and_undefined_progressions() {
        assert_eq!(
            depth_progression(Intent::Explore, Depth::Deep, Depth::Surface),
            Some(vec!["research_guide", "curiosity_spark"])
        );
        assert_eq!(
            depth_progression(Intent::Regulate, Depth::Surface, Depth::Deep),
            None
        );
        assert_eq!(
            depth_progression(Intent::Understand, Depth::Deep, Depth::Deep),
            None
        );
    }

    #[test]
    fn test_retrieval_free_capabilities() {
        assert!(!requires_retrieval("emotional_support"));
        assert!(requires_retrieval("deep_dive"));
    }
}
