//! Template answers built from knowledge-base records.
//!
//! Used whenever no generative backend produces an accepted answer. The
//! formatter always returns non-empty text: a structured crop or disease
//! answer when one is named, the raw retrieved context otherwise, and a
//! random clarifying prompt when nothing matched at all.

use rand::seq::SliceRandom;
use std::sync::Arc;

use crate::knowledge::{contains_any, CropRecord, KnowledgeBase, PestRecord};
use crate::strategy::CONTEXT_RESULTS;

/// Terms that select the disease answer template.
pub const FALLBACK_DISEASE_TRIGGERS: &[&str] = &["disease", "pest", "infection", "blight"];

pub const GENERIC_PROMPTS: [&str; 5] = [
    "That's a great question! Could you provide more details about your farm or crop?",
    "I'd be happy to help! Are you asking about disease management, fertilization, or crop planning?",
    "For more specific advice, tell me about your crops and current challenges.",
    "What specific agricultural aspect would you like to know more about?",
    "I'm here to help with farming questions. What's your main concern?",
];

#[derive(Clone)]
pub struct FallbackFormatter {
    kb: Arc<KnowledgeBase>,
}

impl FallbackFormatter {
    pub fn new(kb: Arc<KnowledgeBase>) -> Self {
        Self { kb }
    }

    pub fn format(&self, message: &str) -> String {
        let context = self.kb.retrieve(message, CONTEXT_RESULTS);
        if context.is_empty() {
            return random_generic_prompt().to_string();
        }

        let message_lower = message.to_lowercase();
        let disease_intent = contains_any(&message_lower, FALLBACK_DISEASE_TRIGGERS);

        if let Some(crop) = self.kb.find_crop(&message_lower) {
            // Only a disease record of the named crop outranks its guide.
            if disease_intent {
                if let Some(pest) = self.kb.find_pest_for_crop(crop, &message_lower) {
                    return format_pest(pest);
                }
            }
            return format_crop(crop);
        }

        if disease_intent {
            if let Some(pest) = self.kb.find_pest(&message_lower) {
                return format_pest(pest);
            }
        }

        format!(
            "Based on agriculture best practices:\n\n{}\n\nWould you like more specific information about any aspect?",
            context
        )
    }
}

fn random_generic_prompt() -> &'static str {
    GENERIC_PROMPTS
        .choose(&mut rand::thread_rng())
        .copied()
        .unwrap_or(GENERIC_PROMPTS[0])
}

fn format_crop(crop: &CropRecord) -> String {
    let mut out = format!("Here's information about growing {}:\n\n", crop.name);
    out.push_str(&format!(
        "**Season:** {} (Cycle: {} days)\n",
        crop.season, crop.cycle_length
    ));
    out.push_str(&format!(
        "**Soil:** pH {}, {}\n",
        crop.ph_range(),
        crop.soil.types.join(", ")
    ));
    out.push_str(&format!(
        "**Water:** {} - {}\n",
        crop.water.requirement, crop.water.irrigation_cycle
    ));
    out.push_str(&format!("**Expected Yield:** {}\n\n", crop.expected_yield));
    out.push_str("**Key Practices:**\n");
    for practice in crop.practices.iter().take(4) {
        out.push_str(&format!("• {}\n", practice));
    }
    if !crop.fertilizer.is_empty() {
        out.push_str("\n**Fertilizer Schedule:**\n");
        for step in crop.fertilizer.iter().take(3) {
            out.push_str(&format!("• {}\n", step));
        }
    }
    out
}

fn format_pest(pest: &PestRecord) -> String {
    let mut out = format!("**{}** ({})\n\n", pest.display_name(), pest.crop);
    out.push_str(&format!("{}\n\n", pest.summary));
    if !pest.treatment.is_empty() {
        out.push_str("**Treatment:**\n");
        for step in pest.treatment.iter().take(2) {
            out.push_str(&format!("• {}\n", step));
        }
    }
    if !pest.prevention.is_empty() {
        out.push_str("\n**Prevention:**\n");
        for step in pest.prevention.iter().take(2) {
            out.push_str(&format!("• {}\n", step));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn formatter() -> FallbackFormatter {
        FallbackFormatter::new(Arc::new(KnowledgeBase::bundled().unwrap()))
    }

    #[test]
    fn test_tomato_growing_answer() {
        let out = formatter().format("How do I grow tomato?");
        assert!(out.starts_with("Here's information about growing Tomato:"));
        assert!(out.contains("**Soil:** pH 6.0-7.0, Loamy, Sandy Loam"));
        assert!(out.contains("• Use drip irrigation\n"));
        assert!(out.contains("• Regular pruning for better air circulation\n"));
        assert!(!out.contains("Rotate crops annually"));
        assert!(out.contains("• Flowering: Urea 250 kg/ha\n"));
        assert!(!out.contains("Fruiting"));
    }

    #[test]
    fn test_named_crop_disease_question() {
        let out = formatter().format("My tomato has blight");
        assert!(out.starts_with("**Tomato Late Blight** (Tomato)"));
        assert!(out.contains("**Treatment:**\n• "));
    }

    #[test]
    fn test_disease_term_with_other_crop_gives_crop_guide() {
        let f = formatter();
        let out = f.format("How to control pests in wheat");
        assert!(out.starts_with("Here's information about growing Wheat:"), "got: {}", out);
        let out = f.format("potato disease on my farm");
        assert!(out.starts_with("Here's information about growing Potato:"));
        let out = f.format("rice pest control");
        assert!(out.starts_with("Here's information about growing Rice:"));

        let out = f.format("My tomato has blight");
        assert!(out.starts_with("**Tomato Late Blight** (Tomato)"));
    }

    #[test]
    fn test_named_tomato_disease_is_selected() {
        let out = formatter().format("tomato early blight on leaves");
        assert!(out.starts_with("**Tomato Early Blight** (Tomato)"));
    }

    #[test]
    fn test_crop_answer_without_disease_term() {
        let out = formatter().format("tomato fertilizer plan");
        assert!(out.starts_with("Here's information about growing Tomato:"));
        assert!(out.contains("**Fertilizer Schedule:**"));
    }

    #[test]
    fn test_disease_answer_without_crop_name() {
        let out = formatter().format("how to stop late blight disease");
        assert!(out.starts_with("**Tomato Late Blight** (Tomato)"));
        assert!(out.contains("**Treatment:**\n• Spray Copper Oxychloride"));
        assert!(out.contains("**Prevention:**\n• Plant certified"));
        assert!(!out.contains("Metalaxyl"));
    }

    #[test]
    fn test_topic_context_is_wrapped() {
        let out = formatter().format("Which fertilizer should I use?");
        assert!(out.starts_with("Based on agriculture best practices:\n\nFertilizer: "));
        assert!(out.ends_with("Would you like more specific information about any aspect?"));
    }

    #[test]
    fn test_gibberish_returns_generic_prompt() {
        let f = formatter();
        for _ in 0..20 {
            let out = f.format("xyz123 random gibberish");
            assert!(GENERIC_PROMPTS.contains(&out.as_str()), "got: {}", out);
        }
    }

    #[test]
    fn test_always_non_empty() {
        let f = formatter();
        for msg in ["a", "?", "hello", "rot", "pest", "corn", "🌱", "post harvest drying"] {
            assert!(!f.format(msg).is_empty(), "empty answer for {:?}", msg);
        }
    }
}
