//! Static agriculture knowledge base and keyword retrieval.
//!
//! The knowledge base holds three ordered collections (crops, pests and
//! general topic fact sheets) loaded once at startup and never mutated.
//! [`KnowledgeBase::retrieve`] renders the records whose names or keywords
//! appear in a query into a plain-text context block for generation and
//! fallback answers.
//!
//! # Matching
//!
//! Matching is case-insensitive substring matching, additive across the
//! three collections:
//!
//! | Collection | Matches when |
//! |------------|--------------|
//! | crops | the crop key or display name occurs in the query |
//! | pests | the query holds a disease trigger term **and** the pest's crop name occurs in the query, or any query token occurs in the pest key |
//! | topics | any of the topic's keywords occurs in the query |
//!
//! There is no ranking: ties are broken by the order records appear in the
//! knowledge base file, and every block counts toward the same
//! `max_results` cap.
//!
//! # Data
//!
//! The bundled data (`data/knowledge_base.toml`) is compiled into the
//! binary. An alternative file with the same schema can be supplied via
//! `[knowledge_base].path`.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::collections::HashSet;
use std::path::Path;

const BUNDLED_KNOWLEDGE_BASE: &str = include_str!("../data/knowledge_base.toml");

/// Terms that enable pest/disease matching during retrieval.
pub const DISEASE_TRIGGERS: &[&str] = &["disease", "pest", "infection", "blight", "rot"];

#[derive(Debug, Clone, Deserialize)]
pub struct CropRecord {
    pub key: String,
    pub name: String,
    pub season: String,
    pub planting_months: Vec<u8>,
    pub harvest_months: Vec<u8>,
    pub cycle_length: u32,
    pub climate: ClimateEnvelope,
    pub soil: SoilRequirements,
    pub water: WaterRequirement,
    #[serde(rename = "yield")]
    pub expected_yield: String,
    pub profitability: String,
    pub practices: Vec<String>,
    #[serde(default)]
    pub pest_management: Vec<String>,
    #[serde(default)]
    pub fertilizer: Vec<FertilizerStep>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ClimateEnvelope {
    pub temp_min: f64,
    pub temp_max: f64,
    pub rain_min: f64,
    pub rain_max: f64,
    pub humidity_min: f64,
    pub humidity_max: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SoilRequirements {
    pub types: Vec<String>,
    pub ph_min: f64,
    pub ph_max: f64,
    pub drainage_required: bool,
    pub organic_matter: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WaterRequirement {
    pub requirement: String,
    pub irrigation_cycle: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FertilizerStep {
    pub stage: String,
    pub kind: String,
    pub quantity: String,
}

impl std::fmt::Display for FertilizerStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {} {}", self.stage, self.kind, self.quantity)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PestRecord {
    pub key: String,
    pub crop: String,
    pub category: String,
    pub severity: String,
    pub summary: String,
    #[serde(default)]
    pub immediate: Vec<String>,
    #[serde(default)]
    pub treatment: Vec<String>,
    #[serde(default)]
    pub prevention: Vec<String>,
    #[serde(default)]
    pub organic_alternatives: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TopicFactSheet {
    pub name: String,
    pub keywords: Vec<String>,
    pub facts: Vec<String>,
}

impl CropRecord {
    /// `query_lower` must already be lower-cased.
    pub fn matches(&self, query_lower: &str) -> bool {
        query_lower.contains(&self.key) || query_lower.contains(&self.name.to_lowercase())
    }

    /// Soil pH range as rendered in answers, e.g. `6.0-7.0`.
    pub fn ph_range(&self) -> String {
        format!(
            "{}-{}",
            format_decimal(self.soil.ph_min),
            format_decimal(self.soil.ph_max)
        )
    }
}

impl PestRecord {
    /// `query_lower` must already be lower-cased.
    pub fn matches(&self, query_lower: &str) -> bool {
        query_lower.contains(&self.crop.to_lowercase())
            || query_lower
                .split_whitespace()
                .any(|token| self.key.contains(token))
    }

    /// Human-readable disease name: `tomato_late_blight` → `Tomato Late Blight`.
    pub fn display_name(&self) -> String {
        title_case(&self.key.replace('_', " "))
    }
}

impl TopicFactSheet {
    pub fn matches(&self, query_lower: &str) -> bool {
        self.keywords.iter().any(|k| query_lower.contains(k.as_str()))
    }

    pub fn display_name(&self) -> String {
        title_case(&self.name.replace('_', " "))
    }
}

#[derive(Debug, Deserialize)]
struct KnowledgeBaseFile {
    #[serde(default)]
    crops: Vec<CropRecord>,
    #[serde(default)]
    pests: Vec<PestRecord>,
    #[serde(default)]
    topics: Vec<TopicFactSheet>,
}

/// Immutable crop, pest and topic facts with keyword retrieval.
#[derive(Debug, Clone)]
pub struct KnowledgeBase {
    crops: Vec<CropRecord>,
    pests: Vec<PestRecord>,
    topics: Vec<TopicFactSheet>,
}

impl KnowledgeBase {
    /// Loads the knowledge base compiled into the binary.
    pub fn bundled() -> Result<Self> {
        Self::from_toml_str(BUNDLED_KNOWLEDGE_BASE).context("Invalid bundled knowledge base")
    }

    /// Loads a knowledge base file, or the bundled data when `path` is `None`.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => {
                let content = std::fs::read_to_string(path).with_context(|| {
                    format!("Failed to read knowledge base: {}", path.display())
                })?;
                Self::from_toml_str(&content)
                    .with_context(|| format!("Invalid knowledge base: {}", path.display()))
            }
            None => Self::bundled(),
        }
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let file: KnowledgeBaseFile = toml::from_str(content)?;

        // Keys are stored lower-case so matching against a lower-cased
        // query stays a plain substring test.
        let mut crops = file.crops;
        for crop in &mut crops {
            crop.key = crop.key.to_lowercase();
        }

        ensure_unique("crop", crops.iter().map(|c| c.key.as_str()))?;
        ensure_unique("pest", file.pests.iter().map(|p| p.key.as_str()))?;
        ensure_unique("topic", file.topics.iter().map(|t| t.name.as_str()))?;

        Ok(Self {
            crops,
            pests: file.pests,
            topics: file.topics,
        })
    }

    pub fn crops(&self) -> &[CropRecord] {
        &self.crops
    }

    pub fn pests(&self) -> &[PestRecord] {
        &self.pests
    }

    pub fn topics(&self) -> &[TopicFactSheet] {
        &self.topics
    }

    /// First crop, in knowledge-base order, named in `query_lower`.
    pub fn find_crop(&self, query_lower: &str) -> Option<&CropRecord> {
        self.crops.iter().find(|c| c.matches(query_lower))
    }

    /// First pest record, in knowledge-base order, matching `query_lower`.
    /// Trigger terms are the caller's concern.
    pub fn find_pest(&self, query_lower: &str) -> Option<&PestRecord> {
        self.pests.iter().find(|p| p.matches(query_lower))
    }

    /// Pest record of `crop` whose key shares the most tokens with
    /// `query_lower`. Ties keep knowledge-base order.
    pub fn find_pest_for_crop(&self, crop: &CropRecord, query_lower: &str) -> Option<&PestRecord> {
        let mut best: Option<(&PestRecord, usize)> = None;
        for pest in self.pests.iter().filter(|p| p.crop.eq_ignore_ascii_case(&crop.name)) {
            let score = query_lower
                .split_whitespace()
                .filter(|token| pest.key.contains(token))
                .count();
            if best.map_or(true, |(_, top)| score > top) {
                best = Some((pest, score));
            }
        }
        best.map(|(pest, _)| pest)
    }

    /// Renders up to `max_results` matching blocks for `query`, joined by a
    /// blank line. Returns an empty string when nothing matches.
    pub fn retrieve(&self, query: &str, max_results: usize) -> String {
        if max_results == 0 {
            return String::new();
        }

        let query_lower = query.to_lowercase();
        let mut blocks: Vec<String> = Vec::new();

        for crop in &self.crops {
            if blocks.len() >= max_results {
                break;
            }
            if crop.matches(&query_lower) {
                blocks.push(render_crop(crop));
            }
        }

        if contains_any(&query_lower, DISEASE_TRIGGERS) {
            for pest in &self.pests {
                if blocks.len() >= max_results {
                    break;
                }
                if pest.matches(&query_lower) {
                    blocks.push(render_pest(pest));
                }
            }
        }

        for topic in &self.topics {
            if blocks.len() >= max_results {
                break;
            }
            if topic.matches(&query_lower) {
                let label = topic.display_name();
                for fact in topic.facts.iter().take(2) {
                    blocks.push(format!("{}: {}", label, fact));
                }
            }
        }

        blocks.truncate(max_results);
        blocks.join("\n\n")
    }
}

fn render_crop(crop: &CropRecord) -> String {
    let practices: Vec<&str> = crop.practices.iter().take(3).map(String::as_str).collect();
    let mut lines = vec![
        format!("Crop: {}", crop.name),
        format!("Season: {}, Cycle: {} days", crop.season, crop.cycle_length),
        format!(
            "Yield: {}, Profitability: {}",
            crop.expected_yield, crop.profitability
        ),
        format!("Soil: pH {}, {}", crop.ph_range(), crop.soil.types.join(", ")),
        format!(
            "Water: {}, Irrigation: {}",
            crop.water.requirement, crop.water.irrigation_cycle
        ),
        format!("Key Practices: {}", practices.join(", ")),
    ];
    if !crop.fertilizer.is_empty() {
        let steps: Vec<String> = crop.fertilizer.iter().take(2).map(|f| f.to_string()).collect();
        lines.push(format!("Fertilizer: {}", steps.join("; ")));
    }
    lines.join("\n")
}

fn render_pest(pest: &PestRecord) -> String {
    let mut lines = vec![
        format!("Disease: {}", pest.display_name()),
        format!("Crop: {}, Severity: {}", pest.crop, pest.severity),
        format!("Summary: {}", pest.summary),
    ];
    if let Some(first) = pest.treatment.first() {
        lines.push(format!("Treatment: {}", first));
    }
    if let Some(first) = pest.prevention.first() {
        lines.push(format!("Prevention: {}", first));
    }
    lines.join("\n")
}

fn ensure_unique<'a>(kind: &str, keys: impl Iterator<Item = &'a str>) -> Result<()> {
    let mut seen = HashSet::new();
    for key in keys {
        if !seen.insert(key) {
            bail!("duplicate {} key in knowledge base: '{}'", kind, key);
        }
    }
    Ok(())
}

pub(crate) fn contains_any(haystack: &str, needles: &[&str]) -> bool {
    needles.iter().any(|n| haystack.contains(n))
}

/// Upper-cases the first letter of every alphabetic run and lower-cases
/// the rest.
pub(crate) fn title_case(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut prev_alpha = false;
    for ch in s.chars() {
        if ch.is_alphabetic() {
            if prev_alpha {
                out.extend(ch.to_lowercase());
            } else {
                out.extend(ch.to_uppercase());
            }
            prev_alpha = true;
        } else {
            out.push(ch);
            prev_alpha = false;
        }
    }
    out
}

/// Whole numbers keep one decimal place (`6.0`); others print as-is (`5.8`).
fn format_decimal(v: f64) -> String {
    if v.fract() == 0.0 {
        format!("{:.1}", v)
    } else {
        format!("{}", v)
    }
}
