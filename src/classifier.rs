//! Plant disease image classification.
//!
//! Images are forwarded as raw bytes to an image-classification endpoint
//! (Hugging Face inference format) which answers with
//! `[{"label": "LABEL_3", "score": 0.97}, ...]`. Labels are mapped to
//! disease names through [`LABEL_MAP`] and scores reported as percentages.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::config::ClassifierConfig;

pub const MODEL_NAME: &str = "disease-detection-model";

pub const ACCEPTED_CONTENT_TYPES: [&str; 3] = ["image/jpeg", "image/png", "image/jpg"];

pub const LABEL_MAP: [(&str, &str); 8] = [
    ("LABEL_0", "Apple___Apple_scab"),
    ("LABEL_1", "Apple___Black_rot"),
    ("LABEL_2", "Apple___Cedar_apple_rust"),
    ("LABEL_3", "Apple___healthy"),
    ("LABEL_4", "Blueberry___healthy"),
    ("LABEL_5", "Cherry_(including_sour)___Powdery_mildew"),
    ("LABEL_6", "Cherry_(including_sour)___healthy"),
    ("LABEL_7", "Corn_(maize)___Cercospora_leaf_spot_Gray_leaf_spot"),
];

#[derive(Debug, thiserror::Error)]
pub enum ClassifierError {
    #[error("classifier request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("classifier returned {status}: {body}")]
    Status {
        status: reqwest::StatusCode,
        body: String,
    },
    #[error("classifier returned no predictions")]
    Empty,
}

/// Unknown labels are returned unchanged.
pub fn disease_name(label: &str) -> &str {
    LABEL_MAP
        .iter()
        .find(|(l, _)| *l == label)
        .map(|(_, name)| *name)
        .unwrap_or(label)
}

pub fn is_accepted_content_type(content_type: &str) -> bool {
    ACCEPTED_CONTENT_TYPES.contains(&content_type)
}

/// Score in `[0, 1]` as a percentage rounded to two decimals.
pub fn to_percent(score: f64) -> f64 {
    (score * 10_000.0).round() / 100.0
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawPrediction {
    pub label: String,
    pub score: f64,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Prediction {
    pub disease: String,
    pub label: String,
    pub confidence: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct Diagnosis {
    pub success: bool,
    pub disease: String,
    pub label: String,
    pub confidence: f64,
    pub all_predictions: Vec<Prediction>,
}

/// Builds the response from raw predictions, best score first.
pub fn diagnose(mut raw: Vec<RawPrediction>) -> Result<Diagnosis, ClassifierError> {
    raw.sort_by(|a, b| b.score.total_cmp(&a.score));

    let all_predictions: Vec<Prediction> = raw
        .iter()
        .map(|r| Prediction {
            disease: disease_name(&r.label).to_string(),
            label: r.label.clone(),
            confidence: to_percent(r.score),
        })
        .collect();

    let top = all_predictions.first().cloned().ok_or(ClassifierError::Empty)?;

    Ok(Diagnosis {
        success: true,
        disease: top.disease,
        label: top.label,
        confidence: top.confidence,
        all_predictions,
    })
}

pub struct DiseaseClassifier {
    client: reqwest::Client,
    url: String,
    token: Option<String>,
}

impl DiseaseClassifier {
    /// Returns `None` when no classifier url is configured.
    pub fn from_config(config: &ClassifierConfig) -> anyhow::Result<Option<Self>> {
        let url = match config.url.as_deref().map(str::trim) {
            Some(u) if !u.is_empty() => u.to_string(),
            _ => return Ok(None),
        };

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Some(Self {
            client,
            url,
            token: std::env::var("HF_API_TOKEN").ok().filter(|t| !t.is_empty()),
        }))
    }

    pub async fn classify(
        &self,
        image: Vec<u8>,
        content_type: &str,
    ) -> Result<Diagnosis, ClassifierError> {
        let mut request = self
            .client
            .post(&self.url)
            .header("Content-Type", content_type)
            .body(image);
        if let Some(token) = &self.token {
            request = request.header("Authorization", format!("Bearer {}", token));
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ClassifierError::Status { status, body });
        }

        let raw: Vec<RawPrediction> = response.json().await?;
        diagnose(raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(label: &str, score: f64) -> RawPrediction {
        RawPrediction {
            label: label.to_string(),
            score,
        }
    }

    #[test]
    fn test_label_mapping() {
        assert_eq!(disease_name("LABEL_1"), "Apple___Black_rot");
        assert_eq!(
            disease_name("LABEL_7"),
            "Corn_(maize)___Cercospora_leaf_spot_Gray_leaf_spot"
        );
        assert_eq!(disease_name("Tomato___healthy"), "Tomato___healthy");
    }

    #[test]
    fn test_percent_rounding() {
        assert_eq!(to_percent(0.97314), 97.31);
        assert_eq!(to_percent(0.5), 50.0);
        assert_eq!(to_percent(0.000049), 0.0);
    }

    #[test]
    fn test_diagnose_orders_by_score() {
        let d = diagnose(vec![raw("LABEL_3", 0.1), raw("LABEL_0", 0.85), raw("X", 0.05)]).unwrap();
        assert!(d.success);
        assert_eq!(d.disease, "Apple___Apple_scab");
        assert_eq!(d.label, "LABEL_0");
        assert_eq!(d.confidence, 85.0);
        assert_eq!(d.all_predictions.len(), 3);
        assert_eq!(d.all_predictions[2].disease, "X");
    }

    #[test]
    fn test_diagnose_empty() {
        assert!(matches!(diagnose(Vec::new()), Err(ClassifierError::Empty)));
    }

    #[test]
    fn test_content_types() {
        assert!(is_accepted_content_type("image/png"));
        assert!(is_accepted_content_type("image/jpg"));
        assert!(!is_accepted_content_type("image/gif"));
        assert!(!is_accepted_content_type("text/plain"));
    }

    #[test]
    fn test_unconfigured_classifier() {
        assert!(DiseaseClassifier::from_config(&ClassifierConfig::default())
            .unwrap()
            .is_none());
    }
}
