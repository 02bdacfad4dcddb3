// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Inference service client
//!
//! Uploads an oral-cavity image as a multipart form and normalizes the two
//! response shapes the service is known to emit: a single `class` +
//! `confidence` pair (class as numeric index or label string, optional
//! `gradcam` overlay) and a `detections` array (optional
//! `result_image_base64` overlay).

use async_trait::async_trait;
use base64::{engine::general_purpose, Engine as _};
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

use crate::taxonomy::Condition;
use crate::{Result, ScanError};

/// Opaque reference to an image (a path or URI; this crate never decodes it).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageRef(String);

impl ImageRef {
    pub fn new(reference: impl Into<String>) -> Self {
        Self(reference.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// One raw detection after shape normalization.
#[derive(Debug, Clone, PartialEq)]
pub struct RawDetection {
    pub label: String,
    pub confidence: f64,
}

/// Normalized inference response.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct InferenceReply {
    pub detections: Vec<RawDetection>,
    pub overlay_base64: Option<String>,
}

impl InferenceReply {
    /// Decode the overlay image, when the service attached one.
    pub fn overlay_bytes(&self) -> Result<Option<Vec<u8>>> {
        match &self.overlay_base64 {
            None => Ok(None),
            Some(encoded) => general_purpose::STANDARD
                .decode(encoded)
                .map(Some)
                .map_err(|e| ScanError::MalformedResponse(format!("Bad overlay encoding: {}", e))),
        }
    }
}

/// Boundary to the remote disease-classification service.
#[async_trait]
pub trait Infer: Send + Sync {
    async fn predict(&self, image: &ImageRef) -> Result<InferenceReply>;
}

#[derive(Deserialize)]
struct WireReply {
    class: Option<serde_json::Value>,
    confidence: Option<f64>,
    detections: Option<Vec<WireDetection>>,
    result_image_base64: Option<String>,
    gradcam: Option<String>,
}

#[derive(Deserialize)]
struct WireDetection {
    class: serde_json::Value,
    confidence: f64,
}

fn label_from_class(class: &serde_json::Value) -> Result<String> {
    match class {
        serde_json::Value::String(label) => Ok(label.clone()),
        serde_json::Value::Number(n) => {
            let index = n.as_u64().ok_or_else(|| {
                ScanError::MalformedResponse(format!("Non-integral class index: {}", n))
            })?;
            Ok(Condition::from_index(index)
                .map(|c| c.display_name().to_string())
                .unwrap_or_else(|| index.to_string()))
        }
        other => Err(ScanError::MalformedResponse(format!(
            "Unexpected class value: {}",
            other
        ))),
    }
}

/// Normalize either wire shape into an [`InferenceReply`].
pub fn normalize_reply(body: &str) -> Result<InferenceReply> {
    let wire: WireReply = serde_json::from_str(body)
        .map_err(|e| ScanError::MalformedResponse(format!("Undecodable reply: {}", e)))?;

    // Multi-label shape wins when both are present
    if let Some(detections) = wire.detections {
        let detections = detections
            .iter()
            .map(|d| {
                Ok(RawDetection {
                    label: label_from_class(&d.class)?,
                    confidence: d.confidence,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        return Ok(InferenceReply {
            detections,
            overlay_base64: wire.result_image_base64,
        });
    }

    match (wire.class, wire.confidence) {
        (Some(class), Some(confidence)) => Ok(InferenceReply {
            detections: vec![RawDetection {
                label: label_from_class(&class)?,
                confidence,
            }],
            overlay_base64: wire.gradcam,
        }),
        _ => Err(ScanError::MalformedResponse(
            "Reply carries neither a detections array nor a class/confidence pair".to_string(),
        )),
    }
}

/// HTTP inference client
pub struct HttpInferenceClient {
    client: Client,
    predict_url: String,
}

impl HttpInferenceClient {
    /// Create a new inference client with a bounded request timeout.
    pub fn new(predict_url: &str, timeout: Duration) -> Self {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .expect("Failed to create HTTP client");

        Self {
            client,
            predict_url: predict_url.trim_end_matches('/').to_string(),
        }
    }

    /// Check if the inference service is reachable
    pub async fn health_check(&self) -> Result<()> {
        let root = self
            .predict_url
            .strip_suffix("/predict")
            .unwrap_or(&self.predict_url);

        self.client
            .get(root)
            .timeout(Duration::from_secs(10))
            .send()
            .await
            .map_err(|e| {
                ScanError::Network(format!(
                    "Cannot connect to inference service at {}: {}",
                    root, e
                ))
            })?;

        Ok(())
    }
}

#[async_trait]
impl Infer for HttpInferenceClient {
    async fn predict(&self, image: &ImageRef) -> Result<InferenceReply> {
        let data = tokio::fs::read(image.as_str()).await?;

        let part = Part::bytes(data)
            .file_name("image.jpg")
            .mime_str("image/jpeg")?;
        let form = Form::new().part("file", part);

        debug!("Uploading image for prediction: {}", image.as_str());

        let response = self
            .client
            .post(&self.predict_url)
            .multipart(form)
            .send()
            .await
            .map_err(|e| ScanError::Network(e.to_string()))?;

        if !response.status().is_success() {
            return Err(ScanError::Network(format!(
                "Inference service returned status {}",
                response.status()
            )));
        }

        let body = response
            .text()
            .await
            .map_err(|e| ScanError::Network(e.to_string()))?;

        normalize_reply(&body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_label_with_numeric_class() {
        let reply = normalize_reply(r#"{"class": 1, "confidence": 0.87}"#).unwrap();
        assert_eq!(reply.detections.len(), 1);
        assert_eq!(reply.detections[0].label, "Caries");
        assert!((reply.detections[0].confidence - 0.87).abs() < 1e-9);
        assert_eq!(reply.overlay_base64, None);
    }

    #[test]
    fn single_label_with_string_class_and_gradcam() {
        let reply =
            normalize_reply(r#"{"class": "Gingivitis", "confidence": 0.6, "gradcam": "QUJD"}"#)
                .unwrap();
        assert_eq!(reply.detections[0].label, "Gingivitis");
        assert_eq!(reply.overlay_base64.as_deref(), Some("QUJD"));
        assert_eq!(reply.overlay_bytes().unwrap(), Some(b"ABC".to_vec()));
    }

    #[test]
    fn multi_label_shape() {
        let body = r#"{
            "detections": [
                {"class": "Calculus", "confidence": 0.91},
                {"class": "Ulcers", "confidence": 0.44}
            ],
            "result_image_base64": "QUJD"
        }"#;
        let reply = normalize_reply(body).unwrap();
        assert_eq!(reply.detections.len(), 2);
        assert_eq!(reply.detections[0].label, "Calculus");
        assert_eq!(reply.detections[1].label, "Ulcers");
        assert_eq!(reply.overlay_base64.as_deref(), Some("QUJD"));
    }

    #[test]
    fn empty_detections_array_is_valid() {
        let reply = normalize_reply(r#"{"detections": []}"#).unwrap();
        assert!(reply.detections.is_empty());
    }

    #[test]
    fn unmapped_numeric_index_keeps_the_raw_label() {
        let reply = normalize_reply(r#"{"class": 9, "confidence": 0.5}"#).unwrap();
        assert_eq!(reply.detections[0].label, "9");
    }

    #[test]
    fn neither_shape_is_malformed() {
        let err = normalize_reply(r#"{"status": "ok"}"#).unwrap_err();
        assert!(matches!(err, ScanError::MalformedResponse(_)));

        let err = normalize_reply("not json").unwrap_err();
        assert!(matches!(err, ScanError::MalformedResponse(_)));
    }

    #[test]
    fn bad_overlay_encoding_is_malformed() {
        let reply = InferenceReply {
            detections: Vec::new(),
            overlay_base64: Some("!!!".to_string()),
        };
        assert!(matches!(
            reply.overlay_bytes(),
            Err(ScanError::MalformedResponse(_))
        ));
    }
}
