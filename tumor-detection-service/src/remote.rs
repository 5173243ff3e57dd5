use std::collections::BTreeMap;
use std::io::Cursor;

use anyhow::anyhow;
use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose::STANDARD};
use image::{DynamicImage, ImageFormat};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::info;
use tumor_inference::{Classifier, ClassificationResult, InferenceError, Result, TumorLabel};

#[derive(Debug, Serialize)]
struct InferenceRequest {
    image: String,
}

#[derive(Debug, Deserialize)]
struct InferenceResponse {
    label: String,
    probabilities: BTreeMap<String, f64>,
}

/// Classifier backed by a remote model-serving endpoint.
///
/// The image is PNG-encoded, base64ed, and POSTed as `{"image": ...}`; the
/// endpoint answers with the winning label and the full distribution. The
/// model runtime itself stays entirely behind this seam.
pub struct RemoteClassifier {
    client: Client,
    endpoint: String,
}

impl RemoteClassifier {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            endpoint: endpoint.into(),
        }
    }

    async fn call_endpoint(&self, image: &DynamicImage) -> anyhow::Result<InferenceResponse> {
        let payload = InferenceRequest {
            image: image_to_base64(image)?,
        };

        let response = self
            .client
            .post(&self.endpoint)
            .json(&payload)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(anyhow!(
                "inference endpoint returned {}",
                response.status()
            ));
        }

        Ok(response.json::<InferenceResponse>().await?)
    }
}

#[async_trait]
impl Classifier for RemoteClassifier {
    async fn classify(&self, image: &DynamicImage) -> Result<ClassificationResult> {
        let response = self
            .call_endpoint(image)
            .await
            .map_err(|e| InferenceError::Classifier(e.to_string()))?;

        let label: TumorLabel = response.label.parse().map_err(|_| {
            InferenceError::InvalidClassification(format!(
                "unrecognized winning label {:?}",
                response.label
            ))
        })?;

        let mut probabilities = BTreeMap::new();
        for (name, probability) in response.probabilities {
            let key: TumorLabel = name.parse().map_err(|_| {
                InferenceError::InvalidClassification(format!(
                    "unrecognized label key {name:?} in distribution"
                ))
            })?;
            probabilities.insert(key, probability);
        }

        info!(label = %label, "remote classification received");
        Ok(ClassificationResult::new(label, probabilities))
    }
}

/// Encode an image to base64 PNG for transport.
fn image_to_base64(image: &DynamicImage) -> anyhow::Result<String> {
    let mut buffer = Vec::new();
    let mut cursor = Cursor::new(&mut buffer);

    image
        .write_to(&mut cursor, ImageFormat::Png)
        .map_err(|e| anyhow!("Failed to encode image: {e}"))?;

    Ok(STANDARD.encode(&buffer))
}
