use std::time::Duration;

use async_trait::async_trait;
use pilah_types::{
    classification::{ClassificationResult, ConfidenceScale, WasteCategory},
    config::{PayloadEncoding, RemoteConfig},
    vision::StillFrame,
    Result,
};
use pilah_vision::{encode_jpeg, to_data_url};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{network_error, Classifier};

/// Classifier that POSTs the JPEG still to an HTTP endpoint.
pub struct RemoteClassifier {
    config: RemoteConfig,
    jpeg_quality: u8,
    agent: ureq::Agent,
}

#[derive(Serialize)]
struct ImagePayload<'a> {
    image: &'a str,
}

#[derive(Deserialize)]
struct PredictionBody {
    #[serde(alias = "predicted_class")]
    prediction: String,
    confidence: f64,
}

#[derive(Deserialize)]
struct ErrorBody {
    error: Option<String>,
}

struct HttpReply {
    status: u16,
    status_text: String,
    body: String,
}

impl RemoteClassifier {
    pub fn new(config: RemoteConfig, jpeg_quality: u8) -> Self {
        let mut builder = ureq::AgentBuilder::new();
        if let Some(ms) = config.timeout_ms {
            builder = builder.timeout(Duration::from_millis(ms));
        }
        Self {
            config,
            jpeg_quality,
            agent: builder.build(),
        }
    }

    fn build_body(&self, jpeg: &[u8]) -> Result<(String, Vec<u8>)> {
        match self.config.payload {
            PayloadEncoding::Json => {
                let url = to_data_url(jpeg);
                let body = serde_json::to_vec(&ImagePayload { image: &url })
                    .map_err(|err| network_error(format!("failed to serialize payload: {err}")))?;
                Ok(("application/json".into(), body))
            }
            PayloadEncoding::Multipart => {
                let boundary = multipart_boundary();
                Ok((
                    format!("multipart/form-data; boundary={boundary}"),
                    multipart_body(&boundary, jpeg),
                ))
            }
        }
    }
}

fn multipart_boundary() -> String {
    format!("----pilah{}", Uuid::new_v4().simple())
}

fn multipart_body(boundary: &str, jpeg: &[u8]) -> Vec<u8> {
    let mut body = Vec::with_capacity(jpeg.len() + 256);
    body.extend_from_slice(format!("--{boundary}\r\n").as_bytes());
    body.extend_from_slice(
        b"Content-Disposition: form-data; name=\"file\"; filename=\"image.jpg\"\r\n",
    );
    body.extend_from_slice(b"Content-Type: image/jpeg\r\n\r\n");
    body.extend_from_slice(jpeg);
    body.extend_from_slice(format!("\r\n--{boundary}--\r\n").as_bytes());
    body
}

fn send(agent: ureq::Agent, endpoint: &str, content_type: &str, body: &[u8]) -> Result<HttpReply> {
    let response = match agent
        .post(endpoint)
        .set("Content-Type", content_type)
        .send_bytes(body)
    {
        Ok(response) => response,
        Err(ureq::Error::Status(_, response)) => response,
        Err(ureq::Error::Transport(transport)) => {
            return Err(network_error(format!(
                "request to {endpoint} failed: {transport}"
            )))
        }
    };
    let status = response.status();
    let status_text = response.status_text().to_string();
    let body = response
        .into_string()
        .map_err(|err| network_error(format!("failed to read response body: {err}")))?;
    Ok(HttpReply {
        status,
        status_text,
        body,
    })
}

/// Turn an HTTP reply into a result, normalizing confidence to [0, 1].
///
/// Non-2xx replies become `HTTP error! Status: <code>, Message: <error>`.
pub fn interpret_response(
    status: u16,
    status_text: &str,
    body: &str,
    scale: ConfidenceScale,
) -> Result<ClassificationResult> {
    if !(200..300).contains(&status) {
        let message = serde_json::from_str::<ErrorBody>(body)
            .ok()
            .and_then(|b| b.error)
            .unwrap_or_else(|| status_text.to_string());
        return Err(network_error(format!(
            "HTTP error! Status: {status}, Message: {message}"
        )));
    }
    let parsed: PredictionBody = serde_json::from_str(body)
        .map_err(|err| network_error(format!("malformed classifier response: {err}")))?;
    let label: WasteCategory = parsed.prediction.parse()?;
    let confidence = scale.normalize(parsed.confidence)?;
    ClassificationResult::new(label, confidence)
}

#[async_trait]
impl Classifier for RemoteClassifier {
    fn name(&self) -> &'static str {
        "remote"
    }

    async fn classify(&self, frame: &StillFrame) -> Result<ClassificationResult> {
        let jpeg = encode_jpeg(frame, self.jpeg_quality)?;
        let (content_type, body) = self.build_body(&jpeg)?;
        debug!(
            "Posting {} byte {:?} payload to {}",
            body.len(),
            self.config.payload,
            self.config.endpoint
        );

        let agent = self.agent.clone();
        let endpoint = self.config.endpoint.clone();
        let reply = tokio::task::spawn_blocking(move || {
            send(agent, &endpoint, &content_type, &body)
        })
        .await
        .map_err(|err| network_error(format!("request task failed: {err}")))??;

        match interpret_response(
            reply.status,
            &reply.status_text,
            &reply.body,
            self.config.confidence_scale,
        ) {
            Ok(result) => {
                info!(
                    "Remote classifier answered {} ({})",
                    result.label(),
                    result.confidence_percent()
                );
                Ok(result)
            }
            Err(err) => {
                warn!("Remote classification failed: {}", err);
                Err(err)
            }
        }
    }
}
