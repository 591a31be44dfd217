//! REST API client for the ComfyUI HTTP endpoints.
//!
//! Wraps workflow submission, history retrieval and output download
//! using [`reqwest`].

use serde::Deserialize;

/// HTTP client for a single ComfyUI instance.
pub struct ComfyUIApi {
    client: reqwest::Client,
    api_url: String,
}

/// Response returned by the ComfyUI `/prompt` endpoint after
/// successfully queuing a workflow.
#[derive(Debug, Deserialize)]
pub struct SubmitResponse {
    /// Server-assigned identifier for the queued prompt.
    pub prompt_id: String,
    /// Position in the execution queue.
    #[serde(default)]
    pub number: i32,
}

/// An image written by a `SaveImage` node.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct OutputImage {
    pub filename: String,
    #[serde(default)]
    pub subfolder: String,
    #[serde(rename = "type", default = "default_output_type")]
    pub kind: String,
}

fn default_output_type() -> String {
    "output".to_string()
}

/// Where a prompt stands according to `/history`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HistoryState {
    /// Not in history yet: still queued or running.
    Pending,
    /// Execution finished with an error.
    Failed(String),
    /// Execution finished and produced this image.
    Ready(OutputImage),
}

/// Errors from the ComfyUI REST API layer.
#[derive(Debug, thiserror::Error)]
pub enum ComfyUIApiError {
    /// The HTTP request itself failed (network, DNS, TLS, etc.).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// ComfyUI returned a non-2xx status code.
    #[error("ComfyUI API error ({status}): {body}")]
    ApiError {
        /// HTTP status code.
        status: u16,
        /// Raw response body for debugging.
        body: String,
    },
}

impl ComfyUIApi {
    /// Create a new API client for a ComfyUI instance.
    ///
    /// * `api_url` - Base HTTP URL, e.g. `http://host:8188`.
    pub fn new(api_url: String) -> Self {
        Self::with_client(reqwest::Client::new(), api_url)
    }

    /// Create an API client reusing an existing [`reqwest::Client`].
    pub fn with_client(client: reqwest::Client, api_url: String) -> Self {
        Self {
            client,
            api_url: api_url.trim_end_matches('/').to_string(),
        }
    }

    /// Submit a workflow for execution.
    ///
    /// Sends a `POST /prompt` request with the given workflow JSON and
    /// client ID.
    pub async fn submit_workflow(
        &self,
        workflow: &serde_json::Value,
        client_id: &str,
    ) -> Result<SubmitResponse, ComfyUIApiError> {
        let body = serde_json::json!({
            "prompt": workflow,
            "client_id": client_id,
        });

        let response = self
            .client
            .post(format!("{}/prompt", self.api_url))
            .json(&body)
            .send()
            .await?;

        Self::parse_response(response).await
    }

    /// Retrieve execution history for a specific prompt.
    ///
    /// Sends a `GET /history/{prompt_id}` request. The body is an empty
    /// object until the prompt has finished executing.
    pub async fn get_history(&self, prompt_id: &str) -> Result<serde_json::Value, ComfyUIApiError> {
        let response = self
            .client
            .get(format!("{}/history/{}", self.api_url, prompt_id))
            .send()
            .await?;

        Self::parse_response(response).await
    }

    /// Download an output file via `GET /view`.
    pub async fn fetch_image(&self, image: &OutputImage) -> Result<Vec<u8>, ComfyUIApiError> {
        let response = self
            .client
            .get(format!("{}/view", self.api_url))
            .query(&[
                ("filename", image.filename.as_str()),
                ("subfolder", image.subfolder.as_str()),
                ("type", image.kind.as_str()),
            ])
            .send()
            .await?;

        let response = Self::ensure_success(response).await?;
        Ok(response.bytes().await?.to_vec())
    }

    // ---- private helpers ----

    /// Ensure the response has a success status code. Returns the
    /// response unchanged on success, or a [`ComfyUIApiError::ApiError`]
    /// containing the status and body text on failure.
    async fn ensure_success(
        response: reqwest::Response,
    ) -> Result<reqwest::Response, ComfyUIApiError> {
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(ComfyUIApiError::ApiError {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }

    /// Parse a successful JSON response body into the expected type.
    async fn parse_response<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, ComfyUIApiError> {
        let response = Self::ensure_success(response).await?;
        Ok(response.json::<T>().await?)
    }
}

/// Interpret a `/history/{prompt_id}` body.
///
/// The first image of the first output node that has one is returned.
pub fn parse_history(history: &serde_json::Value, prompt_id: &str) -> HistoryState {
    let Some(entry) = history.get(prompt_id) else {
        return HistoryState::Pending;
    };

    let status = &entry["status"];
    if status["status_str"].as_str() == Some("error") {
        let detail = status["messages"]
            .as_array()
            .and_then(|messages| {
                messages
                    .iter()
                    .find(|m| m[0].as_str() == Some("execution_error"))
                    .and_then(|m| m[1]["exception_message"].as_str())
            })
            .unwrap_or("execution error");
        return HistoryState::Failed(detail.trim().to_string());
    }

    let image = entry["outputs"].as_object().and_then(|outputs| {
        outputs.values().find_map(|node| {
            node["images"]
                .as_array()
                .and_then(|images| images.first())
                .and_then(|img| serde_json::from_value::<OutputImage>(img.clone()).ok())
        })
    });

    match image {
        Some(image) => HistoryState::Ready(image),
        None if status["completed"].as_bool() == Some(true) => {
            HistoryState::Failed("workflow finished without an output image".to_string())
        }
        None => HistoryState::Pending,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn missing_prompt_is_pending() {
        assert_eq!(parse_history(&json!({}), "abc"), HistoryState::Pending);
    }

    #[test]
    fn finished_prompt_yields_first_image() {
        let history = json!({
            "abc": {
                "status": {"status_str": "success", "completed": true},
                "outputs": {
                    "9": {"images": [
                        {"filename": "covergen_00001_.png", "subfolder": "", "type": "output"}
                    ]}
                }
            }
        });
        assert_eq!(
            parse_history(&history, "abc"),
            HistoryState::Ready(OutputImage {
                filename: "covergen_00001_.png".into(),
                subfolder: String::new(),
                kind: "output".into(),
            })
        );
    }

    #[test]
    fn execution_error_is_reported() {
        let history = json!({
            "abc": {
                "status": {
                    "status_str": "error",
                    "completed": false,
                    "messages": [
                        ["execution_start", {}],
                        ["execution_error", {"exception_message": "LoRA not found\n"}]
                    ]
                },
                "outputs": {}
            }
        });
        assert_eq!(
            parse_history(&history, "abc"),
            HistoryState::Failed("LoRA not found".into())
        );
    }

    #[test]
    fn completed_without_images_is_failure() {
        let history = json!({
            "abc": {"status": {"status_str": "success", "completed": true}, "outputs": {}}
        });
        assert!(matches!(parse_history(&history, "abc"), HistoryState::Failed(_)));
    }
}
