use crate::protocol::{DetectRequest, Request, Response};
use crate::session::BackendSession;
use ocrw_backend::OcrBackend;
use serde_json::Value;
use tracing::debug;

/// Dispatches decoded commands and turns every outcome into a `Response`.
pub struct CommandHandler<B> {
    session: BackendSession<B>,
}

impl<B: OcrBackend> CommandHandler<B> {
    pub fn new(session: BackendSession<B>) -> Self {
        Self { session }
    }

    pub fn session(&self) -> &BackendSession<B> {
        &self.session
    }

    pub async fn handle(&mut self, command: Value) -> Response {
        let request = match Request::from_value(command) {
            Ok(request) => request,
            Err(e) => {
                debug!("Rejected command: {}", e);
                return Response::failure(e.to_string());
            }
        };

        match request {
            Request::Detect(detect) => self.detect(detect).await,
            Request::CheckDependencies => self.check_dependencies().await,
        }
    }

    async fn detect(&mut self, request: DetectRequest) -> Response {
        debug!(
            "detect: {} base64 chars, languages {:?}",
            request.image_data.len(),
            request.languages
        );
        if !request.options.is_empty() {
            debug!(
                "Ignoring detect options: {:?}",
                request.options.keys().collect::<Vec<_>>()
            );
        }

        match self
            .session
            .detect(&request.languages, &request.image_data)
            .await
        {
            Ok(results) => Response::Detections(results),
            Err(e) => Response::failure(e.to_string()),
        }
    }

    async fn check_dependencies(&self) -> Response {
        debug!("check_dependencies");
        match self.session.check_dependencies().await {
            Ok(report) => Response::Dependencies(report),
            Err(e) => Response::failure(e.to_string()),
        }
    }
}
