//! Streaming report request.

use std::collections::HashMap;
use std::sync::Arc;
use tracing::instrument;

use crate::auth::{ApiKeyAuth, AuthProvider};
use crate::config::ApiConfig;
use crate::errors::CouncilResult;
use crate::prompt;
use crate::transport::{DeltaStream, HttpRequest, HttpTransport, HttpTransportImpl};
use crate::types::context::ProductContext;

/// Issues chat-completions requests and hands back the decoded stream.
pub struct ReportService {
    transport: Arc<dyn HttpTransport>,
}

impl ReportService {
    /// Creates a new report service.
    pub fn new(transport: Arc<dyn HttpTransport>) -> Self {
        Self { transport }
    }

    /// Creates a service backed by reqwest, using the configuration's timeout.
    pub fn from_config(config: &ApiConfig) -> CouncilResult<Self> {
        let transport = HttpTransportImpl::new(config.timeout)?;
        Ok(Self::new(Arc::new(transport)))
    }

    /// Sends one streaming request for `context` and returns its deltas.
    ///
    /// Fails with `Http` when the endpoint answers with a non-2xx status and
    /// with `Network` when it cannot be reached. No retries are attempted.
    #[instrument(skip_all, fields(model = %config.model, images = context.images.len()))]
    pub async fn stream_report(
        &self,
        config: &ApiConfig,
        context: &ProductContext,
    ) -> CouncilResult<DeltaStream> {
        config.ensure_complete()?;

        let auth = ApiKeyAuth::from_config(config);
        auth.validate()?;

        let body = serde_json::to_vec(&prompt::build_request(context, &config.model))?;
        let http_request = self.build_request(config, &auth, body);

        if config.uses_insecure_transport() {
            tracing::warn!(url = %http_request.url, "Sending API key over plain HTTP");
        }
        tracing::debug!(url = %http_request.url, key = %auth.key_hint(), "Requesting report");

        let response = self.transport.send_streaming(http_request).await?;
        tracing::debug!(status = response.status, "Report stream opened");

        DeltaStream::from_response(response).await
    }

    fn build_request(&self, config: &ApiConfig, auth: &dyn AuthProvider, body: Vec<u8>) -> HttpRequest {
        let mut headers = HashMap::new();
        auth.apply_auth(&mut headers);
        headers.insert("Content-Type".to_string(), "application/json".to_string());
        headers.insert("Accept".to_string(), "text/event-stream".to_string());

        HttpRequest {
            url: config.endpoint(),
            headers,
            body: Some(body),
            timeout: Some(config.timeout),
        }
    }
}

impl std::fmt::Debug for ReportService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReportService").finish_non_exhaustive()
    }
}
