//! HTTP client for the flow execution backend.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use cadence_core::flow::FlowSubmission;
use cadence_core::{ExecutableFlow, ExecutionId, FlowExecutor, TriggerResult};

use crate::error::{check_status, AdapterError};

#[cfg(test)]
#[path = "executor_tests.rs"]
mod tests;

const DEFAULT_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SubmitResponse {
    exec_id: ExecutionId,
}

#[derive(Debug, Serialize)]
struct CancelRequest<'a> {
    user: &'a str,
}

/// Flow backend reached over HTTP.
///
/// Endpoints, relative to the base URL:
/// - `POST /executions` with a [`FlowSubmission`] body, answering `{"execId": n}`
/// - `GET /executions/{id}` answering an [`ExecutableFlow`]
/// - `POST /executions/{id}/cancel` with `{"user": ...}`
pub struct HttpFlowExecutor {
    base_url: String,
    client: reqwest::Client,
}

impl HttpFlowExecutor {
    pub fn new(base_url: impl Into<String>) -> Result<Self, AdapterError> {
        Self::with_timeout(base_url, Duration::from_secs(DEFAULT_TIMEOUT_SECS))
    }

    pub fn with_timeout(base_url: impl Into<String>, timeout: Duration) -> Result<Self, AdapterError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AdapterError::Network(e.to_string()))?;
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn submit(&self, submission: &FlowSubmission) -> Result<ExecutionId, AdapterError> {
        let response = self
            .client
            .post(format!("{}/executions", self.base_url))
            .json(submission)
            .send()
            .await?;
        let body: SubmitResponse = check_status(response).await?.json().await?;
        Ok(body.exec_id)
    }

    async fn fetch(&self, execution_id: ExecutionId) -> Result<ExecutableFlow, AdapterError> {
        let response = self
            .client
            .get(format!("{}/executions/{execution_id}", self.base_url))
            .send()
            .await?;
        Ok(check_status(response).await?.json().await?)
    }

    async fn cancel(&self, execution_id: ExecutionId, user: &str) -> Result<(), AdapterError> {
        let response = self
            .client
            .post(format!("{}/executions/{execution_id}/cancel", self.base_url))
            .json(&CancelRequest { user })
            .send()
            .await?;
        check_status(response).await?;
        Ok(())
    }
}

#[async_trait]
impl FlowExecutor for HttpFlowExecutor {
    async fn submit_flow(&self, submission: &FlowSubmission) -> TriggerResult<ExecutionId> {
        let id = self.submit(submission).await.map_err(AdapterError::into_flow_backend)?;
        info!(
            execution_id = id,
            project = %submission.project_name,
            flow = %submission.flow_name,
            "Submitted flow"
        );
        Ok(id)
    }

    async fn get_flow(&self, execution_id: ExecutionId) -> TriggerResult<ExecutableFlow> {
        let flow = self.fetch(execution_id).await.map_err(AdapterError::into_flow_backend)?;
        debug!(execution_id, status = %flow.status, "Fetched execution");
        Ok(flow)
    }

    async fn cancel_flow(&self, execution_id: ExecutionId, user: &str) -> TriggerResult<()> {
        self.cancel(execution_id, user)
            .await
            .map_err(AdapterError::into_flow_backend)?;
        info!(execution_id, user, "Cancelled execution");
        Ok(())
    }
}
