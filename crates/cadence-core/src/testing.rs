//! In-process fakes of the collaborator traits, for tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use crate::builtin::Collaborators;
use crate::error::{TriggerError, TriggerResult};
use crate::flow::{ExecutableFlow, ExecutableNode, ExecutionId, FlowExecutor, FlowSubmission, Status};
use crate::metric::MetricStore;
use crate::notify::{Email, Notifier};

/// Flow backend that keeps executions in memory.
#[derive(Debug, Default)]
pub struct FakeFlowExecutor {
    next_id: AtomicI64,
    flows: Mutex<HashMap<ExecutionId, ExecutableFlow>>,
    submissions: Mutex<Vec<FlowSubmission>>,
    cancellations: Mutex<Vec<(ExecutionId, String)>>,
    get_calls: AtomicUsize,
    fail_requests: AtomicBool,
}

impl FakeFlowExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace an execution.
    pub fn insert_flow(&self, flow: ExecutableFlow) {
        self.flows.lock().insert(flow.execution_id, flow);
    }

    /// Running execution submitted and started at `at`.
    pub fn running_flow(execution_id: ExecutionId, flow_id: &str, at: DateTime<Utc>) -> ExecutableFlow {
        ExecutableFlow {
            execution_id,
            project_id: 1,
            flow_id: flow_id.to_string(),
            status: Status::Running,
            submit_time: at,
            start_time: Some(at),
            end_time: None,
            nodes: HashMap::new(),
        }
    }

    pub fn set_status(&self, execution_id: ExecutionId, status: Status) {
        if let Some(flow) = self.flows.lock().get_mut(&execution_id) {
            flow.status = status;
        }
    }

    pub fn set_job(&self, execution_id: ExecutionId, job: &str, node: ExecutableNode) {
        if let Some(flow) = self.flows.lock().get_mut(&execution_id) {
            flow.nodes.insert(job.to_string(), node);
        }
    }

    /// Make every request fail with a backend error.
    pub fn fail_requests(&self, fail: bool) {
        self.fail_requests.store(fail, Ordering::SeqCst);
    }

    pub fn submissions(&self) -> Vec<FlowSubmission> {
        self.submissions.lock().clone()
    }

    pub fn cancellations(&self) -> Vec<(ExecutionId, String)> {
        self.cancellations.lock().clone()
    }

    pub fn get_calls(&self) -> usize {
        self.get_calls.load(Ordering::SeqCst)
    }

    fn check_available(&self) -> TriggerResult<()> {
        if self.fail_requests.load(Ordering::SeqCst) {
            return Err(TriggerError::FlowBackend("backend unavailable".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl FlowExecutor for FakeFlowExecutor {
    async fn submit_flow(&self, submission: &FlowSubmission) -> TriggerResult<ExecutionId> {
        self.check_available()?;
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let mut flow = Self::running_flow(id, &submission.flow_name, Utc::now());
        flow.project_id = submission.project_id;
        self.flows.lock().insert(id, flow);
        self.submissions.lock().push(submission.clone());
        Ok(id)
    }

    async fn get_flow(&self, execution_id: ExecutionId) -> TriggerResult<ExecutableFlow> {
        self.get_calls.fetch_add(1, Ordering::SeqCst);
        self.check_available()?;
        self.flows
            .lock()
            .get(&execution_id)
            .cloned()
            .ok_or_else(|| TriggerError::FlowBackend(format!("execution {execution_id} not found")))
    }

    async fn cancel_flow(&self, execution_id: ExecutionId, user: &str) -> TriggerResult<()> {
        self.check_available()?;
        self.cancellations.lock().push((execution_id, user.to_string()));
        self.set_status(execution_id, Status::Killed);
        Ok(())
    }
}

/// Notifier that records every message.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<Email>>,
    fail: AtomicBool,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<Email> {
        self.sent.lock().clone()
    }

    pub fn fail_sends(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send(&self, email: &Email) -> TriggerResult<()> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(TriggerError::Notification("mail relay refused".into()));
        }
        self.sent.lock().push(email.clone());
        Ok(())
    }
}

/// Fakes bundled as [`Collaborators`], with handles kept for assertions.
pub struct FakeCollaborators {
    pub executor: Arc<FakeFlowExecutor>,
    pub notifier: Arc<RecordingNotifier>,
    pub metrics: Arc<MetricStore>,
}

impl FakeCollaborators {
    pub fn new() -> Self {
        Self {
            executor: Arc::new(FakeFlowExecutor::new()),
            notifier: Arc::new(RecordingNotifier::new()),
            metrics: Arc::new(MetricStore::new()),
        }
    }

    pub fn collaborators(&self) -> Collaborators {
        Collaborators {
            flow_executor: self.executor.clone(),
            notifier: self.notifier.clone(),
            metrics: self.metrics.clone(),
        }
    }
}

impl Default for FakeCollaborators {
    fn default() -> Self {
        Self::new()
    }
}
