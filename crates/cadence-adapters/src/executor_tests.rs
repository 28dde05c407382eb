    use super::*;
    use cadence_core::flow::ExecutionOptions;
    use cadence_core::{Status, TriggerError};
    use serde_json::json;
    use wiremock::{matchers, Mock, MockServer, ResponseTemplate};

    fn submission() -> FlowSubmission {
        FlowSubmission {
            project_id: 7,
            project_name: "etl".into(),
            flow_name: "daily_load".into(),
            submit_user: "alice".into(),
            options: ExecutionOptions::default(),
        }
    }

    #[test]
    fn test_trailing_slash_trimmed() {
        let executor = HttpFlowExecutor::new("http://flows:8081/").unwrap();
        assert_eq!(executor.base_url(), "http://flows:8081");
    }

    #[tokio::test]
    async fn test_submit_flow() {
        let server = MockServer::start().await;
        Mock::given(matchers::method("POST"))
            .and(matchers::path("/executions"))
            .and(matchers::body_partial_json(json!({
                "projectId": 7,
                "flowName": "daily_load",
                "submitUser": "alice"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"execId": 42})))
            .expect(1)
            .mount(&server)
            .await;

        let executor = HttpFlowExecutor::new(server.uri()).unwrap();
        let id = executor.submit_flow(&submission()).await.unwrap();
        assert_eq!(id, 42);
    }

    #[tokio::test]
    async fn test_submit_flow_rejected() {
        let server = MockServer::start().await;
        Mock::given(matchers::method("POST"))
            .and(matchers::path("/executions"))
            .respond_with(ResponseTemplate::new(409).set_body_string("flow already running"))
            .expect(1)
            .mount(&server)
            .await;

        let executor = HttpFlowExecutor::new(server.uri()).unwrap();
        let err = executor.submit_flow(&submission()).await.unwrap_err();
        match err {
            TriggerError::FlowBackend(message) => {
                assert!(message.contains("409"));
                assert!(message.contains("flow already running"));
            }
            other => panic!("expected flow backend error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_get_flow() {
        let server = MockServer::start().await;
        Mock::given(matchers::method("GET"))
            .and(matchers::path("/executions/42"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "executionId": 42,
                "projectId": 7,
                "flowId": "daily_load",
                "status": "RUNNING",
                "submitTime": 1_709_280_000_000_i64,
                "startTime": 1_709_280_005_000_i64,
                "nodes": {
                    "extract": {"status": "SUCCEEDED", "startTime": 1_709_280_005_000_i64, "endTime": 1_709_280_065_000_i64}
                }
            })))
            .mount(&server)
            .await;

        let executor = HttpFlowExecutor::new(server.uri()).unwrap();
        let flow = executor.get_flow(42).await.unwrap();
        assert_eq!(flow.status, Status::Running);
        assert_eq!(flow.flow_id, "daily_load");
        assert!(flow.end_time.is_none());
        assert_eq!(flow.node("extract").unwrap().status, Status::Succeeded);
    }

    #[tokio::test]
    async fn test_get_flow_malformed_body() {
        let server = MockServer::start().await;
        Mock::given(matchers::method("GET"))
            .and(matchers::path("/executions/9"))
            .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
            .mount(&server)
            .await;

        let executor = HttpFlowExecutor::new(server.uri()).unwrap();
        let err = executor.get_flow(9).await.unwrap_err();
        assert!(matches!(err, TriggerError::FlowBackend(_)));
    }

    #[tokio::test]
    async fn test_cancel_flow() {
        let server = MockServer::start().await;
        Mock::given(matchers::method("POST"))
            .and(matchers::path("/executions/42/cancel"))
            .and(matchers::body_json(json!({"user": "sla-monitor"})))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let executor = HttpFlowExecutor::new(server.uri()).unwrap();
        executor.cancel_flow(42, "sla-monitor").await.unwrap();
    }

    #[tokio::test]
    async fn test_unreachable_backend() {
        let executor = HttpFlowExecutor::with_timeout("http://127.0.0.1:1", Duration::from_millis(200)).unwrap();
        let err = executor.get_flow(1).await.unwrap_err();
        assert!(matches!(err, TriggerError::FlowBackend(_)));
    }
