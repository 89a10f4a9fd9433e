//! Batch orchestration against a mock video service over real HTTP

mod common;

use common::{
    Sequence, complete_within, mount_content, mount_job, mount_status, mount_submit_response,
    request_count, status_body, test_config,
};
use serde_json::json;
use std::time::Duration;
use vidgen_dl::{
    BatchOrchestrator, CanonicalStatus, Error, Event, FailureKind, JobRequest, MemberOutcome,
    PollFailure, SubmitError,
};
use wiremock::{MockServer, ResponseTemplate};

const MIB: usize = 1024 * 1024;

#[tokio::test]
async fn batch_with_one_rejected_request_completes_the_rest() {
    let server = MockServer::start().await;
    mount_job(&server, "sunrise over dunes", "video_a").await;
    mount_submit_response(
        &server,
        "storm",
        ResponseTemplate::new(400).set_body_json(json!({"error": {"message": "bad size"}})),
    )
    .await;
    mount_status(
        &server,
        "video_a",
        Sequence::statuses(&[("queued", 0), ("in_progress", 40), ("completed", 100)]),
    )
    .await;
    mount_content(&server, "video_a", vec![7u8; 3 * MIB]).await;

    let orchestrator = BatchOrchestrator::new(test_config(&server)).unwrap();
    let mut session = orchestrator
        .submit_batch(vec![
            JobRequest::new("sunrise over dunes"),
            JobRequest::new("storm"),
        ])
        .await
        .unwrap();

    let events = complete_within(&mut session, 10).await;

    let outcomes = session.outcomes();
    assert_eq!(
        outcomes[0],
        Some(MemberOutcome::Downloaded {
            size_bytes: (3 * MIB) as u64,
            path: None
        })
    );
    match &outcomes[1] {
        Some(MemberOutcome::SubmitFailed(SubmitError::Remote { status, body })) => {
            assert_eq!(*status, 400);
            assert!(body.contains("bad size"));
        }
        other => panic!("expected SubmitFailed, got {other:?}"),
    }

    let progress: Vec<u8> = events
        .iter()
        .filter_map(|e| match e {
            Event::Progress { progress, .. } => Some(*progress),
            _ => None,
        })
        .collect();
    assert_eq!(progress, vec![5, 40, 100]);

    let fractions: Vec<f64> = events
        .iter()
        .filter_map(|e| match e {
            Event::Downloading { fraction, .. } => Some(*fraction),
            _ => None,
        })
        .collect();
    assert_eq!(fractions, vec![1.0 / 3.0, 2.0 / 3.0, 1.0]);

    assert_eq!(
        events.last(),
        Some(&Event::BatchComplete {
            succeeded: 1,
            failed: 1
        })
    );

    let artifact = session.take_artifact(0).unwrap();
    assert_eq!(artifact.len(), 3 * MIB);
    assert_eq!(artifact.mime_type(), "video/mp4");
    assert_eq!(artifact.file_name(), "sora_video_a.mp4");
}

#[tokio::test]
async fn invalid_key_aborts_before_any_poll() {
    let server = MockServer::start().await;
    mount_submit_response(
        &server,
        "anything",
        ResponseTemplate::new(401).set_body_json(json!({"error": {"message": "bad key"}})),
    )
    .await;

    let orchestrator = BatchOrchestrator::new(test_config(&server)).unwrap();
    let result = orchestrator
        .submit_batch(JobRequest::new("anything").replicas(2))
        .await;

    assert!(matches!(result, Err(Error::Unauthorized)));
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(request_count(&server, "GET", "/videos").await, 0);
}

#[tokio::test]
async fn failing_status_endpoint_is_retried() {
    let server = MockServer::start().await;
    mount_job(&server, "flaky", "video_f").await;
    mount_status(
        &server,
        "video_f",
        Sequence::new(vec![
            ResponseTemplate::new(502).set_body_string("bad gateway"),
            status_body(json!({"status": "processing", "progress": 3})),
            status_body(json!({"status": "succeeded", "progress": 100})),
        ]),
    )
    .await;
    mount_content(&server, "video_f", b"tiny".to_vec()).await;

    let orchestrator = BatchOrchestrator::new(test_config(&server)).unwrap();
    let mut session = orchestrator
        .submit_one(JobRequest::new("flaky"))
        .await
        .unwrap();

    let events = complete_within(&mut session, 10).await;

    let hiccups: Vec<&Event> = events
        .iter()
        .filter(|e| e.failure_kind() == Some(FailureKind::TransportHiccup))
        .collect();
    assert_eq!(hiccups.len(), 1);

    // Floor applies to the low rendering report
    assert!(events.iter().any(|e| matches!(
        e,
        Event::Progress { status: CanonicalStatus::Rendering, progress: 10, .. }
    )));
    assert!(session.outcomes()[0].as_ref().unwrap().is_success());
    assert_eq!(request_count(&server, "GET", "/videos/video_f").await, 4);
}

#[tokio::test]
async fn revoked_key_during_polling_ends_the_job() {
    let server = MockServer::start().await;
    mount_job(&server, "revoked", "video_r").await;
    mount_job(&server, "healthy", "video_h").await;
    mount_status(
        &server,
        "video_r",
        Sequence::new(vec![
            status_body(json!({"status": "in_progress", "progress": 20})),
            ResponseTemplate::new(401).set_body_json(json!({"error": {"message": "key revoked"}})),
        ]),
    )
    .await;
    mount_status(
        &server,
        "video_h",
        Sequence::statuses(&[("in_progress", 50), ("completed", 100)]),
    )
    .await;
    mount_content(&server, "video_h", b"ok".to_vec()).await;

    let orchestrator = BatchOrchestrator::new(test_config(&server)).unwrap();
    let mut session = orchestrator
        .submit_batch(vec![JobRequest::new("revoked"), JobRequest::new("healthy")])
        .await
        .unwrap();

    let events = complete_within(&mut session, 10).await;

    assert!(events.iter().any(|e| matches!(
        e,
        Event::PollFailed { index: 0, failure: PollFailure::Unauthorized, error, .. }
            if error.contains("key revoked")
    )));
    assert!(matches!(
        &session.outcomes()[0],
        Some(MemberOutcome::PollFailed { failure: PollFailure::Unauthorized, .. })
    ));
    assert_eq!(
        session.outcomes()[0].as_ref().unwrap().failure_kind(),
        Some(FailureKind::Unauthorized)
    );
    assert!(session.outcomes()[1].as_ref().unwrap().is_success());

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(request_count(&server, "GET", "/videos/video_r").await, 2);
}

#[tokio::test]
async fn garbage_status_body_ends_the_job() {
    let server = MockServer::start().await;
    mount_job(&server, "garbled", "video_g").await;
    mount_status(
        &server,
        "video_g",
        Sequence::new(vec![ResponseTemplate::new(200).set_body_string("not json")]),
    )
    .await;

    let orchestrator = BatchOrchestrator::new(test_config(&server)).unwrap();
    let mut session = orchestrator
        .submit_one(JobRequest::new("garbled"))
        .await
        .unwrap();

    let events = complete_within(&mut session, 10).await;

    let failed = events
        .iter()
        .find(|e| matches!(e, Event::PollFailed { .. }))
        .expect("poll failure reported");
    assert_eq!(failed.failure_kind(), Some(FailureKind::PollRejected));
    assert_eq!(
        events.last(),
        Some(&Event::BatchComplete {
            succeeded: 0,
            failed: 1
        })
    );
    assert!(!events.iter().any(|e| matches!(e, Event::PollHiccup { .. })));

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(request_count(&server, "GET", "/videos/video_g").await, 1);
}

#[tokio::test]
async fn remote_failure_detail_is_reported() {
    let server = MockServer::start().await;
    mount_job(&server, "forbidden", "video_x").await;
    mount_status(
        &server,
        "video_x",
        Sequence::new(vec![status_body(json!({
            "status": "failed",
            "progress": 0,
            "error": {"code": "moderation_blocked", "message": "Request blocked"}
        }))]),
    )
    .await;

    let orchestrator = BatchOrchestrator::new(test_config(&server)).unwrap();
    let mut session = orchestrator
        .submit_one(JobRequest::new("forbidden"))
        .await
        .unwrap();

    let events = complete_within(&mut session, 10).await;

    assert!(events.iter().any(|e| matches!(
        e,
        Event::JobFailed { error: Some(msg), .. } if msg == "Request blocked"
    )));
    assert_eq!(
        session.outcomes()[0].as_ref().unwrap().failure_kind(),
        Some(FailureKind::RemoteJobFailed)
    );
    assert_eq!(request_count(&server, "GET", "/videos/video_x/content").await, 0);
}

#[tokio::test]
async fn missing_artifact_is_a_download_failure() {
    let server = MockServer::start().await;
    mount_job(&server, "vanished", "video_v").await;
    mount_status(&server, "video_v", Sequence::statuses(&[("completed", 100)])).await;
    // No content mock: wiremock answers 404

    let orchestrator = BatchOrchestrator::new(test_config(&server)).unwrap();
    let mut session = orchestrator
        .submit_one(JobRequest::new("vanished"))
        .await
        .unwrap();

    let events = complete_within(&mut session, 10).await;

    assert!(events.iter().any(|e| matches!(e, Event::JobSucceeded { .. })));
    assert!(events.iter().any(|e| matches!(e, Event::DownloadFailed { .. })));
    let member = session.member(0).unwrap();
    assert_eq!(
        member.state.as_ref().unwrap().status,
        CanonicalStatus::Succeeded
    );
    assert!(matches!(
        member.outcome,
        Some(MemberOutcome::DownloadFailed(_))
    ));
}

#[tokio::test]
async fn artifacts_are_saved_to_output_dir() {
    let server = MockServer::start().await;
    let out = tempfile::tempdir().unwrap();
    mount_job(&server, "save me", "video_s").await;
    mount_status(&server, "video_s", Sequence::statuses(&[("completed", 100)])).await;
    mount_content(&server, "video_s", b"\x00\x00\x00\x18ftypmp42".to_vec()).await;

    let mut config = test_config(&server);
    config.download.output_dir = Some(out.path().to_path_buf());
    let orchestrator = BatchOrchestrator::new(config).unwrap();
    let mut session = orchestrator
        .submit_one(JobRequest::new("save me"))
        .await
        .unwrap();

    let events = complete_within(&mut session, 10).await;

    let expected = out.path().join("sora_video_s.mp4");
    assert!(events.iter().any(|e| matches!(
        e,
        Event::ArtifactReady { path: Some(p), .. } if *p == expected
    )));
    assert_eq!(
        std::fs::read(&expected).unwrap(),
        b"\x00\x00\x00\x18ftypmp42"
    );
}

#[tokio::test]
async fn shutdown_stops_polling_a_stuck_job() {
    let server = MockServer::start().await;
    mount_job(&server, "stuck", "video_q").await;
    mount_status(&server, "video_q", Sequence::statuses(&[("queued", 0)])).await;

    let orchestrator = BatchOrchestrator::new(test_config(&server)).unwrap();
    let mut session = orchestrator
        .submit_one(JobRequest::new("stuck"))
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_millis(150)).await;
    session.shutdown().await;
    assert_eq!(session.outcomes()[0], Some(MemberOutcome::Abandoned));

    tokio::time::sleep(Duration::from_millis(50)).await;
    let polls = request_count(&server, "GET", "/videos/video_q").await;
    assert!(polls > 0);
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(request_count(&server, "GET", "/videos/video_q").await, polls);
}
