//! Session handshake and streaming tests against a scripted peer


use std::sync::Arc;
use std::time::Duration;

use test_utils::{wait_for_watch, MockTransport, PeerScript, WAIT};
use twophone_core::protocol::DeviceCheckRequest;
use twophone_core::{
    DeviceIdentity, FailureKind, MessageType, OperatingSystem, Session, SessionConfig,
    SessionError, SessionOutcome, SessionState, Transport,
};

fn session_for(transport: &Arc<MockTransport>, script: PeerScript) -> Session {
    let device = transport.add_peer("Pixel 8", "peripheral-1", script);
    Session::new(
        device,
        DeviceIdentity::from_token("IDENTITY-TOKEN"),
        Arc::clone(transport) as Arc<dyn Transport>,
        SessionConfig::default().with_reply_timeout(Duration::from_millis(200)),
    )
}

fn assert_send<T: Send>(_: &T) {}

// ----------------------------------------------------------------------------
// Handshake
// ----------------------------------------------------------------------------

#[tokio::test]
async fn test_session_future_can_be_spawned() {
    let transport = MockTransport::new();
    let run = session_for(&transport, PeerScript::accepting()).run();
    assert_send(&run);

    let mut session = session_for(&transport, PeerScript::accepting());
    assert_send(&session.start());
}

#[tokio::test]
async fn test_handshake_reaches_streaming() {
    let transport = MockTransport::new();
    let mut session = session_for(&transport, PeerScript::accepting());

    session.start().await.unwrap();

    assert_eq!(session.state(), SessionState::Streaming);
    assert_eq!(session.operating_system(), Some(OperatingSystem::Android));
    assert_eq!(session.peer_session_id(), Some("peer-session"));

    let id = session.device().id.clone();
    assert_eq!(
        transport.written_types(&id),
        vec![MessageType::CheckVersion, MessageType::CheckDevice]
    );

    let written = transport.written(&id);
    assert_eq!(written[0].payload(), &[1, 0, 0, 0]);
    let request: DeviceCheckRequest = serde_json::from_slice(written[1].payload()).unwrap();
    assert_eq!(request.uuid, "IDENTITY-TOKEN");
    assert_eq!(request.os, OperatingSystem::Ios.tag());

    session.close().await;
}

#[tokio::test]
async fn test_separate_os_negotiation() {
    let transport = MockTransport::new();
    let mut session = session_for(&transport, PeerScript::negotiating_os(1));

    session.start().await.unwrap();

    assert_eq!(session.operating_system(), Some(OperatingSystem::Ios));
    let id = session.device().id.clone();
    assert_eq!(
        transport.written_types(&id),
        vec![
            MessageType::CheckVersion,
            MessageType::CheckDevice,
            MessageType::CheckOperatingSystem
        ]
    );
    assert_eq!(transport.written(&id)[2].payload(), &[OperatingSystem::Ios.tag()]);
}

#[tokio::test]
async fn test_version_rejected_never_checks_device() {
    let transport = MockTransport::new();
    let session = session_for(&transport, PeerScript::rejecting_version());
    let id = session.device().id.clone();
    let state = session.subscribe_state();

    let result = session.run().await;

    assert!(matches!(result, Err(SessionError::VersionMismatch { local: 1 })));
    assert_eq!(*state.borrow(), SessionState::Closed);
    assert_eq!(transport.written_types(&id), vec![MessageType::CheckVersion]);
    assert!(!transport.is_linked(&id));
}

#[tokio::test]
async fn test_unauthorized_device_closes_without_clear() {
    let transport = MockTransport::new();
    let session = session_for(&transport, PeerScript::unauthorized());
    let id = session.device().id.clone();

    let error = session.run().await.unwrap_err();

    assert!(matches!(error, SessionError::DeviceUnregistered));
    assert_eq!(error.kind(), FailureKind::DeviceUnregistered);
    assert!(!transport
        .written_types(&id)
        .contains(&MessageType::ClearDevice));
}

#[tokio::test]
async fn test_illegal_operating_system() {
    let transport = MockTransport::new();
    let session = session_for(&transport, PeerScript::negotiating_os(42));

    assert!(matches!(
        session.run().await,
        Err(SessionError::IllegalOperatingSystem { tag: 42 })
    ));
}

#[tokio::test]
async fn test_stray_frames_are_dropped_during_handshake() {
    let transport = MockTransport::new();
    let mut session = session_for(&transport, PeerScript::accepting().with_stray_frames());

    session.start().await.unwrap();
    assert_eq!(session.state(), SessionState::Streaming);
}

#[tokio::test]
async fn test_replies_split_across_chunks() {
    let transport = MockTransport::new();
    let mut session = session_for(&transport, PeerScript::accepting().with_chunk_size(1));

    session.start().await.unwrap();
    assert_eq!(session.operating_system(), Some(OperatingSystem::Android));
}

#[tokio::test(start_paused = true)]
async fn test_silent_peer_times_out() {
    let transport = MockTransport::new();
    let session = session_for(&transport, PeerScript::silent());

    match session.run().await {
        Err(SessionError::Timeout { stage, duration_ms }) => {
            assert_eq!(stage, SessionState::VersionChecking);
            assert_eq!(duration_ms, 200);
        }
        other => panic!("expected timeout, got {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn test_stalled_write_times_out() {
    let transport = MockTransport::new();
    let session = session_for(&transport, PeerScript::stalling_writes());

    match session.run().await {
        Err(SessionError::Timeout { stage, duration_ms }) => {
            assert_eq!(stage, SessionState::VersionChecking);
            assert_eq!(duration_ms, 200);
        }
        other => panic!("expected timeout, got {other:?}"),
    }
}

#[tokio::test]
async fn test_connect_failure() {
    let transport = MockTransport::new();
    let session = session_for(&transport, PeerScript::failing_connect());

    let error = session.run().await.unwrap_err();
    assert_eq!(error.kind(), FailureKind::ConnectFailed);
}

#[tokio::test]
async fn test_link_lost_during_handshake() {
    let transport = MockTransport::new();
    let mut session = session_for(&transport, PeerScript::silent());
    let id = session.device().id.clone();
    let mut state = session.subscribe_state();

    let task = tokio::spawn(async move {
        let result = session.start().await;
        session.close().await;
        result
    });

    wait_for_watch(&mut state, |s| *s == SessionState::VersionChecking).await;
    transport.drop_link(&id);

    let error = task.await.unwrap().unwrap_err();
    assert!(matches!(error, SessionError::TransportDisconnected));
    assert_eq!(error.kind(), FailureKind::LinkLost);
}

#[tokio::test]
async fn test_start_twice_is_rejected() {
    let transport = MockTransport::new();
    let mut session = session_for(&transport, PeerScript::accepting());

    session.start().await.unwrap();
    assert!(matches!(
        session.start().await,
        Err(SessionError::InvalidState {
            state: SessionState::Streaming
        })
    ));
}

// ----------------------------------------------------------------------------
// Streaming and Teardown
// ----------------------------------------------------------------------------

#[tokio::test]
async fn test_notifications_forwarded_in_order() {
    let transport = MockTransport::new();
    let mut session = session_for(&transport, PeerScript::accepting());
    let id = session.device().id.clone();
    let mut notifications = session.take_notifications().unwrap();
    let handle = session.handle();
    let mut state = session.subscribe_state();

    let task = tokio::spawn(session.run());
    wait_for_watch(&mut state, |s| *s == SessionState::Streaming).await;

    transport.push_notification(&id, Some("Messages"), Some("Lunch?"));
    transport.push_frame(&id, MessageType::Notification, b"garbage");
    transport.push_frame(&id, MessageType::CheckVersion, b"{}");
    transport.push_notification(&id, None, Some("no title"));

    let first = tokio::time::timeout(WAIT, notifications.recv()).await.unwrap().unwrap();
    assert_eq!(first.title, "Messages");
    assert_eq!(first.body, "Lunch?");

    let second = tokio::time::timeout(WAIT, notifications.recv()).await.unwrap().unwrap();
    assert_eq!(second.title, "empty title");
    assert_eq!(second.body, "no title");

    assert!(handle.request_close());
    assert_eq!(task.await.unwrap().unwrap(), SessionOutcome::Shutdown);
    assert!(notifications.recv().await.is_none());
}

#[tokio::test]
async fn test_notification_sharing_chunk_with_final_reply() {
    let transport = MockTransport::new();
    let mut session = session_for(
        &transport,
        PeerScript::accepting().with_notification_after_device_reply("first"),
    );
    let mut notifications = session.take_notifications().unwrap();
    let handle = session.handle();

    let task = tokio::spawn(session.run());

    let first = tokio::time::timeout(WAIT, notifications.recv()).await.unwrap().unwrap();
    assert_eq!(first.title, "first");
    assert_eq!(first.body, "queued");

    assert!(handle.request_close());
    assert_eq!(task.await.unwrap().unwrap(), SessionOutcome::Shutdown);
}

#[tokio::test]
async fn test_disconnect_sends_clear_device() {
    let transport = MockTransport::new();
    let session = session_for(&transport, PeerScript::accepting());
    let id = session.device().id.clone();
    let handle = session.handle();
    let mut state = session.subscribe_state();

    let task = tokio::spawn(session.run());
    wait_for_watch(&mut state, |s| *s == SessionState::Streaming).await;

    assert!(handle.request_disconnect());
    assert_eq!(task.await.unwrap().unwrap(), SessionOutcome::Forgotten);

    let written = transport.written(&id);
    let last = written.last().unwrap();
    assert_eq!(last.message_type(), MessageType::ClearDevice);
    assert!(last.payload().is_empty());
    assert_eq!(handle.state(), SessionState::Closed);
    assert_eq!(transport.disconnects(), 1);
}

#[tokio::test]
async fn test_link_loss_while_streaming() {
    let transport = MockTransport::new();
    let session = session_for(&transport, PeerScript::accepting());
    let id = session.device().id.clone();
    let mut state = session.subscribe_state();

    let task = tokio::spawn(session.run());
    wait_for_watch(&mut state, |s| *s == SessionState::Streaming).await;

    transport.drop_link(&id);
    assert_eq!(task.await.unwrap().unwrap(), SessionOutcome::LinkLost);
    assert!(!transport
        .written_types(&id)
        .contains(&MessageType::ClearDevice));
}

#[tokio::test]
async fn test_corrupt_stream_ends_session() {
    let transport = MockTransport::new();
    let session = session_for(&transport, PeerScript::accepting());
    let id = session.device().id.clone();
    let mut state = session.subscribe_state();

    let task = tokio::spawn(session.run());
    wait_for_watch(&mut state, |s| *s == SessionState::Streaming).await;

    transport.push_raw(&id, vec![0x04, 0x00, 0xFF, 0xFF]);
    let error = task.await.unwrap().unwrap_err();
    assert_eq!(error.kind(), FailureKind::MalformedStream);
    assert_eq!(*state.borrow(), SessionState::Closed);
}

#[tokio::test]
async fn test_notifications_before_corrupt_frame_are_delivered() {
    let transport = MockTransport::new();
    let mut session = session_for(&transport, PeerScript::accepting());
    let id = session.device().id.clone();
    let mut notifications = session.take_notifications().unwrap();
    let mut state = session.subscribe_state();

    let task = tokio::spawn(session.run());
    wait_for_watch(&mut state, |s| *s == SessionState::Streaming).await;

    let mut chunk = transport.notification_frame(Some("ok"), Some("before"));
    chunk.extend([0x04, 0x00, 0xFF, 0xFF]);
    transport.push_raw(&id, chunk);

    let error = task.await.unwrap().unwrap_err();
    assert_eq!(error.kind(), FailureKind::MalformedStream);

    let delivered = notifications.recv().await.unwrap();
    assert_eq!(delivered.title, "ok");
    assert!(notifications.recv().await.is_none());
}

#[tokio::test]
async fn test_cancel_during_handshake() {
    let transport = MockTransport::new();
    let session = session_for(&transport, PeerScript::silent());
    let handle = session.handle();
    let mut state = session.subscribe_state();

    let task = tokio::spawn(session.run());
    wait_for_watch(&mut state, |s| *s == SessionState::VersionChecking).await;

    assert!(handle.request_disconnect());
    assert_eq!(task.await.unwrap().unwrap(), SessionOutcome::Cancelled);
}

#[tokio::test]
async fn test_close_is_idempotent() {
    let transport = MockTransport::new();
    let mut session = session_for(&transport, PeerScript::accepting());

    session.start().await.unwrap();
    session.close().await;
    session.close().await;

    assert_eq!(session.state(), SessionState::Closed);
    assert_eq!(transport.disconnects(), 1);
}
