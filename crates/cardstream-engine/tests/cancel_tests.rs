use cardstream_core::{Channel, ChannelConfig, EngineConfig, Labels, SessionId, SessionState};
use cardstream_engine::{Supervisor, UpstreamEvent};
use cardstream_test_utils::{RecordingRenderClient, RenderCall, ScriptedGenerator, Step};
use pretty_assertions::assert_eq;
use std::sync::Arc;
use std::time::Duration;

fn hanging_answer() -> ScriptedGenerator {
    ScriptedGenerator::new(vec![
        Step::Event(UpstreamEvent::snapshot(Channel::Answer, "Hel")),
        Step::Delay(Duration::from_millis(50)),
        Step::Event(UpstreamEvent::snapshot(Channel::Answer, "Hello")),
        Step::Hang,
    ])
}

fn supervisor(client: &Arc<RecordingRenderClient>, generator: ScriptedGenerator) -> Supervisor {
    Supervisor::new(EngineConfig::default(), client.clone(), Arc::new(generator)).unwrap()
}

fn assert_stopped_card(client: &RecordingRenderClient) {
    let last = client.final_card().unwrap();
    assert!(!last.is_streaming());
    assert!(!last.contains_element("stop_button"));
    assert_eq!(last.element_content("status"), Some(Labels::default().stopped.as_str()));
    assert!(matches!(client.calls().last(), Some(RenderCall::ReplaceAll { .. })));
}

#[tokio::test(start_paused = true)]
async fn handle_cancel_keeps_partial_answer() {
    let client = Arc::new(RecordingRenderClient::new());
    let sup = supervisor(&client, hanging_answer());

    let handle = sup.start_session("q", ChannelConfig::default());
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(handle.request_cancel());
    assert!(!handle.request_cancel());

    let outcome = handle.await_outcome().await.unwrap();
    assert_eq!(outcome.state, SessionState::Cancelled);
    assert_eq!(outcome.answer, "Hello");
    assert!(outcome.error.is_none());
    assert!(outcome.object_id.is_some());

    assert_stopped_card(&client);
    assert_eq!(
        client.final_card().unwrap().element_content("answer"),
        Some("**Answer**\n\nHello")
    );
    assert!(sup.active_sessions().is_empty());
}

#[tokio::test(start_paused = true)]
async fn supervisor_cancel_by_id() {
    let client = Arc::new(RecordingRenderClient::new());
    let sup = supervisor(&client, hanging_answer());

    let handle = sup.start_session("q", ChannelConfig::default());
    let id = handle.id();
    assert_eq!(sup.active_sessions(), vec![id]);

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(sup.request_cancel(id));

    let answer = handle.await_result().await.unwrap();
    assert_eq!(answer, "Hello");
    assert_stopped_card(&client);

    assert!(!sup.request_cancel(id));
    assert!(!sup.registry().contains(id));
}

#[tokio::test(start_paused = true)]
async fn unknown_session_cannot_be_cancelled() {
    let client = Arc::new(RecordingRenderClient::new());
    let sup = supervisor(&client, hanging_answer());
    assert!(!sup.request_cancel(SessionId::new()));
}

#[tokio::test(start_paused = true)]
async fn cancel_before_start_creates_nothing() {
    let client = Arc::new(RecordingRenderClient::new());
    let sup = supervisor(&client, hanging_answer());

    let handle = sup.start_session("q", ChannelConfig::default());
    handle.request_cancel();

    let outcome = handle.await_outcome().await.unwrap();
    assert_eq!(outcome.state, SessionState::Cancelled);
    assert!(outcome.object_id.is_none());
    assert!(client.calls().is_empty());
    assert!(sup.active_sessions().is_empty());
}

#[tokio::test(start_paused = true)]
async fn cancel_folds_held_updates_into_terminal_rebuild() {
    let client = Arc::new(RecordingRenderClient::new());
    let sup = supervisor(&client, hanging_answer());

    let handle = sup.start_session("q", ChannelConfig::default());
    tokio::time::sleep(Duration::from_millis(100)).await;
    handle.request_cancel();
    handle.await_outcome().await.unwrap();

    // "Hello" arrived inside the debounce window and was never patched
    assert!(client.patches_for(Channel::Answer).is_empty());
    let sequences = client.sequences();
    assert!(sequences.windows(2).all(|w| w[1] == w[0] + 1));
    assert_stopped_card(&client);
}
