use cardstream_core::{Channel, ChannelConfig, EngineConfig, Labels, Reference, SessionState};
use cardstream_engine::{EngineError, Supervisor, UpstreamError, UpstreamEvent};
use cardstream_test_utils::{RecordingRenderClient, ScriptedGenerator, Step};
use pretty_assertions::assert_eq;
use std::sync::Arc;
use std::time::Duration;

const GAP: Duration = Duration::from_millis(100);

fn supervisor(client: &Arc<RecordingRenderClient>, generator: ScriptedGenerator) -> Supervisor {
    supervisor_with(client, generator, EngineConfig::default())
}

fn supervisor_with(
    client: &Arc<RecordingRenderClient>,
    generator: ScriptedGenerator,
    config: EngineConfig,
) -> Supervisor {
    Supervisor::new(config, client.clone(), Arc::new(generator)).unwrap()
}

fn answer_of(client: &RecordingRenderClient) -> String {
    client
        .final_card()
        .and_then(|card| card.element_content("answer").map(str::to_string))
        .unwrap_or_default()
}

fn status_of(client: &RecordingRenderClient) -> String {
    client
        .final_card()
        .and_then(|card| card.element_content("status").map(str::to_string))
        .unwrap_or_default()
}

#[tokio::test(start_paused = true)]
async fn hello_world_end_to_end() {
    let client = Arc::new(RecordingRenderClient::new());
    let generator = ScriptedGenerator::answer_snapshots(&["Hel", "Hello ", "Hello world"], GAP);
    let config = EngineConfig::default().with_cancel_enabled(false);
    let sup = supervisor_with(&client, generator, config);

    let handle = sup.start_session("Say hello", ChannelConfig::answer_only());
    let answer = handle.await_result().await.unwrap();

    assert_eq!(answer, "Hello world");
    assert_eq!(client.structural_rebuilds_for("answer"), 1);
    assert!(client.patches_for(Channel::Answer).len() <= 1);
    assert_eq!(answer_of(&client), "**Answer**\n\nHello world");
    assert_eq!(status_of(&client), Labels::default().done);

    let last = client.final_card().unwrap();
    assert!(!last.is_streaming());
    assert!(!last.contains_element("stop_button"));
}

#[tokio::test(start_paused = true)]
async fn sequences_start_at_base_and_increase() {
    let client = Arc::new(RecordingRenderClient::new());
    let generator = ScriptedGenerator::answer_snapshots(&["a", "ab", "abc", "abcd"], GAP * 6);
    let sup = supervisor_with(&client, generator, EngineConfig::default().with_sequence_base(10));

    let outcome = sup
        .start_session("q", ChannelConfig::default())
        .await_outcome()
        .await
        .unwrap();

    let sequences = client.sequences();
    assert_eq!(sequences.first(), Some(&10));
    assert!(sequences.windows(2).all(|w| w[1] == w[0] + 1));
    assert_eq!(outcome.dispatch.last_sequence, sequences.last().copied());
    assert_eq!(outcome.dispatch.delivered, sequences.len() as u64);
}

#[tokio::test(start_paused = true)]
async fn stop_button_armed_after_create() {
    let client = Arc::new(RecordingRenderClient::new());
    let generator = ScriptedGenerator::answer_snapshots(&["x"], GAP);
    let sup = supervisor(&client, generator);

    sup.start_session("q", ChannelConfig::default())
        .await_result()
        .await
        .unwrap();

    let calls = client.calls();
    let create = calls[0].card().unwrap();
    assert!(!create.contains_element("stop_button"));
    let armed = calls[1].card().unwrap();
    assert!(armed.contains_element("stop_button"));
    assert!(!client.final_card().unwrap().contains_element("stop_button"));
}

#[tokio::test(start_paused = true)]
async fn held_values_are_flushed_on_completion() {
    let client = Arc::new(RecordingRenderClient::new());
    let generator = ScriptedGenerator::new(vec![
        Step::Event(UpstreamEvent::delta(Channel::Answer, "one")),
        Step::Delay(Duration::from_millis(10)),
        Step::Event(UpstreamEvent::delta(Channel::Answer, " two")),
        Step::Delay(Duration::from_millis(10)),
        Step::Event(UpstreamEvent::delta(Channel::Answer, " three")),
        Step::Event(UpstreamEvent::Completed),
    ]);
    let sup = supervisor(&client, generator);

    let answer = sup
        .start_session("count", ChannelConfig::default())
        .await_result()
        .await
        .unwrap();

    assert_eq!(answer, "one two three");
    assert!(client.patches_for(Channel::Answer).is_empty());
    assert_eq!(answer_of(&client), "**Answer**\n\none two three");
}

#[tokio::test(start_paused = true)]
async fn held_values_flush_at_deadline_while_streaming() {
    let client = Arc::new(RecordingRenderClient::new());
    let generator = ScriptedGenerator::new(vec![
        Step::Event(UpstreamEvent::delta(Channel::Answer, "a")),
        Step::Delay(Duration::from_millis(100)),
        Step::Event(UpstreamEvent::delta(Channel::Answer, "b")),
        Step::Delay(Duration::from_secs(2)),
        Step::Event(UpstreamEvent::Completed),
    ]);
    let sup = supervisor(&client, generator);

    sup.start_session("q", ChannelConfig::default())
        .await_result()
        .await
        .unwrap();

    assert_eq!(client.patches_for(Channel::Answer), vec!["**Answer**\n\nab".to_string()]);
}

#[tokio::test(start_paused = true)]
async fn thinking_title_settles_with_first_answer() {
    let client = Arc::new(RecordingRenderClient::new());
    let generator = ScriptedGenerator::new(vec![
        Step::Event(UpstreamEvent::delta(Channel::Thinking, "let me see")),
        Step::Delay(GAP),
        Step::Event(UpstreamEvent::delta(Channel::Answer, "42")),
        Step::Event(UpstreamEvent::Completed),
    ]);
    let config = EngineConfig::default().with_cancel_enabled(false);
    let sup = supervisor_with(&client, generator, config);

    sup.start_session("q", ChannelConfig::default())
        .await_result()
        .await
        .unwrap();

    let labels = Labels::default();
    let rebuilds = client.rebuilds();
    assert_eq!(rebuilds.len(), 3);
    assert_eq!(rebuilds[0].element_content("think"), Some(labels.thinking_title.as_str()));
    assert_eq!(
        rebuilds[1].element_content("think"),
        Some(labels.thinking_done_title.as_str())
    );
    assert_eq!(client.structural_rebuilds_for("think_content"), 1);
    assert_eq!(client.structural_rebuilds_for("answer"), 1);
}

#[tokio::test(start_paused = true)]
async fn late_thinking_title_change_rebuilds_before_terminal() {
    let client = Arc::new(RecordingRenderClient::new());
    let generator = ScriptedGenerator::new(vec![
        Step::Event(UpstreamEvent::delta(Channel::Answer, "a")),
        Step::Delay(GAP * 6),
        Step::Event(UpstreamEvent::delta(Channel::Thinking, "t")),
        Step::Delay(GAP * 6),
        Step::Event(UpstreamEvent::delta(Channel::Answer, "b")),
        Step::Event(UpstreamEvent::Completed),
    ]);
    let config = EngineConfig::default().with_cancel_enabled(false);
    let sup = supervisor_with(&client, generator, config);

    sup.start_session("q", ChannelConfig::default())
        .await_result()
        .await
        .unwrap();

    let labels = Labels::default();
    let rebuilds = client.rebuilds();
    let titles: Vec<Option<&str>> = rebuilds.iter().map(|c| c.element_content("think")).collect();
    assert_eq!(
        titles,
        vec![
            None,
            Some(labels.thinking_title.as_str()),
            Some(labels.thinking_done_title.as_str()),
            Some(labels.thinking_done_title.as_str()),
        ]
    );
    assert!(rebuilds[2].is_streaming());
    assert_eq!(rebuilds[2].element_content("answer"), Some("**Answer**\n\nab"));
    assert!(client.patches_for(Channel::Answer).is_empty());
}

#[tokio::test(start_paused = true)]
async fn progress_events_update_status() {
    let client = Arc::new(RecordingRenderClient::new());
    let generator = ScriptedGenerator::new(vec![
        Step::Delay(GAP * 6),
        Step::Event(UpstreamEvent::Progress(cardstream_engine::Progress::NodeRunning(
            "Search".into(),
        ))),
        Step::Delay(GAP * 6),
        Step::Event(UpstreamEvent::Progress(cardstream_engine::Progress::ToolCall(
            "weather".into(),
        ))),
        Step::Event(UpstreamEvent::delta(Channel::Answer, "Sunny")),
        Step::Event(UpstreamEvent::Completed),
    ]);
    let sup = supervisor(&client, generator);

    sup.start_session("weather?", ChannelConfig::default())
        .await_result()
        .await
        .unwrap();

    let labels = Labels::default();
    let status = client.patches_for(Channel::Status);
    assert_eq!(status.first(), Some(&labels.running_status("Search")));
    assert_eq!(status_of(&client), labels.done);
}

#[tokio::test(start_paused = true)]
async fn references_render_in_panel() {
    let client = Arc::new(RecordingRenderClient::new());
    let generator = ScriptedGenerator::new(vec![
        Step::Event(UpstreamEvent::delta(Channel::Answer, "30 days.")),
        Step::Event(UpstreamEvent::References(vec![Reference::new(
            "policy.pdf",
            "Refunds within 30 days",
        )
        .with_module("KB")])),
        Step::Event(UpstreamEvent::Completed),
    ]);
    let sup = supervisor(&client, generator);

    sup.start_session("refund?", ChannelConfig::default())
        .await_result()
        .await
        .unwrap();

    let card = client.final_card().unwrap();
    assert!(card.contains_element("references_panel"));
    assert!(card
        .element_content("references_title")
        .unwrap()
        .contains("(1)"));
    assert!(card
        .element_content("references_content")
        .unwrap()
        .contains("policy.pdf"));
}

#[tokio::test(start_paused = true)]
async fn hidden_channels_never_render() {
    let client = Arc::new(RecordingRenderClient::new());
    let generator = ScriptedGenerator::new(vec![
        Step::Event(UpstreamEvent::delta(Channel::Thinking, "secret")),
        Step::Event(UpstreamEvent::References(vec![Reference::new("a", "b")])),
        Step::Event(UpstreamEvent::delta(Channel::Answer, "ok")),
        Step::Event(UpstreamEvent::Completed),
    ]);
    let sup = supervisor(&client, generator);

    sup.start_session("q", ChannelConfig::answer_only())
        .await_result()
        .await
        .unwrap();

    for card in client.rebuilds() {
        assert!(!card.contains_element("think_content"));
        assert!(!card.contains_element("references_content"));
    }
}

#[tokio::test(start_paused = true)]
async fn empty_answer_gets_fallback_message() {
    let client = Arc::new(RecordingRenderClient::new());
    let generator = ScriptedGenerator::new(vec![Step::Event(UpstreamEvent::Completed)]);
    let sup = supervisor(&client, generator);

    let answer = sup
        .start_session("?", ChannelConfig::default())
        .await_result()
        .await
        .unwrap();

    assert_eq!(answer, Labels::default().empty_answer);
    assert_eq!(status_of(&client), Labels::default().done);
}

#[tokio::test(start_paused = true)]
async fn stream_end_without_completion_completes() {
    let client = Arc::new(RecordingRenderClient::new());
    let generator =
        ScriptedGenerator::new(vec![Step::Event(UpstreamEvent::delta(Channel::Answer, "done"))]);
    let sup = supervisor(&client, generator);

    let outcome = sup
        .start_session("q", ChannelConfig::default())
        .await_outcome()
        .await
        .unwrap();
    assert_eq!(outcome.state, SessionState::Completed);
    assert_eq!(outcome.answer, "done");
}

#[tokio::test(start_paused = true)]
async fn upstream_open_failure_shows_apology() {
    let client = Arc::new(RecordingRenderClient::new());
    let generator = ScriptedGenerator::failing(UpstreamError::Status {
        status: 502,
        body: "bad gateway".into(),
    });
    let sup = supervisor(&client, generator);

    let result = sup
        .start_session("q", ChannelConfig::default())
        .await_result()
        .await;

    assert!(matches!(
        result,
        Err(EngineError::Upstream(UpstreamError::Status { status: 502, .. }))
    ));
    let labels = Labels::default();
    assert_eq!(answer_of(&client), format!("**Answer**\n\n{}", labels.apology));
    assert_eq!(status_of(&client), labels.failed);
}

#[tokio::test(start_paused = true)]
async fn mid_stream_failure_keeps_partial_answer() {
    let client = Arc::new(RecordingRenderClient::new());
    let generator = ScriptedGenerator::new(vec![
        Step::Event(UpstreamEvent::delta(Channel::Answer, "partial")),
        Step::Error(UpstreamError::Stream("connection reset".into())),
    ]);
    let sup = supervisor(&client, generator);

    let outcome = sup
        .start_session("q", ChannelConfig::default())
        .await_outcome()
        .await
        .unwrap();

    assert_eq!(outcome.state, SessionState::Failed);
    assert!(outcome.answer.starts_with("partial"));
    assert!(outcome.answer.ends_with(&Labels::default().apology));
    assert!(!client.final_card().unwrap().is_streaming());
}

#[tokio::test(start_paused = true)]
async fn reported_error_event_fails_session() {
    let client = Arc::new(RecordingRenderClient::new());
    let generator = ScriptedGenerator::new(vec![Step::Event(UpstreamEvent::Failed(
        "quota exceeded".into(),
    ))]);
    let sup = supervisor(&client, generator);

    let result = sup
        .start_session("q", ChannelConfig::default())
        .await_result()
        .await;
    assert!(matches!(
        result,
        Err(EngineError::Upstream(UpstreamError::Reported(_)))
    ));
}

#[tokio::test(start_paused = true)]
async fn idle_upstream_times_out() {
    let client = Arc::new(RecordingRenderClient::new());
    let generator = ScriptedGenerator::new(vec![
        Step::Event(UpstreamEvent::delta(Channel::Answer, "thinking about it")),
        Step::Hang,
    ]);
    let config = EngineConfig::default().with_idle_timeout(Duration::from_secs(5));
    let sup = supervisor_with(&client, generator, config);

    let result = sup
        .start_session("q", ChannelConfig::default())
        .await_result()
        .await;

    assert!(matches!(
        result,
        Err(EngineError::Upstream(UpstreamError::IdleTimeout(_)))
    ));
    assert_eq!(status_of(&client), Labels::default().failed);
}

#[tokio::test(start_paused = true)]
async fn create_failure_renders_nothing() {
    let client = Arc::new(RecordingRenderClient::new().failing_create());
    let generator = ScriptedGenerator::answer_snapshots(&["never"], GAP);
    let sup = supervisor(&client, generator);

    let handle = sup.start_session("q", ChannelConfig::default());
    let result = handle.await_result().await;

    assert!(matches!(result, Err(EngineError::CreateFailed(_))));
    assert!(client.calls().is_empty());
    assert!(sup.active_sessions().is_empty());
}

#[tokio::test(start_paused = true)]
async fn rejected_sequence_is_dropped_not_retried() {
    let client = Arc::new(RecordingRenderClient::new());
    client.reject_sequence(2);
    let generator = ScriptedGenerator::answer_snapshots(&["a", "ab"], GAP * 6);
    let sup = supervisor(&client, generator);

    let outcome = sup
        .start_session("q", ChannelConfig::default())
        .await_outcome()
        .await
        .unwrap();

    assert_eq!(outcome.state, SessionState::Completed);
    assert_eq!(outcome.dispatch.dropped, 1);
    assert_eq!(client.sequences().iter().filter(|s| **s == 2).count(), 1);
}

#[tokio::test(start_paused = true)]
async fn registry_is_empty_after_every_ending() {
    let client = Arc::new(RecordingRenderClient::new());
    let sup = supervisor(&client, ScriptedGenerator::answer_snapshots(&["a"], GAP));
    let handle = sup.start_session("q", ChannelConfig::default());
    assert_eq!(sup.active_sessions(), vec![handle.id()]);
    handle.await_result().await.unwrap();
    assert!(sup.active_sessions().is_empty());

    let failing = supervisor(
        &client,
        ScriptedGenerator::failing(UpstreamError::Request("refused".into())),
    );
    let handle = failing.start_session("q", ChannelConfig::default());
    let id = handle.id();
    let _ = handle.await_result().await;
    assert!(!failing.registry().contains(id));
}
