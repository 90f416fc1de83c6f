use cardstream_core::{Channel, ChannelConfig, EngineConfig, Reference};
use cardstream_engine::{Supervisor, UpstreamEvent};
use cardstream_test_utils::{
    CountingRehoster, CountingResolver, RecordingRenderClient, ScriptedGenerator, Step,
};
use cardstream_transform::{ResourceRewriter, TransformCache};
use pretty_assertions::assert_eq;
use std::sync::Arc;
use std::time::Duration;

fn deltas(pieces: &[&str]) -> ScriptedGenerator {
    let mut steps: Vec<Step> = pieces
        .iter()
        .flat_map(|piece| {
            [
                Step::Event(UpstreamEvent::delta(Channel::Answer, *piece)),
                Step::Delay(Duration::from_millis(50)),
            ]
        })
        .collect();
    steps.push(Step::Event(UpstreamEvent::Completed));
    ScriptedGenerator::new(steps)
}

#[tokio::test(start_paused = true)]
async fn image_rehosted_once_per_session() {
    let client = Arc::new(RecordingRenderClient::new());
    let rehoster = Arc::new(CountingRehoster::new().with_latency(Duration::from_millis(30)));
    let generator = deltas(&[
        "Chart: ![c](https://cdn/c.png)",
        " more",
        " text",
        " ![c](https://cdn/c.png)",
    ]);
    let sup = Supervisor::new(EngineConfig::default(), client.clone(), Arc::new(generator))
        .unwrap()
        .with_rehoster(rehoster.clone());

    let answer = sup
        .start_session("q", ChannelConfig::default())
        .await_result()
        .await
        .unwrap();

    assert_eq!(rehoster.calls_for("https://cdn/c.png"), 1);
    assert_eq!(answer, "Chart: ![c](img_1) more text ![c](img_1)");
}

#[tokio::test(start_paused = true)]
async fn partial_image_left_until_complete() {
    let client = Arc::new(RecordingRenderClient::new());
    let rehoster = Arc::new(CountingRehoster::new());
    let generator = deltas(&["![c](https://cd", "n/c.png) done"]);
    let sup = Supervisor::new(
        EngineConfig::default().with_cancel_enabled(false),
        client.clone(),
        Arc::new(generator),
    )
    .unwrap()
    .with_rehoster(rehoster.clone());

    let answer = sup
        .start_session("q", ChannelConfig::default())
        .await_result()
        .await
        .unwrap();

    let first = &client.rebuilds()[0];
    assert_eq!(
        first.element_content("answer"),
        Some("**Answer**\n\n![c](https://cd")
    );
    assert_eq!(answer, "![c](img_1) done");
    assert_eq!(rehoster.total_calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn failed_image_dropped_and_retried() {
    let client = Arc::new(RecordingRenderClient::new());
    let rehoster = Arc::new(CountingRehoster::new().failing_for("https://cdn/bad.png"));
    let generator = deltas(&["a ![x](https://cdn/bad.png)", " b"]);
    let sup = Supervisor::new(EngineConfig::default(), client.clone(), Arc::new(generator))
        .unwrap()
        .with_rehoster(rehoster.clone());

    let answer = sup
        .start_session("q", ChannelConfig::default())
        .await_result()
        .await
        .unwrap();

    assert_eq!(answer, "a  b");
    assert!(rehoster.calls_for("https://cdn/bad.png") > 1);
}

#[tokio::test(start_paused = true)]
async fn relative_image_joined_to_asset_base() {
    let client = Arc::new(RecordingRenderClient::new());
    let rehoster = Arc::new(CountingRehoster::new());
    let config = EngineConfig::default().with_asset_base_url("https://kb.example.com");
    let sup = Supervisor::new(config, client.clone(), Arc::new(deltas(&["![a](/files/a.png)"])))
        .unwrap()
        .with_rehoster(rehoster.clone());

    sup.start_session("q", ChannelConfig::default())
        .await_result()
        .await
        .unwrap();

    assert_eq!(rehoster.calls_for("https://kb.example.com/files/a.png"), 1);
}

#[tokio::test(start_paused = true)]
async fn transforms_skipped_when_disabled() {
    let client = Arc::new(RecordingRenderClient::new());
    let rehoster = Arc::new(CountingRehoster::new());
    let sup = Supervisor::new(
        EngineConfig::default(),
        client.clone(),
        Arc::new(deltas(&["![a](https://cdn/a.png)"])),
    )
    .unwrap()
    .with_rehoster(rehoster.clone());

    let answer = sup
        .start_session("q", ChannelConfig::default().with_resource_rewrite(false))
        .await_result()
        .await
        .unwrap();

    assert_eq!(answer, "![a](https://cdn/a.png)");
    assert_eq!(rehoster.total_calls(), 0);
}

#[tokio::test]
async fn concurrent_rewrites_share_one_lookup() {
    let rehoster = Arc::new(CountingRehoster::new().with_latency(Duration::from_millis(20)));
    let rewriter = ResourceRewriter::new(rehoster.clone(), TransformCache::new());

    let rewrites = (0..32).map(|_| {
        let rewriter = rewriter.clone();
        async move { rewriter.rewrite("![k](https://cdn/k.png)").await }
    });
    let results = futures::future::join_all(rewrites).await;

    assert!(results.iter().all(|r| r == "![k](img_1)"));
    assert_eq!(rehoster.calls_for("https://cdn/k.png"), 1);
}

#[tokio::test(start_paused = true)]
async fn citations_numbered_and_resolved_once() {
    let client = Arc::new(RecordingRenderClient::new());
    let resolver = Arc::new(CountingResolver::new());
    let generator = deltas(&["Yes[q1](CITE).", " Also[q2](CITE) and[q1](CITE)"]);
    let sup = Supervisor::new(EngineConfig::default(), client.clone(), Arc::new(generator))
        .unwrap()
        .with_citation_resolver(resolver.clone());

    let answer = sup
        .start_session("q", ChannelConfig::default())
        .await_result()
        .await
        .unwrap();

    assert_eq!(
        answer,
        "Yes[[1]](https://preview/q1). Also[[2]](https://preview/q2) and[[1]](https://preview/q1)"
    );
    assert_eq!(resolver.calls_for("q1"), 1);
    assert_eq!(resolver.calls_for("q2"), 1);
}

#[tokio::test(start_paused = true)]
async fn template_citations_resolve_once_references_arrive() {
    let client = Arc::new(RecordingRenderClient::new());
    let generator = ScriptedGenerator::new(vec![
        Step::Event(UpstreamEvent::delta(Channel::Answer, "Yes[q1](CITE)")),
        Step::Event(UpstreamEvent::References(vec![Reference::new("a.pdf", "chunk")
            .with_quote_id("q1")
            .with_collection("c1")])),
        Step::Event(UpstreamEvent::Completed),
    ]);
    let config =
        EngineConfig::default().with_citation_preview_url("https://kb/{collection_id}/{quote_id}");
    let sup = Supervisor::new(config, client.clone(), Arc::new(generator)).unwrap();

    let answer = sup
        .start_session("q", ChannelConfig::default())
        .await_result()
        .await
        .unwrap();

    // unresolved while streaming, resolved in the terminal pass
    assert_eq!(
        client.rebuilds()[1].element_content("answer"),
        Some("**Answer**\n\nYes")
    );
    assert_eq!(answer, "Yes[[1]](https://kb/c1/q1)");
    assert!(client
        .final_card()
        .unwrap()
        .element_content("references_content")
        .unwrap()
        .contains("https://kb/c1/q1"));
}
