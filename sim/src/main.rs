//! cardstream-sim: run replies against a console render surface

mod demo;
mod surface;

use anyhow::{bail, Context};
use cardstream_core::{ChannelConfig, EngineConfig, SessionState};
use cardstream_engine::upstream::decode_body;
use cardstream_engine::{
    HttpGenerator, HttpGeneratorConfig, ReplyRequest, Supervisor, UpstreamGenerator,
};
use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use demo::{DemoGenerator, DemoRehoster};
use futures::StreamExt;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use surface::ConsoleSurface;
use tracing_subscriber::EnvFilter;

const DEMO_ASSET_BASE: &str = "https://kb.example.com";
const DEMO_PREVIEW_URL: &str = "https://kb.example.com/preview/{collection_id}/{quote_id}";

fn cli() -> Command {
    Command::new("cardstream-sim")
        .version(cardstream_engine::VERSION)
        .about("Render streamed replies into a console card surface")
        .arg(
            Arg::new("json")
                .long("json")
                .global(true)
                .action(ArgAction::SetTrue)
                .help("Emit logs as JSON"),
        )
        .arg(
            Arg::new("verbose")
                .long("verbose")
                .short('v')
                .global(true)
                .action(ArgAction::SetTrue)
                .help("Log every patch body"),
        )
        .subcommand_required(true)
        .subcommand(
            Command::new("run")
                .about("Render one reply")
                .arg(
                    Arg::new("prompt")
                        .long("prompt")
                        .default_value("the refund policy")
                        .help("Question to answer"),
                )
                .arg(
                    Arg::new("config")
                        .long("config")
                        .help("Engine configuration TOML file"),
                )
                .arg(
                    Arg::new("url")
                        .long("url")
                        .help("Chat completions endpoint; defaults to the canned generator"),
                )
                .arg(
                    Arg::new("api-key")
                        .long("api-key")
                        .help("Bearer token for --url (default: $CARDSTREAM_API_KEY)"),
                )
                .arg(
                    Arg::new("token-delay-ms")
                        .long("token-delay-ms")
                        .default_value("40")
                        .value_parser(value_parser!(u64))
                        .help("Pause between canned tokens"),
                )
                .arg(
                    Arg::new("latency-ms")
                        .long("latency-ms")
                        .default_value("0")
                        .value_parser(value_parser!(u64))
                        .help("Latency of every render call"),
                )
                .arg(
                    Arg::new("cancel-after-ms")
                        .long("cancel-after-ms")
                        .value_parser(value_parser!(u64))
                        .help("Request cancellation after this long"),
                )
                .arg(
                    Arg::new("fail-after")
                        .long("fail-after")
                        .value_parser(value_parser!(usize))
                        .help("Make the canned generator fail after this many answer words"),
                )
                .arg(
                    Arg::new("no-thinking")
                        .long("no-thinking")
                        .action(ArgAction::SetTrue)
                        .help("Hide the reasoning panel"),
                )
                .arg(
                    Arg::new("no-references")
                        .long("no-references")
                        .action(ArgAction::SetTrue)
                        .help("Hide the references panel"),
                )
                .arg(
                    Arg::new("no-transforms")
                        .long("no-transforms")
                        .action(ArgAction::SetTrue)
                        .help("Disable image rehosting and citation links"),
                )
                .arg(
                    Arg::new("print-card")
                        .long("print-card")
                        .action(ArgAction::SetTrue)
                        .help("Print the final card JSON"),
                ),
        )
        .subcommand(Command::new("config").about("Print the default engine configuration"))
        .subcommand(
            Command::new("decode")
                .about("Decode a captured SSE body into upstream events")
                .arg(Arg::new("path").required(true).help("File holding the raw SSE body")),
        )
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let matches = cli().get_matches();
    init_tracing(matches.get_flag("json"), matches.get_flag("verbose"));

    match matches.subcommand() {
        Some(("run", args)) => run(args).await,
        Some(("config", _)) => {
            print!("{}", toml::to_string_pretty(&EngineConfig::default())?);
            Ok(())
        }
        Some(("decode", args)) => {
            let path = args
                .get_one::<String>("path")
                .context("missing path argument")?;
            decode(Path::new(path)).await
        }
        _ => Ok(()),
    }
}

fn init_tracing(json: bool, verbose: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if verbose {
            EnvFilter::new(
                "cardstream_engine=debug,cardstream_transform=debug,cardstream_sim=debug,info",
            )
        } else {
            EnvFilter::new("info")
        }
    });
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    let _ = if json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
}

async fn load_config(path: Option<&String>) -> anyhow::Result<EngineConfig> {
    let Some(path) = path else {
        return Ok(EngineConfig::default()
            .with_asset_base_url(DEMO_ASSET_BASE)
            .with_citation_preview_url(DEMO_PREVIEW_URL));
    };
    let source = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("reading {path}"))?;
    EngineConfig::from_toml_str(&source).with_context(|| format!("parsing {path}"))
}

async fn run(args: &ArgMatches) -> anyhow::Result<()> {
    let config = load_config(args.get_one::<String>("config")).await?;
    let prompt = args
        .get_one::<String>("prompt")
        .cloned()
        .unwrap_or_default();
    let token_delay = Duration::from_millis(*args.get_one::<u64>("token-delay-ms").unwrap_or(&40));
    let latency = Duration::from_millis(*args.get_one::<u64>("latency-ms").unwrap_or(&0));

    let generator: Arc<dyn UpstreamGenerator> = match args.get_one::<String>("url") {
        Some(url) => {
            let api_key = match args.get_one::<String>("api-key") {
                Some(key) => key.clone(),
                None => std::env::var("CARDSTREAM_API_KEY")
                    .context("--url needs --api-key or CARDSTREAM_API_KEY")?,
            };
            Arc::new(HttpGenerator::new(HttpGeneratorConfig::new(url, api_key))?)
        }
        None => {
            let mut demo = DemoGenerator::new(token_delay);
            if let Some(words) = args.get_one::<usize>("fail-after") {
                demo = demo.failing_after(*words);
            }
            Arc::new(demo)
        }
    };

    let transforms = !args.get_flag("no-transforms");
    let channels = ChannelConfig::new()
        .with_thinking(!args.get_flag("no-thinking"))
        .with_references(!args.get_flag("no-references"))
        .with_resource_rewrite(transforms)
        .with_citations(transforms);

    let surface = Arc::new(ConsoleSurface::new().with_latency(latency));
    let supervisor = Supervisor::new(config, surface.clone(), generator)?
        .with_rehoster(Arc::new(DemoRehoster::new(Duration::from_millis(120))));

    let handle = supervisor.start_session(ReplyRequest::new(prompt).with_sender("sim"), channels);
    let session_id = handle.id();
    if let Some(after) = args.get_one::<u64>("cancel-after-ms") {
        tokio::time::sleep(Duration::from_millis(*after)).await;
        supervisor.request_cancel(session_id);
    }

    let outcome = handle.await_outcome().await?;
    tracing::info!(
        session = %session_id,
        state = ?outcome.state,
        delivered = outcome.dispatch.delivered,
        dropped = outcome.dispatch.dropped,
        "session ended"
    );

    if let Some(summary) = outcome.object_id.as_ref().and_then(|id| surface.summary(id)) {
        println!(
            "{}: {} patches, {} rebuilds, last sequence {:?}",
            summary.object_id, summary.patches, summary.rebuilds, summary.last_sequence
        );
        if args.get_flag("print-card") {
            if let Some(card) = &summary.card {
                println!("{}", serde_json::to_string_pretty(card)?);
            }
        }
    }
    println!("{}", outcome.answer);

    if outcome.state == SessionState::Failed {
        match outcome.error {
            Some(err) => return Err(err.into()),
            None => bail!("session failed"),
        }
    }
    Ok(())
}

async fn decode(path: &Path) -> anyhow::Result<()> {
    let body = tokio::fs::read(path)
        .await
        .with_context(|| format!("reading {}", path.display()))?;

    // Feed in small chunks so line reassembly is exercised like a live body
    let chunks: Vec<Result<Vec<u8>, std::io::Error>> =
        body.chunks(64).map(|chunk| Ok(chunk.to_vec())).collect();
    let mut events = decode_body(futures::stream::iter(chunks));

    let mut count = 0usize;
    while let Some(event) = events.next().await {
        match event {
            Ok(event) => println!("{event:?}"),
            Err(err) => println!("error: {err}"),
        }
        count += 1;
    }
    tracing::info!(count, "decoded");
    Ok(())
}
