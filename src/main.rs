use assistant_stream::constants::API_KEY_ENV;
use assistant_stream::logging::{init_tracing, setup_panic_hook};
use assistant_stream::main_helper::{fetch_stream, load_capture, transform_capture, Args};
use assistant_stream::sink::CallbackSink;
use assistant_stream::streaming::{process_streamed_message, StreamOutcome};
use assistant_stream::types::*;
use clap::Parser;
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    let args = Args::parse();
    let _guard = init_tracing(args.log_file.as_deref());
    setup_panic_hook();

    if let Err(e) = run(args).await {
        tracing::error!("{}", e);
        std::process::exit(1);
    }
}

async fn run(args: Args) -> Result<()> {
    if args.transform {
        let path = match &args.input {
            Some(p) => p,
            None => return Err(usage_error("--transform requires --input")),
        };
        let raw = tokio::fs::read_to_string(path).await?;
        print!("{}", transform_capture(&raw, args.chunk_size)?);
        return Ok(());
    }

    let response = match (&args.input, &args.url) {
        (Some(path), _) => load_capture(path, args.chunk_size).await?,
        (None, Some(url)) => {
            let body = match &args.body {
                Some(path) => {
                    let text = tokio::fs::read_to_string(path).await?;
                    Some(serde_json::from_str::<serde_json::Value>(&text)?)
                }
                None => None,
            };
            let api_key = std::env::var(API_KEY_ENV).ok().filter(|k| !k.is_empty());
            if api_key.is_none() {
                tracing::warn!("{} is not set; sending request without credentials", API_KEY_ENV);
            }
            let client = reqwest::Client::builder()
                .connect_timeout(std::time::Duration::from_secs(10))
                .build()?;
            fetch_stream(&client, url, body, api_key.as_deref()).await?
        }
        (None, None) => return Err(usage_error("one of --input or --url is required")),
    };

    let cancel = CancellationToken::new();
    let ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Ctrl-C received, cancelling stream");
            ctrl_c.cancel();
        }
    });

    let sink = CallbackSink::new(
        |m: &AssistantMessage| tracing::info!("[SINK] create {}", m.id),
        |m: &AssistantMessage| {
            tracing::debug!(
                "[SINK] update {} ({} parts, {} tool calls)",
                m.id,
                m.content.len(),
                m.tool_calls.len()
            )
        },
        |id: &str| tracing::info!("[SINK] delete {}", id),
    );

    let config = args.stream_config();
    match process_streamed_message(response, sink, &config, Some(cancel)).await? {
        StreamOutcome::Completed(message) => {
            println!("{}", serde_json::to_string_pretty(&message)?);
        }
        StreamOutcome::Cancelled => {
            eprintln!("Stream cancelled");
        }
    }
    Ok(())
}

fn usage_error(message: &str) -> ObservedError {
    StreamError::Internal(message.to_string(), tracing_error::SpanTrace::capture()).into()
}
