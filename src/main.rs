use clap::Parser;
use docshot::{CaptureConfig, CaptureKind, CaptureRequest, Capturer};
use log::{error, info};
use std::path::PathBuf;

/// Capture a rendered document as a PNG banner or a single-page PDF
#[derive(Debug, Parser)]
#[command(name = "docshot", version, about)]
struct Args {
    /// Document source base URL (overrides config and DOCSHOT_BASE_URL)
    #[arg(long)]
    base_url: Option<String>,

    /// Path of the document to capture, relative to the base URL
    #[arg(long)]
    path: String,

    /// What to capture: banner or resume-pdf
    #[arg(long, default_value = "resume-pdf")]
    kind: CaptureKind,

    /// Query parameter passed through to the document, as key=value
    #[arg(long = "param", value_parser = parse_param)]
    params: Vec<(String, String)>,

    /// Output file; defaults to `<kind>.png` or `<kind>.pdf`
    #[arg(long)]
    out: Option<PathBuf>,

    /// JSON configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Write screenshots and markup of failed stages here
    #[arg(long)]
    diagnostics_dir: Option<PathBuf>,
}

/// `--out`, or `<kind>.<extension>` in the working directory
fn output_path(out: Option<PathBuf>, kind: CaptureKind) -> PathBuf {
    out.unwrap_or_else(|| PathBuf::from(format!("{}.{}", kind, kind.content_kind().extension())))
}

fn parse_param(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((k, v)) if !k.is_empty() => Ok((k.to_string(), v.to_string())),
        _ => Err(format!("expected key=value, got '{}'", s)),
    }
}

async fn run(args: Args) -> docshot::Result<()> {
    let mut config = match &args.config {
        Some(path) => CaptureConfig::from_json_file(path)?,
        None => CaptureConfig::default(),
    }
    .apply_env();
    if let Some(base) = args.base_url {
        config.base_url = base;
    }
    if args.diagnostics_dir.is_some() {
        config.diagnostics_dir = args.diagnostics_dir;
    }

    let out = output_path(args.out, args.kind);
    let request = args
        .params
        .into_iter()
        .fold(CaptureRequest::new(args.kind, args.path), |req, (k, v)| req.param(k, v));

    let capturer = Capturer::with_chrome(config)?;
    let outcome = capturer.capture(request).await;
    capturer.shutdown().await;
    let result = outcome?;

    let (len, mime) = (result.len(), result.content_kind().mime());
    std::fs::write(&out, result.into_bytes())
        .map_err(|e| docshot::Error::Other(format!("cannot write {}: {}", out.display(), e)))?;
    info!("Wrote {} ({} bytes, {})", out.display(), len, mime);
    Ok(())
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    if let Err(e) = run(args).await {
        error!("{}", e);
        eprintln!("docshot: {}", e.user_message());
        std::process::exit(if e.is_retryable() { 75 } else { 1 });
    }
}
