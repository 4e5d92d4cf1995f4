use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use htmlsnap::message::{RenderJob, SizeRequest};
use htmlsnap::service::{ServiceConfig, SnapshotService, DEFAULT_MAX_DIMENSION};
use htmlsnap::transport::{self, DEFAULT_QUEUE_DEPTH};
use htmlsnap::EngineConfig;
use sha2::Digest as _;

#[derive(Parser, Debug)]
#[command(name = "htmlsnap", version, about = "Render HTML documents to PNG snapshots")]
struct Cli {
    /// Never run inline scripts.
    #[arg(long, global = true)]
    disable_javascript: bool,

    /// Fail a job whose layout takes longer than this many milliseconds.
    #[arg(long, global = true)]
    layout_timeout_ms: Option<u64>,

    /// Largest accepted width or height in pixels.
    #[arg(long, global = true, default_value_t = DEFAULT_MAX_DIMENSION)]
    max_dimension: u32,

    #[command(subcommand)]
    cmd: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Serve JSON-lines jobs on stdin, replies on stdout (default).
    Serve(ServeArgs),
    /// Render one HTML file to a PNG.
    Render(RenderArgs),
}

#[derive(Parser, Debug)]
struct ServeArgs {
    /// Inbound jobs buffered while one is rendering.
    #[arg(long, default_value_t = DEFAULT_QUEUE_DEPTH)]
    queue_depth: usize,
}

#[derive(Parser, Debug)]
struct RenderArgs {
    /// Input HTML file.
    #[arg(long = "in")]
    in_path: PathBuf,

    /// Output PNG path.
    #[arg(long)]
    out: PathBuf,

    /// Output width; content width when omitted.
    #[arg(long)]
    width: Option<u32>,

    /// Output height; content height when omitted.
    #[arg(long)]
    height: Option<u32>,
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("build tokio runtime")?;
    runtime.block_on(run(cli))
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let engine = htmlsnap::new_engine(EngineConfig {
        enable_javascript: !cli.disable_javascript,
        ..Default::default()
    })?;
    let config = ServiceConfig {
        layout_timeout: cli.layout_timeout_ms.map(Duration::from_millis),
        max_dimension: cli.max_dimension,
    };
    let mut service = SnapshotService::new(engine, config);

    let cmd = cli.cmd.unwrap_or(Command::Serve(ServeArgs { queue_depth: DEFAULT_QUEUE_DEPTH }));
    match cmd {
        Command::Serve(args) => {
            let stdin = tokio::io::BufReader::new(tokio::io::stdin());
            transport::serve(&mut service, stdin, tokio::io::stdout(), args.queue_depth).await?;
        }
        Command::Render(args) => render_file(&mut service, &args).await?,
    }

    service.into_engine().close()?;
    Ok(())
}

async fn render_file<E: htmlsnap::RenderEngine>(service: &mut SnapshotService<E>, args: &RenderArgs) -> anyhow::Result<()> {
    let html = std::fs::read_to_string(&args.in_path)
        .with_context(|| format!("read html '{}'", args.in_path.display()))?;
    let size = SizeRequest {
        width: args.width.filter(|w| *w > 0),
        height: args.height.filter(|h| *h > 0),
    };

    let shot = service.render(&RenderJob::new(html, size)).await?;
    std::fs::write(&args.out, &shot.png_data)
        .with_context(|| format!("write png '{}'", args.out.display()))?;

    let digest = sha2::Sha256::digest(&shot.png_data);
    println!("{}x{} sha256={} -> {}", shot.width, shot.height, hex::encode(digest), args.out.display());
    Ok(())
}
