use clap::{Parser, Subcommand};
use color_eyre::{eyre::eyre, Result};
use serde_json::Value;
use std::path::PathBuf;
use url::Url;

use offsync::cache::InstallOutcome;
use offsync::config::Config;
use offsync::event::EventHandler;
use offsync::intercept::{InterceptedRequest, Interception};
use offsync::outbox::{OperationKind, Submitted};
use offsync::paths::{self, ResourcePath};
use offsync::query::QueryOptions;
use offsync::remote::RemoteRequest;
use offsync::{logging, Engine};

#[derive(Parser, Debug)]
#[command(name = "offsync")]
#[command(about = "Offline-first caching, query emulation and write replay")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/offsync/config.yaml)
  #[arg(short, long, global = true)]
  config: Option<PathBuf>,

  /// Behave as if the backend were unreachable
  #[arg(long, global = true)]
  offline: bool,

  /// Also log to stderr
  #[arg(short, long, global = true)]
  verbose: bool,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Fetch a URL through the interceptor
  Get {
    url: String,
    /// Treat as a top-level navigation
    #[arg(long)]
    navigate: bool,
  },
  /// Run an emulated query against the local mirror, e.g. "/zi_denuser?$top=5"
  Query { target: String },
  /// Install a cache generation and precache into it
  Install {
    /// Generation tag (defaults to cache.generation)
    #[arg(long)]
    tag: Option<String>,
  },
  /// Activate the newest waiting generation
  Promote,
  /// List known generations
  Generations,
  /// Inspect or extend the offline queue
  #[command(subcommand)]
  Queue(QueueCommand),
  /// Send a mutation, queueing it if the backend is unreachable
  Submit {
    kind: OperationKind,
    path: String,
    /// JSON body
    #[arg(long)]
    payload: Option<String>,
  },
  /// Replay queued mutations now
  Replay,
}

#[derive(Subcommand, Debug)]
enum QueueCommand {
  /// Show pending mutations, oldest first
  List,
  /// Queue a mutation without trying the network
  Add {
    kind: OperationKind,
    path: String,
    #[arg(long)]
    payload: Option<String>,
  },
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();
  let config = Config::load(args.config.as_deref())?;

  let log_dir = logging::log_dir(config.data_dir.as_deref())?;
  let _guard = logging::init(&log_dir, args.verbose)?;

  let mut events = EventHandler::new();
  let engine = Engine::open(config, !args.offline, events.sender())?;
  engine.start().await?;

  run(&engine, args.command).await?;

  for event in events.drain() {
    eprintln!("{}", event.notice());
  }
  Ok(())
}

async fn run(engine: &Engine, command: Command) -> Result<()> {
  match command {
    Command::Get { url, navigate } => {
      let url = resolve(engine, &url)?;
      let request = if navigate {
        InterceptedRequest::navigation(url)
      } else {
        InterceptedRequest::get(url)
      };

      match engine.interceptor().handle(&request).await? {
        Interception::Respond(response) => {
          eprintln!("{} ({:?})", response.status, response.source);
          println!("{}", response.text());
        }
        Interception::Default => {
          let response = engine
            .transport()
            .send(RemoteRequest::get(request.url))
            .await?;
          eprintln!("{} (passthrough)", response.status);
          println!("{}", String::from_utf8_lossy(&response.body));
        }
      }
    }

    Command::Query { target } => {
      let url = resolve(engine, &target)?;
      let normalized = paths::normalize(url.as_str(), &engine.config().deployment_prefixes);
      let outcome = engine
        .query()
        .execute(&ResourcePath::parse(&normalized), &QueryOptions::from_url(&url))
        .await;
      eprintln!("{}", outcome.status());
      println!("{}", String::from_utf8_lossy(&outcome.body()));
    }

    Command::Install { tag } => {
      let tag = tag.unwrap_or_else(|| engine.config().cache.generation.clone());
      match engine.generations().install(&tag).await? {
        InstallOutcome::Activated(report) => println!(
          "{} active ({} entries carried forward, removed: {})",
          report.tag,
          report.carried_forward,
          report.removed.join(", ")
        ),
        InstallOutcome::Waiting { tag } => println!("{} installed, waiting for promote", tag),
        InstallOutcome::AlreadyCurrent { tag } => println!("{} is already current", tag),
      }
    }

    Command::Promote => {
      let report = engine.generations().promote().await?;
      println!("{} active", report.tag);
    }

    Command::Generations => {
      for generation in engine.generations().cache().generations().await? {
        println!(
          "{:<24} {:<8} {}",
          generation.tag,
          format!("{:?}", generation.state).to_lowercase(),
          generation.first_seen.format("%Y-%m-%d %H:%M:%S")
        );
      }
    }

    Command::Queue(QueueCommand::List) => {
      for item in engine.queue().items().await? {
        println!(
          "#{:<5} {:<6} {} {}",
          item.id,
          item.kind,
          item.target_path,
          item.payload.map(|p| p.to_string()).unwrap_or_default()
        );
      }
    }

    Command::Queue(QueueCommand::Add {
      kind,
      path,
      payload,
    }) => {
      let item = engine
        .queue()
        .enqueue(kind, &path, parse_payload(payload)?)
        .await?;
      println!("queued #{}", item.id);
    }

    Command::Submit {
      kind,
      path,
      payload,
    } => match engine
      .writer()
      .submit(kind, &path, parse_payload(payload)?)
      .await?
    {
      Submitted::Completed(response) => {
        eprintln!("{}", response.status);
        println!("{}", String::from_utf8_lossy(&response.body));
      }
      Submitted::Queued(item) => println!("queued #{}", item.id),
    },

    Command::Replay => {
      if !engine.reachability().is_online() {
        return Err(eyre!("Cannot replay while offline"));
      }
      let report = engine.replayer().replay().await?;
      println!(
        "replayed {}, remaining {}{}",
        report.replayed.len(),
        report.remaining,
        report
          .halted_at
          .map(|id| format!(", halted at #{}", id))
          .unwrap_or_default()
      );
    }
  }

  Ok(())
}

/// Accept absolute URLs as well as paths relative to the configured origin.
fn resolve(engine: &Engine, target: &str) -> Result<Url> {
  let origin = engine.config().origin_url()?;
  origin
    .join(target)
    .map_err(|e| eyre!("Invalid URL '{}': {}", target, e))
}

fn parse_payload(payload: Option<String>) -> Result<Option<Value>> {
  payload
    .map(|raw| serde_json::from_str(&raw).map_err(|e| eyre!("Invalid JSON payload: {}", e)))
    .transpose()
}
