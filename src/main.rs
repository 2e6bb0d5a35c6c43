mod cache;
mod config;
mod db;
mod event;
mod http;
mod logging;
mod network;
mod notify;
mod queue;
mod router;
mod strategy;
mod worker;

use clap::{Parser, Subcommand};
use color_eyre::{eyre::eyre, Result};
use reqwest::Method;
use std::path::PathBuf;

use crate::event::{Event, Reply};
use crate::http::Request;
use crate::notify::Action;
use crate::worker::Worker;

#[derive(Parser, Debug)]
#[command(name = "fueltracker-sw")]
#[command(about = "Offline-first request interception and replay for FuelTracker Pro")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/fueltracker-sw/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  /// Also write logs to this file
  #[arg(long)]
  log_file: Option<PathBuf>,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Populate the static tier for the current cache version
  Install,
  /// Delete tiers from previous cache versions
  Activate,
  /// Serve a request through the strategies, queueing failed mutations
  Fetch {
    /// Absolute URL or path relative to the origin
    url: String,
    #[arg(short = 'X', long, default_value = "GET")]
    method: String,
    /// JSON request body
    #[arg(short, long)]
    data: Option<String>,
    /// Treat the request as a page navigation
    #[arg(long)]
    navigate: bool,
  },
  /// Queue a mutation for later replay
  Enqueue { queue: String, payload: String },
  /// List pending records
  Pending { queue: Option<String> },
  /// Reconnect signal: replay the queue(s) bound to a sync tag
  Sync { tag: Option<String> },
  /// Show the notification a push payload produces
  Push {
    payload: Option<String>,
    /// Simulate a click with this action (view, dismiss)
    #[arg(long)]
    click: Option<String>,
  },
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();
  let _log_guard = logging::init(args.log_file.as_deref())?;

  let config = config::Config::load(args.config.as_deref())?;
  let mut worker = Worker::open(config)?;

  match args.command {
    Command::Install => {
      if let Reply::Installed { assets } = worker.handle(Event::Install).await? {
        println!("installed {} static assets", assets);
      }
    }
    Command::Activate => {
      if let Reply::Activated { deleted } = worker.handle(Event::Activate).await? {
        for name in &deleted {
          println!("deleted {}", name);
        }
        println!("active ({} stale tiers removed)", deleted.len());
      }
    }
    Command::Fetch {
      url,
      method,
      data,
      navigate,
    } => {
      worker.ensure_active().await?;
      tracing::debug!(state = ?worker.state(), "worker ready");

      let method = Method::from_bytes(method.to_uppercase().as_bytes())
        .map_err(|e| eyre!("Invalid method '{}': {}", method, e))?;
      let mut request = Request::get(worker.config().resolve(&url)?);
      request.method = method;
      if navigate {
        request = request.navigation();
      }
      if let Some(data) = data {
        let payload: serde_json::Value =
          serde_json::from_str(&data).map_err(|e| eyre!("Invalid JSON body: {}", e))?;
        request = request.with_header("Content-Type", "application/json");
        request.body = Some(payload.to_string().into_bytes());
      }

      if let Reply::Served { served, queued } = worker.handle(Event::Fetch(request)).await? {
        eprintln!(
          "{} ({:?}{})",
          served.response.status,
          served.source,
          served
            .cached_at
            .map(|t| format!(", cached {}", t.to_rfc3339()))
            .unwrap_or_default()
        );
        if let Some(id) = queued {
          eprintln!("queued as record {}", id);
        }
        println!("{}", served.response.text());
      }
    }
    Command::Enqueue { queue, payload } => {
      let payload: serde_json::Value =
        serde_json::from_str(&payload).map_err(|e| eyre!("Invalid JSON payload: {}", e))?;
      let id = worker.enqueue(&queue, None, &payload).await?;
      println!("{}", id);
    }
    Command::Pending { queue } => {
      let queues: Vec<String> = match queue {
        Some(q) => vec![q],
        None => worker.queues().map(String::from).collect(),
      };
      let mut records = Vec::new();
      for queue in &queues {
        records.extend(worker.pending(queue).await?);
      }
      println!("{}", serde_json::to_string_pretty(&records)?);
    }
    Command::Sync { tag } => {
      let tag = tag.unwrap_or_else(|| worker.config().sync_all_tag.clone());
      if let Reply::Synced(summaries) = worker.handle(Event::Sync { tag }).await? {
        for s in summaries {
          println!(
            "{}: {} of {} replayed, {} failed{}",
            s.queue,
            s.replayed,
            s.attempted,
            s.failed,
            if s.skipped { " (skipped, already running)" } else { "" }
          );
        }
      }
    }
    Command::Push { payload, click } => {
      let event = Event::Push {
        payload: payload.map(String::into_bytes),
      };
      if let Reply::Notify(notification) = worker.handle(event).await? {
        println!("{}", serde_json::to_string_pretty(&notification)?);

        if let Some(click) = click {
          let action = Action::parse(&click);
          let reply = worker
            .handle(Event::NotificationClick {
              notification,
              action,
            })
            .await?;
          if let Reply::Navigate(target) = reply {
            println!("open {}", target);
          }
        }
      }
    }
  }

  worker.drain().await;
  Ok(())
}
