//! `huggnote-compose` -- drive an order's variations from a terminal.
//!
//! ```text
//! huggnote-compose <form.json>     start a new order from a form file
//! huggnote-compose --resume [id]   reopen the current (or given) order
//! huggnote-compose --history       list orders known to the local store
//! ```
//!
//! Every song is activated, the command waits until each is ready or has
//! failed, and prints the variation table. Configuration comes from the
//! environment; see [`OrchestratorConfig::from_env`].

use std::sync::Arc;

use anyhow::Context;
use huggnote_core::order::OrderForm;
use huggnote_core::phase::SongPhase;
use huggnote_core::record::OrderRecord;
use huggnote_core::types::{OrderId, SongIndex};
use huggnote_musicgen::{MusicApi, PaymentApi, PromptApi};
use huggnote_orchestrator::config::OrchestratorConfig;
use huggnote_orchestrator::controller::{Orchestrator, Services};
use huggnote_orchestrator::events::OrchestratorEvent;
use huggnote_orchestrator::record_client::RecordClient;
use huggnote_orchestrator::services::StaticIdentity;
use huggnote_orchestrator::store::FileStore;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "huggnote_orchestrator=debug,huggnote_compose=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = OrchestratorConfig::from_env().context("Invalid orchestrator configuration")?;
    tracing::info!(
        record_api_url = %config.record_api_url,
        local_store_dir = %config.local_store_dir.display(),
        signed_in = config.user_id.is_some(),
        "Loaded orchestrator configuration",
    );

    let client = reqwest::Client::new();
    let local = Arc::new(FileStore::open(&config.local_store_dir).await?);
    let orchestrator = Orchestrator::new(
        Services {
            local,
            records: Arc::new(RecordClient::with_client(
                client.clone(),
                config.record_api_url.clone(),
            )),
            prompts: Arc::new(PromptApi::with_client(
                client.clone(),
                config.prompt_api_url.clone(),
            )),
            generator: Arc::new(MusicApi::with_client(
                client.clone(),
                config.music_api_url.clone(),
                config.music_api_key.clone(),
            )),
            payments: Arc::new(PaymentApi::with_client(
                client,
                config.payment_api_url.clone(),
            )),
            identity: Arc::new(StaticIdentity(config.user_id.clone())),
        },
        config.timings.clone(),
    );

    let args: Vec<String> = std::env::args().skip(1).collect();
    let record = match args.first().map(String::as_str) {
        Some("--history") => {
            for id in orchestrator.history().await? {
                println!("{id}");
            }
            return Ok(());
        }
        Some("--resume") => match args.get(1) {
            Some(id) => orchestrator.open(&OrderId::from(id.as_str())).await?,
            None => orchestrator
                .resume()
                .await?
                .context("No current order to resume")?,
        },
        Some(path) => {
            let bytes = tokio::fs::read(path)
                .await
                .with_context(|| format!("Failed to read order form {path}"))?;
            let form: OrderForm = serde_json::from_slice(&bytes)
                .with_context(|| format!("Order form {path} is not valid JSON"))?;
            orchestrator.start_order(form).await?
        }
        None => anyhow::bail!("usage: huggnote-compose <form.json> | --resume [order-id] | --history"),
    };

    println!("Order {}", record.id);
    spawn_event_log(&orchestrator);

    for index in 0..record.song_count() {
        let index = SongIndex::try_from(index)?;
        orchestrator.activate_song(index).await?;
    }

    tokio::select! {
        () = orchestrator.wait_until_settled() => {}
        result = tokio::signal::ctrl_c() => {
            result.context("Failed to listen for Ctrl-C")?;
            tracing::info!("Interrupted, progress is saved and can be resumed");
        }
    }
    orchestrator.shutdown();

    print_table(&orchestrator, &orchestrator.record().await?).await;
    Ok(())
}

/// Log orchestrator events as they happen.
fn spawn_event_log(orchestrator: &Arc<Orchestrator>) {
    let mut rx = orchestrator.subscribe();
    tokio::spawn(async move {
        while let Ok(event) = rx.recv().await {
            match event {
                OrchestratorEvent::PhaseChanged { song_index, phase, .. } => {
                    println!("song {song_index}: {}", phase.name());
                }
                OrchestratorEvent::VariationUpdated {
                    song_index,
                    variation_id,
                    task,
                    ..
                } => {
                    println!(
                        "song {song_index} variation {variation_id}: {}",
                        task.task_id().unwrap_or("failed")
                    );
                }
                OrchestratorEvent::WatchProgress {
                    song_index,
                    received,
                    expected,
                    ..
                } => {
                    println!("song {song_index}: {received}/{expected} ready");
                }
                OrchestratorEvent::SyncDegraded { reason, .. } => {
                    eprintln!("warning: record service unreachable ({reason})");
                }
            }
        }
    });
}

async fn print_table(orchestrator: &Orchestrator, record: &OrderRecord) {
    for (index, song) in record.form.songs.iter().enumerate() {
        let Ok(song_index) = SongIndex::try_from(index) else {
            continue;
        };
        let phase = orchestrator.phase(song_index).await;
        let status = match &phase {
            SongPhase::Error(msg) => format!("error: {msg}"),
            other => other.name().to_string(),
        };
        println!("\n[{index}] for {} ({status})", song.recipient_name);

        let Some(variations) = record.variations.song(song_index) else {
            continue;
        };
        for (id, slot) in variations.iter() {
            let style = slot.style.as_deref().unwrap_or("-");
            let audio = slot.audio_url.as_deref().unwrap_or("pending");
            let selected = if record.selections.get(song_index) == Some(id) { "*" } else { " " };
            println!("  {selected} v{id} [{style}] {audio}");
        }
    }
}
