// Copyright 2026 Daniel Pelikan
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! bpp-print: send documents to a Bluetooth BPP printer.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use bpp_print::bluetooth::{self, BluezConnector, DeviceAddress};
use bpp_print::bpp::{Batch, BatchStatus, Share, Transfer, TransferOutcome};
use bpp_print::config::Config;
use bpp_print::events::TransferUpdate;
use bpp_print::storage::ShareStore;

#[derive(Debug, Parser)]
#[command(version, about = "Print documents on a Bluetooth BPP printer")]
struct Cli {
    /// Printer address, e.g. 00:11:22:33:44:55
    address: DeviceAddress,

    /// Documents to print, in order
    #[arg(required = true)]
    files: Vec<PathBuf>,

    /// MIME type for every document instead of guessing from the extension
    #[arg(long)]
    mime: Option<String>,

    /// Use this config file instead of the default one
    #[arg(long)]
    config: Option<PathBuf>,

    /// Print the outcome as JSON
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("bpp_print=info")),
        )
        .init();

    let cli = Cli::parse();
    info!("Starting bpp-print v{}", env!("CARGO_PKG_VERSION"));

    let config = match &cli.config {
        Some(path) => {
            let mut config = Config::load_from(path)?;
            config.data_dir = Config::default_data_dir()?;
            config
        }
        None => Config::load()?,
    };
    info!("Configuration loaded");

    let store = ShareStore::open(&config.data_dir).context("opening share database")?;

    let mut shares = Vec::with_capacity(cli.files.len());
    for file in &cli.files {
        let mime = cli.mime.clone().unwrap_or_else(|| guess_mime(file).to_string());
        let share = Share::outbound(file, &mime, cli.address);
        shares.push(store.insert(&share)?);
    }
    let batch_id = chrono::Local::now().timestamp_millis();
    let batch = Batch::new(batch_id, cli.address, shares);

    let connector = BluezConnector::new().await?;
    let adapter = connector.adapter().clone();

    let (transfer, handle) = Transfer::new(&config, store, Arc::new(connector), batch);
    let Some(mut updates) = handle.updates() else {
        anyhow::bail!("transfer updates already taken");
    };
    let mut run = tokio::spawn(transfer.run());

    let mut cancel_sent = false;
    let mut document_sent = false;
    let outcome: TransferOutcome = loop {
        tokio::select! {
            outcome = &mut run => break outcome?,
            update = updates.recv() => match update {
                Some(TransferUpdate::Connected) => {
                    info!("Connected to {}", cli.address);
                    let watcher = handle.clone();
                    let adapter = adapter.clone();
                    let device = cli.address;
                    tokio::spawn(async move {
                        if let Err(e) = bluetooth::watch(adapter, device, watcher).await {
                            warn!("Link monitor stopped: {}", e);
                        }
                    });
                }
                Some(TransferUpdate::PrinterReady(attrs)) => {
                    info!(
                        "Printer {} ready, formats: {:?}",
                        attrs.name.as_deref().unwrap_or("(unnamed)"),
                        attrs.document_formats
                    );
                    handle.create_job();
                }
                Some(TransferUpdate::JobCreated(id)) => {
                    info!("Job {} created", id);
                    handle.start_event_channel();
                }
                Some(TransferUpdate::StatusChannelConnected(connected)) if !document_sent => {
                    if !connected {
                        warn!("Printing without job status reports");
                    }
                    document_sent = true;
                    handle.send_document();
                }
                Some(TransferUpdate::Progress { share_id, sent, total }) => {
                    info!("Share {}: {}/{} bytes", share_id, sent, total);
                }
                Some(TransferUpdate::PrinterEvent { job_state, printer_state }) => {
                    info!("Job {}, printer {}", job_state, printer_state);
                }
                Some(TransferUpdate::ShareFinished { share_id, status }) => {
                    info!("Share {} finished: {}", share_id, status);
                }
                Some(other) => tracing::debug!("Update {:?}", other),
                None => {}
            },
            _ = tokio::signal::ctrl_c(), if !cancel_sent => {
                info!("Cancel requested");
                cancel_sent = true;
                handle.cancel();
            }
        }
    };

    report(&outcome, cli.json)?;
    Ok(if outcome.batch == BatchStatus::Finished {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn report(outcome: &TransferOutcome, json: bool) -> Result<()> {
    if json {
        let shares: Vec<_> = outcome
            .shares
            .iter()
            .map(|s| {
                serde_json::json!({
                    "id": s.id,
                    "file": s.uri,
                    "status": s.status.code(),
                    "bytes": s.current_bytes,
                })
            })
            .collect();
        let value = serde_json::json!({
            "batch": outcome.batch.as_str(),
            "message": outcome.message,
            "shares": shares,
        });
        println!("{}", serde_json::to_string_pretty(&value)?);
    } else {
        match &outcome.message {
            Some(msg) => println!("{}", msg),
            None => println!("Batch {}", outcome.batch.as_str()),
        }
        if outcome.batch != BatchStatus::Finished {
            error!("Printing did not complete");
        }
    }
    Ok(())
}

fn guess_mime(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "txt" => "text/plain",
        "pdf" => "application/pdf",
        "ps" => "application/postscript",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "png" => "image/png",
        "vcf" => "text/x-vcard",
        "vcs" => "text/x-vcalendar",
        "htm" | "html" | "xhtml" => "application/vnd.pwg-xhtml-print+xml",
        _ => "application/octet-stream",
    }
}
