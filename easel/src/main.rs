#![allow(clippy::must_use_candidate, clippy::missing_errors_doc)]

mod args;

use std::{path::Path, process::ExitCode};

use args::{Args, Command, GenerateArgs, HistoryAction};
use clap::Parser;
use easel_config::Config;
use easel_history::{HistoryStore, NewHistoryRecord, SupabaseHistoryStore};
use easel_imagegen::{
    GenerationRequest, GenerationResult, ImageFile, ModelRegistry, QueueStatus, QueueUpdate, UploadedImage,
};
use tokio::sync::mpsc;

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let args = Args::parse();

    match args.command {
        Command::Models => {
            easel_telemetry::init(None, "warn")?;
            print_json(&ModelRegistry::builtin().categories())?;
            Ok(ExitCode::SUCCESS)
        }
        Command::Generate(generate) => {
            let config = load_config(&args.config)?;

            tokio::select! {
                result = run_generate(&config, generate) => result,
                () = shutdown_signal() => Ok(ExitCode::from(130)),
            }
        }
        Command::History { action } => {
            let config = load_config(&args.config)?;
            run_history(&config, action).await
        }
    }
}

fn load_config(path: &Path) -> anyhow::Result<Config> {
    let config = Config::load(path)?;

    easel_telemetry::init(config.telemetry.as_ref(), "info")?;

    tracing::info!(config_path = %path.display(), "starting easel");

    Ok(config)
}

async fn run_generate(config: &Config, args: GenerateArgs) -> anyhow::Result<ExitCode> {
    let generator = easel_imagegen::build_generator(config)?;
    let model = generator.registry().lookup(&args.model)?;

    let mut request = GenerationRequest {
        prompt: args.prompt,
        ..GenerationRequest::default()
    };

    for path in &args.images {
        request = request.with_image(UploadedImage::from_file(read_image(path).await?));
    }
    for url in args.image_urls {
        request = request.with_image(UploadedImage::from_url(url));
    }
    if let Some(mask) = &args.mask {
        request = request.with_mask(read_image(mask).await?);
    }
    for (key, value) in args.params {
        request = request.with_param(key, value);
    }

    let (progress, updates) = mpsc::unbounded_channel::<QueueUpdate>();
    let reporter = tokio::spawn(report_progress(updates));

    let result = generator.generate_image_with_progress(model, &request, Some(progress)).await;
    // Sender is dropped with the call, so the reporter drains and exits
    reporter.await?;

    print_json(&result)?;

    let GenerationResult::Success(success) = &result else {
        return Ok(ExitCode::FAILURE);
    };

    if success.images.is_empty() {
        tracing::warn!(model = %model.id, "generation succeeded without any images");
        return Ok(ExitCode::FAILURE);
    }

    if args.save {
        let store = history_store(config)?;
        let source = request.images.iter().find_map(UploadedImage::remote_url);
        let records = NewHistoryRecord::from_images(success, request.prompt_text(), source);

        for record in records {
            let saved = store.save(record).await?;
            tracing::info!(id = %saved.id, "saved to history");
        }
    }

    Ok(ExitCode::SUCCESS)
}

/// Log queue progress until every sender is dropped, returning the number of updates seen
async fn report_progress(mut updates: mpsc::UnboundedReceiver<QueueUpdate>) -> usize {
    let mut seen = 0;

    while let Some(update) = updates.recv().await {
        seen += 1;
        match update.status {
            QueueStatus::InQueue { position } => {
                tracing::info!(request_id = %update.request_id, ?position, "queued");
            }
            QueueStatus::InProgress => {
                tracing::info!(request_id = %update.request_id, "in progress");
            }
            QueueStatus::Completed => {
                tracing::info!(request_id = %update.request_id, "completed");
            }
        }
        for line in update.logs {
            tracing::debug!(request_id = %update.request_id, "{line}");
        }
    }

    seen
}

async fn run_history(config: &Config, action: HistoryAction) -> anyhow::Result<ExitCode> {
    let store = history_store(config)?;

    match action {
        HistoryAction::List => print_json(&store.fetch().await?)?,
        HistoryAction::Delete { id } => {
            store.delete(&id).await?;
            tracing::info!(%id, "deleted history record");
        }
    }

    Ok(ExitCode::SUCCESS)
}

fn history_store(config: &Config) -> anyhow::Result<SupabaseHistoryStore> {
    let history = config.history.as_ref().ok_or(easel_history::HistoryError::NotConfigured)?;
    Ok(SupabaseHistoryStore::new(history)?)
}

async fn read_image(path: &Path) -> anyhow::Result<ImageFile> {
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|e| anyhow::anyhow!("failed to read image {}: {e}", path.display()))?;

    let filename = path
        .file_name()
        .map_or_else(|| "image.png".to_owned(), |name| name.to_string_lossy().into_owned());

    Ok(ImageFile::new(bytes, filename))
}

fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Wait for a shutdown signal (`SIGINT` or `SIGTERM`)
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }

    tracing::warn!("shutdown signal received, abandoning generation");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn progress_reporter_drains_until_sender_drops() {
        let (progress, updates) = mpsc::unbounded_channel::<QueueUpdate>();
        let reporter = tokio::spawn(report_progress(updates));

        for status in [
            QueueStatus::InQueue { position: Some(3) },
            QueueStatus::InProgress,
            QueueStatus::Completed,
        ] {
            progress
                .send(QueueUpdate {
                    request_id: "req-1".to_owned(),
                    status,
                    logs: vec!["step".to_owned()],
                })
                .unwrap();
        }
        drop(progress);

        assert_eq!(reporter.await.unwrap(), 3);
    }
}
