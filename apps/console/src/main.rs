use std::{path::PathBuf, sync::Arc};

use anyhow::{bail, Result};
use clap::Parser;
use client_core::{
    config::{load_settings, load_settings_from, parse_stage},
    Completion, HttpAnnotationClient, SessionController, SubmitOutcome, ViewMode, WorkflowState,
};
use shared::domain::{Judgement, Task};
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use tracing::warn;
use tracing_subscriber::EnvFilter;

/// Terminal view over a labelling session.
#[derive(Parser, Debug)]
struct Args {
    #[arg(long)]
    server_url: Option<String>,
    #[arg(long)]
    config: Option<PathBuf>,
    /// Start in batch view (image tasks with binary or classification labels).
    #[arg(long)]
    batch: bool,
    #[arg(long)]
    force_stage: Option<String>,
    #[arg(long)]
    sample_size: Option<usize>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
    let args = Args::parse();

    let mut settings = match &args.config {
        Some(path) => load_settings_from(path),
        None => load_settings(),
    };
    if let Some(server_url) = args.server_url {
        settings.server_url = server_url;
    }
    if let Some(raw) = args.force_stage.as_deref() {
        let Some(stage) = parse_stage(raw) else {
            bail!("unknown stage '{raw}'; expected TRAIN, TEST or MODEL_LABELLED");
        };
        settings.batch_query = settings.batch_query.force_stage(stage);
    }
    if let Some(size) = args.sample_size {
        settings.batch_query = settings.batch_query.sample_size(size);
    }

    let client =
        HttpAnnotationClient::with_timeout(&settings.server_url, settings.request_timeout())?;
    let controller = SessionController::with_batch_query(Arc::new(client), settings.batch_query);
    controller.start_session().await?;

    if args.batch && controller.view_mode().await == ViewMode::Single {
        if controller.set_batch_view(true).await {
            controller.fetch_batch_items().await?;
        } else {
            warn!("this task does not support batch view; staying in single-item view");
        }
    }

    println!("Commands: a label name or number, :toggle, :stats, :quit");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let state = controller.snapshot().await;
        let Some(task) = state.task.data.clone() else {
            bail!("session has no task");
        };
        if render(&task, &state) {
            break;
        }

        let Some(line) = next_line(&mut lines).await? else {
            break;
        };
        match line.as_str() {
            ":quit" => break,
            ":stats" => {
                let _ = controller.fetch_stats().await;
                print_stats(&controller.snapshot().await);
            }
            ":toggle" => {
                if controller.toggle_view_mode().await {
                    match controller.view_mode().await {
                        ViewMode::Batch => {
                            let _ = controller.fetch_batch_items().await;
                        }
                        ViewMode::Single => {
                            let _ = controller.fetch_items().await;
                        }
                    }
                } else {
                    println!("Batch view is not available for this task.");
                }
            }
            input => {
                let outcome = match controller.view_mode().await {
                    ViewMode::Single => {
                        let Some(label) = resolve_label(&task, input) else {
                            println!("Unknown label '{input}'.");
                            continue;
                        };
                        controller.submit_judgement(label).await
                    }
                    ViewMode::Batch => {
                        let Some(judgements) = batch_judgements(&task, &state, input) else {
                            println!(
                                "Give one label per item ({} expected).",
                                state.batch_items.data.len()
                            );
                            continue;
                        };
                        controller.submit_batch(judgements).await
                    }
                };
                match outcome {
                    Ok(SubmitOutcome::Recorded) => {}
                    Ok(SubmitOutcome::Duplicate) => println!("Still submitting, try again."),
                    Ok(SubmitOutcome::Superseded) => println!("View changed; judgement dropped."),
                    Err(err) => println!("Submission failed: {err}"),
                }
            }
        }
    }

    Ok(())
}

async fn next_line(lines: &mut Lines<BufReader<Stdin>>) -> Result<Option<String>> {
    Ok(lines.next_line().await?.map(|line| line.trim().to_string()))
}

fn resolve_label(task: &Task, input: &str) -> Option<String> {
    if task.classes.is_empty() {
        return (!input.is_empty()).then(|| input.to_string());
    }
    task.class_for(input).map(str::to_string)
}

fn batch_judgements(task: &Task, state: &WorkflowState, input: &str) -> Option<Vec<Judgement>> {
    let labels: Vec<_> = input.split_whitespace().collect();
    if labels.len() != state.batch_items.data.len() {
        return None;
    }
    state
        .batch_items
        .data
        .iter()
        .zip(labels)
        .map(|(item, label)| {
            resolve_label(task, label).map(|label| Judgement::new(item.id.clone(), label))
        })
        .collect()
}

/// Prints the current view. Returns true once the session is complete.
fn render(task: &Task, state: &WorkflowState) -> bool {
    match state.completion {
        Completion::ItemsExhausted => {
            println!("All fetched items are labelled.");
            return true;
        }
        Completion::BatchComplete => {
            println!("Batch labelling complete.");
            return true;
        }
        Completion::InProgress => {}
    }

    if let Some(err) = state
        .submission
        .error
        .as_deref()
        .or(state.submission.batch_error.as_deref())
    {
        println!("Last submission failed: {err}");
    }

    if !task.classes.is_empty() {
        let classes: Vec<_> = task
            .classes
            .iter()
            .enumerate()
            .map(|(index, class)| format!("{}={class}", index + 1))
            .collect();
        println!("Labels: {}", classes.join("  "));
    }

    if task.is_batch_view {
        println!("Batch of {}:", state.batch_items.data.len());
        for item in &state.batch_items.data {
            println!("  {}", item.id);
        }
        return false;
    }

    match state.current_item() {
        Some(item) => {
            println!(
                "[{}/{}] {}",
                state.current_index + 1,
                state.items.data.len(),
                item.id
            );
            if let Some(text) = &item.text {
                println!("{text}");
            }
        }
        None => {
            if let Some(err) = &state.items.error {
                println!("Could not load items: {err}");
            }
            println!("No items to label.");
        }
    }
    false
}

fn print_stats(state: &WorkflowState) {
    let Some(stats) = &state.stats.data else {
        println!(
            "Stats unavailable{}",
            state
                .stats
                .error
                .as_deref()
                .map(|err| format!(": {err}"))
                .unwrap_or_default()
        );
        return;
    };
    let min_train = state.task.data.as_ref().map_or(0, |task| task.min_train);
    println!(
        "unlabelled={} labelled={} train={} test={} ready={}",
        stats.unlabelled,
        stats.labelled.total,
        stats.labelled.train,
        stats.labelled.test,
        stats.training_ready(min_train)
    );
    if let Some(accuracy) = stats.latest_test_accuracy() {
        println!("latest test accuracy: {:.1}%", accuracy * 100.0);
    }
}
