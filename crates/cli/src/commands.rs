//! Subcommand handlers.

use std::future::Future;
use std::io::{BufRead, Write};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use serde::Serialize;
use tracing::{info, warn};

use obflow_core::maintenance;
use obflow_core::{
    parse_missions, CmrCatalog, Config, DataLayout, DateRange, DownloadScheduler, EntityKind,
    EntityStore, FsVolumeMeter, HttpRetriever, Mission, ProcessingError, ProcessingScheduler,
    QueueRequest, Queuer, SanitizedConfig, SeadasBackend, SqliteEntityStore, Verifier,
};

use crate::cli::{Command, RangeArgs};

pub async fn execute(command: Command, config: Config) -> Result<()> {
    match command {
        Command::Init => init(&config),
        Command::Queue {
            missions,
            range,
            priority,
            yes,
        } => {
            let missions = missions.unwrap_or_else(|| config.catalog.default_missions.clone());
            queue(&config, &missions, &range, priority, yes).await
        }
        Command::Download => download(&config).await,
        Command::Process => process(&config).await,
        Command::Verify { purge_leftovers } => verify(&config, purge_leftovers),
        Command::Priority { range, priority } => {
            let store = open_store(&config)?;
            let updated =
                maintenance::change_priority(store.as_ref(), &date_range(&range)?, priority as i64)?;
            print_json(&serde_json::json!({ "updated": updated }))
        }
        Command::Delete { range } => {
            let store = open_store(&config)?;
            let summary = maintenance::delete_products(store.as_ref(), &date_range(&range)?)?;
            print_json(&summary)
        }
        Command::Report { range } => {
            let store = open_store(&config)?;
            let entries = maintenance::report(store.as_ref(), &date_range(&range)?)?;
            print_json(&entries)
        }
        Command::Stats => {
            let store = open_store(&config)?;
            print_json(&store.stats()?)
        }
        Command::ShowConfig => print_json(&SanitizedConfig::from(&config)),
    }
}

fn open_store(config: &Config) -> Result<Arc<dyn EntityStore>> {
    let store = SqliteEntityStore::new(&config.database.path)
        .with_context(|| format!("Failed to open store at {:?}", config.database.path))?;
    Ok(Arc::new(store))
}

fn date_range(args: &RangeArgs) -> Result<DateRange> {
    Ok(DateRange::new(args.from, args.to.unwrap_or(args.from))?)
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Run `work` until it finishes or the process receives Ctrl-C.
async fn until_interrupted<T, E>(work: impl Future<Output = Result<T, E>>) -> Result<T>
where
    E: std::error::Error + Send + Sync + 'static,
{
    tokio::select! {
        result = work => Ok(result?),
        _ = tokio::signal::ctrl_c() => {
            warn!("Interrupted, stopping");
            bail!("interrupted")
        }
    }
}

fn init(config: &Config) -> Result<()> {
    open_store(config)?;
    let layout = DataLayout::new(&config.data.root);
    for dir in [
        layout.kind_root(EntityKind::Product),
        layout.work_dir(),
        layout.kind_root(EntityKind::Derivative),
    ] {
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create {:?}", dir))?;
    }
    info!(
        database = %config.database.path.display(),
        data_root = %config.data.root.display(),
        "Initialized"
    );
    Ok(())
}

async fn queue(
    config: &Config,
    missions: &str,
    range: &RangeArgs,
    priority: u8,
    yes: bool,
) -> Result<()> {
    let request = QueueRequest {
        missions: parse_missions(missions)?,
        range: date_range(range)?,
        priority,
    };
    let store = open_store(config)?;
    let catalog = Arc::new(CmrCatalog::new(config.catalog.clone())?);
    let queuer = Queuer::new(catalog, store, config.processor.resolution.clone());

    let summary = queuer
        .queue(&request, |mission, hits| yes || confirm(mission, hits, &request.range))
        .await?;
    print_json(&summary)
}

fn confirm(mission: Mission, hits: u64, range: &DateRange) -> bool {
    print!(
        "Queue {} {} granules for {}? [y/N] ",
        hits,
        mission.display_name(),
        range
    );
    if std::io::stdout().flush().is_err() {
        return false;
    }
    let mut answer = String::new();
    if std::io::stdin().lock().read_line(&mut answer).is_err() {
        return false;
    }
    matches!(answer.trim(), "y" | "Y" | "yes")
}

async fn download(config: &Config) -> Result<()> {
    let store = open_store(config)?;
    let retriever = Arc::new(HttpRetriever::new(config.retrieval.clone())?);
    let meter = Arc::new(FsVolumeMeter::new(&config.data.root));
    let scheduler = DownloadScheduler::new(
        config.downloader.clone(),
        DataLayout::new(&config.data.root),
        store,
        retriever,
        meter,
    );

    let summary = until_interrupted(scheduler.run()).await?;
    print_json(&summary)
}

async fn process(config: &Config) -> Result<()> {
    let store = open_store(config)?;
    let backend = Arc::new(SeadasBackend::new(
        &config.processor.l2bin_path,
        &config.processor.l3mapgen_path,
    ));
    let scheduler = ProcessingScheduler::new(
        config.processor.clone(),
        DataLayout::new(&config.data.root),
        store,
        backend,
    );

    match until_interrupted(scheduler.run()).await {
        Ok(summary) => print_json(&summary),
        Err(e) => {
            if let Some(summary) = e
                .downcast_ref::<ProcessingError>()
                .and_then(ProcessingError::summary)
            {
                print_json(summary)?;
            }
            Err(e)
        }
    }
}

fn verify(config: &Config, purge_leftovers: bool) -> Result<()> {
    let store = open_store(config)?;
    let verifier = Verifier::new(
        store,
        DataLayout::new(&config.data.root),
        config.processor.resolution.clone(),
    );
    let report = verifier.run(purge_leftovers)?;
    if !purge_leftovers && !report.leftovers.is_empty() {
        warn!(
            leftovers = report.leftovers.len(),
            "Processed source files remain on disk; rerun with --purge-leftovers to delete them"
        );
    }
    print_json(&report)
}
