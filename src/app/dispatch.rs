use crate::cli::{Cli, Commands, RebuildCommands};
use anyhow::{Context, Result};
use chrono::{NaiveDate, Utc};
use std::sync::Arc;
use tailmem::Config;
use tailmem::concept::ConceptStore;
use tailmem::eventlog::EventLogRegistry;
use tailmem::reflection::ReflectionJournal;
use tailmem::search::{SearchHit, SearchIndex, SearchQuery};
use tokio_util::sync::CancellationToken;
use tracing::info;

fn print_hit(hit: &SearchHit) {
    let tool = hit
        .tool_name
        .as_deref()
        .map(|t| format!(" [{t}]"))
        .unwrap_or_default();
    println!(
        "{}  {}  {}/{}{}  {}",
        hit.timestamp.format("%Y-%m-%d %H:%M:%S"),
        hit.session_id,
        hit.event_type,
        hit.role.as_deref().unwrap_or("-"),
        tool,
        hit.text
    );
}

async fn open_index(config: &Config) -> Result<SearchIndex> {
    SearchIndex::open(&config.search_db_path(), config.search.clone()).await
}

async fn run_index(config: &Config, session: Option<String>) -> Result<()> {
    let registry = EventLogRegistry::new(config.sessions_dir());
    let index = open_index(config).await?;
    let counts = match session {
        Some(key) => {
            let log = registry.open(&key).await;
            vec![(key, index.index_session(&log).await?)]
        }
        None => index.index_all(&registry).await?,
    };
    for (key, indexed) in &counts {
        println!("{key}: {indexed} new events");
    }
    let total: usize = counts.iter().map(|(_, n)| n).sum();
    let stats = index.get_stats().await?;
    info!(sessions = counts.len(), indexed = total, "index pass complete");
    println!(
        "{} events across {} sessions ({} manifests, {})",
        stats.total_events,
        stats.sessions,
        stats.manifests,
        if stats.full_text { "full-text" } else { "keyword scan" }
    );
    Ok(())
}

async fn run_rebuild(config: &Config, command: RebuildCommands) -> Result<()> {
    let mut concept = config.concept.clone();
    if let RebuildCommands::Events { hours: Some(hours) } = &command {
        concept.rebuild_window_hours = *hours;
    }
    let store = ConceptStore::new(config.concept_dir(), concept);
    let cancel = CancellationToken::new();
    let report = match command {
        RebuildCommands::Fs { dir } => store.rebuild_from_fs(&dir, &cancel).await?,
        RebuildCommands::Events { .. } => {
            let logs = EventLogRegistry::new(config.sessions_dir()).open_all().await?;
            store
                .rebuild_from_events(&logs, Utc::now(), config.search.tool_args_max_chars, &cancel)
                .await?
        }
    };
    println!(
        "pruned {}, reindexed {}, new chunks {}, merged {}, related links {}, anchors {}",
        report.pruned,
        report.reindexed,
        report.new_chunks,
        report.merged,
        report.related_links,
        report.anchors
    );
    Ok(())
}

pub async fn dispatch(cli: Cli, config: Arc<Config>) -> Result<()> {
    match cli.command {
        Commands::Index { session } => run_index(&config, session).await,

        Commands::Search {
            query,
            session,
            kinds,
            roles,
            limit,
        } => {
            let index = open_index(&config).await?;
            let mut q = SearchQuery::new(query).event_types(kinds).roles(roles);
            if let Some(session) = session {
                q = q.session(session);
            }
            if let Some(limit) = limit {
                q = q.limit(limit);
            }
            let hits = index.search(&q).await?;
            if hits.is_empty() {
                println!("no results");
            }
            hits.iter().for_each(print_hit);
            Ok(())
        }

        Commands::Recent { session, count } => {
            let index = open_index(&config).await?;
            index.get_recent(&session, count).await?.iter().for_each(print_hit);
            Ok(())
        }

        Commands::Rebuild(command) => run_rebuild(&config, command).await,

        Commands::Lookup { anchor } => {
            let store = ConceptStore::new(config.concept_dir(), config.concept.clone());
            let chunks = store.lookup(&anchor).await;
            println!("{}", serde_json::to_string_pretty(&chunks)?);
            Ok(())
        }

        Commands::Digest { date } => {
            let date = match date {
                Some(raw) => NaiveDate::parse_from_str(&raw, "%Y-%m-%d")
                    .with_context(|| format!("invalid date '{raw}', expected YYYY-MM-DD"))?,
                None => Utc::now().date_naive(),
            };
            let journal = ReflectionJournal::new(config.reflections_dir());
            let digest = journal.digest(date).await?;
            println!("{}", serde_json::to_string_pretty(&digest)?);
            Ok(())
        }
    }
}
