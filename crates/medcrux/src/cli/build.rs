use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Serialize;

use medcrux_core::ingest::{BuildStats, KnowledgeBuilder};
use medcrux_core::{KnowledgeStore, Settings};

use super::print_json;

#[derive(Serialize)]
struct BuildReport<'a> {
    out: &'a Path,
    stats: &'a BuildStats,
    failed: Vec<Failure>,
}

#[derive(Serialize)]
struct Failure {
    path: String,
    error: String,
}

pub fn run(settings: &Settings, sources: &[PathBuf], out: &Path) -> Result<()> {
    let vocabulary = settings.vocabulary()?;
    let builder = KnowledgeBuilder::new(vocabulary)?;
    let result = builder.build_paths(sources);

    for (path, error) in &result.failed {
        eprintln!("  skipped {path}: {error}");
    }

    let store = KnowledgeStore::new(out);
    store
        .write(&result.knowledge.entities, &result.knowledge.relations)
        .with_context(|| format!("failed to write knowledge base to {}", out.display()))?;

    eprintln!(
        "Built {} documents ({} skipped): {} entities, {} relations",
        result.success_count(),
        result.failure_count(),
        result.total_stats.entities,
        result.total_stats.relations
    );

    print_json(&BuildReport {
        out: store.root(),
        stats: &result.total_stats,
        failed: result
            .failed
            .iter()
            .map(|(path, error)| Failure {
                path: path.clone(),
                error: error.to_string(),
            })
            .collect(),
    })
}
