use std::io::Write;

use anyhow::{bail, Context};

use super::Command;
use crate::config::CacheSettings;
use crate::domain::cache::{CacheKey, CacheKeyDeriver, RequestMaterial, Sha256KeyDeriver};
use crate::infrastructure::cache::ExactStoreFactory;
use crate::infrastructure::services::CacheOrchestrator;

/// Runs one subcommand, writing its report to `out`
pub async fn run(
    command: &Command,
    settings: &CacheSettings,
    out: &mut (impl Write + Send),
) -> anyhow::Result<()> {
    match command {
        Command::Key { request } => {
            let raw = tokio::fs::read_to_string(request)
                .await
                .with_context(|| format!("reading {}", request.display()))?;
            let material: RequestMaterial =
                serde_json::from_str(&raw).context("parsing request document")?;
            let key = Sha256KeyDeriver::new().derive_key(&material)?;

            writeln!(out, "{}", key)?;
        }
        Command::Get { key } => {
            let key = CacheKey::from_hex(key.as_str())?;
            let store = ExactStoreFactory::new().create(&settings.exact).await?;

            let Some(entry) = store.entry(&key).await? else {
                bail!("no entry for key {}", key);
            };

            writeln!(out, "created_at: {}", entry.created_at.to_rfc3339())?;
            writeln!(out, "{}", entry.payload)?;
        }
        Command::Lookup { text } => {
            let orchestrator = CacheOrchestrator::from_settings(settings).await?;

            match orchestrator.nearest_neighbor(text).await? {
                Some(found) => {
                    let verdict = if found.similarity >= orchestrator.similarity_threshold() {
                        "hit"
                    } else {
                        "miss"
                    };
                    writeln!(
                        out,
                        "{} similarity={:.4} threshold={:.2}",
                        verdict,
                        found.similarity,
                        orchestrator.similarity_threshold()
                    )?;
                    writeln!(out, "document: {}", found.document_text)?;
                    writeln!(out, "{}", found.payload)?;
                }
                None => writeln!(out, "empty index")?,
            }
        }
        Command::Stats => {
            let orchestrator = CacheOrchestrator::from_settings(settings).await?;

            let exact = orchestrator.exact_store();
            writeln!(out, "exact ({}): {}", exact.backend_name(), exact.len().await?)?;

            match orchestrator.semantic_index() {
                Some(index) => {
                    writeln!(out, "semantic ({}): {}", index.collection(), index.len().await?)?
                }
                None => writeln!(out, "semantic: disabled")?,
            }
        }
    }

    Ok(())
}
