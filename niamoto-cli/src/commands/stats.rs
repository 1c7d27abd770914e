//! `niamoto stats`: read-only report of registered entities and recent runs.

use anyhow::Result;

use niamoto_registry::EntityFilter;

use crate::context::Session;

pub async fn run(session: &Session, recent: usize) -> Result<()> {
    let entities = session.registry.list(EntityFilter::default());
    println!("entities ({}):", entities.len());
    let mut names: Vec<_> = entities.iter().map(|e| e.name.clone()).collect();
    names.sort();
    for name in &names {
        let entity = session.registry.get(name).expect("just listed");
        println!("  {} [{:?}] {} rows -> {}", entity.name, entity.kind, entity.metadata.row_count, entity.physical_table);
    }

    let runs = niamoto_orchestrator::run_log::recent(&session.store, recent).await;
    println!("recent runs ({}):", runs.len());
    for row in &runs {
        println!(
            "  {} {} status={} processed={}/{}",
            row["started_at"].as_str().unwrap_or_default(),
            row["phase"].as_str().unwrap_or_default(),
            row["status"].as_str().unwrap_or_default(),
            row["groups_processed"].as_i64().unwrap_or_default(),
            row["groups_total"].as_i64().unwrap_or_default(),
        );
    }

    Ok(())
}
