//! Inspect persisted chain state: head block, account count, state digest.

use anyhow::Context;
use veles_chain::{Config, Storage};

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let config = match std::env::args().nth(1) {
        Some(path) => Config::from_file(&path).with_context(|| format!("loading {path}"))?,
        None => Config::from_env()?,
    };

    let storage = Storage::open(&config)?;
    let Some(state) = storage.load_state()? else {
        tracing::warn!(data_dir = %config.data_dir.display(), "No state committed yet");
        return Ok(());
    };

    let digest = state.digest()?;
    let record = storage.block_record(state.globals.head_block_number)?;

    tracing::info!(
        head = state.globals.head_block_number,
        time = %state.globals.time,
        accounts = state.accounts().count(),
        events_in_head = record.event_count,
        digest = %hex_digest(&digest),
        "Chain state loaded"
    );

    for (symbol, supply) in &state.globals.total_supply {
        tracing::info!(symbol = %symbol, supply, "Tracked supply");
    }

    state.check_conservation()?;
    tracing::info!("Conservation law holds");
    Ok(())
}

fn hex_digest(digest: &[u8; 32]) -> String {
    digest.iter().map(|b| format!("{b:02x}")).collect()
}
