//! `monox skim`: read events, run the sample's regions, write the outputs.

use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use mx_pipeline::Event;
use mx_regions::RegionCatalog;

fn read_events(path: &Path) -> Result<Vec<Event>> {
    let file = File::open(path).with_context(|| format!("opening events {}", path.display()))?;
    let mut events = Vec::new();
    for (i, line) in BufReader::new(file).lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let event: Event = serde_json::from_str(&line)
            .with_context(|| format!("{}:{}: invalid event", path.display(), i + 1))?;
        events.push(event);
    }
    Ok(events)
}

pub(crate) fn cmd_skim(
    config: &Path,
    tables: &Path,
    events: &Path,
    sample: &str,
    out_dir: &Path,
    max_events: Option<usize>,
) -> Result<()> {
    let (cfg, store) = super::load_inputs(config, tables)?;

    let mut skimmer = cfg.skimmer(sample, &store, &RegionCatalog::standard())?;
    if let Some(n) = max_events {
        skimmer = skimmer.max_events(n);
    }
    tracing::info!(sample, regions = skimmer.regions().len(), "skimmer ready");

    let input = read_events(events)?;
    tracing::info!(events = input.len(), "events loaded");

    let summary = skimmer.run(&input);

    std::fs::create_dir_all(out_dir)?;
    for region in &summary.regions {
        let path = out_dir.join(format!("{sample}_{}.jsonl", region.region));
        let mut out = BufWriter::new(File::create(&path)?);
        region.write_jsonl(&mut out)?;
        out.flush()?;
        tracing::info!(
            region = %region.region,
            accepted = region.n_accepted,
            sum_weights = region.sum_weights,
            "region written"
        );
    }

    let summary_path: PathBuf = out_dir.join("summary.json");
    super::write_json(Some(&summary_path), serde_json::to_value(&summary)?)
}
