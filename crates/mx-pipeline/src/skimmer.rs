//! Skimmer: drives one sample's events through every region pipeline.

use std::collections::{BTreeMap, HashMap};
use std::io::Write;
use std::path::Path;

use mx_core::Result;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::event::Event;
use crate::expr::CompiledExpr;
use crate::pipeline::Pipeline;

/// Certified (run, luminosity-section) ranges.
///
/// Read from the usual `{"<run>": [[first, last], ...]}` JSON layout.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GoodLumiFilter {
    runs: HashMap<u32, Vec<[u32; 2]>>,
}

impl GoodLumiFilter {
    /// Parse a JSON mask.
    pub fn from_json_str(s: &str) -> Result<Self> {
        Ok(serde_json::from_str(s)?)
    }

    /// Load a JSON mask from disk.
    pub fn from_path(path: &Path) -> Result<Self> {
        Self::from_json_str(&std::fs::read_to_string(path)?)
    }

    /// Certify `first..=last` of `run`.
    pub fn add_range(&mut self, run: u32, first: u32, last: u32) {
        self.runs.entry(run).or_default().push([first, last]);
    }

    /// Whether (run, lumi) is certified.
    pub fn is_good(&self, run: u32, lumi: u32) -> bool {
        self.runs
            .get(&run)
            .is_some_and(|ranges| ranges.iter().any(|&[lo, hi]| (lo..=hi).contains(&lumi)))
    }
}

/// One accepted event as written to a region's output.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EventRecord {
    /// Run number.
    pub run: u32,
    /// Luminosity section.
    pub lumi: u32,
    /// Event number.
    pub event: u64,
    /// Combined nominal weight (generator weight included).
    pub weight: f64,
    /// Variation name → combined weight.
    pub variations: BTreeMap<String, f64>,
    /// Observables recorded by the pipeline.
    pub observables: BTreeMap<String, f64>,
}

/// Per-region result of a skim.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RegionOutput {
    /// Region (pipeline) name.
    pub region: String,
    /// Events handed to the pipeline.
    pub n_processed: usize,
    /// Events accepted.
    pub n_accepted: usize,
    /// Sum of nominal weights of accepted events.
    pub sum_weights: f64,
    /// Sum of each variation weight over accepted events.
    pub sum_variations: BTreeMap<String, f64>,
    /// Accepted events.
    #[serde(skip)]
    pub records: Vec<EventRecord>,
}

impl RegionOutput {
    /// Write the accepted events as JSON lines.
    pub fn write_jsonl<W: Write>(&self, mut out: W) -> Result<()> {
        for record in &self.records {
            serde_json::to_writer(&mut out, record)?;
            out.write_all(b"\n")?;
        }
        Ok(())
    }
}

/// Result of a skim over one sample.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SkimSummary {
    /// Sample name.
    pub sample: String,
    /// Events read (after the `max_events` cap).
    pub n_read: usize,
    /// Events surviving the luminosity mask and the common preselection.
    pub n_preselected: usize,
    /// One entry per region, in configuration order.
    pub regions: Vec<RegionOutput>,
}

/// Runs every event of a sample through a set of region pipelines.
///
/// # Example
///
/// ```
/// use mx_pipeline::{CompiledExpr, Event, Pipeline, Skimmer};
///
/// let skimmer = Skimmer::new("gj-40")
///     .common_selection(CompiledExpr::compile("photon_pt > 175").unwrap())
///     .add_region(Pipeline::new("monoph"));
/// let summary = skimmer.run(&[Event::default()]);
/// assert_eq!(summary.n_preselected, 0);
/// ```
pub struct Skimmer {
    sample: String,
    common_selection: Option<CompiledExpr>,
    good_lumi: Option<GoodLumiFilter>,
    max_events: Option<usize>,
    regions: Vec<Pipeline>,
}

impl Skimmer {
    /// Skimmer for `sample` with no regions.
    pub fn new(sample: impl Into<String>) -> Self {
        Self {
            sample: sample.into(),
            common_selection: None,
            good_lumi: None,
            max_events: None,
            regions: Vec::new(),
        }
    }

    /// Preselection applied before any region sees an event.
    pub fn common_selection(mut self, expr: CompiledExpr) -> Self {
        self.common_selection = Some(expr);
        self
    }

    /// Certified-luminosity mask (real data).
    pub fn good_lumi(mut self, filter: GoodLumiFilter) -> Self {
        self.good_lumi = Some(filter);
        self
    }

    /// Stop after this many input events.
    pub fn max_events(mut self, n: usize) -> Self {
        self.max_events = Some(n);
        self
    }

    /// Add a region pipeline.
    pub fn add_region(mut self, pipeline: Pipeline) -> Self {
        self.regions.push(pipeline);
        self
    }

    /// Region pipelines in configuration order.
    pub fn regions(&self) -> &[Pipeline] {
        &self.regions
    }

    /// The common preselection is only applied when every region allows it.
    fn preselection(&self) -> Option<&CompiledExpr> {
        let expr = self.common_selection.as_ref()?;
        if let Some(p) = self.regions.iter().find(|p| !p.can_photon_skim()) {
            let (sample, region) = (&self.sample, p.name());
            log::debug!("sample '{sample}': preselection disabled by region '{region}'");
            return None;
        }
        Some(expr)
    }

    /// Run the skim.
    pub fn run(&self, events: &[Event]) -> SkimSummary {
        let n_read = self.max_events.map_or(events.len(), |n| n.min(events.len()));
        let preselection = self.preselection();
        let selected: Vec<&Event> = events[..n_read]
            .iter()
            .filter(|e| self.good_lumi.as_ref().is_none_or(|m| m.is_good(e.run, e.lumi)))
            .filter(|e| preselection.is_none_or(|expr| expr.passes(e)))
            .collect();

        let regions: Vec<RegionOutput> =
            self.regions.par_iter().map(|pipeline| run_region(pipeline, &selected)).collect();

        for r in &regions {
            log::info!(
                "sample '{}' region '{}': {}/{} accepted, sum of weights {:.6}",
                self.sample,
                r.region,
                r.n_accepted,
                r.n_processed,
                r.sum_weights
            );
        }

        SkimSummary { sample: self.sample.clone(), n_read, n_preselected: selected.len(), regions }
    }
}

fn run_region(pipeline: &Pipeline, events: &[&Event]) -> RegionOutput {
    let declared = pipeline.variation_names();
    let mut sum_variations: BTreeMap<String, f64> =
        declared.iter().map(|name| (name.clone(), 0.0)).collect();
    let mut sum_weights = 0.0;
    let mut records = Vec::new();

    for event in events {
        let outcome = pipeline.run(event);
        if !outcome.accepted {
            continue;
        }
        let weight = event.weight * outcome.weight;
        sum_weights += weight;
        let variations: BTreeMap<String, f64> = declared
            .iter()
            .map(|name| {
                let w = outcome.variations.get(name).copied().unwrap_or(outcome.weight);
                (name.clone(), event.weight * w)
            })
            .collect();
        for (name, w) in &variations {
            *sum_variations.entry(name.clone()).or_default() += w;
        }
        records.push(EventRecord {
            run: event.run,
            lumi: event.lumi,
            event: event.event,
            weight,
            variations,
            observables: outcome.event.observables,
        });
    }

    RegionOutput {
        region: pipeline.name().to_string(),
        n_processed: events.len(),
        n_accepted: records.len(),
        sum_weights,
        sum_variations,
        records,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::Met;
    use crate::operators::{ConstantWeight, HighMet};
    use approx::assert_relative_eq;

    fn met_event(event: u64, met: f64) -> Event {
        Event { event, met: Met { pt: met, ..Met::default() }, ..Event::default() }
    }

    fn region(name: &str, threshold: f64) -> Pipeline {
        let mut p = Pipeline::new(name);
        let mut cut = HighMet::new();
        cut.set_met_source(crate::operators::MetSource::Input);
        cut.set_threshold(threshold);
        p.add_operator(cut).unwrap();
        let mut xs = ConstantWeight::new(0.5, "crosssection");
        xs.add_variation("xsUp", 0.6);
        p.add_operator(xs).unwrap();
        p
    }

    #[test]
    fn regions_are_independent() {
        let events = vec![met_event(1, 50.0), met_event(2, 150.0), met_event(3, 250.0)];
        let summary = Skimmer::new("s")
            .add_region(region("low", 100.0))
            .add_region(region("high", 200.0))
            .run(&events);

        assert_eq!(summary.n_read, 3);
        assert_eq!(summary.regions[0].n_accepted, 2);
        assert_eq!(summary.regions[1].n_accepted, 1);
        assert_relative_eq!(summary.regions[0].sum_weights, 1.0, epsilon = 1e-12);
        assert_relative_eq!(summary.regions[0].sum_variations["xsUp"], 1.2, epsilon = 1e-12);
        assert_eq!(summary.regions[1].records[0].event, 3);
    }

    #[test]
    fn preselection_cap_and_lumi_mask() {
        let events = vec![met_event(1, 50.0), met_event(2, 150.0), met_event(3, 250.0)];
        let mut mask = GoodLumiFilter::default();
        mask.add_range(1, 1, 10);
        assert!(mask.is_good(1, 10));
        assert!(!mask.is_good(2, 1));

        let skimmer = Skimmer::new("s")
            .common_selection(CompiledExpr::compile("met > 100").unwrap())
            .good_lumi(mask)
            .max_events(2)
            .add_region(region("r", 0.0));
        let summary = skimmer.run(&events);
        assert_eq!(summary.n_read, 2);
        assert_eq!(summary.n_preselected, 1);
        assert_eq!(summary.regions[0].n_processed, 1);
    }

    #[test]
    fn region_can_opt_out_of_preselection() {
        let events = vec![met_event(1, 50.0)];
        let mut open = region("open", 0.0);
        open.set_can_photon_skim(false).unwrap();
        let summary = Skimmer::new("s")
            .common_selection(CompiledExpr::compile("met > 100").unwrap())
            .add_region(open)
            .run(&events);
        assert_eq!(summary.n_preselected, 1);
        assert_eq!(summary.regions[0].n_accepted, 1);
    }

    #[test]
    fn lumi_mask_from_json_and_jsonl_output() {
        let mask = GoodLumiFilter::from_json_str(r#"{"1": [[1, 5], [8, 9]]}"#).unwrap();
        assert!(mask.is_good(1, 8));
        assert!(!mask.is_good(1, 6));

        let summary = Skimmer::new("s").add_region(region("r", 0.0)).run(&[met_event(7, 10.0)]);
        let mut buf = Vec::new();
        summary.regions[0].write_jsonl(&mut buf).unwrap();
        let line = String::from_utf8(buf).unwrap();
        assert!(line.contains("\"event\":7"));
        assert!(line.ends_with('\n'));
    }
}
