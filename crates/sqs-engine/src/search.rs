//! Seeded search loop behind [`SyntheticEngine`].
//!
//! The objective is a stand-in for the native short-range-order target: the
//! deviation of like-neighbour pairs along a ring of sites from what an ideal
//! random alloy of the same composition would show. Lower is better.

use async_trait::async_trait;
use chrono::Utc;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde_json::json;
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

use sqs_types::{
    Configuration, Engine, EngineFault, IterationMode, Precision, ProgressReporter,
    ProgressSnapshot, RunConfig, RunResult, SublatticeMode, DEFAULT_ITERATIONS,
};

use crate::parser::{error_object, parse_document, read_model, Model};

/// Knobs of the synthetic search.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchSettings {
    pub seed: u64,
    /// Steps between progress snapshots.
    pub report_every: u64,
    /// Upper bound on the arrangements a systematic run enumerates.
    pub systematic_budget: u64,
    /// Pause after each intermediate snapshot. Lets tests race a
    /// cancellation against a slow engine.
    pub report_delay: Option<Duration>,
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self {
            seed: 0x5eed,
            report_every: 1_000,
            systematic_budget: 10_000,
            report_delay: None,
        }
    }
}

/// In-process engine with deterministic output for a given seed.
#[derive(Debug, Clone, Default)]
pub struct SyntheticEngine {
    settings: SearchSettings,
    fail_with: Option<EngineFault>,
}

impl SyntheticEngine {
    pub fn new(settings: SearchSettings) -> Self {
        Self {
            settings,
            fail_with: None,
        }
    }

    /// Make every `optimize` call fail with `fault`.
    pub fn with_failure(mut self, fault: EngineFault) -> Self {
        self.fail_with = Some(fault);
        self
    }

    pub fn settings(&self) -> &SearchSettings {
        &self.settings
    }
}

#[async_trait]
impl Engine for SyntheticEngine {
    fn parse_config(&self, raw: &Configuration) -> Result<Configuration, EngineFault> {
        Ok(parse_document(raw))
    }

    async fn optimize(
        &self,
        config: RunConfig,
        precision: Precision,
        reporter: ProgressReporter,
    ) -> Result<RunResult, EngineFault> {
        if let Some(fault) = &self.fail_with {
            warn!(error = %fault, "injected engine fault");
            return Err(fault.clone());
        }

        let model = read_model(&config.document).map_err(|error| {
            EngineFault::new(format!("invalid run configuration: {error}"))
                .with_payload(error_object(&error))
        })?;
        let iterations = config.iterations;
        let settings = self.settings.clone();
        let seed = settings.seed;
        let started_at = Utc::now();

        info!(
            %precision,
            sublattices = model.sublattices.len(),
            iteration_mode = model.run.iteration_mode.as_str(),
            seed,
            "synthetic search started"
        );

        let task = tokio::task::spawn_blocking(move || {
            Search::new(model, iterations, precision, settings).run(&reporter)
        });
        let outcome = match task.await {
            Ok(outcome) => outcome,
            Err(error) if error.is_panic() => std::panic::resume_unwind(error.into_panic()),
            Err(error) => return Err(EngineFault::new(format!("search task failed: {error}"))),
        };

        let mut result = RunResult::new(Uuid::new_v4(), precision, started_at);
        let payload = match &outcome.best {
            Some(best) => {
                result = result.with_best(best.rank, best.objective);
                json!({
                    "objective": best.objective,
                    "rank": best.rank,
                    "species": best.species,
                    "iterations": outcome.finished,
                    "seed": seed,
                })
            }
            None => json!({"iterations": outcome.finished, "seed": seed}),
        };
        result = result.with_payload(payload);
        result.mark_finished(outcome.finished, outcome.cancelled);
        Ok(result)
    }
}

struct Best {
    /// 1-based step at which the arrangement was found.
    rank: i64,
    objective: f64,
    /// Species of every site.
    species: Vec<String>,
}

struct Outcome {
    finished: u64,
    cancelled: bool,
    best: Option<Best>,
}

struct Search {
    model: Model,
    total: u64,
    precision: Precision,
    settings: SearchSettings,
    rng: ChaCha8Rng,
    /// Species index per slot for every sublattice.
    arrangements: Vec<Vec<usize>>,
    /// Sublattice species index to a structure-wide species id.
    labels: Vec<Vec<usize>>,
    /// `(sublattice, slot)` pairs in site order.
    order: Vec<(usize, usize)>,
}

impl Search {
    fn new(model: Model, iterations: Option<u64>, precision: Precision, settings: SearchSettings) -> Self {
        let total = match model.run.iteration_mode {
            IterationMode::Random => iterations.unwrap_or(DEFAULT_ITERATIONS),
            IterationMode::Systematic => model
                .sublattices
                .first()
                .map(|sublattice| sublattice.arrangements(settings.systematic_budget))
                .unwrap_or(0),
        };

        let labels: Vec<Vec<usize>> = {
            let mut names: Vec<&str> = Vec::new();
            model
                .sublattices
                .iter()
                .map(|sublattice| {
                    sublattice
                        .species
                        .iter()
                        .map(|(name, _)| {
                            match names.iter().position(|known| *known == name.as_str()) {
                                Some(id) => id,
                                None => {
                                    names.push(name.as_str());
                                    names.len() - 1
                                }
                            }
                        })
                        .collect()
                })
                .collect()
        };

        let mut order: Vec<(usize, usize, usize)> = model
            .sublattices
            .iter()
            .enumerate()
            .flat_map(|(index, sublattice)| {
                sublattice
                    .sites
                    .iter()
                    .enumerate()
                    .map(move |(slot, site)| (*site, index, slot))
            })
            .collect();
        order.sort_unstable();

        Self {
            arrangements: model.sublattices.iter().map(|s| s.initial_arrangement()).collect(),
            labels,
            order: order.into_iter().map(|(_, index, slot)| (index, slot)).collect(),
            rng: ChaCha8Rng::seed_from_u64(settings.seed),
            model,
            total,
            precision,
            settings,
        }
    }

    fn run(mut self, reporter: &ProgressReporter) -> Outcome {
        let report_every = self.settings.report_every.max(1);
        let mut best: Option<Best> = None;
        let mut finished = 0;

        while finished < self.total {
            self.step(finished);
            finished += 1;

            let objective = self.objective();
            if best.as_ref().map_or(true, |b| objective < b.objective) {
                best = Some(Best {
                    rank: i64::try_from(finished).unwrap_or(i64::MAX),
                    objective,
                    species: self.occupation(),
                });
            }

            if finished % report_every == 0 && finished < self.total {
                if reporter.report(snapshot(1, finished, best.as_ref())).is_stop() {
                    debug!(finished, "stop requested, leaving search loop");
                    return Outcome {
                        finished,
                        cancelled: true,
                        best,
                    };
                }
                if let Some(delay) = self.settings.report_delay {
                    std::thread::sleep(delay);
                }
            }
        }

        // final snapshot; a stop request this late has nothing left to cancel
        reporter.report(snapshot(0, finished, best.as_ref()));
        Outcome {
            finished,
            cancelled: false,
            best,
        }
    }

    fn step(&mut self, index: u64) {
        match self.model.run.iteration_mode {
            IterationMode::Random => {
                for arrangement in &mut self.arrangements {
                    arrangement.shuffle(&mut self.rng);
                }
            }
            IterationMode::Systematic => {
                if index > 0 {
                    if let Some(arrangement) = self.arrangements.first_mut() {
                        next_permutation(arrangement);
                    }
                }
            }
        }
    }

    fn objective(&self) -> f64 {
        let objective = match self.model.run.sublattice_mode {
            SublatticeMode::Interact => {
                let ids: Vec<usize> = self
                    .order
                    .iter()
                    .map(|&(index, slot)| self.labels[index][self.arrangements[index][slot]])
                    .collect();
                ring_deviation(&ids)
            }
            SublatticeMode::Split => {
                let sum: f64 = self
                    .arrangements
                    .iter()
                    .zip(&self.labels)
                    .map(|(arrangement, labels)| {
                        let ids: Vec<usize> = arrangement.iter().map(|s| labels[*s]).collect();
                        ring_deviation(&ids)
                    })
                    .sum();
                sum / self.arrangements.len().max(1) as f64
            }
        };

        match self.precision {
            Precision::Single => objective as f32 as f64,
            Precision::Double => objective,
        }
    }

    fn occupation(&self) -> Vec<String> {
        let mut species = self.model.species.clone();
        for (sublattice, arrangement) in self.model.sublattices.iter().zip(&self.arrangements) {
            for (slot, site) in sublattice.sites.iter().enumerate() {
                species[*site] = sublattice.species[arrangement[slot]].0.clone();
            }
        }
        species
    }
}

fn snapshot(working: u64, finished: u64, best: Option<&Best>) -> ProgressSnapshot {
    ProgressSnapshot {
        working,
        finished,
        best_rank: best.map_or(0, |b| b.rank),
        best_objective: best.map_or(f64::INFINITY, |b| b.objective),
    }
}

/// Like-neighbour pairs along the ring `ids`, compared with an ideal random
/// occupation, normalised by the ring length.
fn ring_deviation(ids: &[usize]) -> f64 {
    let n = ids.len();
    if n < 2 {
        return 0.0;
    }

    let like = (0..n).filter(|&i| ids[i] == ids[(i + 1) % n]).count() as f64;
    let mut counts = vec![0usize; ids.iter().max().map_or(0, |m| m + 1)];
    for id in ids {
        counts[*id] += 1;
    }
    let expected: f64 = counts
        .iter()
        .map(|&c| (c as f64 / n as f64).powi(2))
        .sum::<f64>()
        * n as f64;

    (like - expected).abs() / n as f64
}

/// Rearranges `values` into the next lexicographic permutation. Returns
/// `false` (leaving `values` sorted) after the last one.
fn next_permutation(values: &mut [usize]) -> bool {
    let Some(pivot) = values.windows(2).rposition(|w| w[0] < w[1]) else {
        values.reverse();
        return false;
    };
    let successor = values
        .iter()
        .rposition(|v| *v > values[pivot])
        .unwrap_or(pivot + 1);
    values.swap(pivot, successor);
    values[pivot + 1..].reverse();
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use sqs_types::{classify, Control};
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::Arc;

    fn document(extra: Configuration) -> Configuration {
        let mut document = json!({
            "structure": {
                "lattice": [[2.86, 0.0, 0.0], [0.0, 2.86, 0.0], [0.0, 0.0, 2.86]],
                "coords": [[0.0, 0.0, 0.0], [0.5, 0.5, 0.5]],
                "species": ["Fe", "Fe"],
                "supercell": [2, 2, 2]
            },
            "composition": {"Fe": 8, "Al": 8},
            "iterations": 500
        });
        if let (Some(target), Some(extra)) = (document.as_object_mut(), extra.as_object()) {
            for (key, value) in extra {
                target.insert(key.clone(), value.clone());
            }
        }
        document
    }

    fn run_config(engine: &SyntheticEngine, extra: Configuration) -> RunConfig {
        classify(engine.parse_config(&document(extra)).unwrap()).unwrap()
    }

    fn engine(report_every: u64) -> SyntheticEngine {
        SyntheticEngine::new(SearchSettings {
            report_every,
            ..SearchSettings::default()
        })
    }

    #[tokio::test]
    async fn random_search_reports_and_never_worsens() {
        let engine = engine(100);
        let config = run_config(&engine, json!({}));
        let snapshots = Arc::new(Mutex::new(Vec::new()));
        let recorder = snapshots.clone();

        let result = engine
            .optimize(
                config,
                Precision::Double,
                ProgressReporter::new(move |s| {
                    recorder.lock().push(s);
                    Control::Continue
                }),
            )
            .await
            .unwrap();

        let seen: Vec<ProgressSnapshot> = snapshots.lock().clone();
        assert_eq!(seen.len(), 5);
        assert!(seen.windows(2).all(|w| w[1].best_objective <= w[0].best_objective));
        assert!(seen.windows(2).all(|w| w[1].finished > w[0].finished));
        let last = seen.last().unwrap();
        assert_eq!(last.working, 0);
        assert_eq!(last.finished, 500);

        assert_eq!(result.finished, 500);
        assert!(!result.cancelled);
        assert_eq!(result.best_objective, Some(last.best_objective));
        assert_eq!(result.payload["species"].as_array().unwrap().len(), 16);
    }

    #[tokio::test]
    async fn same_seed_same_result() {
        let engine = engine(1_000);
        let first = engine
            .optimize(run_config(&engine, json!({})), Precision::Double, ProgressReporter::detached())
            .await
            .unwrap();
        let second = engine
            .optimize(run_config(&engine, json!({})), Precision::Double, ProgressReporter::detached())
            .await
            .unwrap();
        assert_eq!(first.payload, second.payload);
    }

    #[tokio::test]
    async fn stop_is_honoured_at_the_next_report() {
        let engine = engine(10);
        let calls = Arc::new(AtomicU64::new(0));
        let counter = calls.clone();

        let result = engine
            .optimize(
                run_config(&engine, json!({})),
                Precision::Single,
                ProgressReporter::new(move |_| {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Control::Stop
                }),
            )
            .await
            .unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(result.cancelled);
        assert_eq!(result.finished, 10);
    }

    #[tokio::test]
    async fn single_precision_rounds_through_f32() {
        let engine = engine(1_000);
        let result = engine
            .optimize(run_config(&engine, json!({})), Precision::Single, ProgressReporter::detached())
            .await
            .unwrap();
        let objective = result.best_objective.unwrap();
        assert_eq!(objective, objective as f32 as f64);
        assert_eq!(result.precision, Precision::Single);
    }

    #[tokio::test]
    async fn systematic_search_is_bounded_by_the_space() {
        let engine = SyntheticEngine::new(SearchSettings {
            systematic_budget: 1_000_000,
            ..SearchSettings::default()
        });
        let config = run_config(
            &engine,
            json!({
                "structure": {
                    "lattice": [[1, 0, 0], [0, 1, 0], [0, 0, 1]],
                    "coords": [[0, 0, 0], [0.5, 0.5, 0.5]],
                    "species": ["Fe", "Fe"],
                    "supercell": [3, 1, 1]
                },
                "composition": {"Fe": 3, "Al": 3},
                "iteration_mode": "systematic"
            }),
        );
        assert_eq!(config.iterations, None);

        let result = engine
            .optimize(config, Precision::Double, ProgressReporter::detached())
            .await
            .unwrap();
        // 6! / (3! 3!)
        assert_eq!(result.finished, 20);
        // like pairs on a two-species ring come in even numbers: best is |2 - 3| / 6
        assert!((result.best_objective.unwrap() - 1.0 / 6.0).abs() < 1e-12);
        // the sorted starting arrangement already reaches it
        assert_eq!(result.best_rank, Some(1));
    }

    #[tokio::test]
    async fn split_mode_scores_each_sublattice() {
        let engine = engine(1_000);
        let config = run_config(
            &engine,
            json!({
                "composition": [
                    {"sites": [0, 1, 2, 3, 4, 5, 6, 7], "Fe": 4, "Al": 4},
                    {"sites": [8, 9, 10, 11, 12, 13, 14, 15], "Ni": 2, "Co": 6}
                ],
                "sublattice_mode": "split",
                "iterations": 50
            }),
        );
        let result = engine
            .optimize(config, Precision::Double, ProgressReporter::detached())
            .await
            .unwrap();
        let species = result.payload["species"].as_array().unwrap();
        assert!(species[..8].iter().all(|s| s == "Fe" || s == "Al"));
        assert!(species[8..].iter().all(|s| s == "Ni" || s == "Co"));
    }

    #[tokio::test]
    async fn injected_fault_is_returned() {
        let fault = EngineFault::new("out of memory").with_payload(json!({"errno": 12}));
        let engine = engine(10).with_failure(fault.clone());
        let err = engine
            .optimize(run_config(&engine, json!({})), Precision::Double, ProgressReporter::detached())
            .await
            .unwrap_err();
        assert_eq!(err, fault);
    }

    #[tokio::test]
    async fn unparsable_document_is_a_fault() {
        let engine = engine(10);
        let config = RunConfig::from_document(json!({"iterations": 10})).unwrap();
        let err = engine
            .optimize(config, Precision::Double, ProgressReporter::detached())
            .await
            .unwrap_err();
        assert_eq!(err.payload["key"], json!("structure"));
    }

    #[test]
    fn permutations_walk_in_order() {
        let mut values = vec![0, 0, 1];
        assert!(next_permutation(&mut values));
        assert_eq!(values, vec![0, 1, 0]);
        assert!(next_permutation(&mut values));
        assert_eq!(values, vec![1, 0, 0]);
        assert!(!next_permutation(&mut values));
        assert_eq!(values, vec![0, 0, 1]);
    }

    #[test]
    fn ring_deviation_extremes() {
        assert_eq!(ring_deviation(&[0]), 0.0);
        // alternating ring: no like pairs, two expected
        assert_eq!(ring_deviation(&[0, 1, 0, 1]), 0.5);
        // segregated: two like pairs, as expected
        assert_eq!(ring_deviation(&[0, 0, 1, 1]), 0.0);
    }
}
