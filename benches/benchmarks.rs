//! Performance benchmarks for Charter.
//!
//! This module contains benchmarks for:
//! - Dependency graph validation on large plans
//! - Spec decomposition and drift detection
//! - Forecasting over long journals
//! - Guarded transitions through the coordinator
//!
//! Run with: `cargo bench`

use chrono::{Duration, NaiveDate, TimeZone, Utc};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use charter::core::{event::actions, event::keys, Event, ExecutionState, Feature, ForecastConfig};
use charter::core::{Plan, Requirement, Spec, Task};
use charter::engine::{drift, forecast, planning, DependencyGraph};
use charter::storage::Repository;
use charter::{Coordinator, CoordinatorOptions, MemoryRepository};

// ============================================================================
// Fixtures
// ============================================================================

mod fixtures {
    use super::*;

    /// A spec with `features` features of `per_feature` chained requirements.
    pub fn spec(features: usize, per_feature: usize) -> Spec {
        (0..features).fold(Spec::new("bench", "Bench"), |spec, f| {
            let feature = (0..per_feature).fold(Feature::new(format!("f{f}"), "Feature"), |feature, r| {
                let mut req = Requirement::new(format!("f{f}-r{r}"), "Requirement");
                if r > 0 {
                    req = req.depends_on(format!("f{f}-r{}", r - 1));
                }
                feature.with_requirement(req)
            });
            spec.with_feature(feature)
        })
    }

    /// A plan where task `i` depends on up to three earlier tasks.
    pub fn layered_plan(size: usize) -> Plan {
        let tasks = (0..size)
            .map(|i| {
                (1..=3)
                    .filter(|d| *d <= i)
                    .fold(Task::new(format!("t{i}"), "f", "Task"), |task, d| {
                        task.depends_on(format!("t{}", i - d))
                    })
            })
            .collect();
        Plan::new("bench", tasks)
    }

    /// A journal with one completion per task spread over `days` days.
    pub fn journal(plan: &Plan, days: i64) -> Vec<Event> {
        let start = Utc.with_ymd_and_hms(2026, 1, 1, 9, 0, 0).unwrap();
        plan.tasks
            .iter()
            .enumerate()
            .flat_map(|(i, task)| {
                let at = start + Duration::days(i as i64 % days);
                [
                    Event::new("bench", actions::TASK_START).with(keys::TASK_ID, task.id.as_str()).at(at),
                    Event::new("bench", actions::TASK_COMPLETE).with(keys::TASK_ID, task.id.as_str()).at(at),
                ]
            })
            .collect()
    }
}

// ============================================================================
// Graph Benchmarks
// ============================================================================

fn bench_graph_validation(c: &mut Criterion) {
    let mut group = c.benchmark_group("graph");

    for size in &[100, 1_000, 10_000] {
        let plan = fixtures::layered_plan(*size);
        group.throughput(Throughput::Elements(*size as u64));
        group.bench_with_input(BenchmarkId::new("validate", size), &plan, |b, plan| {
            b.iter(|| DependencyGraph::validate(black_box(plan)).unwrap());
        });
        group.bench_with_input(BenchmarkId::new("topological_order", size), &plan, |b, plan| {
            let graph = DependencyGraph::new(plan).unwrap();
            b.iter(|| black_box(graph.topological_order()));
        });
    }

    group.finish();
}

// ============================================================================
// Planning & Drift Benchmarks
// ============================================================================

fn bench_planning(c: &mut Criterion) {
    let mut group = c.benchmark_group("planning");

    for (features, per_feature) in &[(10, 10), (50, 20)] {
        let spec = fixtures::spec(*features, *per_feature);
        let label = format!("{features}x{per_feature}");

        group.bench_with_input(BenchmarkId::new("decompose", &label), &spec, |b, spec| {
            b.iter(|| planning::decompose(black_box(spec)).unwrap());
        });

        let plan = Plan::new(&spec.id, planning::decompose(&spec).unwrap());
        group.bench_with_input(BenchmarkId::new("drift", &label), &(spec, plan), |b, (spec, plan)| {
            b.iter(|| drift::detect(black_box(spec), black_box(plan), None));
        });
    }

    group.finish();
}

// ============================================================================
// Forecast Benchmarks
// ============================================================================

fn bench_forecast(c: &mut Criterion) {
    let mut group = c.benchmark_group("forecast");
    let today = NaiveDate::from_ymd_opt(2026, 4, 1).unwrap();
    let config = ForecastConfig::default();

    for size in &[100, 1_000, 10_000] {
        let plan = fixtures::layered_plan(*size);
        let events = fixtures::journal(&plan, 60);
        let state = ExecutionState::new(&plan.id);

        group.throughput(Throughput::Elements(events.len() as u64));
        group.bench_with_input(BenchmarkId::new("calculate", size), &events, |b, events| {
            b.iter(|| forecast::calculate(black_box(events), &plan, &state, today, &config));
        });
    }

    group.finish();
}

// ============================================================================
// Coordinator Benchmarks
// ============================================================================

fn bench_transitions(c: &mut Criterion) {
    let mut group = c.benchmark_group("coordinator");

    group.bench_function("start_stop_cycle", |b| {
        let repo = MemoryRepository::new();
        let plan = fixtures::layered_plan(200);
        repo.save_state(&ExecutionState::new(&plan.id)).unwrap();
        repo.save_plan(&plan).unwrap();
        let coordinator = Coordinator::new(repo, CoordinatorOptions::new("bench"));

        b.iter(|| {
            coordinator.start(black_box("t0")).unwrap();
            coordinator.stop(black_box("t0")).unwrap();
        });
    });

    group.finish();
}

criterion_group!(benches, bench_graph_validation, bench_planning, bench_forecast, bench_transitions);
criterion_main!(benches);
