//! Velocity, trend and completion forecasts.
//!
//! Everything here is derived by replaying the journal in append order.
//! A task counts as completed once per `task.complete`/`task.verify` run;
//! a `task.reopen` lets it count again the next time it completes.
//! Completions are bucketed by UTC calendar day.

use std::collections::HashSet;

use chrono::{DateTime, Days, NaiveDate, Utc};
use serde::Serialize;

use crate::core::{event::actions, Event, ExecutionState, ForecastConfig, Plan};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TrendDirection {
    Accelerating,
    Decelerating,
    Stable,
}

/// Velocity over one trailing window.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct WindowVelocity {
    /// Window length actually used, in days
    pub days: u32,
    pub completions: usize,
    /// Tasks per day
    pub velocity: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VelocityTrend {
    pub direction: TrendDirection,
    /// Relative difference between short and long windows, in [-1, 1]
    pub slope: f64,
    /// 0.0 to 1.0, grows with the number of completions observed
    pub confidence: f64,
    /// Short window first
    pub windows: Vec<WindowVelocity>,
}

/// Days to completion, widened by low confidence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ConfidenceInterval {
    pub low: u32,
    pub expected: u32,
    pub high: u32,
}

/// One day of the burndown. Exactly one of `actual` and `projected` is set.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BurndownPoint {
    pub date: NaiveDate,
    /// Remaining tasks at the end of the day
    pub actual: Option<usize>,
    /// Remaining tasks expected at current velocity
    pub projected: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ForecastResult {
    /// Tasks per day over the short window
    pub velocity: f64,
    pub total: usize,
    pub completed: usize,
    pub remaining: usize,
    /// `None` when velocity is zero and work remains
    pub estimated_days: Option<u32>,
    pub trend: VelocityTrend,
    pub interval: Option<ConfidenceInterval>,
    pub burndown: Vec<BurndownPoint>,
}

/// Journal replay results.
struct History {
    /// Day of each counted completion, in journal order
    completion_days: Vec<NaiveDate>,
    /// Plan tasks complete at the end of each day that saw events
    completed_by_day: Vec<(NaiveDate, usize)>,
    first_day: Option<NaiveDate>,
}

fn replay(events: &[Event], plan: &Plan) -> History {
    let mut counted: HashSet<&str> = HashSet::new();
    let mut complete: HashSet<&str> = HashSet::new();
    let mut completion_days = Vec::new();
    let mut completed_by_day: Vec<(NaiveDate, usize)> = Vec::new();
    let mut first_day = None;

    for event in events {
        let Some(day) = event.timestamp.as_ref().map(DateTime::<Utc>::date_naive) else {
            continue;
        };
        first_day = Some(first_day.map_or(day, |first: NaiveDate| first.min(day)));

        if let Some(task_id) = event.task_id() {
            if event.is_completion() {
                if counted.insert(task_id) {
                    completion_days.push(day);
                }
                complete.insert(task_id);
            } else if event.action == actions::TASK_REOPEN {
                counted.remove(task_id);
                complete.remove(task_id);
            }
        }

        let done = complete.iter().filter(|id| plan.contains(id)).count();
        match completed_by_day.last_mut() {
            Some((last, count)) if *last == day => *count = done,
            _ => completed_by_day.push((day, done)),
        }
    }

    History { completion_days, completed_by_day, first_day }
}

fn window(history: &History, today: NaiveDate, days: u32, elapsed: u32) -> WindowVelocity {
    let days = days.min(elapsed).max(1);
    let start = today.checked_sub_days(Days::new(u64::from(days))).unwrap_or(NaiveDate::MIN);
    let completions =
        history.completion_days.iter().filter(|d| **d > start && **d <= today).count();
    WindowVelocity { days, completions, velocity: completions as f64 / f64::from(days) }
}

fn trend(short: WindowVelocity, long: WindowVelocity, observed: usize, config: &ForecastConfig) -> VelocityTrend {
    let (s, l) = (short.velocity, long.velocity);
    let peak = s.max(l);
    let slope = if peak > 0.0 { (s - l) / peak } else { 0.0 };

    let direction = if slope > config.trend_margin {
        TrendDirection::Accelerating
    } else if slope < -config.trend_margin {
        TrendDirection::Decelerating
    } else {
        TrendDirection::Stable
    };

    let confidence = match config.confidence_saturation {
        0 => 1.0,
        n => (observed as f64 / f64::from(n)).min(1.0),
    };

    VelocityTrend { direction, slope, confidence, windows: vec![short, long] }
}

fn interval(expected: u32, confidence: f64) -> ConfidenceInterval {
    let band = 1.0 - confidence.clamp(0.0, 1.0);
    let expected_f = f64::from(expected);
    ConfidenceInterval {
        low: (expected_f * (1.0 - band * 0.5)).floor() as u32,
        expected,
        high: (expected_f * (1.0 + band)).ceil() as u32,
    }
}

fn burndown(
    history: &History,
    today: NaiveDate,
    total: usize,
    remaining: usize,
    velocity: f64,
    config: &ForecastConfig,
) -> Vec<BurndownPoint> {
    let mut points = Vec::new();

    let span = u64::from(config.history_limit_days.max(1) - 1);
    let earliest = today.checked_sub_days(Days::new(span)).unwrap_or(today);
    let mut day = history.first_day.map_or(today, |first| first.max(earliest)).min(today);

    let mut done = 0;
    let mut cursor = history.completed_by_day.iter().peekable();
    while day < today {
        while let Some((_, count)) = cursor.next_if(|(d, _)| *d <= day) {
            done = *count;
        }
        points.push(BurndownPoint {
            date: day,
            actual: Some(total.saturating_sub(done)),
            projected: None,
        });
        day = day.succ_opt().unwrap_or(today);
    }
    // Today comes from the live state.
    points.push(BurndownPoint { date: today, actual: Some(remaining), projected: None });

    if remaining == 0 || velocity <= 0.0 {
        return points;
    }

    let mut date = today;
    for step in 1..=config.projection_limit_days {
        let Some(next) = date.succ_opt() else { break };
        date = next;
        let left = (remaining as f64 - velocity * f64::from(step)).max(0.0);
        points.push(BurndownPoint { date, actual: None, projected: Some(left) });
        if left <= 0.0 {
            break;
        }
    }
    points
}

/// Compute a forecast as of `today`.
pub fn calculate(
    events: &[Event],
    plan: &Plan,
    state: &ExecutionState,
    today: NaiveDate,
    config: &ForecastConfig,
) -> ForecastResult {
    let history = replay(events, plan);

    let elapsed = history
        .first_day
        .map(|first| (today - first).num_days() + 1)
        .unwrap_or(1)
        .clamp(1, i64::from(u32::MAX));
    let elapsed = u32::try_from(elapsed).unwrap_or(u32::MAX);

    let short = window(&history, today, config.short_window_days, elapsed);
    let long = window(&history, today, config.long_window_days, elapsed);
    let trend = trend(short, long, history.completion_days.len(), config);
    let velocity = short.velocity;

    let total = plan.len();
    let completed = plan.task_ids().filter(|id| state.status_of(id).is_complete()).count();
    let remaining = total - completed;

    let estimated_days = if remaining == 0 {
        Some(0)
    } else if velocity > 0.0 {
        Some((remaining as f64 / velocity).ceil() as u32)
    } else {
        None
    };
    let interval = estimated_days.map(|days| interval(days, trend.confidence));
    let burndown = burndown(&history, today, total, remaining, velocity, config);

    tracing::debug!(velocity, remaining, ?estimated_days, "forecast computed");

    ForecastResult {
        velocity,
        total,
        completed,
        remaining,
        estimated_days,
        trend,
        interval,
        burndown,
    }
}
