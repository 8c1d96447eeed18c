//! Loaded state, the derived-view pipeline and the reload loop.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{Mutex, RwLock};
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{error, info};

use crate::change::ChangeDetector;
use crate::error::LoadError;
use crate::joiner::join_records;
use crate::kpi::{derive_kpis, Kpis};
use crate::models::{DisplayData, EvolutionPoint, Observation};
use crate::ranking::{top_observations, DateRange, TOP_LIMIT};
use crate::source::{fetch_all, ObservationSource};
use crate::view::{select, Selection, ViewMode};

/// One load cycle's output. Replaced as a whole, never edited.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub observations: Vec<Observation>,
    pub evolution: Vec<EvolutionPoint>,
    pub loaded_at: DateTime<Utc>,
    pub generation: u64,
}

impl Snapshot {
    fn empty() -> Self {
        Self {
            observations: Vec::new(),
            evolution: Vec::new(),
            loaded_at: DateTime::<Utc>::MIN_UTC,
            generation: 0,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ViewQuery {
    pub mode: Option<ViewMode>,
    pub selection: Selection,
    pub range: DateRange,
}

/// Everything the presentation layer needs for one screen.
#[derive(Debug, Clone, Serialize)]
pub struct DashboardView {
    pub mode: ViewMode,
    pub range: DateRange,
    pub teacher_id: Option<String>,
    pub display: Option<DisplayData>,
    pub kpis: Kpis,
    pub ranking: Vec<Observation>,
}

/// Pure function of the snapshot and the query; recompute whenever either changes.
pub fn render(snapshot: &Snapshot, query: &ViewQuery) -> DashboardView {
    let mode = query.mode.unwrap_or(ViewMode::Single);
    let observations = query.range.filter(&snapshot.observations);
    let selection = query.selection.clone().or_defaults(&observations);

    let display = select(mode, &selection, &observations);
    let kpis = derive_kpis(
        display.as_ref(),
        mode,
        selection.teacher_id.as_deref(),
        &snapshot.evolution,
    );
    let ranking = top_observations(&observations, TOP_LIMIT)
        .into_iter()
        .cloned()
        .collect();

    DashboardView {
        mode,
        range: query.range,
        teacher_id: selection.teacher_id,
        display,
        kpis,
        ranking,
    }
}

#[derive(Debug)]
pub enum ReloadOutcome {
    Loaded(Arc<Snapshot>),
    /// Another reload was already running.
    Skipped,
}

pub struct Dashboard {
    source: Arc<dyn ObservationSource>,
    snapshot: RwLock<Arc<Snapshot>>,
    reloading: Mutex<()>,
}

impl Dashboard {
    pub fn new(source: Arc<dyn ObservationSource>) -> Self {
        Self {
            source,
            snapshot: RwLock::new(Arc::new(Snapshot::empty())),
            reloading: Mutex::new(()),
        }
    }

    pub async fn snapshot(&self) -> Arc<Snapshot> {
        self.snapshot.read().await.clone()
    }

    /// Fetches and joins everything, then swaps the snapshot in.
    ///
    /// Single-flight: a call made while another reload runs returns `Skipped`.
    /// On failure the previous snapshot stays in place.
    pub async fn reload(&self) -> Result<ReloadOutcome, LoadError> {
        let Ok(_guard) = self.reloading.try_lock() else {
            info!("reload already in flight, skipping");
            return Ok(ReloadOutcome::Skipped);
        };

        let records = fetch_all(self.source.as_ref()).await?;
        let observations = join_records(&records);

        let mut current = self.snapshot.write().await;
        let next = Arc::new(Snapshot {
            observations,
            evolution: records.evolution,
            loaded_at: Utc::now(),
            generation: current.generation + 1,
        });
        *current = next.clone();

        info!(
            generation = next.generation,
            observations = next.observations.len(),
            "snapshot replaced"
        );
        Ok(ReloadOutcome::Loaded(next))
    }

    /// Checks every `period` and reloads when the store has newer responses,
    /// until `shutdown` resolves.
    pub async fn watch<F, S>(&self, period: Duration, shutdown: S, mut on_reload: F)
    where
        F: FnMut(&Snapshot),
        S: Future<Output = ()>,
    {
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        tokio::pin!(shutdown);

        info!(period_secs = period.as_secs(), "watching for new observations");
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let last_sync = self.snapshot().await.loaded_at;
                    if !ChangeDetector::new(self.source.as_ref()).has_new_data(last_sync).await {
                        continue;
                    }
                    match self.reload().await {
                        Ok(ReloadOutcome::Loaded(snapshot)) => on_reload(snapshot.as_ref()),
                        Ok(ReloadOutcome::Skipped) => {}
                        Err(err) => error!(error = %err, "reload failed, keeping previous data"),
                    }
                }
                _ = &mut shutdown => {
                    info!("shutdown requested, stopping watch");
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;

    use super::*;
    use crate::joiner::fixtures::*;
    use crate::models::{RawRecords, ResponseRow};
    use crate::source::memory::MemorySource;

    fn records() -> RawRecords {
        RawRecords {
            teachers: vec![teacher("t1", "Avery Lee"), teacher("t2", "Jules Moreno")],
            headers: vec![
                header("o1", "t1", 60.0, (2026, 3, 2)),
                header("o2", "t2", 95.0, (2026, 3, 5)),
                header("o3", "t1", 80.0, (2026, 4, 1)),
            ],
            dimension_scores: vec![
                score("o1", "AMBIENTE", 50.0),
                score("o1", "INTERACCION", 50.0),
                score("o1", "ORGANIZACION", 90.0),
            ],
            indicators: vec![indicator("i1", "Clima de respeto", 1)],
            responses: vec![response("o1", "i1", 0.8), response("o3", "i1", 0.6)],
            evolution: vec![
                EvolutionPoint {
                    teacher_id: "t1".to_string(),
                    date: chrono::NaiveDate::from_ymd_opt(2026, 3, 2),
                    average_percentage: Some(60.0),
                },
                EvolutionPoint {
                    teacher_id: "t1".to_string(),
                    date: chrono::NaiveDate::from_ymd_opt(2026, 4, 1),
                    average_percentage: Some(75.0),
                },
            ],
        }
    }

    async fn loaded(source: Arc<MemorySource>) -> Dashboard {
        let dashboard = Dashboard::new(source);
        dashboard.reload().await.unwrap();
        dashboard
    }

    #[tokio::test]
    async fn reload_replaces_snapshot_and_bumps_generation() {
        let source = Arc::new(MemorySource::new(records()));
        let dashboard = loaded(source.clone()).await;
        let first = dashboard.snapshot().await;
        assert_eq!(first.generation, 1);
        assert_eq!(first.observations.len(), 3);

        let mut more = records();
        more.headers.push(header("o4", "t2", 70.0, (2026, 4, 2)));
        source.set_records(more);
        dashboard.reload().await.unwrap();

        let second = dashboard.snapshot().await;
        assert_eq!(second.generation, 2);
        assert_eq!(second.observations.len(), 4);
        assert_eq!(first.observations.len(), 3);
    }

    #[tokio::test]
    async fn failed_reload_keeps_previous_snapshot() {
        let source = Arc::new(MemorySource::new(records()));
        let dashboard = loaded(source.clone()).await;

        source.fail("indicadores");
        assert!(dashboard.reload().await.is_err());

        let snapshot = dashboard.snapshot().await;
        assert_eq!(snapshot.generation, 1);
        assert_eq!(snapshot.observations.len(), 3);
    }

    #[tokio::test]
    async fn concurrent_reload_is_skipped() {
        let source = Arc::new(MemorySource {
            fetch_delay: Some(Duration::from_millis(50)),
            ..MemorySource::new(records())
        });
        let dashboard = Dashboard::new(source.clone());

        let (first, second) = tokio::join!(dashboard.reload(), dashboard.reload());
        let outcomes = [first.unwrap(), second.unwrap()];
        let skipped = outcomes
            .iter()
            .filter(|outcome| matches!(outcome, ReloadOutcome::Skipped))
            .count();

        assert_eq!(skipped, 1);
        assert_eq!(source.header_fetches.load(Ordering::SeqCst), 1);
        assert_eq!(dashboard.snapshot().await.generation, 1);
    }

    #[tokio::test]
    async fn render_defaults_to_first_observation() {
        let dashboard = loaded(Arc::new(MemorySource::new(records()))).await;
        let view = render(dashboard.snapshot().await.as_ref(), &ViewQuery::default());

        assert_eq!(view.mode, ViewMode::Single);
        match view.display {
            Some(DisplayData::Observation(ref observation)) => {
                assert_eq!(observation.observation_id, "o1")
            }
            ref other => panic!("unexpected display data: {other:?}"),
        }
        let critical = view.kpis.critical.unwrap();
        assert_eq!(critical.dimension, crate::models::Dimension::Ambiente);
        assert_eq!(view.kpis.low_indicators, 0);
        assert_eq!(view.ranking[0].observation_id, "o2");
    }

    #[tokio::test]
    async fn render_teacher_view_with_trend() {
        let dashboard = loaded(Arc::new(MemorySource::new(records()))).await;
        let query = ViewQuery {
            mode: Some(ViewMode::ByTeacher),
            ..ViewQuery::default()
        };
        let view = render(dashboard.snapshot().await.as_ref(), &query);

        assert_eq!(view.teacher_id.as_deref(), Some("t1"));
        assert_eq!(view.display.as_ref().unwrap().total_percentage(), 70.0);
        assert_eq!(view.kpis.trend, crate::kpi::Trend::Up { delta: 15.0 });
    }

    #[tokio::test]
    async fn render_institution_view_respects_date_range() {
        let dashboard = loaded(Arc::new(MemorySource::new(records()))).await;
        let query = ViewQuery {
            mode: Some(ViewMode::Institution),
            range: DateRange::new(chrono::NaiveDate::from_ymd_opt(2026, 3, 3), None),
            ..ViewQuery::default()
        };
        let view = render(dashboard.snapshot().await.as_ref(), &query);

        let display = view.display.unwrap();
        assert!((display.total_percentage() - 87.5).abs() < 1e-9);
        assert_eq!(view.ranking.len(), 2);
    }

    #[tokio::test]
    async fn render_before_load_has_no_data() {
        let dashboard = Dashboard::new(Arc::new(MemorySource::default()));
        let view = render(dashboard.snapshot().await.as_ref(), &ViewQuery::default());
        assert!(view.display.is_none());
        assert_eq!(view.kpis, Kpis::unavailable());
        assert!(view.ranking.is_empty());
    }

    #[tokio::test]
    async fn watch_reloads_once_for_new_responses_and_stops_on_shutdown() {
        let mut changed = records();
        changed.responses.push(ResponseRow {
            recorded_at: Some(Utc::now() - chrono::Duration::minutes(1)),
            ..response("o2", "i1", 0.9)
        });
        let source = Arc::new(MemorySource::new(changed));
        let dashboard = Dashboard::new(source.clone());

        let mut reloads = Vec::new();
        let shutdown = tokio::time::sleep(Duration::from_millis(120));
        dashboard
            .watch(Duration::from_millis(20), shutdown, |snapshot| {
                reloads.push(snapshot.generation)
            })
            .await;

        assert_eq!(reloads, vec![1]);
        assert_eq!(source.header_fetches.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn watch_recovers_after_failed_initial_load() {
        let mut changed = records();
        changed.responses[0].recorded_at = Some(Utc::now() - chrono::Duration::minutes(1));
        let source = Arc::new(MemorySource::new(changed));
        let dashboard = Dashboard::new(source.clone());

        source.fail("indicadores");
        assert!(dashboard.reload().await.is_err());
        let empty = dashboard.snapshot().await;
        assert_eq!(empty.generation, 0);
        assert!(render(empty.as_ref(), &ViewQuery::default()).display.is_none());

        let mut reloads = Vec::new();
        let recovering = source.clone();
        let shutdown = async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            recovering.recover("indicadores");
            tokio::time::sleep(Duration::from_millis(100)).await;
        };
        dashboard
            .watch(Duration::from_millis(20), shutdown, |snapshot| {
                reloads.push(snapshot.generation)
            })
            .await;

        assert_eq!(reloads, vec![1]);
        assert_eq!(dashboard.snapshot().await.observations.len(), 3);
    }

    #[tokio::test]
    async fn watch_skips_reload_when_nothing_changed() {
        let source = Arc::new(MemorySource::new(records()));
        let dashboard = Dashboard::new(source.clone());

        let mut reloads = 0;
        let shutdown = tokio::time::sleep(Duration::from_millis(80));
        dashboard
            .watch(Duration::from_millis(20), shutdown, |_| reloads += 1)
            .await;

        assert_eq!(reloads, 0);
        assert_eq!(source.header_fetches.load(Ordering::SeqCst), 0);
    }
}
