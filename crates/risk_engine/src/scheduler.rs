//! Cursor-driven incremental scheduler.
//!
//! Each run reads the source series and the cursor, picks the next target
//! date, recomputes the enriched history over everything known up to that
//! date, writes the history and latest-row artifacts, and only then advances
//! the cursor. Re-running for the same target rewrites identical bytes, so a
//! crash between the output writes and the cursor commit is safe to retry.
//! A run that fails after touching an output puts the previous bytes back.

use chrono::NaiveDate;
use tracing::{debug, info, warn};

use artifact_store::{
    decode_cursor, decode_series, encode_cursor, encode_enriched, ArtifactStore,
    WritePrecondition, WriteResult,
};
use common::config::ModelConfig;
use common::{Cursor, DemandSeries, EnrichedRow, Error, MonitorConfig, Result, DATE_FORMAT};

use crate::pipeline::enrich;

/// Where the cursor stands relative to the series.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    /// No cursor yet; the run bootstraps at the first fully-defined day.
    NeverRun,
    /// Cursor is at (or past) the last date; nothing to do.
    CaughtUp,
    /// A date after the cursor exists and will be processed.
    Advancing,
}

/// What a successful advancing run produced.
#[derive(Debug, Clone, PartialEq)]
pub struct RunReport {
    pub state: SchedulerState,
    pub previous: Cursor,
    pub target: NaiveDate,
    pub latest: EnrichedRow,
    pub history_rows: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    /// Outputs written and cursor moved to `report.target`.
    Advanced(RunReport),
    /// No date after the cursor. Nothing was written.
    CaughtUp { last_processed: NaiveDate },
    /// Not enough rows for a first output. Nothing was written.
    AwaitingHistory { rows: usize, required: usize },
}

/// Next unit of work, decided from the series and cursor alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Plan {
    Process {
        state: SchedulerState,
        target: NaiveDate,
    },
    CaughtUp(NaiveDate),
    AwaitingHistory {
        rows: usize,
        required: usize,
    },
}

impl Plan {
    /// State machine position this plan corresponds to (`None` while awaiting history).
    pub fn state(&self) -> Option<SchedulerState> {
        match self {
            Plan::Process { state, .. } => Some(*state),
            Plan::CaughtUp(_) => Some(SchedulerState::CaughtUp),
            Plan::AwaitingHistory { .. } => None,
        }
    }
}

/// Decide what a run should do.
///
/// A cursor earlier than the bootstrap date moves straight to it: earlier days
/// have no output row.
pub fn plan(series: &DemandSeries, cursor: &Cursor, model: &ModelConfig) -> Plan {
    let bootstrap_index = model.bootstrap_index();
    let awaiting = Plan::AwaitingHistory {
        rows: series.len(),
        required: model.min_rows(),
    };

    let Some(last) = cursor.last_processed_date else {
        return match series.date_at(bootstrap_index) {
            Some(target) => Plan::Process {
                state: SchedulerState::NeverRun,
                target,
            },
            None => awaiting,
        };
    };

    let Some(next) = series.position_after(last) else {
        return Plan::CaughtUp(last);
    };
    match series.date_at(next.max(bootstrap_index)) {
        Some(target) => Plan::Process {
            state: SchedulerState::Advancing,
            target,
        },
        None => awaiting,
    }
}

/// Runs the pipeline one day at a time against an injected store.
pub struct Scheduler<S> {
    store: S,
    config: MonitorConfig,
}

impl<S: ArtifactStore> Scheduler<S> {
    pub fn new(store: S, config: MonitorConfig) -> Self {
        Self { store, config }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Load and validate the source series. Zero rows is `Error::EmptyInput`.
    pub fn load_series(&self) -> Result<DemandSeries> {
        let bytes = self.store.get(&self.config.store.source_key)?;
        let series = decode_series(&bytes)?;
        debug!(
            "Loaded {} rows from {}",
            series.len(),
            self.config.store.source_key
        );
        Ok(series)
    }

    /// Current cursor plus the raw bytes it was decoded from (`None` if absent).
    pub fn read_cursor(&self) -> Result<(Cursor, Option<Vec<u8>>)> {
        let raw = self.store.get_opt(&self.config.store.cursor_key)?;
        let cursor = match &raw {
            Some(bytes) => decode_cursor(bytes)?,
            None => Cursor::default(),
        };
        Ok((cursor, raw))
    }

    /// Process at most one new day.
    pub fn run_once(&self) -> Result<RunOutcome> {
        let series = self.load_series()?;
        let (cursor, observed) = self.read_cursor()?;

        let next = plan(&series, &cursor, &self.config.model);
        debug!("Scheduler state: {:?} (cursor={})", next.state(), cursor.label());
        let (state, target) = match next {
            Plan::Process { state, target } => (state, target),
            Plan::CaughtUp(last_processed) => {
                info!(
                    "Pipeline has reached the end of the dataset (cursor={})",
                    cursor.label()
                );
                return Ok(RunOutcome::CaughtUp { last_processed });
            }
            Plan::AwaitingHistory { rows, required } => {
                info!(
                    "Not enough history yet: {} rows, need {} (cursor={})",
                    rows,
                    required,
                    cursor.label()
                );
                return Ok(RunOutcome::AwaitingHistory { rows, required });
            }
        };

        // Only what was known as of the target date.
        let rows = enrich(
            series.through(target),
            &self.config.model,
            &self.config.risk,
        );
        let latest = match rows.last() {
            Some(row) if row.date == target => row.clone(),
            _ => {
                return Err(Error::InvalidSeries(format!(
                    "no enriched row for target date {}",
                    target.format(DATE_FORMAT)
                )))
            }
        };

        let decimals = self.config.risk.decimals;
        let history_bytes = encode_enriched(&rows, decimals)?;
        let latest_bytes = encode_enriched(std::slice::from_ref(&latest), decimals)?;
        let cursor_bytes = encode_cursor(&Cursor::at(target))?;

        // Another runner committed since we read the cursor: leave its outputs alone.
        let (_, current) = self.read_cursor()?;
        if current != observed {
            return Err(self.conflict(&cursor, current.as_deref()));
        }

        let keys = &self.config.store;
        let prior = [
            (keys.history_key.as_str(), self.store.get_opt(&keys.history_key)?),
            (keys.latest_key.as_str(), self.store.get_opt(&keys.latest_key)?),
        ];
        let committed = self.commit(
            &history_bytes,
            &latest_bytes,
            &cursor_bytes,
            &cursor,
            observed,
        );
        if let Err(e) = committed {
            self.restore(&prior);
            return Err(e);
        }

        info!(
            "Pipeline ran for date: {} ({:?}, {} history rows)",
            target.format(DATE_FORMAT),
            state,
            rows.len()
        );
        info!(
            "Risk level: {} | z-score: {} | anomaly: {}",
            latest.risk_level,
            latest
                .z_score
                .map(|z| format!("{z:.4}"))
                .unwrap_or_else(|| "undefined".into()),
            latest.anomaly_flag
        );

        Ok(RunOutcome::Advanced(RunReport {
            state,
            previous: cursor,
            target,
            latest,
            history_rows: rows.len(),
        }))
    }

    /// Write both outputs, then move the cursor if nobody else has.
    fn commit(
        &self,
        history: &[u8],
        latest: &[u8],
        cursor_bytes: &[u8],
        cursor: &Cursor,
        observed: Option<Vec<u8>>,
    ) -> Result<()> {
        let keys = &self.config.store;
        self.store.put(&keys.history_key, history)?;
        self.store.put(&keys.latest_key, latest)?;

        match self.store.put_if(
            &keys.cursor_key,
            cursor_bytes,
            &WritePrecondition::from_observed(observed),
        )? {
            WriteResult::Written => Ok(()),
            WriteResult::PreconditionFailed { current } => {
                Err(self.conflict(cursor, current.as_deref()))
            }
        }
    }

    /// Put each output back to what it held before the run.
    fn restore(&self, prior: &[(&str, Option<Vec<u8>>)]) {
        for (key, bytes) in prior {
            let restored = match bytes {
                Some(bytes) => self.store.put(key, bytes),
                None => self.store.delete(key),
            };
            match restored {
                Ok(()) => debug!("Restored {} after failed run", key),
                Err(e) => warn!("Failed to restore {} after failed run: {}", key, e),
            }
        }
    }

    /// Advance repeatedly until caught up, awaiting history, or `max_steps` runs.
    pub fn catch_up(&self, max_steps: usize) -> Result<Vec<RunReport>> {
        let mut reports = Vec::new();
        while reports.len() < max_steps {
            match self.run_once()? {
                RunOutcome::Advanced(report) => reports.push(report),
                RunOutcome::CaughtUp { .. } | RunOutcome::AwaitingHistory { .. } => break,
            }
        }
        info!("Catch-up processed {} day(s)", reports.len());
        Ok(reports)
    }

    fn conflict(&self, expected: &Cursor, current: Option<&[u8]>) -> Error {
        let found = match current {
            Some(bytes) => decode_cursor(bytes)
                .map(|c| c.label())
                .unwrap_or_else(|_| "<unreadable>".into()),
            None => "absent".into(),
        };
        warn!(
            "Cursor conflict: expected {}, found {}",
            expected.label(),
            found
        );
        Error::CursorConflict {
            expected: expected.label(),
            found,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use artifact_store::{decode_enriched, encode_series, MemoryStore};
    use chrono::Duration;
    use common::config::RiskPolicy;
    use common::{DemandPoint, RiskTier};

    const SOURCE: &str = "demand.csv";
    const HISTORY: &str = "daily_risk_output.csv";
    const LATEST: &str = "latest_risk.csv";
    const CURSOR: &str = "cursor.json";

    fn start() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()
    }

    fn day(i: usize) -> NaiveDate {
        start() + Duration::days(i as i64)
    }

    fn source_csv(demands: &[u64]) -> Vec<u8> {
        let points: Vec<DemandPoint> = demands
            .iter()
            .enumerate()
            .map(|(i, &d)| DemandPoint::new(day(i), d))
            .collect();
        encode_series(&points).unwrap()
    }

    fn weekly(n: usize) -> Vec<u64> {
        (0..n)
            .map(|i| [120, 95, 90, 100, 110, 160, 180][i % 7] + ((i * 37) % 11) as u64)
            .collect()
    }

    fn scheduler(store: MemoryStore) -> Scheduler<MemoryStore> {
        Scheduler::new(store, MonitorConfig::default())
    }

    fn cursor_bytes(i: usize) -> Vec<u8> {
        encode_cursor(&Cursor::at(day(i))).unwrap()
    }

    fn advanced(outcome: RunOutcome) -> RunReport {
        match outcome {
            RunOutcome::Advanced(report) => report,
            other => panic!("expected an advancing run, got {other:?}"),
        }
    }

    #[test]
    fn test_plan_states() {
        let series = DemandSeries::from_points(
            (0..40).map(|i| DemandPoint::new(day(i), 1)).collect(),
        )
        .unwrap();
        let model = ModelConfig::default();

        assert_eq!(
            plan(&series, &Cursor::default(), &model),
            Plan::Process {
                state: SchedulerState::NeverRun,
                target: day(36)
            }
        );
        assert_eq!(
            plan(&series, &Cursor::at(day(36)), &model),
            Plan::Process {
                state: SchedulerState::Advancing,
                target: day(37)
            }
        );
        assert_eq!(
            plan(&series, &Cursor::at(day(39)), &model),
            Plan::CaughtUp(day(39))
        );
        assert_eq!(
            plan(&series, &Cursor::at(day(39)), &model).state(),
            Some(SchedulerState::CaughtUp)
        );
        // Cursor before the bootstrap date jumps forward to it.
        assert_eq!(
            plan(&series, &Cursor::at(day(3)), &model),
            Plan::Process {
                state: SchedulerState::Advancing,
                target: day(36)
            }
        );
        assert_eq!(
            plan(
                &series,
                &Cursor::default(),
                &ModelConfig {
                    season_length: 7,
                    window: 34
                }
            ),
            Plan::AwaitingHistory {
                rows: 40,
                required: 41
            }
        );
    }

    #[test]
    fn test_first_run_on_constant_series() {
        let store = MemoryStore::new().with(SOURCE, source_csv(&[100; 50]));
        let sched = scheduler(store);

        let report = advanced(sched.run_once().unwrap());
        assert_eq!(report.state, SchedulerState::NeverRun);
        assert_eq!(report.target, day(36));
        assert_eq!(report.previous, Cursor::default());
        assert_eq!(report.latest.forecast, 100.0);
        assert_eq!(report.latest.residual, 0.0);
        assert_eq!(report.latest.z_score, None);
        assert_eq!(report.latest.risk_level, RiskTier::Low);
        assert_eq!(report.latest.anomaly_flag, 0);
        assert_eq!(report.history_rows, 1);

        assert_eq!(sched.store().get(CURSOR).unwrap(), cursor_bytes(36));
        let latest = decode_enriched(&sched.store().get(LATEST).unwrap()).unwrap();
        assert_eq!(latest.len(), 1);
        assert_eq!(latest[0].date, day(36));
    }

    #[test]
    fn test_cursor_strictly_increases_until_exhausted() {
        let store = MemoryStore::new().with(SOURCE, source_csv(&weekly(45)));
        let sched = scheduler(store);

        let mut previous: Option<NaiveDate> = None;
        let mut runs = 0;
        loop {
            match sched.run_once().unwrap() {
                RunOutcome::Advanced(report) => {
                    assert_eq!(report.previous.last_processed_date, previous);
                    if let Some(p) = previous {
                        assert!(report.target > p);
                    }
                    previous = Some(report.target);
                    runs += 1;
                }
                RunOutcome::CaughtUp { last_processed } => {
                    assert_eq!(last_processed, day(44));
                    break;
                }
                other => panic!("unexpected {other:?}"),
            }
        }
        assert_eq!(runs, 45 - 36);

        let history = decode_enriched(&sched.store().get(HISTORY).unwrap()).unwrap();
        assert_eq!(history.len(), 45 - 36);
        assert!(history.windows(2).all(|w| w[0].date < w[1].date));
    }

    #[test]
    fn test_history_never_extends_past_cursor() {
        let store = MemoryStore::new().with(SOURCE, source_csv(&weekly(60)));
        let sched = scheduler(store);
        sched.run_once().unwrap();
        let report = advanced(sched.run_once().unwrap());

        let history = decode_enriched(&sched.store().get(HISTORY).unwrap()).unwrap();
        assert_eq!(history.last().unwrap().date, report.target);
        assert_eq!(history.len(), 2);
    }

    #[test]
    fn test_exhausted_cursor_writes_nothing() {
        let store = MemoryStore::new()
            .with(SOURCE, source_csv(&weekly(50)))
            .with(CURSOR, cursor_bytes(49));
        let sched = scheduler(store);

        let outcome = sched.run_once().unwrap();
        assert_eq!(
            outcome,
            RunOutcome::CaughtUp {
                last_processed: day(49)
            }
        );
        assert_eq!(sched.store().writes(), 0);
        assert!(sched.store().get(HISTORY).unwrap_err().is_not_found());
    }

    #[test]
    fn test_short_series_awaits_history_without_writes() {
        let store = MemoryStore::new().with(SOURCE, source_csv(&weekly(20)));
        let sched = scheduler(store);
        assert_eq!(
            sched.run_once().unwrap(),
            RunOutcome::AwaitingHistory {
                rows: 20,
                required: 37
            }
        );
        assert_eq!(sched.store().writes(), 0);
    }

    #[test]
    fn test_empty_input_is_fatal_before_writes() {
        let store = MemoryStore::new().with(SOURCE, "date,demand\n");
        let sched = scheduler(store);
        assert!(matches!(sched.run_once(), Err(Error::EmptyInput)));
        assert_eq!(sched.store().writes(), 0);
    }

    #[test]
    fn test_missing_source_is_not_found() {
        let sched = scheduler(MemoryStore::new());
        assert!(sched.run_once().unwrap_err().is_not_found());
    }

    #[test]
    fn test_rerun_from_same_cursor_is_byte_identical() {
        let demands = weekly(70);
        let seed = || {
            MemoryStore::new()
                .with(SOURCE, source_csv(&demands))
                .with(CURSOR, cursor_bytes(50))
        };

        let a = scheduler(seed());
        let b = scheduler(seed());
        let ra = advanced(a.run_once().unwrap());
        let rb = advanced(b.run_once().unwrap());

        assert_eq!(ra, rb);
        assert_eq!(ra.target, day(51));
        assert_eq!(a.store().snapshot(), b.store().snapshot());
    }

    #[test]
    fn test_appending_future_rows_keeps_past_results() {
        let demands = weekly(80);
        let short = scheduler(
            MemoryStore::new()
                .with(SOURCE, source_csv(&demands[..55]))
                .with(CURSOR, cursor_bytes(53)),
        );
        let long = scheduler(
            MemoryStore::new()
                .with(SOURCE, source_csv(&demands))
                .with(CURSOR, cursor_bytes(53)),
        );
        advanced(short.run_once().unwrap());
        advanced(long.run_once().unwrap());

        assert_eq!(
            short.store().get(HISTORY).unwrap(),
            long.store().get(HISTORY).unwrap()
        );
        assert_eq!(
            short.store().get(LATEST).unwrap(),
            long.store().get(LATEST).unwrap()
        );
    }

    #[test]
    fn test_spike_day_is_flagged() {
        let mut demands = vec![100; 39];
        demands.push(300);
        let store = MemoryStore::new()
            .with(SOURCE, source_csv(&demands))
            .with(CURSOR, cursor_bytes(38));
        let sched = scheduler(store);

        let report = advanced(sched.run_once().unwrap());
        assert_eq!(report.target, day(39));
        let z = report.latest.z_score.unwrap();
        assert!(z.abs() >= 2.0, "z={z}");
        assert_eq!(report.latest.anomaly_flag, 1);
        assert!(matches!(
            report.latest.risk_level,
            RiskTier::High | RiskTier::Critical
        ));
    }

    #[test]
    fn test_catch_up_stops_at_end() {
        let store = MemoryStore::new().with(SOURCE, source_csv(&weekly(50)));
        let sched = scheduler(store);

        let first = sched.catch_up(3).unwrap();
        assert_eq!(first.len(), 3);
        assert_eq!(first.last().unwrap().target, day(38));

        let rest = sched.catch_up(usize::MAX).unwrap();
        assert_eq!(rest.len(), 50 - 39);
        assert_eq!(rest.last().unwrap().target, day(49));
        assert!(sched.catch_up(10).unwrap().is_empty());
    }

    #[test]
    fn test_composite_policy_writes_risk_score() {
        let mut config = MonitorConfig::default();
        config.risk.policy = RiskPolicy::Composite;
        let store = MemoryStore::new().with(SOURCE, source_csv(&weekly(45)));
        let sched = Scheduler::new(store, config);
        sched.catch_up(usize::MAX).unwrap();

        let history = decode_enriched(&sched.store().get(HISTORY).unwrap()).unwrap();
        assert!(history.iter().all(|r| r.risk_score.is_some()));
    }

    /// Fails every write to one key.
    struct FailingStore {
        inner: MemoryStore,
        fail_key: &'static str,
    }

    impl ArtifactStore for FailingStore {
        fn get(&self, key: &str) -> Result<Vec<u8>> {
            self.inner.get(key)
        }

        fn delete(&self, key: &str) -> Result<()> {
            self.inner.delete(key)
        }

        fn put(&self, key: &str, bytes: &[u8]) -> Result<()> {
            if key == self.fail_key {
                return Err(Error::Io(std::io::Error::other("disk full")));
            }
            self.inner.put(key, bytes)
        }
    }

    #[test]
    fn test_failed_output_write_leaves_artifacts() {
        let store = FailingStore {
            inner: MemoryStore::new()
                .with(SOURCE, source_csv(&weekly(60)))
                .with(HISTORY, "previous-history")
                .with(CURSOR, cursor_bytes(40)),
            fail_key: LATEST,
        };
        let sched = scheduler_with(store);
        assert!(matches!(sched.run_once(), Err(Error::Io(_))));
        assert_eq!(sched.store().get(CURSOR).unwrap(), cursor_bytes(40));
        assert_eq!(sched.store().get(HISTORY).unwrap(), b"previous-history");
        assert!(sched.store().get(LATEST).unwrap_err().is_not_found());

        // Retry after the fault clears produces the same target.
        let recovered = scheduler(sched.store.inner);
        assert_eq!(advanced(recovered.run_once().unwrap()).target, day(41));
    }

    fn scheduler_with<S: ArtifactStore>(store: S) -> Scheduler<S> {
        Scheduler::new(store, MonitorConfig::default())
    }

    /// Moves the cursor underneath the run right before its commit.
    struct RacingStore {
        inner: MemoryStore,
        rival: Vec<u8>,
    }

    impl ArtifactStore for RacingStore {
        fn get(&self, key: &str) -> Result<Vec<u8>> {
            self.inner.get(key)
        }

        fn delete(&self, key: &str) -> Result<()> {
            self.inner.delete(key)
        }

        fn put(&self, key: &str, bytes: &[u8]) -> Result<()> {
            self.inner.put(key, bytes)
        }

        fn put_if(
            &self,
            key: &str,
            bytes: &[u8],
            precondition: &WritePrecondition,
        ) -> Result<WriteResult> {
            self.inner.put(key, &self.rival)?;
            self.inner.put_if(key, bytes, precondition)
        }
    }

    #[test]
    fn test_first_run_failure_removes_new_outputs() {
        let store = FailingStore {
            inner: MemoryStore::new().with(SOURCE, source_csv(&weekly(40))),
            fail_key: LATEST,
        };
        let sched = scheduler_with(store);
        assert!(sched.run_once().is_err());
        let keys: Vec<String> = sched.store().inner.snapshot().into_keys().collect();
        assert_eq!(keys, vec![SOURCE.to_string()]);
    }

    #[test]
    fn test_concurrent_commit_is_rejected() {
        let store = RacingStore {
            inner: MemoryStore::new()
                .with(SOURCE, source_csv(&weekly(60)))
                .with(CURSOR, cursor_bytes(40)),
            rival: cursor_bytes(45),
        };
        let sched = scheduler_with(store);
        match sched.run_once() {
            Err(Error::CursorConflict { expected, found }) => {
                assert_eq!(expected, "2024-02-10");
                assert_eq!(found, "2024-02-15");
            }
            other => panic!("expected conflict, got {other:?}"),
        }
        // The rival's cursor is never overwritten with an older one.
        assert_eq!(sched.store().inner.get(CURSOR).unwrap(), cursor_bytes(45));
        // Outputs written for day 41 are rolled back.
        assert!(sched.store().inner.get(HISTORY).unwrap_err().is_not_found());
        assert!(sched.store().inner.get(LATEST).unwrap_err().is_not_found());
    }

    /// Reports a rival cursor on every read after the first.
    struct ShiftingStore {
        inner: MemoryStore,
        rival: Vec<u8>,
        cursor_reads: std::sync::atomic::AtomicUsize,
    }

    impl ArtifactStore for ShiftingStore {
        fn get(&self, key: &str) -> Result<Vec<u8>> {
            if key == CURSOR {
                let n = self
                    .cursor_reads
                    .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                if n > 0 {
                    return Ok(self.rival.clone());
                }
            }
            self.inner.get(key)
        }

        fn delete(&self, key: &str) -> Result<()> {
            self.inner.delete(key)
        }

        fn put(&self, key: &str, bytes: &[u8]) -> Result<()> {
            self.inner.put(key, bytes)
        }
    }

    #[test]
    fn test_cursor_moved_before_outputs_skips_writes() {
        let store = ShiftingStore {
            inner: MemoryStore::new()
                .with(SOURCE, source_csv(&weekly(60)))
                .with(CURSOR, cursor_bytes(40)),
            rival: cursor_bytes(42),
            cursor_reads: Default::default(),
        };
        let sched = scheduler_with(store);
        assert!(matches!(
            sched.run_once(),
            Err(Error::CursorConflict { .. })
        ));
        assert_eq!(sched.store().inner.writes(), 0);
    }
}
