//! Per-request timing snapshots feeding the metrics aggregation worker.

use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;

use chrono::{DateTime, TimeDelta, Utc};

use cadence_service::worker::metrics::{
    OperationStats, PerfSnapshot, SlowOperation, SnapshotProvider,
};

/// Requests at least this slow are recorded as slow operations.
const SLOW_REQUEST_MS: f64 = 200.0;

/// Bounded, most-recent-last buffer of request snapshots.
#[derive(Debug)]
pub struct PerfTracker {
    capacity: usize,
    snapshots: Mutex<VecDeque<(DateTime<Utc>, PerfSnapshot)>>,
}

impl PerfTracker {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            snapshots: Mutex::new(VecDeque::new()),
        }
    }

    pub fn record(&self, at: DateTime<Utc>, snapshot: PerfSnapshot) {
        let mut snapshots = self.snapshots.lock().unwrap_or_else(PoisonError::into_inner);
        if snapshots.len() == self.capacity {
            snapshots.pop_front();
        }
        snapshots.push_back((at, snapshot));
    }
}

impl SnapshotProvider for PerfTracker {
    fn recent_snapshots(
        &self,
        window_minutes: u32,
        max_snapshots: usize,
    ) -> anyhow::Result<Vec<PerfSnapshot>> {
        let since = Utc::now() - TimeDelta::minutes(i64::from(window_minutes));
        let snapshots = self.snapshots.lock().unwrap_or_else(PoisonError::into_inner);

        Ok(snapshots
            .iter()
            .rev()
            .take_while(|(at, _)| *at >= since)
            .take(max_snapshots)
            .map(|(_, snapshot)| snapshot.clone())
            .collect())
    }
}

/// Times every downstream handler and records one snapshot per request, keyed by method.
pub struct PerfTrackingHandler {
    pub tracker: Arc<PerfTracker>,
}

#[salvo::async_trait]
impl salvo::Handler for PerfTrackingHandler {
    async fn handle(
        &self,
        req: &mut salvo::Request,
        depot: &mut salvo::Depot,
        res: &mut salvo::Response,
        ctrl: &mut salvo::FlowCtrl,
    ) {
        let started = Instant::now();
        ctrl.call_next(req, depot, res).await;
        let ms = started.elapsed().as_secs_f64() * 1000.0;

        let op = format!("http.{}", req.method().as_str().to_ascii_lowercase());
        let slow = if ms >= SLOW_REQUEST_MS {
            vec![SlowOperation { op: op.clone(), ms }]
        } else {
            Vec::new()
        };

        self.tracker.record(
            Utc::now(),
            PerfSnapshot {
                total_ms: ms,
                ops: BTreeMap::from([(op, OperationStats { count: 1, ms, max: ms })]),
                slow,
                ..PerfSnapshot::default()
            },
        );
    }
}
