// Metrics
//
// Counters, gauges, and histograms for:
// - Unit outcomes (OK, BLE, RE, IE)
// - Budget terminations per lane
// - Active units and unit wall time

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use crate::config::types::{CostLane, UnitStatus};

/// Counter metric (monotonically increasing)
#[derive(Debug)]
pub struct Counter {
    value: AtomicU64,
}

impl Counter {
    pub fn new() -> Self {
        Self {
            value: AtomicU64::new(0),
        }
    }

    pub fn inc(&self) {
        self.value.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add(&self, delta: u64) {
        self.value.fetch_add(delta, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.value.load(Ordering::Relaxed)
    }
}

impl Default for Counter {
    fn default() -> Self {
        Self::new()
    }
}

/// Gauge metric (can go up or down)
#[derive(Debug)]
pub struct Gauge {
    value: AtomicU64,
}

impl Gauge {
    pub fn new() -> Self {
        Self {
            value: AtomicU64::new(0),
        }
    }

    pub fn inc(&self) {
        self.value.fetch_add(1, Ordering::Relaxed);
    }

    /// Saturates at zero
    pub fn dec(&self) {
        let _ = self
            .value
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |v| v.checked_sub(1));
    }

    pub fn get(&self) -> u64 {
        self.value.load(Ordering::Relaxed)
    }
}

impl Default for Gauge {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug)]
pub struct HistogramBucket {
    pub le: f64, // upper bound in seconds
    pub count: AtomicU64,
}

/// Histogram metric for duration tracking
#[derive(Debug)]
pub struct Histogram {
    buckets: Vec<HistogramBucket>,
    sum: AtomicU64, // microseconds
    count: AtomicU64,
}

impl Histogram {
    /// Buckets sized for short sandboxed units (seconds)
    pub fn new_latency() -> Self {
        let bucket_bounds = vec![0.0001, 0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0];

        let buckets = bucket_bounds
            .into_iter()
            .map(|le| HistogramBucket {
                le,
                count: AtomicU64::new(0),
            })
            .collect();

        Self {
            buckets,
            sum: AtomicU64::new(0),
            count: AtomicU64::new(0),
        }
    }

    pub fn observe(&self, value: Duration) {
        let seconds = value.as_secs_f64();
        self.sum.fetch_add(value.as_micros() as u64, Ordering::Relaxed);
        self.count.fetch_add(1, Ordering::Relaxed);

        for bucket in &self.buckets {
            if seconds <= bucket.le {
                bucket.count.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    pub fn get_count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }

    pub fn get_sum_micros(&self) -> u64 {
        self.sum.load(Ordering::Relaxed)
    }

    pub fn get_bucket_count(&self, le: f64) -> u64 {
        self.buckets
            .iter()
            .find(|b| (b.le - le).abs() < 1e-9)
            .map(|b| b.count.load(Ordering::Relaxed))
            .unwrap_or(0)
    }
}

/// Process-wide metrics registry
#[derive(Debug)]
pub struct MetricsRegistry {
    pub units_started: Counter,
    pub units_ok: Counter,
    pub units_ble: Counter,
    pub units_re: Counter,
    pub units_ie: Counter,

    /// Indexed by `CostLane::index()`
    terminations_by_lane: [Counter; 4],

    pub active_units: Gauge,
    pub unit_wall_time: Histogram,
}

impl MetricsRegistry {
    pub fn new() -> Self {
        Self {
            units_started: Counter::new(),
            units_ok: Counter::new(),
            units_ble: Counter::new(),
            units_re: Counter::new(),
            units_ie: Counter::new(),
            terminations_by_lane: Default::default(),
            active_units: Gauge::new(),
            unit_wall_time: Histogram::new_latency(),
        }
    }

    pub fn record_unit_started(&self) {
        self.units_started.inc();
        self.active_units.inc();
    }

    pub fn record_unit_end(&self, status: UnitStatus, wall_time_ms: u64) {
        match status {
            UnitStatus::Ok => self.units_ok.inc(),
            UnitStatus::BudgetExceeded => self.units_ble.inc(),
            UnitStatus::RuntimeError => self.units_re.inc(),
            UnitStatus::InternalError => self.units_ie.inc(),
        }
        self.active_units.dec();
        self.unit_wall_time.observe(Duration::from_millis(wall_time_ms));
    }

    /// Called once per unit, at the increment that crossed the limit
    pub fn record_termination(&self, lane: CostLane) {
        self.terminations_by_lane[lane.index()].inc();
    }

    pub fn terminations(&self, lane: CostLane) -> u64 {
        self.terminations_by_lane[lane.index()].get()
    }

    /// Export metrics in Prometheus text format
    pub fn export_prometheus(&self) -> String {
        let mut output = String::new();

        output.push_str("# HELP costbox_units_started_total Execution units started\n");
        output.push_str("# TYPE costbox_units_started_total counter\n");
        output.push_str(&format!(
            "costbox_units_started_total {}\n",
            self.units_started.get()
        ));

        output.push_str("# HELP costbox_units_by_status Finished units by status\n");
        output.push_str("# TYPE costbox_units_by_status counter\n");
        for (status, counter) in [
            ("OK", &self.units_ok),
            ("BLE", &self.units_ble),
            ("RE", &self.units_re),
            ("IE", &self.units_ie),
        ] {
            output.push_str(&format!(
                "costbox_units_by_status{{status=\"{}\"}} {}\n",
                status,
                counter.get()
            ));
        }

        output.push_str("# HELP costbox_terminations_total Budget terminations by lane\n");
        output.push_str("# TYPE costbox_terminations_total counter\n");
        for lane in CostLane::ALL {
            output.push_str(&format!(
                "costbox_terminations_total{{lane=\"{}\"}} {}\n",
                lane,
                self.terminations(lane)
            ));
        }

        output.push_str("# HELP costbox_active_units Units currently executing\n");
        output.push_str("# TYPE costbox_active_units gauge\n");
        output.push_str(&format!("costbox_active_units {}\n", self.active_units.get()));

        output.push_str("# HELP costbox_unit_wall_time_seconds Unit wall time\n");
        output.push_str("# TYPE costbox_unit_wall_time_seconds histogram\n");
        for bucket in &self.unit_wall_time.buckets {
            output.push_str(&format!(
                "costbox_unit_wall_time_seconds_bucket{{le=\"{}\"}} {}\n",
                bucket.le,
                bucket.count.load(Ordering::Relaxed)
            ));
        }
        output.push_str(&format!(
            "costbox_unit_wall_time_seconds_bucket{{le=\"+Inf\"}} {}\n",
            self.unit_wall_time.get_count()
        ));
        output.push_str(&format!(
            "costbox_unit_wall_time_seconds_sum {}\n",
            self.unit_wall_time.get_sum_micros() as f64 / 1_000_000.0
        ));
        output.push_str(&format!(
            "costbox_unit_wall_time_seconds_count {}\n",
            self.unit_wall_time.get_count()
        ));

        output
    }
}

impl Default for MetricsRegistry {
    fn default() -> Self {
        Self::new()
    }
}

static METRICS: once_cell::sync::Lazy<MetricsRegistry> = once_cell::sync::Lazy::new(MetricsRegistry::new);

/// Global metrics registry
pub fn global() -> &'static MetricsRegistry {
    &METRICS
}
