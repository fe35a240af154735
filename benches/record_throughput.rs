// Accounting hot-path benchmark
// Measures per-call latency of the record_* operations on a metered thread
// Target: p50 < 100ns, p99 < 1us per call

use costbox::core::accountant::{self, CostAccountant};
use costbox::{CostLimits, ThreadKey};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Benchmark configuration
const ITERATIONS: usize = 2_000;
const WARMUP_ITERATIONS: usize = 200;
const CALLS_PER_SAMPLE: u32 = 1_000;

/// Latency percentiles (per call)
struct LatencyStats {
    p50: Duration,
    p95: Duration,
    p99: Duration,
    min: Duration,
    max: Duration,
    mean: Duration,
}

impl LatencyStats {
    fn from_samples(mut samples: Vec<Duration>) -> Self {
        samples.sort();
        let len = samples.len();

        let p50_idx = (len as f64 * 0.50) as usize;
        let p95_idx = (len as f64 * 0.95) as usize;
        let p99_idx = (len as f64 * 0.99) as usize;

        let sum: Duration = samples.iter().sum();
        let mean = sum / len as u32;

        Self {
            p50: samples[p50_idx],
            p95: samples[p95_idx],
            p99: samples[p99_idx],
            min: samples[0],
            max: samples[len - 1],
            mean,
        }
    }

    fn print(&self, label: &str) {
        println!("\n{}", label);
        println!("  p50: {:?}", self.p50);
        println!("  p95: {:?}", self.p95);
        println!("  p99: {:?}", self.p99);
        println!("  min: {:?}", self.min);
        println!("  max: {:?}", self.max);
        println!("  mean: {:?}", self.mean);
    }
}

struct BenchmarkResult {
    scenario: String,
    stats: LatencyStats,
    passed: bool,
}

impl BenchmarkResult {
    fn print(&self) {
        println!("\n=== {} ===", self.scenario);
        self.stats.print("Per-call latency");
        if self.passed {
            println!("PASS");
        } else {
            println!(
                "FAIL: p50={:?} (target <100ns), p99={:?} (target <1us)",
                self.stats.p50, self.stats.p99
            );
        }
    }
}

/// Limits high enough that no sample ever terminates.
fn unmetered_limits() -> CostLimits {
    CostLimits {
        allocation: u64::MAX,
        jump: u64::MAX,
        invocation: u64::MAX,
        throw: u64::MAX,
    }
}

fn measure(scenario: &str, mut call: impl FnMut()) -> BenchmarkResult {
    for _ in 0..WARMUP_ITERATIONS {
        for _ in 0..CALLS_PER_SAMPLE {
            call();
        }
        accountant::reset_counters();
    }

    let mut samples = Vec::with_capacity(ITERATIONS);
    for _ in 0..ITERATIONS {
        let start = Instant::now();
        for _ in 0..CALLS_PER_SAMPLE {
            call();
        }
        samples.push(start.elapsed() / CALLS_PER_SAMPLE);
        accountant::reset_counters();
    }

    let stats = LatencyStats::from_samples(samples);
    let passed = stats.p50 < Duration::from_nanos(100) && stats.p99 < Duration::from_micros(1);
    BenchmarkResult {
        scenario: scenario.to_string(),
        stats,
        passed,
    }
}

fn main() {
    println!("=== costbox Accounting Hot-Path Benchmark ===");
    println!(
        "Samples: {} x {} calls (after {} warmup)",
        ITERATIONS, CALLS_PER_SAMPLE, WARMUP_ITERATIONS
    );

    let metered = Arc::new(CostAccountant::new(unmetered_limits()));
    let results = std::thread::spawn(move || {
        metered.bind_current_thread();
        vec![
            measure("record_jump (bound worker)", accountant::record_jump),
            measure("record_method_call (bound worker)", accountant::record_method_call),
            measure("record_array_allocation (bound worker)", || {
                accountant::record_array_allocation(16, 8)
            }),
            measure("record_jump (direct)", || metered.record_jump()),
        ]
    })
    .join()
    .expect("benchmark thread panicked");

    let supervisor = CostAccountant::with_supervisor(CostLimits::default(), ThreadKey::current());
    let supervisor_result = measure("record_jump (supervisor, exempt)", || supervisor.record_jump());

    let mut all = results;
    all.push(supervisor_result);
    for result in &all {
        result.print();
    }

    let passed_count = all.iter().filter(|r| r.passed).count();
    println!("\n=== Summary ===");
    println!("{}/{} scenarios passed", passed_count, all.len());
    if passed_count != all.len() {
        std::process::exit(1);
    }
}
