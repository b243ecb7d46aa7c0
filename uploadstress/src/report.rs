//! Aggregation and printing of upload results.

use std::fmt;
use std::time::Duration;

use bytesize::ByteSize;
use sketches_ddsketch::DDSketch;
use yansi::Paint;

use crate::upload::UploadReport;

/// Aggregated results of all uploads in a run.
#[derive(Default)]
pub struct Summary {
    /// Number of uploads that were attempted.
    pub requests: usize,
    /// Number of uploads that received a successful (2xx) response.
    pub succeeded: usize,
    /// Number of uploads that received a non-successful response.
    pub rejected: usize,
    /// Number of uploads that did not receive a response at all.
    pub failed: usize,
    /// Total request body bytes sent, including multipart framing.
    pub bytes_sent: u64,
    /// Wall-clock duration of the whole run.
    pub duration: Duration,
    /// Upload latencies in seconds, for uploads that received a response.
    timing: DDSketch,
}

impl Summary {
    /// Adds the outcome of a single upload.
    pub fn record(&mut self, report: &UploadReport) {
        self.requests += 1;
        self.bytes_sent += report.bytes_sent;

        match &report.result {
            Ok(status) => {
                if status.is_success() {
                    self.succeeded += 1;
                } else {
                    self.rejected += 1;
                }
                self.timing.add(report.elapsed.as_secs_f64());
            }
            Err(_) => self.failed += 1,
        }
    }

    /// Counts an upload whose task did not return a report.
    pub fn record_lost(&mut self) {
        self.requests += 1;
        self.failed += 1;
    }

    /// Returns `true` if every upload received a successful response.
    pub fn is_success(&self) -> bool {
        self.succeeded == self.requests
    }

    /// Prints the summary to stdout.
    pub fn print(&self) {
        println!();
        print!(
            "{} ({} requests",
            "## UPLOADS".bold(),
            self.requests.bold()
        );
        if self.rejected > 0 {
            print!(
                ", {}",
                format!("{} REJECTED", self.rejected).bold().yellow()
            );
        }
        if self.failed > 0 {
            print!(", {}", format!("{} FAILURES", self.failed).bold().red());
        }
        println!(")");

        println!(
            "{} {} succeeded in {:.2?}",
            "OK:".bold().green(),
            self.succeeded.bold(),
            self.duration
        );

        if self.timing.count() > 0 {
            print_ops(&self.timing, self.duration);
            print_throughput(self.bytes_sent, self.duration);
            print_percentiles(&self.timing, Duration::from_secs_f64);
        }
    }
}

impl fmt::Debug for Summary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Summary")
            .field("requests", &self.requests)
            .field("succeeded", &self.succeeded)
            .field("rejected", &self.rejected)
            .field("failed", &self.failed)
            .field("bytes_sent", &self.bytes_sent)
            .field("duration", &self.duration)
            .finish_non_exhaustive()
    }
}

fn quantile(sketch: &DDSketch, q: f64) -> f64 {
    sketch.quantile(q).ok().flatten().unwrap_or_default()
}

fn print_percentiles<T: fmt::Debug>(sketch: &DDSketch, map: impl Fn(f64) -> T) {
    let ops = sketch.count();
    let avg = map(sketch.sum().unwrap_or_default() / ops as f64);
    let p50 = map(quantile(sketch, 0.5));
    let p90 = map(quantile(sketch, 0.9));
    let p99 = map(quantile(sketch, 0.99));
    println!(
        "  avg: {:.2?}; p50: {p50:.2?}; p90: {p90:.2?}; p99: {p99:.2?}",
        avg.bold()
    );
}

fn print_ops(sketch: &DDSketch, duration: Duration) {
    let ops = sketch.count();
    let ops_ps = ops as f64 / duration.as_secs_f64().max(f64::EPSILON);
    print!("  {:.2} uploads/s", ops_ps.bold());
}

fn print_throughput(total: u64, duration: Duration) {
    let throughput = (total as f64 / duration.as_secs_f64().max(f64::EPSILON)) as u64;
    println!(", {:.2}/s", ByteSize::b(throughput).bold());
}
