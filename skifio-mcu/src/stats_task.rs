//! Periodic statistics reporter.
//!
//! Mirrors `skifio-host::stats::report` for the MCU side: a standalone,
//! lowest-priority task (§5: `statistics (1)` is below every other task in
//! this workspace) that wakes every `STATS_REPORT_PERIOD_MS` and prints a
//! snapshot. It never resets anything — `StatsReset` (see
//! `rpmsg::dispatch_app_msg`) is the only thing that zeroes the counters.

use core::cell::RefCell;

use critical_section::Mutex;
use embassy_time::{Duration, Timer};

use skifio_core::constants::STATS_REPORT_PERIOD_MS;
use skifio_core::stats::Statistics;

/// Run forever, printing a snapshot of `stats` every
/// `STATS_REPORT_PERIOD_MS`. Intended as the body of a spawned
/// `embassy-executor` task, lowest priority of the set in §5.
pub async fn stats_task(stats: &Mutex<RefCell<Statistics>>) -> ! {
    loop {
        Timer::after(Duration::from_millis(STATS_REPORT_PERIOD_MS as u64)).await;
        let snapshot = critical_section::with(|cs| stats.borrow(cs).borrow().clone());
        print(&snapshot);
    }
}

/// Emit one report. A no-op unless the `defmt` feature is enabled, the
/// same way the rest of this crate only logs behind that feature.
fn print(stats: &Statistics) {
    #[cfg(feature = "defmt")]
    {
        defmt::info!(
            "samples={=u64} max_intrs_per_sample={=u32} crc_errors={=u64} \
             dac(lost_empty={=u64} lost_full={=u64} req_exceed={=u64})",
            stats.sample_count,
            stats.max_intrs_per_sample,
            stats.crc_error_count,
            stats.dac.lost_empty,
            stats.dac.lost_full,
            stats.dac.req_exceed,
        );
        for (i, channel) in stats.adc.iter().enumerate() {
            match channel.value.avg() {
                Some(avg) => defmt::info!(
                    "adc[{=usize}] lost_full={=u64} last={=i32} min={=i32} max={=i32} avg={=f64}",
                    i,
                    channel.lost_full,
                    channel.value.last,
                    channel.value.min,
                    channel.value.max,
                    avg,
                ),
                None => defmt::info!(
                    "adc[{=usize}] lost_full={=u64} (no samples yet)",
                    i,
                    channel.lost_full,
                ),
            }
        }
    }
    #[cfg(not(feature = "defmt"))]
    {
        let _ = stats;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn print_does_not_panic_on_empty_stats() {
        print(&Statistics::new());
    }

    #[test]
    fn print_does_not_panic_with_samples() {
        let mut stats = Statistics::new();
        stats.sample_count = 10;
        stats.adc[0].value.update(5);
        print(&stats);
    }
}
