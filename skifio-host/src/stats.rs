//! Host-side statistics reporting.
//!
//! `Statistics::print` itself doesn't exist on the `no_std` type (no
//! formatting without an allocator-friendly writer); this module owns
//! the `log`-based formatting for both sides' shared counters.

use skifio_core::stats::Statistics;

/// Format and emit one statistics report at `log::Level::Info`.
pub fn report(stats: &Statistics) {
    log::info!(
        "samples={} max_intrs_per_sample={} crc_errors={} dac(lost_empty={} lost_full={} req_exceed={})",
        stats.sample_count,
        stats.max_intrs_per_sample,
        stats.crc_error_count,
        stats.dac.lost_empty,
        stats.dac.lost_full,
        stats.dac.req_exceed,
    );
    for (i, channel) in stats.adc.iter().enumerate() {
        match channel.value.avg() {
            Some(avg) => log::info!(
                "adc[{i}] lost_full={} last={} min={} max={} avg={:.3}",
                channel.lost_full,
                channel.value.last,
                channel.value.min,
                channel.value.max,
                avg,
            ),
            None => log::info!("adc[{i}] lost_full={} (no samples yet)", channel.lost_full),
        }
    }
}
