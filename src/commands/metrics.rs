//! `metrics` - live metrics cards.

use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;

use super::Services;
use crate::metrics::{format_size, MetricsHistory, MetricsSnapshot, MetricsStream};

const SPARK: [char; 8] = ['▁', '▂', '▃', '▄', '▅', '▆', '▇', '█'];

/// Print one line per snapshot until Ctrl-C.
pub async fn run(services: &Services, reconnect_delay: Duration) -> Result<()> {
    let (stream, mut updates) = MetricsStream::connect_with_delay(Arc::clone(&services.connector), reconnect_delay);
    let mut history = MetricsHistory::default();
    let mut stdout = std::io::stdout();

    loop {
        tokio::select! {
            update = updates.recv() => {
                let Some(update) = update else { break };
                history.record(&update.snapshot);
                if update.snapshot.is_metrics_suspended {
                    writeln!(
                        stdout,
                        "\x1b[31mServer request processing has been suspended, please check whether there is enough disk space.\x1b[0m"
                    )?;
                }
                writeln!(stdout, "{}", render(&update.snapshot, &history))?;
                stdout.flush()?;
            }
            _ = tokio::signal::ctrl_c() => {
                log::info!("[Console] Interrupted");
                break;
            }
        }
    }

    stream.close();
    Ok(())
}

/// One status line for a snapshot.
pub fn render(snapshot: &MetricsSnapshot, history: &MetricsHistory) -> String {
    format!(
        "qps {:>8.1} {}  hit {:>5.1}%  cache {} ({})  avg {:.1} ms  blocked {}  total {}",
        snapshot.qps,
        sparkline(history),
        snapshot.cache_hit_rate,
        snapshot.cache_number,
        format_size(snapshot.cache_memory_size),
        snapshot.avg_query_time,
        snapshot.block_query_count,
        snapshot.total_query_count,
    )
}

/// Sparkline of the QPS window, scaled to its peak.
pub fn sparkline(history: &MetricsHistory) -> String {
    let peak = history.peak();
    history
        .samples()
        .map(|qps| {
            if peak <= 0.0 {
                return SPARK[0];
            }
            let level = ((qps / peak) * (SPARK.len() - 1) as f64).round() as usize;
            SPARK[level.min(SPARK.len() - 1)]
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sparkline_scales_to_peak() {
        let mut history = MetricsHistory::new(3);
        for qps in [0.0, 5.0, 10.0] {
            history.record(&MetricsSnapshot {
                qps,
                ..MetricsSnapshot::default()
            });
        }
        assert_eq!(sparkline(&history), "▁▅█");
    }

    #[test]
    fn render_includes_cache_size() {
        let snapshot = MetricsSnapshot {
            cache_memory_size: 2048,
            ..MetricsSnapshot::default()
        };
        assert!(render(&snapshot, &MetricsHistory::default()).contains("(2.00KB)"));
    }
}
