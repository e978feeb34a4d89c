use crate::process_batch::ProcessBatchUseCase;
use crate::shared::usecase::execute;
use actix_web::rt::time::interval;
use smart_notifier_domain::Channel;
use smart_notifier_infra::Context;
use std::time::Duration;
use tracing::{error, info};

/// Fixed-interval driver of the delivery pipeline. Each tick reads the
/// authoritative time from the job store, runs one batch cycle and, on a
/// coarser interval, logs aggregate metrics. A failing cycle is logged
/// and the loop keeps polling.
pub fn start_notification_worker(ctx: Context) {
    actix_web::rt::spawn(async move {
        let mut poll_interval = interval(Duration::from_millis(ctx.config.poll_interval_millis));
        let mut last_metrics_at: i64 = 0;
        loop {
            poll_interval.tick().await;

            let now = match ctx.repos.jobs.db_now().await {
                Ok(now) => now,
                Err(e) => {
                    error!("Unable to read job store time, skipping cycle. Error: {:?}", e);
                    continue;
                }
            };

            let usecase = ProcessBatchUseCase { now };
            let stats = match execute(usecase, &ctx).await {
                Ok(stats) => stats,
                // Already logged by the usecase executor
                Err(_) => continue,
            };

            if now - last_metrics_at > ctx.config.metrics_interval_millis {
                let queue_depth = ctx
                    .repos
                    .jobs
                    .count_pending(Channel::Push)
                    .await
                    .unwrap_or(0);
                info!(
                    claimed = stats.claimed,
                    sent = stats.sent,
                    failed = stats.failed,
                    skipped = stats.skipped,
                    rescheduled = stats.rescheduled,
                    queue_depth = queue_depth,
                    max_lag_secs = stats.max_lag_secs,
                    "Notification worker cycle metrics"
                );
                last_metrics_at = now;
            }
        }
    });
}
