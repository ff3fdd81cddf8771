use crate::db::connection::DbPool;
use crate::db::models::PollStatus;
use crate::db::repositories::poll_repository;
use crate::sse::{SseEvent, SseSender};
use chrono::Utc;
use tokio::time::{Duration, interval};

/// Background sweeper that keeps poll statuses in step with their time
/// windows: PENDING polls open when their start passes, ACTIVE polls end
/// when their end passes. Explicit cancel/end wins any race because each
/// UPDATE is guarded by the current status.
pub fn spawn_status_sweeper(db: DbPool, sse_tx: SseSender) {
    tokio::spawn(async move {
        let mut ticker = interval(Duration::from_secs(30));
        loop {
            ticker.tick().await;
            match poll_repository::sweep_statuses(&db, Utc::now()).await {
                Ok((activated, ended)) => {
                    for poll_id in activated {
                        info!("poll {poll_id} is now active");
                        let _ = sse_tx.send(SseEvent::StatusChanged {
                            poll_id,
                            status: PollStatus::Active,
                        });
                    }
                    for poll_id in ended {
                        info!("poll {poll_id} has ended");
                        let _ = sse_tx.send(SseEvent::StatusChanged {
                            poll_id,
                            status: PollStatus::Ended,
                        });
                    }
                }
                Err(e) => {
                    error!("status sweep failed: {e}");
                }
            }
        }
    });
}
