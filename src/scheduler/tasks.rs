use std::fmt::Debug;
use std::hash::Hash;
use std::sync::Arc;

use anyhow::Result;
use tracing::info;

use crate::config::SessionsConfig;
use crate::scheduler::Scheduler;
use crate::session::SessionRegistry;

/// Heartbeat: log that the bot is alive every hour
pub async fn register_heartbeat(scheduler: &Scheduler) -> Result<()> {
    scheduler
        .add_cron_job("0 0 * * * *", "heartbeat", || {
            Box::pin(async {
                info!("Heartbeat: bot is alive");
            })
        })
        .await
}

/// Periodically drop sessions nobody has touched for a while
pub async fn register_session_sweep<K>(
    scheduler: &Scheduler,
    sessions: Arc<SessionRegistry<K>>,
    config: &SessionsConfig,
) -> Result<()>
where
    K: Eq + Hash + Debug + Send + Sync + 'static,
{
    let max_idle = config.idle_timeout();

    scheduler
        .add_cron_job(&config.sweep_cron, "session-sweep", move || {
            let sessions = Arc::clone(&sessions);
            Box::pin(async move {
                let swept = sessions.sweep_idle(chrono::Utc::now(), max_idle).await;
                if swept > 0 {
                    info!(
                        "Swept {} idle session(s), {} still active",
                        swept,
                        sessions.len().await
                    );
                }
            })
        })
        .await
}
