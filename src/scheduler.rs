use anyhow::Result;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{error, info, warn};

use crate::config::Settings;
use crate::service::Trigger;

pub const PERIODIC_SYNC: &str = "periodicSync";
pub const HEALTH_CHECK: &str = "healthCheck";

/// 命名的周期性闹钟
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Alarm {
    pub name: &'static str,
    pub period: Duration,
    /// 首次触发前的延迟；None 表示第一次在一个周期后触发
    pub first_delay: Option<Duration>,
    pub trigger: Trigger,
}

pub fn alarms_from_settings(settings: &Settings) -> Vec<Alarm> {
    vec![
        Alarm {
            name: PERIODIC_SYNC,
            period: minutes(settings.sync_interval_minutes),
            first_delay: None,
            trigger: Trigger::Sync,
        },
        Alarm {
            name: HEALTH_CHECK,
            period: minutes(settings.health_check_interval_minutes),
            first_delay: Some(minutes(settings.health_check_delay_minutes)),
            trigger: Trigger::HealthCheck,
        },
    ]
}

fn minutes(value: u64) -> Duration {
    Duration::from_secs(value.saturating_mul(60))
}

/// 注册所有闹钟并启动调度器；触发时只向 `target` 投递 Trigger
pub async fn start_alarms(alarms: Vec<Alarm>, target: mpsc::Sender<Trigger>) -> Result<JobScheduler> {
    let scheduler = JobScheduler::new().await?;

    for alarm in alarms {
        info!(
            "⏰ Alarm '{}' every {:?} (first after {:?})",
            alarm.name,
            alarm.period,
            alarm.first_delay.unwrap_or(alarm.period)
        );
        let job = match alarm.first_delay {
            None => repeated_job(&alarm, target.clone())?,
            Some(delay) => delayed_job(alarm, delay, target.clone())?,
        };
        scheduler.add(job).await?;
    }

    scheduler.start().await?;
    Ok(scheduler)
}

fn repeated_job(alarm: &Alarm, target: mpsc::Sender<Trigger>) -> Result<Job> {
    let name = alarm.name;
    let trigger = alarm.trigger;
    let job = Job::new_repeated_async(alarm.period, move |_uuid, _l| {
        let target = target.clone();
        Box::pin(async move {
            fire(name, trigger, &target).await;
        })
    })?;
    Ok(job)
}

/// 延迟到期时先触发一次，再注册周期任务
fn delayed_job(alarm: Alarm, delay: Duration, target: mpsc::Sender<Trigger>) -> Result<Job> {
    let job = Job::new_one_shot_async(delay, move |_uuid, scheduler| {
        let target = target.clone();
        let alarm = alarm.clone();
        Box::pin(async move {
            fire(alarm.name, alarm.trigger, &target).await;
            match repeated_job(&alarm, target) {
                Ok(job) => {
                    if let Err(e) = scheduler.add(job).await {
                        error!("❌ Failed to schedule alarm '{}': {}", alarm.name, e);
                    }
                }
                Err(e) => error!("❌ Failed to create alarm '{}': {}", alarm.name, e),
            }
        })
    })?;
    Ok(job)
}

async fn fire(name: &str, trigger: Trigger, target: &mpsc::Sender<Trigger>) {
    info!("🔄 Alarm '{}' fired", name);
    if target.send(trigger).await.is_err() {
        warn!("⚠️  Alarm '{}' fired after dispatcher stopped", name);
    }
}
