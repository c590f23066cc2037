//! 运行状态
//!
//! 同步与健康检查各自的单飞守卫，以及健康检查的阶段和进度。
//! 所有状态都放在 `SyncState` 里，通过 `Arc` 传给需要它的任务。

use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

/// 单飞守卫：同一时刻最多一个运行
#[derive(Debug)]
pub struct RunGuard {
    name: &'static str,
    running: AtomicBool,
}

impl RunGuard {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            running: AtomicBool::new(false),
        }
    }

    /// 尝试进入运行状态，已在运行时返回 None
    pub fn try_begin(&self) -> Option<RunTicket<'_>> {
        self.running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| RunTicket { guard: self })
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

/// 持有期间守卫保持为运行中，drop 时复位 (包括出错和 panic 的路径)
#[derive(Debug)]
pub struct RunTicket<'a> {
    guard: &'a RunGuard,
}

impl Drop for RunTicket<'_> {
    fn drop(&mut self) {
        self.guard.running.store(false, Ordering::Release);
    }
}

/// 一次触发的结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome<T> {
    Completed(T),
    /// 已有同类运行在进行，本次触发被忽略
    Skipped,
}

impl<T> RunOutcome<T> {
    pub fn is_skipped(&self) -> bool {
        matches!(self, RunOutcome::Skipped)
    }

    pub fn completed(self) -> Option<T> {
        match self {
            RunOutcome::Completed(value) => Some(value),
            RunOutcome::Skipped => None,
        }
    }
}

/// 健康检查状态机: Idle → Running → Idle，或 Running → Failed → Idle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthPhase {
    Idle,
    Running,
    Failed,
}

/// 最近一次健康检查的结论
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthRunStatus {
    Idle,
    Processing,
    Completed,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct HealthReport {
    pub status: HealthRunStatus,
    pub progress: u8,
}

#[derive(Debug)]
struct HealthTracker {
    phase: HealthPhase,
    last: HealthRunStatus,
    progress: u8,
}

/// 进程级运行状态
#[derive(Debug)]
pub struct SyncState {
    pub sync: RunGuard,
    pub health: RunGuard,
    tracker: Mutex<HealthTracker>,
}

impl Default for SyncState {
    fn default() -> Self {
        Self::new()
    }
}

impl SyncState {
    pub fn new() -> Self {
        Self {
            sync: RunGuard::new("sync"),
            health: RunGuard::new("health check"),
            tracker: Mutex::new(HealthTracker {
                phase: HealthPhase::Idle,
                last: HealthRunStatus::Idle,
                progress: 0,
            }),
        }
    }

    fn with_tracker<R>(&self, f: impl FnOnce(&mut HealthTracker) -> R) -> R {
        let mut tracker = self.tracker.lock().unwrap_or_else(|e| e.into_inner());
        f(&mut tracker)
    }

    pub fn health_phase(&self) -> HealthPhase {
        self.with_tracker(|t| t.phase)
    }

    pub(crate) fn health_started(&self) {
        self.with_tracker(|t| {
            t.phase = HealthPhase::Running;
            t.last = HealthRunStatus::Processing;
            t.progress = 0;
        });
    }

    pub(crate) fn health_progress(&self, progress: u8) {
        self.with_tracker(|t| t.progress = progress);
    }

    pub(crate) fn health_finished(&self) {
        self.with_tracker(|t| {
            t.phase = HealthPhase::Idle;
            t.last = HealthRunStatus::Completed;
            t.progress = 100;
        });
    }

    /// Running → Failed → Idle，失败结论保留给状态查询
    pub(crate) fn health_failed(&self) {
        self.with_tracker(|t| {
            t.phase = HealthPhase::Failed;
            t.last = HealthRunStatus::Error;
        });
        self.with_tracker(|t| t.phase = HealthPhase::Idle);
    }

    pub fn health_report(&self) -> HealthReport {
        self.with_tracker(|t| HealthReport {
            status: t.last,
            progress: t.progress,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_guard_rejects_second_entry() {
        let guard = RunGuard::new("sync");
        let ticket = guard.try_begin();
        assert!(ticket.is_some());
        assert!(guard.is_running());
        assert!(guard.try_begin().is_none());
        drop(ticket);
        assert!(!guard.is_running());
        assert!(guard.try_begin().is_some());
    }

    #[test]
    fn test_health_transitions() {
        let state = SyncState::new();
        assert_eq!(state.health_report().status, HealthRunStatus::Idle);

        state.health_started();
        state.health_progress(40);
        assert_eq!(state.health_phase(), HealthPhase::Running);
        assert_eq!(
            state.health_report(),
            HealthReport {
                status: HealthRunStatus::Processing,
                progress: 40
            }
        );

        state.health_failed();
        assert_eq!(state.health_phase(), HealthPhase::Idle);
        assert_eq!(state.health_report().status, HealthRunStatus::Error);

        state.health_started();
        state.health_finished();
        assert_eq!(state.health_phase(), HealthPhase::Idle);
        assert_eq!(state.health_report().progress, 100);
    }
}
