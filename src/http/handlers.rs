//! Operational endpoints.

use axum::extract::State;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use sysinfo::{ProcessRefreshKind, ProcessesToUpdate, System};

use crate::db::PoolStats;
use crate::http::response;
use crate::http::server::AppState;

#[derive(Debug, Serialize)]
pub struct HealthStatus {
    pub status: &'static str,
    pub system_info: SystemInfo,
}

#[derive(Debug, Serialize)]
pub struct SystemInfo {
    pub environment: String,
    pub version: &'static str,
}

pub async fn healthcheck(State(app): State<AppState>) -> Json<HealthStatus> {
    Json(HealthStatus {
        status: "available",
        system_info: SystemInfo {
            environment: app.config().server.env.to_string(),
            version: crate::VERSION,
        },
    })
}

/// Runtime counters exposed at `/debug/vars`.
#[derive(Debug, Serialize)]
pub struct DebugVars {
    pub version: &'static str,
    pub build_time: &'static str,
    pub tasks: TaskStats,
    pub requests_in_flight: usize,
    pub database: PoolStats,
    pub memory: MemoryStats,
    pub rate_limiter: LimiterStats,
    pub shutdown_state: &'static str,
    pub timestamp: i64,
}

#[derive(Debug, Serialize)]
pub struct TaskStats {
    /// Tasks alive on the runtime, the analogue of a goroutine count.
    pub alive: usize,
    pub workers: usize,
    pub background_outstanding: usize,
}

#[derive(Debug, Serialize)]
pub struct LimiterStats {
    pub enabled: bool,
    pub tracked_clients: usize,
}

#[derive(Debug, Default, Serialize)]
pub struct MemoryStats {
    /// Resident set size of this process in bytes.
    pub process_resident: u64,
    pub process_virtual: u64,
    pub system_total: u64,
    pub system_used: u64,
}

impl MemoryStats {
    /// Blocking: reads system memory and this process's entry only.
    pub fn sample() -> Self {
        let mut system = System::new();
        system.refresh_memory();
        let mut stats = MemoryStats {
            system_total: system.total_memory(),
            system_used: system.used_memory(),
            ..MemoryStats::default()
        };

        let Ok(pid) = sysinfo::get_current_pid() else {
            return stats;
        };
        system.refresh_processes_specifics(
            ProcessesToUpdate::Some(&[pid]),
            false,
            ProcessRefreshKind::new().with_memory(),
        );
        if let Some(process) = system.process(pid) {
            stats.process_resident = process.memory();
            stats.process_virtual = process.virtual_memory();
        }
        stats
    }
}

pub async fn debug_vars(State(app): State<AppState>) -> Response {
    let memory = match tokio::task::spawn_blocking(MemoryStats::sample).await {
        Ok(memory) => memory,
        Err(e) => {
            tracing::error!(error = %e, "Failed to sample memory statistics");
            return response::server_error();
        }
    };

    let runtime = tokio::runtime::Handle::current().metrics();

    Json(DebugVars {
        version: crate::VERSION,
        build_time: crate::BUILD_TIME,
        tasks: TaskStats {
            alive: runtime.num_alive_tasks(),
            workers: runtime.num_workers(),
            background_outstanding: app.tasks().outstanding(),
        },
        requests_in_flight: app.requests_in_flight(),
        database: PoolStats::sample(app.db(), &app.config().database),
        memory,
        rate_limiter: LimiterStats {
            enabled: app.limiter().is_enabled(),
            tracked_clients: app.limiter().tracked_clients(),
        },
        shutdown_state: app.shutdown().state().as_str(),
        timestamp: chrono::Utc::now().timestamp(),
    })
    .into_response()
}

pub async fn not_found() -> Response {
    response::not_found()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_sample_covers_only_this_process() {
        let stats = MemoryStats::sample();
        assert!(stats.system_total > 0);
        assert!(stats.system_used <= stats.system_total);
        assert!(stats.process_resident > 0);
        assert!(stats.process_virtual >= stats.process_resident);
    }
}
