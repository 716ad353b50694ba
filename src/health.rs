use crate::state::AppState;
use actix_web::{web, HttpResponse};
use serde_json::json;
use std::process;

pub async fn health_check(state: web::Data<AppState>) -> HttpResponse {
    let metrics = state.get_metrics_snapshot();
    let config = state.get_config();
    let uptime_seconds = state.get_uptime_seconds();
    let predictor = &state.predictor;

    HttpResponse::Ok().json(json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "uptime_seconds": uptime_seconds,
        "service": {
            "name": "sign-recognition-backend",
            "version": env!("CARGO_PKG_VERSION"),
            "host": config.server.host,
            "port": config.server.port
        },
        "metrics": {
            "total_requests": metrics.request_count,
            "total_errors": metrics.error_count,
            "error_rate": if metrics.request_count > 0 {
                metrics.error_count as f64 / metrics.request_count as f64
            } else {
                0.0
            },
            "active_sessions": state.sessions.active_session_count()
        },
        "memory": get_memory_info(),
        "model": {
            "path": config.models.model_path,
            "backend": predictor.engine().backend_name(),
            "status": "loaded",
            "vocabulary_size": predictor.vocabulary().len(),
            "rows_per_frame": predictor.schema().rows_per_frame()
        },
        "system": get_system_status(&state)
    }))
}

pub async fn detailed_metrics(state: web::Data<AppState>) -> HttpResponse {
    let metrics = state.get_metrics_snapshot();
    let uptime_seconds = state.get_uptime_seconds();
    let config = state.get_config();

    let mut endpoint_stats = Vec::new();
    for (endpoint, metric) in metrics.endpoint_metrics.iter() {
        endpoint_stats.push(json!({
            "endpoint": endpoint,
            "request_count": metric.request_count,
            "error_count": metric.error_count,
            "error_rate": metric.error_rate(),
            "average_duration_ms": metric.average_duration_ms(),
            "total_duration_ms": metric.total_duration_ms
        }));
    }

    HttpResponse::Ok().json(json!({
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "uptime_seconds": uptime_seconds,
        "overall": {
            "total_requests": metrics.request_count,
            "total_errors": metrics.error_count,
            "error_rate": if metrics.request_count > 0 {
                metrics.error_count as f64 / metrics.request_count as f64
            } else {
                0.0
            },
            "requests_per_second": if uptime_seconds > 0 {
                metrics.request_count as f64 / uptime_seconds as f64
            } else {
                0.0
            }
        },
        "predictions": {
            "frames_received": metrics.frames_received,
            "predictions_served": metrics.predictions_served,
            "no_frames": metrics.no_frames_outcomes,
            "no_confident_prediction": metrics.no_confident_outcomes,
            "buffered_frames": state.sessions.total_buffered_frames()
        },
        "inference": state.predictor.engine().performance_stats(),
        "endpoints": endpoint_stats,
        "memory": get_memory_info(),
        "performance": {
            "active_sessions": state.sessions.active_session_count(),
            "active_session_ids": state.sessions.get_active_session_ids(),
            "max_concurrent_sessions": config.performance.max_concurrent_sessions,
            "top_k": config.performance.top_k
        }
    }))
}

fn get_memory_info() -> serde_json::Value {
    #[cfg(target_os = "linux")]
    {
        let pid = process::id();
        if let Ok(status) = std::fs::read_to_string(format!("/proc/{}/status", pid)) {
            let mut vm_rss = 0;
            let mut vm_size = 0;

            for line in status.lines() {
                if line.starts_with("VmRSS:") {
                    if let Some(kb_str) = line.split_whitespace().nth(1) {
                        vm_rss = kb_str.parse::<u64>().unwrap_or(0) * 1024;
                    }
                } else if line.starts_with("VmSize:") {
                    if let Some(kb_str) = line.split_whitespace().nth(1) {
                        vm_size = kb_str.parse::<u64>().unwrap_or(0) * 1024;
                    }
                }
            }

            return json!({
                "resident_memory_bytes": vm_rss,
                "virtual_memory_bytes": vm_size,
                "available": true
            });
        }
    }

    json!({
        "resident_memory_bytes": 0,
        "virtual_memory_bytes": 0,
        "available": false,
        "pid": process::id()
    })
}

fn get_system_status(state: &AppState) -> serde_json::Value {
    let max_sessions = state.sessions.max_concurrent_sessions();
    let current_sessions = state.sessions.active_session_count();
    let session_usage = if max_sessions > 0 {
        current_sessions as f64 / max_sessions as f64
    } else {
        0.0
    };

    let status = if session_usage > 0.9 {
        "high_load"
    } else if session_usage > 0.7 {
        "moderate_load"
    } else {
        "normal"
    };

    json!({
        "status": status,
        "session_usage_percent": (session_usage * 100.0).round(),
        "max_sessions": max_sessions,
        "current_sessions": current_sessions,
        "load_warnings": if session_usage > 0.8 {
            vec!["High session usage - consider increasing max_concurrent_sessions"]
        } else {
            vec![]
        }
    })
}
