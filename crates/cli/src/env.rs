// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Environment variables the CLI reads to find the same Redis/object-store
//! backend the orchestrator and workers use. There is no daemon or API
//! layer in front of it (out of scope, §1); the CLI talks to the stores
//! directly, the same way `dalston-orchestrator`'s binary does.

use dalston_orchestrator::{EngineUnavailableBehavior, EngineUnavailablePolicy};

#[derive(Debug, Clone)]
pub struct CliEnvConfig {
    pub redis_url: String,
    pub catalog_path: String,
    pub object_store_dir: String,
    pub engine_unavailable_behavior: EngineUnavailableBehavior,
    pub engine_wait_timeout_seconds: i64,
}

impl CliEnvConfig {
    pub fn from_env() -> Self {
        Self {
            redis_url: env_or("DALSTON_REDIS_URL", "redis://127.0.0.1:6379"),
            catalog_path: env_or("DALSTON_CATALOG_PATH", "catalog.yaml"),
            object_store_dir: env_or("DALSTON_OBJECT_STORE_DIR", "./data/objects"),
            engine_unavailable_behavior: engine_unavailable_behavior("DALSTON_ENGINE_UNAVAILABLE_BEHAVIOR"),
            engine_wait_timeout_seconds: parsed_or("DALSTON_ENGINE_WAIT_TIMEOUT_SECONDS", 120),
        }
    }

    pub fn engine_unavailable_policy(&self) -> EngineUnavailablePolicy {
        EngineUnavailablePolicy {
            behavior: self.engine_unavailable_behavior,
            wait_timeout_seconds: self.engine_wait_timeout_seconds,
        }
    }
}

fn engine_unavailable_behavior(name: &'static str) -> EngineUnavailableBehavior {
    match std::env::var(name).as_deref() {
        Ok("fail_fast") => EngineUnavailableBehavior::FailFast,
        _ => EngineUnavailableBehavior::Wait,
    }
}

fn env_or(name: &'static str, default: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default.to_string())
}

fn parsed_or<T: std::str::FromStr>(name: &'static str, default: T) -> T {
    std::env::var(name).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}
