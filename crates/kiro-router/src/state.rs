//! Shared axum state: the request engine plus the ambient bits every
//! handler needs (history budget, the known-model list for `GET
//! /v1/models`).

use kiro_adapters::HistoryBudget;
use kiro_engine::RequestEngine;

pub struct RouterState {
    pub engine: RequestEngine,
    pub history_budget: HistoryBudget,
}

impl RouterState {
    pub fn new(engine: RequestEngine, history_budget: HistoryBudget) -> Self {
        Self { engine, history_budget }
    }
}
