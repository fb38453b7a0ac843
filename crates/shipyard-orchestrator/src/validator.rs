use crate::extract::{extract_all, extract_tag};
use crate::prompts;
use serde::{Deserialize, Serialize};
use shipyard_core::{ShipyardError, ShipyardResult};
use shipyard_engine::ExecutionEngine;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Verdict on whether a design is ready to be planned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub accept: bool,
    /// What the design is missing. Empty when accepted.
    pub gaps: Vec<String>,
    /// Generated PROJECT.md when accepted.
    pub project_md: Option<String>,
}

impl ValidationReport {
    pub fn parse(text: &str) -> ShipyardResult<Self> {
        let decision = extract_tag(text, "decision")
            .ok_or_else(|| ShipyardError::Orchestrator("validation answer has no decision".into()))?;
        let accept = match decision.to_lowercase().as_str() {
            "accept" => true,
            "reject" => false,
            other => {
                return Err(ShipyardError::Orchestrator(format!(
                    "unknown validation decision: {other}"
                )))
            }
        };
        let gaps = extract_tag(text, "gaps")
            .map(|g| extract_all(&g, "gap"))
            .unwrap_or_default();
        let project_md = extract_tag(text, "project").filter(|p| !p.is_empty());

        Ok(Self {
            accept,
            gaps,
            project_md,
        })
    }
}

/// Asks the engine whether a design is specific enough to plan from.
pub struct Validator {
    engine: Arc<dyn ExecutionEngine>,
    timeout: Duration,
}

impl Validator {
    pub fn new(engine: Arc<dyn ExecutionEngine>, timeout: Duration) -> Self {
        Self { engine, timeout }
    }

    pub async fn validate(&self, design: &str) -> ShipyardResult<ValidationReport> {
        if design.trim().is_empty() {
            return Err(ShipyardError::Config("design is empty".into()));
        }
        let answer = self
            .engine
            .execute(&prompts::validate_prompt(design), self.timeout)
            .await?;
        let report = ValidationReport::parse(&answer)?;
        info!(accept = report.accept, gaps = report.gaps.len(), "design validated");
        Ok(report)
    }
}
