//! Production cost estimator shared by every agent

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::tools::{ToolHandler, json_schema};

/// Tool name as advertised to the model
pub const ESTIMATE_COST_TOOL: &str = "estimate_cost";

/// Result of a cost estimate
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CostEstimate {
    pub units: u64,
    pub cost_per_unit: f64,
    pub total_cost: f64,
}

/// Estimate the total cost of producing `units` items at `cost_per_unit` each.
pub fn estimate_cost(units: u64, cost_per_unit: f64) -> CostEstimate {
    CostEstimate {
        units,
        cost_per_unit,
        total_cost: units as f64 * cost_per_unit,
    }
}

pub struct EstimateCostTool;

impl EstimateCostTool {
    fn parse_units(input: &Value) -> Result<u64> {
        let raw = input
            .get("units")
            .ok_or_else(|| anyhow!("Missing 'units' parameter"))?;

        if let Some(units) = raw.as_u64() {
            return Ok(units);
        }

        // Models sometimes send integral counts as floats (e.g. 100.0)
        match raw.as_f64() {
            Some(f) if f.is_finite() && f >= 0.0 && f.fract() == 0.0 && f <= u64::MAX as f64 => {
                Ok(f as u64)
            }
            Some(f) if f < 0.0 => Err(anyhow!("'units' must be non-negative, got {}", f)),
            _ => Err(anyhow!("'units' must be a non-negative integer, got {}", raw)),
        }
    }

    fn parse_cost_per_unit(input: &Value) -> Result<f64> {
        let raw = input
            .get("cost_per_unit")
            .ok_or_else(|| anyhow!("Missing 'cost_per_unit' parameter"))?;

        match raw.as_f64() {
            Some(cost) if cost.is_finite() => Ok(cost),
            _ => Err(anyhow!("'cost_per_unit' must be a finite number, got {}", raw)),
        }
    }
}

#[async_trait]
impl ToolHandler for EstimateCostTool {
    fn name(&self) -> &str {
        ESTIMATE_COST_TOOL
    }

    fn description(&self) -> &str {
        "Estimate the total cost of producing a number of units. Returns the unit count, \
         the cost per unit, and total_cost = units * cost_per_unit."
    }

    fn input_schema(&self) -> Value {
        json_schema(
            serde_json::json!({
                "units": {
                    "type": "integer",
                    "minimum": 0,
                    "description": "Number of items to produce"
                },
                "cost_per_unit": {
                    "type": "number",
                    "description": "Cost of making one item"
                }
            }),
            vec!["units", "cost_per_unit"],
        )
    }

    async fn execute(&self, input: Value) -> Result<String> {
        let units = Self::parse_units(&input)?;
        let cost_per_unit = Self::parse_cost_per_unit(&input)?;

        let estimate = estimate_cost(units, cost_per_unit);
        debug!(
            "Estimated cost: {} units x {} = {}",
            estimate.units, estimate.cost_per_unit, estimate.total_cost
        );

        Ok(serde_json::to_string(&estimate)?)
    }
}
