//! Post-step success conditions.
//!
//! Playbooks write conditions as compact strings:
//!
//! - `http_response:<url>` holds when a GET of `<url>` returns a 2xx status.
//! - `service_status:<service>:<expected>` holds when the service status
//!   lookup returns exactly `<expected>`.
//! - `metric_threshold:<metric>:<op>:<value>` with `op` one of `lt`, `gt`,
//!   `eq` holds when the latest metric value satisfies the comparison.
//!
//! Strings are parsed into [`SuccessCondition`] when a playbook is loaded, so
//! a malformed or unknown condition rejects the playbook instead of silently
//! passing at execution time.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Comparison used by `metric_threshold` conditions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricOp {
    Lt,
    Gt,
    Eq,
}

impl MetricOp {
    /// Apply the comparison `value <op> target`.
    pub fn holds(self, value: f64, target: f64) -> bool {
        match self {
            Self::Lt => value < target,
            Self::Gt => value > target,
            Self::Eq => (value - target).abs() < f64::EPSILON,
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            Self::Lt => "lt",
            Self::Gt => "gt",
            Self::Eq => "eq",
        }
    }
}

/// A parsed success condition attached to a recovery step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum SuccessCondition {
    /// The URL answers with a success status.
    HttpResponse { url: String },
    /// The named service reports exactly the expected status.
    ServiceStatus { service: String, expected: String },
    /// The latest value of a metric satisfies a comparison.
    MetricThreshold {
        metric: String,
        op: MetricOp,
        value: f64,
    },
}

impl FromStr for SuccessCondition {
    type Err = CoreError;

    fn from_str(expr: &str) -> Result<Self, Self::Err> {
        let invalid = |reason: &str| CoreError::InvalidCondition {
            expr: expr.to_owned(),
            reason: reason.to_owned(),
        };

        let (kind, rest) = expr
            .split_once(':')
            .ok_or_else(|| invalid("expected '<kind>:<arguments>'"))?;

        match kind {
            "http_response" => {
                if rest.is_empty() {
                    return Err(invalid("missing url"));
                }
                Ok(Self::HttpResponse {
                    url: rest.to_owned(),
                })
            }
            "service_status" => {
                let (service, expected) = rest
                    .split_once(':')
                    .ok_or_else(|| invalid("expected 'service_status:<service>:<expected>'"))?;
                if service.is_empty() || expected.is_empty() {
                    return Err(invalid("service and expected status must be non-empty"));
                }
                Ok(Self::ServiceStatus {
                    service: service.to_owned(),
                    expected: expected.to_owned(),
                })
            }
            "metric_threshold" => {
                let parts: Vec<&str> = rest.split(':').collect();
                let [metric, op, value] = parts.as_slice() else {
                    return Err(invalid(
                        "expected 'metric_threshold:<metric>:<lt|gt|eq>:<value>'",
                    ));
                };
                if metric.is_empty() {
                    return Err(invalid("metric name must be non-empty"));
                }
                let op = match *op {
                    "lt" => MetricOp::Lt,
                    "gt" => MetricOp::Gt,
                    "eq" => MetricOp::Eq,
                    _ => return Err(invalid("operator must be one of lt, gt, eq")),
                };
                let value: f64 = value
                    .parse()
                    .map_err(|_| invalid("threshold is not a number"))?;
                if !value.is_finite() {
                    return Err(invalid("threshold must be finite"));
                }
                Ok(Self::MetricThreshold {
                    metric: (*metric).to_owned(),
                    op,
                    value,
                })
            }
            _ => Err(invalid("unknown condition kind")),
        }
    }
}

impl TryFrom<String> for SuccessCondition {
    type Error = CoreError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<SuccessCondition> for String {
    fn from(value: SuccessCondition) -> Self {
        value.to_string()
    }
}

impl fmt::Display for SuccessCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::HttpResponse { url } => write!(f, "http_response:{url}"),
            Self::ServiceStatus { service, expected } => {
                write!(f, "service_status:{service}:{expected}")
            }
            Self::MetricThreshold { metric, op, value } => {
                write!(f, "metric_threshold:{metric}:{}:{value}", op.as_str())
            }
        }
    }
}
