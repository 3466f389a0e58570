//! Validates claims against a fixed set of deterministic credibility tiers,
//! either as a fact-checking task or a direct peer validation request.

use crate::runtime::AgentWorker;
use crate::workers::context::WorkerContext;
use async_trait::async_trait;
use serde_json::{json, Map, Value};
use std::sync::Arc;
use synapse_bus::MessageBus;
use synapse_protocol::{DataType, Envelope, LogLevel, Payload, ValidationResponse};
use synapse_tools::ToolClient;
use tracing::{debug, info};

const FAILURE_PREFIX: &str = "fact_check_failed";

const CLAIM_INDICATORS: &[&str] = &[
    "quantum",
    "encryption",
    "algorithm",
    "nist",
    "research shows",
    "studies indicate",
    "according to",
    "demonstrated that",
];

pub struct FactCheckWorker {
    ctx: WorkerContext,
}

/// Outcome of validating a single claim.
struct Validation {
    is_valid: bool,
    confidence: f64,
    evidence: &'static str,
}

impl FactCheckWorker {
    pub fn new(bus: Arc<dyn MessageBus>, tools: Arc<ToolClient>) -> Self {
        Self {
            ctx: WorkerContext::new("fact_checker_agent", bus, tools),
        }
    }

    /// Extracts candidate factual claims from free text: sentences over 20
    /// characters that mention one of a fixed set of claim indicators,
    /// capped at the first 5.
    fn extract_claims_from_content(content: &str) -> Vec<String> {
        content
            .split(". ")
            .map(str::trim)
            .filter(|sentence| sentence.len() > 20)
            .filter(|sentence| {
                let lower = sentence.to_lowercase();
                CLAIM_INDICATORS.iter().any(|indicator| lower.contains(indicator))
            })
            .take(5)
            .map(str::to_string)
            .collect()
    }

    /// Deterministic, table-driven validation tiers. No real NLP or model
    /// call is involved; this mirrors a fixed credibility-scoring rubric.
    fn validate_claim(claim: &str) -> Validation {
        let lower = claim.to_lowercase();

        let crypto_terms = ["quantum", "encryption", "cryptography"];
        if crypto_terms.iter().any(|t| lower.contains(t)) {
            return if lower.contains("break") || lower.contains("obsolete") {
                Validation {
                    is_valid: true,
                    confidence: 0.85,
                    evidence: "Supported by multiple cryptographic research papers",
                }
            } else if lower.contains("nist") || lower.contains("standard") {
                Validation {
                    is_valid: true,
                    confidence: 0.92,
                    evidence: "Confirmed by NIST standardization process",
                }
            } else {
                Validation {
                    is_valid: true,
                    confidence: 0.75,
                    evidence: "Generally supported by current research",
                }
            };
        }

        let tech_terms = ["algorithm", "computer", "technology"];
        if tech_terms.iter().any(|t| lower.contains(t)) {
            return Validation {
                is_valid: true,
                confidence: 0.80,
                evidence: "Consistent with current technological understanding",
            };
        }

        Validation {
            is_valid: true,
            confidence: 0.65,
            evidence: "Claim appears plausible but requires further verification",
        }
    }

    async fn handle_validation_request(&self, sender_id: &str, claim: &str) {
        info!(sender_id, claim, "validation request received");
        let result = Self::validate_claim(claim);

        let response = ValidationResponse::new(result.is_valid, result.confidence)
            .with_evidence(result.evidence)
            .with_source(self.ctx.agent_id().to_string());
        self.ctx.send_direct(sender_id, response).await;

        info!(sender_id, claim, is_valid = result.is_valid, confidence = result.confidence, "validation response sent");
    }

    async fn perform_fact_check(&self, task_data: Map<String, Value>) {
        let task_id = task_data.get("task_id").and_then(Value::as_str).map(str::to_string);
        let source_content = task_data.get("source_content").and_then(Value::as_str).unwrap_or("").to_string();

        let mut claims: Vec<String> = task_data
            .get("claims")
            .and_then(Value::as_array)
            .map(|arr| arr.iter().filter_map(Value::as_str).map(str::to_string).collect())
            .unwrap_or_default();

        if claims.is_empty() {
            claims = Self::extract_claims_from_content(&source_content);
        }

        let total_claims = claims.len();
        info!(total_claims, "fact-checking claims");

        self.ctx.send_status("fact_checking_started", Some(10.0), task_id.clone()).await;

        let mut validation_results = Vec::with_capacity(total_claims);
        for (i, claim) in claims.iter().enumerate() {
            debug!(claim_index = i + 1, total_claims, claim, "validating claim");
            let result = Self::validate_claim(claim);

            validation_results.push(json!({
                "claim": claim,
                "is_valid": result.is_valid,
                "confidence": result.confidence,
                "evidence": result.evidence,
                "claim_index": i + 1,
            }));

            if total_claims > 0 {
                let progress = 10.0 + (80.0 * (i + 1) as f64 / total_claims as f64);
                self.ctx
                    .send_status(format!("validated_claim_{}", i + 1), Some(progress), task_id.clone())
                    .await;
            }
        }

        let valid_claims = validation_results
            .iter()
            .filter(|r| r.get("is_valid").and_then(Value::as_bool).unwrap_or(false))
            .count();
        let overall_confidence = if validation_results.is_empty() {
            0.0
        } else {
            validation_results
                .iter()
                .filter_map(|r| r.get("confidence").and_then(Value::as_f64))
                .sum::<f64>()
                / validation_results.len() as f64
        };

        info!(valid_claims, total_claims, "fact-checking complete");
        self.ctx.send_status("fact_checking_complete", Some(100.0), task_id.clone()).await;

        let data = json!({
            "claims_processed": validation_results,
            "summary": {
                "total_claims": total_claims,
                "valid_claims": valid_claims,
                "overall_confidence": overall_confidence,
                "claims_validated": total_claims,
            },
            "source_content_length": source_content.len(),
        });
        self.ctx.submit_data(DataType::FactCheckResults, data, "fact_checker", task_id).await;

        self.ctx
            .log(
                LogLevel::Info,
                format!("Fact-checking completed: {valid_claims}/{total_claims} claims validated (confidence: {overall_confidence:.2})"),
            )
            .await;
    }
}

#[async_trait]
impl AgentWorker for FactCheckWorker {
    fn agent_id(&self) -> &str {
        self.ctx.agent_id()
    }

    async fn handle(&self, envelope: Envelope) {
        let sender_id = envelope.sender_id().to_string();
        match envelope.payload() {
            Payload::TaskAssign(task) if task.task_type == "fact_check" => {
                self.perform_fact_check(task.task_data.clone()).await;
            }
            Payload::ValidationRequest(request) => {
                self.handle_validation_request(&sender_id, &request.claim).await;
            }
            _ => {}
        }
    }
}
