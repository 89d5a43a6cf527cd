//! Workload generation for simulations.
//!
//! Produces the single-shot calls a run dispatches. Every call carries the
//! payload its response must contain, so the runner can detect responses
//! delivered to the wrong request.

use serde_json::{json, Value};

/// A call to dispatch and the response it must resolve to.
#[derive(Debug, Clone, PartialEq)]
pub struct PlannedCall {
    pub function: &'static str,
    pub params: Value,
    pub expected: Value,
}

/// Trait for generating call workloads.
pub trait WorkloadGenerator {
    /// Generate the call with sequence number `seq`.
    fn generate_one(&mut self, seq: usize, rng: &mut impl rand::Rng) -> PlannedCall;

    /// Generate `count` calls.
    fn generate_batch(&mut self, count: usize, rng: &mut impl rand::Rng) -> Vec<PlannedCall> {
        (0..count).map(|seq| self.generate_one(seq, rng)).collect()
    }
}

/// Mix of echo and hashing calls.
#[derive(Debug, Clone)]
pub struct MixedWorkload {
    /// Ratio of `crypto.blake3` calls (vs `utils.echo`).
    hash_ratio: f64,
}

impl MixedWorkload {
    /// Create a mixed workload.
    pub fn new(hash_ratio: f64) -> Self {
        Self {
            hash_ratio: hash_ratio.clamp(0.0, 1.0),
        }
    }

    fn echo(seq: usize, rng: &mut impl rand::Rng) -> PlannedCall {
        let params = json!({ "seq": seq, "nonce": rng.gen::<u32>() });
        PlannedCall {
            function: "utils.echo",
            expected: params.clone(),
            params,
        }
    }

    fn hash(seq: usize, rng: &mut impl rand::Rng) -> PlannedCall {
        let data = format!("payload-{}-{:08x}", seq, rng.gen::<u32>());
        let expected = expected_hash(&data);
        PlannedCall {
            function: "crypto.blake3",
            params: json!({ "data": data }),
            expected,
        }
    }
}

impl Default for MixedWorkload {
    fn default() -> Self {
        Self::new(0.5)
    }
}

impl WorkloadGenerator for MixedWorkload {
    fn generate_one(&mut self, seq: usize, rng: &mut impl rand::Rng) -> PlannedCall {
        if rng.gen::<f64>() < self.hash_ratio {
            Self::hash(seq, rng)
        } else {
            Self::echo(seq, rng)
        }
    }
}

/// Response of the stock hashing handler for `data`.
fn expected_hash(data: &str) -> Value {
    let script = callbridge_simulation::catalog::blake3_hash(&json!({ "data": data }));
    script
        .callbacks()
        .first()
        .and_then(|callback| serde_json::from_slice(&callback.payload).ok())
        .unwrap_or(Value::Null)
}
