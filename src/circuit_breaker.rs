use failsafe::{backoff, failure_policy, Config, StateMachine};
use std::time::Duration;

/// Breaker type guarding the text-generation endpoint.
pub type GenerationBreaker =
    StateMachine<failure_policy::ConsecutiveFailures<backoff::Exponential>, ()>;

/// Consecutive failures before the breaker opens.
pub const GENERATION_FAILURE_THRESHOLD: u32 = 3;

/// Creates a circuit breaker for text-generation calls.
///
/// # Configuration
///
/// - **Failure threshold**: 3 consecutive failures trigger OPEN state.
/// - **Backoff**: Exponential backoff from 30s to 5min before a trial call.
///
/// While OPEN every call is rejected without touching the network, which the
/// valuation pathway treats like any other generation failure and falls back
/// to the deterministic calculator.
pub fn create_generation_circuit_breaker() -> GenerationBreaker {
    let backoff_strategy = backoff::exponential(
        Duration::from_secs(30),  // Initial delay
        Duration::from_secs(300), // Maximum delay
    );

    let failure_policy =
        failure_policy::consecutive_failures(GENERATION_FAILURE_THRESHOLD, backoff_strategy);

    Config::new().failure_policy(failure_policy).build()
}
