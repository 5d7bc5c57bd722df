use napi::Result as NapiResult;
use napi_derive::napi;

use loanbook_core::lending::{allocator, calculator};
use loanbook_core::scenario;

/// Convert any Display error into a napi::Error.
fn to_napi_error(e: impl std::fmt::Display) -> napi::Error {
    napi::Error::from_reason(e.to_string())
}

// ---------------------------------------------------------------------------
// Lending
// ---------------------------------------------------------------------------

#[napi]
pub fn calculate_terms(input_json: String) -> NapiResult<String> {
    let input: calculator::TermsInput = serde_json::from_str(&input_json).map_err(to_napi_error)?;
    let output = calculator::calculate_terms(&input).map_err(to_napi_error)?;
    serde_json::to_string(&output).map_err(to_napi_error)
}

#[napi]
pub fn calculate_penalty(input_json: String) -> NapiResult<String> {
    let input: calculator::PenaltyInput =
        serde_json::from_str(&input_json).map_err(to_napi_error)?;
    let output = calculator::calculate_penalty(&input).map_err(to_napi_error)?;
    serde_json::to_string(&output).map_err(to_napi_error)
}

#[napi]
pub fn allocate_repayment(input_json: String) -> NapiResult<String> {
    let input: allocator::AllocationInput =
        serde_json::from_str(&input_json).map_err(to_napi_error)?;
    let output = allocator::allocate_repayment(&input).map_err(to_napi_error)?;
    serde_json::to_string(&output).map_err(to_napi_error)
}

// ---------------------------------------------------------------------------
// Scenarios
// ---------------------------------------------------------------------------

#[napi]
pub fn run_scenario(input_json: String) -> NapiResult<String> {
    let input: scenario::ScenarioInput =
        serde_json::from_str(&input_json).map_err(to_napi_error)?;
    input.config.validate().map_err(to_napi_error)?;
    let output = scenario::run_scenario(&input).map_err(to_napi_error)?;
    serde_json::to_string(&output).map_err(to_napi_error)
}
