//! Static heuristics over generated Solidity source.
//!
//! These are substring checks, not a parser: they flag obvious omissions and
//! risky constructs so a human knows where to look.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecurityChecks {
    pub reentrancy_risk: bool,
    pub access_control: bool,
    pub error_handling: bool,
    pub overflow_protection: bool,
    pub events_emitted: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeAnalysis {
    pub is_valid: bool,
    pub issues: Vec<String>,
    pub warnings: Vec<String>,
    pub security_checks: SecurityChecks,
    pub summary: String,
    pub line_count: usize,
    pub has_pragma: bool,
    pub has_spdx: bool,
    pub has_imports: bool,
    pub has_natspec: bool,
    pub has_events: bool,
    pub has_requires: bool,
    pub has_modifiers: bool,
    pub has_reentrancy_guard: bool,
}

pub fn analyze(code: &str, expected_type: &str) -> CodeAnalysis {
    let raw_call = code.contains(".call.value") || code.contains(".call{");
    let checked_compiler = code.contains("0.8");

    let mut issues = Vec::new();
    let mut warnings = Vec::new();

    if raw_call {
        issues.push("low-level .call with value: reentrancy risk".to_string());
    }
    if code.contains("tx.origin") {
        warnings.push("tx.origin used for authorization; use msg.sender".to_string());
    }
    if expected_type == "erc20" && !code.contains("function transfer") {
        warnings.push("ERC20 contract without a transfer function".to_string());
    }
    if code.contains("unchecked") && !code.contains("SafeMath") && checked_compiler {
        warnings.push("unchecked blocks present; review arithmetic".to_string());
    }

    let security_checks = SecurityChecks {
        reentrancy_risk: !raw_call,
        access_control: code.contains("onlyOwner")
            || code.to_lowercase().contains("access control"),
        error_handling: code.contains("require(") || code.contains("revert"),
        overflow_protection: !code.contains("unchecked") || checked_compiler,
        events_emitted: code.contains("event ") && code.contains("emit "),
    };

    let is_valid = issues.is_empty();
    let line_count = code.split('\n').count();
    let summary = format!(
        "{} contract, {} lines, {}, {} finding(s)",
        expected_type.to_uppercase(),
        line_count,
        if is_valid { "valid" } else { "needs review" },
        issues.len() + warnings.len()
    );

    CodeAnalysis {
        is_valid,
        issues,
        warnings,
        security_checks,
        summary,
        line_count,
        has_pragma: code.contains("pragma solidity"),
        has_spdx: code.contains("SPDX-License-Identifier"),
        has_imports: code.contains("import"),
        has_natspec: code.contains("@dev") || code.contains("@title"),
        has_events: code.contains("event "),
        has_requires: code.contains("require("),
        has_modifiers: code.contains("modifier ") || code.contains("onlyOwner"),
        has_reentrancy_guard: code.contains("nonReentrant") || code.contains("ReentrancyGuard"),
    }
}
