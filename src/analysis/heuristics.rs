//! Offline address heuristics.
//!
//! These look only at the address string and the caller-supplied flag list;
//! no chain data is fetched. Scores are additive and clamped to 0..=100.

use std::collections::BTreeSet;

use async_trait::async_trait;
use serde_json::json;

use super::{AnalysisError, AnalysisReport, Analyzer};
use crate::scheduler::{
    ComprehensiveAnalysisParams, TaskParameters, TokenAnalysisParams, TransactionAnalysisParams,
};

const BASE58_ALPHABET: &str = "123456789ABCDEFGHJKLMNPQRSTUVWXYZabcdefghijkmnopqrstuvwxyz";
const EVM_CHAINS: &[&str] = &["ethereum", "bsc", "polygon", "arbitrum", "optimism", "base"];
const BASE58_CHAINS: &[&str] = &["solana"];
const EVM_BURN_ADDRESSES: &[&str] = &[
    "0x0000000000000000000000000000000000000000",
    "0x000000000000000000000000000000000000dead",
];
const BASE58_BURN_ADDRESSES: &[&str] = &["11111111111111111111111111111111"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressFormat {
    Evm,
    Base58,
}

impl AddressFormat {
    pub fn detect(address: &str) -> Option<Self> {
        if let Some(hex) = address.strip_prefix("0x") {
            if hex.len() == 40 && hex.chars().all(|c| c.is_ascii_hexdigit()) {
                return Some(AddressFormat::Evm);
            }
            return None;
        }
        if (32..=44).contains(&address.len())
            && address.chars().all(|c| BASE58_ALPHABET.contains(c))
        {
            return Some(AddressFormat::Base58);
        }
        None
    }

    fn as_str(self) -> &'static str {
        match self {
            AddressFormat::Evm => "evm",
            AddressFormat::Base58 => "base58",
        }
    }

    fn matches_chain(self, chain: &str) -> bool {
        let chain = chain.to_ascii_lowercase();
        match self {
            AddressFormat::Evm => !BASE58_CHAINS.contains(&chain.as_str()),
            AddressFormat::Base58 => !EVM_CHAINS.contains(&chain.as_str()),
        }
    }
}

/// Properties of an address string that the heuristics score on.
#[derive(Debug, Clone)]
pub struct AddressProfile {
    pub format: AddressFormat,
    pub is_burn: bool,
    pub distinct_chars: usize,
    pub vanity: bool,
    pub flagged: bool,
}

impl AddressProfile {
    pub fn inspect(
        address: &str,
        chain: Option<&str>,
        flagged_addresses: &[String],
    ) -> Result<Self, AnalysisError> {
        let format = AddressFormat::detect(address)
            .ok_or_else(|| AnalysisError::InvalidAddress(address.to_string()))?;

        if let Some(chain) = chain {
            if !format.matches_chain(chain) {
                return Err(AnalysisError::Failed(format!(
                    "{} address does not belong to chain {}",
                    format.as_str(),
                    chain
                )));
            }
        }

        let (body, is_burn) = match format {
            AddressFormat::Evm => {
                let lower = address.to_ascii_lowercase();
                let burn = EVM_BURN_ADDRESSES.contains(&lower.as_str());
                (address[2..].to_ascii_lowercase(), burn)
            }
            AddressFormat::Base58 => (
                address.to_string(),
                BASE58_BURN_ADDRESSES.contains(&address),
            ),
        };

        let distinct_chars = body.chars().collect::<BTreeSet<_>>().len();
        let vanity = repeated_run(&body) >= 6;
        let flagged = flagged_addresses.iter().any(|f| match format {
            AddressFormat::Evm => f.eq_ignore_ascii_case(address),
            AddressFormat::Base58 => f == address,
        });

        Ok(Self {
            format,
            is_burn,
            distinct_chars,
            vanity,
            flagged,
        })
    }

    fn details(&self) -> serde_json::Value {
        json!({
            "format": self.format.as_str(),
            "burn_address": self.is_burn,
            "distinct_chars": self.distinct_chars,
            "vanity_pattern": self.vanity,
            "flagged": self.flagged,
        })
    }
}

/// Longest run of one repeated character at either end of the address body.
fn repeated_run(body: &str) -> usize {
    fn run<I: Iterator<Item = char>>(mut chars: I) -> usize {
        let Some(first) = chars.next() else {
            return 0;
        };
        1 + chars.take_while(|&c| c == first).count()
    }
    run(body.chars()).max(run(body.chars().rev()))
}

struct Scorer {
    score: f64,
    signals: Vec<String>,
}

impl Scorer {
    fn new(base: f64) -> Self {
        Self {
            score: base,
            signals: Vec::new(),
        }
    }

    fn add(&mut self, hit: bool, weight: f64, signal: &str) {
        if hit {
            self.score += weight;
            self.signals.push(signal.to_string());
        }
    }
}

fn token_report(
    target: &str,
    params: &TokenAnalysisParams,
) -> Result<AnalysisReport, AnalysisError> {
    let profile = AddressProfile::inspect(target, params.chain.as_deref(), &params.flagged_addresses)?;

    let mut scorer = Scorer::new(5.0);
    scorer.add(profile.flagged, 90.0, "flagged-address");
    scorer.add(profile.is_burn, 60.0, "burn-address");
    scorer.add(
        !profile.is_burn && profile.distinct_chars < 6,
        25.0,
        "low-character-diversity",
    );
    scorer.add(profile.vanity, 15.0, "vanity-pattern");

    Ok(AnalysisReport::new("token-heuristics", target, scorer.score)
        .with_signals(scorer.signals)
        .with_details(profile.details()))
}

fn transaction_report(
    target: &str,
    params: &TransactionAnalysisParams,
) -> Result<AnalysisReport, AnalysisError> {
    let profile = AddressProfile::inspect(target, params.chain.as_deref(), &params.flagged_addresses)?;

    let mut scorer = Scorer::new(5.0);
    scorer.add(profile.flagged, 90.0, "flagged-counterparty");
    scorer.add(profile.is_burn, 40.0, "null-address-interaction");
    // lookalike addresses are the usual vehicle for address poisoning
    scorer.add(profile.vanity, 30.0, "address-poisoning-pattern");
    scorer.add(
        !profile.is_burn && profile.distinct_chars < 6,
        20.0,
        "low-character-diversity",
    );

    let mut details = profile.details();
    details["lookback_limit"] = json!(params.lookback_limit);

    Ok(AnalysisReport::new("transaction-heuristics", target, scorer.score)
        .with_signals(scorer.signals)
        .with_details(details))
}

fn unsupported(analysis: &'static str, parameters: &TaskParameters) -> AnalysisError {
    AnalysisError::Unsupported {
        analysis,
        task_type: parameters.task_type(),
    }
}

/// Token-level heuristics.
#[derive(Debug, Default, Clone, Copy)]
pub struct TokenHeuristics;

#[async_trait]
impl Analyzer for TokenHeuristics {
    fn name(&self) -> &'static str {
        "token-heuristics"
    }

    async fn analyze(
        &self,
        target_address: &str,
        parameters: &TaskParameters,
    ) -> Result<AnalysisReport, AnalysisError> {
        match parameters {
            TaskParameters::TokenAnalysis(params) => token_report(target_address, params),
            TaskParameters::ComprehensiveAnalysis(params) => {
                token_report(target_address, &token_params(params))
            }
            other => Err(unsupported(self.name(), other)),
        }
    }
}

/// Transaction-pattern heuristics.
#[derive(Debug, Default, Clone, Copy)]
pub struct TransactionHeuristics;

#[async_trait]
impl Analyzer for TransactionHeuristics {
    fn name(&self) -> &'static str {
        "transaction-heuristics"
    }

    async fn analyze(
        &self,
        target_address: &str,
        parameters: &TaskParameters,
    ) -> Result<AnalysisReport, AnalysisError> {
        match parameters {
            TaskParameters::TransactionAnalysis(params) => {
                transaction_report(target_address, params)
            }
            TaskParameters::ComprehensiveAnalysis(params) => {
                transaction_report(target_address, &transaction_params(params))
            }
            other => Err(unsupported(self.name(), other)),
        }
    }
}

/// Aggregate risk evaluation over the token and transaction heuristics.
/// The combined score is the worst component score.
#[derive(Debug, Default, Clone, Copy)]
pub struct RiskHeuristics;

#[async_trait]
impl Analyzer for RiskHeuristics {
    fn name(&self) -> &'static str {
        "risk-heuristics"
    }

    async fn analyze(
        &self,
        target_address: &str,
        parameters: &TaskParameters,
    ) -> Result<AnalysisReport, AnalysisError> {
        let TaskParameters::ComprehensiveAnalysis(params) = parameters else {
            return Err(unsupported(self.name(), parameters));
        };

        let mut components = Vec::new();
        if params.include_token {
            components.push(token_report(target_address, &token_params(params))?);
        }
        if params.include_transactions {
            components.push(transaction_report(
                target_address,
                &transaction_params(params),
            )?);
        }
        if components.is_empty() {
            return Err(AnalysisError::Failed(
                "comprehensive analysis with every component disabled".to_string(),
            ));
        }

        let score = components
            .iter()
            .map(|c| c.risk_score)
            .fold(0.0_f64, f64::max);
        let mut signals: Vec<String> = Vec::new();
        for signal in components.iter().flat_map(|c| c.signals.iter()) {
            if !signals.contains(signal) {
                signals.push(signal.clone());
            }
        }
        let details = json!({
            "components": components
                .iter()
                .map(|c| json!({
                    "analysis": c.analysis,
                    "risk_score": c.risk_score,
                    "signals": c.signals,
                }))
                .collect::<Vec<_>>(),
        });

        Ok(AnalysisReport::new(self.name(), target_address, score)
            .with_signals(signals)
            .with_details(details))
    }
}

fn token_params(params: &ComprehensiveAnalysisParams) -> TokenAnalysisParams {
    TokenAnalysisParams {
        chain: params.chain.clone(),
        flagged_addresses: params.flagged_addresses.clone(),
    }
}

fn transaction_params(params: &ComprehensiveAnalysisParams) -> TransactionAnalysisParams {
    TransactionAnalysisParams {
        chain: params.chain.clone(),
        flagged_addresses: params.flagged_addresses.clone(),
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::RiskLevel;
    use crate::scheduler::TaskType;

    const CLEAN_EVM: &str = "0x52908400098527886e0f7030069857d2e4169ee7";
    const CLEAN_SOL: &str = "9WzDXwBbmkg8ZTbNMqUxvQRAyrZzDsGYdLVL9zYtAWWM";

    #[test]
    fn detects_address_formats() {
        assert_eq!(AddressFormat::detect(CLEAN_EVM), Some(AddressFormat::Evm));
        assert_eq!(AddressFormat::detect(CLEAN_SOL), Some(AddressFormat::Base58));
        assert_eq!(AddressFormat::detect("0x1234"), None);
        assert_eq!(AddressFormat::detect("WALLET_A"), None);
        // '0' and 'l' are not in the base58 alphabet
        assert_eq!(
            AddressFormat::detect("0lzDXwBbmkg8ZTbNMqUxvQRAyrZzDsGYdLVL9zYtAWWM"),
            None
        );
    }

    #[test]
    fn repeated_run_checks_both_ends() {
        assert_eq!(repeated_run("aaaaaab"), 6);
        assert_eq!(repeated_run("bcccccc"), 6);
        assert_eq!(repeated_run("abc"), 1);
        assert_eq!(repeated_run(""), 0);
    }

    #[tokio::test]
    async fn clean_address_scores_low() {
        let params = TaskParameters::default_for(TaskType::TokenAnalysis);
        let report = TokenHeuristics.analyze(CLEAN_EVM, &params).await.unwrap();
        assert_eq!(report.risk_level, RiskLevel::Low);
        assert!(report.signals.is_empty());
        assert_eq!(report.details["format"], "evm");
    }

    #[tokio::test]
    async fn flagged_address_is_critical() {
        let params = TaskParameters::TokenAnalysis(TokenAnalysisParams {
            chain: None,
            flagged_addresses: vec![CLEAN_EVM.to_uppercase().replace("0X", "0x")],
        });
        let report = TokenHeuristics.analyze(CLEAN_EVM, &params).await.unwrap();
        assert_eq!(report.risk_level, RiskLevel::Critical);
        assert!(report.signals.contains(&"flagged-address".to_string()));
    }

    #[tokio::test]
    async fn burn_address_is_flagged() {
        let params = TaskParameters::default_for(TaskType::TransactionAnalysis);
        let report = TransactionHeuristics
            .analyze("0x000000000000000000000000000000000000dEaD", &params)
            .await
            .unwrap();
        assert!(report
            .signals
            .contains(&"null-address-interaction".to_string()));
        assert_eq!(report.details["lookback_limit"], 100);
    }

    #[tokio::test]
    async fn unrecognised_address_fails() {
        let params = TaskParameters::default_for(TaskType::TokenAnalysis);
        let err = TokenHeuristics.analyze("WALLET_A", &params).await.unwrap_err();
        assert_eq!(err, AnalysisError::InvalidAddress("WALLET_A".to_string()));
    }

    #[tokio::test]
    async fn chain_mismatch_fails() {
        let params = TaskParameters::TokenAnalysis(TokenAnalysisParams {
            chain: Some("solana".to_string()),
            flagged_addresses: Vec::new(),
        });
        let err = TokenHeuristics.analyze(CLEAN_EVM, &params).await.unwrap_err();
        assert!(matches!(err, AnalysisError::Failed(_)));
    }

    #[tokio::test]
    async fn analyzers_reject_foreign_parameters() {
        let params = TaskParameters::default_for(TaskType::TransactionAnalysis);
        let err = TokenHeuristics.analyze(CLEAN_EVM, &params).await.unwrap_err();
        assert!(matches!(err, AnalysisError::Unsupported { .. }));

        let err = RiskHeuristics.analyze(CLEAN_EVM, &params).await.unwrap_err();
        assert!(matches!(err, AnalysisError::Unsupported { .. }));
    }

    #[tokio::test]
    async fn risk_evaluation_takes_worst_component() {
        let params = TaskParameters::default_for(TaskType::ComprehensiveAnalysis);
        let burn = "0x0000000000000000000000000000000000000000";
        let report = RiskHeuristics.analyze(burn, &params).await.unwrap();

        let token = TokenHeuristics.analyze(burn, &params).await.unwrap();
        let tx = TransactionHeuristics.analyze(burn, &params).await.unwrap();
        assert_eq!(report.risk_score, token.risk_score.max(tx.risk_score));
        assert_eq!(report.details["components"].as_array().unwrap().len(), 2);
        assert!(report.signals.contains(&"burn-address".to_string()));
        assert!(report
            .signals
            .contains(&"null-address-interaction".to_string()));
    }

    #[tokio::test]
    async fn risk_evaluation_needs_a_component() {
        let params = TaskParameters::ComprehensiveAnalysis(ComprehensiveAnalysisParams {
            include_token: false,
            include_transactions: false,
            ..Default::default()
        });
        let err = RiskHeuristics.analyze(CLEAN_SOL, &params).await.unwrap_err();
        assert!(matches!(err, AnalysisError::Failed(_)));
    }
}
