//! Data models and response schemas for the analysis pipeline

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::llm::Validate;

/// Asset criticality
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum Criticality {
    #[serde(alias = "high", alias = "HIGH")]
    High,
    #[serde(alias = "medium", alias = "MEDIUM")]
    Medium,
    #[serde(alias = "low", alias = "LOW")]
    Low,
}

impl Criticality {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::High => "High",
            Self::Medium => "Medium",
            Self::Low => "Low",
        }
    }
}

impl fmt::Display for Criticality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identifier of one upload-to-report cycle
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(transparent)]
pub struct AnalysisSessionId(Uuid);

impl AnalysisSessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for AnalysisSessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for AnalysisSessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Fixed fault taxonomy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FaultLabel {
    NoFault,
    LooseClamping,
    CoreDisplacement,
    CoreGroundingFault,
    ShortedCoreLaminations,
    WindingDeformation,
    InterTurnShortCircuit,
    ThermalDegradation,
    InsulationAgeing,
}

impl FaultLabel {
    pub const ALL: [FaultLabel; 9] = [
        Self::NoFault,
        Self::LooseClamping,
        Self::CoreDisplacement,
        Self::CoreGroundingFault,
        Self::ShortedCoreLaminations,
        Self::WindingDeformation,
        Self::InterTurnShortCircuit,
        Self::ThermalDegradation,
        Self::InsulationAgeing,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NoFault => "No Fault",
            Self::LooseClamping => "Loose Clamping",
            Self::CoreDisplacement => "Core Displacement",
            Self::CoreGroundingFault => "Core Grounding Fault",
            Self::ShortedCoreLaminations => "Shorted Core Laminations",
            Self::WindingDeformation => "Winding Deformation",
            Self::InterTurnShortCircuit => "Inter-turn Short Circuit",
            Self::ThermalDegradation => "Thermal Degradation",
            Self::InsulationAgeing => "Insulation Ageing",
        }
    }

    pub fn is_fault(&self) -> bool {
        *self != Self::NoFault
    }
}

impl fmt::Display for FaultLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn normalize_label(raw: &str) -> String {
    raw.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

impl FromStr for FaultLabel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = normalize_label(s);
        Self::ALL
            .iter()
            .copied()
            .find(|label| normalize_label(label.as_str()) == wanted)
            .ok_or_else(|| format!("unknown fault classification '{}'", s.trim()))
    }
}

impl Serialize for FaultLabel {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for FaultLabel {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Fault classification returned by the external model
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ClassificationResult {
    #[serde(rename = "faultClassification")]
    pub fault_label: FaultLabel,

    /// Confidence in [0, 1]
    #[serde(rename = "confidenceScore")]
    pub confidence: f64,

    #[serde(rename = "rawFraDataSummary")]
    pub data_summary: String,
}

impl Validate for ClassificationResult {
    fn validate(&self) -> Result<(), String> {
        if !self.confidence.is_finite() || !(0.0..=1.0).contains(&self.confidence) {
            return Err(format!(
                "confidenceScore {} outside [0, 1]",
                self.confidence
            ));
        }
        if self.data_summary.trim().is_empty() {
            return Err("rawFraDataSummary is empty".to_string());
        }
        Ok(())
    }
}

/// What an enrichment call is grounded on
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisContext {
    pub asset_id: String,
    pub criticality: Criticality,
    pub classification: ClassificationResult,
}

/// Enrichment kinds attached to a classification
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "camelCase")]
pub enum EnrichmentKind {
    Explanation,
    Insights,
    Factors,
    CompassAngle,
    Rules,
    Costs,
}

impl EnrichmentKind {
    pub const ALL: [EnrichmentKind; 6] = [
        Self::Explanation,
        Self::Insights,
        Self::Factors,
        Self::CompassAngle,
        Self::Rules,
        Self::Costs,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Explanation => "explanation",
            Self::Insights => "insights",
            Self::Factors => "factors",
            Self::CompassAngle => "compassAngle",
            Self::Rules => "rules",
            Self::Costs => "costs",
        }
    }

    /// Kinds requested for an asset; expert rules only for High criticality
    pub fn for_criticality(criticality: Criticality) -> Vec<EnrichmentKind> {
        Self::ALL
            .iter()
            .copied()
            .filter(|kind| *kind != Self::Rules || criticality == Criticality::High)
            .collect()
    }
}

impl fmt::Display for EnrichmentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EnrichmentKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|kind| kind.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown enrichment kind '{}'", s))
    }
}

/// AI explanation of the classification
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Explanation {
    pub explanation: String,
}

impl Validate for Explanation {
    fn validate(&self) -> Result<(), String> {
        if self.explanation.trim().is_empty() {
            return Err("explanation is empty".to_string());
        }
        Ok(())
    }
}

/// Actionable insights
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Insights {
    pub recommended_actions: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
}

impl Validate for Insights {
    fn validate(&self) -> Result<(), String> {
        if self.recommended_actions.is_empty() {
            return Err("recommendedActions is empty".to_string());
        }
        if self.recommended_actions.iter().any(|a| a.trim().is_empty()) {
            return Err("recommendedActions contains a blank entry".to_string());
        }
        Ok(())
    }
}

/// One contributing factor of the fault
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ContributingFactor {
    #[serde(alias = "factor")]
    pub name: String,
    #[serde(alias = "influence")]
    pub influence_percent: f64,
}

/// Contributing factor breakdown response
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FactorBreakdown {
    pub factors: Vec<ContributingFactor>,
}

impl FactorBreakdown {
    pub const MIN_FACTORS: usize = 3;
    pub const MAX_FACTORS: usize = 5;

    pub fn total(&self) -> f64 {
        self.factors.iter().map(|f| f.influence_percent).sum()
    }
}

impl Validate for FactorBreakdown {
    fn validate(&self) -> Result<(), String> {
        let count = self.factors.len();
        if !(Self::MIN_FACTORS..=Self::MAX_FACTORS).contains(&count) {
            return Err(format!(
                "expected {}-{} factors, got {}",
                Self::MIN_FACTORS,
                Self::MAX_FACTORS,
                count
            ));
        }
        for factor in &self.factors {
            if factor.name.trim().is_empty() {
                return Err("factor name is empty".to_string());
            }
            if !factor.influence_percent.is_finite()
                || !(0.0..=100.0).contains(&factor.influence_percent)
            {
                return Err(format!(
                    "factor '{}' influence {} outside [0, 100]",
                    factor.name, factor.influence_percent
                ));
            }
        }
        Ok(())
    }
}

/// Where a compass reading came from
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum CompassSource {
    #[default]
    Model,
    Lookup,
}

/// Position of the fault on the 0-360 degree diagnostic dial
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CompassReading {
    pub angle_degrees: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rationale: Option<String>,
    #[serde(default)]
    pub source: CompassSource,
}

impl Validate for CompassReading {
    fn validate(&self) -> Result<(), String> {
        if !self.angle_degrees.is_finite() || !(0.0..360.0).contains(&self.angle_degrees) {
            return Err(format!("angleDegrees {} outside [0, 360)", self.angle_degrees));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum RulePriority {
    #[serde(alias = "high")]
    High,
    #[serde(alias = "medium")]
    Medium,
    #[serde(alias = "low")]
    Low,
}

impl RulePriority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::High => "High",
            Self::Medium => "Medium",
            Self::Low => "Low",
        }
    }
}

impl fmt::Display for RulePriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Expert-system rule suggestion
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExpertRule {
    pub condition: String,
    pub action: String,
    pub priority: RulePriority,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RuleSet {
    pub rules: Vec<ExpertRule>,
}

impl Validate for RuleSet {
    fn validate(&self) -> Result<(), String> {
        if self.rules.is_empty() {
            return Err("rules is empty".to_string());
        }
        if self
            .rules
            .iter()
            .any(|r| r.condition.trim().is_empty() || r.action.trim().is_empty())
        {
            return Err("rule with empty condition or action".to_string());
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CostLineItem {
    pub description: String,
    pub amount: f64,
}

/// Repair and replacement cost estimate
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CostEstimate {
    pub currency: String,
    pub repair_min: f64,
    pub repair_max: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replacement_cost: Option<f64>,
    pub downtime_days: f64,
    #[serde(default)]
    pub line_items: Vec<CostLineItem>,
}

impl Validate for CostEstimate {
    fn validate(&self) -> Result<(), String> {
        if self.currency.trim().is_empty() {
            return Err("currency is empty".to_string());
        }

        let amounts = [self.repair_min, self.repair_max, self.downtime_days]
            .into_iter()
            .chain(self.replacement_cost)
            .chain(self.line_items.iter().map(|item| item.amount));
        for amount in amounts {
            if !amount.is_finite() || amount < 0.0 {
                return Err(format!("amount {} is not a non-negative number", amount));
            }
        }

        if self.repair_min > self.repair_max {
            return Err(format!(
                "repairMin {} exceeds repairMax {}",
                self.repair_min, self.repair_max
            ));
        }
        Ok(())
    }
}

/// Validated result of one enrichment call
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "kind", content = "data", rename_all = "camelCase")]
pub enum EnrichmentPayload {
    Explanation(Explanation),
    Insights(Insights),
    Factors(FactorBreakdown),
    CompassAngle(CompassReading),
    Rules(RuleSet),
    Costs(CostEstimate),
}

impl EnrichmentPayload {
    pub fn kind(&self) -> EnrichmentKind {
        match self {
            Self::Explanation(_) => EnrichmentKind::Explanation,
            Self::Insights(_) => EnrichmentKind::Insights,
            Self::Factors(_) => EnrichmentKind::Factors,
            Self::CompassAngle(_) => EnrichmentKind::CompassAngle,
            Self::Rules(_) => EnrichmentKind::Rules,
            Self::Costs(_) => EnrichmentKind::Costs,
        }
    }
}

/// Enrichment results of one session, keyed by kind
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
#[serde(transparent)]
pub struct EnrichmentOutputs {
    entries: BTreeMap<EnrichmentKind, EnrichmentPayload>,
}

impl EnrichmentOutputs {
    pub(crate) fn from_entries(entries: BTreeMap<EnrichmentKind, EnrichmentPayload>) -> Self {
        Self { entries }
    }

    pub fn get(&self, kind: EnrichmentKind) -> Option<&EnrichmentPayload> {
        self.entries.get(&kind)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn kinds(&self) -> Vec<EnrichmentKind> {
        self.entries.keys().copied().collect()
    }

    /// Every kind requested for this criticality has a result
    pub fn is_complete(&self, criticality: Criticality) -> bool {
        EnrichmentKind::for_criticality(criticality)
            .iter()
            .all(|kind| self.entries.contains_key(kind))
    }

    pub fn explanation(&self) -> Option<&Explanation> {
        match self.get(EnrichmentKind::Explanation) {
            Some(EnrichmentPayload::Explanation(e)) => Some(e),
            _ => None,
        }
    }

    pub fn insights(&self) -> Option<&Insights> {
        match self.get(EnrichmentKind::Insights) {
            Some(EnrichmentPayload::Insights(i)) => Some(i),
            _ => None,
        }
    }

    pub fn factors(&self) -> Option<&FactorBreakdown> {
        match self.get(EnrichmentKind::Factors) {
            Some(EnrichmentPayload::Factors(f)) => Some(f),
            _ => None,
        }
    }

    pub fn compass(&self) -> Option<&CompassReading> {
        match self.get(EnrichmentKind::CompassAngle) {
            Some(EnrichmentPayload::CompassAngle(c)) => Some(c),
            _ => None,
        }
    }

    pub fn rules(&self) -> Option<&RuleSet> {
        match self.get(EnrichmentKind::Rules) {
            Some(EnrichmentPayload::Rules(r)) => Some(r),
            _ => None,
        }
    }

    pub fn costs(&self) -> Option<&CostEstimate> {
        match self.get(EnrichmentKind::Costs) {
            Some(EnrichmentPayload::Costs(c)) => Some(c),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{decode_structured, ModelError};
    use serde_json::json;

    #[test]
    fn test_fault_label_parsing_is_lenient_on_case_and_spacing() {
        assert_eq!(
            "winding   deformation".parse::<FaultLabel>().unwrap(),
            FaultLabel::WindingDeformation
        );
        assert_eq!(
            " INTER-TURN short circuit ".parse::<FaultLabel>().unwrap(),
            FaultLabel::InterTurnShortCircuit
        );
        assert!("Bushing Failure".parse::<FaultLabel>().is_err());
    }

    #[test]
    fn test_classification_wire_schema() {
        let result: ClassificationResult = decode_structured(json!({
            "faultClassification": "Winding Deformation",
            "confidenceScore": 0.85,
            "rawFraDataSummary": "Shift in mid-band resonances"
        }))
        .unwrap();

        assert_eq!(result.fault_label, FaultLabel::WindingDeformation);
        assert_eq!(result.confidence, 0.85);

        let out = serde_json::to_value(&result).unwrap();
        assert_eq!(out["faultClassification"], "Winding Deformation");
    }

    #[test]
    fn test_classification_rejects_percent_confidence() {
        let result = decode_structured::<ClassificationResult>(json!({
            "faultClassification": "Winding Deformation",
            "confidenceScore": 85,
            "rawFraDataSummary": "..."
        }));
        assert!(matches!(result, Err(ModelError::Schema(_))));
    }

    #[test]
    fn test_classification_rejects_unknown_label() {
        let result = decode_structured::<ClassificationResult>(json!({
            "faultClassification": "Probably fine",
            "confidenceScore": 0.5,
            "rawFraDataSummary": "..."
        }));
        assert!(matches!(result, Err(ModelError::Schema(_))));
    }

    #[test]
    fn test_rules_only_for_high_criticality() {
        assert_eq!(EnrichmentKind::for_criticality(Criticality::High).len(), 6);
        let medium = EnrichmentKind::for_criticality(Criticality::Medium);
        assert_eq!(medium.len(), 5);
        assert!(!medium.contains(&EnrichmentKind::Rules));
    }

    #[test]
    fn test_enrichment_kind_wire_names() {
        assert_eq!(
            serde_json::to_value(EnrichmentKind::CompassAngle).unwrap(),
            "compassAngle"
        );
        assert_eq!(
            "compassangle".parse::<EnrichmentKind>().unwrap(),
            EnrichmentKind::CompassAngle
        );
    }

    #[test]
    fn test_factor_breakdown_bounds() {
        let two: Result<FactorBreakdown, _> = decode_structured(json!({
            "factors": [
                {"name": "a", "influencePercent": 50},
                {"name": "b", "influencePercent": 50}
            ]
        }));
        assert!(two.is_err());

        let out_of_range: Result<FactorBreakdown, _> = decode_structured(json!({
            "factors": [
                {"factor": "a", "influence": 150},
                {"factor": "b", "influence": 0},
                {"factor": "c", "influence": 0}
            ]
        }));
        assert!(out_of_range.is_err());
    }

    #[test]
    fn test_cost_estimate_range_check() {
        let inverted: Result<CostEstimate, _> = decode_structured(json!({
            "currency": "USD",
            "repairMin": 9000,
            "repairMax": 4000,
            "downtimeDays": 3
        }));
        assert!(inverted.is_err());

        let ok: CostEstimate = decode_structured(json!({
            "currency": "USD",
            "repairMin": 4000,
            "repairMax": 9000,
            "replacementCost": 250000,
            "downtimeDays": 3,
            "lineItems": [{"description": "Re-clamping", "amount": 4000}]
        }))
        .unwrap();
        assert_eq!(ok.line_items.len(), 1);
    }

    #[test]
    fn test_outputs_serialize_by_kind() {
        let mut entries = BTreeMap::new();
        entries.insert(
            EnrichmentKind::Explanation,
            EnrichmentPayload::Explanation(Explanation {
                explanation: "text".to_string(),
            }),
        );
        let outputs = EnrichmentOutputs::from_entries(entries);
        let value = serde_json::to_value(&outputs).unwrap();
        assert_eq!(value["explanation"]["data"]["explanation"], "text");
        assert!(!outputs.is_complete(Criticality::Low));
    }
}
