//! Fault-to-compass-angle mapping
//!
//! The dial has four anchors: Mechanical at 0, Core at 90, Winding at 180
//! and Thermal at 270 degrees. Each fault label carries weights over the
//! anchors and lands on their weighted circular mean, so a label that
//! straddles two categories sits between them.

use serde::Deserialize;

use super::models::{CompassReading, CompassSource, FaultLabel};

/// How compass angles are produced
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompassMode {
    /// Deterministic local mapping
    #[default]
    Lookup,
    /// Ask the external model
    Model,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultCategory {
    Mechanical,
    Core,
    Winding,
    Thermal,
}

impl FaultCategory {
    pub fn anchor_degrees(&self) -> f64 {
        match self {
            Self::Mechanical => 0.0,
            Self::Core => 90.0,
            Self::Winding => 180.0,
            Self::Thermal => 270.0,
        }
    }
}

/// Category weights of a fault label; empty for "No Fault"
pub fn category_weights(label: FaultLabel) -> &'static [(FaultCategory, f64)] {
    use FaultCategory::*;

    match label {
        FaultLabel::NoFault => &[],
        FaultLabel::LooseClamping => &[(Mechanical, 1.0)],
        FaultLabel::CoreDisplacement => &[(Mechanical, 0.5), (Core, 0.5)],
        FaultLabel::CoreGroundingFault => &[(Core, 1.0)],
        FaultLabel::ShortedCoreLaminations => &[(Core, 0.5), (Winding, 0.5)],
        FaultLabel::WindingDeformation => &[(Winding, 1.0)],
        FaultLabel::InterTurnShortCircuit => &[(Winding, 0.5), (Thermal, 0.5)],
        FaultLabel::ThermalDegradation => &[(Thermal, 1.0)],
        FaultLabel::InsulationAgeing => &[(Thermal, 0.5), (Mechanical, 0.5)],
    }
}

/// Weighted circular mean of the label's anchors, in [0, 360)
pub fn lookup_angle(label: FaultLabel) -> f64 {
    let weights = category_weights(label);
    if weights.is_empty() {
        return 0.0;
    }

    let (x, y) = weights.iter().fold((0.0_f64, 0.0_f64), |(x, y), (category, w)| {
        let rad = category.anchor_degrees().to_radians();
        (x + w * rad.cos(), y + w * rad.sin())
    });

    // Opposite anchors with equal weight have no mean
    if x.hypot(y) < 1e-9 {
        return weights[0].0.anchor_degrees();
    }

    let degrees = (y.atan2(x).to_degrees() * 100.0).round() / 100.0;
    let normalized = degrees.rem_euclid(360.0);
    if normalized >= 360.0 {
        0.0
    } else {
        normalized
    }
}

pub fn lookup_reading(label: FaultLabel) -> CompassReading {
    let angle = lookup_angle(label);
    let rationale = if label.is_fault() {
        let categories: Vec<String> = category_weights(label)
            .iter()
            .map(|(category, _)| format!("{:?}", category))
            .collect();
        format!("{} maps to the {} sector", label, categories.join("/"))
    } else {
        "No fault detected".to_string()
    };

    CompassReading {
        angle_degrees: angle,
        rationale: Some(rationale),
        source: CompassSource::Lookup,
    }
}
