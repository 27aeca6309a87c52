//! Non-fatal conditions collected during a generation run.

use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Warning {
    /// A net with fewer than two pins that is not a declared test point.
    DanglingNet { net: String, members: usize },
    UnknownGroupParent { part: String, parent: String },
    /// Referenced by no net and no no-connect entry.
    UnconnectedPart { part: String },
    MissingGroundNet,
    MissingSupplyRail,
    /// The synthesized `{designator}_{pin}` label collided and was suffixed.
    RenamedUnconnectedLabel {
        designator: String,
        pin: String,
        label: String,
    },
    PlacementNotConverged { iterations: usize, residual: f64 },
    /// No clean orthogonal path; a direct path crossing other parts was drawn.
    /// `touches` names the nets it makes contact with, if any.
    RoutingFallback {
        net: String,
        from: String,
        to: String,
        #[serde(skip_serializing_if = "Vec::is_empty")]
        touches: Vec<String>,
    },
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Warning::DanglingNet { net, members } => {
                write!(f, "net `{net}` has {members} member(s) and is not a test point")
            }
            Warning::UnknownGroupParent { part, parent } => {
                write!(f, "part `{part}` belongs to unknown part `{parent}`")
            }
            Warning::RenamedUnconnectedLabel {
                designator,
                pin,
                label,
            } => write!(
                f,
                "unconnected pin {designator}.{pin} labeled `{label}` to avoid a name clash"
            ),
            Warning::UnconnectedPart { part } => {
                write!(f, "part `{part}` has no pin connections and no no-connect entries")
            }
            Warning::MissingGroundNet => write!(f, "no ground net (`GND`) in the design"),
            Warning::MissingSupplyRail => {
                write!(f, "no supply rail (`+3V3`, `VCC`, `VBUS`, ...) in the design")
            }
            Warning::PlacementNotConverged {
                iterations,
                residual,
            } => write!(
                f,
                "placement did not settle after {iterations} iterations (last move {residual:.3})"
            ),
            Warning::RoutingFallback {
                net,
                from,
                to,
                touches,
            } if touches.is_empty() => write!(
                f,
                "net `{net}`: no clear path from {from} to {to}, drew a crossing wire"
            ),
            Warning::RoutingFallback {
                net,
                from,
                to,
                touches,
            } => write!(
                f,
                "net `{net}`: no clear path from {from} to {to}, the direct wire touches {}",
                touches.join(", ")
            ),
        }
    }
}

/// Accumulated warnings, in the order they were raised.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Diagnostics {
    warnings: Vec<Warning>,
}

impl Diagnostics {
    pub fn warn(&mut self, warning: Warning) {
        log::warn!("{warning}");
        self.warnings.push(warning);
    }

    pub fn warnings(&self) -> &[Warning] {
        &self.warnings
    }

    pub fn is_empty(&self) -> bool {
        self.warnings.is_empty()
    }

    pub fn len(&self) -> usize {
        self.warnings.len()
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_with_kind_tag() {
        let mut diagnostics = Diagnostics::default();
        diagnostics.warn(Warning::RoutingFallback {
            net: "SCL".into(),
            from: "U1.6".into(),
            to: "R2.1".into(),
            touches: Vec::new(),
        });
        let json: serde_json::Value = serde_json::from_str(&diagnostics.to_json().unwrap()).unwrap();
        assert_eq!(json["warnings"][0]["kind"], "routing_fallback");
        assert_eq!(json["warnings"][0]["net"], "SCL");
        assert!(json["warnings"][0].get("touches").is_none());
        assert_eq!(diagnostics.len(), 1);
    }

    #[test]
    fn messages_name_the_subject() {
        let w = Warning::DanglingNet {
            net: "TP1".into(),
            members: 1,
        };
        assert_eq!(
            w.to_string(),
            "net `TP1` has 1 member(s) and is not a test point"
        );
        let shorted = Warning::RoutingFallback {
            net: "SDA".into(),
            from: "U1.5".into(),
            to: "R1.2".into(),
            touches: vec!["GND".into()],
        };
        assert!(shorted.to_string().ends_with("the direct wire touches GND"));
    }
}
