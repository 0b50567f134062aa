//! Wire messages exchanged with a remote display
//!
//! Messages are JSON objects tagged by a `type` field. Outbound messages
//! carry solver results, the current receiver layout, or an error string.
//! Inbound messages replace the layout or ask for a simulated source.

use serde::{Deserialize, Serialize};

use crate::error::{ErrorCode, LocalizationError};
use crate::geometry::{Position, ReceiverArray};
use crate::pipeline::{Localization, Localizer};
use crate::simulation::SimulationContext;
use crate::solver::SolverResult;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl From<Position> for Point {
    fn from(p: Position) -> Self {
        Self {
            x: p.x,
            y: p.y,
            z: p.z,
        }
    }
}

impl From<Point> for Position {
    fn from(p: Point) -> Self {
        Position::new(p.x, p.y, p.z)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Root {
    pub pos: Point,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReceiverReport {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub is_reference: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum OutboundMessage {
    #[serde(rename_all = "camelCase")]
    Result { roots: [Root; 2], chosen_root_id: usize },
    Settings { receivers: Vec<ReceiverReport> },
    Error { msg: String },
}

impl OutboundMessage {
    pub fn from_result(result: &SolverResult) -> Self {
        OutboundMessage::Result {
            roots: result.candidates.map(|pos| Root { pos: pos.into() }),
            chosen_root_id: result.chosen_index,
        }
    }

    pub fn from_localization(localization: &Localization) -> Self {
        Self::from_result(&localization.result)
    }

    pub fn settings(array: &ReceiverArray) -> Self {
        let receivers = array
            .receivers()
            .iter()
            .map(|receiver| {
                let p = receiver.position();
                ReceiverReport {
                    x: p.x,
                    y: p.y,
                    z: p.z,
                    is_reference: receiver.is_reference(),
                }
            })
            .collect();
        OutboundMessage::Settings { receivers }
    }

    /// Error report carrying the numeric code and message
    pub fn error<E: ErrorCode>(err: &E) -> Self {
        OutboundMessage::Error {
            msg: format!("[{}] {}", err.code(), err.message()),
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReceiverSetting {
    pub pos: Point,
    #[serde(default)]
    pub is_reference: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SimulatedSource {
    pub pos: Point,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum InboundMessage {
    Settings { receivers: Vec<ReceiverSetting> },
    #[serde(rename_all = "camelCase")]
    Simulate { sim_source: SimulatedSource },
}

impl InboundMessage {
    pub fn from_json(text: &str) -> serde_json::Result<Self> {
        serde_json::from_str(text)
    }

    /// Apply the request to `localizer` and build the reply
    ///
    /// Settings without a flagged receiver keep receiver 0 as reference;
    /// with several flagged, the last one wins.
    pub fn handle(&self, localizer: &mut Localizer) -> OutboundMessage {
        let outcome = match self {
            InboundMessage::Settings { receivers } => {
                let positions: Vec<Position> = receivers.iter().map(|r| r.pos.into()).collect();
                let reference = receivers.iter().rposition(|r| r.is_reference).unwrap_or(0);
                localizer
                    .update_receiver_positions(&positions, reference)
                    .map(|()| OutboundMessage::settings(localizer.array()))
            }
            InboundMessage::Simulate { sim_source } => {
                let speed = localizer.solver().config().speed_of_sound;
                let context = SimulationContext::new(sim_source.pos.into(), speed);
                localizer
                    .simulate(&context)
                    .map(|localization| OutboundMessage::from_localization(&localization))
            }
        };
        outcome.unwrap_or_else(|err: LocalizationError| OutboundMessage::error(&err))
    }
}
