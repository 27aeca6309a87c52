//! # schemgen-engine
//!
//! Deterministic placement, label placement, wire routing and an SVG preview
//! for schemgen. It takes resolved part instances and their pin model and
//! produces a placed [`Layout`] plus the [`Routing`] drawn on top of it.
//!
//! ```text
//! instances + pin model --placer--> Layout --router--> Routing
//! ```

pub mod labels;
pub mod layout;
pub mod placer;
pub mod router;
pub mod svg_generator;

pub use labels::{label_placement, Justify, LabelPlacement, NetLabel, LABEL_OFFSET};
pub use layout::{Layout, Paper};
pub use placer::{place, ForceDirectedPlacer, PlacerConfig};
pub use router::{
    on_segment, route, AStarRouter, NetRoute, NoConnectFlag, RouterConfig, Routing, RoutingOutcome,
    SkipReason, Wire,
};
