//! Design model and pin-model resolution.
//!
//! A generation run starts from a [`Design`] (parts plus semantic nets such
//! as `mcu.SDA`) and an immutable [`SymbolCatalog`]. [`build_instances`]
//! binds each part to its symbol and designator, and [`resolve_pin_model`]
//! produces the [`PinModel`]: exactly one label for every pin of every part.
//!
//! Geometry shared by placement, routing and emission lives in [`geometry`].

pub mod design;
pub mod diagnostics;
pub mod geometry;
pub mod instance;
pub mod resolve;

pub use design::{is_ground_net, is_supply_net, Design, NoConnect, PartCategory, PartRecord};
pub use diagnostics::{Diagnostics, Warning};
pub use instance::{build_instances, compare_designators, PartInstance};
pub use resolve::{resolve_pin_model, PinLabel, PinModel, PinModelStats, PinRef, Resolver};
pub use schemgen_eda::SymbolCatalog;

use schemgen_eda::SymbolError;

/// Fatal problems with the design data. Nothing is written when one occurs.
#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    #[error("part `{part}`: {source}")]
    Symbol {
        part: String,
        #[source]
        source: SymbolError,
    },
    #[error("part `{0}` has neither a `symbol` nor an `lcsc` reference")]
    MissingSymbolReference(String),
    #[error("part id `{0}` is defined more than once")]
    DuplicatePartId(String),
    #[error("designator `{0}` is assigned to more than one part")]
    DuplicateDesignator(String),
    #[error("net `{net}`: cannot resolve `{reference}`: {reason}")]
    UnresolvedReference {
        net: String,
        reference: String,
        reason: String,
    },
    #[error("pin {designator}.{pin} is listed in both net `{first_net}` and net `{second_net}`")]
    DuplicatePinAssignment {
        designator: String,
        pin: String,
        first_net: String,
        second_net: String,
    },
    #[error("pin {designator}.{pin} is marked no-connect but belongs to net `{net}`")]
    ConflictingNoConnect {
        designator: String,
        pin: String,
        net: String,
    },
}
