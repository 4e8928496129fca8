//! Capabilities advertised in the server `hello`.
//!
//! A capability names an optional feature the host application has wired
//! up. Inspectors use the list to decide which commands are meaningful;
//! the server still answers every command, failing the ones whose
//! collaborator is missing.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A named optional feature of the debug server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Capability {
    /// Diagnostics; always available.
    Doctor,
    /// Retrieval and ingestion through a registered engine.
    Query,
    /// Evaluation runs through the installed eval module.
    Eval,
    /// Document listing and lookup.
    Docs,
    /// Store statistics and chunk deletion.
    StoreInspector,
}

impl Capability {
    /// The wire name (e.g. `"storeInspector"`).
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Doctor => "doctor",
            Self::Query => "query",
            Self::Eval => "eval",
            Self::Docs => "docs",
            Self::StoreInspector => "storeInspector",
        }
    }

    /// Parse a wire name; unknown names yield `None`.
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "doctor" => Some(Self::Doctor),
            "query" => Some(Self::Query),
            "eval" => Some(Self::Eval),
            "docs" => Some(Self::Docs),
            "storeInspector" => Some(Self::StoreInspector),
            _ => None,
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the host application registered with the server.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CapabilityInputs {
    /// An engine handle is registered.
    pub engine: bool,
    /// A store-inspector handle is registered.
    pub store_inspector: bool,
    /// The eval module is declared installed in configuration.
    pub eval_declared: bool,
    /// The eval module is present on disk.
    pub eval_present: bool,
}

/// Compute the advertised capability list.
///
/// - `doctor` is always present.
/// - `query` requires an engine.
/// - `eval` requires an engine and an eval module that is both declared
///   installed and present on disk.
/// - `docs` and `storeInspector` require a store inspector.
pub fn compute_capabilities(inputs: CapabilityInputs) -> Vec<Capability> {
    let mut caps = vec![Capability::Doctor];
    if inputs.engine {
        caps.push(Capability::Query);
        if inputs.eval_declared && inputs.eval_present {
            caps.push(Capability::Eval);
        }
    }
    if inputs.store_inspector {
        caps.push(Capability::Docs);
        caps.push(Capability::StoreInspector);
    }
    caps
}
