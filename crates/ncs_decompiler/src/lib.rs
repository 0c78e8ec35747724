//! Prototype inference for compiled NWScript (NCS) bytecode.
//!
//! Decodes an NCS image into subroutines, builds the call graph and assigns
//! every reachable subroutine a prototype: return type and parameter count.

pub mod actions;
pub mod asm;
pub mod callgraph;
pub mod callsite;
pub mod config;
pub mod decode;
pub mod error;
pub mod opcode;
pub mod parser;
pub mod prototype;
pub mod scc;
pub mod state;
pub mod typer;
pub mod types;

pub use actions::{ActionTable, ActionsData};
pub use callgraph::{CallGraph, CallGraphBuilder};
pub use config::{InferenceConfig, ToolConfig};
pub use decode::{Position, Program, Reach};
pub use error::{DecodeError, StateError, StructuralAmbiguity};
pub use parser::NcsFile;
pub use prototype::{PrototypeEngine, PrototypeReport};
pub use state::{PrototypeStatus, StateArena};
pub use typer::{FrameTyper, StructuralTyper};
pub use types::TypeTag;
