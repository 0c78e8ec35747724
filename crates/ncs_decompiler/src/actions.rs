use std::collections::HashMap;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::types::TypeTag;

/// Engine routine signatures, as needed by the stack-effect passes.
pub trait ActionsData {
    /// Cells an ACTION with `argc` arguments removes from the stack.
    fn removed_argument_cells(&self, routine: u16, argc: u8) -> usize;

    /// Declared return type, `None` if the routine is unknown.
    fn return_type(&self, routine: u16) -> Option<TypeTag>;

    /// Cells pushed by the routine's return value; `None` on lookup failure.
    fn return_cell_size(&self, routine: u16) -> Option<usize> {
        self.return_type(routine).map(|t| t.cell_size())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionDef {
    /// Routine number used by the ACTION instruction.
    pub id: u16,
    pub name: String,
    pub returns: TypeTag,
    #[serde(default)]
    pub args: Vec<TypeTag>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct ActionFile {
    actions: Vec<ActionDef>,
}

/// Routine table, typically loaded from a YAML dump of `nwscript.nss`.
#[derive(Debug, Clone, Default)]
pub struct ActionTable {
    by_id: HashMap<u16, ActionDef>,
}

/// Partial NWN routine table shipped with the crate.
const BUNDLED: &str = include_str!("../data/nwscript_actions.yaml");

impl ActionTable {
    pub fn new(defs: impl IntoIterator<Item = ActionDef>) -> Self {
        let mut by_id = HashMap::new();
        for def in defs {
            if let Some(prev) = by_id.insert(def.id, def) {
                log::warn!("duplicate action id {} ({})", prev.id, prev.name);
            }
        }
        Self { by_id }
    }

    pub fn from_yaml_str(s: &str) -> Result<Self> {
        let file: ActionFile = serde_yaml::from_str(s).context("parsing action table")?;
        Ok(Self::new(file.actions))
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let s = std::fs::read_to_string(path)
            .with_context(|| format!("reading action table: {}", path.display()))?;
        Self::from_yaml_str(&s)
    }

    pub fn bundled() -> Result<Self> {
        Self::from_yaml_str(BUNDLED)
    }

    pub fn get(&self, routine: u16) -> Option<&ActionDef> {
        self.by_id.get(&routine)
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }
}

impl ActionsData for ActionTable {
    fn removed_argument_cells(&self, routine: u16, argc: u8) -> usize {
        match self.by_id.get(&routine) {
            Some(def) => {
                if def.args.len() < argc as usize {
                    log::debug!(
                        "action {} called with {} args, {} declared",
                        def.name,
                        argc,
                        def.args.len()
                    );
                }
                let declared: usize = def
                    .args
                    .iter()
                    .take(argc as usize)
                    .map(|t| t.cell_size())
                    .sum();
                // Arguments past the declared list count one cell each.
                declared + (argc as usize).saturating_sub(def.args.len())
            }
            None => argc as usize,
        }
    }

    fn return_type(&self, routine: u16) -> Option<TypeTag> {
        self.by_id.get(&routine).map(|def| def.returns)
    }
}
