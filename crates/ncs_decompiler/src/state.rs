use std::collections::HashMap;

use serde::Serialize;

use crate::decode::{Position, Program};
use crate::error::StateError;
use crate::types::TypeTag;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PrototypeStatus {
    Unprototyped,
    BeingPrototyped,
    /// Terminal; the state is frozen from here on.
    Prototyped,
}

/// Mutable inference state of one subroutine.
///
/// Every mutator refuses with [`StateError::Frozen`] once the status is
/// [`PrototypeStatus::Prototyped`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubroutineState {
    position: Position,
    status: PrototypeStatus,
    return_type: Option<TypeTag>,
    param_count: usize,
    params: Vec<TypeTag>,
}

impl SubroutineState {
    pub fn new(position: Position) -> Self {
        Self {
            position,
            status: PrototypeStatus::Unprototyped,
            return_type: None,
            param_count: 0,
            params: Vec::new(),
        }
    }

    pub fn position(&self) -> Position {
        self.position
    }

    pub fn status(&self) -> PrototypeStatus {
        self.status
    }

    pub fn return_type(&self) -> Option<TypeTag> {
        self.return_type
    }

    pub fn is_return_type_known(&self) -> bool {
        self.return_type.is_some()
    }

    /// Known to leave a value in the caller's return slot.
    pub fn returns_value(&self) -> bool {
        self.return_type.is_some_and(|t| !t.is_void())
    }

    pub fn param_count(&self) -> usize {
        self.param_count
    }

    pub fn params(&self) -> &[TypeTag] {
        &self.params
    }

    pub fn is_prototyped(&self) -> bool {
        self.status == PrototypeStatus::Prototyped
    }

    pub fn is_being_prototyped(&self) -> bool {
        self.status == PrototypeStatus::BeingPrototyped
    }

    fn ensure_mutable(&self) -> Result<(), StateError> {
        if self.is_prototyped() {
            return Err(StateError::Frozen {
                position: self.position,
            });
        }
        Ok(())
    }

    pub fn set_return_type(&mut self, tag: TypeTag) -> Result<(), StateError> {
        self.ensure_mutable()?;
        self.return_type = Some(tag);
        Ok(())
    }

    pub fn set_param_count(&mut self, n: usize) -> Result<(), StateError> {
        self.ensure_mutable()?;
        self.param_count = n;
        Ok(())
    }

    pub fn start_prototyping(&mut self) -> Result<(), StateError> {
        self.ensure_mutable()?;
        self.status = PrototypeStatus::BeingPrototyped;
        Ok(())
    }

    /// Leave the BeingPrototyped phase; `success` freezes the state.
    pub fn stop_prototyping(&mut self, success: bool) -> Result<(), StateError> {
        self.ensure_mutable()?;
        self.status = if success {
            PrototypeStatus::Prototyped
        } else {
            PrototypeStatus::Unprototyped
        };
        Ok(())
    }

    /// Resize the parameter slots to `param_count`, filling new slots with `Any`.
    pub fn ensure_param_placeholders(&mut self) -> Result<(), StateError> {
        self.ensure_mutable()?;
        self.params.resize(self.param_count, TypeTag::Any);
        Ok(())
    }
}

/// Subroutine states stored contiguously, addressed by entry position.
#[derive(Debug, Clone, Default)]
pub struct StateArena {
    slots: Vec<SubroutineState>,
    index: HashMap<Position, usize>,
}

impl StateArena {
    pub fn new(program: &Program) -> Self {
        let mut arena = Self::default();
        for sub in program.subroutines() {
            arena.insert(sub.position);
        }
        arena
    }

    fn insert(&mut self, position: Position) {
        if self.index.contains_key(&position) {
            return;
        }
        self.index.insert(position, self.slots.len());
        self.slots.push(SubroutineState::new(position));
    }

    pub fn get(&self, position: Position) -> Option<&SubroutineState> {
        self.index.get(&position).map(|&i| &self.slots[i])
    }

    pub fn get_mut(&mut self, position: Position) -> Option<&mut SubroutineState> {
        self.index.get(&position).map(|&i| &mut self.slots[i])
    }

    /// Like [`get_mut`](Self::get_mut), but an unknown position is an error.
    pub fn state_mut(&mut self, position: Position) -> Result<&mut SubroutineState, StateError> {
        self.get_mut(position)
            .ok_or(StateError::Unknown { position })
    }

    pub fn status(&self, position: Position) -> Option<PrototypeStatus> {
        self.get(position).map(|s| s.status())
    }

    pub fn is_prototyped(&self, position: Position) -> bool {
        self.get(position).is_some_and(|s| s.is_prototyped())
    }

    pub fn iter(&self) -> impl Iterator<Item = &SubroutineState> + '_ {
        self.slots.iter()
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lifecycle_ends_frozen() {
        let mut s = SubroutineState::new(0x20);
        assert_eq!(s.status(), PrototypeStatus::Unprototyped);
        assert!(!s.is_return_type_known());

        s.start_prototyping().unwrap();
        assert!(s.is_being_prototyped());
        s.set_param_count(2).unwrap();
        s.set_return_type(TypeTag::Int).unwrap();
        s.ensure_param_placeholders().unwrap();
        s.stop_prototyping(true).unwrap();

        assert!(s.is_prototyped());
        assert!(s.returns_value());
        assert_eq!(s.params(), &[TypeTag::Any, TypeTag::Any]);

        let frozen = s.clone();
        assert_eq!(
            s.set_param_count(5),
            Err(StateError::Frozen { position: 0x20 })
        );
        assert!(s.set_return_type(TypeTag::Void).is_err());
        assert!(s.start_prototyping().is_err());
        assert!(s.stop_prototyping(false).is_err());
        assert!(s.ensure_param_placeholders().is_err());
        assert_eq!(s, frozen);
    }

    #[test]
    fn failed_prototyping_returns_to_unprototyped() {
        let mut s = SubroutineState::new(0x40);
        s.start_prototyping().unwrap();
        s.set_return_type(TypeTag::Void).unwrap();
        s.stop_prototyping(false).unwrap();
        assert_eq!(s.status(), PrototypeStatus::Unprototyped);
        assert!(s.is_return_type_known());
        assert!(!s.returns_value());
    }

    #[test]
    fn arena_lookup_by_position() {
        let mut arena = StateArena::default();
        arena.insert(0x30);
        arena.insert(0x10);
        arena.insert(0x30);
        assert_eq!(arena.len(), 2);
        assert_eq!(arena.status(0x10), Some(PrototypeStatus::Unprototyped));
        assert!(arena.get(0x99).is_none());
        assert_eq!(
            arena.state_mut(0x99).unwrap_err(),
            StateError::Unknown { position: 0x99 }
        );
    }
}
