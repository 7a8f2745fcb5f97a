// src/rl/action_encoding.rs
//
// Versioned discrete action encoding.
//
// The action space is the fixed, ordered set of optimizer primitives:
//
//   0 -> Rewrite
//   1 -> Balance
//   2 -> Resubstitute
//   3 -> Refactor
//
// Ids are stable across versions; adding a primitive appends a new id and
// bumps ACTION_VERSION (which also changes OBS_DIM through the last-action
// one-hot).

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::optimizer::Primitive;

/// Current action encoding version.
/// Increment when changing the encoding schema.
pub const ACTION_VERSION: u32 = 1;

/// Integer action id as seen by a policy learner.
pub type ActionId = u32;

/// Primitives in action-id order.
pub const ACTION_TABLE: [Primitive; 4] = [
    Primitive::Rewrite,
    Primitive::Balance,
    Primitive::Resubstitute,
    Primitive::Refactor,
];

pub const NUM_ACTIONS: usize = ACTION_TABLE.len();

/// Width of the last-action one-hot: one slot for "none" plus one per action.
pub const LAST_ACTION_SLOTS: usize = NUM_ACTIONS + 1;

/// Action id outside `0..NUM_ACTIONS`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvalidActionId(pub ActionId);

impl fmt::Display for InvalidActionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "action id {} out of range (expected 0..{})",
            self.0, NUM_ACTIONS
        )
    }
}

impl std::error::Error for InvalidActionId {}

impl TryFrom<ActionId> for Primitive {
    type Error = InvalidActionId;

    fn try_from(id: ActionId) -> Result<Self, Self::Error> {
        decode_action(id).ok_or(InvalidActionId(id))
    }
}

/// Action space metadata, written into every episode start marker.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ActionEncodingSpec {
    /// Schema version.
    pub version: u32,
    /// Number of discrete actions.
    pub num_actions: usize,
    /// Action names in id order.
    pub names: Vec<String>,
}

impl ActionEncodingSpec {
    pub fn current() -> Self {
        Self {
            version: ACTION_VERSION,
            num_actions: NUM_ACTIONS,
            names: ACTION_TABLE.iter().map(|p| p.name().to_string()).collect(),
        }
    }
}

/// Map an action id to its primitive. Returns None if out of range.
pub fn decode_action(id: ActionId) -> Option<Primitive> {
    ACTION_TABLE.get(id as usize).copied()
}

/// Map a primitive to its action id.
pub fn encode_action(op: Primitive) -> ActionId {
    match op {
        Primitive::Rewrite => 0,
        Primitive::Balance => 1,
        Primitive::Resubstitute => 2,
        Primitive::Refactor => 3,
    }
}

/// Slot of `last` in the last-action one-hot (0 = none, k + 1 = action k).
pub fn last_action_slot(last: Option<Primitive>) -> usize {
    match last {
        None => 0,
        Some(op) => encode_action(op) as usize + 1,
    }
}

/// One-hot encoding of the previous action over {none, op0, .., opN-1}.
pub fn encode_last_action(last: Option<Primitive>) -> [f32; LAST_ACTION_SLOTS] {
    let mut out = [0.0f32; LAST_ACTION_SLOTS];
    out[last_action_slot(last)] = 1.0;
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_action_table_order() {
        assert_eq!(decode_action(0), Some(Primitive::Rewrite));
        assert_eq!(decode_action(1), Some(Primitive::Balance));
        assert_eq!(decode_action(2), Some(Primitive::Resubstitute));
        assert_eq!(decode_action(3), Some(Primitive::Refactor));
        assert_eq!(decode_action(4), None);
    }

    #[test]
    fn test_encode_matches_table() {
        for (id, op) in ACTION_TABLE.iter().enumerate() {
            assert_eq!(encode_action(*op) as usize, id);
        }
    }

    #[test]
    fn test_try_from_rejects_out_of_range() {
        assert_eq!(Primitive::try_from(2u32), Ok(Primitive::Resubstitute));
        let err = Primitive::try_from(9u32).unwrap_err();
        assert_eq!(err, InvalidActionId(9));
        assert!(err.to_string().contains("0..4"));
    }

    #[test]
    fn test_last_action_one_hot() {
        assert_eq!(encode_last_action(None), [1.0, 0.0, 0.0, 0.0, 0.0]);
        assert_eq!(
            encode_last_action(Some(Primitive::Refactor)),
            [0.0, 0.0, 0.0, 0.0, 1.0]
        );
    }

    #[test]
    fn test_spec_names() {
        let spec = ActionEncodingSpec::current();
        assert_eq!(spec.num_actions, 4);
        assert_eq!(spec.names[1], "Balance");
    }
}
