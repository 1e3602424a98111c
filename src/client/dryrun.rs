//! Synthesized identities for dry-run deploys.
//!
//! Dry-run write paths must still produce entities that downstream
//! references can resolve, so ids are derived deterministically from the
//! coordinate, so the same project dry-runs to the same ids every time.

use super::RemoteEntity;
use crate::project::Coordinate;
use uuid::Uuid;

/// Fixed namespace for dry-run ids, distinct from the live id namespace so
/// a synthesized id can never collide with a derived live one.
const DRY_RUN_NAMESPACE: Uuid = Uuid::from_u128(0x2f0c_8d41_5b7e_4c11_8e0a_93d1_47c2_b95e);

/// A plausible, deterministic entity for a write that never happened.
#[must_use]
pub fn synthesized_entity(coordinate: &Coordinate, name: &str) -> RemoteEntity {
    let id = Uuid::new_v3(&DRY_RUN_NAMESPACE, coordinate.to_string().as_bytes());
    RemoteEntity {
        id: id.to_string(),
        name: name.to_string(),
    }
}
