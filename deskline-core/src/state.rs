//! Shared-state aliases used across the engine.
//!
//! The request queue is mutated by the coordinator and snapshotted by a
//! display consumer, so it travels as `Shared<RequestQueue>`. Read-heavy
//! structures (the hub's availability mirror) use the `RwLock` flavor.

use parking_lot::{Mutex, RwLock};
use std::sync::Arc;

pub type Shared<T> = Arc<Mutex<T>>;
pub type SharedRw<T> = Arc<RwLock<T>>;

pub fn new_state<T>(value: T) -> Shared<T> {
    Arc::new(Mutex::new(value))
}
