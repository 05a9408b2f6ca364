//! Deskline core - presence & consultation synchronization engine
//!
//! Everything that has to survive an unreliable LAN lives here:
//! - the debounced presence state machine fed by proximity scans
//! - the bounded, order-preserving consultation request queue
//! - the MQTT transport discipline (reconnect, backoff, latched status)
//! - the coordinator translating between state objects and wire messages
//!
//! The desk and hub binaries are thin drivers around these pieces.

pub mod availability;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod messages;
pub mod presence;
pub mod queue;
pub mod scanner;
pub mod state;
pub mod transport;

pub use availability::AvailabilityTable;
pub use coordinator::{QueueEvent, SyncCoordinator};
pub use error::{MessageError, ScanError, TransportError};
pub use messages::{ConsultationRequest, RequestStatus, StatusMessage};
pub use presence::{PresenceChange, PresenceSample, PresenceStateMachine};
pub use queue::RequestQueue;
pub use state::{new_state, Shared};
pub use transport::{ConnectionState, DeliveryMode, MqttTransport, Publisher};
