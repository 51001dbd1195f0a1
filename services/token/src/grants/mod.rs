//! Expiring, single-use grants: device codes, permission tickets, nonces.

/// Random grant codes and RFC 8628 user codes.
pub mod code;
pub mod device_code;
/// Grant errors and their stable codes.
pub mod error;
pub mod memory;
pub mod nonce;
pub mod permission_ticket;
pub mod repository;
pub mod store;
pub mod sweeper;

pub use code::CodeGenerator;
pub use device_code::{ApprovalState, DeviceCode, DeviceCodeService};
pub use error::GrantError;
pub use memory::InMemoryGrantRepository;
pub use nonce::{Nonce, NonceService};
pub use permission_ticket::{
    ClaimsGathering, Permission, PermissionTicket, PermissionTicketService, ResourceSet,
};
pub use repository::{Grant, GrantId, GrantKey, GrantRepository, RedeemOutcome};
pub use store::GrantStore;
pub use sweeper::{GrantSweeper, Sweepable};
