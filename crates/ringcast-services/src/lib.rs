//! ringcast-services — replication state shared by every session: the
//! deduplicating ring stores, per-peer cursors, the peer directory, the
//! audit log and the local message generator.

pub mod audit;
pub mod cursor;
pub mod generator;
pub mod peer;
pub mod ring_store;

pub use audit::{AuditLog, FileAuditLog, MemoryAuditLog, NoopAuditLog, SessionPhase, SessionRole};
pub use cursor::PeerCursorTable;
pub use generator::MessageGenerator;
pub use peer::{PeerResolver, ResolveError, StaticResolver};
pub use ring_store::{AppendOutcome, RingStore, Slice};
