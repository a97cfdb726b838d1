//! Relay core: per-server channel registry and message buffers.
//!
//! ## Module Structure
//!
//! - `buffer`: bounded message buffer polled by game servers
//! - `platform`: the Discord operations the relay depends on
//! - `registry`: server id <-> channel mapping (`TenantRegistry`)
//! - `filter`: regex content rules per direction
//! - `inbound`: Discord -> game server (`InboundHandler`)
//! - `outbound`: game server -> Discord (`OutboundRelay`)

pub mod buffer;
pub mod filter;
pub mod inbound;
pub mod outbound;
pub mod platform;
pub mod registry;

pub use buffer::RelayedMessage;
pub use filter::MessageFilter;
pub use inbound::{InboundEvent, InboundHandler};
pub use outbound::{OutboundFormat, OutboundRelay, SendRequest};
pub use registry::{ChannelSettings, TenantRegistry};
