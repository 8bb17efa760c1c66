pub mod connctx;
pub mod rooms;
pub mod userctx;

pub use connctx::{ConnId, Connection, Delivery, OutboundQueue};
pub use rooms::{RegistryStats, RoomKey, RoomRegistry};
pub use userctx::{Identity, UserCtx, UserCtxCache};
