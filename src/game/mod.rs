//! Game simulation modules

pub mod countdown;
pub mod entity;
pub mod physics;
pub mod registry;
pub mod room;
pub mod snapshot;

pub use registry::RoomRegistry;
pub use room::RoomId;
