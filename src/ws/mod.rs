pub mod registry;
pub mod room;
mod room_loop;
pub mod session;

pub use registry::RoomRegistry;
pub use room::{Room, RoomError, RoomServices, RoomSettings};
pub use session::{ClientHandle, UserIdAllocator};
