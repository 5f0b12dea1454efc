pub mod message;
pub mod room;

pub use message::{ChatMessage, MessageKind, Role};
pub use room::{Room, RoomStatus};
