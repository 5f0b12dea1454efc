pub mod message;
pub mod room;
