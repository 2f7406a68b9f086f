pub mod codec;
pub mod handler;

pub use handler::room_websocket;
