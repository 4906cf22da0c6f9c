pub mod connection;
pub mod handler;
pub mod types;

pub use connection::RoomHub;
pub use handler::ws_handler;
