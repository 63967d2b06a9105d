pub mod handler;
pub mod msg_ping_handler;
