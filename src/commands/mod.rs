pub mod check_sessions;
pub mod join_channel;
pub mod monitor;
pub mod send_message;
