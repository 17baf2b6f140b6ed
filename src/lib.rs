pub mod button;
pub mod conn;
pub mod dispatch;
pub mod error;
pub mod join;
pub mod listener;
pub mod protocol;
pub mod state;
