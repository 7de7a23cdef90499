pub mod capability;
pub mod channel;
pub mod chat;
pub mod run;
pub mod thread;
