pub mod delete;
pub mod init;
pub mod lease;
pub mod list;
pub mod register;
