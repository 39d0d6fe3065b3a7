pub mod check;
pub mod duration;
pub mod export;
pub mod init;
pub mod search;
