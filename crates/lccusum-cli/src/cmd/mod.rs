pub mod compute;
pub mod config;
pub mod init;
pub mod recompute;
pub mod record;
pub mod report;
pub mod reset;
pub mod status;
