pub mod config_file;
pub mod init;
pub mod report;
pub mod scenario;
pub mod terrain;
