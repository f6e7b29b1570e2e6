pub mod batch;
pub mod capture;
pub mod extract;
pub mod init;
pub mod queue;
pub mod serve;
pub mod sprites;
pub mod status;
