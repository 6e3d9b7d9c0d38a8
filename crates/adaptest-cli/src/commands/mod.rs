pub mod check;
pub mod estimate;
pub mod init;
pub mod simulate;
pub mod take;
pub mod validate;
