pub mod control;
pub mod status;
pub mod transfer;
