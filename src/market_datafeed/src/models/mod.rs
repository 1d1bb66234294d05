pub mod bar;
pub mod request_params;
pub mod resolution;
pub mod symbol;
