pub mod capture;
pub mod overlay;
