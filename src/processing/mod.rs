pub mod adjust;
pub mod bilateral;
pub mod color;
pub mod faces;
pub mod filters;
pub mod histogram;
pub mod stylize;
