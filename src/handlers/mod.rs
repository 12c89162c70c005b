pub mod csv_filter;
pub mod fetch;
pub mod markdown;
pub mod resize;
