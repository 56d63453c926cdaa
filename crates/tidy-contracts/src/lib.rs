pub mod analysis;
pub mod events;
pub mod records;
pub mod requests;
pub mod taxonomy;
pub mod time;
