pub mod ping;
pub mod tail;
