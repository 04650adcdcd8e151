pub mod constants;
mod errors;
mod timeout;

pub use errors::SearchError;
pub use timeout::{
    MAX_LOAD_CEILING_MS, MAX_SETTLE_MS, Timings, validate_load_ceiling, validate_settle_timeout,
};
