pub mod clock;
pub mod groups;
pub mod requests;
pub mod store;

pub use clock::{Clock, FixedClock, SystemClock};
