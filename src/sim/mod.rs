pub mod clock;
pub mod engine;

pub use clock::{OpeningHours, SimClock};
pub use engine::Simulator;
