pub mod candidate;
pub mod remote;
pub mod round;
