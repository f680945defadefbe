pub mod dataset;
pub mod error;
pub mod geometry;
pub mod io;
pub mod pairing;
