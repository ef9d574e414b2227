pub mod ambient;
pub mod answer;
pub mod persona;
pub mod session;
