pub mod attendance;
pub mod core;
pub mod marks;
pub mod students;
