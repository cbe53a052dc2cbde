pub mod attendance;
pub mod backup_exchange;
pub mod chemical;
pub mod core;
pub mod equipment;
pub mod practicals;
pub mod stock;
pub mod students;
pub mod timetable;
