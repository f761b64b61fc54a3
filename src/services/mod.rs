pub mod calculator;
pub mod events;
pub mod gfs;
pub mod options;
pub mod places;
pub mod scheduler;
pub mod slots;
pub mod weather_cache;
