pub mod calculator;
pub mod health;
pub mod places;
pub mod weather;
