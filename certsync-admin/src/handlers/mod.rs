pub mod certificates;
pub mod desired;
pub mod health;
pub mod reload;
pub mod secrets;
