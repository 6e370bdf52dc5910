// Adapters layer: concrete implementations of the domain ports (exchange, secrets, alerts).

pub mod lighter;
pub mod line;
pub mod secrets;
