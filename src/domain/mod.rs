// Domain layer: exchange views, rebalance tables and the ports the engine talks through.

pub mod model;
pub mod ports;
