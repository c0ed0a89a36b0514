mod cancel;
pub mod coordinator;
pub mod on_demand;
pub mod reservation;

pub use coordinator::MeterCoordinator;
