// Hardware facts and actions the update engine needs from the chip

pub mod reset;

pub use reset::{restart, station_mac};
