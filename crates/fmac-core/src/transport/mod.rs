//! Bus transport layer: the trait the driver drives, plus a mock chip.

pub mod mock;
pub mod traits;

pub use mock::{
    GetMode, MockBus, connect_indication_frame, disconnect_indication_frame,
    received_indication_frame, scan_complete_indication_frame, scan_result_indication_frame,
    startup_indication_frame,
};
pub use traits::{BusError, BusTransport};
