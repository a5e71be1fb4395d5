//! rackgrid-api: the surface the route layer calls.
//!
//! | Operation | Description |
//! |---|---|
//! | [`ReservationManager::reserve`] | Reserve a free device for N minutes |
//! | [`ReservationManager::reserve_for`] | Reserve with hours + minutes |
//! | [`ReservationManager::release`] | Free a device (idempotent) |
//! | [`ReservationManager::refresh_health_now`] | Make a device due for a health check |
//! | [`snapshot`] | Every device joined with its health and display block |
//! | [`derive_ports`] | Console/switch ports derived from a management address |

pub mod error;
pub mod ports;
pub mod reservation;
pub mod snapshot;

pub use error::{DeskError, DeskResult};
pub use ports::{DerivedPorts, derive_ports};
pub use reservation::{ReservationManager, ReservationRequest, ReservationWindow};
pub use snapshot::{DeviceView, resv_block, snapshot, snapshot_at};
