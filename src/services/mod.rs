//! Services - business logic and state management
//!
//! This module contains the core business logic services:
//! - `controller` - Exit session state machine
//! - `countdown` - Payment countdown and warning tier
//! - `kiosk` - Runtime loop driving the controller
//! - `barrier` - Barrier controller interface
//! - `barrier_worker` - Async barrier command worker

pub mod barrier;
pub mod barrier_worker;
pub mod controller;
pub mod countdown;
pub mod kiosk;

// Re-export commonly used types
pub use barrier::{BarrierCommand, BarrierController};
pub use barrier_worker::{create_barrier_worker, BarrierCmd, BarrierWorker};
pub use controller::{ControllerSettings, ExitController, KioskView};
pub use kiosk::{Kiosk, KioskCommand, KioskIo};
