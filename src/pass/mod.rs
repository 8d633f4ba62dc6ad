/**
 * Pass Module
 *
 * Satellite-pass replay for an az/el positioner:
 * - trajectory: pass geometry over the elapsed fraction
 * - shaper: filter, slew limit and send decimation
 * - controller: Home / Start / Stop against one device
 */

pub mod controller;
pub mod shaper;
pub mod trajectory;

pub use controller::{ControllerStatus, PassController};
pub use shaper::{MotionShaper, ShaperConfig};
pub use trajectory::{cosine_ease, AzEl, PassBounds, PassProfile};
