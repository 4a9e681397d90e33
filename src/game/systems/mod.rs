pub mod collision;
pub mod physics;
pub mod pipes;

/// Whether a periodic system runs on `frame`; an interval of 0 disables it
#[inline]
pub fn on_cadence(frame: u64, interval: u64) -> bool {
    interval > 0 && frame % interval == 0
}
