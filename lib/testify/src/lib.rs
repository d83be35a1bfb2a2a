mod portpicker;
pub mod temp;

// re-export
pub use portpicker::{pick_unused_local_port, pick_unused_port};
