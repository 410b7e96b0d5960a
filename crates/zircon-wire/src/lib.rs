mod frame;
mod wire;

pub use frame::{calc_frame_checksum, FRAME_MAGIC};
pub use wire::{WireDeserialize, WireError, WireSerialize};
pub use zircon_wire_derive::{WireDeserialize, WireSerialize};
