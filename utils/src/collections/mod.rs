pub mod bitmap;
pub mod ring;
pub mod slots;

pub use bitmap::Bitmap;
pub use ring::RingBuffer;
pub use slots::SlotTable;
