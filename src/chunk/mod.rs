pub mod cursor;

pub use cursor::{Slice, SliceCursor};
