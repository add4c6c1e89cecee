pub mod bit;
pub mod child;
pub mod milestone;

pub use bit::{Bit, BitChanges, BitInsert, BitPatch, ChildSummary, NewBit, PhotoUpload};
pub use child::{Child, ChildChanges, ChildInsert, ChildPatch, NewChild};
pub use milestone::Milestone;
