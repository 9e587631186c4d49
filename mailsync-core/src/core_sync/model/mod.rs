/*
    Data model for synchronized records
*/

pub mod record;
pub mod record_set;

pub use record::{Attributes, Content, Record, RecordId, RecordState};
pub use record_set::RecordSet;
