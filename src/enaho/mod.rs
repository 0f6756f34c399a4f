pub mod columns;
pub mod extract;
pub mod sav;
pub mod table;

pub use extract::extract_data;
pub use sav::{read_sav, read_sav_from};
pub use table::{Column, RawRecord, SurveyTable};
