pub mod approval;
pub mod form_type;
pub mod staff;
pub mod submission;
