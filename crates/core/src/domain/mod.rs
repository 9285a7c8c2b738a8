pub mod consultation;
pub mod intake;
pub mod search;
