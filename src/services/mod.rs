pub mod crypto;
pub mod pop;
