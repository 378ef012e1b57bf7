pub mod analysis;
pub mod decode;
pub mod features;
pub mod filter;
pub mod note;
pub mod segment;
