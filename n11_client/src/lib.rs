pub use crate::root::*;

mod root;
