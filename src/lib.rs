pub mod common;
pub mod consensus;
pub mod network;

#[cfg(test)]
pub(crate) mod testing;
