#![forbid(unsafe_code)]

pub mod verify;
