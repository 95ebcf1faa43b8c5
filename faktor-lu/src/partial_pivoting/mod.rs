pub mod compute;
pub mod reconstruct;
