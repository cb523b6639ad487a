//! Behaviour of the limiters through their public API.

mod memory;
mod redis;
