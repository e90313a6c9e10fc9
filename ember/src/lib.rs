
#![allow(unexpected_cfgs)]

pub mod base;
pub mod error;
pub mod config;
pub mod backend;
pub mod geometry;
pub mod materials;
pub mod accel;
pub mod camera;
pub mod accumulation;
pub mod auto_spp;
pub mod frame;
pub mod sequence;
pub mod export;
pub mod tonemapping;
pub mod wgpu_utils;
pub mod wgpu_backend;
pub mod runtime;

pub use base::*;
pub use error::*;
pub use config::*;
pub use backend::*;
pub use geometry::*;
pub use materials::*;
pub use accel::*;
pub use camera::*;
pub use accumulation::*;
pub use auto_spp::*;
pub use frame::*;
pub use sequence::*;
pub use export::*;
pub use tonemapping::*;
pub use wgpu_utils::*;
pub use wgpu_backend::*;
pub use runtime::*;
pub use wgpu;  // No need to have an extra dependency on wgpu.
