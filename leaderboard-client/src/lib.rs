pub mod api;
pub mod app;
pub mod config;
mod constants;
pub mod controller;
pub mod lifecycle;
pub mod models;
pub mod normalize;
pub mod protocol;
pub mod stream;
pub mod view;


pub use constants::{
    CHANNEL_CONNECT, CHANNEL_CONNECT_ERROR, CHANNEL_PLAYER_COUNT, CHANNEL_SIMULATE,
};
