pub mod api;
pub mod client;
pub mod types;

pub use api::HelixApi;
pub use client::HelixClient;
pub use types::{
    Chatter, Clip, ClipsParams, Follower, Game, HelixResponse, MAX_IDS_PER_REQUEST, RateLimit,
    Stream, StreamsParams, Subscription, User,
};
