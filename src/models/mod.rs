pub mod admin;
pub mod influencer;
pub mod vote;
