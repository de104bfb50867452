pub mod influencer;
pub mod vote;
