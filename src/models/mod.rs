pub mod auction;
pub mod bidding;
