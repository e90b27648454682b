pub mod answer;
pub mod puzzle;
pub mod user;
