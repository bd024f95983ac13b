pub mod board;
pub mod connect4;
pub mod game;
pub mod ships;
pub mod user;
