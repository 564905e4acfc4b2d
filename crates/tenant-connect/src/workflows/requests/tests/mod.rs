mod common;

mod actions;
