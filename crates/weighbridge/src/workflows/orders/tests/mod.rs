mod common;

mod lifecycle;
mod verification;
