//! Integration tests against the `dobles.testing` fixture module.

mod common;

mod async_double;
mod expectations;
mod lifecycle;
mod pure_doubles;
