//! REST interface

pub mod rest;
